pub mod config;
pub mod dictionary;
pub mod referee;
pub mod scrabble;
pub mod session;
pub mod store;
