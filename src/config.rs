use std::{env, path::PathBuf, str::FromStr, time::Duration};

use crate::scrabble::TileSet;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum Error {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{key} has an invalid value {value:?}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    /// How often each watched game checks its move clock.
    pub clock_tick: Duration,
    /// How often the referee looks for newly created games.
    pub sweep_interval: Duration,
    pub tile_set: TileSet,
    pub word_list_path: PathBuf,
    pub word_list_url: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, Error> {
        let _ = dotenv::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").ok_or(Error::Missing("DATABASE_URL"))?;

        Ok(Config {
            database_url,
            database_max_connections: parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 5)?,
            clock_tick: Duration::from_millis(parse_or(&lookup, "CLOCK_TICK_MS", 1000)?),
            sweep_interval: Duration::from_secs(parse_or(&lookup, "SWEEP_INTERVAL_SECS", 30)?),
            tile_set: parse_or(&lookup, "TILE_SET", TileSet::default())?,
            word_list_path: lookup("WORD_LIST_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./words")),
            word_list_url: lookup("WORD_LIST_URL").filter(|url| !url.is_empty()),
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, Error>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| Error::Invalid { key, value }),
    }
}
