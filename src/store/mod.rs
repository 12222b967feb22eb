use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use uuid::Uuid;

use crate::scrabble::Player;

mod document;
mod memory;
mod postgres;

pub use document::{CompletedGame, GameDocument, GameStatus, GameUpdate, HandUpdate, PlayerInfo};
pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct GameId(String);

impl GameId {
    pub fn random() -> Self {
        GameId(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for GameId {
    fn from(id: &str) -> Self {
        GameId(id.to_owned())
    }
}

impl From<String> for GameId {
    fn from(id: String) -> Self {
        GameId(id)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("game {0} not found")]
    NotFound(GameId),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("malformed game document: {0}")]
    Codec(#[from] serde_json::Error),
}

/// The shared document store both players write to.
///
/// Updates are partial: fields left as `None` in a [`GameUpdate`] are not
/// touched, and at most one player's hand can be written at a time.
#[async_trait]
pub trait GameStore: Send + Sync + 'static {
    async fn create(&self, document: GameDocument) -> Result<GameId, Error>;

    async fn fetch(&self, id: &GameId) -> Result<Option<GameDocument>, Error>;

    /// A receiver holding the current document, updated on every change.
    async fn subscribe(&self, id: &GameId) -> Result<watch::Receiver<GameDocument>, Error>;

    async fn update(&self, id: &GameId, update: GameUpdate) -> Result<(), Error>;

    /// Applies `update` only while the game is still active and `turn` still
    /// names `expected_turn`. Returns whether it was applied.
    async fn update_if_turn(
        &self,
        id: &GameId,
        expected_turn: &Player,
        update: GameUpdate,
    ) -> Result<bool, Error>;

    /// Keeps the first record per game; appending the same game again is a
    /// no-op.
    async fn append_completed(&self, record: CompletedGame) -> Result<(), Error>;

    /// Ids of every game not yet completed.
    async fn active_games(&self) -> Result<Vec<GameId>, Error>;

    /// Newest first.
    async fn completed_games_for(&self, player: &Player) -> Result<Vec<CompletedGame>, Error>;
}
