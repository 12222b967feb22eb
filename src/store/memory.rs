use std::{
    collections::HashMap,
    sync::atomic::{AtomicBool, AtomicU32, Ordering},
};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::debug;

use super::{CompletedGame, Error, GameDocument, GameId, GameStore, GameUpdate};
use crate::scrabble::Player;

/// Process-local store for tests and local play. `set_available(false)`
/// makes every call fail the way an unreachable remote store would.
#[derive(Debug, Default)]
pub struct MemoryStore {
    games: Mutex<HashMap<GameId, watch::Sender<GameDocument>>>,
    completed: Mutex<Vec<CompletedGame>>,
    offline: AtomicBool,
    archive_failures: AtomicU32,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_available(&self, available: bool) {
        self.offline.store(!available, Ordering::SeqCst);
    }

    /// Makes the next `count` calls to `append_completed` fail.
    pub fn fail_next_archives(&self, count: u32) {
        self.archive_failures.store(count, Ordering::SeqCst);
    }

    /// Creates a document under a chosen id, replacing any existing one.
    pub fn insert(&self, id: GameId, document: GameDocument) {
        let mut games = self.games.lock();
        match games.get(&id) {
            Some(sender) => {
                sender.send_replace(document);
            }
            None => {
                games.insert(id, watch::channel(document).0);
            }
        }
    }

    fn check_available(&self) -> Result<(), Error> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::Unavailable("memory store is offline".into()));
        }
        Ok(())
    }

    fn modify<F>(&self, id: &GameId, modify: F) -> Result<bool, Error>
    where
        F: FnOnce(&mut GameDocument) -> bool,
    {
        self.check_available()?;

        let games = self.games.lock();
        let sender = games.get(id).ok_or_else(|| Error::NotFound(id.clone()))?;

        Ok(sender.send_if_modified(modify))
    }
}

#[async_trait]
impl GameStore for MemoryStore {
    async fn create(&self, document: GameDocument) -> Result<GameId, Error> {
        self.check_available()?;

        let id = GameId::random();
        debug!("creating game {}", id);
        self.insert(id.clone(), document);
        Ok(id)
    }

    async fn fetch(&self, id: &GameId) -> Result<Option<GameDocument>, Error> {
        self.check_available()?;

        Ok(self
            .games
            .lock()
            .get(id)
            .map(|sender| sender.borrow().clone()))
    }

    async fn subscribe(&self, id: &GameId) -> Result<watch::Receiver<GameDocument>, Error> {
        self.check_available()?;

        self.games
            .lock()
            .get(id)
            .map(watch::Sender::subscribe)
            .ok_or_else(|| Error::NotFound(id.clone()))
    }

    async fn update(&self, id: &GameId, update: GameUpdate) -> Result<(), Error> {
        self.modify(id, |document| {
            document.apply(&update);
            true
        })?;
        Ok(())
    }

    async fn update_if_turn(
        &self,
        id: &GameId,
        expected_turn: &Player,
        update: GameUpdate,
    ) -> Result<bool, Error> {
        self.modify(id, |document| {
            if document.is_completed() || document.turn != *expected_turn {
                return false;
            }
            document.apply(&update);
            true
        })
    }

    async fn append_completed(&self, record: CompletedGame) -> Result<(), Error> {
        self.check_available()?;

        let failing = self
            .archive_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(Error::Unavailable("completed games are offline".into()));
        }

        let mut completed = self.completed.lock();
        if completed.iter().any(|r| r.game_id == record.game_id) {
            debug!("game {} is already archived", record.game_id);
            return Ok(());
        }

        completed.push(record);
        Ok(())
    }

    async fn active_games(&self) -> Result<Vec<GameId>, Error> {
        self.check_available()?;

        let mut ids: Vec<GameId> = self
            .games
            .lock()
            .iter()
            .filter(|(_, sender)| !sender.borrow().is_completed())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn completed_games_for(&self, player: &Player) -> Result<Vec<CompletedGame>, Error> {
        self.check_available()?;

        let mut records: Vec<CompletedGame> = self
            .completed
            .lock()
            .iter()
            .filter(|record| record.involves(player))
            .cloned()
            .collect();
        records.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));
        Ok(records)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::scrabble::{TileSet, TimeControl};
    use crate::store::{GameStatus, PlayerInfo};
    use chrono::{Duration, Utc};

    fn document() -> GameDocument {
        GameDocument::start(
            PlayerInfo::new("p1", "one"),
            PlayerInfo::new("p2", "two"),
            TileSet::English,
            TimeControl::FiveMinutes,
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_update_if_turn() {
        let store = MemoryStore::new();
        let id = store.create(document()).await.unwrap();
        let mut changes = store.subscribe(&id).await.unwrap();

        let pass = GameUpdate {
            turn: Some(Player::from("p2")),
            ..Default::default()
        };

        assert!(!store
            .update_if_turn(&id, &Player::from("p2"), pass.clone())
            .await
            .unwrap());
        assert!(!changes.has_changed().unwrap());

        assert!(store
            .update_if_turn(&id, &Player::from("p1"), pass.clone())
            .await
            .unwrap());
        assert!(changes.has_changed().unwrap());
        assert_eq!(changes.borrow_and_update().turn, Player::from("p2"));

        // the same write again loses: turn has moved on
        assert!(!store
            .update_if_turn(&id, &Player::from("p1"), pass)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_completed_game_refuses_conditional_writes() {
        let store = MemoryStore::new();
        let id = store.create(document()).await.unwrap();

        store
            .update(
                &id,
                GameUpdate {
                    status: Some(GameStatus::Completed),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let before = store.fetch(&id).await.unwrap().unwrap();

        // turn still names p1, but the game is over
        let pass = GameUpdate {
            turn: Some(Player::from("p2")),
            ..Default::default()
        };
        assert!(!store
            .update_if_turn(&id, &Player::from("p1"), pass)
            .await
            .unwrap());
        assert_eq!(store.fetch(&id).await.unwrap().unwrap(), before);
    }

    fn record(game_id: &str, end_reason: crate::scrabble::EndReason) -> CompletedGame {
        let doc = document();
        CompletedGame {
            game_id: GameId::from(game_id),
            player1: doc.player1,
            player2: doc.player2,
            player1_score: 0,
            player2_score: 0,
            winner: Some(Player::from("p2")),
            end_reason,
            status: GameStatus::Completed,
            completed_at: Utc::now(),
            selected_time: TimeControl::FiveMinutes,
        }
    }

    #[tokio::test]
    async fn test_archive_keeps_first_record_per_game() {
        use crate::scrabble::EndReason;

        let store = MemoryStore::new();
        store.fail_next_archives(1);

        assert!(matches!(
            store.append_completed(record("g1", EndReason::Timeout)).await,
            Err(Error::Unavailable(_))
        ));
        store.append_completed(record("g1", EndReason::Timeout)).await.unwrap();
        store.append_completed(record("g1", EndReason::Surrender)).await.unwrap();

        let records = store.completed_games_for(&Player::from("p1")).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].end_reason, EndReason::Timeout);
    }

    #[tokio::test]
    async fn test_offline_store_fails_every_call() {
        let store = MemoryStore::new();
        let id = store.create(document()).await.unwrap();

        store.set_available(false);
        assert!(matches!(store.fetch(&id).await, Err(Error::Unavailable(_))));
        assert!(matches!(
            store.update(&id, GameUpdate::default()).await,
            Err(Error::Unavailable(_))
        ));

        store.set_available(true);
        assert!(store.fetch(&id).await.unwrap().is_some());
        assert!(matches!(
            store.subscribe(&GameId::from("missing")).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_game_lists() {
        let store = MemoryStore::new();
        let running = store.create(document()).await.unwrap();
        let finished = store.create(document()).await.unwrap();

        store
            .update(
                &finished,
                GameUpdate {
                    status: Some(GameStatus::Completed),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(store.active_games().await.unwrap(), vec![running]);

        let now = Utc::now();
        let doc = document();
        for (game_id, completed_at) in [("old", now - Duration::days(1)), ("new", now)] {
            store
                .append_completed(CompletedGame {
                    game_id: GameId::from(game_id),
                    player1: doc.player1.clone(),
                    player2: doc.player2.clone(),
                    player1_score: 10,
                    player2_score: 3,
                    winner: Some(Player::from("p1")),
                    end_reason: crate::scrabble::EndReason::Timeout,
                    status: GameStatus::Completed,
                    completed_at,
                    selected_time: TimeControl::FiveMinutes,
                })
                .await
                .unwrap();
        }

        let records = store.completed_games_for(&Player::from("p2")).await.unwrap();
        assert_eq!(
            records.iter().map(|r| r.game_id.as_str()).collect::<Vec<_>>(),
            vec!["new", "old"]
        );
        assert!(store
            .completed_games_for(&Player::from("p3"))
            .await
            .unwrap()
            .is_empty());
    }
}
