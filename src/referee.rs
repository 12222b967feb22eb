use std::{collections::HashSet, sync::Arc, time::Duration};

use chrono::Utc;
use parking_lot::Mutex;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::scrabble;
use crate::store::{self, CompletedGame, GameDocument, GameId, GameStore, GameUpdate};

const ARCHIVE_ATTEMPTS: u32 = 5;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Store(#[from] store::Error),
    #[error("unreadable game: {0}")]
    Game(#[from] scrabble::Error),
}

/// Server-side clock keeper. Watches every active game and ends the ones
/// whose player to move has run out of time, even when both clients are
/// gone.
pub struct Referee<S: GameStore + ?Sized> {
    store: Arc<S>,
    tick: Duration,
    sweep: Duration,
    watched: Arc<Mutex<HashSet<GameId>>>,
}

impl<S: GameStore + ?Sized> Referee<S> {
    pub fn new(store: Arc<S>, tick: Duration, sweep: Duration) -> Self {
        Referee {
            store,
            tick,
            sweep,
            watched: Default::default(),
        }
    }

    pub fn from_config(store: Arc<S>, config: &Config) -> Self {
        Self::new(store, config.clock_tick, config.sweep_interval)
    }

    pub fn watching(&self) -> usize {
        self.watched.lock().len()
    }

    pub async fn run(&self) {
        let mut interval = time::interval(self.sweep);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            interval.tick().await;

            match self.sweep().await {
                Ok(0) => {}
                Ok(started) => info!("watching {} new games", started),
                Err(e) => error!("could not list active games; e={:?}", e),
            }
        }
    }

    /// Starts a watcher for every active game not already watched. Returns
    /// how many were started.
    pub async fn sweep(&self) -> Result<usize, Error> {
        let ids = self.store.active_games().await?;
        let mut started = 0;

        for id in ids {
            if !self.watched.lock().insert(id.clone()) {
                continue;
            }

            let store = self.store.clone();
            let watched = self.watched.clone();
            let tick = self.tick;

            tokio::spawn(async move {
                match watch_game(store, id.clone(), tick).await {
                    Ok(true) => info!("game {} timed out", id),
                    Ok(false) => debug!("stopped watching game {}", id),
                    Err(e) => error!("watcher for game {} failed; e={:?}", id, e),
                }

                watched.lock().remove(&id);
            });

            started += 1;
        }

        Ok(started)
    }
}

/// Checks the move clock of one game every `tick` until the game completes.
/// Returns true if the game ended on time here.
pub async fn watch_game<S>(store: Arc<S>, id: GameId, tick: Duration) -> Result<bool, Error>
where
    S: GameStore + ?Sized,
{
    let mut changes = store.subscribe(&id).await?;
    let mut interval = time::interval(tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        let document = changes.borrow_and_update().clone();
        if document.is_completed() {
            return Ok(false);
        }

        if enforce_clock(&*store, &id, &document, tick).await? {
            return Ok(true);
        }

        tokio::select! {
            changed = changes.changed() => {
                if changed.is_err() {
                    return Ok(false);
                }
            }
            _ = interval.tick() => {}
        }
    }
}

async fn enforce_clock<S>(
    store: &S,
    id: &GameId,
    document: &GameDocument,
    retry: Duration,
) -> Result<bool, Error>
where
    S: GameStore + ?Sized,
{
    let (mut game, _) = document.to_game(Utc::now())?;

    // pin the clock start so every later tick measures from the same instant
    if document.last_move_time.is_none() {
        let update = GameUpdate {
            last_move_time: Some(game.last_move_at()),
            ..Default::default()
        };
        store.update_if_turn(id, &document.turn, update).await?;
    }

    if !game.check_timeout(Utc::now()) {
        return Ok(false);
    }

    // a move that lands first wins
    let update = GameUpdate::completion(&game);
    if !store.update_if_turn(id, &document.turn, update).await? {
        warn!("game {} moved on before its timeout was recorded", id);
        return Ok(false);
    }

    if let Some(record) = CompletedGame::new(id.clone(), document, &game) {
        archive(store, record, retry).await;
    }
    Ok(true)
}

// the timeout is already saved, so a record that never lands is only logged
async fn archive<S>(store: &S, record: CompletedGame, retry: Duration)
where
    S: GameStore + ?Sized,
{
    for attempt in 1..=ARCHIVE_ATTEMPTS {
        match store.append_completed(record.clone()).await {
            Ok(()) => return,
            Err(e) => warn!(
                "archiving game {} failed (attempt {}); e={:?}",
                record.game_id, attempt, e
            ),
        }

        if attempt < ARCHIVE_ATTEMPTS {
            time::sleep(retry).await;
        }
    }

    error!(
        "gave up archiving game {} after {} attempts",
        record.game_id, ARCHIVE_ATTEMPTS
    );
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::scrabble::{EndReason, Player, TileSet, TimeControl};
    use crate::store::{GameStatus, MemoryStore, PlayerInfo};

    const TICK: Duration = Duration::from_millis(10);

    fn document(last_move: chrono::Duration) -> GameDocument {
        let mut document = GameDocument::start(
            PlayerInfo::new("ayse", "Ayşe"),
            PlayerInfo::new("mehmet", "Mehmet"),
            TileSet::Turkish,
            TimeControl::TwoMinutes,
            Utc::now(),
        );
        document.last_move_time = Some(Utc::now() - last_move);
        document
    }

    #[tokio::test]
    async fn test_stale_game_times_out() {
        let store = Arc::new(MemoryStore::new());
        let id = GameId::from("stale");
        store.insert(id.clone(), document(chrono::Duration::minutes(3)));

        assert!(watch_game(store.clone(), id.clone(), TICK).await.unwrap());

        let stored = store.fetch(&id).await.unwrap().unwrap();
        assert_eq!(stored.status, GameStatus::Completed);
        assert_eq!(stored.end_reason, Some(EndReason::Timeout));
        assert_eq!(stored.winner, Some(Player::from("mehmet")));

        let records = store
            .completed_games_for(&Player::from("ayse"))
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].winner, Some(Player::from("mehmet")));
    }

    #[tokio::test]
    async fn test_watcher_stops_when_game_completes_elsewhere() {
        let store = Arc::new(MemoryStore::new());
        let id = GameId::from("running");
        store.insert(id.clone(), document(chrono::Duration::zero()));

        let watcher = tokio::spawn(watch_game(store.clone(), id.clone(), TICK));
        time::sleep(TICK * 3).await;
        assert!(!watcher.is_finished());

        store
            .update(
                &id,
                GameUpdate {
                    status: Some(GameStatus::Completed),
                    end_reason: Some(EndReason::Surrender),
                    winner: Some(Player::from("ayse")),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let timed_out = time::timeout(Duration::from_secs(5), watcher)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(!timed_out);
        assert!(store
            .completed_games_for(&Player::from("ayse"))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_timeout_survives_failed_archive_attempts() {
        let store = Arc::new(MemoryStore::new());
        let id = GameId::from("flaky");
        store.insert(id.clone(), document(chrono::Duration::minutes(3)));
        store.fail_next_archives(2);

        assert!(watch_game(store.clone(), id.clone(), TICK).await.unwrap());

        let records = store
            .completed_games_for(&Player::from("ayse"))
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].end_reason, EndReason::Timeout);
    }

    #[tokio::test]
    async fn test_timeout_stands_when_archive_is_down() {
        let store = Arc::new(MemoryStore::new());
        let id = GameId::from("no-archive");
        store.insert(id.clone(), document(chrono::Duration::minutes(3)));
        store.fail_next_archives(ARCHIVE_ATTEMPTS);

        assert!(watch_game(store.clone(), id.clone(), TICK).await.unwrap());

        let stored = store.fetch(&id).await.unwrap().unwrap();
        assert_eq!(stored.end_reason, Some(EndReason::Timeout));
        assert!(store
            .completed_games_for(&Player::from("ayse"))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_missing_clock_is_pinned_once() {
        let store = Arc::new(MemoryStore::new());
        let id = GameId::from("unclocked");
        let mut unclocked = document(chrono::Duration::zero());
        unclocked.last_move_time = None;
        unclocked.created_at = None;
        store.insert(id.clone(), unclocked.clone());

        assert!(!enforce_clock(&*store, &id, &unclocked, TICK).await.unwrap());

        let pinned = store.fetch(&id).await.unwrap().unwrap().last_move_time;
        assert!(pinned.is_some());

        let stored = store.fetch(&id).await.unwrap().unwrap();
        assert!(!enforce_clock(&*store, &id, &stored, TICK).await.unwrap());
        assert_eq!(store.fetch(&id).await.unwrap().unwrap().last_move_time, pinned);
    }

    #[tokio::test]
    async fn test_sweep_starts_each_game_once() {
        let store = Arc::new(MemoryStore::new());
        store.insert(GameId::from("one"), document(chrono::Duration::zero()));
        store.insert(GameId::from("two"), document(chrono::Duration::zero()));

        let referee = Referee::new(store.clone(), TICK, Duration::from_secs(60));
        assert_eq!(referee.sweep().await.unwrap(), 2);
        assert_eq!(referee.sweep().await.unwrap(), 0);
        assert_eq!(referee.watching(), 2);

        store.insert(GameId::from("three"), document(chrono::Duration::zero()));
        assert_eq!(referee.sweep().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_sweep_ends_abandoned_game() {
        let store = Arc::new(MemoryStore::new());
        let id = GameId::from("abandoned");
        store.insert(id.clone(), document(chrono::Duration::minutes(10)));

        let referee = Referee::new(store.clone(), TICK, Duration::from_secs(60));
        assert_eq!(referee.sweep().await.unwrap(), 1);

        for _ in 0..100 {
            if referee.watching() == 0 {
                break;
            }
            time::sleep(TICK).await;
        }

        assert_eq!(referee.watching(), 0);
        assert!(store.active_games().await.unwrap().is_empty());
    }
}
