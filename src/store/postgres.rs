use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use parking_lot::Mutex;
use sqlx::{
    postgres::{PgListener, PgPoolOptions},
    types::Json,
    PgPool,
};
use tokio::sync::{watch, OnceCell};
use tracing::{debug, error, info};

use super::{CompletedGame, Error, GameDocument, GameId, GameStore, GameUpdate};
use crate::scrabble::Player;

/// Channel the `active_games` trigger notifies with the changed row's id.
static CHANGES_CHANNEL: &str = "game_changes";
const LISTENER_RETRY: Duration = Duration::from_secs(1);

type Subscribers = Arc<Mutex<HashMap<GameId, watch::Sender<GameDocument>>>>;

/// Game documents as JSONB rows. Partial updates are merged into the stored
/// document with `||`, so fields an update leaves out keep their value.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    subscribers: Subscribers,
    listener: Arc<OnceCell<()>>,
}

impl PgStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        Ok(Self::with_pool(pool))
    }

    pub fn with_pool(pool: PgPool) -> Self {
        PgStore {
            pool,
            subscribers: Default::default(),
            listener: Default::default(),
        }
    }

    pub async fn migrate(&self) -> Result<(), Error> {
        sqlx::migrate!().run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // one LISTEN connection per store, fanned out to every subscriber
    async fn ensure_listener(&self) -> Result<(), Error> {
        self.listener
            .get_or_try_init(|| async {
                let mut listener = PgListener::connect_with(&self.pool).await?;
                listener.listen(CHANGES_CHANNEL).await?;

                tokio::spawn(forward_changes(
                    listener,
                    self.pool.clone(),
                    self.subscribers.clone(),
                ));

                info!("listening for game changes on {:?}", CHANGES_CHANNEL);
                Ok::<(), Error>(())
            })
            .await?;

        Ok(())
    }

    async fn write(
        &self,
        id: &GameId,
        expected_turn: Option<&Player>,
        update: GameUpdate,
    ) -> Result<bool, Error> {
        let patch = serde_json::to_value(&update)?;
        let (hand_owner, hand) = match update.hand {
            Some(hand) => (Some(hand.player.to_string()), Some(Json(hand.tiles))),
            None => (None, None),
        };

        let result = sqlx::query(
            r#"
            UPDATE active_games
            SET doc = CASE
                    WHEN $3::text IS NULL THEN doc || $2
                    ELSE jsonb_set(
                        doc || $2,
                        '{hands}',
                        COALESCE(doc->'hands', '{}'::jsonb) || jsonb_build_object($3::text, $4::jsonb)
                    )
                END,
                updated_at = NOW()
            WHERE id = $1
                AND (
                    $5::text IS NULL
                    OR (doc->>'turn' = $5 AND COALESCE(doc->>'status', 'active') <> 'completed')
                )
            "#,
        )
        .bind(id.as_str())
        .bind(Json(patch))
        .bind(hand_owner)
        .bind(hand)
        .bind(expected_turn.map(Player::as_str))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }

        if fetch_document(&self.pool, id).await?.is_none() {
            return Err(Error::NotFound(id.clone()));
        }

        Ok(false)
    }
}

async fn fetch_document(pool: &PgPool, id: &GameId) -> Result<Option<GameDocument>, Error> {
    let doc: Option<serde_json::Value> =
        sqlx::query_scalar("SELECT doc FROM active_games WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(pool)
            .await?;

    match doc {
        Some(doc) => Ok(Some(serde_json::from_value(doc)?)),
        None => Ok(None),
    }
}

async fn forward_changes(mut listener: PgListener, pool: PgPool, subscribers: Subscribers) {
    loop {
        let notification = match listener.recv().await {
            Ok(notification) => notification,
            Err(e) => {
                error!("game change listener failed; e={:?}", e);
                tokio::time::sleep(LISTENER_RETRY).await;
                continue;
            }
        };

        let id = GameId::from(notification.payload());
        if !subscribers.lock().contains_key(&id) {
            continue;
        }

        let document = match fetch_document(&pool, &id).await {
            Ok(Some(document)) => document,
            Ok(None) => continue,
            Err(e) => {
                error!("could not reload game {}; e={:?}", id, e);
                continue;
            }
        };

        let mut watched = subscribers.lock();
        let closed = match watched.get(&id) {
            Some(sender) if sender.receiver_count() > 0 => {
                sender.send_replace(document);
                false
            }
            Some(_) => true,
            None => false,
        };

        if closed {
            debug!("no one is watching game {} any more", id);
            watched.remove(&id);
        }
    }
}

#[async_trait]
impl GameStore for PgStore {
    async fn create(&self, document: GameDocument) -> Result<GameId, Error> {
        let id = GameId::random();

        sqlx::query("INSERT INTO active_games (id, doc) VALUES ($1, $2)")
            .bind(id.as_str())
            .bind(Json(&document))
            .execute(&self.pool)
            .await?;

        debug!("created game {}", id);
        Ok(id)
    }

    async fn fetch(&self, id: &GameId) -> Result<Option<GameDocument>, Error> {
        fetch_document(&self.pool, id).await
    }

    async fn subscribe(&self, id: &GameId) -> Result<watch::Receiver<GameDocument>, Error> {
        self.ensure_listener().await?;

        let existing = self.subscribers.lock().get(id).map(watch::Sender::subscribe);
        if let Some(receiver) = existing {
            return Ok(receiver);
        }

        let document = fetch_document(&self.pool, id)
            .await?
            .ok_or_else(|| Error::NotFound(id.clone()))?;

        let receiver = self
            .subscribers
            .lock()
            .entry(id.clone())
            .or_insert_with(|| watch::channel(document).0)
            .subscribe();

        // a change may have landed between the read and registering the sender
        if let Some(latest) = fetch_document(&self.pool, id).await? {
            let subscribers = self.subscribers.lock();
            if let Some(sender) = subscribers.get(id) {
                sender.send_if_modified(|current| {
                    if *current == latest {
                        return false;
                    }
                    *current = latest;
                    true
                });
            }
        }

        Ok(receiver)
    }

    async fn update(&self, id: &GameId, update: GameUpdate) -> Result<(), Error> {
        self.write(id, None, update).await?;
        Ok(())
    }

    async fn update_if_turn(
        &self,
        id: &GameId,
        expected_turn: &Player,
        update: GameUpdate,
    ) -> Result<bool, Error> {
        self.write(id, Some(expected_turn), update).await
    }

    async fn append_completed(&self, record: CompletedGame) -> Result<(), Error> {
        sqlx::query(
            r#"
            INSERT INTO completed_games (game_id, doc, completed_at) VALUES ($1, $2, $3)
            ON CONFLICT (game_id) DO NOTHING
            "#,
        )
        .bind(record.game_id.as_str())
        .bind(Json(&record))
        .bind(record.completed_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn active_games(&self) -> Result<Vec<GameId>, Error> {
        let ids: Vec<String> = sqlx::query_scalar(
            "SELECT id FROM active_games WHERE COALESCE(doc->>'status', 'active') <> 'completed' ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(ids.into_iter().map(GameId::from).collect())
    }

    async fn completed_games_for(&self, player: &Player) -> Result<Vec<CompletedGame>, Error> {
        let docs: Vec<serde_json::Value> = sqlx::query_scalar(
            r#"
            SELECT doc FROM completed_games
            WHERE doc->'player1'->>'uid' = $1 OR doc->'player2'->>'uid' = $1
            ORDER BY completed_at DESC
            "#,
        )
        .bind(player.as_str())
        .fetch_all(&self.pool)
        .await?;

        docs.into_iter()
            .map(|doc| serde_json::from_value(doc).map_err(Error::from))
            .collect()
    }
}
