use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::dictionary::Lexicon;
use crate::scrabble::{
    self, Board, Game, PlacedTile, Player, Position, Tile, TileId, TileSet, TimeControl, TurnScore,
};
use crate::store::{self, CompletedGame, GameDocument, GameId, GameStore, GameUpdate, PlayerInfo};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Game(#[from] scrabble::Error),
    #[error(transparent)]
    Store(#[from] store::Error),
    #[error("the game changed before this action was saved")]
    Conflict,
    #[error("tile {0:?} is not in your hand")]
    NotInHand(TileId),
    #[error("game {0} not found")]
    NotFound(GameId),
}

/// One player's view of a match: the last snapshot from the store, the
/// committed game rebuilt from it, and the tiles laid down this turn.
pub struct Session<S: GameStore + ?Sized, L: Lexicon + ?Sized> {
    id: GameId,
    me: Player,
    store: Arc<S>,
    lexicon: Arc<L>,
    changes: watch::Receiver<GameDocument>,
    document: GameDocument,
    game: Game,
    pending: Vec<PlacedTile>,
    working: Board,
    unarchived: Option<CompletedGame>,
}

impl<S, L> Session<S, L>
where
    S: GameStore + ?Sized,
    L: Lexicon + ?Sized,
{
    pub async fn open(store: Arc<S>, lexicon: Arc<L>, id: GameId, me: Player) -> Result<Self, Error> {
        let mut changes = match store.subscribe(&id).await {
            Ok(changes) => changes,
            Err(store::Error::NotFound(id)) => return Err(Error::NotFound(id)),
            Err(e) => return Err(e.into()),
        };

        let document = changes.borrow_and_update().clone();
        let (game, pending) = document.to_game(Utc::now())?;
        game.index_of(&me)?;
        let working = lay_out(game.board(), &pending);

        debug!("{} opened game {}", me, id);

        Ok(Session {
            id,
            me,
            store,
            lexicon,
            changes,
            document,
            game,
            pending,
            working,
            unarchived: None,
        })
    }

    /// Deals a new match, stores it and opens it as `me`.
    pub async fn create(
        store: Arc<S>,
        lexicon: Arc<L>,
        player1: PlayerInfo,
        player2: PlayerInfo,
        tile_set: TileSet,
        time_control: TimeControl,
        me: Player,
    ) -> Result<Self, Error> {
        let document = GameDocument::start(player1, player2, tile_set, time_control, Utc::now());
        let id = store.create(document).await?;
        info!("created game {} ({:?}, {})", id, tile_set, time_control);

        Self::open(store, lexicon, id, me).await
    }

    pub fn id(&self) -> &GameId {
        &self.id
    }

    pub fn me(&self) -> &Player {
        &self.me
    }

    pub fn game(&self) -> &Game {
        &self.game
    }

    pub fn document(&self) -> &GameDocument {
        &self.document
    }

    pub fn pending(&self) -> &[PlacedTile] {
        &self.pending
    }

    /// The committed board with this turn's placements on it.
    pub fn working_board(&self) -> &Board {
        &self.working
    }

    /// False while the record of a game this session ended is still waiting
    /// to be written.
    pub fn is_archived(&self) -> bool {
        self.unarchived.is_none()
    }

    pub fn is_my_turn(&self) -> bool {
        !self.game.is_over() && self.game.turn() == &self.me
    }

    /// My rack minus whatever I have laid down this turn.
    pub fn hand(&self) -> Vec<Tile> {
        let rack = self.game.rack(&self.me).cloned().unwrap_or_default();
        if self.game.turn() != &self.me {
            return rack;
        }

        rack.into_iter()
            .filter(|tile| !self.pending.iter().any(|placed| placed.tile.id == tile.id))
            .collect()
    }

    pub fn clock(&self, now: DateTime<Utc>) -> String {
        let control = self.game.time_control();
        control.format_remaining(self.game.time_remaining(now))
    }

    /// Replaces local state with `document`. Returns false when it is the
    /// snapshot already applied.
    pub fn apply_snapshot(&mut self, document: GameDocument) -> Result<bool, Error> {
        if document == self.document {
            return Ok(false);
        }

        let (game, pending) = document.to_game(Utc::now())?;
        self.working = lay_out(game.board(), &pending);
        self.game = game;
        self.pending = pending;
        self.document = document;

        debug!("{} applied a new snapshot of game {}", self.me, self.id);
        Ok(true)
    }

    /// Applies the latest pushed snapshot, if there is a new one.
    pub fn sync(&mut self) -> Result<bool, Error> {
        match self.changes.has_changed() {
            Ok(true) => {
                let document = self.changes.borrow_and_update().clone();
                self.apply_snapshot(document)
            }
            Ok(false) => Ok(false),
            Err(_) => Err(store::Error::Unavailable("subscription closed".into()).into()),
        }
    }

    /// Waits for the next pushed snapshot and applies it.
    pub async fn changed(&mut self) -> Result<bool, Error> {
        if self.changes.changed().await.is_err() {
            return Err(store::Error::Unavailable("subscription closed".into()).into());
        }

        let document = self.changes.borrow_and_update().clone();
        self.apply_snapshot(document)
    }

    /// Reads the document straight from the store.
    pub async fn resync(&mut self) -> Result<bool, Error> {
        let document = self
            .store
            .fetch(&self.id)
            .await?
            .ok_or_else(|| Error::NotFound(self.id.clone()))?;

        self.apply_snapshot(document)
    }

    pub async fn place_tile(&mut self, tile_id: TileId, row: usize, col: usize) -> Result<(), Error> {
        self.game.ensure_turn(&self.me)?;

        let tile = self
            .hand()
            .into_iter()
            .find(|tile| tile.id == tile_id)
            .ok_or(Error::NotInHand(tile_id))?;

        self.working.place(tile.letter, row, col)?;
        self.pending.push(PlacedTile::new(tile, row, col));

        self.write_placements().await
    }

    /// Takes a tile laid down this turn back into the hand.
    pub async fn recall(&mut self, row: usize, col: usize) -> Result<(), Error> {
        self.game.ensure_turn(&self.me)?;

        let position = Position::new(row, col);
        let index = match self.pending.iter().position(|p| p.position() == position) {
            Some(index) => index,
            None => return Ok(()),
        };

        self.pending.remove(index);
        self.working.lift(position);

        self.write_placements().await
    }

    /// Scores this turn's placements without committing anything.
    pub fn preview(&self) -> Result<TurnScore, Error> {
        Ok(self.game.propose(&self.me, &self.pending, &*self.lexicon)?)
    }

    /// Confirms this turn's placements. A rejected move puts the tiles back
    /// in the hand and clears them from the board.
    pub async fn confirm(&mut self) -> Result<TurnScore, Error> {
        let mut next = self.game.clone();

        match next.play(&self.me, &self.pending, &*self.lexicon, Utc::now()) {
            Ok(score) => {
                let update = GameUpdate::turn_state(&next, &self.me)?;
                self.commit(next, update).await?;
                Ok(score)
            }
            Err(e @ scrabble::Error::InvalidMove(_)) => {
                warn!("{} played an invalid move in game {}: {}", self.me, self.id, e);
                self.roll_back().await;
                Err(e.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn pass(&mut self) -> Result<(), Error> {
        let mut next = self.game.clone();
        next.pass(&self.me, Utc::now())?;

        let update = GameUpdate::turn_state(&next, &self.me)?;
        self.commit(next, update).await
    }

    pub async fn surrender(&mut self) -> Result<(), Error> {
        let mut next = self.game.clone();
        next.surrender(&self.me, Utc::now())?;

        let update = GameUpdate::turn_state(&next, &self.me)?;
        self.commit(next, update).await
    }

    /// Clock check, run once a second while the session is open. Returns
    /// whether this call ended the game. Also retries a completed-game record
    /// that could not be written earlier.
    pub async fn tick(&mut self) -> Result<bool, Error> {
        self.flush_archive().await;

        let mut next = self.game.clone();
        if !next.check_timeout(Utc::now()) {
            return Ok(false);
        }

        let update = GameUpdate::completion(&next);
        self.commit(next, update).await?;
        Ok(true)
    }

    async fn write_placements(&mut self) -> Result<(), Error> {
        let update =
            GameUpdate::placement(&self.working, &self.me, self.hand(), self.pending.clone());

        match self.store.update_if_turn(&self.id, &self.me, update.clone()).await {
            Ok(true) => {
                self.document.apply(&update);
                Ok(())
            }
            Ok(false) => {
                warn!("turn moved on under {} in game {}", self.me, self.id);
                self.resync().await?;
                Err(Error::Conflict)
            }
            Err(e) => {
                error!("could not save placements for game {}; e={:?}", self.id, e);
                Err(e.into())
            }
        }
    }

    async fn roll_back(&mut self) {
        self.pending.clear();
        self.working = self.game.board().clone();

        if let Err(e) = self.write_placements().await {
            warn!("could not clear placements for game {}; e={:?}", self.id, e);
        }
    }

    // compare-and-set on the turn this session last saw
    async fn commit(&mut self, next: Game, update: GameUpdate) -> Result<(), Error> {
        let expected = self.game.turn().clone();

        let applied = match self.store.update_if_turn(&self.id, &expected, update.clone()).await {
            Ok(applied) => applied,
            Err(e) => {
                error!("could not save game {}; e={:?}", self.id, e);
                return Err(e.into());
            }
        };

        if !applied {
            warn!("lost the race to update game {}; resyncing", self.id);
            self.resync().await?;
            return Err(Error::Conflict);
        }

        self.document.apply(&update);
        self.working = next.board().clone();
        self.pending.clear();
        self.game = next;

        // the action is saved; a failed archive is retried on the next tick
        if let Some(record) = CompletedGame::new(self.id.clone(), &self.document, &self.game) {
            info!(
                "game {} completed ({}); winner={:?}",
                self.id, record.end_reason, record.winner
            );
            self.unarchived = Some(record);
            self.flush_archive().await;
        }

        Ok(())
    }

    async fn flush_archive(&mut self) {
        let record = match &self.unarchived {
            Some(record) => record.clone(),
            None => return,
        };

        match self.store.append_completed(record).await {
            Ok(()) => self.unarchived = None,
            Err(e) => error!("could not archive game {}; e={:?}", self.id, e),
        }
    }
}

fn lay_out(board: &Board, placed: &[PlacedTile]) -> Board {
    let mut working = board.clone();
    for tile in placed {
        if let Err(e) = working.place(tile.tile.letter, tile.row, tile.col) {
            warn!("dropping stale placement at ({}, {}): {}", tile.row, tile.col, e);
        }
    }
    working
}
