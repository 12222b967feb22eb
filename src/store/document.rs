use std::collections::BTreeMap;

use chrono::{
    serde::{ts_milliseconds, ts_milliseconds_option},
    DateTime, Utc,
};
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::GameId;
use crate::scrabble::{
    Bag, Board, EndReason, Error, Game, PlacedTile, Player, State, Tile, TileSet, TimeControl,
};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PlayerInfo {
    pub uid: Player,
    pub username: String,
}

impl PlayerInfo {
    pub fn new(uid: impl Into<Player>, username: impl Into<String>) -> Self {
        PlayerInfo {
            uid: uid.into(),
            username: username.into(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GameStatus {
    #[default]
    Active,
    Completed,
}

fn standard_board() -> Vec<String> {
    Board::standard().flatten()
}

/// The shared record of one match, as both clients see it.
///
/// `board_data` includes the tiles the player to move has laid down but not
/// yet confirmed; those same tiles are listed in `placed_tiles` and are
/// missing from that player's hand.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GameDocument {
    pub player1: PlayerInfo,
    pub player2: PlayerInfo,
    #[serde(default)]
    pub selected_time: TimeControl,
    #[serde(default)]
    pub tile_set: TileSet,
    #[serde(default = "standard_board")]
    pub board_data: Vec<String>,
    #[serde(default)]
    pub tile_bag: Vec<Tile>,
    #[serde(default)]
    pub hands: BTreeMap<Player, Vec<Tile>>,
    #[serde(default)]
    pub player1_score: u32,
    #[serde(default)]
    pub player2_score: u32,
    pub turn: Player,
    #[serde(default, with = "ts_milliseconds_option")]
    pub last_move_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub consecutive_passes: BTreeMap<Player, u32>,
    #[serde(default)]
    pub placed_tiles: Vec<PlacedTile>,
    #[serde(default)]
    pub status: GameStatus,
    #[serde(default)]
    pub winner: Option<Player>,
    #[serde(default)]
    pub end_reason: Option<EndReason>,
    #[serde(default, with = "ts_milliseconds_option")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default, with = "ts_milliseconds_option")]
    pub created_at: Option<DateTime<Utc>>,
}

impl GameDocument {
    /// Deals a new match between two players. Player one moves first.
    pub fn start(
        player1: PlayerInfo,
        player2: PlayerInfo,
        tile_set: TileSet,
        time_control: TimeControl,
        now: DateTime<Utc>,
    ) -> Self {
        let game = Game::new(
            [player1.uid.clone(), player2.uid.clone()],
            tile_set,
            time_control,
            now,
        );

        Self::from_game(player1, player2, &game, now)
    }

    pub fn from_game(
        player1: PlayerInfo,
        player2: PlayerInfo,
        game: &Game,
        now: DateTime<Utc>,
    ) -> Self {
        let [first, second] = &game.players;
        let (winner, end_reason) = match &game.state {
            State::Active => (None, None),
            State::Over { reason, winner } => (winner.clone(), Some(*reason)),
        };

        GameDocument {
            player1,
            player2,
            selected_time: game.time_control,
            tile_set: game.tile_set,
            board_data: game.board.flatten(),
            tile_bag: game.bag.tiles().to_vec(),
            hands: BTreeMap::from([
                (first.clone(), game.racks[0].clone()),
                (second.clone(), game.racks[1].clone()),
            ]),
            player1_score: game.scores[0],
            player2_score: game.scores[1],
            turn: game.turn().clone(),
            last_move_time: Some(game.last_move_at),
            consecutive_passes: BTreeMap::from([
                (first.clone(), game.consecutive_passes[0]),
                (second.clone(), game.consecutive_passes[1]),
            ]),
            placed_tiles: Vec::new(),
            status: if game.is_over() {
                GameStatus::Completed
            } else {
                GameStatus::Active
            },
            winner,
            end_reason,
            ended_at: game.ended_at,
            created_at: Some(now),
        }
    }

    pub fn players(&self) -> [&Player; 2] {
        [&self.player1.uid, &self.player2.uid]
    }

    pub fn is_completed(&self) -> bool {
        self.status == GameStatus::Completed
    }

    pub fn hand_of(&self, player: &Player) -> Vec<Tile> {
        self.hands.get(player).cloned().unwrap_or_default()
    }

    /// Rebuilds the committed game. In-progress placements are lifted off the
    /// board and handed back to the player to move; they are returned
    /// separately so a session can lay them out again. A game with no
    /// `lastMoveTime` is timed from `createdAt`, or from `now` if both are
    /// missing.
    pub fn to_game(&self, now: DateTime<Utc>) -> Result<(Game, Vec<PlacedTile>), Error> {
        let mut board = Board::unflatten(&self.board_data)?;
        for placed in &self.placed_tiles {
            board.lift(placed.position());
        }

        let players = [self.player1.uid.clone(), self.player2.uid.clone()];
        let player_index = players
            .iter()
            .position(|player| *player == self.turn)
            .ok_or_else(|| Error::UnknownPlayer(self.turn.clone()))?;

        let mut racks = [self.hand_of(&players[0]), self.hand_of(&players[1])];
        racks[player_index].extend(self.placed_tiles.iter().map(|placed| placed.tile.clone()));

        let passes = |player: &Player| self.consecutive_passes.get(player).copied().unwrap_or(0);
        let consecutive_passes = [passes(&players[0]), passes(&players[1])];

        let state = match self.status {
            GameStatus::Active => State::Active,
            GameStatus::Completed => State::Over {
                reason: self.end_reason.unwrap_or(EndReason::Completed),
                winner: self.winner.clone(),
            },
        };

        let game = Game {
            board,
            players,
            player_index,
            bag: Bag::from(self.tile_bag.clone()),
            racks,
            scores: [self.player1_score, self.player2_score],
            consecutive_passes,
            state,
            time_control: self.selected_time,
            tile_set: self.tile_set,
            last_move_at: self.last_move_time.or(self.created_at).unwrap_or(now),
            ended_at: self.ended_at,
            rng: StdRng::from_os_rng(),
        };

        Ok((game, self.placed_tiles.clone()))
    }

    pub fn apply(&mut self, update: &GameUpdate) {
        if let Some(board_data) = &update.board_data {
            self.board_data = board_data.clone();
        }
        if let Some(tile_bag) = &update.tile_bag {
            self.tile_bag = tile_bag.clone();
        }
        if let Some(hand) = &update.hand {
            self.hands.insert(hand.player.clone(), hand.tiles.clone());
        }
        if let Some(score) = update.player1_score {
            self.player1_score = score;
        }
        if let Some(score) = update.player2_score {
            self.player2_score = score;
        }
        if let Some(turn) = &update.turn {
            self.turn = turn.clone();
        }
        if let Some(time) = update.last_move_time {
            self.last_move_time = Some(time);
        }
        if let Some(passes) = &update.consecutive_passes {
            self.consecutive_passes = passes.clone();
        }
        if let Some(placed_tiles) = &update.placed_tiles {
            self.placed_tiles = placed_tiles.clone();
        }
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(winner) = &update.winner {
            self.winner = Some(winner.clone());
        }
        if let Some(reason) = update.end_reason {
            self.end_reason = Some(reason);
        }
        if let Some(ended_at) = update.ended_at {
            self.ended_at = Some(ended_at);
        }
    }
}

/// One player's hand. Kept out of the serialized patch so a store has to
/// write it into `hands` by key rather than replacing the whole map.
#[derive(Debug, Clone, PartialEq)]
pub struct HandUpdate {
    pub player: Player,
    pub tiles: Vec<Tile>,
}

/// A partial write. Serializes to a JSON object holding only the fields that
/// are set.
#[derive(Serialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GameUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub board_data: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tile_bag: Option<Vec<Tile>>,
    #[serde(skip)]
    pub hand: Option<HandUpdate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player1_score: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player2_score: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn: Option<Player>,
    #[serde(skip_serializing_if = "Option::is_none", with = "ts_milliseconds_option")]
    pub last_move_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consecutive_passes: Option<BTreeMap<Player, u32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placed_tiles: Option<Vec<PlacedTile>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<GameStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner: Option<Player>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_reason: Option<EndReason>,
    #[serde(skip_serializing_if = "Option::is_none", with = "ts_milliseconds_option")]
    pub ended_at: Option<DateTime<Utc>>,
}

impl GameUpdate {
    /// A tile laid down or picked back up during the turn in progress.
    pub fn placement(
        board: &Board,
        player: &Player,
        hand: Vec<Tile>,
        placed: Vec<PlacedTile>,
    ) -> Self {
        GameUpdate {
            board_data: Some(board.flatten()),
            hand: Some(HandUpdate {
                player: player.clone(),
                tiles: hand,
            }),
            placed_tiles: Some(placed),
            ..Default::default()
        }
    }

    /// Everything a confirmed move, pass or surrender by `actor` changes.
    /// The opponent's hand is never included.
    pub fn turn_state(game: &Game, actor: &Player) -> Result<Self, Error> {
        let hand = game.rack(actor)?.clone();
        let [first, second] = &game.players;

        Ok(GameUpdate {
            board_data: Some(game.board.flatten()),
            tile_bag: Some(game.bag.tiles().to_vec()),
            hand: Some(HandUpdate {
                player: actor.clone(),
                tiles: hand,
            }),
            player1_score: Some(game.scores[0]),
            player2_score: Some(game.scores[1]),
            turn: Some(game.turn().clone()),
            last_move_time: Some(game.last_move_at),
            consecutive_passes: Some(BTreeMap::from([
                (first.clone(), game.consecutive_passes[0]),
                (second.clone(), game.consecutive_passes[1]),
            ])),
            placed_tiles: Some(Vec::new()),
            ..Self::completion(game)
        })
    }

    /// Status fields only; empty while the game is still running.
    pub fn completion(game: &Game) -> Self {
        match &game.state {
            State::Active => GameUpdate::default(),
            State::Over { reason, winner } => GameUpdate {
                status: Some(GameStatus::Completed),
                winner: winner.clone(),
                end_reason: Some(*reason),
                ended_at: game.ended_at,
                ..Default::default()
            },
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == GameUpdate::default()
    }
}

/// Summary written once when a match ends.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CompletedGame {
    pub game_id: GameId,
    pub player1: PlayerInfo,
    pub player2: PlayerInfo,
    pub player1_score: u32,
    pub player2_score: u32,
    #[serde(default)]
    pub winner: Option<Player>,
    pub end_reason: EndReason,
    #[serde(default = "completed")]
    pub status: GameStatus,
    #[serde(with = "ts_milliseconds")]
    pub completed_at: DateTime<Utc>,
    #[serde(default)]
    pub selected_time: TimeControl,
}

fn completed() -> GameStatus {
    GameStatus::Completed
}

impl CompletedGame {
    /// `None` while `game` is still running.
    pub fn new(game_id: GameId, document: &GameDocument, game: &Game) -> Option<Self> {
        let (end_reason, winner) = match &game.state {
            State::Active => return None,
            State::Over { reason, winner } => (*reason, winner.clone()),
        };

        Some(CompletedGame {
            game_id,
            player1: document.player1.clone(),
            player2: document.player2.clone(),
            player1_score: game.scores[0],
            player2_score: game.scores[1],
            winner,
            end_reason,
            status: GameStatus::Completed,
            completed_at: game.ended_at.unwrap_or_else(Utc::now),
            selected_time: game.time_control,
        })
    }

    pub fn involves(&self, player: &Player) -> bool {
        self.player1.uid == *player || self.player2.uid == *player
    }
}
