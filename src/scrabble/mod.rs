use std::{collections::HashMap, collections::HashSet, fmt};

use chrono::{DateTime, Duration, Utc};
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::dictionary::Lexicon;

pub mod board;
pub mod clock;
pub mod score;
pub mod tile;
pub mod validate;
pub mod words;

pub use board::{Board, Direction, GetLetter, Overlay, PlacedTile, Position, Premium, BOARD_SIZE};
pub use clock::TimeControl;
pub use score::TurnScore;
pub use tile::{Bag, Letter, Rack, Tile, TileId, TileSet, RACK_SIZE};
pub use validate::{MoveValidator, Rejection};
pub use words::Word;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("invalid move: {0}")]
    InvalidMove(#[from] Rejection),
    #[error("it is not your turn")]
    NotYourTurn,
    #[error("the game is over")]
    GameOver,
    #[error("({row}, {col}) is off the board")]
    OutOfBounds { row: usize, col: usize },
    #[error("({row}, {col}) is already occupied")]
    CellOccupied { row: usize, col: usize },
    #[error("no {0} tile to spend")]
    NoTileToSpend(Letter),
    #[error("{0} is not playing this game")]
    UnknownPlayer(Player),
    #[error("could not read board: {0}")]
    BoardParse(String),
}

/// Opaque player id handed to us by the identity provider.
#[derive(Debug, Serialize, Deserialize, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct Player(String);

impl Player {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Player {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Player {
    fn from(id: &str) -> Self {
        Player(id.to_owned())
    }
}

impl From<String> for Player {
    fn from(id: String) -> Self {
        Player(id)
    }
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Hash, Copy, Clone)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    Timeout,
    Surrender,
    ConsecutivePasses,
    /// Bag and the mover's rack both ran out.
    Completed,
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            EndReason::Timeout => "timeout",
            EndReason::Surrender => "surrender",
            EndReason::ConsecutivePasses => "consecutive_passes",
            EndReason::Completed => "completed",
        };
        f.write_str(reason)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum State {
    #[default]
    Active,
    Over {
        reason: EndReason,
        winner: Option<Player>,
    },
}

#[derive(Clone)]
pub struct Game {
    pub(crate) board: Board,
    pub(crate) players: [Player; 2],
    pub(crate) player_index: usize,
    pub(crate) bag: Bag,
    pub(crate) racks: [Rack; 2],
    pub(crate) scores: [u32; 2],
    pub(crate) consecutive_passes: [u32; 2],
    pub(crate) state: State,
    pub(crate) time_control: TimeControl,
    pub(crate) tile_set: TileSet,
    pub(crate) last_move_at: DateTime<Utc>,
    pub(crate) ended_at: Option<DateTime<Utc>>,
    pub(crate) rng: StdRng,
}

impl fmt::Debug for Game {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Game")
            .field("players", &self.players)
            .field("racks", &self.racks)
            .field("player_index", &self.player_index)
            .field("bag", &self.bag.len())
            .field("scores", &self.scores)
            .field("consecutive_passes", &self.consecutive_passes)
            .field("state", &self.state)
            .field("time_control", &self.time_control)
            .finish()?;

        f.write_str("\n")?;
        f.write_str(&self.board.to_string())
    }
}

impl Game {
    /// Fills a fresh bag and deals both racks. The first player moves first.
    pub fn new(
        players: [Player; 2],
        tile_set: TileSet,
        time_control: TimeControl,
        now: DateTime<Utc>,
    ) -> Self {
        Self::with_rng(players, tile_set, time_control, now, StdRng::from_os_rng())
    }

    pub fn with_rng(
        players: [Player; 2],
        tile_set: TileSet,
        time_control: TimeControl,
        now: DateTime<Utc>,
        mut rng: StdRng,
    ) -> Self {
        let mut bag = Bag::standard(tile_set, &mut rng);
        let racks = [
            bag.draw(RACK_SIZE, &mut rng),
            bag.draw(RACK_SIZE, &mut rng),
        ];

        Game {
            board: Board::standard(),
            players,
            player_index: 0,
            bag,
            racks,
            scores: [0, 0],
            consecutive_passes: [0, 0],
            state: State::Active,
            time_control,
            tile_set,
            last_move_at: now,
            ended_at: None,
            rng,
        }
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn bag(&self) -> &Bag {
        &self.bag
    }

    pub fn players(&self) -> &[Player; 2] {
        &self.players
    }

    pub fn turn(&self) -> &Player {
        &self.players[self.player_index]
    }

    pub fn opponent_of(&self, player: &Player) -> Result<&Player, Error> {
        let index = self.index_of(player)?;
        Ok(&self.players[1 - index])
    }

    pub fn rack(&self, player: &Player) -> Result<&Rack, Error> {
        Ok(&self.racks[self.index_of(player)?])
    }

    pub fn score(&self, player: &Player) -> Result<u32, Error> {
        Ok(self.scores[self.index_of(player)?])
    }

    pub fn scores(&self) -> [u32; 2] {
        self.scores
    }

    pub fn consecutive_passes(&self, player: &Player) -> Result<u32, Error> {
        Ok(self.consecutive_passes[self.index_of(player)?])
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn is_over(&self) -> bool {
        matches!(self.state, State::Over { .. })
    }

    pub fn time_control(&self) -> TimeControl {
        self.time_control
    }

    pub fn tile_set(&self) -> TileSet {
        self.tile_set
    }

    pub fn last_move_at(&self) -> DateTime<Utc> {
        self.last_move_at
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    pub fn is_first_move(&self) -> bool {
        !self.board.has_letters()
    }

    pub fn time_remaining(&self, now: DateTime<Utc>) -> Duration {
        self.time_control.remaining(self.last_move_at, now)
    }

    pub fn index_of(&self, player: &Player) -> Result<usize, Error> {
        self.players
            .iter()
            .position(|p| p == player)
            .ok_or_else(|| Error::UnknownPlayer(player.clone()))
    }

    /// Index of `player` if the game is running and it is their move.
    pub fn ensure_turn(&self, player: &Player) -> Result<usize, Error> {
        if self.is_over() {
            return Err(Error::GameOver);
        }

        let index = self.index_of(player)?;
        if index != self.player_index {
            return Err(Error::NotYourTurn);
        }

        Ok(index)
    }

    /// Scores a move without changing anything.
    pub fn propose<L: Lexicon + ?Sized>(
        &self,
        player: &Player,
        placed: &[PlacedTile],
        lexicon: &L,
    ) -> Result<TurnScore, Error> {
        let index = self.ensure_turn(player)?;
        Self::spend_tiles_inner(placed, self.racks[index].clone())?;
        self.check_placement(placed)?;

        let after = Overlay {
            board: &self.board,
            placed,
        };
        let words = MoveValidator::new(lexicon, self.tile_set).validate(
            &self.board,
            &after,
            placed,
            self.is_first_move(),
        )?;

        Ok(score::score_turn(&self.board, &words))
    }

    /// Confirms a move. Every check runs before anything is written, so a
    /// rejected move leaves the game exactly as it was.
    pub fn play<L: Lexicon + ?Sized>(
        &mut self,
        player: &Player,
        placed: &[PlacedTile],
        lexicon: &L,
        now: DateTime<Utc>,
    ) -> Result<TurnScore, Error> {
        let index = self.ensure_turn(player)?;
        let rack = Self::spend_tiles_inner(placed, self.racks[index].clone())?;
        let board = self.lay_tiles(placed)?;

        let words = MoveValidator::new(lexicon, self.tile_set).validate(
            &self.board,
            &board,
            placed,
            self.is_first_move(),
        )?;
        let score = score::score_turn(&self.board, &words);

        self.board = board;
        self.racks[index] = rack;
        self.scores[index] += score.total();
        self.consecutive_passes[index] = 0;
        self.draw_into(index, placed.len());
        self.last_move_at = now;
        self.next_player();

        debug!(
            "{} scored {} with {:?}; {} tiles left in the bag",
            player,
            score.total(),
            score.scores,
            self.bag.len()
        );

        self.check_game_over(index, now);
        Ok(score)
    }

    /// The game ends when the passer has now passed twice, or when the
    /// opponent's last action was a pass too. Either way the passer loses.
    pub fn pass(&mut self, player: &Player, now: DateTime<Utc>) -> Result<(), Error> {
        let index = self.ensure_turn(player)?;
        let opponent = 1 - index;

        self.consecutive_passes[index] += 1;
        self.last_move_at = now;
        self.next_player();

        if self.consecutive_passes[index] >= 2 || self.consecutive_passes[opponent] >= 1 {
            let winner = self.players[opponent].clone();
            self.finish(EndReason::ConsecutivePasses, Some(winner), now);
        }

        Ok(())
    }

    pub fn surrender(&mut self, player: &Player, now: DateTime<Utc>) -> Result<(), Error> {
        let index = self.ensure_turn(player)?;
        let winner = self.players[1 - index].clone();
        self.finish(EndReason::Surrender, Some(winner), now);

        Ok(())
    }

    /// Ends the game if the player to move has run out of time. Returns
    /// whether this call ended it.
    pub fn check_timeout(&mut self, now: DateTime<Utc>) -> bool {
        if self.is_over() || !self.time_control.is_expired(self.last_move_at, now) {
            return false;
        }

        let winner = self.players[1 - self.player_index].clone();
        self.finish(EndReason::Timeout, Some(winner), now);
        true
    }

    /// Count of every letter across bag, racks and board.
    pub fn letter_totals(&self) -> HashMap<Letter, u32> {
        let mut totals = self.bag.letter_counts();
        for tile in self.racks.iter().flatten() {
            *totals.entry(tile.letter).or_insert(0) += 1;
        }
        for (_, letter) in self.board.letters() {
            *totals.entry(letter).or_insert(0) += 1;
        }
        totals
    }

    fn finish(&mut self, reason: EndReason, winner: Option<Player>, now: DateTime<Utc>) {
        info!(
            "game between {} and {} over ({}); winner={:?} scores={:?}",
            self.players[0], self.players[1], reason, winner, self.scores
        );

        self.state = State::Over { reason, winner };
        self.ended_at = Some(now);
    }

    fn check_game_over(&mut self, mover: usize, now: DateTime<Utc>) {
        if !self.bag.is_empty() || !self.racks[mover].is_empty() {
            return;
        }

        let winner = match self.scores[0].cmp(&self.scores[1]) {
            std::cmp::Ordering::Greater => Some(self.players[0].clone()),
            std::cmp::Ordering::Less => Some(self.players[1].clone()),
            std::cmp::Ordering::Equal => None,
        };

        self.finish(EndReason::Completed, winner, now);
    }

    fn check_placement(&self, placed: &[PlacedTile]) -> Result<(), Error> {
        let mut seen = HashSet::new();

        for tile in placed {
            if !Position::in_bounds(tile.row, tile.col) {
                return Err(Error::OutOfBounds {
                    row: tile.row,
                    col: tile.col,
                });
            }

            if !self.board.is_empty(tile.row, tile.col) || !seen.insert(tile.position()) {
                return Err(Error::CellOccupied {
                    row: tile.row,
                    col: tile.col,
                });
            }
        }

        Ok(())
    }

    fn lay_tiles(&self, placed: &[PlacedTile]) -> Result<Board, Error> {
        let mut board = self.board.clone();
        for tile in placed {
            board.place(tile.tile.letter, tile.row, tile.col)?;
        }
        Ok(board)
    }

    // one replacement per tile played, capped by what is left in the bag
    fn draw_into(&mut self, index: usize, count: usize) {
        let drawn = self.bag.draw(count, &mut self.rng);
        self.racks[index].extend(drawn);
    }

    fn next_player(&mut self) {
        self.player_index += 1;
        self.player_index %= self.players.len();
    }

    fn spend_tiles_inner(placed: &[PlacedTile], mut rack: Rack) -> Result<Rack, Error> {
        for placed_tile in placed {
            let index = rack
                .iter()
                .position(|rack_tile| rack_tile.id == placed_tile.tile.id)
                .ok_or(Error::NoTileToSpend(placed_tile.tile.letter))?;

            rack.remove(index);
        }
        Ok(rack)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::dictionary::Dictionary;
    use crate::scrabble::tile::l;

    fn players() -> [Player; 2] {
        [Player::from("frankie"), Player::from("ada")]
    }

    fn dictionary() -> Dictionary {
        Dictionary::from_words(["MAR", "TAX", "MA", "AX", "TIL", "AT"], TileSet::English)
    }

    fn test_game() -> Game {
        Game::with_rng(
            players(),
            TileSet::English,
            TimeControl::FiveMinutes,
            Utc::now(),
            StdRng::seed_from_u64(42),
        )
    }

    fn tile(letter: Letter) -> Tile {
        Tile::new(letter, TileSet::English)
    }

    fn rack_of(letters: &str) -> Rack {
        letters.chars().map(|c| tile(l!(c))).collect()
    }

    // picks tiles out of the rack by letter, so ids line up
    fn placements(game: &Game, index: usize, cells: &[(char, usize, usize)]) -> Vec<PlacedTile> {
        let mut rack = game.racks[index].clone();
        cells
            .iter()
            .map(|(letter, row, col)| {
                let at = rack
                    .iter()
                    .position(|t| t.letter == l!(*letter))
                    .unwrap();
                PlacedTile::new(rack.remove(at), *row, *col)
            })
            .collect()
    }

    fn assert_conserved(game: &Game) {
        let totals = game.letter_totals();
        for (letter, count, _) in TileSet::English.distribution() {
            assert_eq!(totals.get(letter).copied().unwrap_or(0), *count, "{:?}", letter);
        }
    }

    #[test]
    fn test_new_game_deals_two_racks() {
        let game = test_game();

        assert_eq!(game.racks[0].len(), RACK_SIZE);
        assert_eq!(game.racks[1].len(), RACK_SIZE);
        assert_eq!(game.bag.len(), 100 - 14);
        assert_eq!(game.turn(), &Player::from("frankie"));
        assert!(game.is_first_move());
        assert_conserved(&game);
    }

    #[test]
    fn test_game_play() {
        let mut game = test_game();
        let dictionary = dictionary();
        let [frankie, ada] = players();
        let now = Utc::now();

        game.racks[0] = rack_of("MARSTIL");
        game.racks[1] = rack_of("TAXEISP");

        let turn_a = placements(&game, 0, &[('M', 7, 7), ('A', 7, 8), ('R', 7, 9)]);
        let proposed = game.propose(&frankie, &turn_a, &dictionary).unwrap();
        let score = game.play(&frankie, &turn_a, &dictionary, now).unwrap();

        assert_eq!(proposed, score);
        assert_eq!(score.scores, vec![("MAR".to_owned(), 3 + 1 + 1)]);
        assert_eq!(game.scores, [5, 0]);
        assert_eq!(game.turn(), &ada);
        assert_eq!(game.racks[0].len(), RACK_SIZE);
        assert!(!game.is_first_move());

        // TAX under MA_, forming MA and AX as cross words
        let turn_b = placements(&game, 1, &[('T', 8, 6), ('A', 8, 7), ('X', 8, 8)]);
        let score = game.play(&ada, &turn_b, &dictionary, now).unwrap();

        // (8, 6) and (8, 8) are double letter cells
        assert_eq!(
            score.scores,
            vec![
                ("TAX".to_string(), 2 + 1 + 16),
                ("MA".to_string(), 3 + 1),
                ("AX".to_string(), 1 + 16),
            ]
        );
        assert_eq!(game.turn(), &frankie);
    }

    #[test]
    fn test_draws_one_tile_per_tile_played() {
        let mut game = test_game();
        let dictionary = dictionary();
        let [frankie, _] = players();

        // a short rack stays short by the same amount
        game.racks[0] = rack_of("MAR");
        let bag_before = game.bag.len();

        let turn = placements(&game, 0, &[('M', 7, 7), ('A', 7, 8)]);
        game.play(&frankie, &turn, &dictionary, Utc::now()).unwrap();

        assert_eq!(game.racks[0].len(), 3);
        assert_eq!(game.bag.len(), bag_before - 2);
    }

    // bag contents that bring bag + racks back to the full distribution
    fn refill(game: &Game) -> Vec<Tile> {
        let mut held: HashMap<Letter, u32> = HashMap::new();
        for tile in game.racks.iter().flatten() {
            *held.entry(tile.letter).or_insert(0) += 1;
        }

        let mut bag = Vec::new();
        for (letter, count, _) in TileSet::English.distribution() {
            let in_racks = held.get(letter).copied().unwrap_or(0);
            bag.extend((in_racks..*count).map(|_| tile(*letter)));
        }
        bag
    }

    #[test]
    fn test_conservation_through_moves() {
        let mut game = test_game();
        let dictionary = Dictionary::from_words(["AT", "ATE"], TileSet::English);
        let [frankie, ada] = players();
        let now = Utc::now();

        game.racks[0] = rack_of("ATEEEEE");
        game.racks[1] = rack_of("NRSUOEI");
        game.bag = Bag::from(refill(&game));
        assert_conserved(&game);

        let turn = placements(&game, 0, &[('A', 7, 7), ('T', 7, 8)]);
        game.play(&frankie, &turn, &dictionary, now).unwrap();
        assert_conserved(&game);

        game.pass(&ada, now).unwrap();
        let turn = placements(&game, 0, &[('E', 7, 9)]);
        game.play(&frankie, &turn, &dictionary, now).unwrap();
        assert_conserved(&game);
        assert_eq!(game.bag.len(), 100 - 14 - 3);
    }

    #[test]
    fn test_rejected_move_changes_nothing() {
        let mut game = test_game();
        let dictionary = dictionary();
        let [frankie, _] = players();
        game.racks[0] = rack_of("QQQQQQQ");
        let before_rack = game.racks[0].clone();

        let turn = placements(&game, 0, &[('Q', 7, 7), ('Q', 7, 8)]);
        assert_eq!(
            game.play(&frankie, &turn, &dictionary, Utc::now()),
            Err(Error::InvalidMove(Rejection::InvalidWord("QQ".into())))
        );

        assert_eq!(game.racks[0], before_rack);
        assert!(!game.board.has_letters());
        assert_eq!(game.turn(), &frankie);
        assert_eq!(game.scores, [0, 0]);

        let stranger = Tile::new(l!('Q'), TileSet::English);
        assert_eq!(
            game.play(
                &frankie,
                &[PlacedTile::new(stranger, 7, 7)],
                &dictionary,
                Utc::now()
            ),
            Err(Error::NoTileToSpend(l!('Q')))
        );

        assert_eq!(
            game.pass(&Player::from("mallory"), Utc::now()),
            Err(Error::UnknownPlayer(Player::from("mallory")))
        );
        assert_eq!(game.turn(), &frankie);
    }

    #[test]
    fn test_out_of_turn_actions_never_mutate() {
        let mut game = test_game();
        let dictionary = dictionary();
        let [_, ada] = players();
        let board = game.board.clone();
        let racks = game.racks.clone();
        let now = Utc::now();

        let turn = placements(&game, 1, &[]);
        assert_eq!(
            game.play(&ada, &turn, &dictionary, now),
            Err(Error::NotYourTurn)
        );
        assert_eq!(game.pass(&ada, now), Err(Error::NotYourTurn));
        assert_eq!(game.surrender(&ada, now), Err(Error::NotYourTurn));

        assert_eq!(game.board, board);
        assert_eq!(game.racks, racks);
        assert_eq!(game.scores, [0, 0]);
        assert_eq!(game.consecutive_passes, [0, 0]);
        assert_eq!(game.state, State::Active);
    }

    #[test]
    fn test_placement_errors() {
        let mut game = test_game();
        let dictionary = dictionary();
        let [frankie, _] = players();
        let now = Utc::now();

        let turn = vec![PlacedTile::new(game.racks[0][0].clone(), 7, 15)];
        assert_eq!(
            game.play(&frankie, &turn, &dictionary, now),
            Err(Error::OutOfBounds { row: 7, col: 15 })
        );

        let turn = vec![
            PlacedTile::new(game.racks[0][0].clone(), 7, 7),
            PlacedTile::new(game.racks[0][1].clone(), 7, 7),
        ];
        assert_eq!(
            game.propose(&frankie, &turn, &dictionary),
            Err(Error::CellOccupied { row: 7, col: 7 })
        );
    }

    #[test]
    fn test_double_pass_ends_game() {
        let mut game = test_game();
        let [frankie, ada] = players();
        let now = Utc::now();

        game.pass(&frankie, now).unwrap();
        assert_eq!(game.state, State::Active);
        assert_eq!(game.turn(), &ada);

        game.pass(&ada, now).unwrap();
        assert_eq!(
            game.state,
            State::Over {
                reason: EndReason::ConsecutivePasses,
                winner: Some(frankie.clone()),
            }
        );
        assert_eq!(game.ended_at(), Some(now));

        assert_eq!(game.pass(&frankie, now), Err(Error::GameOver));
    }

    #[test]
    fn test_move_resets_pass_counter() {
        let mut game = test_game();
        let dictionary = dictionary();
        let [frankie, ada] = players();
        let now = Utc::now();

        game.pass(&frankie, now).unwrap();
        game.racks[1] = rack_of("ATEEEEE");
        let turn = placements(&game, 1, &[('A', 7, 7), ('T', 7, 8)]);
        game.play(&ada, &turn, &dictionary, now).unwrap();

        assert_eq!(game.consecutive_passes, [1, 0]);

        // frankie's second pass in a row ends it even though ada moved between
        game.pass(&frankie, now).unwrap();
        assert_eq!(
            game.state,
            State::Over {
                reason: EndReason::ConsecutivePasses,
                winner: Some(ada),
            }
        );
    }

    #[test]
    fn test_surrender() {
        let mut game = test_game();
        let [frankie, ada] = players();
        let now = Utc::now();

        game.surrender(&frankie, now).unwrap();
        assert_eq!(
            game.state,
            State::Over {
                reason: EndReason::Surrender,
                winner: Some(ada),
            }
        );
    }

    #[test]
    fn test_timeout() {
        let start = Utc::now();
        let mut game = test_game();
        game.last_move_at = start;
        let [frankie, _] = players();

        assert!(!game.check_timeout(start + Duration::minutes(4)));
        assert_eq!(
            game.time_remaining(start + Duration::minutes(4)),
            Duration::minutes(1)
        );

        game.pass(&frankie, start).unwrap();
        assert!(game.check_timeout(start + Duration::minutes(6)));
        assert_eq!(
            game.state,
            State::Over {
                reason: EndReason::Timeout,
                winner: Some(frankie),
            }
        );
        assert!(!game.check_timeout(start + Duration::minutes(60)));
    }

    #[test]
    fn test_natural_end() {
        let mut game = test_game();
        let dictionary = dictionary();
        let [frankie, _] = players();

        game.bag = Bag::default();
        game.racks[0] = rack_of("AT");
        let turn = placements(&game, 0, &[('A', 7, 7), ('T', 7, 8)]);
        game.play(&frankie, &turn, &dictionary, Utc::now()).unwrap();

        assert_eq!(
            game.state,
            State::Over {
                reason: EndReason::Completed,
                winner: Some(frankie),
            }
        );
    }
}
