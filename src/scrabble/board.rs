use std::fmt;

use serde::{Deserialize, Serialize};

use super::tile::{Letter, Tile, BLANK_GLYPH};
use super::Error;

pub const BOARD_SIZE: usize = 15;
pub const CELL_COUNT: usize = BOARD_SIZE * BOARD_SIZE;

// Rows 8..=14 mirror rows 6..=0.
static STANDARD_LAYOUT: &str = "
    .  .  3w .  .  2l .  .  .  2l .  .  3w .  .
    .  3l .  .  .  .  2l .  2l .  .  .  .  3l .
    3w .  .  .  .  .  .  2w .  .  .  .  .  .  3w
    .  .  .  2w .  .  .  .  .  .  .  2w .  .  .
    .  .  .  .  3l .  .  .  .  .  3l .  .  .  .
    2l .  .  .  .  2l .  .  .  2l .  .  .  .  2l
    .  2l .  .  .  .  2l .  2l .  .  .  .  2l .
    .  .  2w .  .  .  .  ★  .  .  .  .  2w .  .
    .  2l .  .  .  .  2l .  2l .  .  .  .  2l .
    2l .  .  .  .  2l .  .  .  2l .  .  .  .  2l
    .  .  .  .  3l .  .  .  .  .  3l .  .  .  .
    .  .  .  2w .  .  .  .  .  .  .  2w .  .  .
    3w .  .  .  .  .  .  2w .  .  .  .  .  .  3w
    .  3l .  .  .  .  2l .  2l .  .  .  .  3l .
    .  .  3w .  .  2l .  .  .  2l .  .  3w .  .
";

#[derive(Debug, Default, PartialEq, Eq, Hash, Copy, Clone)]
pub enum Premium {
    #[default]
    None,
    DoubleLetter,
    TripleLetter,
    DoubleWord,
    TripleWord,
    Center,
}

impl Premium {
    pub fn letter_multiplier(self) -> u32 {
        match self {
            Premium::DoubleLetter => 2,
            Premium::TripleLetter => 3,
            _ => 1,
        }
    }

    pub fn word_multiplier(self) -> u32 {
        match self {
            Premium::DoubleWord => 2,
            Premium::TripleWord => 3,
            _ => 1,
        }
    }

    /// Cell string used on the wire for an empty cell of this kind.
    pub fn glyph(self) -> &'static str {
        match self {
            Premium::None => "",
            Premium::DoubleLetter => "H²",
            Premium::TripleLetter => "H³",
            Premium::DoubleWord => "K²",
            Premium::TripleWord => "K³",
            Premium::Center => "★",
        }
    }

    fn from_glyph(glyph: &str) -> Option<Self> {
        match glyph {
            "" => Some(Premium::None),
            "H²" => Some(Premium::DoubleLetter),
            "H³" => Some(Premium::TripleLetter),
            "K²" => Some(Premium::DoubleWord),
            "K³" => Some(Premium::TripleWord),
            "★" => Some(Premium::Center),
            _ => None,
        }
    }

    fn from_token(token: &str) -> Option<Self> {
        match token {
            "." => Some(Premium::None),
            "2l" => Some(Premium::DoubleLetter),
            "3l" => Some(Premium::TripleLetter),
            "2w" => Some(Premium::DoubleWord),
            "3w" => Some(Premium::TripleWord),
            "★" => Some(Premium::Center),
            _ => None,
        }
    }

    fn token(self) -> &'static str {
        match self {
            Premium::None => ".",
            Premium::DoubleLetter => "2l",
            Premium::TripleLetter => "3l",
            Premium::DoubleWord => "2w",
            Premium::TripleWord => "3w",
            Premium::Center => "★",
        }
    }
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Hash, Copy, Clone, PartialOrd, Ord)]
pub struct Position {
    pub row: usize,
    pub col: usize,
}

impl Position {
    pub fn new(row: usize, col: usize) -> Self {
        Position { row, col }
    }

    pub fn in_bounds(row: usize, col: usize) -> bool {
        row < BOARD_SIZE && col < BOARD_SIZE
    }

    fn index(self) -> usize {
        self.row * BOARD_SIZE + self.col
    }

    fn from_index(index: usize) -> Self {
        Position::new(index / BOARD_SIZE, index % BOARD_SIZE)
    }

    /// Coordinate of this position along `direction`.
    pub fn along(self, direction: Direction) -> usize {
        match direction {
            Direction::Horizontal => self.col,
            Direction::Vertical => self.row,
        }
    }

    /// The position `delta` cells away along `direction`, if it is on the board.
    pub fn step(self, direction: Direction, delta: isize) -> Option<Position> {
        let (row, col) = match direction {
            Direction::Horizontal => (Some(self.row), self.col.checked_add_signed(delta)),
            Direction::Vertical => (self.row.checked_add_signed(delta), Some(self.col)),
        };

        match (row, col) {
            (Some(row), Some(col)) if Position::in_bounds(row, col) => Some(Position { row, col }),
            _ => None,
        }
    }

    /// All on-board neighbours, diagonals included.
    pub fn neighbours(self) -> impl Iterator<Item = Position> {
        const OFFSETS: [(isize, isize); 8] = [
            (-1, 0),
            (1, 0),
            (0, -1),
            (0, 1),
            (-1, -1),
            (-1, 1),
            (1, -1),
            (1, 1),
        ];

        OFFSETS.into_iter().filter_map(move |(dr, dc)| {
            let row = self.row.checked_add_signed(dr)?;
            let col = self.col.checked_add_signed(dc)?;
            Position::in_bounds(row, col).then_some(Position { row, col })
        })
    }
}

#[derive(Debug, PartialEq, Eq, Hash, Copy, Clone)]
pub enum Direction {
    Horizontal,
    Vertical,
}

impl Direction {
    pub fn cross(self) -> Self {
        match self {
            Direction::Horizontal => Direction::Vertical,
            Direction::Vertical => Direction::Horizontal,
        }
    }
}

/// A tile laid down during the turn in progress.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PlacedTile {
    #[serde(flatten)]
    pub tile: Tile,
    pub row: usize,
    pub col: usize,
}

impl PlacedTile {
    pub fn new(tile: Tile, row: usize, col: usize) -> Self {
        PlacedTile { tile, row, col }
    }

    pub fn position(&self) -> Position {
        Position::new(self.row, self.col)
    }
}

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
struct Square {
    premium: Premium,
    letter: Option<Letter>,
}

#[derive(PartialEq, Eq, Clone)]
pub struct Board(Vec<Square>);

impl Default for Board {
    fn default() -> Self {
        Self::standard()
    }
}

impl Board {
    /// The fixed multiplier layout with every cell empty.
    pub fn standard() -> Self {
        let squares = STANDARD_LAYOUT
            .split_whitespace()
            .map(|token| Square {
                premium: Premium::from_token(token).unwrap_or_default(),
                letter: None,
            })
            .collect();

        Board(squares)
    }

    /// Reads a board in the text form produced by `Display`: premium tokens
    /// (`.`, `2l`, `3l`, `2w`, `3w`, `★`) for empty cells and single letters
    /// (`*` for a blank) for occupied ones. Premiums always come from the
    /// standard layout.
    pub fn parse(board_string: &str) -> Result<Self, Error> {
        let tokens: Vec<&str> = board_string.split_whitespace().collect();
        if tokens.len() != CELL_COUNT {
            return Err(Error::BoardParse(format!(
                "expected {} cells, found {}",
                CELL_COUNT,
                tokens.len()
            )));
        }

        let mut board = Self::standard();
        for (index, token) in tokens.into_iter().enumerate() {
            if Premium::from_token(token).is_some() {
                continue;
            }

            board.0[index].letter = Some(token.parse()?);
        }

        Ok(board)
    }

    pub fn place(&mut self, letter: Letter, row: usize, col: usize) -> Result<(), Error> {
        if !Position::in_bounds(row, col) {
            return Err(Error::OutOfBounds { row, col });
        }

        let square = &mut self.0[Position::new(row, col).index()];
        if square.letter.is_some() {
            return Err(Error::CellOccupied { row, col });
        }

        square.letter = Some(letter);
        Ok(())
    }

    /// Clears a cell. Only used to roll back tiles that were never committed.
    pub(crate) fn lift(&mut self, position: Position) -> Option<Letter> {
        if !Position::in_bounds(position.row, position.col) {
            return None;
        }

        self.0[position.index()].letter.take()
    }

    pub fn is_empty(&self, row: usize, col: usize) -> bool {
        self.letter_at(row, col).is_none()
    }

    pub fn letter_at(&self, row: usize, col: usize) -> Option<Letter> {
        if !Position::in_bounds(row, col) {
            return None;
        }

        self.0[Position::new(row, col).index()].letter
    }

    pub fn premium_at(&self, row: usize, col: usize) -> Premium {
        if !Position::in_bounds(row, col) {
            return Premium::None;
        }

        self.0[Position::new(row, col).index()].premium
    }

    pub fn has_letters(&self) -> bool {
        self.0.iter().any(|square| square.letter.is_some())
    }

    pub fn letters(&self) -> impl Iterator<Item = (Position, Letter)> + '_ {
        self.0
            .iter()
            .enumerate()
            .filter_map(|(index, square)| Some((Position::from_index(index), square.letter?)))
    }

    /// Row-major list of 225 cell strings: a letter, or the premium glyph of
    /// an empty cell.
    pub fn flatten(&self) -> Vec<String> {
        self.0
            .iter()
            .map(|square| match square.letter {
                Some(letter) => letter.to_string(),
                None => square.premium.glyph().to_string(),
            })
            .collect()
    }

    pub fn unflatten<S: AsRef<str>>(cells: &[S]) -> Result<Self, Error> {
        if cells.len() != CELL_COUNT {
            return Err(Error::BoardParse(format!(
                "expected {} cells, found {}",
                CELL_COUNT,
                cells.len()
            )));
        }

        let mut board = Self::standard();
        for (row, chunk) in cells.chunks(BOARD_SIZE).enumerate() {
            for (col, cell) in chunk.iter().enumerate() {
                let cell = cell.as_ref();
                if Premium::from_glyph(cell).is_some() {
                    continue;
                }

                board.place(cell.parse()?, row, col)?;
            }
        }

        Ok(board)
    }

    fn as_board_string(&self) -> String {
        let mut result = String::new();
        for (index, square) in self.0.iter().enumerate() {
            result.push_str(&format_square(square));
            if index % BOARD_SIZE == BOARD_SIZE - 1 {
                result.push('\n');
            }
        }

        result
    }
}

fn format_square(square: &Square) -> String {
    match square.letter {
        Some(Letter::Blank) => format!("{}  ", BLANK_GLYPH),
        Some(Letter::Char(char)) => format!("{}  ", char),
        None => format!("{:<3}", square.premium.token()),
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_board_string())
    }
}

impl fmt::Debug for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("\n")?;
        f.write_str(&self.as_board_string())
    }
}

pub trait GetLetter {
    fn get_letter(&self, position: Position) -> Option<Letter>;
}

impl GetLetter for Board {
    fn get_letter(&self, position: Position) -> Option<Letter> {
        self.letter_at(position.row, position.col)
    }
}

/// A board with a turn's placements laid over it, without copying the board.
pub struct Overlay<'a> {
    pub board: &'a Board,
    pub placed: &'a [PlacedTile],
}

impl GetLetter for Overlay<'_> {
    fn get_letter(&self, position: Position) -> Option<Letter> {
        self.board.get_letter(position).or_else(|| {
            self.placed
                .iter()
                .find(|placed| placed.position() == position)
                .map(|placed| placed.tile.letter)
        })
    }
}
