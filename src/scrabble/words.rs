use super::board::{Direction, GetLetter, PlacedTile, Position};
use super::tile::{Letter, TileSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WordLetter {
    pub letter: Letter,
    pub points: u32,
    pub position: Position,
    /// Laid down this turn, as opposed to already on the board.
    pub is_new: bool,
}

// Word identity is its cells, not its spelling (the same word may be formed twice).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Word {
    direction: Direction,
    letters: Vec<WordLetter>,
}

impl Word {
    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn letters(&self) -> &[WordLetter] {
        &self.letters
    }

    pub fn len(&self) -> usize {
        self.letters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.letters.is_empty()
    }

    pub fn text(&self) -> String {
        self.letters.iter().map(|l| l.letter.as_char()).collect()
    }
}

impl From<&Word> for String {
    fn from(word: &Word) -> Self {
        word.text()
    }
}

impl From<Word> for String {
    fn from(word: Word) -> Self {
        word.text()
    }
}

/// The line shared by every placed tile, if there is one. A lone tile counts
/// as horizontal; its vertical word is then picked up as a cross word.
pub fn primary_direction(placed: &[PlacedTile]) -> Option<Direction> {
    let first = placed.first()?;

    if placed.iter().all(|p| p.row == first.row) {
        Some(Direction::Horizontal)
    } else if placed.iter().all(|p| p.col == first.col) {
        Some(Direction::Vertical)
    } else {
        None
    }
}

/// Every word of two or more letters running through a tile placed this turn:
/// the word along the move's line, plus one cross word per placed tile.
/// Returns nothing when the placements are not on one line or the line has a
/// hole in it.
pub fn formed_words<G: GetLetter + ?Sized>(
    grid: &G,
    placed: &[PlacedTile],
    tile_set: TileSet,
) -> Vec<Word> {
    let direction = match primary_direction(placed) {
        Some(direction) => direction,
        None => return Vec::new(),
    };

    let (first, last) = match (
        placed.iter().map(PlacedTile::position).min_by_key(|p| p.along(direction)),
        placed.iter().map(PlacedTile::position).max_by_key(|p| p.along(direction)),
    ) {
        (Some(first), Some(last)) => (first, last),
        _ => return Vec::new(),
    };

    let start = extend(grid, first, direction, -1);
    let end = extend(grid, last, direction, 1);

    let mut words = Vec::new();

    match collect(grid, start, end, direction, placed, tile_set) {
        Some(word) if word.len() > 1 => words.push(word),
        Some(_) => {}
        None => return Vec::new(),
    }

    let cross = direction.cross();
    for tile in placed {
        let position = tile.position();
        let start = extend(grid, position, cross, -1);
        let end = extend(grid, position, cross, 1);

        if let Some(word) = collect(grid, start, end, cross, placed, tile_set) {
            if word.len() > 1 {
                words.push(word);
            }
        }
    }

    words
}

// walk from `from` while the next cell holds a letter
fn extend<G: GetLetter + ?Sized>(
    grid: &G,
    from: Position,
    direction: Direction,
    delta: isize,
) -> Position {
    let mut cursor = from;

    while let Some(next) = cursor.step(direction, delta) {
        if grid.get_letter(next).is_none() {
            break;
        }
        cursor = next;
    }

    cursor
}

fn collect<G: GetLetter + ?Sized>(
    grid: &G,
    start: Position,
    end: Position,
    direction: Direction,
    placed: &[PlacedTile],
    tile_set: TileSet,
) -> Option<Word> {
    let mut letters = Vec::new();
    let mut cursor = Some(start);

    while let Some(position) = cursor {
        let letter = grid.get_letter(position)?;
        let new_tile = placed.iter().find(|p| p.position() == position);

        letters.push(WordLetter {
            letter,
            points: new_tile
                .map(|p| p.tile.points)
                .unwrap_or_else(|| tile_set.points(letter)),
            position,
            is_new: new_tile.is_some(),
        });

        if position == end {
            break;
        }
        cursor = position.step(direction, 1);
    }

    Some(Word { direction, letters })
}
