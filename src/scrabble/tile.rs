use std::{collections::HashMap, fmt, str::FromStr};

use rand::{seq::SliceRandom, Rng};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Error;

pub const BLANK_GLYPH: char = '*';
pub const RACK_SIZE: usize = 7;

#[derive(Serialize, Deserialize, PartialEq, Eq, Hash, Copy, Clone)]
#[serde(try_from = "String", into = "String")]
pub enum Letter {
    Char(char),
    Blank,
}

impl Letter {
    pub fn as_char(&self) -> char {
        match *self {
            Letter::Char(char) => char,
            Letter::Blank => BLANK_GLYPH,
        }
    }
}

impl fmt::Debug for Letter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Letter::Char(char) => write!(f, "[{}]", char),
            Letter::Blank => write!(f, "[ ]"),
        }
    }
}

impl fmt::Display for Letter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

impl FromStr for Letter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (Some(BLANK_GLYPH), None) => Ok(Letter::Blank),
            (Some(char), None) if char.is_alphabetic() => Ok(Letter::Char(char)),
            _ => Err(Error::BoardParse(s.to_string())),
        }
    }
}

impl TryFrom<String> for Letter {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Letter> for String {
    fn from(letter: Letter) -> Self {
        letter.as_char().to_string()
    }
}

#[derive(Serialize, Deserialize, PartialEq, Eq, Hash, Copy, Clone, Debug)]
#[serde(transparent)]
pub struct TileId(Uuid);

impl TileId {
    pub fn new() -> Self {
        TileId(Uuid::new_v4())
    }
}

impl Default for TileId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A single letter unit. The point value is fixed by the tile set when the
/// bag is filled, so a blank is always worth nothing.
#[derive(Serialize, Deserialize, PartialEq, Eq, Clone, Debug)]
pub struct Tile {
    pub letter: Letter,
    #[serde(rename = "point")]
    pub points: u32,
    pub id: TileId,
}

impl Tile {
    pub fn new(letter: Letter, tile_set: TileSet) -> Self {
        Tile {
            letter,
            points: tile_set.points(letter),
            id: TileId::new(),
        }
    }
}

pub type Rack = Vec<Tile>;

macro_rules! l {
    () => {
        $crate::scrabble::tile::Letter::Blank
    };

    ($c:expr) => {
        $crate::scrabble::tile::Letter::Char($c)
    };
}

pub(crate) use l;

// (letter, count, points)
static TURKISH: &[(Letter, u32, u32)] = &[
    (l!('A'), 12, 1),
    (l!('B'), 2, 3),
    (l!('C'), 2, 4),
    (l!('Ç'), 2, 4),
    (l!('D'), 3, 3),
    (l!('E'), 8, 1),
    (l!('F'), 2, 7),
    (l!('G'), 2, 5),
    (l!('Ğ'), 1, 8),
    (l!('H'), 1, 5),
    (l!('I'), 2, 2),
    (l!('İ'), 4, 1),
    (l!('J'), 1, 10),
    (l!('K'), 6, 1),
    (l!('L'), 1, 1),
    (l!('M'), 4, 2),
    (l!('N'), 5, 1),
    (l!('O'), 3, 2),
    (l!('Ö'), 1, 7),
    (l!('P'), 2, 5),
    (l!('R'), 6, 1),
    (l!('S'), 4, 2),
    (l!('Ş'), 1, 4),
    (l!('T'), 5, 1),
    (l!('U'), 2, 2),
    (l!('Ü'), 2, 3),
    (l!('V'), 1, 7),
    (l!('Y'), 2, 3),
    (l!('Z'), 2, 4),
    (l!(), 2, 0),
];

static ENGLISH: &[(Letter, u32, u32)] = &[
    (l!('A'), 9, 1),
    (l!('B'), 2, 3),
    (l!('C'), 2, 3),
    (l!('D'), 4, 2),
    (l!('E'), 12, 1),
    (l!('F'), 2, 4),
    (l!('G'), 3, 2),
    (l!('H'), 2, 4),
    (l!('I'), 9, 1),
    (l!('J'), 1, 8),
    (l!('K'), 1, 5),
    (l!('L'), 4, 1),
    (l!('M'), 2, 3),
    (l!('N'), 6, 1),
    (l!('O'), 8, 1),
    (l!('P'), 2, 3),
    (l!('Q'), 1, 10),
    (l!('R'), 6, 1),
    (l!('S'), 4, 1),
    (l!('T'), 6, 1),
    (l!('U'), 4, 1),
    (l!('V'), 2, 4),
    (l!('W'), 2, 4),
    (l!('X'), 1, 8),
    (l!('Y'), 2, 4),
    (l!('Z'), 1, 10),
    (l!(), 2, 0),
];

/// Starting distribution and point table of a game. Fixed at match creation.
#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Eq, Hash, Copy, Clone)]
#[serde(rename_all = "lowercase")]
pub enum TileSet {
    #[default]
    Turkish,
    English,
}

impl TileSet {
    pub fn distribution(&self) -> &'static [(Letter, u32, u32)] {
        match self {
            TileSet::Turkish => TURKISH,
            TileSet::English => ENGLISH,
        }
    }

    pub fn points(&self, letter: Letter) -> u32 {
        self.distribution()
            .iter()
            .find(|(l, _, _)| *l == letter)
            .map(|(_, _, points)| *points)
            .unwrap_or(0)
    }

    pub fn count(&self, letter: Letter) -> u32 {
        self.distribution()
            .iter()
            .find(|(l, _, _)| *l == letter)
            .map(|(_, count, _)| *count)
            .unwrap_or(0)
    }

    pub fn total_tiles(&self) -> usize {
        self.distribution()
            .iter()
            .map(|(_, count, _)| *count as usize)
            .sum()
    }

    /// Uppercases a word the way this alphabet does. Turkish keeps the dotted
    /// and dotless i apart (i -> İ, ı -> I).
    pub fn uppercase(&self, word: &str) -> String {
        match self {
            TileSet::English => word.to_uppercase(),
            TileSet::Turkish => word
                .chars()
                .flat_map(|c| match c {
                    'i' => vec!['İ'],
                    'ı' => vec!['I'],
                    other => other.to_uppercase().collect(),
                })
                .collect(),
        }
    }
}

impl FromStr for TileSet {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "turkish" | "tr" => Ok(TileSet::Turkish),
            "english" | "en" => Ok(TileSet::English),
            other => Err(format!("unknown tile set {:?}", other)),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
#[serde(transparent)]
pub struct Bag(Vec<Tile>);

impl Bag {
    pub fn standard<R: Rng + ?Sized>(tile_set: TileSet, rng: &mut R) -> Self {
        let mut bag = Vec::with_capacity(tile_set.total_tiles());

        for (letter, count, _) in tile_set.distribution() {
            for _ in 0..*count {
                bag.push(Tile::new(*letter, tile_set));
            }
        }

        bag.shuffle(rng);

        Bag(bag)
    }

    /// Removes `min(count, len)` uniformly random tiles.
    pub fn draw<R: Rng + ?Sized>(&mut self, count: usize, rng: &mut R) -> Vec<Tile> {
        let count = count.min(self.0.len());
        let mut drawn = Vec::with_capacity(count);

        for _ in 0..count {
            let index = rng.random_range(0..self.0.len());
            drawn.push(self.0.swap_remove(index));
        }

        drawn
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn tiles(&self) -> &[Tile] {
        &self.0
    }

    pub fn letter_counts(&self) -> HashMap<Letter, u32> {
        let mut counts = HashMap::new();
        for tile in &self.0 {
            *counts.entry(tile.letter).or_insert(0) += 1;
        }
        counts
    }
}

impl From<Vec<Tile>> for Bag {
    fn from(tiles: Vec<Tile>) -> Self {
        Bag(tiles)
    }
}

impl From<Bag> for Vec<Tile> {
    fn from(bag: Bag) -> Self {
        bag.0
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn test_standard_bag_matches_distribution() {
        let mut rng = StdRng::seed_from_u64(7);

        for tile_set in [TileSet::Turkish, TileSet::English] {
            let bag = Bag::standard(tile_set, &mut rng);
            assert_eq!(bag.len(), tile_set.total_tiles());

            let counts = bag.letter_counts();
            for (letter, count, _) in tile_set.distribution() {
                assert_eq!(counts.get(letter).copied().unwrap_or(0), *count, "{:?}", letter);
            }
        }

        assert_eq!(TileSet::Turkish.total_tiles(), 91);
        assert_eq!(TileSet::English.total_tiles(), 100);
    }

    #[test]
    fn test_draw_more_than_available_empties_bag() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut bag = Bag::from(vec![
            Tile::new(l!('A'), TileSet::English),
            Tile::new(l!('B'), TileSet::English),
            Tile::new(l!(), TileSet::English),
        ]);

        let drawn = bag.draw(7, &mut rng);

        assert_eq!(drawn.len(), 3);
        assert!(bag.is_empty());
        assert!(bag.draw(2, &mut rng).is_empty());
    }

    #[test]
    fn test_points() {
        assert_eq!(TileSet::Turkish.points(l!('J')), 10);
        assert_eq!(TileSet::Turkish.points(l!('Ğ')), 8);
        assert_eq!(TileSet::English.points(l!('Q')), 10);
        assert_eq!(TileSet::English.points(l!()), 0);
        assert_eq!(TileSet::English.points(l!('Ç')), 0);
    }

    #[test]
    fn test_turkish_uppercase() {
        assert_eq!(TileSet::Turkish.uppercase("için"), "İÇİN");
        assert_eq!(TileSet::Turkish.uppercase("ılık"), "ILIK");
        assert_eq!(TileSet::English.uppercase("quiz"), "QUIZ");
    }

    #[test]
    fn test_letter_serde() {
        let tile = Tile::new(l!('Ş'), TileSet::Turkish);
        let json = serde_json::to_value(&tile).unwrap();
        assert_eq!(json["letter"], "Ş");
        assert_eq!(json["point"], 4);

        let back: Tile = serde_json::from_value(json).unwrap();
        assert_eq!(back, tile);

        assert_eq!("*".parse::<Letter>().unwrap(), Letter::Blank);
        assert!("AB".parse::<Letter>().is_err());
        assert!("".parse::<Letter>().is_err());
    }
}
