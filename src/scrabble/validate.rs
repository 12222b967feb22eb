use std::collections::HashSet;

use tracing::debug;

use super::board::{Board, Direction, GetLetter, PlacedTile, Position};
use super::tile::TileSet;
use super::words::{formed_words, primary_direction, Word};
use crate::dictionary::Lexicon;

/// Why a move was refused. The `Display` form is the tag shown to the player.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("no-tiles")]
    NoTiles,
    #[error("not-linear")]
    NotLinear,
    #[error("gap")]
    Gap,
    #[error("disconnected")]
    Disconnected,
    #[error("no-word")]
    NoWord,
    #[error("invalid-word:{0}")]
    InvalidWord(String),
}

pub struct MoveValidator<'a, L: ?Sized> {
    lexicon: &'a L,
    tile_set: TileSet,
}

impl<'a, L: Lexicon + ?Sized> MoveValidator<'a, L> {
    pub fn new(lexicon: &'a L, tile_set: TileSet) -> Self {
        MoveValidator { lexicon, tile_set }
    }

    /// Decides whether `placed` is a legal move from `before` to `after`,
    /// returning the words it forms. Neither board is touched.
    pub fn validate<A: GetLetter + ?Sized>(
        &self,
        before: &Board,
        after: &A,
        placed: &[PlacedTile],
        first_move: bool,
    ) -> Result<Vec<Word>, Rejection> {
        if placed.is_empty() {
            return Err(Rejection::NoTiles);
        }

        if primary_direction(placed).is_none() {
            return Err(Rejection::NotLinear);
        }

        if has_gap(after, placed) {
            return Err(Rejection::Gap);
        }

        if !first_move && !is_connected(before, placed) {
            return Err(Rejection::Disconnected);
        }

        let words = formed_words(after, placed, self.tile_set);
        if words.is_empty() {
            return Err(Rejection::NoWord);
        }

        for word in &words {
            let text = self.tile_set.uppercase(&word.text());
            if !self.lexicon.contains(&text) {
                debug!("rejecting unknown word {:?}", text);
                return Err(Rejection::InvalidWord(text));
            }
        }

        Ok(words)
    }
}

fn has_gap<A: GetLetter + ?Sized>(after: &A, placed: &[PlacedTile]) -> bool {
    let direction = match primary_direction(placed) {
        Some(direction) => direction,
        None => return false,
    };

    let along: HashSet<usize> = placed.iter().map(|p| p.position().along(direction)).collect();
    let (min, max) = match (along.iter().min(), along.iter().max()) {
        (Some(min), Some(max)) => (*min, *max),
        _ => return false,
    };

    let anchor = placed[0].position();
    (min..=max).any(|coordinate| {
        let position = match direction {
            Direction::Horizontal => Position::new(anchor.row, coordinate),
            Direction::Vertical => Position::new(coordinate, anchor.col),
        };
        after.get_letter(position).is_none()
    })
}

// any of the eight neighbours of any placed tile already holds a letter
fn is_connected(before: &Board, placed: &[PlacedTile]) -> bool {
    placed.iter().any(|p| {
        p.position()
            .neighbours()
            .any(|n| before.get_letter(n).is_some())
    })
}
