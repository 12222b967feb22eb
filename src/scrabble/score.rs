use serde::{Deserialize, Serialize};

use super::board::Board;
use super::words::Word;

#[derive(Deserialize, Serialize, Debug, Default, Clone, Eq, PartialEq)]
pub struct TurnScore {
    pub scores: Vec<(String, u32)>,
}

impl TurnScore {
    pub fn total(&self) -> u32 {
        self.scores.iter().map(|(_, score)| score).sum()
    }
}

pub fn score_turn(board: &Board, words: &[Word]) -> TurnScore {
    let scores = words
        .iter()
        .map(|word| (String::from(word), score_word(board, word)))
        .collect();

    TurnScore { scores }
}

/// Letter and word multipliers only count for cells filled this turn. Each
/// word is scored on its own, so a tile shared by two new words lends its
/// multiplier to both.
pub fn score_word(board: &Board, word: &Word) -> u32 {
    let mut score = 0;
    let mut word_bonus = 1;

    for letter in word.letters() {
        let position = letter.position;
        let premium = board.premium_at(position.row, position.col);

        if letter.is_new {
            score += letter.points * premium.letter_multiplier();
            word_bonus *= premium.word_multiplier();
        } else {
            score += letter.points;
        }
    }

    score * word_bonus
}
