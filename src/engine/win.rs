//! Winning patterns and claim validation
//!
//! A pattern is a named 25-bit cell mask. The evaluator checks patterns in
//! set order and reports the first one satisfied, so the set's order is the
//! claim priority.

use crate::engine::caller::CalledSet;
use crate::engine::card::{Card, GRID};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

const COLUMN_LETTERS: [char; GRID] = ['B', 'I', 'N', 'G', 'O'];

/// A named winning shape over the 5x5 grid
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pattern {
    name: String,
    mask: u32,
}

impl Pattern {
    pub fn new(name: impl Into<String>, cells: &[(usize, usize)]) -> Self {
        let mut mask = 0u32;
        for &(row, col) in cells {
            debug_assert!(row < GRID && col < GRID);
            mask |= 1 << (row * GRID + col);
        }
        Self {
            name: name.into(),
            mask,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mask(&self) -> u32 {
        self.mask
    }

    pub fn is_satisfied_by(&self, match_mask: u32) -> bool {
        match_mask & self.mask == self.mask
    }

    /// Fraction of this pattern's cells already matched
    pub fn progress(&self, match_mask: u32) -> f64 {
        let total = self.mask.count_ones();
        if total == 0 {
            return 0.0;
        }
        f64::from((match_mask & self.mask).count_ones()) / f64::from(total)
    }
}

static STANDARD_PATTERNS: Lazy<Vec<Pattern>> = Lazy::new(|| {
    let mut patterns = Vec::with_capacity(12);
    for row in 0..GRID {
        let cells: Vec<_> = (0..GRID).map(|col| (row, col)).collect();
        patterns.push(Pattern::new(format!("row-{}", row + 1), &cells));
    }
    for col in 0..GRID {
        let cells: Vec<_> = (0..GRID).map(|row| (row, col)).collect();
        patterns.push(Pattern::new(
            format!("column-{}", COLUMN_LETTERS[col]),
            &cells,
        ));
    }
    let down: Vec<_> = (0..GRID).map(|i| (i, i)).collect();
    patterns.push(Pattern::new("diagonal-down", &down));
    let up: Vec<_> = (0..GRID).map(|i| (GRID - 1 - i, i)).collect();
    patterns.push(Pattern::new("diagonal-up", &up));
    patterns
});

static EXTENDED_PATTERNS: Lazy<Vec<Pattern>> = Lazy::new(|| {
    let mut patterns = STANDARD_PATTERNS.clone();
    patterns.push(Pattern::new(
        "four-corners",
        &[(0, 0), (0, GRID - 1), (GRID - 1, 0), (GRID - 1, GRID - 1)],
    ));
    let all: Vec<_> = (0..GRID)
        .flat_map(|row| (0..GRID).map(move |col| (row, col)))
        .collect();
    patterns.push(Pattern::new("blackout", &all));
    patterns
});

/// Ordered collection of recognized patterns
#[derive(Clone, Debug)]
pub struct PatternSet {
    patterns: Vec<Pattern>,
}

impl PatternSet {
    /// Rows, columns and both diagonals
    pub fn standard() -> Self {
        Self {
            patterns: STANDARD_PATTERNS.clone(),
        }
    }

    /// Standard shapes plus four-corners and blackout
    pub fn extended() -> Self {
        Self {
            patterns: EXTENDED_PATTERNS.clone(),
        }
    }

    pub fn custom(patterns: Vec<Pattern>) -> Self {
        Self { patterns }
    }

    pub fn patterns(&self) -> &[Pattern] {
        &self.patterns
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// Validates claims against the configured pattern set
#[derive(Clone, Debug)]
pub struct WinEvaluator {
    set: PatternSet,
}

impl WinEvaluator {
    pub fn new(set: PatternSet) -> Self {
        Self { set }
    }

    /// First satisfied pattern in set order, if any
    pub fn check_win(&self, card: &Card, called: &CalledSet) -> Option<&Pattern> {
        let mask = card.match_mask(called);
        self.set.patterns().iter().find(|p| p.is_satisfied_by(mask))
    }

    /// Best completion fraction across the set; 1.0 means a claim would win
    pub fn best_progress(&self, card: &Card, called: &CalledSet) -> f64 {
        let mask = card.match_mask(called);
        self.set
            .patterns()
            .iter()
            .map(|p| p.progress(mask))
            .fold(0.0, f64::max)
    }

    pub fn pattern_set(&self) -> &PatternSet {
        &self.set
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::card::CardEngine;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn card() -> Card {
        CardEngine::generate(&mut StdRng::seed_from_u64(11))
    }

    fn calls_for_row(card: &Card, row: usize) -> CalledSet {
        let mut called = CalledSet::new();
        for col in 0..GRID {
            if let Some(n) = card.number_at(row, col) {
                called.push(n);
            }
        }
        called
    }

    #[test]
    fn test_row_win() {
        let card = card();
        let evaluator = WinEvaluator::new(PatternSet::standard());
        let called = calls_for_row(&card, 0);
        let win = evaluator.check_win(&card, &called).expect("row complete");
        assert_eq!(win.name(), "row-1");
    }

    #[test]
    fn test_column_win_uses_free_center() {
        let card = card();
        let evaluator = WinEvaluator::new(PatternSet::standard());
        // Column N needs only its four numbered cells
        let mut called = CalledSet::new();
        for row in 0..GRID {
            if let Some(n) = card.number_at(row, 2) {
                called.push(n);
            }
        }
        assert_eq!(called.len(), 4);
        let win = evaluator.check_win(&card, &called).expect("column complete");
        assert_eq!(win.name(), "column-N");
    }

    #[test]
    fn test_diagonals() {
        let card = card();
        let evaluator = WinEvaluator::new(PatternSet::standard());
        let mut called = CalledSet::new();
        for i in 0..GRID {
            if let Some(n) = card.number_at(i, i) {
                called.push(n);
            }
        }
        let win = evaluator.check_win(&card, &called).expect("diagonal");
        assert_eq!(win.name(), "diagonal-down");
    }

    #[test]
    fn test_no_win_on_partial_progress() {
        let card = card();
        let evaluator = WinEvaluator::new(PatternSet::standard());
        let mut called = CalledSet::new();
        for col in 0..3 {
            if let Some(n) = card.number_at(0, col) {
                called.push(n);
            }
        }
        assert!(evaluator.check_win(&card, &called).is_none());
        let progress = evaluator.best_progress(&card, &called);
        assert!(progress >= 3.0 / 5.0);
        assert!(progress < 1.0);
    }

    #[test]
    fn test_first_match_priority() {
        // All 75 numbers called: every pattern is satisfied, the first in
        // set order must be reported.
        let card = card();
        let all: Vec<u8> = (1..=75).collect();
        let called = CalledSet::from_numbers(&all);
        let evaluator = WinEvaluator::new(PatternSet::extended());
        let win = evaluator.check_win(&card, &called).expect("blackout board");
        assert_eq!(win.name(), "row-1");
    }

    #[test]
    fn test_four_corners_only_in_extended() {
        let card = card();
        let mut called = CalledSet::new();
        for &(row, col) in &[(0, 0), (0, 4), (4, 0), (4, 4)] {
            if let Some(n) = card.number_at(row, col) {
                called.push(n);
            }
        }
        let standard = WinEvaluator::new(PatternSet::standard());
        assert!(standard.check_win(&card, &called).is_none());
        let extended = WinEvaluator::new(PatternSet::extended());
        let win = extended.check_win(&card, &called).expect("corners");
        assert_eq!(win.name(), "four-corners");
    }

    #[test]
    fn test_empty_set_never_wins() {
        let card = card();
        let all: Vec<u8> = (1..=75).collect();
        let called = CalledSet::from_numbers(&all);
        let evaluator = WinEvaluator::new(PatternSet::custom(vec![]));
        assert!(evaluator.check_win(&card, &called).is_none());
        assert_eq!(evaluator.best_progress(&card, &called), 0.0);
    }
}
