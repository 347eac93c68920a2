//! Player cards: 5x5 grids with banded columns and a free center
//!
//! Cell (row, col) maps to bit `row * 5 + col` of a 25-bit match mask. The
//! center cell carries no number and its bit is always set.

use crate::engine::caller::CalledSet;
use rand::Rng;
use serde::{Deserialize, Serialize};

pub const GRID: usize = 5;
pub const CELL_COUNT: usize = 25;
pub const FREE_ROW: usize = 2;
pub const FREE_COL: usize = 2;
pub const CENTER_BIT: u32 = 1 << (FREE_ROW * GRID + FREE_COL);
pub const FULL_MASK: u32 = (1 << CELL_COUNT) - 1;

/// Inclusive value band per column: B 1-15, I 16-30, N 31-45, G 46-60, O 61-75
pub const COLUMN_BANDS: [(u8, u8); GRID] = [(1, 15), (16, 30), (31, 45), (46, 60), (61, 75)];

const BAND_WIDTH: usize = 15;

/// One participant's card for one session. Stored column-major; the center
/// slot holds 0 and never matches by number.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    columns: [[u8; GRID]; GRID],
}

impl Card {
    /// Number at (row, col), or None for the free center
    pub fn number_at(&self, row: usize, col: usize) -> Option<u8> {
        if row == FREE_ROW && col == FREE_COL {
            return None;
        }
        Some(self.columns[col][row])
    }

    /// 25-bit mask of matched cells against the called set; the center bit
    /// is always set.
    pub fn match_mask(&self, called: &CalledSet) -> u32 {
        let mut mask = CENTER_BIT;
        for col in 0..GRID {
            for row in 0..GRID {
                if row == FREE_ROW && col == FREE_COL {
                    continue;
                }
                if called.contains(self.columns[col][row]) {
                    mask |= 1 << (row * GRID + col);
                }
            }
        }
        mask
    }

    pub fn contains(&self, number: u8) -> bool {
        self.columns
            .iter()
            .flatten()
            .any(|&n| n != 0 && n == number)
    }

    /// Band and uniqueness invariants hold; used by tests and admission checks
    pub fn is_well_formed(&self) -> bool {
        let mut seen = [false; 76];
        for (col, &(lo, hi)) in COLUMN_BANDS.iter().enumerate() {
            for row in 0..GRID {
                if row == FREE_ROW && col == FREE_COL {
                    continue;
                }
                let n = self.columns[col][row];
                if n < lo || n > hi || seen[n as usize] {
                    return false;
                }
                seen[n as usize] = true;
            }
        }
        true
    }
}

/// Card generation and progress accounting
pub struct CardEngine;

impl CardEngine {
    /// Generate a card: five distinct numbers per column band, center freed
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Card {
        let mut columns = [[0u8; GRID]; GRID];
        for (col, &(lo, _)) in COLUMN_BANDS.iter().enumerate() {
            let picks = rand::seq::index::sample(rng, BAND_WIDTH, GRID);
            for (row, pick) in picks.into_iter().enumerate() {
                columns[col][row] = lo + pick as u8;
            }
        }
        columns[FREE_COL][FREE_ROW] = 0;
        Card { columns }
    }

    /// (matched, total) cell counts for the monitor's progress display
    pub fn match_count(card: &Card, called: &CalledSet) -> (u32, u32) {
        (card.match_mask(called).count_ones(), CELL_COUNT as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    #[test]
    fn test_generated_card_is_well_formed() {
        let mut rng = rng();
        for _ in 0..50 {
            let card = CardEngine::generate(&mut rng);
            assert!(card.is_well_formed());
        }
    }

    #[test]
    fn test_center_is_free() {
        let card = CardEngine::generate(&mut rng());
        assert_eq!(card.number_at(FREE_ROW, FREE_COL), None);

        let empty = CalledSet::new();
        let mask = card.match_mask(&empty);
        assert_eq!(mask, CENTER_BIT);

        let (matched, total) = CardEngine::match_count(&card, &empty);
        assert_eq!(matched, 1);
        assert_eq!(total, 25);
    }

    #[test]
    fn test_match_mask_tracks_calls() {
        let card = CardEngine::generate(&mut rng());
        let mut called = CalledSet::new();

        let first = card.number_at(0, 0).expect("corner has a number");
        called.push(first);
        let mask = card.match_mask(&called);
        assert_ne!(mask & 1, 0);
        assert_eq!(mask.count_ones(), 2); // corner + center

        for n in 1..=75 {
            called.push(n);
        }
        assert_eq!(card.match_mask(&called), FULL_MASK);
    }

    #[test]
    fn test_contains_ignores_free_slot() {
        let card = CardEngine::generate(&mut rng());
        assert!(!card.contains(0));
        let n = card.number_at(4, 4).expect("corner has a number");
        assert!(card.contains(n));
    }
}
