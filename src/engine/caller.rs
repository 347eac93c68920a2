//! Fair number calling for one session
//!
//! Draws come from the OS CSPRNG: fairness is a product requirement, so the
//! pool is never fed by a seedable userspace generator in production paths.

use crate::errors::CallerError;
use rand::rngs::OsRng;
use rand::Rng;

pub const POOL_MIN: u8 = 1;
pub const POOL_MAX: u8 = 75;

/// Ordered set of called numbers with O(1) membership
#[derive(Clone, Debug, Default)]
pub struct CalledSet {
    numbers: Vec<u8>,
    bits: u128,
}

impl CalledSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_numbers(numbers: &[u8]) -> Self {
        let mut set = Self::new();
        for &n in numbers {
            set.push(n);
        }
        set
    }

    /// Append a call; false if the number was already present
    pub fn push(&mut self, number: u8) -> bool {
        let bit = 1u128 << number;
        if self.bits & bit != 0 {
            return false;
        }
        self.bits |= bit;
        self.numbers.push(number);
        true
    }

    pub fn contains(&self, number: u8) -> bool {
        self.bits & (1u128 << number) != 0
    }

    pub fn len(&self) -> usize {
        self.numbers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.numbers.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.numbers
    }
}

/// Owns the 1-75 draw pool for one round
#[derive(Clone, Debug)]
pub struct NumberCaller {
    remaining: Vec<u8>,
    called: CalledSet,
}

impl NumberCaller {
    pub fn new() -> Self {
        Self {
            remaining: (POOL_MIN..=POOL_MAX).collect(),
            called: CalledSet::new(),
        }
    }

    /// Draw the next number uniformly from the remaining pool
    pub fn draw(&mut self) -> Result<u8, CallerError> {
        self.draw_with(&mut OsRng)
    }

    /// Draw with a caller-supplied source; the production path is [`draw`]
    pub fn draw_with<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<u8, CallerError> {
        if self.remaining.is_empty() {
            return Err(CallerError::PoolExhausted);
        }
        let idx = rng.gen_range(0..self.remaining.len());
        let number = self.remaining.swap_remove(idx);
        self.called.push(number);
        Ok(number)
    }

    pub fn called(&self) -> &[u8] {
        self.called.as_slice()
    }

    pub fn called_set(&self) -> &CalledSet {
        &self.called
    }

    pub fn remaining(&self) -> usize {
        self.remaining.len()
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining.is_empty()
    }
}

impl Default for NumberCaller {
    fn default() -> Self {
        Self::new()
    }
}
