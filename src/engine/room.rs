//! Room configuration: a stake tier hosting sequential sessions
//!
//! Rooms are created and edited by the admin surface; the engine treats them
//! as read-only input and copies the stake into each session at creation so
//! later edits never touch a running round.

use crate::engine::win::PatternSet;
use crate::errors::RoomError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub type RoomId = String;

/// Call cadence tiers selectable per room
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallSpeed {
    Relaxed,
    Standard,
    Turbo,
}

impl CallSpeed {
    pub fn call_interval(&self) -> Duration {
        match self {
            CallSpeed::Relaxed => Duration::from_secs(5),
            CallSpeed::Standard => Duration::from_secs(3),
            CallSpeed::Turbo => Duration::from_millis(1_500),
        }
    }
}

/// Which winning shapes the room recognizes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternSelection {
    Standard,
    Extended,
}

impl PatternSelection {
    pub fn build(&self) -> PatternSet {
        match self {
            PatternSelection::Standard => PatternSet::standard(),
            PatternSelection::Extended => PatternSet::extended(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RoomConfig {
    pub id: RoomId,
    pub name: String,
    /// Stake per seat in minor currency units
    pub stake: u64,
    pub max_players: usize,
    /// Seats the bot roster may fill in one session
    pub max_bots: usize,
    pub speed: CallSpeed,
    pub patterns: PatternSelection,
    pub enabled: bool,
}

impl RoomConfig {
    pub fn new(id: impl Into<RoomId>, name: impl Into<String>, stake: u64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            stake,
            max_players: 10,
            max_bots: 6,
            speed: CallSpeed::Standard,
            patterns: PatternSelection::Standard,
            enabled: true,
        }
    }

    pub fn validate(&self) -> Result<(), RoomError> {
        if self.stake == 0 {
            return Err(RoomError::ZeroStake);
        }
        if self.max_players < 2 {
            return Err(RoomError::CapacityTooSmall {
                max_players: self.max_players,
            });
        }
        if self.max_bots > self.max_players {
            return Err(RoomError::BotCapExceedsCapacity {
                max_bots: self.max_bots,
                max_players: self.max_players,
            });
        }
        Ok(())
    }
}
