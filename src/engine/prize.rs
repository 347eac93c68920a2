//! Prize pool arithmetic
//!
//! All money is in minor currency units and the commission rate is basis
//! points, so pool math is exact integer work with floor rounding. The
//! commission arrives as a versioned snapshot taken at computation time;
//! nothing here caches it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const BPS_DENOMINATOR: u64 = 10_000;

/// Commission rate captured from the platform config at a point in time
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionSnapshot {
    /// Platform cut in basis points, 0..=10_000
    pub rate_bps: u16,
    /// Bumped by the provider on every rate change
    pub version: u64,
    pub fetched_at: DateTime<Utc>,
}

impl CommissionSnapshot {
    pub fn new(rate_bps: u16, version: u64) -> Self {
        Self {
            rate_bps,
            version,
            fetched_at: Utc::now(),
        }
    }
}

/// Stateless pool math over stake, seat count and commission
pub struct PrizePoolCalculator;

impl PrizePoolCalculator {
    /// Pool for the current roster: stake * n minus the platform cut
    pub fn live_pool(stake: u64, participants: usize, commission: &CommissionSnapshot) -> u64 {
        Self::net(stake, participants, commission)
    }

    /// Theoretical full-room pool shown alongside the live figure
    pub fn base_pool(stake: u64, max_players: usize, commission: &CommissionSnapshot) -> u64 {
        Self::net(stake, max_players, commission)
    }

    fn net(stake: u64, seats: usize, commission: &CommissionSnapshot) -> u64 {
        let rate = u128::from(commission.rate_bps.min(BPS_DENOMINATOR as u16));
        let gross = u128::from(stake) * seats as u128;
        let net = gross * (u128::from(BPS_DENOMINATOR) - rate) / u128::from(BPS_DENOMINATOR);
        net as u64
    }
}
