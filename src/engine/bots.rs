//! Autonomous bot players
//!
//! Bots join rooms, mark their cards and attempt claims with human-like lag.
//! A bot can only ever *attempt* a claim; the win evaluator alone decides
//! whether a claim stands, so no profile setting can fabricate a win.

use crate::errors::BotConfigError;
use dashmap::DashMap;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// Minimum per-tick claim chance once a card has a complete pattern. Keeps a
/// zero-win-rate bot from sitting on a finished card forever.
const COMPLETED_CLAIM_FLOOR: f64 = 0.35;

/// Ceiling on speculative (incomplete-pattern) claim attempts per tick
const SPECULATIVE_CLAIM_CEILING: f64 = 0.15;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkillTier {
    Novice,
    Seasoned,
    Shark,
}

impl SkillTier {
    fn claim_modifier(&self) -> f64 {
        match self {
            SkillTier::Novice => 0.85,
            SkillTier::Seasoned => 1.0,
            SkillTier::Shark => 1.15,
        }
    }
}

/// Validated behavior parameters for one bot identity
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BotProfile {
    pub id: String,
    pub name: String,
    /// Target win tendency, 0..=100; shapes claim promptness, never outcomes
    pub win_rate: u8,
    /// Eagerness to attempt claims before a pattern is complete, 0..=100
    pub aggression: u8,
    pub min_response_ms: u64,
    pub max_response_ms: u64,
    pub skill: SkillTier,
    pub chat_enabled: bool,
    /// Chat events per 100 active ticks, 0..=100; cosmetic timing only
    pub chat_frequency: u8,
    pub auto_join: bool,
    pub max_concurrent_games: usize,
    pub enabled: bool,
}

impl BotProfile {
    pub fn validate(&self) -> Result<(), BotConfigError> {
        if self.win_rate > 100 {
            return Err(BotConfigError::WinRateOutOfRange(self.win_rate));
        }
        if self.aggression > 100 {
            return Err(BotConfigError::AggressionOutOfRange(self.aggression));
        }
        if self.chat_frequency > 100 {
            return Err(BotConfigError::ChatFrequencyOutOfRange(self.chat_frequency));
        }
        if self.min_response_ms > self.max_response_ms {
            return Err(BotConfigError::ResponseWindowInverted {
                min_ms: self.min_response_ms,
                max_ms: self.max_response_ms,
            });
        }
        if self.max_concurrent_games == 0 {
            return Err(BotConfigError::ZeroConcurrency);
        }
        Ok(())
    }
}

/// Roster of bot identities plus per-bot live-game accounting
pub struct BotController {
    profiles: Vec<BotProfile>,
    active: DashMap<String, usize>,
}

impl BotController {
    /// Keeps every profile, including invalid ones; recruitment skips and
    /// logs those so one bad row cannot break a room.
    pub fn new(profiles: Vec<BotProfile>) -> Self {
        Self {
            profiles,
            active: DashMap::new(),
        }
    }

    pub fn profile(&self, id: &str) -> Option<&BotProfile> {
        self.profiles.iter().find(|p| p.id == id)
    }

    pub fn roster_len(&self) -> usize {
        self.profiles.len()
    }

    pub fn active_games(&self, id: &str) -> usize {
        self.active.get(id).map(|c| *c).unwrap_or(0)
    }

    /// Pick the next eligible bot for a session and reserve a game slot for
    /// it. Callers must `release` the slot when the session ends.
    pub fn recruit(&self, exclude: &HashSet<String>) -> Option<BotProfile> {
        for profile in &self.profiles {
            if exclude.contains(&profile.id) || !profile.enabled || !profile.auto_join {
                continue;
            }
            if let Err(e) = profile.validate() {
                tracing::warn!(bot = %profile.id, error = %e, "skipping bot with invalid profile");
                continue;
            }
            let mut count = self.active.entry(profile.id.clone()).or_insert(0);
            if *count >= profile.max_concurrent_games {
                continue;
            }
            *count += 1;
            return Some(profile.clone());
        }
        None
    }

    pub fn release(&self, id: &str) {
        if let Some(mut count) = self.active.get_mut(id) {
            *count = count.saturating_sub(1);
        }
    }

    /// Decide whether this bot attempts a claim this tick. Returns the
    /// sampled response delay when it does.
    pub fn consider_claim<R: Rng + ?Sized>(
        &self,
        profile: &BotProfile,
        progress: f64,
        rng: &mut R,
    ) -> Option<Duration> {
        let probability = claim_probability(profile, progress);
        if probability <= 0.0 || rng.gen::<f64>() >= probability {
            return None;
        }
        let span = profile.max_response_ms.saturating_sub(profile.min_response_ms);
        let delay_ms = if span == 0 {
            profile.min_response_ms
        } else {
            profile.min_response_ms + rng.gen_range(0..=span)
        };
        Some(Duration::from_millis(delay_ms))
    }

    /// Cosmetic chatter gate; the engine only logs when this fires
    pub fn maybe_chat<R: Rng + ?Sized>(&self, profile: &BotProfile, rng: &mut R) -> bool {
        profile.chat_enabled
            && profile.chat_frequency > 0
            && rng.gen_range(0..100) < profile.chat_frequency
    }
}

/// Per-tick claim-attempt probability. Below a complete pattern, attempts
/// are theater driven by aggression; at a complete pattern, win rate and
/// skill shape how promptly the bot claims, floored so it always claims
/// eventually.
fn claim_probability(profile: &BotProfile, progress: f64) -> f64 {
    let progress = progress.clamp(0.0, 1.0);
    if progress >= 1.0 {
        let eagerness = COMPLETED_CLAIM_FLOOR
            + (1.0 - COMPLETED_CLAIM_FLOOR) * f64::from(profile.win_rate) / 100.0;
        (eagerness * profile.skill.claim_modifier()).clamp(COMPLETED_CLAIM_FLOOR, 1.0)
    } else {
        let eagerness = f64::from(profile.aggression) / 100.0;
        (progress.powi(2) * eagerness * SPECULATIVE_CLAIM_CEILING).min(SPECULATIVE_CLAIM_CEILING)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn profile(id: &str) -> BotProfile {
        BotProfile {
            id: id.to_string(),
            name: format!("Bot {id}"),
            win_rate: 50,
            aggression: 40,
            min_response_ms: 200,
            max_response_ms: 900,
            skill: SkillTier::Seasoned,
            chat_enabled: false,
            chat_frequency: 0,
            auto_join: true,
            max_concurrent_games: 2,
            enabled: true,
        }
    }

    #[test]
    fn test_profile_validation() {
        assert!(profile("ok").validate().is_ok());

        let mut bad = profile("rate");
        bad.win_rate = 130;
        assert!(matches!(
            bad.validate(),
            Err(BotConfigError::WinRateOutOfRange(130))
        ));

        let mut bad = profile("window");
        bad.min_response_ms = 2_000;
        bad.max_response_ms = 100;
        assert!(matches!(
            bad.validate(),
            Err(BotConfigError::ResponseWindowInverted { .. })
        ));

        let mut bad = profile("games");
        bad.max_concurrent_games = 0;
        assert!(matches!(bad.validate(), Err(BotConfigError::ZeroConcurrency)));
    }

    #[test]
    fn test_recruit_respects_concurrency_cap() {
        let controller = BotController::new(vec![profile("solo")]);
        let exclude = HashSet::new();

        assert!(controller.recruit(&exclude).is_some());
        assert!(controller.recruit(&exclude).is_some());
        // max_concurrent_games = 2
        assert!(controller.recruit(&exclude).is_none());

        controller.release("solo");
        assert_eq!(controller.active_games("solo"), 1);
        assert!(controller.recruit(&exclude).is_some());
    }

    #[test]
    fn test_recruit_skips_disabled_and_excluded() {
        let mut off = profile("off");
        off.enabled = false;
        let mut manual = profile("manual");
        manual.auto_join = false;
        let controller = BotController::new(vec![off, manual, profile("live")]);

        let mut exclude = HashSet::new();
        let picked = controller.recruit(&exclude).expect("live bot available");
        assert_eq!(picked.id, "live");

        exclude.insert("live".to_string());
        controller.release("live");
        assert!(controller.recruit(&exclude).is_none());
    }

    #[test]
    fn test_recruit_isolates_invalid_profile() {
        let mut broken = profile("broken");
        broken.aggression = 255;
        let controller = BotController::new(vec![broken, profile("sound")]);
        let picked = controller.recruit(&HashSet::new()).expect("fallback bot");
        assert_eq!(picked.id, "sound");
    }

    #[test]
    fn test_claim_probability_shape() {
        let mut passive = profile("passive");
        passive.aggression = 0;
        assert_eq!(claim_probability(&passive, 0.5), 0.0);

        let eager = profile("eager");
        assert!(claim_probability(&eager, 0.2) < claim_probability(&eager, 0.9));
        assert!(claim_probability(&eager, 0.99) <= SPECULATIVE_CLAIM_CEILING);

        let mut cold = profile("cold");
        cold.win_rate = 0;
        assert!(claim_probability(&cold, 1.0) >= COMPLETED_CLAIM_FLOOR);

        let mut hot = profile("hot");
        hot.win_rate = 100;
        hot.skill = SkillTier::Shark;
        assert_eq!(claim_probability(&hot, 1.0), 1.0);
    }

    #[test]
    fn test_consider_claim_delay_within_window() {
        let controller = BotController::new(vec![]);
        let mut bot = profile("timed");
        bot.win_rate = 100;
        bot.skill = SkillTier::Shark;
        let mut rng = StdRng::seed_from_u64(9);
        for _ in 0..50 {
            let delay = controller
                .consider_claim(&bot, 1.0, &mut rng)
                .expect("certain claim at full progress");
            assert!(delay >= Duration::from_millis(bot.min_response_ms));
            assert!(delay <= Duration::from_millis(bot.max_response_ms));
        }
    }

    #[test]
    fn test_zero_width_response_window() {
        let controller = BotController::new(vec![]);
        let mut bot = profile("fixed");
        bot.win_rate = 100;
        bot.skill = SkillTier::Shark;
        bot.min_response_ms = 500;
        bot.max_response_ms = 500;
        let mut rng = StdRng::seed_from_u64(1);
        let delay = controller
            .consider_claim(&bot, 1.0, &mut rng)
            .expect("certain claim");
        assert_eq!(delay, Duration::from_millis(500));
    }
}
