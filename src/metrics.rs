//! Engine counters for the operator dashboard

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

pub struct EngineMonitor {
    start_time: Instant,
    sessions_started: AtomicU64,
    sessions_finished: AtomicU64,
    sessions_cancelled: AtomicU64,
    draws: AtomicU64,
    wins: AtomicU64,
    stakes_collected: AtomicU64,
    prizes_paid: AtomicU64,
}

impl EngineMonitor {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            sessions_started: AtomicU64::new(0),
            sessions_finished: AtomicU64::new(0),
            sessions_cancelled: AtomicU64::new(0),
            draws: AtomicU64::new(0),
            wins: AtomicU64::new(0),
            stakes_collected: AtomicU64::new(0),
            prizes_paid: AtomicU64::new(0),
        }
    }

    pub fn record_session_started(&self) {
        self.sessions_started.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_session_finished(&self) {
        self.sessions_finished.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_session_cancelled(&self) {
        self.sessions_cancelled.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_draw(&self) {
        self.draws.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_win(&self, prize: u64) {
        self.wins.fetch_add(1, Ordering::SeqCst);
        self.prizes_paid.fetch_add(prize, Ordering::SeqCst);
    }

    pub fn record_stake(&self, stake: u64) {
        self.stakes_collected.fetch_add(stake, Ordering::SeqCst);
    }

    pub fn total_runtime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Average calls per second over the engine's lifetime
    pub fn average_call_rate(&self) -> f64 {
        let total_seconds = self.total_runtime().as_secs_f64();
        if total_seconds < 1.0 {
            return 0.0;
        }
        self.draws.load(Ordering::SeqCst) as f64 / total_seconds
    }

    pub fn snapshot(&self) -> MonitorSnapshot {
        MonitorSnapshot {
            uptime_secs: self.total_runtime().as_secs(),
            sessions_started: self.sessions_started.load(Ordering::SeqCst),
            sessions_finished: self.sessions_finished.load(Ordering::SeqCst),
            sessions_cancelled: self.sessions_cancelled.load(Ordering::SeqCst),
            draws: self.draws.load(Ordering::SeqCst),
            wins: self.wins.load(Ordering::SeqCst),
            stakes_collected: self.stakes_collected.load(Ordering::SeqCst),
            prizes_paid: self.prizes_paid.load(Ordering::SeqCst),
        }
    }
}

impl Default for EngineMonitor {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time counter values
#[derive(Clone, Debug)]
pub struct MonitorSnapshot {
    pub uptime_secs: u64,
    pub sessions_started: u64,
    pub sessions_finished: u64,
    pub sessions_cancelled: u64,
    pub draws: u64,
    pub wins: u64,
    pub stakes_collected: u64,
    pub prizes_paid: u64,
}
