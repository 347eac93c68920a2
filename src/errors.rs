//! Error types for the tombola game engine
//!
//! One enum per concern, collected under [`EngineError`] for callers that
//! only want a single error type at the crate boundary.

use crate::engine::session::SessionStatus;
use uuid::Uuid;

/// Root error type for engine operations
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("room error: {0}")]
    Room(#[from] RoomError),

    #[error("caller error: {0}")]
    Caller(#[from] CallerError),

    #[error("bot configuration error: {0}")]
    BotConfig(#[from] BotConfigError),

    #[error("session error: {0}")]
    Session(#[from] SessionError),

    #[error("scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),
}

/// Convenience type alias for Results
pub type EngineResult<T> = Result<T, EngineError>;

/// Configuration loading and validation errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid configuration value: {0}")]
    InvalidValue(String),

    #[error("configuration logical inconsistency: {0}")]
    LogicalInconsistency(String),

    #[error("failed to load configuration: {0}")]
    LoadFailed(String),
}

/// Room configuration errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum RoomError {
    #[error("stake must be at least one minor currency unit")]
    ZeroStake,

    #[error("room capacity {max_players} cannot host a game (minimum 2 seats)")]
    CapacityTooSmall { max_players: usize },

    #[error("bot cap {max_bots} exceeds room capacity {max_players}")]
    BotCapExceedsCapacity { max_bots: usize, max_players: usize },
}

/// Number-draw errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CallerError {
    #[error("all 75 numbers have been called")]
    PoolExhausted,
}

/// Bot profile validation errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum BotConfigError {
    #[error("win rate {0} outside 0..=100")]
    WinRateOutOfRange(u8),

    #[error("aggression {0} outside 0..=100")]
    AggressionOutOfRange(u8),

    #[error("chat frequency {0} outside 0..=100")]
    ChatFrequencyOutOfRange(u8),

    #[error("response window inverted: min {min_ms}ms > max {max_ms}ms")]
    ResponseWindowInverted { min_ms: u64, max_ms: u64 },

    #[error("max_concurrent_games must be at least 1")]
    ZeroConcurrency,
}

/// Errors surfaced by a single game session
#[derive(Debug, Clone, thiserror::Error)]
pub enum SessionError {
    #[error("invalid status transition {from:?} -> {to:?}")]
    InvalidTransition {
        from: SessionStatus,
        to: SessionStatus,
    },

    #[error("session already ended ({0:?})")]
    Terminal(SessionStatus),

    #[error("joins are closed once the game is active")]
    JoinsClosed,

    #[error("session is full ({max_players} seats)")]
    Full { max_players: usize },

    #[error("{participant} already joined this session")]
    AlreadyJoined { participant: String },

    #[error("stake debit rejected for {participant}: {detail}")]
    StakeRejected { participant: String, detail: String },

    #[error("session task is no longer running")]
    ChannelClosed,
}

/// Errors surfaced by the cross-room scheduler
#[derive(Debug, Clone, thiserror::Error)]
pub enum SchedulerError {
    #[error("unknown session {0}")]
    UnknownSession(Uuid),

    #[error("unknown room {0}")]
    UnknownRoom(String),

    #[error("room {0} has no open session")]
    NoOpenSession(String),

    #[error("scheduler has been shut down")]
    ShutDown,
}
