//! Tombola - multiplayer number-bingo room/game engine
//!
//! The engine owns the full lifecycle of a round: room formation, the join
//! countdown, cryptographically fair number calling, win-pattern validation,
//! autonomous bot play and prize settlement. Everything around it (wallet
//! ledger, persistence, admin tooling, delivery) is an external collaborator
//! reached through the traits in [`store`].

pub mod config;
pub mod engine;
pub mod errors;
pub mod metrics;
pub mod store;

pub use config::EngineConfig;
pub use engine::scheduler::{GameScheduler, ListScope};
pub use engine::session::{SessionSnapshot, SessionStatus};
pub use errors::{EngineError, EngineResult};
