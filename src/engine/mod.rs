//! Core game engine: cards, calling, win validation, bots, sessions and
//! cross-room scheduling

pub mod bots;
pub mod caller;
pub mod card;
pub mod events;
pub mod prize;
pub mod room;
pub mod scheduler;
pub mod session;
pub mod win;

pub use bots::{BotController, BotProfile};
pub use caller::NumberCaller;
pub use card::{Card, CardEngine};
pub use events::{EventBus, SessionEvent};
pub use prize::{CommissionSnapshot, PrizePoolCalculator};
pub use room::{CallSpeed, PatternSelection, RoomConfig};
pub use scheduler::{GameScheduler, ListScope};
pub use session::{GameSession, SessionSnapshot, SessionStatus, WinRecord};
pub use win::{Pattern, PatternSet, WinEvaluator};
