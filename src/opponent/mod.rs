// Public API - what other modules can use
pub use groups::{BattleOutcome, OpponentGroup, OpponentGroupTable, BASIS_POINTS};
pub use models::{BattleOpponent, BattleResult, OpponentSelection};
pub use service::OpponentService;

// Internal modules
mod groups;
pub mod models;
pub mod selector;
mod service;
