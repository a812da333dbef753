// Public API - what other modules can use
pub use coordinator::SeasonTransitionCoordinator;
pub use models::{ArenaType, Season, SeasonReport, FIRST_ROUND};

// Internal modules
mod coordinator;
mod models;
