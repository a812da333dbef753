// Public API - what other modules can use
pub use clock::{BlockRoundClock, PendingRollover, RoundClock};
pub use coordinator::{RolloverOutcome, RolloverReport, RoundRolloverCoordinator};
pub use task::start_rollover_task;

// Internal modules
mod clock;
mod coordinator;
mod task;
