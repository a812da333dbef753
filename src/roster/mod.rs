// Public API - what other modules can use
pub use models::{MedalRecord, ParticipantRecord};
pub use repository::{InMemoryRosterRepository, PostgresRosterRepository, RosterRepository};

// Internal modules
mod models;
mod repository;
