// Ordered-store abstraction the rankings are built on
pub mod memory;
pub mod repository;
mod sorted_set;

pub use memory::InMemoryScoreStore;
pub use repository::{ScoreStore, ScoredMember, StoreOp};
