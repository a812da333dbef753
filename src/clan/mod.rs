// Public API - what other modules can use
pub use global::GlobalClanRankingRepository;
pub use models::{ClanScore, RankedClan};
pub use repository::ClanRankingRepository;

// Internal modules
mod global;
mod models;
mod repository;
