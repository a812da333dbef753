// Public API - what other modules can use
pub use models::ScoreGroup;
pub use repository::ScoreGroupRankingRepository;

// Internal modules
mod models;
mod repository;
