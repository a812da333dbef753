// Public API - what other modules can use
pub use backend::{RankingBackend, RankingBackendKind};
pub use models::RankingEntry;
pub use repository::ParticipantRankingRepository;
pub use service::RankingService;

// Internal modules
mod backend;
mod models;
mod repository;
mod service;
