// Library crate for the seasonal arena ranking engine
// This file exposes the public API for the simulator binary and integration tests

pub mod clan;
pub mod config;
pub mod group_ranking;
pub mod identity;
pub mod keys;
pub mod opponent;
pub mod ranking;
pub mod rollover;
pub mod roster;
pub mod season;
pub mod shared;
pub mod shutdown;
pub mod status;
pub mod store;

// Re-export commonly used types for easier access in tests
pub use clan::{ClanRankingRepository, ClanScore, GlobalClanRankingRepository, RankedClan};
pub use config::{ArenaConfig, SelectionRetryPolicy};
pub use group_ranking::{ScoreGroup, ScoreGroupRankingRepository};
pub use identity::AvatarAddress;
pub use keys::RankingKey;
pub use opponent::{
    BattleOpponent, BattleOutcome, BattleResult, OpponentGroup, OpponentGroupTable,
    OpponentSelection, OpponentService,
};
pub use ranking::{
    ParticipantRankingRepository, RankingBackend, RankingBackendKind, RankingEntry,
    RankingService,
};
pub use rollover::{
    start_rollover_task, BlockRoundClock, PendingRollover, RolloverOutcome, RolloverReport,
    RoundClock, RoundRolloverCoordinator,
};
pub use roster::{InMemoryRosterRepository, MedalRecord, ParticipantRecord, RosterRepository};
pub use season::{ArenaType, Season, SeasonReport, SeasonTransitionCoordinator, FIRST_ROUND};
pub use shared::{ArenaError, ClanId, RoundIndex, SeasonId};
pub use shutdown::{ShutdownSignal, ShutdownTrigger};
pub use status::RankingStatus;
pub use store::{InMemoryScoreStore, ScoreStore};
