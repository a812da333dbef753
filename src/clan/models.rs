use serde::{Deserialize, Serialize};

use crate::shared::ClanId;

/// A clan's aggregate score in the global clan ranking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClanScore {
    pub clan_id: ClanId,
    pub score: i64,
}

impl ClanScore {
    pub fn new(clan_id: ClanId, score: i64) -> Self {
        Self { clan_id, score }
    }
}

/// Leaderboard row; tied clans share the lowest rank of their block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedClan {
    /// 1-based
    pub rank: u64,
    pub clan_id: ClanId,
    pub score: i64,
}
