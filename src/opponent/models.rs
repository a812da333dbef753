use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::identity::AvatarAddress;

/// Opponent picked for one weight class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BattleOpponent {
    pub address: AvatarAddress,
    pub score: i64,
    /// 0-based descending rank at selection time
    pub rank: u64,
}

/// Weight-class id to opponent; `None` when the class window has no candidate
pub type OpponentSelection = BTreeMap<u8, Option<BattleOpponent>>;

/// Score movement applied after a battle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BattleResult {
    pub group_id: u8,
    pub score_change: i64,
    pub new_score: i64,
}
