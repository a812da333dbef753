use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::keys::RankingKey;
use crate::shared::{RoundIndex, SeasonId};

/// Rounds are numbered from 1 within a season
pub const FIRST_ROUND: RoundIndex = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ArenaType {
    /// Ordinary season, open to everyone above the score floor
    Season,
    /// Medal-gated season
    Championship,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Season {
    pub id: SeasonId,
    pub arena_type: ArenaType,
    /// Blocks per round
    pub round_interval: u64,
    pub required_medal_count: i32,
    pub start_block: i64,
}

impl Season {
    pub fn round_key(&self, round: RoundIndex) -> RankingKey {
        RankingKey::new(self.id, round)
    }

    pub fn previous_season_id(&self) -> SeasonId {
        self.id - 1
    }

    /// Whether entry depends on medals from the qualifying seasons
    pub fn is_medal_gated(&self) -> bool {
        self.arena_type == ArenaType::Championship && self.required_medal_count > 0
    }

    /// Round containing `block_index`, or `None` before the season starts
    pub fn round_at(&self, block_index: i64) -> Option<RoundIndex> {
        if block_index < self.start_block || self.round_interval == 0 {
            return None;
        }
        let elapsed = (block_index - self.start_block) as u64;
        RoundIndex::try_from(elapsed / self.round_interval)
            .ok()
            .map(|offset| FIRST_ROUND + offset)
    }
}

/// Outcome of preparing a new season
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeasonReport {
    pub season_id: SeasonId,
    pub previous_season_id: SeasonId,
    /// Participants read from the previous season above the score floor
    pub examined: usize,
    pub seeded: usize,
    pub excluded_by_medals: usize,
    pub clans: usize,
}
