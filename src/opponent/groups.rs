use serde::{Deserialize, Serialize};
use std::ops::Range;
use strum_macros::{Display, EnumString};

use crate::shared::ArenaError;

/// Percentile boundaries are expressed in basis points of the ranked population
pub const BASIS_POINTS: u64 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BattleOutcome {
    Win,
    Lose,
}

/// One weight class: a half-open percentile band plus its score deltas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpponentGroup {
    pub id: u8,
    pub min_bp: u32,
    pub max_bp: u32,
    pub win_score: i64,
    pub lose_score: i64,
}

impl OpponentGroup {
    /// Rank window `[floor(n * min), ceil(n * max))`, clamped to the population
    pub fn rank_window(&self, population: u64) -> Range<u64> {
        let start = population * u64::from(self.min_bp) / BASIS_POINTS;
        let end = (population * u64::from(self.max_bp)).div_ceil(BASIS_POINTS);
        start.min(population)..end.min(population)
    }

    pub fn score_change(&self, outcome: BattleOutcome) -> i64 {
        match outcome {
            BattleOutcome::Win => self.win_score,
            BattleOutcome::Lose => self.lose_score,
        }
    }
}

/// Immutable weight-class table injected into the selector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<OpponentGroup>", into = "Vec<OpponentGroup>")]
pub struct OpponentGroupTable {
    groups: Vec<OpponentGroup>,
}

impl OpponentGroupTable {
    pub fn new(groups: Vec<OpponentGroup>) -> Result<Self, ArenaError> {
        if groups.is_empty() {
            return Err(ArenaError::InvalidConfig(
                "opponent group table is empty".to_string(),
            ));
        }

        let mut ids: Vec<u8> = Vec::with_capacity(groups.len());
        for group in &groups {
            if group.min_bp >= group.max_bp || u64::from(group.max_bp) > BASIS_POINTS {
                return Err(ArenaError::InvalidConfig(format!(
                    "group {} has an invalid band {}..{}",
                    group.id, group.min_bp, group.max_bp
                )));
            }
            if ids.contains(&group.id) {
                return Err(ArenaError::InvalidConfig(format!(
                    "duplicate opponent group id {}",
                    group.id
                )));
            }
            ids.push(group.id);
        }

        Ok(Self { groups })
    }

    pub fn from_json(raw: &str) -> Result<Self, ArenaError> {
        serde_json::from_str(raw)
            .map_err(|e| ArenaError::InvalidConfig(format!("opponent groups: {}", e)))
    }

    pub fn groups(&self) -> &[OpponentGroup] {
        &self.groups
    }

    pub fn get(&self, group_id: u8) -> Option<&OpponentGroup> {
        self.groups.iter().find(|group| group.id == group_id)
    }

    pub fn score_change(&self, group_id: u8, outcome: BattleOutcome) -> Option<i64> {
        self.get(group_id).map(|group| group.score_change(outcome))
    }
}

impl Default for OpponentGroupTable {
    /// Top 5%, next 15%, middle 40%, next 20%, bottom 20%
    fn default() -> Self {
        let group = |id, min_bp, max_bp, win_score, lose_score| OpponentGroup {
            id,
            min_bp,
            max_bp,
            win_score,
            lose_score,
        };

        Self {
            groups: vec![
                group(1, 0, 500, 24, -1),
                group(2, 500, 2_000, 22, -2),
                group(3, 2_000, 6_000, 20, -3),
                group(4, 6_000, 8_000, 18, -4),
                group(5, 8_000, 10_000, 16, -5),
            ],
        }
    }
}

impl TryFrom<Vec<OpponentGroup>> for OpponentGroupTable {
    type Error = ArenaError;

    fn try_from(groups: Vec<OpponentGroup>) -> Result<Self, Self::Error> {
        Self::new(groups)
    }
}

impl From<OpponentGroupTable> for Vec<OpponentGroup> {
    fn from(table: OpponentGroupTable) -> Self {
        table.groups
    }
}
