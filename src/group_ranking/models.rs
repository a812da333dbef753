use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Participants sharing one score, positioned within the round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreGroup {
    pub score: i64,
    /// 0-based participant-equivalent rank of the group's first member
    pub first_rank: u64,
    pub size: u64,
}

impl ScoreGroup {
    pub fn ranks(&self) -> Range<u64> {
        self.first_rank..self.first_rank + self.size
    }

    pub fn last_rank(&self) -> u64 {
        self.first_rank + self.size.saturating_sub(1)
    }

    pub fn overlaps(&self, window: &Range<u64>) -> bool {
        self.first_rank < window.end && window.start < self.first_rank + self.size
    }
}
