use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

use crate::season::{Season, FIRST_ROUND};
use crate::shared::{ArenaError, RoundIndex, SeasonId};

/// A round whose successor ranking must be prepared before it goes live.
///
/// Battles fought during round `n` score into ranking `n + 1`, so ranking
/// `source_round + 1` starts taking writes when `source_round` begins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRollover {
    pub season: Season,
    pub source_round: RoundIndex,
}

/// Block-index bookkeeping that decides when a rollover is due
#[async_trait]
pub trait RoundClock: Send + Sync {
    /// Due rollovers, oldest first within each season
    async fn pending_rollovers(&self) -> Result<Vec<PendingRollover>, ArenaError>;

    async fn complete(&self, rollover: &PendingRollover) -> Result<(), ArenaError>;
}

#[derive(Debug, Default)]
struct ClockState {
    seasons: Vec<Season>,
    tip: i64,
    completed: HashMap<SeasonId, RoundIndex>,
}

/// In-process clock driven by an externally advanced block tip.
///
/// A source round is due `lead_blocks` blocks before the round preceding it
/// ends, i.e. once `tip + lead_blocks + 1` reaches the source round's start.
#[derive(Debug, Default)]
pub struct BlockRoundClock {
    state: Mutex<ClockState>,
    lead_blocks: u64,
}

impl BlockRoundClock {
    pub fn new(seasons: Vec<Season>, lead_blocks: u64) -> Self {
        Self {
            state: Mutex::new(ClockState {
                seasons,
                ..ClockState::default()
            }),
            lead_blocks,
        }
    }

    fn state(&self) -> Result<MutexGuard<'_, ClockState>, ArenaError> {
        self.state
            .lock()
            .map_err(|_| ArenaError::Database("round clock lock poisoned".to_string()))
    }

    pub fn set_tip(&self, block_index: i64) -> Result<(), ArenaError> {
        self.state()?.tip = block_index;
        Ok(())
    }
}

#[async_trait]
impl RoundClock for BlockRoundClock {
    async fn pending_rollovers(&self) -> Result<Vec<PendingRollover>, ArenaError> {
        let state = self.state()?;
        let horizon_block = i64::try_from(self.lead_blocks)
            .ok()
            .and_then(|lead| state.tip.checked_add(lead)?.checked_add(1))
            .unwrap_or(i64::MAX);
        let mut pending = Vec::new();

        for season in &state.seasons {
            let Some(horizon) = season.round_at(horizon_block) else {
                continue;
            };
            let next_source = state
                .completed
                .get(&season.id)
                .map_or(FIRST_ROUND, |done| done + 1);

            for source_round in next_source..=horizon {
                pending.push(PendingRollover {
                    season: season.clone(),
                    source_round,
                });
            }
        }

        debug!(
            tip = state.tip,
            lead_blocks = self.lead_blocks,
            pending = pending.len(),
            "Pending rollovers computed"
        );
        Ok(pending)
    }

    async fn complete(&self, rollover: &PendingRollover) -> Result<(), ArenaError> {
        let mut state = self.state()?;
        let done = state
            .completed
            .entry(rollover.season.id)
            .or_insert(rollover.source_round);
        *done = (*done).max(rollover.source_round);
        Ok(())
    }
}
