use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

use crate::opponent::OpponentGroupTable;
use crate::ranking::RankingBackendKind;
use crate::shared::ArenaError;

/// Bounded retry applied when a ranking is not ready for opponent selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionRetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for SelectionRetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(200),
        }
    }
}

/// Engine-wide configuration, injected into every service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArenaConfig {
    /// Seconds per block on the chain driving round boundaries
    pub block_interval_seconds: u64,
    /// How many rounds a ranking key outlives its own round
    pub cache_round_count: u64,
    /// Participants read per page while preparing a season
    pub season_batch_size: usize,
    /// Participants read per page while rolling a round over
    pub rollover_batch_size: usize,
    /// Score every participant starts a season with
    pub starting_score: i64,
    /// Minimum previous-season score needed to carry over
    pub carry_over_min_score: i64,
    /// Members whose scores make up a clan's aggregate
    pub clan_top_members: usize,
    pub selection_retry: SelectionRetryPolicy,
    /// How often the rollover task asks the round clock for work
    pub rollover_poll_interval: Duration,
    /// Blocks before a round ends at which its successor's ranking is prepared
    pub rollover_lead_blocks: u64,
    pub opponent_groups: OpponentGroupTable,
    pub ranking_backend: RankingBackendKind,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            block_interval_seconds: 8,
            cache_round_count: 5,
            season_batch_size: 1500,
            rollover_batch_size: 1000,
            starting_score: 1000,
            carry_over_min_score: 1001,
            clan_top_members: 10,
            selection_retry: SelectionRetryPolicy::default(),
            rollover_poll_interval: Duration::from_secs(60),
            rollover_lead_blocks: 9,
            opponent_groups: OpponentGroupTable::default(),
            ranking_backend: RankingBackendKind::default(),
        }
    }
}

fn env_parse<T: FromStr>(name: &str, target: &mut T) -> Result<(), ArenaError> {
    if let Ok(raw) = std::env::var(name) {
        *target = raw
            .trim()
            .parse()
            .map_err(|_| ArenaError::InvalidConfig(format!("{} has invalid value {:?}", name, raw)))?;
    }
    Ok(())
}

impl ArenaConfig {
    /// Defaults overridden by `ARENA_*` environment variables
    pub fn from_env() -> Result<Self, ArenaError> {
        let mut config = Self::default();

        env_parse("ARENA_BLOCK_INTERVAL_SECONDS", &mut config.block_interval_seconds)?;
        env_parse("ARENA_CACHE_ROUND_COUNT", &mut config.cache_round_count)?;
        env_parse("ARENA_SEASON_BATCH_SIZE", &mut config.season_batch_size)?;
        env_parse("ARENA_ROLLOVER_BATCH_SIZE", &mut config.rollover_batch_size)?;
        env_parse("ARENA_STARTING_SCORE", &mut config.starting_score)?;
        env_parse("ARENA_CARRY_OVER_MIN_SCORE", &mut config.carry_over_min_score)?;
        env_parse("ARENA_CLAN_TOP_MEMBERS", &mut config.clan_top_members)?;
        env_parse("ARENA_RANKING_BACKEND", &mut config.ranking_backend)?;
        env_parse("ARENA_ROLLOVER_LEAD_BLOCKS", &mut config.rollover_lead_blocks)?;
        env_parse(
            "ARENA_SELECTION_MAX_ATTEMPTS",
            &mut config.selection_retry.max_attempts,
        )?;

        let mut backoff_ms = config.selection_retry.backoff.as_millis() as u64;
        env_parse("ARENA_SELECTION_BACKOFF_MS", &mut backoff_ms)?;
        config.selection_retry.backoff = Duration::from_millis(backoff_ms);

        let mut poll_secs = config.rollover_poll_interval.as_secs();
        env_parse("ARENA_ROLLOVER_POLL_SECS", &mut poll_secs)?;
        config.rollover_poll_interval = Duration::from_secs(poll_secs);

        if let Ok(raw) = std::env::var("ARENA_OPPONENT_GROUPS") {
            config.opponent_groups = OpponentGroupTable::from_json(&raw)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ArenaError> {
        if self.season_batch_size == 0 || self.rollover_batch_size == 0 {
            return Err(ArenaError::InvalidConfig(
                "batch sizes must be positive".to_string(),
            ));
        }
        if self.selection_retry.max_attempts == 0 {
            return Err(ArenaError::InvalidConfig(
                "selection retry needs at least one attempt".to_string(),
            ));
        }
        if self.clan_top_members == 0 {
            return Err(ArenaError::InvalidConfig(
                "clan aggregate needs at least one member".to_string(),
            ));
        }
        Ok(())
    }

    /// Lifetime of a round's keys: `round_interval` blocks, times the block
    /// interval, times the number of rounds kept around
    pub fn cache_ttl(&self, round_interval: u64) -> Duration {
        Duration::from_secs(
            round_interval
                .saturating_mul(self.block_interval_seconds)
                .saturating_mul(self.cache_round_count),
        )
    }
}
