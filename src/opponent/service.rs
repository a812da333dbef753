use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use super::groups::{BattleOutcome, OpponentGroupTable};
use super::models::{BattleResult, OpponentSelection};
use crate::config::SelectionRetryPolicy;
use crate::identity::AvatarAddress;
use crate::keys::RankingKey;
use crate::ranking::RankingService;
use crate::shared::{ArenaError, ClanId};

/// Battle-facing entry point: matchmaking reads and post-battle score writes
pub struct OpponentService {
    ranking: Arc<RankingService>,
    table: OpponentGroupTable,
    retry: SelectionRetryPolicy,
}

impl OpponentService {
    pub fn new(
        ranking: Arc<RankingService>,
        table: OpponentGroupTable,
        retry: SelectionRetryPolicy,
    ) -> Self {
        Self {
            ranking,
            table,
            retry,
        }
    }

    pub fn table(&self) -> &OpponentGroupTable {
        &self.table
    }

    /// Picks one opponent per weight class.
    ///
    /// A ranking that is not DONE is retried a bounded number of times before
    /// the NotReady error reaches the caller.
    #[instrument(skip(self))]
    pub async fn select_battle_opponents(
        &self,
        address: &AvatarAddress,
        key: RankingKey,
    ) -> Result<OpponentSelection, ArenaError> {
        let mut rng = StdRng::from_rng(&mut rand::rng());
        let mut attempt = 1;

        loop {
            let result = self
                .ranking
                .backend()
                .select_battle_opponents(key, address, &self.table, &mut rng)
                .await;

            match result {
                Err(ArenaError::NotReady { key: ranking_key, status })
                    if attempt < self.retry.max_attempts =>
                {
                    warn!(
                        ranking_key = %ranking_key,
                        %status,
                        attempt,
                        "Ranking not ready, retrying opponent selection"
                    );
                    attempt += 1;
                    tokio::time::sleep(self.retry.backoff).await;
                }
                other => return other,
            }
        }
    }

    /// Applies the weight class's win or lose delta to the participant and its clan.
    ///
    /// `key` is the ranking the battle scores into: round `n + 1` for a battle
    /// fought during round `n`.
    #[instrument(skip(self))]
    pub async fn record_battle_result(
        &self,
        address: &AvatarAddress,
        clan_id: Option<ClanId>,
        key: RankingKey,
        group_id: u8,
        outcome: BattleOutcome,
    ) -> Result<BattleResult, ArenaError> {
        let score_change = self
            .table
            .score_change(group_id, outcome)
            .ok_or_else(|| ArenaError::Validation(format!("unknown opponent group {}", group_id)))?;

        let new_score = self
            .ranking
            .update_score(key, address, clan_id, score_change)
            .await?;

        info!(%address, group_id, %outcome, score_change, new_score, "Battle result recorded");
        Ok(BattleResult {
            group_id,
            score_change,
            new_score,
        })
    }
}
