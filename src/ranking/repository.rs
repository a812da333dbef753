use rand::Rng;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use super::models::RankingEntry;
use crate::config::ArenaConfig;
use crate::identity::AvatarAddress;
use crate::keys::{participant_member, RankingKey, SEASON_KEY_PREFIX};
use crate::opponent::selector::pick_ranks;
use crate::opponent::{BattleOpponent, OpponentGroupTable, OpponentSelection};
use crate::shared::ArenaError;
use crate::status::{RankingStatus, StatusFlag};
use crate::store::{ScoreStore, ScoredMember, StoreOp};

/// Per-participant ordered set for one (season, round)
#[derive(Clone)]
pub struct ParticipantRankingRepository {
    store: Arc<dyn ScoreStore>,
    status: StatusFlag,
    config: Arc<ArenaConfig>,
}

fn scored_members(entries: &[RankingEntry]) -> Vec<ScoredMember> {
    entries
        .iter()
        .map(|entry| ScoredMember::new(participant_member(&entry.address), entry.score))
        .collect()
}

fn is_participant_ranking_key(key: &str) -> bool {
    let parts: Vec<&str> = key.split(':').collect();
    matches!(
        parts.as_slice(),
        ["season", _, "round", _, "ranking"] | ["season", _, "round", _, "ranking", "status"]
    )
}

impl ParticipantRankingRepository {
    pub fn new(store: Arc<dyn ScoreStore>, config: Arc<ArenaConfig>) -> Self {
        Self {
            status: StatusFlag::new(store.clone()),
            store,
            config,
        }
    }

    pub async fn get_status(&self, key: RankingKey) -> Result<Option<RankingStatus>, ArenaError> {
        self.status.read(&key.ranking_status()).await
    }

    /// Replaces the round's ranking with `entries` and leaves it DONE.
    ///
    /// Re-running with the same entries yields the same set.
    #[instrument(skip(self, entries), fields(entry_count = entries.len()))]
    pub async fn init_ranking(
        &self,
        key: RankingKey,
        entries: &[RankingEntry],
        round_interval: u64,
    ) -> Result<(), ArenaError> {
        let ttl = self.config.cache_ttl(round_interval);
        let ranking_key = key.ranking();
        let ops = vec![
            StoreOp::SortedSetReplace {
                key: ranking_key.clone(),
                entries: scored_members(entries),
            },
            StoreOp::Expire {
                key: ranking_key,
                ttl,
            },
        ];

        self.status
            .load_guarded(&key.ranking_status(), ops, ttl)
            .await?;

        info!(
            season_id = key.season_id,
            round = key.round,
            entry_count = entries.len(),
            "Participant ranking initialized"
        );
        Ok(())
    }

    /// Holds the ranking at INITIALIZING while batches are appended
    pub async fn begin_initialization(&self, key: RankingKey) -> Result<(), ArenaError> {
        self.status
            .transition(&key.ranking_status(), RankingStatus::Initializing, None)
            .await?;
        Ok(())
    }

    /// Writes absolute scores without touching the status flag
    #[instrument(skip(self, entries), fields(entry_count = entries.len()))]
    pub async fn append_entries(
        &self,
        key: RankingKey,
        entries: &[RankingEntry],
    ) -> Result<(), ArenaError> {
        if entries.is_empty() {
            return Ok(());
        }

        let ranking_key = key.ranking();
        let ops = entries
            .iter()
            .map(|entry| StoreOp::SortedSetAdd {
                key: ranking_key.clone(),
                member: participant_member(&entry.address),
                score: entry.score,
            })
            .collect();

        self.store.apply_atomic(ops).await
    }

    /// Ends an append session: sets the key expiry and marks the ranking DONE
    pub async fn mark_done(&self, key: RankingKey, round_interval: u64) -> Result<(), ArenaError> {
        let ttl = self.config.cache_ttl(round_interval);
        self.store.expire(&key.ranking(), ttl).await?;
        self.status
            .transition(&key.ranking_status(), RankingStatus::Done, Some(ttl))
            .await?;
        Ok(())
    }

    /// Adds `delta` to the participant's score; an absent participant starts from zero
    #[instrument(skip(self))]
    pub async fn update_score(
        &self,
        key: RankingKey,
        address: &AvatarAddress,
        delta: i64,
    ) -> Result<i64, ArenaError> {
        self.status.ensure_done(&key.ranking_status()).await?;

        let new_score = self
            .store
            .sorted_set_increment(&key.ranking(), &participant_member(address), delta)
            .await?;

        debug!(%address, delta, new_score, "Participant score updated");
        Ok(new_score)
    }

    pub async fn get_score(
        &self,
        key: RankingKey,
        address: &AvatarAddress,
    ) -> Result<Option<i64>, ArenaError> {
        self.store
            .sorted_set_score(&key.ranking(), &participant_member(address))
            .await
    }

    /// 1-based position: the number of participants scoring at least as much
    pub async fn get_rank(&self, key: RankingKey, address: &AvatarAddress) -> Result<u64, ArenaError> {
        let score = self
            .get_score(key, address)
            .await?
            .ok_or_else(|| ArenaError::NotRanked(address.to_string()))?;

        self.store
            .sorted_set_count_at_least(&key.ranking(), score)
            .await
    }

    pub async fn get_ranking_count(&self, key: RankingKey) -> Result<u64, ArenaError> {
        self.store.sorted_set_len(&key.ranking()).await
    }

    pub async fn get_scores(&self, key: RankingKey) -> Result<Vec<RankingEntry>, ArenaError> {
        self.store
            .sorted_set_range_desc(&key.ranking(), 0, None)
            .await?
            .iter()
            .map(RankingEntry::from_scored)
            .collect()
    }

    /// Descending page starting at 0-based rank `offset`
    pub async fn get_entries_page(
        &self,
        key: RankingKey,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<RankingEntry>, ArenaError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        self.store
            .sorted_set_range_desc(&key.ranking(), offset, Some(offset + limit - 1))
            .await?
            .iter()
            .map(RankingEntry::from_scored)
            .collect()
    }

    /// Copies the whole set from `source` over `target` in one batch.
    ///
    /// The target is held at COPYING_IN_PROGRESS until the batch lands.
    #[instrument(skip(self))]
    pub async fn copy_round_data(
        &self,
        source: RankingKey,
        target: RankingKey,
        round_interval: u64,
    ) -> Result<(), ArenaError> {
        self.status.ensure_done(&source.ranking_status()).await?;
        self.begin_copy(target).await?;

        let ttl = self.config.cache_ttl(round_interval);
        let target_key = target.ranking();
        self.store
            .apply_atomic(vec![
                StoreOp::SortedSetCopy {
                    source: source.ranking(),
                    target: target_key.clone(),
                },
                StoreOp::Expire {
                    key: target_key,
                    ttl,
                },
                StatusFlag::status_op(&target.ranking_status(), RankingStatus::Done, Some(ttl)),
            ])
            .await?;

        info!(
            season_id = source.season_id,
            source_round = source.round,
            target_round = target.round,
            "Participant ranking copied"
        );
        Ok(())
    }

    pub async fn begin_copy(&self, target: RankingKey) -> Result<(), ArenaError> {
        self.status
            .transition(
                &target.ranking_status(),
                RankingStatus::CopyingInProgress,
                None,
            )
            .await?;
        Ok(())
    }

    pub async fn ensure_ready(&self, key: RankingKey) -> Result<(), ArenaError> {
        self.status.ensure_done(&key.ranking_status()).await
    }

    /// Deletes every participant ranking and status key across all seasons
    #[instrument(skip(self))]
    pub async fn clear_all(&self) -> Result<u64, ArenaError> {
        let keys = self.store.keys_with_prefix(SEASON_KEY_PREFIX).await?;
        let doomed: Vec<StoreOp> = keys
            .into_iter()
            .filter(|key| is_participant_ranking_key(key))
            .map(|key| StoreOp::Delete { key })
            .collect();

        let deleted = doomed.len() as u64;
        self.store.apply_atomic(doomed).await?;

        warn!(deleted, "Cleared all participant rankings");
        Ok(deleted)
    }

    /// One opponent per weight class, drawn uniformly from each rank window
    #[instrument(skip(self, table, rng))]
    pub async fn select_battle_opponents<R: Rng + Send>(
        &self,
        key: RankingKey,
        address: &AvatarAddress,
        table: &OpponentGroupTable,
        rng: &mut R,
    ) -> Result<OpponentSelection, ArenaError> {
        self.status.ensure_done(&key.ranking_status()).await?;

        let ranking_key = key.ranking();
        let population = self.store.sorted_set_len(&ranking_key).await?;
        let own_rank = self
            .store
            .sorted_set_rank_desc(&ranking_key, &participant_member(address))
            .await?
            .ok_or_else(|| ArenaError::NotRanked(address.to_string()))?;

        let mut selection = OpponentSelection::new();
        for (group_id, picked) in pick_ranks(table, population, own_rank, rng) {
            let opponent = match picked {
                Some(rank) => self.opponent_at(&ranking_key, rank).await?,
                None => None,
            };
            selection.insert(group_id, opponent);
        }

        debug!(
            %address,
            population,
            own_rank,
            matched = selection.values().filter(|o| o.is_some()).count(),
            "Battle opponents selected"
        );
        Ok(selection)
    }

    async fn opponent_at(
        &self,
        ranking_key: &str,
        rank: u64,
    ) -> Result<Option<BattleOpponent>, ArenaError> {
        let found = self
            .store
            .sorted_set_range_desc(ranking_key, rank, Some(rank))
            .await?;

        found
            .first()
            .map(|scored| {
                RankingEntry::from_scored(scored).map(|entry| BattleOpponent {
                    address: entry.address,
                    score: entry.score,
                    rank,
                })
            })
            .transpose()
    }
}
