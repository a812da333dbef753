use rand::Rng;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use super::models::ScoreGroup;
use crate::config::ArenaConfig;
use crate::identity::AvatarAddress;
use crate::keys::{group_member, parse_participant_member, participant_member, RankingKey};
use crate::opponent::{BattleOpponent, OpponentGroupTable, OpponentSelection};
use crate::ranking::RankingEntry;
use crate::shared::ArenaError;
use crate::status::{RankingStatus, StatusFlag};
use crate::store::{ScoreStore, ScoredMember, StoreOp};

/// Score-bucketed ranking: one ordered-set entry per distinct score.
///
/// Layout per round:
/// - `ranking-group` ordered set of `group:{score}` tokens scored by the score
/// - `group:{score}` hash bucket of participant tokens holding that score
/// - `ranking-group:index` hash of participant token to current score
///
/// A group token is present in the ordered set iff its bucket is non-empty.
/// Every write that can empty a bucket removes the token in the same batch.
#[derive(Clone)]
pub struct ScoreGroupRankingRepository {
    store: Arc<dyn ScoreStore>,
    status: StatusFlag,
    config: Arc<ArenaConfig>,
}

fn parse_score(raw: &str) -> Result<i64, ArenaError> {
    raw.parse()
        .map_err(|_| ArenaError::Validation(format!("invalid group score {}", raw)))
}

impl ScoreGroupRankingRepository {
    pub fn new(store: Arc<dyn ScoreStore>, config: Arc<ArenaConfig>) -> Self {
        Self {
            status: StatusFlag::new(store.clone()),
            store,
            config,
        }
    }

    pub async fn get_status(&self, key: RankingKey) -> Result<Option<RankingStatus>, ArenaError> {
        self.status.read(&key.grouped_status()).await
    }

    pub async fn ensure_ready(&self, key: RankingKey) -> Result<(), ArenaError> {
        self.status.ensure_done(&key.grouped_status()).await
    }

    /// Ops moving `member` from its old bucket to `new_score`
    fn move_ops(key: RankingKey, member: &str, old_score: Option<i64>, new_score: i64) -> Vec<StoreOp> {
        let grouped = key.grouped_ranking();
        let mut ops = Vec::with_capacity(5);

        if let Some(old) = old_score {
            let old_bucket = key.score_bucket(old);
            ops.push(StoreOp::HashDelete {
                key: old_bucket.clone(),
                field: member.to_string(),
            });
            ops.push(StoreOp::SortedSetRemoveIfHashEmpty {
                sorted_key: grouped.clone(),
                member: group_member(old),
                hash_key: old_bucket,
            });
        }

        ops.push(StoreOp::HashSet {
            key: key.score_bucket(new_score),
            field: member.to_string(),
            value: new_score.to_string(),
        });
        ops.push(StoreOp::SortedSetAdd {
            key: grouped,
            member: group_member(new_score),
            score: new_score,
        });
        ops.push(StoreOp::HashSet {
            key: key.grouped_index(),
            field: member.to_string(),
            value: new_score.to_string(),
        });
        ops
    }

    /// Moves a participant between score buckets; `old_score == None` is a first join.
    ///
    /// Scores are absolute. All writes land in one atomic batch.
    #[instrument(skip(self))]
    pub async fn update_score(
        &self,
        key: RankingKey,
        address: &AvatarAddress,
        old_score: Option<i64>,
        new_score: i64,
    ) -> Result<(), ArenaError> {
        if old_score == Some(new_score) {
            debug!(%address, new_score, "Score unchanged, nothing to move");
            return Ok(());
        }

        self.status.ensure_done(&key.grouped_status()).await?;

        let member = participant_member(address);
        self.store
            .apply_atomic(Self::move_ops(key, &member, old_score, new_score))
            .await?;

        debug!(%address, ?old_score, new_score, "Participant moved between score groups");
        Ok(())
    }

    /// Applies a signed delta using the score recorded in the index
    pub async fn apply_delta(
        &self,
        key: RankingKey,
        address: &AvatarAddress,
        delta: i64,
    ) -> Result<i64, ArenaError> {
        self.status.ensure_done(&key.grouped_status()).await?;

        let old_score = self.score_of(key, address).await?;
        let new_score = old_score.unwrap_or(0).saturating_add(delta);
        self.update_score(key, address, old_score, new_score).await?;
        Ok(new_score)
    }

    pub async fn score_of(
        &self,
        key: RankingKey,
        address: &AvatarAddress,
    ) -> Result<Option<i64>, ArenaError> {
        self.score_of_member(key, &participant_member(address)).await
    }

    async fn score_of_member(&self, key: RankingKey, member: &str) -> Result<Option<i64>, ArenaError> {
        self.store
            .hash_get(&key.grouped_index(), member)
            .await?
            .map(|raw| parse_score(&raw))
            .transpose()
    }

    /// Participant tokens in a bucket, in descending token order
    async fn bucket_members(&self, key: RankingKey, score: i64) -> Result<Vec<String>, ArenaError> {
        let mut members: Vec<String> = self
            .store
            .hash_get_all(&key.score_bucket(score))
            .await?
            .into_iter()
            .map(|(field, _)| field)
            .collect();
        members.sort_unstable_by(|a, b| b.cmp(a));
        Ok(members)
    }

    pub async fn group_members(
        &self,
        key: RankingKey,
        score: i64,
    ) -> Result<Vec<AvatarAddress>, ArenaError> {
        self.bucket_members(key, score)
            .await?
            .iter()
            .map(|member| parse_participant_member(member))
            .collect()
    }

    /// Groups in descending score order with their participant-equivalent ranks
    pub async fn group_layout(&self, key: RankingKey) -> Result<Vec<ScoreGroup>, ArenaError> {
        let groups = self
            .store
            .sorted_set_range_desc(&key.grouped_ranking(), 0, None)
            .await?;

        let mut layout = Vec::with_capacity(groups.len());
        let mut first_rank = 0;
        for group in groups {
            let size = self.store.hash_len(&key.score_bucket(group.score)).await?;
            layout.push(ScoreGroup {
                score: group.score,
                first_rank,
                size,
            });
            first_rank += size;
        }
        Ok(layout)
    }

    /// Inclusive 0-based rank range spanned by everyone holding `score`
    #[instrument(skip(self))]
    pub async fn calc_group_rank_range(
        &self,
        key: RankingKey,
        score: i64,
    ) -> Result<(u64, u64), ArenaError> {
        let grouped = key.grouped_ranking();
        let group_rank = self
            .store
            .sorted_set_rank_desc(&grouped, &group_member(score))
            .await?
            .ok_or_else(|| ArenaError::NotRanked(format!("no group for score {}", score)))?;

        let mut first = 0;
        if group_rank > 0 {
            for above in self
                .store
                .sorted_set_range_desc(&grouped, 0, Some(group_rank - 1))
                .await?
            {
                first += self.store.hash_len(&key.score_bucket(above.score)).await?;
            }
        }

        let size = self.store.hash_len(&key.score_bucket(score)).await?;
        Ok((first, first + size.saturating_sub(1)))
    }

    /// 1-based position counting everyone scoring at least as much
    pub async fn get_rank(&self, key: RankingKey, address: &AvatarAddress) -> Result<u64, ArenaError> {
        let score = self
            .score_of(key, address)
            .await?
            .ok_or_else(|| ArenaError::NotRanked(address.to_string()))?;
        let (_, last) = self.calc_group_rank_range(key, score).await?;
        Ok(last + 1)
    }

    pub async fn get_ranking_count(&self, key: RankingKey) -> Result<u64, ArenaError> {
        self.store.hash_len(&key.grouped_index()).await
    }

    pub async fn get_entries_page(
        &self,
        key: RankingKey,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<RankingEntry>, ArenaError> {
        let mut page = Vec::new();
        if limit == 0 {
            return Ok(page);
        }

        for group in self.group_layout(key).await? {
            if group.first_rank + group.size <= offset {
                continue;
            }
            let skip = offset.saturating_sub(group.first_rank) as usize;
            for member in self.bucket_members(key, group.score).await?.iter().skip(skip) {
                if page.len() as u64 == limit {
                    return Ok(page);
                }
                page.push(RankingEntry::new(parse_participant_member(member)?, group.score));
            }
            if page.len() as u64 == limit {
                break;
            }
        }
        Ok(page)
    }

    pub async fn get_scores(&self, key: RankingKey) -> Result<Vec<RankingEntry>, ArenaError> {
        self.get_entries_page(key, 0, u64::MAX).await
    }

    /// Expiry ops for the index, the grouped set and each listed bucket
    fn expire_ops(key: RankingKey, scores: impl IntoIterator<Item = i64>, ttl: Duration) -> Vec<StoreOp> {
        let mut ops: Vec<StoreOp> = scores
            .into_iter()
            .map(|score| StoreOp::Expire {
                key: key.score_bucket(score),
                ttl,
            })
            .collect();
        ops.push(StoreOp::Expire {
            key: key.grouped_ranking(),
            ttl,
        });
        ops.push(StoreOp::Expire {
            key: key.grouped_index(),
            ttl,
        });
        ops
    }

    /// Ops deleting every bucket of the round, plus its index
    fn wipe_ops(key: RankingKey) -> Vec<StoreOp> {
        vec![
            StoreOp::DeletePrefix {
                prefix: key.score_bucket_prefix(),
            },
            StoreOp::Delete {
                key: key.grouped_index(),
            },
        ]
    }

    /// Replaces the round's groups with `entries`; a repeated address keeps its last score
    #[instrument(skip(self, entries), fields(entry_count = entries.len()))]
    pub async fn init_ranking(
        &self,
        key: RankingKey,
        entries: &[RankingEntry],
        round_interval: u64,
    ) -> Result<(), ArenaError> {
        let ttl = self.config.cache_ttl(round_interval);

        let latest: HashMap<String, i64> = entries
            .iter()
            .map(|entry| (participant_member(&entry.address), entry.score))
            .collect();
        let mut buckets: BTreeMap<i64, Vec<&str>> = BTreeMap::new();
        for (member, score) in &latest {
            buckets.entry(*score).or_default().push(member);
        }

        let mut ops = Self::wipe_ops(key);
        ops.push(StoreOp::SortedSetReplace {
            key: key.grouped_ranking(),
            entries: buckets
                .keys()
                .map(|score| ScoredMember::new(group_member(*score), *score))
                .collect(),
        });
        for (score, members) in &buckets {
            for member in members {
                ops.push(StoreOp::HashSet {
                    key: key.score_bucket(*score),
                    field: member.to_string(),
                    value: score.to_string(),
                });
                ops.push(StoreOp::HashSet {
                    key: key.grouped_index(),
                    field: member.to_string(),
                    value: score.to_string(),
                });
            }
        }
        ops.extend(Self::expire_ops(key, buckets.keys().copied(), ttl));

        self.status
            .load_guarded(&key.grouped_status(), ops, ttl)
            .await?;

        info!(
            season_id = key.season_id,
            round = key.round,
            participants = latest.len(),
            groups = buckets.len(),
            "Score group ranking initialized"
        );
        Ok(())
    }

    pub async fn begin_initialization(&self, key: RankingKey) -> Result<(), ArenaError> {
        self.status
            .transition(&key.grouped_status(), RankingStatus::Initializing, None)
            .await?;
        Ok(())
    }

    /// Writes absolute scores, moving participants already present
    #[instrument(skip(self, entries), fields(entry_count = entries.len()))]
    pub async fn append_entries(
        &self,
        key: RankingKey,
        entries: &[RankingEntry],
    ) -> Result<(), ArenaError> {
        let mut batch_scores: HashMap<String, i64> = HashMap::new();
        let mut ops = Vec::new();

        for entry in entries {
            let member = participant_member(&entry.address);
            let old_score = match batch_scores.get(&member) {
                Some(score) => Some(*score),
                None => self.score_of_member(key, &member).await?,
            };
            if old_score == Some(entry.score) {
                continue;
            }
            ops.extend(Self::move_ops(key, &member, old_score, entry.score));
            batch_scores.insert(member, entry.score);
        }

        if ops.is_empty() {
            return Ok(());
        }
        self.store.apply_atomic(ops).await
    }

    /// Ends an append session: expires every round key and marks the ranking DONE
    pub async fn mark_done(&self, key: RankingKey, round_interval: u64) -> Result<(), ArenaError> {
        let ttl = self.config.cache_ttl(round_interval);
        let scores: Vec<i64> = self
            .store
            .sorted_set_range_desc(&key.grouped_ranking(), 0, None)
            .await?
            .into_iter()
            .map(|group| group.score)
            .collect();

        self.store
            .apply_atomic(Self::expire_ops(key, scores, ttl))
            .await?;
        self.status
            .transition(&key.grouped_status(), RankingStatus::Done, Some(ttl))
            .await?;
        Ok(())
    }

    pub async fn begin_copy(&self, target: RankingKey) -> Result<(), ArenaError> {
        self.status
            .transition(
                &target.grouped_status(),
                RankingStatus::CopyingInProgress,
                None,
            )
            .await?;
        Ok(())
    }

    /// Copies groups, buckets and index from `source` over `target` in one batch
    #[instrument(skip(self))]
    pub async fn copy_round_data(
        &self,
        source: RankingKey,
        target: RankingKey,
        round_interval: u64,
    ) -> Result<(), ArenaError> {
        self.status.ensure_done(&source.grouped_status()).await?;
        self.begin_copy(target).await?;

        let ttl = self.config.cache_ttl(round_interval);
        let ops = vec![
            StoreOp::CopyPrefix {
                source_prefix: source.score_bucket_prefix(),
                target_prefix: target.score_bucket_prefix(),
                ttl: Some(ttl),
            },
            StoreOp::SortedSetCopy {
                source: source.grouped_ranking(),
                target: target.grouped_ranking(),
            },
            StoreOp::HashCopy {
                source: source.grouped_index(),
                target: target.grouped_index(),
            },
            StoreOp::Expire {
                key: target.grouped_ranking(),
                ttl,
            },
            StoreOp::Expire {
                key: target.grouped_index(),
                ttl,
            },
            StatusFlag::status_op(&target.grouped_status(), RankingStatus::Done, Some(ttl)),
        ];

        self.store.apply_atomic(ops).await?;

        info!(
            season_id = source.season_id,
            source_round = source.round,
            target_round = target.round,
            "Score group ranking copied"
        );
        Ok(())
    }

    /// Samples a score group among those intersecting each window, then a
    /// participant within it, so sparse scores are not favoured
    #[instrument(skip(self, table, rng))]
    pub async fn select_battle_opponents<R: Rng + Send>(
        &self,
        key: RankingKey,
        address: &AvatarAddress,
        table: &OpponentGroupTable,
        rng: &mut R,
    ) -> Result<OpponentSelection, ArenaError> {
        self.status.ensure_done(&key.grouped_status()).await?;

        let own_score = self
            .score_of(key, address)
            .await?
            .ok_or_else(|| ArenaError::NotRanked(address.to_string()))?;
        let layout = self.group_layout(key).await?;
        let population = layout.last().map_or(0, |group| group.first_rank + group.size);
        let self_member = participant_member(address);

        let mut bucket_cache: HashMap<i64, Vec<String>> = HashMap::new();
        let mut selection = OpponentSelection::new();

        for weight_class in table.groups() {
            let window = weight_class.rank_window(population);
            let candidates: Vec<&ScoreGroup> = layout
                .iter()
                .filter(|group| group.overlaps(&window))
                .filter(|group| !(group.score == own_score && group.size <= 1))
                .collect();

            if candidates.is_empty() {
                selection.insert(weight_class.id, None);
                continue;
            }

            let chosen = candidates[rng.random_range(0..candidates.len())];
            if !bucket_cache.contains_key(&chosen.score) {
                let members = self.bucket_members(key, chosen.score).await?;
                bucket_cache.insert(chosen.score, members);
            }

            let pool: Vec<&String> = bucket_cache
                .get(&chosen.score)
                .map(|members| members.iter().filter(|m| **m != self_member).collect())
                .unwrap_or_default();

            let opponent = if pool.is_empty() {
                warn!(score = chosen.score, "Score group emptied during selection");
                None
            } else {
                let member = pool[rng.random_range(0..pool.len())];
                Some(BattleOpponent {
                    address: parse_participant_member(member)?,
                    score: chosen.score,
                    rank: chosen.first_rank,
                })
            };
            selection.insert(weight_class.id, opponent);
        }

        debug!(
            %address,
            population,
            groups = layout.len(),
            matched = selection.values().filter(|o| o.is_some()).count(),
            "Battle opponents selected from score groups"
        );
        Ok(selection)
    }
}
