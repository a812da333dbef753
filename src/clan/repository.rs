use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::config::ArenaConfig;
use crate::identity::AvatarAddress;
use crate::keys::{participant_member, RankingKey};
use crate::ranking::RankingEntry;
use crate::shared::{ArenaError, ClanId};
use crate::status::{RankingStatus, StatusFlag};
use crate::store::{ScoreStore, ScoredMember, StoreOp};

/// Per-clan participant rankings plus the round's registry of active clans
#[derive(Clone)]
pub struct ClanRankingRepository {
    store: Arc<dyn ScoreStore>,
    status: StatusFlag,
    config: Arc<ArenaConfig>,
}

impl ClanRankingRepository {
    pub fn new(store: Arc<dyn ScoreStore>, config: Arc<ArenaConfig>) -> Self {
        Self {
            status: StatusFlag::new(store.clone()),
            store,
            config,
        }
    }

    fn register_op(key: RankingKey, clan_id: ClanId) -> StoreOp {
        StoreOp::SetAdd {
            key: key.clan_registry(),
            member: clan_id.to_string(),
        }
    }

    pub async fn get_status(
        &self,
        clan_id: ClanId,
        key: RankingKey,
    ) -> Result<Option<RankingStatus>, ArenaError> {
        self.status.read(&key.clan_status(clan_id)).await
    }

    /// Replaces the clan's ranking and registers the clan for the round
    #[instrument(skip(self, entries), fields(entry_count = entries.len()))]
    pub async fn init_ranking(
        &self,
        clan_id: ClanId,
        key: RankingKey,
        entries: &[RankingEntry],
        round_interval: u64,
    ) -> Result<(), ArenaError> {
        let ttl = self.config.cache_ttl(round_interval);
        let ranking_key = key.clan_ranking(clan_id);
        let ops = vec![
            StoreOp::SortedSetReplace {
                key: ranking_key.clone(),
                entries: entries
                    .iter()
                    .map(|entry| ScoredMember::new(participant_member(&entry.address), entry.score))
                    .collect(),
            },
            StoreOp::Expire {
                key: ranking_key,
                ttl,
            },
            Self::register_op(key, clan_id),
            StoreOp::Expire {
                key: key.clan_registry(),
                ttl,
            },
        ];

        self.status
            .load_guarded(&key.clan_status(clan_id), ops, ttl)
            .await?;

        debug!(clan_id, season_id = key.season_id, round = key.round, "Clan ranking initialized");
        Ok(())
    }

    pub async fn begin_initialization(&self, clan_id: ClanId, key: RankingKey) -> Result<(), ArenaError> {
        self.status
            .transition(&key.clan_status(clan_id), RankingStatus::Initializing, None)
            .await?;
        Ok(())
    }

    /// Writes absolute scores and registers the clan, leaving the status alone
    pub async fn append_entries(
        &self,
        clan_id: ClanId,
        key: RankingKey,
        entries: &[RankingEntry],
    ) -> Result<(), ArenaError> {
        let ranking_key = key.clan_ranking(clan_id);
        let mut ops: Vec<StoreOp> = entries
            .iter()
            .map(|entry| StoreOp::SortedSetAdd {
                key: ranking_key.clone(),
                member: participant_member(&entry.address),
                score: entry.score,
            })
            .collect();
        ops.push(Self::register_op(key, clan_id));

        self.store.apply_atomic(ops).await
    }

    pub async fn mark_done(
        &self,
        clan_id: ClanId,
        key: RankingKey,
        round_interval: u64,
    ) -> Result<(), ArenaError> {
        let ttl = self.config.cache_ttl(round_interval);
        self.store
            .apply_atomic(vec![
                StoreOp::Expire {
                    key: key.clan_ranking(clan_id),
                    ttl,
                },
                StoreOp::Expire {
                    key: key.clan_registry(),
                    ttl,
                },
            ])
            .await?;
        self.status
            .transition(&key.clan_status(clan_id), RankingStatus::Done, Some(ttl))
            .await?;
        Ok(())
    }

    /// Adds a signed delta to a member's score.
    ///
    /// The first write for an unknown clan creates its ranking, registry entry
    /// and DONE status in one batch.
    #[instrument(skip(self))]
    pub async fn update_score(
        &self,
        clan_id: ClanId,
        key: RankingKey,
        address: &AvatarAddress,
        delta: i64,
    ) -> Result<i64, ArenaError> {
        let status_key = key.clan_status(clan_id);
        let ranking_key = key.clan_ranking(clan_id);
        let member = participant_member(address);

        match self.status.read(&status_key).await? {
            None => {
                self.store
                    .apply_atomic(vec![
                        StoreOp::SortedSetIncrement {
                            key: ranking_key.clone(),
                            member: member.clone(),
                            delta,
                        },
                        Self::register_op(key, clan_id),
                        StatusFlag::status_op(&status_key, RankingStatus::Done, None),
                    ])
                    .await?;
                info!(clan_id, season_id = key.season_id, round = key.round, "Clan ranking created on first update");

                self.store
                    .sorted_set_score(&ranking_key, &member)
                    .await?
                    .ok_or_else(|| ArenaError::NotRanked(address.to_string()))
            }
            Some(RankingStatus::Done) => {
                self.store.set_add(&key.clan_registry(), &clan_id.to_string()).await?;
                self.store
                    .sorted_set_increment(&ranking_key, &member, delta)
                    .await
            }
            Some(status) => Err(ArenaError::NotReady {
                key: status_key,
                status: status.to_string(),
            }),
        }
    }

    /// 1-based position of the member within its clan
    pub async fn get_rank(
        &self,
        clan_id: ClanId,
        key: RankingKey,
        address: &AvatarAddress,
    ) -> Result<u64, ArenaError> {
        self.store
            .sorted_set_rank_desc(&key.clan_ranking(clan_id), &participant_member(address))
            .await?
            .map(|rank| rank + 1)
            .ok_or_else(|| ArenaError::NotRanked(address.to_string()))
    }

    pub async fn get_scores(
        &self,
        clan_id: ClanId,
        key: RankingKey,
    ) -> Result<Vec<RankingEntry>, ArenaError> {
        self.store
            .sorted_set_range_desc(&key.clan_ranking(clan_id), 0, None)
            .await?
            .iter()
            .map(RankingEntry::from_scored)
            .collect()
    }

    /// Up to `count` highest-scoring members, descending
    pub async fn get_top_members(
        &self,
        clan_id: ClanId,
        key: RankingKey,
        count: usize,
    ) -> Result<Vec<RankingEntry>, ArenaError> {
        if count == 0 {
            return Ok(Vec::new());
        }

        self.store
            .sorted_set_range_desc(&key.clan_ranking(clan_id), 0, Some(count as u64 - 1))
            .await?
            .iter()
            .map(RankingEntry::from_scored)
            .collect()
    }

    /// Registered clans for the round in ascending id order
    pub async fn get_clans(&self, key: RankingKey) -> Result<Vec<ClanId>, ArenaError> {
        let mut clans = self
            .store
            .set_members(&key.clan_registry())
            .await?
            .iter()
            .map(|raw| {
                raw.parse::<ClanId>()
                    .map_err(|_| ArenaError::Validation(format!("invalid clan id {}", raw)))
            })
            .collect::<Result<Vec<_>, _>>()?;
        clans.sort_unstable();
        Ok(clans)
    }

    /// Copies the clan's set, registry entry and status from `source` to `target`.
    ///
    /// The target sits at COPYING_IN_PROGRESS until a single batch replaces it.
    #[instrument(skip(self))]
    pub async fn copy_round_data(
        &self,
        clan_id: ClanId,
        source: RankingKey,
        target: RankingKey,
        round_interval: u64,
    ) -> Result<(), ArenaError> {
        let source_status = self
            .status
            .read(&source.clan_status(clan_id))
            .await?
            .ok_or_else(|| ArenaError::NotFound(source.clan_status(clan_id)))?;

        let target_status_key = target.clan_status(clan_id);
        self.status
            .transition(&target_status_key, RankingStatus::CopyingInProgress, None)
            .await?;

        let registered = self
            .store
            .set_members(&source.clan_registry())
            .await?
            .contains(&clan_id.to_string());

        let ttl = self.config.cache_ttl(round_interval);
        let target_ranking = target.clan_ranking(clan_id);
        let mut ops = vec![
            StoreOp::SortedSetCopy {
                source: source.clan_ranking(clan_id),
                target: target_ranking.clone(),
            },
            StoreOp::Expire {
                key: target_ranking,
                ttl,
            },
        ];
        if registered {
            ops.push(Self::register_op(target, clan_id));
            ops.push(StoreOp::Expire {
                key: target.clan_registry(),
                ttl,
            });
        }
        ops.push(StatusFlag::status_op(&target_status_key, source_status, Some(ttl)));

        self.store.apply_atomic(ops).await?;

        debug!(
            clan_id,
            season_id = source.season_id,
            source_round = source.round,
            target_round = target.round,
            "Clan ranking copied"
        );
        Ok(())
    }
}
