use std::sync::Arc;
use tracing::{info, instrument};

use super::models::{ClanScore, RankedClan};
use crate::config::ArenaConfig;
use crate::keys::{clan_member, parse_clan_member, RankingKey};
use crate::shared::{ArenaError, ClanId};
use crate::status::{RankingStatus, StatusFlag};
use crate::store::{ScoreStore, ScoredMember, StoreOp};

/// Round-wide ranking of clans by aggregate score
#[derive(Clone)]
pub struct GlobalClanRankingRepository {
    store: Arc<dyn ScoreStore>,
    status: StatusFlag,
    config: Arc<ArenaConfig>,
}

fn clan_score(scored: &ScoredMember) -> Result<ClanScore, ArenaError> {
    Ok(ClanScore::new(parse_clan_member(&scored.member)?, scored.score))
}

impl GlobalClanRankingRepository {
    pub fn new(store: Arc<dyn ScoreStore>, config: Arc<ArenaConfig>) -> Self {
        Self {
            status: StatusFlag::new(store.clone()),
            store,
            config,
        }
    }

    pub async fn get_status(&self, key: RankingKey) -> Result<Option<RankingStatus>, ArenaError> {
        self.status.read(&key.global_clan_status()).await
    }

    #[instrument(skip(self, scores), fields(clan_count = scores.len()))]
    pub async fn init_ranking(
        &self,
        key: RankingKey,
        scores: &[ClanScore],
        round_interval: u64,
    ) -> Result<(), ArenaError> {
        let ttl = self.config.cache_ttl(round_interval);
        let ranking_key = key.global_clan_ranking();
        let ops = vec![
            StoreOp::SortedSetReplace {
                key: ranking_key.clone(),
                entries: scores
                    .iter()
                    .map(|clan| ScoredMember::new(clan_member(clan.clan_id), clan.score))
                    .collect(),
            },
            StoreOp::Expire {
                key: ranking_key,
                ttl,
            },
        ];

        self.status
            .load_guarded(&key.global_clan_status(), ops, ttl)
            .await?;

        info!(
            season_id = key.season_id,
            round = key.round,
            clan_count = scores.len(),
            "Global clan ranking written"
        );
        Ok(())
    }

    pub async fn update_score(
        &self,
        key: RankingKey,
        clan_id: ClanId,
        delta: i64,
    ) -> Result<i64, ArenaError> {
        self.status.ensure_done(&key.global_clan_status()).await?;
        self.store
            .sorted_set_increment(&key.global_clan_ranking(), &clan_member(clan_id), delta)
            .await
    }

    pub async fn get_score(&self, key: RankingKey, clan_id: ClanId) -> Result<Option<i64>, ArenaError> {
        self.store
            .sorted_set_score(&key.global_clan_ranking(), &clan_member(clan_id))
            .await
    }

    /// Number of clans scoring at least as much as `clan_id`
    pub async fn get_rank(&self, key: RankingKey, clan_id: ClanId) -> Result<u64, ArenaError> {
        let score = self
            .get_score(key, clan_id)
            .await?
            .ok_or_else(|| ArenaError::NotRanked(clan_member(clan_id)))?;
        self.store
            .sorted_set_count_at_least(&key.global_clan_ranking(), score)
            .await
    }

    pub async fn get_scores(&self, key: RankingKey) -> Result<Vec<ClanScore>, ArenaError> {
        self.store
            .sorted_set_range_desc(&key.global_clan_ranking(), 0, None)
            .await?
            .iter()
            .map(clan_score)
            .collect()
    }

    /// Leaderboard head; a tie block reaching past `count` still ranks by its full size
    pub async fn get_top_clans(
        &self,
        key: RankingKey,
        count: usize,
    ) -> Result<Vec<RankedClan>, ArenaError> {
        if count == 0 {
            return Ok(Vec::new());
        }

        let ranking_key = key.global_clan_ranking();
        let head = self
            .store
            .sorted_set_range_desc(&ranking_key, 0, Some(count as u64 - 1))
            .await?;

        let mut ranked = Vec::with_capacity(head.len());
        let mut block: Option<(i64, u64)> = None;
        for scored in &head {
            let rank = match block {
                Some((score, rank)) if score == scored.score => rank,
                _ => {
                    let rank = self
                        .store
                        .sorted_set_count_at_least(&ranking_key, scored.score)
                        .await?;
                    block = Some((scored.score, rank));
                    rank
                }
            };
            let clan = clan_score(scored)?;
            ranked.push(RankedClan {
                rank,
                clan_id: clan.clan_id,
                score: clan.score,
            });
        }
        Ok(ranked)
    }

    #[instrument(skip(self))]
    pub async fn copy_round_data(
        &self,
        source: RankingKey,
        target: RankingKey,
        round_interval: u64,
    ) -> Result<(), ArenaError> {
        self.status.ensure_done(&source.global_clan_status()).await?;
        self.status
            .transition(
                &target.global_clan_status(),
                RankingStatus::CopyingInProgress,
                None,
            )
            .await?;

        let ttl = self.config.cache_ttl(round_interval);
        let target_key = target.global_clan_ranking();
        self.store
            .apply_atomic(vec![
                StoreOp::SortedSetCopy {
                    source: source.global_clan_ranking(),
                    target: target_key.clone(),
                },
                StoreOp::Expire {
                    key: target_key,
                    ttl,
                },
                StatusFlag::status_op(&target.global_clan_status(), RankingStatus::Done, Some(ttl)),
            ])
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::test_utils::{config, memory_store};

    fn repository() -> GlobalClanRankingRepository {
        let (_, store) = memory_store();
        GlobalClanRankingRepository::new(store, Arc::new(config()))
    }

    #[tokio::test]
    async fn tied_clans_share_lowest_rank() {
        let repo = repository();
        let key = RankingKey::new(1, 1);
        let scores = vec![
            ClanScore::new(1, 500),
            ClanScore::new(2, 400),
            ClanScore::new(3, 400),
            ClanScore::new(4, 400),
            ClanScore::new(5, 100),
        ];
        repo.init_ranking(key, &scores, 100).await.unwrap();

        let top = repo.get_top_clans(key, 3).await.unwrap();
        let ranks: Vec<(u64, i64)> = top.iter().map(|c| (c.rank, c.score)).collect();
        assert_eq!(ranks, vec![(1, 500), (4, 400), (4, 400)]);

        assert_eq!(repo.get_rank(key, 3).await.unwrap(), 4);
        assert_eq!(repo.get_rank(key, 5).await.unwrap(), 5);
        assert!(repo.get_top_clans(key, 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_needs_done_ranking() {
        let repo = repository();
        let key = RankingKey::new(1, 1);

        assert!(matches!(
            repo.update_score(key, 1, 10).await,
            Err(ArenaError::NotFound(_))
        ));

        repo.init_ranking(key, &[ClanScore::new(1, 10)], 100)
            .await
            .unwrap();
        assert_eq!(repo.update_score(key, 1, 15).await.unwrap(), 25);
        assert_eq!(repo.update_score(key, 2, 3).await.unwrap(), 3);
        assert_eq!(repo.get_scores(key).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn copy_carries_aggregates_forward() {
        let repo = repository();
        let source = RankingKey::new(1, 2);
        let target = source.next_round();
        repo.init_ranking(source, &[ClanScore::new(1, 10), ClanScore::new(2, 30)], 100)
            .await
            .unwrap();

        repo.copy_round_data(source, target, 100).await.unwrap();

        assert_eq!(
            repo.get_scores(target).await.unwrap(),
            vec![ClanScore::new(2, 30), ClanScore::new(1, 10)]
        );
        assert_eq!(repo.get_status(target).await.unwrap(), Some(RankingStatus::Done));
    }
}
