use futures::future::try_join_all;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use super::backend::RankingBackend;
use crate::clan::{ClanRankingRepository, ClanScore, GlobalClanRankingRepository};
use crate::config::ArenaConfig;
use crate::identity::AvatarAddress;
use crate::keys::RankingKey;
use crate::shared::{ArenaError, ClanId};
use crate::store::ScoreStore;

/// Composes participant, clan and global clan rankings
pub struct RankingService {
    backend: RankingBackend,
    clans: ClanRankingRepository,
    global: GlobalClanRankingRepository,
    config: Arc<ArenaConfig>,
}

impl RankingService {
    pub fn new(
        backend: RankingBackend,
        clans: ClanRankingRepository,
        global: GlobalClanRankingRepository,
        config: Arc<ArenaConfig>,
    ) -> Self {
        Self {
            backend,
            clans,
            global,
            config,
        }
    }

    /// Wires every ranking onto one store, picking the backend from the config
    pub fn from_store(store: Arc<dyn ScoreStore>, config: Arc<ArenaConfig>) -> Self {
        Self::new(
            RankingBackend::new(config.ranking_backend, store.clone(), config.clone()),
            ClanRankingRepository::new(store.clone(), config.clone()),
            GlobalClanRankingRepository::new(store, config.clone()),
            config,
        )
    }

    pub fn backend(&self) -> &RankingBackend {
        &self.backend
    }

    pub fn clans(&self) -> &ClanRankingRepository {
        &self.clans
    }

    pub fn global(&self) -> &GlobalClanRankingRepository {
        &self.global
    }

    /// Applies a signed delta to the participant and, if affiliated, its clan ranking
    #[instrument(skip(self))]
    pub async fn update_score(
        &self,
        key: RankingKey,
        address: &AvatarAddress,
        clan_id: Option<ClanId>,
        delta: i64,
    ) -> Result<i64, ArenaError> {
        let new_score = self.backend.apply_score_change(key, address, delta).await?;

        if let Some(clan_id) = clan_id {
            let clan_score = self.clans.update_score(clan_id, key, address, delta).await?;
            debug!(clan_id, clan_score, "Clan member score updated");
        }

        Ok(new_score)
    }

    /// Rewrites the global clan ranking from the top members of every registered clan
    #[instrument(skip(self))]
    pub async fn update_all_clan_ranking(
        &self,
        key: RankingKey,
        round_interval: u64,
    ) -> Result<Vec<ClanScore>, ArenaError> {
        let clan_ids = self.clans.get_clans(key).await?;
        let top_members = self.config.clan_top_members;

        let aggregates = try_join_all(clan_ids.iter().map(|&clan_id| async move {
            let members = self
                .clans
                .get_top_members(clan_id, key, top_members)
                .await?;
            let total = members.iter().map(|member| member.score).sum::<i64>();
            Ok::<_, ArenaError>(ClanScore::new(clan_id, total))
        }))
        .await?;

        self.global
            .init_ranking(key, &aggregates, round_interval)
            .await?;

        info!(
            season_id = key.season_id,
            round = key.round,
            clan_count = aggregates.len(),
            "Clan aggregates recomputed"
        );
        Ok(aggregates)
    }
}
