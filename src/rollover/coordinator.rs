use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::clan::ClanScore;
use crate::config::ArenaConfig;
use crate::identity::AvatarAddress;
use crate::ranking::{RankingEntry, RankingService};
use crate::roster::RosterRepository;
use crate::season::{Season, FIRST_ROUND};
use crate::shared::{ArenaError, ClanId, RoundIndex, SeasonId};
use crate::shutdown::ShutdownSignal;

/// What a completed rollover carried forward
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolloverReport {
    pub season_id: SeasonId,
    pub source_round: RoundIndex,
    pub target_round: RoundIndex,
    pub participants_carried: usize,
    pub clans_copied: usize,
    /// Members of every copied clan, resolved from the roster
    pub clan_attribution: HashMap<AvatarAddress, ClanId>,
    pub clan_scores: Vec<ClanScore>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RolloverOutcome {
    /// The source was the season's first round; its successor is seeded with the season
    Skipped,
    Completed(RolloverReport),
}

/// Carries a round's rankings into the next round
pub struct RoundRolloverCoordinator {
    roster: Arc<dyn RosterRepository>,
    ranking: Arc<RankingService>,
    config: Arc<ArenaConfig>,
}

impl RoundRolloverCoordinator {
    pub fn new(
        roster: Arc<dyn RosterRepository>,
        ranking: Arc<RankingService>,
        config: Arc<ArenaConfig>,
    ) -> Self {
        Self {
            roster,
            ranking,
            config,
        }
    }

    /// Prepares `source_round + 1` from `source_round`.
    ///
    /// The target participant ranking is held at COPYING_IN_PROGRESS from the
    /// first write until clan aggregates are recomputed; any failure leaves it
    /// there. Re-running after a failure starts over and overwrites the target.
    #[instrument(skip(self, season, shutdown), fields(season_id = season.id))]
    pub async fn prepare_next_round(
        &self,
        season: &Season,
        source_round: RoundIndex,
        shutdown: &ShutdownSignal,
    ) -> Result<RolloverOutcome, ArenaError> {
        if source_round <= FIRST_ROUND {
            info!(source_round, "First round has no rollover, skipping");
            return Ok(RolloverOutcome::Skipped);
        }

        let source = season.round_key(source_round);
        let target = source.next_round();
        let backend = self.ranking.backend();
        let clans = self.ranking.clans();
        info!(source_round, target_round = target.round, "Starting round rollover");

        backend.ensure_ready(source).await?;
        backend.begin_copy(target).await?;

        let batch_size = self.config.rollover_batch_size as u64;
        let mut entries: Vec<RankingEntry> = Vec::new();
        let mut offset = 0;
        loop {
            if shutdown.is_cancelled() {
                warn!(offset, "Rollover cancelled between pages");
                return Err(ArenaError::Cancelled);
            }

            let page = backend.get_entries_page(source, offset, batch_size).await?;
            let page_len = page.len() as u64;
            entries.extend(page);
            offset += page_len;
            debug!(offset, "Rollover page read");

            if page_len < batch_size {
                break;
            }
        }

        let mut clan_attribution = HashMap::new();
        let clan_ids = clans.get_clans(source).await?;
        for &clan_id in &clan_ids {
            if shutdown.is_cancelled() {
                warn!(clan_id, "Rollover cancelled between clans");
                return Err(ArenaError::Cancelled);
            }

            clans
                .copy_round_data(clan_id, source, target, season.round_interval)
                .await?;
            for member in self.roster.get_clan_members(clan_id).await? {
                clan_attribution.insert(member, clan_id);
            }
        }

        let clan_scores = self
            .ranking
            .update_all_clan_ranking(target, season.round_interval)
            .await?;

        backend
            .init_ranking(target, &entries, season.round_interval)
            .await?;

        let report = RolloverReport {
            season_id: season.id,
            source_round,
            target_round: target.round,
            participants_carried: entries.len(),
            clans_copied: clan_ids.len(),
            clan_attribution,
            clan_scores,
        };
        info!(
            participants_carried = report.participants_carried,
            clans_copied = report.clans_copied,
            "Round rollover completed"
        );
        Ok(RolloverOutcome::Completed(report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::RankingKey;
    use crate::roster::{InMemoryRosterRepository, ParticipantRecord};
    use crate::season::ArenaType;
    use crate::shared::test_utils::{address, config, memory_store};
    use crate::status::RankingStatus;
    use crate::store::InMemoryScoreStore;

    struct Fixture {
        store: Arc<InMemoryScoreStore>,
        ranking: Arc<RankingService>,
        coordinator: RoundRolloverCoordinator,
        season: Season,
    }

    fn fixture() -> Fixture {
        let (store, shared) = memory_store();
        let config = Arc::new(ArenaConfig {
            rollover_batch_size: 3,
            ..config()
        });
        let roster = Arc::new(InMemoryRosterRepository::new());
        roster
            .insert_participant(1, ParticipantRecord::new(address(1), Some(5), 1000))
            .unwrap();
        roster
            .insert_participant(1, ParticipantRecord::new(address(2), Some(5), 1000))
            .unwrap();

        let ranking = Arc::new(RankingService::from_store(shared, config.clone()));
        let coordinator = RoundRolloverCoordinator::new(roster, ranking.clone(), config);
        let season = Season {
            id: 1,
            arena_type: ArenaType::Season,
            round_interval: 100,
            required_medal_count: 0,
            start_block: 0,
        };
        Fixture {
            store,
            ranking,
            coordinator,
            season,
        }
    }

    async fn seed_round(fx: &Fixture, round: RoundIndex) {
        let key = RankingKey::new(1, round);
        let entries: Vec<RankingEntry> = (0..7)
            .map(|n| RankingEntry::new(address(n), 1000 + i64::from(n)))
            .collect();
        fx.ranking
            .backend()
            .init_ranking(key, &entries, 100)
            .await
            .unwrap();
        fx.ranking
            .clans()
            .init_ranking(5, key, &entries[1..3], 100)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn first_round_is_skipped() {
        let fx = fixture();
        let outcome = fx
            .coordinator
            .prepare_next_round(&fx.season, FIRST_ROUND, &ShutdownSignal::never())
            .await
            .unwrap();
        assert_eq!(outcome, RolloverOutcome::Skipped);
    }

    #[tokio::test]
    async fn rollover_carries_everything_forward() {
        let fx = fixture();
        seed_round(&fx, 2).await;

        let outcome = fx
            .coordinator
            .prepare_next_round(&fx.season, 2, &ShutdownSignal::never())
            .await
            .unwrap();
        let RolloverOutcome::Completed(report) = outcome else {
            panic!("expected a completed rollover");
        };

        assert_eq!(report.target_round, 3);
        assert_eq!(report.participants_carried, 7);
        assert_eq!(report.clans_copied, 1);
        assert_eq!(report.clan_attribution.get(&address(2)), Some(&5));
        assert_eq!(report.clan_scores, vec![ClanScore::new(5, 2003)]);

        let source = RankingKey::new(1, 2);
        let target = RankingKey::new(1, 3);
        let backend = fx.ranking.backend();
        assert_eq!(backend.get_status(target).await.unwrap(), Some(RankingStatus::Done));
        assert_eq!(
            backend.get_entries_page(source, 0, 100).await.unwrap(),
            backend.get_entries_page(target, 0, 100).await.unwrap()
        );
        assert_eq!(
            fx.ranking.clans().get_scores(5, target).await.unwrap(),
            fx.ranking.clans().get_scores(5, source).await.unwrap()
        );
    }

    #[tokio::test]
    async fn store_failure_leaves_target_not_done() {
        let fx = fixture();
        seed_round(&fx, 2).await;
        let (trigger, signal) = ShutdownSignal::channel();
        trigger.trigger();

        let result = fx.coordinator.prepare_next_round(&fx.season, 2, &signal).await;
        assert!(matches!(result, Err(ArenaError::Cancelled)));

        let target = RankingKey::new(1, 3);
        assert_eq!(
            fx.ranking.backend().get_status(target).await.unwrap(),
            Some(RankingStatus::CopyingInProgress)
        );

        fx.store.set_unavailable(true);
        let result = fx
            .coordinator
            .prepare_next_round(&fx.season, 2, &ShutdownSignal::never())
            .await;
        assert!(result.unwrap_err().is_retryable());
        fx.store.set_unavailable(false);

        assert!(matches!(
            fx.coordinator
                .prepare_next_round(&fx.season, 2, &ShutdownSignal::never())
                .await
                .unwrap(),
            RolloverOutcome::Completed(_)
        ));
        assert_eq!(
            fx.ranking.backend().get_status(target).await.unwrap(),
            Some(RankingStatus::Done)
        );
    }

    #[tokio::test]
    async fn source_must_be_ready() {
        let fx = fixture();
        let result = fx
            .coordinator
            .prepare_next_round(&fx.season, 4, &ShutdownSignal::never())
            .await;
        assert!(matches!(result, Err(ArenaError::NotFound(_))));
    }
}
