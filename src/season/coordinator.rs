use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use super::models::{Season, SeasonReport, FIRST_ROUND};
use crate::config::ArenaConfig;
use crate::identity::AvatarAddress;
use crate::keys::RankingKey;
use crate::ranking::{RankingEntry, RankingService};
use crate::roster::{ParticipantRecord, RosterRepository};
use crate::shared::{ArenaError, ClanId};
use crate::shutdown::ShutdownSignal;
use crate::status::RankingStatus;

/// Carries eligible participants of the previous season into a new one
pub struct SeasonTransitionCoordinator {
    roster: Arc<dyn RosterRepository>,
    ranking: Arc<RankingService>,
    config: Arc<ArenaConfig>,
}

impl SeasonTransitionCoordinator {
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

    /// Medal totals across the qualifying seasons, or `None` when the season is not gated
    async fn medal_totals(
        &self,
        season: &Season,
    ) -> Result<Option<HashMap<AvatarAddress, i32>>, ArenaError> {
        if !season.is_medal_gated() {
            return Ok(None);
        }

        let qualifying = self.roster.get_qualifying_seasons(season.id).await?;
        if qualifying.is_empty() {
            return Err(ArenaError::NotFound(format!(
                "no qualifying seasons before championship {}",
                season.id
            )));
        }

        let mut totals: HashMap<AvatarAddress, i32> = HashMap::new();
        for medal in self.roster.get_medals_by_seasons(&qualifying).await? {
            *totals.entry(medal.address).or_default() += medal.medal_count;
        }

        debug!(
            season_id = season.id,
            qualifying_seasons = ?qualifying,
            medal_holders = totals.len(),
            "Medal totals loaded"
        );
        Ok(Some(totals))
    }

    /// Seeds rounds 1 and 2 of `season` with every eligible participant.
    ///
    /// Rankings stay INITIALIZING while pages are appended and only turn DONE
    /// once every page landed. A round's own status is written last, after its
    /// clans, so a re-run skips rounds already DONE and finishes the rest.
    #[instrument(skip(self, season, shutdown), fields(season_id = season.id))]
    pub async fn prepare_season(
        &self,
        season: &Season,
        shutdown: &ShutdownSignal,
    ) -> Result<SeasonReport, ArenaError> {
        let previous_season_id = season.previous_season_id();
        let rounds: [RankingKey; 2] = [
            season.round_key(FIRST_ROUND),
            season.round_key(FIRST_ROUND + 1),
        ];
        info!(
            previous_season_id,
            arena_type = %season.arena_type,
            "Preparing season"
        );

        let backend = self.ranking.backend();
        let clans = self.ranking.clans();

        let mut pending: Vec<RankingKey> = Vec::new();
        for key in rounds {
            if backend.get_status(key).await? == Some(RankingStatus::Done) {
                debug!(round = key.round, "Round already prepared");
            } else {
                pending.push(key);
            }
        }

        let mut report = SeasonReport {
            season_id: season.id,
            previous_season_id,
            ..SeasonReport::default()
        };
        let mut started_clans: BTreeSet<ClanId> = BTreeSet::new();

        if !pending.is_empty() {
            let medals = self.medal_totals(season).await?;
            for &key in &pending {
                backend.begin_initialization(key).await?;
            }

            let batch_size = self.config.season_batch_size;
            let mut skip = 0;
            loop {
                if shutdown.is_cancelled() {
                    warn!(skip, "Season preparation cancelled between batches");
                    return Err(ArenaError::Cancelled);
                }

                let page = self
                    .roster
                    .get_participants(
                        previous_season_id,
                        skip,
                        batch_size,
                        Some(self.config.carry_over_min_score),
                    )
                    .await?;
                if page.is_empty() {
                    break;
                }
                skip += page.len();
                report.examined += page.len();

                let eligible: Vec<ParticipantRecord> = page
                    .iter()
                    .filter(|record| match &medals {
                        Some(totals) => {
                            totals.get(&record.address).copied().unwrap_or(0)
                                >= season.required_medal_count
                        }
                        None => true,
                    })
                    .map(|record| {
                        ParticipantRecord::new(
                            record.address,
                            record.clan_id,
                            self.config.starting_score,
                        )
                    })
                    .collect();
                report.excluded_by_medals += page.len() - eligible.len();

                self.seed_batch(&pending, &eligible, &mut started_clans)
                    .await?;
                self.roster.add_participants(season.id, &eligible).await?;
                report.seeded += eligible.len();

                debug!(
                    page_size = page.len(),
                    seeded = eligible.len(),
                    "Season batch seeded"
                );

                if page.len() < batch_size {
                    break;
                }
            }

            for &key in &pending {
                for &clan_id in &started_clans {
                    clans
                        .mark_done(clan_id, key, season.round_interval)
                        .await?;
                }
                backend.mark_done(key, season.round_interval).await?;
            }
        }

        for key in rounds {
            self.ranking
                .update_all_clan_ranking(key, season.round_interval)
                .await?;
        }

        report.clans = started_clans.len();
        info!(
            examined = report.examined,
            seeded = report.seeded,
            excluded_by_medals = report.excluded_by_medals,
            clans = report.clans,
            resumed_rounds = pending.len(),
            "Season prepared"
        );
        Ok(report)
    }

    async fn seed_batch(
        &self,
        rounds: &[RankingKey],
        eligible: &[ParticipantRecord],
        started_clans: &mut BTreeSet<ClanId>,
    ) -> Result<(), ArenaError> {
        let entries: Vec<RankingEntry> = eligible
            .iter()
            .map(|record| RankingEntry::new(record.address, record.score))
            .collect();

        let mut by_clan: BTreeMap<ClanId, Vec<RankingEntry>> = BTreeMap::new();
        for record in eligible {
            if let Some(clan_id) = record.clan_id {
                by_clan
                    .entry(clan_id)
                    .or_default()
                    .push(RankingEntry::new(record.address, record.score));
            }
        }

        for &key in rounds {
            self.ranking.backend().append_entries(key, &entries).await?;
        }

        let clans = self.ranking.clans();
        for (clan_id, members) in &by_clan {
            if started_clans.insert(*clan_id) {
                for &key in rounds {
                    // finished by an earlier run that failed before the round itself
                    if clans.get_status(*clan_id, key).await? != Some(RankingStatus::Done) {
                        clans.begin_initialization(*clan_id, key).await?;
                    }
                }
            }
            for &key in rounds {
                clans.append_entries(*clan_id, key, members).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roster::{InMemoryRosterRepository, MedalRecord};
    use crate::season::ArenaType;
    use crate::store::InMemoryScoreStore;
    use crate::shared::test_utils::{address, config, memory_store};

    struct Fixture {
        store: Arc<InMemoryScoreStore>,
        roster: Arc<InMemoryRosterRepository>,
        ranking: Arc<RankingService>,
        coordinator: SeasonTransitionCoordinator,
    }

    fn fixture(season_batch_size: usize) -> Fixture {
        let (memory, store) = memory_store();
        let config = Arc::new(ArenaConfig {
            season_batch_size,
            ..config()
        });
        let roster = Arc::new(InMemoryRosterRepository::new());
        let ranking = Arc::new(RankingService::from_store(store, config.clone()));
        let coordinator =
            SeasonTransitionCoordinator::new(roster.clone(), ranking.clone(), config);
        Fixture {
            store: memory,
            roster,
            ranking,
            coordinator,
        }
    }

    fn season(id: i32, arena_type: ArenaType, required_medal_count: i32) -> Season {
        Season {
            id,
            arena_type,
            round_interval: 100,
            required_medal_count,
            start_block: 0,
        }
    }

    #[tokio::test]
    async fn carries_over_participants_above_floor() {
        let fx = fixture(2);
        let scores = [1500, 1001, 1000, 1200, 999];
        for (n, score) in scores.iter().enumerate() {
            let clan = if n % 2 == 0 { Some(7) } else { None };
            fx.roster
                .insert_participant(1, ParticipantRecord::new(address(n as u32), clan, *score))
                .unwrap();
        }

        let report = fx
            .coordinator
            .prepare_season(&season(2, ArenaType::Season, 0), &ShutdownSignal::never())
            .await
            .unwrap();

        assert_eq!(report.examined, 3);
        assert_eq!(report.seeded, 3);
        assert_eq!(report.clans, 1);
        assert_eq!(fx.roster.participant_count(2).unwrap(), 3);

        for round in [1, 2] {
            let key = RankingKey::new(2, round);
            let backend = fx.ranking.backend();
            assert_eq!(backend.get_status(key).await.unwrap(), Some(RankingStatus::Done));
            assert_eq!(backend.get_ranking_count(key).await.unwrap(), 3);
            assert_eq!(backend.get_score(key, &address(0)).await.unwrap(), Some(1000));
            assert_eq!(backend.get_score(key, &address(2)).await.unwrap(), None);

            let clan = fx.ranking.clans().get_scores(7, key).await.unwrap();
            assert_eq!(clan, vec![RankingEntry::new(address(0), 1000)]);
            assert_eq!(fx.ranking.global().get_score(key, 7).await.unwrap(), Some(1000));
        }
    }

    #[tokio::test]
    async fn championship_requires_medals() {
        let fx = fixture(10);
        fx.roster.insert_season(1, ArenaType::Season).unwrap();
        fx.roster.insert_season(2, ArenaType::Season).unwrap();
        for n in 0..3 {
            fx.roster
                .insert_participant(2, ParticipantRecord::new(address(n), None, 1100))
                .unwrap();
        }
        for (n, season_id, medal_count) in [(0, 1, 2), (0, 2, 1), (1, 2, 2)] {
            fx.roster
                .insert_medals(MedalRecord {
                    address: address(n),
                    season_id,
                    medal_count,
                })
                .unwrap();
        }

        let report = fx
            .coordinator
            .prepare_season(&season(3, ArenaType::Championship, 3), &ShutdownSignal::never())
            .await
            .unwrap();

        assert_eq!(report.examined, 3);
        assert_eq!(report.seeded, 1);
        assert_eq!(report.excluded_by_medals, 2);
        let key = RankingKey::new(3, 1);
        assert_eq!(
            fx.ranking.backend().get_score(key, &address(0)).await.unwrap(),
            Some(1000)
        );
    }

    #[tokio::test]
    async fn championship_without_qualifying_seasons_is_not_found() {
        let fx = fixture(10);
        let result = fx
            .coordinator
            .prepare_season(&season(3, ArenaType::Championship, 1), &ShutdownSignal::never())
            .await;
        assert!(matches!(result, Err(ArenaError::NotFound(_))));
    }

    #[tokio::test]
    async fn cancellation_leaves_rounds_not_ready() {
        let fx = fixture(10);
        let (trigger, signal) = ShutdownSignal::channel();
        trigger.trigger();

        let result = fx
            .coordinator
            .prepare_season(&season(2, ArenaType::Season, 0), &signal)
            .await;

        assert!(matches!(result, Err(ArenaError::Cancelled)));
        assert_eq!(
            fx.ranking
                .backend()
                .get_status(RankingKey::new(2, 1))
                .await
                .unwrap(),
            Some(RankingStatus::Initializing)
        );

        let report = fx
            .coordinator
            .prepare_season(&season(2, ArenaType::Season, 0), &ShutdownSignal::never())
            .await
            .unwrap();
        assert_eq!(report.seeded, 0);
        assert_eq!(
            fx.ranking
                .backend()
                .get_status(RankingKey::new(2, 1))
                .await
                .unwrap(),
            Some(RankingStatus::Done)
        );
    }

    #[tokio::test]
    async fn rerun_finishes_rounds_left_unfinished() {
        let fx = fixture(2);
        for n in 0..5 {
            let clan = if n % 2 == 0 { Some(3) } else { Some(4) };
            fx.roster
                .insert_participant(1, ParticipantRecord::new(address(n), clan, 1200))
                .unwrap();
        }
        let season = season(2, ArenaType::Season, 0);
        let round_one = RankingKey::new(2, 1);
        let round_two = RankingKey::new(2, 2);
        fx.store
            .fail_next_string_set(&round_two.ranking_status(), RankingStatus::Done.as_ref())
            .unwrap();

        let failed = fx
            .coordinator
            .prepare_season(&season, &ShutdownSignal::never())
            .await;
        assert!(matches!(failed, Err(ArenaError::StoreUnavailable(_))));
        let backend = fx.ranking.backend();
        assert_eq!(backend.get_status(round_one).await.unwrap(), Some(RankingStatus::Done));
        assert_eq!(
            backend.get_status(round_two).await.unwrap(),
            Some(RankingStatus::Initializing)
        );

        let report = fx
            .coordinator
            .prepare_season(&season, &ShutdownSignal::never())
            .await
            .expect("re-run should finish the season");
        assert_eq!(report.seeded, 5);
        assert_eq!(report.clans, 2);

        for key in [round_one, round_two] {
            assert_eq!(backend.get_status(key).await.unwrap(), Some(RankingStatus::Done));
            assert_eq!(backend.get_ranking_count(key).await.unwrap(), 5);
            for clan_id in [3, 4] {
                assert_eq!(
                    fx.ranking.clans().get_status(clan_id, key).await.unwrap(),
                    Some(RankingStatus::Done)
                );
            }
            assert_eq!(fx.ranking.global().get_score(key, 3).await.unwrap(), Some(3000));
            assert_eq!(fx.ranking.global().get_score(key, 4).await.unwrap(), Some(2000));
        }
        assert_eq!(fx.roster.participant_count(2).unwrap(), 5);
    }

    #[tokio::test]
    async fn rerun_of_prepared_season_changes_nothing() {
        let fx = fixture(10);
        for n in 0..3 {
            fx.roster
                .insert_participant(1, ParticipantRecord::new(address(n), Some(5), 1300))
                .unwrap();
        }
        let season = season(2, ArenaType::Season, 0);
        fx.coordinator
            .prepare_season(&season, &ShutdownSignal::never())
            .await
            .unwrap();

        let report = fx
            .coordinator
            .prepare_season(&season, &ShutdownSignal::never())
            .await
            .unwrap();
        assert_eq!(report.seeded, 0);
        assert_eq!(report.examined, 0);
        let key = RankingKey::new(2, 1);
        assert_eq!(fx.ranking.backend().get_ranking_count(key).await.unwrap(), 3);
        assert_eq!(fx.ranking.global().get_score(key, 5).await.unwrap(), Some(3000));
    }
}
