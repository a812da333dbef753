use std::sync::Arc;

use arena_ranking::{
    ArenaConfig, ArenaType, AvatarAddress, ClanId, InMemoryRosterRepository, InMemoryScoreStore,
    OpponentService, ParticipantRecord, RankingBackendKind, RankingService,
    RoundRolloverCoordinator, ScoreStore, Season, SeasonTransitionCoordinator,
};

use super::mocks::FlakyRosterRepository;

// ============================================================================
// Test Setup Infrastructure
// ============================================================================

/// Deterministic address whose last bytes encode `n`
pub fn address(n: u32) -> AvatarAddress {
    let mut bytes = [0u8; 20];
    bytes[0] = 0xcd;
    bytes[16..].copy_from_slice(&n.to_be_bytes());
    AvatarAddress::from_bytes(bytes)
}

pub struct TestSetup {
    pub store: Arc<InMemoryScoreStore>,
    pub roster: Arc<InMemoryRosterRepository>,
    pub flaky_roster: FlakyRosterRepository,
    pub config: Arc<ArenaConfig>,
    pub ranking: Arc<RankingService>,
    pub seasons: SeasonTransitionCoordinator,
    pub rollover: RoundRolloverCoordinator,
    pub opponents: OpponentService,
    pub season: Season,
}

pub struct TestSetupBuilder {
    backend: RankingBackendKind,
    previous: Vec<ParticipantRecord>,
    season_batch_size: usize,
    rollover_batch_size: usize,
}

impl TestSetupBuilder {
    pub fn new() -> Self {
        Self {
            backend: RankingBackendKind::Participant,
            previous: vec![],
            season_batch_size: 1500,
            rollover_batch_size: 1000,
        }
    }

    pub fn with_backend(mut self, backend: RankingBackendKind) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_batch_sizes(mut self, season: usize, rollover: usize) -> Self {
        self.season_batch_size = season;
        self.rollover_batch_size = rollover;
        self
    }

    /// Adds a previous-season participant numbered `n`
    pub fn with_participant(mut self, n: u32, clan_id: Option<ClanId>, score: i64) -> Self {
        self.previous
            .push(ParticipantRecord::new(address(n), clan_id, score));
        self
    }

    /// `count` previous-season participants spread over `clans` clans, all above the carry-over floor
    pub fn with_population(mut self, count: u32, clans: ClanId) -> Self {
        for n in 0..count {
            let clan_id = (clans > 0).then(|| (n as ClanId % clans) + 1);
            self.previous
                .push(ParticipantRecord::new(address(n), clan_id, 1100 + i64::from(n)));
        }
        self
    }

    pub fn build(self) -> TestSetup {
        let store = Arc::new(InMemoryScoreStore::new());
        let shared_store: Arc<dyn ScoreStore> = store.clone();
        let config = Arc::new(ArenaConfig {
            ranking_backend: self.backend,
            season_batch_size: self.season_batch_size,
            rollover_batch_size: self.rollover_batch_size,
            ..ArenaConfig::default()
        });

        let roster = Arc::new(InMemoryRosterRepository::new());
        roster.insert_season(1, ArenaType::Season).unwrap();
        for record in self.previous {
            roster.insert_participant(1, record).unwrap();
        }
        let flaky_roster = FlakyRosterRepository::new(roster.clone());

        let ranking = Arc::new(RankingService::from_store(shared_store, config.clone()));
        let seasons = SeasonTransitionCoordinator::new(
            Arc::new(flaky_roster.clone()),
            ranking.clone(),
            config.clone(),
        );
        let rollover = RoundRolloverCoordinator::new(
            Arc::new(flaky_roster.clone()),
            ranking.clone(),
            config.clone(),
        );
        let opponents = OpponentService::new(
            ranking.clone(),
            config.opponent_groups.clone(),
            config.selection_retry,
        );

        TestSetup {
            store,
            roster,
            flaky_roster,
            config,
            ranking,
            seasons,
            rollover,
            opponents,
            season: Season {
                id: 2,
                arena_type: ArenaType::Season,
                round_interval: 100,
                required_medal_count: 0,
                start_block: 0,
            },
        }
    }
}
