use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arena_ranking::{
    roster::{InMemoryRosterRepository, MedalRecord, ParticipantRecord, RosterRepository},
    ArenaError, AvatarAddress, ClanId, SeasonId,
};

// ============================================================================
// Mock Infrastructure
// ============================================================================

/// Roster that delegates to an in-memory one until told to fail clan lookups
#[derive(Clone)]
pub struct FlakyRosterRepository {
    inner: Arc<InMemoryRosterRepository>,
    fail_clan_members: Arc<AtomicBool>,
}

impl FlakyRosterRepository {
    pub fn new(inner: Arc<InMemoryRosterRepository>) -> Self {
        Self {
            inner,
            fail_clan_members: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn fail_clan_members(&self, fail: bool) {
        self.fail_clan_members.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl RosterRepository for FlakyRosterRepository {
    async fn get_participants(
        &self,
        season_id: SeasonId,
        skip: usize,
        take: usize,
        min_score: Option<i64>,
    ) -> Result<Vec<ParticipantRecord>, ArenaError> {
        self.inner
            .get_participants(season_id, skip, take, min_score)
            .await
    }

    async fn add_participants(
        &self,
        season_id: SeasonId,
        records: &[ParticipantRecord],
    ) -> Result<u64, ArenaError> {
        self.inner.add_participants(season_id, records).await
    }

    async fn get_clan_members(&self, clan_id: ClanId) -> Result<Vec<AvatarAddress>, ArenaError> {
        if self.fail_clan_members.load(Ordering::SeqCst) {
            return Err(ArenaError::Database("clan members unavailable".to_string()));
        }
        self.inner.get_clan_members(clan_id).await
    }

    async fn get_medals_by_seasons(
        &self,
        season_ids: &[SeasonId],
    ) -> Result<Vec<MedalRecord>, ArenaError> {
        self.inner.get_medals_by_seasons(season_ids).await
    }

    async fn get_qualifying_seasons(
        &self,
        championship_id: SeasonId,
    ) -> Result<Vec<SeasonId>, ArenaError> {
        self.inner.get_qualifying_seasons(championship_id).await
    }
}
