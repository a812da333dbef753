use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, instrument, warn};

use super::models::{MedalRecord, ParticipantRecord};
use crate::identity::AvatarAddress;
use crate::season::ArenaType;
use crate::shared::{ArenaError, ClanId, SeasonId};

/// Relational roster the coordinators page through: season participants,
/// clan membership and medal history
#[async_trait]
pub trait RosterRepository: Send + Sync {
    /// Participants ordered by score descending, then address
    async fn get_participants(
        &self,
        season_id: SeasonId,
        skip: usize,
        take: usize,
        min_score: Option<i64>,
    ) -> Result<Vec<ParticipantRecord>, ArenaError>;

    /// Registers participants in a season, skipping ones already present.
    /// Returns how many were added.
    async fn add_participants(
        &self,
        season_id: SeasonId,
        records: &[ParticipantRecord],
    ) -> Result<u64, ArenaError>;

    async fn get_clan_members(&self, clan_id: ClanId) -> Result<Vec<AvatarAddress>, ArenaError>;

    async fn get_medals_by_seasons(
        &self,
        season_ids: &[SeasonId],
    ) -> Result<Vec<MedalRecord>, ArenaError>;

    /// Ordinary seasons after the last championship preceding `championship_id`
    async fn get_qualifying_seasons(
        &self,
        championship_id: SeasonId,
    ) -> Result<Vec<SeasonId>, ArenaError>;
}

#[derive(Debug, Default)]
struct RosterState {
    participants: HashMap<SeasonId, HashMap<AvatarAddress, ParticipantRecord>>,
    clan_members: HashMap<ClanId, BTreeSet<AvatarAddress>>,
    medals: Vec<MedalRecord>,
    seasons: BTreeMap<SeasonId, ArenaType>,
}

impl RosterState {
    fn insert_participant(&mut self, season_id: SeasonId, record: ParticipantRecord) -> bool {
        let season = self.participants.entry(season_id).or_default();
        if season.contains_key(&record.address) {
            return false;
        }
        season.insert(record.address, record);
        self.set_clan(record.address, record.clan_id);
        true
    }

    /// An address belongs to at most one clan, the one of its latest record
    fn set_clan(&mut self, address: AvatarAddress, clan_id: Option<ClanId>) {
        self.clan_members.retain(|_, members| {
            members.remove(&address);
            !members.is_empty()
        });
        if let Some(clan_id) = clan_id {
            self.clan_members.entry(clan_id).or_default().insert(address);
        }
    }
}

/// In-memory implementation of RosterRepository for development and testing
#[derive(Debug, Default)]
pub struct InMemoryRosterRepository {
    state: Mutex<RosterState>,
}

impl InMemoryRosterRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, RosterState>, ArenaError> {
        self.state
            .lock()
            .map_err(|_| ArenaError::Database("roster state lock poisoned".to_string()))
    }

    pub fn insert_season(&self, season_id: SeasonId, arena_type: ArenaType) -> Result<(), ArenaError> {
        self.state()?.seasons.insert(season_id, arena_type);
        Ok(())
    }

    /// Inserts or overwrites a participant and records its clan membership
    pub fn insert_participant(
        &self,
        season_id: SeasonId,
        record: ParticipantRecord,
    ) -> Result<(), ArenaError> {
        let mut state = self.state()?;
        state
            .participants
            .entry(season_id)
            .or_default()
            .remove(&record.address);
        state.insert_participant(season_id, record);
        Ok(())
    }

    pub fn insert_medals(&self, record: MedalRecord) -> Result<(), ArenaError> {
        self.state()?.medals.push(record);
        Ok(())
    }

    pub fn participant_count(&self, season_id: SeasonId) -> Result<usize, ArenaError> {
        Ok(self
            .state()?
            .participants
            .get(&season_id)
            .map_or(0, |season| season.len()))
    }
}

#[async_trait]
impl RosterRepository for InMemoryRosterRepository {
    #[instrument(skip(self))]
    async fn get_participants(
        &self,
        season_id: SeasonId,
        skip: usize,
        take: usize,
        min_score: Option<i64>,
    ) -> Result<Vec<ParticipantRecord>, ArenaError> {
        let state = self.state()?;
        let mut records: Vec<ParticipantRecord> = state
            .participants
            .get(&season_id)
            .map(|season| {
                season
                    .values()
                    .filter(|record| min_score.map_or(true, |min| record.score >= min))
                    .copied()
                    .collect()
            })
            .unwrap_or_default();

        records.sort_by(|a, b| b.score.cmp(&a.score).then(a.address.cmp(&b.address)));
        let page: Vec<ParticipantRecord> = records.into_iter().skip(skip).take(take).collect();

        debug!(season_id, page_size = page.len(), "Participants page read from memory");
        Ok(page)
    }

    #[instrument(skip(self, records), fields(record_count = records.len()))]
    async fn add_participants(
        &self,
        season_id: SeasonId,
        records: &[ParticipantRecord],
    ) -> Result<u64, ArenaError> {
        let mut state = self.state()?;
        let added = records
            .iter()
            .filter(|record| state.insert_participant(season_id, **record))
            .count();

        debug!(season_id, added, "Participants added in memory");
        Ok(added as u64)
    }

    async fn get_clan_members(&self, clan_id: ClanId) -> Result<Vec<AvatarAddress>, ArenaError> {
        Ok(self
            .state()?
            .clan_members
            .get(&clan_id)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default())
    }

    async fn get_medals_by_seasons(
        &self,
        season_ids: &[SeasonId],
    ) -> Result<Vec<MedalRecord>, ArenaError> {
        Ok(self
            .state()?
            .medals
            .iter()
            .filter(|medal| season_ids.contains(&medal.season_id))
            .copied()
            .collect())
    }

    async fn get_qualifying_seasons(
        &self,
        championship_id: SeasonId,
    ) -> Result<Vec<SeasonId>, ArenaError> {
        let state = self.state()?;
        let earlier = state.seasons.range(..championship_id);
        let last_championship = earlier
            .clone()
            .filter(|(_, arena_type)| **arena_type == ArenaType::Championship)
            .map(|(id, _)| *id)
            .last();

        Ok(earlier
            .filter(|(id, arena_type)| {
                **arena_type == ArenaType::Season && last_championship.map_or(true, |c| **id > c)
            })
            .map(|(id, _)| *id)
            .collect())
    }
}

/// PostgreSQL implementation of RosterRepository
pub struct PostgresRosterRepository {
    pool: PgPool,
}

impl PostgresRosterRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RosterRepository for PostgresRosterRepository {
    #[instrument(skip(self))]
    async fn get_participants(
        &self,
        season_id: SeasonId,
        skip: usize,
        take: usize,
        min_score: Option<i64>,
    ) -> Result<Vec<ParticipantRecord>, ArenaError> {
        debug!(season_id, skip, take, "Fetching participants page from database");

        let rows = sqlx::query(
            "SELECT avatar_address, clan_id, score FROM arena_participants \
             WHERE season_id = $1 AND ($2::BIGINT IS NULL OR score >= $2) \
             ORDER BY score DESC, avatar_address ASC OFFSET $3 LIMIT $4",
        )
        .bind(season_id)
        .bind(min_score)
        .bind(skip as i64)
        .bind(take as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, season_id, "Failed to fetch participants from database");
            ArenaError::Database(e.to_string())
        })?;

        rows.iter()
            .map(|row| -> Result<ParticipantRecord, ArenaError> {
                let address: String = row.get("avatar_address");
                Ok(ParticipantRecord {
                    address: address.parse()?,
                    clan_id: row.get("clan_id"),
                    score: row.get("score"),
                })
            })
            .collect()
    }

    #[instrument(skip(self, records), fields(record_count = records.len()))]
    async fn add_participants(
        &self,
        season_id: SeasonId,
        records: &[ParticipantRecord],
    ) -> Result<u64, ArenaError> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            warn!(error = %e, "Failed to open roster transaction");
            ArenaError::Database(e.to_string())
        })?;

        let mut added = 0;
        for record in records {
            let result = sqlx::query(
                "INSERT INTO arena_participants (season_id, avatar_address, clan_id, score) \
                 VALUES ($1, $2, $3, $4) ON CONFLICT (season_id, avatar_address) DO NOTHING",
            )
            .bind(season_id)
            .bind(record.address.to_hex())
            .bind(record.clan_id)
            .bind(record.score)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                warn!(error = %e, address = %record.address, "Failed to insert participant");
                ArenaError::Database(e.to_string())
            })?;
            added += result.rows_affected();
        }

        tx.commit().await.map_err(|e| {
            warn!(error = %e, season_id, "Failed to commit participants");
            ArenaError::Database(e.to_string())
        })?;

        debug!(season_id, added, "Participants added to database");
        Ok(added)
    }

    #[instrument(skip(self))]
    async fn get_clan_members(&self, clan_id: ClanId) -> Result<Vec<AvatarAddress>, ArenaError> {
        let rows = sqlx::query(
            "SELECT avatar_address FROM clan_members WHERE clan_id = $1 ORDER BY avatar_address",
        )
        .bind(clan_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, clan_id, "Failed to fetch clan members");
            ArenaError::Database(e.to_string())
        })?;

        rows.iter()
            .map(|row| row.get::<String, _>("avatar_address").parse())
            .collect()
    }

    #[instrument(skip(self))]
    async fn get_medals_by_seasons(
        &self,
        season_ids: &[SeasonId],
    ) -> Result<Vec<MedalRecord>, ArenaError> {
        let rows = sqlx::query(
            "SELECT avatar_address, season_id, medal_count FROM medals WHERE season_id = ANY($1)",
        )
        .bind(season_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, "Failed to fetch medals");
            ArenaError::Database(e.to_string())
        })?;

        rows.iter()
            .map(|row| -> Result<MedalRecord, ArenaError> {
                Ok(MedalRecord {
                    address: row.get::<String, _>("avatar_address").parse()?,
                    season_id: row.get("season_id"),
                    medal_count: row.get("medal_count"),
                })
            })
            .collect()
    }

    #[instrument(skip(self))]
    async fn get_qualifying_seasons(
        &self,
        championship_id: SeasonId,
    ) -> Result<Vec<SeasonId>, ArenaError> {
        let rows = sqlx::query(
            "SELECT id FROM seasons \
             WHERE arena_type = $2 AND id < $1 AND id > COALESCE( \
                 (SELECT MAX(id) FROM seasons WHERE arena_type = $3 AND id < $1), 0) \
             ORDER BY id",
        )
        .bind(championship_id)
        .bind(ArenaType::Season.as_ref())
        .bind(ArenaType::Championship.as_ref())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, championship_id, "Failed to fetch qualifying seasons");
            ArenaError::Database(e.to_string())
        })?;

        Ok(rows.iter().map(|row| row.get("id")).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::test_utils::address;

    fn roster_with_scores(scores: &[i64]) -> InMemoryRosterRepository {
        let roster = InMemoryRosterRepository::new();
        for (n, score) in scores.iter().enumerate() {
            roster
                .insert_participant(1, ParticipantRecord::new(address(n as u32), None, *score))
                .unwrap();
        }
        roster
    }

    #[tokio::test]
    async fn pages_are_stable_and_filtered() {
        let roster = roster_with_scores(&[1000, 1200, 1001, 1200, 900]);

        let first = roster.get_participants(1, 0, 2, Some(1001)).await.unwrap();
        assert_eq!(
            first.iter().map(|r| r.address).collect::<Vec<_>>(),
            vec![address(1), address(3)]
        );

        let rest = roster.get_participants(1, 2, 2, Some(1001)).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].score, 1001);

        assert_eq!(roster.get_participants(1, 0, 10, None).await.unwrap().len(), 5);
        assert!(roster.get_participants(7, 0, 10, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn add_participants_skips_existing() {
        let roster = InMemoryRosterRepository::new();
        let record = ParticipantRecord::new(address(1), Some(4), 1000);

        assert_eq!(roster.add_participants(2, &[record, record]).await.unwrap(), 1);
        assert_eq!(roster.add_participants(2, &[record]).await.unwrap(), 0);
        assert_eq!(roster.participant_count(2).unwrap(), 1);
        assert_eq!(roster.get_clan_members(4).await.unwrap(), vec![address(1)]);
    }

    #[tokio::test]
    async fn overwriting_a_participant_moves_its_clan() {
        let roster = InMemoryRosterRepository::new();
        roster
            .insert_participant(1, ParticipantRecord::new(address(1), Some(4), 1000))
            .unwrap();
        roster
            .insert_participant(1, ParticipantRecord::new(address(2), Some(4), 1000))
            .unwrap();
        roster
            .insert_participant(1, ParticipantRecord::new(address(1), Some(7), 1100))
            .unwrap();

        assert_eq!(roster.get_clan_members(4).await.unwrap(), vec![address(2)]);
        assert_eq!(roster.get_clan_members(7).await.unwrap(), vec![address(1)]);

        roster
            .insert_participant(1, ParticipantRecord::new(address(2), None, 1000))
            .unwrap();
        assert!(roster.get_clan_members(4).await.unwrap().is_empty());

        // a skipped duplicate leaves membership alone
        let stale = ParticipantRecord::new(address(1), Some(4), 1000);
        assert_eq!(roster.add_participants(1, &[stale]).await.unwrap(), 0);
        assert_eq!(roster.get_clan_members(7).await.unwrap(), vec![address(1)]);
        assert!(roster.get_clan_members(4).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn qualifying_seasons_stop_at_previous_championship() {
        let roster = InMemoryRosterRepository::new();
        for (id, arena_type) in [
            (1, ArenaType::Season),
            (2, ArenaType::Championship),
            (3, ArenaType::Season),
            (4, ArenaType::Season),
            (5, ArenaType::Championship),
            (6, ArenaType::Season),
        ] {
            roster.insert_season(id, arena_type).unwrap();
        }

        assert_eq!(roster.get_qualifying_seasons(5).await.unwrap(), vec![3, 4]);
        assert_eq!(roster.get_qualifying_seasons(2).await.unwrap(), vec![1]);
        assert!(roster.get_qualifying_seasons(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn medals_filter_by_season() {
        let roster = InMemoryRosterRepository::new();
        for season_id in [3, 4, 9] {
            roster
                .insert_medals(MedalRecord {
                    address: address(1),
                    season_id,
                    medal_count: 2,
                })
                .unwrap();
        }

        let medals = roster.get_medals_by_seasons(&[3, 4]).await.unwrap();
        assert_eq!(medals.iter().map(|m| m.medal_count).sum::<i32>(), 4);
    }
}
