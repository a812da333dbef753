use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use strum_macros::{Display, EnumString};

use super::models::RankingEntry;
use super::repository::ParticipantRankingRepository;
use crate::config::ArenaConfig;
use crate::group_ranking::ScoreGroupRankingRepository;
use crate::identity::AvatarAddress;
use crate::keys::RankingKey;
use crate::opponent::{OpponentGroupTable, OpponentSelection};
use crate::shared::ArenaError;
use crate::status::RankingStatus;
use crate::store::ScoreStore;

/// Which ranking representation a deployment runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RankingBackendKind {
    /// One ordered-set entry per participant
    #[default]
    Participant,
    /// One ordered-set entry per distinct score
    ScoreGroup,
}

/// Participant ranking behind either representation, so matchmaking and the
/// coordinators do not care which one is deployed
#[derive(Clone)]
pub enum RankingBackend {
    Participant(ParticipantRankingRepository),
    ScoreGroup(ScoreGroupRankingRepository),
}

impl RankingBackend {
    pub fn new(kind: RankingBackendKind, store: Arc<dyn ScoreStore>, config: Arc<ArenaConfig>) -> Self {
        match kind {
            RankingBackendKind::Participant => {
                Self::Participant(ParticipantRankingRepository::new(store, config))
            }
            RankingBackendKind::ScoreGroup => {
                Self::ScoreGroup(ScoreGroupRankingRepository::new(store, config))
            }
        }
    }

    pub fn kind(&self) -> RankingBackendKind {
        match self {
            Self::Participant(_) => RankingBackendKind::Participant,
            Self::ScoreGroup(_) => RankingBackendKind::ScoreGroup,
        }
    }

    pub async fn get_status(&self, key: RankingKey) -> Result<Option<RankingStatus>, ArenaError> {
        match self {
            Self::Participant(repo) => repo.get_status(key).await,
            Self::ScoreGroup(repo) => repo.get_status(key).await,
        }
    }

    pub async fn ensure_ready(&self, key: RankingKey) -> Result<(), ArenaError> {
        match self {
            Self::Participant(repo) => repo.ensure_ready(key).await,
            Self::ScoreGroup(repo) => repo.ensure_ready(key).await,
        }
    }

    pub async fn init_ranking(
        &self,
        key: RankingKey,
        entries: &[RankingEntry],
        round_interval: u64,
    ) -> Result<(), ArenaError> {
        match self {
            Self::Participant(repo) => repo.init_ranking(key, entries, round_interval).await,
            Self::ScoreGroup(repo) => repo.init_ranking(key, entries, round_interval).await,
        }
    }

    pub async fn begin_initialization(&self, key: RankingKey) -> Result<(), ArenaError> {
        match self {
            Self::Participant(repo) => repo.begin_initialization(key).await,
            Self::ScoreGroup(repo) => repo.begin_initialization(key).await,
        }
    }

    pub async fn append_entries(
        &self,
        key: RankingKey,
        entries: &[RankingEntry],
    ) -> Result<(), ArenaError> {
        match self {
            Self::Participant(repo) => repo.append_entries(key, entries).await,
            Self::ScoreGroup(repo) => repo.append_entries(key, entries).await,
        }
    }

    pub async fn mark_done(&self, key: RankingKey, round_interval: u64) -> Result<(), ArenaError> {
        match self {
            Self::Participant(repo) => repo.mark_done(key, round_interval).await,
            Self::ScoreGroup(repo) => repo.mark_done(key, round_interval).await,
        }
    }

    pub async fn begin_copy(&self, target: RankingKey) -> Result<(), ArenaError> {
        match self {
            Self::Participant(repo) => repo.begin_copy(target).await,
            Self::ScoreGroup(repo) => repo.begin_copy(target).await,
        }
    }

    pub async fn copy_round_data(
        &self,
        source: RankingKey,
        target: RankingKey,
        round_interval: u64,
    ) -> Result<(), ArenaError> {
        match self {
            Self::Participant(repo) => repo.copy_round_data(source, target, round_interval).await,
            Self::ScoreGroup(repo) => repo.copy_round_data(source, target, round_interval).await,
        }
    }

    /// Signed delta; returns the new score
    pub async fn apply_score_change(
        &self,
        key: RankingKey,
        address: &AvatarAddress,
        delta: i64,
    ) -> Result<i64, ArenaError> {
        match self {
            Self::Participant(repo) => repo.update_score(key, address, delta).await,
            Self::ScoreGroup(repo) => repo.apply_delta(key, address, delta).await,
        }
    }

    pub async fn get_score(
        &self,
        key: RankingKey,
        address: &AvatarAddress,
    ) -> Result<Option<i64>, ArenaError> {
        match self {
            Self::Participant(repo) => repo.get_score(key, address).await,
            Self::ScoreGroup(repo) => repo.score_of(key, address).await,
        }
    }

    pub async fn get_rank(&self, key: RankingKey, address: &AvatarAddress) -> Result<u64, ArenaError> {
        match self {
            Self::Participant(repo) => repo.get_rank(key, address).await,
            Self::ScoreGroup(repo) => repo.get_rank(key, address).await,
        }
    }

    pub async fn get_ranking_count(&self, key: RankingKey) -> Result<u64, ArenaError> {
        match self {
            Self::Participant(repo) => repo.get_ranking_count(key).await,
            Self::ScoreGroup(repo) => repo.get_ranking_count(key).await,
        }
    }

    pub async fn get_entries_page(
        &self,
        key: RankingKey,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<RankingEntry>, ArenaError> {
        match self {
            Self::Participant(repo) => repo.get_entries_page(key, offset, limit).await,
            Self::ScoreGroup(repo) => repo.get_entries_page(key, offset, limit).await,
        }
    }

    pub async fn select_battle_opponents<R: Rng + Send>(
        &self,
        key: RankingKey,
        address: &AvatarAddress,
        table: &OpponentGroupTable,
        rng: &mut R,
    ) -> Result<OpponentSelection, ArenaError> {
        match self {
            Self::Participant(repo) => {
                repo.select_battle_opponents(key, address, table, rng)
                    .await
            }
            Self::ScoreGroup(repo) => {
                repo.select_battle_opponents(key, address, table, rng)
                    .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::test_utils::{address, config, memory_store};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rstest::rstest;

    #[test]
    fn kind_parses_from_config_strings() {
        assert_eq!(
            "score_group".parse::<RankingBackendKind>().unwrap(),
            RankingBackendKind::ScoreGroup
        );
        assert_eq!(RankingBackendKind::Participant.to_string(), "participant");
        assert!("redis".parse::<RankingBackendKind>().is_err());
    }

    #[rstest]
    #[case(RankingBackendKind::Participant)]
    #[case(RankingBackendKind::ScoreGroup)]
    #[tokio::test]
    async fn backends_agree_on_reads_and_deltas(#[case] kind: RankingBackendKind) {
        let (_, store) = memory_store();
        let backend = RankingBackend::new(kind, store, Arc::new(config()));
        assert_eq!(backend.kind(), kind);

        let key = RankingKey::new(1, 2);
        let entries: Vec<RankingEntry> = (0..5)
            .map(|n| RankingEntry::new(address(n), 1000 + i64::from(n) * 10))
            .collect();
        backend.init_ranking(key, &entries, 100).await.unwrap();

        assert_eq!(backend.get_ranking_count(key).await.unwrap(), 5);
        assert_eq!(backend.get_rank(key, &address(4)).await.unwrap(), 1);
        assert_eq!(
            backend.apply_score_change(key, &address(0), 45).await.unwrap(),
            1045
        );
        assert_eq!(backend.get_rank(key, &address(0)).await.unwrap(), 1);
        assert_eq!(backend.get_score(key, &address(0)).await.unwrap(), Some(1045));

        let page = backend.get_entries_page(key, 0, 2).await.unwrap();
        assert_eq!(page[0], RankingEntry::new(address(0), 1045));
        assert_eq!(page[1], RankingEntry::new(address(4), 1040));

        let mut rng = StdRng::seed_from_u64(17);
        let selection = backend
            .select_battle_opponents(key, &address(2), &OpponentGroupTable::default(), &mut rng)
            .await
            .unwrap();
        assert_eq!(selection.len(), 5);
        assert!(selection.values().flatten().all(|o| o.address != address(2)));
    }
}
