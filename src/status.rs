use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};
use tracing::{debug, instrument, warn};

use crate::shared::ArenaError;
use crate::store::{ScoreStore, StoreOp};

/// Readiness flag stored next to every ranking key
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RankingStatus {
    Initializing,
    CopyingInProgress,
    Done,
}

impl RankingStatus {
    /// Guarded transitions; `from == None` means the status key is absent.
    /// Re-entering INITIALIZING or COPYING_IN_PROGRESS resumes an interrupted
    /// load. A finished ranking may only be copied over or swapped in place.
    pub fn can_transition(from: Option<RankingStatus>, to: RankingStatus) -> bool {
        use RankingStatus::*;

        matches!(
            (from, to),
            (None, Initializing)
                | (None, CopyingInProgress)
                | (Some(Initializing), Initializing)
                | (Some(Initializing), Done)
                | (Some(CopyingInProgress), CopyingInProgress)
                | (Some(CopyingInProgress), Done)
                | (Some(Done), CopyingInProgress)
                | (Some(Done), Done)
        )
    }

    pub fn is_ready(self) -> bool {
        self == RankingStatus::Done
    }
}

fn describe(status: Option<RankingStatus>) -> String {
    status.map_or_else(|| "ABSENT".to_string(), |s| s.to_string())
}

/// Reads and writes status flags through the shared store
#[derive(Clone)]
pub struct StatusFlag {
    store: Arc<dyn ScoreStore>,
}

impl StatusFlag {
    pub fn new(store: Arc<dyn ScoreStore>) -> Self {
        Self { store }
    }

    /// Write op for a status value, for use inside atomic batches
    pub fn status_op(key: &str, status: RankingStatus, ttl: Option<Duration>) -> StoreOp {
        StoreOp::StringSet {
            key: key.to_string(),
            value: status.to_string(),
            ttl,
        }
    }

    pub async fn read(&self, key: &str) -> Result<Option<RankingStatus>, ArenaError> {
        match self.store.string_get(key).await? {
            None => Ok(None),
            Some(raw) => RankingStatus::from_str(&raw).map(Some).map_err(|_| {
                ArenaError::Validation(format!("unknown ranking status {} at {}", raw, key))
            }),
        }
    }

    /// Moves the flag to `to` if the transition is legal, returning the previous status
    #[instrument(skip(self))]
    pub async fn transition(
        &self,
        key: &str,
        to: RankingStatus,
        ttl: Option<Duration>,
    ) -> Result<Option<RankingStatus>, ArenaError> {
        let from = self.read(key).await?;
        if !RankingStatus::can_transition(from, to) {
            warn!(key, from = %describe(from), to = %to, "Rejected status transition");
            return Err(ArenaError::InvalidTransition {
                key: key.to_string(),
                from: describe(from),
                to: to.to_string(),
            });
        }

        self.store.string_set(key, to.as_ref(), ttl).await?;
        debug!(key, from = %describe(from), to = %to, "Status transitioned");
        Ok(from)
    }

    /// Fails with NotFound when the flag is absent and NotReady when it is not DONE
    pub async fn ensure_done(&self, key: &str) -> Result<(), ArenaError> {
        match self.read(key).await? {
            Some(RankingStatus::Done) => Ok(()),
            None => Err(ArenaError::NotFound(format!("no ranking status at {}", key))),
            Some(status) => Err(ArenaError::NotReady {
                key: key.to_string(),
                status: status.to_string(),
            }),
        }
    }

    /// Replaces ranking data guarded by the flag at `status_key`.
    ///
    /// A DONE ranking is swapped in one atomic batch and stays DONE. Anything
    /// else is held at INITIALIZING (or its current COPYING_IN_PROGRESS) while
    /// the data is written, then marked DONE.
    #[instrument(skip(self, data_ops), fields(op_count = data_ops.len()))]
    pub async fn load_guarded(
        &self,
        status_key: &str,
        mut data_ops: Vec<StoreOp>,
        ttl: Duration,
    ) -> Result<(), ArenaError> {
        let current = self.read(status_key).await?;

        match current {
            Some(RankingStatus::Done) => {
                data_ops.push(Self::status_op(status_key, RankingStatus::Done, Some(ttl)));
                self.store.apply_atomic(data_ops).await?;
                debug!(status_key, "Ranking swapped atomically");
            }
            Some(RankingStatus::CopyingInProgress) => {
                self.store.apply_atomic(data_ops).await?;
                self.transition(status_key, RankingStatus::Done, Some(ttl))
                    .await?;
            }
            _ => {
                self.transition(status_key, RankingStatus::Initializing, None)
                    .await?;
                self.store.apply_atomic(data_ops).await?;
                self.transition(status_key, RankingStatus::Done, Some(ttl))
                    .await?;
            }
        }

        Ok(())
    }
}
