use async_trait::async_trait;
use std::time::Duration;

use crate::shared::ArenaError;

/// One member of an ordered set together with its score
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoredMember {
    pub member: String,
    pub score: i64,
}

impl ScoredMember {
    pub fn new(member: impl Into<String>, score: i64) -> Self {
        Self {
            member: member.into(),
            score,
        }
    }
}

/// Write applied as part of an atomic batch
#[derive(Debug, Clone, PartialEq)]
pub enum StoreOp {
    SortedSetAdd {
        key: String,
        member: String,
        score: i64,
    },
    SortedSetIncrement {
        key: String,
        member: String,
        delta: i64,
    },
    SortedSetRemove {
        key: String,
        member: String,
    },
    /// Drops the existing set and writes `entries` in its place
    SortedSetReplace {
        key: String,
        entries: Vec<ScoredMember>,
    },
    /// Overwrites `target` with a copy of `source` (empty source deletes target)
    SortedSetCopy {
        source: String,
        target: String,
    },
    /// Removes `member` from `sorted_key` only if `hash_key` has no fields left
    SortedSetRemoveIfHashEmpty {
        sorted_key: String,
        member: String,
        hash_key: String,
    },
    HashSet {
        key: String,
        field: String,
        value: String,
    },
    HashDelete {
        key: String,
        field: String,
    },
    /// Overwrites `target` with a copy of `source`
    HashCopy {
        source: String,
        target: String,
    },
    SetAdd {
        key: String,
        member: String,
    },
    StringSet {
        key: String,
        value: String,
        ttl: Option<Duration>,
    },
    Expire {
        key: String,
        ttl: Duration,
    },
    Delete {
        key: String,
    },
    /// Deletes every key starting with `prefix`
    DeletePrefix {
        prefix: String,
    },
    /// Replaces every key under `target_prefix` with copies of the keys under
    /// `source_prefix`, keeping each key's suffix; copies expire after `ttl`
    CopyPrefix {
        source_prefix: String,
        target_prefix: String,
        ttl: Option<Duration>,
    },
}

/// Ordered-set / hash / string store every ranking component is built on.
///
/// Ordered sets sort ascending by `(score, member)`. Descending ranks and
/// ranges are the exact reverse, so equal scores come out in descending member
/// order. All ranks are 0-based.
#[async_trait]
pub trait ScoreStore: Send + Sync {
    async fn sorted_set_add(&self, key: &str, member: &str, score: i64) -> Result<(), ArenaError>;

    /// Adds `delta` to the member's score, inserting it at `delta` if absent
    async fn sorted_set_increment(
        &self,
        key: &str,
        member: &str,
        delta: i64,
    ) -> Result<i64, ArenaError>;

    async fn sorted_set_score(&self, key: &str, member: &str) -> Result<Option<i64>, ArenaError>;

    async fn sorted_set_rank_desc(&self, key: &str, member: &str)
        -> Result<Option<u64>, ArenaError>;

    /// Number of members whose score is `>= min_score`
    async fn sorted_set_count_at_least(&self, key: &str, min_score: i64)
        -> Result<u64, ArenaError>;

    async fn sorted_set_len(&self, key: &str) -> Result<u64, ArenaError>;

    /// Members from descending rank `start` to `stop` inclusive; `None` reads to the end
    async fn sorted_set_range_desc(
        &self,
        key: &str,
        start: u64,
        stop: Option<u64>,
    ) -> Result<Vec<ScoredMember>, ArenaError>;

    async fn sorted_set_remove(&self, key: &str, member: &str) -> Result<bool, ArenaError>;

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<(), ArenaError>;

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>, ArenaError>;

    async fn hash_get_all(&self, key: &str) -> Result<Vec<(String, String)>, ArenaError>;

    async fn hash_len(&self, key: &str) -> Result<u64, ArenaError>;

    async fn set_add(&self, key: &str, member: &str) -> Result<bool, ArenaError>;

    async fn set_members(&self, key: &str) -> Result<Vec<String>, ArenaError>;

    async fn string_get(&self, key: &str) -> Result<Option<String>, ArenaError>;

    async fn string_set(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), ArenaError>;

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, ArenaError>;

    async fn exists(&self, key: &str) -> Result<bool, ArenaError>;

    async fn delete(&self, key: &str) -> Result<bool, ArenaError>;

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, ArenaError>;

    /// Applies every op or none; readers never observe a partially applied batch
    async fn apply_atomic(&self, ops: Vec<StoreOp>) -> Result<(), ArenaError>;
}
