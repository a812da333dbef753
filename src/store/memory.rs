use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};

use super::repository::{ScoreStore, ScoredMember, StoreOp};
use super::sorted_set::SortedSet;
use crate::shared::ArenaError;

#[derive(Debug, Clone)]
enum Value {
    SortedSet(SortedSet),
    Hash(HashMap<String, String>),
    Set(HashSet<String>),
    Str(String),
}

impl Value {
    fn is_empty(&self) -> bool {
        match self {
            Value::SortedSet(set) => set.is_empty(),
            Value::Hash(hash) => hash.is_empty(),
            Value::Set(set) => set.is_empty(),
            Value::Str(_) => false,
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<DateTime<Utc>>,
}

impl Entry {
    fn new(value: Value) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

fn wrong_type(key: &str, expected: &str) -> ArenaError {
    ArenaError::Validation(format!("key {} does not hold a {}", key, expected))
}

fn expiry_from(ttl: Duration) -> Result<DateTime<Utc>, ArenaError> {
    let ttl = chrono::Duration::from_std(ttl)
        .map_err(|e| ArenaError::Validation(format!("ttl out of range: {}", e)))?;
    Ok(Utc::now() + ttl)
}

#[derive(Debug, Default)]
struct StoreState {
    entries: HashMap<String, Entry>,
}

impl StoreState {
    fn live(&self, key: &str) -> Option<&Entry> {
        self.entries
            .get(key)
            .filter(|entry| !entry.is_expired(Utc::now()))
    }

    fn purge_if_expired(&mut self, key: &str) {
        if self
            .entries
            .get(key)
            .is_some_and(|entry| entry.is_expired(Utc::now()))
        {
            self.entries.remove(key);
        }
    }

    /// Drops collections left empty by a removal, as Redis does
    fn drop_if_empty(&mut self, key: &str) {
        if self
            .entries
            .get(key)
            .is_some_and(|entry| entry.value.is_empty())
        {
            self.entries.remove(key);
        }
    }

    fn sorted(&self, key: &str) -> Result<Option<&SortedSet>, ArenaError> {
        match self.live(key).map(|entry| &entry.value) {
            None => Ok(None),
            Some(Value::SortedSet(set)) => Ok(Some(set)),
            Some(_) => Err(wrong_type(key, "sorted set")),
        }
    }

    fn sorted_mut(&mut self, key: &str) -> Result<&mut SortedSet, ArenaError> {
        self.purge_if_expired(key);
        let entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::new(Value::SortedSet(SortedSet::new())));
        match &mut entry.value {
            Value::SortedSet(set) => Ok(set),
            _ => Err(wrong_type(key, "sorted set")),
        }
    }

    fn hash(&self, key: &str) -> Result<Option<&HashMap<String, String>>, ArenaError> {
        match self.live(key).map(|entry| &entry.value) {
            None => Ok(None),
            Some(Value::Hash(hash)) => Ok(Some(hash)),
            Some(_) => Err(wrong_type(key, "hash")),
        }
    }

    fn hash_mut(&mut self, key: &str) -> Result<&mut HashMap<String, String>, ArenaError> {
        self.purge_if_expired(key);
        let entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::new(Value::Hash(HashMap::new())));
        match &mut entry.value {
            Value::Hash(hash) => Ok(hash),
            _ => Err(wrong_type(key, "hash")),
        }
    }

    fn set(&self, key: &str) -> Result<Option<&HashSet<String>>, ArenaError> {
        match self.live(key).map(|entry| &entry.value) {
            None => Ok(None),
            Some(Value::Set(set)) => Ok(Some(set)),
            Some(_) => Err(wrong_type(key, "set")),
        }
    }

    fn set_mut(&mut self, key: &str) -> Result<&mut HashSet<String>, ArenaError> {
        self.purge_if_expired(key);
        let entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::new(Value::Set(HashSet::new())));
        match &mut entry.value {
            Value::Set(set) => Ok(set),
            _ => Err(wrong_type(key, "set")),
        }
    }

    fn copy_value(&mut self, source: &str, target: &str) {
        let copied = self.live(source).map(|entry| entry.value.clone());
        self.entries.remove(target);
        if let Some(value) = copied {
            self.entries.insert(target.to_string(), Entry::new(value));
        }
    }

    fn apply(&mut self, op: StoreOp) -> Result<(), ArenaError> {
        match op {
            StoreOp::SortedSetAdd { key, member, score } => {
                self.sorted_mut(&key)?.insert(&member, score);
            }
            StoreOp::SortedSetIncrement { key, member, delta } => {
                self.sorted_mut(&key)?.increment(&member, delta);
            }
            StoreOp::SortedSetRemove { key, member } => {
                if self.sorted(&key)?.is_some() {
                    self.sorted_mut(&key)?.remove(&member);
                    self.drop_if_empty(&key);
                }
            }
            StoreOp::SortedSetReplace { key, entries } => {
                self.entries.remove(&key);
                if !entries.is_empty() {
                    let set = self.sorted_mut(&key)?;
                    for entry in entries {
                        set.insert(&entry.member, entry.score);
                    }
                }
            }
            StoreOp::SortedSetCopy { source, target } => {
                self.sorted(&source)?;
                self.copy_value(&source, &target);
            }
            StoreOp::SortedSetRemoveIfHashEmpty {
                sorted_key,
                member,
                hash_key,
            } => {
                let hash_empty = self.hash(&hash_key)?.map_or(true, |hash| hash.is_empty());
                if hash_empty && self.sorted(&sorted_key)?.is_some() {
                    self.sorted_mut(&sorted_key)?.remove(&member);
                    self.drop_if_empty(&sorted_key);
                }
            }
            StoreOp::HashSet { key, field, value } => {
                self.hash_mut(&key)?.insert(field, value);
            }
            StoreOp::HashDelete { key, field } => {
                if self.hash(&key)?.is_some() {
                    self.hash_mut(&key)?.remove(&field);
                    self.drop_if_empty(&key);
                }
            }
            StoreOp::HashCopy { source, target } => {
                self.hash(&source)?;
                self.copy_value(&source, &target);
            }
            StoreOp::SetAdd { key, member } => {
                self.set_mut(&key)?.insert(member);
            }
            StoreOp::StringSet { key, value, ttl } => {
                let expires_at = ttl.map(expiry_from).transpose()?;
                self.entries.insert(
                    key,
                    Entry {
                        value: Value::Str(value),
                        expires_at,
                    },
                );
            }
            StoreOp::Expire { key, ttl } => {
                self.purge_if_expired(&key);
                let expires_at = expiry_from(ttl)?;
                if let Some(entry) = self.entries.get_mut(&key) {
                    entry.expires_at = Some(expires_at);
                }
            }
            StoreOp::Delete { key } => {
                self.entries.remove(&key);
            }
            StoreOp::DeletePrefix { prefix } => {
                self.entries.retain(|key, _| !key.starts_with(&prefix));
            }
            StoreOp::CopyPrefix {
                source_prefix,
                target_prefix,
                ttl,
            } => {
                let expires_at = ttl.map(expiry_from).transpose()?;
                let now = Utc::now();
                let copies: Vec<(String, Value)> = self
                    .entries
                    .iter()
                    .filter(|(key, entry)| {
                        key.starts_with(&source_prefix) && !entry.is_expired(now)
                    })
                    .map(|(key, entry)| {
                        let suffix = &key[source_prefix.len()..];
                        (format!("{}{}", target_prefix, suffix), entry.value.clone())
                    })
                    .collect();
                self.entries.retain(|key, _| !key.starts_with(&target_prefix));
                for (key, value) in copies {
                    self.entries.insert(key, Entry { value, expires_at });
                }
            }
        }
        Ok(())
    }

    /// Keys a batch op may write, resolving prefixes against the current keys
    fn touched_keys(&self, op: &StoreOp) -> Vec<String> {
        match op {
            StoreOp::DeletePrefix { prefix }
            | StoreOp::CopyPrefix {
                target_prefix: prefix,
                ..
            } => self
                .entries
                .keys()
                .filter(|key| key.starts_with(prefix.as_str()))
                .cloned()
                .collect(),
            _ => touched_key(op).into_iter().map(str::to_string).collect(),
        }
    }
}

fn touched_key(op: &StoreOp) -> Option<&str> {
    let key = match op {
        StoreOp::SortedSetAdd { key, .. }
        | StoreOp::SortedSetIncrement { key, .. }
        | StoreOp::SortedSetRemove { key, .. }
        | StoreOp::SortedSetReplace { key, .. }
        | StoreOp::HashSet { key, .. }
        | StoreOp::HashDelete { key, .. }
        | StoreOp::SetAdd { key, .. }
        | StoreOp::StringSet { key, .. }
        | StoreOp::Expire { key, .. }
        | StoreOp::Delete { key } => key,
        StoreOp::SortedSetCopy { target, .. } | StoreOp::HashCopy { target, .. } => target,
        StoreOp::SortedSetRemoveIfHashEmpty { sorted_key, .. } => sorted_key,
        StoreOp::DeletePrefix { .. } | StoreOp::CopyPrefix { .. } => return None,
    };
    Some(key.as_str())
}

/// In-memory implementation of ScoreStore for development and testing
///
/// Mirrors the Redis semantics the engine relies on: ordered-set tie order,
/// lazy key expiry, empty collections disappearing and atomic batches. Data is
/// lost when the process exits.
#[derive(Debug, Default)]
pub struct InMemoryScoreStore {
    state: RwLock<StoreState>,
    unavailable: AtomicBool,
    failing_writes: Mutex<HashSet<(String, String)>>,
}

impl InMemoryScoreStore {
    /// Creates a new empty in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following call fail with `StoreUnavailable` until reset
    pub fn set_unavailable(&self, unavailable: bool) {
        warn!(unavailable, "In-memory store availability changed");
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Makes the next write of the string `value` to `key` fail with `StoreUnavailable`
    pub fn fail_next_string_set(&self, key: &str, value: &str) -> Result<(), ArenaError> {
        warn!(key, value, "In-memory store will fail the next string write");
        self.failing_writes
            .lock()
            .map_err(|_| {
                ArenaError::StoreUnavailable("failing writes lock poisoned".to_string())
            })?
            .insert((key.to_string(), value.to_string()));
        Ok(())
    }

    /// Number of live keys (useful for debugging)
    pub async fn key_count(&self) -> usize {
        let state = self.state.read().await;
        let now = Utc::now();
        state
            .entries
            .values()
            .filter(|entry| !entry.is_expired(now))
            .count()
    }

    fn check_available(&self) -> Result<(), ArenaError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ArenaError::StoreUnavailable(
                "in-memory store marked unavailable".to_string(),
            ));
        }
        Ok(())
    }

    fn check_injected_failure(&self, key: &str, value: &str) -> Result<(), ArenaError> {
        let armed = self
            .failing_writes
            .lock()
            .map_err(|_| {
                ArenaError::StoreUnavailable("failing writes lock poisoned".to_string())
            })?
            .remove(&(key.to_string(), value.to_string()));
        if armed {
            return Err(ArenaError::StoreUnavailable(format!(
                "write of {} to {} failed",
                value, key
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ScoreStore for InMemoryScoreStore {
    async fn sorted_set_add(&self, key: &str, member: &str, score: i64) -> Result<(), ArenaError> {
        self.check_available()?;
        let mut state = self.state.write().await;
        state.sorted_mut(key)?.insert(member, score);
        Ok(())
    }

    async fn sorted_set_increment(
        &self,
        key: &str,
        member: &str,
        delta: i64,
    ) -> Result<i64, ArenaError> {
        self.check_available()?;
        let mut state = self.state.write().await;
        Ok(state.sorted_mut(key)?.increment(member, delta))
    }

    async fn sorted_set_score(&self, key: &str, member: &str) -> Result<Option<i64>, ArenaError> {
        self.check_available()?;
        let state = self.state.read().await;
        Ok(state.sorted(key)?.and_then(|set| set.score(member)))
    }

    async fn sorted_set_rank_desc(
        &self,
        key: &str,
        member: &str,
    ) -> Result<Option<u64>, ArenaError> {
        self.check_available()?;
        let state = self.state.read().await;
        Ok(state.sorted(key)?.and_then(|set| set.rank_desc(member)))
    }

    async fn sorted_set_count_at_least(
        &self,
        key: &str,
        min_score: i64,
    ) -> Result<u64, ArenaError> {
        self.check_available()?;
        let state = self.state.read().await;
        Ok(state
            .sorted(key)?
            .map_or(0, |set| set.count_at_least(min_score)))
    }

    async fn sorted_set_len(&self, key: &str) -> Result<u64, ArenaError> {
        self.check_available()?;
        let state = self.state.read().await;
        Ok(state.sorted(key)?.map_or(0, |set| set.len() as u64))
    }

    async fn sorted_set_range_desc(
        &self,
        key: &str,
        start: u64,
        stop: Option<u64>,
    ) -> Result<Vec<ScoredMember>, ArenaError> {
        self.check_available()?;
        let state = self.state.read().await;
        Ok(state
            .sorted(key)?
            .map(|set| {
                set.range_desc(start, stop)
                    .into_iter()
                    .map(|(member, score)| ScoredMember::new(member, score))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn sorted_set_remove(&self, key: &str, member: &str) -> Result<bool, ArenaError> {
        self.check_available()?;
        let mut state = self.state.write().await;
        if state.sorted(key)?.is_none() {
            return Ok(false);
        }
        let removed = state.sorted_mut(key)?.remove(member);
        state.drop_if_empty(key);
        Ok(removed)
    }

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<(), ArenaError> {
        self.check_available()?;
        let mut state = self.state.write().await;
        state
            .hash_mut(key)?
            .insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>, ArenaError> {
        self.check_available()?;
        let state = self.state.read().await;
        Ok(state.hash(key)?.and_then(|hash| hash.get(field).cloned()))
    }

    async fn hash_get_all(&self, key: &str) -> Result<Vec<(String, String)>, ArenaError> {
        self.check_available()?;
        let state = self.state.read().await;
        let mut fields: Vec<(String, String)> = state
            .hash(key)?
            .map(|hash| {
                hash.iter()
                    .map(|(field, value)| (field.clone(), value.clone()))
                    .collect()
            })
            .unwrap_or_default();
        fields.sort();
        Ok(fields)
    }

    async fn hash_len(&self, key: &str) -> Result<u64, ArenaError> {
        self.check_available()?;
        let state = self.state.read().await;
        Ok(state.hash(key)?.map_or(0, |hash| hash.len() as u64))
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<bool, ArenaError> {
        self.check_available()?;
        let mut state = self.state.write().await;
        Ok(state.set_mut(key)?.insert(member.to_string()))
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, ArenaError> {
        self.check_available()?;
        let state = self.state.read().await;
        let mut members: Vec<String> = state
            .set(key)?
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        members.sort();
        Ok(members)
    }

    async fn string_get(&self, key: &str) -> Result<Option<String>, ArenaError> {
        self.check_available()?;
        let state = self.state.read().await;
        match state.live(key).map(|entry| &entry.value) {
            None => Ok(None),
            Some(Value::Str(value)) => Ok(Some(value.clone())),
            Some(_) => Err(wrong_type(key, "string")),
        }
    }

    async fn string_set(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), ArenaError> {
        self.check_available()?;
        self.check_injected_failure(key, value)?;
        let mut state = self.state.write().await;
        state.apply(StoreOp::StringSet {
            key: key.to_string(),
            value: value.to_string(),
            ttl,
        })
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, ArenaError> {
        self.check_available()?;
        let mut state = self.state.write().await;
        state.purge_if_expired(key);
        let expires_at = expiry_from(ttl)?;
        match state.entries.get_mut(key) {
            Some(entry) => {
                entry.expires_at = Some(expires_at);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool, ArenaError> {
        self.check_available()?;
        let state = self.state.read().await;
        Ok(state.live(key).is_some())
    }

    async fn delete(&self, key: &str) -> Result<bool, ArenaError> {
        self.check_available()?;
        let mut state = self.state.write().await;
        state.purge_if_expired(key);
        Ok(state.entries.remove(key).is_some())
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, ArenaError> {
        self.check_available()?;
        let state = self.state.read().await;
        let now = Utc::now();
        let mut keys: Vec<String> = state
            .entries
            .iter()
            .filter(|(key, entry)| key.starts_with(prefix) && !entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    #[instrument(skip(self, ops), fields(op_count = ops.len()))]
    async fn apply_atomic(&self, ops: Vec<StoreOp>) -> Result<(), ArenaError> {
        self.check_available()?;
        let mut state = self.state.write().await;

        let mut snapshot: HashMap<String, Option<Entry>> = HashMap::new();
        let mut prefixes: Vec<String> = Vec::new();
        for op in &ops {
            if let StoreOp::StringSet { key, value, .. } = op {
                self.check_injected_failure(key, value)?;
            }
            if let StoreOp::DeletePrefix { prefix }
            | StoreOp::CopyPrefix {
                target_prefix: prefix,
                ..
            } = op
            {
                prefixes.push(prefix.clone());
            }
            for key in state.touched_keys(op) {
                if !snapshot.contains_key(&key) {
                    let previous = state.entries.get(&key).cloned();
                    snapshot.insert(key, previous);
                }
            }
        }

        for op in ops {
            if let Err(err) = state.apply(op) {
                warn!(error = %err, "Atomic batch failed, rolling back");
                // keys created under a prefix did not exist before the batch
                state
                    .entries
                    .retain(|key, _| !prefixes.iter().any(|prefix| key.starts_with(prefix)));
                for (key, previous) in snapshot {
                    match previous {
                        Some(entry) => state.entries.insert(key, entry),
                        None => state.entries.remove(&key),
                    };
                }
                return Err(err);
            }
        }

        debug!("Atomic batch applied");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op_add(key: &str, member: &str, score: i64) -> StoreOp {
        StoreOp::SortedSetAdd {
            key: key.to_string(),
            member: member.to_string(),
            score,
        }
    }

    #[tokio::test]
    async fn sorted_set_reads_follow_descending_order() {
        let store = InMemoryScoreStore::new();
        store.sorted_set_add("z", "a", 1).await.unwrap();
        store.sorted_set_add("z", "b", 3).await.unwrap();
        store.sorted_set_increment("z", "c", 2).await.unwrap();

        let all = store.sorted_set_range_desc("z", 0, None).await.unwrap();
        let members: Vec<&str> = all.iter().map(|m| m.member.as_str()).collect();
        assert_eq!(members, vec!["b", "c", "a"]);
        assert_eq!(store.sorted_set_rank_desc("z", "a").await.unwrap(), Some(2));
        assert_eq!(store.sorted_set_count_at_least("z", 2).await.unwrap(), 2);
        assert_eq!(store.sorted_set_len("missing").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn empty_collections_disappear() {
        let store = InMemoryScoreStore::new();
        store.hash_set("h", "f", "1").await.unwrap();
        store
            .apply_atomic(vec![StoreOp::HashDelete {
                key: "h".to_string(),
                field: "f".to_string(),
            }])
            .await
            .unwrap();
        assert!(!store.exists("h").await.unwrap());

        store.sorted_set_add("z", "m", 1).await.unwrap();
        assert!(store.sorted_set_remove("z", "m").await.unwrap());
        assert!(!store.exists("z").await.unwrap());
    }

    #[tokio::test]
    async fn conditional_remove_only_fires_for_empty_hash() {
        let store = InMemoryScoreStore::new();
        store.sorted_set_add("groups", "group:1", 1).await.unwrap();
        store.hash_set("bucket", "p", "1").await.unwrap();

        let remove = StoreOp::SortedSetRemoveIfHashEmpty {
            sorted_key: "groups".to_string(),
            member: "group:1".to_string(),
            hash_key: "bucket".to_string(),
        };

        store.apply_atomic(vec![remove.clone()]).await.unwrap();
        assert_eq!(
            store.sorted_set_score("groups", "group:1").await.unwrap(),
            Some(1)
        );

        store
            .apply_atomic(vec![
                StoreOp::HashDelete {
                    key: "bucket".to_string(),
                    field: "p".to_string(),
                },
                remove,
            ])
            .await
            .unwrap();
        assert_eq!(
            store.sorted_set_score("groups", "group:1").await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn failed_batch_rolls_back_every_write() {
        let store = InMemoryScoreStore::new();
        store.string_set("status", "DONE", None).await.unwrap();
        store.sorted_set_add("z", "a", 1).await.unwrap();

        let result = store
            .apply_atomic(vec![
                op_add("z", "b", 2),
                StoreOp::Delete {
                    key: "z".to_string(),
                },
                // wrong type: "status" is a string
                op_add("status", "x", 1),
            ])
            .await;

        assert!(matches!(result, Err(ArenaError::Validation(_))));
        assert_eq!(store.sorted_set_len("z").await.unwrap(), 1);
        assert_eq!(store.sorted_set_score("z", "a").await.unwrap(), Some(1));
        assert_eq!(
            store.string_get("status").await.unwrap(),
            Some("DONE".to_string())
        );
    }

    #[tokio::test]
    async fn prefix_ops_replace_whole_key_families() {
        let store = InMemoryScoreStore::new();
        store.hash_set("src:group:1", "a", "1").await.unwrap();
        store.hash_set("src:group:2", "b", "2").await.unwrap();
        store.hash_set("dst:group:9", "stale", "9").await.unwrap();
        store.hash_set("dst:index", "keep", "1").await.unwrap();

        store
            .apply_atomic(vec![StoreOp::CopyPrefix {
                source_prefix: "src:group:".to_string(),
                target_prefix: "dst:group:".to_string(),
                ttl: Some(Duration::from_secs(60)),
            }])
            .await
            .unwrap();
        assert_eq!(
            store.keys_with_prefix("dst:").await.unwrap(),
            vec!["dst:group:1", "dst:group:2", "dst:index"]
        );
        assert_eq!(
            store.hash_get("dst:group:2", "b").await.unwrap(),
            Some("2".to_string())
        );

        store
            .apply_atomic(vec![StoreOp::DeletePrefix {
                prefix: "src:group:".to_string(),
            }])
            .await
            .unwrap();
        assert!(store.keys_with_prefix("src:").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_prefix_batch_restores_previous_keys() {
        let store = InMemoryScoreStore::new();
        store.hash_set("src:group:1", "a", "1").await.unwrap();
        store.hash_set("dst:group:9", "stale", "9").await.unwrap();
        store.string_set("status", "DONE", None).await.unwrap();

        let result = store
            .apply_atomic(vec![
                StoreOp::CopyPrefix {
                    source_prefix: "src:group:".to_string(),
                    target_prefix: "dst:group:".to_string(),
                    ttl: None,
                },
                StoreOp::DeletePrefix {
                    prefix: "src:".to_string(),
                },
                op_add("status", "x", 1),
            ])
            .await;

        assert!(matches!(result, Err(ArenaError::Validation(_))));
        assert_eq!(store.keys_with_prefix("dst:").await.unwrap(), vec!["dst:group:9"]);
        assert_eq!(store.keys_with_prefix("src:").await.unwrap(), vec!["src:group:1"]);
    }

    #[tokio::test]
    async fn injected_write_failure_fires_once() {
        let store = InMemoryScoreStore::new();
        store.fail_next_string_set("status", "DONE").unwrap();
        store.string_set("status", "INITIALIZING", None).await.unwrap();

        let failed = store.string_set("status", "DONE", None).await;
        assert!(matches!(failed, Err(ArenaError::StoreUnavailable(_))));
        assert_eq!(
            store.string_get("status").await.unwrap(),
            Some("INITIALIZING".to_string())
        );

        store.string_set("status", "DONE", None).await.unwrap();
        assert_eq!(
            store.string_get("status").await.unwrap(),
            Some("DONE".to_string())
        );
    }

    #[tokio::test]
    async fn copy_overwrites_target() {
        let store = InMemoryScoreStore::new();
        store.sorted_set_add("src", "a", 1).await.unwrap();
        store.sorted_set_add("dst", "stale", 9).await.unwrap();

        store
            .apply_atomic(vec![StoreOp::SortedSetCopy {
                source: "src".to_string(),
                target: "dst".to_string(),
            }])
            .await
            .unwrap();

        let copied = store.sorted_set_range_desc("dst", 0, None).await.unwrap();
        assert_eq!(copied, vec![ScoredMember::new("a", 1)]);
    }

    #[tokio::test]
    async fn expired_keys_read_as_absent() {
        let store = InMemoryScoreStore::new();
        store
            .string_set("short", "v", Some(Duration::from_millis(5)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(store.string_get("short").await.unwrap(), None);
        assert!(store.keys_with_prefix("sh").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unavailable_store_fails_every_call() {
        let store = InMemoryScoreStore::new();
        store.set_unavailable(true);

        let result = store.sorted_set_len("z").await;
        assert!(matches!(result, Err(ArenaError::StoreUnavailable(_))));

        store.set_unavailable(false);
        assert!(store.sorted_set_len("z").await.is_ok());
    }
}
