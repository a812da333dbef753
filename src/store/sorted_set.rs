//! Ordered set backing the in-memory store.
//!
//! Members are kept in a `Vec` sorted by `(score, member)` for O(log n) rank
//! queries, plus a member→score map for O(1) lookups. Member strings are
//! shared between both indexes through `Arc<str>`.
//!
//! Inserts and removals find their slot by binary search and then shift the
//! tail of the `Vec`, so writes are O(n).

use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct SortedSet {
    sorted: Vec<(i64, Arc<str>)>,
    scores: HashMap<Arc<str>, i64>,
}

impl SortedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sorted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sorted.is_empty()
    }

    pub fn score(&self, member: &str) -> Option<i64> {
        self.scores.get(member).copied()
    }

    /// Inserts or updates; returns true when the member is new
    pub fn insert(&mut self, member: &str, score: i64) -> bool {
        if let Some(&old) = self.scores.get(member) {
            if old == score {
                return false;
            }
            self.remove_sorted(old, member);
            let name = self.shared_name(member);
            self.insert_sorted(score, name.clone());
            self.scores.insert(name, score);
            return false;
        }

        let name: Arc<str> = Arc::from(member);
        self.insert_sorted(score, name.clone());
        self.scores.insert(name, score);
        true
    }

    pub fn increment(&mut self, member: &str, delta: i64) -> i64 {
        let next = self.score(member).unwrap_or(0).saturating_add(delta);
        self.insert(member, next);
        next
    }

    pub fn remove(&mut self, member: &str) -> bool {
        match self.scores.remove(member) {
            Some(score) => {
                self.remove_sorted(score, member);
                true
            }
            None => false,
        }
    }

    pub fn rank_desc(&self, member: &str) -> Option<u64> {
        let score = self.score(member)?;
        let asc = self
            .sorted
            .binary_search_by(|(s, m)| (*s, m.as_ref()).cmp(&(score, member)))
            .ok()?;
        Some((self.sorted.len() - 1 - asc) as u64)
    }

    pub fn count_at_least(&self, min_score: i64) -> u64 {
        let below = self.sorted.partition_point(|(s, _)| *s < min_score);
        (self.sorted.len() - below) as u64
    }

    /// Descending slice `[start, stop]`, clamped to the set bounds
    pub fn range_desc(&self, start: u64, stop: Option<u64>) -> Vec<(String, i64)> {
        let len = self.sorted.len() as u64;
        if start >= len {
            return Vec::new();
        }
        let stop = stop.map_or(len - 1, |s| s.min(len - 1));
        if stop < start {
            return Vec::new();
        }

        self.sorted
            .iter()
            .rev()
            .skip(start as usize)
            .take((stop - start + 1) as usize)
            .map(|(score, member)| (member.to_string(), *score))
            .collect()
    }

    fn shared_name(&self, member: &str) -> Arc<str> {
        self.scores
            .get_key_value(member)
            .map(|(name, _)| name.clone())
            .unwrap_or_else(|| Arc::from(member))
    }

    fn insert_sorted(&mut self, score: i64, member: Arc<str>) {
        let at = self
            .sorted
            .partition_point(|(s, m)| (*s, m.as_ref()) < (score, member.as_ref()));
        self.sorted.insert(at, (score, member));
    }

    fn remove_sorted(&mut self, score: i64, member: &str) {
        if let Ok(at) = self
            .sorted
            .binary_search_by(|(s, m)| (*s, m.as_ref()).cmp(&(score, member)))
        {
            self.sorted.remove(at);
        }
    }
}
