use std::collections::HashMap;
use std::sync::Arc;

use crate::engine::persister::{PersistHandle, StoreOp};
use crate::models::Match;

/// Ordered, id-keyed set of matches.
///
/// Treated as a value: owners clone it, mutate the clone and swap it in.
/// Cloning copies the index but shares the immutable `Match` entries.
///
/// A collection carrying a [`PersistHandle`] mirrors every mutation to the
/// embedded store; [`detached`](Self::detached) copies never do.
#[derive(Debug, Clone, Default)]
pub struct MatchesCollection {
    order: Vec<String>,
    entries: HashMap<String, Arc<Match>>,
    version: u64,
    persist: Option<PersistHandle>,
}

impl MatchesCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn persistent(handle: PersistHandle) -> Self {
        Self {
            persist: Some(handle),
            ..Self::default()
        }
    }

    /// Builds a detached collection.
    pub fn from_matches(matches: impl IntoIterator<Item = Match>) -> Self {
        let mut collection = Self::new();
        collection.add_set(matches);
        collection
    }

    pub fn detached(&self) -> Self {
        Self {
            persist: None,
            ..self.clone()
        }
    }

    pub fn is_persistent(&self) -> bool {
        self.persist.is_some()
    }

    /// Runs `f` with write-through suspended, e.g. to merge rows that were
    /// just read from the store.
    pub fn without_write_through<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        let handle = self.persist.take();
        let result = f(self);
        self.persist = handle;
        result
    }

    /// Bumped on every mutation, including ones that leave contents equal.
    pub fn version(&self) -> u64 {
        self.version
    }

    fn write(&self, op: StoreOp) {
        if let Some(handle) = &self.persist {
            handle.schedule(op);
        }
    }

    fn upsert(&mut self, m: Arc<Match>) {
        if self.entries.insert(m.id.clone(), m.clone()).is_none() {
            self.order.push(m.id.clone());
        }
        self.write(StoreOp::Save(m));
    }

    /// Upsert by id. Existing ids keep their position.
    pub fn add(&mut self, m: Match) -> Arc<Match> {
        let m = Arc::new(m);
        self.upsert(m.clone());
        self.version += 1;
        m
    }

    /// Bulk upsert; entries absent from `matches` are untouched.
    pub fn add_set(&mut self, matches: impl IntoIterator<Item = Match>) {
        for m in matches {
            self.upsert(Arc::new(m));
        }
        self.version += 1;
    }

    /// Makes the subset selected by `scope` equal to `matches`: entries in
    /// scope but absent from `matches` are removed, the rest is upserted.
    pub fn replace_set<F>(&mut self, matches: Vec<Match>, scope: F)
    where
        F: Fn(&Match) -> bool,
    {
        let keep: Vec<&str> = matches.iter().map(|m| m.id.as_str()).collect();
        let stale: Vec<String> = self
            .iter()
            .filter(|m| scope(m) && !keep.contains(&m.id.as_str()))
            .map(|m| m.id.clone())
            .collect();

        self.drop_ids(&stale);
        self.add_set(matches);
    }

    pub fn remove(&mut self, id: &str) -> Option<Arc<Match>> {
        let removed = self.entries.remove(id)?;
        self.order.retain(|existing| existing != id);
        self.write(StoreOp::Delete(vec![id.to_string()]));
        self.version += 1;
        Some(removed)
    }

    /// Removes every entry matching `predicate`; returns the removed ids.
    pub fn remove_where<F>(&mut self, predicate: F) -> Vec<String>
    where
        F: Fn(&Match) -> bool,
    {
        let ids: Vec<String> = self
            .iter()
            .filter(|m| predicate(m))
            .map(|m| m.id.clone())
            .collect();

        self.drop_ids(&ids);
        self.version += 1;
        ids
    }

    fn drop_ids(&mut self, ids: &[String]) {
        if ids.is_empty() {
            return;
        }
        for id in ids {
            self.entries.remove(id);
        }
        self.order.retain(|id| !ids.contains(id));
        self.write(StoreOp::Delete(ids.to_vec()));
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.entries.clear();
        self.write(StoreOp::Clear);
        self.version += 1;
    }

    pub fn find(&self, id: &str) -> Option<&Arc<Match>> {
        self.entries.get(id)
    }

    pub fn exists(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn first(&self) -> Option<&Arc<Match>> {
        self.order.first().and_then(|id| self.entries.get(id))
    }

    pub fn last(&self) -> Option<&Arc<Match>> {
        self.order.last().and_then(|id| self.entries.get(id))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Match>> + '_ {
        self.order.iter().filter_map(|id| self.entries.get(id))
    }

    pub fn ids(&self) -> Vec<String> {
        self.order.clone()
    }

    pub fn filter<F>(&self, predicate: F) -> Vec<Arc<Match>>
    where
        F: Fn(&Match) -> bool,
    {
        self.iter().filter(|m| predicate(m)).cloned().collect()
    }

    pub fn live(&self) -> Vec<Arc<Match>> {
        self.filter(Match::is_live)
    }

    pub fn complete(&self) -> Vec<Arc<Match>> {
        self.filter(Match::is_complete)
    }

    pub fn available(&self) -> Vec<Arc<Match>> {
        self.filter(Match::is_available)
    }

    pub fn en_route(&self) -> Vec<Arc<Match>> {
        self.filter(Match::is_en_route)
    }
}
