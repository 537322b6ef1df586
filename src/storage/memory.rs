use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use crate::models::Match;
use crate::storage::{MatchStore, StoreError, StorePredicate};

/// Process-local store for development and tests.
///
/// Keeps rows in insertion order. `set_failing(true)` makes every write
/// return an error so callers can exercise their failure paths.
#[derive(Default)]
pub struct MemoryMatchStore {
    rows: Mutex<Vec<Match>>,
    failing: AtomicBool,
}

impl MemoryMatchStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(rows: Vec<Match>) -> Self {
        Self {
            rows: Mutex::new(rows),
            failing: AtomicBool::new(false),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.rows.lock().map(|rows| rows.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store set to fail".to_string()));
        }
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<Match>>, StoreError> {
        self.rows
            .lock()
            .map_err(|err| StoreError::Unavailable(format!("memory store poisoned: {err}")))
    }
}

#[async_trait]
impl MatchStore for MemoryMatchStore {
    async fn save(&self, m: &Match) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut rows = self.lock()?;

        match rows.iter_mut().find(|row| row.id == m.id) {
            Some(existing) => *existing = m.clone(),
            None => rows.push(m.clone()),
        }
        Ok(())
    }

    async fn select(&self, predicate: &StorePredicate) -> Result<Vec<Match>, StoreError> {
        let rows = self.lock()?;
        Ok(rows.iter().filter(|m| predicate.matches(m)).cloned().collect())
    }

    async fn delete_where(&self, predicate: &StorePredicate) -> Result<usize, StoreError> {
        self.check_writable()?;
        let mut rows = self.lock()?;

        let before = rows.len();
        rows.retain(|m| !predicate.matches(m));
        Ok(before - rows.len())
    }
}
