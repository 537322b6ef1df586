//! Embedded store for the working set.
//!
//! The store exists so the replica survives a cold start. Nothing in the
//! running session reads from it after the initial load.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{Match, MatchState};

pub use memory::MemoryMatchStore;
pub use sqlite::SqliteMatchStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("migration {version} failed: {reason}")]
    Migration { version: u32, reason: String },

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Boolean row filter understood by every store.
#[derive(Debug, Clone, PartialEq)]
pub enum StorePredicate {
    All,
    IdIn(Vec<String>),
    StateIn(Vec<MatchState>),
}

impl StorePredicate {
    pub fn matches(&self, m: &Match) -> bool {
        match self {
            StorePredicate::All => true,
            StorePredicate::IdIn(ids) => ids.iter().any(|id| *id == m.id),
            StorePredicate::StateIn(states) => states.contains(&m.state),
        }
    }
}

#[async_trait]
pub trait MatchStore: Send + Sync {
    /// Insert or update by id.
    async fn save(&self, m: &Match) -> Result<(), StoreError>;

    async fn select(&self, predicate: &StorePredicate) -> Result<Vec<Match>, StoreError>;

    /// Returns the number of rows removed.
    async fn delete_where(&self, predicate: &StorePredicate) -> Result<usize, StoreError>;

    async fn exists(&self, id: &str) -> Result<bool, StoreError> {
        let found = self
            .select(&StorePredicate::IdIn(vec![id.to_string()]))
            .await?;
        Ok(!found.is_empty())
    }
}
