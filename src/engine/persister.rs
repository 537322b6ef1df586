use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::models::Match;
use crate::observability::metrics::Metrics;
use crate::storage::{MatchStore, StorePredicate};

/// A write scheduled by a collection in write-through mode.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreOp {
    Save(Arc<Match>),
    Delete(Vec<String>),
    Clear,
}

impl StoreOp {
    fn label(&self) -> &'static str {
        match self {
            Self::Save(_) => "save",
            Self::Delete(_) => "delete",
            Self::Clear => "clear",
        }
    }
}

/// Sending half of the persister queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct PersistHandle {
    tx: mpsc::UnboundedSender<StoreOp>,
}

impl PersistHandle {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<StoreOp>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn schedule(&self, op: StoreOp) {
        if let Err(err) = self.tx.send(op) {
            warn!(op = err.0.label(), "persister is gone; dropping store write");
        }
    }
}

/// Applies queued writes in order. Failures are logged and counted, never
/// retried; the in-memory working set stays authoritative.
pub async fn run_persister(
    store: Arc<dyn MatchStore>,
    mut rx: mpsc::UnboundedReceiver<StoreOp>,
    metrics: Metrics,
) {
    info!("persister started");

    while let Some(op) = rx.recv().await {
        let label = op.label();
        let result = match &op {
            StoreOp::Save(m) => store.save(m).await,
            StoreOp::Delete(ids) if ids.is_empty() => Ok(()),
            StoreOp::Delete(ids) => store
                .delete_where(&StorePredicate::IdIn(ids.clone()))
                .await
                .map(|deleted| debug!(deleted, "deleted matches from store")),
            StoreOp::Clear => store.delete_where(&StorePredicate::All).await.map(|_| ()),
        };

        if let Err(err) = result {
            metrics
                .store_write_failures_total
                .with_label_values(&[label])
                .inc();
            warn!(op = label, error = %err, "store write failed");
        }
    }

    info!("persister stopped: channel closed");
}
