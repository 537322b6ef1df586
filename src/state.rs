use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::engine::{CoordinatorDeps, MatchCoordinator, PersistHandle, StoreOp};
use crate::gateway::MatchGateway;
use crate::geo::{LocationTracker, ReportedLocationProvider};
use crate::observability::metrics::Metrics;
use crate::storage::MatchStore;

#[derive(Debug, Clone)]
pub struct StateSettings {
    pub driver_id: Option<String>,
    pub location_fresh_window: Duration,
    pub location_timeout: Duration,
    pub event_buffer_size: usize,
}

impl Default for StateSettings {
    fn default() -> Self {
        Self {
            driver_id: None,
            location_fresh_window: Duration::from_secs(5),
            location_timeout: Duration::from_secs(9),
            event_buffer_size: 1024,
        }
    }
}

pub struct AppState {
    pub coordinator: Arc<MatchCoordinator>,
    pub reporter: Arc<ReportedLocationProvider>,
    pub metrics: Metrics,
}

impl AppState {
    /// Wires the coordinator. The returned receiver feeds
    /// [`run_persister`](crate::engine::run_persister).
    pub fn new(
        gateway: Arc<dyn MatchGateway>,
        store: Arc<dyn MatchStore>,
        settings: StateSettings,
    ) -> (Self, mpsc::UnboundedReceiver<StoreOp>) {
        let metrics = Metrics::new();
        let (persist, store_rx) = PersistHandle::channel();

        let reporter = Arc::new(ReportedLocationProvider::new(settings.event_buffer_size));
        let tracker = Arc::new(LocationTracker::new(
            reporter.clone(),
            settings.location_fresh_window,
            settings.location_timeout,
        ));

        let coordinator = Arc::new(MatchCoordinator::new(CoordinatorDeps {
            gateway,
            store,
            location: tracker,
            persist,
            metrics: metrics.clone(),
            driver_id: settings.driver_id,
            event_buffer_size: settings.event_buffer_size,
        }));

        (
            Self {
                coordinator,
                reporter,
                metrics,
            },
            store_rx,
        )
    }
}
