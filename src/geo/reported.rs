use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, watch};

use crate::geo::{DriverLocation, LocationError, LocationProvider};

/// Asks the host shell for a fix.
#[derive(Debug, Clone, Serialize)]
pub struct LocationRequest {
    pub requested_at: DateTime<Utc>,
}

/// Location provider fed by the host shell.
///
/// The shell owns the GPS. It pushes fixes through [`report`](Self::report)
/// and listens on [`requests`](Self::requests) for moments when a fresh fix
/// is wanted.
pub struct ReportedLocationProvider {
    latest: watch::Sender<Option<DriverLocation>>,
    requests: broadcast::Sender<LocationRequest>,
}

impl ReportedLocationProvider {
    pub fn new(buffer: usize) -> Self {
        let (latest, _) = watch::channel(None);
        let (requests, _) = broadcast::channel(buffer.max(1));
        Self { latest, requests }
    }

    pub fn report(&self, location: DriverLocation) {
        self.latest.send_replace(Some(location));
    }

    pub fn requests(&self) -> broadcast::Receiver<LocationRequest> {
        self.requests.subscribe()
    }
}

#[async_trait]
impl LocationProvider for ReportedLocationProvider {
    async fn current_location(&self) -> Result<DriverLocation, LocationError> {
        let mut rx = self.latest.subscribe();

        // nobody listening is fine; the caller's timeout bounds the wait
        let _ = self.requests.send(LocationRequest {
            requested_at: Utc::now(),
        });

        rx.changed()
            .await
            .map_err(|_| LocationError::Unavailable("location channel closed".to_string()))?;
        let latest = *rx.borrow_and_update();
        latest.ok_or_else(|| LocationError::Unavailable("no fix reported".to_string()))
    }
}
