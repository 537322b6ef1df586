//! Driver location attached to status mutations.

pub mod reported;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

pub use reported::{LocationRequest, ReportedLocationProvider};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DriverLocation {
    pub lat: f64,
    pub lng: f64,
    pub captured_at: DateTime<Utc>,
}

impl DriverLocation {
    pub fn is_fresher_than(&self, window: Duration) -> bool {
        // a timestamp from the future counts as fresh
        (Utc::now() - self.captured_at)
            .to_std()
            .map(|age| age < window)
            .unwrap_or(true)
    }
}

#[derive(Debug, Error)]
pub enum LocationError {
    #[error("location fix timed out after {0:?}")]
    Timeout(Duration),

    #[error("location unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait LocationProvider: Send + Sync {
    async fn current_location(&self) -> Result<DriverLocation, LocationError>;
}

/// Where the location attached to a mutation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixSource {
    Fresh,
    Cached,
    Fallback,
    None,
}

impl FixSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fresh => "fresh",
            Self::Cached => "cached",
            Self::Fallback => "fallback",
            Self::None => "none",
        }
    }
}

/// Applies the reuse-or-refresh policy over a [`LocationProvider`].
///
/// A fix is reused while another one is in flight or while it is younger
/// than `fresh_window`. Otherwise one fresh fix is requested and raced
/// against `timeout`; on failure the last known location is used.
pub struct LocationTracker {
    provider: Arc<dyn LocationProvider>,
    last: Mutex<Option<DriverLocation>>,
    updating: AtomicBool,
    fresh_window: Duration,
    timeout: Duration,
}

struct UpdatingGuard<'a>(&'a AtomicBool);

impl Drop for UpdatingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl LocationTracker {
    pub fn new(provider: Arc<dyn LocationProvider>, fresh_window: Duration, timeout: Duration) -> Self {
        Self {
            provider,
            last: Mutex::new(None),
            updating: AtomicBool::new(false),
            fresh_window,
            timeout,
        }
    }

    pub fn last_known(&self) -> Option<DriverLocation> {
        self.last.lock().map(|last| *last).unwrap_or(None)
    }

    /// Keeps the newest fix by capture time.
    pub fn record(&self, location: DriverLocation) {
        if let Ok(mut last) = self.last.lock() {
            let newer = last.is_none_or(|current| current.captured_at <= location.captured_at);
            if newer {
                *last = Some(location);
            }
        }
    }

    pub fn is_updating(&self) -> bool {
        self.updating.load(Ordering::SeqCst)
    }

    pub async fn location_for_mutation(&self) -> (Option<DriverLocation>, FixSource) {
        let last = self.last_known();
        let reuse = |last: Option<DriverLocation>| match last {
            Some(_) => (last, FixSource::Cached),
            None => (None, FixSource::None),
        };

        if last.is_some_and(|loc| loc.is_fresher_than(self.fresh_window)) {
            return reuse(last);
        }
        if self
            .updating
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("location update already in flight; reusing last fix");
            return reuse(last);
        }
        let _guard = UpdatingGuard(&self.updating);

        let outcome = match tokio::time::timeout(self.timeout, self.provider.current_location()).await {
            Ok(result) => result,
            Err(_) => Err(LocationError::Timeout(self.timeout)),
        };

        match outcome {
            Ok(location) => {
                self.record(location);
                (Some(location), FixSource::Fresh)
            }
            Err(err) => {
                warn!(error = %err, has_fallback = last.is_some(), "location fix failed; using last known");
                match last {
                    Some(_) => (last, FixSource::Fallback),
                    None => (None, FixSource::None),
                }
            }
        }
    }
}
