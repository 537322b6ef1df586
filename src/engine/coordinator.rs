//! Owns the working set and serializes status mutations per match.
//!
//! Every change to a collection goes through clone, mutate, swap under a
//! short lock, so readers always see a whole snapshot. Mutations for one
//! match id are exclusive: the id is reserved in `updating` before any
//! network call and released when the mutation settles.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Instant;

use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::engine::collection::MatchesCollection;
use crate::engine::mutation::{MatchMutation, MutationTag, TransitionError};
use crate::engine::persister::PersistHandle;
use crate::gateway::{GatewayError, MatchGateway, MatchList, RequestError};
use crate::geo::LocationTracker;
use crate::models::{Match, NewBarcodeReading};
use crate::observability::metrics::Metrics;
use crate::storage::{MatchStore, StoreError, StorePredicate};

#[derive(Debug, Error)]
pub enum MutationError {
    #[error("match {0} already has a mutation in flight")]
    Busy(String),

    #[error("match {0} is not in the working set")]
    UnknownMatch(String),

    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),

    #[error("request failed: {}", .0.message)]
    Request(RequestError),
}

/// Change notifications for subscribers of the working set.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CollectionEvent {
    WorkingSetReplaced {
        version: u64,
        size: usize,
    },
    NewMatchesChanged {
        ids: Vec<String>,
    },
    MissedMatchesChanged {
        size: usize,
    },
    MutationSettled {
        match_id: String,
        action: MutationTag,
        success: bool,
        error: Option<RequestError>,
    },
}

/// Per-id status maps plus the newly visible set.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub updating: HashMap<String, MutationTag>,
    pub errors: HashMap<String, RequestError>,
    pub success: HashMap<String, bool>,
    pub fetch_errors: HashMap<String, RequestError>,
    pub fetching_matches: Vec<String>,
    pub fetching_lists: Vec<MatchList>,
    pub new_matches: Vec<String>,
    pub completed_exhausted: bool,
    pub working_set_version: u64,
}

pub struct CoordinatorDeps {
    pub gateway: Arc<dyn MatchGateway>,
    pub store: Arc<dyn MatchStore>,
    pub location: Arc<LocationTracker>,
    pub persist: PersistHandle,
    pub metrics: Metrics,
    pub driver_id: Option<String>,
    pub event_buffer_size: usize,
}

#[derive(Debug, Default)]
struct CompletedPages {
    cursor: Option<u32>,
    exhausted: bool,
}

/// Holds an id in `updating` until dropped.
struct Reservation<'a> {
    updating: &'a DashMap<String, MutationTag>,
    metrics: &'a Metrics,
    match_id: String,
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        self.updating.remove(&self.match_id);
        self.metrics.mutations_in_flight.dec();
    }
}

struct Flag<'a, K: std::hash::Hash + Eq> {
    set: &'a DashSet<K>,
    key: Option<K>,
}

impl<'a, K: std::hash::Hash + Eq + Clone> Flag<'a, K> {
    fn raise(set: &'a DashSet<K>, key: K) -> Self {
        set.insert(key.clone());
        Self { set, key: Some(key) }
    }
}

impl<K: std::hash::Hash + Eq> Drop for Flag<'_, K> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.set.remove(&key);
        }
    }
}

pub struct MatchCoordinator {
    working: RwLock<Arc<MatchesCollection>>,
    new_matches: RwLock<Arc<MatchesCollection>>,
    missed: RwLock<Arc<MatchesCollection>>,
    updating: DashMap<String, MutationTag>,
    errors: DashMap<String, RequestError>,
    success: DashMap<String, bool>,
    fetch_errors: DashMap<String, RequestError>,
    fetching_matches: DashSet<String>,
    fetching_lists: DashSet<MatchList>,
    completed: Mutex<CompletedPages>,
    gateway: Arc<dyn MatchGateway>,
    store: Arc<dyn MatchStore>,
    location: Arc<LocationTracker>,
    events: broadcast::Sender<CollectionEvent>,
    metrics: Metrics,
    driver_id: Option<String>,
    /// Bumped by `sign_out`; results fetched under an older session are
    /// discarded.
    session: AtomicU64,
}

fn read<T: Clone>(lock: &RwLock<T>) -> T {
    lock.read().unwrap_or_else(PoisonError::into_inner).clone()
}

impl MatchCoordinator {
    pub fn new(deps: CoordinatorDeps) -> Self {
        let (events, _) = broadcast::channel(deps.event_buffer_size.max(1));

        Self {
            working: RwLock::new(Arc::new(MatchesCollection::persistent(deps.persist))),
            new_matches: RwLock::new(Arc::new(MatchesCollection::new())),
            missed: RwLock::new(Arc::new(MatchesCollection::new())),
            updating: DashMap::new(),
            errors: DashMap::new(),
            success: DashMap::new(),
            fetch_errors: DashMap::new(),
            fetching_matches: DashSet::new(),
            fetching_lists: DashSet::new(),
            completed: Mutex::new(CompletedPages::default()),
            gateway: deps.gateway,
            store: deps.store,
            location: deps.location,
            events,
            metrics: deps.metrics,
            driver_id: deps.driver_id,
            session: AtomicU64::new(0),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CollectionEvent> {
        self.events.subscribe()
    }

    pub fn location(&self) -> &LocationTracker {
        &self.location
    }

    pub fn driver_id(&self) -> Option<&str> {
        self.driver_id.as_deref()
    }

    fn emit(&self, event: CollectionEvent) {
        // no subscribers is not an error
        let _ = self.events.send(event);
    }

    fn session(&self) -> u64 {
        self.session.load(Ordering::Acquire)
    }

    fn update_working<R>(&self, f: impl FnOnce(&mut MatchesCollection) -> R) -> R {
        let (result, version, size) = {
            let mut guard = self.working.write().unwrap_or_else(PoisonError::into_inner);
            let mut next = (**guard).clone();
            let result = f(&mut next);
            let (version, size) = (next.version(), next.len());
            *guard = Arc::new(next);
            (result, version, size)
        };

        self.published(version, size);
        result
    }

    /// Applies `f` only if no sign-out happened since `session` was read.
    /// The check runs under the working-set lock, so it cannot interleave
    /// with `sign_out`.
    fn update_session<R>(
        &self,
        session: u64,
        f: impl FnOnce(&mut MatchesCollection) -> R,
    ) -> Option<R> {
        let (result, version, size) = {
            let mut guard = self.working.write().unwrap_or_else(PoisonError::into_inner);
            if self.session() != session {
                return None;
            }
            let mut next = (**guard).clone();
            let result = f(&mut next);
            let (version, size) = (next.version(), next.len());
            *guard = Arc::new(next);
            (result, version, size)
        };

        self.published(version, size);
        Some(result)
    }

    fn published(&self, version: u64, size: usize) {
        self.metrics.working_set_size.set(size as i64);
        self.emit(CollectionEvent::WorkingSetReplaced { version, size });
    }

    fn set_new_matches(&self, next: MatchesCollection) {
        let ids = next.ids();
        *self.new_matches.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(next);
        self.emit(CollectionEvent::NewMatchesChanged { ids });
    }

    /// Available matches in `current` that `previous` did not know about.
    fn derive_new_matches(
        previous: &MatchesCollection,
        current: &MatchesCollection,
    ) -> MatchesCollection {
        let mut fresh = current.detached();
        fresh.remove_where(|m| !m.is_available() || previous.exists(&m.id));
        fresh
    }

    // ---- query surface ----

    pub fn working_set(&self) -> Arc<MatchesCollection> {
        read(&self.working)
    }

    pub fn new_matches(&self) -> Arc<MatchesCollection> {
        read(&self.new_matches)
    }

    pub fn missed_matches(&self) -> Arc<MatchesCollection> {
        read(&self.missed)
    }

    pub fn find(&self, match_id: &str) -> Option<Arc<Match>> {
        self.working_set().find(match_id).cloned()
    }

    pub fn exists(&self, match_id: &str) -> bool {
        self.working_set().exists(match_id)
    }

    pub fn live(&self) -> Vec<Arc<Match>> {
        self.working_set().live()
    }

    pub fn complete(&self) -> Vec<Arc<Match>> {
        self.working_set().complete()
    }

    pub fn available(&self) -> Vec<Arc<Match>> {
        self.working_set().available()
    }

    pub fn en_route(&self) -> Vec<Arc<Match>> {
        self.working_set().en_route()
    }

    // ---- status surface ----

    pub fn is_updating(&self, match_id: &str) -> Option<MutationTag> {
        self.updating.get(match_id).map(|entry| *entry.value())
    }

    pub fn error(&self, match_id: &str) -> Option<RequestError> {
        self.errors.get(match_id).map(|entry| entry.value().clone())
    }

    pub fn succeeded(&self, match_id: &str) -> bool {
        self.success.get(match_id).is_some_and(|entry| *entry.value())
    }

    pub fn status(&self) -> StatusSnapshot {
        fn collect<V: Clone>(map: &DashMap<String, V>) -> HashMap<String, V> {
            map.iter()
                .map(|entry| (entry.key().clone(), entry.value().clone()))
                .collect()
        }

        StatusSnapshot {
            updating: collect(&self.updating),
            errors: collect(&self.errors),
            success: collect(&self.success),
            fetch_errors: collect(&self.fetch_errors),
            fetching_matches: self.fetching_matches.iter().map(|id| id.key().clone()).collect(),
            fetching_lists: self.fetching_lists.iter().map(|list| *list.key()).collect(),
            new_matches: self.new_matches().ids(),
            completed_exhausted: self
                .completed
                .lock()
                .map(|pages| pages.exhausted)
                .unwrap_or(false),
            working_set_version: self.working_set().version(),
        }
    }

    // ---- list sync ----

    /// Cold start: merges stored rows into the working set without writing
    /// them back.
    pub async fn load_saved(&self) -> Result<usize, StoreError> {
        let session = self.session();
        let rows = self.store.select(&StorePredicate::All).await?;
        let loaded = rows.len();

        self.update_session(session, |c| {
            c.without_write_through(|c| {
                let missing: Vec<Match> = rows.into_iter().filter(|m| !c.exists(&m.id)).collect();
                c.add_set(missing);
            })
        });

        info!(loaded, "loaded saved matches");
        Ok(loaded)
    }

    pub async fn refresh_live(&self) -> Result<usize, GatewayError> {
        let _flag = Flag::raise(&self.fetching_lists, MatchList::Live);
        let session = self.session();
        let page = self
            .gateway
            .fetch_page(MatchList::Live, None)
            .await
            .inspect_err(|err| warn!(list = "live", error = %err, "list refresh failed"))?;

        let count = page.len();
        self.update_session(session, |c| c.replace_set(page, Match::is_live));
        Ok(count)
    }

    /// Replaces the assignable pool and recomputes the newly visible set.
    /// On failure the stale pool is dropped and the newly visible set
    /// cleared.
    pub async fn refresh_available(&self) -> Result<Vec<String>, GatewayError> {
        let _flag = Flag::raise(&self.fetching_lists, MatchList::Available);
        let session = self.session();

        match self.gateway.fetch_page(MatchList::Available, None).await {
            Ok(page) => {
                let Some((previous, current)) = self.update_session(session, |c| {
                    let previous = c.detached();
                    c.remove_where(Match::is_available);
                    c.add_set(page);
                    (previous, c.detached())
                }) else {
                    return Ok(Vec::new());
                };

                let fresh = Self::derive_new_matches(&previous, &current);
                let ids = fresh.ids();
                debug!(new = ids.len(), available = current.available().len(), "assignable pool refreshed");
                self.set_new_matches(fresh);
                Ok(ids)
            }
            Err(err) => {
                warn!(list = "available", error = %err, "list refresh failed");
                self.update_working(|c| {
                    c.remove_where(Match::is_available);
                });
                self.set_new_matches(MatchesCollection::new());
                Err(err)
            }
        }
    }

    /// Pages through completed history. `from_start` replaces the complete
    /// subset with page 0; otherwise the next page is appended. An empty
    /// page marks history exhausted.
    pub async fn refresh_completed(&self, from_start: bool) -> Result<usize, GatewayError> {
        let cursor = {
            let pages = self.completed.lock().unwrap_or_else(PoisonError::into_inner);
            if from_start {
                0
            } else if pages.exhausted {
                return Ok(0);
            } else {
                pages.cursor.map_or(0, |c| c + 1)
            }
        };

        let _flag = Flag::raise(&self.fetching_lists, MatchList::Completed);
        let session = self.session();
        let page = self
            .gateway
            .fetch_page(MatchList::Completed, Some(cursor))
            .await
            .inspect_err(|err| warn!(list = "completed", cursor, error = %err, "list refresh failed"))?;

        let count = page.len();
        let applied = if cursor == 0 {
            self.update_session(session, |c| c.replace_set(page, Match::is_complete))
        } else {
            self.update_session(session, |c| c.add_set(page))
        };
        if applied.is_none() {
            return Ok(0);
        }

        let mut pages = self.completed.lock().unwrap_or_else(PoisonError::into_inner);
        pages.cursor = Some(cursor);
        pages.exhausted = count == 0;
        Ok(count)
    }

    /// Recently taken matches live in their own detached collection.
    pub async fn refresh_missed(&self) -> Result<usize, GatewayError> {
        let _flag = Flag::raise(&self.fetching_lists, MatchList::Missed);
        let session = self.session();
        let page = self
            .gateway
            .fetch_page(MatchList::Missed, None)
            .await
            .inspect_err(|err| warn!(list = "missed", error = %err, "list refresh failed"))?;
        if self.session() != session {
            return Ok(0);
        }

        let size = page.len();
        *self.missed.write().unwrap_or_else(PoisonError::into_inner) =
            Arc::new(MatchesCollection::from_matches(page));
        self.emit(CollectionEvent::MissedMatchesChanged { size });
        Ok(size)
    }

    pub async fn refresh(&self, list: MatchList) -> Result<usize, GatewayError> {
        match list {
            MatchList::Live => self.refresh_live().await,
            MatchList::Available => self.refresh_available().await.map(|ids| ids.len()),
            MatchList::Completed => self.refresh_completed(true).await,
            MatchList::Missed => self.refresh_missed().await,
        }
    }

    /// Refetches one match. Returns `Ok(None)` when the match belongs to
    /// another driver; it is dropped from the working set, as it is on
    /// 403/404.
    pub async fn fetch_match(&self, match_id: &str) -> Result<Option<Arc<Match>>, RequestError> {
        let _flag = Flag::raise(&self.fetching_matches, match_id.to_string());
        self.fetch_errors.remove(match_id);
        let session = self.session();

        match self.gateway.fetch_match(match_id).await {
            Ok(m) if !m.is_authorized(self.driver_id()) => {
                info!(match_id, owner = ?m.driver_id, "match taken by another driver; removing");
                self.update_working(|c| c.remove(match_id));
                Ok(None)
            }
            Ok(m) => {
                let Some((previous, current, stored)) = self.update_session(session, |c| {
                    let previous = c.detached();
                    let stored = c.add(m);
                    (previous, c.detached(), stored)
                }) else {
                    debug!(match_id, "signed out during fetch; dropping result");
                    return Ok(None);
                };
                self.set_new_matches(Self::derive_new_matches(&previous, &current));
                Ok(Some(stored))
            }
            Err(err) => {
                if err.is_inaccessible() {
                    info!(match_id, error = %err, "match no longer accessible; removing");
                    self.update_working(|c| c.remove(match_id));
                } else {
                    warn!(match_id, error = %err, "failed to fetch match");
                }
                let payload = err.to_request_error();
                self.fetch_errors.insert(match_id.to_string(), payload.clone());
                Err(payload)
            }
        }
    }

    pub fn matches_viewed(&self) {
        if !self.new_matches().is_empty() {
            self.set_new_matches(MatchesCollection::new());
        }
    }

    /// Forgets everything, including the persisted replica. Mutations and
    /// fetches still in flight settle without touching the working set.
    pub fn sign_out(&self) {
        self.update_working(|c| {
            self.session.fetch_add(1, Ordering::AcqRel);
            c.clear();
        });
        self.set_new_matches(MatchesCollection::new());
        *self.missed.write().unwrap_or_else(PoisonError::into_inner) =
            Arc::new(MatchesCollection::new());
        self.errors.clear();
        self.success.clear();
        self.fetch_errors.clear();
        *self.completed.lock().unwrap_or_else(PoisonError::into_inner) = CompletedPages::default();
        info!("signed out; working set cleared");
    }

    // ---- mutation surface ----

    fn reserve(&self, match_id: &str, tag: MutationTag) -> Result<Reservation<'_>, MutationError> {
        match self.updating.entry(match_id.to_string()) {
            Entry::Occupied(_) => Err(MutationError::Busy(match_id.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(tag);
                self.metrics.mutations_in_flight.inc();
                Ok(Reservation {
                    updating: &self.updating,
                    metrics: &self.metrics,
                    match_id: match_id.to_string(),
                })
            }
        }
    }

    fn record_outcome(&self, tag: MutationTag, outcome: &str) {
        self.metrics
            .mutations_total
            .with_label_values(&[tag.as_str(), outcome])
            .inc();
    }

    /// Runs one mutation through guard, reservation, request and settle.
    ///
    /// Busy ids, unknown ids and impossible transitions are rejected before
    /// any network call and leave the status maps alone. A failed request
    /// leaves the working set untouched.
    pub async fn apply(&self, match_id: &str, mutation: MatchMutation) -> Result<(), MutationError> {
        let tag = mutation.tag();

        if self.updating.contains_key(match_id) {
            self.record_outcome(tag, "busy");
            return Err(MutationError::Busy(match_id.to_string()));
        }
        let current = self
            .find(match_id)
            .ok_or_else(|| MutationError::UnknownMatch(match_id.to_string()))?;
        if let Err(err) = mutation.check(&current) {
            self.record_outcome(tag, "invalid");
            return Err(err.into());
        }

        let reservation = self.reserve(match_id, tag).inspect_err(|_| {
            self.record_outcome(tag, "busy");
        })?;
        self.errors.remove(match_id);
        self.success.remove(match_id);
        let session = self.session();

        let started = Instant::now();
        let result = self.perform(match_id, &mutation, session).await;
        self.metrics
            .mutation_latency_seconds
            .with_label_values(&[tag.as_str()])
            .observe(started.elapsed().as_secs_f64());

        match result {
            Ok(confirmed) => {
                let settled = match confirmed {
                    Some(m) => self.update_session(session, |c| {
                        c.add(m);
                    }),
                    None => self.update_session(session, |c| {
                        c.remove(match_id);
                    }),
                };
                drop(reservation);
                self.record_outcome(tag, "success");
                if settled.is_none() {
                    info!(match_id, action = %tag, "signed out during mutation; dropping result");
                    return Ok(());
                }
                self.success.insert(match_id.to_string(), true);
                info!(match_id, action = %tag, "match mutation succeeded");
                self.emit(CollectionEvent::MutationSettled {
                    match_id: match_id.to_string(),
                    action: tag,
                    success: true,
                    error: None,
                });
                Ok(())
            }
            Err(err) => {
                drop(reservation);
                let payload = err.to_request_error();
                if self.session() == session {
                    self.errors.insert(match_id.to_string(), payload.clone());
                }
                self.record_outcome(tag, "failure");
                warn!(match_id, action = %tag, error = %err, "match mutation failed");
                self.emit(CollectionEvent::MutationSettled {
                    match_id: match_id.to_string(),
                    action: tag,
                    success: false,
                    error: Some(payload.clone()),
                });
                Err(MutationError::Request(payload))
            }
        }
    }

    /// Earlier readings already reached the server; pull the match so the
    /// working set reflects them. Best effort.
    async fn resync_after_partial_submit(&self, match_id: &str, session: u64, posted: usize) {
        warn!(match_id, posted, "barcode submission stopped part way; refetching match");
        match self.gateway.fetch_match(match_id).await {
            Ok(m) => {
                self.update_session(session, |c| {
                    c.add(m);
                });
            }
            Err(err) => warn!(match_id, error = %err, "refetch after partial barcode submission failed"),
        }
    }

    /// `Ok(None)` means the match leaves the working set.
    async fn perform(
        &self,
        match_id: &str,
        mutation: &MatchMutation,
        session: u64,
    ) -> Result<Option<Match>, GatewayError> {
        if let MatchMutation::SubmitBarcodes { readings } = mutation {
            for (posted, reading) in readings.iter().enumerate() {
                if let Err(err) = self.gateway.submit_barcode_reading(match_id, reading).await {
                    if posted > 0 {
                        self.resync_after_partial_submit(match_id, session, posted).await;
                    }
                    return Err(err);
                }
            }
            return self.gateway.fetch_match(match_id).await.map(Some);
        }

        let (location, source) = self.location.location_for_mutation().await;
        self.metrics
            .location_fixes_total
            .with_label_values(&[source.as_str()])
            .inc();

        let request = mutation
            .request(match_id, location, self.driver_id())
            .ok_or_else(|| GatewayError::Decode(format!("no request for {}", mutation.tag())))?;
        let response = self.gateway.send_action(match_id, &request).await?;

        if mutation.removes_match() {
            return Ok(None);
        }
        Match::from_wire(response)
            .map(Some)
            .map_err(|err| GatewayError::Decode(err.to_string()))
    }

    pub async fn accept(&self, match_id: &str) -> Result<(), MutationError> {
        self.apply(match_id, MatchMutation::Accept).await
    }

    pub async fn reject(&self, match_id: &str) -> Result<(), MutationError> {
        self.apply(match_id, MatchMutation::Reject).await
    }

    pub async fn toggle_en_route(&self, match_id: &str) -> Result<(), MutationError> {
        self.apply(match_id, MatchMutation::ToggleEnRoute).await
    }

    pub async fn toggle_stop_en_route(&self, match_id: &str, stop_id: &str) -> Result<(), MutationError> {
        let stop_id = stop_id.to_string();
        self.apply(match_id, MatchMutation::ToggleStopEnRoute { stop_id }).await
    }

    pub async fn arrive_at_pickup(&self, match_id: &str) -> Result<(), MutationError> {
        self.apply(match_id, MatchMutation::ArriveAtPickup).await
    }

    pub async fn pickup(
        &self,
        match_id: &str,
        origin_photo: Option<String>,
        bill_of_lading_photo: Option<String>,
    ) -> Result<(), MutationError> {
        let mutation = MatchMutation::Pickup {
            origin_photo,
            bill_of_lading_photo,
        };
        self.apply(match_id, mutation).await
    }

    pub async fn arrive_at_dropoff(&self, match_id: &str, stop_id: &str) -> Result<(), MutationError> {
        let stop_id = stop_id.to_string();
        self.apply(match_id, MatchMutation::ArriveAtDropoff { stop_id }).await
    }

    pub async fn sign(
        &self,
        match_id: &str,
        stop_id: &str,
        printed_name: &str,
        signature: &str,
    ) -> Result<(), MutationError> {
        let mutation = MatchMutation::Sign {
            stop_id: stop_id.to_string(),
            printed_name: printed_name.to_string(),
            signature: signature.to_string(),
        };
        self.apply(match_id, mutation).await
    }

    pub async fn deliver(
        &self,
        match_id: &str,
        stop_id: &str,
        destination_photo: Option<String>,
    ) -> Result<(), MutationError> {
        let mutation = MatchMutation::Deliver {
            stop_id: stop_id.to_string(),
            destination_photo,
        };
        self.apply(match_id, mutation).await
    }

    pub async fn mark_undeliverable(
        &self,
        match_id: &str,
        stop_id: &str,
        reason: &str,
    ) -> Result<(), MutationError> {
        let mutation = MatchMutation::MarkUndeliverable {
            stop_id: stop_id.to_string(),
            reason: reason.to_string(),
        };
        self.apply(match_id, mutation).await
    }

    pub async fn cancel(&self, match_id: &str, reason: &str) -> Result<(), MutationError> {
        let reason = reason.to_string();
        self.apply(match_id, MatchMutation::Cancel { reason }).await
    }

    pub async fn unable_to_pickup(&self, match_id: &str, reason: &str) -> Result<(), MutationError> {
        let reason = reason.to_string();
        self.apply(match_id, MatchMutation::UnableToPickup { reason }).await
    }

    pub async fn arrive_at_return(&self, match_id: &str) -> Result<(), MutationError> {
        self.apply(match_id, MatchMutation::ArriveAtReturn).await
    }

    pub async fn mark_returned(&self, match_id: &str) -> Result<(), MutationError> {
        self.apply(match_id, MatchMutation::Returned).await
    }

    /// Posts each reading in order, then refetches the match. A failure
    /// stops the batch; readings posted before it stay on the server and
    /// the match is refetched so the working set shows them.
    pub async fn submit_barcodes(
        &self,
        match_id: &str,
        readings: Vec<NewBarcodeReading>,
    ) -> Result<(), MutationError> {
        self.apply(match_id, MatchMutation::SubmitBarcodes { readings }).await
    }
}
