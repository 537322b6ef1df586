use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use tokio::sync::Notify;
use tower::ServiceExt;

use driver_matches::api::rest::router;
use driver_matches::engine::{CollectionEvent, MutationError, run_persister};
use driver_matches::gateway::{
    ActionMethod, ActionRequest, GatewayError, MatchGateway, MatchList, RequestErrorKind,
};
use driver_matches::models::{
    BarcodeReadingType, Match, MatchState, MatchStopState, NewBarcodeReading,
};
use driver_matches::state::{AppState, StateSettings};
use driver_matches::storage::{MatchStore, MemoryMatchStore, StorePredicate};

/// Gateway fake: scripted responses, recorded calls, optional hold.
#[derive(Default)]
struct ScriptedGateway {
    pages: Mutex<HashMap<MatchList, Result<Vec<Value>, u16>>>,
    completed_pages: Mutex<Vec<Vec<Value>>>,
    matches: Mutex<HashMap<String, Result<Value, u16>>>,
    responses: Mutex<VecDeque<Result<Value, u16>>>,
    actions: Mutex<Vec<(String, ActionRequest)>>,
    barcodes: Mutex<Vec<NewBarcodeReading>>,
    barcode_limit: Mutex<Option<usize>>,
    action_calls: AtomicUsize,
    gate: Mutex<Option<Arc<Notify>>>,
}

impl ScriptedGateway {
    fn page(&self, list: MatchList, items: Vec<Value>) {
        self.pages.lock().unwrap().insert(list, Ok(items));
    }

    fn page_fails(&self, list: MatchList, status: u16) {
        self.pages.lock().unwrap().insert(list, Err(status));
    }

    fn respond(&self, response: Result<Value, u16>) {
        self.responses.lock().unwrap().push_back(response);
    }

    fn serve_match(&self, id: &str, response: Result<Value, u16>) {
        self.matches.lock().unwrap().insert(id.to_string(), response);
    }

    fn hold(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    /// Accepts `limit` barcode readings, then fails every later one.
    fn fail_barcodes_after(&self, limit: usize) {
        *self.barcode_limit.lock().unwrap() = Some(limit);
    }

    async fn wait_at_gate(&self) {
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
    }

    fn calls(&self) -> usize {
        self.action_calls.load(Ordering::SeqCst)
    }
}

fn to_match(value: Value) -> Result<Match, GatewayError> {
    Match::from_wire(value).map_err(|err| GatewayError::Decode(err.to_string()))
}

#[async_trait]
impl MatchGateway for ScriptedGateway {
    async fn fetch_match(&self, match_id: &str) -> Result<Match, GatewayError> {
        self.wait_at_gate().await;
        let scripted = self.matches.lock().unwrap().get(match_id).cloned();
        match scripted {
            Some(Ok(value)) => to_match(value),
            Some(Err(status)) => Err(GatewayError::from_status(status, "scripted")),
            None => Err(GatewayError::from_status(404, "no such match")),
        }
    }

    async fn fetch_page(
        &self,
        list: MatchList,
        cursor: Option<u32>,
    ) -> Result<Vec<Match>, GatewayError> {
        let items = if list == MatchList::Completed {
            let pages = self.completed_pages.lock().unwrap();
            Ok(pages
                .get(cursor.unwrap_or(0) as usize)
                .cloned()
                .unwrap_or_default())
        } else {
            self.pages
                .lock()
                .unwrap()
                .get(&list)
                .cloned()
                .unwrap_or(Ok(Vec::new()))
        };

        match items {
            Ok(items) => items.into_iter().map(to_match).collect(),
            Err(status) => Err(GatewayError::from_status(status, "scripted")),
        }
    }

    async fn send_action(
        &self,
        match_id: &str,
        request: &ActionRequest,
    ) -> Result<Value, GatewayError> {
        self.action_calls.fetch_add(1, Ordering::SeqCst);
        self.actions
            .lock()
            .unwrap()
            .push((match_id.to_string(), request.clone()));

        self.wait_at_gate().await;

        match self.responses.lock().unwrap().pop_front() {
            Some(Ok(value)) => Ok(value),
            Some(Err(status)) => Err(GatewayError::from_status(status, "scripted failure")),
            None => Err(GatewayError::from_status(500, "unscripted")),
        }
    }

    async fn submit_barcode_reading(
        &self,
        _match_id: &str,
        reading: &NewBarcodeReading,
    ) -> Result<(), GatewayError> {
        let limit = *self.barcode_limit.lock().unwrap();
        let mut posted = self.barcodes.lock().unwrap();
        if limit.is_some_and(|limit| posted.len() >= limit) {
            return Err(GatewayError::from_status(500, "scanner service down"));
        }
        posted.push(reading.clone());
        Ok(())
    }
}

struct Harness {
    state: Arc<AppState>,
    gateway: Arc<ScriptedGateway>,
    store: Arc<MemoryMatchStore>,
}

fn harness_with(store: MemoryMatchStore) -> Harness {
    let gateway = Arc::new(ScriptedGateway::default());
    let store = Arc::new(store);
    let (state, store_rx) = AppState::new(
        gateway.clone(),
        store.clone(),
        StateSettings {
            driver_id: Some("d1".into()),
            location_timeout: Duration::from_millis(20),
            ..StateSettings::default()
        },
    );
    let state = Arc::new(state);
    tokio::spawn(run_persister(store.clone(), store_rx, state.metrics.clone()));

    Harness {
        state,
        gateway,
        store,
    }
}

fn harness() -> Harness {
    harness_with(MemoryMatchStore::new())
}

fn wire(id: &str, state: &str) -> Value {
    json!({
        "id": id,
        "state": state,
        "stops": [{"id": format!("{id}-s1"), "index": 0, "state": "pending", "items": []}]
    })
}

async fn stored_ids(store: &MemoryMatchStore) -> Vec<String> {
    let mut ids: Vec<String> = store
        .select(&StorePredicate::All)
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.id)
        .collect();
    ids.sort();
    ids
}

/// Waits for the persister to drain.
async fn eventually_stored(store: &MemoryMatchStore, expected: &[&str]) {
    for _ in 0..100 {
        if stored_ids(store).await == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(stored_ids(store).await, expected);
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

// ---- coordinator ----

#[tokio::test]
async fn accepting_an_available_match_moves_it_to_live() {
    let h = harness();
    let coordinator = &h.state.coordinator;
    h.gateway.page(MatchList::Available, vec![wire("m1", "assigning_driver")]);
    coordinator.refresh_available().await.unwrap();
    assert_eq!(coordinator.available().len(), 1);

    h.gateway.respond(Ok(wire("m1", "accepted")));
    coordinator.accept("m1").await.unwrap();

    let m1 = coordinator.find("m1").unwrap();
    assert_eq!(m1.state, MatchState::Accepted);
    assert!(coordinator.available().is_empty());
    assert_eq!(coordinator.live().len(), 1);
    assert!(coordinator.succeeded("m1"));
    assert!(coordinator.is_updating("m1").is_none());

    let actions = h.gateway.actions.lock().unwrap().clone();
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0].1.method, ActionMethod::Patch);
    assert_eq!(actions[0].1.body["state"], "accepted");

    eventually_stored(&h.store, &["m1"]).await;
    let mut stored_state = None;
    for _ in 0..100 {
        let stored = h.store.select(&StorePredicate::IdIn(vec!["m1".into()])).await.unwrap();
        stored_state = stored.first().map(|m| m.state);
        if stored_state == Some(MatchState::Accepted) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(stored_state, Some(MatchState::Accepted));
}

#[tokio::test]
async fn second_mutation_while_updating_makes_no_network_call() {
    let h = harness();
    let coordinator = h.state.coordinator.clone();
    h.gateway.page(MatchList::Live, vec![wire("m1", "en_route_to_pickup")]);
    coordinator.refresh_live().await.unwrap();

    let gate = h.gateway.hold();
    h.gateway.respond(Ok(wire("m1", "arrived_at_pickup")));

    let first = tokio::spawn({
        let coordinator = coordinator.clone();
        async move { coordinator.arrive_at_pickup("m1").await }
    });

    for _ in 0..100 {
        if h.gateway.calls() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(coordinator.is_updating("m1").is_some());

    let second = coordinator.arrive_at_pickup("m1").await;
    assert!(matches!(second, Err(MutationError::Busy(id)) if id == "m1"));
    assert_eq!(h.gateway.calls(), 1);

    gate.notify_one();
    first.await.unwrap().unwrap();
    assert_eq!(h.gateway.calls(), 1);
    assert!(coordinator.is_updating("m1").is_none());
    assert_eq!(coordinator.find("m1").unwrap().state, MatchState::ArrivedAtPickup);
}

#[tokio::test]
async fn failed_mutation_records_error_and_changes_nothing() {
    let h = harness();
    let coordinator = &h.state.coordinator;
    h.gateway.page(MatchList::Live, vec![wire("m1", "accepted")]);
    coordinator.refresh_live().await.unwrap();
    let before = coordinator.working_set();

    h.gateway.respond(Err(500));
    let result = coordinator.toggle_en_route("m1").await;

    let Err(MutationError::Request(payload)) = result else {
        panic!("expected a request failure, got {result:?}");
    };
    assert_eq!(payload.kind, RequestErrorKind::Transient);
    assert_eq!(coordinator.error("m1"), Some(payload));
    assert!(!coordinator.succeeded("m1"));
    assert!(coordinator.is_updating("m1").is_none());

    let after = coordinator.working_set();
    assert_eq!(after.ids(), before.ids());
    assert_eq!(after.find("m1"), before.find("m1"));
}

#[tokio::test]
async fn forbidden_mutation_keeps_the_match() {
    let h = harness();
    let coordinator = &h.state.coordinator;
    h.gateway.page(MatchList::Live, vec![wire("m1", "accepted")]);
    coordinator.refresh_live().await.unwrap();

    h.gateway.respond(Err(403));
    let result = coordinator.cancel("m1", "flat tire").await;

    assert!(matches!(result, Err(MutationError::Request(ref p)) if p.kind == RequestErrorKind::Inaccessible));
    assert!(coordinator.exists("m1"));
}

#[tokio::test]
async fn impossible_transition_is_rejected_locally() {
    let h = harness();
    let coordinator = &h.state.coordinator;
    h.gateway.page(
        MatchList::Live,
        vec![json!({
            "id": "m1",
            "state": "picked_up",
            "stops": [{"id": "s1", "state": "delivered"}]
        })],
    );
    coordinator.refresh_live().await.unwrap();

    let result = coordinator.mark_undeliverable("m1", "s1", "closed").await;
    assert!(matches!(result, Err(MutationError::InvalidTransition(_))));
    assert_eq!(h.gateway.calls(), 0);

    let status = coordinator.status();
    assert!(status.errors.is_empty());
    assert!(status.success.is_empty());
    assert!(status.updating.is_empty());

    let unknown = coordinator.accept("nope").await;
    assert!(matches!(unknown, Err(MutationError::UnknownMatch(_))));
}

#[tokio::test]
async fn stop_workflow_runs_through_delivery() {
    let h = harness();
    let coordinator = &h.state.coordinator;
    let with_stop = |state: &str| {
        json!({
            "id": "m1",
            "state": "picked_up",
            "stops": [{"id": "s1", "state": state, "items": [{"id": "i1", "barcode_delivery_required": true}]}]
        })
    };
    h.gateway.page(MatchList::Live, vec![with_stop("pending")]);
    coordinator.refresh_live().await.unwrap();

    h.gateway.respond(Ok(with_stop("en_route")));
    coordinator.toggle_stop_en_route("m1", "s1").await.unwrap();

    h.gateway.respond(Ok(with_stop("arrived")));
    coordinator.arrive_at_dropoff("m1", "s1").await.unwrap();

    h.gateway.serve_match("m1", Ok(with_stop("arrived")));
    let reading = NewBarcodeReading::missing(BarcodeReadingType::Delivery, "i1", "s1").captured("0042");
    coordinator.submit_barcodes("m1", vec![reading.clone()]).await.unwrap();
    assert_eq!(*h.gateway.barcodes.lock().unwrap(), vec![reading]);

    h.gateway.respond(Ok(with_stop("signed")));
    coordinator
        .sign("m1", "s1", "Jo Doe", "c2ln\nbmF0dXJl")
        .await
        .unwrap();

    h.gateway.respond(Ok(with_stop("delivered")));
    coordinator.deliver("m1", "s1", None).await.unwrap();

    let m1 = coordinator.find("m1").unwrap();
    assert_eq!(m1.stops[0].state, MatchStopState::Delivered);

    let actions = h.gateway.actions.lock().unwrap().clone();
    let paths: Vec<&str> = actions.iter().map(|(_, r)| r.path.as_str()).collect();
    assert_eq!(
        paths,
        ["stops/s1/toggle_en_route", "stops/s1", "stops/s1", "stops/s1"]
    );
    assert_eq!(actions[2].1.body["image"]["contents"], "c2lnbmF0dXJl");
    assert_eq!(actions[3].1.body["user"], "d1");

    let again = coordinator.deliver("m1", "s1", None).await;
    assert!(matches!(again, Err(MutationError::InvalidTransition(_))));
}

#[tokio::test]
async fn cancel_removes_the_match_everywhere() {
    let h = harness();
    let coordinator = &h.state.coordinator;
    h.gateway.page(
        MatchList::Live,
        vec![wire("m1", "accepted"), wire("m2", "en_route_to_pickup")],
    );
    coordinator.refresh_live().await.unwrap();
    eventually_stored(&h.store, &["m1", "m2"]).await;

    h.gateway.respond(Ok(json!({"reason": "Match canceled"})));
    coordinator.cancel("m1", "vehicle trouble").await.unwrap();

    assert!(!coordinator.exists("m1"));
    assert!(coordinator.succeeded("m1"));
    eventually_stored(&h.store, &["m2"]).await;
}

#[tokio::test]
async fn newly_visible_is_the_difference_of_available_pools() {
    let h = harness();
    let coordinator = &h.state.coordinator;
    let mut events = coordinator.subscribe();

    h.gateway.page(
        MatchList::Available,
        vec![wire("A", "assigning_driver"), wire("B", "assigning_driver")],
    );
    coordinator.refresh_available().await.unwrap();
    coordinator.matches_viewed();
    assert!(coordinator.new_matches().is_empty());

    h.gateway.page(
        MatchList::Available,
        vec![wire("A", "assigning_driver"), wire("C", "assigning_driver")],
    );
    let fresh = coordinator.refresh_available().await.unwrap();

    assert_eq!(fresh, ["C"]);
    assert_eq!(coordinator.new_matches().ids(), ["C"]);
    let mut available: Vec<String> = coordinator.available().iter().map(|m| m.id.clone()).collect();
    available.sort();
    assert_eq!(available, ["A", "C"]);

    coordinator.matches_viewed();
    assert!(coordinator.new_matches().is_empty());

    let mut saw_new = false;
    while let Ok(event) = events.try_recv() {
        if let CollectionEvent::NewMatchesChanged { ids } = event {
            saw_new |= ids == ["C"];
        }
    }
    assert!(saw_new);
}

#[tokio::test]
async fn failed_available_refresh_drops_the_stale_pool() {
    let h = harness();
    let coordinator = &h.state.coordinator;
    h.gateway.page(MatchList::Live, vec![wire("live", "accepted")]);
    h.gateway.page(MatchList::Available, vec![wire("A", "assigning_driver")]);
    coordinator.refresh_live().await.unwrap();
    coordinator.refresh_available().await.unwrap();
    assert_eq!(coordinator.new_matches().len(), 1);

    h.gateway.page_fails(MatchList::Available, 503);
    assert!(coordinator.refresh_available().await.is_err());

    assert!(coordinator.available().is_empty());
    assert!(coordinator.new_matches().is_empty());
    assert!(coordinator.exists("live"));
}

#[tokio::test]
async fn fetch_drops_inaccessible_and_foreign_matches() {
    let h = harness();
    let coordinator = &h.state.coordinator;
    h.gateway.page(
        MatchList::Live,
        vec![wire("gone", "accepted"), wire("taken", "accepted"), wire("mine", "accepted")],
    );
    coordinator.refresh_live().await.unwrap();

    h.gateway.serve_match("gone", Err(404));
    let err = coordinator.fetch_match("gone").await.unwrap_err();
    assert_eq!(err.kind, RequestErrorKind::Inaccessible);
    assert!(!coordinator.exists("gone"));

    h.gateway.serve_match(
        "taken",
        Ok(json!({"id": "taken", "state": "accepted", "driver_id": "d2"})),
    );
    assert!(coordinator.fetch_match("taken").await.unwrap().is_none());
    assert!(!coordinator.exists("taken"));

    h.gateway.serve_match(
        "mine",
        Ok(json!({"id": "mine", "state": "en_route_to_pickup", "driver_id": "d1"})),
    );
    let refreshed = coordinator.fetch_match("mine").await.unwrap().unwrap();
    assert_eq!(refreshed.state, MatchState::EnRouteToPickup);

    h.gateway.serve_match("mine", Err(502));
    assert!(coordinator.fetch_match("mine").await.is_err());
    assert!(coordinator.exists("mine"));
    assert_eq!(coordinator.status().fetch_errors.len(), 2);
}

#[tokio::test]
async fn completed_history_pages_until_empty() {
    let h = harness();
    let coordinator = &h.state.coordinator;
    *h.gateway.completed_pages.lock().unwrap() = vec![
        vec![wire("c1", "completed"), wire("c2", "charged")],
        vec![wire("c3", "completed")],
    ];

    assert_eq!(coordinator.refresh_completed(true).await.unwrap(), 2);
    assert_eq!(coordinator.refresh_completed(false).await.unwrap(), 1);
    assert_eq!(coordinator.complete().len(), 3);
    assert!(!coordinator.status().completed_exhausted);

    assert_eq!(coordinator.refresh_completed(false).await.unwrap(), 0);
    assert!(coordinator.status().completed_exhausted);
    assert_eq!(coordinator.refresh_completed(false).await.unwrap(), 0);

    assert_eq!(coordinator.refresh_completed(true).await.unwrap(), 2);
    assert_eq!(coordinator.complete().len(), 2);
}

#[tokio::test]
async fn missed_matches_stay_out_of_the_working_set() {
    let h = harness();
    let coordinator = &h.state.coordinator;
    h.gateway.page(MatchList::Missed, vec![wire("x", "accepted")]);

    assert_eq!(coordinator.refresh_missed().await.unwrap(), 1);
    assert!(coordinator.missed_matches().exists("x"));
    assert!(!coordinator.exists("x"));
    assert!(!coordinator.missed_matches().is_persistent());
}

#[tokio::test]
async fn saved_matches_load_on_cold_start_and_sign_out_clears_them() {
    let saved = vec![
        Match::from_wire(wire("s1", "picked_up")).unwrap(),
        Match::from_wire(wire("s2", "completed")).unwrap(),
    ];
    let h = harness_with(MemoryMatchStore::with_rows(saved));
    let coordinator = &h.state.coordinator;

    assert_eq!(coordinator.load_saved().await.unwrap(), 2);
    assert_eq!(coordinator.live().len(), 1);
    assert_eq!(coordinator.complete().len(), 1);

    coordinator.sign_out();
    assert!(coordinator.working_set().is_empty());
    eventually_stored(&h.store, &[]).await;
}

#[tokio::test]
async fn store_failures_never_touch_the_working_set() {
    let store = MemoryMatchStore::new();
    store.set_failing(true);
    let h = harness_with(store);
    let coordinator = &h.state.coordinator;
    h.gateway.page(MatchList::Live, vec![wire("m1", "accepted")]);

    coordinator.refresh_live().await.unwrap();
    assert!(coordinator.exists("m1"));

    for _ in 0..100 {
        if h.state.metrics.store_write_failures_total.with_label_values(&["save"]).get() > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(
        h.state.metrics.store_write_failures_total.with_label_values(&["save"]).get(),
        1
    );
    assert!(h.store.is_empty());
}

// ---- bridge ----

#[tokio::test]
async fn health_returns_ok() {
    let h = harness();
    let response = router(h.state.clone()).oneshot(get_request("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["matches"], 0);
    assert_eq!(body["updating"], 0);
}

#[tokio::test]
async fn metrics_returns_prometheus_format() {
    let h = harness();
    let response = router(h.state.clone()).oneshot(get_request("/metrics")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(content_type.starts_with("text/plain"));

    let body = body_string(response).await;
    assert!(body.contains("working_set_size"));
    assert!(body.contains("match_mutations_in_flight"));
}

#[tokio::test]
async fn sync_then_query_through_the_bridge() {
    let h = harness();
    h.gateway.page(
        MatchList::Available,
        vec![wire("a1", "assigning_driver"), wire("a2", "assigning_driver")],
    );
    h.gateway.page(MatchList::Live, vec![wire("l1", "picked_up")]);
    let app = router(h.state.clone());

    let response = app
        .clone()
        .oneshot(json_request("POST", "/sync/available", json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["fetched"], 2);

    let response = app
        .clone()
        .oneshot(json_request("POST", "/sync/live", json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(get_request("/matches?filter=available"))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body.as_array().unwrap().len(), 2);

    let response = app.clone().oneshot(get_request("/matches")).await.unwrap();
    assert_eq!(body_json(response).await.as_array().unwrap().len(), 3);

    let response = app.clone().oneshot(get_request("/new-matches")).await.unwrap();
    assert_eq!(body_json(response).await.as_array().unwrap().len(), 2);

    let response = app
        .clone()
        .oneshot(json_request("POST", "/new-matches/viewed", json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(h.state.coordinator.new_matches().is_empty());

    let response = app.clone().oneshot(get_request("/matches/l1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["state"], "picked_up");

    let response = app.clone().oneshot(get_request("/matches/zzz")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .clone()
        .oneshot(get_request("/matches?filter=everything"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .oneshot(json_request("POST", "/sync/nowhere", json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn mutations_through_the_bridge_map_errors_to_statuses() {
    let h = harness();
    h.gateway.page(MatchList::Available, vec![wire("m1", "assigning_driver")]);
    h.state.coordinator.refresh_available().await.unwrap();
    let app = router(h.state.clone());

    h.gateway.respond(Ok(wire("m1", "accepted")));
    let response = app
        .clone()
        .oneshot(json_request("POST", "/matches/m1/mutations", json!({"action": "accept"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["action"], "accept");
    assert_eq!(body["removed"], false);
    assert_eq!(body["match"]["state"], "accepted");

    let response = app
        .clone()
        .oneshot(json_request("POST", "/matches/m1/mutations", json!({"action": "accept"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    h.gateway.respond(Err(500));
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/matches/m1/mutations",
            json!({"action": "toggle_en_route"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert!(body_json(response).await["error"].is_string());

    let response = app
        .clone()
        .oneshot(json_request("POST", "/matches/ghost/mutations", json!({"action": "reject"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app.oneshot(get_request("/status")).await.unwrap();
    let status = body_json(response).await;
    assert_eq!(status["errors"]["m1"]["kind"], "transient");
    assert!(status["updating"].as_object().unwrap().is_empty());
}

#[tokio::test]
async fn reported_location_rides_along_with_mutations() {
    let h = harness();
    h.gateway.page(MatchList::Live, vec![wire("m1", "accepted")]);
    h.state.coordinator.refresh_live().await.unwrap();
    let app = router(h.state.clone());

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/location",
            json!({"lat": 39.1, "lng": -84.5, "captured_at": chrono::Utc::now()}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    h.gateway.respond(Ok(wire("m1", "en_route_to_pickup")));
    h.state.coordinator.toggle_en_route("m1").await.unwrap();

    let actions = h.gateway.actions.lock().unwrap().clone();
    assert_eq!(actions[0].1.body["location"]["lat"], 39.1);

    let response = app
        .oneshot(json_request(
            "POST",
            "/location",
            json!({"lat": 123.0, "lng": 0.0, "captured_at": chrono::Utc::now()}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn sign_out_route_clears_the_replica() {
    let h = harness();
    h.gateway.page(MatchList::Live, vec![wire("m1", "accepted")]);
    h.state.coordinator.refresh_live().await.unwrap();
    eventually_stored(&h.store, &["m1"]).await;
    let app = router(h.state.clone());

    let response = app
        .clone()
        .oneshot(json_request("POST", "/session/sign-out", json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    eventually_stored(&h.store, &[]).await;

    let response = app.oneshot(get_request("/health")).await.unwrap();
    let body = body_json(response).await;
    assert_eq!(body["matches"], 0);
    assert_eq!(body["driver_id"], "d1");
    assert_eq!(body["location_known"], false);
}

#[tokio::test]
async fn mutation_settling_after_sign_out_does_not_resurrect_the_match() {
    let h = harness();
    let coordinator = h.state.coordinator.clone();
    h.gateway.page(MatchList::Live, vec![wire("m1", "en_route_to_pickup")]);
    coordinator.refresh_live().await.unwrap();
    eventually_stored(&h.store, &["m1"]).await;

    let gate = h.gateway.hold();
    h.gateway.respond(Ok(wire("m1", "arrived_at_pickup")));
    let pending = tokio::spawn({
        let coordinator = coordinator.clone();
        async move { coordinator.arrive_at_pickup("m1").await }
    });
    for _ in 0..100 {
        if h.gateway.calls() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(h.gateway.calls(), 1);

    coordinator.sign_out();
    gate.notify_one();
    pending.await.unwrap().unwrap();

    assert!(coordinator.working_set().is_empty());
    assert!(coordinator.is_updating("m1").is_none());
    assert!(!coordinator.succeeded("m1"));

    eventually_stored(&h.store, &[]).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(h.store.is_empty());
}

#[tokio::test]
async fn fetch_finishing_after_sign_out_is_discarded() {
    let h = harness();
    let coordinator = h.state.coordinator.clone();
    h.gateway.serve_match(
        "m1",
        Ok(json!({"id": "m1", "state": "accepted", "driver_id": "d1"})),
    );

    let gate = h.gateway.hold();
    let pending = tokio::spawn({
        let coordinator = coordinator.clone();
        async move { coordinator.fetch_match("m1").await }
    });
    for _ in 0..100 {
        if coordinator.status().fetching_matches.contains(&"m1".to_string()) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    coordinator.sign_out();
    gate.notify_one();

    assert!(pending.await.unwrap().unwrap().is_none());
    assert!(!coordinator.exists("m1"));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(h.store.is_empty());
}

#[tokio::test]
async fn barcodes_for_a_delivered_stop_are_rejected_locally() {
    let h = harness();
    let coordinator = &h.state.coordinator;
    h.gateway.page(
        MatchList::Live,
        vec![json!({
            "id": "m1",
            "state": "picked_up",
            "stops": [{"id": "s1", "state": "delivered", "items": [{"id": "i1", "barcode_delivery_required": true}]}]
        })],
    );
    coordinator.refresh_live().await.unwrap();

    let reading = NewBarcodeReading::missing(BarcodeReadingType::Delivery, "i1", "s1").captured("0042");
    let result = coordinator.submit_barcodes("m1", vec![reading]).await;

    assert!(matches!(result, Err(MutationError::InvalidTransition(_))));
    assert!(h.gateway.barcodes.lock().unwrap().is_empty());
}

#[tokio::test]
async fn partial_barcode_submission_refreshes_the_match() {
    let h = harness();
    let coordinator = &h.state.coordinator;
    let with_readings = |readings: Value| {
        json!({
            "id": "m1",
            "state": "arrived_at_pickup",
            "stops": [{"id": "s1", "state": "pending", "items": [
                {"id": "i1", "barcode_pickup_required": true, "barcode_readings": readings.clone()},
                {"id": "i2", "barcode_pickup_required": true}
            ]}]
        })
    };
    h.gateway.page(MatchList::Live, vec![with_readings(json!([]))]);
    coordinator.refresh_live().await.unwrap();

    h.gateway.fail_barcodes_after(1);
    h.gateway.serve_match(
        "m1",
        Ok(with_readings(json!([{"type": "pickup", "state": "captured", "barcode": "0001"}]))),
    );

    let readings = vec![
        NewBarcodeReading::missing(BarcodeReadingType::Pickup, "i1", "s1")
            .captured("0001")
            .with_photo("cGhvdG8="),
        NewBarcodeReading::missing(BarcodeReadingType::Pickup, "i2", "s1").captured("0002"),
    ];
    let result = coordinator.submit_barcodes("m1", readings).await;

    assert!(matches!(result, Err(MutationError::Request(ref p)) if p.kind == RequestErrorKind::Transient));
    assert_eq!(h.gateway.barcodes.lock().unwrap().len(), 1);
    assert_eq!(h.gateway.barcodes.lock().unwrap()[0].photo.as_deref(), Some("cGhvdG8="));

    let m1 = coordinator.find("m1").unwrap();
    let item = m1.stops[0].item("i1").unwrap();
    assert!(item.barcode_reading(BarcodeReadingType::Pickup).is_some());
    assert!(coordinator.error("m1").is_some());
}
