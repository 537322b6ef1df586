use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use chrono::{DateTime, Utc};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, info, warn};

use crate::api::rest::status::accept_location;
use crate::geo::DriverLocation;
use crate::state::AppState;

/// What the shell may push back over the socket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ShellMessage {
    Location {
        lat: f64,
        lng: f64,
        captured_at: Option<DateTime<Utc>>,
    },
    MatchesViewed,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Pushes collection events and location requests; accepts location fixes
/// and view acknowledgements from the shell.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    let events = BroadcastStream::new(state.coordinator.subscribe()).filter_map(|item| async move {
        match item {
            Ok(event) => serde_json::to_string(&event).ok(),
            Err(err) => {
                warn!(error = %err, "websocket subscriber lagged");
                None
            }
        }
    });
    let location_requests = BroadcastStream::new(state.reporter.requests()).filter_map(|item| async move {
        let request = item.ok()?;
        serde_json::to_string(&json!({
            "type": "location_requested",
            "requested_at": request.requested_at,
        }))
        .ok()
    });
    let mut outgoing = Box::pin(futures::stream::select(events, location_requests));

    info!("shell connected");

    let push = tokio::spawn(async move {
        while let Some(text) = outgoing.next().await {
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let inbound_state = state.clone();
    let pull = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            match message {
                Message::Text(text) => handle_shell_message(&inbound_state, &text),
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = push => {},
        _ = pull => {},
    }

    info!("shell disconnected");
}

fn handle_shell_message(state: &AppState, text: &str) {
    match serde_json::from_str::<ShellMessage>(text) {
        Ok(ShellMessage::Location {
            lat,
            lng,
            captured_at,
        }) => {
            let location = DriverLocation {
                lat,
                lng,
                captured_at: captured_at.unwrap_or_else(Utc::now),
            };
            if let Err(err) = accept_location(state, location) {
                warn!(error = %err, "ignoring location from shell");
            }
        }
        Ok(ShellMessage::MatchesViewed) => state.coordinator.matches_viewed(),
        Err(err) => debug!(error = %err, "unrecognized shell message"),
    }
}
