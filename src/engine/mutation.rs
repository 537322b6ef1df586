use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use thiserror::Error;

use crate::gateway::{ActionMethod, ActionRequest};
use crate::geo::DriverLocation;
use crate::models::{Match, MatchState, MatchStop, MatchStopState, NewBarcodeReading};

/// One business transition against a match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum MatchMutation {
    Accept,
    Reject,
    ToggleEnRoute,
    ToggleStopEnRoute {
        stop_id: String,
    },
    ArriveAtPickup,
    Pickup {
        #[serde(default)]
        origin_photo: Option<String>,
        #[serde(default)]
        bill_of_lading_photo: Option<String>,
    },
    ArriveAtDropoff {
        stop_id: String,
    },
    Sign {
        stop_id: String,
        printed_name: String,
        /// Base64 signature image.
        signature: String,
    },
    Deliver {
        stop_id: String,
        #[serde(default)]
        destination_photo: Option<String>,
    },
    MarkUndeliverable {
        stop_id: String,
        reason: String,
    },
    Cancel {
        reason: String,
    },
    UnableToPickup {
        reason: String,
    },
    ArriveAtReturn,
    Returned,
    SubmitBarcodes {
        readings: Vec<NewBarcodeReading>,
    },
}

/// Recorded in the `updating` status map while a mutation is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationTag {
    Accept,
    Reject,
    ToggleEnRoute,
    ArriveAtPickup,
    Pickup,
    ArriveAtDropoff,
    Sign,
    Deliver,
    MarkUndeliverable,
    Cancel,
    UnableToPickup,
    ArriveAtReturn,
    Returned,
    SubmitBarcodes,
}

impl MutationTag {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Accept => "accept",
            Self::Reject => "reject",
            Self::ToggleEnRoute => "toggle_en_route",
            Self::ArriveAtPickup => "arrive_at_pickup",
            Self::Pickup => "pickup",
            Self::ArriveAtDropoff => "arrive_at_dropoff",
            Self::Sign => "sign",
            Self::Deliver => "deliver",
            Self::MarkUndeliverable => "mark_undeliverable",
            Self::Cancel => "cancel",
            Self::UnableToPickup => "unable_to_pickup",
            Self::ArriveAtReturn => "arrive_at_return",
            Self::Returned => "returned",
            Self::SubmitBarcodes => "submit_barcodes",
        }
    }
}

impl fmt::Display for MutationTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("cannot {action} a match that is {state}")]
    MatchState { action: MutationTag, state: MatchState },

    #[error("stop {0} is not part of this match")]
    UnknownStop(String),

    #[error("cannot {action} stop {stop_id} while it is {state}")]
    StopState {
        action: MutationTag,
        stop_id: String,
        state: MatchStopState,
    },

    #[error("item {item_id} is not on stop {stop_id}")]
    UnknownItem { stop_id: String, item_id: String },

    #[error("no barcode readings to submit")]
    NothingToSubmit,
}

impl MatchMutation {
    pub fn tag(&self) -> MutationTag {
        match self {
            Self::Accept => MutationTag::Accept,
            Self::Reject => MutationTag::Reject,
            Self::ToggleEnRoute | Self::ToggleStopEnRoute { .. } => MutationTag::ToggleEnRoute,
            Self::ArriveAtPickup => MutationTag::ArriveAtPickup,
            Self::Pickup { .. } => MutationTag::Pickup,
            Self::ArriveAtDropoff { .. } => MutationTag::ArriveAtDropoff,
            Self::Sign { .. } => MutationTag::Sign,
            Self::Deliver { .. } => MutationTag::Deliver,
            Self::MarkUndeliverable { .. } => MutationTag::MarkUndeliverable,
            Self::Cancel { .. } => MutationTag::Cancel,
            Self::UnableToPickup { .. } => MutationTag::UnableToPickup,
            Self::ArriveAtReturn => MutationTag::ArriveAtReturn,
            Self::Returned => MutationTag::Returned,
            Self::SubmitBarcodes { .. } => MutationTag::SubmitBarcodes,
        }
    }

    /// Successful terminal mutations take the match out of the working set
    /// instead of replacing it.
    pub fn removes_match(&self) -> bool {
        matches!(
            self,
            Self::Reject | Self::Cancel { .. } | Self::UnableToPickup { .. }
        )
    }

    /// Rejects transitions the local state machine says are impossible.
    pub fn check(&self, m: &Match) -> Result<(), TransitionError> {
        let action = self.tag();
        let require = |ok: bool| {
            if ok {
                Ok(())
            } else {
                Err(TransitionError::MatchState {
                    action,
                    state: m.state,
                })
            }
        };

        match self {
            Self::Accept => require(m.state.can_transition_to(MatchState::Accepted)),
            Self::Reject => require(m.is_available()),
            Self::ToggleEnRoute => require(matches!(
                m.state,
                MatchState::Accepted | MatchState::EnRouteToPickup
            )),
            Self::ArriveAtPickup => require(m.state.can_transition_to(MatchState::ArrivedAtPickup)),
            Self::Pickup { .. } => require(m.state.can_transition_to(MatchState::PickedUp)),
            Self::Cancel { .. } | Self::UnableToPickup { .. } => {
                require(m.state.can_transition_to(MatchState::DriverCanceled))
            }
            Self::ArriveAtReturn => require(m.state.can_transition_to(MatchState::ArrivedAtReturn)),
            Self::Returned => require(m.state == MatchState::ArrivedAtReturn),
            Self::ToggleStopEnRoute { stop_id } => {
                require(m.state == MatchState::PickedUp)?;
                let stop = stop_of(m, stop_id)?;
                if stop.is_en_route_toggleable() {
                    Ok(())
                } else {
                    Err(stop_state_error(action, stop))
                }
            }
            Self::ArriveAtDropoff { stop_id } => {
                check_stop(m, action, stop_id, MatchStopState::Arrived)
            }
            Self::Sign { stop_id, .. } => check_stop(m, action, stop_id, MatchStopState::Signed),
            Self::Deliver { stop_id, .. } => {
                check_stop(m, action, stop_id, MatchStopState::Delivered)
            }
            Self::MarkUndeliverable { stop_id, .. } => {
                check_stop(m, action, stop_id, MatchStopState::Undeliverable)
            }
            Self::SubmitBarcodes { readings } => {
                require(m.is_live())?;
                if readings.is_empty() {
                    return Err(TransitionError::NothingToSubmit);
                }
                for reading in readings {
                    let stop = stop_of(m, &reading.stop_id)?;
                    if stop.state.is_terminal() {
                        return Err(stop_state_error(action, stop));
                    }
                    if stop.item(&reading.item_id).is_none() {
                        return Err(TransitionError::UnknownItem {
                            stop_id: reading.stop_id.clone(),
                            item_id: reading.item_id.clone(),
                        });
                    }
                }
                Ok(())
            }
        }
    }

    /// The status call for this mutation. `None` for barcode submission,
    /// which posts each reading to its item instead.
    pub fn request(
        &self,
        match_id: &str,
        location: Option<DriverLocation>,
        driver_id: Option<&str>,
    ) -> Option<ActionRequest> {
        let (method, path, body) = match self {
            Self::Accept => (ActionMethod::Patch, String::new(), state_body("accepted")),
            Self::Reject => (ActionMethod::Put, String::new(), state_body("rejected")),
            Self::ToggleEnRoute => (ActionMethod::Put, "toggle_en_route".to_string(), Map::new()),
            Self::ToggleStopEnRoute { stop_id } => (
                ActionMethod::Put,
                format!("stops/{stop_id}/toggle_en_route"),
                Map::new(),
            ),
            Self::ArriveAtPickup => (
                ActionMethod::Put,
                String::new(),
                state_body("arrived_at_pickup"),
            ),
            Self::Pickup {
                origin_photo,
                bill_of_lading_photo,
            } => {
                let mut body = state_body("picked_up");
                insert_user(&mut body, driver_id);
                if let Some(photo) = origin_photo {
                    body.insert(
                        "origin_photo".into(),
                        file(format!("{match_id}_origin_photo.jpg"), photo),
                    );
                }
                if let Some(photo) = bill_of_lading_photo {
                    body.insert(
                        "bill_of_lading_photo".into(),
                        file(format!("{match_id}_bill_of_lading.jpg"), photo),
                    );
                }
                (ActionMethod::Put, String::new(), body)
            }
            Self::ArriveAtDropoff { stop_id } => (
                ActionMethod::Patch,
                format!("stops/{stop_id}"),
                state_body("arrived"),
            ),
            Self::Sign {
                stop_id,
                printed_name,
                signature,
            } => {
                let mut body = state_body("signed");
                body.insert("receiver_name".into(), json!(printed_name));
                // some capture libraries wrap base64 output
                let contents: String = signature.chars().filter(|c| !matches!(c, '\r' | '\n')).collect();
                body.insert(
                    "image".into(),
                    file(format!("{match_id}_signature.png"), &contents),
                );
                (ActionMethod::Patch, format!("stops/{stop_id}"), body)
            }
            Self::Deliver {
                stop_id,
                destination_photo,
            } => {
                let mut body = state_body("delivered");
                insert_user(&mut body, driver_id);
                if let Some(photo) = destination_photo {
                    body.insert(
                        "destination_photo".into(),
                        file(format!("{match_id}_destination_photo.jpg"), photo),
                    );
                }
                (ActionMethod::Put, format!("stops/{stop_id}"), body)
            }
            Self::MarkUndeliverable { stop_id, reason } => {
                let mut body = state_body("undeliverable");
                body.insert("reason".into(), json!(reason));
                (ActionMethod::Put, format!("stops/{stop_id}"), body)
            }
            Self::Cancel { reason } => {
                let mut body = state_body("cancel");
                body.insert("reason".into(), json!(reason));
                (ActionMethod::Put, String::new(), body)
            }
            Self::UnableToPickup { reason } => {
                let mut body = state_body("unable_to_pickup");
                body.insert("reason".into(), json!(reason));
                (ActionMethod::Put, String::new(), body)
            }
            Self::ArriveAtReturn => (
                ActionMethod::Put,
                String::new(),
                state_body("arrived_at_return"),
            ),
            Self::Returned => (ActionMethod::Put, String::new(), state_body("returned")),
            Self::SubmitBarcodes { .. } => return None,
        };

        let mut body = body;
        if let Some(location) = location {
            body.insert(
                "location".into(),
                json!({
                    "lat": location.lat,
                    "lng": location.lng,
                    "captured_at": location.captured_at,
                }),
            );
        }

        Some(ActionRequest {
            method,
            path,
            body: Value::Object(body),
        })
    }
}

fn state_body(state: &str) -> Map<String, Value> {
    let mut body = Map::new();
    body.insert("state".into(), json!(state));
    body
}

fn insert_user(body: &mut Map<String, Value>, driver_id: Option<&str>) {
    if let Some(driver_id) = driver_id {
        body.insert("user".into(), json!(driver_id));
    }
}

fn file(filename: String, contents: &str) -> Value {
    json!({ "filename": filename, "contents": contents })
}

fn stop_of<'a>(m: &'a Match, stop_id: &str) -> Result<&'a MatchStop, TransitionError> {
    m.stop(stop_id)
        .ok_or_else(|| TransitionError::UnknownStop(stop_id.to_string()))
}

fn stop_state_error(action: MutationTag, stop: &MatchStop) -> TransitionError {
    TransitionError::StopState {
        action,
        stop_id: stop.id.clone(),
        state: stop.state,
    }
}

fn check_stop(
    m: &Match,
    action: MutationTag,
    stop_id: &str,
    next: MatchStopState,
) -> Result<(), TransitionError> {
    if m.state != MatchState::PickedUp {
        return Err(TransitionError::MatchState {
            action,
            state: m.state,
        });
    }

    let stop = stop_of(m, stop_id)?;
    if stop.state.can_transition_to(next) {
        Ok(())
    } else {
        Err(stop_state_error(action, stop))
    }
}
