//! Backend API port.
//!
//! Everything the replica needs from the server goes through
//! [`MatchGateway`], so the coordinator can be driven by a scripted fake in
//! tests and by [`http::HttpMatchGateway`] in the binary.

pub mod http;

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::models::{Match, NewBarcodeReading};

pub use http::HttpMatchGateway;

/// Server-side list a refresh pulls from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchList {
    Live,
    Available,
    Completed,
    Missed,
}

impl MatchList {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Available => "available",
            Self::Completed => "completed",
            Self::Missed => "missed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "live" => Some(Self::Live),
            "available" => Some(Self::Available),
            "completed" => Some(Self::Completed),
            "missed" => Some(Self::Missed),
            _ => None,
        }
    }
}

impl fmt::Display for MatchList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ActionMethod {
    Put,
    Patch,
}

/// A status-changing call against one match.
///
/// `path` is relative to the match resource (`""`, `"toggle_en_route"`,
/// `"stops/{id}"`, ...).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionRequest {
    pub method: ActionMethod,
    pub path: String,
    pub body: Value,
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("match is not accessible ({status}): {message}")]
    Inaccessible { status: u16, message: String },

    #[error("server returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("offline mode is enabled")]
    Offline,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("unexpected response: {0}")]
    Decode(String),
}

impl GatewayError {
    /// 403 and 404 mean the match is gone for this driver; anything else
    /// is worth retrying.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            403 | 404 => Self::Inaccessible { status, message },
            _ => Self::Status { status, message },
        }
    }

    pub fn is_inaccessible(&self) -> bool {
        matches!(self, Self::Inaccessible { .. })
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Inaccessible { status, .. } | Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn to_request_error(&self) -> RequestError {
        let kind = match self {
            Self::Inaccessible { .. } => RequestErrorKind::Inaccessible,
            Self::Status { .. } | Self::Transport(_) => RequestErrorKind::Transient,
            Self::Offline => RequestErrorKind::Offline,
            Self::Decode(_) => RequestErrorKind::Decode,
        };

        RequestError {
            kind,
            status: self.status(),
            message: self.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestErrorKind {
    Inaccessible,
    Transient,
    Offline,
    Decode,
}

/// Serializable failure recorded against a match id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestError {
    pub kind: RequestErrorKind,
    pub status: Option<u16>,
    pub message: String,
}

#[async_trait]
pub trait MatchGateway: Send + Sync {
    async fn fetch_match(&self, match_id: &str) -> Result<Match, GatewayError>;

    /// `cursor` only applies to [`MatchList::Completed`].
    async fn fetch_page(
        &self,
        list: MatchList,
        cursor: Option<u32>,
    ) -> Result<Vec<Match>, GatewayError>;

    /// Returns the unwrapped `response` payload.
    async fn send_action(
        &self,
        match_id: &str,
        request: &ActionRequest,
    ) -> Result<Value, GatewayError>;

    async fn submit_barcode_reading(
        &self,
        match_id: &str,
        reading: &NewBarcodeReading,
    ) -> Result<(), GatewayError>;
}

/// Decodes a list payload: either a bare array or `{"results": [...]}`.
/// Elements that do not decode are dropped.
pub fn matches_from_payload(payload: Value) -> Result<Vec<Match>, GatewayError> {
    let items = match payload {
        Value::Array(items) => items,
        Value::Object(mut fields) => match fields.remove("results") {
            Some(Value::Array(items)) => items,
            _ => return Err(GatewayError::Decode("expected a list of matches".to_string())),
        },
        _ => return Err(GatewayError::Decode("expected a list of matches".to_string())),
    };

    Ok(items
        .into_iter()
        .filter_map(|item| match Match::from_wire(item) {
            Ok(m) => Some(m),
            Err(err) => {
                warn!(error = %err, "dropping undecodable match from list");
                None
            }
        })
        .collect())
}
