use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::gateway::{
    ActionMethod, ActionRequest, GatewayError, MatchGateway, MatchList, matches_from_payload,
};
use crate::models::{BarcodeReadingState, BarcodeReadingType, Match, NewBarcodeReading};

#[derive(Debug, Clone)]
pub struct HttpGatewayConfig {
    pub base_url: String,
    pub session_token: Option<String>,
    pub timeout: Duration,
    pub offline: bool,
}

/// Driver API over HTTPS. Every response is wrapped as `{"response": ...}`.
#[derive(Debug, Clone)]
pub struct HttpMatchGateway {
    client: Client,
    base_url: String,
    session_token: Option<String>,
    offline: bool,
}

#[derive(Serialize)]
struct BarcodeReadingBody<'a> {
    #[serde(rename = "type")]
    kind: BarcodeReadingType,
    state: BarcodeReadingState,
    barcode: Option<&'a str>,
    photo: Option<&'a str>,
}

impl HttpMatchGateway {
    pub fn new(config: HttpGatewayConfig) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| GatewayError::Transport(format!("failed to build client: {err}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            session_token: config.session_token,
            offline: config.offline,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, GatewayError> {
        if self.offline {
            return Err(GatewayError::Offline);
        }

        let mut builder = self
            .client
            .request(method, self.url(path))
            .header("accept", "application/json")
            .header("x-request-id", Uuid::new_v4().to_string());
        if let Some(token) = &self.session_token {
            builder = builder.bearer_auth(token);
        }
        Ok(builder)
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Value, GatewayError> {
        let response = builder
            .send()
            .await
            .map_err(|err| GatewayError::Transport(err.to_string()))?;
        unwrap_envelope(response).await
    }
}

async fn unwrap_envelope(response: Response) -> Result<Value, GatewayError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(GatewayError::from_status(status.as_u16(), error_message(&body)));
    }

    let payload: Value = response
        .json()
        .await
        .map_err(|err| GatewayError::Decode(err.to_string()))?;

    match payload {
        Value::Object(mut fields) => Ok(fields.remove("response").unwrap_or(Value::Null)),
        other => Err(GatewayError::Decode(format!(
            "expected an object envelope, got {other}"
        ))),
    }
}

/// Pulls a readable message out of an error body, falling back to the raw
/// text.
fn error_message(body: &str) -> String {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    parsed
        .as_ref()
        .and_then(|v| v.get("message").or_else(|| v.get("error")))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| body.chars().take(200).collect())
}

#[async_trait]
impl MatchGateway for HttpMatchGateway {
    async fn fetch_match(&self, match_id: &str) -> Result<Match, GatewayError> {
        let builder = self.request(Method::GET, &format!("driver/matches/{match_id}"))?;
        let payload = self.send(builder).await?;
        Match::from_wire(payload).map_err(|err| GatewayError::Decode(err.to_string()))
    }

    async fn fetch_page(
        &self,
        list: MatchList,
        cursor: Option<u32>,
    ) -> Result<Vec<Match>, GatewayError> {
        let mut builder = self.request(Method::GET, &format!("driver/matches/{list}"))?;
        if list == MatchList::Completed {
            builder = builder.query(&[("cursor", cursor.unwrap_or(0))]);
        }

        debug!(list = %list, ?cursor, "fetching match list");
        let payload = self.send(builder).await?;
        matches_from_payload(payload)
    }

    async fn send_action(
        &self,
        match_id: &str,
        request: &ActionRequest,
    ) -> Result<Value, GatewayError> {
        let method = match request.method {
            ActionMethod::Put => Method::PUT,
            ActionMethod::Patch => Method::PATCH,
        };
        let path = if request.path.is_empty() {
            format!("driver/matches/{match_id}")
        } else {
            format!("driver/matches/{match_id}/{}", request.path)
        };
        let builder = self.request(method, &path)?.json(&request.body);
        self.send(builder).await
    }

    async fn submit_barcode_reading(
        &self,
        match_id: &str,
        reading: &NewBarcodeReading,
    ) -> Result<(), GatewayError> {
        let path = format!(
            "driver/matches/{match_id}/stops/{}/items/{}/barcode_readings",
            reading.stop_id, reading.item_id
        );
        let body = BarcodeReadingBody {
            kind: reading.kind,
            state: reading.state,
            barcode: reading.barcode.as_deref(),
            photo: reading.photo.as_deref(),
        };

        let builder = self.request(Method::POST, &path)?.json(&body);
        self.send(builder).await.map(|_| ())
    }
}
