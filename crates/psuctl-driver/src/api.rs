//! REST API.
//!
//! | Method & path       | Body                                          | Success            |
//! |---------------------|-----------------------------------------------|--------------------|
//! | `GET /`             | none                                          | 200 telemetry JSON |
//! | `POST /channel_on`  | `{"channel": 1, "current": 2.0, "voltage": 10.0}` | 200, empty body |
//! | `POST /channel_off` | `{"channel": 1}`                              | 200, empty body    |
//!
//! Every request gets a fresh [`CorrelationId`] before its handler runs. The
//! id is passed to every transport call made for the request and returned
//! in the `Uuid` response header. Every response names its handler in the
//! `Method-Routing` header. Errors are returned as `{"error": "..."}`.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use bytes::Bytes;
use serde::Serialize;
use serde_json::{Map, Value, json};
use tracing::{info, warn};

use psuctl_core::correlation::CorrelationId;
use psuctl_core::error::Error;
use psuctl_core::types::{ChannelId, Telemetry};

use crate::supply::PowerSupply;

/// Response header naming the handler that served the request.
pub const METHOD_ROUTING_HEADER: &str = "method-routing";

/// Response header carrying the request's correlation id.
pub const UUID_HEADER: &str = "uuid";

const CHANNEL_ON_FIELDS: &str = "You need to pass channel, current and voltage as body!";
const CHANNEL_OFF_FIELDS: &str = "You need to pass channel as body!";

/// Errors returned by the REST handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The body lacks a required field. Carries the client-facing message.
    #[error("{0}")]
    MissingField(&'static str),

    /// The body is not a JSON object or a field has the wrong type.
    #[error("malformed request body: {0}")]
    MalformedBody(String),

    /// The supply rejected the command or could not be reached.
    #[error(transparent)]
    Device(#[from] Error),
}

impl ApiError {
    /// The HTTP status this error maps to.
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingField(_) | ApiError::MalformedBody(_) => StatusCode::BAD_REQUEST,
            ApiError::Device(e) if e.is_client_error() => StatusCode::BAD_REQUEST,
            ApiError::Device(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(error = %self, "request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[derive(Clone)]
struct ApiState {
    supply: Arc<PowerSupply>,
}

#[derive(Serialize)]
struct TelemetryBody {
    telemetry: Telemetry,
}

/// Build the API router for `supply`.
pub fn router(supply: Arc<PowerSupply>) -> Router {
    Router::new()
        .route("/", get(telemetry))
        .route("/channel_on", post(turn_channel_on))
        .route("/channel_off", post(turn_channel_off))
        .layer(middleware::from_fn(assign_correlation))
        .with_state(ApiState { supply })
}

/// Attach a fresh correlation id to the request and echo it on the response.
async fn assign_correlation(mut request: Request, next: Next) -> Response {
    let id = CorrelationId::new();
    request.extensions_mut().insert(id);

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&id.to_string()) {
        response.headers_mut().insert(UUID_HEADER, value);
    }
    response
}

async fn telemetry(
    State(state): State<ApiState>,
    Extension(id): Extension<CorrelationId>,
) -> impl IntoResponse {
    let result = async {
        let telemetry = state.supply.telemetry(Some(&id)).await?;
        Ok::<_, ApiError>(Json(TelemetryBody { telemetry }))
    }
    .await;
    ([(METHOD_ROUTING_HEADER, "telemetry")], result)
}

async fn turn_channel_on(
    State(state): State<ApiState>,
    Extension(id): Extension<CorrelationId>,
    body: Bytes,
) -> impl IntoResponse {
    let result = async {
        let fields = parse_object(&body)?;
        let (Some(channel), Some(current), Some(voltage)) = (
            fields.get("channel"),
            fields.get("current"),
            fields.get("voltage"),
        ) else {
            return Err(ApiError::MissingField(CHANNEL_ON_FIELDS));
        };
        let channel = channel_field(channel)?;
        let current = number_field(current, "current")?;
        let voltage = number_field(voltage, "voltage")?;

        info!(correlation = %id, %channel, current, voltage, "turn channel on");
        state
            .supply
            .turn_on_channel(channel, current, voltage, Some(&id))
            .await?;
        Ok::<_, ApiError>(StatusCode::OK)
    }
    .await;
    ([(METHOD_ROUTING_HEADER, "turn_channel_on")], result)
}

async fn turn_channel_off(
    State(state): State<ApiState>,
    Extension(id): Extension<CorrelationId>,
    body: Bytes,
) -> impl IntoResponse {
    let result = async {
        let fields = parse_object(&body)?;
        let Some(channel) = fields.get("channel") else {
            return Err(ApiError::MissingField(CHANNEL_OFF_FIELDS));
        };
        let channel = channel_field(channel)?;

        info!(correlation = %id, %channel, "turn channel off");
        state.supply.turn_off_channel(channel, Some(&id)).await?;
        Ok::<_, ApiError>(StatusCode::OK)
    }
    .await;
    ([(METHOD_ROUTING_HEADER, "turn_channel_off")], result)
}

fn parse_object(body: &[u8]) -> Result<Map<String, Value>, ApiError> {
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(fields)) => Ok(fields),
        Ok(_) => Err(ApiError::MalformedBody("expected a JSON object".to_string())),
        Err(e) => Err(ApiError::MalformedBody(e.to_string())),
    }
}

/// Read the channel number, rejecting channels outside 1-4 before any
/// command is sent.
fn channel_field(value: &Value) -> Result<ChannelId, ApiError> {
    let number = value
        .as_i64()
        .ok_or_else(|| ApiError::MalformedBody("'channel' must be an integer".to_string()))?;
    Ok(ChannelId::new(number)?)
}

fn number_field(value: &Value, name: &str) -> Result<f64, ApiError> {
    value
        .as_f64()
        .ok_or_else(|| ApiError::MalformedBody(format!("'{name}' must be a number")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(
            ApiError::MissingField(CHANNEL_OFF_FIELDS).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::MalformedBody("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Device(Error::InvalidChannel(9)).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Device(Error::Timeout).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::Device(Error::UnknownSegment {
                segment: "X".into(),
                command: ":X".into(),
            })
            .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn missing_field_message_is_client_facing() {
        assert_eq!(
            ApiError::MissingField(CHANNEL_ON_FIELDS).to_string(),
            "You need to pass channel, current and voltage as body!"
        );
    }

    #[test]
    fn body_parsing() {
        assert!(matches!(parse_object(b""), Err(ApiError::MalformedBody(_))));
        assert!(matches!(parse_object(b"[1]"), Err(ApiError::MalformedBody(_))));
        assert_eq!(parse_object(br#"{"channel": 2}"#).unwrap()["channel"], 2);

        assert_eq!(channel_field(&json!(3)).unwrap().number(), 3);
        assert!(matches!(
            channel_field(&json!(5)),
            Err(ApiError::Device(Error::InvalidChannel(5)))
        ));
        assert!(matches!(
            channel_field(&json!("1")),
            Err(ApiError::MalformedBody(_))
        ));
        assert_eq!(number_field(&json!(2), "current").unwrap(), 2.0);
        assert!(number_field(&json!(null), "current").is_err());
    }
}
