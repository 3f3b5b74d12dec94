//! HTTP push endpoint for Pub/Sub push subscriptions.
//!
//! Every `POST /` answers 200, including failures: a non-2xx reply would make
//! the broker redeliver indefinitely. Failures are still recorded on the bill
//! and in the logs.
//!
//! Pushes share the pull worker's flow control: at most `max_in_flight`
//! deliveries run at once and their payloads hold byte permits from the same
//! kind of budget. Excess requests wait for a slot.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tower::limit::GlobalConcurrencyLimitLayer;
use tracing::warn;

use crate::delivery::{DeliveryAdapter, DeliveryOutcome};
use crate::pubsub::decode_data;
use crate::worker::{byte_budget, byte_permits, WorkerConfig};

/// Room for the envelope fields around the base64 payload.
pub const ENVELOPE_OVERHEAD_BYTES: usize = 64 * 1024;

/// Push envelope sent by Pub/Sub.
#[derive(Debug, Deserialize)]
pub struct PushEnvelope {
    pub message: PushMessage,
    #[serde(default)]
    pub subscription: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushMessage {
    pub data: String,
    #[serde(default)]
    pub message_id: Option<String>,
}

/// Body returned for every push.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum PushResponse {
    Success { bill_id: String },
    Error { error: String },
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub service: String,
    pub status: String,
    pub version: String,
}

#[derive(Clone)]
struct PushState {
    adapter: Arc<DeliveryAdapter>,
    bytes: Arc<Semaphore>,
    max_in_flight_bytes: usize,
}

/// Largest envelope accepted for a byte ceiling: the base64 form of a
/// ceiling-sized payload plus envelope fields.
pub fn envelope_limit(max_in_flight_bytes: usize) -> usize {
    byte_budget(max_in_flight_bytes)
        .saturating_mul(4)
        .div_ceil(3)
        .saturating_add(ENVELOPE_OVERHEAD_BYTES)
}

/// Build the push router: `POST /`, `GET /`, `GET /health`.
///
/// Only `POST /` counts against `limits.max_in_flight`; health checks never
/// queue behind deliveries.
pub fn router(adapter: Arc<DeliveryAdapter>, limits: &WorkerConfig) -> Router {
    let state = PushState {
        adapter,
        bytes: Arc::new(Semaphore::new(byte_budget(limits.max_in_flight_bytes))),
        max_in_flight_bytes: limits.max_in_flight_bytes,
    };
    Router::new()
        .route(
            "/",
            post(push)
                .layer(GlobalConcurrencyLimitLayer::new(limits.max_in_flight.max(1)))
                .get(service_info),
        )
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(envelope_limit(limits.max_in_flight_bytes)))
        .with_state(state)
}

async fn service_info() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        service: "Fatural Worker".to_string(),
        status: "running".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "healthy" }))
}

async fn push(
    State(state): State<PushState>,
    body: std::result::Result<Bytes, BytesRejection>,
) -> Json<PushResponse> {
    let body = match body {
        Ok(body) => body,
        Err(rejection) => {
            warn!(subsystem = "push", error = %rejection.body_text(), "Push body rejected");
            return Json(PushResponse::Error {
                error: format!("Push body rejected: {}", rejection.body_text()),
            });
        }
    };

    let envelope: PushEnvelope = match serde_json::from_slice(&body) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!(subsystem = "push", error = %e, "Invalid push envelope");
            return Json(PushResponse::Error {
                error: format!("Invalid Pub/Sub message format: {}", e),
            });
        }
    };

    let data = decode_data(&envelope.message.data);
    let permits = byte_permits(data.len(), state.max_in_flight_bytes);
    let Ok(_bytes) = state.bytes.clone().acquire_many_owned(permits).await else {
        return Json(PushResponse::Error {
            error: "Push endpoint is shutting down".to_string(),
        });
    };
    let response = match state.adapter.deliver(&data).await {
        DeliveryOutcome::Processed { bill_id, .. } => PushResponse::Success {
            bill_id: bill_id.to_string(),
        },
        DeliveryOutcome::Malformed(error) | DeliveryOutcome::Failed { error, .. } => {
            PushResponse::Error { error }
        }
    };
    Json(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_response_shape() {
        let ok = serde_json::to_value(PushResponse::Success {
            bill_id: "b".to_string(),
        })
        .unwrap();
        assert_eq!(ok, serde_json::json!({ "status": "success", "bill_id": "b" }));

        let err = serde_json::to_value(PushResponse::Error {
            error: "boom".to_string(),
        })
        .unwrap();
        assert_eq!(err, serde_json::json!({ "status": "error", "error": "boom" }));
    }

    #[test]
    fn test_envelope_limit_fits_encoded_budget() {
        assert_eq!(envelope_limit(3), 4 + ENVELOPE_OVERHEAD_BYTES);
        assert_eq!(envelope_limit(1024), 1366 + ENVELOPE_OVERHEAD_BYTES);
        assert_eq!(envelope_limit(usize::MAX), envelope_limit(u32::MAX as usize));
    }

    #[test]
    fn test_envelope_parses_message_id() {
        let envelope: PushEnvelope = serde_json::from_str(
            r#"{"message":{"data":"e30=","messageId":"42"},"subscription":"s"}"#,
        )
        .unwrap();
        assert_eq!(envelope.message.message_id.as_deref(), Some("42"));
    }
}
