//! Google Cloud Pub/Sub pull subscription over the REST API.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use fatural_core::{defaults, Error, Result};

use crate::source::{MessageSource, ReceivedMessage};

/// Pull subscription client.
pub struct PubSubSource {
    client: Client,
    base_url: String,
    /// `projects/{project}/subscriptions/{name}`
    subscription: String,
    access_token: Option<String>,
}

impl PubSubSource {
    pub fn new(
        base_url: impl Into<String>,
        project_id: &str,
        subscription: &str,
        access_token: Option<String>,
    ) -> Result<Self> {
        if project_id.is_empty() {
            return Err(Error::Config("PUBSUB_PROJECT_ID is not set".to_string()));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            subscription: format!("projects/{}/subscriptions/{}", project_id, subscription),
            access_token,
        })
    }

    /// Create from `PUBSUB_PROJECT_ID`, `PUBSUB_SUBSCRIPTION`,
    /// `PUBSUB_ACCESS_TOKEN`, `PUBSUB_BASE_URL`.
    pub fn from_env() -> Result<Self> {
        let project_id = std::env::var("PUBSUB_PROJECT_ID").unwrap_or_default();
        let subscription = std::env::var("PUBSUB_SUBSCRIPTION")
            .unwrap_or_else(|_| defaults::PUBSUB_SUBSCRIPTION.to_string());
        let base_url =
            std::env::var("PUBSUB_BASE_URL").unwrap_or_else(|_| defaults::PUBSUB_URL.to_string());
        let token = std::env::var("PUBSUB_ACCESS_TOKEN")
            .ok()
            .filter(|t| !t.is_empty());
        Self::new(base_url, &project_id, &subscription, token)
    }

    pub fn subscription(&self) -> &str {
        &self.subscription
    }

    async fn call(&self, method: &str, body: serde_json::Value) -> Result<reqwest::Response> {
        let mut request = self
            .client
            .post(format!("{}/v1/{}:{}", self.base_url, self.subscription, method))
            .json(&body);
        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Request(format!(
                "Pub/Sub {} returned {}: {}",
                method, status, text
            )));
        }
        Ok(response)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PullRequest {
    max_messages: usize,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PullResponse {
    #[serde(default)]
    received_messages: Vec<WireReceived>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireReceived {
    ack_id: String,
    message: WireMessage,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireMessage {
    #[serde(default)]
    data: String,
    #[serde(default)]
    message_id: String,
}

/// Decode a base64 `data` field. Undecodable input is passed through raw so
/// the job decoder rejects it as malformed.
pub(crate) fn decode_data(data: &str) -> Vec<u8> {
    base64::engine::general_purpose::STANDARD
        .decode(data)
        .unwrap_or_else(|_| data.as_bytes().to_vec())
}

#[async_trait]
impl MessageSource for PubSubSource {
    async fn pull(&self, max: usize) -> Result<Vec<ReceivedMessage>> {
        let body = serde_json::to_value(PullRequest { max_messages: max })?;
        let response: PullResponse = self
            .call("pull", body)
            .await?
            .json()
            .await
            .map_err(|e| Error::Request(format!("Failed to parse pull response: {}", e)))?;

        let messages: Vec<ReceivedMessage> = response
            .received_messages
            .into_iter()
            .map(|r| ReceivedMessage {
                ack_id: r.ack_id,
                message_id: r.message.message_id,
                data: decode_data(&r.message.data),
            })
            .collect();
        debug!(count = messages.len(), "Pulled messages");
        Ok(messages)
    }

    async fn ack(&self, ack_ids: &[String]) -> Result<()> {
        if ack_ids.is_empty() {
            return Ok(());
        }
        self.call("acknowledge", json!({ "ackIds": ack_ids }))
            .await?;
        Ok(())
    }

    async fn nack(&self, ack_ids: &[String]) -> Result<()> {
        if ack_ids.is_empty() {
            return Ok(());
        }
        // A zero deadline releases the lease immediately.
        if let Err(e) = self
            .call(
                "modifyAckDeadline",
                json!({ "ackIds": ack_ids, "ackDeadlineSeconds": 0 }),
            )
            .await
        {
            warn!(error = %e, "Nack failed; message will redeliver after lease expiry");
            return Err(e);
        }
        Ok(())
    }
}
