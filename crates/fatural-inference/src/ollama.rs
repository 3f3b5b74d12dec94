//! Ollama backend: vision-model extraction and local embeddings.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{debug, info, instrument, warn};

use fatural_core::{
    defaults, EmbeddingBackend, Error, ExtractedBill, ExtractionBackend, Result, Vector,
};

use crate::prompt::{extraction_schema, parse_extraction, EXTRACTION_PROMPT};

/// Ollama inference backend.
pub struct OllamaBackend {
    client: Client,
    base_url: String,
    vision_model: String,
    embed_model: String,
    dimension: usize,
    temperature: f32,
    extract_timeout: Duration,
    embed_timeout: Duration,
    response_schema: JsonValue,
}

impl OllamaBackend {
    /// Create a new Ollama backend with default settings.
    pub fn new() -> Result<Self> {
        Self::with_config(
            defaults::OLLAMA_URL.to_string(),
            defaults::OLLAMA_VISION_MODEL.to_string(),
            defaults::OLLAMA_EMBED_MODEL.to_string(),
            defaults::EMBED_DIMENSION,
        )
    }

    /// Create a new Ollama backend with custom configuration.
    pub fn with_config(
        base_url: String,
        vision_model: String,
        embed_model: String,
        dimension: usize,
    ) -> Result<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        info!(
            "Initializing Ollama backend: url={}, vision={}, embed={}",
            base_url, vision_model, embed_model
        );

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            vision_model,
            embed_model,
            dimension,
            temperature: defaults::EXTRACTION_TEMPERATURE,
            extract_timeout: Duration::from_secs(defaults::EXTRACT_TIMEOUT_SECS),
            embed_timeout: Duration::from_secs(defaults::EMBED_TIMEOUT_SECS),
            response_schema: extraction_schema(),
        })
    }

    /// Create from environment variables.
    pub fn from_env() -> Result<Self> {
        let base_url =
            std::env::var("OLLAMA_BASE").unwrap_or_else(|_| defaults::OLLAMA_URL.to_string());
        let vision_model = std::env::var("OLLAMA_VISION_MODEL")
            .unwrap_or_else(|_| defaults::OLLAMA_VISION_MODEL.to_string());
        let embed_model = std::env::var("OLLAMA_EMBED_MODEL")
            .unwrap_or_else(|_| defaults::OLLAMA_EMBED_MODEL.to_string());
        let dimension = std::env::var(defaults::ENV_EMBED_DIMENSION)
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults::EMBED_DIMENSION);
        let temperature = std::env::var("EXTRACTION_TEMPERATURE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults::EXTRACTION_TEMPERATURE);

        Ok(Self::with_config(base_url, vision_model, embed_model, dimension)?
            .with_temperature(temperature))
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_timeouts(mut self, extract: Duration, embed: Duration) -> Self {
        self.extract_timeout = extract;
        self.embed_timeout = embed;
        self
    }
}

#[derive(Serialize)]
struct EmbeddingRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Chat API message for `/api/chat`.
#[derive(Serialize, Deserialize, Clone)]
struct ChatMessage {
    role: String,
    content: String,
    /// Base64-encoded images attached to the message.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    images: Vec<String>,
}

#[derive(Serialize)]
struct ChatOptions {
    temperature: f32,
}

/// Request payload for the Ollama `/api/chat` endpoint.
#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    /// JSON schema the reply must conform to.
    format: JsonValue,
    options: ChatOptions,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ChatMessage,
}

#[async_trait]
impl ExtractionBackend for OllamaBackend {
    #[instrument(skip(self, data), fields(subsystem = "inference", component = "ollama", op = "extract", model = %self.vision_model, size_bytes = data.len()))]
    async fn extract(&self, data: &[u8], mime_type: &str) -> Result<ExtractedBill> {
        let start = Instant::now();
        if !mime_type.starts_with("image/") {
            return Err(Error::Extraction(format!(
                "Ollama vision models accept images only, got {}",
                mime_type
            )));
        }

        let request = ChatRequest {
            model: self.vision_model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: EXTRACTION_PROMPT.to_string(),
                images: vec![base64::engine::general_purpose::STANDARD.encode(data)],
            }],
            stream: false,
            format: self.response_schema.clone(),
            options: ChatOptions {
                temperature: self.temperature,
            },
        };

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .timeout(self.extract_timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Timeout(format!("Ollama request timed out: {}", e))
                } else {
                    Error::Extraction(format!("Request failed: {}", e))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Extraction(format!(
                "Ollama returned {}: {}",
                status, body
            )));
        }

        let result: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::Extraction(format!("Failed to parse response: {}", e)))?;
        let bill = parse_extraction(&result.message.content)?;

        let elapsed = start.elapsed().as_millis() as u64;
        debug!(
            duration_ms = elapsed,
            line_items = bill.line_items.len(),
            "Extraction complete"
        );
        if elapsed > 30000 {
            warn!(duration_ms = elapsed, slow = true, "Slow extraction operation");
        }
        Ok(bill)
    }

    fn model_name(&self) -> &str {
        &self.vision_model
    }
}

#[async_trait]
impl EmbeddingBackend for OllamaBackend {
    #[instrument(skip(self, texts), fields(subsystem = "inference", component = "ollama", op = "embed_texts", model = %self.embed_model, input_count = texts.len()))]
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vector>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let start = Instant::now();

        let request = EmbeddingRequest {
            model: self.embed_model.clone(),
            input: texts.to_vec(),
        };

        let response = self
            .client
            .post(format!("{}/api/embed", self.base_url))
            .timeout(self.embed_timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Timeout(format!("Ollama request timed out: {}", e))
                } else {
                    Error::Embedding(format!("Request failed: {}", e))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Embedding(format!(
                "Ollama returned {}: {}",
                status, body
            )));
        }

        let result: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| Error::Embedding(format!("Failed to parse response: {}", e)))?;

        let vectors: Vec<Vector> = result.embeddings.into_iter().map(Vector::from).collect();
        let elapsed = start.elapsed().as_millis() as u64;

        debug!(
            result_count = vectors.len(),
            duration_ms = elapsed,
            "Embedding complete"
        );
        if elapsed > 5000 {
            warn!(
                duration_ms = elapsed,
                input_count = texts.len(),
                slow = true,
                "Slow embedding operation"
            );
        }
        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.embed_model
    }
}
