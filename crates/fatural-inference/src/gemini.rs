//! Google Gemini backend (Generative Language REST API).
//!
//! Extraction uses `generateContent` with the document inlined as base64 and
//! a JSON response schema; fingerprints use `batchEmbedContents`.

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

/// Header carrying the API key.
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Gemini backend for extraction and embeddings.
pub struct GeminiBackend {
    client: Client,
    base_url: String,
    api_key: String,
    extract_model: String,
    embed_model: String,
    dimension: usize,
    temperature: f32,
    extract_timeout: Duration,
    embed_timeout: Duration,
    response_schema: JsonValue,
}

impl GeminiBackend {
    /// Create a backend against the public endpoint with default models.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::with_config(
            defaults::GEMINI_URL.to_string(),
            api_key.into(),
            defaults::GEMINI_EXTRACT_MODEL.to_string(),
            defaults::GEMINI_EMBED_MODEL.to_string(),
            defaults::EMBED_DIMENSION,
        )
    }

    /// Create a backend with custom configuration.
    pub fn with_config(
        base_url: String,
        api_key: String,
        extract_model: String,
        embed_model: String,
        dimension: usize,
    ) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config("GOOGLE_AI_API_KEY is not set".to_string()));
        }
        let client = Client::builder()
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        info!(
            subsystem = "inference",
            component = "gemini",
            base_url = %base_url,
            extract_model = %extract_model,
            embed_model = %embed_model,
            "Initializing Gemini backend"
        );

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            extract_model,
            embed_model,
            dimension,
            temperature: defaults::EXTRACTION_TEMPERATURE,
            extract_timeout: Duration::from_secs(defaults::EXTRACT_TIMEOUT_SECS),
            embed_timeout: Duration::from_secs(defaults::EMBED_TIMEOUT_SECS),
            response_schema: extraction_schema(),
        })
    }

    /// Create from environment variables.
    ///
    /// Requires `GOOGLE_AI_API_KEY`; everything else has a default.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("GOOGLE_AI_API_KEY").unwrap_or_default();
        let base_url =
            std::env::var("GEMINI_BASE_URL").unwrap_or_else(|_| defaults::GEMINI_URL.to_string());
        let extract_model = std::env::var("GEMINI_EXTRACT_MODEL")
            .unwrap_or_else(|_| defaults::GEMINI_EXTRACT_MODEL.to_string());
        let embed_model = std::env::var("GEMINI_EMBED_MODEL")
            .unwrap_or_else(|_| defaults::GEMINI_EMBED_MODEL.to_string());
        let dimension = std::env::var(defaults::ENV_EMBED_DIMENSION)
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults::EMBED_DIMENSION);
        let temperature = std::env::var("EXTRACTION_TEMPERATURE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults::EXTRACTION_TEMPERATURE);

        Ok(
            Self::with_config(base_url, api_key, extract_model, embed_model, dimension)?
                .with_temperature(temperature),
        )
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

    fn model_url(&self, model: &str, method: &str) -> String {
        format!("{}/models/{}:{}", self.base_url, model, method)
    }

    fn build_generate_request(&self, data: &[u8], mime_type: &str) -> GenerateRequest {
        let encoded = base64::engine::general_purpose::STANDARD.encode(data);
        GenerateRequest {
            contents: vec![Content {
                role: "user".to_string(),
                parts: vec![
                    Part::Text {
                        text: EXTRACTION_PROMPT.to_string(),
                    },
                    Part::InlineData {
                        inline_data: InlineData {
                            mime_type: mime_type.to_string(),
                            data: encoded,
                        },
                    },
                ],
            }],
            generation_config: GenerationConfig {
                temperature: self.temperature,
                top_p: 0.95,
                top_k: 40,
                max_output_tokens: defaults::EXTRACTION_MAX_OUTPUT_TOKENS,
                response_mime_type: "application/json".to_string(),
                response_json_schema: self.response_schema.clone(),
            },
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part {
    Text { text: String },
    InlineData { inline_data: InlineData },
}

#[derive(Serialize)]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: u32,
    max_output_tokens: u32,
    response_mime_type: String,
    response_json_schema: JsonValue,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

impl GenerateResponse {
    fn text(self) -> Option<String> {
        let text: String = self
            .candidates
            .into_iter()
            .next()?
            .content?
            .parts
            .into_iter()
            .filter_map(|p| p.text)
            .collect();
        (!text.trim().is_empty()).then_some(text)
    }
}

#[derive(Serialize)]
struct BatchEmbedRequest {
    requests: Vec<EmbedRequest>,
}

#[derive(Serialize)]
struct EmbedRequest {
    model: String,
    content: EmbedContent,
}

#[derive(Serialize)]
struct EmbedContent {
    parts: Vec<EmbedPart>,
}

#[derive(Serialize)]
struct EmbedPart {
    text: String,
}

#[derive(Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<EmbeddingValues>,
}

#[derive(Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

fn request_error(wrap: fn(String) -> Error, e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(format!("Gemini request timed out: {}", e))
    } else {
        wrap(format!("Request failed: {}", e))
    }
}

#[async_trait]
impl ExtractionBackend for GeminiBackend {
    #[instrument(skip(self, data), fields(subsystem = "inference", component = "gemini", op = "extract", model = %self.extract_model, size_bytes = data.len()))]
    async fn extract(&self, data: &[u8], mime_type: &str) -> Result<ExtractedBill> {
        let start = Instant::now();
        let request = self.build_generate_request(data, mime_type);

        let response = self
            .client
            .post(self.model_url(&self.extract_model, "generateContent"))
            .header(API_KEY_HEADER, &self.api_key)
            .timeout(self.extract_timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| request_error(Error::Extraction, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Extraction(format!(
                "Gemini returned {}: {}",
                status, body
            )));
        }

        let result: GenerateResponse = response
            .json()
            .await
            .map_err(|e| Error::Extraction(format!("Failed to parse response: {}", e)))?;
        let text = result
            .text()
            .ok_or_else(|| Error::Extraction("Empty response from Gemini".to_string()))?;
        let bill = parse_extraction(&text)?;

        let elapsed = start.elapsed().as_millis() as u64;
        debug!(
            duration_ms = elapsed,
            line_items = bill.line_items.len(),
            confidence = bill.confidence_score,
            "Extraction complete"
        );
        if elapsed > 30000 {
            warn!(duration_ms = elapsed, slow = true, "Slow extraction operation");
        }
        Ok(bill)
    }

    fn model_name(&self) -> &str {
        &self.extract_model
    }
}

#[async_trait]
impl EmbeddingBackend for GeminiBackend {
    #[instrument(skip(self, texts), fields(subsystem = "inference", component = "gemini", op = "embed_texts", model = %self.embed_model, input_count = texts.len()))]
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vector>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        let start = Instant::now();

        let model = format!("models/{}", self.embed_model);
        let request = BatchEmbedRequest {
            requests: texts
                .iter()
                .map(|t| EmbedRequest {
                    model: model.clone(),
                    content: EmbedContent {
                        parts: vec![EmbedPart { text: t.clone() }],
                    },
                })
                .collect(),
        };

        let response = self
            .client
            .post(self.model_url(&self.embed_model, "batchEmbedContents"))
            .header(API_KEY_HEADER, &self.api_key)
            .timeout(self.embed_timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| request_error(Error::Embedding, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Embedding(format!(
                "Gemini returned {}: {}",
                status, body
            )));
        }

        let result: BatchEmbedResponse = response
            .json()
            .await
            .map_err(|e| Error::Embedding(format!("Failed to parse response: {}", e)))?;
        if result.embeddings.len() != texts.len() {
            return Err(Error::Embedding(format!(
                "Gemini returned {} embeddings for {} inputs",
                result.embeddings.len(),
                texts.len()
            )));
        }

        let vectors: Vec<Vector> = result
            .embeddings
            .into_iter()
            .map(|e| Vector::from(e.values))
            .collect();
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

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn backend(server: &MockServer) -> GeminiBackend {
        GeminiBackend::with_config(
            server.uri(),
            "test-key".to_string(),
            "gemini-test".to_string(),
            "embed-test".to_string(),
            3,
        )
        .unwrap()
    }

    fn candidate(text: &str) -> JsonValue {
        json!({ "candidates": [{ "content": { "parts": [{ "text": text }] } }] })
    }

    #[test]
    fn test_requires_api_key() {
        let err = GeminiBackend::with_config(
            "http://x".to_string(),
            String::new(),
            "m".to_string(),
            "e".to_string(),
            3,
        )
        .err()
        .unwrap();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_generate_request_shape() {
        let backend = GeminiBackend::with_config(
            "http://x".to_string(),
            "k".to_string(),
            "m".to_string(),
            "e".to_string(),
            3,
        )
        .unwrap();
        let request = backend.build_generate_request(b"abc", "image/png");
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["contents"][0]["parts"][1]["inline_data"]["data"], "YWJj");
        assert_eq!(
            json["contents"][0]["parts"][1]["inline_data"]["mime_type"],
            "image/png"
        );
        assert_eq!(
            json["generationConfig"]["responseMimeType"],
            "application/json"
        );
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 2048);
        assert!((json["generationConfig"]["temperature"].as_f64().unwrap() - 0.1).abs() < 1e-6);
        assert_eq!(
            json["generationConfig"]["responseJsonSchema"]["type"],
            "object"
        );
    }

    #[tokio::test]
    async fn test_extract_parses_candidate_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-test:generateContent"))
            .and(header("x-goog-api-key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(candidate(
                r#"{"vendor_name":"ShopCo","bill_number":"Market-001","total_amount":25.0,"confidence_score":0.97}"#,
            )))
            .mount(&server)
            .await;

        let bill = backend(&server).extract(b"img", "image/jpeg").await.unwrap();
        assert_eq!(bill.vendor_name, "ShopCo");
        assert_eq!(bill.bill_number.as_deref(), Some("Market-001"));
        assert_eq!(bill.total_amount, 25.0);
    }

    #[tokio::test]
    async fn test_extract_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("quota"))
            .mount(&server)
            .await;

        let err = backend(&server).extract(b"img", "image/jpeg").await.unwrap_err();
        assert!(matches!(err, Error::Extraction(ref m) if m.contains("429")));
    }

    #[tokio::test]
    async fn test_extract_empty_candidates() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "candidates": [] })))
            .mount(&server)
            .await;

        let err = backend(&server).extract(b"img", "image/jpeg").await.unwrap_err();
        assert!(matches!(err, Error::Extraction(_)));
    }

    #[tokio::test]
    async fn test_extract_timeout_maps_to_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(candidate("{}"))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let backend = backend(&server)
            .with_timeouts(Duration::from_millis(50), Duration::from_millis(50));
        let err = backend.extract(b"img", "image/jpeg").await.unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
    }

    #[tokio::test]
    async fn test_embed_texts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/embed-test:batchEmbedContents"))
            .and(body_partial_json(json!({
                "requests": [{ "model": "models/embed-test", "content": { "parts": [{ "text": "Vendor: ShopCo" }] } }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "embeddings": [{ "values": [0.1, 0.2, 0.3] }]
            })))
            .mount(&server)
            .await;

        let vectors = backend(&server)
            .embed_texts(&["Vendor: ShopCo".to_string()])
            .await
            .unwrap();
        assert_eq!(vectors.len(), 1);
        assert_eq!(vectors[0].as_slice(), &[0.1, 0.2, 0.3]);
    }

    #[tokio::test]
    async fn test_embed_count_mismatch() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "embeddings": [] })))
            .mount(&server)
            .await;

        let err = backend(&server)
            .embed_texts(&["a".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Embedding(_)));
    }
}
