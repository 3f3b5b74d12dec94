//! Centralized default constants for the fatural pipeline.
//!
//! Every environment-configurable knob falls back to a value defined here.

// =============================================================================
// DUPLICATE DETECTION
// =============================================================================

/// Cosine similarity at or above which a bill is declared a duplicate.
pub const DUPLICATE_THRESHOLD: f64 = 0.95;

/// Fingerprint dimensionality (text-embedding-004 and nomic-embed-text).
pub const EMBED_DIMENSION: usize = 768;

// =============================================================================
// EXTRACTION
// =============================================================================

/// Sampling temperature for extraction requests.
pub const EXTRACTION_TEMPERATURE: f32 = 0.1;

/// Maximum output tokens requested from the extraction model.
pub const EXTRACTION_MAX_OUTPUT_TOKENS: u32 = 2048;

/// Vendor name written into the sentinel record when extraction fails.
pub const FALLBACK_VENDOR_NAME: &str = "Extraction Failed";

/// Currency assumed when the model does not report one.
pub const DEFAULT_CURRENCY: &str = "EUR";

// =============================================================================
// INFERENCE BACKENDS
// =============================================================================

/// Public Gemini API endpoint.
pub const GEMINI_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default Gemini extraction model.
pub const GEMINI_EXTRACT_MODEL: &str = "gemini-2.0-flash";

/// Default Gemini embedding model (768-dim).
pub const GEMINI_EMBED_MODEL: &str = "text-embedding-004";

/// Default Ollama endpoint.
pub const OLLAMA_URL: &str = "http://127.0.0.1:11434";

/// Default Ollama vision model for extraction.
pub const OLLAMA_VISION_MODEL: &str = "qwen2.5vl:7b";

/// Default Ollama embedding model.
pub const OLLAMA_EMBED_MODEL: &str = "nomic-embed-text";

// =============================================================================
// TIMEOUTS
// =============================================================================

/// Blob download timeout (seconds).
pub const BLOB_TIMEOUT_SECS: u64 = 30;

/// Extraction request timeout (seconds).
pub const EXTRACT_TIMEOUT_SECS: u64 = 120;

/// Embedding request timeout (seconds).
pub const EMBED_TIMEOUT_SECS: u64 = 30;

/// Nearest-neighbour query timeout (seconds).
pub const SEARCH_TIMEOUT_SECS: u64 = 10;

/// Lifecycle commit timeout (seconds).
pub const COMMIT_TIMEOUT_SECS: u64 = 10;

// =============================================================================
// DELIVERY
// =============================================================================

/// Maximum jobs in flight at once.
pub const WORKER_MAX_IN_FLIGHT: usize = 10;

/// Maximum bytes of message payload in flight at once (10 MiB).
pub const WORKER_MAX_IN_FLIGHT_BYTES: usize = 10 * 1024 * 1024;

/// Messages requested per pull.
pub const WORKER_PULL_BATCH: usize = 10;

/// Sleep between empty pulls (milliseconds).
pub const WORKER_POLL_INTERVAL_MS: u64 = 1000;

/// Default pull subscription name.
pub const PUBSUB_SUBSCRIPTION: &str = "bill-upload-subscription";

/// Public Pub/Sub REST endpoint.
pub const PUBSUB_URL: &str = "https://pubsub.googleapis.com";

/// Worker event channel capacity.
pub const EVENT_BUS_CAPACITY: usize = 256;

// =============================================================================
// STORAGE
// =============================================================================

/// Default object storage bucket.
pub const GCS_BUCKET: &str = "fatural-bills";

/// Public Cloud Storage JSON API endpoint.
pub const GCS_URL: &str = "https://storage.googleapis.com";

/// Default root directory for the filesystem blob backend.
pub const BLOB_ROOT: &str = "./data/blobs";

// =============================================================================
// SERVER
// =============================================================================

/// Default push-endpoint port.
pub const SERVER_PORT: u16 = 8080;

/// Default database URL.
pub const DATABASE_URL: &str = "postgres://localhost/fatural";

// =============================================================================
// ENVIRONMENT VARIABLE NAMES
// =============================================================================

pub const ENV_DUPLICATE_THRESHOLD: &str = "DUPLICATE_THRESHOLD";
pub const ENV_EMBED_DIMENSION: &str = "EMBED_DIMENSION";
pub const ENV_BLOB_TIMEOUT_SECS: &str = "BLOB_TIMEOUT_SECS";
pub const ENV_EXTRACT_TIMEOUT_SECS: &str = "EXTRACT_TIMEOUT_SECS";
pub const ENV_EMBED_TIMEOUT_SECS: &str = "EMBED_TIMEOUT_SECS";
pub const ENV_SEARCH_TIMEOUT_SECS: &str = "SEARCH_TIMEOUT_SECS";
pub const ENV_COMMIT_TIMEOUT_SECS: &str = "COMMIT_TIMEOUT_SECS";
pub const ENV_WORKER_MAX_IN_FLIGHT: &str = "WORKER_MAX_IN_FLIGHT";
pub const ENV_WORKER_MAX_IN_FLIGHT_BYTES: &str = "WORKER_MAX_IN_FLIGHT_BYTES";
pub const ENV_WORKER_PULL_BATCH: &str = "WORKER_PULL_BATCH";
pub const ENV_WORKER_POLL_INTERVAL_MS: &str = "WORKER_POLL_INTERVAL_MS";
