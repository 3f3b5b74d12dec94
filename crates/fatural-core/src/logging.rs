//! Structured logging field names shared by every fatural crate.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Pipeline-fatal failure, bill marked failed |
//! | WARN  | Fallback applied, job dropped, slow external call |
//! | INFO  | Lifecycle events, terminal outcomes |
//! | DEBUG | Decision points, intermediate values, config choices |
//! | TRACE | Per-message queue traffic |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event.
/// Values: "db", "inference", "jobs", "queue", "storage", "worker"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "gemini", "ollama", "detector", "orchestrator", "pubsub"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "extract", "embed", "find_duplicate", "commit_completed"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Bill UUID being processed.
pub const BILL_ID: &str = "bill_id";

/// Tenant (company) UUID scoping every lookup.
pub const COMPANY_ID: &str = "company_id";

/// Broker-assigned message identifier.
pub const MESSAGE_ID: &str = "message_id";

/// Object storage key of the uploaded document.
pub const STORAGE_PATH: &str = "storage_path";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Size in bytes of a blob or payload.
pub const SIZE_BYTES: &str = "size_bytes";

/// Cosine similarity of the nearest candidate.
pub const SIMILARITY: &str = "similarity";

/// Model-reported extraction confidence.
pub const CONFIDENCE: &str = "confidence";

/// Number of jobs currently in flight.
pub const IN_FLIGHT: &str = "in_flight";

// ─── Inference fields ──────────────────────────────────────────────────────

/// Model name used for inference.
pub const MODEL: &str = "model";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Terminal bill status reached.
pub const OUTCOME: &str = "outcome";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";

/// Slow operation threshold exceeded.
pub const SLOW: &str = "slow";
