//! # fatural-inference
//!
//! AI service backends for the fatural bill pipeline.
//!
//! This crate provides:
//! - Gemini backend (`generateContent` extraction, `text-embedding-004`)
//! - Ollama backend (vision-model extraction, local embeddings)
//! - The extraction prompt and the schema-constrained response format
//! - `ExtractionClient` / `EmbeddingClient`: timeouts and graceful fallbacks
//!
//! # Feature Flags
//!
//! - `gemini` (default): Gemini backend
//! - `ollama` (default): Ollama backend
//! - `mock`: deterministic mock backends for tests

pub mod client;
pub mod prompt;
pub mod provider;

#[cfg(feature = "gemini")]
pub mod gemini;

#[cfg(feature = "ollama")]
pub mod ollama;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use client::{EmbeddingClient, ExtractionClient};
pub use prompt::{extraction_schema, EXTRACTION_PROMPT};
pub use provider::{backends_from_env, Backends, InferenceProvider};

#[cfg(feature = "gemini")]
pub use gemini::GeminiBackend;

#[cfg(feature = "ollama")]
pub use ollama::OllamaBackend;

// Re-export core traits for convenience
pub use fatural_core::{EmbeddingBackend, ExtractionBackend};
