//! Backend selection from configuration.

use std::str::FromStr;
use std::sync::Arc;

use tracing::info;

use fatural_core::{EmbeddingBackend, Error, ExtractionBackend, Result};

/// Which AI service backs extraction and embeddings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InferenceProvider {
    #[default]
    Gemini,
    Ollama,
}

impl InferenceProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gemini => "gemini",
            Self::Ollama => "ollama",
        }
    }

    /// Provider from `INFERENCE_PROVIDER`, defaulting to Gemini.
    pub fn from_env() -> Result<Self> {
        match std::env::var("INFERENCE_PROVIDER") {
            Ok(v) if !v.trim().is_empty() => v.parse(),
            _ => Ok(Self::default()),
        }
    }
}

impl FromStr for InferenceProvider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gemini" | "google" => Ok(Self::Gemini),
            "ollama" => Ok(Self::Ollama),
            other => Err(Error::Config(format!(
                "Unknown inference provider: {} (expected gemini or ollama)",
                other
            ))),
        }
    }
}

impl std::fmt::Display for InferenceProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Extraction and embedding backends sharing one provider.
pub struct Backends {
    pub extraction: Arc<dyn ExtractionBackend>,
    pub embedding: Arc<dyn EmbeddingBackend>,
}

/// Build both backends for `provider` from the environment.
pub fn backends_from_env(provider: InferenceProvider) -> Result<Backends> {
    let backends = match provider {
        #[cfg(feature = "gemini")]
        InferenceProvider::Gemini => {
            let backend = Arc::new(crate::gemini::GeminiBackend::from_env()?);
            Backends {
                extraction: backend.clone(),
                embedding: backend,
            }
        }
        #[cfg(feature = "ollama")]
        InferenceProvider::Ollama => {
            let backend = Arc::new(crate::ollama::OllamaBackend::from_env()?);
            Backends {
                extraction: backend.clone(),
                embedding: backend,
            }
        }
        #[allow(unreachable_patterns)]
        other => {
            return Err(Error::Config(format!(
                "Provider {} is not compiled into this build",
                other
            )))
        }
    };

    info!(
        subsystem = "inference",
        provider = %provider,
        extract_model = %backends.extraction.model_name(),
        embed_model = %backends.embedding.model_name(),
        "Inference backends ready"
    );
    Ok(backends)
}
