//! Pipeline configuration.

use std::time::Duration;

use fatural_core::defaults;

/// Tunables for one orchestrator instance.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Similarity at or above which a bill is a duplicate. Always in [0, 1].
    pub duplicate_threshold: f64,
    /// Expected fingerprint length.
    pub embed_dimension: usize,
    pub blob_timeout: Duration,
    pub extract_timeout: Duration,
    pub embed_timeout: Duration,
    pub search_timeout: Duration,
    pub commit_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            duplicate_threshold: defaults::DUPLICATE_THRESHOLD,
            embed_dimension: defaults::EMBED_DIMENSION,
            blob_timeout: Duration::from_secs(defaults::BLOB_TIMEOUT_SECS),
            extract_timeout: Duration::from_secs(defaults::EXTRACT_TIMEOUT_SECS),
            embed_timeout: Duration::from_secs(defaults::EMBED_TIMEOUT_SECS),
            search_timeout: Duration::from_secs(defaults::SEARCH_TIMEOUT_SECS),
            commit_timeout: Duration::from_secs(defaults::COMMIT_TIMEOUT_SECS),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

fn env_secs(name: &str, default: u64) -> Duration {
    Duration::from_secs(env_parse::<u64>(name).unwrap_or(default).max(1))
}

impl PipelineConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `DUPLICATE_THRESHOLD` | `0.95` | Duplicate similarity cut-off |
    /// | `EMBED_DIMENSION` | `768` | Fingerprint length; must equal `bills.fingerprint` (`vector(768)`), checked at startup |
    /// | `BLOB_TIMEOUT_SECS` | `30` | Blob download |
    /// | `EXTRACT_TIMEOUT_SECS` | `120` | Extraction call |
    /// | `EMBED_TIMEOUT_SECS` | `30` | Embedding call |
    /// | `SEARCH_TIMEOUT_SECS` | `10` | Nearest-neighbour query |
    /// | `COMMIT_TIMEOUT_SECS` | `10` | Lifecycle commit |
    pub fn from_env() -> Self {
        let base = Self::default();
        Self {
            duplicate_threshold: env_parse::<f64>(defaults::ENV_DUPLICATE_THRESHOLD)
                .filter(|t| t.is_finite())
                .unwrap_or(base.duplicate_threshold)
                .clamp(0.0, 1.0),
            embed_dimension: env_parse::<usize>(defaults::ENV_EMBED_DIMENSION)
                .filter(|d| *d > 0)
                .unwrap_or(base.embed_dimension),
            blob_timeout: env_secs(defaults::ENV_BLOB_TIMEOUT_SECS, defaults::BLOB_TIMEOUT_SECS),
            extract_timeout: env_secs(
                defaults::ENV_EXTRACT_TIMEOUT_SECS,
                defaults::EXTRACT_TIMEOUT_SECS,
            ),
            embed_timeout: env_secs(defaults::ENV_EMBED_TIMEOUT_SECS, defaults::EMBED_TIMEOUT_SECS),
            search_timeout: env_secs(
                defaults::ENV_SEARCH_TIMEOUT_SECS,
                defaults::SEARCH_TIMEOUT_SECS,
            ),
            commit_timeout: env_secs(
                defaults::ENV_COMMIT_TIMEOUT_SECS,
                defaults::COMMIT_TIMEOUT_SECS,
            ),
        }
    }

    /// Set the duplicate threshold, clamped to [0, 1].
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.duplicate_threshold = if threshold.is_finite() {
            threshold.clamp(0.0, 1.0)
        } else {
            defaults::DUPLICATE_THRESHOLD
        };
        self
    }

    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.embed_dimension = dimension;
        self
    }

    /// Apply one timeout to every external call.
    pub fn with_uniform_timeout(mut self, timeout: Duration) -> Self {
        self.blob_timeout = timeout;
        self.extract_timeout = timeout;
        self.embed_timeout = timeout;
        self.search_timeout = timeout;
        self.commit_timeout = timeout;
        self
    }

    pub fn with_extract_timeout(mut self, timeout: Duration) -> Self {
        self.extract_timeout = timeout;
        self
    }

    pub fn with_blob_timeout(mut self, timeout: Duration) -> Self {
        self.blob_timeout = timeout;
        self
    }
}
