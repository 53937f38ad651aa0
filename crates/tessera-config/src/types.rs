//! Configuration types for Tessera.
//!
//! Every struct implements [`Default`] with the same values as the embedded
//! `defaults.toml`, so a bare `[section]` header produces a working
//! configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Ledger storage and verification.
    pub ledger: LedgerSection,
    /// Submission to the authority.
    pub remision: RemisionSection,
    /// Logging level, format, and per-crate directives.
    pub logging: LoggingSection,
}

// ---------------------------------------------------------------------------
// LedgerSection
// ---------------------------------------------------------------------------

/// Where chains live and how they are verified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerSection {
    /// Data directory. A leading `~/` expands to the home directory.
    pub data_dir: String,
    /// Records read per page while verifying.
    pub verify_page_size: usize,
}

impl Default for LedgerSection {
    fn default() -> Self {
        Self {
            data_dir: "~/.tessera/ledger".to_owned(),
            verify_page_size: 512,
        }
    }
}

impl LedgerSection {
    /// The data directory with `~/` expanded against `home`.
    #[must_use]
    pub fn resolve_data_dir(&self, home: &Path) -> PathBuf {
        match self.data_dir.strip_prefix("~/") {
            Some(rest) => home.join(rest),
            None if self.data_dir == "~" => home.to_path_buf(),
            None => PathBuf::from(&self.data_dir),
        }
    }
}

// ---------------------------------------------------------------------------
// RemisionSection
// ---------------------------------------------------------------------------

/// Authority endpoint, batching, retry and throttling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemisionSection {
    /// Submission endpoint. Submission is disabled while unset.
    pub endpoint: Option<String>,
    /// Name of the environment variable holding the bearer token. The token
    /// itself is never stored in a config file.
    pub api_token_env: String,
    /// Maximum records per batch.
    pub max_batch_size: usize,
    /// Attempts per batch, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds.
    pub backoff_base_ms: u64,
    /// Upper bound on any retry delay, in milliseconds.
    pub backoff_max_ms: u64,
    /// Randomize retry delays.
    pub backoff_jitter: bool,
    /// Per-attempt timeout, in seconds.
    pub request_timeout_secs: u64,
    /// Minimum interval between submissions of one chain, in seconds.
    pub flow_control_secs: u64,
    /// Consecutive failed cycles that open the circuit.
    pub circuit_breaker_threshold: u32,
    /// How long an open circuit pauses submissions, in seconds.
    pub circuit_breaker_pause_secs: u64,
    /// Identifier of the submitting software.
    pub software_id: String,
    /// Version of the submitting software; defaults to the crate version.
    pub software_version: Option<String>,
}

impl Default for RemisionSection {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_token_env: "TESSERA_API_TOKEN".to_owned(),
            max_batch_size: 1000,
            max_attempts: 5,
            backoff_base_ms: 30_000,
            backoff_max_ms: 480_000,
            backoff_jitter: true,
            request_timeout_secs: 30,
            flow_control_secs: 60,
            circuit_breaker_threshold: 5,
            circuit_breaker_pause_secs: 300,
            software_id: "tessera".to_owned(),
            software_version: None,
        }
    }
}

impl RemisionSection {
    /// Delay before the first retry.
    #[must_use]
    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    /// Upper bound on any retry delay.
    #[must_use]
    pub fn backoff_max(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }

    /// Per-attempt timeout.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Minimum interval between submissions of one chain.
    #[must_use]
    pub fn flow_control(&self) -> Duration {
        Duration::from_secs(self.flow_control_secs)
    }

    /// Pause applied by an open circuit.
    #[must_use]
    pub fn circuit_breaker_pause(&self) -> Duration {
        Duration::from_secs(self.circuit_breaker_pause_secs)
    }
}

// ---------------------------------------------------------------------------
// LoggingSection
// ---------------------------------------------------------------------------

/// Logging and tracing configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Global log level filter (`"trace"`, `"debug"`, `"info"`, `"warn"`,
    /// `"error"`).
    pub level: String,
    /// Output format: `"pretty"`, `"compact"`, `"json"` or `"full"`.
    pub format: String,
    /// Per-crate tracing directives (e.g. `["tessera_remision=debug",
    /// "hyper=warn"]`).
    pub directives: Vec<String>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: "compact".to_owned(),
            directives: Vec::new(),
        }
    }
}
