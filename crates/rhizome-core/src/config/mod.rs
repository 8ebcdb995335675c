//! Analyzer configuration
//!
//! Sources, lowest to highest precedence: built-in defaults, a JSON file,
//! then `RHIZOME_*` environment variables.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::backend::{BackendCommand, ClientTimeouts, Deadline, PoolSettings};
use crate::resolve::DispatchPolicy;
use crate::scanner::LanguageTag;

const ENV_PREFIX: &str = "RHIZOME_";
const ENV_BACKEND_PREFIX: &str = "RHIZOME_BACKEND_";

/// Configuration for an analysis run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    /// Concurrent in-flight requests per language backend
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Bound on spawn + initialize + indexing wait
    #[serde(default = "default_startup_timeout_ms")]
    pub startup_timeout_ms: u64,
    #[serde(default = "default_indexing_timeout_ms")]
    pub indexing_timeout_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_max_consecutive_timeouts")]
    pub max_consecutive_timeouts: u32,
    #[serde(default = "default_max_restarts")]
    pub max_restarts: u32,
    /// Run-level deadline; unbounded when absent
    #[serde(default)]
    pub run_deadline_ms: Option<u64>,
    /// Names exempt from orphan detection; `prefix*` matches a prefix
    #[serde(default = "default_entry_points")]
    pub entry_points: Vec<String>,
    #[serde(default)]
    pub dispatch_policy: DispatchPolicy,
    /// Detect re-export aliases with definition probes
    #[serde(default = "default_true")]
    pub probe_reexports: bool,
    /// Emit inherit/implement edges from supertypes
    #[serde(default = "default_true")]
    pub type_hierarchy: bool,
    /// Per-language backend command overrides
    #[serde(default)]
    pub backends: BTreeMap<LanguageTag, BackendCommand>,
}

fn default_max_in_flight() -> usize {
    6
}
fn default_request_timeout_ms() -> u64 {
    30_000
}
fn default_startup_timeout_ms() -> u64 {
    60_000
}
fn default_indexing_timeout_ms() -> u64 {
    30_000
}
fn default_max_retries() -> u32 {
    2
}
fn default_retry_backoff_ms() -> u64 {
    200
}
fn default_max_consecutive_timeouts() -> u32 {
    3
}
fn default_max_restarts() -> u32 {
    1
}
fn default_entry_points() -> Vec<String> {
    vec!["main".to_string(), "__main__".to_string()]
}
fn default_true() -> bool {
    true
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            max_in_flight: default_max_in_flight(),
            request_timeout_ms: default_request_timeout_ms(),
            startup_timeout_ms: default_startup_timeout_ms(),
            indexing_timeout_ms: default_indexing_timeout_ms(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            max_consecutive_timeouts: default_max_consecutive_timeouts(),
            max_restarts: default_max_restarts(),
            run_deadline_ms: None,
            entry_points: default_entry_points(),
            dispatch_policy: DispatchPolicy::default(),
            probe_reexports: true,
            type_hierarchy: true,
            backends: BTreeMap::new(),
        }
    }
}

impl AnalyzerConfig {
    /// Load a JSON configuration file; missing fields take their defaults
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    /// Apply `RHIZOME_*` overrides from the process environment
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(std::env::vars())
    }

    /// Apply `RHIZOME_*` overrides from the given variables
    ///
    /// Invalid values are ignored with a warning.
    #[must_use]
    pub fn with_overrides<I>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            if let Some(tag) = key.strip_prefix(ENV_BACKEND_PREFIX) {
                match parse_command(&value) {
                    Some(command) => {
                        self.backends.insert(LanguageTag::new(tag), command);
                    }
                    None => tracing::warn!("Ignoring empty {}", key),
                }
                continue;
            }

            let Some(name) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let applied = match name {
                "MAX_IN_FLIGHT" => parse_into(&value, &mut self.max_in_flight),
                "REQUEST_TIMEOUT_MS" => parse_into(&value, &mut self.request_timeout_ms),
                "RUN_DEADLINE_MS" => value
                    .trim()
                    .parse()
                    .map(|ms| self.run_deadline_ms = Some(ms))
                    .is_ok(),
                _ => true,
            };
            if !applied {
                tracing::warn!("Ignoring invalid {}={:?}", key, value);
            }
        }
        self
    }

    pub(crate) fn client_timeouts(&self) -> ClientTimeouts {
        ClientTimeouts {
            request: Duration::from_millis(self.request_timeout_ms),
            startup: Duration::from_millis(self.startup_timeout_ms),
            indexing: Duration::from_millis(self.indexing_timeout_ms),
        }
    }

    pub(crate) fn pool_settings(&self) -> PoolSettings {
        PoolSettings {
            max_retries: self.max_retries,
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
            max_consecutive_timeouts: self.max_consecutive_timeouts,
            max_restarts: self.max_restarts,
        }
    }

    pub(crate) fn deadline(&self) -> Deadline {
        Deadline::from_millis(self.run_deadline_ms)
    }

    /// In-flight limit, never below one
    pub(crate) fn in_flight(&self) -> usize {
        self.max_in_flight.max(1)
    }
}

fn parse_into<T: std::str::FromStr>(value: &str, slot: &mut T) -> bool {
    match value.trim().parse() {
        Ok(parsed) => {
            *slot = parsed;
            true
        }
        Err(_) => false,
    }
}

/// Split `"command arg1 arg2"` on whitespace
fn parse_command(value: &str) -> Option<BackendCommand> {
    let mut parts = value.split_whitespace();
    let command = parts.next()?;
    Some(BackendCommand::new(command).with_args(parts))
}
