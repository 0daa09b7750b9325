//! Configuration system (layered: defaults < config file < env < code).

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bon::Builder;
use serde::Deserialize;

use crate::agent_loop::backoff::PollIntervalPolicy;
use crate::error::{AgentRunError, Result};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_QUEUED_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_MAX_RUN_RETRIES: u32 = 2;
const DEFAULT_MAX_POLL_ITERATIONS: u32 = 300;
const DEFAULT_TRANSPORT_ATTEMPTS: u32 = 3;

const ENV_ENDPOINT: &str = "AGENTRUN_ENDPOINT";
const ENV_API_KEY: &str = "AGENTRUN_API_KEY";
const ENV_API_VERSION: &str = "AGENTRUN_API_VERSION";
const ENV_REQUEST_TIMEOUT_SECS: &str = "AGENTRUN_REQUEST_TIMEOUT_SECS";
const ENV_QUEUED_TIMEOUT_SECS: &str = "AGENTRUN_QUEUED_TIMEOUT_SECS";
const ENV_MAX_RUN_RETRIES: &str = "AGENTRUN_MAX_RUN_RETRIES";
const ENV_MAX_POLL_ITERATIONS: &str = "AGENTRUN_MAX_POLL_ITERATIONS";

/// Limits for a single `execute` call.
#[derive(Debug, Clone, Builder)]
pub struct RunConfig {
    /// How long a run may stay queued before it is cancelled and recreated.
    #[builder(default = DEFAULT_QUEUED_TIMEOUT)]
    pub queued_timeout: Duration,
    /// Recreations allowed after the first attempt gets stuck.
    #[builder(default = DEFAULT_MAX_RUN_RETRIES)]
    pub max_run_retries: u32,
    /// Total polls allowed across every attempt.
    #[builder(default = DEFAULT_MAX_POLL_ITERATIONS)]
    pub max_poll_iterations: u32,
    /// Attempts per remote call before a transport error surfaces.
    #[builder(default = DEFAULT_TRANSPORT_ATTEMPTS)]
    pub transport_attempts: u32,
    #[builder(default)]
    pub poll_interval: PollIntervalPolicy,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Orchestrator-wide settings, read once at construction.
#[derive(Clone)]
pub struct OrchestratorConfig {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub api_version: Option<String>,
    pub request_timeout: Duration,
    pub run: RunConfig,
}

impl fmt::Debug for OrchestratorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrchestratorConfig")
            .field("endpoint", &self.endpoint)
            .field("api_key", &self.api_key.as_ref().map(|_| ".."))
            .field("api_version", &self.api_version)
            .field("request_timeout", &self.request_timeout)
            .field("run", &self.run)
            .finish()
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            api_version: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            run: RunConfig::default(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    endpoint: Option<String>,
    api_key: Option<String>,
    api_version: Option<String>,
    request_timeout_secs: Option<u64>,
    #[serde(default)]
    run: FileRunConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileRunConfig {
    queued_timeout_secs: Option<u64>,
    max_run_retries: Option<u32>,
    max_poll_iterations: Option<u32>,
    transport_attempts: Option<u32>,
}

impl OrchestratorConfig {
    /// Load defaults, then `path` (or the default file if it exists), then env.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();
        match path {
            Some(path) => config.apply_file(path)?,
            None => {
                let default_path = default_config_path();
                if default_path.exists() {
                    config.apply_file(&default_path)?;
                }
            }
        }
        config.with_env()
    }

    /// Load from environment variables only (`.env` is honoured).
    pub fn from_env() -> Result<Self> {
        Self::default().with_env()
    }

    fn with_env(mut self) -> Result<Self> {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        self.apply_env(|key| std::env::var(key).ok())?;
        Ok(self)
    }

    /// Overlay a TOML file.
    pub fn apply_file(&mut self, path: &Path) -> Result<()> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AgentRunError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        self.apply_toml(&raw)
            .map_err(|e| AgentRunError::Configuration(format!("{}: {e}", path.display())))
    }

    /// Overlay TOML text.
    pub fn apply_toml(&mut self, raw: &str) -> std::result::Result<(), toml::de::Error> {
        let file: FileConfig = toml::from_str(raw)?;
        if file.endpoint.is_some() {
            self.endpoint = file.endpoint;
        }
        if file.api_key.is_some() {
            self.api_key = file.api_key;
        }
        if file.api_version.is_some() {
            self.api_version = file.api_version;
        }
        if let Some(secs) = file.request_timeout_secs {
            self.request_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = file.run.queued_timeout_secs {
            self.run.queued_timeout = Duration::from_secs(secs);
        }
        if let Some(n) = file.run.max_run_retries {
            self.run.max_run_retries = n;
        }
        if let Some(n) = file.run.max_poll_iterations {
            self.run.max_poll_iterations = n;
        }
        if let Some(n) = file.run.transport_attempts {
            self.run.transport_attempts = n;
        }
        Ok(())
    }

    /// Overlay values from an environment lookup.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(endpoint) = lookup(ENV_ENDPOINT) {
            self.endpoint = Some(endpoint);
        }
        if let Some(key) = lookup(ENV_API_KEY) {
            self.api_key = Some(key);
        }
        if let Some(version) = lookup(ENV_API_VERSION) {
            self.api_version = Some(version);
        }
        if let Some(secs) = parse_env::<u64>(&lookup, ENV_REQUEST_TIMEOUT_SECS)? {
            self.request_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_env::<u64>(&lookup, ENV_QUEUED_TIMEOUT_SECS)? {
            self.run.queued_timeout = Duration::from_secs(secs);
        }
        if let Some(n) = parse_env(&lookup, ENV_MAX_RUN_RETRIES)? {
            self.run.max_run_retries = n;
        }
        if let Some(n) = parse_env(&lookup, ENV_MAX_POLL_ITERATIONS)? {
            self.run.max_poll_iterations = n;
        }
        Ok(())
    }

    /// Endpoint, or a configuration error naming how to set it.
    pub fn require_endpoint(&self) -> Result<&str> {
        self.endpoint.as_deref().filter(|e| !e.trim().is_empty()).ok_or_else(|| {
            AgentRunError::Configuration(format!(
                "no endpoint configured; set {ENV_ENDPOINT} or `endpoint` in the config file"
            ))
        })
    }
}

fn parse_env<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|_| {
            AgentRunError::Configuration(format!("{key} must be a non-negative integer, got {raw:?}"))
        }),
    }
}

/// `~/.agentrun/config.toml`
pub fn default_config_path() -> PathBuf {
    directories::UserDirs::new()
        .map(|dirs| dirs.home_dir().join(".agentrun"))
        .unwrap_or_else(|| PathBuf::from(".agentrun"))
        .join("config.toml")
}
