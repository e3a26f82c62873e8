//! Static mining configuration loaded from TOML.

use crate::error::{MinerError, MinerResult};
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// One entry of the automated-agent identifier table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentIdentifier {
    /// Lower-case name fragment matched against actor names
    pub identifier: String,
    /// Sub-type reported when the fragment matches
    pub label: String,
}

impl AgentIdentifier {
    pub fn new(identifier: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            label: label.into(),
        }
    }
}

/// Connectivity-aware retry settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    #[serde(default = "default_initial_backoff_secs")]
    pub initial_backoff_secs: u64,
    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,
    #[serde(default = "default_probe_host")]
    pub probe_host: String,
    #[serde(default = "default_probe_port")]
    pub probe_port: u16,
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
    /// Give up on an outage after this long; unset means wait forever
    #[serde(default)]
    pub outage_deadline_secs: Option<u64>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_backoff_secs: default_initial_backoff_secs(),
            max_backoff_secs: default_max_backoff_secs(),
            probe_host: default_probe_host(),
            probe_port: default_probe_port(),
            probe_timeout_secs: default_probe_timeout_secs(),
            outage_deadline_secs: None,
        }
    }
}

/// Hosting API settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GitHubConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Environment variable holding the access token
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default = "default_http_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            token_env: default_token_env(),
            timeout_secs: default_http_timeout_secs(),
            per_page: default_per_page(),
        }
    }
}

/// Commit-category classifier collaborator.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClassifierConfig {
    pub endpoint: String,
    #[serde(default = "default_classifier_timeout_secs")]
    pub timeout_secs: u64,
}

/// Configuration for a mining run.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MiningConfig {
    /// Start of the addition window.
    #[serde(default = "default_since")]
    pub since: DateTime<Utc>,
    /// End of the addition window.
    #[serde(default = "default_until")]
    pub until: DateTime<Utc>,
    /// Upper bound for per-file history.
    #[serde(default = "default_history_until")]
    pub history_until: Option<DateTime<Utc>>,
    /// Revisions walked per repository while looking for additions.
    #[serde(default = "default_max_revisions_scanned")]
    pub max_revisions_scanned: usize,
    /// Revisions inspected per file.
    #[serde(default = "default_revision_cap")]
    pub revision_cap: usize,
    /// Files sampled per authorship group.
    #[serde(default = "default_target_per_group")]
    pub target_per_group: usize,
    /// Base seed for sampling.
    #[serde(default)]
    pub seed: u64,
    /// Courtesy delay after each API call.
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,
    /// Repositories mined in parallel.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Entries kept in the run cache.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
    /// Automated-agent identifiers, in match priority order.
    #[serde(default = "default_agents")]
    pub agents: Vec<AgentIdentifier>,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub github: GitHubConfig,
    #[serde(default)]
    pub classifier: Option<ClassifierConfig>,
}

impl Default for MiningConfig {
    fn default() -> Self {
        Self {
            since: default_since(),
            until: default_until(),
            history_until: default_history_until(),
            max_revisions_scanned: default_max_revisions_scanned(),
            revision_cap: default_revision_cap(),
            target_per_group: default_target_per_group(),
            seed: 0,
            request_delay_ms: default_request_delay_ms(),
            concurrency: default_concurrency(),
            cache_capacity: default_cache_capacity(),
            agents: default_agents(),
            retry: RetryConfig::default(),
            github: GitHubConfig::default(),
            classifier: None,
        }
    }
}

impl MiningConfig {
    /// Read and validate a TOML config file.
    pub fn load(path: &Path) -> MinerResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            MinerError::config(format!("failed to read config {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> MinerResult<Self> {
        let cfg: MiningConfig = toml::from_str(content)
            .map_err(|e| MinerError::config(format!("failed to parse TOML config: {}", e)))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> MinerResult<()> {
        if self.since >= self.until {
            return Err(MinerError::config(format!(
                "since ({}) must be before until ({})",
                self.since, self.until
            )));
        }
        if self.revision_cap == 0 {
            return Err(MinerError::config("revision_cap must be positive"));
        }
        if self.max_revisions_scanned == 0 {
            return Err(MinerError::config("max_revisions_scanned must be positive"));
        }
        if self.concurrency == 0 {
            return Err(MinerError::config("concurrency must be positive"));
        }
        if self.retry.initial_backoff_secs > self.retry.max_backoff_secs {
            return Err(MinerError::config(
                "retry.initial_backoff_secs must not exceed retry.max_backoff_secs",
            ));
        }
        if let Some(agent) = self
            .agents
            .iter()
            .find(|a| a.identifier.trim().is_empty() || a.label.trim().is_empty())
        {
            return Err(MinerError::config(format!(
                "agent identifiers and labels must be non-empty: {:?}",
                agent
            )));
        }
        Ok(())
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }
}

/// The identifier table used when none is configured.
pub fn default_agents() -> Vec<AgentIdentifier> {
    vec![
        AgentIdentifier::new("copilot", "copilot"),
        AgentIdentifier::new("cursor", "cursor"),
        AgentIdentifier::new("devin-ai-integration", "devin"),
        AgentIdentifier::new("claude", "claude"),
    ]
}

fn utc(y: i32, m: u32, d: u32, hh: u32, mm: u32, ss: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, hh, mm, ss)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

fn default_since() -> DateTime<Utc> {
    utc(2025, 1, 1, 0, 0, 0)
}

fn default_until() -> DateTime<Utc> {
    utc(2025, 12, 31, 23, 59, 59)
}

fn default_history_until() -> Option<DateTime<Utc>> {
    Some(utc(2025, 10, 31, 23, 59, 59))
}

fn default_max_revisions_scanned() -> usize {
    500
}

fn default_revision_cap() -> usize {
    100
}

fn default_target_per_group() -> usize {
    10
}

fn default_request_delay_ms() -> u64 {
    50
}

fn default_concurrency() -> usize {
    1
}

fn default_cache_capacity() -> usize {
    1024
}

fn default_initial_backoff_secs() -> u64 {
    10
}

fn default_max_backoff_secs() -> u64 {
    60
}

fn default_probe_host() -> String {
    "api.github.com".to_string()
}

fn default_probe_port() -> u16 {
    443
}

fn default_probe_timeout_secs() -> u64 {
    5
}

fn default_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_token_env() -> String {
    "GITHUB_TOKEN".to_string()
}

fn default_http_timeout_secs() -> u64 {
    30
}

fn default_per_page() -> u32 {
    100
}

fn default_classifier_timeout_secs() -> u64 {
    60
}
