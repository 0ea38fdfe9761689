//! Configuration system: TOML file + env var overrides + smart defaults.

#![allow(missing_docs)]

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::errors::{Result, SentinelError};
use crate::core::paths::{anchor_to, resolve_absolute_path};

/// File name looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "sentinel.toml";

/// Full ops_sentinel configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub supervisor: SupervisorConfig,
    pub agents: AgentsConfig,
    pub credentials: CredentialsConfig,
    pub security: SecurityConfig,
    pub resources: ResourcesConfig,
    pub monitor: MonitorConfig,
    pub automation: AutomationConfig,
}

/// Filesystem layout. Relative entries resolve against `project_root`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    pub config_file: PathBuf,
    pub project_root: PathBuf,
    pub logs_dir: PathBuf,
    pub status_dir: PathBuf,
    pub env_file: PathBuf,
    pub gitignore: PathBuf,
}

/// Process supervisor knobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Time a child gets to exit after SIGTERM before it is killed.
    pub grace_period_secs: u64,
    /// How often the supervisor polls signal flags and reaps children.
    pub poll_interval_ms: u64,
    /// Pidfile written on start; defaults to `<logs_dir>/supervisor.pid`.
    pub pidfile: Option<PathBuf>,
}

/// Per-agent schedule overrides.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct AgentsConfig {
    pub credential: AgentConfig,
    pub security: AgentConfig,
    pub monitoring: AgentConfig,
}

/// Schedule override for one agent. `None` keeps the agent's built-in default.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AgentConfig {
    pub enabled: bool,
    pub interval_secs: Option<u64>,
    pub backoff_secs: Option<u64>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: None,
            backoff_secs: None,
        }
    }
}

impl AgentConfig {
    /// Effective run interval, falling back to `default_secs`.
    #[must_use]
    pub fn effective_interval(&self, default_secs: u64) -> Duration {
        Duration::from_secs(self.interval_secs.unwrap_or(default_secs))
    }

    /// Effective error backoff, falling back to `default_secs`.
    #[must_use]
    pub fn effective_backoff(&self, default_secs: u64) -> Duration {
        Duration::from_secs(self.backoff_secs.unwrap_or(default_secs))
    }
}

/// Credential variables inspected by the credential checks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CredentialsConfig {
    /// Variables that must be present and well-formed.
    pub required: Vec<String>,
    /// Variables only listed by the status report.
    pub optional: Vec<String>,
    /// Values shorter than this are reported as possibly invalid.
    pub min_length: usize,
}

/// Secret-exposure scan and permission audit targets.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SecurityConfig {
    /// Files or directories scanned for hard-coded secrets.
    pub scan_paths: Vec<PathBuf>,
    /// Directory names never descended into.
    pub excluded_dirs: Vec<String>,
    pub max_depth: usize,
    /// Files larger than this are skipped by the secret scan.
    pub max_file_bytes: u64,
    /// Files that must not be accessible by group/other at all.
    pub sensitive_files: Vec<PathBuf>,
    /// Files that must not be writable by other users.
    pub watched_files: Vec<PathBuf>,
}

/// Resource utilization thresholds (percent used).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ResourcesConfig {
    pub cpu_threshold_pct: f64,
    pub memory_threshold_pct: f64,
    pub disk_threshold_pct: f64,
    pub disk_path: PathBuf,
    /// Blocking window used to sample CPU utilization.
    pub cpu_sample_ms: u64,
}

/// `sentinel monitor --continuous` settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MonitorConfig {
    pub interval_secs: u64,
}

/// `sentinel automate` settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AutomationConfig {
    /// Logs untouched for longer than this are renamed to `<stem>.old.log`.
    pub log_retention_days: u64,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            config_file: PathBuf::from(DEFAULT_CONFIG_FILE),
            project_root: PathBuf::from("."),
            logs_dir: PathBuf::from("logs"),
            status_dir: PathBuf::from("logs").join("status"),
            env_file: PathBuf::from(".env"),
            gitignore: PathBuf::from(".gitignore"),
        }
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            grace_period_secs: 10,
            poll_interval_ms: 500,
            pidfile: None,
        }
    }
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            required: vec![
                "GITHUB_TOKEN".to_string(),
                "AZURE_CLIENT_ID".to_string(),
                "AZURE_CLIENT_SECRET".to_string(),
                "AZURE_TENANT_ID".to_string(),
            ],
            optional: vec!["AZURE_SUBSCRIPTION_ID".to_string()],
            min_length: 10,
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            scan_paths: vec![PathBuf::from(".")],
            excluded_dirs: vec![
                ".git".to_string(),
                "target".to_string(),
                "node_modules".to_string(),
                "logs".to_string(),
            ],
            max_depth: 4,
            max_file_bytes: 1024 * 1024,
            sensitive_files: vec![PathBuf::from(".env")],
            watched_files: vec![PathBuf::from(DEFAULT_CONFIG_FILE)],
        }
    }
}

impl Default for ResourcesConfig {
    fn default() -> Self {
        Self {
            cpu_threshold_pct: 80.0,
            memory_threshold_pct: 80.0,
            disk_threshold_pct: 80.0,
            disk_path: PathBuf::from("/"),
            cpu_sample_ms: 1_000,
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self { interval_secs: 60 }
    }
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            log_retention_days: 30,
        }
    }
}

impl SupervisorConfig {
    #[must_use]
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Config {
    /// Default configuration path (relative to the working directory).
    #[must_use]
    pub fn default_path() -> PathBuf {
        PathsConfig::default().config_file
    }

    /// Load config from default or explicit path, then apply env overrides.
    ///
    /// Missing config file is not an error when loading from default path; defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path_buf = path.map_or_else(Self::default_path, Path::to_path_buf);
        let is_explicit_path = path.is_some();

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf).map_err(|source| SentinelError::Io {
                path: path_buf.clone(),
                source,
            })?;
            let parsed: Self = toml::from_str(&raw)?;
            parsed
        } else if is_explicit_path {
            return Err(SentinelError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.paths.config_file = resolve_absolute_path(&path_buf);
        cfg.apply_env_overrides_from(env_var)?;
        cfg.normalize_paths();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Whether the config came from a file that exists on disk.
    #[must_use]
    pub fn has_config_file(&self) -> bool {
        self.paths.config_file.is_file()
    }

    /// Pidfile location, defaulting to `<logs_dir>/supervisor.pid`.
    #[must_use]
    pub fn pidfile(&self) -> PathBuf {
        self.supervisor
            .pidfile
            .clone()
            .unwrap_or_else(|| self.paths.logs_dir.join("supervisor.pid"))
    }

    /// Files held to `Secret` permissions and never read by the secret scan:
    /// `security.sensitive_files` plus the configured env file.
    #[must_use]
    pub fn sensitive_files(&self) -> Vec<PathBuf> {
        let mut files = self.security.sensitive_files.clone();
        if !files.contains(&self.paths.env_file) {
            files.push(self.paths.env_file.clone());
        }
        files
    }

    /// Deterministic hash of the effective config for logging.
    ///
    /// FNV-1a over the canonical JSON form, stable across processes.
    pub fn stable_hash(&self) -> Result<String> {
        let canonical = serde_json::to_string(self)?;
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in canonical.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        Ok(format!("{hash:016x}"))
    }

    fn apply_env_overrides_from<F>(&mut self, mut lookup: F) -> Result<()>
    where
        F: FnMut(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("SENTINEL_PROJECT_ROOT") {
            self.paths.project_root = PathBuf::from(raw);
        }
        if let Some(raw) = lookup("SENTINEL_LOGS_DIR") {
            self.paths.logs_dir = PathBuf::from(raw);
        }
        if let Some(raw) = lookup("SENTINEL_STATUS_DIR") {
            self.paths.status_dir = PathBuf::from(raw);
        }
        if let Some(raw) = lookup("SENTINEL_ENV_FILE") {
            self.paths.env_file = PathBuf::from(raw);
        }

        if let Some(raw) = lookup("SENTINEL_GRACE_PERIOD_SECS") {
            self.supervisor.grace_period_secs = parse_env_u64("SENTINEL_GRACE_PERIOD_SECS", &raw)?;
        }

        for (name, slot) in [
            (
                "SENTINEL_CREDENTIAL_INTERVAL_SECS",
                &mut self.agents.credential.interval_secs,
            ),
            (
                "SENTINEL_SECURITY_INTERVAL_SECS",
                &mut self.agents.security.interval_secs,
            ),
            (
                "SENTINEL_MONITORING_INTERVAL_SECS",
                &mut self.agents.monitoring.interval_secs,
            ),
        ] {
            if let Some(raw) = lookup(name) {
                *slot = Some(parse_env_u64(name, &raw)?);
            }
        }

        if let Some(raw) = lookup("SENTINEL_CREDENTIAL_MIN_LENGTH") {
            let value = parse_env_u64("SENTINEL_CREDENTIAL_MIN_LENGTH", &raw)?;
            self.credentials.min_length =
                usize::try_from(value).map_err(|error| SentinelError::ConfigParse {
                    context: "env",
                    details: format!("SENTINEL_CREDENTIAL_MIN_LENGTH={raw:?}: {error}"),
                })?;
        }

        for (name, slot) in [
            (
                "SENTINEL_CPU_THRESHOLD_PCT",
                &mut self.resources.cpu_threshold_pct,
            ),
            (
                "SENTINEL_MEMORY_THRESHOLD_PCT",
                &mut self.resources.memory_threshold_pct,
            ),
            (
                "SENTINEL_DISK_THRESHOLD_PCT",
                &mut self.resources.disk_threshold_pct,
            ),
        ] {
            if let Some(raw) = lookup(name) {
                *slot = parse_env_f64(name, &raw)?;
            }
        }

        Ok(())
    }

    /// Resolve relative paths against the project root.
    fn normalize_paths(&mut self) {
        self.paths.project_root = resolve_absolute_path(&self.paths.project_root);
        let root = self.paths.project_root.clone();
        let anchor = |path: &mut PathBuf| *path = anchor_to(&root, path);

        anchor(&mut self.paths.logs_dir);
        anchor(&mut self.paths.status_dir);
        anchor(&mut self.paths.env_file);
        anchor(&mut self.paths.gitignore);
        if let Some(pidfile) = self.supervisor.pidfile.as_mut() {
            anchor(pidfile);
        }
        for path in &mut self.security.scan_paths {
            anchor(path);
        }
        for path in &mut self.security.sensitive_files {
            anchor(path);
        }
        for path in &mut self.security.watched_files {
            anchor(path);
        }
    }

    fn validate(&self) -> Result<()> {
        if self.supervisor.grace_period_secs == 0 {
            return Err(SentinelError::InvalidConfig {
                details: "supervisor.grace_period_secs must be >= 1".to_string(),
            });
        }
        if self.supervisor.poll_interval_ms == 0 {
            return Err(SentinelError::InvalidConfig {
                details: "supervisor.poll_interval_ms must be >= 1".to_string(),
            });
        }

        for (name, agent, interval, backoff) in [
            ("credential", &self.agents.credential, 3_600, 300),
            ("security", &self.agents.security, 1_800, 300),
            ("monitoring", &self.agents.monitoring, 300, 60),
        ] {
            let interval = agent.effective_interval(interval);
            let backoff = agent.effective_backoff(backoff);
            if interval.is_zero() || backoff.is_zero() {
                return Err(SentinelError::InvalidConfig {
                    details: format!("agents.{name} interval and backoff must be > 0"),
                });
            }
            if backoff > interval {
                return Err(SentinelError::InvalidConfig {
                    details: format!(
                        "agents.{name}.backoff_secs ({}) must not exceed interval_secs ({})",
                        backoff.as_secs(),
                        interval.as_secs()
                    ),
                });
            }
        }

        if self.credentials.min_length == 0 {
            return Err(SentinelError::InvalidConfig {
                details: "credentials.min_length must be >= 1".to_string(),
            });
        }
        if self.credentials.required.iter().any(|name| name.trim().is_empty()) {
            return Err(SentinelError::InvalidConfig {
                details: "credentials.required must not contain empty names".to_string(),
            });
        }

        for (name, val) in [
            ("cpu_threshold_pct", self.resources.cpu_threshold_pct),
            ("memory_threshold_pct", self.resources.memory_threshold_pct),
            ("disk_threshold_pct", self.resources.disk_threshold_pct),
        ] {
            if !(val > 0.0 && val <= 100.0) {
                return Err(SentinelError::InvalidConfig {
                    details: format!("resources.{name} must be in (0, 100], got {val}"),
                });
            }
        }
        if self.resources.cpu_sample_ms == 0 {
            return Err(SentinelError::InvalidConfig {
                details: "resources.cpu_sample_ms must be >= 1".to_string(),
            });
        }

        if self.security.max_depth == 0 {
            return Err(SentinelError::InvalidConfig {
                details: "security.max_depth must be >= 1".to_string(),
            });
        }
        if self.monitor.interval_secs == 0 {
            return Err(SentinelError::InvalidConfig {
                details: "monitor.interval_secs must be >= 1".to_string(),
            });
        }
        if self.automation.log_retention_days == 0 {
            return Err(SentinelError::InvalidConfig {
                details: "automation.log_retention_days must be >= 1".to_string(),
            });
        }

        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|raw| !raw.trim().is_empty())
}

fn parse_env_u64(name: &str, raw: &str) -> Result<u64> {
    raw.trim()
        .parse::<u64>()
        .map_err(|error| SentinelError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: {error}"),
        })
}

fn parse_env_f64(name: &str, raw: &str) -> Result<f64> {
    raw.trim()
        .parse::<f64>()
        .map_err(|error| SentinelError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: {error}"),
        })
}
