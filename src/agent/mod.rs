//! The three background agents and the check suite each one runs.

#![allow(missing_docs)]

pub mod runner;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::checks::credentials::{CredentialCheck, Lookup};
use crate::checks::env_hygiene::EnvHygieneCheck;
use crate::checks::permissions::PermissionCheck;
use crate::checks::resources::ResourceCheck;
use crate::checks::secrets::SecretScanCheck;
use crate::checks::{CheckKind, CheckSuite};
use crate::core::config::{AgentConfig, Config};
use crate::core::errors::{Result, SentinelError};
use crate::platform::pal::Platform;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    Credential,
    Security,
    Monitoring,
}

impl AgentKind {
    pub const ALL: [Self; 3] = [Self::Credential, Self::Security, Self::Monitoring];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Credential => "credential",
            Self::Security => "security",
            Self::Monitoring => "monitoring",
        }
    }

    /// Component name used in log lines.
    #[must_use]
    pub const fn component(self) -> &'static str {
        match self {
            Self::Credential => "credential-agent",
            Self::Security => "security-agent",
            Self::Monitoring => "monitoring-agent",
        }
    }

    #[must_use]
    pub const fn title(self) -> &'static str {
        match self {
            Self::Credential => "Credential Management Agent",
            Self::Security => "Security Monitoring Agent",
            Self::Monitoring => "System Monitoring Agent",
        }
    }

    #[must_use]
    pub const fn check_kind(self) -> CheckKind {
        match self {
            Self::Credential => CheckKind::Credential,
            Self::Security => CheckKind::Security,
            Self::Monitoring => CheckKind::Monitoring,
        }
    }

    #[must_use]
    pub const fn default_interval(self) -> Duration {
        match self {
            Self::Credential => Duration::from_secs(3_600),
            Self::Security => Duration::from_secs(1_800),
            Self::Monitoring => Duration::from_secs(300),
        }
    }

    #[must_use]
    pub const fn default_backoff(self) -> Duration {
        match self {
            Self::Credential | Self::Security => Duration::from_secs(300),
            Self::Monitoring => Duration::from_secs(60),
        }
    }

    fn overrides(self, config: &Config) -> &AgentConfig {
        match self {
            Self::Credential => &config.agents.credential,
            Self::Security => &config.agents.security,
            Self::Monitoring => &config.agents.monitoring,
        }
    }

    #[must_use]
    pub fn is_enabled(self, config: &Config) -> bool {
        self.overrides(config).enabled
    }

    /// Run interval `T` and error backoff `B` after config overrides.
    #[must_use]
    pub fn schedule(self, config: &Config) -> (Duration, Duration) {
        let overrides = self.overrides(config);
        (
            overrides.effective_interval(self.default_interval().as_secs()),
            overrides.effective_backoff(self.default_backoff().as_secs()),
        )
    }

    /// Ordered checks for this agent.
    pub fn build_suite(
        self,
        config: &Config,
        lookup: Lookup,
        platform: Option<Arc<dyn Platform>>,
    ) -> Result<CheckSuite> {
        let suite = match self {
            Self::Credential => CheckSuite::new(
                CheckKind::Credential,
                vec![
                    Box::new(CredentialCheck::from_config(&config.credentials, lookup)),
                    Box::new(EnvHygieneCheck::from_config(&config.paths)),
                ],
            ),
            Self::Security => CheckSuite::new(
                CheckKind::Security,
                vec![
                    Box::new(PermissionCheck::from_config(config)),
                    Box::new(SecretScanCheck::from_config(config)?),
                ],
            ),
            Self::Monitoring => {
                let platform = platform.ok_or_else(|| SentinelError::UnsupportedPlatform {
                    details: "resource sampling needs a platform implementation".to_string(),
                })?;
                CheckSuite::new(
                    CheckKind::Monitoring,
                    vec![Box::new(ResourceCheck::new(
                        platform,
                        config.resources.clone(),
                    ))],
                )
            }
        };
        Ok(suite)
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AgentKind {
    type Err = SentinelError;

    fn from_str(raw: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(raw.trim()))
            .ok_or_else(|| SentinelError::InvalidConfig {
                details: format!(
                    "unknown agent {raw:?} (expected credential, security or monitoring)"
                ),
            })
    }
}

#[cfg(feature = "daemon")]
pub use process::run_agent_process;

#[cfg(feature = "daemon")]
mod process {
    use super::AgentKind;
    use crate::agent::runner::AgentLoop;
    use crate::checks::CheckResult;
    use crate::checks::credentials::overlay_lookup;
    use crate::core::config::Config;
    use crate::core::envfile::overlay_or_empty;
    use crate::core::errors::Result;
    use crate::core::paths::agent_log_path;
    use crate::daemon::signals::SignalHandler;
    use crate::logger::line::{Level, LineLogger};
    use crate::platform::pal::detect_platform;
    use crate::status::sink::StatusSink;

    /// Body of `sentinel agent <name>`.
    ///
    /// With `once` a single cycle runs and its result is returned. Otherwise
    /// the loop runs until SIGTERM/SIGINT and `None` is returned.
    pub fn run_agent_process(
        kind: AgentKind,
        config: &Config,
        once: bool,
        verbose: bool,
    ) -> Result<Option<CheckResult>> {
        let logger = LineLogger::open(&agent_log_path(&config.paths.logs_dir, kind.name()), kind.component())
            .with_min_level(if verbose { Level::Debug } else { Level::Info });
        let overlay = overlay_or_empty(&config.paths.env_file);
        let platform = match kind {
            AgentKind::Monitoring => Some(detect_platform()?),
            AgentKind::Credential | AgentKind::Security => None,
        };
        let suite = kind.build_suite(config, overlay_lookup(overlay), platform)?;
        let (interval, backoff) = kind.schedule(config);
        let sink = StatusSink::new(&config.paths.status_dir);
        let mut agent = AgentLoop::new(kind.name(), suite, interval, backoff, sink, logger.clone());

        if once {
            return Ok(Some(agent.run_once().into_result()));
        }

        let signals = SignalHandler::new();
        logger.info(format!("Starting {}", kind.title()));
        let cycles = agent.run(&signals);
        logger.info(format!("Stopping {} after {cycles} cycle(s)", kind.title()));
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::pal::{CpuTimes, FsStats, MemoryInfo, MockPlatform};
    use std::collections::HashMap;
    use std::path::PathBuf;

    #[test]
    fn default_schedules() {
        let cfg = Config::default();
        assert_eq!(
            AgentKind::Credential.schedule(&cfg),
            (Duration::from_secs(3_600), Duration::from_secs(300))
        );
        assert_eq!(
            AgentKind::Security.schedule(&cfg),
            (Duration::from_secs(1_800), Duration::from_secs(300))
        );
        assert_eq!(
            AgentKind::Monitoring.schedule(&cfg),
            (Duration::from_secs(300), Duration::from_secs(60))
        );
    }

    #[test]
    fn config_overrides_schedule() {
        let mut cfg = Config::default();
        cfg.agents.security.interval_secs = Some(120);
        cfg.agents.security.enabled = false;
        assert_eq!(
            AgentKind::Security.schedule(&cfg),
            (Duration::from_secs(120), Duration::from_secs(300))
        );
        assert!(!AgentKind::Security.is_enabled(&cfg));
        assert!(AgentKind::Credential.is_enabled(&cfg));
    }

    #[test]
    fn parses_names() {
        assert_eq!("Security".parse::<AgentKind>().unwrap(), AgentKind::Security);
        assert!("scheduler".parse::<AgentKind>().is_err());
        assert_eq!(AgentKind::Monitoring.to_string(), "monitoring");
    }

    #[test]
    fn suites_hold_expected_checks() {
        let cfg = Config::default();
        let lookup: Lookup = Arc::new(|_| None);
        let credential = AgentKind::Credential
            .build_suite(&cfg, Arc::clone(&lookup), None)
            .unwrap();
        assert_eq!(credential.names(), vec!["credentials", "env_hygiene"]);
        let security = AgentKind::Security
            .build_suite(&cfg, Arc::clone(&lookup), None)
            .unwrap();
        assert_eq!(security.names(), vec!["permissions", "secrets"]);
        assert!(
            AgentKind::Monitoring
                .build_suite(&cfg, Arc::clone(&lookup), None)
                .is_err()
        );

        let mut disks = HashMap::new();
        disks.insert(
            PathBuf::from("/"),
            FsStats {
                total_bytes: 10,
                free_bytes: 5,
                available_bytes: 5,
            },
        );
        let platform: Arc<dyn Platform> = Arc::new(MockPlatform::new(
            vec![CpuTimes::default()],
            MemoryInfo {
                total_bytes: 10,
                available_bytes: 5,
            },
            disks,
        ));
        let monitoring = AgentKind::Monitoring
            .build_suite(&cfg, lookup, Some(platform))
            .unwrap();
        assert_eq!(monitoring.kind(), CheckKind::Monitoring);
    }

    #[cfg(unix)]
    #[test]
    fn security_suite_audits_and_skips_custom_env_file() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let env = dir.path().join("secrets.env");
        std::fs::write(&env, "GITHUB_TOKEN=ghp_0123456789abcdef\n").unwrap();
        std::fs::set_permissions(&env, std::fs::Permissions::from_mode(0o666)).unwrap();
        let config_path = dir.path().join("sentinel.toml");
        std::fs::write(
            &config_path,
            format!(
                "[paths]\nproject_root = {:?}\nenv_file = \"secrets.env\"\n",
                dir.path().display().to_string()
            ),
        )
        .unwrap();

        let cfg = Config::load(Some(&config_path)).unwrap();
        let lookup: Lookup = Arc::new(|_| None);
        let result = AgentKind::Security
            .build_suite(&cfg, lookup, None)
            .unwrap()
            .run()
            .unwrap();

        let env_key = cfg.paths.env_file.display().to_string();
        assert_eq!(result.statuses[&env_key], "insecure (666)");
        assert!(!result.statuses.contains_key(&format!("secrets:{env_key}")));
        assert_eq!(result.issues().len(), 1, "{:?}", result.issues());
        assert!(result.issues()[0].starts_with("Insecure permissions on"));
    }
}
