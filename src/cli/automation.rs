//! `sentinel automate`: security scan, health check and log cleanup, each
//! run in isolation, followed by a summary.

#![allow(missing_docs)]

use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use serde::Serialize;

use crate::agent::AgentKind;
use crate::agent::runner::panic_message;
use crate::checks::CheckSuite;
use crate::checks::credentials::Lookup;
use crate::checks::resources::ResourceCheck;
use crate::core::config::Config;
use crate::core::errors::{Result, SentinelError};
use crate::core::paths::{is_active_log, retired_log_path};
use crate::logger::line::LineLogger;
use crate::platform::pal::Platform;

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskOutcome {
    pub name: &'static str,
    pub success: bool,
    pub detail: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AutomationReport {
    pub tasks: Vec<TaskOutcome>,
}

impl AutomationReport {
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.tasks.iter().filter(|task| task.success).count()
    }

    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.succeeded() == self.tasks.len()
    }

    /// `2/3 tasks successful`
    #[must_use]
    pub fn summary_line(&self) -> String {
        format!("{}/{} tasks successful", self.succeeded(), self.tasks.len())
    }
}

/// Verdict of one task body: `Ok((success, detail))`.
type TaskBody<'a> = Box<dyn FnOnce() -> Result<(bool, String)> + 'a>;

pub struct AutomationRunner<'a> {
    config: &'a Config,
    lookup: Lookup,
    platform: Option<Arc<dyn Platform>>,
    logger: LineLogger,
    now: SystemTime,
}

impl<'a> AutomationRunner<'a> {
    #[must_use]
    pub fn new(
        config: &'a Config,
        lookup: Lookup,
        platform: Option<Arc<dyn Platform>>,
        logger: LineLogger,
    ) -> Self {
        Self {
            config,
            lookup,
            platform,
            logger,
            now: SystemTime::now(),
        }
    }

    /// Reference time for the log retention cutoff.
    #[must_use]
    pub fn with_now(mut self, now: SystemTime) -> Self {
        self.now = now;
        self
    }

    pub fn run(&self) -> AutomationReport {
        self.logger.info("Starting automation run");
        let tasks: Vec<(&'static str, TaskBody<'_>)> = vec![
            ("Security Scan", Box::new(|| self.security_scan())),
            ("System Health Check", Box::new(|| self.health_check())),
            ("Log Cleanup", Box::new(|| self.log_cleanup())),
        ];

        let mut report = AutomationReport::default();
        for (name, body) in tasks {
            self.logger.info(format!("Running {name}..."));
            let outcome = match panic::catch_unwind(AssertUnwindSafe(body)) {
                Ok(Ok((success, detail))) => {
                    if success {
                        self.logger.info(format!("{name} completed successfully"));
                    } else {
                        self.logger
                            .warning(format!("{name} completed with warnings: {detail}"));
                    }
                    TaskOutcome {
                        name,
                        success,
                        detail,
                    }
                }
                Ok(Err(err)) => self.failed(name, err.to_string()),
                Err(payload) => self.failed(name, panic_message(payload.as_ref())),
            };
            report.tasks.push(outcome);
        }

        self.logger
            .info(format!("Automation Summary: {}", report.summary_line()));
        report
    }

    fn failed(&self, name: &'static str, detail: String) -> TaskOutcome {
        self.logger.error(format!("{name} failed: {detail}"));
        TaskOutcome {
            name,
            success: false,
            detail,
        }
    }

    fn security_scan(&self) -> Result<(bool, String)> {
        let suite: CheckSuite =
            AgentKind::Credential.build_suite(self.config, Arc::clone(&self.lookup), None)?;
        let result = suite.run()?;
        for issue in result.issues() {
            self.logger.warning(issue);
        }
        let count = result.issue_count();
        Ok((count == 0, format!("{count} issue(s) found")))
    }

    fn health_check(&self) -> Result<(bool, String)> {
        let platform = self
            .platform
            .clone()
            .ok_or_else(|| SentinelError::UnsupportedPlatform {
                details: "no resource sampler for this host".to_string(),
            })?;
        let check = ResourceCheck::new(platform, self.config.resources.clone());
        let sample = check.sample()?;
        self.logger.info(sample.summary_line());
        let alerts = sample.alerts(check.thresholds());
        for alert in &alerts {
            self.logger.warning(alert);
        }
        if alerts.is_empty() {
            Ok((true, sample.summary_line()))
        } else {
            Ok((false, alerts.join("; ")))
        }
    }

    fn log_cleanup(&self) -> Result<(bool, String)> {
        let retention = Duration::from_secs(
            self.config
                .automation
                .log_retention_days
                .saturating_mul(SECONDS_PER_DAY),
        );
        let retired = retire_old_logs(&self.config.paths.logs_dir, retention, self.now)?;
        let detail = if retired.is_empty() {
            "No old log files to clean up".to_string()
        } else {
            format!("Cleaned up {} old log file(s)", retired.len())
        };
        self.logger.info(&detail);
        Ok((true, detail))
    }
}

/// Rename every active `*.log` in `logs_dir` last modified more than
/// `retention` before `now` to `<stem>.old.log`. Returns the new paths.
///
/// A missing directory is not an error. Subdirectories are not visited.
pub fn retire_old_logs(logs_dir: &Path, retention: Duration, now: SystemTime) -> Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(logs_dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(SentinelError::io(logs_dir, err)),
    };
    let cutoff = now.checked_sub(retention).unwrap_or(SystemTime::UNIX_EPOCH);

    let mut candidates = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| SentinelError::io(logs_dir, err))?;
        let path = entry.path();
        if !is_active_log(&path) {
            continue;
        }
        let metadata = entry
            .metadata()
            .map_err(|err| SentinelError::io(&path, err))?;
        if !metadata.is_file() {
            continue;
        }
        let modified = metadata
            .modified()
            .map_err(|err| SentinelError::io(&path, err))?;
        if modified < cutoff {
            candidates.push(path);
        }
    }
    candidates.sort();

    let mut retired = Vec::with_capacity(candidates.len());
    for path in candidates {
        let Some(target) = retired_log_path(&path) else {
            continue;
        };
        fs::rename(&path, &target).map_err(|err| SentinelError::io(&path, err))?;
        retired.push(target);
    }
    Ok(retired)
}
