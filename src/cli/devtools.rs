//! `sentinel dev`: status checklist, agent log viewer, on-demand scan.

#![allow(missing_docs)]

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::agent::AgentKind;
use crate::core::config::Config;
use crate::core::errors::{Result, SentinelError};
use crate::core::paths::agent_log_path;
use crate::daemon::supervisor::{process_alive, read_pidfile};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChecklistItem {
    pub label: &'static str,
    pub ok: bool,
    pub detail: String,
}

impl ChecklistItem {
    fn new(label: &'static str, ok: bool, detail: impl Into<String>) -> Self {
        Self {
            label,
            ok,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DevStatus {
    pub items: Vec<ChecklistItem>,
}

impl DevStatus {
    #[must_use]
    pub fn failing(&self) -> usize {
        self.items.iter().filter(|item| !item.ok).count()
    }
}

/// Supervisor liveness, logs directory, env file, config file.
#[must_use]
pub fn dev_status(config: &Config) -> DevStatus {
    let pidfile = config.pidfile();
    let agents = match read_pidfile(&pidfile) {
        Ok(Some(pid)) if process_alive(pid) => ChecklistItem::new(
            "Background agents",
            true,
            format!("supervisor running (PID {pid})"),
        ),
        Ok(Some(pid)) => ChecklistItem::new(
            "Background agents",
            false,
            format!("stale pidfile {} (PID {pid} not running)", pidfile.display()),
        ),
        Ok(None) => ChecklistItem::new("Background agents", false, "supervisor not running"),
        Err(err) => ChecklistItem::new("Background agents", false, err.to_string()),
    };

    let logs_dir = &config.paths.logs_dir;
    let env_file = &config.paths.env_file;
    let config_file = &config.paths.config_file;
    DevStatus {
        items: vec![
            agents,
            ChecklistItem::new("Logs directory", logs_dir.is_dir(), logs_dir.display().to_string()),
            ChecklistItem::new(
                "Environment file",
                env_file.is_file(),
                env_file.display().to_string(),
            ),
            ChecklistItem::new(
                "Configuration file",
                config.has_config_file(),
                config_file.display().to_string(),
            ),
        ],
    }
}

// ──────────────────── logs ────────────────────

/// One agent log as shown by `sentinel dev logs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogView {
    pub agent: String,
    pub path: PathBuf,
    /// `None` when the file does not exist.
    pub content: Option<String>,
}

/// Read the logs of `agent` (or all agents), keeping the last `lines` lines
/// when a limit is given.
pub fn read_agent_logs(
    logs_dir: &Path,
    agent: Option<AgentKind>,
    lines: Option<usize>,
) -> Result<Vec<LogView>> {
    let agents: Vec<AgentKind> = agent.map_or_else(|| AgentKind::ALL.to_vec(), |kind| vec![kind]);
    let mut views = Vec::with_capacity(agents.len());
    for kind in agents {
        let path = agent_log_path(logs_dir, kind.name());
        let content = match fs::read(&path) {
            Ok(bytes) => {
                let kept = lines.map_or(bytes.as_slice(), |n| tail_lines(&bytes, n));
                Some(String::from_utf8_lossy(kept).into_owned())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => None,
            Err(err) => return Err(SentinelError::io(&path, err)),
        };
        views.push(LogView {
            agent: kind.name().to_string(),
            path,
            content,
        });
    }
    Ok(views)
}

/// Last `n` lines of `bytes`. A trailing newline does not start a new line.
#[must_use]
pub fn tail_lines(bytes: &[u8], n: usize) -> &[u8] {
    if n == 0 {
        return &[];
    }
    let body = bytes.strip_suffix(b"\n").unwrap_or(bytes);
    match memchr::memrchr_iter(b'\n', body).nth(n - 1) {
        Some(newline) => &bytes[newline + 1..],
        None => bytes,
    }
}
