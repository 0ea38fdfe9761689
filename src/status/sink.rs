//! Per-agent status snapshots: `<status_dir>/<agent>.json`, latest result only.

#![allow(missing_docs)]

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::checks::{CheckKind, CheckResult};
use crate::core::errors::{Result, SentinelError};
use crate::core::paths::status_file_path;

/// What consumers read back for one agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub agent: String,
    pub last_check: DateTime<Utc>,
    pub kind: CheckKind,
    /// `ok` or `warning`.
    pub state: String,
    pub statuses: BTreeMap<String, String>,
    pub issues: Vec<String>,
}

impl StatusSnapshot {
    #[must_use]
    pub fn from_result(agent: &str, result: &CheckResult) -> Self {
        Self {
            agent: agent.to_string(),
            last_check: result.timestamp,
            kind: result.kind,
            state: result.outcome.label().to_string(),
            statuses: result.statuses.clone(),
            issues: result.issues().to_vec(),
        }
    }

    /// Time since `last_check`; zero when the clock went backwards.
    #[must_use]
    pub fn age(&self) -> Duration {
        Utc::now()
            .signed_duration_since(self.last_check)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    #[must_use]
    pub fn is_stale(&self, max_age: Duration) -> bool {
        self.age() > max_age
    }
}

/// Snapshot store. Each agent is the only writer of its own file.
#[derive(Debug, Clone)]
pub struct StatusSink {
    dir: PathBuf,
}

impl StatusSink {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn path_for(&self, agent: &str) -> PathBuf {
        status_file_path(&self.dir, agent)
    }

    /// Replace the agent's snapshot with `result`.
    pub fn record(&self, agent: &str, result: &CheckResult) -> Result<()> {
        let snapshot = StatusSnapshot::from_result(agent, result);
        let path = self.path_for(agent);
        write_snapshot_atomic(&path, &snapshot).map_err(|source| SentinelError::io(&path, source))
    }

    /// Latest snapshot for `agent`, `None` when it never recorded one.
    pub fn read(&self, agent: &str) -> Result<Option<StatusSnapshot>> {
        let path = self.path_for(agent);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(SentinelError::io(&path, err)),
        };
        Ok(Some(serde_json::from_str(&raw)?))
    }

    /// Every readable snapshot in the directory, sorted by agent name.
    ///
    /// Unparseable files are reported on stderr and skipped.
    pub fn read_all(&self) -> Result<Vec<StatusSnapshot>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(SentinelError::io(&self.dir, err)),
        };

        let mut snapshots = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let parsed = fs::read_to_string(&path)
                .map_err(|err| err.to_string())
                .and_then(|raw| {
                    serde_json::from_str::<StatusSnapshot>(&raw).map_err(|err| err.to_string())
                });
            match parsed {
                Ok(snapshot) => snapshots.push(snapshot),
                Err(err) => {
                    eprintln!("[OPS-STATUS] skipping {}: {err}", path.display());
                }
            }
        }
        snapshots.sort_by(|left, right| left.agent.cmp(&right.agent));
        Ok(snapshots)
    }
}

/// Write to `<file>.json.tmp`, then rename over the target.
///
/// Readers see either the previous snapshot or the new one, never a mix.
fn write_snapshot_atomic(path: &Path, snapshot: &StatusSnapshot) -> io::Result<()> {
    let tmp_path = path.with_extension("json.tmp");

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(snapshot).map_err(io::Error::other)?;

    let result = (|| {
        {
            use std::io::Write;
            let mut opts = OpenOptions::new();
            opts.write(true).create(true).truncate(true);
            #[cfg(unix)]
            {
                use std::os::unix::fs::OpenOptionsExt as _;
                opts.mode(0o644);
            }
            let mut file = opts.open(&tmp_path)?;
            file.write_all(json.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, path)
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result
}
