//! JSONL activity log: one self-contained JSON object per supervisor event.
//!
//! Lines are assembled in memory and handed to the rotating sink as a
//! whole, so the file can be tailed and parsed line by line while the
//! supervisor runs.

#![allow(missing_docs)]

use std::io::{self, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::errors::SentinelError;
use crate::logger::sink::{RotatingSink, RotationPolicy, SinkState};

/// Severity level for activity events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// Supervisor lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    SupervisorStart,
    SupervisorStop,
    SignalReceived,
    AgentSpawned,
    SpawnFailed,
    /// Child exited while the supervisor was not stopping it.
    AgentExited,
    /// Child exited within the grace period after SIGTERM.
    AgentStopped,
    /// Child outlived the grace period and was force-killed.
    AgentKilled,
    StopFailed,
}

/// A single JSONL entry; all fields optional except `ts`, `event`, `severity`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEntry {
    /// ISO 8601 UTC timestamp.
    pub ts: String,
    pub event: EventType,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    /// Exit code, when the child exited normally.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ActivityEntry {
    /// Create a new entry stamped with the current UTC time.
    #[must_use]
    pub fn new(event: EventType, severity: Severity) -> Self {
        Self {
            ts: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            event,
            severity,
            agent: None,
            pid: None,
            exit_code: None,
            duration_ms: None,
            error_code: None,
            error_message: None,
            details: None,
        }
    }

    #[must_use]
    pub fn agent(mut self, name: &str) -> Self {
        self.agent = Some(name.to_string());
        self
    }

    #[must_use]
    pub fn pid(mut self, pid: u32) -> Self {
        self.pid = Some(pid);
        self
    }

    #[must_use]
    pub fn exit_code(mut self, code: Option<i32>) -> Self {
        self.exit_code = code;
        self
    }

    #[must_use]
    pub fn duration_ms(mut self, millis: u64) -> Self {
        self.duration_ms = Some(millis);
        self
    }

    #[must_use]
    pub fn error(mut self, err: &SentinelError) -> Self {
        self.error_code = Some(err.code().to_string());
        self.error_message = Some(err.to_string());
        self
    }

    #[must_use]
    pub fn details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Append-only activity log writer.
#[derive(Debug)]
pub struct ActivityLog {
    sink: RotatingSink,
}

impl ActivityLog {
    pub fn open(path: &Path) -> Self {
        let policy = RotationPolicy {
            max_size_bytes: 20 * 1024 * 1024,
            max_rotated_files: 5,
        };
        Self {
            sink: RotatingSink::open(path, policy, "OPS-JSONL"),
        }
    }

    /// Writer that only reaches stderr.
    #[must_use]
    pub fn stderr() -> Self {
        Self {
            sink: RotatingSink::stderr("OPS-JSONL"),
        }
    }

    pub fn record(&mut self, entry: &ActivityEntry) {
        match serde_json::to_string(entry) {
            Ok(json) => self.sink.write_line(&format!("{json}\n")),
            Err(e) => {
                let _ = writeln!(io::stderr(), "[OPS-JSONL] serialize error: {e}");
            }
        }
    }

    #[must_use]
    pub fn state(&self) -> SinkState {
        self.sink.state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn entries_are_separate_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("supervisor.jsonl");
        let mut log = ActivityLog::open(&path);
        assert_eq!(log.state(), SinkState::File);

        log.record(&ActivityEntry::new(EventType::SupervisorStart, Severity::Info));
        log.record(
            &ActivityEntry::new(EventType::AgentKilled, Severity::Warning)
                .agent("security")
                .pid(4242)
                .duration_ms(10_003),
        );

        let contents = fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = contents
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["event"], "supervisor_start");
        assert_eq!(lines[1]["event"], "agent_killed");
        assert_eq!(lines[1]["severity"], "warning");
        assert_eq!(lines[1]["pid"], 4242);
    }

    #[test]
    fn unset_fields_are_omitted() {
        let entry = ActivityEntry::new(EventType::SignalReceived, Severity::Info);
        let json = serde_json::to_string(&entry).unwrap();
        assert!(!json.contains("\"agent\""));
        assert!(!json.contains("\"exit_code\""));
    }

    #[test]
    fn error_fields_carry_code() {
        let err = SentinelError::Spawn {
            agent: "monitoring".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        };
        let entry = ActivityEntry::new(EventType::SpawnFailed, Severity::Critical).error(&err);
        assert_eq!(entry.error_code.as_deref(), Some("OPS-3101"));
        assert!(entry.error_message.unwrap().contains("monitoring"));
    }
}
