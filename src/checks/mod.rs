//! Operational checks shared by the agents and the one-shot commands.
//!
//! Every check produces a [`CheckResult`]. Expected problems (a missing
//! variable, a world-writable file, a hot CPU) are `Warning` issues. An `Err`
//! from [`Check::run`] means the check itself could not complete.

#![allow(missing_docs)]

pub mod credentials;
pub mod env_hygiene;
pub mod permissions;
pub mod resources;
pub mod secrets;

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::errors::Result;

/// Which family a result belongs to. Matches the agent that produces it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    Credential,
    Security,
    Monitoring,
}

impl CheckKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Credential => "credential",
            Self::Security => "security",
            Self::Monitoring => "monitoring",
        }
    }
}

impl fmt::Display for CheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Overall verdict of one check run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Ok,
    Warning { issues: Vec<String> },
    Error { message: String },
}

impl Outcome {
    /// `Ok` when `issues` is empty, `Warning` otherwise.
    #[must_use]
    pub fn from_issues(issues: Vec<String>) -> Self {
        if issues.is_empty() {
            Self::Ok
        } else {
            Self::Warning { issues }
        }
    }

    #[must_use]
    pub fn issues(&self) -> &[String] {
        match self {
            Self::Warning { issues } => issues,
            Self::Ok | Self::Error { .. } => &[],
        }
    }

    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Warning { .. } => "warning",
            Self::Error { .. } => "error",
        }
    }
}

/// One timestamped result with per-item detail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    pub timestamp: DateTime<Utc>,
    pub kind: CheckKind,
    pub outcome: Outcome,
    /// Item → status, e.g. `GITHUB_TOKEN` → `valid`.
    pub statuses: BTreeMap<String, String>,
}

impl CheckResult {
    #[must_use]
    pub fn new(kind: CheckKind, statuses: BTreeMap<String, String>, issues: Vec<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
            outcome: Outcome::from_issues(issues),
            statuses,
        }
    }

    /// Result describing a cycle that could not complete.
    #[must_use]
    pub fn fault(kind: CheckKind, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
            outcome: Outcome::Error {
                message: message.into(),
            },
            statuses: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn issues(&self) -> &[String] {
        self.outcome.issues()
    }

    /// Issues, or one for a faulted result.
    #[must_use]
    pub fn issue_count(&self) -> usize {
        match &self.outcome {
            Outcome::Error { .. } => 1,
            outcome => outcome.issues().len(),
        }
    }
}

/// A single operational check.
pub trait Check: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;
    fn kind(&self) -> CheckKind;
    fn run(&self) -> Result<CheckResult>;
}

/// Ordered list of checks aggregated into one result.
pub struct CheckSuite {
    kind: CheckKind,
    checks: Vec<Box<dyn Check>>,
}

impl CheckSuite {
    #[must_use]
    pub fn new(kind: CheckKind, checks: Vec<Box<dyn Check>>) -> Self {
        Self { kind, checks }
    }

    #[must_use]
    pub const fn kind(&self) -> CheckKind {
        self.kind
    }

    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.checks.iter().map(|check| check.name()).collect()
    }

    /// Run every check in order and merge the results.
    ///
    /// Issues are concatenated in check order. A status key reported by two
    /// checks keeps the later value. The first failing check aborts the run.
    pub fn run(&self) -> Result<CheckResult> {
        let mut statuses = BTreeMap::new();
        let mut issues = Vec::new();
        for check in &self.checks {
            let result = check.run()?;
            if let Outcome::Warning { issues: found } = result.outcome {
                issues.extend(found);
            }
            statuses.extend(result.statuses);
        }
        Ok(CheckResult::new(self.kind, statuses, issues))
    }
}

impl fmt::Debug for CheckSuite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckSuite")
            .field("kind", &self.kind)
            .field("checks", &self.names())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::errors::SentinelError;

    pub(crate) struct FixedCheck {
        pub name: &'static str,
        pub statuses: Vec<(&'static str, &'static str)>,
        pub issues: Vec<&'static str>,
    }

    impl Check for FixedCheck {
        fn name(&self) -> &'static str {
            self.name
        }

        fn kind(&self) -> CheckKind {
            CheckKind::Security
        }

        fn run(&self) -> Result<CheckResult> {
            let statuses = self
                .statuses
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect();
            let issues = self.issues.iter().map(|s| (*s).to_string()).collect();
            Ok(CheckResult::new(CheckKind::Security, statuses, issues))
        }
    }

    struct BrokenCheck;

    impl Check for BrokenCheck {
        fn name(&self) -> &'static str {
            "broken"
        }

        fn kind(&self) -> CheckKind {
            CheckKind::Security
        }

        fn run(&self) -> Result<CheckResult> {
            Err(SentinelError::CheckFault {
                check: "broken",
                details: "disk vanished".to_string(),
            })
        }
    }

    #[test]
    fn suite_merges_issues_in_order() {
        let suite = CheckSuite::new(
            CheckKind::Security,
            vec![
                Box::new(FixedCheck {
                    name: "a",
                    statuses: vec![("/etc/app.toml", "secure")],
                    issues: vec![],
                }),
                Box::new(FixedCheck {
                    name: "b",
                    statuses: vec![("/srv/.env", "insecure")],
                    issues: vec!["first", "second"],
                }),
            ],
        );

        let result = suite.run().unwrap();
        assert_eq!(result.kind, CheckKind::Security);
        assert_eq!(result.issues(), ["first", "second"]);
        assert_eq!(result.statuses.len(), 2);
        assert_eq!(suite.names(), vec!["a", "b"]);
    }

    #[test]
    fn clean_suite_is_ok() {
        let suite = CheckSuite::new(
            CheckKind::Security,
            vec![Box::new(FixedCheck {
                name: "a",
                statuses: vec![],
                issues: vec![],
            })],
        );
        assert_eq!(suite.run().unwrap().outcome, Outcome::Ok);
    }

    #[test]
    fn failing_check_aborts_suite() {
        let suite = CheckSuite::new(CheckKind::Security, vec![Box::new(BrokenCheck)]);
        let err = suite.run().unwrap_err();
        assert_eq!(err.code(), "OPS-2003");
    }

    #[test]
    fn outcome_serializes_with_status_tag() {
        let outcome = Outcome::Warning {
            issues: vec!["High CPU usage: 91.0%".to_string()],
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "warning");
        assert_eq!(json["issues"][0], "High CPU usage: 91.0%");
    }

    #[test]
    fn fault_counts_as_one_issue() {
        let result = CheckResult::fault(CheckKind::Monitoring, "boom");
        assert_eq!(result.issue_count(), 1);
        assert!(result.issues().is_empty());
    }
}
