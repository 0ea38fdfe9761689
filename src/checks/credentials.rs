//! Credential presence and shape checks.

#![allow(missing_docs)]

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::checks::{Check, CheckKind, CheckResult};
use crate::core::config::CredentialsConfig;
use crate::core::envfile::EnvOverlay;
use crate::core::errors::Result;

/// Variable lookup used by the credential checks.
pub type Lookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Lookup that consults the env-file overlay before the process environment.
#[must_use]
pub fn overlay_lookup(overlay: EnvOverlay) -> Lookup {
    Arc::new(move |name| overlay.lookup(name))
}

/// State of one credential variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialState {
    Missing,
    Invalid,
    Valid,
}

impl CredentialState {
    #[must_use]
    pub fn classify(value: Option<&str>, min_length: usize) -> Self {
        match value {
            None | Some("") => Self::Missing,
            Some(value) if value.chars().count() < min_length => Self::Invalid,
            Some(_) => Self::Valid,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Missing => "missing",
            Self::Invalid => "invalid",
            Self::Valid => "valid",
        }
    }
}

/// Checks that each required credential is present and plausibly long.
pub struct CredentialCheck {
    names: Vec<String>,
    min_length: usize,
    lookup: Lookup,
}

impl CredentialCheck {
    #[must_use]
    pub fn new(names: Vec<String>, min_length: usize, lookup: Lookup) -> Self {
        Self {
            names,
            min_length,
            lookup,
        }
    }

    #[must_use]
    pub fn from_config(config: &CredentialsConfig, lookup: Lookup) -> Self {
        Self::new(config.required.clone(), config.min_length, lookup)
    }
}

impl fmt::Debug for CredentialCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialCheck")
            .field("names", &self.names)
            .field("min_length", &self.min_length)
            .finish_non_exhaustive()
    }
}

impl Check for CredentialCheck {
    fn name(&self) -> &'static str {
        "credentials"
    }

    fn kind(&self) -> CheckKind {
        CheckKind::Credential
    }

    fn run(&self) -> Result<CheckResult> {
        let mut statuses = BTreeMap::new();
        let mut issues = Vec::new();
        for name in &self.names {
            let value = (self.lookup)(name);
            let state = CredentialState::classify(value.as_deref(), self.min_length);
            match state {
                CredentialState::Missing => {
                    issues.push(format!("Missing environment variable: {name}"));
                }
                CredentialState::Invalid => {
                    issues.push(format!("Environment variable may be invalid: {name}"));
                }
                CredentialState::Valid => {}
            }
            statuses.insert(name.clone(), state.as_str().to_string());
        }
        Ok(CheckResult::new(CheckKind::Credential, statuses, issues))
    }
}

// ──────────────────── status report ────────────────────

/// One line of `sentinel credentials status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CredentialStatus {
    pub name: String,
    pub description: &'static str,
    pub required: bool,
    pub present: bool,
}

/// Human description for well-known credential names.
#[must_use]
pub fn describe(name: &str) -> &'static str {
    match name {
        "GITHUB_TOKEN" => "GitHub Personal Access Token",
        "AZURE_CLIENT_ID" => "Azure Service Principal Client ID",
        "AZURE_CLIENT_SECRET" => "Azure Service Principal Secret",
        "AZURE_TENANT_ID" => "Azure Tenant ID",
        "AZURE_SUBSCRIPTION_ID" => "Azure Subscription ID",
        _ => "Custom credential",
    }
}

/// Presence-only report over required and optional credentials.
///
/// Values are never included, only whether they are set.
#[must_use]
pub fn status_report(config: &CredentialsConfig, lookup: &Lookup) -> Vec<CredentialStatus> {
    let required = config.required.iter().map(|name| (name, true));
    let optional = config.optional.iter().map(|name| (name, false));
    required
        .chain(optional)
        .map(|(name, required)| CredentialStatus {
            name: name.clone(),
            description: describe(name),
            required,
            present: lookup(name).is_some_and(|value| !value.is_empty()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::Outcome;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> Lookup {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Arc::new(move |name| map.get(name).cloned())
    }

    fn default_check(lookup: Lookup) -> CredentialCheck {
        CredentialCheck::from_config(&CredentialsConfig::default(), lookup)
    }

    #[test]
    fn all_credentials_valid_is_ok() {
        let check = default_check(lookup_from(&[
            ("GITHUB_TOKEN", "ghp_0123456789"),
            ("AZURE_CLIENT_ID", "client-0123456789"),
            ("AZURE_CLIENT_SECRET", "secret-0123456789"),
            ("AZURE_TENANT_ID", "tenant-0123456789"),
        ]));
        let result = check.run().unwrap();
        assert_eq!(result.outcome, Outcome::Ok);
        assert!(result.statuses.values().all(|state| state == "valid"));
    }

    #[test]
    fn unset_github_token_is_the_only_issue() {
        let check = default_check(lookup_from(&[
            ("AZURE_CLIENT_ID", "client-0123456789"),
            ("AZURE_CLIENT_SECRET", "secret-0123456789"),
            ("AZURE_TENANT_ID", "tenant-0123456789"),
        ]));
        let result = check.run().unwrap();
        assert_eq!(
            result.issues(),
            ["Missing environment variable: GITHUB_TOKEN"]
        );
        assert_eq!(result.statuses["GITHUB_TOKEN"], "missing");
    }

    #[test]
    fn short_and_empty_values() {
        let check = CredentialCheck::new(
            vec!["SHORT".to_string(), "EMPTY".to_string()],
            10,
            lookup_from(&[("SHORT", "abc"), ("EMPTY", "")]),
        );
        let result = check.run().unwrap();
        assert_eq!(
            result.issues(),
            [
                "Environment variable may be invalid: SHORT",
                "Missing environment variable: EMPTY",
            ]
        );
    }

    #[test]
    fn exactly_min_length_is_valid() {
        assert_eq!(
            CredentialState::classify(Some("0123456789"), 10),
            CredentialState::Valid
        );
        assert_eq!(
            CredentialState::classify(Some("012345678"), 10),
            CredentialState::Invalid
        );
    }

    #[test]
    fn status_report_lists_optional_names() {
        let lookup = lookup_from(&[("GITHUB_TOKEN", "x"), ("AZURE_SUBSCRIPTION_ID", "sub")]);
        let report = status_report(&CredentialsConfig::default(), &lookup);
        assert_eq!(report.len(), 5);
        assert_eq!(report[0].description, "GitHub Personal Access Token");
        assert!(report[0].present && report[0].required);
        assert!(!report[1].present);
        let last = report.last().unwrap();
        assert_eq!(last.name, "AZURE_SUBSCRIPTION_ID");
        assert!(last.present && !last.required);
    }
}
