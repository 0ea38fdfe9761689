//! `sentinel env`: load an env file into the overlay and confirm every
//! required credential is set.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::core::config::CredentialsConfig;
use crate::core::envfile::{MalformedLine, load_env_file};
use crate::core::errors::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvReport {
    pub path: PathBuf,
    pub found: bool,
    /// Keys loaded from the file, never values.
    pub loaded: Vec<String>,
    pub malformed: Vec<MalformedLine>,
    pub insecure_mode: Option<u32>,
    /// Required names set neither in the file nor in the process environment.
    pub missing: Vec<String>,
}

impl EnvReport {
    /// Valid when the file exists and nothing required is missing.
    ///
    /// Insecure permissions and malformed lines are warnings only.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.found && self.missing.is_empty()
    }
}

pub fn check_env_file(path: &Path, credentials: &CredentialsConfig) -> Result<EnvReport> {
    let load = load_env_file(path)?;
    let missing = if load.found {
        credentials
            .required
            .iter()
            .filter(|name| load.overlay.lookup(name).is_none_or(|value| value.is_empty()))
            .cloned()
            .collect()
    } else {
        Vec::new()
    };
    Ok(EnvReport {
        path: load.path,
        found: load.found,
        loaded: load.overlay.iter().map(|(key, _)| key.to_string()).collect(),
        malformed: load.malformed,
        insecure_mode: load.insecure_mode,
        missing,
    })
}
