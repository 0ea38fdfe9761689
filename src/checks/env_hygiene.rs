//! Env-file hygiene: present, private, and ignored by git.

#![allow(missing_docs)]

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::checks::permissions::{Sensitivity, file_mode};
use crate::checks::{Check, CheckKind, CheckResult};
use crate::core::config::PathsConfig;
use crate::core::errors::{Result, SentinelError};

#[derive(Debug, Clone)]
pub struct EnvHygieneCheck {
    env_file: PathBuf,
    gitignore: PathBuf,
}

impl EnvHygieneCheck {
    #[must_use]
    pub fn new(env_file: impl Into<PathBuf>, gitignore: impl Into<PathBuf>) -> Self {
        Self {
            env_file: env_file.into(),
            gitignore: gitignore.into(),
        }
    }

    #[must_use]
    pub fn from_config(paths: &PathsConfig) -> Self {
        Self::new(&paths.env_file, &paths.gitignore)
    }
}

fn display_name(path: &Path) -> String {
    path.file_name().map_or_else(
        || path.display().to_string(),
        |name| name.to_string_lossy().into_owned(),
    )
}

impl Check for EnvHygieneCheck {
    fn name(&self) -> &'static str {
        "env_hygiene"
    }

    fn kind(&self) -> CheckKind {
        CheckKind::Credential
    }

    fn run(&self) -> Result<CheckResult> {
        let env_name = display_name(&self.env_file);
        let ignore_name = display_name(&self.gitignore);
        let mut statuses = BTreeMap::new();
        let mut issues = Vec::new();

        match file_mode(&self.env_file)? {
            None => {
                issues.push(format!("{env_name} file not found"));
                statuses.insert(env_name.clone(), "missing".to_string());
            }
            Some(mode) if Sensitivity::Secret.is_insecure(mode) => {
                issues.push(format!(
                    "{env_name} file has insecure permissions (readable by others)"
                ));
                statuses.insert(env_name.clone(), format!("insecure ({mode:o})"));
            }
            Some(mode) => {
                statuses.insert(env_name.clone(), format!("secure ({mode:o})"));
            }
        }

        match fs::read_to_string(&self.gitignore) {
            Ok(content) if content.contains(env_name.as_str()) => {
                statuses.insert(ignore_name, format!("lists {env_name}"));
            }
            Ok(_) => {
                issues.push(format!("{env_name} not listed in {ignore_name}"));
                statuses.insert(ignore_name, format!("missing {env_name} entry"));
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                issues.push(format!("{ignore_name} file not found"));
                statuses.insert(ignore_name, "missing".to_string());
            }
            Err(err) => return Err(SentinelError::io(&self.gitignore, err)),
        }

        Ok(CheckResult::new(CheckKind::Credential, statuses, issues))
    }
}
