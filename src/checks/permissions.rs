//! File permission audit.

#![allow(missing_docs)]

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::checks::{Check, CheckKind, CheckResult};
use crate::core::config::Config;
use crate::core::errors::{Result, SentinelError};

/// How strictly a file's mode is judged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sensitivity {
    /// Must not be writable by other users.
    Standard,
    /// Must not be accessible by group or other at all.
    Secret,
}

impl Sensitivity {
    #[must_use]
    pub const fn forbidden_bits(self) -> u32 {
        match self {
            Self::Standard => 0o002,
            Self::Secret => 0o077,
        }
    }

    #[must_use]
    pub const fn is_insecure(self, mode: u32) -> bool {
        mode & self.forbidden_bits() != 0
    }
}

/// One file to audit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionTarget {
    pub path: PathBuf,
    pub sensitivity: Sensitivity,
    /// Absence is an issue rather than skipped.
    pub required: bool,
}

impl PermissionTarget {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, sensitivity: Sensitivity) -> Self {
        Self {
            path: path.into(),
            sensitivity,
            required: false,
        }
    }

    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// Audits the permission bits of a fixed list of files.
#[derive(Debug, Clone)]
pub struct PermissionCheck {
    targets: Vec<PermissionTarget>,
}

impl PermissionCheck {
    #[must_use]
    pub fn new(targets: Vec<PermissionTarget>) -> Self {
        Self { targets }
    }

    /// Watched files at `Standard`, sensitive files (env file included) at `Secret`.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let watched = config
            .security
            .watched_files
            .iter()
            .map(|path| PermissionTarget::new(path, Sensitivity::Standard));
        let sensitive = config
            .sensitive_files()
            .into_iter()
            .map(|path| PermissionTarget::new(path, Sensitivity::Secret));
        Self::new(watched.chain(sensitive).collect())
    }
}

/// Permission bits of `path`, or `None` when it does not exist.
pub fn file_mode(path: &Path) -> Result<Option<u32>> {
    match fs::metadata(path) {
        Ok(meta) => Ok(Some(mode_bits(&meta))),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(SentinelError::io(path, err)),
    }
}

#[cfg(unix)]
fn mode_bits(meta: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn mode_bits(meta: &fs::Metadata) -> u32 {
    if meta.permissions().readonly() { 0o444 } else { 0o644 }
}

impl Check for PermissionCheck {
    fn name(&self) -> &'static str {
        "permissions"
    }

    fn kind(&self) -> CheckKind {
        CheckKind::Security
    }

    fn run(&self) -> Result<CheckResult> {
        let mut statuses = BTreeMap::new();
        let mut issues = Vec::new();
        for target in &self.targets {
            let key = target.path.display().to_string();
            let mode = match file_mode(&target.path) {
                Ok(mode) => mode,
                Err(SentinelError::PermissionDenied { .. }) => {
                    issues.push(format!("Cannot inspect permissions: {key}"));
                    statuses.insert(key, "unreadable".to_string());
                    continue;
                }
                Err(err) => return Err(err),
            };
            match mode {
                None if target.required => {
                    issues.push(format!("Required file missing: {key}"));
                    statuses.insert(key, "missing".to_string());
                }
                None => {}
                Some(mode) if target.sensitivity.is_insecure(mode) => {
                    issues.push(format!("Insecure permissions on {key}: {mode:o}"));
                    statuses.insert(key, format!("insecure ({mode:o})"));
                }
                Some(mode) => {
                    statuses.insert(key, format!("secure ({mode:o})"));
                }
            }
        }
        Ok(CheckResult::new(CheckKind::Security, statuses, issues))
    }
}
