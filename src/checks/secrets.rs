//! Secret-exposure scan over source and config files.

#![allow(missing_docs)]

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;

use crate::checks::{Check, CheckKind, CheckResult};
use crate::core::config::Config;
use crate::core::errors::{Result, SentinelError};

/// Assignment-style secret markers.
pub const SECRET_PATTERN: &str = r"(?i)(password|token|key|secret)=";

/// Upper bound on files read per scan.
const MAX_FILES_SCANNED: usize = 20_000;

/// Whether a line is ignored by the scan: comments and anything mentioning
/// `test` in any case.
#[must_use]
pub fn is_excluded_line(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with('#')
        || trimmed.starts_with("//")
        || line.to_ascii_lowercase().contains("test")
}

/// Counts secret markers in text.
#[derive(Debug, Clone)]
pub struct SecretMatcher {
    pattern: Regex,
}

impl SecretMatcher {
    pub fn new() -> Result<Self> {
        let pattern = Regex::new(SECRET_PATTERN).map_err(|err| SentinelError::InvalidConfig {
            details: format!("secret pattern: {err}"),
        })?;
        Ok(Self { pattern })
    }

    /// Number of pattern matches on non-excluded lines.
    #[must_use]
    pub fn count(&self, text: &str) -> usize {
        text.lines()
            .filter(|line| !is_excluded_line(line))
            .map(|line| self.pattern.find_iter(line).count())
            .sum()
    }
}

/// Scan bounds and skip lists.
#[derive(Debug, Clone)]
pub struct ScanScope {
    pub roots: Vec<PathBuf>,
    pub excluded_dirs: HashSet<String>,
    /// Exact files never read (the env file holds secrets on purpose).
    pub excluded_files: HashSet<PathBuf>,
    pub max_depth: usize,
    pub max_file_bytes: u64,
}

impl ScanScope {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let security = &config.security;
        Self {
            roots: security.scan_paths.clone(),
            excluded_dirs: security.excluded_dirs.iter().cloned().collect(),
            excluded_files: config.sensitive_files().into_iter().collect(),
            max_depth: security.max_depth,
            max_file_bytes: security.max_file_bytes,
        }
    }
}

/// Files with at least one match, plus how many files were read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub files_scanned: usize,
    pub findings: BTreeMap<PathBuf, usize>,
}

#[derive(Debug, Clone)]
pub struct SecretScanCheck {
    matcher: SecretMatcher,
    scope: ScanScope,
}

impl SecretScanCheck {
    pub fn new(scope: ScanScope) -> Result<Self> {
        Ok(Self {
            matcher: SecretMatcher::new()?,
            scope,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(ScanScope::from_config(config))
    }

    /// Walk every root and count matches per file.
    ///
    /// Unreadable entries are skipped. Symlinks are never followed.
    #[must_use]
    pub fn scan(&self) -> ScanReport {
        let mut report = ScanReport::default();
        let mut queue: Vec<(PathBuf, usize)> =
            self.scope.roots.iter().map(|root| (root.clone(), 0)).collect();

        while let Some((path, depth)) = queue.pop() {
            if report.files_scanned >= MAX_FILES_SCANNED {
                break;
            }
            let Ok(meta) = fs::symlink_metadata(&path) else {
                continue;
            };
            if meta.is_file() {
                self.scan_file(&path, meta.len(), &mut report);
                continue;
            }
            if !meta.is_dir() || depth >= self.scope.max_depth {
                continue;
            }

            let Ok(entries) = fs::read_dir(&path) else {
                continue;
            };
            for entry in entries.flatten() {
                let Ok(file_type) = entry.file_type() else {
                    continue;
                };
                if file_type.is_symlink() {
                    continue;
                }
                let name = entry.file_name();
                if file_type.is_dir() && self.scope.excluded_dirs.contains(&*name.to_string_lossy())
                {
                    continue;
                }
                queue.push((entry.path(), depth + 1));
            }
        }
        report
    }

    fn scan_file(&self, path: &Path, len: u64, report: &mut ScanReport) {
        if len > self.scope.max_file_bytes || self.scope.excluded_files.contains(path) {
            return;
        }
        // Non-UTF-8 content is treated as binary and skipped.
        let Ok(text) = fs::read_to_string(path) else {
            return;
        };
        report.files_scanned += 1;
        let count = self.matcher.count(&text);
        if count > 0 {
            report.findings.insert(path.to_path_buf(), count);
        }
    }
}

impl Check for SecretScanCheck {
    fn name(&self) -> &'static str {
        "secrets"
    }

    fn kind(&self) -> CheckKind {
        CheckKind::Security
    }

    fn run(&self) -> Result<CheckResult> {
        let report = self.scan();
        let mut statuses = BTreeMap::new();
        let mut issues = Vec::new();
        for (path, count) in &report.findings {
            let noun = if *count == 1 { "match" } else { "matches" };
            issues.push(format!(
                "Potential secret exposure in {}: {count} {noun}",
                path.display()
            ));
            statuses.insert(
                format!("secrets:{}", path.display()),
                format!("{count} {noun}"),
            );
        }
        statuses.insert(
            "secrets:files_scanned".to_string(),
            report.files_scanned.to_string(),
        );
        Ok(CheckResult::new(CheckKind::Security, statuses, issues))
    }
}
