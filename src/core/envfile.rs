//! `.env` loading into an in-process overlay.
//!
//! Values are never written back to the process environment. Instead the
//! overlay is consulted before `std::env` by the credential checks and handed
//! to spawned agents through `Command::envs`.

#![allow(missing_docs)]

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::core::errors::{Result, SentinelError};

/// A line that could not be parsed as `KEY=value`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MalformedLine {
    /// 1-based line number.
    pub line: usize,
}

/// Result of parsing env-file text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedEnv {
    pub vars: BTreeMap<String, String>,
    pub malformed: Vec<MalformedLine>,
}

/// Parse `KEY=value` text.
///
/// Blank lines and `#` comments are skipped. The line is split on the first
/// `=` and both halves are trimmed. Every leading and trailing `"` is then
/// stripped from the value, followed by every leading and trailing `'`;
/// quotes need not be paired. Later keys overwrite earlier ones.
pub fn parse_env_text(text: &str) -> ParsedEnv {
    let mut parsed = ParsedEnv::default();
    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            parsed.malformed.push(MalformedLine { line: idx + 1 });
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            parsed.malformed.push(MalformedLine { line: idx + 1 });
            continue;
        }
        parsed
            .vars
            .insert(key.to_string(), strip_quotes(value.trim()).to_string());
    }
    parsed
}

fn strip_quotes(value: &str) -> &str {
    value.trim_matches('"').trim_matches('\'')
}

/// Variables loaded from an env file, layered over the process environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvOverlay {
    vars: BTreeMap<String, String>,
}

impl EnvOverlay {
    #[must_use]
    pub fn new(vars: BTreeMap<String, String>) -> Self {
        Self { vars }
    }

    /// Overlay value first, then the process environment.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<String> {
        self.vars
            .get(name)
            .cloned()
            .or_else(|| env::var(name).ok())
    }

    /// Pairs to pass to child processes.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

/// Outcome of [`load_env_file`].
#[derive(Debug, Clone)]
pub struct EnvLoad {
    pub path: PathBuf,
    /// `false` when the file does not exist; the overlay is then empty.
    pub found: bool,
    pub overlay: EnvOverlay,
    pub malformed: Vec<MalformedLine>,
    /// Permission bits when group or other have any access.
    pub insecure_mode: Option<u32>,
}

/// Read and parse an env file. A missing file is not an error.
pub fn load_env_file(path: &Path) -> Result<EnvLoad> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return Ok(EnvLoad {
                path: path.to_path_buf(),
                found: false,
                overlay: EnvOverlay::default(),
                malformed: Vec::new(),
                insecure_mode: None,
            });
        }
        Err(err) => return Err(SentinelError::io(path, err)),
    };

    let parsed = parse_env_text(&text);
    Ok(EnvLoad {
        path: path.to_path_buf(),
        found: true,
        overlay: EnvOverlay::new(parsed.vars),
        malformed: parsed.malformed,
        insecure_mode: insecure_mode(path),
    })
}

#[cfg(unix)]
fn insecure_mode(path: &Path) -> Option<u32> {
    use std::os::unix::fs::PermissionsExt;

    let mode = fs::metadata(path).ok()?.permissions().mode() & 0o777;
    (mode & 0o077 != 0).then_some(mode)
}

#[cfg(not(unix))]
fn insecure_mode(_path: &Path) -> Option<u32> {
    None
}

/// Best-effort overlay for callers that only want the variables.
///
/// Read failures are reported on stderr and yield an empty overlay.
pub fn overlay_or_empty(path: &Path) -> EnvOverlay {
    match load_env_file(path) {
        Ok(load) => load.overlay,
        Err(err) => {
            eprintln!("[OPS-ENV] could not read {}: {err}", path.display());
            EnvOverlay::default()
        }
    }
}
