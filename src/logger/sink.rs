//! Append-only file sink with size rotation and a stderr/discard fallback.
//!
//! Shared by the text line logger and the JSONL activity log. Each line is
//! written with a single `write_all` so a concurrent `tail -f` never sees a
//! partial line.
//!
//! Degradation chain:
//! 1. Log file
//! 2. stderr with a `[OPS-…]` tag
//! 3. Silent discard (logging must never take a process down)

#![allow(missing_docs)]

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::core::errors::{Result, SentinelError};

/// Where lines currently go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkState {
    File,
    Stderr,
    Discard,
}

impl SinkState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Stderr => "stderr",
            Self::Discard => "discard",
        }
    }
}

/// Size-based rotation settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationPolicy {
    /// Rotate before a write would push the file past this size.
    pub max_size_bytes: u64,
    /// Rotated generations kept as `<file>.1` … `<file>.N`.
    pub max_rotated_files: u32,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            max_size_bytes: 10 * 1024 * 1024,
            max_rotated_files: 3,
        }
    }
}

#[derive(Debug)]
pub struct RotatingSink {
    path: Option<PathBuf>,
    policy: RotationPolicy,
    tag: &'static str,
    file: Option<File>,
    state: SinkState,
    bytes_written: u64,
}

impl RotatingSink {
    /// Open `path` for appending, falling back to stderr when that fails.
    pub fn open(path: &Path, policy: RotationPolicy, tag: &'static str) -> Self {
        let mut sink = Self {
            path: Some(path.to_path_buf()),
            policy,
            tag,
            file: None,
            state: SinkState::Stderr,
            bytes_written: 0,
        };
        match open_append(path) {
            Ok((file, size)) => {
                sink.file = Some(file);
                sink.state = SinkState::File;
                sink.bytes_written = size;
            }
            Err(err) => {
                let _ = writeln!(io::stderr(), "[{tag}] {err}; logging to stderr");
            }
        }
        sink
    }

    /// Sink with no file behind it.
    #[must_use]
    pub fn stderr(tag: &'static str) -> Self {
        Self {
            path: None,
            policy: RotationPolicy::default(),
            tag,
            file: None,
            state: SinkState::Stderr,
            bytes_written: 0,
        }
    }

    #[must_use]
    pub fn state(&self) -> SinkState {
        self.state
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Write one newline-terminated line.
    pub fn write_line(&mut self, line: &str) {
        if self.state == SinkState::File
            && self.bytes_written + line.len() as u64 > self.policy.max_size_bytes
        {
            self.rotate();
        }

        match self.state {
            SinkState::File => {
                let Some(file) = self.file.as_mut() else {
                    self.degrade();
                    self.write_line(line);
                    return;
                };
                if file.write_all(line.as_bytes()).is_err() {
                    self.degrade();
                    self.write_line(line);
                    return;
                }
                self.bytes_written += line.len() as u64;
            }
            SinkState::Stderr => {
                if write!(io::stderr(), "[{}] {line}", self.tag).is_err() {
                    self.degrade();
                }
            }
            SinkState::Discard => {}
        }
    }

    fn degrade(&mut self) {
        self.file = None;
        self.state = match self.state {
            SinkState::File => {
                let _ = writeln!(io::stderr(), "[{}] log write failed, using stderr", self.tag);
                SinkState::Stderr
            }
            SinkState::Stderr | SinkState::Discard => SinkState::Discard,
        };
    }

    fn rotate(&mut self) {
        self.file = None;
        let Some(base) = self.path.clone() else {
            return;
        };

        // .N-1 → .N, …, .1 → .2, current → .1
        for index in (1..self.policy.max_rotated_files).rev() {
            let _ = fs::rename(rotated_name(&base, index), rotated_name(&base, index + 1));
        }
        if self.policy.max_rotated_files == 0 {
            let _ = fs::remove_file(&base);
        } else {
            let _ = fs::rename(&base, rotated_name(&base, 1));
        }

        match open_append(&base) {
            Ok((file, _)) => {
                self.file = Some(file);
                self.bytes_written = 0;
            }
            Err(_) => self.degrade(),
        }
    }
}

/// Open or create a file for appending. Returns `(File, current_size)`.
fn open_append(path: &Path) -> Result<(File, u64)> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| SentinelError::io(parent, source))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| SentinelError::io(path, source))?;
    let size = file.metadata().map(|m| m.len()).unwrap_or(0);
    Ok((file, size))
}

/// `supervisor.jsonl` → `supervisor.jsonl.3`.
#[must_use]
pub fn rotated_name(base: &Path, index: u32) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(format!(".{index}"));
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_lines_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/agent.log");
        let mut sink = RotatingSink::open(&path, RotationPolicy::default(), "OPS-TEST");
        assert_eq!(sink.state(), SinkState::File);
        sink.write_line("one\n");
        sink.write_line("two\n");
        assert_eq!(fs::read_to_string(&path).unwrap(), "one\ntwo\n");
    }

    #[test]
    fn reopening_continues_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.log");
        fs::write(&path, "earlier\n").unwrap();
        let mut sink = RotatingSink::open(&path, RotationPolicy::default(), "OPS-TEST");
        sink.write_line("later\n");
        assert_eq!(fs::read_to_string(&path).unwrap(), "earlier\nlater\n");
    }

    #[test]
    fn rotation_keeps_bounded_generations() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rot.log");
        let policy = RotationPolicy {
            max_size_bytes: 16,
            max_rotated_files: 2,
        };
        let mut sink = RotatingSink::open(&path, policy, "OPS-TEST");
        for n in 0..6 {
            sink.write_line(&format!("line number {n}\n"));
        }
        assert!(path.exists());
        assert!(rotated_name(&path, 1).exists());
        assert!(rotated_name(&path, 2).exists());
        assert!(!rotated_name(&path, 3).exists());
        assert_eq!(fs::read_to_string(&path).unwrap(), "line number 5\n");
    }

    #[test]
    fn unopenable_path_degrades_to_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, "").unwrap();
        let sink = RotatingSink::open(&blocker.join("x.log"), RotationPolicy::default(), "OPS-TEST");
        assert_eq!(sink.state(), SinkState::Stderr);
        assert_eq!(SinkState::Stderr.as_str(), "stderr");
    }
}
