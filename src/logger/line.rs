//! Text line logger: `2026-03-01 12:00:00,123 - component - LEVEL - message`.
//!
//! There is no global logger. A [`LineLogger`] is built once per process and
//! passed to whoever needs it; [`LineLogger::child`] shares the same file
//! under another component name.

#![allow(missing_docs)]

use std::fmt;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Local};
use parking_lot::Mutex;

use crate::logger::sink::{RotatingSink, RotationPolicy, SinkState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Debug,
    Info,
    Warning,
    Error,
}

impl Level {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Render one log line, newline included.
#[must_use]
pub fn format_line(ts: &DateTime<Local>, component: &str, level: Level, message: &str) -> String {
    format!(
        "{} - {component} - {level} - {message}\n",
        ts.format("%Y-%m-%d %H:%M:%S,%3f")
    )
}

#[derive(Debug, Clone)]
pub struct LineLogger {
    component: Arc<str>,
    sink: Arc<Mutex<RotatingSink>>,
    echo: bool,
    min_level: Level,
}

impl LineLogger {
    /// Log to `path` and echo every line to stderr.
    pub fn open(path: &Path, component: &str) -> Self {
        let sink = RotatingSink::open(path, RotationPolicy::default(), "OPS-LOG");
        Self::from_sink(sink, component)
    }

    /// Logger with no file, for commands that only print.
    #[must_use]
    pub fn stderr_only(component: &str) -> Self {
        Self::from_sink(RotatingSink::stderr("OPS-LOG"), component)
    }

    fn from_sink(sink: RotatingSink, component: &str) -> Self {
        Self {
            component: Arc::from(component),
            sink: Arc::new(Mutex::new(sink)),
            echo: true,
            min_level: Level::Info,
        }
    }

    #[must_use]
    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    #[must_use]
    pub fn with_min_level(mut self, level: Level) -> Self {
        self.min_level = level;
        self
    }

    /// Same sink, different component name.
    #[must_use]
    pub fn child(&self, component: &str) -> Self {
        Self {
            component: Arc::from(component),
            ..self.clone()
        }
    }

    #[must_use]
    pub fn component(&self) -> &str {
        &self.component
    }

    #[must_use]
    pub fn sink_state(&self) -> SinkState {
        self.sink.lock().state()
    }

    pub fn log(&self, level: Level, message: impl AsRef<str>) {
        if level < self.min_level {
            return;
        }
        let line = format_line(&Local::now(), &self.component, level, message.as_ref());
        let mut sink = self.sink.lock();
        sink.write_line(&line);
        // A degraded sink already writes to stderr.
        if self.echo && sink.state() == SinkState::File {
            let _ = io::stderr().write_all(line.as_bytes());
        }
    }

    pub fn debug(&self, message: impl AsRef<str>) {
        self.log(Level::Debug, message);
    }

    pub fn info(&self, message: impl AsRef<str>) {
        self.log(Level::Info, message);
    }

    pub fn warning(&self, message: impl AsRef<str>) {
        self.log(Level::Warning, message);
    }

    pub fn error(&self, message: impl AsRef<str>) {
        self.log(Level::Error, message);
    }
}
