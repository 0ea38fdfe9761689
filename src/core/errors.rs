//! OPS-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, SentinelError>;

/// Top-level error type for ops_sentinel.
#[derive(Debug, Error)]
pub enum SentinelError {
    #[error("[OPS-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[OPS-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[OPS-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[OPS-1101] unsupported platform: {details}")]
    UnsupportedPlatform { details: String },

    #[error("[OPS-2001] resource sampling failure for {resource}: {details}")]
    Sampling {
        resource: &'static str,
        details: String,
    },

    #[error("[OPS-2002] proc table parse failure: {details}")]
    ProcParse { details: String },

    #[error("[OPS-2003] check {check} faulted: {details}")]
    CheckFault {
        check: &'static str,
        details: String,
    },

    #[error("[OPS-2101] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[OPS-3001] permission denied for {path}")]
    PermissionDenied { path: PathBuf },

    #[error("[OPS-3002] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[OPS-3101] failed to spawn agent {agent}: {source}")]
    Spawn {
        agent: String,
        #[source]
        source: std::io::Error,
    },

    #[error("[OPS-3102] failed to signal agent {agent} (pid {pid}): {details}")]
    Signal {
        agent: String,
        pid: u32,
        details: String,
    },

    #[error("[OPS-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl SentinelError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "OPS-1001",
            Self::MissingConfig { .. } => "OPS-1002",
            Self::ConfigParse { .. } => "OPS-1003",
            Self::UnsupportedPlatform { .. } => "OPS-1101",
            Self::Sampling { .. } => "OPS-2001",
            Self::ProcParse { .. } => "OPS-2002",
            Self::CheckFault { .. } => "OPS-2003",
            Self::Serialization { .. } => "OPS-2101",
            Self::PermissionDenied { .. } => "OPS-3001",
            Self::Io { .. } => "OPS-3002",
            Self::Spawn { .. } => "OPS-3101",
            Self::Signal { .. } => "OPS-3102",
            Self::Runtime { .. } => "OPS-3900",
        }
    }

    /// Whether retrying might resolve the failure.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Io { .. }
                | Self::Sampling { .. }
                | Self::CheckFault { .. }
                | Self::Spawn { .. }
                | Self::Signal { .. }
                | Self::Runtime { .. }
        )
    }

    /// Convenience constructor for IO errors with a known path.
    ///
    /// `PermissionDenied` IO errors map to the dedicated variant so callers
    /// can report them without the OS error text.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::PermissionDenied {
            return Self::PermissionDenied {
                path: path.as_ref().to_path_buf(),
            };
        }
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

impl From<serde_json::Error> for SentinelError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for SentinelError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}
