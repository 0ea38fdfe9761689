//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use ops_sentinel::prelude::*;
//! ```

// Core
pub use crate::core::config::Config;
pub use crate::core::envfile::{EnvOverlay, load_env_file};
pub use crate::core::errors::{Result, SentinelError};

// Platform
pub use crate::platform::pal::{Platform, detect_platform};

// Checks
pub use crate::checks::{Check, CheckKind, CheckResult, CheckSuite, Outcome};

// Agents
pub use crate::agent::AgentKind;
pub use crate::agent::runner::{AgentLoop, LoopState, Sleeper};

// Supervisor
#[cfg(feature = "daemon")]
pub use crate::daemon::signals::SignalHandler;
#[cfg(feature = "daemon")]
pub use crate::daemon::supervisor::{AgentSpec, StopOutcome, Supervisor, SupervisorSettings};

// Sinks
pub use crate::logger::line::LineLogger;
pub use crate::status::sink::{StatusSink, StatusSnapshot};
