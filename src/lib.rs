#![forbid(unsafe_code)]

//! Ops Sentinel: a single-host supervisor for three background agents plus
//! the one-shot operational commands that share their checks.
//!
//! - **Agents** ([`agent`]) poll credentials, file security and resource
//!   utilization on a fixed interval and record a status snapshot per cycle.
//! - **Supervisor** ([`daemon::supervisor`]) runs each agent as its own child
//!   process and stops them with a bounded grace period.
//! - **Checks** ([`checks`]) are plain functions of configuration and host
//!   state, reused by the agents and the `sentinel` subcommands.
//!
//! # Library usage
//!
//! ```rust,no_run
//! use ops_sentinel::prelude::*;
//! ```
//!
//! Individual modules can also be imported directly:
//!
//! ```rust,no_run
//! use ops_sentinel::core::config::Config;
//! use ops_sentinel::status::sink::StatusSink;
//! ```

pub mod prelude;

pub mod agent;
pub mod checks;
#[cfg(feature = "cli")]
pub mod cli;
pub mod core;
pub mod daemon;
pub mod logger;
pub mod platform;
pub mod status;
