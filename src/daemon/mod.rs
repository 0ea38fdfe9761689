//! Daemon side: signal handling and the supervisor that owns the agent
//! child processes.

#[cfg(feature = "daemon")]
pub mod signals;
#[cfg(feature = "daemon")]
pub mod supervisor;
