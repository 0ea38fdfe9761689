//! Logging: per-process text log plus the supervisor's JSONL activity log.

pub mod jsonl;
pub mod line;
pub mod sink;
