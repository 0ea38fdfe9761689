//! Core types: errors, configuration, paths, env-file overlay.

pub mod config;
pub mod envfile;
pub mod errors;
pub mod paths;
