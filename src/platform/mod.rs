//! Platform abstraction: CPU, memory and filesystem sampling.

pub mod pal;
