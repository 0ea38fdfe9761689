//! Status snapshots written by agents and read back by the `status` command.

pub mod sink;
