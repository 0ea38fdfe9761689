//! Bodies of the one-shot `sentinel` commands. Parsing and output live in
//! the binary; these modules return plain reports.

pub mod automation;
pub mod devtools;
pub mod envcheck;
pub mod monitor;
