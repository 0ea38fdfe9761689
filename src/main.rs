#![forbid(unsafe_code)]

//! sentinel: Ops Sentinel CLI entry point.

use clap::Parser;

mod cli_app;

fn main() {
    let args = cli_app::Cli::parse();
    if let Err(e) = cli_app::run(&args) {
        if e.is_reportable() {
            eprintln!("sentinel: {e}");
        }
        std::process::exit(e.exit_code());
    }
}
