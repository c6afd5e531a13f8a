//! mnexec - execution utility for Mininet
//!
//! Starts up programs and does the things that are awkward to do from a
//! supervising process: closing descriptors, detaching from the tty,
//! entering namespaces, joining cgroups, setting RT scheduling, and
//! reporting the pid of what it started.

use std::process;

use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod config;
mod run;

use cli::Cli;
use config::InvocationConfig;

/// Environment variable holding the log filter
const LOG_ENV: &str = "MNEXEC_LOG";

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            // help is not an error; usage mistakes exit 1 like every other failure
            process::exit(i32::from(e.use_stderr()));
        }
    };

    init_logging(cli.verbose);

    if cli.print_version {
        println!("{}", env!("CARGO_PKG_VERSION"));
        return;
    }

    let result = InvocationConfig::from_cli(cli)
        .map_err(anyhow::Error::from)
        .and_then(run::execute);

    match result {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("mnexec: {e}");
            process::exit(1);
        }
    }
}

/// Logs go to stderr: stdout carries the pid marker and the command's output
fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
