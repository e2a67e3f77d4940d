//! line-reactor: example greeter service
//!
//! Serves the greeter protocol on the configured port. Try it with
//! `telnet localhost 6666`.
//!
//! Features:
//! - Up to `max_clients` concurrent connections, extras refused
//! - Messages framed on LF, CR or ^D
//! - Idle clients dropped after roughly ten minutes
//! - Configuration via CLI arguments or TOML file

use line_reactor::config::Config;
use line_reactor::protocols::greeter::Greeter;
use line_reactor::runtime;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    // Load configuration
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    // Initialize logging; diagnostics never share a stream with client replies
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    info!(
        listen = %config.listen,
        max_clients = config.max_clients,
        buffer_size = config.buffer_size,
        idle_limit = config.idle_limit,
        "Starting line-reactor"
    );

    match runtime::run(&config, &mut Greeter::new()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Server failed");
            ExitCode::FAILURE
        }
    }
}
