//! chatrelay: a line-oriented chat relay server.
//!
//! Accepts many concurrent client connections over a single listening
//! socket, multiplexes them on a single thread via readiness polling, and
//! serves a tiny request/response text protocol: set a nickname, list
//! connected peers, broadcast a message, and poll for messages missed
//! since the last poll.

mod config;
mod runtime;

use config::Config;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() {
    let (config, log_level) = Config::load();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(port = config.port, "Starting chatrelay server");

    if let Err(e) = runtime::run(config) {
        error!(error = %e, "Server exited with error");
        std::process::exit(1);
    }
}
