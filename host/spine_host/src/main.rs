use spine_host_runtime::config::LOG_VAR;
use spine_host_runtime::{HostConfig, HostError};
use std::process;
use tracing::error;
use tracing_subscriber::{EnvFilter, fmt};

fn main() {
    init_tracing();

    if let Err(err) = run() {
        error!(error = %err, "spine_host fatal error");
        process::exit(1);
    }
}

fn run() -> Result<(), HostError> {
    let config = HostConfig::from_env()?;
    spine_host_runtime::run(config)
}

/// Logs go to stderr; stdout carries frames when serving over stdio.
fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_VAR).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
