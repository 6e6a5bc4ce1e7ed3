//! Console-only structured logging. The teacher's daemon build supports
//! rotated log files; a one-shot CLI run has nothing to rotate, so this
//! keeps only the `tracing_subscriber::fmt` + `EnvFilter` half of it.

use tracing_subscriber::EnvFilter;

use crate::config::LoggingArgs;

pub fn init(args: &LoggingArgs) {
    let filter = args
        .log
        .clone()
        .map(EnvFilter::new)
        .unwrap_or_else(|| EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
