use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::LoggingConfig;

/// Filter directives for the subscriber: `RUST_LOG` if set, else `logging.level`.
pub fn filter_directives(cfg: &LoggingConfig) -> String {
    std::env::var("RUST_LOG")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| cfg.level.clone())
}

/// Install the global subscriber. Later calls are no-ops.
pub fn init_tracing(cfg: &LoggingConfig) {
    let directives = filter_directives(cfg);
    let filter = EnvFilter::try_new(&directives).unwrap_or_else(|e| {
        eprintln!("Invalid log filter {directives:?} ({e}), using info");
        EnvFilter::new("info")
    });

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_ansi(cfg.ansi))
        .try_init();
}
