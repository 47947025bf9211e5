//! Logging configuration.
//!
//! Structured logs go to stderr via tracing. Production mode raises the
//! default level so only warnings and errors reach the console; full error
//! detail for user-generic messages lands here and nowhere else.

use tracing_subscriber::EnvFilter;

/// Initializes stderr logging. `RUST_LOG` overrides the default level.
pub fn init(production_mode: bool) {
    let default_level = if production_mode { "warn" } else { "info" };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}
