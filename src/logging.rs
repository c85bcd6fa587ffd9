//! Diagnostic logging through `tracing`.
//!
//! Everything goes to stderr, as text or JSON lines, filtered by
//! `RUST_LOG` (default `docharvest=info`).

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_DIRECTIVE: &str = "docharvest=info";

/// Install the global subscriber. Logs go to stderr; `RUST_LOG` overrides the default filter.
///
/// Calling this twice is harmless: the second install is ignored.
pub fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE));

    let registry = tracing_subscriber::registry().with(filter);
    let _ = if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()
    };
}
