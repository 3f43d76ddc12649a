//! Tracing subscriber setup
//!
//! Logs go to stderr so stdout only carries the report.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize tracing; `RUST_LOG` overrides the default filter.
///
/// Must be called once at startup before any tracing macros are used.
pub fn init(json: bool, verbose: bool) {
    let default_filter = if verbose {
        "info,routeplane=debug,routeplane_engine=debug"
    } else {
        "warn"
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let registry = tracing_subscriber::registry().with(env_filter);

    if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}
