//! Logger setup based on `tracing-subscriber`.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence. Without it, `name` (the binary name, dashes
/// converted to underscores so it matches the crate target) and `tower_http`
/// are logged at `default_level`.
pub fn setup_logger(name: &str, default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(name, default_level)));

    // try_init so tests that call this more than once do not panic
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .try_init();
}

fn default_directives(name: &str, level: &str) -> String {
    let crate_name = name.replace('-', "_");
    format!("{crate_name}={level},tower_http={level}")
}
