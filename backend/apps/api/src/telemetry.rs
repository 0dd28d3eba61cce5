//! Tracing Setup

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Used when `RUST_LOG` is unset or unparsable
pub const DEFAULT_FILTER: &str = "api=info,auth=info,tasks=info,tower_http=info";

/// Install the global subscriber; call once, first thing in `main`
pub fn init() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();
}
