//! Tracing subscriber setup for the binary.
//!
//! Library code only emits events; `init` is called once from `main`.
//! `RUST_LOG` wins over the configured level.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

pub const DEFAULT_FILTER: &str = "info,mvc_core=debug";

/// Filter directives: `RUST_LOG`, then `level`, then the default.
pub fn filter(level: Option<&str>) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level.unwrap_or(DEFAULT_FILTER)))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install a stderr subscriber. A second call is a no-op.
pub fn init(level: Option<&str>) {
    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(filter(level))
        .try_init();
}
