use anyhow::Context;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Installs a global fmt subscriber. `RUST_LOG` overrides
/// `default_directive` (e.g. `"info,placement_core=debug"`).
///
/// Fails if a global subscriber is already set.
pub fn init_tracing(default_directive: &str) -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_directive.into()))
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .context("failed to install tracing subscriber")
}
