//! Tracing subscriber setup.
//!
//! Log output goes to stdout through the `fmt` layer. The filter is read from
//! `RUST_LOG` and defaults to `info`; for example
//! `RUST_LOG=dbauth=debug,tower_http=debug` shows per-request spans and the
//! lookup/verification steps of every login.
//!
//! Passwords and hash keys are never recorded: instrumented functions skip
//! them explicitly.

use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const DEFAULT_FILTER: &str = "info";

/// Install the global subscriber. Fails if one is already installed.
pub fn init_telemetry() -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    info!("Telemetry initialized");
    Ok(())
}
