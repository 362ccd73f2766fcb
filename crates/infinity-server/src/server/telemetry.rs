//! Log output for the server.
//!
//! Events from the `infinity` encoder and from `tower-http`'s request tracing
//! go through a single `fmt` layer. Filtering follows `RUST_LOG` and falls
//! back to `info`:
//!
//! ```bash
//! RUST_LOG=infinity=trace,tower_http=debug cargo run --bin infinity-server
//! ```
//!
//! `LOG_FORMAT=json` switches to one JSON object per line for log shippers.

use crate::server::config::LogFormat;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

pub fn init_telemetry(format: LogFormat) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let layer = tracing_subscriber::fmt::layer()
        .with_thread_ids(true)
        .with_line_number(true)
        .with_target(false)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .with_file(true);

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Pretty => registry.with(layer.pretty()).try_init()?,
        LogFormat::Json => registry.with(layer.json()).try_init()?,
    }

    Ok(())
}
