//! Process-wide tracing setup.
//!
//! Call [`init_tracing`] once at startup, before [`crate::App::serve`]. The
//! filter comes from `RUST_LOG` when set, otherwise `info`.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable single-line output.
    #[default]
    Plain,
    /// One JSON object per event, for log shippers.
    Json,
}

/// Initialize the global tracing subscriber.
///
/// Safe to call more than once; later calls are no-ops (the error from
/// `try_init` is discarded), which keeps test binaries from panicking when
/// several tests initialize logging.
pub fn init_tracing(format: LogFormat) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = match format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .boxed(),
        LogFormat::Plain => tracing_subscriber::fmt::layer().with_target(true).boxed(),
    };

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init_tracing(LogFormat::Plain);
        init_tracing(LogFormat::Json);
        tracing::info!("still alive after double init");
    }
}
