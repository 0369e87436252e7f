// Tracing setup
//
// Library code only emits `tracing` events. The binary installs the
// subscriber once through `init_tracing`; nothing in the core installs one
// implicitly.

use tracing::Span;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};
use uuid::Uuid;

use crate::backends::BackendKind;

/// Filter used when neither the config nor `RUST_LOG` sets one
pub const DEFAULT_LOG_FILTER: &str = "info,promptlab=debug";

/// Subscriber configuration
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Log filter (e.g., "info", "promptlab_core=trace")
    pub log_filter: Option<String>,
    /// Include event targets in console output
    pub with_target: bool,
    /// Write to stderr so stdout stays clean for run output
    pub to_stderr: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_filter: None,
            with_target: true,
            to_stderr: true,
        }
    }
}

impl TelemetryConfig {
    /// Configuration with the filter taken from `RUST_LOG` or `LOG_LEVEL`
    pub fn from_env() -> Self {
        Self {
            log_filter: std::env::var("RUST_LOG")
                .ok()
                .or_else(|| std::env::var("LOG_LEVEL").ok()),
            ..Self::default()
        }
    }

    pub fn with_log_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = Some(filter.into());
        self
    }

    fn filter(&self) -> EnvFilter {
        self.log_filter
            .as_deref()
            .and_then(|f| EnvFilter::try_new(f).ok())
            .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER))
    }
}

/// Install the global subscriber.
///
/// Returns `false` if a subscriber was already installed (e.g. by a test
/// harness); the existing one is kept.
pub fn init_tracing(config: &TelemetryConfig) -> bool {
    let layer = tracing_subscriber::fmt::layer().with_target(config.with_target);
    let layer = if config.to_stderr {
        layer.with_writer(std::io::stderr).with_filter(config.filter()).boxed()
    } else {
        layer.with_filter(config.filter()).boxed()
    };

    tracing_subscriber::registry().with(layer).try_init().is_ok()
}

/// Span covering one conversation run
pub fn run_span(run_id: Uuid, backend: BackendKind) -> Span {
    tracing::info_span!("conversation_run", run_id = %run_id, backend = %backend)
}

/// Span covering one turn of a run
pub fn turn_span(turn: u32) -> Span {
    tracing::debug_span!("turn", turn)
}
