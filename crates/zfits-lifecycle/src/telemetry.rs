//! Log installation for controller hosts.
//!
//! Controller events and the lines forwarded from the writer share one
//! stderr sink but are filtered separately: `log_filter` governs the
//! controller, while `writer_output` pins the level of the
//! [`WORKER_TARGET`] target on top of it.

use std::io::{self, IsTerminal};

use once_cell::sync::OnceCell;
use thiserror::Error;
use tracing::debug;
use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::fmt::{self, time::UtcTime};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, registry};
use zfits_config::{Config, LogFormat};
use zfits_supervisor::drain::WORKER_TARGET;

/// Log target for telemetry set-up.
pub const TELEMETRY_TARGET: &str = "zfits_lifecycle::telemetry";

static INSTALLED: OnceCell<()> = OnceCell::new();

/// Marker returned once the controller's subscriber is in place.
#[derive(Debug, Default, Clone, Copy)]
pub struct TelemetryHandle;

/// Ways installing the subscriber can fail.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// `log_filter` combined with the writer output level is not a valid
    /// filter.
    #[error("invalid log filter '{directives}': {message}")]
    Filter {
        /// Directives that failed to parse.
        directives: String,
        /// Parser diagnostic.
        message: String,
    },
    /// The host installed its own global subscriber first.
    #[error("failed to install telemetry subscriber: {0}")]
    Subscriber(#[from] SetGlobalDefaultError),
}

/// Installs the global subscriber for `config` on the first call.
///
/// Later calls are no-ops returning a fresh handle.
///
/// # Errors
///
/// Returns [`TelemetryError::Filter`] when the directives from
/// [`filter_directives`] do not parse and [`TelemetryError::Subscriber`]
/// when another global subscriber is already installed.
pub fn initialise(config: &Config) -> Result<TelemetryHandle, TelemetryError> {
    INSTALLED
        .get_or_try_init(|| install(config))
        .map(|()| TelemetryHandle)
}

/// Filter directives for `config`: the operator's `log_filter` followed by
/// a directive for forwarded writer output.
#[must_use]
pub fn filter_directives(config: &Config) -> String {
    format!(
        "{},{WORKER_TARGET}={}",
        config.log_filter(),
        config.writer_output()
    )
}

fn build_filter(config: &Config) -> Result<EnvFilter, TelemetryError> {
    let directives = filter_directives(config);
    EnvFilter::try_new(&directives).map_err(|error| TelemetryError::Filter {
        directives,
        message: error.to_string(),
    })
}

fn install(config: &Config) -> Result<(), TelemetryError> {
    let filter = build_filter(config)?;

    // Drain threads are named after the writer they serve.
    let (json, compact) = match config.log_format() {
        LogFormat::Json => (
            Some(
                fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_thread_names(true)
                    .with_timer(UtcTime::rfc_3339())
                    .with_writer(io::stderr),
            ),
            None,
        ),
        LogFormat::Compact => (
            None,
            Some(
                fmt::layer()
                    .compact()
                    .with_thread_names(true)
                    .with_ansi(io::stderr().is_terminal())
                    .with_timer(UtcTime::rfc_3339())
                    .with_writer(io::stderr),
            ),
        ),
    };

    tracing::subscriber::set_global_default(
        registry().with(filter).with(json).with(compact),
    )?;
    debug!(
        target: TELEMETRY_TARGET,
        format = %config.log_format(),
        writer_lines = config.writer_output().shows_lines(),
        "telemetry installed"
    );
    Ok(())
}
