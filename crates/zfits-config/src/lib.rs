//! Operator settings shared by the ZFits writer controller crates.
//!
//! [`Config`] is layered by `ortho_config`: built-in defaults, then an
//! optional configuration file, then `ZFITS_*` environment variables, then
//! command-line flags. The values cover the ambient concerns of the
//! controller (which writer executable to run, how long to wait for it, and
//! how to log) rather than the writer's own parameters, which travel through
//! the lifecycle commands.

mod defaults;
mod logging;

use std::time::Duration;

use camino::Utf8PathBuf;
use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

pub use defaults::{
    DEFAULT_LOG_FILTER, DEFAULT_READINESS_DELAY_MS, DEFAULT_SHUTDOWN_GRACE_MS,
    DEFAULT_WRITER_BINARY, default_log_filter, default_log_filter_string, default_log_format,
    default_readiness_delay_ms, default_shutdown_grace_ms, default_writer_binary,
    default_writer_output,
};
pub use logging::{LogFormat, WriterOutputLevel};

/// Controller configuration resolved from every configuration layer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "ZFITS")]
pub struct Config {
    /// Path or name of the writer executable.
    #[serde(default = "default_writer_binary")]
    pub writer_binary: Utf8PathBuf,
    /// Delay granted to a freshly spawned writer before allocation completes.
    #[serde(default = "default_readiness_delay_ms")]
    #[ortho_config(default = 3000)]
    pub readiness_delay_ms: u64,
    /// Grace period between SIGTERM and SIGKILL when stopping the writer.
    #[serde(default = "default_shutdown_grace_ms")]
    #[ortho_config(default = 5000)]
    pub shutdown_grace_ms: u64,
    /// `tracing` filter expression.
    #[serde(default = "default_log_filter_string")]
    pub log_filter: String,
    /// Output format of the log sink.
    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,
    /// Level applied to lines captured from the writer.
    #[serde(default = "default_writer_output")]
    pub writer_output: WriterOutputLevel,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            writer_binary: default_writer_binary(),
            readiness_delay_ms: DEFAULT_READINESS_DELAY_MS,
            shutdown_grace_ms: DEFAULT_SHUTDOWN_GRACE_MS,
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
            writer_output: default_writer_output(),
        }
    }
}

impl Config {
    /// Writer executable to launch.
    #[must_use]
    pub fn writer_binary(&self) -> &Utf8PathBuf {
        &self.writer_binary
    }

    /// Readiness delay applied after spawning the writer.
    #[must_use]
    pub const fn readiness_delay(&self) -> Duration {
        Duration::from_millis(self.readiness_delay_ms)
    }

    /// Grace period granted to the writer after SIGTERM.
    #[must_use]
    pub const fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// Log filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_str()
    }

    /// Log output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Level applied to lines captured from the writer.
    #[must_use]
    pub const fn writer_output(&self) -> WriterOutputLevel {
        self.writer_output
    }
}
