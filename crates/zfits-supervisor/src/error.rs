//! Error types for writer configuration and supervision.
//!
//! I/O errors are wrapped in `Arc` so the enums stay cheap to clone into
//! reports and small enough for the `result_large_err` lint.

use std::io;
use std::sync::Arc;

use thiserror::Error;

use crate::writer::WriterField;

/// Errors raised while updating, rendering or parsing a writer configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The value has the wrong shape for the field.
    #[error("option '{field}' expects {expected}, got {found}")]
    TypeMismatch {
        /// Field being set.
        field: WriterField,
        /// Expected value kind.
        expected: &'static str,
        /// Kind of the value supplied.
        found: &'static str,
    },
    /// The value has the right shape but is not acceptable.
    #[error("option '{field}' rejects value '{value}': {reason}")]
    InvalidValue {
        /// Field being set.
        field: WriterField,
        /// Offending value.
        value: String,
        /// Why the value was refused.
        reason: String,
    },
    /// A required field is unset.
    #[error("required option '{field}' is not set")]
    MissingRequired {
        /// Unset field.
        field: WriterField,
    },
    /// A valued flag was the last argument.
    #[error("argument '--{field}' is missing its value")]
    MissingValue {
        /// Flag lacking a value.
        field: WriterField,
    },
    /// An options document could not be decoded.
    #[error("malformed writer options: {message}")]
    MalformedOptions {
        /// Decoder error description.
        message: String,
    },
    /// An argument does not name a rendered writer flag.
    #[error("unknown writer argument '{argument}'")]
    UnknownArgument {
        /// The unrecognised token.
        argument: String,
    },
}

/// Errors raised by the process supervisor.
#[derive(Debug, Clone, Error)]
pub enum SupervisorError {
    /// The writer executable could not be launched.
    #[error("failed to spawn writer '{binary}': {message}")]
    Spawn {
        /// Executable that failed to start.
        binary: String,
        /// Human-readable failure description.
        message: String,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },
    /// The operation does not fit the supervisor's current state.
    #[error("cannot {operation} writer: {reason}")]
    InvalidState {
        /// Operation that was refused.
        operation: &'static str,
        /// Description of the conflicting state.
        reason: String,
    },
    /// The writer did not shut down cleanly.
    #[error("writer pid {pid} did not shut down cleanly: {message}")]
    Shutdown {
        /// Process that failed to shut down.
        pid: u32,
        /// Human-readable failure description.
        message: String,
        /// Underlying I/O error, when one was reported.
        #[source]
        source: Option<Arc<io::Error>>,
    },
    /// The configuration cannot be used to launch the writer.
    #[error("invalid writer configuration: {source}")]
    InvalidConfig {
        /// Validation failure.
        #[from]
        source: ConfigError,
    },
    /// An I/O operation around the writer failed.
    #[error("{context}: {source}")]
    Io {
        /// What the supervisor was doing.
        context: &'static str,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },
}

impl SupervisorError {
    pub(crate) fn io(context: &'static str, source: io::Error) -> Self {
        Self::Io {
            context,
            source: Arc::new(source),
        }
    }

    pub(crate) fn not_running(operation: &'static str) -> Self {
        Self::InvalidState {
            operation,
            reason: "no writer is running".to_owned(),
        }
    }
}
