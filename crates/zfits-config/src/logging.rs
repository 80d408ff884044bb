//! Log rendering and the verbosity of forwarded writer output.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

/// How controller log events are rendered on stderr.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogFormat {
    /// One JSON object per event, for the camera server's log collector.
    #[default]
    Json,
    /// Single-line text for an operator's terminal.
    Compact,
}

/// Most verbose level at which lines captured from the writer are logged.
///
/// The writer's own chatter is tuned separately from controller events:
/// `off` silences it without touching `log_filter`.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Deserialize,
    Serialize,
    Display,
    EnumIter,
    EnumString,
    IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum WriterOutputLevel {
    /// Drop writer output.
    Off,
    /// Error level and above.
    Error,
    /// Warn level and above.
    Warn,
    /// Info level and above; writer lines are logged at info.
    #[default]
    Info,
    /// Debug level and above, including drain shutdown notices.
    Debug,
    /// Everything.
    Trace,
}

impl WriterOutputLevel {
    /// Whether forwarded writer lines, logged at info, pass this level.
    #[must_use]
    pub const fn shows_lines(self) -> bool {
        matches!(self, Self::Info | Self::Debug | Self::Trace)
    }
}
