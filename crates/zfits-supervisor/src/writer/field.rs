//! Schema of the parameters the writer recognises.

use strum::{Display, EnumIter, EnumString, IntoStaticStr};

/// A recognised writer parameter.
///
/// The snake-case name of each variant is both the key accepted in
/// configuration updates and the long flag passed to the writer.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, EnumString, IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum WriterField {
    /// Directory receiving the FITS files.
    OutputDir,
    /// Address of the input event stream.
    Input,
    /// Load-balancing identifier of the writer.
    Id,
    /// Events written to a file before rolling over to a new one.
    MaxEvtsPerFile,
    /// Events grouped and compressed together.
    EvtsPerTile,
    /// Compression worker threads.
    NumCompThreads,
    /// Memory budget for compression.
    MaxCompMem,
    /// Maximum uncompressed file size in megabytes.
    MaxFileSize,
    /// Compression codec.
    CompScheme,
    /// Compression block size.
    CompBlockSize,
    /// Milliseconds between two header flushes.
    HeadFlushInter,
    /// Keep writing after a run has stopped.
    Loop,
    /// Filename suffix, e.g. a run type.
    Suffix,
    /// Whether run numbers rewrite the suffix. Never passed to the writer.
    RunNumberInSuffix,
}

/// Value shape expected by a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Rendered as a bare flag when true.
    Flag,
    /// Non-negative integer, except [`WriterField::Id`] which may be negative.
    Integer,
    /// Free-form text.
    Text,
    /// One of the [`CompressionScheme`](super::CompressionScheme) names.
    Scheme,
}

impl WriterField {
    /// Parameter name as used in updates and on the writer command line.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        self.into()
    }

    /// Value shape of the field.
    #[must_use]
    pub const fn kind(self) -> FieldKind {
        match self {
            Self::Loop | Self::RunNumberInSuffix => FieldKind::Flag,
            Self::OutputDir | Self::Input | Self::Suffix => FieldKind::Text,
            Self::CompScheme => FieldKind::Scheme,
            Self::Id
            | Self::MaxEvtsPerFile
            | Self::EvtsPerTile
            | Self::NumCompThreads
            | Self::MaxCompMem
            | Self::MaxFileSize
            | Self::CompBlockSize
            | Self::HeadFlushInter => FieldKind::Integer,
        }
    }

    /// Whether the field is passed to the writer process.
    #[must_use]
    pub const fn is_rendered(self) -> bool {
        !matches!(self, Self::RunNumberInSuffix)
    }

    /// Whether the writer refuses to start without the field.
    #[must_use]
    pub const fn is_required(self) -> bool {
        matches!(self, Self::OutputDir | Self::Input)
    }
}
