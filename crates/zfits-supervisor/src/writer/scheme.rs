//! Compression codecs understood by the writer.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// Compression scheme applied by the writer to each tile of events.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Deserialize,
    Serialize,
    Display,
    EnumIter,
    EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum CompressionScheme {
    /// No compression.
    Raw,
    /// zlib deflate.
    Zlib,
    /// FACT-style pixel compression.
    Fact,
    /// 16-bit difference followed by Huffman coding.
    Diffman16,
    /// 16-bit Huffman coding.
    Huffman16,
    /// Double 16-bit difference followed by Huffman coding.
    Doublediffman16,
    /// Rice and Huffman hybrid over 16-bit words.
    Riceman16,
    /// FACT followed by Rice coding.
    Factrice,
    /// Rice followed by FACT coding.
    Ricefact,
    /// Reordered Rice coding.
    Rrice,
    /// Plain Rice coding.
    Rice,
    /// LZO block compression.
    Lzo,
    /// Zero-suppressed Rice coding.
    #[default]
    Zrice,
    /// Zero-suppressed Rice coding over 32-bit words.
    Zrice32,
    /// LZO followed by Rice coding.
    Lzorice,
}
