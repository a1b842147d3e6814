//! Error types for compression and container parsing.

use thiserror::Error;

/// Result type alias for compression operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Errors surfaced by the compression pipeline.
#[derive(Debug, Error)]
pub enum Error {
    /// Container does not start with a known magic number.
    #[error("unrecognized container magic: {0:02x?}")]
    BadMagic([u8; 4]),

    /// Container was written by a newer format revision.
    #[error("unsupported format version {found} (newest known is {newest})")]
    UnsupportedVersion { found: u8, newest: u8 },

    /// Container is shorter than its fixed header.
    #[error("truncated header: need {required} bytes, got {provided}")]
    TruncatedHeader { required: usize, provided: usize },

    /// Container ends before the data its header describes.
    #[error("truncated container: need {required} bytes, got {provided}")]
    TruncatedContainer { required: usize, provided: usize },

    /// Chunk offset/count table is internally inconsistent.
    #[error("invalid chunk table: {0}")]
    InvalidChunkTable(String),

    /// Header model hash differs from the runtime model (strict mode only;
    /// the default path warns and proceeds).
    #[error("model hash mismatch: container 0x{expected:08x}, runtime 0x{found:08x}")]
    ModelMismatch { expected: u32, found: u32 },

    /// Tokenizer configuration is malformed.
    #[error("invalid tokenizer: {0}")]
    InvalidTokenizer(String),

    /// A piece produced by merging has no vocabulary entry and the
    /// per-codepoint fallback also missed.
    #[error("no vocabulary entry for piece {0:?}")]
    UnknownPiece(String),

    /// A token id has no vocabulary entry during decode.
    #[error("unknown token id {0}")]
    UnknownToken(u32),

    /// Decoded bytes are not valid UTF-8.
    #[error("decoded bytes are not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    /// A token id is outside the model's vocabulary.
    #[error("token {token} out of range for vocabulary of {vocab}")]
    TokenOutOfRange { token: u32, vocab: usize },

    /// I/O error from the surrounding driver.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
