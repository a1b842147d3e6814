//! llmzip - Lossless text compression driven by a language model.
//!
//! Each token's probability distribution, produced by a recurrent language
//! model conditioned on the preceding tokens, feeds a 32-bit arithmetic
//! coder that spends close to `-log2(p)` bits on the token actually seen.
//! The crate provides the bit-exact coder and quantizer, a byte-level BPE
//! tokenizer, two container formats (plain and chunked), and compression
//! drivers; chunked containers decode chunk-parallel with one private model
//! instance per worker. Model inference sits behind the narrow
//! [`LanguageModel`] facade, so any deterministic backend (including the
//! bundled stub) drives the pipeline identically.

pub mod alphabet;
pub mod bitstream;
pub mod bpe;
pub mod coder;
pub mod container;
pub mod driver;
pub mod error;
pub mod model;
pub mod quantizer;

// Re-export commonly used types
pub use bpe::Tokenizer;
pub use coder::{ArithDecoder, ArithEncoder};
pub use container::{is_chunked, ChunkedHeader, PlainHeader};
pub use driver::{ChunkedCompressor, ChunkingConfig, Compressed, Compressor};
pub use error::{Error, Result};
pub use model::{LanguageModel, ModelFactory, StubModel, StubModelFactory};
pub use quantizer::CumulativeTable;
