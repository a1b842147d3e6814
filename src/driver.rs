//! Compression drivers.
//!
//! The plain driver runs one coder pass over the whole token stream. The
//! chunked driver cuts the stream into fixed-size chunks, each encoded with
//! a fresh model and coder state so decoders can process chunks in
//! parallel; every non-first chunk re-encodes a short overlap of preceding
//! tokens to re-establish model context before its own output begins.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::thread;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::bpe::Tokenizer;
use crate::coder::{ArithDecoder, ArithEncoder};
use crate::container::{split_plain, ChunkedHeader, PlainHeader, CHUNKED_HEADER_BASE_SIZE};
use crate::error::{Error, Result};
use crate::model::{LanguageModel, ModelFactory};
use crate::quantizer::CumulativeTable;

/// Chunk partitioning parameters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// New tokens per chunk.
    pub chunk_size: usize,
    /// Context tokens re-encoded at the start of every non-first chunk.
    pub overlap_size: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 128,
            overlap_size: 16,
        }
    }
}

impl ChunkingConfig {
    fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::InvalidChunkTable("chunk size must be at least 1".into()));
        }
        if self.chunk_size + self.overlap_size > u16::MAX as usize {
            return Err(Error::InvalidChunkTable(format!(
                "chunk size {} plus overlap {} exceeds the on-wire limit of {}",
                self.chunk_size,
                self.overlap_size,
                u16::MAX
            )));
        }
        Ok(())
    }
}

/// Result of a compression pass.
#[derive(Debug, Clone, Serialize)]
pub struct Compressed {
    /// The framed container bytes.
    pub data: Vec<u8>,
    pub original_size: usize,
    pub compressed_size: usize,
    /// `original_size / compressed_size`.
    pub ratio: f64,
    pub token_count: usize,
    /// Number of chunks, for chunked containers.
    pub chunk_count: Option<u16>,
}

impl Compressed {
    fn new(data: Vec<u8>, original_size: usize, token_count: usize, chunk_count: Option<u16>) -> Self {
        let compressed_size = data.len();
        Self {
            data,
            original_size,
            compressed_size,
            ratio: original_size as f64 / compressed_size as f64,
            token_count,
            chunk_count,
        }
    }
}

fn check_vocab_fit(tokenizer: &Tokenizer, model: &dyn LanguageModel) -> Result<()> {
    if tokenizer.vocab_size() > model.vocab_size() {
        return Err(Error::InvalidTokenizer(format!(
            "tokenizer vocabulary ({}) exceeds model vocabulary ({})",
            tokenizer.vocab_size(),
            model.vocab_size()
        )));
    }
    Ok(())
}

/// Encode one token run with a freshly reset model and coder.
///
/// The context fed to the model is token 0 for the first position and the
/// previous token after that; the chunked driver applies the same rule
/// within each chunk.
fn encode_tokens(model: &mut dyn LanguageModel, tokens: &[u32]) -> Result<Vec<u8>> {
    model.reset();
    let mut encoder = ArithEncoder::new();
    for (i, &token) in tokens.iter().enumerate() {
        if token as usize >= model.vocab_size() {
            return Err(Error::TokenOutOfRange {
                token,
                vocab: model.vocab_size(),
            });
        }
        let ctx = if i == 0 { 0 } else { tokens[i - 1] };
        let probs = model.process_token(ctx);
        let table = CumulativeTable::from_probabilities(&probs);
        encoder.encode(token as usize, &table);
    }
    Ok(encoder.finish())
}

/// Decode one token run with a freshly reset model and coder.
fn decode_tokens(model: &mut dyn LanguageModel, payload: &[u8], count: usize) -> Vec<u32> {
    model.reset();
    let mut decoder = ArithDecoder::new(payload);
    let mut tokens = Vec::with_capacity(count);
    for i in 0..count {
        let ctx = if i == 0 { 0 } else { tokens[i - 1] };
        let probs = model.process_token(ctx);
        let table = CumulativeTable::from_probabilities(&probs);
        tokens.push(decoder.decode(&table) as u32);
    }
    tokens
}

/// On-wire token ranges for each chunk.
///
/// Chunk 0 covers `[0, chunk_size)`; chunk `i` starts `overlap` tokens
/// before output position `i * chunk_size` (clamped to 0) and runs
/// `chunk_size` new tokens forward.
fn chunk_ranges(token_count: usize, chunk_size: usize, overlap: usize) -> Vec<(usize, usize)> {
    let mut ranges = Vec::new();
    let mut pos = 0usize;
    while pos < token_count {
        let start = pos - overlap.min(pos);
        let end = (pos + chunk_size).min(token_count);
        ranges.push((start, end));
        pos += chunk_size;
    }
    ranges
}

/// Sequential compressor: one continuous coder and model state over the
/// whole token stream, framed in a plain container.
pub struct Compressor {
    tokenizer: Arc<Tokenizer>,
    model: Box<dyn LanguageModel>,
}

impl Compressor {
    pub fn new(tokenizer: Arc<Tokenizer>, model: Box<dyn LanguageModel>) -> Result<Self> {
        check_vocab_fit(&tokenizer, model.as_ref())?;
        Ok(Self { tokenizer, model })
    }

    pub fn compress(&mut self, text: &str) -> Result<Compressed> {
        let tokens = self.tokenizer.encode(text)?;

        let payload = if tokens.is_empty() {
            Vec::new()
        } else {
            encode_tokens(self.model.as_mut(), &tokens)?
        };

        let header = PlainHeader {
            original_len: text.len() as u32,
            token_count: tokens.len() as u32,
            model_hash: self.model.model_hash(),
        };
        let mut data = header.to_bytes();
        data.extend_from_slice(&payload);

        Ok(Compressed::new(data, text.len(), tokens.len(), None))
    }

    pub fn decompress(&mut self, container: &[u8]) -> Result<String> {
        let (header, payload) = split_plain(container)?;
        if header.model_hash != self.model.model_hash() {
            warn!(
                "model hash mismatch (container 0x{:08x}, runtime 0x{:08x}), output will almost certainly be garbage",
                header.model_hash,
                self.model.model_hash()
            );
        }
        if header.token_count == 0 {
            return Ok(String::new());
        }

        let tokens = decode_tokens(self.model.as_mut(), payload, header.token_count as usize);
        self.tokenizer.decode(&tokens)
    }
}

/// Chunked compressor: independent coder and model state per chunk, with a
/// configurable context overlap, framed in a chunked container.
pub struct ChunkedCompressor {
    tokenizer: Arc<Tokenizer>,
    factory: Arc<dyn ModelFactory>,
    config: ChunkingConfig,
    model_hash: u32,
}

impl ChunkedCompressor {
    pub fn new(
        tokenizer: Arc<Tokenizer>,
        factory: Arc<dyn ModelFactory>,
        config: ChunkingConfig,
    ) -> Result<Self> {
        config.validate()?;
        let probe = factory.create();
        check_vocab_fit(&tokenizer, probe.as_ref())?;
        let model_hash = probe.model_hash();
        Ok(Self {
            tokenizer,
            factory,
            config,
            model_hash,
        })
    }

    /// Tokenize, partition, and encode each chunk with fresh state.
    ///
    /// Chunks are encoded sequentially with one model instance reset per
    /// chunk; the container they produce decodes chunk-parallel.
    pub fn compress(&self, text: &str) -> Result<Compressed> {
        let tokens = self.tokenizer.encode(text)?;
        let ranges = chunk_ranges(tokens.len(), self.config.chunk_size, self.config.overlap_size);
        if ranges.len() > u16::MAX as usize {
            return Err(Error::InvalidChunkTable(format!(
                "input would need {} chunks, limit is {}",
                ranges.len(),
                u16::MAX
            )));
        }
        debug!(
            tokens = tokens.len(),
            chunks = ranges.len(),
            chunk_size = self.config.chunk_size,
            overlap = self.config.overlap_size,
            "partitioned token stream"
        );

        let mut model = self.factory.create();
        let mut payloads = Vec::with_capacity(ranges.len());
        let mut chunk_token_counts = Vec::with_capacity(ranges.len());
        for &(start, end) in &ranges {
            payloads.push(encode_tokens(model.as_mut(), &tokens[start..end])?);
            chunk_token_counts.push((end - start) as u16);
        }

        let header_size = CHUNKED_HEADER_BASE_SIZE + 6 * ranges.len();
        let mut chunk_offsets = Vec::with_capacity(ranges.len());
        let mut offset = header_size as u32;
        for payload in &payloads {
            chunk_offsets.push(offset);
            offset += payload.len() as u32;
        }

        let header = ChunkedHeader {
            original_len: text.len() as u32,
            total_token_count: tokens.len() as u32,
            model_hash: self.model_hash,
            chunk_size: self.config.chunk_size as u16,
            overlap_size: self.config.overlap_size as u16,
            chunk_offsets,
            chunk_token_counts,
        };

        let mut data = header.to_bytes();
        for payload in &payloads {
            data.extend_from_slice(payload);
        }

        let chunk_count = ranges.len() as u16;
        Ok(Compressed::new(data, text.len(), tokens.len(), Some(chunk_count)))
    }

    /// Decode all chunks (optionally in parallel) and merge them, dropping
    /// every non-first chunk's overlap prefix.
    pub fn decompress(&self, container: &[u8], parallel: bool) -> Result<String> {
        let header = ChunkedHeader::from_bytes(container)?;
        if header.model_hash != self.model_hash {
            warn!(
                "model hash mismatch (container 0x{:08x}, runtime 0x{:08x}), output will almost certainly be garbage",
                header.model_hash, self.model_hash
            );
        }

        let slices = header.payload_slices(container)?;
        let counts: Vec<usize> = header.chunk_token_counts.iter().map(|&c| c as usize).collect();

        let decoded = if parallel && slices.len() > 1 {
            self.decode_chunks_parallel(&slices, &counts)
        } else {
            let mut model = self.factory.create();
            slices
                .iter()
                .zip(&counts)
                .map(|(payload, &count)| decode_tokens(model.as_mut(), payload, count))
                .collect()
        };

        let chunk_size = header.chunk_size as usize;
        let overlap = header.overlap_size as usize;
        let mut tokens: Vec<u32> = Vec::with_capacity(header.total_token_count as usize);
        for (i, chunk) in decoded.iter().enumerate() {
            let skip = overlap.min(i * chunk_size);
            if skip > chunk.len() {
                return Err(Error::InvalidChunkTable(format!(
                    "chunk {i} carries {} tokens, fewer than its {skip}-token overlap",
                    chunk.len()
                )));
            }
            // The dropped prefix re-encodes the tail of the previous chunk.
            debug_assert_eq!(
                &chunk[..skip],
                &tokens[tokens.len() - skip..],
                "chunk {i} overlap does not match the preceding chunk"
            );
            tokens.extend_from_slice(&chunk[skip..]);
        }

        if tokens.len() != header.total_token_count as usize {
            return Err(Error::InvalidChunkTable(format!(
                "merged {} tokens but the header promises {}",
                tokens.len(),
                header.total_token_count
            )));
        }

        self.tokenizer.decode(&tokens)
    }

    /// Worker pool over a shared chunk queue; each worker owns one private
    /// model instance and decodes whole chunks to completion.
    fn decode_chunks_parallel(&self, slices: &[&[u8]], counts: &[usize]) -> Vec<Vec<u32>> {
        let chunk_count = slices.len();
        let workers = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
            .min(chunk_count);

        let queue: Mutex<VecDeque<usize>> = Mutex::new((0..chunk_count).collect());
        let results: Mutex<Vec<Option<Vec<u32>>>> = Mutex::new(vec![None; chunk_count]);

        thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| {
                    let mut model = self.factory.create();
                    loop {
                        let next = queue.lock().expect("chunk queue poisoned").pop_front();
                        let Some(index) = next else { break };
                        let tokens = decode_tokens(model.as_mut(), slices[index], counts[index]);
                        results.lock().expect("result table poisoned")[index] = Some(tokens);
                    }
                });
            }
        });

        results
            .into_inner()
            .expect("result table poisoned")
            .into_iter()
            .map(|chunk| chunk.expect("every chunk is assigned to a worker"))
            .collect()
    }
}
