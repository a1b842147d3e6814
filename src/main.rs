//! Model-based text compression CLI.
//!
//! Compresses and decompresses UTF-8 text files through the arithmetic
//! coding pipeline, driven by the deterministic stub model. Real inference
//! backends plug in behind the same `LanguageModel` facade.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueHint};
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use llmzip::container::{is_chunked, ChunkedHeader, PlainHeader};
use llmzip::{
    ChunkedCompressor, ChunkingConfig, Compressed, Compressor, LanguageModel, StubModel,
    StubModelFactory, Tokenizer,
};

#[derive(Parser)]
#[command(name = "llmzip")]
#[command(about = "Lossless text compression driven by a language model")]
struct Cli {
    /// Path to the tokenizer JSON (vocab + merges)
    #[arg(long, value_hint = ValueHint::FilePath)]
    tokenizer: PathBuf,

    /// Seed selecting the stub model variant
    #[arg(long, default_value_t = 0)]
    model_seed: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compress a UTF-8 text file
    Compress {
        #[arg(value_hint = ValueHint::FilePath)]
        input: PathBuf,
        #[arg(value_hint = ValueHint::FilePath)]
        output: PathBuf,

        /// Use the chunked container so decompression can run in parallel
        #[arg(long)]
        chunked: bool,

        /// New tokens per chunk (chunked container only)
        #[arg(long, default_value_t = 128)]
        chunk_size: usize,

        /// Context tokens re-encoded at the start of each chunk
        #[arg(long, default_value_t = 16)]
        overlap_size: usize,
    },

    /// Decompress a container back to a text file
    Decompress {
        #[arg(value_hint = ValueHint::FilePath)]
        input: PathBuf,
        #[arg(value_hint = ValueHint::FilePath)]
        output: PathBuf,

        /// Fail instead of warning when the container's model hash differs
        #[arg(long)]
        strict: bool,

        /// Decode chunks one at a time on a single thread
        #[arg(long)]
        no_parallel: bool,
    },

    /// Print header fields of a container without decoding it
    Inspect {
        #[arg(value_hint = ValueHint::FilePath)]
        input: PathBuf,
    },

    /// Quick encode->decode check of both container variants
    SelfTest {
        #[arg(value_hint = ValueHint::FilePath)]
        input: PathBuf,

        #[arg(long, default_value_t = 128)]
        chunk_size: usize,

        #[arg(long, default_value_t = 16)]
        overlap_size: usize,
    },
}

fn spinner(message: &'static str) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(ProgressStyle::with_template("{spinner} {msg} [{elapsed}]").unwrap());
    bar.set_message(message);
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

fn load_tokenizer(path: &Path) -> Result<Arc<Tokenizer>> {
    let tokenizer = Tokenizer::from_file(path)
        .with_context(|| format!("failed loading tokenizer from {}", path.display()))?;
    Ok(Arc::new(tokenizer))
}

fn report_compression(result: &Compressed, elapsed: Duration) {
    println!("\n=== Compression Results ===");
    println!(
        "Input:  {} bytes ({} tokens)",
        result.original_size, result.token_count
    );
    println!("Output: {} bytes", result.compressed_size);
    println!(
        "Ratio:  {:.2}x ({:.2}%)",
        result.ratio,
        100.0 * result.compressed_size as f64 / result.original_size as f64
    );
    if let Some(chunks) = result.chunk_count {
        println!("Chunks: {}", chunks);
    }
    if result.token_count > 0 {
        println!(
            "Bits per token: {:.2}",
            8.0 * result.compressed_size as f64 / result.token_count as f64
        );
    }
    println!("Total time: {:.2}s", elapsed.as_secs_f64());
}

fn compress(
    cli: &Cli,
    input: &Path,
    output: &Path,
    chunked: bool,
    chunk_size: usize,
    overlap_size: usize,
) -> Result<()> {
    let t0 = Instant::now();
    let tokenizer = load_tokenizer(&cli.tokenizer)?;
    let text = fs::read_to_string(input)
        .with_context(|| format!("reading input from {}", input.display()))?;

    let bar = spinner("compressing");
    let result = if chunked {
        let factory = Arc::new(StubModelFactory {
            vocab_size: tokenizer.vocab_size(),
            seed: cli.model_seed,
        });
        let config = ChunkingConfig {
            chunk_size,
            overlap_size,
        };
        ChunkedCompressor::new(tokenizer, factory, config)?.compress(&text)?
    } else {
        let model = StubModel::new(tokenizer.vocab_size(), cli.model_seed);
        Compressor::new(tokenizer.clone(), Box::new(model))?.compress(&text)?
    };
    bar.finish_and_clear();

    fs::write(output, &result.data)
        .with_context(|| format!("writing output to {}", output.display()))?;

    report_compression(&result, t0.elapsed());
    Ok(())
}

fn decompress(cli: &Cli, input: &Path, output: &Path, strict: bool, no_parallel: bool) -> Result<()> {
    let t0 = Instant::now();
    let tokenizer = load_tokenizer(&cli.tokenizer)?;
    let data = fs::read(input)
        .with_context(|| format!("reading container from {}", input.display()))?;

    let vocab_size = tokenizer.vocab_size();
    let runtime_hash = StubModel::new(vocab_size, cli.model_seed).model_hash();
    let container_hash = if is_chunked(&data) {
        ChunkedHeader::from_bytes(&data)?.model_hash
    } else {
        PlainHeader::from_bytes(&data)?.model_hash
    };
    if strict && container_hash != runtime_hash {
        return Err(llmzip::Error::ModelMismatch {
            expected: container_hash,
            found: runtime_hash,
        }
        .into());
    }

    let bar = spinner("decompressing");
    let text = if is_chunked(&data) {
        let factory = Arc::new(StubModelFactory {
            vocab_size,
            seed: cli.model_seed,
        });
        ChunkedCompressor::new(tokenizer, factory, ChunkingConfig::default())?
            .decompress(&data, !no_parallel)?
    } else {
        let model = StubModel::new(vocab_size, cli.model_seed);
        Compressor::new(tokenizer, Box::new(model))?.decompress(&data)?
    };
    bar.finish_and_clear();

    fs::write(output, text.as_bytes())
        .with_context(|| format!("writing output to {}", output.display()))?;

    println!(
        "Decompressed {} bytes -> {} bytes in {:.2}s",
        data.len(),
        text.len(),
        t0.elapsed().as_secs_f64()
    );
    Ok(())
}

fn inspect(input: &Path) -> Result<()> {
    let data = fs::read(input)
        .with_context(|| format!("reading container from {}", input.display()))?;

    if is_chunked(&data) {
        let header = ChunkedHeader::from_bytes(&data)?;
        println!("Variant:      chunked (LLMP v1)");
        println!("Original:     {} bytes", header.original_len);
        println!("Tokens:       {}", header.total_token_count);
        println!("Model hash:   0x{:08x}", header.model_hash);
        println!("Chunks:       {}", header.chunk_count());
        println!("Chunk size:   {} tokens", header.chunk_size);
        println!("Overlap:      {} tokens", header.overlap_size);
        println!("Header size:  {} bytes", header.header_size());
        println!(
            "Payload:      {} bytes",
            data.len().saturating_sub(header.header_size())
        );
    } else {
        let header = PlainHeader::from_bytes(&data)?;
        println!("Variant:      plain (LLMC v1)");
        println!("Original:     {} bytes", header.original_len);
        println!("Tokens:       {}", header.token_count);
        println!("Model hash:   0x{:08x}", header.model_hash);
        println!(
            "Payload:      {} bytes",
            data.len().saturating_sub(llmzip::container::PLAIN_HEADER_SIZE)
        );
    }
    Ok(())
}

fn self_test(cli: &Cli, input: &Path, chunk_size: usize, overlap_size: usize) -> Result<()> {
    let tokenizer = load_tokenizer(&cli.tokenizer)?;
    let text = fs::read_to_string(input)
        .with_context(|| format!("reading input from {}", input.display()))?;
    let vocab_size = tokenizer.vocab_size();

    // Plain container.
    let t0 = Instant::now();
    let model = StubModel::new(vocab_size, cli.model_seed);
    let mut plain = Compressor::new(tokenizer.clone(), Box::new(model))?;
    let compressed = plain.compress(&text)?;
    let t1 = Instant::now();
    let restored = plain.decompress(&compressed.data)?;
    let t2 = Instant::now();
    if restored != text {
        bail!("plain roundtrip mismatch");
    }
    let bpb = 8.0 * compressed.compressed_size as f64 / text.len().max(1) as f64;
    println!("Plain:   {} -> {} bytes | bits/byte={:.3} | enc {:.2?} dec {:.2?}",
        compressed.original_size, compressed.compressed_size, bpb, t1 - t0, t2 - t1);

    // Chunked container, parallel decode.
    let factory = Arc::new(StubModelFactory {
        vocab_size,
        seed: cli.model_seed,
    });
    let config = ChunkingConfig {
        chunk_size,
        overlap_size,
    };
    let chunked = ChunkedCompressor::new(tokenizer, factory, config)?;
    let t3 = Instant::now();
    let compressed = chunked.compress(&text)?;
    let t4 = Instant::now();
    let restored = chunked.decompress(&compressed.data, true)?;
    let t5 = Instant::now();
    if restored != text {
        bail!("chunked roundtrip mismatch");
    }
    let bpb = 8.0 * compressed.compressed_size as f64 / text.len().max(1) as f64;
    println!(
        "Chunked: {} -> {} bytes | bits/byte={:.3} | chunks={} | enc {:.2?} dec {:.2?}",
        compressed.original_size,
        compressed.compressed_size,
        bpb,
        compressed.chunk_count.unwrap_or(0),
        t4 - t3,
        t5 - t4
    );

    println!("Roundtrip OK");
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match &cli.command {
        Commands::Compress {
            input,
            output,
            chunked,
            chunk_size,
            overlap_size,
        } => compress(&cli, input, output, *chunked, *chunk_size, *overlap_size),
        Commands::Decompress {
            input,
            output,
            strict,
            no_parallel,
        } => decompress(&cli, input, output, *strict, *no_parallel),
        Commands::Inspect { input } => inspect(input),
        Commands::SelfTest {
            input,
            chunk_size,
            overlap_size,
        } => self_test(&cli, input, *chunk_size, *overlap_size),
    }
}
