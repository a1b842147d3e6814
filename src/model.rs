//! Language-model facade.
//!
//! The compression driver only ever sees this narrow interface: feed one
//! context token, get back a fresh probability vector over the whole
//! vocabulary. Inference backends live behind it; the deterministic stub
//! below drives the full pipeline in tests and in the CLI when no backend
//! is wired up.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Next-token predictor consumed by the coder loops.
///
/// Implementations must be deterministic: after identical resets and
/// identical input sequences, `process_token` returns bit-identical
/// probability vectors. Instances own private mutable state and are never
/// shared across threads.
pub trait LanguageModel: Send {
    /// Return the internal state to its post-construction values.
    fn reset(&mut self);

    /// Advance the state by one context token and return the probability
    /// vector for the next token. The vector has length [`vocab_size`]
    /// and sums to approximately 1.
    ///
    /// [`vocab_size`]: LanguageModel::vocab_size
    fn process_token(&mut self, ctx: u32) -> Vec<f32>;

    /// Stable identifier for the model variant, embedded in container
    /// headers and checked on decompression.
    fn model_hash(&self) -> u32;

    /// Vocabulary size `V`.
    fn vocab_size(&self) -> usize;
}

/// Produces fresh private model instances for parallel chunk decoding.
pub trait ModelFactory: Send + Sync {
    fn create(&self) -> Box<dyn LanguageModel>;
}

const STUB_NAME: &str = "llmzip-stub";

#[inline]
fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    x ^ (x >> 31)
}

/// Deterministic recurrent stub model.
///
/// Carries a rolling 64-bit state updated per token and derives a peaked
/// pseudo-distribution from it: a small noise floor over the whole
/// vocabulary plus concentrated mass on a handful of state-dependent
/// favored tokens. Good enough to exercise every coder path while staying
/// bit-reproducible everywhere.
pub struct StubModel {
    vocab_size: usize,
    seed: u64,
    state: u64,
}

impl StubModel {
    pub fn new(vocab_size: usize, seed: u64) -> Self {
        assert!(vocab_size >= 2, "vocabulary must have at least two symbols");
        Self {
            vocab_size,
            seed,
            state: splitmix64(seed),
        }
    }
}

impl LanguageModel for StubModel {
    fn reset(&mut self) {
        self.state = splitmix64(self.seed);
    }

    fn process_token(&mut self, ctx: u32) -> Vec<f32> {
        self.state = splitmix64(self.state ^ ((ctx as u64) << 1 | 1));

        let v = self.vocab_size;
        let mut probs = vec![0f32; v];
        let mut mass = 0f32;

        let mut h = self.state;
        for p in probs.iter_mut() {
            h = splitmix64(h);
            // Noise floor in 1..=16.
            *p = 1.0 + (h >> 60) as f32;
            mass += *p;
        }

        // Concentrate extra mass on eight state-dependent tokens.
        let mut g = self.state;
        let bonus = v as f32 / 2.0;
        for _ in 0..8 {
            g = splitmix64(g);
            let idx = (g % v as u64) as usize;
            probs[idx] += bonus;
            mass += bonus;
        }

        for p in probs.iter_mut() {
            *p /= mass;
        }
        probs
    }

    fn model_hash(&self) -> u32 {
        let mut hasher = DefaultHasher::new();
        STUB_NAME.hash(&mut hasher);
        self.seed.hash(&mut hasher);
        self.vocab_size.hash(&mut hasher);
        (hasher.finish() & 0xFFFF_FFFF) as u32
    }

    fn vocab_size(&self) -> usize {
        self.vocab_size
    }
}

/// Factory for [`StubModel`] instances sharing one configuration.
pub struct StubModelFactory {
    pub vocab_size: usize,
    pub seed: u64,
}

impl ModelFactory for StubModelFactory {
    fn create(&self) -> Box<dyn LanguageModel> {
        Box::new(StubModel::new(self.vocab_size, self.seed))
    }
}
