//! Byte-level BPE tokenizer.
//!
//! Loads a vocabulary and ranked merge list from a tokenizer JSON document
//! and converts text to token ids and back. Input bytes are first mapped
//! through the visible byte alphabet, then adjacent pieces are merged by
//! ascending merge rank until no ranked pair remains. Decoding concatenates
//! piece strings and inverts the byte mapping, so the round trip is lossless
//! on any UTF-8 input.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::warn;

use crate::alphabet;
use crate::error::{Error, Result};

#[derive(Debug, Deserialize)]
struct TokenizerJson {
    model: ModelSection,
    #[serde(default)]
    added_tokens: Vec<AddedTokenJson>,
}

#[derive(Debug, Deserialize)]
struct ModelSection {
    vocab: HashMap<String, u32>,
    merges: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct AddedTokenJson {
    id: u32,
    content: String,
    #[serde(default)]
    special: bool,
}

/// Loaded vocabulary plus merge table. Read-only after construction and
/// freely shareable across threads.
pub struct Tokenizer {
    vocab: HashMap<String, u32>,
    id_to_piece: HashMap<u32, String>,
    /// `"left right"` pair key to merge rank; list order defines rank,
    /// 0 is highest priority.
    merge_ranks: HashMap<String, u32>,
    vocab_size: usize,
}

fn pair_key(left: &str, right: &str) -> String {
    let mut key = String::with_capacity(left.len() + right.len() + 1);
    key.push_str(left);
    key.push(' ');
    key.push_str(right);
    key
}

impl Tokenizer {
    /// Load from a tokenizer JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Load from tokenizer JSON text.
    pub fn from_json_str(contents: &str) -> Result<Self> {
        let spec: TokenizerJson = serde_json::from_str(contents)
            .map_err(|e| Error::InvalidTokenizer(format!("malformed JSON: {e}")))?;

        if spec.model.vocab.is_empty() {
            return Err(Error::InvalidTokenizer("empty vocabulary".into()));
        }

        let mut vocab = spec.model.vocab;
        let mut id_to_piece = HashMap::with_capacity(vocab.len());
        for (piece, &id) in &vocab {
            if let Some(previous) = id_to_piece.insert(id, piece.clone()) {
                return Err(Error::InvalidTokenizer(format!(
                    "id {id} assigned to both {previous:?} and {piece:?}"
                )));
            }
        }

        for added in &spec.added_tokens {
            match id_to_piece.get(&added.id) {
                Some(existing) if *existing != added.content => {
                    return Err(Error::InvalidTokenizer(format!(
                        "added token id {} conflicts with piece {existing:?}",
                        added.id
                    )));
                }
                Some(_) => {}
                None => {
                    id_to_piece.insert(added.id, added.content.clone());
                }
            }
            // Special entries are atomic vocabulary pieces.
            if added.special {
                vocab.entry(added.content.clone()).or_insert(added.id);
            }
        }

        let mut merge_ranks = HashMap::with_capacity(spec.model.merges.len());
        for (rank, line) in spec.model.merges.iter().enumerate() {
            let Some((left, right)) = line.split_once(' ') else {
                return Err(Error::InvalidTokenizer(format!(
                    "merge entry {rank} is not of the form \"a b\": {line:?}"
                )));
            };
            if left.is_empty() || right.is_empty() || right.contains(' ') {
                return Err(Error::InvalidTokenizer(format!(
                    "merge entry {rank} is not of the form \"a b\": {line:?}"
                )));
            }
            let merged: String = format!("{left}{right}");
            if !vocab.contains_key(&merged) {
                warn!(rank, merged = %merged, "merge result has no vocabulary entry");
            }
            if merge_ranks.insert(line.clone(), rank as u32).is_some() {
                return Err(Error::InvalidTokenizer(format!(
                    "duplicate merge entry {line:?}"
                )));
            }
        }

        let vocab_size = id_to_piece.keys().max().map_or(0, |&id| id as usize + 1);

        Ok(Self {
            vocab,
            id_to_piece,
            merge_ranks,
            vocab_size,
        })
    }

    /// One past the highest token id.
    pub fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    /// Encode text to a token id sequence.
    pub fn encode(&self, text: &str) -> Result<Vec<u32>> {
        if text.is_empty() {
            return Ok(Vec::new());
        }

        let visible = alphabet::bytes_to_visible(text.as_bytes());
        let mut pieces: Vec<String> = visible.chars().map(String::from).collect();

        while pieces.len() > 1 {
            // Globally lowest-rank adjacent pair; ranks are unique so the
            // pair itself is unambiguous.
            let mut best: Option<(u32, usize)> = None;
            for i in 0..pieces.len() - 1 {
                if let Some(&rank) = self.merge_ranks.get(&pair_key(&pieces[i], &pieces[i + 1])) {
                    if best.map_or(true, |(best_rank, _)| rank < best_rank) {
                        best = Some((rank, i));
                    }
                }
            }
            let Some((_, first)) = best else { break };

            // One left-to-right sweep merging every non-overlapping
            // occurrence of the winning pair.
            let left = pieces[first].clone();
            let right = pieces[first + 1].clone();
            let mut merged = Vec::with_capacity(pieces.len());
            let mut i = 0;
            while i < pieces.len() {
                if i + 1 < pieces.len() && pieces[i] == left && pieces[i + 1] == right {
                    let mut piece = String::with_capacity(left.len() + right.len());
                    piece.push_str(&left);
                    piece.push_str(&right);
                    merged.push(piece);
                    i += 2;
                } else {
                    merged.push(std::mem::take(&mut pieces[i]));
                    i += 1;
                }
            }
            pieces = merged;
        }

        let mut ids = Vec::with_capacity(pieces.len());
        for piece in &pieces {
            match self.vocab.get(piece) {
                Some(&id) => ids.push(id),
                None => {
                    // Broken vocabulary; recover per codepoint where possible.
                    warn!(piece = %piece, "piece has no vocabulary entry, retrying per codepoint");
                    for ch in piece.chars() {
                        let single = ch.to_string();
                        match self.vocab.get(&single) {
                            Some(&id) => ids.push(id),
                            None => return Err(Error::UnknownPiece(single)),
                        }
                    }
                }
            }
        }
        Ok(ids)
    }

    /// Decode a token id sequence back to text.
    pub fn decode(&self, tokens: &[u32]) -> Result<String> {
        let mut visible = String::new();
        for &token in tokens {
            let piece = self
                .id_to_piece
                .get(&token)
                .ok_or(Error::UnknownToken(token))?;
            visible.push_str(piece);
        }
        let bytes = alphabet::visible_to_bytes(&visible)?;
        Ok(String::from_utf8(bytes)?)
    }
}
