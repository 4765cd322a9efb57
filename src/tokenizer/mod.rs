//! Tokenizer integration: the text seam consumed by the pipeline.

use std::char::REPLACEMENT_CHARACTER;
use std::path::Path;

use anyhow::anyhow;

use crate::io::TokenId;

/// Decoded text for one candidate, with the tokenizer's signal that the
/// underlying token chain does not yet end on a full UTF-8 boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedText {
    pub text: String,
    pub incomplete: bool,
}

/// Mapping between token ids and text fragments.
///
/// `tensor_to_token_ids` and `merge_token_ids` have shape-only default
/// implementations; backends override `token_ids_to_texts` (and
/// `is_incomplete` if their incomplete-chain signal differs from the
/// trailing-replacement-character convention).
pub trait Tokenizer {
    /// Split a flat `[num_candidates]` id buffer into one id chain per
    /// candidate.
    fn tensor_to_token_ids(&self, step_tokens: &[TokenId]) -> anyhow::Result<Vec<Vec<TokenId>>> {
        Ok(step_tokens.iter().map(|&id| vec![id]).collect())
    }

    /// Prepend each candidate's carried-over continuation ids to its new
    /// ids.
    fn merge_token_ids(
        &self,
        pending: &[Vec<TokenId>],
        new_ids: Vec<Vec<TokenId>>,
    ) -> anyhow::Result<Vec<Vec<TokenId>>> {
        if pending.len() != new_ids.len() {
            return Err(anyhow!(
                "candidate count mismatch: {} pending vs {} new",
                pending.len(),
                new_ids.len()
            ));
        }
        Ok(pending
            .iter()
            .zip(new_ids)
            .map(|(carry, new)| {
                let mut merged = carry.clone();
                merged.extend(new);
                merged
            })
            .collect())
    }

    /// Decode each candidate's id chain to text, flagging incomplete
    /// multi-byte chains.
    fn token_ids_to_texts(
        &self,
        num_candidates: usize,
        token_ids: &[Vec<TokenId>],
    ) -> anyhow::Result<Vec<DecodedText>>;

    /// Whether decoded text signals an incomplete multi-byte chain.
    fn is_incomplete(&self, text: &str) -> bool {
        text.ends_with(REPLACEMENT_CHARACTER)
    }
}

/// Wrapper around HuggingFace tokenizers.
///
/// Byte-level decoders emit U+FFFD for a chain that stops mid-codepoint,
/// which is exactly the incomplete-BPE signal the pipeline buffers on.
pub struct HfTokenizer {
    tokenizer: tokenizers::Tokenizer,
}

impl HfTokenizer {
    /// Load from a JSON file (e.g. tokenizer.json).
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let tokenizer = tokenizers::Tokenizer::from_file(path.as_ref())
            .map_err(|e| anyhow!("failed to load tokenizer: {e}"))?;
        Ok(Self { tokenizer })
    }

    /// Encode text to token ids.
    pub fn encode(&self, text: &str) -> anyhow::Result<Vec<TokenId>> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| anyhow!("encode failed: {e}"))?;
        Ok(encoding.get_ids().to_vec())
    }

    /// Decode token ids to text, skipping special tokens.
    pub fn decode(&self, ids: &[TokenId]) -> anyhow::Result<String> {
        self.tokenizer
            .decode(ids, true)
            .map_err(|e| anyhow!("decode failed: {e}"))
    }
}

impl Tokenizer for HfTokenizer {
    fn token_ids_to_texts(
        &self,
        num_candidates: usize,
        token_ids: &[Vec<TokenId>],
    ) -> anyhow::Result<Vec<DecodedText>> {
        if token_ids.len() != num_candidates {
            return Err(anyhow!(
                "expected {} candidates, got {}",
                num_candidates,
                token_ids.len()
            ));
        }
        token_ids
            .iter()
            .map(|chain| {
                let text = self.decode(chain)?;
                let incomplete = self.is_incomplete(&text);
                Ok(DecodedText { text, incomplete })
            })
            .collect()
    }
}
