//! Per-candidate assembly of releasable text from decoded fragments.

use std::collections::VecDeque;

use crate::io::TokenId;
use crate::tokenizer::DecodedText;

/// SentencePiece metaspace marker leaked by some tokenizers.
const METASPACE: char = '\u{2581}';

#[derive(Debug, Clone, Default)]
struct CandidateScratch {
    /// Token ids of an incomplete multi-byte chain, re-merged with the next
    /// step's ids before decoding.
    bpe_pending: Vec<TokenId>,
    /// Fragments that might belong to an unfolding stop sequence. Holds at
    /// most the detector's current partial-match length; overflow releases
    /// the oldest fragment.
    deferred: VecDeque<String>,
}

/// Merges incomplete BPE chains and withholds fragments that could still
/// turn into a stop sequence, emitting only the safely releasable text for
/// each step.
#[derive(Debug, Clone)]
pub struct TokenStreamAssembler {
    candidates: Vec<CandidateScratch>,
}

impl TokenStreamAssembler {
    pub fn new(num_candidates: usize) -> Self {
        Self {
            candidates: vec![CandidateScratch::default(); num_candidates],
        }
    }

    /// Carried-over continuation ids per candidate, for
    /// `Tokenizer::merge_token_ids`.
    pub fn pending(&self) -> Vec<Vec<TokenId>> {
        self.candidates
            .iter()
            .map(|c| c.bpe_pending.clone())
            .collect()
    }

    /// Process one candidate's step. `merged_ids` is the full id chain the
    /// decode came from, `stopped` the detector's done flag, and
    /// `max_partial` its current partial-match length (after this step's
    /// token).
    pub fn assemble(
        &mut self,
        candidate: usize,
        merged_ids: &[TokenId],
        decoded: &DecodedText,
        stopped: bool,
        max_partial: usize,
    ) -> String {
        let scratch = &mut self.candidates[candidate];
        if decoded.incomplete {
            // Not a full UTF-8 boundary yet; carry the whole chain forward.
            scratch.bpe_pending = merged_ids.to_vec();
            return String::new();
        }
        if stopped {
            // The candidate finished; trailing text must not leak.
            return String::new();
        }
        scratch.bpe_pending.clear();

        let mut released = String::new();
        if max_partial > 0 {
            scratch.deferred.push_back(decoded.text.clone());
        }
        while scratch.deferred.len() > max_partial {
            if let Some(fragment) = scratch.deferred.pop_front() {
                released.push_str(&fragment);
            }
        }
        if max_partial == 0 {
            released.push_str(&decoded.text);
        }

        normalize_metaspace(&released)
    }
}

/// Replace the metaspace marker with a plain space in released output. The
/// tokenizer's own strings are left untouched.
fn normalize_metaspace(text: &str) -> String {
    if text.contains(METASPACE) {
        text.replace(METASPACE, " ")
    } else {
        text.to_string()
    }
}
