//! Stop-sequence detection across candidates.

use crate::errors::{EdgeLmError, Result};
use crate::io::TokenId;

#[derive(Debug, Clone, Default)]
struct CandidateState {
    done: bool,
    /// Recent token ids, capped at the longest configured stop sequence.
    window: Vec<TokenId>,
    /// Length of the longest window suffix that is a proper prefix of some
    /// stop sequence. Counted in tokens, which at one detector advance per
    /// decode step is also the bound on deferred text fragments.
    matched_len: usize,
}

/// Per-candidate state machine over configured multi-token stop sequences.
///
/// Each decode step feeds one token per candidate. A token either completes
/// a stop sequence (the candidate freezes), extends the current partial
/// match, or falls back to the longest recent-token suffix that still
/// prefixes some sequence.
#[derive(Debug, Clone)]
pub struct StopTokenDetector {
    stop_sequences: Vec<Vec<TokenId>>,
    max_stop_len: usize,
    states: Vec<CandidateState>,
}

impl StopTokenDetector {
    pub fn new(num_candidates: usize, stop_sequences: Vec<Vec<TokenId>>) -> Result<Self> {
        if num_candidates == 0 {
            return Err(EdgeLmError::InvalidArgument(
                "num_candidates must be positive".to_string(),
            ));
        }
        if stop_sequences.iter().any(|s| s.is_empty()) {
            return Err(EdgeLmError::InvalidArgument(
                "stop sequences must not be empty".to_string(),
            ));
        }
        let max_stop_len = stop_sequences.iter().map(Vec::len).max().unwrap_or(0);
        Ok(Self {
            stop_sequences,
            max_stop_len,
            states: vec![CandidateState::default(); num_candidates],
        })
    }

    pub fn num_candidates(&self) -> usize {
        self.states.len()
    }

    /// Advance every candidate by one token.
    pub fn process(&mut self, next_tokens: &[TokenId]) -> Result<()> {
        if next_tokens.len() != self.states.len() {
            return Err(EdgeLmError::Internal(format!(
                "expected {} tokens, got {}",
                self.states.len(),
                next_tokens.len()
            )));
        }
        for (state, &token) in self.states.iter_mut().zip(next_tokens) {
            if state.done || self.max_stop_len == 0 {
                continue;
            }
            state.window.push(token);
            let overflow = state.window.len().saturating_sub(self.max_stop_len);
            if overflow > 0 {
                state.window.drain(..overflow);
            }

            if self
                .stop_sequences
                .iter()
                .any(|s| ends_with(&state.window, s))
            {
                state.done = true;
                continue;
            }

            state.matched_len = self
                .stop_sequences
                .iter()
                .map(|s| longest_prefix_suffix(&state.window, s))
                .max()
                .unwrap_or(0);
        }
        Ok(())
    }

    pub fn done(&self, candidate: usize) -> bool {
        self.states[candidate].done
    }

    /// True once every candidate has matched a full stop sequence.
    pub fn all_done(&self) -> bool {
        self.states.iter().all(|s| s.done)
    }

    /// Length of the longest currently possible partial stop prefix for the
    /// candidate, in decoded-fragment units; 0 when none (or when the
    /// candidate is already done).
    pub fn max_partial_stop_len(&self, candidate: usize) -> usize {
        let state = &self.states[candidate];
        if state.done {
            0
        } else {
            state.matched_len
        }
    }
}

fn ends_with(window: &[TokenId], sequence: &[TokenId]) -> bool {
    window.len() >= sequence.len() && window[window.len() - sequence.len()..] == *sequence
}

/// Longest proper prefix of `sequence` that is a suffix of `window`.
fn longest_prefix_suffix(window: &[TokenId], sequence: &[TokenId]) -> usize {
    let upper = (sequence.len() - 1).min(window.len());
    for len in (1..=upper).rev() {
        if window[window.len() - len..] == sequence[..len] {
            return len;
        }
    }
    0
}
