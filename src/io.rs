//! Request-scoped I/O types: responses, streaming observer, cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;

use crate::errors::EdgeLmError;

/// Token id in the tokenizer vocabulary.
pub type TokenId = u32;

/// Per-candidate generation output: text plus an optional score.
///
/// Scores are only meaningful under external sampling; internal sampling
/// leaves them at zero.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Responses {
    texts: Vec<String>,
    scores: Vec<f32>,
}

impl Responses {
    pub fn new(num_candidates: usize) -> Self {
        Self {
            texts: vec![String::new(); num_candidates],
            scores: vec![0.0; num_candidates],
        }
    }

    pub fn num_candidates(&self) -> usize {
        self.texts.len()
    }

    pub fn texts(&self) -> &[String] {
        &self.texts
    }

    pub fn texts_mut(&mut self) -> &mut [String] {
        &mut self.texts
    }

    pub fn scores(&self) -> &[f32] {
        &self.scores
    }

    pub fn scores_mut(&mut self) -> &mut [f32] {
        &mut self.scores
    }
}

/// Receives incremental results from a streaming decode.
///
/// Events for one request arrive in decode-step order; `on_error` or
/// `on_done` is the last event and is emitted at most once.
pub trait InferenceObserver {
    /// One decode step's worth of newly released text (and, under external
    /// sampling, the score of the token that produced it).
    fn on_next(&mut self, responses: Responses);

    /// Terminal failure. Any text delivered before this is valid and final.
    fn on_error(&mut self, error: &EdgeLmError);

    /// Successful completion.
    fn on_done(&mut self);
}

/// Monotonic cancellation flag shared between the caller and the decode
/// loop. The loop polls it once per decode step with acquire ordering;
/// any thread may set it.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}
