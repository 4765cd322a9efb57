//! The executor seam: the model backend consumed by the pipeline.

pub mod processed_tokens;

use crate::io::TokenId;

pub use processed_tokens::ProcessedTokens;

/// Fallback KV-cache budget for executors that cannot report one.
pub const DEFAULT_MAX_NUM_TOKENS: usize = 4096;

/// Token-id inputs submitted to the executor for prefill or logits decode.
#[derive(Debug, Clone)]
pub struct ExecutorInputs {
    token_ids: Vec<TokenId>,
}

impl ExecutorInputs {
    pub fn from_token_ids(token_ids: Vec<TokenId>) -> Self {
        Self { token_ids }
    }

    pub fn token_ids(&self) -> &[TokenId] {
        &self.token_ids
    }
}

/// Prefill submission options.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrefillParams {
    /// Block until the executor has fully consumed the prompt.
    pub wait_for_completion: bool,
}

/// Static executor properties.
#[derive(Debug, Clone, Copy)]
pub struct ExecutorSettings {
    /// KV-cache token budget.
    pub max_num_tokens: usize,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            max_num_tokens: DEFAULT_MAX_NUM_TOKENS,
        }
    }
}

/// Synchronous model backend driven by the pipeline.
///
/// The executor owns the KV cache; `current_step` reports how many tokens
/// it holds. Implementations may thread tensor work internally but every
/// method blocks until its result is ready. One executor context serves
/// one generation at a time.
pub trait LlmExecutor {
    /// Load the prompt tokens into the KV cache in a single call.
    fn prefill(&mut self, inputs: &ExecutorInputs, params: &PrefillParams) -> anyhow::Result<()>;

    /// Internal-sampling decode: write the next token id for each candidate
    /// into `output_tokens` (one slot per candidate).
    fn decode(&mut self, output_tokens: &mut [TokenId]) -> anyhow::Result<()>;

    /// External-sampling decode: consume the previous step's sampled ids and
    /// return per-candidate logits over the vocabulary.
    fn decode_logits(&mut self, inputs: &ExecutorInputs) -> anyhow::Result<Vec<Vec<f32>>>;

    /// Number of tokens currently in the KV cache.
    fn current_step(&self) -> usize;

    fn settings(&self) -> anyhow::Result<ExecutorSettings>;
}

/// Executor cache budget, with a logged fallback when settings are
/// unavailable.
pub(crate) fn try_get_max_num_tokens(executor: &dyn LlmExecutor) -> usize {
    match executor.settings() {
        Ok(settings) => settings.max_num_tokens,
        Err(e) => {
            tracing::warn!("failed to get executor settings: {e}");
            DEFAULT_MAX_NUM_TOKENS
        }
    }
}
