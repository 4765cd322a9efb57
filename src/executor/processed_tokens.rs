//! Ledger of tokens an executor has pushed through the model.

use crate::errors::{EdgeLmError, Result};
use crate::io::TokenId;

/// Tracks the tokens processed during one generation, plus at most one
/// "pending" input token that is part of the context but has not been run
/// through the model yet. Backends that need a seed token for the first
/// decode step park it here between prefill and decode.
///
/// `roll_back_to` lets the owner rewind after a cancelled or discarded
/// partial decode.
#[derive(Debug, Clone, Default)]
pub struct ProcessedTokens {
    tokens: Vec<TokenId>,
    pending_input: Option<TokenId>,
}

impl ProcessedTokens {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of processed tokens, inclusive of the pending input token.
    pub fn token_count(&self) -> usize {
        self.tokens.len() + usize::from(self.pending_input.is_some())
    }

    /// Step index the next unprocessed token will occupy.
    pub fn next_unprocessed_step(&self) -> usize {
        self.tokens.len()
    }

    /// Append tokens that have been run through the model.
    pub fn add_processed_tokens(&mut self, token_ids: &[TokenId]) {
        self.tokens.extend_from_slice(token_ids);
    }

    /// Park a token that is part of the context but not yet processed.
    pub fn set_pending_input_token(&mut self, token: TokenId) -> Result<()> {
        if self.pending_input.is_some() {
            return Err(EdgeLmError::Internal(
                "set_pending_input_token called with an existing pending token".to_string(),
            ));
        }
        self.pending_input = Some(token);
        Ok(())
    }

    pub fn pending_input_token(&self) -> Option<TokenId> {
        self.pending_input
    }

    /// Promote the pending input token to processed.
    pub fn mark_pending_input_processed(&mut self) -> Result<()> {
        match self.pending_input.take() {
            Some(token) => {
                self.tokens.push(token);
                Ok(())
            }
            None => Err(EdgeLmError::Internal(
                "mark_pending_input_processed called with no pending token".to_string(),
            )),
        }
    }

    /// Drop the pending input token, if any.
    pub fn invalidate_pending_input_token(&mut self) {
        self.pending_input = None;
    }

    /// Rewind to `new_step` tokens. Rewinding drops the pending input token.
    pub fn roll_back_to(&mut self, new_step: usize) -> Result<()> {
        if new_step > self.token_count() {
            return Err(EdgeLmError::Internal(format!(
                "roll_back_to target {} exceeds token count {}",
                new_step,
                self.token_count()
            )));
        }
        if new_step == self.token_count() {
            return Ok(());
        }
        self.pending_input = None;
        self.tokens.truncate(new_step);
        Ok(())
    }

    /// Token at `step`, or `None` when the step is out of range.
    pub fn token_at_step(&self, step: usize) -> Option<TokenId> {
        if step < self.tokens.len() {
            return Some(self.tokens[step]);
        }
        if step == self.tokens.len() {
            return self.pending_input;
        }
        None
    }

    /// Full token sequence, inclusive of the pending input token.
    pub fn copy_of_tokens(&self) -> Vec<TokenId> {
        let mut tokens = self.tokens.clone();
        if let Some(pending) = self.pending_input {
            tokens.push(pending);
        }
        tokens
    }
}
