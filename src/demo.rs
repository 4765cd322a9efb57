//! Deterministic demo collaborators: run the pipeline without a model.

use anyhow::anyhow;

use crate::executor::{
    ExecutorInputs, ExecutorSettings, LlmExecutor, PrefillParams, ProcessedTokens,
};
use crate::io::TokenId;
use crate::tokenizer::{DecodedText, Tokenizer};

/// End-of-sequence token id used by the demo vocabulary.
pub const DEMO_EOS_TOKEN: TokenId = 2;

/// A tiny deterministic executor: the next token for candidate `i` is an
/// affine function of the candidate's previous token. Useful for examples,
/// benches, and exercising the pipeline end to end.
pub struct DemoExecutor {
    vocab_size: u32,
    max_num_tokens: usize,
    processed: ProcessedTokens,
    last_tokens: Vec<TokenId>,
}

impl DemoExecutor {
    pub fn new(vocab_size: u32, max_num_tokens: usize) -> Self {
        Self {
            vocab_size: vocab_size.max(4),
            max_num_tokens,
            processed: ProcessedTokens::new(),
            last_tokens: Vec::new(),
        }
    }

    /// Tokens the executor has pushed through the model so far.
    pub fn processed_tokens(&self) -> &ProcessedTokens {
        &self.processed
    }

    fn next_token(&self, last: TokenId, candidate: usize) -> TokenId {
        (last.wrapping_mul(31).wrapping_add(7 + candidate as u32)) % self.vocab_size
    }

    fn seed(&mut self, num_candidates: usize) -> anyhow::Result<TokenId> {
        let count = self.processed.token_count();
        if count == 0 {
            return Err(anyhow!("decode called before prefill"));
        }
        if self.last_tokens.len() != num_candidates {
            let last = self
                .processed
                .token_at_step(count - 1)
                .ok_or_else(|| anyhow!("no processed tokens"))?;
            self.last_tokens = vec![last; num_candidates];
        }
        Ok(self.last_tokens[0])
    }
}

impl LlmExecutor for DemoExecutor {
    fn prefill(&mut self, inputs: &ExecutorInputs, _params: &PrefillParams) -> anyhow::Result<()> {
        if inputs.token_ids().is_empty() {
            return Err(anyhow!("prefill with empty token ids"));
        }
        self.processed.add_processed_tokens(inputs.token_ids());
        self.last_tokens.clear();
        Ok(())
    }

    fn decode(&mut self, output_tokens: &mut [TokenId]) -> anyhow::Result<()> {
        self.seed(output_tokens.len())?;
        for (i, slot) in output_tokens.iter_mut().enumerate() {
            let next = self.next_token(self.last_tokens[i], i);
            self.last_tokens[i] = next;
            *slot = next;
        }
        // One decode step occupies one cache slot regardless of candidates.
        self.processed.add_processed_tokens(&[output_tokens[0]]);
        Ok(())
    }

    fn decode_logits(&mut self, inputs: &ExecutorInputs) -> anyhow::Result<Vec<Vec<f32>>> {
        let seeds = inputs.token_ids();
        if seeds.is_empty() {
            return Err(anyhow!("decode_logits with empty seed ids"));
        }
        self.seed(seeds.len())?;
        let mut logits = Vec::with_capacity(seeds.len());
        for (i, &seed) in seeds.iter().enumerate() {
            let next = self.next_token(seed, i);
            let mut row = vec![0.0f32; self.vocab_size as usize];
            row[next as usize] = 8.0;
            logits.push(row);
        }
        self.processed.add_processed_tokens(&[seeds[0]]);
        Ok(logits)
    }

    fn current_step(&self) -> usize {
        self.processed.token_count()
    }

    fn settings(&self) -> anyhow::Result<ExecutorSettings> {
        Ok(ExecutorSettings {
            max_num_tokens: self.max_num_tokens,
        })
    }
}

/// Fixed-vocabulary tokenizer emitting SentencePiece-style word pieces
/// ("\u{2581}w{id}"), so the assembler's metaspace normalization is visible
/// in demo output.
pub struct DemoTokenizer;

impl DemoTokenizer {
    fn piece(id: TokenId) -> String {
        if id == DEMO_EOS_TOKEN {
            "</s>".to_string()
        } else {
            format!("\u{2581}w{id}")
        }
    }
}

impl Tokenizer for DemoTokenizer {
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
        Ok(token_ids
            .iter()
            .map(|chain| DecodedText {
                text: chain.iter().map(|&id| Self::piece(id)).collect(),
                incomplete: false,
            })
            .collect())
    }
}
