//! A single decode iteration: sample next tokens, advance stop detection,
//! assemble releasable text.

use crate::benchmark::BenchmarkInfo;
use crate::errors::{EdgeLmError, Result};
use crate::executor::{ExecutorInputs, LlmExecutor};
use crate::io::TokenId;
use crate::pipeline::assembler::TokenStreamAssembler;
use crate::pipeline::stop::StopTokenDetector;
use crate::sampler::Sampler;
use crate::tokenizer::Tokenizer;

/// External sampling collaborators: the sampler plus the caller-owned seed
/// id buffer it updates in place each step.
pub struct ExternalSampling<'a> {
    pub sampler: &'a mut dyn Sampler,
    pub decoded_ids: &'a mut Vec<TokenId>,
}

/// How the next token ids are produced, and who owns the buffer they land
/// in.
enum SamplingMode<'a> {
    /// The executor samples internally into a step-owned `[N]` buffer.
    Internal { output_tokens: Vec<TokenId> },
    /// The executor produces logits; the caller's sampler turns them into
    /// ids (written back into the caller's seed buffer) and scores.
    External {
        sampler: &'a mut dyn Sampler,
        decoded_ids: &'a mut Vec<TokenId>,
        scores: Vec<f32>,
    },
}

/// One decode step, holding the per-request scratch shared across steps.
pub(crate) struct DecodeStep<'a> {
    num_candidates: usize,
    mode: SamplingMode<'a>,
    detector: StopTokenDetector,
    assembler: TokenStreamAssembler,
    step_text: Vec<String>,
}

impl<'a> DecodeStep<'a> {
    pub(crate) fn new(
        num_candidates: usize,
        sampling: Option<ExternalSampling<'a>>,
        detector: StopTokenDetector,
    ) -> Self {
        let mode = match sampling {
            Some(ExternalSampling {
                sampler,
                decoded_ids,
            }) => SamplingMode::External {
                sampler,
                decoded_ids,
                scores: vec![0.0; num_candidates],
            },
            None => SamplingMode::Internal {
                output_tokens: vec![0; num_candidates],
            },
        };
        Self {
            num_candidates,
            mode,
            detector,
            assembler: TokenStreamAssembler::new(num_candidates),
            step_text: vec![String::new(); num_candidates],
        }
    }

    /// Run one step. Returns true once every candidate has hit a stop.
    pub(crate) fn run(
        &mut self,
        executor: &mut dyn LlmExecutor,
        tokenizer: &dyn Tokenizer,
        mut benchmark: Option<&mut BenchmarkInfo>,
    ) -> Result<bool> {
        let next_tokens = self.decode_and_sample(executor, benchmark.as_deref_mut())?;

        let token_ids = tokenizer
            .tensor_to_token_ids(&next_tokens)
            .map_err(EdgeLmError::Tokenizer)?;
        let token_ids = tokenizer
            .merge_token_ids(&self.assembler.pending(), token_ids)
            .map_err(EdgeLmError::Tokenizer)?;

        // Stop detection always runs on the raw step tokens, BPE or not.
        self.detector.process(&next_tokens)?;

        let decoded = tokenizer
            .token_ids_to_texts(self.num_candidates, &token_ids)
            .map_err(EdgeLmError::Tokenizer)?;

        for i in 0..self.num_candidates {
            let max_partial = self.detector.max_partial_stop_len(i);
            self.step_text[i] = self.assembler.assemble(
                i,
                &token_ids[i],
                &decoded[i],
                self.detector.done(i),
                max_partial,
            );
        }

        Ok(self.detector.all_done())
    }

    /// Text released for the candidate by the latest step.
    pub(crate) fn result_text(&self, candidate: usize) -> &str {
        &self.step_text[candidate]
    }

    /// Per-candidate scores from the latest step; only present under
    /// external sampling.
    pub(crate) fn scores(&self) -> Option<&[f32]> {
        match &self.mode {
            SamplingMode::External { scores, .. } => Some(scores),
            SamplingMode::Internal { .. } => None,
        }
    }

    fn decode_and_sample(
        &mut self,
        executor: &mut dyn LlmExecutor,
        mut benchmark: Option<&mut BenchmarkInfo>,
    ) -> Result<Vec<TokenId>> {
        match &mut self.mode {
            SamplingMode::Internal { output_tokens } => {
                if let Some(b) = benchmark.as_deref_mut() {
                    b.time_mark_delta("executor_decode_and_sample")?;
                }
                executor
                    .decode(output_tokens)
                    .map_err(EdgeLmError::Executor)?;
                if let Some(b) = benchmark.as_deref_mut() {
                    b.time_mark_delta("executor_decode_and_sample")?;
                }
                Ok(output_tokens.clone())
            }
            SamplingMode::External {
                sampler,
                decoded_ids,
                scores,
            } => {
                // Submit a copy; the seed buffer is about to be overwritten
                // by the sampler.
                let inputs = ExecutorInputs::from_token_ids(decoded_ids.clone());

                if let Some(b) = benchmark.as_deref_mut() {
                    b.time_mark_delta("executor_decode")?;
                }
                let logits = executor
                    .decode_logits(&inputs)
                    .map_err(EdgeLmError::Executor)?;
                if let Some(b) = benchmark.as_deref_mut() {
                    b.time_mark_delta("executor_decode")?;
                }

                if let Some(b) = benchmark.as_deref_mut() {
                    b.time_mark_delta("sampling")?;
                }
                sampler
                    .sample(&logits, decoded_ids, scores)
                    .map_err(EdgeLmError::Sampler)?;
                if let Some(b) = benchmark.as_deref_mut() {
                    b.time_mark_delta("sampling")?;
                }

                Ok(decoded_ids.clone())
            }
        }
    }
}
