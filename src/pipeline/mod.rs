//! The inference pipeline: prefill driver, decode loop, and the public
//! decode entry points.
//!
//! Data flows linearly: prompt -> `prefill` -> decode loop (one
//! [`step::DecodeStep`] per token) -> [`Responses`] or observer events.

pub mod assembler;
pub mod step;
pub mod stop;

use tracing::debug;

use crate::benchmark::BenchmarkInfo;
use crate::errors::{EdgeLmError, Result};
use crate::executor::{try_get_max_num_tokens, ExecutorInputs, LlmExecutor, PrefillParams};
use crate::io::{CancelFlag, InferenceObserver, Responses, TokenId};
use crate::sampler::Sampler;
use crate::tokenizer::Tokenizer;

pub use assembler::TokenStreamAssembler;
pub use step::ExternalSampling;
pub use stop::StopTokenDetector;

use step::DecodeStep;

/// Validate the prompt against the cache budget and submit it to the
/// executor. Returns the last prompt token id, which some backends need as
/// the seed for the first decode step.
pub fn prefill(
    executor: &mut dyn LlmExecutor,
    inputs: &ExecutorInputs,
    wait_for_completion: bool,
    mut benchmark: Option<&mut BenchmarkInfo>,
) -> Result<TokenId> {
    let max_num_tokens = try_get_max_num_tokens(executor);
    let ids = inputs.token_ids();
    if ids.is_empty() {
        return Err(EdgeLmError::InvalidArgument(
            "input token ids are empty".to_string(),
        ));
    }
    if ids.len() >= max_num_tokens {
        return Err(EdgeLmError::InvalidArgument(format!(
            "input token ids are too long, exceeding the maximum number of tokens allowed: {} >= {}",
            ids.len(),
            max_num_tokens
        )));
    }
    let last_token_id = ids[ids.len() - 1];

    if let Some(b) = benchmark.as_deref_mut() {
        b.time_prefill_turn_start()?;
    }
    let params = PrefillParams {
        wait_for_completion,
    };
    executor
        .prefill(inputs, &params)
        .map_err(EdgeLmError::Executor)?;
    if let Some(b) = benchmark {
        b.time_prefill_turn_end(ids.len())?;
    }
    Ok(last_token_id)
}

/// Single-candidate batch decode with the executor's internal sampling.
pub fn decode(
    executor: &mut dyn LlmExecutor,
    tokenizer: &dyn Tokenizer,
    detector: &StopTokenDetector,
    benchmark: Option<&mut BenchmarkInfo>,
    cancel: Option<&CancelFlag>,
) -> Result<Responses> {
    decode_loop(
        executor,
        tokenizer,
        detector,
        DecodeConfig {
            num_output_candidates: 1,
            sampling: None,
            observer: None,
            benchmark,
            cancel,
        },
    )
}

/// Single-candidate streaming decode with the executor's internal
/// sampling. Per-step text is delivered through the observer; the final
/// `Responses` is empty.
pub fn decode_streaming(
    executor: &mut dyn LlmExecutor,
    tokenizer: &dyn Tokenizer,
    detector: &StopTokenDetector,
    benchmark: Option<&mut BenchmarkInfo>,
    observer: &mut dyn InferenceObserver,
    cancel: Option<&CancelFlag>,
) -> Result<()> {
    decode_loop(
        executor,
        tokenizer,
        detector,
        DecodeConfig {
            num_output_candidates: 1,
            sampling: None,
            observer: Some(observer),
            benchmark,
            cancel,
        },
    )
    .map(|_| ())
}

/// Multi-candidate batch decode with an external sampler. `decoded_ids`
/// seeds the first step (typically the last prompt token per candidate)
/// and is updated in place every step. Final scores are the per-candidate
/// mean over steps that produced text.
pub fn decode_custom_sampling(
    executor: &mut dyn LlmExecutor,
    tokenizer: &dyn Tokenizer,
    detector: &StopTokenDetector,
    num_output_candidates: usize,
    sampler: &mut dyn Sampler,
    decoded_ids: &mut Vec<TokenId>,
    benchmark: Option<&mut BenchmarkInfo>,
    cancel: Option<&CancelFlag>,
) -> Result<Responses> {
    decode_loop(
        executor,
        tokenizer,
        detector,
        DecodeConfig {
            num_output_candidates,
            sampling: Some(ExternalSampling {
                sampler,
                decoded_ids,
            }),
            observer: None,
            benchmark,
            cancel,
        },
    )
}

/// Multi-candidate streaming decode with an external sampler. The score
/// streamed with each chunk is the score of the token that produced it.
pub fn decode_custom_sampling_streaming(
    executor: &mut dyn LlmExecutor,
    tokenizer: &dyn Tokenizer,
    detector: &StopTokenDetector,
    num_output_candidates: usize,
    sampler: &mut dyn Sampler,
    decoded_ids: &mut Vec<TokenId>,
    benchmark: Option<&mut BenchmarkInfo>,
    observer: &mut dyn InferenceObserver,
    cancel: Option<&CancelFlag>,
) -> Result<()> {
    decode_loop(
        executor,
        tokenizer,
        detector,
        DecodeConfig {
            num_output_candidates,
            sampling: Some(ExternalSampling {
                sampler,
                decoded_ids,
            }),
            observer: Some(observer),
            benchmark,
            cancel,
        },
    )
    .map(|_| ())
}

/// Everything that varies between the four entry points.
struct DecodeConfig<'a> {
    num_output_candidates: usize,
    sampling: Option<ExternalSampling<'a>>,
    observer: Option<&'a mut dyn InferenceObserver>,
    benchmark: Option<&'a mut BenchmarkInfo>,
    cancel: Option<&'a CancelFlag>,
}

/// Whether the decode loop should stop, in priority order.
fn should_stop(
    hit_stop_tokens: bool,
    benchmark_decode_token_count: usize,
    num_decoded_steps: usize,
    current_step: usize,
    max_num_tokens: usize,
) -> bool {
    if hit_stop_tokens && benchmark_decode_token_count == 0 {
        // Natural stop; only honored when no fixed decode budget was
        // requested by benchmarking.
        return true;
    }
    if benchmark_decode_token_count > 0 && num_decoded_steps >= benchmark_decode_token_count {
        return true;
    }
    // KV cache exhausted.
    current_step >= max_num_tokens
}

fn decode_loop(
    executor: &mut dyn LlmExecutor,
    tokenizer: &dyn Tokenizer,
    detector: &StopTokenDetector,
    mut config: DecodeConfig<'_>,
) -> Result<Responses> {
    let n = config.num_output_candidates;
    let is_streaming = config.observer.is_some();
    let is_custom_sampling = config.sampling.is_some();

    if n == 0 {
        return Err(EdgeLmError::InvalidArgument(
            "num_output_candidates must be positive".to_string(),
        ));
    }
    if detector.num_candidates() != n {
        return Err(EdgeLmError::InvalidArgument(format!(
            "stop detector is configured for {} candidates, expected {}",
            detector.num_candidates(),
            n
        )));
    }
    if let Some(sampling) = &config.sampling {
        if sampling.decoded_ids.len() != n {
            return Err(EdgeLmError::InvalidArgument(format!(
                "decoded_ids holds {} seeds, expected {}",
                sampling.decoded_ids.len(),
                n
            )));
        }
    }

    let benchmark_decode_token_count = config
        .benchmark
        .as_ref()
        .map(|b| b.params().num_decode_tokens)
        .unwrap_or(0);
    if let Some(b) = config.benchmark.as_deref_mut() {
        b.time_decode_turn_start()?;
    }

    let max_num_tokens = try_get_max_num_tokens(executor);
    let mut final_responses = Responses::new(n);
    let mut accumulated_scores = vec![0.0f32; n];
    let mut num_decoded_tokens = vec![0usize; n];
    let mut num_decode_steps = 0usize;

    // The caller's detector stays pristine; the loop advances a clone.
    let mut step = DecodeStep::new(n, config.sampling.take(), detector.clone());

    loop {
        if let Some(cancel) = config.cancel {
            if cancel.is_cancelled() {
                debug!("decode cancelled at step {num_decode_steps}");
                let err = EdgeLmError::Cancelled("process cancelled".to_string());
                if let Some(observer) = config.observer.as_deref_mut() {
                    observer.on_error(&err);
                }
                return Err(err);
            }
        }

        let all_done = match step.run(executor, tokenizer, config.benchmark.as_deref_mut()) {
            Ok(all_done) => all_done,
            Err(e) => {
                if let Some(observer) = config.observer.as_deref_mut() {
                    observer.on_error(&e);
                }
                return Err(e);
            }
        };
        num_decode_steps += 1;

        let mut step_responses = Responses::new(n);
        let mut any_updates = false;
        for i in 0..n {
            let output_text = step.result_text(i);
            if output_text.is_empty() {
                // Nothing released for this candidate: early stop, a partial
                // BPE chain, or fragments withheld for a partial stop match.
                continue;
            }
            any_updates = true;
            if is_streaming {
                step_responses.texts_mut()[i] = output_text.to_string();
                if let Some(scores) = step.scores() {
                    step_responses.scores_mut()[i] = scores[i];
                }
            } else {
                final_responses.texts_mut()[i].push_str(output_text);
                if let Some(scores) = step.scores() {
                    accumulated_scores[i] += scores[i];
                    num_decoded_tokens[i] += 1;
                }
            }
        }

        if is_streaming && any_updates && !all_done {
            if let Some(observer) = config.observer.as_deref_mut() {
                observer.on_next(step_responses);
            }
        }

        if should_stop(
            all_done,
            benchmark_decode_token_count,
            num_decode_steps,
            executor.current_step(),
            max_num_tokens,
        ) {
            debug!(
                steps = num_decode_steps,
                all_done, "decode loop terminated"
            );
            break;
        }
    }

    if let Some(b) = config.benchmark.as_deref_mut() {
        b.time_decode_turn_end(num_decode_steps * n)?;
    }

    if is_streaming {
        if let Some(observer) = config.observer.as_deref_mut() {
            if executor.current_step() >= max_num_tokens {
                observer.on_error(&EdgeLmError::Internal(
                    "maximum kv-cache size reached".to_string(),
                ));
            } else {
                observer.on_done();
            }
        }
        // Streamed text was already delivered; nothing to return.
        return Ok(Responses::new(0));
    }

    if is_custom_sampling {
        for i in 0..n {
            final_responses.scores_mut()[i] = if num_decoded_tokens[i] > 0 {
                accumulated_scores[i] / num_decoded_tokens[i] as f32
            } else {
                f32::NEG_INFINITY
            };
        }
    }
    Ok(final_responses)
}
