//! # edgelm
//!
//! Inference pipeline core for an on-device LLM runtime, in pure Rust.
//!
//! ## Architecture
//!
//! - **Executor seam**: the model backend (prefill, decode, logits) behind
//!   the [`LlmExecutor`] trait; tensors and KV cache live on its side
//! - **Pipeline**: prefill driver plus a decode loop that interleaves stop
//!   detection, BPE continuation buffering, partial-stop deferral, optional
//!   external sampling, streaming, and cancellation
//! - **Entry points**: batch/streaming x internal/external sampling, four
//!   thin facades over one loop
//!
//! The crate never loads model files or touches a network; executors,
//! tokenizers, and samplers are supplied by the embedding runtime.

pub mod benchmark;
pub mod demo;
pub mod errors;
pub mod executor;
pub mod io;
pub mod pipeline;
pub mod sampler;
pub mod streaming;
pub mod tokenizer;

pub use benchmark::{BenchmarkInfo, BenchmarkParams, BenchmarkReport};
pub use demo::{DemoExecutor, DemoTokenizer, DEMO_EOS_TOKEN};
pub use errors::{EdgeLmError, Result};
pub use executor::{
    ExecutorInputs, ExecutorSettings, LlmExecutor, PrefillParams, ProcessedTokens,
    DEFAULT_MAX_NUM_TOKENS,
};
pub use io::{CancelFlag, InferenceObserver, Responses, TokenId};
pub use pipeline::{
    decode, decode_custom_sampling, decode_custom_sampling_streaming, decode_streaming, prefill,
    ExternalSampling, StopTokenDetector, TokenStreamAssembler,
};
pub use sampler::{Sampler, TopKTopPSampler};
pub use streaming::{ChannelObserver, GenerationEvent};
pub use tokenizer::{DecodedText, HfTokenizer, Tokenizer};
