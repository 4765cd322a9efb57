//! Benchmark timing: paired delta spans and prefill/decode turn markers.

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::errors::{EdgeLmError, Result};

/// Benchmark knobs for one request.
#[derive(Debug, Clone, Copy, Default)]
pub struct BenchmarkParams {
    /// Decode-step budget; 0 leaves generation unbounded.
    ///
    /// When non-zero the loop runs exactly this many steps, and a detected
    /// stop sequence or EOS is ignored until the budget is exhausted. The
    /// decoded text may therefore contain content past the natural stop.
    pub num_decode_tokens: usize,
}

#[derive(Debug, Clone, Copy, Default)]
struct SpanStats {
    total: Duration,
    count: u64,
}

/// One prefill or decode turn: how many tokens it covered and how long it
/// took.
#[derive(Debug, Clone, Copy)]
pub struct TurnStats {
    pub num_tokens: usize,
    pub duration: Duration,
}

/// Named, paired time-delta markers around prefill, decode, and sampling.
///
/// The first `time_mark_delta(name)` call opens the span; the second call
/// with the same name closes it and accumulates the delta. Turn markers
/// bracket a whole prefill or decode turn and carry token counts. Closing
/// what was never opened, reopening an open turn, or reporting with spans
/// still open is an error.
#[derive(Debug, Default)]
pub struct BenchmarkInfo {
    params: BenchmarkParams,
    open_marks: HashMap<String, Instant>,
    spans: BTreeMap<String, SpanStats>,
    prefill_turn_start: Option<Instant>,
    prefill_turns: Vec<TurnStats>,
    decode_turn_start: Option<Instant>,
    decode_turns: Vec<TurnStats>,
}

impl BenchmarkInfo {
    pub fn new(params: BenchmarkParams) -> Self {
        Self {
            params,
            ..Self::default()
        }
    }

    pub fn params(&self) -> &BenchmarkParams {
        &self.params
    }

    /// Open or close the named span.
    pub fn time_mark_delta(&mut self, name: &str) -> Result<()> {
        match self.open_marks.remove(name) {
            Some(start) => {
                let stats = self.spans.entry(name.to_string()).or_default();
                stats.total += start.elapsed();
                stats.count += 1;
            }
            None => {
                self.open_marks.insert(name.to_string(), Instant::now());
            }
        }
        Ok(())
    }

    pub fn time_prefill_turn_start(&mut self) -> Result<()> {
        if self.prefill_turn_start.is_some() {
            return Err(EdgeLmError::Internal(
                "prefill turn already started".to_string(),
            ));
        }
        self.prefill_turn_start = Some(Instant::now());
        Ok(())
    }

    pub fn time_prefill_turn_end(&mut self, num_tokens: usize) -> Result<()> {
        match self.prefill_turn_start.take() {
            Some(start) => {
                self.prefill_turns.push(TurnStats {
                    num_tokens,
                    duration: start.elapsed(),
                });
                Ok(())
            }
            None => Err(EdgeLmError::Internal(
                "prefill turn ended without a start".to_string(),
            )),
        }
    }

    pub fn time_decode_turn_start(&mut self) -> Result<()> {
        if self.decode_turn_start.is_some() {
            return Err(EdgeLmError::Internal(
                "decode turn already started".to_string(),
            ));
        }
        self.decode_turn_start = Some(Instant::now());
        Ok(())
    }

    /// `total_tokens` is steps x candidates for the finished turn.
    pub fn time_decode_turn_end(&mut self, total_tokens: usize) -> Result<()> {
        match self.decode_turn_start.take() {
            Some(start) => {
                self.decode_turns.push(TurnStats {
                    num_tokens: total_tokens,
                    duration: start.elapsed(),
                });
                Ok(())
            }
            None => Err(EdgeLmError::Internal(
                "decode turn ended without a start".to_string(),
            )),
        }
    }

    /// Snapshot of all closed spans and turns.
    pub fn report(&self) -> Result<BenchmarkReport> {
        if let Some(name) = self.open_marks.keys().next() {
            return Err(EdgeLmError::Internal(format!(
                "span '{name}' is still open"
            )));
        }
        if self.prefill_turn_start.is_some() || self.decode_turn_start.is_some() {
            return Err(EdgeLmError::Internal("a turn is still open".to_string()));
        }
        let spans = self
            .spans
            .iter()
            .map(|(name, stats)| {
                let total_ms = stats.total.as_secs_f64() * 1000.0;
                SpanReport {
                    name: name.clone(),
                    total_ms,
                    count: stats.count,
                    mean_ms: if stats.count > 0 {
                        total_ms / stats.count as f64
                    } else {
                        0.0
                    },
                }
            })
            .collect();
        Ok(BenchmarkReport {
            spans,
            prefill_turns: self.prefill_turns.iter().map(TurnReport::from).collect(),
            decode_turns: self.decode_turns.iter().map(TurnReport::from).collect(),
        })
    }
}

/// Accumulated stats for one named span.
#[derive(Debug, Clone, Serialize)]
pub struct SpanReport {
    pub name: String,
    pub total_ms: f64,
    pub count: u64,
    pub mean_ms: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TurnReport {
    pub num_tokens: usize,
    pub duration_ms: f64,
    pub tokens_per_second: f64,
}

impl From<&TurnStats> for TurnReport {
    fn from(turn: &TurnStats) -> Self {
        let secs = turn.duration.as_secs_f64();
        Self {
            num_tokens: turn.num_tokens,
            duration_ms: secs * 1000.0,
            tokens_per_second: if secs > 0.0 {
                turn.num_tokens as f64 / secs
            } else {
                0.0
            },
        }
    }
}

/// Full benchmark report for one request.
#[derive(Debug, Clone, Serialize)]
pub struct BenchmarkReport {
    pub spans: Vec<SpanReport>,
    pub prefill_turns: Vec<TurnReport>,
    pub decode_turns: Vec<TurnReport>,
}
