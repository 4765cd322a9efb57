//! External sampling: the sampler seam plus a temperature/top-k/top-p
//! implementation.

use anyhow::anyhow;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::io::TokenId;

/// Samples the next token id (and its score) per candidate from executor
/// logits. `out_ids` doubles as the seed buffer for the next decode step,
/// so implementations must fill every slot.
pub trait Sampler {
    fn sample(
        &mut self,
        logits: &[Vec<f32>],
        out_ids: &mut [TokenId],
        out_scores: &mut [f32],
    ) -> anyhow::Result<()>;
}

/// Temperature + top-k + top-p sampler. Scores are the log-probability of
/// the chosen token under the truncated, renormalized distribution.
///
/// `temperature <= 0` selects greedily (argmax) with the log-probability
/// taken from the unscaled distribution.
pub struct TopKTopPSampler {
    temperature: f32,
    top_k: usize,
    top_p: f32,
    rng: StdRng,
}

impl TopKTopPSampler {
    pub fn new(temperature: f32, top_k: usize, top_p: f32) -> Self {
        Self::with_seed(temperature, top_k, top_p, rand::thread_rng().gen())
    }

    /// Seeded variant for reproducible generation.
    pub fn with_seed(temperature: f32, top_k: usize, top_p: f32, seed: u64) -> Self {
        Self {
            temperature,
            top_k,
            top_p,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn sample_one(&mut self, logits: &[f32]) -> anyhow::Result<(TokenId, f32)> {
        if logits.is_empty() {
            return Err(anyhow!("empty logits row"));
        }

        if self.temperature <= 0.0 {
            return Ok(greedy(logits));
        }

        let t = self.temperature.max(1e-6);
        let mut indexed: Vec<(usize, f32)> =
            logits.iter().enumerate().map(|(i, &v)| (i, v / t)).collect();
        indexed.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let k = if self.top_k == 0 {
            indexed.len()
        } else {
            self.top_k.min(indexed.len())
        };
        indexed.truncate(k);

        // Max-logit stabilized softmax over the top-k set.
        let max_ln = indexed
            .iter()
            .map(|(_, v)| *v)
            .fold(f32::NEG_INFINITY, f32::max);
        let exp: Vec<f32> = indexed.iter().map(|(_, v)| (v - max_ln).exp()).collect();
        let sum_all: f32 = exp.iter().sum();
        let probs: Vec<f32> = exp.iter().map(|e| e / sum_all).collect();

        // Smallest prefix with cumulative probability >= top_p.
        let mut cum = 0.0f32;
        let mut n = 0;
        for (i, &pr) in probs.iter().enumerate() {
            cum += pr;
            n = i + 1;
            if cum >= self.top_p {
                break;
            }
        }
        let top_n = n.max(1);
        let sum_top: f32 = probs[..top_n].iter().sum();

        let r: f32 = self.rng.gen();
        let mut cum = 0.0f32;
        for (i, &pr) in probs[..top_n].iter().enumerate() {
            let renormalized = pr / sum_top;
            cum += renormalized;
            if r <= cum {
                return Ok((indexed[i].0 as TokenId, renormalized.max(f32::MIN_POSITIVE).ln()));
            }
        }
        let last = top_n - 1;
        let renormalized = probs[last] / sum_top;
        Ok((indexed[last].0 as TokenId, renormalized.max(f32::MIN_POSITIVE).ln()))
    }
}

impl Sampler for TopKTopPSampler {
    fn sample(
        &mut self,
        logits: &[Vec<f32>],
        out_ids: &mut [TokenId],
        out_scores: &mut [f32],
    ) -> anyhow::Result<()> {
        if logits.len() != out_ids.len() || logits.len() != out_scores.len() {
            return Err(anyhow!(
                "candidate count mismatch: {} logits rows, {} id slots, {} score slots",
                logits.len(),
                out_ids.len(),
                out_scores.len()
            ));
        }
        for (i, row) in logits.iter().enumerate() {
            let (id, score) = self.sample_one(row)?;
            out_ids[i] = id;
            out_scores[i] = score;
        }
        Ok(())
    }
}

fn greedy(logits: &[f32]) -> (TokenId, f32) {
    let max_ln = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exp_sum: f32 = logits.iter().map(|&v| (v - max_ln).exp()).sum();
    let best = logits
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(i, _)| i)
        .unwrap_or(0);
    let prob = (logits[best] - max_ln).exp() / exp_sum;
    (best as TokenId, prob.max(f32::MIN_POSITIVE).ln())
}
