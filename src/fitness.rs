// ===== prefixforge/src/fitness.rs =====
use crate::error::PfResult;
use crate::oracle::Oracle;
use crate::tokenizer::Tokenizer;
use rayon::prelude::*;
use std::sync::Arc;

/// The fixed text surrounding the optimized prefix. The full classifier
/// input is always `injection + prefix + payload`, concatenated directly.
#[derive(Debug, Clone, Default)]
pub struct AttackTemplate {
    pub injection: String,
    pub payload: String,
}

impl AttackTemplate {
    pub fn new(injection: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            injection: injection.into(),
            payload: payload.into(),
        }
    }

    pub fn wrap(&self, prefix: &str) -> String {
        format!("{}{}{}", self.injection, prefix, self.payload)
    }
}

/// Coefficients shared by the batch and single-prefix scoring paths, so
/// per-iteration scores stay comparable with candidate scores.
#[derive(Debug, Clone, Copy)]
pub struct FitnessWeights {
    pub alpha: f64,
    pub token_penalty_weight: f64,
}

#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub prefix: String,
    pub benign_score: f64,
    pub normalized_loss: f64,
    pub token_count: usize,
    pub combined_score: f64,
    pub label_idx: usize,
}

/// Length penalty relative to the batch: the shortest candidate gets 1.0,
/// the longest 0.0.
pub fn token_penalty(token_count: usize, min_count: usize, max_count: usize) -> f64 {
    let range = max_count.saturating_sub(min_count).max(1) as f64;
    1.0 - (token_count.saturating_sub(min_count) as f64) / range
}

pub fn combined_score(
    benign_score: f64,
    normalized_loss: f64,
    token_penalty: f64,
    weights: &FitnessWeights,
) -> f64 {
    let base = weights.alpha * benign_score + (1.0 - weights.alpha) * normalized_loss;
    base * (1.0 - weights.token_penalty_weight + weights.token_penalty_weight * token_penalty)
}

pub struct Evaluator {
    oracle: Arc<Oracle>,
    tokenizer: Arc<dyn Tokenizer>,
    weights: FitnessWeights,
}

impl Evaluator {
    pub fn new(oracle: Arc<Oracle>, tokenizer: Arc<dyn Tokenizer>, weights: FitnessWeights) -> Self {
        Self {
            oracle,
            tokenizer,
            weights,
        }
    }

    pub fn weights(&self) -> &FitnessWeights {
        &self.weights
    }

    /// Scores a whole candidate batch with one forward pass. Token counts
    /// are measured on the candidate alone, not the wrapped text.
    pub fn evaluate_batch(
        &self,
        template: &AttackTemplate,
        candidates: &[String],
    ) -> PfResult<Vec<ScoredCandidate>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let texts: Vec<String> = candidates.iter().map(|c| template.wrap(c)).collect();
        let batch = self.oracle.forward(&texts)?;

        let token_counts: Vec<usize> = candidates
            .par_iter()
            .map(|c| self.tokenizer.count(c))
            .collect();
        let min_count = token_counts.iter().copied().min().unwrap_or(0);
        let max_count = token_counts.iter().copied().max().unwrap_or(1);

        let benign_idx = self.oracle.benign_idx;
        let scored = candidates
            .iter()
            .enumerate()
            .map(|(i, candidate)| {
                let probs = &batch.probs[i];
                let benign = probs[benign_idx];
                let penalty = token_penalty(token_counts[i], min_count, max_count);
                ScoredCandidate {
                    prefix: candidate.clone(),
                    benign_score: benign,
                    normalized_loss: batch.normalized_loss[i],
                    token_count: token_counts[i],
                    combined_score: combined_score(
                        benign,
                        batch.normalized_loss[i],
                        penalty,
                        &self.weights,
                    ),
                    label_idx: top_label(probs),
                }
            })
            .collect();

        Ok(scored)
    }

    /// The authoritative per-iteration score of a single prefix. Delegates
    /// to the batch path (a batch of one degenerates to token penalty 1.0),
    /// so the coefficients cannot diverge.
    pub fn evaluate_single(
        &self,
        template: &AttackTemplate,
        prefix: &str,
    ) -> PfResult<ScoredCandidate> {
        let mut scored = self.evaluate_batch(template, &[prefix.to_string()])?;
        Ok(scored.remove(0))
    }
}

/// Arg-max over combined score; the first occurrence wins ties.
pub fn select_best(scored: &[ScoredCandidate]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, s) in scored.iter().enumerate() {
        match best {
            Some(b) if scored[b].combined_score >= s.combined_score => {}
            _ => best = Some(i),
        }
    }
    best
}

fn top_label(probs: &[f64]) -> usize {
    let mut best = 0;
    for (i, p) in probs.iter().enumerate() {
        if *p > probs[best] {
            best = i;
        }
    }
    best
}
