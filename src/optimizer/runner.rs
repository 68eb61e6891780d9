// ===== prefixforge/src/optimizer/runner.rs =====
use super::{AttackOptions, AttackOutcome, IterationFault, IterationReport, StopReason};
use crate::fitness::{select_best, AttackTemplate, Evaluator, FitnessWeights, ScoredCandidate};
use crate::minimizer::minimize;
use crate::oracle::Oracle;
use crate::recovery::{RecoveryEngine, StagnationVerdict};
use crate::sampler::sample_candidates;
use crate::tokenizer::Tokenizer;
use crate::tracking::{BestResult, ScoreRecord};
use std::sync::Arc;
use tracing::{info, warn};

pub trait ProgressCallback: Send + Sync {
    /// Called once per completed iteration; returning `false` cancels the
    /// search at the iteration boundary.
    fn on_iteration(&self, report: &IterationReport) -> bool;
}

/// No-op callback for embedding and tests.
pub struct SilentProgress;

impl ProgressCallback for SilentProgress {
    fn on_iteration(&self, _report: &IterationReport) -> bool {
        true
    }
}

struct IterationStep {
    prefix: String,
    prefix_tokens: Vec<u32>,
    scored: ScoredCandidate,
}

/// The sequential search loop. Each iteration leans on the previous one's
/// prefix, so the loop itself never parallelizes; the batched work inside
/// an iteration does.
pub struct Optimizer {
    oracle: Arc<Oracle>,
    tokenizer: Arc<dyn Tokenizer>,
    evaluator: Evaluator,
    recovery: RecoveryEngine,
    record: ScoreRecord,
    options: AttackOptions,
    rng: fastrand::Rng,
}

impl Optimizer {
    pub fn new(
        oracle: Arc<Oracle>,
        tokenizer: Arc<dyn Tokenizer>,
        recovery: RecoveryEngine,
        record: ScoreRecord,
        options: AttackOptions,
    ) -> Self {
        let evaluator = Evaluator::new(
            oracle.clone(),
            tokenizer.clone(),
            FitnessWeights {
                alpha: options.alpha,
                token_penalty_weight: options.token_penalty_weight,
            },
        );
        let rng = match options.seed {
            Some(s) => fastrand::Rng::with_seed(s),
            None => fastrand::Rng::new(),
        };
        Self {
            oracle,
            tokenizer,
            evaluator,
            recovery,
            record,
            options,
            rng,
        }
    }

    pub fn run(
        &mut self,
        template: &AttackTemplate,
        init_prefix: &str,
        callback: &dyn ProgressCallback,
    ) -> AttackOutcome {
        let mut prefix = init_prefix.to_string();
        let mut prefix_tokens = self.tokenizer.encode(&prefix);
        let mut best = BestResult::default();
        let mut min_token_count = prefix_tokens.len();
        let mut stop_reason = StopReason::MaxIterationsReached;
        let mut iterations = 0;

        for i in 0..self.options.max_iterations {
            iterations = i + 1;

            let step = match self.iterate(template, &prefix_tokens) {
                Ok(step) => step,
                Err(fault) => {
                    // State carries over unchanged; the next index gets a
                    // fresh attempt.
                    warn!("Iteration {} skipped: {}", i + 1, fault);
                    continue;
                }
            };

            prefix = step.prefix;
            prefix_tokens = step.prefix_tokens;
            let scored = step.scored;

            if scored.token_count < min_token_count {
                min_token_count = scored.token_count;
            }

            self.record.push(scored.combined_score);
            let combined_average = self.record.combined_average();

            let report = IterationReport {
                index: i,
                label: self.oracle.labels()[scored.label_idx].clone(),
                benign_prob: scored.benign_score,
                normalized_loss: scored.normalized_loss,
                token_count: scored.token_count,
                prefix: prefix.clone(),
                current_score: scored.combined_score,
                combined_average,
                stagnation_counter: self.recovery.counter(),
            };
            let keep_going = callback.on_iteration(&report);

            match self.recovery.observe(scored.combined_score, combined_average) {
                StagnationVerdict::Improved => {}
                StagnationVerdict::NearAverage => {
                    info!("  Score close to the combined average, continuing optimization");
                }
                StagnationVerdict::Stagnant => {
                    info!(
                        "  No significant improvement for {} iteration(s)",
                        self.recovery.counter()
                    );
                    if self.recovery.should_recover() {
                        let outcome = self.recovery.recover(
                            &self.evaluator,
                            template,
                            &prefix,
                            scored.combined_score,
                        );
                        prefix = outcome.new_prefix;
                        // Re-encode so the next iteration's control range
                        // covers the modified prefix.
                        prefix_tokens = self.tokenizer.encode(&prefix);
                    }
                }
            }

            if self.recovery.exhausted() {
                info!(
                    "Early stopping after {} iterations with no significant improvement",
                    i + 1
                );
                stop_reason = StopReason::EarlyStopped;
                break;
            }

            let is_benign = scored.label_idx == self.oracle.benign_idx;
            if best.observe(is_benign, &scored, self.options.min_benign_confidence) {
                info!(
                    "Found high confidence benign classification ({:.2}%) at iteration {}",
                    scored.benign_score * 100.0,
                    i + 1
                );
                stop_reason = StopReason::Converged;
                break;
            }

            if !keep_going {
                stop_reason = StopReason::Cancelled;
                break;
            }
        }

        let final_prefix = best
            .best
            .as_ref()
            .map(|r| r.prefix.clone())
            .unwrap_or_else(|| init_prefix.to_string());
        let minimized_prefix = minimize(
            &self.oracle,
            template,
            &final_prefix,
            self.options.min_acceptable_benign,
        );

        AttackOutcome {
            stop_reason,
            iterations,
            best: best.best,
            final_prefix,
            minimized_prefix,
            min_token_count,
        }
    }

    /// One full search step: gradient, candidate batch, scoring, adoption.
    /// Any fault leaves the caller's state untouched.
    fn iterate(
        &mut self,
        template: &AttackTemplate,
        prefix_tokens: &[u32],
    ) -> Result<IterationStep, IterationFault> {
        let injection_tokens = self.tokenizer.encode(&template.injection);
        let payload_tokens = self.tokenizer.encode(&template.payload);

        let mut full = Vec::with_capacity(
            injection_tokens.len() + prefix_tokens.len() + payload_tokens.len(),
        );
        full.extend_from_slice(&injection_tokens);
        full.extend_from_slice(prefix_tokens);
        full.extend_from_slice(&payload_tokens);
        let control = injection_tokens.len()..injection_tokens.len() + prefix_tokens.len();

        let grad = self
            .oracle
            .gradient(&full, control, self.options.alpha)
            .map_err(|e| IterationFault::Gradient(e.to_string()))?;
        if !grad.is_finite() {
            return Err(IterationFault::NonFiniteGradient);
        }

        let candidate_tokens = sample_candidates(
            &mut self.rng,
            prefix_tokens,
            &grad,
            self.options.batch_size,
            self.options.top_k,
            self.options.temperature,
        );
        let candidates: Vec<String> = candidate_tokens
            .iter()
            .map(|t| self.tokenizer.decode(t))
            .collect();

        let scored = self
            .evaluator
            .evaluate_batch(template, &candidates)
            .map_err(|e| IterationFault::Scoring(e.to_string()))?;
        let best_idx = select_best(&scored).ok_or(IterationFault::EmptyBatch)?;

        let prefix = scored[best_idx].prefix.clone();
        let prefix_tokens = self.tokenizer.encode(&prefix);

        // Authoritative score of the adopted prefix, same formula as the
        // batch so iteration scores stay comparable.
        let current = self
            .evaluator
            .evaluate_single(template, &prefix)
            .map_err(|e| IterationFault::Scoring(e.to_string()))?;

        Ok(IterationStep {
            prefix,
            prefix_tokens,
            scored: current,
        })
    }
}
