// ===== prefixforge/src/recovery.rs =====
use crate::config::{PrefixParams, StagnationParams};
use crate::fitness::{AttackTemplate, Evaluator};
use crate::wordbank::WordBank;
use crate::words::DEFAULT_WORDS;
use std::sync::Arc;
use strum_macros::Display;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum StagnationVerdict {
    /// Beat the best score of the current epoch; counter reset.
    Improved,
    /// Within the tolerance band around the combined average; counter held.
    NearAverage,
    /// Meaningfully below the baseline; counter incremented.
    Stagnant,
}

#[derive(Debug, Clone)]
pub enum RecoveryAction {
    GreedyInsert { word: String, improvement: f64 },
    RandomSplice { words: Vec<String> },
}

#[derive(Debug, Clone)]
pub struct RecoveryOutcome {
    pub new_prefix: String,
    pub action: RecoveryAction,
}

/// Watches the per-iteration score stream and, when the search stalls,
/// splices historically useful words into the prefix to shake it loose.
///
/// An epoch ends at every recovery: the best-score watermark resets so the
/// modified prefix is judged on its own merits, and the counter is reduced
/// by the grace period rather than cleared.
pub struct RecoveryEngine {
    bank: Arc<dyn WordBank>,
    stagnation: StagnationParams,
    prefix_params: PrefixParams,
    patience: usize,
    improvement_threshold: f64,
    rng: fastrand::Rng,
    counter: usize,
    best_epoch_score: f64,
}

impl RecoveryEngine {
    pub fn new(
        bank: Arc<dyn WordBank>,
        stagnation: StagnationParams,
        prefix_params: PrefixParams,
        patience: usize,
        improvement_threshold: f64,
        seed: Option<u64>,
    ) -> Self {
        let rng = match seed {
            Some(s) => fastrand::Rng::with_seed(s),
            None => fastrand::Rng::new(),
        };
        Self {
            bank,
            stagnation,
            prefix_params,
            patience,
            improvement_threshold,
            rng,
            counter: 0,
            best_epoch_score: f64::NEG_INFINITY,
        }
    }

    pub fn counter(&self) -> usize {
        self.counter
    }

    /// Applies the per-iteration transition rule and returns the verdict.
    pub fn observe(&mut self, current_score: f64, combined_average: f64) -> StagnationVerdict {
        if current_score > self.best_epoch_score {
            self.best_epoch_score = current_score;
            self.counter = 0;
            return StagnationVerdict::Improved;
        }
        if current_score >= combined_average * self.improvement_threshold {
            return StagnationVerdict::NearAverage;
        }
        self.counter += 1;
        StagnationVerdict::Stagnant
    }

    /// Recovery fires on every multiple of the stagnation threshold, as
    /// long as patience has not run out.
    pub fn should_recover(&self) -> bool {
        self.counter > 0
            && self.counter % self.stagnation.stagnation_threshold == 0
            && self.counter < self.patience
    }

    pub fn exhausted(&self) -> bool {
        self.counter >= self.patience
    }

    /// Greedy word-insertion search, falling back to a random splice.
    /// Either way the epoch resets and the counter gets its grace period.
    pub fn recover(
        &mut self,
        evaluator: &Evaluator,
        template: &AttackTemplate,
        prefix: &str,
        baseline: f64,
    ) -> RecoveryOutcome {
        info!("  Optimization stagnating. Looking for words to improve the benign rating...");

        let pool = self.bank.top_words(
            self.stagnation.num_candidates,
            1,
            self.prefix_params.general_token_priority,
        );

        let mut best: Option<(String, f64, String)> = None;
        for stats in &pool {
            let candidate = splice_front(&stats.word, prefix);
            match evaluator.evaluate_single(template, &candidate) {
                Ok(scored) => {
                    let delta = scored.combined_score - baseline;
                    self.bank.record_outcome(&stats.word, delta);
                    let better = best.as_ref().map_or(true, |(_, d, _)| delta > *d);
                    if delta > 0.0 && better {
                        best = Some((stats.word.clone(), delta, candidate));
                    }
                }
                Err(e) => debug!("  Word candidate '{}' skipped: {}", stats.word, e),
            }
        }

        let outcome = if let Some((word, improvement, new_prefix)) = best {
            info!(
                "  Applied optimized prefix: '{}' improved the score by {:.4}",
                word, improvement
            );
            RecoveryOutcome {
                new_prefix,
                action: RecoveryAction::GreedyInsert { word, improvement },
            }
        } else {
            let mut words = self.bank.random_words(
                self.prefix_params.words_to_inject,
                1,
                self.prefix_params.general_token_priority,
            );
            if words.is_empty() {
                // Bank unavailable or empty: uniform draw from the static
                // dictionary keeps recovery functional.
                words = (0..self.prefix_params.words_to_inject)
                    .map(|_| DEFAULT_WORDS[self.rng.usize(0..DEFAULT_WORDS.len())].to_string())
                    .collect();
            }
            let snippet = words.join(" ");
            info!(
                "  No improvement found, inserted random words at beginning: '{}'",
                snippet
            );
            RecoveryOutcome {
                new_prefix: splice_front(&snippet, prefix),
                action: RecoveryAction::RandomSplice { words },
            }
        };

        self.reset_epoch();
        outcome
    }

    fn reset_epoch(&mut self) {
        self.best_epoch_score = f64::NEG_INFINITY;
        self.counter = self.counter.saturating_sub(self.stagnation.grace_period);
        debug!(
            "  Reset optimization tracking, stagnation counter now {}",
            self.counter
        );
    }
}

fn splice_front(snippet: &str, prefix: &str) -> String {
    if prefix.is_empty() {
        snippet.to_string()
    } else {
        format!("{} {}", snippet, prefix)
    }
}
