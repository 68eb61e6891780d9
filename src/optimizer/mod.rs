// ===== prefixforge/src/optimizer/mod.rs =====
pub mod runner;

pub use runner::{Optimizer, ProgressCallback};

use crate::config::Config;
use strum_macros::{Display, EnumString};
use thiserror::Error;

/// Why the main loop stopped. Any of these hands control to the minimizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum StopReason {
    /// A prefix cleared the high-confidence benign target.
    Converged,
    /// Patience exhausted without meaningful improvement.
    EarlyStopped,
    /// The iteration budget ran out first.
    MaxIterationsReached,
    /// The progress callback asked to stop at an iteration boundary.
    Cancelled,
}

/// Per-iteration failure. The loop logs it, keeps all state from the
/// previous iteration, and moves on to the next index — never fatal.
#[derive(Debug, Error)]
pub enum IterationFault {
    #[error("gradient computation failed: {0}")]
    Gradient(String),

    #[error("gradient matrix contained non-finite values")]
    NonFiniteGradient,

    #[error("candidate scoring failed: {0}")]
    Scoring(String),

    #[error("sampler produced an empty candidate batch")]
    EmptyBatch,
}

/// Snapshot handed to the progress callback after each iteration.
#[derive(Debug, Clone)]
pub struct IterationReport {
    pub index: usize,
    pub label: String,
    pub benign_prob: f64,
    pub normalized_loss: f64,
    pub token_count: usize,
    pub prefix: String,
    pub current_score: f64,
    pub combined_average: f64,
    pub stagnation_counter: usize,
}

impl IterationReport {
    pub fn progress_line(&self) -> String {
        format!(
            "Iteration {}: Class={} (benign: {:.2}%, loss_norm: {:.4}, tokens: {}, prefix: {})",
            self.index + 1,
            self.label,
            self.benign_prob * 100.0,
            self.normalized_loss,
            self.token_count,
            self.prefix
        )
    }
}

#[derive(Debug, Clone)]
pub struct AttackOptions {
    pub max_iterations: usize,
    pub alpha: f64,
    pub token_penalty_weight: f64,
    pub min_benign_confidence: f64,
    pub min_acceptable_benign: f64,
    pub batch_size: usize,
    pub top_k: usize,
    pub temperature: f64,
    pub seed: Option<u64>,
}

impl From<&Config> for AttackOptions {
    fn from(cfg: &Config) -> Self {
        Self {
            max_iterations: cfg.optimization.max_iterations,
            alpha: cfg.optimization.alpha,
            token_penalty_weight: cfg.optimization.token_penalty_weight,
            min_benign_confidence: cfg.optimization.min_benign_confidence,
            min_acceptable_benign: cfg.optimization.min_acceptable_benign,
            batch_size: cfg.sampler.batch_size,
            top_k: cfg.sampler.top_k,
            temperature: cfg.sampler.temperature,
            seed: None,
        }
    }
}

/// Final result of a search run, minimization included.
#[derive(Debug, Clone)]
pub struct AttackOutcome {
    pub stop_reason: StopReason,
    pub iterations: usize,
    pub best: Option<crate::tracking::PrefixRecord>,
    /// Best prefix if one was found, otherwise the seed prefix.
    pub final_prefix: String,
    /// `final_prefix` after the post-hoc trim.
    pub minimized_prefix: String,
    pub min_token_count: usize,
}

impl AttackOutcome {
    pub fn converged(&self) -> bool {
        self.stop_reason == StopReason::Converged
    }
}
