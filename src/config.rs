use crate::error::{PfResult, PrefixForgeError};
use clap::{parser::ValueSource, ArgMatches, Args};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Args, Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    #[command(flatten)]
    pub optimization: OptimizationParams,
    #[command(flatten)]
    pub prefix: PrefixParams,
    #[command(flatten)]
    pub stagnation: StagnationParams,
    #[command(flatten)]
    pub scoring: ScoringParams,
    #[command(flatten)]
    pub sampler: SamplerParams,
}

#[derive(Args, Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizationParams {
    /// Weight of benign probability vs normalized loss in the fitness blend.
    #[arg(long, default_value_t = 0.7)]
    pub alpha: f64,

    /// Benign confidence at which the search declares success and stops.
    #[arg(long, default_value_t = 0.95)]
    pub min_benign_confidence: f64,

    /// Tolerance band: scores at or above combined_average * this value do
    /// not count against patience. Values above 1.0 disable the band.
    #[arg(long, default_value_t = 0.98)]
    pub improvement_threshold: f64,

    #[arg(long, default_value_t = 500)]
    pub max_iterations: usize,

    #[arg(long, default_value_t = 50)]
    pub patience: usize,

    /// Strength of the length penalty inside the fitness formula.
    #[arg(long, default_value_t = 0.3)]
    pub token_penalty_weight: f64,

    /// Confidence floor the minimizer must preserve while dropping words.
    #[arg(long, default_value_t = 0.90)]
    pub min_acceptable_benign: f64,
}

impl Default for OptimizationParams {
    fn default() -> Self {
        Self {
            alpha: 0.7,
            min_benign_confidence: 0.95,
            improvement_threshold: 0.98,
            max_iterations: 500,
            patience: 50,
            token_penalty_weight: 0.3,
            min_acceptable_benign: 0.90,
        }
    }
}

#[derive(Args, Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrefixParams {
    /// Words spliced at the front when greedy insertion finds nothing.
    #[arg(long, default_value_t = 3)]
    pub words_to_inject: usize,

    /// Size of the seed prefix drawn from the word bank.
    #[arg(long, default_value_t = 5)]
    pub init_words_count: usize,

    /// Token-count vs historical-improvement blend for seeding (1.0 = only
    /// token count matters).
    #[arg(long, default_value_t = 0.7)]
    pub init_token_priority: f64,

    /// Same blend, used for recovery-time word selection.
    #[arg(long, default_value_t = 0.5)]
    pub general_token_priority: f64,
}

impl Default for PrefixParams {
    fn default() -> Self {
        Self {
            words_to_inject: 3,
            init_words_count: 5,
            init_token_priority: 0.7,
            general_token_priority: 0.5,
        }
    }
}

#[derive(Args, Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StagnationParams {
    /// Recovery fires each time the stagnation counter is a multiple of this.
    #[arg(long, default_value_t = 5)]
    pub stagnation_threshold: usize,

    /// Subtracted from the stagnation counter after every recovery action.
    #[arg(long, default_value_t = 3)]
    pub grace_period: usize,

    /// Word-bank pool size for the greedy insertion search.
    #[arg(long, default_value_t = 64)]
    pub num_candidates: usize,
}

impl Default for StagnationParams {
    fn default() -> Self {
        Self {
            stagnation_threshold: 5,
            grace_period: 3,
            num_candidates: 64,
        }
    }
}

#[derive(Args, Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringParams {
    #[arg(long, default_value_t = 10)]
    pub rolling_window_size: usize,

    #[arg(long, default_value_t = 5)]
    pub max_top_scores: usize,

    #[arg(long, default_value_t = 0.7)]
    pub rolling_weight: f64,

    #[arg(long, default_value_t = 0.3)]
    pub top_weight: f64,
}

impl Default for ScoringParams {
    fn default() -> Self {
        Self {
            rolling_window_size: 10,
            max_top_scores: 5,
            rolling_weight: 0.7,
            top_weight: 0.3,
        }
    }
}

#[derive(Args, Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerParams {
    /// Candidates generated per iteration.
    #[arg(long, default_value_t = 32)]
    pub batch_size: usize,

    /// Replacement tokens considered per position (steepest descent first).
    #[arg(long, default_value_t = 16)]
    pub top_k: usize,

    /// Softmax temperature over negated gradients; higher explores more.
    #[arg(long, default_value_t = 1.5)]
    pub temperature: f64,
}

impl Default for SamplerParams {
    fn default() -> Self {
        Self {
            batch_size: 32,
            top_k: 16,
            temperature: 1.5,
        }
    }
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> PfResult<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Rejects out-of-range values before any optimization work begins.
    pub fn validate(&self) -> PfResult<()> {
        let o = &self.optimization;
        check_unit("alpha", o.alpha)?;
        check_open_unit("min_benign_confidence", o.min_benign_confidence)?;
        check_open_unit("min_acceptable_benign", o.min_acceptable_benign)?;
        check_unit("token_penalty_weight", o.token_penalty_weight)?;
        if !o.improvement_threshold.is_finite() || o.improvement_threshold <= 0.0 {
            return Err(PrefixForgeError::Config(
                "--improvement-threshold must be a positive finite number \
                 (values above 1.0 disable the tolerance band)"
                    .to_string(),
            ));
        }
        check_nonzero("max_iterations", o.max_iterations)?;
        check_nonzero("patience", o.patience)?;

        check_nonzero("stagnation_threshold", self.stagnation.stagnation_threshold)?;
        check_nonzero("num_candidates", self.stagnation.num_candidates)?;

        let s = &self.scoring;
        check_nonzero("rolling_window_size", s.rolling_window_size)?;
        check_nonzero("max_top_scores", s.max_top_scores)?;
        check_weight("rolling_weight", s.rolling_weight)?;
        check_weight("top_weight", s.top_weight)?;
        if s.rolling_weight + s.top_weight <= 0.0 {
            return Err(PrefixForgeError::Config(
                "--rolling-weight and --top-weight must not both be zero".to_string(),
            ));
        }

        check_nonzero("batch_size", self.sampler.batch_size)?;
        check_nonzero("top_k", self.sampler.top_k)?;
        if !self.sampler.temperature.is_finite() || self.sampler.temperature <= 0.0 {
            return Err(PrefixForgeError::Config(
                "--temperature must be a positive finite number".to_string(),
            ));
        }

        check_unit("init_token_priority", self.prefix.init_token_priority)?;
        check_unit("general_token_priority", self.prefix.general_token_priority)?;
        check_nonzero("init_words_count", self.prefix.init_words_count)?;
        check_nonzero("words_to_inject", self.prefix.words_to_inject)?;

        Ok(())
    }

    /// Overlays explicitly-passed CLI flags onto a file-loaded config.
    pub fn merge_from_cli(&mut self, cli: &Config, matches: &ArgMatches) {
        macro_rules! update_if_present {
            ($group:ident, $field:ident, $arg_name:expr) => {
                if matches.value_source($arg_name) == Some(ValueSource::CommandLine) {
                    self.$group.$field = cli.$group.$field.clone();
                }
            };
        }

        update_if_present!(optimization, alpha, "alpha");
        update_if_present!(optimization, min_benign_confidence, "min_benign_confidence");
        update_if_present!(optimization, improvement_threshold, "improvement_threshold");
        update_if_present!(optimization, max_iterations, "max_iterations");
        update_if_present!(optimization, patience, "patience");
        update_if_present!(optimization, token_penalty_weight, "token_penalty_weight");
        update_if_present!(optimization, min_acceptable_benign, "min_acceptable_benign");

        update_if_present!(prefix, words_to_inject, "words_to_inject");
        update_if_present!(prefix, init_words_count, "init_words_count");
        update_if_present!(prefix, init_token_priority, "init_token_priority");
        update_if_present!(prefix, general_token_priority, "general_token_priority");

        update_if_present!(stagnation, stagnation_threshold, "stagnation_threshold");
        update_if_present!(stagnation, grace_period, "grace_period");
        update_if_present!(stagnation, num_candidates, "num_candidates");

        update_if_present!(scoring, rolling_window_size, "rolling_window_size");
        update_if_present!(scoring, max_top_scores, "max_top_scores");
        update_if_present!(scoring, rolling_weight, "rolling_weight");
        update_if_present!(scoring, top_weight, "top_weight");

        update_if_present!(sampler, batch_size, "batch_size");
        update_if_present!(sampler, top_k, "top_k");
        update_if_present!(sampler, temperature, "temperature");
    }
}

fn check_unit(name: &str, value: f64) -> PfResult<()> {
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        return Err(PrefixForgeError::Config(format!(
            "--{} must be within [0, 1], got {}",
            name, value
        )));
    }
    Ok(())
}

fn check_open_unit(name: &str, value: f64) -> PfResult<()> {
    if !value.is_finite() || value <= 0.0 || value >= 1.0 {
        return Err(PrefixForgeError::Config(format!(
            "--{} must be within (0, 1), got {}",
            name, value
        )));
    }
    Ok(())
}

fn check_weight(name: &str, value: f64) -> PfResult<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(PrefixForgeError::Config(format!(
            "--{} must be non-negative, got {}",
            name, value
        )));
    }
    Ok(())
}

fn check_nonzero(name: &str, value: usize) -> PfResult<()> {
    if value == 0 {
        return Err(PrefixForgeError::Config(format!(
            "--{} must be at least 1",
            name
        )));
    }
    Ok(())
}
