use crate::reports;
use clap::Args;
use prefixforge::config::Config;
use prefixforge::fitness::AttackTemplate;
use prefixforge::optimizer::runner::ProgressCallback;
use prefixforge::optimizer::{AttackOptions, IterationReport, Optimizer};
use prefixforge::oracle::Oracle;
use prefixforge::recovery::RecoveryEngine;
use prefixforge::tokenizer::Tokenizer;
use prefixforge::tracking::ScoreRecord;
use prefixforge::wordbank::WordBank;
use prefixforge::words::DEFAULT_WORDS;
use std::sync::Arc;
use tracing::info;

#[derive(Args, Debug, Clone)]
pub struct AttackArgs {
    #[command(flatten)]
    pub config: Config,

    /// Text placed before the prefix in the classifier input.
    #[arg(long, default_value = "")]
    pub injection: String,

    /// The fixed payload the prefix must make look benign.
    #[arg(long)]
    pub payload: String,

    /// Explicit seed prefix; skips the word-bank seeding.
    #[arg(long)]
    pub init_prefix: Option<String>,

    #[arg(short = 'S', long)]
    pub seed: Option<u64>,
}

struct LogProgress;

impl ProgressCallback for LogProgress {
    fn on_iteration(&self, report: &IterationReport) -> bool {
        info!("{}", report.progress_line());
        true
    }
}

pub fn run(
    args: AttackArgs,
    oracle: Arc<Oracle>,
    tokenizer: Arc<dyn Tokenizer>,
    bank: Arc<dyn WordBank>,
) {
    let config = &args.config;
    let template = AttackTemplate::new(args.injection.clone(), args.payload.clone());

    let init_prefix = match &args.init_prefix {
        Some(p) => p.clone(),
        None => seed_prefix(bank.as_ref(), config),
    };
    info!("Injection text: {}", template.injection);
    info!("Payload text: {}", template.payload);
    info!("\n🔥 Trying initial prefix: {}", init_prefix);

    let recovery = RecoveryEngine::new(
        bank.clone(),
        config.stagnation.clone(),
        config.prefix.clone(),
        config.optimization.patience,
        config.optimization.improvement_threshold,
        args.seed,
    );
    let record = ScoreRecord::new(&config.scoring);
    let mut options = AttackOptions::from(config);
    options.seed = args.seed;

    let mut optimizer = Optimizer::new(oracle.clone(), tokenizer.clone(), recovery, record, options);
    let outcome = optimizer.run(&template, &init_prefix, &LogProgress);

    if outcome.converged() {
        info!(
            "\n===== 🏆 SUCCESS! High confidence benign classification (>{:.0}%) =====",
            config.optimization.min_benign_confidence * 100.0
        );
    } else {
        info!("\n===== Did not reach a high confidence benign classification =====");
        if let Some(best) = &outcome.best {
            info!("Best prefix found had a score of: {:.4}", best.score);
        }
    }

    reports::print_final_report(oracle.as_ref(), tokenizer.as_ref(), &template, &outcome);
}

/// Database-informed seeding: prefer words with a track record, fall back
/// to the front of the static dictionary when the bank has no history.
fn seed_prefix(bank: &dyn WordBank, config: &Config) -> String {
    let count = config.prefix.init_words_count;
    let priority = config.prefix.init_token_priority;

    let top = bank.top_words(count, 1, priority);
    if !top.is_empty() {
        info!(
            "Using {} top-performing words from the bank for the initial prefix",
            top.len()
        );
        let words = bank.random_words(count, 1, priority);
        if !words.is_empty() {
            return words.join(" ");
        }
    }

    info!("Using dictionary words for the initial prefix (no bank history available)");
    DEFAULT_WORDS
        .iter()
        .take(count)
        .copied()
        .collect::<Vec<_>>()
        .join(" ")
}
