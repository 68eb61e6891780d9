mod common;

use common::{
    oracle_with, test_tokenizer, AlwaysMaliciousModel, DecayModel, KeywordModel,
    PoisonedGradModel,
};
use prefixforge::config::{PrefixParams, ScoringParams, StagnationParams};
use prefixforge::fitness::AttackTemplate;
use prefixforge::optimizer::runner::SilentProgress;
use prefixforge::optimizer::{
    AttackOptions, IterationReport, Optimizer, ProgressCallback, StopReason,
};
use prefixforge::oracle::{LinearProbe, Oracle};
use prefixforge::recovery::RecoveryEngine;
use prefixforge::tokenizer::VocabTokenizer;
use prefixforge::tracking::ScoreRecord;
use prefixforge::wordbank::{InMemoryWordBank, WordBank, WordStats};
use regex::Regex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn options(max_iterations: usize) -> AttackOptions {
    AttackOptions {
        max_iterations,
        alpha: 1.0,
        token_penalty_weight: 0.0,
        min_benign_confidence: 0.95,
        min_acceptable_benign: 0.90,
        batch_size: 16,
        top_k: 4,
        temperature: 1.0,
        seed: Some(3),
    }
}

fn recovery(
    bank: Arc<dyn WordBank>,
    threshold: usize,
    grace: usize,
    patience: usize,
    improvement_threshold: f64,
) -> RecoveryEngine {
    RecoveryEngine::new(
        bank,
        StagnationParams {
            stagnation_threshold: threshold,
            grace_period: grace,
            num_candidates: 16,
        },
        PrefixParams::default(),
        patience,
        improvement_threshold,
        Some(3),
    )
}

fn record() -> ScoreRecord {
    ScoreRecord::new(&ScoringParams::default())
}

/// A word bank whose only ranked entry is the classifier's trigger word;
/// the recovery engine has to find and splice it.
fn safe_bank() -> Arc<dyn WordBank> {
    let tokenizer = test_tokenizer();
    let bank = InMemoryWordBank::with_defaults(tokenizer.as_ref()).with_seed(5);
    bank.insert(WordStats {
        word: "SAFE".to_string(),
        tokens: 1,
        uses: 8,
        total_improvement: 8.0,
    });
    Arc::new(bank)
}

/// Scenario: the classifier trusts any text containing "SAFE". The seed
/// prefix lacks it, gradients are flat, and only the word-insertion
/// recovery can supply it — the loop must still converge within patience.
#[test]
fn recovery_injection_reaches_convergence() {
    let tokenizer = test_tokenizer();
    let model = Arc::new(KeywordModel::new(&tokenizer, "SAFE"));
    let oracle = oracle_with(model, tokenizer.clone());
    let template = AttackTemplate::new("", " attack payload");

    let mut optimizer = Optimizer::new(
        oracle.clone(),
        tokenizer,
        recovery(safe_bank(), 2, 1, 20, 1.5),
        record(),
        options(50),
    );
    let outcome = optimizer.run(&template, "alpha beta gamma delta", &SilentProgress);

    assert_eq!(outcome.stop_reason, StopReason::Converged);
    assert!(outcome.iterations <= 20, "took {}", outcome.iterations);

    let best = outcome.best.expect("converged run records a best prefix");
    assert!(best.benign_prob > 0.95);
    assert!(best.prefix.contains("SAFE"));

    let verdict = oracle.classify(&template.wrap(&outcome.minimized_prefix)).unwrap();
    assert!(verdict.benign_prob >= 0.90);
}

/// Scenario: one iteration against an always-malicious classifier. The
/// budget expires with nothing benign ever observed.
#[test]
fn budget_exhaustion_reports_the_seed_prefix() {
    let tokenizer = test_tokenizer();
    let model = Arc::new(AlwaysMaliciousModel::new(&tokenizer));
    let oracle = oracle_with(model, tokenizer.clone());
    let template = AttackTemplate::new("", " attack payload");

    let mut optimizer = Optimizer::new(
        oracle,
        tokenizer,
        recovery(safe_bank(), 5, 3, 50, 0.98),
        record(),
        options(1),
    );
    let outcome = optimizer.run(&template, "alpha beta", &SilentProgress);

    assert_eq!(outcome.stop_reason, StopReason::MaxIterationsReached);
    assert_eq!(outcome.iterations, 1);
    assert!(outcome.best.is_none());
    assert_eq!(outcome.final_prefix, "alpha beta");
    // Below the floor, so minimization must leave it alone.
    assert_eq!(outcome.minimized_prefix, "alpha beta");
}

/// Strictly declining scores trip early stopping exactly when the counter
/// reaches patience, regardless of the absolute score level.
#[test]
fn early_stopping_fires_at_patience() {
    let tokenizer = test_tokenizer();
    let model = Arc::new(DecayModel::new(&tokenizer));
    let oracle = oracle_with(model, tokenizer.clone());
    let template = AttackTemplate::new("", " attack payload");

    // Threshold above patience keeps recovery out of the picture.
    let mut optimizer = Optimizer::new(
        oracle,
        tokenizer,
        recovery(safe_bank(), 10, 3, 3, 1.0),
        record(),
        options(100),
    );
    let outcome = optimizer.run(&template, "alpha beta", &SilentProgress);

    assert_eq!(outcome.stop_reason, StopReason::EarlyStopped);
    // Iteration 1 sets the watermark; 2, 3, 4 each increment the counter.
    assert_eq!(outcome.iterations, 4);
}

/// Oracle faults are per-iteration: the loop skips them and runs out its
/// budget with the seed prefix intact.
#[test]
fn non_finite_gradients_never_kill_the_loop() {
    let tokenizer = test_tokenizer();
    let model = Arc::new(PoisonedGradModel::new(&tokenizer));
    let oracle = oracle_with(model, tokenizer.clone());
    let template = AttackTemplate::new("", " attack payload");

    let mut optimizer = Optimizer::new(
        oracle,
        tokenizer,
        recovery(safe_bank(), 5, 3, 50, 0.98),
        record(),
        options(5),
    );
    let outcome = optimizer.run(&template, "alpha beta", &SilentProgress);

    assert_eq!(outcome.stop_reason, StopReason::MaxIterationsReached);
    assert_eq!(outcome.iterations, 5);
    assert!(outcome.best.is_none());
    assert_eq!(outcome.final_prefix, "alpha beta");
}

/// The callback can cancel, but only at an iteration boundary.
#[test]
fn callback_cancellation_stops_between_iterations() {
    struct StopAfter {
        seen: AtomicUsize,
        limit: usize,
    }
    impl ProgressCallback for StopAfter {
        fn on_iteration(&self, _report: &IterationReport) -> bool {
            self.seen.fetch_add(1, Ordering::SeqCst) + 1 < self.limit
        }
    }

    let tokenizer = test_tokenizer();
    let model = Arc::new(AlwaysMaliciousModel::new(&tokenizer));
    let oracle = oracle_with(model, tokenizer.clone());
    let template = AttackTemplate::new("", " attack payload");

    let callback = StopAfter {
        seen: AtomicUsize::new(0),
        limit: 3,
    };
    let mut optimizer = Optimizer::new(
        oracle,
        tokenizer,
        recovery(safe_bank(), 50, 3, 100, 0.98),
        record(),
        options(100),
    );
    let outcome = optimizer.run(&template, "alpha beta", &callback);

    assert_eq!(outcome.stop_reason, StopReason::Cancelled);
    assert_eq!(outcome.iterations, 3);
}

/// Full gradient path through the linear probe: the search must discover
/// the one token whose embedding carries benign weight.
#[test]
fn gradient_guided_search_finds_the_benign_token() {
    let words = ["calm", "quiet", "filler", "good", "attack"];
    let vocab: Vec<String> = std::iter::once("<pad>".to_string())
        .chain(std::iter::once("<unk>".to_string()))
        .chain(words.iter().map(|s| s.to_string()))
        .collect();

    let dim = 2;
    let mut embeddings = vec![0.0f32; vocab.len() * dim];
    for (i, word) in vocab.iter().enumerate() {
        let row = match word.as_str() {
            "good" => [8.0, 0.0],
            "attack" => [0.0, 3.0],
            "<pad>" | "<unk>" => [0.0, 0.0],
            _ => [0.0, 1.0],
        };
        embeddings[i * dim..(i + 1) * dim].copy_from_slice(&row);
    }

    let probe = LinearProbe {
        labels: vec!["benign".to_string(), "malicious".to_string()],
        vocab,
        dim,
        embeddings,
        weights: vec![1.0, 0.0, 0.0, 1.0],
        bias: vec![0.0, 0.0],
    };
    probe.validate().unwrap();

    let tokenizer = Arc::new(VocabTokenizer::new(&probe.vocab));
    let oracle = Arc::new(Oracle::new(
        Arc::new(probe),
        tokenizer.clone(),
        "benign",
        "malicious",
    ));
    let template = AttackTemplate::new("", " attack");

    let bank = Arc::new(InMemoryWordBank::with_defaults(tokenizer.as_ref()).with_seed(5));
    let mut optimizer = Optimizer::new(
        oracle.clone(),
        tokenizer,
        recovery(bank, 5, 3, 30, 0.98),
        record(),
        AttackOptions {
            max_iterations: 60,
            alpha: 1.0,
            token_penalty_weight: 0.0,
            min_benign_confidence: 0.95,
            min_acceptable_benign: 0.90,
            batch_size: 16,
            top_k: 3,
            temperature: 0.5,
            seed: Some(9),
        },
    );
    let outcome = optimizer.run(&template, "calm quiet filler", &SilentProgress);

    assert_eq!(outcome.stop_reason, StopReason::Converged);
    let best = outcome.best.expect("best prefix recorded");
    assert!(best.prefix.contains("good"), "prefix was '{}'", best.prefix);
}

#[test]
fn progress_line_carries_the_iteration_fields() {
    let report = IterationReport {
        index: 4,
        label: "benign".to_string(),
        benign_prob: 0.9312,
        normalized_loss: 0.8123,
        token_count: 7,
        prefix: "alpha beta".to_string(),
        current_score: 0.9,
        combined_average: 0.85,
        stagnation_counter: 2,
    };
    let line = report.progress_line();
    let pattern = Regex::new(
        r"^Iteration \d+: Class=\w+ \(benign: \d+\.\d{2}%, loss_norm: \d+\.\d{4}, tokens: \d+, prefix: .+\)$",
    )
    .unwrap();
    assert!(pattern.is_match(&line), "line was: {}", line);
    assert!(line.contains("Iteration 5:"));
}
