// ===== prefixforge/src/oracle/mod.rs =====
pub mod model;

pub use model::{ClassifierModel, GradMatrix, LinearProbe};

use crate::error::{PfResult, PrefixForgeError};
use crate::tokenizer::Tokenizer;
use std::ops::Range;
use std::sync::{Arc, RwLock};
use tracing::warn;

/// Forward-pass result for a batch of texts.
#[derive(Debug, Clone)]
pub struct ForwardBatch {
    /// Per-text class probabilities.
    pub probs: Vec<Vec<f64>>,
    /// Per-text `1 / (1 + cross_entropy(logits, benign))`.
    pub normalized_loss: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct Verdict {
    pub label: String,
    pub label_idx: usize,
    pub benign_prob: f64,
    pub malicious_prob: f64,
    pub probs: Vec<f64>,
}

/// Wraps the classifier and tokenizer behind the two calls the search
/// needs: batched forward scoring and per-position gradients.
///
/// The internal lock models the classifier's backward-pass state: forward
/// calls share a read guard and may overlap, a gradient computation takes
/// the write guard and runs exclusively.
pub struct Oracle {
    model: Arc<dyn ClassifierModel>,
    tokenizer: Arc<dyn Tokenizer>,
    gate: RwLock<()>,
    pub benign_idx: usize,
    pub malicious_idx: usize,
}

impl Oracle {
    pub fn new(
        model: Arc<dyn ClassifierModel>,
        tokenizer: Arc<dyn Tokenizer>,
        benign_label: &str,
        malicious_label: &str,
    ) -> Self {
        let benign_idx = resolve_label(model.labels(), benign_label, 0);
        let malicious_idx = resolve_label(model.labels(), malicious_label, 1);
        Self {
            model,
            tokenizer,
            gate: RwLock::new(()),
            benign_idx,
            malicious_idx,
        }
    }

    pub fn labels(&self) -> &[String] {
        self.model.labels()
    }

    pub fn benign_label(&self) -> &str {
        &self.model.labels()[self.benign_idx]
    }

    /// Gradient of the combined loss over the control positions. Exclusive
    /// access to the model for the duration of the call.
    pub fn gradient(
        &self,
        tokens: &[u32],
        control: Range<usize>,
        alpha: f64,
    ) -> PfResult<GradMatrix> {
        let _guard = self
            .gate
            .write()
            .map_err(|_| PrefixForgeError::Oracle("classifier gate poisoned".to_string()))?;
        self.model
            .position_gradients(tokens, control, self.benign_idx, self.malicious_idx, alpha)
    }

    /// Batched forward pass: probabilities plus normalized loss per text.
    pub fn forward(&self, texts: &[String]) -> PfResult<ForwardBatch> {
        let _guard = self
            .gate
            .read()
            .map_err(|_| PrefixForgeError::Oracle("classifier gate poisoned".to_string()))?;

        let encoded = self.tokenizer.encode_batch(texts, None);
        let logit_rows = self.model.logits_batch(&encoded)?;

        let mut probs = Vec::with_capacity(logit_rows.len());
        let mut normalized_loss = Vec::with_capacity(logit_rows.len());
        for row in &logit_rows {
            if row.iter().any(|v| !v.is_finite()) {
                return Err(PrefixForgeError::Oracle(
                    "non-finite logits from classifier".to_string(),
                ));
            }
            let p = softmax_f64(row);
            let loss = cross_entropy(row, self.benign_idx);
            normalized_loss.push(1.0 / (1.0 + loss));
            probs.push(p);
        }

        Ok(ForwardBatch {
            probs,
            normalized_loss,
        })
    }

    pub fn classify(&self, text: &str) -> PfResult<Verdict> {
        let batch = self.forward(&[text.to_string()])?;
        let probs = batch.probs.into_iter().next().ok_or_else(|| {
            PrefixForgeError::Oracle("empty forward batch".to_string())
        })?;
        let label_idx = argmax(&probs);
        Ok(Verdict {
            label: self.model.labels()[label_idx].clone(),
            label_idx,
            benign_prob: probs[self.benign_idx],
            malicious_prob: probs[self.malicious_idx],
            probs,
        })
    }
}

fn resolve_label(labels: &[String], wanted: &str, fallback: usize) -> usize {
    match labels
        .iter()
        .position(|l| l.eq_ignore_ascii_case(wanted))
    {
        Some(idx) => idx,
        None => {
            warn!(
                "Label '{}' not found among {:?}, defaulting to index {}",
                wanted, labels, fallback
            );
            fallback
        }
    }
}

pub(crate) fn softmax(logits: &[f32]) -> Vec<f64> {
    softmax_f64(logits)
}

fn softmax_f64(logits: &[f32]) -> Vec<f64> {
    let max = logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max) as f64;
    let exps: Vec<f64> = logits.iter().map(|&l| ((l as f64) - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.iter().map(|e| e / sum).collect()
}

fn cross_entropy(logits: &[f32], target: usize) -> f64 {
    let max = logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max) as f64;
    let log_sum: f64 = logits
        .iter()
        .map(|&l| ((l as f64) - max).exp())
        .sum::<f64>()
        .ln();
    log_sum + max - logits[target] as f64
}

fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate() {
        if *v > values[best] {
            best = i;
        }
    }
    best
}
