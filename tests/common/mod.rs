#![allow(dead_code)]

use prefixforge::error::{PfResult, PrefixForgeError};
use prefixforge::oracle::{ClassifierModel, GradMatrix, Oracle};
use prefixforge::tokenizer::{Tokenizer, VocabTokenizer};
use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// logit gap producing a 0.99 / 0.01 probability split under softmax.
pub const HOT: f32 = 4.59512;

pub fn test_vocab() -> Vec<String> {
    ["alpha", "beta", "gamma", "delta", "SAFE", "attack", "payload"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

pub fn test_tokenizer() -> Arc<VocabTokenizer> {
    Arc::new(VocabTokenizer::new(&test_vocab()))
}

fn two_labels() -> Vec<String> {
    vec!["benign".to_string(), "malicious".to_string()]
}

/// Benign at 99% whenever the keyword token is present, 1% otherwise.
pub struct KeywordModel {
    labels: Vec<String>,
    vocab_size: usize,
    pub keyword: u32,
}

impl KeywordModel {
    pub fn new(tokenizer: &VocabTokenizer, keyword: &str) -> Self {
        Self {
            labels: two_labels(),
            vocab_size: tokenizer.vocab_size(),
            keyword: tokenizer.token_id(keyword).expect("keyword in vocab"),
        }
    }
}

impl ClassifierModel for KeywordModel {
    fn labels(&self) -> &[String] {
        &self.labels
    }

    fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    fn logits(&self, tokens: &[u32]) -> PfResult<Vec<f32>> {
        if tokens.contains(&self.keyword) {
            Ok(vec![HOT, 0.0])
        } else {
            Ok(vec![0.0, HOT])
        }
    }

    fn position_gradients(
        &self,
        _tokens: &[u32],
        control: Range<usize>,
        _benign_idx: usize,
        _malicious_idx: usize,
        _alpha: f64,
    ) -> PfResult<GradMatrix> {
        Ok(GradMatrix::zeros(control.len(), self.vocab_size))
    }
}

/// Classifies everything as malicious, no matter what.
pub struct AlwaysMaliciousModel {
    labels: Vec<String>,
    vocab_size: usize,
}

impl AlwaysMaliciousModel {
    pub fn new(tokenizer: &VocabTokenizer) -> Self {
        Self {
            labels: two_labels(),
            vocab_size: tokenizer.vocab_size(),
        }
    }
}

impl ClassifierModel for AlwaysMaliciousModel {
    fn labels(&self) -> &[String] {
        &self.labels
    }

    fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    fn logits(&self, _tokens: &[u32]) -> PfResult<Vec<f32>> {
        Ok(vec![0.0, HOT])
    }

    fn position_gradients(
        &self,
        _tokens: &[u32],
        control: Range<usize>,
        _benign_idx: usize,
        _malicious_idx: usize,
        _alpha: f64,
    ) -> PfResult<GradMatrix> {
        Ok(GradMatrix::zeros(control.len(), self.vocab_size))
    }
}

/// Benign logit shrinks on every forward call, so per-iteration scores
/// strictly decline regardless of the candidate text.
pub struct DecayModel {
    labels: Vec<String>,
    vocab_size: usize,
    calls: AtomicU64,
}

impl DecayModel {
    pub fn new(tokenizer: &VocabTokenizer) -> Self {
        Self {
            labels: two_labels(),
            vocab_size: tokenizer.vocab_size(),
            calls: AtomicU64::new(0),
        }
    }
}

impl ClassifierModel for DecayModel {
    fn labels(&self) -> &[String] {
        &self.labels
    }

    fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    fn logits(&self, _tokens: &[u32]) -> PfResult<Vec<f32>> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) as f32;
        Ok(vec![2.0 - 0.01 * n, 0.0])
    }

    fn position_gradients(
        &self,
        _tokens: &[u32],
        control: Range<usize>,
        _benign_idx: usize,
        _malicious_idx: usize,
        _alpha: f64,
    ) -> PfResult<GradMatrix> {
        Ok(GradMatrix::zeros(control.len(), self.vocab_size))
    }
}

/// Forward passes work, but every gradient comes back full of NaN.
pub struct PoisonedGradModel {
    labels: Vec<String>,
    vocab_size: usize,
}

impl PoisonedGradModel {
    pub fn new(tokenizer: &VocabTokenizer) -> Self {
        Self {
            labels: two_labels(),
            vocab_size: tokenizer.vocab_size(),
        }
    }
}

impl ClassifierModel for PoisonedGradModel {
    fn labels(&self) -> &[String] {
        &self.labels
    }

    fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    fn logits(&self, _tokens: &[u32]) -> PfResult<Vec<f32>> {
        Ok(vec![0.0, HOT])
    }

    fn position_gradients(
        &self,
        _tokens: &[u32],
        control: Range<usize>,
        _benign_idx: usize,
        _malicious_idx: usize,
        _alpha: f64,
    ) -> PfResult<GradMatrix> {
        let mut grad = GradMatrix::zeros(control.len().max(1), self.vocab_size);
        for v in &mut grad.data {
            *v = f32::NAN;
        }
        Ok(grad)
    }
}

/// Fails every call; exercises the oracle-fault handling paths.
pub struct BrokenModel {
    labels: Vec<String>,
}

impl BrokenModel {
    pub fn new() -> Self {
        Self {
            labels: two_labels(),
        }
    }
}

impl ClassifierModel for BrokenModel {
    fn labels(&self) -> &[String] {
        &self.labels
    }

    fn vocab_size(&self) -> usize {
        0
    }

    fn logits(&self, _tokens: &[u32]) -> PfResult<Vec<f32>> {
        Err(PrefixForgeError::Oracle("classifier offline".to_string()))
    }

    fn position_gradients(
        &self,
        _tokens: &[u32],
        _control: Range<usize>,
        _benign_idx: usize,
        _malicious_idx: usize,
        _alpha: f64,
    ) -> PfResult<GradMatrix> {
        Err(PrefixForgeError::Oracle("classifier offline".to_string()))
    }
}

pub fn oracle_with(model: Arc<dyn ClassifierModel>, tokenizer: Arc<VocabTokenizer>) -> Arc<Oracle> {
    Arc::new(Oracle::new(model, tokenizer, "benign", "malicious"))
}
