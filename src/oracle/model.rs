use crate::error::{PfResult, PrefixForgeError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::ops::Range;
use std::path::Path;

/// Sensitivity of the combined loss to substituting each vocabulary token
/// at each optimizable position. Row-major `positions x vocab`.
#[derive(Debug, Clone)]
pub struct GradMatrix {
    pub positions: usize,
    pub vocab: usize,
    pub data: Vec<f32>,
}

impl GradMatrix {
    pub fn zeros(positions: usize, vocab: usize) -> Self {
        Self {
            positions,
            vocab,
            data: vec![0.0; positions * vocab],
        }
    }

    #[inline(always)]
    pub fn row(&self, pos: usize) -> &[f32] {
        &self.data[pos * self.vocab..(pos + 1) * self.vocab]
    }

    #[inline(always)]
    pub fn at(&self, pos: usize, token: usize) -> f32 {
        self.data[pos * self.vocab + token]
    }

    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|v| v.is_finite())
    }
}

/// The classifier capability injected into the [`Oracle`](super::Oracle).
///
/// `position_gradients` is the backward pass: a first-order Taylor estimate
/// of the combined loss `alpha * (logit[malicious] - logit[benign]) +
/// (1 - alpha) * cross_entropy(logits, benign)` with respect to the one-hot
/// token choice at each control position.
pub trait ClassifierModel: Send + Sync {
    fn labels(&self) -> &[String];

    fn vocab_size(&self) -> usize;

    fn logits(&self, tokens: &[u32]) -> PfResult<Vec<f32>>;

    fn logits_batch(&self, batch: &[Vec<u32>]) -> PfResult<Vec<Vec<f32>>> {
        batch.iter().map(|t| self.logits(t)).collect()
    }

    fn position_gradients(
        &self,
        tokens: &[u32],
        control: Range<usize>,
        benign_idx: usize,
        malicious_idx: usize,
        alpha: f64,
    ) -> PfResult<GradMatrix>;
}

/// Mean-of-embeddings linear softmax classifier, loadable from JSON.
///
/// `embeddings` is `vocab x dim` and `weights` is `labels x dim`, both
/// flattened row-major. Pad tokens (id 0) are excluded from the pool. The
/// probe's gradients are exact, so the sampler's Taylor step is too.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearProbe {
    pub labels: Vec<String>,
    pub vocab: Vec<String>,
    pub dim: usize,
    pub embeddings: Vec<f32>,
    pub weights: Vec<f32>,
    pub bias: Vec<f32>,
}

impl LinearProbe {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> PfResult<Self> {
        let content = fs::read_to_string(path)?;
        let probe: LinearProbe = serde_json::from_str(&content)?;
        probe.validate()?;
        Ok(probe)
    }

    pub fn validate(&self) -> PfResult<()> {
        if self.labels.len() < 2 {
            return Err(PrefixForgeError::Validation(
                "model must define at least two labels".to_string(),
            ));
        }
        if self.dim == 0 {
            return Err(PrefixForgeError::Validation(
                "model embedding dimension must be positive".to_string(),
            ));
        }
        if self.embeddings.len() != self.vocab.len() * self.dim {
            return Err(PrefixForgeError::Validation(format!(
                "embedding matrix is {} values, expected {} ({} tokens x {} dims)",
                self.embeddings.len(),
                self.vocab.len() * self.dim,
                self.vocab.len(),
                self.dim
            )));
        }
        if self.weights.len() != self.labels.len() * self.dim {
            return Err(PrefixForgeError::Validation(format!(
                "class weight matrix is {} values, expected {}",
                self.weights.len(),
                self.labels.len() * self.dim
            )));
        }
        if self.bias.len() != self.labels.len() {
            return Err(PrefixForgeError::Validation(
                "bias length must match label count".to_string(),
            ));
        }
        Ok(())
    }

    #[inline(always)]
    fn embedding(&self, token: usize) -> &[f32] {
        &self.embeddings[token * self.dim..(token + 1) * self.dim]
    }

    #[inline(always)]
    fn class_row(&self, class: usize) -> &[f32] {
        &self.weights[class * self.dim..(class + 1) * self.dim]
    }

    /// Mean embedding over non-pad tokens; returns the pool and the count
    /// of tokens that contributed to it.
    fn pool(&self, tokens: &[u32]) -> (Vec<f32>, usize) {
        let mut pooled = vec![0.0f32; self.dim];
        let mut count = 0usize;
        for &t in tokens {
            let t = t as usize;
            if t == 0 || t >= self.vocab.len() {
                continue;
            }
            for (acc, &e) in pooled.iter_mut().zip(self.embedding(t)) {
                *acc += e;
            }
            count += 1;
        }
        if count > 0 {
            let inv = 1.0 / count as f32;
            for v in &mut pooled {
                *v *= inv;
            }
        }
        (pooled, count)
    }
}

impl ClassifierModel for LinearProbe {
    fn labels(&self) -> &[String] {
        &self.labels
    }

    fn vocab_size(&self) -> usize {
        self.vocab.len()
    }

    fn logits(&self, tokens: &[u32]) -> PfResult<Vec<f32>> {
        let (pooled, _) = self.pool(tokens);
        let mut logits = Vec::with_capacity(self.labels.len());
        for c in 0..self.labels.len() {
            let row = self.class_row(c);
            let mut acc = self.bias[c];
            for (w, h) in row.iter().zip(&pooled) {
                acc += w * h;
            }
            logits.push(acc);
        }
        Ok(logits)
    }

    fn position_gradients(
        &self,
        tokens: &[u32],
        control: Range<usize>,
        benign_idx: usize,
        malicious_idx: usize,
        alpha: f64,
    ) -> PfResult<GradMatrix> {
        if control.end > tokens.len() {
            return Err(PrefixForgeError::Oracle(format!(
                "control range {}..{} exceeds input of {} tokens",
                control.start,
                control.end,
                tokens.len()
            )));
        }

        let positions = control.len();
        let vocab_len = self.vocab.len();
        if positions == 0 {
            return Ok(GradMatrix::zeros(0, vocab_len));
        }

        let logits = self.logits(tokens)?;
        let probs = super::softmax(&logits);
        let (_, count) = self.pool(tokens);
        let scale = if count > 0 { 1.0 / count as f32 } else { 0.0 };
        let alpha = alpha as f32;

        // d(loss)/d(pooled): margin term pushes the benign logit up, the
        // cross-entropy term pulls probability mass toward the benign class.
        let mut grad_pool = vec![0.0f32; self.dim];
        for c in 0..self.labels.len() {
            let row = self.class_row(c);
            let mut coeff = (1.0 - alpha) * (probs[c] as f32);
            if c == benign_idx {
                coeff += -alpha - (1.0 - alpha);
            }
            if c == malicious_idx {
                coeff += alpha;
            }
            for (g, &w) in grad_pool.iter_mut().zip(row) {
                *g += coeff * w;
            }
        }

        // Mean pooling makes d(pooled)/d(e_pos) uniform across positions;
        // the per-token sensitivity is the projection onto each embedding.
        let mut grad = GradMatrix::zeros(positions, vocab_len);
        for pos in 0..positions {
            let row = &mut grad.data[pos * vocab_len..(pos + 1) * vocab_len];
            for (v, slot) in row.iter_mut().enumerate() {
                let emb = self.embedding(v);
                let mut acc = 0.0f32;
                for (g, &e) in grad_pool.iter().zip(emb) {
                    acc += g * e;
                }
                *slot = acc * scale;
            }
        }

        Ok(grad)
    }
}
