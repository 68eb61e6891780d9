use crate::config::ScoringParams;
use crate::fitness::ScoredCandidate;
use std::cmp::Ordering;
use std::collections::VecDeque;

/// Rolling window of recent scores plus a max-set of the best scores ever
/// seen. Their weighted blend is the stagnation baseline.
#[derive(Debug, Clone)]
pub struct ScoreRecord {
    rolling: VecDeque<f64>,
    window: usize,
    top: Vec<f64>,
    max_top: usize,
    rolling_weight: f64,
    top_weight: f64,
}

impl ScoreRecord {
    pub fn new(params: &ScoringParams) -> Self {
        Self {
            rolling: VecDeque::with_capacity(params.rolling_window_size),
            window: params.rolling_window_size,
            top: Vec::with_capacity(params.max_top_scores + 1),
            max_top: params.max_top_scores,
            rolling_weight: params.rolling_weight,
            top_weight: params.top_weight,
        }
    }

    pub fn push(&mut self, score: f64) {
        self.rolling.push_back(score);
        if self.rolling.len() > self.window {
            self.rolling.pop_front();
        }

        self.top.push(score);
        self.top
            .sort_by(|a, b| b.partial_cmp(a).unwrap_or(Ordering::Equal));
        self.top.truncate(self.max_top);
    }

    pub fn rolling_mean(&self) -> f64 {
        if self.rolling.is_empty() {
            return 0.0;
        }
        self.rolling.iter().sum::<f64>() / self.rolling.len() as f64
    }

    pub fn top_mean(&self) -> f64 {
        if self.top.is_empty() {
            return 0.0;
        }
        self.top.iter().sum::<f64>() / self.top.len() as f64
    }

    pub fn combined_average(&self) -> f64 {
        self.rolling_weight * self.rolling_mean() + self.top_weight * self.top_mean()
    }

    pub fn rolling_len(&self) -> usize {
        self.rolling.len()
    }

    pub fn top_scores(&self) -> &[f64] {
        &self.top
    }
}

/// A prefix worth remembering, with the evidence that made it so.
#[derive(Debug, Clone)]
pub struct PrefixRecord {
    pub prefix: String,
    pub score: f64,
    pub benign_prob: f64,
    pub token_count: usize,
}

impl From<&ScoredCandidate> for PrefixRecord {
    fn from(s: &ScoredCandidate) -> Self {
        Self {
            prefix: s.prefix.clone(),
            score: s.combined_score,
            benign_prob: s.benign_score,
            token_count: s.token_count,
        }
    }
}

/// Two separately tracked bests: the best benign-labelled prefix seen so
/// far, and the first prefix to clear the high-confidence target (which is
/// terminal). Updates are whole-record swaps, so a failed iteration can
/// never leave either half-written.
#[derive(Debug, Default)]
pub struct BestResult {
    pub best: Option<PrefixRecord>,
    pub converged: Option<PrefixRecord>,
}

impl BestResult {
    /// Returns `true` when the high-confidence rule fired.
    pub fn observe(
        &mut self,
        is_benign_label: bool,
        scored: &ScoredCandidate,
        min_benign_confidence: f64,
    ) -> bool {
        if !is_benign_label {
            return false;
        }

        let improves = self
            .best
            .as_ref()
            .map_or(true, |b| scored.combined_score > b.score);
        if improves {
            self.best = Some(PrefixRecord::from(scored));
        }

        if scored.benign_score > min_benign_confidence {
            let record = PrefixRecord::from(scored);
            self.best = Some(record.clone());
            self.converged = Some(record);
            return true;
        }
        false
    }
}
