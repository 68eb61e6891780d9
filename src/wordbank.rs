// ===== prefixforge/src/wordbank.rs =====
use crate::error::PfResult;
use crate::tokenizer::Tokenizer;
use crate::words::DEFAULT_WORDS;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WordStats {
    pub word: String,
    pub tokens: usize,
    pub uses: u64,
    pub total_improvement: f64,
}

impl WordStats {
    pub fn mean_improvement(&self) -> f64 {
        if self.uses == 0 {
            0.0
        } else {
            self.total_improvement / self.uses as f64
        }
    }

    /// Ranking blend: `token_weight` toward 1.0 favors short words,
    /// toward 0.0 favors historically useful ones.
    pub fn rank_score(&self, token_weight: f64) -> f64 {
        let brevity = 1.0 / self.tokens.max(1) as f64;
        let improvement = self.mean_improvement().max(0.0);
        token_weight * brevity + (1.0 - token_weight) * improvement
    }
}

/// Historical word-performance store. Reads are ranked queries; the only
/// write is the append-only outcome feedback.
pub trait WordBank: Send + Sync {
    fn top_words(&self, limit: usize, min_uses: u64, token_weight: f64) -> Vec<WordStats>;

    fn random_words(&self, n: usize, min_uses: u64, token_priority: f64) -> Vec<String>;

    fn record_outcome(&self, word: &str, improvement: f64);
}

#[derive(Debug, Serialize, Deserialize)]
struct OutcomeRow {
    word: String,
    uses: u64,
    improvement: f64,
}

/// Word bank backed by a map, optionally persisted as an append-only CSV
/// log. Loading aggregates duplicate rows, so the file can simply grow.
pub struct InMemoryWordBank {
    entries: Mutex<HashMap<String, WordStats>>,
    rng: Mutex<fastrand::Rng>,
    store: Option<PathBuf>,
}

impl InMemoryWordBank {
    pub fn with_defaults(tokenizer: &dyn Tokenizer) -> Self {
        let mut entries = HashMap::with_capacity(DEFAULT_WORDS.len());
        for &word in DEFAULT_WORDS {
            entries.insert(
                word.to_string(),
                WordStats {
                    word: word.to_string(),
                    tokens: tokenizer.count(word).max(1),
                    uses: 0,
                    total_improvement: 0.0,
                },
            );
        }
        Self {
            entries: Mutex::new(entries),
            rng: Mutex::new(fastrand::Rng::new()),
            store: None,
        }
    }

    /// Seeds the defaults, then overlays the aggregated history from `path`.
    /// Future `record_outcome` calls append to the same file.
    pub fn load_csv<P: AsRef<Path>>(path: P, tokenizer: &dyn Tokenizer) -> PfResult<Self> {
        let bank = Self::with_defaults(tokenizer);
        let path = path.as_ref();

        if path.exists() {
            let mut reader = csv::Reader::from_path(path)?;
            let mut entries = bank
                .entries
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let mut rows = 0usize;
            for record in reader.deserialize() {
                let row: OutcomeRow = record?;
                let stats = entries.entry(row.word.clone()).or_insert_with(|| WordStats {
                    word: row.word.clone(),
                    tokens: tokenizer.count(&row.word).max(1),
                    uses: 0,
                    total_improvement: 0.0,
                });
                stats.uses += row.uses;
                stats.total_improvement += row.improvement;
                rows += 1;
            }
            info!("📂 Word bank: {} outcome rows loaded from {:?}", rows, path);
        } else {
            info!("📂 Word bank: {:?} not found, starting fresh", path);
        }

        Ok(Self {
            store: Some(path.to_path_buf()),
            ..bank
        })
    }

    pub fn with_seed(self, seed: u64) -> Self {
        Self {
            rng: Mutex::new(fastrand::Rng::with_seed(seed)),
            ..self
        }
    }

    pub fn insert(&self, stats: WordStats) {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.insert(stats.word.clone(), stats);
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, word: &str) -> Option<WordStats> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(word)
            .cloned()
    }

    fn append_row(&self, word: &str, improvement: f64) {
        let Some(path) = &self.store else {
            return;
        };
        let fresh = !path.exists();
        let file = match OpenOptions::new().create(true).append(true).open(path) {
            Ok(f) => f,
            Err(e) => {
                warn!("Word bank append to {:?} failed: {}", path, e);
                return;
            }
        };
        let mut writer = csv::WriterBuilder::new()
            .has_headers(fresh)
            .from_writer(file);
        let row = OutcomeRow {
            word: word.to_string(),
            uses: 1,
            improvement,
        };
        if let Err(e) = writer.serialize(&row).and_then(|_| Ok(writer.flush()?)) {
            warn!("Word bank append to {:?} failed: {}", path, e);
        }
    }
}

impl WordBank for InMemoryWordBank {
    fn top_words(&self, limit: usize, min_uses: u64, token_weight: f64) -> Vec<WordStats> {
        let entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut ranked: Vec<WordStats> = entries
            .values()
            .filter(|s| s.uses >= min_uses)
            .cloned()
            .collect();
        ranked.sort_by(|a, b| {
            b.rank_score(token_weight)
                .partial_cmp(&a.rank_score(token_weight))
                .unwrap_or(Ordering::Equal)
        });
        ranked.truncate(limit);
        ranked
    }

    fn random_words(&self, n: usize, min_uses: u64, token_priority: f64) -> Vec<String> {
        let entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut pool: Vec<&WordStats> =
            entries.values().filter(|s| s.uses >= min_uses).collect();
        if pool.is_empty() {
            // No history yet: fall back to a uniform draw over everything.
            debug!("Word bank has no entries with {}+ uses, sampling uniformly", min_uses);
            pool = entries.values().collect();
        }
        if pool.is_empty() {
            return Vec::new();
        }
        pool.sort_by(|a, b| a.word.cmp(&b.word));

        let mut rng = self
            .rng
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut weights: Vec<f64> = pool
            .iter()
            .map(|s| s.rank_score(token_priority) + 1e-6)
            .collect();

        let mut picked = Vec::with_capacity(n);
        for _ in 0..n.min(pool.len()) {
            let total: f64 = weights.iter().sum();
            let mut roll = rng.f64() * total;
            let mut chosen = weights.len() - 1;
            for (i, w) in weights.iter().enumerate() {
                if roll <= *w {
                    chosen = i;
                    break;
                }
                roll -= w;
            }
            picked.push(pool[chosen].word.clone());
            weights[chosen] = 0.0;
        }
        picked
    }

    fn record_outcome(&self, word: &str, improvement: f64) {
        {
            let mut entries = self
                .entries
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if let Some(stats) = entries.get_mut(word) {
                stats.uses += 1;
                stats.total_improvement += improvement;
            } else {
                entries.insert(
                    word.to_string(),
                    WordStats {
                        word: word.to_string(),
                        tokens: 1,
                        uses: 1,
                        total_improvement: improvement,
                    },
                );
            }
        }
        self.append_row(word, improvement);
    }
}
