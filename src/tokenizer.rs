use std::collections::HashMap;

pub const PAD_TOKEN: &str = "<pad>";
pub const UNK_TOKEN: &str = "<unk>";

/// Text <-> token-id conversion. Implementations must keep `decode` the
/// inverse of `encode` for texts made of known vocabulary words; exact
/// round-tripping of arbitrary text is not required.
pub trait Tokenizer: Send + Sync {
    fn encode(&self, text: &str) -> Vec<u32>;

    fn decode(&self, tokens: &[u32]) -> String;

    fn count(&self, text: &str) -> usize {
        self.encode(text).len()
    }

    /// Encodes a batch to one common length: pads short sequences and, when
    /// `max_len` is given, truncates long ones.
    fn encode_batch(&self, texts: &[String], max_len: Option<usize>) -> Vec<Vec<u32>> {
        let mut encoded: Vec<Vec<u32>> = texts.iter().map(|t| self.encode(t)).collect();
        let longest = encoded.iter().map(|t| t.len()).max().unwrap_or(0);
        let target = match max_len {
            Some(cap) => longest.min(cap),
            None => longest,
        };
        for seq in &mut encoded {
            seq.truncate(target);
            while seq.len() < target {
                seq.push(self.pad_id());
            }
        }
        encoded
    }

    fn pad_id(&self) -> u32;

    fn vocab_size(&self) -> usize;
}

/// Whitespace word tokenizer over a fixed vocabulary. Index 0 is the pad
/// token and index 1 the unknown token; both decode to nothing.
pub struct VocabTokenizer {
    vocab: Vec<String>,
    index: HashMap<String, u32>,
}

impl VocabTokenizer {
    pub fn new(words: &[String]) -> Self {
        let mut vocab = Vec::with_capacity(words.len() + 2);
        vocab.push(PAD_TOKEN.to_string());
        vocab.push(UNK_TOKEN.to_string());
        for w in words {
            if w != PAD_TOKEN && w != UNK_TOKEN {
                vocab.push(w.clone());
            }
        }

        let mut index = HashMap::with_capacity(vocab.len());
        for (i, w) in vocab.iter().enumerate() {
            index.entry(w.clone()).or_insert(i as u32);
        }

        Self { vocab, index }
    }

    pub fn token_id(&self, word: &str) -> Option<u32> {
        self.index.get(word).copied()
    }

    pub fn token_str(&self, id: u32) -> Option<&str> {
        self.vocab.get(id as usize).map(|s| s.as_str())
    }
}

impl Tokenizer for VocabTokenizer {
    fn encode(&self, text: &str) -> Vec<u32> {
        text.split_whitespace()
            .map(|w| self.index.get(w).copied().unwrap_or(1))
            .collect()
    }

    fn decode(&self, tokens: &[u32]) -> String {
        let words: Vec<&str> = tokens
            .iter()
            .filter(|&&t| t > 1)
            .filter_map(|&t| self.vocab.get(t as usize).map(|s| s.as_str()))
            .collect();
        words.join(" ")
    }

    fn pad_id(&self) -> u32 {
        0
    }

    fn vocab_size(&self) -> usize {
        self.vocab.len()
    }
}
