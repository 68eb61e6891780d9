use crate::fitness::AttackTemplate;
use crate::oracle::Oracle;
use tracing::{debug, info, warn};

/// Greedily drops words from the winning prefix while the benign
/// confidence stays at or above `min_acceptable_benign`.
///
/// Each round scores every single-word removal and keeps the one with the
/// highest surviving confidence; a removal that faults is rejected and the
/// next one is tried. A prefix that already misses the floor is returned
/// unchanged — minimization never trades the floor for length.
pub fn minimize(
    oracle: &Oracle,
    template: &AttackTemplate,
    prefix: &str,
    min_acceptable_benign: f64,
) -> String {
    let baseline = match oracle.classify(&template.wrap(prefix)) {
        Ok(v) => v,
        Err(e) => {
            warn!("Minimization skipped, baseline classification failed: {}", e);
            return prefix.to_string();
        }
    };
    if baseline.benign_prob < min_acceptable_benign {
        debug!(
            "Prefix starts below the {:.2}% floor ({:.2}%), leaving it unchanged",
            min_acceptable_benign * 100.0,
            baseline.benign_prob * 100.0
        );
        return prefix.to_string();
    }

    let mut words: Vec<String> = prefix.split_whitespace().map(String::from).collect();
    let mut removed = 0usize;

    while !words.is_empty() {
        let mut best_drop: Option<(usize, f64)> = None;

        for i in 0..words.len() {
            let shorter = drop_word(&words, i);
            let verdict = match oracle.classify(&template.wrap(&shorter)) {
                Ok(v) => v,
                Err(e) => {
                    debug!("Removal of '{}' rejected: {}", words[i], e);
                    continue;
                }
            };
            if verdict.benign_prob >= min_acceptable_benign {
                let better = best_drop.map_or(true, |(_, p)| verdict.benign_prob > p);
                if better {
                    best_drop = Some((i, verdict.benign_prob));
                }
            }
        }

        match best_drop {
            Some((i, prob)) => {
                debug!(
                    "Dropped '{}' ({} words left, benign {:.2}%)",
                    words[i],
                    words.len() - 1,
                    prob * 100.0
                );
                words.remove(i);
                removed += 1;
            }
            None => break,
        }
    }

    if removed > 0 {
        info!("Minimization removed {} word(s)", removed);
    }
    words.join(" ")
}

fn drop_word(words: &[String], index: usize) -> String {
    let mut kept: Vec<&str> = Vec::with_capacity(words.len() - 1);
    for (i, w) in words.iter().enumerate() {
        if i != index {
            kept.push(w);
        }
    }
    kept.join(" ")
}
