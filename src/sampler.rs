// ===== prefixforge/src/sampler.rs =====
use crate::oracle::GradMatrix;
use fastrand::Rng;
use std::cmp::Ordering;

/// Generates `batch_size` single-position mutations of the current prefix.
///
/// Each candidate picks one random control position, restricts replacements
/// to the `top_k` tokens whose gradient is most negative there (steepest
/// loss decrease), and samples one proportional to `exp(-grad / temp)`.
/// The rest of the prefix is left untouched, so every candidate sits at
/// Hamming distance 1 from the input.
pub fn sample_candidates(
    rng: &mut Rng,
    control_toks: &[u32],
    grad: &GradMatrix,
    batch_size: usize,
    top_k: usize,
    temperature: f64,
) -> Vec<Vec<u32>> {
    if control_toks.is_empty() || grad.positions == 0 {
        // Nothing to mutate; the caller keeps the prefix as-is.
        return vec![control_toks.to_vec()];
    }

    let positions = control_toks.len().min(grad.positions);
    let mut out = Vec::with_capacity(batch_size);

    for _ in 0..batch_size {
        let pos = rng.usize(0..positions);
        let row = grad.row(pos);
        let k = top_k.min(row.len()).max(1);

        let mut idx: Vec<usize> = (0..row.len()).collect();
        if k < idx.len() {
            idx.select_nth_unstable_by(k - 1, |&a, &b| {
                row[a].partial_cmp(&row[b]).unwrap_or(Ordering::Equal)
            });
            idx.truncate(k);
        }

        // Temperature-scaled softmax over the negated gradient; shifting by
        // the max keeps the exponentials in range.
        let t = temperature as f32;
        let peak = idx
            .iter()
            .map(|&i| -row[i])
            .fold(f32::NEG_INFINITY, f32::max);
        let weights: Vec<f32> = idx.iter().map(|&i| ((-row[i] - peak) / t).exp()).collect();
        let total: f32 = weights.iter().sum();

        let mut roll = rng.f32() * total;
        let mut chosen = idx[idx.len() - 1];
        for (w, &i) in weights.iter().zip(&idx) {
            if roll <= *w {
                chosen = i;
                break;
            }
            roll -= w;
        }

        let mut candidate = control_toks.to_vec();
        candidate[pos] = chosen as u32;
        out.push(candidate);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn steep_grad(positions: usize, vocab: usize, target: usize) -> GradMatrix {
        let mut grad = GradMatrix::zeros(positions, vocab);
        for pos in 0..positions {
            for v in 0..vocab {
                grad.data[pos * vocab + v] = if v == target { -100.0 } else { 1.0 };
            }
        }
        grad
    }

    #[test]
    fn empty_control_is_a_noop() {
        let mut rng = Rng::with_seed(7);
        let grad = GradMatrix::zeros(0, 10);
        let out = sample_candidates(&mut rng, &[], &grad, 8, 4, 1.0);
        assert_eq!(out, vec![Vec::<u32>::new()]);
    }

    #[test]
    fn candidates_differ_in_exactly_one_position() {
        let mut rng = Rng::with_seed(7);
        let toks = vec![5u32, 6, 7, 8];
        let grad = steep_grad(4, 10, 3);
        for cand in sample_candidates(&mut rng, &toks, &grad, 16, 4, 1.0) {
            let diff = cand.iter().zip(&toks).filter(|(a, b)| a != b).count();
            assert!(diff <= 1);
            assert_eq!(cand.len(), toks.len());
        }
    }

    #[test]
    fn steep_descent_dominates_at_low_temperature() {
        let mut rng = Rng::with_seed(42);
        let toks = vec![5u32, 6, 7];
        let grad = steep_grad(3, 10, 2);
        let picks = sample_candidates(&mut rng, &toks, &grad, 32, 4, 0.1);
        let hits = picks
            .iter()
            .flat_map(|c| c.iter().zip(&toks))
            .filter(|(a, b)| a != b)
            .filter(|(a, _)| **a == 2)
            .count();
        // With gradient -100 vs 1, the softmax mass sits on token 2.
        assert!(hits >= 30, "only {} of 32 followed the gradient", hits);
    }
}
