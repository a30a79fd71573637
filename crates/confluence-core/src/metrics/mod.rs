//! Segmentation comparison metrics.
//!
//! Implements the split/merge decompositions of the Rand index and the
//! Variation of Information over the contingency table of a predicted
//! labeling against a ground truth:
//!
//! - `rand_split = 1 - sum p_ij^2 / sum a_i^2`: probability that two voxels
//!   sharing a ground-truth segment are separated in the prediction
//! - `rand_merge = 1 - sum p_ij^2 / sum b_j^2`: probability that two voxels
//!   sharing a predicted segment belong to different ground-truth segments
//! - `voi_split = H(pred | gt)`, `voi_merge = H(gt | pred)` in nats
//!
//! All four are zero for a perfect match. Every voxel enters the table;
//! callers that want to ignore an unlabeled region should mask it out before
//! calling.
//!
//! Deterministic evaluation: accumulation iterates the table in sorted key
//! order so floating-point sums are reproducible.

use rustc_hash::FxHashMap;

use crate::engine::errors::MergeError;

/// Split/merge quality of a segmentation against a ground truth.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EvaluationReport {
    pub rand_split: f64,
    pub rand_merge: f64,
    pub voi_split: f64,
    pub voi_merge: f64,
}

/// Compares a predicted labeling against a ground truth of identical shape.
pub fn compare_volumes(ground_truth: &[u32], prediction: &[u64]) -> Result<EvaluationReport, MergeError> {
    if ground_truth.len() != prediction.len() {
        return Err(MergeError::ShapeMismatch {
            what: "ground truth",
            expected: prediction.len(),
            actual: ground_truth.len(),
        });
    }
    if prediction.is_empty() {
        return Ok(EvaluationReport::default());
    }

    let mut table: FxHashMap<(u32, u64), u64> = FxHashMap::default();
    let mut gt_marginal: FxHashMap<u32, u64> = FxHashMap::default();
    let mut pred_marginal: FxHashMap<u64, u64> = FxHashMap::default();
    for (&g, &p) in ground_truth.iter().zip(prediction.iter()) {
        *table.entry((g, p)).or_default() += 1;
        *gt_marginal.entry(g).or_default() += 1;
        *pred_marginal.entry(p).or_default() += 1;
    }

    let n = prediction.len() as f64;

    let mut cells: Vec<(&(u32, u64), &u64)> = table.iter().collect();
    cells.sort_by_key(|(k, _)| **k);

    // pair-counting terms Σp², Σa², Σb² and the conditional entropies in one
    // sorted pass each
    let mut sum_p2 = 0.0;
    let mut voi_split = 0.0;
    let mut voi_merge = 0.0;
    for (&(g, p), &count) in &cells {
        let p_ij = count as f64 / n;
        sum_p2 += p_ij * p_ij;
        let a_i = gt_marginal[&g] as f64 / n;
        let b_j = pred_marginal[&p] as f64 / n;
        voi_split -= p_ij * (p_ij / a_i).ln();
        voi_merge -= p_ij * (p_ij / b_j).ln();
    }

    let mut gt_m: Vec<(&u32, &u64)> = gt_marginal.iter().collect();
    gt_m.sort_by_key(|(k, _)| **k);
    let sum_a2: f64 = gt_m
        .iter()
        .map(|(_, &c)| {
            let a = c as f64 / n;
            a * a
        })
        .sum();

    let mut pred_m: Vec<(&u64, &u64)> = pred_marginal.iter().collect();
    pred_m.sort_by_key(|(k, _)| **k);
    let sum_b2: f64 = pred_m
        .iter()
        .map(|(_, &c)| {
            let b = c as f64 / n;
            b * b
        })
        .sum();

    Ok(EvaluationReport {
        rand_split: 1.0 - sum_p2 / sum_a2,
        rand_merge: 1.0 - sum_p2 / sum_b2,
        voi_split,
        voi_merge,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perfect_match_scores_zero() {
        let gt = vec![1u32, 1, 2, 2];
        let pred = vec![7u64, 7, 9, 9];
        let r = compare_volumes(&gt, &pred).unwrap();
        assert!(r.rand_split.abs() < 1e-12);
        assert!(r.rand_merge.abs() < 1e-12);
        assert!(r.voi_split.abs() < 1e-12);
        assert!(r.voi_merge.abs() < 1e-12);
    }

    #[test]
    fn oversplit_prediction_is_pure_split_error() {
        let gt = vec![1u32, 1, 1, 1];
        let pred = vec![1u64, 2, 3, 4];
        let r = compare_volumes(&gt, &pred).unwrap();
        assert!(r.rand_split > 0.0);
        assert!(r.voi_split > 0.0);
        assert!(r.rand_merge.abs() < 1e-12);
        assert!(r.voi_merge.abs() < 1e-12);
        // fully split four voxels: H(pred|gt) = ln 4
        assert!((r.voi_split - 4.0f64.ln()).abs() < 1e-12);
        assert!((r.rand_split - 0.75).abs() < 1e-12);
    }

    #[test]
    fn overmerged_prediction_is_pure_merge_error() {
        let gt = vec![1u32, 1, 2, 2];
        let pred = vec![5u64, 5, 5, 5];
        let r = compare_volumes(&gt, &pred).unwrap();
        assert!(r.rand_split.abs() < 1e-12);
        assert!(r.voi_split.abs() < 1e-12);
        assert!((r.voi_merge - 2.0f64.ln()).abs() < 1e-12);
        assert!((r.rand_merge - 0.5).abs() < 1e-12);
    }

    #[test]
    fn single_label_both_sides_scores_zero() {
        let gt = vec![3u32; 8];
        let pred = vec![1u64; 8];
        let r = compare_volumes(&gt, &pred).unwrap();
        assert_eq!(r, EvaluationReport::default());
    }

    #[test]
    fn length_mismatch_fails() {
        assert!(compare_volumes(&[1, 2], &[1]).is_err());
    }
}
