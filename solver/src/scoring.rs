//! Scoring: two interchangeable scorers behind one tagged variant.
//!
//! - `Linear`: `score(b, v) = 100 · w_b · min(v, M_b) / (S · M_b)` where S is
//!   the sum of the five largest weights. The best attainable artifact (top
//!   five buffs at their maxima) scores exactly 100.
//! - `Fixed`: `score(b, v) = w_b`, value-independent. The best attainable
//!   artifact scores S.
//!
//! All downstream arithmetic runs on integer buckets of 1/100 point
//! (`round(score × SCORE_SCALE)`), so incremental scoring agrees exactly
//! with recomputation from scratch.

use std::collections::BTreeMap;

use crate::catalog;
use crate::constants::{BUFF_COUNT, SCORE_SCALE, SLOT_COUNT};
use crate::error::SolveError;

/// Keep bucket sums comfortably inside u32 arithmetic; only absurd Fixed
/// weights can get near this.
const MAX_TOTAL_BUCKETS: f64 = 100_000_000.0;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum ScorerKind {
    Linear,
    Fixed,
}

impl ScorerKind {
    pub fn parse(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "linear" => Some(ScorerKind::Linear),
            "fixed" => Some(ScorerKind::Fixed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ScorerKind::Linear => "linear",
            ScorerKind::Fixed => "fixed",
        }
    }
}

/// A validated weight vector bound to a scorer variant.
#[derive(Clone, Debug)]
pub struct Scorer {
    kind: ScorerKind,
    weights: [f64; BUFF_COUNT],
    top_weight_sum: f64,
}

impl Scorer {
    pub fn new(kind: ScorerKind, weights: [f64; BUFF_COUNT]) -> Result<Self, SolveError> {
        let mut any_positive = false;
        for (buff, &weight) in weights.iter().enumerate() {
            if !weight.is_finite() || weight < 0.0 {
                return Err(SolveError::invalid(
                    "buffWeights",
                    format!("weight for {} must be finite and >= 0, got {weight}", catalog::BUFFS[buff].id),
                ));
            }
            if weight > 0.0 {
                any_positive = true;
            }
        }
        if !any_positive {
            return Err(SolveError::invalid(
                "buffWeights",
                "at least one weight must be positive",
            ));
        }
        let top_weight_sum = top_weight_sum(&weights);
        if kind == ScorerKind::Fixed && top_weight_sum * SCORE_SCALE > MAX_TOTAL_BUCKETS {
            return Err(SolveError::invalid(
                "buffWeights",
                format!(
                    "fixed-scorer weights too large: top-{SLOT_COUNT} sum {top_weight_sum} \
                     exceeds the representable score range"
                ),
            ));
        }
        Ok(Self {
            kind,
            weights,
            top_weight_sum,
        })
    }

    pub fn kind(&self) -> ScorerKind {
        self.kind
    }

    pub fn weights(&self) -> &[f64; BUFF_COUNT] {
        &self.weights
    }

    /// Real-valued per-slot score for revealing `(buff, value)`.
    pub fn buff_score(&self, buff: usize, value: f64) -> f64 {
        let weight = self.weights[buff];
        match self.kind {
            ScorerKind::Fixed => weight,
            ScorerKind::Linear => {
                if value <= 0.0 {
                    return 0.0;
                }
                let max_value = catalog::BUFFS[buff].max_value as f64;
                let ratio = (value / max_value).min(1.0);
                SCORE_SCALE * weight / self.top_weight_sum * ratio
            }
        }
    }

    /// Integer score bucket for `(buff, value)`; the unit the DP runs on.
    pub fn bucket(&self, buff: usize, value: f64) -> u32 {
        (self.buff_score(buff, value) * SCORE_SCALE).round() as u32
    }

    /// Best attainable total score: 100 for Linear, top-5 weight sum for
    /// Fixed.
    pub fn max_total_score(&self) -> f64 {
        match self.kind {
            ScorerKind::Linear => SCORE_SCALE,
            ScorerKind::Fixed => self.top_weight_sum,
        }
    }

    /// Per-buff score-bucket PMFs from the catalogue grids.
    ///
    /// Values that bucket identically are aggregated, so zero-weight buffs
    /// collapse to a single `(0, 1.0)` entry.
    pub fn score_pmfs(&self, pool_counts: bool) -> Vec<Vec<(u32, f64)>> {
        let grids = catalog::histograms(pool_counts);
        let mut pmfs = Vec::with_capacity(BUFF_COUNT);
        for (buff, grid) in grids.iter().enumerate() {
            let total: f64 = grid.iter().map(|&(_, count)| count as f64).sum();
            let mut buckets: BTreeMap<u32, f64> = BTreeMap::new();
            for &(value, count) in grid {
                *buckets.entry(self.bucket(buff, value as f64)).or_insert(0.0) +=
                    count as f64 / total;
            }
            pmfs.push(buckets.into_iter().collect());
        }
        pmfs
    }
}

/// Sum of the five largest weights.
fn top_weight_sum(weights: &[f64; BUFF_COUNT]) -> f64 {
    let mut sorted = *weights;
    sorted.sort_by(|a, b| b.total_cmp(a));
    sorted[..SLOT_COUNT].iter().sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform() -> [f64; BUFF_COUNT] {
        [1.0; BUFF_COUNT]
    }

    #[test]
    fn linear_best_artifact_scores_100() {
        let scorer = Scorer::new(ScorerKind::Linear, uniform()).unwrap();
        // Any five buffs at their maxima: each contributes 100/5 = 20.
        let total: f64 = (0..SLOT_COUNT)
            .map(|b| scorer.buff_score(b, catalog::BUFFS[b].max_value as f64))
            .sum();
        assert!((total - 100.0).abs() < 1e-9);
    }

    #[test]
    fn linear_clamps_overlarge_values() {
        let scorer = Scorer::new(ScorerKind::Linear, uniform()).unwrap();
        let at_max = scorer.buff_score(0, catalog::BUFFS[0].max_value as f64);
        let beyond = scorer.buff_score(0, catalog::BUFFS[0].max_value as f64 * 2.0);
        assert_eq!(at_max, beyond);
    }

    #[test]
    fn fixed_ignores_values() {
        let mut weights = [0.0; BUFF_COUNT];
        weights[0] = 5.0;
        weights[1] = 3.0;
        let scorer = Scorer::new(ScorerKind::Fixed, weights).unwrap();
        assert_eq!(scorer.buff_score(0, 63.0), 5.0);
        assert_eq!(scorer.buff_score(0, 105.0), 5.0);
        assert_eq!(scorer.bucket(1, 126.0), 300);
        assert!((scorer.max_total_score() - 8.0).abs() < 1e-12);
    }

    #[test]
    fn pmfs_are_normalised() {
        let scorer = Scorer::new(ScorerKind::Linear, uniform()).unwrap();
        for pooled in [false, true] {
            for pmf in scorer.score_pmfs(pooled) {
                let total: f64 = pmf.iter().map(|&(_, p)| p).sum();
                assert!((total - 1.0).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn zero_weight_buffs_collapse() {
        let mut weights = [0.0; BUFF_COUNT];
        weights[1] = 1.0;
        let scorer = Scorer::new(ScorerKind::Linear, weights).unwrap();
        let pmfs = scorer.score_pmfs(false);
        assert_eq!(pmfs[0], vec![(0, 1.0)]);
        assert!(pmfs[1].len() > 1);
    }

    #[test]
    fn rejects_bad_weights() {
        assert!(Scorer::new(ScorerKind::Linear, [0.0; BUFF_COUNT]).is_err());
        let mut negative = uniform();
        negative[3] = -1.0;
        assert!(Scorer::new(ScorerKind::Linear, negative).is_err());
        let mut non_finite = uniform();
        non_finite[3] = f64::NAN;
        assert!(Scorer::new(ScorerKind::Fixed, non_finite).is_err());
    }
}
