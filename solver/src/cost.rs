//! Resource cost model: weighted reveal costs and abandon refunds.
//!
//! Three cost axes — echo, tuner, exp — are combined into one scalar through
//! caller-chosen weights. Revealing slot `n` (0-based) costs
//! `w_tuner·TUNER[n] + w_exp·EXP[n]`, plus `w_echo` for slot 0 (the echo is
//! drawn once per attempt). Abandoning an artifact with `n` revealed slots
//! refunds `refund_ratio` of the exp embedded in it — exp only, revealed
//! slots only.

use crate::constants::{
    ECHO_PER_ATTEMPT, EXP_COST_BY_SLOT, EXP_EMBEDDED_BY_STAGE, MAX_EXP_REFUND_RATIO, SLOT_COUNT,
    TUNER_COST_BY_SLOT,
};
use crate::error::SolveError;

/// Relative worth of one echo, one tuner, and one exp.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CostWeights {
    pub echo: f64,
    pub tuner: f64,
    pub exp: f64,
}

impl CostWeights {
    pub const fn tuner_only() -> Self {
        Self {
            echo: 0.0,
            tuner: 1.0,
            exp: 0.0,
        }
    }
}

#[derive(Clone, Debug)]
pub struct CostModel {
    weights: CostWeights,
    refund_ratio: f64,
    reveal_cost: [f64; SLOT_COUNT],
    abandon_value: [f64; SLOT_COUNT + 1],
}

impl CostModel {
    /// Validate weights and build the per-slot cost tables. The refund ratio
    /// is clamped into `[0, MAX_EXP_REFUND_RATIO]`; NaN is rejected.
    pub fn new(weights: CostWeights, refund_ratio: f64) -> Result<Self, SolveError> {
        for (field, value) in [
            ("costWeights.wEcho", weights.echo),
            ("costWeights.wTuner", weights.tuner),
            ("costWeights.wExp", weights.exp),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(SolveError::invalid(
                    field,
                    format!("must be finite and >= 0, got {value}"),
                ));
            }
        }
        if weights.echo == 0.0 && weights.tuner == 0.0 && weights.exp == 0.0 {
            return Err(SolveError::invalid(
                "costWeights",
                "at least one cost weight must be positive",
            ));
        }
        if refund_ratio.is_nan() {
            return Err(SolveError::invalid(
                "expRefundRatio",
                "must be a number",
            ));
        }
        let refund_ratio = refund_ratio.clamp(0.0, MAX_EXP_REFUND_RATIO);

        let mut reveal_cost = [0.0; SLOT_COUNT];
        for (slot, cost) in reveal_cost.iter_mut().enumerate() {
            *cost = weights.tuner * TUNER_COST_BY_SLOT[slot] + weights.exp * EXP_COST_BY_SLOT[slot];
            if slot == 0 {
                *cost += weights.echo * ECHO_PER_ATTEMPT;
            }
        }
        let mut abandon_value = [0.0; SLOT_COUNT + 1];
        for (stage, value) in abandon_value.iter_mut().enumerate() {
            *value = -(refund_ratio * weights.exp * EXP_EMBEDDED_BY_STAGE[stage]);
        }

        Ok(Self {
            weights,
            refund_ratio,
            reveal_cost,
            abandon_value,
        })
    }

    /// Default model: tuners are the only scarce resource.
    pub fn tuner_only() -> Self {
        Self::new(CostWeights::tuner_only(), crate::constants::DEFAULT_EXP_REFUND_RATIO)
            .expect("tuner-only model is always valid")
    }

    pub fn weights(&self) -> CostWeights {
        self.weights
    }

    pub fn refund_ratio(&self) -> f64 {
        self.refund_ratio
    }

    /// Weighted cost paid to reveal slot `stage` (0-based).
    #[inline(always)]
    pub fn reveal_cost(&self, stage: usize) -> f64 {
        self.reveal_cost[stage]
    }

    /// Weighted value of abandoning at `stage` revealed slots: the negated
    /// exp refund, hence ≤ 0 (a credit).
    #[inline(always)]
    pub fn abandon_value(&self, stage: usize) -> f64 {
        self.abandon_value[stage]
    }

    /// Raw (unweighted) exp refunded when abandoning at `stage` reveals.
    #[inline(always)]
    pub fn raw_exp_refund(&self, stage: usize) -> f64 {
        self.refund_ratio * EXP_EMBEDDED_BY_STAGE[stage]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reveal_cost_composition() {
        let model = CostModel::new(
            CostWeights {
                echo: 2.0,
                tuner: 1.0,
                exp: 0.5,
            },
            0.5,
        )
        .unwrap();
        assert_eq!(model.reveal_cost(0), 2.0 + 1.0);
        assert_eq!(model.reveal_cost(2), 3.0 + 0.5 * 1600.0);
        assert_eq!(model.reveal_cost(4), 9.0 + 0.5 * 2800.0);
    }

    #[test]
    fn abandon_refunds_embedded_exp_only() {
        let model = CostModel::new(
            CostWeights {
                echo: 1.0,
                tuner: 1.0,
                exp: 2.0,
            },
            0.5,
        )
        .unwrap();
        assert_eq!(model.abandon_value(0), 0.0);
        assert_eq!(model.abandon_value(2), 0.0);
        assert_eq!(model.abandon_value(3), -(0.5 * 2.0 * 1600.0));
        assert_eq!(model.abandon_value(5), -(0.5 * 2.0 * 6400.0));
        assert_eq!(model.raw_exp_refund(4), 0.5 * 3600.0);
    }

    #[test]
    fn refund_ratio_is_clamped() {
        let weights = CostWeights::tuner_only();
        assert_eq!(CostModel::new(weights, 0.9).unwrap().refund_ratio(), 0.75);
        assert_eq!(CostModel::new(weights, -0.1).unwrap().refund_ratio(), 0.0);
        assert!(CostModel::new(weights, f64::NAN).is_err());
    }

    #[test]
    fn rejects_degenerate_weights() {
        assert!(CostModel::new(
            CostWeights {
                echo: 0.0,
                tuner: 0.0,
                exp: 0.0
            },
            0.5
        )
        .is_err());
        assert!(CostModel::new(
            CostWeights {
                echo: -1.0,
                tuner: 1.0,
                exp: 0.0
            },
            0.5
        )
        .is_err());
    }
}
