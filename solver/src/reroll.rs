//! Reroll solver: rank which baseline slots to lock before rerolling.
//!
//! A reroll keeps a locked subset of the baseline's five buffs and redraws
//! the remaining slots under the standard draw rule, restricted to buffs not
//! already locked — which is exactly an enhancement seeded with the locked
//! pairs. The solver therefore reuses the upgrade DP: each lock-set L is
//! priced as `lockCost(|L|) + V_{λ*}(seed(L))`, with the seed state's value
//! and success probability read from a solved upgrade policy.
//!
//! Reroll queries carry buff names only, so the underlying policy is solved
//! with the Fixed scorer (value-independent) and the default cost model.

use std::sync::Arc;

use crate::cancel::CancelToken;
use crate::catalog;
use crate::constants::{
    is_revealed, BUFF_COUNT, DEFAULT_EXP_REFUND_RATIO, DEFAULT_REROLL_TOP_K, LOCK_COST_BY_COUNT,
    SLOT_COUNT,
};
use crate::cache::{PolicyCache, PolicyRequest};
use crate::cost::CostWeights;
use crate::error::SolveError;
use crate::policy::SolvedPolicy;
use crate::scoring::ScorerKind;

/// One admissible lock-set, priced and ranked.
#[derive(Clone, Debug)]
pub struct LockChoice {
    /// 1-based baseline slot positions to lock.
    pub lock_slot_indices: Vec<usize>,
    pub expected_cost: f64,
    pub success_probability: f64,
    /// `expected_cost − expected_cost(rank 1)`; 0 for the first entry.
    pub regret: f64,
}

/// Outcome of a reroll query.
#[derive(Clone, Debug)]
pub struct RerollRecommendation {
    pub valid: bool,
    pub reason: Option<String>,
    pub baseline_score: f64,
    pub candidate_score: Option<f64>,
    /// None unless the candidate is fully specified.
    pub accept_candidate: Option<bool>,
    pub choices: Vec<LockChoice>,
}

/// A solved reroll policy: a Fixed-scorer upgrade policy plus the weight
/// vector used for baseline/candidate scoring.
pub struct RerollPolicy {
    policy: Arc<SolvedPolicy>,
    weights: [f64; BUFF_COUNT],
    target_score: f64,
}

impl RerollPolicy {
    pub fn compute(
        cache: &PolicyCache,
        buff_weights: [f64; BUFF_COUNT],
        target_score: f64,
        cancel: &CancelToken,
    ) -> Result<Self, SolveError> {
        let request = PolicyRequest::new(
            buff_weights,
            target_score,
            ScorerKind::Fixed,
            CostWeights::tuner_only(),
            DEFAULT_EXP_REFUND_RATIO,
        );
        let policy = cache.compute(&request, cancel)?;
        Ok(Self {
            policy,
            weights: buff_weights,
            target_score,
        })
    }

    pub fn target_score(&self) -> f64 {
        self.target_score
    }

    /// Rank lock-sets for `baseline`, optionally judging a redraw candidate.
    pub fn recommend(
        &self,
        baseline_names: &[String],
        candidate_names: &[String],
        top_k: usize,
    ) -> Result<RerollRecommendation, SolveError> {
        let baseline_filled =
            baseline_names.len() == SLOT_COUNT && baseline_names.iter().all(|n| !n.is_empty());
        if !baseline_filled {
            return Ok(RerollRecommendation {
                valid: false,
                reason: Some(format!("baseline must name {SLOT_COUNT} buff types")),
                baseline_score: 0.0,
                candidate_score: None,
                accept_candidate: None,
                choices: Vec::new(),
            });
        }

        let baseline = self.resolve_slots(baseline_names, "baselineBuffNames")?;
        let baseline_score = self.fixed_score(&baseline);

        let limit = if top_k == 0 { DEFAULT_REROLL_TOP_K } else { top_k };
        let mut choices = self.ranked_choices(&baseline);
        choices.truncate(limit);

        let candidate_filled =
            candidate_names.len() == SLOT_COUNT && candidate_names.iter().all(|n| !n.is_empty());
        let (candidate_score, accept_candidate) = if candidate_filled {
            let candidate = self.resolve_slots(candidate_names, "candidateBuffNames")?;
            let candidate_score = self.fixed_score(&candidate);
            let accept = candidate_score >= baseline_score - 1e-9
                && self.best_cost(&candidate) <= self.best_cost(&baseline) + 1e-9;
            (Some(candidate_score), Some(accept))
        } else {
            (None, None)
        };

        Ok(RerollRecommendation {
            valid: true,
            reason: None,
            baseline_score,
            candidate_score,
            accept_candidate,
            choices,
        })
    }

    fn resolve_slots(
        &self,
        names: &[String],
        field: &'static str,
    ) -> Result<[usize; SLOT_COUNT], SolveError> {
        let mut slots = [0usize; SLOT_COUNT];
        let mut seen = 0u16;
        for (slot, name) in names.iter().enumerate() {
            let buff = catalog::buff_index(name)
                .ok_or_else(|| SolveError::invalid(field, format!("unknown buff id: {name}")))?;
            if is_revealed(seen, buff) {
                return Err(SolveError::invalid(
                    field,
                    format!("duplicate buff id: {name}"),
                ));
            }
            seen |= 1 << buff;
            slots[slot] = buff;
        }
        Ok(slots)
    }

    fn fixed_score(&self, slots: &[usize; SLOT_COUNT]) -> f64 {
        slots.iter().map(|&buff| self.weights[buff]).sum()
    }

    /// All admissible lock-sets for a baseline, priced and sorted by
    /// expected cost. A baseline that already meets the target additionally
    /// gets the keep-everything choice, priced like every other option
    /// (zero reroll cost plus the terminal value −λ*), which makes it rank
    /// first and gives every true reroll a non-negative regret.
    fn ranked_choices(&self, slots: &[usize; SLOT_COUNT]) -> Vec<LockChoice> {
        let mut choices = Vec::new();
        if self.fixed_score(slots) >= self.target_score - 1e-9 {
            choices.push(LockChoice {
                lock_slot_indices: (1..=SLOT_COUNT).collect(),
                expected_cost: -self.policy.lambda_star(),
                success_probability: 1.0,
                regret: 0.0,
            });
        }
        for subset in 0u32..(1 << SLOT_COUNT) {
            let locked = subset.count_ones() as usize;
            if locked >= SLOT_COUNT {
                continue;
            }
            // Locking a weightless buff spends lock budget on a slot the
            // score cannot use.
            if (0..SLOT_COUNT)
                .any(|slot| subset & (1 << slot) != 0 && self.weights[slots[slot]] <= 0.0)
            {
                continue;
            }

            let mut seed_mask = 0u16;
            let mut seed_bucket = 0u32;
            let mut lock_slot_indices = Vec::with_capacity(locked);
            for slot in 0..SLOT_COUNT {
                if subset & (1 << slot) != 0 {
                    let buff = slots[slot];
                    seed_mask |= 1 << buff;
                    seed_bucket += self.policy.scorer().bucket(buff, 0.0);
                    lock_slot_indices.push(slot + 1);
                }
            }

            choices.push(LockChoice {
                lock_slot_indices,
                expected_cost: LOCK_COST_BY_COUNT[locked]
                    + self.policy.continuation_value(seed_mask, seed_bucket),
                success_probability: self.policy.success_probability(seed_mask, seed_bucket),
                regret: 0.0,
            });
        }

        choices.sort_by(|lhs, rhs| lhs.expected_cost.total_cmp(&rhs.expected_cost));
        let best = choices[0].expected_cost;
        for choice in choices.iter_mut() {
            choice.regret = choice.expected_cost - best;
        }
        choices
    }

    fn best_cost(&self, slots: &[usize; SLOT_COUNT]) -> f64 {
        self.ranked_choices(slots)[0].expected_cost
    }
}
