//! Solved policies: per-state advice, success probabilities, and the
//! resource summary.
//!
//! After the λ-search fixes the decision table, a second backward sweep —
//! same topological order, policy held fixed — computes for every interior
//! state the probability of finishing a successful artifact and the
//! expected raw tuner/exp consumption of one attempt (exp refunds credited
//! on abandon). The per-attempt expectations at the empty state, divided by
//! the per-attempt success probability, give the per-success resource
//! breakdown; the echo axis needs no sweep (exactly one echo per attempt).

use std::time::Instant;

use rayon::prelude::*;
use serde::Serialize;

use crate::cancel::CancelToken;
use crate::catalog;
use crate::constants::{
    is_revealed, stage_of, BUFF_COUNT, ECHO_PER_ATTEMPT, EXP_COST_BY_SLOT, SCORE_SCALE,
    SLOT_COUNT, TUNER_COST_BY_SLOT,
};
use crate::cost::CostModel;
use crate::error::SolveError;
use crate::evaluate::PolicyTable;
use crate::lambda;
use crate::scoring::Scorer;
use crate::state::SolveContext;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Decision {
    Continue,
    Abandon,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Continue => "Continue",
            Decision::Abandon => "Abandon",
        }
    }
}

/// Headline numbers for one solved policy.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicySummary {
    pub target_score: f64,
    pub lambda_star: f64,
    /// Equal to λ* — the quantity the λ-search drives to its optimum.
    pub expected_cost_per_success: f64,
    /// Probability that one attempt, played by the policy, ends in success.
    pub success_probability: f64,
    pub echo_per_success: f64,
    pub tuner_per_success: f64,
    pub exp_per_success: f64,
    pub compute_seconds: f64,
}

/// Advice for one queried state.
#[derive(Clone, Debug)]
pub struct Suggestion {
    pub decision: Decision,
    pub stage: usize,
    pub success_probability: f64,
    pub target_score: f64,
}

/// A fully solved policy: λ*, the decision table at λ*, per-state success
/// probabilities, and the derived summary. Immutable once built; shared via
/// `Arc` snapshots.
#[derive(Debug)]
pub struct SolvedPolicy {
    scorer: Scorer,
    ctx: SolveContext,
    lambda_star: f64,
    table: PolicyTable,
    success: Vec<Vec<f64>>,
    summary: PolicySummary,
}

impl SolvedPolicy {
    /// Run the full pipeline: λ-search, then the fixed-policy expectation
    /// sweep, then the summary.
    pub fn solve(
        scorer: Scorer,
        pool_counts: bool,
        target_score: f64,
        cost: CostModel,
        tolerance: f64,
        max_iter: usize,
        cancel: &CancelToken,
    ) -> Result<Self, SolveError> {
        let started = Instant::now();
        let ctx = SolveContext::new(&scorer, pool_counts, target_score, cost)?;
        let table = lambda::solve(&ctx, tolerance, max_iter, cancel)?;
        let lambda_star = table.lambda;
        let sweep = expectation_sweep(&ctx, &table, cancel)?;

        let success_probability = sweep.root.success;
        if success_probability <= 0.0 {
            return Err(SolveError::UnreachableTarget {
                target_score: ctx.target_raw,
                max_attainable: ctx.max_attainable_raw,
            });
        }

        let summary = PolicySummary {
            target_score,
            lambda_star,
            expected_cost_per_success: lambda_star,
            success_probability,
            echo_per_success: ECHO_PER_ATTEMPT / success_probability,
            tuner_per_success: sweep.root.tuner / success_probability,
            exp_per_success: sweep.root.exp / success_probability,
            compute_seconds: started.elapsed().as_secs_f64(),
        };

        Ok(Self {
            scorer,
            ctx,
            lambda_star,
            table,
            success: sweep.success,
            summary,
        })
    }

    pub fn summary(&self) -> &PolicySummary {
        &self.summary
    }

    pub fn lambda_star(&self) -> f64 {
        self.lambda_star
    }

    pub fn scorer(&self) -> &Scorer {
        &self.scorer
    }

    pub fn context(&self) -> &SolveContext {
        &self.ctx
    }

    pub fn table(&self) -> &PolicyTable {
        &self.table
    }

    pub fn target_bucket(&self) -> u32 {
        self.ctx.target
    }

    /// Continue/abandon advice for a state. Terminal artifacts have nothing
    /// left to reveal and report Abandon; the empty state always reports
    /// Continue (abandoning before any reveal is a no-op restart).
    pub fn decision(&self, mask: u16, score: u32) -> Decision {
        if stage_of(mask) >= SLOT_COUNT {
            return Decision::Abandon;
        }
        if mask == 0 {
            return Decision::Continue;
        }
        if self.table.decision_at(&self.ctx, mask, score) {
            Decision::Continue
        } else {
            Decision::Abandon
        }
    }

    /// Probability of finishing a successful artifact from this state under
    /// the policy. Terminal states report exactly 0 or 1.
    pub fn success_probability(&self, mask: u16, score: u32) -> f64 {
        if stage_of(mask) >= SLOT_COUNT {
            return if score >= self.ctx.target { 1.0 } else { 0.0 };
        }
        let position = self.ctx.space.index_of(mask);
        self.success[position][self.ctx.score_slot(position, score)]
    }

    /// V_{λ*} at a state; terminal states are evaluated by the success test.
    pub fn continuation_value(&self, mask: u16, score: u32) -> f64 {
        if stage_of(mask) >= SLOT_COUNT {
            return if score >= self.ctx.target {
                -self.lambda_star
            } else {
                0.0
            };
        }
        self.table.value_at(&self.ctx, mask, score)
    }

    /// Canonicalise a revealed-slot listing into a state and look up the
    /// advice. With an empty listing, `total_score` is used directly.
    pub fn suggest(
        &self,
        buff_names: &[String],
        buff_values: &[f64],
        total_score: f64,
    ) -> Result<Suggestion, SolveError> {
        if buff_names.len() > SLOT_COUNT {
            return Err(SolveError::invalid(
                "buffNames",
                format!("at most {SLOT_COUNT} buffs may be revealed, got {}", buff_names.len()),
            ));
        }
        if !buff_names.is_empty() && buff_names.len() != buff_values.len() {
            return Err(SolveError::invalid(
                "buffValues",
                "buffNames and buffValues must have the same length",
            ));
        }

        let (mask, bucket) = if buff_names.is_empty() {
            if !total_score.is_finite() || total_score < 0.0 {
                return Err(SolveError::invalid(
                    "totalScore",
                    format!("must be a finite non-negative number, got {total_score}"),
                ));
            }
            (0u16, (total_score * SCORE_SCALE).round().max(0.0) as u32)
        } else {
            let mut mask = 0u16;
            let mut bucket = 0u32;
            for (name, &value) in buff_names.iter().zip(buff_values.iter()) {
                let buff = catalog::buff_index(name).ok_or_else(|| {
                    SolveError::invalid("buffNames", format!("unknown buff id: {name}"))
                })?;
                if is_revealed(mask, buff) {
                    return Err(SolveError::invalid(
                        "buffNames",
                        format!("duplicate buff id: {name}"),
                    ));
                }
                if !value.is_finite() || value < 0.0 {
                    return Err(SolveError::invalid(
                        "buffValues",
                        format!("value for {name} must be finite and >= 0, got {value}"),
                    ));
                }
                mask |= 1 << buff;
                bucket += self.scorer.bucket(buff, value);
            }
            (mask, bucket)
        };

        Ok(Suggestion {
            decision: self.decision(mask, bucket),
            stage: buff_names.len(),
            success_probability: self.success_probability(mask, bucket),
            target_score: self.ctx.target_raw,
        })
    }
}

// ── Fixed-policy expectation sweep ──────────────────────────────────

struct ExpArena {
    success: Vec<f64>,
    tuner: Vec<f64>,
    exp: Vec<f64>,
}

struct AttemptStats {
    success: f64,
    tuner: f64,
    exp: f64,
}

struct SweepResult {
    success: Vec<Vec<f64>>,
    root: AttemptStats,
}

fn expectation_sweep(
    ctx: &SolveContext,
    table: &PolicyTable,
    cancel: &CancelToken,
) -> Result<SweepResult, SolveError> {
    let mask_count = ctx.space.masks.len();
    let mut arenas: Vec<ExpArena> = Vec::with_capacity(mask_count);
    arenas.resize_with(mask_count, || ExpArena {
        success: Vec::new(),
        tuner: Vec::new(),
        exp: Vec::new(),
    });

    for stage in (0..SLOT_COUNT).rev() {
        if cancel.is_cancelled() {
            return Err(SolveError::Cancelled);
        }
        let arenas_ref = &arenas;
        let swept: Vec<(usize, ExpArena)> = ctx
            .space
            .stage_range(stage)
            .into_par_iter()
            .map(|position| (position, sweep_mask(ctx, table, position, arenas_ref)))
            .collect();
        for (position, arena) in swept {
            arenas[position] = arena;
        }
    }

    let root_position = ctx.space.index_of(0);
    let root = AttemptStats {
        success: arenas[root_position].success[0],
        tuner: arenas[root_position].tuner[0],
        exp: arenas[root_position].exp[0],
    };
    let success = arenas.into_iter().map(|arena| arena.success).collect();
    Ok(SweepResult { success, root })
}

fn sweep_mask(
    ctx: &SolveContext,
    table: &PolicyTable,
    position: usize,
    arenas: &[ExpArena],
) -> ExpArena {
    let mask = ctx.space.masks[position];
    let stage = stage_of(mask);
    let base = ctx.bounds.base[position];
    let len = ctx.arena_len(position);
    let decisions = &table.arenas()[position].decisions;
    let draw_scale = 1.0 / (BUFF_COUNT - stage) as f64;

    let mut success = vec![0.0f64; len];
    let mut tuner = vec![0.0f64; len];
    let mut exp = vec![0.0f64; len];
    for slot in 0..len {
        // The empty state always attempts; abandoning there is a no-op.
        if mask != 0 && !decisions[slot] {
            exp[slot] = -ctx.cost.raw_exp_refund(stage);
            continue;
        }
        let score = base + slot as u32;
        let mut mean_success = 0.0f64;
        let mut mean_tuner = 0.0f64;
        let mut mean_exp = 0.0f64;
        for buff in 0..BUFF_COUNT {
            if is_revealed(mask, buff) {
                continue;
            }
            if stage + 1 == SLOT_COUNT {
                for &(bucket, probability) in &ctx.pmfs[buff] {
                    if score + bucket >= ctx.target {
                        mean_success += probability;
                    }
                }
            } else {
                let child_position = ctx.space.index_of(mask | (1 << buff));
                let child = &arenas[child_position];
                let child_base = ctx.bounds.base[child_position];
                let child_top = ctx.arena_top(child_position);
                for &(bucket, probability) in &ctx.pmfs[buff] {
                    let child_slot = ((score + bucket).min(child_top) - child_base) as usize;
                    mean_success += probability * child.success[child_slot];
                    mean_tuner += probability * child.tuner[child_slot];
                    mean_exp += probability * child.exp[child_slot];
                }
            }
        }
        success[slot] = mean_success * draw_scale;
        tuner[slot] = TUNER_COST_BY_SLOT[stage] + mean_tuner * draw_scale;
        exp[slot] = EXP_COST_BY_SLOT[stage] + mean_exp * draw_scale;
    }

    ExpArena {
        success,
        tuner,
        exp,
    }
}
