//! Inner DP evaluator: backward induction over enhancement states at a
//! fixed Lagrangian multiplier λ.
//!
//! Processes stages in decreasing order, from stage 4 down to stage 0, so
//! that every child state is solved before its parents. Terminal states
//! (stage 5) are folded in on the fly: their value is `−λ` when the score
//! meets the target and `0` otherwise. Masks within one stage are
//! independent and are solved in parallel with rayon; results are collected
//! and scattered back sequentially.
//!
//! Per interior state:
//!
//! ```text
//! Q_continue = c(stage) + mean over draws of V(child)
//! Q_abandon  = −refund_ratio · w_exp · embedded_exp(stage)
//! V          = min(Q_continue, Q_abandon)
//! ```
//!
//! with Continue chosen only on a strict win (exact ties abandon). States
//! that can no longer reach the target even with perfect remaining draws
//! short-circuit to the abandon value without expanding children; every
//! descendant of such a state is itself hopeless, so the shortcut is exact,
//! not a heuristic.

use rayon::prelude::*;

use crate::cancel::CancelToken;
use crate::constants::{is_revealed, stage_of, BUFF_COUNT, SLOT_COUNT};
use crate::error::SolveError;
use crate::state::SolveContext;

/// Dense V/decision storage for one mask. `values[k]` and `decisions[k]`
/// cover score `base + k`; the top slot covers every score at or above the
/// arena ceiling.
#[derive(Default, Debug)]
pub struct MaskArena {
    pub values: Vec<f64>,
    pub decisions: Vec<bool>,
}

/// The value function and decision table at one λ.
#[derive(Debug)]
pub struct PolicyTable {
    pub lambda: f64,
    /// Raw continue value of the empty state — the λ-search root function.
    pub root_continue: f64,
    arenas: Vec<MaskArena>,
}

impl PolicyTable {
    /// V_λ at an interior state, score-clamped into the mask's arena.
    #[inline]
    pub fn value_at(&self, ctx: &SolveContext, mask: u16, score: u32) -> f64 {
        let position = ctx.space.index_of(mask);
        self.arenas[position].values[ctx.score_slot(position, score)]
    }

    /// Continue/abandon decision at an interior state.
    #[inline]
    pub fn decision_at(&self, ctx: &SolveContext, mask: u16, score: u32) -> bool {
        let position = ctx.space.index_of(mask);
        self.arenas[position].decisions[ctx.score_slot(position, score)]
    }

    pub fn arenas(&self) -> &[MaskArena] {
        &self.arenas
    }
}

/// Solve V_λ for every interior state. Observes `cancel` between stage
/// sweeps.
pub fn evaluate(
    ctx: &SolveContext,
    lambda: f64,
    cancel: &CancelToken,
) -> Result<PolicyTable, SolveError> {
    let mask_count = ctx.space.masks.len();
    let mut arenas: Vec<MaskArena> = Vec::with_capacity(mask_count);
    arenas.resize_with(mask_count, MaskArena::default);

    for stage in (0..SLOT_COUNT).rev() {
        if cancel.is_cancelled() {
            return Err(SolveError::Cancelled);
        }
        let arenas_ref = &arenas;
        let solved: Result<Vec<(usize, MaskArena)>, SolveError> = ctx
            .space
            .stage_range(stage)
            .into_par_iter()
            .map(|position| solve_mask(ctx, lambda, position, arenas_ref).map(|a| (position, a)))
            .collect();
        for (position, arena) in solved? {
            arenas[position] = arena;
        }
    }

    let root_continue =
        ctx.cost.reveal_cost(0) + expected_child_value(ctx, lambda, &arenas, 0, 0, 0);
    if !root_continue.is_finite() {
        return Err(SolveError::Numeric);
    }

    Ok(PolicyTable {
        lambda,
        root_continue,
        arenas,
    })
}

fn solve_mask(
    ctx: &SolveContext,
    lambda: f64,
    position: usize,
    arenas: &[MaskArena],
) -> Result<MaskArena, SolveError> {
    let mask = ctx.space.masks[position];
    let stage = stage_of(mask);
    let base = ctx.bounds.base[position];
    let best_remaining = ctx.bounds.best_remaining[position];
    let reveal = ctx.cost.reveal_cost(stage);
    let abandon = ctx.cost.abandon_value(stage);
    let len = ctx.arena_len(position);

    let mut values = vec![0.0f64; len];
    let mut decisions = vec![false; len];
    for slot in 0..len {
        let score = base + slot as u32;
        if score + best_remaining < ctx.target {
            // Hopeless: no completion can reach the target from here.
            values[slot] = abandon;
            continue;
        }
        let q_continue = reveal + expected_child_value(ctx, lambda, arenas, mask, stage, score);
        if !q_continue.is_finite() {
            return Err(SolveError::Numeric);
        }
        if q_continue < abandon {
            values[slot] = q_continue;
            decisions[slot] = true;
        } else {
            values[slot] = abandon;
        }
    }

    Ok(MaskArena { values, decisions })
}

/// Mean of V over one draw step from `(mask, score)`: an unrevealed buff
/// uniformly at random, then a value from its bucket PMF. Children at stage
/// 5 are terminal and evaluated inline.
#[inline]
fn expected_child_value(
    ctx: &SolveContext,
    lambda: f64,
    arenas: &[MaskArena],
    mask: u16,
    stage: usize,
    score: u32,
) -> f64 {
    let mut total = 0.0f64;
    for buff in 0..BUFF_COUNT {
        if is_revealed(mask, buff) {
            continue;
        }
        if stage + 1 == SLOT_COUNT {
            for &(bucket, probability) in &ctx.pmfs[buff] {
                if score + bucket >= ctx.target {
                    total -= probability * lambda;
                }
            }
        } else {
            let child_position = ctx.space.index_of(mask | (1 << buff));
            let child = &arenas[child_position];
            let child_base = ctx.bounds.base[child_position];
            let child_top = ctx.arena_top(child_position);
            for &(bucket, probability) in &ctx.pmfs[buff] {
                let child_score = (score + bucket).min(child_top);
                total += probability * child.values[(child_score - child_base) as usize];
            }
        }
    }
    total / (BUFF_COUNT - stage) as f64
}
