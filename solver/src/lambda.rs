//! Outer λ-search: find λ* where the root continue value crosses zero.
//!
//! `f(λ) = Q_continue(s₀; λ)` is continuous and non-increasing in λ:
//! raising the per-success reward can only lower the optimal expected
//! Lagrangian cost of an attempt. `f(0) ≥ 0` (costs without reward), and
//! `f(λ) → −∞` whenever the target is reachable with positive probability,
//! so the root λ* is unique. At λ*, the policy minimises expected resource
//! cost per success, and that optimum equals λ* itself.
//!
//! Bracketing doubles λ from 1 until `f < 0`; if no sign change appears
//! below [`LAMBDA_HARD_CAP`](crate::constants::LAMBDA_HARD_CAP) the target
//! is unreachable. Bisection then runs until `|f| ≤ tolerance` or the
//! iteration budget is exhausted, whichever comes first; the table from the
//! last evaluated midpoint is what gets returned, so λ* and its table are
//! always consistent.

use crate::cancel::CancelToken;
use crate::constants::LAMBDA_HARD_CAP;
use crate::error::SolveError;
use crate::evaluate::{evaluate, PolicyTable};
use crate::state::SolveContext;

/// Find λ* and return the table evaluated at it (`table.lambda` is λ*).
pub fn solve(
    ctx: &SolveContext,
    tolerance: f64,
    max_iter: usize,
    cancel: &CancelToken,
) -> Result<PolicyTable, SolveError> {
    if !tolerance.is_finite() || tolerance <= 0.0 {
        return Err(SolveError::invalid(
            "lambdaTolerance",
            format!("must be a positive finite number, got {tolerance}"),
        ));
    }
    if max_iter == 0 {
        return Err(SolveError::invalid(
            "lambdaMaxIter",
            "must be greater than 0",
        ));
    }

    let at_zero = evaluate(ctx, 0.0, cancel)?;
    if at_zero.root_continue.abs() <= tolerance {
        return Ok(at_zero);
    }

    let mut lo = 0.0f64;
    let mut hi = 1.0f64;
    let mut table = evaluate(ctx, hi, cancel)?;
    while table.root_continue > 0.0 {
        if hi >= LAMBDA_HARD_CAP {
            return Err(SolveError::UnreachableTarget {
                target_score: ctx.target_raw,
                max_attainable: ctx.max_attainable_raw,
            });
        }
        lo = hi;
        hi *= 2.0;
        table = evaluate(ctx, hi, cancel)?;
    }

    for _ in 0..max_iter {
        let mid = 0.5 * (lo + hi);
        table = evaluate(ctx, mid, cancel)?;
        if table.root_continue.abs() <= tolerance {
            break;
        }
        if table.root_continue > 0.0 {
            lo = mid;
        } else {
            hi = mid;
        }
    }

    Ok(table)
}
