//! End-to-end policy tests: solve real requests through the public API and
//! check the analytic invariants the solver must satisfy.
//!
//! Scenario shorthand: weights are given per buff id; costs are
//! (echo, tuner, exp) weights; scores are in points (buckets / 100).

use std::sync::Arc;

use artifact_solver::catalog::{self, DEFAULT_BUFF_WEIGHTS};
use artifact_solver::constants::BUFF_COUNT;
use artifact_solver::evaluate::evaluate;
use artifact_solver::{
    simulate, CancelToken, CostModel, CostWeights, Decision, PolicyCache, PolicyRequest, Scorer,
    ScorerKind, SolveError, SolvedPolicy,
};

const TUNER_ONLY: CostWeights = CostWeights {
    echo: 0.0,
    tuner: 1.0,
    exp: 0.0,
};

fn weights_for(entries: &[(&str, f64)]) -> [f64; BUFF_COUNT] {
    let mut weights = [0.0; BUFF_COUNT];
    for &(id, weight) in entries {
        weights[catalog::buff_index(id).expect("known buff id")] = weight;
    }
    weights
}

fn solve(
    kind: ScorerKind,
    weights: [f64; BUFF_COUNT],
    target: f64,
    costs: CostWeights,
    refund: f64,
) -> Result<SolvedPolicy, SolveError> {
    let scorer = Scorer::new(kind, weights)?;
    let cost = CostModel::new(costs, refund)?;
    SolvedPolicy::solve(scorer, false, target, cost, 1e-6, 120, &CancelToken::new())
}

fn full_mask(buffs: &[usize]) -> u16 {
    buffs.iter().fold(0u16, |mask, &buff| mask | (1 << buff))
}

// ── Scenarios ───────────────────────────────────────────────────────

// Single positive weight on Crit_Damage, target 50: every Crit_Damage roll
// alone clears the target (its smallest value scores 60), so success is
// purely about the buff showing up before the policy gives up.
#[test]
fn single_buff_focus_crit_damage() {
    let policy = solve(
        ScorerKind::Linear,
        weights_for(&[("Crit_Damage", 1.0)]),
        50.0,
        TUNER_ONLY,
        0.66,
    )
    .unwrap();
    let summary = policy.summary();

    assert!(summary.lambda_star.is_finite());
    assert!(summary.lambda_star > 0.0);
    assert!(
        summary.success_probability > 0.05 && summary.success_probability < 0.6,
        "p = {}",
        summary.success_probability
    );
    // One echo per attempt, exactly.
    assert!(
        (summary.echo_per_success - 1.0 / summary.success_probability).abs() < 1e-9
    );
    // Exp axis never spent under (0, 1, 0) weights... but raw exp is still
    // consumed by slots 3..5 when the policy keeps revealing.
    assert!(summary.exp_per_success >= 0.0);

    // λ* is the root of the continue value at the published table.
    assert!(policy.table().root_continue.abs() <= 1e-6);

    // Weighted per-success identity: with tuner-only weights, λ* is the
    // tuner consumption per success.
    assert!(
        (summary.lambda_star - summary.tuner_per_success).abs() < 1e-3,
        "lambda*={} tuner/success={}",
        summary.lambda_star,
        summary.tuner_per_success
    );
}

// Uniform weights accept far more artifacts than a single-buff focus at the
// same target, so the optimal cost per success must be lower.
#[test]
fn broad_weights_are_cheaper_than_focused() {
    let broad = solve(ScorerKind::Linear, [1.0; BUFF_COUNT], 60.0, TUNER_ONLY, 0.66).unwrap();
    let focused = solve(
        ScorerKind::Linear,
        weights_for(&[("Crit_Damage", 1.0)]),
        60.0,
        TUNER_ONLY,
        0.66,
    )
    .unwrap();

    assert!(broad.summary().expected_cost_per_success.is_finite());
    assert!(
        broad.summary().expected_cost_per_success < focused.summary().expected_cost_per_success,
        "broad={} focused={}",
        broad.summary().expected_cost_per_success,
        focused.summary().expected_cost_per_success
    );
}

// Target 100 under Linear needs the best value of every top-5 buff: success
// is astronomically rare but not impossible, so λ* is huge yet finite.
#[test]
fn perfect_artifact_target() {
    let policy = solve(
        ScorerKind::Linear,
        DEFAULT_BUFF_WEIGHTS,
        100.0,
        TUNER_ONLY,
        0.66,
    )
    .unwrap();
    let summary = policy.summary();

    assert!(summary.lambda_star.is_finite());
    assert!(summary.lambda_star > 1e6, "lambda* = {}", summary.lambda_star);
    assert!(summary.success_probability > 0.0);
    assert!(
        summary.success_probability < 1e-8,
        "p = {}",
        summary.success_probability
    );
}

// Target 101 under Linear cannot be reached at all.
#[test]
fn impossible_target_is_rejected() {
    let error = solve(
        ScorerKind::Linear,
        DEFAULT_BUFF_WEIGHTS,
        101.0,
        TUNER_ONLY,
        0.66,
    )
    .unwrap_err();
    assert!(matches!(error, SolveError::UnreachableTarget { .. }));
}

// Fixed scorer, two 5-weight buffs, target 10: values are irrelevant, only
// surfacing both buffs matters.
#[test]
fn fixed_scorer_pair_target() {
    let policy = solve(
        ScorerKind::Fixed,
        weights_for(&[("Crit_Rate", 5.0), ("Crit_Damage", 5.0)]),
        10.0,
        TUNER_ONLY,
        0.66,
    )
    .unwrap();
    let summary = policy.summary();

    // Upper bound: both buffs among the five reveals, C(11,3)/C(13,5). The
    // optimal policy trims cold starts, so it lands strictly below that.
    let both_drawn = 165.0 / 1287.0;
    assert!(
        summary.success_probability <= both_drawn + 1e-9,
        "p = {}",
        summary.success_probability
    );
    assert!(summary.success_probability > 0.001);
    assert!((summary.lambda_star - summary.tuner_per_success).abs() < 1e-3);

    // Terminal states answer from the success test alone: V is −λ* on
    // success and 0 otherwise.
    let crit_pair_full = full_mask(&[0, 1, 2, 3, 4]);
    assert_eq!(policy.success_probability(crit_pair_full, 1000), 1.0);
    assert_eq!(policy.success_probability(crit_pair_full, 999), 0.0);
    assert_eq!(policy.decision(crit_pair_full, 1000), Decision::Abandon);
    assert_eq!(policy.continuation_value(crit_pair_full, 1000), -summary.lambda_star);
    assert_eq!(policy.continuation_value(crit_pair_full, 999), 0.0);
}

// ── Invariants ──────────────────────────────────────────────────────

// The root continue value is non-increasing in λ.
#[test]
fn root_value_monotone_in_lambda() {
    let scorer = Scorer::new(ScorerKind::Linear, weights_for(&[("Crit_Damage", 1.0)])).unwrap();
    let ctx = artifact_solver::state::SolveContext::new(
        &scorer,
        false,
        50.0,
        CostModel::new(TUNER_ONLY, 0.66).unwrap(),
    )
    .unwrap();
    let token = CancelToken::new();

    let lambdas = [0.0, 1.0, 5.0, 20.0, 80.0, 320.0];
    let mut previous = f64::INFINITY;
    for &lambda in &lambdas {
        let table = evaluate(&ctx, lambda, &token).unwrap();
        assert!(
            table.root_continue <= previous + 1e-9,
            "f({lambda}) = {} rose above {previous}",
            table.root_continue
        );
        previous = table.root_continue;
    }
}

// Continue is chosen exactly when it is strictly cheaper than the abandon
// refund; abandon states carry the refund value itself.
#[test]
fn decisions_match_stored_values() {
    let policy = solve(
        ScorerKind::Linear,
        DEFAULT_BUFF_WEIGHTS,
        60.0,
        CostWeights {
            echo: 0.1,
            tuner: 1.0,
            exp: 0.001,
        },
        0.66,
    )
    .unwrap();
    let ctx = policy.context();

    for (position, &mask) in ctx.space.masks.iter().enumerate() {
        let stage = mask.count_ones() as usize;
        let abandon = ctx.cost.abandon_value(stage);
        let arena = &policy.table().arenas()[position];
        for (value, &decision) in arena.values.iter().zip(arena.decisions.iter()) {
            if decision {
                assert!(*value < abandon, "continue state must beat the refund");
            } else {
                assert_eq!(*value, abandon);
            }
        }
    }
}

// Success probabilities are probabilities; terminal ones are 0 or 1.
#[test]
fn success_probabilities_are_valid() {
    let policy = solve(
        ScorerKind::Fixed,
        weights_for(&[("Crit_Rate", 5.0), ("Crit_Damage", 5.0)]),
        10.0,
        TUNER_ONLY,
        0.66,
    )
    .unwrap();

    let p = policy.summary().success_probability;
    assert!((0.0..=1.0).contains(&p));

    for score in [0u32, 500, 999, 1000, 2000] {
        let terminal = policy.success_probability(full_mask(&[0, 1, 2, 3, 4]), score);
        assert!(terminal == 0.0 || terminal == 1.0);
    }
}

// Identical requests produce identical summaries, bit for bit, and cache
// hits share the snapshot.
#[test]
fn cache_and_recompute_are_deterministic() {
    let cache = PolicyCache::new();
    let token = CancelToken::new();
    let request = PolicyRequest::new(
        weights_for(&[("Crit_Rate", 3.0), ("Attack", 2.0)]),
        4.5,
        ScorerKind::Fixed,
        TUNER_ONLY,
        0.66,
    );

    let first = cache.compute(&request, &token).unwrap();
    let second = cache.compute(&request, &token).unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    let recomputed = {
        let scorer = Scorer::new(request.scorer, request.buff_weights).unwrap();
        let cost = CostModel::new(request.cost_weights, request.exp_refund_ratio).unwrap();
        SolvedPolicy::solve(scorer, false, 4.5, cost, 1e-6, 120, &token).unwrap()
    };
    let a = first.summary();
    let b = recomputed.summary();
    assert_eq!(a.lambda_star.to_bits(), b.lambda_star.to_bits());
    assert_eq!(
        a.success_probability.to_bits(),
        b.success_probability.to_bits()
    );
    assert_eq!(a.tuner_per_success.to_bits(), b.tuner_per_success.to_bits());
    assert_eq!(a.exp_per_success.to_bits(), b.exp_per_success.to_bits());
}

// ── Suggestions ─────────────────────────────────────────────────────

#[test]
fn suggestion_canonicalises_reveals() {
    let policy = solve(
        ScorerKind::Linear,
        DEFAULT_BUFF_WEIGHTS,
        60.0,
        TUNER_ONLY,
        0.66,
    )
    .unwrap();

    // Stage 0 always continues.
    let start = policy.suggest(&[], &[], 0.0).unwrap();
    assert_eq!(start.decision, Decision::Continue);
    assert_eq!(start.stage, 0);
    assert!((0.0..=1.0).contains(&start.success_probability));

    // A top-roll crit pair is a state worth continuing.
    let names = vec!["Crit_Rate".to_string(), "Crit_Damage".to_string()];
    let good = policy.suggest(&names, &[105.0, 210.0], 0.0).unwrap();
    assert_eq!(good.stage, 2);
    assert_eq!(good.decision, Decision::Continue);

    // Unknown and duplicate ids are rejected.
    assert!(matches!(
        policy.suggest(&["Haste".to_string()], &[10.0], 0.0),
        Err(SolveError::InvalidInput { .. })
    ));
    let dup = vec!["Crit_Rate".to_string(), "Crit_Rate".to_string()];
    assert!(matches!(
        policy.suggest(&dup, &[63.0, 69.0], 0.0),
        Err(SolveError::InvalidInput { .. })
    ));
}

// ── Monte-Carlo agreement ───────────────────────────────────────────

#[test]
fn simulation_smoke_matches_summary() {
    let policy = solve(
        ScorerKind::Fixed,
        weights_for(&[("Crit_Rate", 5.0), ("Crit_Damage", 5.0)]),
        10.0,
        TUNER_ONLY,
        0.66,
    )
    .unwrap();
    let summary = policy.summary();

    let report = simulate(&policy, 200_000, 7);
    let sigma = report.success_rate_std_error;
    assert!(
        (report.success_rate - summary.success_probability).abs() <= 5.0 * sigma,
        "simulated {} vs analytic {} (sigma {})",
        report.success_rate,
        summary.success_probability,
        sigma
    );
    let tuner_rel =
        (report.tuner_per_success - summary.tuner_per_success).abs() / summary.tuner_per_success;
    assert!(tuner_rel < 0.05, "tuner/success off by {tuner_rel}");
}

#[test]
#[ignore = "10^6 attempts; run with --ignored for the full statistical check"]
fn simulation_full_statistical_check() {
    let policy = solve(
        ScorerKind::Linear,
        DEFAULT_BUFF_WEIGHTS,
        60.0,
        CostWeights {
            echo: 0.2,
            tuner: 1.0,
            exp: 0.0005,
        },
        0.66,
    )
    .unwrap();
    let summary = policy.summary();

    let report = simulate(&policy, 1_000_000, 42);
    let sigma = report.success_rate_std_error;
    assert!(
        (report.success_rate - summary.success_probability).abs() <= 4.0 * sigma,
        "simulated {} vs analytic {} (sigma {})",
        report.success_rate,
        summary.success_probability,
        sigma
    );
    for (simulated, analytic) in [
        (report.echo_per_success, summary.echo_per_success),
        (report.tuner_per_success, summary.tuner_per_success),
        (report.exp_per_success, summary.exp_per_success),
        (
            report.weighted_cost_per_success,
            summary.expected_cost_per_success,
        ),
    ] {
        let relative = (simulated - analytic).abs() / analytic.abs().max(1e-12);
        assert!(relative < 0.02, "{simulated} vs {analytic}");
    }
}
