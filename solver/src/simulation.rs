//! Monte-Carlo validator — replays a solved policy with a seeded RNG.
//!
//! Runs N independent attempts: draw per the standard rule, consult the
//! cached decision at every state, accumulate raw per-axis costs (echo at
//! attempt start, tuner/exp per the reveal schedule, exp refund on
//! abandon), count successes. The measured success rate and per-success
//! costs must agree with the analytic summary within statistical bounds
//! (3σ at N ≥ 10⁶). Attempts run in fixed-size chunks across rayon workers,
//! each chunk with a seed derived from the caller's.

use std::time::Instant;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::Serialize;

use crate::constants::{
    is_revealed, BUFF_COUNT, EXP_COST_BY_SLOT, SLOT_COUNT, TUNER_COST_BY_SLOT,
};
use crate::policy::{Decision, SolvedPolicy};

const CHUNK_SIZE: u64 = 16_384;

/// Aggregate results of one simulation run.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationReport {
    pub attempts: u64,
    pub successes: u64,
    pub success_rate: f64,
    /// Binomial standard error of `success_rate`.
    pub success_rate_std_error: f64,
    pub echo_per_success: f64,
    pub tuner_per_success: f64,
    pub exp_per_success: f64,
    pub weighted_cost_per_success: f64,
    pub elapsed_seconds: f64,
}

#[derive(Default, Clone, Copy)]
struct Totals {
    successes: u64,
    echo: f64,
    tuner: f64,
    exp: f64,
}

impl Totals {
    fn merge(self, other: Totals) -> Totals {
        Totals {
            successes: self.successes + other.successes,
            echo: self.echo + other.echo,
            tuner: self.tuner + other.tuner,
            exp: self.exp + other.exp,
        }
    }
}

/// Replay `attempts` independent enhancement attempts under the policy.
pub fn simulate(policy: &SolvedPolicy, attempts: u64, seed: u64) -> SimulationReport {
    let started = Instant::now();
    let chunks = attempts.div_ceil(CHUNK_SIZE);

    let totals = (0..chunks)
        .into_par_iter()
        .map(|chunk| {
            let mut rng =
                SmallRng::seed_from_u64(seed.wrapping_add(chunk.wrapping_mul(0x9E3779B97F4A7C15)));
            let count = CHUNK_SIZE.min(attempts - chunk * CHUNK_SIZE);
            let mut totals = Totals::default();
            for _ in 0..count {
                run_attempt(policy, &mut rng, &mut totals);
            }
            totals
        })
        .reduce(Totals::default, Totals::merge);

    let success_rate = totals.successes as f64 / attempts as f64;
    let per_success = |axis_total: f64| {
        if totals.successes > 0 {
            axis_total / totals.successes as f64
        } else {
            f64::INFINITY
        }
    };
    let weights = policy.context().cost.weights();
    let weighted_total =
        weights.echo * totals.echo + weights.tuner * totals.tuner + weights.exp * totals.exp;

    SimulationReport {
        attempts,
        successes: totals.successes,
        success_rate,
        success_rate_std_error: (success_rate * (1.0 - success_rate) / attempts as f64).sqrt(),
        echo_per_success: per_success(totals.echo),
        tuner_per_success: per_success(totals.tuner),
        exp_per_success: per_success(totals.exp),
        weighted_cost_per_success: per_success(weighted_total),
        elapsed_seconds: started.elapsed().as_secs_f64(),
    }
}

fn run_attempt(policy: &SolvedPolicy, rng: &mut SmallRng, totals: &mut Totals) {
    let ctx = policy.context();
    let mut mask = 0u16;
    let mut score = 0u32;

    for stage in 0..SLOT_COUNT {
        if policy.decision(mask, score) == Decision::Abandon {
            totals.exp -= ctx.cost.raw_exp_refund(stage);
            return;
        }
        if stage == 0 {
            totals.echo += 1.0;
        }
        totals.tuner += TUNER_COST_BY_SLOT[stage];
        totals.exp += EXP_COST_BY_SLOT[stage];

        let buff = draw_buff(rng, mask, stage);
        score += draw_bucket(rng, &ctx.pmfs[buff]);
        mask |= 1 << buff;
    }

    if score >= ctx.target {
        totals.successes += 1;
    }
    // A finished artifact that misses the target is discarded whole; the
    // refund applies to in-progress abandons only.
}

/// Pick an unrevealed buff uniformly at random.
#[inline(always)]
fn draw_buff(rng: &mut SmallRng, mask: u16, stage: usize) -> usize {
    let mut pick = rng.random_range(0..BUFF_COUNT - stage);
    for buff in 0..BUFF_COUNT {
        if is_revealed(mask, buff) {
            continue;
        }
        if pick == 0 {
            return buff;
        }
        pick -= 1;
    }
    unreachable!("mask has at most {} of {} bits set", SLOT_COUNT, BUFF_COUNT);
}

/// Sample a score bucket from one buff's PMF by inverse transform.
#[inline(always)]
fn draw_bucket(rng: &mut SmallRng, pmf: &[(u32, f64)]) -> u32 {
    let mut remaining: f64 = rng.random();
    for &(bucket, probability) in pmf {
        remaining -= probability;
        if remaining <= 0.0 {
            return bucket;
        }
    }
    pmf.last().expect("pmf is never empty").0
}
