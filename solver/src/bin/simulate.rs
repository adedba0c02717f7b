//! Monte-Carlo validation binary: solve a policy, replay it, compare.
//!
//! Usage: `simulate [--target T] [--attempts N] [--seed S] [--fixed]`
//! Weights default to the crit-focused preset.

use std::time::Instant;

use artifact_solver::catalog::DEFAULT_BUFF_WEIGHTS;
use artifact_solver::constants::{DEFAULT_LAMBDA_MAX_ITER, DEFAULT_LAMBDA_TOLERANCE, DEFAULT_TARGET_SCORE};
use artifact_solver::{simulate, CancelToken, CostModel, Scorer, ScorerKind, SolvedPolicy};

struct Args {
    target: f64,
    attempts: u64,
    seed: u64,
    scorer: ScorerKind,
}

fn parse_args() -> Args {
    let mut args = Args {
        target: DEFAULT_TARGET_SCORE,
        attempts: 1_000_000,
        seed: 42,
        scorer: ScorerKind::Linear,
    };
    let raw: Vec<String> = std::env::args().collect();
    let mut i = 1;
    while i < raw.len() {
        match raw[i].as_str() {
            "--target" => {
                i += 1;
                args.target = raw[i].parse().expect("--target expects a number");
            }
            "--attempts" => {
                i += 1;
                args.attempts = raw[i].parse().expect("--attempts expects an integer");
            }
            "--seed" => {
                i += 1;
                args.seed = raw[i].parse().expect("--seed expects an integer");
            }
            "--fixed" => args.scorer = ScorerKind::Fixed,
            other => {
                eprintln!("Unknown argument: {other}");
                std::process::exit(1);
            }
        }
        i += 1;
    }
    args
}

fn main() {
    let num_threads = std::env::var("RAYON_NUM_THREADS")
        .or_else(|_| std::env::var("OMP_NUM_THREADS"))
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(8);
    rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build_global()
        .ok();

    let args = parse_args();
    println!(
        "Solving policy: target={} scorer={} ...",
        args.target,
        args.scorer.as_str()
    );

    let scorer = Scorer::new(args.scorer, DEFAULT_BUFF_WEIGHTS).expect("default weights are valid");
    let started = Instant::now();
    let policy = SolvedPolicy::solve(
        scorer,
        false,
        args.target,
        CostModel::tuner_only(),
        DEFAULT_LAMBDA_TOLERANCE,
        DEFAULT_LAMBDA_MAX_ITER,
        &CancelToken::new(),
    )
    .unwrap_or_else(|error| {
        eprintln!("Solve failed: {error}");
        std::process::exit(1);
    });
    let summary = policy.summary();
    println!(
        "Solved in {:.3}s: lambda*={:.6} successProbability={:.6}",
        started.elapsed().as_secs_f64(),
        summary.lambda_star,
        summary.success_probability
    );

    println!("Simulating {} attempts (seed {})...", args.attempts, args.seed);
    let report = simulate(&policy, args.attempts, args.seed);

    println!("\n           | analytic     | simulated    | sigma");
    println!("-----------|--------------|--------------|------");
    let sigma = (summary.success_probability - report.success_rate).abs()
        / report.success_rate_std_error.max(f64::MIN_POSITIVE);
    println!(
        "success    | {:>12.6} | {:>12.6} | {:>5.2}",
        summary.success_probability, report.success_rate, sigma
    );
    println!(
        "echo/succ  | {:>12.4} | {:>12.4} |",
        summary.echo_per_success, report.echo_per_success
    );
    println!(
        "tuner/succ | {:>12.4} | {:>12.4} |",
        summary.tuner_per_success, report.tuner_per_success
    );
    println!(
        "exp/succ   | {:>12.4} | {:>12.4} |",
        summary.exp_per_success, report.exp_per_success
    );
    println!(
        "cost/succ  | {:>12.4} | {:>12.4} |",
        summary.expected_cost_per_success, report.weighted_cost_per_success
    );
    println!("\nSimulation took {:.3}s", report.elapsed_seconds);
}
