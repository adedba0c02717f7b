//! Policy cache: fingerprinted, LRU-bounded, single-flight.
//!
//! Solved policies are keyed by a fingerprint of the canonicalised request
//! (weights quantised at 1e-9, target, scorer variant, cost weights, refund
//! ratio, count-pooling flag). Readers receive `Arc<SolvedPolicy>`
//! snapshots, so queries never observe a half-built table. Concurrent
//! computes for the same fingerprint deduplicate: one thread solves while
//! the rest wait on a condvar. If the solving thread fails or is cancelled
//! it removes its in-flight marker — no partial entry survives — and one of
//! the waiters takes over.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use crate::cancel::CancelToken;
use crate::constants::{BUFF_COUNT, DEFAULT_LAMBDA_MAX_ITER, DEFAULT_LAMBDA_TOLERANCE};
use crate::cost::{CostModel, CostWeights};
use crate::error::SolveError;
use crate::policy::SolvedPolicy;
use crate::scoring::{Scorer, ScorerKind};

/// Maximum number of retained policies.
const CACHE_CAPACITY: usize = 8;

/// Weight resolution for fingerprinting.
const WEIGHT_QUANTUM: f64 = 1e-9;

/// Wait slice while parked on an in-flight compute, so a waiter can observe
/// its own cancellation token.
const WAIT_SLICE: Duration = Duration::from_millis(50);

/// A canonicalised compute request.
#[derive(Clone, Debug)]
pub struct PolicyRequest {
    pub buff_weights: [f64; BUFF_COUNT],
    pub target_score: f64,
    pub scorer: ScorerKind,
    pub cost_weights: CostWeights,
    pub exp_refund_ratio: f64,
    pub pool_counts: bool,
    pub lambda_tolerance: f64,
    pub lambda_max_iter: usize,
}

impl PolicyRequest {
    pub fn new(
        buff_weights: [f64; BUFF_COUNT],
        target_score: f64,
        scorer: ScorerKind,
        cost_weights: CostWeights,
        exp_refund_ratio: f64,
    ) -> Self {
        Self {
            buff_weights,
            target_score,
            scorer,
            cost_weights,
            exp_refund_ratio,
            pool_counts: false,
            lambda_tolerance: DEFAULT_LAMBDA_TOLERANCE,
            lambda_max_iter: DEFAULT_LAMBDA_MAX_ITER,
        }
    }

    /// Cache key: everything that changes the solved policy, quantised so
    /// that sub-1e-9 weight noise maps to the same entry.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        for &weight in &self.buff_weights {
            quantise(weight).hash(&mut hasher);
        }
        quantise(self.target_score).hash(&mut hasher);
        self.scorer.hash(&mut hasher);
        quantise(self.cost_weights.echo).hash(&mut hasher);
        quantise(self.cost_weights.tuner).hash(&mut hasher);
        quantise(self.cost_weights.exp).hash(&mut hasher);
        quantise(self.exp_refund_ratio).hash(&mut hasher);
        self.pool_counts.hash(&mut hasher);
        hasher.finish()
    }
}

fn quantise(value: f64) -> i64 {
    if value.is_finite() {
        (value / WEIGHT_QUANTUM).round() as i64
    } else {
        i64::MIN
    }
}

enum Slot {
    InFlight,
    Ready(Arc<SolvedPolicy>),
}

struct Entry {
    slot: Slot,
    last_used: u64,
}

#[derive(Default)]
struct CacheInner {
    entries: HashMap<u64, Entry>,
    tick: u64,
}

impl CacheInner {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn evict_to_capacity(&mut self) {
        while self.entries.len() > CACHE_CAPACITY {
            let oldest = self
                .entries
                .iter()
                .filter(|(_, entry)| matches!(entry.slot, Slot::Ready(_)))
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(&fingerprint, _)| fingerprint);
            match oldest {
                Some(fingerprint) => {
                    self.entries.remove(&fingerprint);
                }
                None => break,
            }
        }
    }
}

#[derive(Default)]
pub struct PolicyCache {
    inner: Mutex<CacheInner>,
    changed: Condvar,
}

impl PolicyCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the policy for `request`, solving it on a miss. A new compute
    /// always inserts; the least-recently-used ready entry is evicted past
    /// capacity.
    pub fn compute(
        &self,
        request: &PolicyRequest,
        cancel: &CancelToken,
    ) -> Result<Arc<SolvedPolicy>, SolveError> {
        let fingerprint = request.fingerprint();

        let mut guard = self.inner.lock().expect("cache mutex poisoned");
        loop {
            match guard.entries.get(&fingerprint).map(|entry| match &entry.slot {
                Slot::Ready(policy) => Some(policy.clone()),
                Slot::InFlight => None,
            }) {
                Some(Some(policy)) => {
                    let tick = guard.next_tick();
                    guard
                        .entries
                        .get_mut(&fingerprint)
                        .expect("entry just observed")
                        .last_used = tick;
                    return Ok(policy);
                }
                Some(None) => {
                    if cancel.is_cancelled() {
                        return Err(SolveError::Cancelled);
                    }
                    let (next, _) = self
                        .changed
                        .wait_timeout(guard, WAIT_SLICE)
                        .expect("cache mutex poisoned");
                    guard = next;
                }
                None => {
                    let tick = guard.next_tick();
                    guard.entries.insert(
                        fingerprint,
                        Entry {
                            slot: Slot::InFlight,
                            last_used: tick,
                        },
                    );
                    break;
                }
            }
        }
        drop(guard);

        let solved = solve_request(request, cancel);

        let mut guard = self.inner.lock().expect("cache mutex poisoned");
        match solved {
            Ok(policy) => {
                let policy = Arc::new(policy);
                let tick = guard.next_tick();
                guard.entries.insert(
                    fingerprint,
                    Entry {
                        slot: Slot::Ready(policy.clone()),
                        last_used: tick,
                    },
                );
                guard.evict_to_capacity();
                self.changed.notify_all();
                Ok(policy)
            }
            Err(error) => {
                guard.entries.remove(&fingerprint);
                self.changed.notify_all();
                Err(error)
            }
        }
    }

    /// Number of ready entries (test and introspection hook).
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .expect("cache mutex poisoned")
            .entries
            .values()
            .filter(|entry| matches!(entry.slot, Slot::Ready(_)))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn solve_request(
    request: &PolicyRequest,
    cancel: &CancelToken,
) -> Result<SolvedPolicy, SolveError> {
    let scorer = Scorer::new(request.scorer, request.buff_weights)?;
    let cost = CostModel::new(request.cost_weights, request.exp_refund_ratio)?;
    SolvedPolicy::solve(
        scorer,
        request.pool_counts,
        request.target_score,
        cost,
        request.lambda_tolerance,
        request.lambda_max_iter,
        cancel,
    )
}
