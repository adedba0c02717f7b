//! State space: interior masks, score bounds, and the solve context.
//!
//! The DP operates on states `(mask, score)`. Interior masks (stage ≤ 4) are
//! enumerated once into a stage-major arena order; terminal states (stage 5)
//! are never materialised — their values follow directly from the success
//! test. Per interior mask, scores occupy a dense range
//! `[base, min(max_sum, max(target, base))]` where `base`/`max_sum` are the
//! sums of the per-buff minimum/maximum buckets. All scores at or above the
//! target collapse into the top slot: once the target is met, only the
//! remaining reveal costs matter, not the exact score.

use crate::constants::{is_revealed, stage_of, BUFF_COUNT, MASK_ALL, SCORE_SCALE, SLOT_COUNT};
use crate::cost::CostModel;
use crate::error::SolveError;
use crate::scoring::Scorer;
use std::ops::Range;

/// Sentinel for masks with more than four bits set.
pub const NO_INTERIOR_INDEX: u16 = u16::MAX;

/// Enumeration of the interior (stage ≤ 4) masks, grouped by stage.
///
/// Weight-independent; built once per solve. 1 + 13 + 78 + 286 + 715 = 1093
/// masks for 13 buff types.
#[derive(Debug)]
pub struct StateSpace {
    /// Interior masks in stage-major order (stage ascending, mask ascending).
    pub masks: Vec<u16>,
    /// mask → position in `masks`, or `NO_INTERIOR_INDEX`.
    pub mask_index: Vec<u16>,
    stage_ranges: [Range<usize>; SLOT_COUNT],
}

impl StateSpace {
    pub fn new() -> Self {
        let mut masks = Vec::new();
        let mut stage_ranges: [Range<usize>; SLOT_COUNT] = Default::default();
        for stage in 0..SLOT_COUNT {
            let start = masks.len();
            for mask in 0..=MASK_ALL {
                if stage_of(mask) == stage {
                    masks.push(mask);
                }
            }
            stage_ranges[stage] = start..masks.len();
        }
        let mut mask_index = vec![NO_INTERIOR_INDEX; (MASK_ALL as usize) + 1];
        for (position, &mask) in masks.iter().enumerate() {
            mask_index[mask as usize] = position as u16;
        }
        Self {
            masks,
            mask_index,
            stage_ranges,
        }
    }

    /// Arena positions of all masks at the given stage.
    #[inline]
    pub fn stage_range(&self, stage: usize) -> Range<usize> {
        self.stage_ranges[stage].clone()
    }

    /// Arena position of an interior mask.
    #[inline(always)]
    pub fn index_of(&self, mask: u16) -> usize {
        debug_assert!(stage_of(mask) < SLOT_COUNT);
        self.mask_index[mask as usize] as usize
    }
}

impl Default for StateSpace {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-buff and per-mask score bounds derived from the bucket PMFs.
#[derive(Debug)]
pub struct ScoreBounds {
    pub buff_min: [u32; BUFF_COUNT],
    pub buff_max: [u32; BUFF_COUNT],
    /// Per interior mask: sum of revealed buffs' minimum buckets.
    pub base: Vec<u32>,
    /// Per interior mask: sum of revealed buffs' maximum buckets.
    pub max_sum: Vec<u32>,
    /// Per interior mask: largest score still obtainable from the unrevealed
    /// buffs (sum of the top `5 − stage` maxima). Drives hopeless pruning.
    pub best_remaining: Vec<u32>,
    /// Best attainable total score in buckets (empty mask's best_remaining).
    pub max_possible: u32,
}

impl ScoreBounds {
    pub fn new(space: &StateSpace, pmfs: &[Vec<(u32, f64)>]) -> Self {
        let mut buff_min = [u32::MAX; BUFF_COUNT];
        let mut buff_max = [0u32; BUFF_COUNT];
        for buff in 0..BUFF_COUNT {
            for &(bucket, _) in &pmfs[buff] {
                buff_min[buff] = buff_min[buff].min(bucket);
                buff_max[buff] = buff_max[buff].max(bucket);
            }
        }

        let count = space.masks.len();
        let mut base = vec![0u32; count];
        let mut max_sum = vec![0u32; count];
        let mut best_remaining = vec![0u32; count];
        for (position, &mask) in space.masks.iter().enumerate() {
            for buff in 0..BUFF_COUNT {
                if is_revealed(mask, buff) {
                    base[position] += buff_min[buff];
                    max_sum[position] += buff_max[buff];
                }
            }
            best_remaining[position] = best_case_remaining(mask, &buff_max);
        }
        let max_possible = best_remaining[space.index_of(0)];

        Self {
            buff_min,
            buff_max,
            base,
            max_sum,
            best_remaining,
            max_possible,
        }
    }
}

/// Sum of the top `5 − stage` maximum buckets among unrevealed buffs.
fn best_case_remaining(mask: u16, buff_max: &[u32; BUFF_COUNT]) -> u32 {
    let stage = stage_of(mask);
    if stage >= SLOT_COUNT {
        return 0;
    }
    let remaining_slots = SLOT_COUNT - stage;
    let mut maxima: Vec<u32> = (0..BUFF_COUNT)
        .filter(|&buff| !is_revealed(mask, buff))
        .map(|buff| buff_max[buff])
        .collect();
    maxima.sort_unstable_by(|a, b| b.cmp(a));
    maxima[..remaining_slots].iter().sum()
}

/// Everything the evaluator and the expectation passes need: the state
/// space, the bucket PMFs, the bounds, the integer target, and the cost
/// model. Immutable for the lifetime of one solve; shared across threads.
#[derive(Debug)]
pub struct SolveContext {
    pub space: StateSpace,
    pub pmfs: Vec<Vec<(u32, f64)>>,
    pub bounds: ScoreBounds,
    pub target: u32,
    pub target_raw: f64,
    pub max_attainable_raw: f64,
    pub cost: CostModel,
}

impl SolveContext {
    pub fn new(
        scorer: &Scorer,
        pool_counts: bool,
        target_raw: f64,
        cost: CostModel,
    ) -> Result<Self, SolveError> {
        if !target_raw.is_finite() || target_raw < 0.0 {
            return Err(SolveError::invalid(
                "targetScore",
                format!("must be a finite non-negative number, got {target_raw}"),
            ));
        }
        let max_attainable_raw = scorer.max_total_score();
        if target_raw > max_attainable_raw + 1e-9 {
            return Err(SolveError::UnreachableTarget {
                target_score: target_raw,
                max_attainable: max_attainable_raw,
            });
        }

        let space = StateSpace::new();
        let pmfs = scorer.score_pmfs(pool_counts);
        let bounds = ScoreBounds::new(&space, &pmfs);
        // Clamp the bucket target to the attainable integer maximum so that
        // per-buff rounding can never turn a reachable target unreachable.
        let target = ((target_raw * SCORE_SCALE).round() as u32).min(bounds.max_possible);

        Ok(Self {
            space,
            pmfs,
            bounds,
            target,
            target_raw,
            max_attainable_raw,
            cost,
        })
    }

    /// Ceiling of the dense score range for a mask: scores at or above it
    /// share the top slot.
    #[inline(always)]
    pub fn arena_top(&self, position: usize) -> u32 {
        self.bounds.max_sum[position].min(self.target.max(self.bounds.base[position]))
    }

    #[inline(always)]
    pub fn arena_len(&self, position: usize) -> usize {
        (self.arena_top(position) - self.bounds.base[position]) as usize + 1
    }

    /// Dense index of a score within a mask's arena, clamped at both ends.
    #[inline(always)]
    pub fn score_slot(&self, position: usize, score: u32) -> usize {
        let base = self.bounds.base[position];
        (score.clamp(base, self.arena_top(position)) - base) as usize
    }
}
