//! Domain constants, cost schedules, and mask helpers.
//!
//! Core quantities:
//! - [`BUFF_COUNT`] = 13 drawable buff types
//! - [`SLOT_COUNT`] = 5 slots per artifact
//! - scores are integer buckets of 1/100 point ([`SCORE_SCALE`])
//! - reveal costs follow fixed per-slot schedules ([`TUNER_COST_BY_SLOT`],
//!   [`EXP_COST_BY_SLOT`]); one echo is drawn per attempt
//!
//! An enhancement state is keyed by `(mask, score)`: `mask` is the bitset of
//! revealed buff types, `score` the accumulated bucket sum. The reveal order
//! and per-slot values carry no extra information — draw probabilities, costs
//! and refunds depend only on the stage `popcount(mask)`.

/// Number of drawable buff types in the catalogue.
pub const BUFF_COUNT: usize = 13;

/// Number of slots on a finished artifact.
pub const SLOT_COUNT: usize = 5;

/// Bitmask with one bit set per buff type.
pub const MASK_ALL: u16 = (1 << BUFF_COUNT) - 1;

/// Integer score buckets per score point. A total score of 60.0 is bucket 6000.
pub const SCORE_SCALE: f64 = 100.0;

/// Echo drawn when an attempt starts (booked with the first reveal).
pub const ECHO_PER_ATTEMPT: f64 = 1.0;

/// Tuners consumed to reveal slots 1..5.
pub const TUNER_COST_BY_SLOT: [f64; SLOT_COUNT] = [1.0, 1.0, 3.0, 6.0, 9.0];

/// Exp consumed to reveal slots 1..5.
pub const EXP_COST_BY_SLOT: [f64; SLOT_COUNT] = [0.0, 0.0, 1600.0, 2000.0, 2800.0];

/// Exp embedded in an artifact after `n` reveals (prefix sums of
/// [`EXP_COST_BY_SLOT`]). Abandoning refunds a fraction of this, exp only.
pub const EXP_EMBEDDED_BY_STAGE: [f64; SLOT_COUNT + 1] =
    [0.0, 0.0, 0.0, 1600.0, 3600.0, 6400.0];

/// Hard upper bound for the exp refund ratio; requests are clamped into
/// `[0, MAX_EXP_REFUND_RATIO]`.
pub const MAX_EXP_REFUND_RATIO: f64 = 0.75;

pub const DEFAULT_EXP_REFUND_RATIO: f64 = 0.66;
pub const DEFAULT_TARGET_SCORE: f64 = 60.0;
pub const DEFAULT_LAMBDA_TOLERANCE: f64 = 1e-6;
pub const DEFAULT_LAMBDA_MAX_ITER: usize = 120;

/// If no sign change is found below this multiplier, the target is treated
/// as unreachable.
pub const LAMBDA_HARD_CAP: f64 = 1e12;

/// Reroll currency charged for locking k slots (k = 0..4). Locking all five
/// slots is not a reroll.
pub const LOCK_COST_BY_COUNT: [f64; SLOT_COUNT] = [1.0, 1.0, 1.0, 2.0, 3.0];

pub const DEFAULT_REROLL_TOP_K: usize = 3;

/// Number of revealed slots encoded in a state mask.
#[inline(always)]
pub fn stage_of(mask: u16) -> usize {
    mask.count_ones() as usize
}

/// Test whether buff `buff` has been revealed (bit `buff` is set).
#[inline(always)]
pub fn is_revealed(mask: u16, buff: usize) -> bool {
    (mask & (1 << buff)) != 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exp_embedded_matches_schedule_prefix_sums() {
        let mut acc = 0.0;
        for stage in 0..=SLOT_COUNT {
            assert_eq!(EXP_EMBEDDED_BY_STAGE[stage], acc);
            if stage < SLOT_COUNT {
                acc += EXP_COST_BY_SLOT[stage];
            }
        }
    }

    #[test]
    fn stage_of_counts_bits() {
        assert_eq!(stage_of(0), 0);
        assert_eq!(stage_of(0b10011), 3);
        assert_eq!(stage_of(MASK_ALL), BUFF_COUNT);
    }
}
