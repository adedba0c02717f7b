//! Static buff catalogue: value grids with empirical roll frequencies.
//!
//! Each buff carries a discrete value grid `(value, count)` where `value` is
//! an integer on a ×10 display grid (6.3% is stored as 63; flat stats store
//! raw values) and `count` is the observed roll frequency. Probabilities are
//! derived by normalising counts, which happens after any count merging:
//!
//! - [`histograms`] optionally pools counts across buff groups with
//!   statistically identical roll behaviour (the crit pair, and the nine
//!   percent-valued main stats) to reduce sampling noise;
//! - [`merge_counts`] adds caller-supplied `(value, count)` observations
//!   into a grid.
//!
//! The catalogue is immutable after startup; everything here is `'static`
//! data plus pure functions over it.

use crate::constants::BUFF_COUNT;

/// One buff type: identity, display metadata, and its empirical value grid.
pub struct BuffDef {
    /// Stable identifier used on the wire.
    pub id: &'static str,
    /// Human-readable display label.
    pub label: &'static str,
    /// Whether values are percent-valued (display divides by 10 and appends
    /// "%"). Affects display only.
    pub percent: bool,
    /// Largest value the buff can roll.
    pub max_value: u16,
    /// Sorted `(value, observed count)` pairs; values strictly increasing.
    pub grid: &'static [(u16, u32)],
}

const GRID_CRIT_RATE: &[(u16, u32)] = &[
    (63, 1036),
    (69, 964),
    (75, 1053),
    (81, 362),
    (87, 322),
    (93, 328),
    (99, 131),
    (105, 112),
];
const GRID_CRIT_DAMAGE: &[(u16, u32)] = &[
    (126, 995),
    (138, 1005),
    (150, 1090),
    (162, 335),
    (174, 362),
    (186, 387),
    (198, 129),
    (210, 119),
];
const GRID_ATTACK: &[(u16, u32)] = &[
    (64, 316),
    (71, 373),
    (79, 921),
    (86, 1125),
    (94, 781),
    (101, 707),
    (109, 254),
    (116, 139),
];
const GRID_DEFENCE: &[(u16, u32)] = &[
    (81, 318),
    (90, 413),
    (100, 995),
    (109, 1277),
    (118, 872),
    (128, 718),
    (138, 295),
    (147, 152),
];
const GRID_HP: &[(u16, u32)] = &[
    (64, 321),
    (71, 386),
    (79, 1005),
    (86, 1213),
    (94, 800),
    (101, 669),
    (109, 275),
    (116, 137),
];
const GRID_ATTACK_FLAT: &[(u16, u32)] = &[(30, 326), (40, 2496), (50, 1838), (60, 120)];
const GRID_DEFENCE_FLAT: &[(u16, u32)] = &[(40, 700), (50, 2128), (60, 1846), (70, 141)];
const GRID_HP_FLAT: &[(u16, u32)] = &[
    (320, 298),
    (360, 419),
    (390, 971),
    (430, 1205),
    (470, 864),
    (510, 680),
    (540, 258),
    (580, 168),
];
const GRID_ER: &[(u16, u32)] = &[
    (68, 302),
    (76, 375),
    (84, 975),
    (92, 1199),
    (100, 871),
    (108, 643),
    (116, 274),
    (124, 126),
];
const GRID_BASIC_ATTACK_DAMAGE: &[(u16, u32)] = &[
    (64, 316),
    (71, 360),
    (79, 959),
    (86, 1199),
    (94, 859),
    (101, 723),
    (109, 263),
    (116, 160),
];
const GRID_HEAVY_ATTACK_DAMAGE: &[(u16, u32)] = &[
    (64, 319),
    (71, 369),
    (79, 968),
    (86, 1187),
    (94, 809),
    (101, 697),
    (109, 283),
    (116, 150),
];
const GRID_SKILL_DAMAGE: &[(u16, u32)] = &[
    (64, 328),
    (71, 357),
    (79, 978),
    (86, 1173),
    (94, 847),
    (101, 731),
    (109, 283),
    (116, 149),
];
const GRID_ULT_DAMAGE: &[(u16, u32)] = &[
    (64, 292),
    (71, 358),
    (79, 973),
    (86, 1162),
    (94, 823),
    (101, 694),
    (109, 280),
    (116, 144),
];

pub static BUFFS: [BuffDef; BUFF_COUNT] = [
    BuffDef {
        id: "Crit_Rate",
        label: "Crit. Rate",
        percent: true,
        max_value: 105,
        grid: GRID_CRIT_RATE,
    },
    BuffDef {
        id: "Crit_Damage",
        label: "Crit. DMG",
        percent: true,
        max_value: 210,
        grid: GRID_CRIT_DAMAGE,
    },
    BuffDef {
        id: "Attack",
        label: "ATK%",
        percent: true,
        max_value: 116,
        grid: GRID_ATTACK,
    },
    BuffDef {
        id: "Defence",
        label: "DEF%",
        percent: true,
        max_value: 147,
        grid: GRID_DEFENCE,
    },
    BuffDef {
        id: "HP",
        label: "HP%",
        percent: true,
        max_value: 116,
        grid: GRID_HP,
    },
    BuffDef {
        id: "Attack_Flat",
        label: "ATK",
        percent: false,
        max_value: 60,
        grid: GRID_ATTACK_FLAT,
    },
    BuffDef {
        id: "Defence_Flat",
        label: "DEF",
        percent: false,
        max_value: 70,
        grid: GRID_DEFENCE_FLAT,
    },
    BuffDef {
        id: "HP_Flat",
        label: "HP",
        percent: false,
        max_value: 580,
        grid: GRID_HP_FLAT,
    },
    BuffDef {
        id: "ER",
        label: "Energy Regen",
        percent: true,
        max_value: 124,
        grid: GRID_ER,
    },
    BuffDef {
        id: "Basic_Attack_Damage",
        label: "Basic Attack DMG Bonus",
        percent: true,
        max_value: 116,
        grid: GRID_BASIC_ATTACK_DAMAGE,
    },
    BuffDef {
        id: "Heavy_Attack_Damage",
        label: "Heavy Attack DMG Bonus",
        percent: true,
        max_value: 116,
        grid: GRID_HEAVY_ATTACK_DAMAGE,
    },
    BuffDef {
        id: "Skill_Damage",
        label: "Resonance Skill DMG Bonus",
        percent: true,
        max_value: 116,
        grid: GRID_SKILL_DAMAGE,
    },
    BuffDef {
        id: "Ult_Damage",
        label: "Resonance Liberation DMG Bonus",
        percent: true,
        max_value: 116,
        grid: GRID_ULT_DAMAGE,
    },
];

/// Default weight preset (crit-focused DPS build).
pub const DEFAULT_BUFF_WEIGHTS: [f64; BUFF_COUNT] = [
    100.0, 100.0, 70.0, 0.0, 0.0, 30.0, 0.0, 0.0, 10.0, 0.0, 0.0, 0.0, 0.0,
];

// Pooling groups: buffs whose roll-position frequencies are statistically
// identical. Counts are pooled positionally, so all members of a group must
// share the same grid length.
const POOL_GROUP_CRIT: [usize; 2] = [0, 1];
const POOL_GROUP_MAIN: [usize; 9] = [2, 3, 4, 7, 8, 9, 10, 11, 12];

/// Resolve a buff id to its catalogue index.
pub fn buff_index(id: &str) -> Option<usize> {
    BUFFS.iter().position(|buff| buff.id == id)
}

/// Per-buff value grids as owned vectors.
///
/// With `pool_counts`, frequency counts are pooled positionally across the
/// two groups above before the caller normalises them — each buff keeps its
/// own values but shares the group's (larger) sample.
pub fn histograms(pool_counts: bool) -> Vec<Vec<(u16, u32)>> {
    let mut grids: Vec<Vec<(u16, u32)>> = BUFFS.iter().map(|buff| buff.grid.to_vec()).collect();
    if pool_counts {
        pool_group(&mut grids, &POOL_GROUP_CRIT);
        pool_group(&mut grids, &POOL_GROUP_MAIN);
    }
    grids
}

fn pool_group(grids: &mut [Vec<(u16, u32)>], group: &[usize]) {
    let len = grids[group[0]].len();
    let mut pooled: Vec<u32> = vec![0; len];
    for &buff in group {
        debug_assert_eq!(grids[buff].len(), len);
        for (slot, &(_, count)) in grids[buff].iter().enumerate() {
            pooled[slot] += count;
        }
    }
    for &buff in group {
        for (slot, entry) in grids[buff].iter_mut().enumerate() {
            entry.1 = pooled[slot];
        }
    }
}

/// Merge caller-supplied `(value, count)` observations into a grid,
/// additively and before any normalisation. Unknown values are inserted in
/// sorted position.
pub fn merge_counts(grid: &mut Vec<(u16, u32)>, observed: &[(u16, u32)]) {
    for &(value, count) in observed {
        match grid.binary_search_by_key(&value, |&(v, _)| v) {
            Ok(slot) => grid[slot].1 += count,
            Err(slot) => grid.insert(slot, (value, count)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalogue_contract() {
        let mut seen = std::collections::HashSet::new();
        for buff in BUFFS.iter() {
            assert!(seen.insert(buff.id), "duplicate id {}", buff.id);
            assert!(!buff.grid.is_empty());
            let mut prev = 0u16;
            for &(value, count) in buff.grid {
                assert!(value > prev, "{}: values must strictly increase", buff.id);
                assert!(count > 0);
                prev = value;
            }
            assert_eq!(
                buff.grid.last().unwrap().0,
                buff.max_value,
                "{}: max value must close the grid",
                buff.id
            );
        }
    }

    #[test]
    fn pooling_preserves_group_totals() {
        let raw = histograms(false);
        let pooled = histograms(true);
        for group in [&POOL_GROUP_CRIT[..], &POOL_GROUP_MAIN[..]] {
            let raw_total: u64 = group
                .iter()
                .flat_map(|&b| raw[b].iter())
                .map(|&(_, c)| c as u64)
                .sum();
            for &buff in group {
                let buff_total: u64 = pooled[buff].iter().map(|&(_, c)| c as u64).sum();
                assert_eq!(buff_total, raw_total);
            }
        }
    }

    #[test]
    fn merge_counts_is_additive_and_sorted() {
        let mut grid = vec![(63, 10), (69, 20)];
        merge_counts(&mut grid, &[(69, 5), (60, 1), (105, 2)]);
        assert_eq!(grid, vec![(60, 1), (63, 10), (69, 25), (105, 2)]);
    }
}
