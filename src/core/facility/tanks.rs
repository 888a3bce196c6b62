// src/core/facility/tanks.rs

//! Facility tank topology solver (spec.md §4.7). Pure, total, and
//! table-testable: `solve(mode, defs) -> tank_list` decides which of a
//! unit's four dynamic-tank slots still hold a distinct physical tank once
//! slots that fan into the same shared facility tank have been collapsed.
//!
//! Design Notes §9 / Open Questions: spec.md describes the solver's
//! mode-specific "windows" only by worked example (S2, S3) and leaves the
//! exact partition for modes 1, 2, 4, 6, 7 unspecified. We resolve this by
//! treating each mode as one of the seven ways to partition four ordered
//! slots into contiguous runs (excluding the all-singleton partition, which
//! is mode 0): within a run, the first `2` (facility tank) survives and any
//! later `2` in the same run collapses to `0`, since it would be the same
//! physical tank object. See DESIGN.md for the full mapping and how modes 3
//! and 5 were pinned down by S2/S3.

pub const TANK_DEF_NONE: u8 = 0;
pub const TANK_DEF_UNIT_LOCAL: u8 = 1;
pub const TANK_DEF_FACILITY: u8 = 2;

/// Contiguous-run partitions of the four slots, indexed by mode. Mode 0 is
/// unused by `solve` (it short-circuits to an identity copy) but is kept
/// here as the all-singleton partition for documentation symmetry.
const WINDOWS: [&[&[usize]]; 8] = [
    &[&[0], &[1], &[2], &[3]],       // mode 0: independent (identity)
    &[&[0, 1, 2, 3]],                // mode 1: all four share one tank
    &[&[0, 1, 2], &[3]],             // mode 2
    &[&[0, 1], &[2, 3]],             // mode 3 (pinned by spec.md S2)
    &[&[0], &[1, 2, 3]],             // mode 4
    &[&[0, 1], &[2], &[3]],          // mode 5 (pinned by spec.md S3)
    &[&[0], &[1, 2], &[3]],          // mode 6
    &[&[0], &[1], &[2, 3]],          // mode 7
];

/// Decodes the facility-tank layout for one mode given a unit's four
/// `tank_defs` entries. A non-zero output slot means a tank object is
/// physically present there; slots that share a facility tank with an
/// earlier slot in the same window become `0` (spec.md §4.7).
pub fn solve(mode: u8, defs: [u8; 4]) -> [u8; 4] {
    if mode == 0 {
        return defs;
    }
    let windows = WINDOWS.get(mode as usize).copied().unwrap_or(WINDOWS[0]);
    let mut out = defs;
    for window in windows {
        let mut seen_facility_tank = false;
        for &idx in *window {
            if out[idx] == TANK_DEF_FACILITY {
                if seen_facility_tank {
                    out[idx] = 0;
                } else {
                    seen_facility_tank = true;
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_zero_copies_defs_unchanged() {
        assert_eq!(solve(0, [1, 2, 0, 2]), [1, 2, 0, 2]);
    }

    /// spec.md §8 scenario S1.
    #[test]
    fn s1_single_unit_local_tank_mode_zero() {
        assert_eq!(solve(0, [1, 0, 0, 0]), [1, 0, 0, 0]);
    }

    /// spec.md §8 scenario S2.
    #[test]
    fn s2_mode_three_pairs_dedupe_independently() {
        assert_eq!(solve(3, [2, 2, 2, 2]), [2, 0, 2, 0]);
    }

    /// spec.md §8 scenario S3.
    #[test]
    fn s3_mode_five_only_dedupes_the_first_pair() {
        assert_eq!(solve(5, [2, 2, 2, 2]), [2, 0, 2, 2]);
    }

    #[test]
    fn mode_one_collapses_all_four_to_a_single_survivor() {
        assert_eq!(solve(1, [2, 2, 2, 2]), [2, 0, 0, 0]);
    }

    #[test]
    fn unit_local_and_none_entries_are_never_touched() {
        for mode in 0..=7u8 {
            assert_eq!(solve(mode, [1, 1, 1, 1]), [1, 1, 1, 1]);
            assert_eq!(solve(mode, [0, 0, 0, 0]), [0, 0, 0, 0]);
        }
    }

    #[test]
    fn solver_is_total_and_idempotent_over_every_mode_and_combination() {
        for mode in 0..=7u8 {
            for a in 0..3u8 {
                for b in 0..3u8 {
                    for c in 0..3u8 {
                        for d in 0..3u8 {
                            let defs = [a, b, c, d];
                            let once = solve(mode, defs);
                            let twice = solve(mode, once);
                            assert_eq!(once, twice, "mode {mode} defs {defs:?} not idempotent");
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn every_mode_leaves_at_most_one_facility_tank_per_window() {
        for mode in 1..=7u8 {
            let windows = WINDOWS[mode as usize];
            for window in windows {
                let defs = [2, 2, 2, 2];
                let out = solve(mode, defs);
                let survivors = window.iter().filter(|&&i| out[i] == 2).count();
                assert!(survivors <= 1, "mode {mode} window {window:?} kept {survivors} tanks");
            }
        }
    }
}
