use std::cmp::Ordering;

use itertools::Itertools;
use tracing::warn;

use crate::consts::OPT_EPS;
use crate::core_types::{Ordinal, SequenceId};
use crate::placement::Placement;
use crate::scenario::Scenario;

/// Ranking value a missing list entry compares as. Below the spline floor so
/// shorter violation lists win ties.
const MISSING_OPT: f64 = -1.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ViolationKind {
    /// Unordered pair of active placements too close together.
    Overlap { a: Ordinal, b: Ordinal },
    /// One sequence member cannot make its own commence time.
    VariableTransit { v: Ordinal },
    /// A whole sequence blows its duration budget on the recovery leg.
    SequenceTransit { s: SequenceId },
}

impl ViolationKind {
    /// Tie-break key: category rank, then index within the category.
    fn tie_key(&self) -> (u8, usize, usize) {
        match *self {
            ViolationKind::Overlap { a, b } => (0, a.min(b), a.max(b)),
            ViolationKind::VariableTransit { v } => (1, v, 0),
            ViolationKind::SequenceTransit { s } => (2, s, 0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Violation {
    pub kind: ViolationKind,
    /// Ranking value after the monotone transform; <= 0 means satisfied.
    pub opt: f64,
    /// Physical value: nm of overlap, or seconds of slip.
    pub raw: f64,
}

impl Violation {
    pub fn is_satisfied(&self) -> bool {
        self.opt <= OPT_EPS
    }

    /// Total order: descending optimization value, ties by kind/index.
    pub fn rank_cmp(&self, other: &Violation) -> Ordering {
        other
            .opt
            .partial_cmp(&self.opt)
            .unwrap_or(Ordering::Equal)
            .then_with(|| self.kind.tie_key().cmp(&other.kind.tie_key()))
    }
}

/// Two-piece cubic Hermite ranking transform for raw overlap measures:
/// value -0.5 at -threshold, 0 at 0, +1 at +threshold, zero slope at both
/// ends, Catmull-Rom tangent at the origin knot, clamped outside the window.
/// Steepest exactly where a pair crosses from clear to conflicting.
pub fn overlap_ranking(raw_nm: f64, threshold_nm: f64) -> f64 {
    let t = threshold_nm.max(f64::MIN_POSITIVE);
    if raw_nm <= -t {
        return -0.5;
    }
    if raw_nm >= t {
        return 1.0;
    }

    // Interior tangent: secant across the outer knots. Keeps both pieces
    // monotone (0.75/t is well under the 3*delta/h Fritsch-Carlson bound).
    let m0 = 0.75 / t;
    if raw_nm < 0.0 {
        hermite(raw_nm, -t, 0.0, -0.5, 0.0, 0.0, m0)
    } else {
        hermite(raw_nm, 0.0, t, 0.0, 1.0, m0, 0.0)
    }
}

#[inline(always)]
fn hermite(x: f64, x0: f64, x1: f64, y0: f64, y1: f64, m0: f64, m1: f64) -> f64 {
    let h = x1 - x0;
    let s = (x - x0) / h;
    let s2 = s * s;
    let s3 = s2 * s;

    (2.0 * s3 - 3.0 * s2 + 1.0) * y0
        + (s3 - 2.0 * s2 + s) * h * m0
        + (-2.0 * s3 + 3.0 * s2) * y1
        + (s3 - s2) * h * m1
}

/// The three violation categories of a candidate, each sorted descending.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViolationSet {
    pub overlap: Vec<Violation>,
    pub var_transit: Vec<Violation>,
    pub seq_transit: Vec<Violation>,
}

impl ViolationSet {
    pub fn evaluate(scenario: &Scenario, placements: &[Placement]) -> Self {
        let threshold = scenario.config.refine.overlap_threshold_nm;
        let mut set = ViolationSet::default();

        for (a, b) in (0..placements.len()).tuple_combinations() {
            if !scenario.is_active(a) || !scenario.is_active(b) {
                continue;
            }
            let (Some(sa), Some(sb)) = (placements[a].shape(), placements[b].shape()) else {
                continue;
            };
            if scenario.overlap_tolerant(a, b) {
                continue;
            }
            if scenario.variable(a).is_perm_frozen() && scenario.variable(b).is_perm_frozen() {
                continue;
            }

            let raw = scenario.scorer.overlap_nm(sa, sb);
            if raw.is_nan() {
                warn!(a, b, "overlap measure came back NaN, skipping pair");
                continue;
            }
            set.overlap.push(Violation {
                kind: ViolationKind::Overlap { a, b },
                opt: overlap_ranking(raw, threshold),
                raw,
            });
        }

        for seq in &scenario.sequences {
            let total = seq.total_secs().max(1.0);
            for (v, slip) in seq.member_slips(placements) {
                if !scenario.is_active(v) {
                    continue;
                }
                set.var_transit.push(Violation {
                    kind: ViolationKind::VariableTransit { v },
                    opt: slip / total,
                    raw: slip,
                });
            }
            if let Some(slip) = seq.recovery_slip_sec(placements) {
                set.seq_transit.push(Violation {
                    kind: ViolationKind::SequenceTransit { s: seq.id },
                    opt: slip / total,
                    raw: slip,
                });
            }
        }

        set.overlap.sort_by(Violation::rank_cmp);
        set.var_transit.sort_by(Violation::rank_cmp);
        set.seq_transit.sort_by(Violation::rank_cmp);
        set
    }

    /// Feasible iff the worst entry of every category is satisfied.
    pub fn is_feasible(&self) -> bool {
        [&self.overlap, &self.var_transit, &self.seq_transit]
            .into_iter()
            .all(|category| category.first().map_or(true, Violation::is_satisfied))
    }

    /// All categories merged into one descending list.
    pub fn merged(&self) -> Vec<&Violation> {
        let mut all: Vec<&Violation> = self
            .overlap
            .iter()
            .chain(&self.var_transit)
            .chain(&self.seq_transit)
            .collect();
        all.sort_by(|a, b| a.rank_cmp(b));
        all
    }

    pub fn worst(&self) -> Option<&Violation> {
        [&self.overlap, &self.var_transit, &self.seq_transit]
            .into_iter()
            .filter_map(|category| category.first())
            .min_by(|a, b| a.rank_cmp(b))
    }

    /// Sum of positive ranking values: the constraint gain still needed.
    pub fn total_excess(&self) -> f64 {
        self.merged()
            .into_iter()
            .map(|v| v.opt.max(0.0))
            .sum()
    }

    /// Worst overlap ranking, or `None` when no pair constrains the plan.
    pub fn worst_overlap_opt(&self) -> Option<f64> {
        self.overlap.first().map(|v| v.opt)
    }

    pub fn len(&self) -> usize {
        self.overlap.len() + self.var_transit.len() + self.seq_transit.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Outcome of comparing two merged violation lists element-by-element.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LevelCmp {
    /// `a` wins at `level` by `gain`.
    Better { level: usize, gain: f64 },
    Worse { level: usize, loss: f64 },
    Equal,
}

/// Compares two candidates' violations level-by-level: the lists are merged
/// and sorted descending; the first level where they differ decides. A
/// missing entry ranks below every real one, so fewer violations win ties.
pub fn compare_levels(a: &ViolationSet, b: &ViolationSet) -> LevelCmp {
    let la = a.merged();
    let lb = b.merged();
    let n = la.len().max(lb.len());

    for level in 0..n {
        let va = la.get(level).map(|v| v.opt).unwrap_or(MISSING_OPT);
        let vb = lb.get(level).map(|v| v.opt).unwrap_or(MISSING_OPT);
        if (va - vb).abs() <= OPT_EPS {
            continue;
        }
        return if va < vb {
            LevelCmp::Better {
                level,
                gain: vb - va,
            }
        } else {
            LevelCmp::Worse {
                level,
                loss: va - vb,
            }
        };
    }
    LevelCmp::Equal
}

/// Whether `a` is worse than `b` at any level strictly below `level` in the
/// merged descending lists. Used by the automatic-win rule: a move may trade
/// finer-level losses only for a bigger constraint gain.
pub fn worse_at_deeper(a: &ViolationSet, b: &ViolationSet, level: usize) -> bool {
    let la = a.merged();
    let lb = b.merged();
    let n = la.len().max(lb.len());

    for l in (level + 1)..n {
        let va = la.get(l).map(|v| v.opt).unwrap_or(MISSING_OPT);
        let vb = lb.get(l).map(|v| v.opt).unwrap_or(MISSING_OPT);
        if va > vb + OPT_EPS {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spline_hits_its_knots() {
        let t = 5.0;
        assert!((overlap_ranking(-t, t) + 0.5).abs() < 1e-12);
        assert!(overlap_ranking(0.0, t).abs() < 1e-12);
        assert!((overlap_ranking(t, t) - 1.0).abs() < 1e-12);
        assert_eq!(overlap_ranking(-100.0, t), -0.5);
        assert_eq!(overlap_ranking(100.0, t), 1.0);
    }

    #[test]
    fn spline_is_monotone() {
        let t = 5.0;
        let mut prev = f64::NEG_INFINITY;
        for i in 0..=1000 {
            let raw = -t + 2.0 * t * i as f64 / 1000.0;
            let v = overlap_ranking(raw, t);
            assert!(v >= prev - 1e-12, "not monotone at raw={raw}");
            prev = v;
        }
    }

    #[test]
    fn spline_endpoints_are_flat() {
        let t = 5.0;
        let eps = 1e-6;
        let slope_lo = (overlap_ranking(-t + eps, t) - overlap_ranking(-t, t)) / eps;
        let slope_hi = (overlap_ranking(t, t) - overlap_ranking(t - eps, t)) / eps;
        assert!(slope_lo.abs() < 1e-4);
        assert!(slope_hi.abs() < 1e-4);
    }
}
