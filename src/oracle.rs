use strum_macros::{Display, EnumIter};

use crate::core_types::{ObjectKind, ParticleId};
use crate::geometry::GeoPoint;
use crate::placement::{Placement, SearchShape};

/// Objective flavor used when scoring a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum EvalKind {
    /// True POS of the deconflicted plan.
    Constrained,
    /// Optimistic objective that also credits conflicting or partial plans.
    /// Drives from-scratch construction.
    Unconstrained,
}

/// Detection-failure flavors tracked per (placement, particle).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum FailureKind {
    PerSortie,
    Cumulative,
    Conditional,
}

impl FailureKind {
    pub const COUNT: usize = 3;

    #[inline(always)]
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Per-particle detection outcome for one placement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FailureSample {
    /// Proportion of the particle's probability mass inside the pattern.
    pub contained: f64,
    /// Failure probability for the requested kind.
    pub fail: f64,
    /// All-kinds no-detection probability. Every downstream kind needs it, so
    /// it is computed alongside whatever was asked for.
    pub net_fail: f64,
}

/// Spherical overlap and POS scoring. The heavy great-circle/polygon math
/// lives behind this seam; the core never reimplements it.
pub trait PlanScorer: Send + Sync {
    /// Signed overlap measure between two placements, nm. Positive means the
    /// pair conflicts; negative is clear margin.
    fn overlap_nm(&self, a: &SearchShape, b: &SearchShape) -> f64;

    /// POS of a full placement array under the given objective flavor.
    fn pos(&self, placements: &[Placement], kind: EvalKind) -> f64;
}

/// Per-particle detection-failure evaluation for one placement.
pub trait DetectionOracle: Send + Sync {
    fn failure(&self, shape: &SearchShape, particle: ParticleId, kind: FailureKind)
        -> FailureSample;
}

/// The Monte-Carlo particle sample the plan is scored against.
pub trait ParticleField: Send + Sync {
    fn ids(&self) -> Vec<ParticleId>;

    fn prior(&self, id: ParticleId) -> f64;

    fn position_at(&self, id: ParticleId, t_sec: f64) -> GeoPoint;

    fn object_kind(&self, id: ParticleId) -> ObjectKind;

    /// Bumped whenever the active sample changes. POS memos are keyed on it.
    fn generation(&self) -> u64;
}

/// Lateral-range / detection-curve model.
pub trait SweepWidthModel: Send + Sync {
    fn sweep_width_nm(&self, kind: ObjectKind, speed_kn: f64) -> f64;

    /// Probability of detection given a coverage factor.
    fn pod(&self, coverage: f64) -> f64;
}
