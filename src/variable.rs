use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter};

use crate::consts::{MIN_LEGS, SECS_PER_HOUR, TRACK_SLACK};
use crate::core_types::{Ordinal, SequenceId};
use crate::error::{PlanError, PlanResult};
use crate::geometry::GeoPoint;
use crate::placement::{Extent, Placement, SearchShape};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumIter,
)]
#[strum(serialize_all = "snake_case")]
pub enum PatternKind {
    /// Parallel/creeping line sweep over a box.
    ParallelSweep,
    /// Expanding-square pattern on a square lattice.
    ExpandingSquare,
    /// Drifting sector (hexagon) pattern.
    SectorSearch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeqSlot {
    pub sequence: SequenceId,
    /// Position within the sequence's member list.
    pub leg: usize,
}

/// One search asset's task specification. Immutable for the duration of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternVariable {
    /// Index of this variable in every full-length placement array.
    pub ordinal: Ordinal,
    pub name: String,
    pub kind: PatternKind,
    pub speed_kn: f64,
    /// Raw on-scene search budget, minutes.
    pub search_minutes: f64,
    /// Minimum spacing between adjacent track legs, nm.
    pub min_spacing_nm: f64,
    pub sequence: Option<SeqSlot>,
    /// Initial eligibility. The live mask is owned by the scenario.
    pub active: bool,
    pub user_frozen: Option<Placement>,
    pub perm_frozen: Option<Placement>,
}

impl PatternVariable {
    pub fn new(
        ordinal: Ordinal,
        name: impl Into<String>,
        kind: PatternKind,
        speed_kn: f64,
        search_minutes: f64,
        min_spacing_nm: f64,
    ) -> Self {
        Self {
            ordinal,
            name: name.into(),
            kind,
            speed_kn,
            search_minutes,
            min_spacing_nm,
            sequence: None,
            active: true,
            user_frozen: None,
            perm_frozen: None,
        }
    }

    /// User freeze wins over policy freeze.
    pub fn frozen_placement(&self) -> Option<&Placement> {
        self.user_frozen.as_ref().or(self.perm_frozen.as_ref())
    }

    pub fn is_frozen(&self) -> bool {
        self.user_frozen.is_some() || self.perm_frozen.is_some()
    }

    pub fn is_perm_frozen(&self) -> bool {
        self.perm_frozen.is_some()
    }

    /// Track length achievable over the full search budget, nm.
    pub fn track_length_nm(&self) -> f64 {
        self.speed_kn * self.search_minutes / 60.0
    }

    pub fn default_duration_sec(&self) -> f64 {
        self.search_minutes * 60.0
    }

    /// Smallest legal box side.
    pub fn min_extent_nm(&self) -> f64 {
        self.min_spacing_nm * MIN_LEGS
    }

    /// Largest useful box side for the duration budget.
    pub fn max_extent_nm(&self) -> f64 {
        (self.track_length_nm() / 2.0).max(self.min_extent_nm())
    }

    pub fn sector_radius_nm(&self) -> f64 {
        SearchShape::sector_radius_nm(self.track_length_nm())
    }

    /// Whether a shape respects this variable's minimum-leg, spacing and
    /// endurance rules. Move application rejects anything that fails here.
    pub fn legal(&self, shape: &SearchShape) -> bool {
        if !(shape.duration_sec > 0.0)
            || shape.duration_sec > self.search_minutes * 60.0 * TRACK_SLACK
            || !shape.heading_deg.is_finite()
            || !shape.center.lat_deg.is_finite()
            || !shape.center.lon_deg.is_finite()
        {
            return false;
        }

        let track_nm = self.speed_kn * shape.duration_sec / SECS_PER_HOUR;

        match (self.kind, shape.extent) {
            (
                PatternKind::ParallelSweep,
                Extent::Box {
                    along_nm,
                    across_nm,
                },
            ) => {
                if along_nm < self.min_spacing_nm || across_nm < self.min_spacing_nm {
                    return false;
                }
                let legs = (across_nm / self.min_spacing_nm).round().max(1.0);
                let needed = legs * along_nm + (legs - 1.0) * self.min_spacing_nm;
                needed <= track_nm * TRACK_SLACK
            }
            (PatternKind::ExpandingSquare, Extent::Lattice { across_nm }) => {
                let side = across_nm.abs();
                side >= self.min_spacing_nm
                    && side * side / self.min_spacing_nm <= track_nm * TRACK_SLACK
            }
            (PatternKind::SectorSearch, Extent::Sector { .. }) => track_nm > 0.0,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Recovery {
    pub point: GeoPoint,
    pub speed_kn: f64,
}

/// Ordered chain of pattern variables flown by one physical asset, sharing a
/// launch window and a total duration budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sequence {
    pub id: SequenceId,
    pub name: String,
    /// Member ordinals in execution order.
    pub members: Vec<Ordinal>,
    pub launch_point: GeoPoint,
    /// Known launch time, epoch seconds. When absent, `commitment`
    /// back-solves it.
    pub launch_sec: Option<f64>,
    /// Downstream point with a fixed arrival time; required when the launch
    /// time is unknown.
    pub commitment: Option<(GeoPoint, f64)>,
    /// Total duration budget, minutes.
    pub total_minutes: f64,
    pub transit_kn: f64,
    pub recovery: Option<Recovery>,
}

impl Sequence {
    /// Missing timing/location fields are fatal configuration errors and are
    /// rejected before any solving starts.
    pub fn validate(&self) -> PlanResult<()> {
        if self.members.is_empty() {
            return Err(PlanError::Config(format!(
                "Sequence '{}' has no members",
                self.name
            )));
        }
        if !(self.transit_kn > 0.0) {
            return Err(PlanError::Config(format!(
                "Sequence '{}' needs a positive transit speed",
                self.name
            )));
        }
        if !(self.total_minutes > 0.0) {
            return Err(PlanError::Config(format!(
                "Sequence '{}' needs a positive duration budget",
                self.name
            )));
        }
        if self.launch_sec.is_none() && self.commitment.is_none() {
            return Err(PlanError::Config(format!(
                "Sequence '{}' needs a launch time or a commitment arrival",
                self.name
            )));
        }
        if let Some(r) = &self.recovery {
            if !(r.speed_kn > 0.0) {
                return Err(PlanError::Config(format!(
                    "Sequence '{}' has a recovery leg with no speed",
                    self.name
                )));
            }
        }
        Ok(())
    }

    pub fn total_secs(&self) -> f64 {
        self.total_minutes * 60.0
    }

    fn transit_sec(from: &GeoPoint, to: &GeoPoint, speed_kn: f64) -> f64 {
        from.distance_nm(to) / speed_kn * SECS_PER_HOUR
    }

    fn placed_members<'a>(&self, placements: &'a [Placement]) -> Vec<(Ordinal, &'a SearchShape)> {
        self.members
            .iter()
            .filter_map(|&o| placements.get(o).and_then(|p| p.shape()).map(|s| (o, s)))
            .collect()
    }

    /// Transit + search time from launch through the end of the last placed
    /// member, ignoring planned commence times.
    fn chain_secs(&self, placements: &[Placement]) -> f64 {
        let mut total = 0.0;
        let mut prev = self.launch_point;
        for (_, shape) in self.placed_members(placements) {
            total += Self::transit_sec(&prev, &shape.center, self.transit_kn);
            total += shape.duration_sec;
            prev = shape.center;
        }
        total
    }

    /// Effective launch time; back-solved from the commitment arrival when the
    /// launch time is unknown.
    pub fn effective_launch_sec(&self, placements: &[Placement]) -> Option<f64> {
        if let Some(t) = self.launch_sec {
            return Some(t);
        }
        let (point, arrival) = self.commitment?;
        let last = self
            .placed_members(placements)
            .last()
            .map(|(_, s)| s.center)
            .unwrap_or(self.launch_point);
        let tail = Self::transit_sec(&last, &point, self.transit_kn);
        Some(arrival - self.chain_secs(placements) - tail)
    }

    /// Rewrites member commence times so every task starts exactly when the
    /// asset can arrive. Commence times come out non-decreasing. Returns a new
    /// full-length array; non-members pass through untouched.
    pub fn align_times(&self, placements: &[Placement]) -> Vec<Placement> {
        let mut out = placements.to_vec();
        let Some(launch) = self.effective_launch_sec(placements) else {
            return out;
        };

        let mut clock = launch;
        let mut prev = self.launch_point;
        for &ordinal in &self.members {
            let Some(shape) = placements.get(ordinal).and_then(|p| p.shape()) else {
                continue;
            };
            let arrival = clock + Self::transit_sec(&prev, &shape.center, self.transit_kn);
            let mut adjusted = *shape;
            adjusted.commence_sec = arrival;
            clock = arrival + shape.duration_sec;
            prev = shape.center;
            out[ordinal] = Placement::Search(adjusted);
        }
        out
    }

    /// Per-member timing slip: estimated arrival minus planned commence,
    /// seconds. Positive means the asset cannot make its own schedule.
    pub fn member_slips(&self, placements: &[Placement]) -> Vec<(Ordinal, f64)> {
        let Some(launch) = self.effective_launch_sec(placements) else {
            return Vec::new();
        };

        let mut slips = Vec::new();
        let mut clock = launch;
        let mut prev = self.launch_point;
        for (ordinal, shape) in self.placed_members(placements) {
            let arrival = clock + Self::transit_sec(&prev, &shape.center, self.transit_kn);
            slips.push((ordinal, arrival - shape.commence_sec));
            clock = arrival.max(shape.commence_sec) + shape.duration_sec;
            prev = shape.center;
        }
        slips
    }

    /// Recovery slip: arrival back at the recovery point versus the duration
    /// budget, seconds. `None` when there is no recovery leg.
    pub fn recovery_slip_sec(&self, placements: &[Placement]) -> Option<f64> {
        let recovery = self.recovery.as_ref()?;
        let launch = self.effective_launch_sec(placements)?;

        let mut clock = launch;
        let mut prev = self.launch_point;
        for (_, shape) in self.placed_members(placements) {
            let arrival = clock + Self::transit_sec(&prev, &shape.center, self.transit_kn);
            clock = arrival.max(shape.commence_sec) + shape.duration_sec;
            prev = shape.center;
        }
        let home = clock + Self::transit_sec(&prev, &recovery.point, recovery.speed_kn);
        Some(home - (launch + self.total_secs()))
    }
}
