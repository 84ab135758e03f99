use serde::{Deserialize, Serialize};

use crate::consts::SECTOR_LEGS;
use crate::geometry::GeoPoint;

/// One candidate assignment for a pattern variable. Placements are immutable
/// values: every edit produces a new one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub enum Placement {
    /// Not part of the plan. Contributes no constraints, scores zero.
    #[default]
    Unplaced,
    /// Explicitly ruled out. Scores like `Unplaced` but survives cloning and
    /// canonicalization as a deliberate exclusion.
    Excluded,
    Search(SearchShape),
}

impl Placement {
    pub fn is_placed(&self) -> bool {
        matches!(self, Placement::Search(_))
    }

    pub fn shape(&self) -> Option<&SearchShape> {
        match self {
            Placement::Search(s) => Some(s),
            _ => None,
        }
    }

    pub fn key(&self) -> PlacementKey {
        match self {
            Placement::Unplaced => PlacementKey([0; 9]),
            Placement::Excluded => PlacementKey([1, 0, 0, 0, 0, 0, 0, 0, 0]),
            Placement::Search(s) => {
                let (ext_tag, ext_a, ext_b) = match s.extent {
                    Extent::Box {
                        along_nm,
                        across_nm,
                    } => (0u64, along_nm.to_bits(), across_nm.to_bits()),
                    Extent::Lattice { across_nm } => (1, across_nm.to_bits(), 0),
                    Extent::Sector { clockwise } => (2, clockwise as u64, 0),
                };
                PlacementKey([
                    2,
                    s.commence_sec.to_bits(),
                    s.duration_sec.to_bits(),
                    s.center.lat_deg.to_bits(),
                    s.center.lon_deg.to_bits(),
                    s.heading_deg.to_bits(),
                    ext_tag,
                    ext_a,
                    ext_b,
                ])
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchShape {
    /// Commence-search time, epoch seconds.
    pub commence_sec: f64,
    /// On-scene search duration, seconds.
    pub duration_sec: f64,
    pub center: GeoPoint,
    /// First-leg direction, degrees clockwise from north.
    pub heading_deg: f64,
    pub extent: Extent,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Extent {
    /// Parallel/creeping sweep over a box.
    Box { along_nm: f64, across_nm: f64 },
    /// Expanding square. The sign of the across extent carries the turn side.
    Lattice { across_nm: f64 },
    /// Drifting sector; geometry follows from speed and duration.
    Sector { clockwise: bool },
}

impl SearchShape {
    pub fn end_sec(&self) -> f64 {
        self.commence_sec + self.duration_sec
    }

    pub fn mid_sec(&self) -> f64 {
        self.commence_sec + self.duration_sec / 2.0
    }

    /// Leg length of a sector pattern that flies `track_nm` of track.
    pub fn sector_radius_nm(track_nm: f64) -> f64 {
        track_nm / SECTOR_LEGS
    }
}

/// Bit-exact structural identity of a placement. Keys the detection-failure
/// cache, where "same placement" means same numbers, not same allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlacementKey([u64; 9]);

/// Snaps a displacement onto the discretized move grid, keeping at least one
/// whole cell so the move makes visible progress.
#[inline]
pub fn snap_distance(dist_nm: f64, cell_nm: f64) -> f64 {
    if cell_nm <= 0.0 || !dist_nm.is_finite() {
        return dist_nm;
    }
    let cells = (dist_nm.abs() / cell_nm).round().max(1.0);
    cells * cell_nm * dist_nm.signum()
}
