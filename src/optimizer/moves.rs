use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter};

use crate::config::RefineParams;
use crate::geometry::normalize_heading;
use crate::placement::{snap_distance, Extent, Placement, SearchShape};
use crate::variable::{PatternKind, PatternVariable};

/// The fixed catalog of geometric edit operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum Move {
    // Pure shifts: congruent, same shape.
    NudgeAhead,
    NudgeBack,
    NudgeRight,
    NudgeLeft,
    // Expand/contract pairs.
    GrowAlong,
    ShrinkAlong,
    GrowAcross,
    ShrinkAcross,
    // Same-box moves: the footprint stays put.
    FlipHeading,
    ToggleTurn,
    // Twists: heading changes.
    TwistLeft,
    TwistRight,
    TwistLeft90,
    TwistRight90,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveClass {
    Shift,
    Resize,
    SameBox,
    Twist,
}

impl Move {
    pub fn class(self) -> MoveClass {
        match self {
            Move::NudgeAhead | Move::NudgeBack | Move::NudgeRight | Move::NudgeLeft => {
                MoveClass::Shift
            }
            Move::GrowAlong | Move::ShrinkAlong | Move::GrowAcross | Move::ShrinkAcross => {
                MoveClass::Resize
            }
            Move::FlipHeading | Move::ToggleTurn => MoveClass::SameBox,
            Move::TwistLeft | Move::TwistRight | Move::TwistLeft90 | Move::TwistRight90 => {
                MoveClass::Twist
            }
        }
    }

    /// Exact inverse. Same-box moves invert themselves.
    pub fn inverse(self) -> Move {
        match self {
            Move::NudgeAhead => Move::NudgeBack,
            Move::NudgeBack => Move::NudgeAhead,
            Move::NudgeRight => Move::NudgeLeft,
            Move::NudgeLeft => Move::NudgeRight,
            Move::GrowAlong => Move::ShrinkAlong,
            Move::ShrinkAlong => Move::GrowAlong,
            Move::GrowAcross => Move::ShrinkAcross,
            Move::ShrinkAcross => Move::GrowAcross,
            Move::FlipHeading => Move::FlipHeading,
            Move::ToggleTurn => Move::ToggleTurn,
            Move::TwistLeft => Move::TwistRight,
            Move::TwistRight => Move::TwistLeft,
            Move::TwistLeft90 => Move::TwistRight90,
            Move::TwistRight90 => Move::TwistLeft90,
        }
    }

    /// Which pattern kinds a move is defined for. Box patterns take every
    /// non-sector move; sectors shift, twist and toggle; lattice squares
    /// shift, twist and resize their one extent.
    pub fn applies_to(self, kind: PatternKind) -> bool {
        match kind {
            PatternKind::ParallelSweep => self != Move::ToggleTurn,
            PatternKind::SectorSearch => {
                matches!(self.class(), MoveClass::Shift | MoveClass::Twist)
                    || self == Move::ToggleTurn
            }
            PatternKind::ExpandingSquare => {
                matches!(self.class(), MoveClass::Shift | MoveClass::Twist)
                    || matches!(self, Move::GrowAcross | Move::ShrinkAcross)
            }
        }
    }

    /// Hand-tuned filter: moves eligible for automatic acceptance while
    /// clearing constraints. The 90-degree twists and the same-box moves are
    /// excluded; settle-for scans and manual edits may still use them.
    pub fn automatic(self) -> bool {
        !matches!(
            self,
            Move::TwistLeft90 | Move::TwistRight90 | Move::FlipHeading | Move::ToggleTurn
        )
    }

    /// Applicable moves for a pattern kind, in catalog order.
    pub fn catalog(kind: PatternKind) -> Vec<Move> {
        Move::iter().filter(|m| m.applies_to(kind)).collect()
    }
}

/// Applies catalog moves with a fixed magnitude scale. Shift distances snap
/// to the variable's spacing grid so every applied move makes visible
/// progress; anything that fails the variable's legality rules comes back as
/// the unchanged input, never a faulted state.
#[derive(Debug, Clone, Copy)]
pub struct MoveEngine {
    pub scale: f64,
    pub twist_step_deg: f64,
}

impl MoveEngine {
    pub fn from_params(params: &RefineParams) -> Self {
        Self {
            scale: params.move_scale,
            twist_step_deg: params.twist_step_deg,
        }
    }

    pub fn apply(
        &self,
        var: &PatternVariable,
        placement: &Placement,
        mv: Move,
        repeat: u32,
    ) -> Placement {
        let Some(shape) = placement.shape() else {
            return *placement;
        };
        if !mv.applies_to(var.kind) {
            return *placement;
        }

        let repeat = repeat.max(1);
        let cell = (var.min_spacing_nm * self.scale).max(1e-6);
        let dist = snap_distance(cell * repeat as f64, cell);
        let quanta = cell * repeat as f64;
        let twist = self.twist_step_deg * repeat as f64;

        let mut next = *shape;
        let changed = match mv {
            Move::NudgeAhead => {
                next.center = next.center.project(next.heading_deg, dist);
                true
            }
            Move::NudgeBack => {
                next.center = next
                    .center
                    .project(normalize_heading(next.heading_deg + 180.0), dist);
                true
            }
            Move::NudgeRight => {
                next.center = next
                    .center
                    .project(normalize_heading(next.heading_deg + 90.0), dist);
                true
            }
            Move::NudgeLeft => {
                next.center = next
                    .center
                    .project(normalize_heading(next.heading_deg + 270.0), dist);
                true
            }
            Move::GrowAlong => resize_along(&mut next.extent, quanta),
            Move::ShrinkAlong => resize_along(&mut next.extent, -quanta),
            Move::GrowAcross => resize_across(&mut next.extent, quanta),
            Move::ShrinkAcross => resize_across(&mut next.extent, -quanta),
            Move::FlipHeading => {
                next.heading_deg = normalize_heading(next.heading_deg + 180.0);
                true
            }
            Move::ToggleTurn => match &mut next.extent {
                Extent::Sector { clockwise } => {
                    *clockwise = !*clockwise;
                    true
                }
                _ => false,
            },
            Move::TwistLeft => {
                next.heading_deg = normalize_heading(next.heading_deg - twist);
                true
            }
            Move::TwistRight => {
                next.heading_deg = normalize_heading(next.heading_deg + twist);
                true
            }
            // The quarter turns are single-step regardless of repeat.
            Move::TwistLeft90 => {
                next.heading_deg = normalize_heading(next.heading_deg - 90.0);
                true
            }
            Move::TwistRight90 => {
                next.heading_deg = normalize_heading(next.heading_deg + 90.0);
                true
            }
        };

        if !changed || next == *shape || !var.legal(&next) {
            return *placement;
        }
        Placement::Search(next)
    }
}

fn resize_along(extent: &mut Extent, delta: f64) -> bool {
    match extent {
        Extent::Box { along_nm, .. } => {
            *along_nm += delta;
            true
        }
        _ => false,
    }
}

fn resize_across(extent: &mut Extent, delta: f64) -> bool {
    match extent {
        Extent::Box { across_nm, .. } => {
            *across_nm += delta;
            true
        }
        // The lattice extent is signed; resizing changes magnitude only.
        Extent::Lattice { across_nm } => {
            let sign = if *across_nm < 0.0 { -1.0 } else { 1.0 };
            let magnitude = across_nm.abs() + delta;
            if magnitude <= 0.0 {
                return false;
            }
            *across_nm = sign * magnitude;
            true
        }
        Extent::Sector { .. } => false,
    }
}
