mod common;

use rstest::rstest;
use strum::IntoEnumIterator;

use common::{box_shape, box_variable};
use sarplan::geometry::GeoPoint;
use sarplan::optimizer::{Move, MoveClass, MoveEngine};
use sarplan::placement::{Extent, Placement, SearchShape};
use sarplan::variable::{PatternKind, PatternVariable};

fn engine() -> MoveEngine {
    MoveEngine {
        scale: 1.0,
        twist_step_deg: 30.0,
    }
}

fn sector_variable(ordinal: usize) -> PatternVariable {
    PatternVariable::new(ordinal, "vs", PatternKind::SectorSearch, 90.0, 60.0, 0.5)
}

fn lattice_variable(ordinal: usize) -> PatternVariable {
    PatternVariable::new(ordinal, "ss", PatternKind::ExpandingSquare, 90.0, 120.0, 1.0)
}

fn sector_shape(center: GeoPoint) -> SearchShape {
    SearchShape {
        commence_sec: 0.0,
        duration_sec: 3600.0,
        center,
        heading_deg: 120.0,
        extent: Extent::Sector { clockwise: true },
    }
}

fn lattice_shape(center: GeoPoint) -> SearchShape {
    SearchShape {
        commence_sec: 0.0,
        duration_sec: 7200.0,
        center,
        heading_deg: 45.0,
        extent: Extent::Lattice { across_nm: 8.0 },
    }
}

fn shape_for(kind: PatternKind) -> (PatternVariable, Placement) {
    let center = GeoPoint::new(30.0, -70.0);
    match kind {
        PatternKind::ParallelSweep => {
            let mut s = box_shape(center, 8.0, 4.0);
            s.heading_deg = 45.0;
            (box_variable(0, "box"), Placement::Search(s))
        }
        PatternKind::SectorSearch => (sector_variable(0), Placement::Search(sector_shape(center))),
        PatternKind::ExpandingSquare => {
            (lattice_variable(0), Placement::Search(lattice_shape(center)))
        }
    }
}

fn heading_delta(a: f64, b: f64) -> f64 {
    let d = (a - b).rem_euclid(360.0);
    d.min(360.0 - d)
}

fn assert_shapes_close(a: &SearchShape, b: &SearchShape) {
    assert!(
        a.center.distance_nm(&b.center) < 0.05,
        "centers drifted: {:?} vs {:?}",
        a.center,
        b.center
    );
    assert!(heading_delta(a.heading_deg, b.heading_deg) < 1e-6);
    assert_eq!(a.commence_sec, b.commence_sec);
    assert_eq!(a.duration_sec, b.duration_sec);
    match (a.extent, b.extent) {
        (
            Extent::Box {
                along_nm: a1,
                across_nm: a2,
            },
            Extent::Box {
                along_nm: b1,
                across_nm: b2,
            },
        ) => {
            assert!((a1 - b1).abs() < 1e-9);
            assert!((a2 - b2).abs() < 1e-9);
        }
        (Extent::Lattice { across_nm: a1 }, Extent::Lattice { across_nm: b1 }) => {
            assert!((a1 - b1).abs() < 1e-9);
        }
        (Extent::Sector { clockwise: a1 }, Extent::Sector { clockwise: b1 }) => {
            assert_eq!(a1, b1);
        }
        _ => panic!("extent variant changed under a move"),
    }
}

#[rstest]
#[case(Move::NudgeAhead)]
#[case(Move::NudgeBack)]
#[case(Move::NudgeRight)]
#[case(Move::NudgeLeft)]
#[case(Move::GrowAlong)]
#[case(Move::ShrinkAlong)]
#[case(Move::GrowAcross)]
#[case(Move::ShrinkAcross)]
#[case(Move::FlipHeading)]
#[case(Move::TwistLeft)]
#[case(Move::TwistRight)]
#[case(Move::TwistLeft90)]
#[case(Move::TwistRight90)]
fn round_trip_law_on_boxes(#[case] mv: Move) {
    let (var, placement) = shape_for(PatternKind::ParallelSweep);

    for repeat in [1u32, 2, 3] {
        let there = engine().apply(&var, &placement, mv, repeat);
        if there == placement {
            // Move was illegal at this magnitude; a no-op is the contract.
            continue;
        }
        let back = engine().apply(&var, &there, mv.inverse(), repeat);
        assert_shapes_close(
            placement.shape().expect("input is placed"),
            back.shape().expect("round trip stays placed"),
        );
    }
}

#[rstest]
#[case(PatternKind::SectorSearch, Move::NudgeAhead)]
#[case(PatternKind::SectorSearch, Move::TwistLeft)]
#[case(PatternKind::SectorSearch, Move::ToggleTurn)]
#[case(PatternKind::ExpandingSquare, Move::NudgeRight)]
#[case(PatternKind::ExpandingSquare, Move::GrowAcross)]
#[case(PatternKind::ExpandingSquare, Move::TwistRight)]
fn round_trip_law_on_other_kinds(#[case] kind: PatternKind, #[case] mv: Move) {
    let (var, placement) = shape_for(kind);
    let there = engine().apply(&var, &placement, mv, 1);
    assert_ne!(there, placement, "move should land on this shape");
    let back = engine().apply(&var, &there, mv.inverse(), 1);
    assert_shapes_close(
        placement.shape().expect("input is placed"),
        back.shape().expect("round trip stays placed"),
    );
}

#[rstest]
#[case(PatternKind::ParallelSweep, Move::ToggleTurn)]
#[case(PatternKind::SectorSearch, Move::GrowAlong)]
#[case(PatternKind::SectorSearch, Move::ShrinkAcross)]
#[case(PatternKind::ExpandingSquare, Move::GrowAlong)]
#[case(PatternKind::ExpandingSquare, Move::ShrinkAlong)]
#[case(PatternKind::ExpandingSquare, Move::FlipHeading)]
#[case(PatternKind::ExpandingSquare, Move::ToggleTurn)]
fn inapplicable_moves_are_exact_noops(#[case] kind: PatternKind, #[case] mv: Move) {
    assert!(!mv.applies_to(kind));
    assert!(!Move::catalog(kind).contains(&mv));

    let (var, placement) = shape_for(kind);
    let out = engine().apply(&var, &placement, mv, 1);
    assert_eq!(out, placement, "inapplicable move must return the input");
}

#[test]
fn illegal_magnitude_is_a_noop() {
    let var = box_variable(0, "tight");
    let placement = Placement::Search(box_shape(GeoPoint::new(30.0, -70.0), 2.0, 2.0));

    // Shrinking by two spacing quanta would go below the minimum leg length.
    let out = engine().apply(&var, &placement, Move::ShrinkAlong, 2);
    assert_eq!(out, placement);
}

#[test]
fn sentinels_never_move() {
    let var = box_variable(0, "none");
    for placement in [Placement::Unplaced, Placement::Excluded] {
        for mv in Move::iter() {
            assert_eq!(engine().apply(&var, &placement, mv, 1), placement);
        }
    }
}

#[test]
fn inverses_pair_exactly() {
    for mv in Move::iter() {
        assert_eq!(mv.inverse().inverse(), mv);
        assert_eq!(mv.class(), mv.inverse().class());
        if mv.class() == MoveClass::SameBox {
            assert_eq!(mv.inverse(), mv);
        }
    }
}

#[test]
fn automatic_filter_table_is_preserved() {
    // Hand-tuned exclusions: quarter twists and same-box moves never win
    // automatically during clearing.
    for mv in [
        Move::TwistLeft90,
        Move::TwistRight90,
        Move::FlipHeading,
        Move::ToggleTurn,
    ] {
        assert!(!mv.automatic(), "{mv} must stay out of automatic scans");
    }
    for mv in Move::iter() {
        if matches!(mv.class(), MoveClass::Shift | MoveClass::Resize) {
            assert!(mv.automatic());
        }
    }
}

#[test]
fn catalogs_follow_the_kind_table() {
    let boxes = Move::catalog(PatternKind::ParallelSweep);
    assert!(!boxes.contains(&Move::ToggleTurn));
    assert_eq!(boxes.len(), Move::iter().count() - 1);

    let sector = Move::catalog(PatternKind::SectorSearch);
    assert!(sector.contains(&Move::ToggleTurn));
    assert!(sector.iter().all(|m| m.class() != MoveClass::Resize));

    let lattice = Move::catalog(PatternKind::ExpandingSquare);
    assert!(lattice.contains(&Move::GrowAcross));
    assert!(lattice.contains(&Move::ShrinkAcross));
    assert!(!lattice.contains(&Move::GrowAlong));
    assert!(!lattice.contains(&Move::FlipHeading));
}

#[test]
fn shifts_snap_to_visible_progress() {
    let (var, placement) = shape_for(PatternKind::ParallelSweep);
    let moved = engine().apply(&var, &placement, Move::NudgeAhead, 1);
    let before = placement.shape().expect("placed");
    let after = moved.shape().expect("placed");
    // At least one full spacing cell of movement.
    assert!(before.center.distance_nm(&after.center) >= var.min_spacing_nm * 0.99);
}
