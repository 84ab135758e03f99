mod common;

use common::{box_shape, box_variable, build_fixture, shape_radius};
use sarplan::config::Config;
use sarplan::constraint::{compare_levels, LevelCmp, Violation, ViolationKind, ViolationSet};
use sarplan::geometry::GeoPoint;
use sarplan::placement::Placement;
use sarplan::solution::Candidate;

fn at(lon: f64) -> GeoPoint {
    GeoPoint::new(30.0, lon)
}

fn violation(opt: f64, index: usize) -> Violation {
    Violation {
        kind: ViolationKind::Overlap { a: index, b: index + 1 },
        opt,
        raw: opt,
    }
}

#[test]
fn feasibility_follows_the_worst_of_every_category() {
    let fixture = build_fixture(
        vec![box_variable(0, "a"), box_variable(1, "b")],
        vec![],
        vec![],
        &[at(-70.0), at(-69.0)],
        Config::default(),
    );

    let apart = Candidate::new(
        fixture.scenario.clone(),
        &[
            Placement::Search(box_shape(at(-70.0), 6.0, 3.0)),
            Placement::Search(box_shape(at(-69.0), 6.0, 3.0)),
        ],
    );
    assert!(apart.is_feasible());
    let worst = apart.violations().worst().expect("one pair, one entry");
    assert!(worst.opt <= 0.0);

    let stacked = Candidate::new(
        fixture.scenario.clone(),
        &[
            Placement::Search(box_shape(at(-70.0), 6.0, 3.0)),
            Placement::Search(box_shape(at(-70.0), 6.0, 3.0)),
        ],
    );
    assert!(!stacked.is_feasible());
    assert!(stacked.violations().worst().expect("entry").opt > 0.0);
}

#[test]
fn overlap_raw_value_is_the_physical_gap() {
    let fixture = build_fixture(
        vec![box_variable(0, "a"), box_variable(1, "b")],
        vec![],
        vec![],
        &[at(-70.0)],
        Config::default(),
    );

    let sa = box_shape(at(-70.0), 6.0, 3.0);
    let sb = box_shape(at(-69.9), 6.0, 3.0);
    let candidate = Candidate::new(
        fixture.scenario.clone(),
        &[Placement::Search(sa), Placement::Search(sb)],
    );

    let expected = shape_radius(&sa) + shape_radius(&sb) - sa.center.distance_nm(&sb.center);
    let got = candidate.violations().overlap[0].raw;
    assert!((got - expected).abs() < 1e-9);
}

#[test]
fn tolerant_pairs_contribute_no_violation() {
    let fixture = build_fixture(
        vec![box_variable(0, "a"), box_variable(1, "b")],
        vec![],
        vec![],
        &[at(-70.0)],
        Config::default(),
    );
    let strict = Candidate::new(
        fixture.scenario.clone(),
        &[
            Placement::Search(box_shape(at(-70.0), 6.0, 3.0)),
            Placement::Search(box_shape(at(-70.0), 6.0, 3.0)),
        ],
    );
    assert_eq!(strict.violations().overlap.len(), 1);

    let particles = common::GridParticles::clusters(&[at(-70.0)], 3, 1.0);
    let tolerant_scenario = sarplan::scenario::ScenarioParams::builder()
        .variables(vec![box_variable(0, "a"), box_variable(1, "b")])
        .overlap_tolerant(vec![(1, 0)])
        .scorer(common::FlatScorer::new(particles.clone()))
        .detector(common::DiskDetector::new(particles.clone()))
        .particles(particles)
        .sweep(std::sync::Arc::new(common::ExpSweep))
        .build()
        .build_scenario()
        .expect("scenario builds");

    let relaxed = Candidate::new(
        tolerant_scenario,
        &[
            Placement::Search(box_shape(at(-70.0), 6.0, 3.0)),
            Placement::Search(box_shape(at(-70.0), 6.0, 3.0)),
        ],
    );
    assert!(relaxed.violations().overlap.is_empty());
    assert!(relaxed.is_feasible());
}

#[test]
fn doubly_frozen_pairs_are_skipped() {
    let shape = Placement::Search(box_shape(at(-70.0), 6.0, 3.0));
    let mut v0 = box_variable(0, "a");
    let mut v1 = box_variable(1, "b");
    v0.perm_frozen = Some(shape);
    v1.perm_frozen = Some(shape);

    let fixture = build_fixture(
        vec![v0, v1],
        vec![],
        vec![],
        &[at(-70.0)],
        Config::default(),
    );
    let candidate = Candidate::new(fixture.scenario.clone(), &[shape, shape]);
    assert!(candidate.violations().overlap.is_empty());
}

#[test]
fn violations_sort_descending_with_stable_ties() {
    let mut set = ViolationSet::default();
    set.overlap = vec![violation(0.2, 0), violation(0.9, 2), violation(-0.1, 4)];
    set.overlap.sort_by(Violation::rank_cmp);

    let opts: Vec<f64> = set.overlap.iter().map(|v| v.opt).collect();
    assert_eq!(opts, vec![0.9, 0.2, -0.1]);
}

#[test]
fn level_comparison_finds_the_first_difference() {
    let mut a = ViolationSet::default();
    let mut b = ViolationSet::default();

    a.overlap = vec![violation(0.9, 0), violation(0.1, 2)];
    b.overlap = vec![violation(0.9, 0), violation(0.4, 2)];

    match compare_levels(&a, &b) {
        LevelCmp::Better { level, gain } => {
            assert_eq!(level, 1);
            assert!((gain - 0.3).abs() < 1e-9);
        }
        other => panic!("expected Better, got {other:?}"),
    }
    assert!(matches!(compare_levels(&b, &a), LevelCmp::Worse { level: 1, .. }));
    assert_eq!(compare_levels(&a, &a), LevelCmp::Equal);
}

#[test]
fn fewer_violations_win_level_ties() {
    let mut a = ViolationSet::default();
    let mut b = ViolationSet::default();
    a.overlap = vec![violation(0.5, 0)];
    b.overlap = vec![violation(0.5, 0), violation(-0.2, 2)];

    assert!(matches!(compare_levels(&a, &b), LevelCmp::Better { level: 1, .. }));
}
