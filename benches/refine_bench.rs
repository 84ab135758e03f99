use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;
use std::sync::Arc;

use sarplan::config::Config;
use sarplan::constraint::overlap_ranking;
use sarplan::core_types::{ObjectKind, ParticleId};
use sarplan::geometry::GeoPoint;
use sarplan::optimizer::{Move, MoveEngine};
use sarplan::oracle::{
    DetectionOracle, EvalKind, FailureKind, FailureSample, ParticleField, PlanScorer,
    SweepWidthModel,
};
use sarplan::placement::{Extent, Placement, SearchShape};
use sarplan::scenario::{Scenario, ScenarioParams};
use sarplan::solution::Candidate;
use sarplan::variable::{PatternKind, PatternVariable};

// Minimal flat-plane oracles, just enough to drive candidate evaluation.

struct BenchParticles {
    positions: Vec<GeoPoint>,
}

impl ParticleField for BenchParticles {
    fn ids(&self) -> Vec<ParticleId> {
        (0..self.positions.len() as u32).collect()
    }

    fn prior(&self, _id: ParticleId) -> f64 {
        1.0
    }

    fn position_at(&self, id: ParticleId, _t_sec: f64) -> GeoPoint {
        self.positions[id as usize]
    }

    fn object_kind(&self, _id: ParticleId) -> ObjectKind {
        0
    }

    fn generation(&self) -> u64 {
        1
    }
}

struct BenchScorer {
    positions: Vec<GeoPoint>,
}

fn radius(shape: &SearchShape) -> f64 {
    match shape.extent {
        Extent::Box {
            along_nm,
            across_nm,
        } => ((along_nm / 2.0).powi(2) + (across_nm / 2.0).powi(2)).sqrt(),
        Extent::Lattice { across_nm } => across_nm.abs() / 2.0,
        Extent::Sector { .. } => 2.0,
    }
}

impl PlanScorer for BenchScorer {
    fn overlap_nm(&self, a: &SearchShape, b: &SearchShape) -> f64 {
        radius(a) + radius(b) - a.center.distance_nm(&b.center)
    }

    fn pos(&self, placements: &[Placement], _kind: EvalKind) -> f64 {
        let mut detected = 0.0;
        for p in &self.positions {
            let mut fail = 1.0;
            for placement in placements {
                if let Some(shape) = placement.shape() {
                    if shape.center.distance_nm(p) <= radius(shape) {
                        fail *= 0.3;
                    }
                }
            }
            detected += 1.0 - fail;
        }
        detected / self.positions.len().max(1) as f64
    }
}

struct BenchDetector;

impl DetectionOracle for BenchDetector {
    fn failure(
        &self,
        _shape: &SearchShape,
        _particle: ParticleId,
        _kind: FailureKind,
    ) -> FailureSample {
        FailureSample {
            contained: 1.0,
            fail: 0.3,
            net_fail: 0.25,
        }
    }
}

struct BenchSweep;

impl SweepWidthModel for BenchSweep {
    fn sweep_width_nm(&self, _kind: ObjectKind, _speed_kn: f64) -> f64 {
        1.5
    }

    fn pod(&self, coverage: f64) -> f64 {
        1.0 - (-coverage.max(0.0)).exp()
    }
}

fn bench_scenario() -> Arc<Scenario> {
    let mut positions = Vec::new();
    for i in 0..20 {
        for j in 0..20 {
            positions.push(GeoPoint::new(
                30.0 + (j as f64 - 10.0) * 0.01,
                -70.0 + (i as f64 - 10.0) * 0.01,
            ));
        }
    }

    let variables: Vec<PatternVariable> = (0..6)
        .map(|i| {
            PatternVariable::new(
                i,
                format!("asset-{i}"),
                PatternKind::ParallelSweep,
                120.0,
                240.0,
                1.0,
            )
        })
        .collect();

    ScenarioParams::builder()
        .variables(variables)
        .scorer(Arc::new(BenchScorer {
            positions: positions.clone(),
        }))
        .detector(Arc::new(BenchDetector))
        .particles(Arc::new(BenchParticles { positions }))
        .sweep(Arc::new(BenchSweep))
        .config(Config::default())
        .build()
        .build_scenario()
        .expect("bench scenario builds")
}

fn bench_shape(i: usize) -> Placement {
    Placement::Search(SearchShape {
        commence_sec: 0.0,
        duration_sec: 4.0 * 3600.0,
        center: GeoPoint::new(30.0, -70.0 + i as f64 * 0.05),
        heading_deg: (i as f64) * 25.0,
        extent: Extent::Box {
            along_nm: 8.0,
            across_nm: 4.0,
        },
    })
}

fn criterion_benchmark(c: &mut Criterion) {
    let scenario = bench_scenario();
    let placements: Vec<Placement> = (0..6).map(bench_shape).collect();

    c.bench_function("candidate_evaluation", |b| {
        b.iter(|| Candidate::new(scenario.clone(), black_box(&placements)))
    });

    let candidate = Candidate::new(scenario.clone(), &placements);
    c.bench_function("single_replacement", |b| {
        b.iter(|| candidate.with_placement(2, black_box(bench_shape(7))))
    });

    let var = scenario.variable(0).clone();
    let engine = MoveEngine {
        scale: 1.0,
        twist_step_deg: 30.0,
    };
    c.bench_function("move_application", |b| {
        b.iter(|| {
            for mv in [Move::NudgeAhead, Move::GrowAcross, Move::TwistRight] {
                black_box(engine.apply(&var, black_box(&placements[0]), mv, 2));
            }
        })
    });

    c.bench_function("overlap_ranking", |b| {
        b.iter(|| {
            let mut acc = 0.0;
            for i in -50..=50 {
                acc += overlap_ranking(black_box(i as f64 * 0.2), 5.0);
            }
            acc
        })
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
