#![allow(dead_code)]
// Shared fixtures: flat-plane reference implementations of the collaborator
// seams, plus scenario builders used across the integration tests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use sarplan::config::Config;
use sarplan::core_types::{ObjectKind, ParticleId};
use sarplan::geometry::GeoPoint;
use sarplan::oracle::{
    DetectionOracle, EvalKind, FailureKind, FailureSample, ParticleField, PlanScorer,
    SweepWidthModel,
};
use sarplan::placement::{Extent, Placement, SearchShape};
use sarplan::scenario::{Scenario, ScenarioParams};
use sarplan::variable::{PatternKind, PatternVariable, Sequence};

pub const POD_INSIDE: f64 = 0.7;

/// Circumscribed radius of a pattern footprint, nm.
pub fn shape_radius(shape: &SearchShape) -> f64 {
    match shape.extent {
        Extent::Box {
            along_nm,
            across_nm,
        } => ((along_nm / 2.0).powi(2) + (across_nm / 2.0).powi(2)).sqrt(),
        Extent::Lattice { across_nm } => across_nm.abs() / 2.0 * std::f64::consts::SQRT_2,
        Extent::Sector { .. } => 2.0,
    }
}

pub fn inside(shape: &SearchShape, p: &GeoPoint) -> bool {
    shape.center.distance_nm(p) <= shape_radius(shape)
}

/// Deterministic particle cloud: k x k grids of equal-prior particles around
/// each cluster center. No drift; positions are time-invariant.
pub struct GridParticles {
    positions: Vec<GeoPoint>,
    generation: AtomicU64,
}

impl GridParticles {
    pub fn clusters(centers: &[GeoPoint], k: usize, spacing_nm: f64) -> Arc<Self> {
        let mut positions = Vec::new();
        for c in centers {
            let cos_lat = c.lat_deg.to_radians().cos();
            for i in 0..k {
                for j in 0..k {
                    let east = (i as f64 - (k - 1) as f64 / 2.0) * spacing_nm;
                    let north = (j as f64 - (k - 1) as f64 / 2.0) * spacing_nm;
                    positions.push(GeoPoint::new(
                        c.lat_deg + north / 60.0,
                        c.lon_deg + east / (60.0 * cos_lat),
                    ));
                }
            }
        }
        Arc::new(Self {
            positions,
            generation: AtomicU64::new(1),
        })
    }

    pub fn position(&self, id: ParticleId) -> GeoPoint {
        self.positions[id as usize]
    }

    pub fn count(&self) -> usize {
        self.positions.len()
    }

    pub fn bump_generation(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}

impl ParticleField for GridParticles {
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
        self.generation.load(Ordering::SeqCst)
    }
}

/// Disk-footprint scorer over the shared particle cloud: overlap is the
/// signed gap between circumscribed circles, POS the detected prior mass.
pub struct FlatScorer {
    particles: Arc<GridParticles>,
}

impl FlatScorer {
    pub fn new(particles: Arc<GridParticles>) -> Arc<Self> {
        Arc::new(Self { particles })
    }
}

impl PlanScorer for FlatScorer {
    fn overlap_nm(&self, a: &SearchShape, b: &SearchShape) -> f64 {
        shape_radius(a) + shape_radius(b) - a.center.distance_nm(&b.center)
    }

    fn pos(&self, placements: &[Placement], kind: EvalKind) -> f64 {
        let n = self.particles.count();
        if n == 0 {
            return 0.0;
        }
        let mut detected = 0.0;
        for p in &self.particles.positions {
            let mut fail = 1.0;
            for placement in placements {
                if let Some(shape) = placement.shape() {
                    if inside(shape, p) {
                        fail *= 1.0 - POD_INSIDE;
                    }
                }
            }
            detected += 1.0 - fail;
        }
        let pos = detected / n as f64;
        match kind {
            EvalKind::Constrained => pos,
            // A small per-placement credit so placing beats not placing.
            EvalKind::Unconstrained => {
                pos + 1e-3 * placements.iter().filter(|p| p.is_placed()).count() as f64
            }
        }
    }
}

/// Disk detector with an invocation counter for cache accounting tests.
pub struct DiskDetector {
    particles: Arc<GridParticles>,
    calls: AtomicU64,
}

impl DiskDetector {
    pub fn new(particles: Arc<GridParticles>) -> Arc<Self> {
        Arc::new(Self {
            particles,
            calls: AtomicU64::new(0),
        })
    }

    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl DetectionOracle for DiskDetector {
    fn failure(
        &self,
        shape: &SearchShape,
        particle: ParticleId,
        kind: FailureKind,
    ) -> FailureSample {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let contained = if inside(shape, &self.particles.position(particle)) {
            1.0
        } else {
            0.0
        };
        let factor = match kind {
            FailureKind::PerSortie => 0.7,
            FailureKind::Cumulative => 0.55,
            FailureKind::Conditional => 0.4,
        };
        FailureSample {
            contained,
            fail: 1.0 - factor * contained,
            net_fail: 1.0 - 0.75 * contained,
        }
    }
}

/// Exponential random-search detection curve.
pub struct ExpSweep;

impl SweepWidthModel for ExpSweep {
    fn sweep_width_nm(&self, _kind: ObjectKind, _speed_kn: f64) -> f64 {
        1.5
    }

    fn pod(&self, coverage: f64) -> f64 {
        1.0 - (-coverage.max(0.0)).exp()
    }
}

/// A roomy parallel-sweep variable: 120 kn for 4 h leaves 480 nm of track,
/// enough for every box the tests place.
pub fn box_variable(ordinal: usize, name: &str) -> PatternVariable {
    PatternVariable::new(
        ordinal,
        name,
        PatternKind::ParallelSweep,
        120.0,
        240.0,
        1.0,
    )
}

pub fn box_shape(center: GeoPoint, along_nm: f64, across_nm: f64) -> SearchShape {
    SearchShape {
        commence_sec: 0.0,
        duration_sec: 4.0 * 3600.0,
        center,
        heading_deg: 0.0,
        extent: Extent::Box {
            along_nm,
            across_nm,
        },
    }
}

pub struct Fixture {
    pub scenario: Arc<Scenario>,
    pub particles: Arc<GridParticles>,
    pub detector: Arc<DiskDetector>,
}

pub fn build_fixture(
    variables: Vec<PatternVariable>,
    sequences: Vec<Sequence>,
    initial: Vec<Placement>,
    cluster_centers: &[GeoPoint],
    config: Config,
) -> Fixture {
    let particles = GridParticles::clusters(cluster_centers, 5, 1.0);
    let detector = DiskDetector::new(particles.clone());
    let scorer = FlatScorer::new(particles.clone());

    let scenario = ScenarioParams::builder()
        .variables(variables)
        .sequences(sequences)
        .initial(initial)
        .scorer(scorer)
        .detector(detector.clone())
        .particles(particles.clone())
        .sweep(Arc::new(ExpSweep))
        .config(config)
        .build()
        .build_scenario()
        .expect("fixture scenario should build");

    Fixture {
        scenario,
        particles,
        detector,
    }
}
