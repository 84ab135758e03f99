use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use fnv::FnvHashSet;
use tracing::info;
use typed_builder::TypedBuilder;

use crate::config::Config;
use crate::core_types::{ActiveSet, Ordinal};
use crate::error::{PlanError, PlanResult};
use crate::oracle::{DetectionOracle, ParticleField, PlanScorer, SweepWidthModel};
use crate::placement::Placement;
use crate::variable::{PatternVariable, Sequence};

/// Live eligibility flags, shared by every solver. The variables themselves
/// stay immutable; only this mask changes at runtime.
pub struct ActiveMask {
    flags: Vec<AtomicBool>,
    revision: AtomicU64,
}

impl ActiveMask {
    fn new(initial: Vec<bool>) -> Self {
        Self {
            flags: initial.into_iter().map(AtomicBool::new).collect(),
            revision: AtomicU64::new(0),
        }
    }

    pub fn get(&self, ordinal: Ordinal) -> bool {
        self.flags
            .get(ordinal)
            .map_or(false, |f| f.load(Ordering::Acquire))
    }

    /// Returns true when the flag actually changed.
    pub fn set(&self, ordinal: Ordinal, active: bool) -> bool {
        let Some(flag) = self.flags.get(ordinal) else {
            return false;
        };
        let changed = flag.swap(active, Ordering::AcqRel) != active;
        if changed {
            self.revision.fetch_add(1, Ordering::AcqRel);
        }
        changed
    }

    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::Acquire)
    }
}

#[derive(TypedBuilder)]
pub struct ScenarioParams {
    pub variables: Vec<PatternVariable>,
    #[builder(default)]
    pub sequences: Vec<Sequence>,
    /// Unordered variable pairs allowed to overlap without penalty.
    #[builder(default)]
    pub overlap_tolerant: Vec<(Ordinal, Ordinal)>,
    /// Seed placements by ordinal; empty means all-unplaced.
    #[builder(default)]
    pub initial: Vec<Placement>,
    pub scorer: Arc<dyn PlanScorer>,
    pub detector: Arc<dyn DetectionOracle>,
    pub particles: Arc<dyn ParticleField>,
    pub sweep: Arc<dyn SweepWidthModel>,
    #[builder(default)]
    pub config: Config,
}

impl ScenarioParams {
    pub fn build_scenario(self) -> PlanResult<Arc<Scenario>> {
        Scenario::from_params(self)
    }
}

/// The immutable problem description every solver works against: variables,
/// sequences, tolerance declarations and the collaborator services.
pub struct Scenario {
    pub variables: Vec<PatternVariable>,
    pub sequences: Vec<Sequence>,
    tolerant: FnvHashSet<(Ordinal, Ordinal)>,
    initial: Vec<Placement>,
    pub active: ActiveMask,
    pub scorer: Arc<dyn PlanScorer>,
    pub detector: Arc<dyn DetectionOracle>,
    pub particles: Arc<dyn ParticleField>,
    pub sweep: Arc<dyn SweepWidthModel>,
    pub config: Config,
}

impl Scenario {
    fn from_params(params: ScenarioParams) -> PlanResult<Arc<Self>> {
        for (i, v) in params.variables.iter().enumerate() {
            if v.ordinal != i {
                return Err(PlanError::Validation(format!(
                    "variable '{}' has ordinal {} at index {}",
                    v.name, v.ordinal, i
                )));
            }
        }

        for seq in &params.sequences {
            seq.validate()?;
            for (leg, &member) in seq.members.iter().enumerate() {
                let var = params.variables.get(member).ok_or_else(|| {
                    PlanError::Validation(format!(
                        "sequence '{}' references unknown ordinal {}",
                        seq.name, member
                    ))
                })?;
                match var.sequence {
                    Some(slot) if slot.sequence == seq.id && slot.leg == leg => {}
                    _ => {
                        return Err(PlanError::Config(format!(
                            "variable '{}' is not tagged as leg {} of sequence '{}'",
                            var.name, leg, seq.name
                        )))
                    }
                }
            }
        }

        for &(a, b) in &params.overlap_tolerant {
            if a >= params.variables.len() || b >= params.variables.len() {
                return Err(PlanError::Validation(format!(
                    "overlap-tolerant pair ({a}, {b}) is out of range"
                )));
            }
        }

        if !params.initial.is_empty() && params.initial.len() != params.variables.len() {
            return Err(PlanError::Validation(format!(
                "seed array has {} entries for {} variables",
                params.initial.len(),
                params.variables.len()
            )));
        }

        let tolerant = params
            .overlap_tolerant
            .iter()
            .map(|&(a, b)| (a.min(b), a.max(b)))
            .collect();

        let initial = if params.initial.is_empty() {
            vec![Placement::Unplaced; params.variables.len()]
        } else {
            params.initial
        };

        let active = ActiveMask::new(params.variables.iter().map(|v| v.active).collect());

        info!(
            variables = params.variables.len(),
            sequences = params.sequences.len(),
            "scenario ready"
        );

        Ok(Arc::new(Scenario {
            variables: params.variables,
            sequences: params.sequences,
            tolerant,
            initial,
            active,
            scorer: params.scorer,
            detector: params.detector,
            particles: params.particles,
            sweep: params.sweep,
            config: params.config,
        }))
    }

    /// Full-length array size: one slot per variable, by ordinal.
    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    pub fn variable(&self, ordinal: Ordinal) -> &PatternVariable {
        &self.variables[ordinal]
    }

    pub fn is_active(&self, ordinal: Ordinal) -> bool {
        self.active.get(ordinal)
    }

    pub fn overlap_tolerant(&self, a: Ordinal, b: Ordinal) -> bool {
        self.tolerant.contains(&(a.min(b), a.max(b)))
    }

    pub fn sequence_of(&self, ordinal: Ordinal) -> Option<&Sequence> {
        let slot = self.variables.get(ordinal)?.sequence?;
        self.sequences.iter().find(|s| s.id == slot.sequence)
    }

    /// Currently active ordinals.
    pub fn active_set(&self) -> ActiveSet {
        ActiveSet::new(
            (0..self.len())
                .filter(|&o| self.is_active(o))
                .collect(),
        )
    }

    /// Active ordinals the solver may actually move.
    pub fn movable_set(&self) -> ActiveSet {
        ActiveSet::new(
            (0..self.len())
                .filter(|&o| self.is_active(o) && !self.variable(o).is_frozen())
                .collect(),
        )
    }

    /// The seed array a fresh run starts from.
    pub fn seed_placements(&self) -> Vec<Placement> {
        self.initial.clone()
    }
}
