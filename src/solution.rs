use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use fnv::FnvHashSet;

use crate::consts::{OPT_EPS, POS_EPS};
use crate::constraint::{compare_levels, LevelCmp, Violation, ViolationKind, ViolationSet};
use crate::core_types::{ActiveSet, Ordinal};
use crate::oracle::EvalKind;
use crate::placement::Placement;
use crate::scenario::Scenario;

/// Whether seeded placements are held in place during refinement.
#[derive(Clone)]
pub enum SeedPolicy {
    /// Every movable placed ordinal may be perturbed.
    Free,
    /// First-jump policy: ordinals still equal to their seed stay put unless
    /// they conflict with another held seed.
    HoldSeeds(Arc<[Placement]>),
}

#[derive(Debug, Default)]
struct PosMemo {
    generation: u64,
    constrained: Option<f64>,
    unconstrained: Option<f64>,
}

impl PosMemo {
    fn slot(&mut self, kind: EvalKind) -> &mut Option<f64> {
        match kind {
            EvalKind::Constrained => &mut self.constrained,
            EvalKind::Unconstrained => &mut self.unconstrained,
        }
    }
}

/// A full assignment of placements plus its derived constraint state. A
/// candidate is an immutable value: every edit goes through replacement, and
/// the POS memo is the only interior state (lazy, computed at most once per
/// evaluation kind and particle generation).
pub struct Candidate {
    scenario: Arc<Scenario>,
    placements: Arc<[Placement]>,
    violations: ViolationSet,
    feasible: bool,
    memo: Mutex<PosMemo>,
}

impl Clone for Candidate {
    /// Clones share the placement array and copy any cached evaluations.
    fn clone(&self) -> Self {
        let memo = self.lock_memo();
        Candidate {
            scenario: self.scenario.clone(),
            placements: self.placements.clone(),
            violations: self.violations.clone(),
            feasible: self.feasible,
            memo: Mutex::new(PosMemo {
                generation: memo.generation,
                constrained: memo.constrained,
                unconstrained: memo.unconstrained,
            }),
        }
    }
}

impl fmt::Debug for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Candidate")
            .field("feasible", &self.feasible)
            .field("violations", &self.violations.len())
            .field("placed", &self.placements.iter().filter(|p| p.is_placed()).count())
            .finish()
    }
}

impl Candidate {
    /// Builds a candidate from a possibly partial input array: the input is
    /// first completed through the active/frozen projection, then every
    /// constraint category is evaluated and sorted once.
    pub fn new(scenario: Arc<Scenario>, input: &[Placement]) -> Self {
        let projected = project(&scenario, input);
        Self::from_projected(scenario, projected)
    }

    fn from_projected(scenario: Arc<Scenario>, placements: Vec<Placement>) -> Self {
        let violations = ViolationSet::evaluate(&scenario, &placements);
        let feasible = violations.is_feasible();
        Candidate {
            scenario,
            placements: placements.into(),
            violations,
            feasible,
            memo: Mutex::new(PosMemo::default()),
        }
    }

    pub fn scenario(&self) -> &Arc<Scenario> {
        &self.scenario
    }

    pub fn placements(&self) -> &[Placement] {
        &self.placements
    }

    pub fn placement(&self, ordinal: Ordinal) -> &Placement {
        &self.placements[ordinal]
    }

    /// Replacement, never mutation: a new candidate with one slot changed.
    pub fn with_placement(&self, ordinal: Ordinal, placement: Placement) -> Candidate {
        let mut next = self.placements.to_vec();
        next[ordinal] = placement;
        Candidate::new(self.scenario.clone(), &next)
    }

    /// Re-projects through the current active/frozen state. Used when the
    /// active set changes under a live solver.
    pub fn reprojected(&self) -> Candidate {
        Candidate::new(self.scenario.clone(), &self.placements)
    }

    pub fn is_feasible(&self) -> bool {
        self.feasible
    }

    pub fn violations(&self) -> &ViolationSet {
        &self.violations
    }

    pub fn worst_violation(&self) -> Option<&Violation> {
        self.violations.worst()
    }

    /// Every active ordinal carries a real placement.
    pub fn is_complete(&self, active: &ActiveSet) -> bool {
        active.iter().all(|o| self.placements[o].is_placed())
    }

    fn lock_memo(&self) -> MutexGuard<'_, PosMemo> {
        match self.memo.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// POS under the given evaluation kind. Lazy and computed at most once:
    /// concurrent callers block on the memo and reuse the first result. A
    /// particle-generation bump invalidates the memo.
    pub fn pos(&self, kind: EvalKind) -> f64 {
        let generation = self.scenario.particles.generation();
        let mut memo = self.lock_memo();
        if memo.generation != generation {
            *memo = PosMemo {
                generation,
                ..PosMemo::default()
            };
        }
        if let Some(v) = *memo.slot(kind) {
            return v;
        }
        let v = self.scenario.scorer.pos(&self.placements, kind);
        *memo.slot(kind) = Some(v);
        v
    }

    /// Ordinals the refiner may move: active, placed, not frozen. Under the
    /// hold-seeds policy, ordinals still equal to their seed are excluded
    /// unless releasing them is the only way to clear a seed-on-seed
    /// conflict.
    pub fn perturbable_ordinals(&self, policy: &SeedPolicy) -> Vec<Ordinal> {
        let mut out: Vec<Ordinal> = (0..self.placements.len())
            .filter(|&o| {
                self.scenario.is_active(o)
                    && self.placements[o].is_placed()
                    && !self.scenario.variable(o).is_frozen()
            })
            .collect();

        if let SeedPolicy::HoldSeeds(seeds) = policy {
            let held: FnvHashSet<Ordinal> = out
                .iter()
                .copied()
                .filter(|&o| seeds.get(o) == Some(&self.placements[o]))
                .collect();

            let mut conflicted = FnvHashSet::default();
            for v in &self.violations.overlap {
                if v.opt <= OPT_EPS {
                    break;
                }
                if let ViolationKind::Overlap { a, b } = v.kind {
                    if held.contains(&a) && held.contains(&b) {
                        conflicted.insert(a);
                        conflicted.insert(b);
                    }
                }
            }
            out.retain(|o| !held.contains(o) || conflicted.contains(o));
        }
        out
    }

    /// The solver-wide tie-break. Feasible beats infeasible; among two
    /// infeasible candidates completeness wins, then smaller violations, then
    /// the unconstrained objective; among two feasible candidates POS wins,
    /// ties broken by completeness. Strict: equals compare false.
    pub fn better_than(&self, other: &Candidate, active: &ActiveSet) -> bool {
        if self.feasible != other.feasible {
            return self.feasible;
        }

        if self.feasible {
            let mine = self.pos(EvalKind::Constrained);
            let theirs = other.pos(EvalKind::Constrained);
            if mine > theirs + POS_EPS {
                return true;
            }
            if theirs > mine + POS_EPS {
                return false;
            }
            self.is_complete(active) && !other.is_complete(active)
        } else {
            let mine_complete = self.is_complete(active);
            let theirs_complete = other.is_complete(active);
            if mine_complete != theirs_complete {
                return mine_complete;
            }
            match compare_levels(&self.violations, &other.violations) {
                LevelCmp::Better { .. } => true,
                LevelCmp::Worse { .. } => false,
                LevelCmp::Equal => {
                    self.pos(EvalKind::Unconstrained)
                        > other.pos(EvalKind::Unconstrained) + POS_EPS
                }
            }
        }
    }

    /// Copy with every bare `Unplaced` slot turned into an explicit
    /// exclusion. Evaluations are rebuilt, not carried over.
    pub fn fancified(&self) -> Candidate {
        let next: Vec<Placement> = self
            .placements
            .iter()
            .map(|p| match p {
                Placement::Unplaced => Placement::Excluded,
                other => *other,
            })
            .collect();
        // Bypasses projection so inactive slots keep their exclusion marker.
        Candidate::from_projected(self.scenario.clone(), next)
    }

    /// Copy with movable slots that still equal their seed reset to
    /// `Unplaced`. Evaluations are rebuilt, not carried over.
    pub fn deinitialized(&self, seeds: &[Placement]) -> Candidate {
        let next: Vec<Placement> = self
            .placements
            .iter()
            .enumerate()
            .map(|(o, p)| {
                let movable = self.scenario.is_active(o) && !self.scenario.variable(o).is_frozen();
                if movable && seeds.get(o) == Some(p) {
                    Placement::Unplaced
                } else {
                    *p
                }
            })
            .collect();
        Candidate::new(self.scenario.clone(), &next)
    }
}

/// The active/frozen completion rule. Inactive slots become `Unplaced`; a
/// user freeze always wins; a supplied real value is never overridden; a
/// policy freeze fills whatever is still empty.
fn project(scenario: &Scenario, input: &[Placement]) -> Vec<Placement> {
    (0..scenario.len())
        .map(|o| {
            if !scenario.is_active(o) {
                return Placement::Unplaced;
            }
            let var = scenario.variable(o);
            if let Some(frozen) = var.user_frozen {
                return frozen;
            }
            let supplied = input.get(o).copied().unwrap_or(Placement::Unplaced);
            if supplied.is_placed() || matches!(supplied, Placement::Excluded) {
                return supplied;
            }
            if let Some(frozen) = var.perm_frozen {
                return frozen;
            }
            supplied
        })
        .collect()
}
