use std::sync::{Arc, Mutex, MutexGuard};

use fastrand::Rng;
use strum_macros::Display;
use tracing::{debug, info};

use crate::cache::DetectionFailureCache;
use crate::consts::POS_EPS;
use crate::core_types::{ActiveSet, Ordinal};
use crate::events::{EventBus, PlanEvent};
use crate::oracle::EvalKind;
use crate::placement::Placement;
use crate::placer::Placer;
use crate::scenario::Scenario;
use crate::solution::{Candidate, SeedPolicy};
use crate::workers::{CancelToken, Deadline, Gate};

use super::refiner::Refiner;
use super::store::SharedOutcomeStore;

/// How a jump builds its candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum JumpStyle {
    /// First jump of the run: seeds only, hold-seeds policy may apply.
    NoPreviousSolution,
    /// An externally injected solution, adapted to the active set and
    /// adopted verbatim.
    ForeignReplacement,
    /// Fresh construction through the placement oracle.
    MakeFromScratch,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SolverOptions {
    /// Jump and score, never refine.
    pub evaluation_only: bool,
    /// Driven by interactive edits rather than the loop.
    pub manual: bool,
}

#[derive(Default)]
struct SolverState {
    current: Option<Candidate>,
    foreign: Option<Candidate>,
    jumps: u64,
}

/// One solving instance: a long-lived jump/refine loop over the shared
/// scenario, publishing into the shared outcome store.
pub struct Solver {
    pub id: usize,
    scenario: Arc<Scenario>,
    store: Arc<SharedOutcomeStore>,
    cache: Arc<DetectionFailureCache>,
    bus: Arc<EventBus>,
    options: SolverOptions,
    state: Mutex<SolverState>,
    gate: Gate,
    cancel: CancelToken,
    deadline: Mutex<Option<Arc<Deadline>>>,
}

impl Solver {
    pub(crate) fn new(
        id: usize,
        scenario: Arc<Scenario>,
        store: Arc<SharedOutcomeStore>,
        cache: Arc<DetectionFailureCache>,
        bus: Arc<EventBus>,
        options: SolverOptions,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            scenario,
            store,
            cache,
            bus,
            options,
            state: Mutex::new(SolverState::default()),
            gate: Gate::new(false),
            cancel: CancelToken::new(),
            deadline: Mutex::new(None),
        })
    }

    /// Sets the wall-clock budget and releases the loop.
    pub fn start_iterating(&self, budget_secs: f64) {
        *lock(&self.deadline) = Some(Deadline::after_secs(budget_secs));
        self.cancel.reset();
        self.gate.open();
    }

    /// Cooperative stop: the loop exits at its next check, releasing any
    /// suspended wait.
    pub fn stop_refining(&self) {
        self.cancel.cancel();
        self.gate.open();
    }

    /// Extends the running deadline without restarting elapsed stage budgets.
    pub fn extend_deadline(&self, secs: f64) {
        if let Some(deadline) = lock(&self.deadline).as_ref() {
            deadline.extend_secs(secs);
        }
    }

    /// Current working candidate, falling back to the best known for the
    /// active set.
    pub fn current_plus(&self) -> Option<Candidate> {
        lock(&self.state)
            .current
            .clone()
            .or_else(|| self.store.best_for(&self.scenario.active_set()))
    }

    pub fn best_for(&self, active: &ActiveSet) -> Option<Candidate> {
        self.store.best_for(active)
    }

    pub fn has_current(&self) -> bool {
        lock(&self.state).current.is_some()
    }

    pub(crate) fn set_current(&self, candidate: Candidate) {
        self.store.record_current(self.id, &candidate);
        lock(&self.state).current = Some(candidate);
    }

    /// Plagiarism entry: the injected candidate is adopted at the next jump.
    /// Refused when this solver already holds any current value.
    pub fn offer_foreign(&self, candidate: Candidate) -> bool {
        let mut state = lock(&self.state);
        if state.current.is_some() {
            return false;
        }
        state.foreign = Some(candidate);
        drop(state);
        self.gate.open();
        true
    }

    /// Wakes a solver suspended on an empty movable set.
    pub fn notify_active_changed(&self) {
        self.gate.open();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// The long-lived per-solver task: jump, then refine, until stopped.
    pub(crate) fn run_loop(self: Arc<Self>) {
        let mut rng = match self.scenario.config.search.rng_seed {
            Some(seed) => Rng::with_seed(seed.wrapping_add(self.id as u64)),
            None => Rng::new(),
        };
        let refiner = Refiner::new(self.scenario.clone());
        let placer = Placer::new(self.scenario.clone(), self.cache.clone());

        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            let Some(deadline) = lock(&self.deadline).clone() else {
                self.gate.wait_open(&self.cancel);
                continue;
            };
            if deadline.expired() {
                break;
            }

            if self.scenario.movable_set().is_empty() {
                // Nothing to move: canonicalize the current value through the
                // active/frozen projection and suspend until the set changes.
                {
                    let mut state = lock(&self.state);
                    if let Some(current) = &state.current {
                        let projected = current.reprojected();
                        self.store.record_current(self.id, &projected);
                        state.current = Some(projected);
                    }
                }
                self.gate.close();
                self.gate.wait_open(&self.cancel);
                continue;
            }

            let active = self.scenario.active_set();
            // The evaluation pair for this active set: the constrained
            // objective judges feasible plans, the unconstrained one judges
            // everything else.
            let (style, jumped, policy) = self.jump(&mut rng, &placer);
            self.set_current(jumped.clone());
            self.bus.emit(PlanEvent::JumpOccurred {
                solver: self.id,
                style,
                label: format!("jump ({style})"),
                candidate: jumped.clone(),
            });
            self.update_best(&jumped, &active, "jump");

            if self.options.evaluation_only {
                if self.options.manual {
                    // Manual solvers idle between interactive edits.
                    self.gate.close();
                    self.gate.wait_open(&self.cancel);
                }
                continue;
            }

            let refined = refiner.refine(jumped, &deadline, &self.cancel, &policy);
            self.set_current(refined.clone());
            self.bus.emit(PlanEvent::DeconflictionAttempted {
                solver: self.id,
                label: "refinement round".to_string(),
                candidate: refined.clone(),
            });
            self.update_best(&refined, &active, "refine");
        }
        debug!(solver = self.id, "solver loop exit");
    }

    fn jump(&self, rng: &mut Rng, placer: &Placer) -> (JumpStyle, Candidate, SeedPolicy) {
        let mut state = lock(&self.state);
        let style = if state.foreign.is_some() {
            JumpStyle::ForeignReplacement
        } else if state.jumps == 0 && state.current.is_none() {
            JumpStyle::NoPreviousSolution
        } else {
            JumpStyle::MakeFromScratch
        };
        state.jumps += 1;

        match style {
            JumpStyle::ForeignReplacement => {
                let foreign = state.foreign.take();
                drop(state);
                // Adapt to the active set, adopt verbatim otherwise.
                let adopted = match foreign {
                    Some(candidate) => candidate.reprojected(),
                    None => Candidate::new(
                        self.scenario.clone(),
                        &self.scenario.seed_placements(),
                    ),
                };
                (style, adopted, SeedPolicy::Free)
            }
            JumpStyle::NoPreviousSolution => {
                drop(state);
                let seeds = self.scenario.seed_placements();
                let candidate = self.make_from_scratch(rng, placer, &seeds);
                let policy = if self.scenario.config.search.hold_seeds_on_first_jump {
                    SeedPolicy::HoldSeeds(seeds.into())
                } else {
                    SeedPolicy::Free
                };
                (style, candidate, policy)
            }
            JumpStyle::MakeFromScratch => {
                drop(state);
                let seeds = self.scenario.seed_placements();
                let candidate = self.make_from_scratch(rng, placer, &seeds);
                (style, candidate, SeedPolicy::Free)
            }
        }
    }

    /// Fresh construction: stand-alone variables first through the placement
    /// oracle with frozen/seed values as fixed knowns, then sequence members
    /// in order, then a bounded number of randomized pairwise re-placements
    /// kept only on strict unconstrained-objective improvement.
    fn make_from_scratch(&self, rng: &mut Rng, placer: &Placer, seeds: &[Placement]) -> Candidate {
        let scenario = &self.scenario;
        let mut knowns: Vec<Placement> =
            Candidate::new(scenario.clone(), seeds).placements().to_vec();

        let movable: Vec<Ordinal> = (0..scenario.len())
            .filter(|&o| scenario.is_active(o) && !scenario.variable(o).is_frozen())
            .collect();

        let (standalone, chained): (Vec<Ordinal>, Vec<Ordinal>) = movable
            .iter()
            .copied()
            .partition(|&o| scenario.variable(o).sequence.is_none());

        for &ordinal in standalone.iter().chain(&chained) {
            if self.cancel.is_cancelled() {
                break;
            }
            if knowns[ordinal].is_placed() {
                continue;
            }
            knowns[ordinal] = placer.place(ordinal, &knowns, &self.cancel);
        }
        for sequence in &scenario.sequences {
            knowns = sequence.align_times(&knowns);
        }

        let mut best = Candidate::new(scenario.clone(), &knowns);

        if movable.len() >= 2 {
            let attempts = scenario.config.search.pairwise_jump_attempts;
            for _ in 0..attempts {
                if self.cancel.is_cancelled() {
                    break;
                }
                let a = movable[rng.usize(0..movable.len())];
                let b = loop {
                    let pick = movable[rng.usize(0..movable.len())];
                    if pick != a {
                        break pick;
                    }
                };

                let mut trial = best.placements().to_vec();
                trial[a] = Placement::Unplaced;
                trial[b] = Placement::Unplaced;
                trial[a] = placer.place(a, &trial, &self.cancel);
                trial[b] = placer.place(b, &trial, &self.cancel);
                for sequence in &scenario.sequences {
                    trial = sequence.align_times(&trial);
                }

                let candidate = Candidate::new(scenario.clone(), &trial);
                if candidate.pos(EvalKind::Unconstrained)
                    > best.pos(EvalKind::Unconstrained) + POS_EPS
                {
                    best = candidate;
                }
            }
        }
        best
    }

    fn update_best(&self, candidate: &Candidate, active: &ActiveSet, label: &str) {
        if self.store.update_best(active, candidate) {
            info!(
                solver = self.id,
                feasible = candidate.is_feasible(),
                pos = candidate.pos(EvalKind::Constrained),
                label,
                "new best for active set"
            );
            self.bus.emit(PlanEvent::BestUpdated {
                solver: self.id,
                label: label.to_string(),
                candidate: candidate.clone(),
            });
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
