use std::sync::{Arc, RwLock, Weak};

use tracing::{debug, info};

use crate::cache::DetectionFailureCache;
use crate::core_types::Ordinal;
use crate::error::{PlanError, PlanResult};
use crate::events::{EventBus, PlanEvent, PlanListener};
use crate::placement::Placement;
use crate::placer::Placer;
use crate::scenario::Scenario;
use crate::solution::Candidate;
use crate::workers::{CancelToken, WaitGroup, WorkerPool};

use super::moves::{Move, MoveEngine};
use super::solver::{Solver, SolverOptions};
use super::store::SharedOutcomeStore;

/// Pushes a newly-best feasible candidate from any solver to every other
/// solver as a candidate incumbent. Non-best currents are never propagated,
/// and a solver that already holds a current value is never overwritten.
#[derive(Default)]
struct PlagiarismRelay {
    solvers: RwLock<Vec<Weak<Solver>>>,
}

impl PlanListener for PlagiarismRelay {
    fn on_event(&self, event: &PlanEvent) {
        let PlanEvent::BestUpdated {
            solver, candidate, ..
        } = event
        else {
            return;
        };
        if !candidate.is_feasible() {
            return;
        }
        let Ok(solvers) = self.solvers.read() else {
            return;
        };
        for weak in solvers.iter() {
            let Some(other) = weak.upgrade() else {
                continue;
            };
            if other.id != *solver && other.offer_foreign(candidate.clone()) {
                debug!(from = solver, to = other.id, "propagated best solution");
            }
        }
    }
}

/// Runs the solver fleet: automatic instances on the shared pool plus one
/// manual instance for interactive edits, with best-solution propagation
/// between them.
pub struct Coordinator {
    scenario: Arc<Scenario>,
    pool: Arc<WorkerPool>,
    cache: Arc<DetectionFailureCache>,
    store: Arc<SharedOutcomeStore>,
    bus: Arc<EventBus>,
    solvers: Vec<Arc<Solver>>,
    manual: Arc<Solver>,
    tasks: WaitGroup,
}

impl Coordinator {
    pub fn new(scenario: Arc<Scenario>) -> PlanResult<Self> {
        let config = &scenario.config;
        let pool = WorkerPool::new(config.search.worker_threads)?;
        let cache = Arc::new(DetectionFailureCache::new(
            pool.clone(),
            scenario.detector.clone(),
            config.cache.min_slice,
        ));
        let store = SharedOutcomeStore::new();
        let bus = EventBus::new();

        let relay = Arc::new(PlagiarismRelay::default());
        bus.register(relay.clone());

        let automatic = config.search.solver_count.max(1);
        let solvers: Vec<Arc<Solver>> = (0..automatic)
            .map(|id| {
                Solver::new(
                    id,
                    scenario.clone(),
                    store.clone(),
                    cache.clone(),
                    bus.clone(),
                    SolverOptions::default(),
                )
            })
            .collect();
        let manual = Solver::new(
            automatic,
            scenario.clone(),
            store.clone(),
            cache.clone(),
            bus.clone(),
            SolverOptions {
                evaluation_only: true,
                manual: true,
            },
        );

        if let Ok(mut weak) = relay.solvers.write() {
            weak.extend(solvers.iter().map(Arc::downgrade));
            weak.push(Arc::downgrade(&manual));
        }

        info!(automatic, threads = pool.threads(), "coordinator ready");

        Ok(Self {
            scenario,
            pool,
            cache,
            store,
            bus,
            solvers,
            manual,
            tasks: WaitGroup::default(),
        })
    }

    pub fn register_listener(&self, listener: Arc<dyn PlanListener>) {
        self.bus.register(listener);
    }

    pub fn store(&self) -> &Arc<SharedOutcomeStore> {
        &self.store
    }

    pub fn cache(&self) -> &Arc<DetectionFailureCache> {
        &self.cache
    }

    pub fn solvers(&self) -> &[Arc<Solver>] {
        &self.solvers
    }

    pub fn manual_solver(&self) -> &Arc<Solver> {
        &self.manual
    }

    /// Launches every automatic solver as one long-lived pool task.
    pub fn start(&self, budget_secs: f64) {
        for solver in &self.solvers {
            solver.start_iterating(budget_secs);
            let task = solver.clone();
            let guard = self.tasks.enter();
            self.pool.spawn(move || {
                let _running = guard;
                task.run_loop();
            });
        }
    }

    /// Cancels every solver and joins their tasks.
    pub fn stop(&self) {
        for solver in self.solvers.iter().chain(std::iter::once(&self.manual)) {
            solver.stop_refining();
        }
        self.tasks.wait();
    }

    /// Flips one variable's eligibility and wakes any suspended solver.
    pub fn set_active(&self, ordinal: Ordinal, active: bool) {
        if !self.scenario.active.set(ordinal, active) {
            return;
        }
        self.bus.emit(PlanEvent::ActiveSetChanged {
            active: self.scenario.active_set(),
            label: format!(
                "variable {} now {}",
                ordinal,
                if active { "active" } else { "inactive" }
            ),
        });
        for solver in self.solvers.iter().chain(std::iter::once(&self.manual)) {
            solver.notify_active_changed();
        }
    }

    /// Interactive single-step edit against the manual solver's current
    /// value. `None` re-places the variable from scratch with everything
    /// else held fixed.
    pub fn perturb_manual(&self, ordinal: Ordinal, mv: Option<Move>) -> PlanResult<Candidate> {
        if ordinal >= self.scenario.len() {
            return Err(PlanError::Validation(format!(
                "ordinal {ordinal} is out of range"
            )));
        }

        let current = self.manual.current_plus().unwrap_or_else(|| {
            Candidate::new(self.scenario.clone(), &self.scenario.seed_placements())
        });

        let next = match mv {
            Some(mv) => {
                let engine = MoveEngine::from_params(&self.scenario.config.refine);
                let var = self.scenario.variable(ordinal);
                let moved = engine.apply(var, current.placement(ordinal), mv, 1);
                current.with_placement(ordinal, moved)
            }
            None => {
                let placer = Placer::new(self.scenario.clone(), self.cache.clone());
                let cancel = CancelToken::new();
                let mut trial = current.placements().to_vec();
                trial[ordinal] = Placement::Unplaced;
                trial[ordinal] = placer.place(ordinal, &trial, &cancel);
                Candidate::new(self.scenario.clone(), &trial)
            }
        };

        self.manual.set_current(next.clone());
        self.bus.emit(PlanEvent::DeconflictionAttempted {
            solver: self.manual.id,
            label: match mv {
                Some(mv) => format!("manual {mv} on variable {ordinal}"),
                None => format!("manual re-place of variable {ordinal}"),
            },
            candidate: next.clone(),
        });
        Ok(next)
    }
}
