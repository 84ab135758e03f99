use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use strum_macros::Display;
use tracing::debug;

use crate::config::RefineParams;
use crate::consts::POS_EPS;
use crate::constraint::{compare_levels, worse_at_deeper, LevelCmp};
use crate::core_types::Ordinal;
use crate::oracle::EvalKind;
use crate::scenario::Scenario;
use crate::solution::{Candidate, SeedPolicy};
use crate::workers::{CancelToken, Deadline};

use super::moves::{Move, MoveEngine};

/// Refinement stages, in run order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Stage {
    /// POS-improving; new constraint violations are ignored.
    Preliminary,
    /// Constraint-only deconfliction.
    ClearOverlap,
    /// POS-improving, must stay feasible.
    ZeroInOne,
    /// Second zeroing-in round at the same rules; fresh queue and budget.
    ZeroInTwo,
}

impl Stage {
    fn improves_pos(self) -> bool {
        !matches!(self, Stage::ClearOverlap)
    }

    fn requires_feasible(self) -> bool {
        matches!(self, Stage::ZeroInOne | Stage::ZeroInTwo)
    }

    fn objective_kind(self) -> EvalKind {
        match self {
            // Preliminary credits conflicting plans on purpose.
            Stage::Preliminary => EvalKind::Unconstrained,
            _ => EvalKind::Constrained,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    AlreadyClear,
    Plateau,
    PassLimit,
    FibCap,
    Exhausted,
    Deadline,
    Cancelled,
}

#[derive(Debug, Clone, Copy)]
pub struct StageReport {
    pub stage: Stage,
    pub passes: usize,
    pub accepted: usize,
    pub reason: StopReason,
}

enum ScanResult {
    /// An accepted move: the new candidate and the winning ordinal.
    Improved(Candidate, Ordinal),
    Dry,
}

/// Staged local search over one candidate. Stateless between calls apart
/// from configuration; every trial goes through candidate replacement.
pub struct Refiner {
    scenario: Arc<Scenario>,
    params: RefineParams,
    engine: MoveEngine,
}

impl Refiner {
    pub fn new(scenario: Arc<Scenario>) -> Self {
        let params = scenario.config.refine.clone();
        let engine = MoveEngine::from_params(&params);
        Self {
            scenario,
            params,
            engine,
        }
    }

    /// Full refinement: the clearing-only subset once for fast initial
    /// deconfliction, then the full stage sequence repeatedly until the stop
    /// flag or the deadline fires. Returns the best candidate seen.
    pub fn refine(
        &self,
        start: Candidate,
        deadline: &Deadline,
        cancel: &CancelToken,
        policy: &SeedPolicy,
    ) -> Candidate {
        let active = self.scenario.active_set();
        let mut current = start;
        let mut best = current.clone();

        let (next, report) = self.run_stage(Stage::ClearOverlap, current, deadline, cancel, policy);
        current = next;
        debug!(reason = ?report.reason, "initial clearing done");
        if current.better_than(&best, &active) {
            best = current.clone();
        }

        'outer: while !cancel.is_cancelled() && !deadline.expired() {
            for stage in [
                Stage::Preliminary,
                Stage::ClearOverlap,
                Stage::ZeroInOne,
                Stage::ZeroInTwo,
            ] {
                let (next, _report) = self.run_stage(stage, current, deadline, cancel, policy);
                current = next;
                if current.better_than(&best, &active) {
                    best = current.clone();
                }
                if cancel.is_cancelled() || deadline.expired() {
                    break 'outer;
                }
            }
        }
        best
    }

    /// One stage: pass loop with Fibonacci repeat escalation and the
    /// attention-rotation queue.
    pub fn run_stage(
        &self,
        stage: Stage,
        mut current: Candidate,
        deadline: &Deadline,
        cancel: &CancelToken,
        policy: &SeedPolicy,
    ) -> (Candidate, StageReport) {
        let report = |passes, accepted, reason| StageReport {
            stage,
            passes,
            accepted,
            reason,
        };

        if !stage.improves_pos() && self.overlap_very_clear(&current) {
            return (current, report(0, 0, StopReason::AlreadyClear));
        }

        // Zeroing in starts from an overlap-clear incumbent.
        if stage.requires_feasible() && !self.overlap_clear(&current) {
            let (cleared, _) =
                self.run_stage(Stage::ClearOverlap, current, deadline, cancel, policy);
            current = cleared;
        }

        let entered = Instant::now();
        let stage_deadline =
            (entered + Duration::from_secs_f64(self.params.stage_secs)).min(deadline.instant());

        let mut queue: VecDeque<Ordinal> = current.perturbable_ordinals(policy).into();
        if queue.is_empty() {
            return (current, report(0, 0, StopReason::Exhausted));
        }

        let mut lookback: VecDeque<f64> = VecDeque::new();
        let mut passes = 0usize;
        let mut accepted = 0usize;

        let reason = 'stage: loop {
            if cancel.is_cancelled() {
                break StopReason::Cancelled;
            }
            if Instant::now() >= stage_deadline || deadline.expired() {
                break StopReason::Deadline;
            }
            if passes >= self.params.max_passes {
                break StopReason::PassLimit;
            }

            // One pass: escalate the repeat count until a move lands or the
            // ladder tops out.
            let mut landed = false;
            let (mut fib_a, mut fib_b) = (1u32, 1u32);
            loop {
                if fib_a > self.params.fib_cap {
                    if !stage.improves_pos() {
                        break 'stage StopReason::FibCap;
                    }
                    break;
                }
                if cancel.is_cancelled() || Instant::now() >= stage_deadline {
                    break;
                }

                match self.scan(stage, &current, &queue, fib_a, cancel) {
                    ScanResult::Improved(next, winner) => {
                        // Spread attention once something feasible exists;
                        // race to first feasibility otherwise.
                        rotate(&mut queue, winner, next.is_feasible());
                        current = next;
                        accepted += 1;
                        landed = true;
                        break;
                    }
                    ScanResult::Dry => {
                        let step = fib_a + fib_b;
                        fib_a = fib_b;
                        fib_b = step;
                    }
                }
            }

            if !landed {
                break StopReason::Exhausted;
            }
            passes += 1;

            // Plateau: sub-threshold relative growth over the look-back
            // window ends the stage.
            let objective = self.stage_objective(stage, &current);
            lookback.push_back(objective);
            if lookback.len() > self.params.lookback_passes {
                lookback.pop_front();
            }
            if lookback.len() == self.params.lookback_passes {
                let first = lookback.front().copied().unwrap_or(0.0);
                let growth = (objective - first) / first.abs().max(1e-9);
                if growth < self.params.min_rel_growth {
                    break StopReason::Plateau;
                }
            }
        };

        let outcome = report(passes, accepted, reason);
        debug!(
            stage = %stage,
            passes,
            accepted,
            reason = ?reason,
            elapsed_ms = entered.elapsed().as_millis() as u64,
            "stage done"
        );
        (current, outcome)
    }

    /// One scan over ordinals x applicable moves at a fixed repeat count.
    /// POS stages return the first strict improvement. Constraint stages
    /// return the first automatic win, or the single best settle-for
    /// candidate after the whole scan completes.
    fn scan(
        &self,
        stage: Stage,
        current: &Candidate,
        queue: &VecDeque<Ordinal>,
        repeat: u32,
        cancel: &CancelToken,
    ) -> ScanResult {
        // Settle-for: (first unmatched level, net objective, candidate, winner).
        let mut settle: Option<(usize, f64, Candidate, Ordinal)> = None;

        for &ordinal in queue {
            if cancel.is_cancelled() {
                break;
            }
            let var = self.scenario.variable(ordinal);

            for mv in Move::catalog(var.kind) {
                let moved = self
                    .engine
                    .apply(var, current.placement(ordinal), mv, repeat);
                if &moved == current.placement(ordinal) {
                    continue;
                }
                let trial = current.with_placement(ordinal, moved);

                if stage.improves_pos() {
                    let kind = stage.objective_kind();
                    if trial.pos(kind) > current.pos(kind) + POS_EPS
                        && (!stage.requires_feasible() || trial.is_feasible())
                    {
                        return ScanResult::Improved(trial, ordinal);
                    }
                    continue;
                }

                let LevelCmp::Better { level, gain } =
                    compare_levels(trial.violations(), current.violations())
                else {
                    continue;
                };

                if mv.automatic() {
                    // Automatic win: top unequal level improves, and any
                    // finer-level worsening is outweighed by the constraint
                    // gain still needed.
                    let deeper_worse =
                        worse_at_deeper(trial.violations(), current.violations(), level);
                    let pos_loss = (current.pos(EvalKind::Unconstrained)
                        - trial.pos(EvalKind::Unconstrained))
                    .max(0.0);
                    if !deeper_worse || pos_loss < trial.violations().total_excess() + gain {
                        return ScanResult::Improved(trial, ordinal);
                    }
                }

                let net =
                    trial.pos(EvalKind::Unconstrained) - trial.violations().total_excess();
                let replace = match &settle {
                    None => true,
                    Some((best_level, best_net, _, _)) => {
                        level < *best_level || (level == *best_level && net > *best_net)
                    }
                };
                if replace {
                    settle = Some((level, net, trial, ordinal));
                }
            }
        }

        match settle {
            Some((_, _, candidate, winner)) => ScanResult::Improved(candidate, winner),
            None => ScanResult::Dry,
        }
    }

    fn stage_objective(&self, stage: Stage, candidate: &Candidate) -> f64 {
        if stage.improves_pos() {
            candidate.pos(stage.objective_kind())
        } else {
            -candidate.violations().total_excess()
        }
    }

    fn overlap_clear(&self, candidate: &Candidate) -> bool {
        candidate
            .violations()
            .worst_overlap_opt()
            .map_or(true, |worst| worst <= crate::consts::OPT_EPS)
    }

    fn overlap_very_clear(&self, candidate: &Candidate) -> bool {
        candidate
            .violations()
            .worst_overlap_opt()
            .map_or(true, |worst| worst <= -self.params.very_clear_margin)
    }
}

/// Winner handling after an accepted move: to the back when spreading
/// attention, to the front when racing for first feasibility.
fn rotate(queue: &mut VecDeque<Ordinal>, winner: Ordinal, to_back: bool) {
    if let Some(at) = queue.iter().position(|&o| o == winner) {
        queue.remove(at);
        if to_back {
            queue.push_back(winner);
        } else {
            queue.push_front(winner);
        }
    }
}
