use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use fnv::FnvHashMap;
use sha2::{Digest, Sha256};

use crate::consts::POS_EPS;
use crate::core_types::ActiveSet;
use crate::oracle::EvalKind;
use crate::solution::Candidate;

/// Deterministic identity of an active set; keys the outcome tables.
pub fn active_set_signature(active: &ActiveSet) -> String {
    let mut hasher = Sha256::new();
    for ordinal in active.iter() {
        hasher.update(ordinal.to_le_bytes());
    }
    hex::encode(hasher.finalize())
}

#[derive(Default)]
pub struct OutcomeSlot {
    pub best: Option<Candidate>,
    /// POS of the first best that landed infeasible or at zero score.
    /// Look-back ratio comparisons measure progress against it.
    pub baseline: Option<f64>,
    /// Feasible POS over time, keyed by elapsed wall-clock second.
    pub series: BTreeMap<u64, f64>,
}

/// Best/baseline/time-series per active set, shared by every solver. This is
/// the only cross-solver mutable state; each logical table sits behind its
/// own mutex, so updates are linearizable.
pub struct SharedOutcomeStore {
    origin: Instant,
    best: Mutex<FnvHashMap<String, OutcomeSlot>>,
    current: Mutex<FnvHashMap<usize, Candidate>>,
}

impl SharedOutcomeStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            origin: Instant::now(),
            best: Mutex::new(FnvHashMap::default()),
            current: Mutex::new(FnvHashMap::default()),
        })
    }

    /// Replaces the best for the active set iff the candidate is strictly
    /// better. Seeds the baseline the first time a best lands infeasible or
    /// at zero POS; appends a time-series point only for feasible candidates.
    pub fn update_best(&self, active: &ActiveSet, candidate: &Candidate) -> bool {
        let signature = active_set_signature(active);
        let mut table = lock(&self.best);
        let slot = table.entry(signature).or_default();

        let strictly_better = match &slot.best {
            None => true,
            Some(incumbent) => candidate.better_than(incumbent, active),
        };
        if !strictly_better {
            return false;
        }

        let pos = candidate.pos(EvalKind::Constrained);
        if slot.baseline.is_none() && (!candidate.is_feasible() || pos <= POS_EPS) {
            slot.baseline = Some(pos);
        }
        if candidate.is_feasible() {
            slot.series.insert(self.origin.elapsed().as_secs(), pos);
        }
        slot.best = Some(candidate.clone());
        true
    }

    pub fn best_for(&self, active: &ActiveSet) -> Option<Candidate> {
        lock(&self.best)
            .get(&active_set_signature(active))
            .and_then(|slot| slot.best.clone())
    }

    pub fn baseline_for(&self, active: &ActiveSet) -> Option<f64> {
        lock(&self.best)
            .get(&active_set_signature(active))
            .and_then(|slot| slot.baseline)
    }

    pub fn series_for(&self, active: &ActiveSet) -> Vec<(u64, f64)> {
        lock(&self.best)
            .get(&active_set_signature(active))
            .map(|slot| slot.series.iter().map(|(&t, &p)| (t, p)).collect())
            .unwrap_or_default()
    }

    pub fn record_current(&self, solver: usize, candidate: &Candidate) {
        lock(&self.current).insert(solver, candidate.clone());
    }

    pub fn current_of(&self, solver: usize) -> Option<Candidate> {
        lock(&self.current).get(&solver).cloned()
    }

    pub fn clear_current(&self, solver: usize) {
        lock(&self.current).remove(&solver);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
