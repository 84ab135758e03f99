use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;

use fnv::FnvHashMap;
use tracing::{debug, warn};

use crate::core_types::ParticleId;
use crate::oracle::{DetectionOracle, FailureKind, FailureSample};
use crate::placement::{PlacementKey, SearchShape};
use crate::workers::{CancelToken, WorkerPool};

/// Conservative stand-in for cells a cancelled fetch never reached. The
/// caller is tearing down and will discard the batch.
const CANCELLED_SAMPLE: FailureSample = FailureSample {
    contained: 0.0,
    fail: 1.0,
    net_fail: 1.0,
};

/// Per-particle fill record. Append-only: a filled cell never changes.
#[derive(Debug, Clone, Copy, Default)]
struct FillRecord {
    contained: f64,
    fail: [Option<f64>; FailureKind::COUNT],
    net_fail: Option<f64>,
}

#[derive(Default)]
struct CacheEntry {
    table: Mutex<FnvHashMap<ParticleId, FillRecord>>,
}

struct SliceLatch {
    remaining: Mutex<usize>,
    cv: Condvar,
}

impl SliceLatch {
    fn new(count: usize) -> Arc<Self> {
        Arc::new(Self {
            remaining: Mutex::new(count),
            cv: Condvar::new(),
        })
    }

    fn done(&self) {
        let mut remaining = lock(&self.remaining);
        *remaining = remaining.saturating_sub(1);
        self.cv.notify_all();
    }

    /// Blocks until every dispatched slice has finished. Cancelled slices
    /// still count down on exit, so this never hangs.
    fn wait(&self) {
        let mut remaining = lock(&self.remaining);
        while *remaining > 0 {
            remaining = self
                .cv
                .wait(remaining)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }
}

/// Memoizes detection-failure results per (placement, particle, kind).
/// One entry per structurally-distinct placement; the first caller to miss
/// publishes the entry and concurrent requesters reuse it while it fills,
/// synchronizing only on the per-entry table. Batches above the slice floor
/// fan out over currently idle workers.
pub struct DetectionFailureCache {
    entries: Mutex<FnvHashMap<PlacementKey, Arc<CacheEntry>>>,
    pool: Arc<WorkerPool>,
    detector: Arc<dyn DetectionOracle>,
    min_slice: usize,
    computed: Arc<AtomicU64>,
}

impl DetectionFailureCache {
    pub fn new(
        pool: Arc<WorkerPool>,
        detector: Arc<dyn DetectionOracle>,
        min_slice: usize,
    ) -> Self {
        Self {
            entries: Mutex::new(FnvHashMap::default()),
            pool,
            detector,
            min_slice: min_slice.max(1),
            computed: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Cells computed so far. Increments only on first computation, never on
    /// a cache hit.
    pub fn computed(&self) -> u64 {
        self.computed.load(Ordering::Acquire)
    }

    /// Detection-failure samples for `particles` against one placement, in
    /// input order. Already-filled cells are served from the entry; the rest
    /// are computed (in parallel when worthwhile) before returning. The net
    /// no-detection probability is always produced alongside `kind`.
    pub fn get(
        &self,
        shape: &SearchShape,
        particles: &[ParticleId],
        kind: FailureKind,
        cancel: &CancelToken,
    ) -> Vec<FailureSample> {
        let entry = self.entry_for(shape);

        let missing: Vec<ParticleId> = {
            let table = lock(&entry.table);
            particles
                .iter()
                .copied()
                .filter(|id| {
                    table
                        .get(id)
                        .map_or(true, |r| r.fail[kind.index()].is_none())
                })
                .collect()
        };

        if !missing.is_empty() && !cancel.is_cancelled() {
            self.fill(&entry, shape, missing, kind, cancel);
        }

        let table = lock(&entry.table);
        particles
            .iter()
            .map(|id| {
                table
                    .get(id)
                    .and_then(|r| {
                        Some(FailureSample {
                            contained: r.contained,
                            fail: r.fail[kind.index()]?,
                            net_fail: r.net_fail?,
                        })
                    })
                    .unwrap_or(CANCELLED_SAMPLE)
            })
            .collect()
    }

    /// Single build per key: the Arc goes into the map under the map lock, so
    /// a racing caller finds the published entry instead of building its own.
    fn entry_for(&self, shape: &SearchShape) -> Arc<CacheEntry> {
        let key = crate::placement::Placement::Search(*shape).key();
        lock(&self.entries).entry(key).or_default().clone()
    }

    fn fill(
        &self,
        entry: &Arc<CacheEntry>,
        shape: &SearchShape,
        missing: Vec<ParticleId>,
        kind: FailureKind,
        cancel: &CancelToken,
    ) {
        let slices = self.plan_slices(missing.len());
        if slices <= 1 {
            compute_slice(
                &self.detector,
                entry,
                shape,
                &missing,
                kind,
                cancel,
                &self.computed,
            );
            return;
        }

        let chunk = missing.len().div_ceil(slices);
        let pieces: Vec<&[ParticleId]> = missing[chunk..].chunks(chunk).collect();

        debug!(
            particles = missing.len(),
            slices = pieces.len() + 1,
            "fanning cache batch over idle workers"
        );

        // Dispatch all but the first slice; the caller computes that one.
        let latch = SliceLatch::new(pieces.len());
        for piece in pieces {
            let detector = self.detector.clone();
            let entry = entry.clone();
            let shape = *shape;
            let ids = piece.to_vec();
            let cancel = cancel.clone();
            let computed = self.computed.clone();
            let latch = latch.clone();
            self.pool.spawn(move || {
                compute_slice(&detector, &entry, &shape, &ids, kind, &cancel, &computed);
                latch.done();
            });
        }

        compute_slice(
            &self.detector,
            entry,
            shape,
            &missing[..chunk],
            kind,
            cancel,
            &self.computed,
        );
        latch.wait();
    }

    /// How many slices to cut the batch into. Requires at least two idle
    /// workers and a worthwhile batch; when the pool stays saturated after a
    /// short backoff, falls back to the calling thread.
    fn plan_slices(&self, batch: usize) -> usize {
        if batch < self.min_slice * 2 {
            return 1;
        }
        for attempt in 0..3u32 {
            let idle = self.pool.idle();
            if idle >= 2 {
                return idle.min(batch / self.min_slice).max(1);
            }
            if attempt < 2 {
                std::thread::sleep(Duration::from_millis(2 << attempt));
            }
        }
        warn!(batch, "no idle workers for cache fan-out, running on caller");
        1
    }
}

fn compute_slice(
    detector: &Arc<dyn DetectionOracle>,
    entry: &Arc<CacheEntry>,
    shape: &SearchShape,
    ids: &[ParticleId],
    kind: FailureKind,
    cancel: &CancelToken,
    computed: &Arc<AtomicU64>,
) {
    for &id in ids {
        if cancel.is_cancelled() {
            return;
        }

        // Another slice (or a racing fetch) may have landed this cell first.
        {
            let table = lock(&entry.table);
            if table
                .get(&id)
                .map_or(false, |r| r.fail[kind.index()].is_some())
            {
                continue;
            }
        }

        let sample = detector.failure(shape, id, kind);

        let mut table = lock(&entry.table);
        let record = table.entry(id).or_default();
        if record.fail[kind.index()].is_none() {
            record.contained = sample.contained;
            record.fail[kind.index()] = Some(sample.fail);
            if record.net_fail.is_none() {
                record.net_fail = Some(sample.net_fail);
            }
            computed.fetch_add(1, Ordering::AcqRel);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
