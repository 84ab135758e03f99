use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::error::{PlanError, PlanResult};

/// Cooperative cancellation token. Long-running loops check it at iteration
/// boundaries and exit promptly; candidates are immutable values, so an
/// abandoned trial leaves nothing half-written.
#[derive(Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    pub fn reset(&self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Suspension point for a solver with nothing to do. A closed gate blocks
/// until opened or cancelled.
pub struct Gate {
    open: Mutex<bool>,
    cv: Condvar,
}

impl Gate {
    pub fn new(open: bool) -> Self {
        Self {
            open: Mutex::new(open),
            cv: Condvar::new(),
        }
    }

    pub fn close(&self) {
        let mut open = lock(&self.open);
        *open = false;
    }

    pub fn open(&self) {
        let mut open = lock(&self.open);
        *open = true;
        self.cv.notify_all();
    }

    pub fn is_open(&self) -> bool {
        *lock(&self.open)
    }

    /// Blocks until the gate opens or the token cancels.
    pub fn wait_open(&self, cancel: &CancelToken) {
        let mut open = lock(&self.open);
        while !*open && !cancel.is_cancelled() {
            let (guard, _) = self
                .cv
                .wait_timeout(open, Duration::from_millis(50))
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            open = guard;
        }
    }
}

/// Absolute wall-clock deadline that can be extended while a run is live,
/// without restarting already-elapsed stage budgets.
pub struct Deadline {
    origin: Instant,
    limit_ms: AtomicU64,
}

impl Deadline {
    pub fn after_secs(secs: f64) -> Arc<Self> {
        Arc::new(Self {
            origin: Instant::now(),
            limit_ms: AtomicU64::new((secs.max(0.0) * 1000.0) as u64),
        })
    }

    pub fn expired(&self) -> bool {
        self.origin.elapsed().as_millis() as u64 >= self.limit_ms.load(Ordering::Acquire)
    }

    pub fn instant(&self) -> Instant {
        self.origin + Duration::from_millis(self.limit_ms.load(Ordering::Acquire))
    }

    pub fn extend_secs(&self, secs: f64) {
        self.limit_ms
            .fetch_add((secs.max(0.0) * 1000.0) as u64, Ordering::AcqRel);
    }

    pub fn remaining_secs(&self) -> f64 {
        let limit = Duration::from_millis(self.limit_ms.load(Ordering::Acquire));
        limit.saturating_sub(self.origin.elapsed()).as_secs_f64()
    }
}

/// Counts outstanding tasks so shutdown can join them.
#[derive(Clone, Default)]
pub struct WaitGroup {
    inner: Arc<WaitGroupInner>,
}

#[derive(Default)]
struct WaitGroupInner {
    count: Mutex<usize>,
    cv: Condvar,
}

pub struct WaitGuard {
    inner: Arc<WaitGroupInner>,
}

impl WaitGroup {
    pub fn enter(&self) -> WaitGuard {
        *lock(&self.inner.count) += 1;
        WaitGuard {
            inner: self.inner.clone(),
        }
    }

    /// Blocks until every guard has dropped.
    pub fn wait(&self) {
        let mut count = lock(&self.inner.count);
        while *count > 0 {
            count = self
                .inner
                .cv
                .wait(count)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }
}

impl Drop for WaitGuard {
    fn drop(&mut self) {
        let mut count = lock(&self.inner.count);
        *count = count.saturating_sub(1);
        self.inner.cv.notify_all();
    }
}

/// The shared fixed-size pool. Each live solver owns one long-lived task in
/// it; the detection-failure cache borrows whatever is idle for batch slices.
pub struct WorkerPool {
    pool: rayon::ThreadPool,
    threads: usize,
    busy: AtomicUsize,
}

impl WorkerPool {
    /// `threads == 0` autodetects.
    pub fn new(threads: usize) -> PlanResult<Arc<Self>> {
        let threads = if threads == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        } else {
            threads
        };

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("sarplan-worker-{i}"))
            .build()
            .map_err(|e| PlanError::Pool(e.to_string()))?;

        Ok(Arc::new(Self {
            pool,
            threads,
            busy: AtomicUsize::new(0),
        }))
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    pub fn idle(&self) -> usize {
        self.threads
            .saturating_sub(self.busy.load(Ordering::Acquire))
    }

    /// Fire-and-forget task with busy accounting.
    pub fn spawn<F>(self: &Arc<Self>, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.busy.fetch_add(1, Ordering::AcqRel);
        let me = self.clone();
        self.pool.spawn(move || {
            f();
            me.busy.fetch_sub(1, Ordering::AcqRel);
        });
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
