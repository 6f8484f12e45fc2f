//! Background thread pool for media loading.
//!
//! Uses work-stealing deques:
//! - New tasks go to a global injector that idle workers check first
//! - Workers steal from each other when their own queue runs dry
//!
//! Epoch mechanism drops stale pre-load requests during fast feed scrolling.

use crossbeam::deque::{Injector, Stealer, Worker};
use log::trace;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::{Duration, Instant};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Worker pool shared by every player session of a pool.
pub struct Workers {
    injector: Arc<Injector<Job>>,
    handles: Vec<thread::JoinHandle<()>>,
    current_epoch: Arc<AtomicU64>,
    shutdown: Arc<AtomicBool>,
}

impl std::fmt::Debug for Workers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workers")
            .field("threads", &self.handles.len())
            .field("epoch", &self.current_epoch())
            .finish()
    }
}

impl Workers {
    /// Recommended thread count: 75% of cores, at least one.
    pub fn default_threads() -> usize {
        (num_cpus::get() * 3 / 4).max(1)
    }

    /// Spawn `num_threads` workers sharing `epoch` with the owning pool.
    pub fn new(num_threads: usize, epoch: Arc<AtomicU64>) -> std::io::Result<Self> {
        let num_threads = num_threads.max(1);
        let injector: Arc<Injector<Job>> = Arc::new(Injector::new());
        let shutdown = Arc::new(AtomicBool::new(false));

        let locals: Vec<Worker<Job>> = (0..num_threads).map(|_| Worker::new_fifo()).collect();
        let stealers: Vec<Stealer<Job>> = locals.iter().map(|w| w.stealer()).collect();
        let mut handles = Vec::with_capacity(num_threads);

        for (worker_id, local) in locals.into_iter().enumerate() {
            let injector = Arc::clone(&injector);
            let shutdown = Arc::clone(&shutdown);
            let stealers = stealers.clone();

            let handle = thread::Builder::new()
                .name(format!("reelpool-worker-{}", worker_id))
                .spawn(move || {
                    trace!("Worker {} started", worker_id);
                    loop {
                        if let Some(job) = next_job(&local, &injector, &stealers) {
                            job();
                            continue;
                        }
                        if shutdown.load(Ordering::Relaxed) {
                            break;
                        }
                        thread::sleep(Duration::from_millis(1));
                    }
                    trace!("Worker {} stopped", worker_id);
                })?;

            handles.push(handle);
        }

        trace!("Workers initialized: {} threads (work-stealing)", num_threads);

        Ok(Self {
            injector,
            handles,
            current_epoch: epoch,
            shutdown,
        })
    }

    /// Run closure on a worker thread.
    pub fn execute<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.injector.push(Box::new(f));
    }

    pub fn current_epoch(&self) -> u64 {
        self.current_epoch.load(Ordering::Relaxed)
    }

    /// Run closure only if the epoch still matches when a worker picks it up.
    ///
    /// A stale closure is dropped without running, so anything it owns is
    /// dropped too.
    pub fn execute_with_epoch<F>(&self, epoch: u64, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let current_epoch = Arc::clone(&self.current_epoch);
        self.injector.push(Box::new(move || {
            if current_epoch.load(Ordering::Relaxed) == epoch {
                f();
            } else {
                trace!("Skipping stale job (epoch {})", epoch);
            }
        }));
    }

    pub fn threads(&self) -> usize {
        self.handles.len()
    }

    /// Queue handle for jobs that re-enqueue themselves.
    ///
    /// Holds no strong reference, so a queued job never keeps the pool alive.
    pub fn queue(&self) -> JobQueue {
        JobQueue {
            injector: Arc::downgrade(&self.injector),
        }
    }
}

/// Weak handle to the global injector of a `Workers` pool
#[derive(Clone)]
pub struct JobQueue {
    injector: Weak<Injector<Job>>,
}

impl std::fmt::Debug for JobQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobQueue")
            .field("alive", &(self.injector.strong_count() > 0))
            .finish()
    }
}

impl JobQueue {
    /// Push a job behind everything already queued. Returns false (dropping
    /// the closure) once the pool is gone.
    pub fn execute<F>(&self, f: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        match self.injector.upgrade() {
            Some(injector) => {
                injector.push(Box::new(f));
                true
            }
            None => false,
        }
    }
}

fn next_job(local: &Worker<Job>, injector: &Injector<Job>, stealers: &[Stealer<Job>]) -> Option<Job> {
    if let Some(job) = local.pop() {
        return Some(job);
    }
    if let Some(job) = injector.steal_batch_and_pop(local).success() {
        return Some(job);
    }
    stealers.iter().find_map(|s| s.steal().success())
}

impl Drop for Workers {
    fn drop(&mut self) {
        let num_threads = self.handles.len();
        trace!("Workers shutting down ({} threads)...", num_threads);

        self.shutdown.store(true, Ordering::SeqCst);

        // Loaders observe their release flag after each chunk; the deadline
        // only matters for a chunk stuck on a slow network read.
        let deadline = Instant::now() + Duration::from_millis(500);

        for handle in std::mem::take(&mut self.handles) {
            while !handle.is_finished() {
                if Instant::now() >= deadline {
                    trace!("Shutdown timeout reached, detaching remaining workers");
                    return;
                }
                thread::sleep(Duration::from_millis(1));
            }
            let _ = handle.join();
        }

        trace!("All {} workers stopped", num_threads);
    }
}
