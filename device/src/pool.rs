//! Worker thread pool

use crate::error::DeviceError;
use crate::memory::lock;
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

/// A unit of work run on a pool thread.
pub type Job = Box<dyn FnOnce(&JobState) + Send + 'static>;

/// State shared by a pool and its threads.
#[derive(Debug, Default)]
struct PoolState {
    pending: Mutex<usize>,
    idle: Condvar,

    /// Incremented by every cancel. A job belongs to the generation that
    /// was current when it was pushed.
    generation: AtomicU64,
}

impl PoolState {
    fn finish_one(&self) {
        let mut pending = lock(&self.pending);
        *pending = pending.saturating_sub(1);
        if *pending == 0 {
            self.idle.notify_all();
        }
    }
}

/// What a running job sees of the pool.
#[derive(Debug)]
pub struct JobState {
    pool: Arc<PoolState>,
    generation: u64,
}

impl JobState {
    /// Returns true if the pool was cancelled after this job was queued.
    pub fn cancelled(&self) -> bool {
        self.pool.generation.load(Ordering::Acquire) != self.generation
    }
}

struct QueuedJob {
    job: Job,
    generation: u64,
    cancellable: bool,
}

/// A fixed set of persistent worker threads running queued jobs.
pub struct TaskPool {
    sender: Option<Sender<QueuedJob>>,
    workers: Vec<JoinHandle<()>>,
    state: Arc<PoolState>,
}

impl std::fmt::Debug for TaskPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskPool")
            .field("threads", &self.workers.len())
            .field("state", &self.state)
            .finish()
    }
}

impl TaskPool {
    /// Start the worker threads.
    ///
    /// * `num_threads` - Number of threads; 0 uses one per logical core.
    pub fn new(num_threads: usize) -> Result<Self, DeviceError> {
        let num_threads = if num_threads == 0 { num_cpus::get() } else { num_threads };
        let (sender, receiver) = unbounded::<QueuedJob>();
        let state = Arc::new(PoolState::default());

        let mut workers = Vec::with_capacity(num_threads);
        for i in 0..num_threads {
            let rx: Receiver<QueuedJob> = receiver.clone();
            let state = state.clone();
            let handle = std::thread::Builder::new()
                .name(format!("worker-{i}"))
                .spawn(move || {
                    for queued in rx.iter() {
                        run_job(&state, queued, i);
                        state.finish_one();
                    }
                })?;
            workers.push(handle);
        }
        debug!("Started {num_threads} worker threads");

        Ok(Self {
            sender: Some(sender),
            workers,
            state,
        })
    }

    /// Number of worker threads.
    pub fn num_threads(&self) -> usize {
        self.workers.len()
    }

    /// Queue a job that a later `cancel` skips or stops.
    ///
    /// * `job` - Job.
    pub fn push(&self, job: Job) {
        self.enqueue(job, true);
    }

    /// Queue a job that always runs to completion.
    ///
    /// * `job` - Job.
    pub fn push_uncancellable(&self, job: Job) {
        self.enqueue(job, false);
    }

    fn enqueue(&self, job: Job, cancellable: bool) {
        let Some(sender) = &self.sender else {
            return;
        };
        *lock(&self.state.pending) += 1;
        let queued = QueuedJob {
            job,
            generation: self.state.generation.load(Ordering::Acquire),
            cancellable,
        };
        if sender.send(queued).is_err() {
            self.state.finish_one();
        }
    }

    /// Block until every queued job finished.
    pub fn wait_work(&self) {
        let mut pending = lock(&self.state.pending);
        while *pending > 0 {
            pending = self.state.idle.wait(pending).unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Cancel the jobs queued so far. Cancellable jobs that have not
    /// started are skipped; running ones see `JobState::cancelled` and stop
    /// at their next check. Jobs pushed afterwards are unaffected.
    pub fn cancel(&self) {
        self.state.generation.fetch_add(1, Ordering::AcqRel);
    }
}

/// Run one job, keeping a panic on this worker.
fn run_job(state: &Arc<PoolState>, queued: QueuedJob, worker: usize) {
    let job_state = JobState {
        pool: state.clone(),
        generation: queued.generation,
    };
    if queued.cancellable && job_state.cancelled() {
        return;
    }
    let job = queued.job;
    if catch_unwind(AssertUnwindSafe(|| job(&job_state))).is_err() {
        error!("Job panicked on worker-{worker}");
    }
}

impl Drop for TaskPool {
    fn drop(&mut self) {
        self.cancel();
        self.sender = None;
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                error!("Worker thread panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn counting_job(count: &Arc<AtomicUsize>) -> Job {
        let count = count.clone();
        Box::new(move |_| {
            count.fetch_add(1, Ordering::Relaxed);
        })
    }

    #[test]
    fn runs_all_jobs() {
        let pool = TaskPool::new(3).unwrap();
        assert_eq!(pool.num_threads(), 3);
        let count = Arc::new(AtomicUsize::new(0));
        for _ in 0..20 {
            pool.push(counting_job(&count));
        }
        pool.wait_work();
        assert_eq!(count.load(Ordering::Relaxed), 20);
    }

    #[test]
    fn cancel_skips_queued_jobs() {
        let pool = TaskPool::new(1).unwrap();
        let started = Arc::new(AtomicUsize::new(0));
        for _ in 0..10 {
            let started = started.clone();
            pool.push(Box::new(move |state| {
                started.fetch_add(1, Ordering::Relaxed);
                while !state.cancelled() {
                    std::thread::sleep(Duration::from_millis(1));
                }
            }));
        }
        while started.load(Ordering::Relaxed) == 0 {
            std::thread::sleep(Duration::from_millis(1));
        }
        pool.cancel();
        pool.wait_work();
        assert_eq!(started.load(Ordering::Relaxed), 1);

        // The pool is usable again after a cancelled batch.
        let again = Arc::new(AtomicUsize::new(0));
        pool.push(counting_job(&again));
        pool.wait_work();
        assert_eq!(again.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn cancel_while_idle_keeps_later_jobs() {
        let pool = TaskPool::new(2).unwrap();
        pool.cancel();
        let count = Arc::new(AtomicUsize::new(0));
        pool.push(counting_job(&count));
        pool.push(counting_job(&count));
        pool.wait_work();
        assert_eq!(count.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn uncancellable_jobs_run_after_cancel() {
        let pool = TaskPool::new(1).unwrap();
        let (release_tx, release_rx) = crossbeam_channel::bounded::<()>(0);
        pool.push(Box::new(move |_| {
            let _ = release_rx.recv();
        }));
        let skipped = Arc::new(AtomicUsize::new(0));
        let kept = Arc::new(AtomicUsize::new(0));
        pool.push(counting_job(&skipped));
        pool.push_uncancellable(counting_job(&kept));

        pool.cancel();
        drop(release_tx);
        pool.wait_work();
        assert_eq!(skipped.load(Ordering::Relaxed), 0);
        assert_eq!(kept.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn panicking_job_does_not_stall_pool() {
        let pool = TaskPool::new(1).unwrap();
        pool.push(Box::new(|_| panic!("bad job")));
        pool.wait_work();

        // The single worker survived the panic.
        let count = Arc::new(AtomicUsize::new(0));
        pool.push(counting_job(&count));
        pool.wait_work();
        assert_eq!(count.load(Ordering::Relaxed), 1);
    }
}
