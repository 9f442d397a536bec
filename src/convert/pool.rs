use crate::convert::entry::{ConversionResult, ConversionTask, OffsetMapper, convert_entry};
use crate::types::errors::Error;
use log::{debug, info};
use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

type Reply = Result<ConversionResult, Error>;

/// Upper bound on worker threads when sizing from the CPU count
pub const MAX_DEFAULT_WORKERS: usize = 8;
/// Lower bound on worker threads when sizing from the CPU count
pub const MIN_DEFAULT_WORKERS: usize = 2;

/// Half the CPUs, kept within [`MIN_DEFAULT_WORKERS`, `MAX_DEFAULT_WORKERS`]
pub fn default_worker_count() -> usize {
    (num_cpus::get() / 2).clamp(MIN_DEFAULT_WORKERS, MAX_DEFAULT_WORKERS)
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Worker threads to start. `None` sizes from the CPU count, `Some(0)`
    /// runs every task on the submitting thread.
    pub workers: Option<usize>,
}

impl PoolConfig {
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    pub fn single_threaded() -> Self {
        Self::default().with_workers(0)
    }

    pub fn resolved_workers(&self) -> usize {
        self.workers.unwrap_or_else(default_worker_count)
    }
}

struct Job {
    task: ConversionTask,
    mapper: Arc<dyn OffsetMapper>,
    reply: Sender<Reply>,
}

#[derive(Default)]
struct Queue {
    jobs: VecDeque<Job>,
    terminated: bool,
}

#[derive(Default)]
struct Shared {
    queue: Mutex<Queue>,
    ready: Condvar,
    active: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Receives the single reply for one submitted task
pub struct TaskHandle {
    url: String,
    receiver: Receiver<Reply>,
}

impl TaskHandle {
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Block until the task finishes or the pool gives up on it
    pub fn wait(self) -> Result<ConversionResult, Error> {
        self.receiver
            .recv()
            .unwrap_or(Err(Error::WorkerCrashed(self.url)))
    }
}

/// Runs per-script conversions on a fixed set of worker threads.
///
/// Tasks are dispatched in submission order; completion order is arbitrary.
/// With zero workers every task runs synchronously inside [`WorkerPool::submit`].
pub struct WorkerPool {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    size: usize,
}

impl WorkerPool {
    pub fn new(config: PoolConfig) -> Result<Self, Error> {
        let size = config.resolved_workers();
        let shared = Arc::new(Shared::default());

        let mut workers = Vec::with_capacity(size);
        for index in 0..size {
            let shared = Arc::clone(&shared);
            let handle = thread::Builder::new()
                .name(format!("covfuse-worker-{index}"))
                .spawn(move || worker_loop(shared))?;
            workers.push(handle);
        }

        if size == 0 {
            debug!("Worker pool running single-threaded");
        } else {
            debug!("Worker pool started with {} workers", size);
        }

        Ok(Self {
            shared,
            workers: Mutex::new(workers),
            size,
        })
    }

    pub fn single_threaded() -> Self {
        Self {
            shared: Arc::new(Shared::default()),
            workers: Mutex::new(Vec::new()),
            size: 0,
        }
    }

    /// Queue a task. Fails straight away once the pool has been terminated.
    pub fn submit(
        &self,
        task: ConversionTask,
        mapper: Arc<dyn OffsetMapper>,
    ) -> Result<TaskHandle, Error> {
        let (reply, receiver) = mpsc::channel();
        let handle = TaskHandle {
            url: task.url.clone(),
            receiver,
        };

        let mut queue = lock(&self.shared.queue);
        if queue.terminated {
            return Err(Error::PoolTerminated);
        }

        if self.size == 0 {
            drop(queue);
            let _ = reply.send(run_job(&task, mapper.as_ref()));
            return Ok(handle);
        }

        queue.jobs.push_back(Job {
            task,
            mapper,
            reply,
        });
        drop(queue);
        self.shared.ready.notify_one();
        Ok(handle)
    }

    /// Submit every task, then wait for all of them. Results keep submission order.
    pub fn run_all(
        &self,
        tasks: Vec<ConversionTask>,
        mapper: Arc<dyn OffsetMapper>,
    ) -> Vec<Result<ConversionResult, Error>> {
        let handles: Vec<Result<TaskHandle, Error>> = tasks
            .into_iter()
            .map(|task| self.submit(task, Arc::clone(&mapper)))
            .collect();

        handles
            .into_iter()
            .map(|handle| handle.and_then(TaskHandle::wait))
            .collect()
    }

    /// Stop accepting work, reject everything still queued, and join the workers.
    /// Tasks already running finish normally.
    pub fn terminate(&self) {
        let discarded: Vec<Job> = {
            let mut queue = lock(&self.shared.queue);
            queue.terminated = true;
            queue.jobs.drain(..).collect()
        };
        self.shared.ready.notify_all();

        if !discarded.is_empty() {
            info!("Rejecting {} queued conversions on shutdown", discarded.len());
        }
        for job in discarded {
            let _ = job.reply.send(Err(Error::PoolTerminated));
        }

        let workers: Vec<JoinHandle<()>> = lock(&self.workers).drain(..).collect();
        for worker in workers {
            if worker.join().is_err() {
                debug!("Worker thread exited with a panic");
            }
        }
    }

    pub fn pool_size(&self) -> usize {
        self.size
    }

    pub fn is_single_threaded(&self) -> bool {
        self.size == 0
    }

    pub fn is_terminated(&self) -> bool {
        lock(&self.shared.queue).terminated
    }

    /// Workers currently inside a conversion
    pub fn active_workers(&self) -> usize {
        self.shared.active.load(Ordering::SeqCst)
    }

    /// Tasks waiting for a free worker
    pub fn queued_tasks(&self) -> usize {
        lock(&self.shared.queue).jobs.len()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.terminate();
    }
}

fn worker_loop(shared: Arc<Shared>) {
    loop {
        let job = {
            let mut queue = lock(&shared.queue);
            loop {
                if queue.terminated {
                    return;
                }
                if let Some(job) = queue.jobs.pop_front() {
                    break job;
                }
                queue = shared
                    .ready
                    .wait(queue)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        };

        shared.active.fetch_add(1, Ordering::SeqCst);
        let reply = run_job(&job.task, job.mapper.as_ref());
        shared.active.fetch_sub(1, Ordering::SeqCst);

        // The submitter may have dropped its handle
        let _ = job.reply.send(reply);
    }
}

// A panicking mapper fails only its own task
fn run_job(task: &ConversionTask, mapper: &dyn OffsetMapper) -> Reply {
    catch_unwind(AssertUnwindSafe(|| convert_entry(task, mapper)))
        .map_err(|_| Error::WorkerCrashed(task.url.clone()))
}

static DEFAULT_POOL: Mutex<Option<Arc<WorkerPool>>> = Mutex::new(None);

/// Process-wide pool, created on first use with [`PoolConfig::default`]
pub fn default_pool() -> Result<Arc<WorkerPool>, Error> {
    let mut slot = lock(&DEFAULT_POOL);
    if let Some(pool) = slot.as_ref().filter(|pool| !pool.is_terminated()) {
        return Ok(Arc::clone(pool));
    }
    let pool = Arc::new(WorkerPool::new(PoolConfig::default())?);
    *slot = Some(Arc::clone(&pool));
    Ok(pool)
}

/// Terminate and forget the process-wide pool
pub fn reset_default_pool() {
    let pool = lock(&DEFAULT_POOL).take();
    if let Some(pool) = pool {
        pool.terminate();
    }
}
