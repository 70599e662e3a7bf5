use crate::completion::{CompletionBuffer, CompletionRecord};
use crate::config::PoolConfig;
use crate::error::PoolError;
use crate::task::{TaskDescriptor, TaskId};
use crate::task_queue::TaskQueue;
use crate::worker::{run_worker_loop, WorkerState};

use std::fmt;
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, error, info, trace, warn};

/// State shared between the manager and its worker threads.
pub(crate) struct PoolShared {
  pub(crate) name: Arc<String>,
  pub(crate) queue: TaskQueue,
  pub(crate) completions: CompletionBuffer,
  /// Tasks currently executing, keyed by worker index. Callers may reuse
  /// ids, so the id cannot be the key.
  pub(crate) in_flight: DashMap<usize, TaskId>,
}

impl PoolShared {
  fn new(config: &PoolConfig) -> Result<Self, PoolError> {
    Ok(Self {
      name: Arc::new(config.name.clone()),
      queue: TaskQueue::new(config.queue_capacity, config.num_threads)?,
      completions: CompletionBuffer::new(config.effective_completion_capacity())?,
      in_flight: DashMap::new(),
    })
  }
}

type WorkerBody = Box<dyn FnOnce() + Send + 'static>;

/// A fixed-size pool of OS worker threads fed by a bounded task queue.
///
/// Completion records are collected in a separate bounded buffer and handed
/// out by [`poll`](Self::poll). Records arrive in the order tasks *finish*,
/// which across several workers bears no relation to submission order.
pub struct ThreadPoolManager {
  shared: Arc<PoolShared>,
  num_threads: usize,
  workers: Mutex<Vec<JoinHandle<()>>>,
  worker_thread_ids: Vec<ThreadId>,
}

impl fmt::Debug for ThreadPoolManager {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ThreadPoolManager")
      .field("name", &*self.shared.name)
      .field("num_threads", &self.num_threads)
      .field("queue", &self.shared.queue)
      .field("completions", &self.shared.completions)
      .finish_non_exhaustive()
  }
}

impl ThreadPoolManager {
  /// Creates a pool with `num_threads` workers and a task queue holding up to
  /// `queue_capacity` pending tasks.
  ///
  /// # Errors
  /// `InvalidConfiguration` if either value is outside its limit,
  /// `ResourceInitFailure` if buffer storage cannot be reserved, and
  /// `ThreadCreationFailure` if a worker cannot be spawned. No partially
  /// started pool is ever returned.
  pub fn create(num_threads: usize, queue_capacity: usize) -> Result<Self, PoolError> {
    Self::with_config(PoolConfig::new(num_threads, queue_capacity))
  }

  pub fn with_config(config: PoolConfig) -> Result<Self, PoolError> {
    config.validate()?;
    let shared = Arc::new(PoolShared::new(&config)?);
    let workers = spawn_workers(&shared, &config, |_, builder, body| builder.spawn(body))?;
    let worker_thread_ids = workers.iter().map(|handle| handle.thread().id()).collect();

    info!(
      pool_name = %*shared.name,
      num_threads = config.num_threads,
      queue_capacity = config.queue_capacity,
      completion_capacity = shared.completions.capacity(),
      "Thread pool created."
    );

    Ok(Self {
      shared,
      num_threads: config.num_threads,
      workers: Mutex::new(workers),
      worker_thread_ids,
    })
  }

  pub fn name(&self) -> &str {
    &self.shared.name
  }

  pub fn num_threads(&self) -> usize {
    self.num_threads
  }

  pub fn queue_capacity(&self) -> usize {
    self.shared.queue.capacity()
  }

  pub fn completion_capacity(&self) -> usize {
    self.shared.completions.capacity()
  }

  /// Returns the current number of tasks in the pending queue.
  pub fn queued_task_count(&self) -> usize {
    self.shared.queue.len()
  }

  /// Returns the number of tasks a worker is executing right now.
  pub fn active_task_count(&self) -> usize {
    self.shared.in_flight.len()
  }

  /// Workers that have not yet exited their loop.
  pub fn live_worker_count(&self) -> usize {
    self.shared.queue.live_workers()
  }

  pub fn worker_states(&self) -> Vec<WorkerState> {
    self.shared.queue.worker_states()
  }

  /// Records waiting to be polled.
  pub fn pending_completion_count(&self) -> usize {
    self.shared.completions.len()
  }

  /// Records lost because the completion buffer was full while the pool was
  /// shutting down.
  pub fn dropped_completion_count(&self) -> u64 {
    self.shared.completions.dropped()
  }

  pub fn is_stopped(&self) -> bool {
    self.shared.queue.is_stopping()
  }

  /// Submits `callable(argument)` for execution under `task_id`.
  ///
  /// Never blocks. The caller owns retry policy when the queue is full.
  ///
  /// # Errors
  /// `QueueFull` if the queue is at capacity, `AlreadyStopped` once `destroy`
  /// has begun. In both cases the callable and its argument are dropped.
  pub fn submit<F, A>(&self, task_id: TaskId, callable: F, argument: A) -> Result<(), PoolError>
  where
    F: FnOnce(A) + Send + 'static,
    A: Send + 'static,
  {
    self.enqueue(TaskDescriptor::new(task_id, callable, argument))
  }

  /// Submits a closure that already owns its inputs.
  pub fn execute<F>(&self, task_id: TaskId, task: F) -> Result<(), PoolError>
  where
    F: FnOnce() + Send + 'static,
  {
    self.enqueue(TaskDescriptor::from_closure(task_id, task))
  }

  fn enqueue(&self, task: TaskDescriptor) -> Result<(), PoolError> {
    let task_id = task.task_id;
    match self.shared.queue.push(task) {
      Ok(()) => {
        debug!(pool_name = %*self.shared.name, %task_id, "Task queued.");
        Ok(())
      }
      Err(e) => {
        warn!(pool_name = %*self.shared.name, %task_id, error = %e, "Submit: task rejected.");
        Err(e)
      }
    }
  }

  /// Removes and returns up to `max` completion records without blocking.
  ///
  /// Each record is delivered to exactly one caller. An empty result is not
  /// an error.
  ///
  /// Once [`destroy`](Self::destroy) has begun, a worker facing a full
  /// completion buffer waits only while polls keep freeing slots. If no poll
  /// makes progress for a short grace period the record is dropped and
  /// counted in [`dropped_completion_count`](Self::dropped_completion_count).
  pub fn poll(&self, max: usize) -> Vec<CompletionRecord> {
    let records = self.shared.completions.poll(max);
    trace!(pool_name = %*self.shared.name, max, retrieved = records.len(), "Polled completions.");
    records
  }

  /// Like [`poll`](Self::poll), but waits up to `timeout` for a record to
  /// arrive when none is pending.
  pub fn poll_timeout(&self, max: usize, timeout: Duration) -> Vec<CompletionRecord> {
    let records = self.shared.completions.poll_timeout(max, timeout);
    trace!(pool_name = %*self.shared.name, max, retrieved = records.len(), "Polled completions with timeout.");
    records
  }

  /// Stops intake, lets workers finish every queued and running task, and
  /// joins all worker threads. Completion records produced during the drain
  /// stay pollable afterwards.
  ///
  /// # Errors
  /// `DestroyFromWorker` when called on one of this pool's workers (joining
  /// would deadlock), `AlreadyStopped` on a second call, and
  /// `WorkerJoinFailure` if a worker thread panicked outside a task body.
  /// The pool is fully stopped in the last case too.
  pub fn destroy(&self) -> Result<(), PoolError> {
    if self.is_worker_thread() {
      warn!(pool_name = %*self.shared.name, "Destroy: called from a worker thread of this pool. Refusing.");
      return Err(PoolError::DestroyFromWorker);
    }
    if !self.shared.queue.request_stop() {
      info!(pool_name = %*self.shared.name, "Destroy: pool already stopping or stopped.");
      return Err(PoolError::AlreadyStopped);
    }

    info!(
      pool_name = %*self.shared.name,
      queued = self.shared.queue.len(),
      "Initiating pool destroy. Workers will drain queued tasks."
    );
    self.shared.completions.close();

    let handles = std::mem::take(&mut *self.workers.lock());
    let joined = join_workers(&self.shared.name, handles);

    info!(
      pool_name = %*self.shared.name,
      pending_completions = self.shared.completions.len(),
      dropped_completions = self.shared.completions.dropped(),
      "Pool destroy completed."
    );
    joined
  }

  fn is_worker_thread(&self) -> bool {
    self.worker_thread_ids.contains(&thread::current().id())
  }
}

/// Spawns one thread per configured worker. On the first failure the
/// already-running workers are stopped and joined before returning.
fn spawn_workers<S>(shared: &Arc<PoolShared>, config: &PoolConfig, mut spawn: S) -> Result<Vec<JoinHandle<()>>, PoolError>
where
  S: FnMut(usize, thread::Builder, WorkerBody) -> io::Result<JoinHandle<()>>,
{
  let mut workers = Vec::with_capacity(config.num_threads);
  for index in 0..config.num_threads {
    shared.queue.register_worker(index);
    let worker_shared = shared.clone();
    let builder = thread::Builder::new().name(config.worker_thread_name(index));
    match spawn(index, builder, Box::new(move || run_worker_loop(worker_shared, index))) {
      Ok(handle) => workers.push(handle),
      Err(e) => {
        shared.queue.worker_exited(index);
        error!(
          pool_name = %*shared.name,
          worker = index,
          "Failed to spawn worker thread: {}. Stopping {} already-started worker(s).",
          e,
          workers.len()
        );
        shared.queue.request_stop();
        shared.completions.close();
        // The spawn failure is the error the caller needs; join failures are logged.
        let _ = join_workers(&shared.name, workers);
        return Err(PoolError::ThreadCreationFailure(e.to_string()));
      }
    }
  }
  Ok(workers)
}

/// Joins every handle, even after a failure, and reports how many panicked.
fn join_workers(pool_name: &str, handles: Vec<JoinHandle<()>>) -> Result<(), PoolError> {
  let mut panicked = 0;
  for handle in handles {
    let thread_name = handle.thread().name().unwrap_or("<unnamed>").to_string();
    match handle.join() {
      Ok(()) => debug!(%pool_name, worker_thread = %thread_name, "Worker thread joined."),
      Err(_) => {
        panicked += 1;
        error!(%pool_name, worker_thread = %thread_name, "Worker thread panicked outside a task body.");
      }
    }
  }
  if panicked > 0 {
    return Err(PoolError::WorkerJoinFailure { panicked });
  }
  Ok(())
}

impl Drop for ThreadPoolManager {
  fn drop(&mut self) {
    if !self.shared.queue.request_stop() {
      trace!(pool_name = %*self.shared.name, "Drop: pool already destroyed. Nothing to do.");
      return;
    }

    info!(
      pool_name = %*self.shared.name,
      "ThreadPoolManager dropped without destroy. Initiating implicit shutdown."
    );
    self.shared.completions.close();
    let handles = std::mem::take(self.workers.get_mut());

    if self.is_worker_thread() {
      // The last handle went away inside a task body. Joining here would wait
      // on ourselves, so the workers are detached and exit once drained.
      debug!(pool_name = %*self.shared.name, "Drop: running on a worker thread. Detaching workers.");
      drop(handles);
    } else if let Err(e) = join_workers(&self.shared.name, handles) {
      warn!(pool_name = %*self.shared.name, error = %e, "Drop: implicit shutdown finished with errors.");
    }
  }
}
