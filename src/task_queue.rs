use crate::error::PoolError;
use crate::ring::RingBuffer;
use crate::task::TaskDescriptor;
use crate::worker::WorkerState;

use parking_lot::{Condvar, Mutex};
use std::fmt;

/// Everything guarded by the queue lock. The stop flag and the live-worker
/// count live here so a worker never observes "empty" and "stopping" from
/// two different critical sections.
struct QueueState {
  ring: RingBuffer<TaskDescriptor>,
  stop_requested: bool,
  live_workers: usize,
  /// Workers are registered in index order; only the first `registered`
  /// entries of `worker_states` belong to spawned threads.
  registered: usize,
  worker_states: Vec<WorkerState>,
}

/// The bounded hand-off point between submitting threads and worker threads.
pub(crate) struct TaskQueue {
  state: Mutex<QueueState>,
  not_empty: Condvar,
}

impl fmt::Debug for TaskQueue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let state = self.state.lock();
    f.debug_struct("TaskQueue")
      .field("len", &state.ring.len())
      .field("capacity", &state.ring.capacity())
      .field("stop_requested", &state.stop_requested)
      .field("live_workers", &state.live_workers)
      .finish_non_exhaustive()
  }
}

impl TaskQueue {
  pub(crate) fn new(capacity: usize, num_workers: usize) -> Result<Self, PoolError> {
    let ring = RingBuffer::with_capacity(capacity)?;
    let mut worker_states = Vec::new();
    worker_states
      .try_reserve_exact(num_workers)
      .map_err(|e| PoolError::ResourceInitFailure(format!("could not reserve worker state table: {}", e)))?;
    worker_states.resize(num_workers, WorkerState::Starting);
    Ok(Self {
      state: Mutex::new(QueueState {
        ring,
        stop_requested: false,
        live_workers: 0,
        registered: 0,
        worker_states,
      }),
      not_empty: Condvar::new(),
    })
  }

  /// Enqueues without blocking and wakes one idle worker.
  pub(crate) fn push(&self, task: TaskDescriptor) -> Result<(), PoolError> {
    let mut state = self.state.lock();
    if state.stop_requested {
      return Err(PoolError::AlreadyStopped);
    }
    let capacity = state.ring.capacity();
    if state.ring.push(task).is_err() {
      return Err(PoolError::QueueFull { capacity });
    }
    self.not_empty.notify_one();
    Ok(())
  }

  /// Worker-side dequeue. Blocks while the queue is empty and no stop has
  /// been requested. Returns `None` once stopping and empty, which is the
  /// worker's signal to exit.
  pub(crate) fn next_task(&self) -> Option<TaskDescriptor> {
    let mut state = self.state.lock();
    loop {
      if let Some(task) = state.ring.pop() {
        return Some(task);
      }
      if state.stop_requested {
        return None;
      }
      self.not_empty.wait(&mut state);
    }
  }

  /// Counts a worker as live before its thread is spawned.
  pub(crate) fn register_worker(&self, worker: usize) {
    let mut state = self.state.lock();
    state.worker_states[worker] = WorkerState::Starting;
    state.live_workers += 1;
    state.registered = state.registered.max(worker + 1);
  }

  /// Called by the worker thread as it enters its loop.
  pub(crate) fn mark_running(&self, worker: usize) {
    let mut state = self.state.lock();
    if state.worker_states[worker] == WorkerState::Starting {
      state.worker_states[worker] = WorkerState::Running;
    }
  }

  /// Terminal transition. Also used to roll back a worker whose thread never started.
  pub(crate) fn worker_exited(&self, worker: usize) {
    let mut state = self.state.lock();
    if state.worker_states[worker] != WorkerState::Stopped {
      state.worker_states[worker] = WorkerState::Stopped;
      state.live_workers -= 1;
    }
  }

  /// Sets the stop flag, moves every live worker to `Draining` and wakes
  /// them all. Returns `false` if a stop had already been requested.
  pub(crate) fn request_stop(&self) -> bool {
    let mut state = self.state.lock();
    if state.stop_requested {
      return false;
    }
    state.stop_requested = true;
    let registered = state.registered;
    for worker_state in &mut state.worker_states[..registered] {
      if matches!(*worker_state, WorkerState::Starting | WorkerState::Running) {
        *worker_state = WorkerState::Draining;
      }
    }
    self.not_empty.notify_all();
    true
  }

  pub(crate) fn is_stopping(&self) -> bool {
    self.state.lock().stop_requested
  }

  pub(crate) fn len(&self) -> usize {
    self.state.lock().ring.len()
  }

  pub(crate) fn capacity(&self) -> usize {
    self.state.lock().ring.capacity()
  }

  pub(crate) fn live_workers(&self) -> usize {
    self.state.lock().live_workers
  }

  pub(crate) fn worker_states(&self) -> Vec<WorkerState> {
    self.state.lock().worker_states.clone()
  }
}
