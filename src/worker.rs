use crate::completion::CompletionRecord;
use crate::manager::PoolShared;

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, info, info_span, trace};

/// Per-thread lifecycle: `Starting → Running → Draining → Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerState {
  /// Thread created, not yet in its loop.
  Starting,
  /// Dequeuing and executing tasks.
  Running,
  /// Stop requested; finishing what is still queued.
  Draining,
  /// Loop exited. Terminal.
  Stopped,
}

/// Records the terminal transition even if the loop itself unwinds.
struct ExitGuard<'a> {
  shared: &'a PoolShared,
  worker: usize,
}

impl Drop for ExitGuard<'_> {
  fn drop(&mut self) {
    self.shared.queue.worker_exited(self.worker);
  }
}

pub(crate) fn run_worker_loop(shared: Arc<PoolShared>, worker: usize) {
  let _span = info_span!("ring_pool_worker", pool_name = %*shared.name, worker).entered();
  let _exit = ExitGuard { shared: &shared, worker };
  shared.queue.mark_running(worker);
  info!(pool_name = %*shared.name, worker, "Worker loop started.");

  while let Some(task) = shared.queue.next_task() {
    let task_id = task.task_id;
    shared.in_flight.insert(worker, task_id);
    debug!(pool_name = %*shared.name, worker, %task_id, "Dequeued task. Executing.");

    let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| task.run()));
    shared.in_flight.remove(&worker);
    match outcome {
      Ok(()) => trace!(pool_name = %*shared.name, worker, %task_id, "Task executed."),
      Err(_panic_payload) => {
        error!(pool_name = %*shared.name, worker, %task_id, "Task panicked during execution.");
      }
    }

    if shared.completions.report(CompletionRecord::finished(task_id)) {
      trace!(pool_name = %*shared.name, worker, %task_id, "Completion record reported.");
    }
  }

  info!(pool_name = %*shared.name, worker, "Worker loop stopped.");
}
