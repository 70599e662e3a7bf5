use thiserror::Error;

/// Errors that can occur within the `ring_pool` thread pool.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
  #[error("Invalid pool configuration: {reason}")]
  InvalidConfiguration { reason: String },

  #[error("Failed to initialize pool resources: {0}")]
  ResourceInitFailure(String),

  #[error("Failed to spawn worker thread: {0}")]
  ThreadCreationFailure(String),

  #[error("Task queue is full (capacity {capacity}), submission rejected")]
  QueueFull { capacity: usize },

  #[error("Pool is stopping or already stopped")]
  AlreadyStopped,

  #[error("Pool cannot be destroyed from one of its own worker threads")]
  DestroyFromWorker,

  #[error("{panicked} worker thread(s) panicked outside a task body")]
  WorkerJoinFailure { panicked: usize },
}

impl PoolError {
  pub(crate) fn invalid_configuration(reason: impl Into<String>) -> Self {
    PoolError::InvalidConfiguration { reason: reason.into() }
  }
}
