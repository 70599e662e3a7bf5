use crate::error::PoolError;

/// Upper bound on worker threads per pool.
pub const MAX_THREADS: usize = 64;
/// Upper bound on task-queue and completion-buffer capacity.
pub const MAX_QUEUE: usize = 65536;

const DEFAULT_POOL_NAME: &str = "ring_pool";

/// Construction parameters for a `ThreadPoolManager`. Fixed for the pool's lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
  pub(crate) name: String,
  pub(crate) num_threads: usize,
  pub(crate) queue_capacity: usize,
  pub(crate) completion_capacity: Option<usize>,
  pub(crate) thread_name_prefix: Option<String>,
}

impl PoolConfig {
  pub fn new(num_threads: usize, queue_capacity: usize) -> Self {
    Self {
      name: DEFAULT_POOL_NAME.to_string(),
      num_threads,
      queue_capacity,
      completion_capacity: None,
      thread_name_prefix: None,
    }
  }

  /// Name used in log fields and, unless overridden, worker thread names.
  pub fn name(mut self, name: impl Into<String>) -> Self {
    self.name = name.into();
    self
  }

  /// Capacity of the completion buffer. Defaults to `queue_capacity + num_threads`.
  pub fn completion_capacity(mut self, capacity: usize) -> Self {
    self.completion_capacity = Some(capacity);
    self
  }

  /// Worker threads are named `"<prefix>-worker-<index>"`.
  pub fn thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
    self.thread_name_prefix = Some(prefix.into());
    self
  }

  pub fn num_threads(&self) -> usize {
    self.num_threads
  }

  pub fn queue_capacity(&self) -> usize {
    self.queue_capacity
  }

  pub(crate) fn effective_completion_capacity(&self) -> usize {
    self
      .completion_capacity
      .unwrap_or_else(|| self.queue_capacity.saturating_add(self.num_threads).min(MAX_QUEUE))
  }

  pub(crate) fn worker_thread_name(&self, index: usize) -> String {
    let prefix = self.thread_name_prefix.as_deref().unwrap_or(&self.name);
    format!("{}-worker-{}", prefix, index)
  }

  pub(crate) fn validate(&self) -> Result<(), PoolError> {
    if self.num_threads == 0 || self.num_threads > MAX_THREADS {
      return Err(PoolError::invalid_configuration(format!(
        "num_threads must be in 1..={}, got {}",
        MAX_THREADS, self.num_threads
      )));
    }
    if self.queue_capacity == 0 || self.queue_capacity > MAX_QUEUE {
      return Err(PoolError::invalid_configuration(format!(
        "queue_capacity must be in 1..={}, got {}",
        MAX_QUEUE, self.queue_capacity
      )));
    }
    let completion_capacity = self.effective_completion_capacity();
    if completion_capacity == 0 || completion_capacity > MAX_QUEUE {
      return Err(PoolError::invalid_configuration(format!(
        "completion_capacity must be in 1..={}, got {}",
        MAX_QUEUE, completion_capacity
      )));
    }
    // Thread names must not contain NUL bytes or spawning panics.
    if self.worker_thread_name(0).as_bytes().contains(&0) {
      return Err(PoolError::invalid_configuration("pool name and thread name prefix must not contain null bytes"));
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_limits_are_inclusive() {
    assert!(PoolConfig::new(1, 1).validate().is_ok());
    assert!(PoolConfig::new(MAX_THREADS, MAX_QUEUE).validate().is_ok());
  }

  #[test]
  fn test_out_of_range_values_are_rejected() {
    for config in [
      PoolConfig::new(0, 10),
      PoolConfig::new(MAX_THREADS + 1, 10),
      PoolConfig::new(1, 0),
      PoolConfig::new(1, MAX_QUEUE + 1),
      PoolConfig::new(1, 10).completion_capacity(0),
      PoolConfig::new(1, 10).completion_capacity(MAX_QUEUE + 1),
    ] {
      assert!(
        matches!(config.validate(), Err(PoolError::InvalidConfiguration { .. })),
        "expected {:?} to be rejected",
        config
      );
    }
  }

  #[test]
  fn test_default_completion_capacity_covers_queue_and_workers() {
    assert_eq!(PoolConfig::new(4, 64).effective_completion_capacity(), 68);
    assert_eq!(PoolConfig::new(4, MAX_QUEUE).effective_completion_capacity(), MAX_QUEUE);
    assert_eq!(PoolConfig::new(4, 64).completion_capacity(3).effective_completion_capacity(), 3);
  }

  #[test]
  fn test_worker_thread_names() {
    assert_eq!(PoolConfig::new(1, 1).worker_thread_name(0), "ring_pool-worker-0");
    assert_eq!(PoolConfig::new(1, 1).name("io").worker_thread_name(3), "io-worker-3");
    assert_eq!(
      PoolConfig::new(1, 1).name("io").thread_name_prefix("disk").worker_thread_name(1),
      "disk-worker-1"
    );
  }

  #[test]
  fn test_nul_in_name_is_rejected() {
    assert!(matches!(
      PoolConfig::new(1, 1).name("bad\0name").validate(),
      Err(PoolError::InvalidConfiguration { .. })
    ));
  }
}
