//! Task identifier allocation.

use crate::task::TaskId;

use parking_lot::Mutex;

lazy_static::lazy_static! {
  static ref GLOBAL_TASK_ID_ALLOCATOR: IdAllocator = IdAllocator::new();
}

/// Issues monotonically increasing task identifiers under a dedicated lock.
///
/// Identifiers wrap from `u32::MAX` back to `0`. Long-running callers must
/// tolerate eventual reuse.
#[derive(Debug)]
pub struct IdAllocator {
  last_issued: Mutex<u32>,
}

impl IdAllocator {
  /// Creates an allocator whose first identifier is `1`.
  pub fn new() -> Self {
    Self::starting_at(1)
  }

  /// Creates an allocator whose first identifier is `first`.
  pub fn starting_at(first: TaskId) -> Self {
    Self {
      last_issued: Mutex::new(first.wrapping_sub(1)),
    }
  }

  pub fn allocate(&self) -> TaskId {
    let mut last_issued = self.last_issued.lock();
    *last_issued = last_issued.wrapping_add(1);
    *last_issued
  }

  /// Returns the identifier the next `allocate` call will issue.
  pub fn peek(&self) -> TaskId {
    self.last_issued.lock().wrapping_add(1)
  }
}

impl Default for IdAllocator {
  fn default() -> Self {
    Self::new()
  }
}

/// Allocates an identifier from the process-wide allocator shared by every pool.
pub fn allocate_id() -> TaskId {
  GLOBAL_TASK_ID_ALLOCATOR.allocate()
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::HashSet;
  use std::sync::Arc;
  use std::thread;

  #[test]
  fn test_first_id_is_one_and_ids_increase() {
    let allocator = IdAllocator::new();
    assert_eq!(allocator.peek(), 1);
    assert_eq!(allocator.allocate(), 1);
    assert_eq!(allocator.allocate(), 2);
    assert_eq!(allocator.allocate(), 3);
    assert_eq!(allocator.peek(), 4);
  }

  #[test]
  fn test_wraps_at_u32_boundary() {
    let allocator = IdAllocator::starting_at(u32::MAX - 1);
    assert_eq!(allocator.allocate(), u32::MAX - 1);
    assert_eq!(allocator.allocate(), u32::MAX);
    assert_eq!(allocator.allocate(), 0);
    assert_eq!(allocator.allocate(), 1);
  }

  #[test]
  fn test_concurrent_allocation_yields_distinct_ids() {
    let allocator = Arc::new(IdAllocator::new());
    let threads: u32 = 8;
    let per_thread: u32 = 1000;

    let handles: Vec<_> = (0..threads)
      .map(|_| {
        let allocator = allocator.clone();
        thread::spawn(move || (0..per_thread).map(|_| allocator.allocate()).collect::<Vec<_>>())
      })
      .collect();

    let mut seen = HashSet::new();
    for handle in handles {
      for id in handle.join().unwrap() {
        assert!(seen.insert(id), "id {} issued twice", id);
      }
    }
    assert_eq!(seen.len(), (threads * per_thread) as usize);
    assert_eq!(allocator.peek(), threads * per_thread + 1);
  }

  #[test]
  fn test_global_allocator_is_strictly_increasing_per_thread() {
    let a = allocate_id();
    let b = allocate_id();
    assert!(b > a || b == 0, "global ids should increase: {} then {}", a, b);
  }
}
