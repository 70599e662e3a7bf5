use crate::error::PoolError;
use crate::ring::RingBuffer;
use crate::task::TaskId;

use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::warn;

/// How long a worker keeps waiting on a full buffer during shutdown without
/// any poll progress before it gives up on the record.
const SHUTDOWN_REPORT_GRACE: Duration = Duration::from_millis(100);

/// Lifecycle of a task as seen by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompletionStatus {
  /// Submitted and waiting in the task queue.
  Pending,
  /// Being executed by a worker.
  Ongoing,
  /// The task body returned (or panicked) and its record was produced.
  Finished,
}

/// The artifact a worker produces once per executed task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CompletionRecord {
  pub task_id: TaskId,
  pub status: CompletionStatus,
}

impl CompletionRecord {
  pub(crate) fn finished(task_id: TaskId) -> Self {
    Self {
      task_id,
      status: CompletionStatus::Finished,
    }
  }
}

struct BufferState {
  ring: RingBuffer<CompletionRecord>,
  closing: bool,
  dropped: u64,
  /// Total records removed by polls. Lets a waiting reporter tell whether
  /// anyone is still consuming.
  polled: u64,
}

/// Bounded buffer of completion records with its own lock, independent of
/// the task queue.
pub(crate) struct CompletionBuffer {
  state: Mutex<BufferState>,
  not_empty: Condvar,
  not_full: Condvar,
}

impl fmt::Debug for CompletionBuffer {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let state = self.state.lock();
    f.debug_struct("CompletionBuffer")
      .field("len", &state.ring.len())
      .field("capacity", &state.ring.capacity())
      .field("closing", &state.closing)
      .field("dropped", &state.dropped)
      .finish()
  }
}

impl CompletionBuffer {
  pub(crate) fn new(capacity: usize) -> Result<Self, PoolError> {
    Ok(Self {
      state: Mutex::new(BufferState {
        ring: RingBuffer::with_capacity(capacity)?,
        closing: false,
        dropped: 0,
        polled: 0,
      }),
      not_empty: Condvar::new(),
      not_full: Condvar::new(),
    })
  }

  /// Appends a record, blocking while the buffer is full. Once the buffer is
  /// closing the wait is bounded: if no poll removes anything for
  /// `SHUTDOWN_REPORT_GRACE`, the record is dropped and counted. Returns
  /// `true` if the record was stored.
  pub(crate) fn report(&self, record: CompletionRecord) -> bool {
    let mut state = self.state.lock();
    let mut closing_deadline: Option<Instant> = None;
    while state.ring.is_full() {
      if !state.closing {
        self.not_full.wait(&mut state);
        continue;
      }
      let deadline = *closing_deadline.get_or_insert_with(|| Instant::now() + SHUTDOWN_REPORT_GRACE);
      let polled_before = state.polled;
      let timed_out = self.not_full.wait_until(&mut state, deadline).timed_out();
      if state.polled != polled_before {
        closing_deadline = None;
        continue;
      }
      if timed_out && state.ring.is_full() {
        state.dropped += 1;
        warn!(
          task_id = %record.task_id,
          capacity = state.ring.capacity(),
          "Completion buffer full during shutdown and nobody polled. Dropping completion record."
        );
        return false;
      }
    }
    // The loop guarantees a free slot.
    let _ = state.ring.push(record);
    self.not_empty.notify_one();
    true
  }

  /// Removes up to `max` records without blocking.
  pub(crate) fn poll(&self, max: usize) -> Vec<CompletionRecord> {
    let mut state = self.state.lock();
    self.drain_locked(&mut state, max)
  }

  /// Like `poll`, but waits up to `timeout` for the first record when the
  /// buffer is empty.
  pub(crate) fn poll_timeout(&self, max: usize, timeout: Duration) -> Vec<CompletionRecord> {
    if max == 0 {
      return Vec::new();
    }
    let deadline = Instant::now() + timeout;
    let mut state = self.state.lock();
    while state.ring.is_empty() {
      if self.not_empty.wait_until(&mut state, deadline).timed_out() {
        break;
      }
    }
    self.drain_locked(&mut state, max)
  }

  fn drain_locked(&self, state: &mut BufferState, max: usize) -> Vec<CompletionRecord> {
    let take = max.min(state.ring.len());
    let mut records = Vec::with_capacity(take);
    while records.len() < take {
      match state.ring.pop() {
        Some(record) => records.push(record),
        None => break,
      }
    }
    if !records.is_empty() {
      state.polled += records.len() as u64;
      self.not_full.notify_all();
    }
    records
  }

  /// Bounds how long `report` waits on a full buffer.
  pub(crate) fn close(&self) {
    let mut state = self.state.lock();
    state.closing = true;
    self.not_full.notify_all();
  }

  pub(crate) fn len(&self) -> usize {
    self.state.lock().ring.len()
  }

  pub(crate) fn capacity(&self) -> usize {
    self.state.lock().ring.capacity()
  }

  pub(crate) fn dropped(&self) -> u64 {
    self.state.lock().dropped
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::Arc;
  use std::thread;

  #[test]
  fn test_poll_respects_max_and_preserves_order() {
    let buffer = CompletionBuffer::new(8).unwrap();
    for id in 1..=5 {
      assert!(buffer.report(CompletionRecord::finished(id)));
    }

    assert!(buffer.poll(0).is_empty());
    let first: Vec<_> = buffer.poll(2).iter().map(|r| r.task_id).collect();
    assert_eq!(first, vec![1, 2]);
    let rest: Vec<_> = buffer.poll(100).iter().map(|r| r.task_id).collect();
    assert_eq!(rest, vec![3, 4, 5]);
    assert!(buffer.poll(10).is_empty(), "records are delivered exactly once");
  }

  #[test]
  fn test_report_blocks_until_poll_frees_space() {
    let buffer = Arc::new(CompletionBuffer::new(1).unwrap());
    assert!(buffer.report(CompletionRecord::finished(1)));

    let reporter = {
      let buffer = buffer.clone();
      thread::spawn(move || buffer.report(CompletionRecord::finished(2)))
    };

    thread::sleep(Duration::from_millis(50));
    assert!(!reporter.is_finished(), "report should wait for space");
    assert_eq!(buffer.poll(1), vec![CompletionRecord::finished(1)]);

    assert!(reporter.join().unwrap());
    assert_eq!(buffer.poll(1), vec![CompletionRecord::finished(2)]);
    assert_eq!(buffer.dropped(), 0);
  }

  #[test]
  fn test_close_releases_blocked_reporter_and_counts_drop() {
    let buffer = Arc::new(CompletionBuffer::new(1).unwrap());
    assert!(buffer.report(CompletionRecord::finished(1)));

    let reporter = {
      let buffer = buffer.clone();
      thread::spawn(move || buffer.report(CompletionRecord::finished(2)))
    };

    thread::sleep(Duration::from_millis(20));
    buffer.close();
    assert!(!reporter.join().unwrap());
    assert_eq!(buffer.dropped(), 1);
    assert_eq!(buffer.poll(10), vec![CompletionRecord::finished(1)]);

    // With room available, a closing buffer still stores records.
    assert!(buffer.report(CompletionRecord::finished(3)));
    assert_eq!(buffer.len(), 1);
  }

  #[test]
  fn test_closing_buffer_keeps_record_when_poller_is_active() {
    let buffer = Arc::new(CompletionBuffer::new(1).unwrap());
    assert!(buffer.report(CompletionRecord::finished(1)));
    buffer.close();

    let reporter = {
      let buffer = buffer.clone();
      thread::spawn(move || buffer.report(CompletionRecord::finished(2)))
    };

    thread::sleep(Duration::from_millis(20));
    assert_eq!(buffer.poll(1), vec![CompletionRecord::finished(1)]);
    assert!(reporter.join().unwrap(), "a poll within the grace period frees the slot");
    assert_eq!(buffer.poll(1), vec![CompletionRecord::finished(2)]);
    assert_eq!(buffer.dropped(), 0);
  }

  #[test]
  fn test_poll_timeout_waits_for_first_record() {
    let buffer = Arc::new(CompletionBuffer::new(4).unwrap());

    let started = Instant::now();
    assert!(buffer.poll_timeout(4, Duration::from_millis(30)).is_empty());
    assert!(started.elapsed() >= Duration::from_millis(30));

    let reporter = {
      let buffer = buffer.clone();
      thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        buffer.report(CompletionRecord::finished(9));
      })
    };
    let records = buffer.poll_timeout(4, Duration::from_secs(5));
    assert_eq!(records, vec![CompletionRecord::finished(9)]);
    reporter.join().unwrap();
  }
}
