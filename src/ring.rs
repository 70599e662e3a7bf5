use crate::error::PoolError;

/// Fixed-capacity FIFO storage backed by a single preallocated slot array.
///
/// `count` disambiguates empty from full when `head == tail`.
pub(crate) struct RingBuffer<T> {
  slots: Vec<Option<T>>,
  head: usize,
  tail: usize,
  count: usize,
}

impl<T> RingBuffer<T> {
  /// Reserves all slots up front. Fails with `ResourceInitFailure` if the
  /// allocation cannot be satisfied.
  pub(crate) fn with_capacity(capacity: usize) -> Result<Self, PoolError> {
    if capacity == 0 {
      return Err(PoolError::invalid_configuration("ring buffer capacity must be non-zero"));
    }
    let mut slots = Vec::new();
    slots.try_reserve_exact(capacity).map_err(|e| {
      PoolError::ResourceInitFailure(format!("could not reserve {} ring buffer slots: {}", capacity, e))
    })?;
    slots.resize_with(capacity, || None);
    Ok(Self {
      slots,
      head: 0,
      tail: 0,
      count: 0,
    })
  }

  /// Appends at `tail`, handing the item back if the buffer is full.
  pub(crate) fn push(&mut self, item: T) -> Result<(), T> {
    if self.is_full() {
      return Err(item);
    }
    self.slots[self.tail] = Some(item);
    self.tail = (self.tail + 1) % self.slots.len();
    self.count += 1;
    Ok(())
  }

  pub(crate) fn pop(&mut self) -> Option<T> {
    if self.is_empty() {
      return None;
    }
    let item = self.slots[self.head].take();
    self.head = (self.head + 1) % self.slots.len();
    self.count -= 1;
    item
  }

  pub(crate) fn len(&self) -> usize {
    self.count
  }

  pub(crate) fn capacity(&self) -> usize {
    self.slots.len()
  }

  pub(crate) fn is_empty(&self) -> bool {
    self.count == 0
  }

  pub(crate) fn is_full(&self) -> bool {
    self.count == self.slots.len()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_zero_capacity_is_rejected() {
    assert!(matches!(
      RingBuffer::<u32>::with_capacity(0),
      Err(PoolError::InvalidConfiguration { .. })
    ));
  }

  #[test]
  fn test_full_buffer_returns_item() {
    let mut ring = RingBuffer::with_capacity(2).unwrap();
    assert!(ring.push(1).is_ok());
    assert!(ring.push(2).is_ok());
    assert!(ring.is_full());
    assert_eq!(ring.push(3), Err(3));
    assert_eq!(ring.len(), 2);
    assert_eq!(ring.head, ring.tail);
  }

  #[test]
  fn test_fifo_order_across_wraparound() {
    let mut ring = RingBuffer::with_capacity(3).unwrap();
    let mut expected = Vec::new();
    let mut drained = Vec::new();
    // Interleave pushes and pops so head and tail wrap several times.
    for round in 0..5 {
      ring.push(round * 10).unwrap();
      ring.push(round * 10 + 1).unwrap();
      expected.push(round * 10);
      expected.push(round * 10 + 1);
      drained.push(ring.pop().unwrap());
      drained.push(ring.pop().unwrap());
      assert!(ring.head < ring.capacity());
      assert!(ring.tail < ring.capacity());
    }
    assert_eq!(drained, expected);
    assert!(ring.is_empty());
    assert_eq!(ring.head, ring.tail);
    assert_eq!(ring.pop(), None);
  }

  #[test]
  fn test_space_is_reusable_after_full() {
    let mut ring = RingBuffer::with_capacity(1).unwrap();
    ring.push("a").unwrap();
    assert_eq!(ring.push("b"), Err("b"));
    assert_eq!(ring.pop(), Some("a"));
    ring.push("b").unwrap();
    assert_eq!(ring.pop(), Some("b"));
  }
}
