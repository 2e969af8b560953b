//! Fixed-capacity sample ring buffer
//!
//! FIFO of samples with overwrite-on-full, optional parallel timestamp
//! storage, and snapshot/restore in oldest-to-newest order. Owned
//! exclusively by a sliding-window filter; never shared.

use crate::error::{PfError, PfResult};
use crate::sample::{Sample, TimestampMs};

/// Fixed-capacity FIFO of samples
///
/// Capacity is fixed at construction (at least 1). `head` is the next write
/// slot, `tail` the oldest element.
#[derive(Debug, Clone)]
pub struct RingBuffer {
    buffer: Vec<Sample>,
    timestamps: Option<Vec<TimestampMs>>,
    head: usize,
    tail: usize,
    count: usize,
}

impl RingBuffer {
    /// Create a buffer holding up to `capacity` samples
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buffer: vec![0.0; capacity],
            timestamps: None,
            head: 0,
            tail: 0,
            count: 0,
        }
    }

    /// Create a buffer that also records one timestamp per sample
    pub fn with_timestamps(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            timestamps: Some(vec![0.0; capacity]),
            ..Self::new(capacity)
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.count == self.buffer.len()
    }

    /// Store a sample, or return `false` when full
    pub fn push(&mut self, value: Sample) -> bool {
        if self.is_full() {
            return false;
        }
        self.store(value, 0.0);
        true
    }

    /// Store a sample, dropping the oldest one first when full
    pub fn push_overwrite(&mut self, value: Sample) {
        self.push_overwrite_at(0.0, value);
    }

    /// Store a timestamped sample, dropping the oldest one first when full
    pub fn push_overwrite_at(&mut self, timestamp: TimestampMs, value: Sample) {
        if self.is_full() {
            self.tail = (self.tail + 1) % self.buffer.len();
            self.count -= 1;
        }
        self.store(value, timestamp);
    }

    fn store(&mut self, value: Sample, timestamp: TimestampMs) {
        self.buffer[self.head] = value;
        if let Some(ts) = self.timestamps.as_mut() {
            ts[self.head] = timestamp;
        }
        self.head = (self.head + 1) % self.buffer.len();
        self.count += 1;
    }

    /// Remove and return the oldest sample
    pub fn pop(&mut self) -> Option<Sample> {
        if self.is_empty() {
            return None;
        }
        let value = self.buffer[self.tail];
        self.tail = (self.tail + 1) % self.buffer.len();
        self.count -= 1;
        Some(value)
    }

    /// Oldest sample without removal
    pub fn peek(&self) -> PfResult<Sample> {
        if self.is_empty() {
            return Err(PfError::BufferUnderrun);
        }
        Ok(self.buffer[self.tail])
    }

    /// Timestamp of the oldest sample, when timestamps are recorded
    pub fn peek_timestamp(&self) -> PfResult<TimestampMs> {
        if self.is_empty() {
            return Err(PfError::BufferUnderrun);
        }
        self.timestamps
            .as_ref()
            .map(|ts| ts[self.tail])
            .ok_or_else(|| PfError::Runtime("ring buffer has no timestamp channel".to_string()))
    }

    pub fn clear(&mut self) {
        self.head = 0;
        self.tail = 0;
        self.count = 0;
    }

    /// Iterate oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = Sample> + '_ {
        (0..self.count).map(move |i| self.buffer[(self.tail + i) % self.buffer.len()])
    }

    /// Snapshot in oldest-to-newest order, independent of head/tail positions
    pub fn to_vec(&self) -> Vec<Sample> {
        self.iter().collect()
    }

    /// Timestamp snapshot in oldest-to-newest order, when recorded
    pub fn timestamps_to_vec(&self) -> Option<Vec<TimestampMs>> {
        let ts = self.timestamps.as_ref()?;
        Some(
            (0..self.count)
                .map(|i| ts[(self.tail + i) % self.buffer.len()])
                .collect(),
        )
    }

    /// Restore from an oldest-to-newest snapshot
    ///
    /// When the snapshot exceeds the capacity only the newest samples are
    /// kept, matching overwrite-on-full push semantics.
    pub fn load(&mut self, values: &[Sample]) {
        self.clear();
        for &value in values {
            self.push_overwrite(value);
        }
    }

    /// Restore a timestamped snapshot
    pub fn load_with_timestamps(&mut self, values: &[Sample], timestamps: &[TimestampMs]) {
        self.clear();
        if self.timestamps.is_none() {
            self.timestamps = Some(vec![0.0; self.buffer.len()]);
        }
        for (&value, &t) in values.iter().zip(timestamps.iter()) {
            self.push_overwrite_at(t, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_pop_fifo_order() {
        let mut buf = RingBuffer::new(3);
        assert!(buf.push(1.0));
        assert!(buf.push(2.0));
        assert!(buf.push(3.0));
        assert!(!buf.push(4.0));

        assert_eq!(buf.pop(), Some(1.0));
        assert_eq!(buf.pop(), Some(2.0));
        assert_eq!(buf.pop(), Some(3.0));
        assert_eq!(buf.pop(), None);
    }

    #[test]
    fn test_push_overwrite_drops_oldest() {
        let mut buf = RingBuffer::new(3);
        for v in 1..=5 {
            buf.push_overwrite(v as Sample);
        }
        assert_eq!(buf.len(), 3);
        assert_eq!(buf.to_vec(), vec![3.0, 4.0, 5.0]);
        assert_eq!(buf.peek().unwrap(), 3.0);
    }

    #[test]
    fn test_peek_empty_is_underrun() {
        let buf = RingBuffer::new(2);
        assert!(matches!(buf.peek(), Err(PfError::BufferUnderrun)));
    }

    #[test]
    fn test_snapshot_restore_round_trip() {
        // Wrap the buffer a few times so head/tail are mid-array, then
        // check the snapshot is still oldest-to-newest.
        let mut buf = RingBuffer::new(4);
        for v in 0..11 {
            buf.push_overwrite(v as Sample);
        }
        let snap = buf.to_vec();
        assert_eq!(snap, vec![7.0, 8.0, 9.0, 10.0]);

        let mut restored = RingBuffer::new(4);
        restored.load(&snap);
        assert_eq!(restored.to_vec(), snap);
        assert_eq!(restored.len(), 4);
    }

    #[test]
    fn test_partial_snapshot_restore() {
        let mut buf = RingBuffer::new(8);
        buf.load(&[1.0, 2.0, 3.0]);
        assert_eq!(buf.len(), 3);
        assert_eq!(buf.to_vec(), vec![1.0, 2.0, 3.0]);
        assert!(!buf.is_full());
    }

    #[test]
    fn test_oversized_snapshot_keeps_newest() {
        let mut buf = RingBuffer::new(2);
        buf.load(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(buf.to_vec(), vec![3.0, 4.0]);
    }

    #[test]
    fn test_timestamp_channel() {
        let mut buf = RingBuffer::with_timestamps(2);
        buf.push_overwrite_at(0.0, 10.0);
        buf.push_overwrite_at(5.0, 20.0);
        buf.push_overwrite_at(10.0, 30.0);

        assert_eq!(buf.peek_timestamp().unwrap(), 5.0);
        assert_eq!(buf.timestamps_to_vec(), Some(vec![5.0, 10.0]));
        assert_eq!(buf.to_vec(), vec![20.0, 30.0]);
    }

    #[test]
    fn test_no_timestamp_channel_is_runtime_error() {
        let mut buf = RingBuffer::new(2);
        buf.push_overwrite(1.0);
        assert!(matches!(buf.peek_timestamp(), Err(PfError::Runtime(_))));
    }

    #[test]
    fn test_zero_capacity_clamps_to_one() {
        let mut buf = RingBuffer::new(0);
        assert_eq!(buf.capacity(), 1);
        buf.push_overwrite(1.0);
        buf.push_overwrite(2.0);
        assert_eq!(buf.to_vec(), vec![2.0]);
    }
}
