use crate::error::EngineError;
use crate::types::HistoryEntry;

pub const DEFAULT_CAPACITY: usize = 30;

/// Fixed-capacity rolling window of history entries.
///
/// Backed by a ring: once full, each push overwrites the oldest slot.
/// Iteration always yields entries in chronological (insertion) order.
#[derive(Debug, Clone)]
pub struct HistoryBuffer {
    data: Vec<HistoryEntry>,
    head: usize,
    capacity: usize,
}

impl HistoryBuffer {
    pub fn new(capacity: usize) -> Result<Self, EngineError> {
        if capacity == 0 {
            return Err(EngineError::invalid("history capacity must be greater than zero"));
        }
        Ok(Self {
            data: Vec::with_capacity(capacity),
            head: 0,
            capacity,
        })
    }

    /// Returns a new buffer with `entry` appended, leaving `self` untouched
    pub fn append(&self, entry: HistoryEntry) -> Self {
        let mut next = self.clone();
        next.push(entry);
        next
    }

    pub fn push(&mut self, entry: HistoryEntry) {
        if self.data.len() < self.capacity {
            self.data.push(entry);
        } else {
            self.data[self.head] = entry;
            self.head = (self.head + 1) % self.capacity;
        }
    }

    pub fn latest(&self) -> Option<&HistoryEntry> {
        if self.data.is_empty() {
            return None;
        }
        let idx = if self.data.len() < self.capacity {
            self.data.len() - 1
        } else {
            (self.head + self.capacity - 1) % self.capacity
        };
        Some(&self.data[idx])
    }

    /// Get the most recent N entries in chronological order
    pub fn recent(&self, n: usize) -> Vec<&HistoryEntry> {
        let skip = self.data.len().saturating_sub(n);
        self.iter().skip(skip).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        // Until the ring wraps, head stays at 0 and this is plain order
        let (newer, older) = self.data.split_at(self.head);
        older.iter().chain(newer.iter())
    }

    pub fn to_vec(&self) -> Vec<HistoryEntry> {
        self.iter().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.data.clear();
        self.head = 0;
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn entry(value: i64) -> HistoryEntry {
        HistoryEntry {
            timestamp: Utc::now(),
            time_label: "00:00:00".into(),
            value,
            baseline: 100.0,
        }
    }

    fn values(buf: &HistoryBuffer) -> Vec<i64> {
        buf.iter().map(|e| e.value).collect()
    }

    #[test]
    fn zero_capacity_is_rejected() {
        assert!(matches!(
            HistoryBuffer::new(0),
            Err(EngineError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn evicts_oldest_first() {
        let mut buf = HistoryBuffer::new(3).unwrap();
        for v in [10, 20, 30, 40] {
            buf.push(entry(v));
        }
        assert_eq!(values(&buf), vec![20, 30, 40]);
        assert_eq!(buf.latest().map(|e| e.value), Some(40));
    }

    #[test]
    fn keeps_last_n_after_many_appends() {
        let n = DEFAULT_CAPACITY;
        for k in [0usize, 1, 7, n, 3 * n + 2] {
            let mut buf = HistoryBuffer::new(n).unwrap();
            let total = n + k;
            for v in 0..total {
                buf.push(entry(v as i64));
            }
            assert_eq!(buf.len(), n);
            let expected: Vec<i64> = (k..total).map(|v| v as i64).collect();
            assert_eq!(values(&buf), expected, "k = {}", k);
        }
    }

    #[test]
    fn append_is_pure() {
        let base = HistoryBuffer::new(2).unwrap().append(entry(1)).append(entry(2));
        let next = base.append(entry(3));
        assert_eq!(values(&base), vec![1, 2]);
        assert_eq!(values(&next), vec![2, 3]);
    }

    #[test]
    fn recent_returns_tail_in_order() {
        let mut buf = HistoryBuffer::new(4).unwrap();
        for v in 1..=6 {
            buf.push(entry(v));
        }
        let tail: Vec<i64> = buf.recent(2).iter().map(|e| e.value).collect();
        assert_eq!(tail, vec![5, 6]);
        assert_eq!(buf.recent(10).len(), 4);
    }

    #[test]
    fn clear_resets_ring() {
        let mut buf = HistoryBuffer::new(2).unwrap();
        for v in 1..=3 {
            buf.push(entry(v));
        }
        buf.clear();
        assert!(buf.is_empty());
        assert!(buf.latest().is_none());
        buf.push(entry(9));
        assert_eq!(values(&buf), vec![9]);
    }
}
