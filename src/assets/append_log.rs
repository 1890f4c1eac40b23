//! Fixed-capacity append-only log shared between a loader and the renderer

use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;

/// Append-only storage with lock-free reads
///
/// Capacity is reserved up front so element addresses never move. Appends
/// are serialized through a writer lock and publish the new length with
/// release ordering; readers load the length with acquire ordering and see
/// every element below it fully written. Appended elements are immutable.
#[derive(Debug)]
pub struct AppendLog<T> {
    slots: Box<[OnceLock<T>]>,
    len: AtomicUsize,
    reserved: AtomicUsize,
    writer: Mutex<()>,
}

impl<T> AppendLog<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| OnceLock::new()).collect(),
            len: AtomicUsize::new(0),
            reserved: AtomicUsize::new(0),
            writer: Mutex::new(()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of published elements
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Claim room for `count` more elements
    ///
    /// Returns `false` without claiming anything if the log cannot hold them
    /// alongside what was appended or claimed before.
    pub fn reserve(&self, count: usize) -> bool {
        let _guard = self.writer.lock();
        let len = self.len.load(Ordering::Relaxed);
        let reserved = self.reserved.load(Ordering::Relaxed).max(len);
        match reserved.checked_add(count) {
            Some(total) if total <= self.capacity() => {
                self.reserved.store(total, Ordering::Relaxed);
                true
            }
            _ => false,
        }
    }

    /// Append an element, returning its index
    ///
    /// Hands the element back when the log is full.
    pub fn push(&self, value: T) -> Result<usize, T> {
        let _guard = self.writer.lock();
        let index = self.len.load(Ordering::Relaxed);
        let Some(slot) = self.slots.get(index) else {
            return Err(value);
        };
        slot.set(value)?;
        self.len.store(index + 1, Ordering::Release);
        Ok(index)
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        if index < self.len() {
            self.slots[index].get()
        } else {
            None
        }
    }

    /// Iterate the elements published at the time of the call
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.iter_from(0)
    }

    /// Iterate published elements starting at `start`
    pub fn iter_from(&self, start: usize) -> impl Iterator<Item = &T> + '_ {
        let len = self.len();
        self.slots[start.min(len)..len]
            .iter()
            .filter_map(OnceLock::get)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_push_until_full() {
        let log = AppendLog::with_capacity(2);
        assert_eq!(log.push("a"), Ok(0));
        assert_eq!(log.push("b"), Ok(1));
        assert_eq!(log.push("c"), Err("c"));
        assert_eq!(log.iter().copied().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(log.get(2), None);
    }

    #[test]
    fn test_reserve_counts_previous_claims() {
        let log = AppendLog::<u32>::with_capacity(4);
        assert!(log.reserve(3));
        assert!(!log.reserve(2));
        assert!(log.reserve(1));
        assert!(!log.reserve(1));
    }

    #[test]
    fn test_reserve_after_unreserved_pushes() {
        let log = AppendLog::with_capacity(3);
        log.push(1).unwrap();
        log.push(2).unwrap();
        assert!(!log.reserve(2));
        assert!(log.reserve(1));
    }

    #[test]
    fn test_iter_from_snapshot() {
        let log = AppendLog::with_capacity(8);
        for i in 0..5 {
            log.push(i).unwrap();
        }
        assert_eq!(log.iter_from(3).copied().collect::<Vec<_>>(), vec![3, 4]);
        assert_eq!(log.iter_from(9).count(), 0);
    }

    #[test]
    fn test_reader_sees_complete_prefix_while_writer_appends() {
        const COUNT: usize = 10_000;
        let log = Arc::new(AppendLog::with_capacity(COUNT));

        let writer = {
            let log = log.clone();
            std::thread::spawn(move || {
                for i in 0..COUNT {
                    log.push(vec![i; 4]).unwrap();
                }
            })
        };

        let mut seen = 0;
        while seen < COUNT {
            let len = log.len();
            assert!(len >= seen);
            for (offset, entry) in log.iter_from(seen).enumerate() {
                assert_eq!(entry, &vec![seen + offset; 4]);
            }
            seen = len;
        }
        writer.join().unwrap();
        assert_eq!(log.len(), COUNT);
    }
}
