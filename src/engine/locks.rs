//! Per-record critical sections.
//!
//! Keyed by file name, which is the one part of a record's path that
//! survives moves between state folders. Holding a guard serializes every
//! read-modify-write on that record across the watch worker, the poller and
//! manual actions; different records never contend.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, RawMutex};

#[derive(Debug, Default)]
pub struct RecordLocks {
    slots: DashMap<String, Arc<Mutex<()>>>,
}

/// Guard for one record. The slot stays allocated while any guard is alive.
pub struct RecordGuard {
    _guard: ArcMutexGuard<RawMutex, ()>,
}

impl RecordLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until the critical section for `file_name` is ours.
    pub fn lock(&self, file_name: &str) -> RecordGuard {
        let slot = self
            .slots
            .entry(file_name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        RecordGuard {
            _guard: slot.lock_arc(),
        }
    }

    /// Drop slots nobody holds. Called between full passes to bound memory.
    pub fn prune(&self) {
        // A live guard owns a clone of the slot's Arc.
        self.slots.retain(|_, slot| Arc::strong_count(slot) > 1);
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_same_key_is_exclusive() {
        let locks = Arc::new(RecordLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let locks = Arc::clone(&locks);
                let inside = Arc::clone(&inside);
                let max_seen = Arc::clone(&max_seen);
                thread::spawn(move || {
                    let _g = locks.lock("m1.json");
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    max_seen.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(2));
                    inside.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();
        for h in handles {
            h.join().expect("join");
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_prune_keeps_held_slots() {
        let locks = RecordLocks::new();
        let held = locks.lock("a.json");
        drop(locks.lock("b.json"));
        locks.prune();
        assert_eq!(locks.len(), 1);
        drop(held);
        locks.prune();
        assert!(locks.is_empty());
    }
}
