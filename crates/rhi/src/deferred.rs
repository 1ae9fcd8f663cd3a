//! Deferred destruction of GPU objects.
//!
//! Objects still referenced by submitted work cannot be destroyed until that
//! work completes. [`DeferredDestroyQueue`] holds them tagged with the serial
//! of the last submission that may use them, and releases them once the
//! fence of that submission has been observed signaled.

use std::collections::VecDeque;

use tracing::debug;

type Release = Box<dyn FnOnce() + Send>;

struct Retirement {
    serial: u64,
    label: &'static str,
    release: Release,
}

/// Queue of retirements ordered by submission serial.
#[derive(Default)]
pub struct DeferredDestroyQueue {
    pending: VecDeque<Retirement>,
}

impl DeferredDestroyQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `release` once submission `serial` is known complete.
    pub fn retire_with<F>(&mut self, serial: u64, label: &'static str, release: F)
    where
        F: FnOnce() + Send + 'static,
    {
        debug_assert!(
            self.pending.back().is_none_or(|r| r.serial <= serial),
            "retirement serials must not decrease"
        );
        self.pending.push_back(Retirement {
            serial,
            label,
            release: Box::new(release),
        });
    }

    /// Drops `value` once submission `serial` is known complete.
    pub fn retire<T: Send + 'static>(&mut self, serial: u64, label: &'static str, value: T) {
        self.retire_with(serial, label, move || drop(value));
    }

    /// Releases everything retired at or before `completed_serial`.
    ///
    /// Returns how many entries were released.
    pub fn collect(&mut self, completed_serial: u64) -> usize {
        let mut released = 0;
        while self
            .pending
            .front()
            .is_some_and(|r| r.serial <= completed_serial)
        {
            if let Some(retirement) = self.pending.pop_front() {
                debug!(
                    "Releasing deferred {} (serial {})",
                    retirement.label, retirement.serial
                );
                (retirement.release)();
                released += 1;
            }
        }
        released
    }

    /// Releases everything. Only valid once the device is idle.
    pub fn flush(&mut self) -> usize {
        let count = self.pending.len();
        for retirement in self.pending.drain(..) {
            (retirement.release)();
        }
        if count > 0 {
            debug!("Flushed {} deferred release(s)", count);
        }
        count
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl Drop for DeferredDestroyQueue {
    fn drop(&mut self) {
        debug_assert!(
            self.pending.is_empty(),
            "deferred destroy queue dropped with {} pending release(s)",
            self.pending.len()
        );
        self.flush();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn counter() -> Arc<AtomicUsize> {
        Arc::new(AtomicUsize::new(0))
    }

    fn retire_counted(queue: &mut DeferredDestroyQueue, serial: u64, count: &Arc<AtomicUsize>) {
        let count = count.clone();
        queue.retire_with(serial, "test", move || {
            count.fetch_add(1, Ordering::SeqCst);
        });
    }

    #[test]
    fn test_released_only_after_serial_completes() {
        let released = counter();
        let mut queue = DeferredDestroyQueue::new();
        retire_counted(&mut queue, 3, &released);
        retire_counted(&mut queue, 5, &released);

        assert_eq!(queue.collect(2), 0);
        assert_eq!(released.load(Ordering::SeqCst), 0);

        assert_eq!(queue.collect(3), 1);
        assert_eq!(released.load(Ordering::SeqCst), 1);
        assert_eq!(queue.len(), 1);

        assert_eq!(queue.collect(10), 1);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_each_entry_released_once() {
        let released = counter();
        let mut queue = DeferredDestroyQueue::new();
        retire_counted(&mut queue, 1, &released);

        queue.collect(1);
        queue.collect(1);
        queue.flush();
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_flush_releases_everything() {
        let released = counter();
        let mut queue = DeferredDestroyQueue::new();
        for serial in 0..4 {
            retire_counted(&mut queue, serial, &released);
        }
        assert_eq!(queue.flush(), 4);
        assert_eq!(released.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_retire_drops_value() {
        let value = Arc::new(());
        let mut queue = DeferredDestroyQueue::new();
        queue.retire(0, "arc", value.clone());
        assert_eq!(Arc::strong_count(&value), 2);

        queue.collect(0);
        assert_eq!(Arc::strong_count(&value), 1);
    }

    #[test]
    fn test_send() {
        fn assert_send<T: Send>() {}
        assert_send::<DeferredDestroyQueue>();
    }
}
