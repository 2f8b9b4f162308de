use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

/// Cooperative cancellation flag plus a progress indicator.
///
/// Shared by reference between the caller (usually a UI thread) and the
/// pipeline. All fields are atomics so either side may touch it at any time.
#[derive(Debug, Default)]
pub struct ProgressHandle {
    cancelled: AtomicBool,
    minimum: AtomicI32,
    maximum: AtomicI32,
    value: AtomicI32,
}

impl ProgressHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Resets the indicator to `minimum` with the given range.
    pub fn set_range(&self, minimum: i32, maximum: i32) {
        self.minimum.store(minimum, Ordering::SeqCst);
        self.maximum.store(maximum, Ordering::SeqCst);
        self.value.store(minimum, Ordering::SeqCst);
    }

    pub fn increment_by(&self, delta: i32) {
        self.value.fetch_add(delta, Ordering::SeqCst);
    }

    pub fn minimum(&self) -> i32 {
        self.minimum.load(Ordering::SeqCst)
    }

    pub fn maximum(&self) -> i32 {
        self.maximum.load(Ordering::SeqCst)
    }

    pub fn value(&self) -> i32 {
        self.value.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_range() {
        let p = ProgressHandle::new();
        p.set_range(0, 3);
        p.increment_by(1);
        p.increment_by(1);
        assert_eq!((p.minimum(), p.maximum(), p.value()), (0, 3, 2));
        assert!(!p.is_cancelled());
        p.cancel();
        assert!(p.is_cancelled());
    }
}
