use std::sync::atomic::{AtomicU32, Ordering};

/// A strictly monotonically increasing request-id source, one per device
/// session, starting at 1. A retry allocates a fresh id rather than reusing
/// the poisoned one from the failed attempt.
#[derive(Debug, Default)]
pub struct IdAllocator(AtomicU32);

impl IdAllocator {
    #[must_use]
    pub fn new() -> Self {
        IdAllocator(AtomicU32::new(0))
    }

    /// Returns the next id in the sequence. Never returns the same value
    /// twice for the lifetime of this allocator.
    pub fn next(&self) -> u32 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }
}
