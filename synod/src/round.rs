//! Shared round number allocation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::types::RoundNumber;

/// Dispenses strictly increasing, globally unique round numbers.
///
/// One allocator is created per cluster and a handle is injected into every
/// proposer, so there is no hidden process-wide counter. Cloning is cheap
/// and every clone draws from the same sequence.
///
/// The first allocated round is 1.
#[derive(Debug, Clone)]
pub struct RoundAllocator {
    next: Arc<AtomicU64>,
}

impl RoundAllocator {
    /// Create a new allocator whose first handed-out round is 1.
    pub fn new() -> Self {
        Self {
            next: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Allocate the next round number.
    ///
    /// Uniqueness and monotonicity only need the atomicity of `fetch_add`;
    /// no cross-variable ordering is involved.
    pub fn allocate(&self) -> RoundNumber {
        RoundNumber::new(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for RoundAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::thread;

    use super::RoundAllocator;

    #[test]
    fn test_allocation_starts_at_one_and_increases() {
        let allocator = RoundAllocator::new();
        assert_eq!(allocator.allocate().get(), 1);
        assert_eq!(allocator.allocate().get(), 2);
        assert_eq!(allocator.allocate().get(), 3);
    }

    #[test]
    fn test_clones_share_the_sequence() {
        let a = RoundAllocator::new();
        let b = a.clone();
        assert_eq!(a.allocate().get(), 1);
        assert_eq!(b.allocate().get(), 2);
        assert_eq!(a.allocate().get(), 3);
    }

    #[test]
    fn test_concurrent_allocations_are_unique() {
        const WORKERS: usize = 4;
        const PER_WORKER: usize = 250;

        let allocator = RoundAllocator::new();
        let handles: Vec<_> = (0..WORKERS)
            .map(|_| {
                let allocator = allocator.clone();
                thread::spawn(move || {
                    (0..PER_WORKER)
                        .map(|_| allocator.allocate().get())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for n in handle.join().expect("worker panicked") {
                assert!(seen.insert(n), "round {n} allocated twice");
            }
        }
        assert_eq!(seen.len(), WORKERS * PER_WORKER);
        assert_eq!(seen.iter().max(), Some(&(WORKERS as u64 * PER_WORKER as u64)));
    }
}
