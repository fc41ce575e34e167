use super::types::{ReplicationError, ReplicationResult};
use std::sync::atomic::{AtomicU64, Ordering};

/// Follow-session generation counter
///
/// Every effective change of the follow target advances the counter. A
/// session remembers the value it was started with and stops as soon as
/// the counter moves past it. Reads never take the server state lock.
#[derive(Debug, Default)]
pub struct GenerationGuard {
    value: AtomicU64,
}

impl GenerationGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> u64 {
        self.value.load(Ordering::Acquire)
    }

    /// Move to the next generation, returning it
    pub fn advance(&self) -> u64 {
        self.value.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.current() == generation
    }

    pub fn ensure_current(&self, generation: u64) -> ReplicationResult<()> {
        if self.is_current(generation) {
            Ok(())
        } else {
            Err(ReplicationError::NoLongerFollowing)
        }
    }
}
