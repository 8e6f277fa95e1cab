//! Re-entrancy guard
//!
//! A lock shared through `Rc`, held for the duration of one entry point by
//! an RAII [`LockGuard`]. The guard releases on drop, so error paths and
//! early returns unlock as well.

use std::cell::Cell;
use std::rc::Rc;

use lvpool_common::{PoolError, PoolResult};

#[derive(Debug, Clone, Default)]
pub struct ReentrancyLock {
    locked: Rc<Cell<bool>>,
}

impl ReentrancyLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lock, or fail with `Locked` if an operation is in progress
    pub fn acquire(&self) -> PoolResult<LockGuard> {
        if self.locked.get() {
            return Err(PoolError::Locked);
        }
        self.locked.set(true);
        Ok(LockGuard { locked: Rc::clone(&self.locked) })
    }

    pub fn is_locked(&self) -> bool {
        self.locked.get()
    }
}

/// Held while an operation runs
#[derive(Debug)]
pub struct LockGuard {
    locked: Rc<Cell<bool>>,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.locked.set(false);
    }
}
