//! Cooperative Cancellation
//!
//! A single cancellation primitive threaded through every long-running
//! operation: scans, query evaluation, pathfinding, and bulk deletes.
//!
//! ## Design
//!
//! - Atomic flag shared across threads, checked at iterator steps and
//!   frontier boundaries
//! - Optional deadline folded into the same token, so callers get one
//!   knob for both timeouts and explicit cancellation
//!
//! Checking is cooperative: an operation that never calls [`CancelToken::check`]
//! will run to completion regardless of the flag.

use crate::error::{Result, StoreError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Cancellation token shared between an operation and its caller
#[derive(Clone)]
pub struct CancelToken {
    /// Cancellation flag (shared across threads)
    cancelled: Arc<AtomicBool>,

    /// When the token was created
    started: Instant,

    /// Deadline relative to `started`, if any
    deadline: Option<Duration>,
}

impl CancelToken {
    /// Create a token with no deadline
    pub fn new() -> Self {
        CancelToken {
            cancelled: Arc::new(AtomicBool::new(false)),
            started: Instant::now(),
            deadline: None,
        }
    }

    /// Create a token that also fires after `timeout`
    pub fn with_timeout(timeout: Duration) -> Self {
        CancelToken {
            cancelled: Arc::new(AtomicBool::new(false)),
            started: Instant::now(),
            deadline: Some(timeout),
        }
    }

    /// Trip the token; all holders observe it on their next check
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Whether the token has been tripped (does not evaluate the deadline)
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Check for cancellation or deadline expiry
    ///
    /// Call this at every suspension point. Returns `Err(Cancelled)` once
    /// the token has fired; the operation should unwind promptly and
    /// discard partial work.
    pub fn check(&self) -> Result<()> {
        if self.cancelled.load(Ordering::Relaxed) {
            return Err(self.cancelled_error());
        }
        if let Some(deadline) = self.deadline {
            if self.started.elapsed() > deadline {
                self.cancelled.store(true, Ordering::Relaxed);
                return Err(self.cancelled_error());
            }
        }
        Ok(())
    }

    fn cancelled_error(&self) -> StoreError {
        StoreError::Cancelled {
            elapsed_ms: self.started.elapsed().as_millis() as u64,
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        CancelToken::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_token_passes() {
        let token = CancelToken::new();
        assert!(token.check().is_ok());
    }

    #[test]
    fn cancel_is_observed_by_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        token.cancel();
        assert!(clone.check().is_err());
        assert!(clone.is_cancelled());
    }

    #[test]
    fn deadline_fires() {
        let token = CancelToken::with_timeout(Duration::ZERO);
        std::thread::sleep(Duration::from_millis(5));
        assert!(token.check().is_err());
        // Once expired the flag latches
        assert!(token.is_cancelled());
    }
}
