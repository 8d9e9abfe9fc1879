//! Cooperative cancellation shared between the orchestrator and the cache.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A cheaply clonable cancellation flag with an optional deadline.
///
/// Work checks the token at safe points (before starting a dependency and
/// before publishing to the cache). Once the flag is set or the deadline has
/// passed, the token stays cancelled.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancellationToken {
    /// Create a token that is only cancelled explicitly.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a token that cancels itself after `timeout`.
    pub fn with_timeout(timeout: Duration) -> Self {
        CancellationToken {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: Instant::now().checked_add(timeout),
        }
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Cancel this token when the process receives Ctrl-C (SIGINT, or
    /// SIGTERM too on unix).
    ///
    /// Only one handler can be installed per process.
    pub fn cancel_on_interrupt(&self) -> Result<(), ctrlc::Error> {
        let token = self.clone();
        ctrlc::set_handler(move || {
            tracing::warn!("interrupted, stopping after in-flight work");
            token.cancel();
        })
    }

    /// Check whether cancellation was requested or the deadline passed.
    pub fn is_cancelled(&self) -> bool {
        if self.cancelled.load(Ordering::SeqCst) {
            return true;
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => {
                self.cancelled.store(true, Ordering::SeqCst);
                true
            }
            _ => false,
        }
    }
}
