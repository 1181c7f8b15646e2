use thiserror::Error;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Reasons a bounded or cancellable nonce search stops without a solution
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MiningError {
    #[error("Mining aborted after {attempts} attempts")]
    Aborted { attempts: u64 },

    #[error("Mining gave up after {attempts} attempts")]
    Exhausted { attempts: u64 },
}

/// Controls a nonce search from the outside.
///
/// Clones share the same cancel flag, so one clone can be moved to another
/// thread and used to stop a search running elsewhere.
#[derive(Debug, Clone, Default)]
pub struct MiningControl {
    cancelled: Arc<AtomicBool>,
    max_attempts: Option<u64>,
}

impl MiningControl {
    /// A control that never gives up on its own
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop after `max_attempts` nonce increments
    pub fn with_max_attempts(mut self, max_attempts: u64) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn max_attempts(&self) -> Option<u64> {
        self.max_attempts
    }

    /// Requests that any search using this control stop
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Checks whether the search may try another nonce
    pub(crate) fn check(&self, attempts: u64) -> Result<(), MiningError> {
        if self.is_cancelled() {
            return Err(MiningError::Aborted { attempts });
        }

        match self.max_attempts {
            Some(max) if attempts >= max => Err(MiningError::Exhausted { attempts }),
            _ => Ok(()),
        }
    }
}

/// True when the first `difficulty` characters of a hex hash are all `'0'`
pub fn meets_difficulty(hash: &str, difficulty: usize) -> bool {
    hash.len() >= difficulty && hash.bytes().take(difficulty).all(|b| b == b'0')
}
