//! In-memory shared application state.
//!
//! The store lives for the process lifetime and resets to defaults on every
//! restart; only the audit log (`crate::audit`) is persistent. Callers share
//! it as `Arc<tokio::sync::Mutex<StateStore>>` and hold the lock across
//! `apply` so the read-modify-write of one update request cannot interleave
//! with another.

use serde::{Deserialize, Serialize};

pub const DEFAULT_MESSAGE: &str = "initial";

/// Value-copy of the application state at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StateSnapshot {
    pub counter: i64,
    pub message: String,
}

impl Default for StateSnapshot {
    fn default() -> Self {
        Self {
            counter: 0,
            message: DEFAULT_MESSAGE.to_string(),
        }
    }
}

#[derive(Debug, Default)]
pub struct StateStore {
    current: StateSnapshot,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current snapshot. No side effects.
    pub fn read(&self) -> StateSnapshot {
        self.current.clone()
    }

    /// Replace each field that is `Some`; `None` leaves the field untouched.
    /// Returns the snapshots from before and after the update.
    pub fn apply(
        &mut self,
        counter: Option<i64>,
        message: Option<String>,
    ) -> (StateSnapshot, StateSnapshot) {
        let old = self.current.clone();
        if let Some(counter) = counter {
            self.current.counter = counter;
        }
        if let Some(message) = message {
            self.current.message = message;
        }
        (old, self.current.clone())
    }
}
