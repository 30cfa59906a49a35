//! Single-assignment cell that any number of threads can block on.
//!
//! The first [`Slot::set`] wins; later writes are ignored. Waiters re-check
//! the cell after every wakeup and keep waiting against the original deadline,
//! so a spurious wakeup never surfaces as an early return or an error.

use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::config::Timeout;

/// The deadline passed before the slot was filled.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("slot not filled within {waited:?}")]
pub struct SlotTimeout {
    pub waited: Duration,
}

pub struct Slot<T> {
    value: Mutex<Option<T>>,
    filled: Condvar,
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Slot<T> {
    pub fn new() -> Self {
        Self {
            value: Mutex::new(None),
            filled: Condvar::new(),
        }
    }

    /// Stores `value` if the slot is still empty and wakes every waiter.
    ///
    /// Returns `false`, leaving the slot unchanged, when it was already set.
    pub fn set(&self, value: T) -> bool {
        let mut guard = self.value.lock();
        if guard.is_some() {
            return false;
        }
        *guard = Some(value);
        drop(guard);
        self.filled.notify_all();
        true
    }

    pub fn is_set(&self) -> bool {
        self.value.lock().is_some()
    }
}

impl<T: Clone> Slot<T> {
    /// Returns the value without blocking.
    pub fn try_get(&self) -> Option<T> {
        self.value.lock().as_ref().cloned()
    }

    /// Blocks until the slot is filled or `timeout` elapses.
    pub fn get(&self, timeout: Timeout) -> Result<T, SlotTimeout> {
        let mut guard = self.value.lock();
        let deadline = match timeout {
            Timeout::Infinite => None,
            // A deadline too far out to represent is as good as no deadline.
            Timeout::After(waited) => Instant::now().checked_add(waited).map(|at| (at, waited)),
        };

        loop {
            if let Some(value) = guard.as_ref() {
                return Ok(value.clone());
            }
            match deadline {
                None => self.filled.wait(&mut guard),
                Some((at, waited)) => {
                    if self.filled.wait_until(&mut guard, at).timed_out() {
                        return guard.as_ref().cloned().ok_or(SlotTimeout { waited });
                    }
                }
            }
        }
    }
}
