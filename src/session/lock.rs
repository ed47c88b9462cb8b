// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{
    sync::{Condvar, Mutex, PoisonError},
    time::{Duration, Instant},
};

use crate::errors::NcError;

/// Transport-access lock with a bounded acquisition time.
///
/// Readers and writers hold it for the full duration of one message, which
/// serializes I/O per session. Sessions multiplexed over one SSH transport
/// share a single instance through an `Arc`, so siblings exclude each other
/// as well. Acquisition that outlives its budget reports `Busy` instead of
/// deadlocking.
#[derive(Debug, Default)]
pub struct TimedMutex {
    locked: Mutex<bool>,
    cv: Condvar,
}

/// RAII turn on a [`TimedMutex`]; releasing wakes the next waiter.
#[derive(Debug)]
pub struct IoGuard<'a> {
    owner: &'a TimedMutex,
}

impl TimedMutex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the lock, waiting at most `timeout`.
    pub fn acquire(&self, timeout: Duration) -> Result<IoGuard<'_>, NcError> {
        let deadline = Instant::now() + timeout;
        let mut locked = self
            .locked
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        while *locked {
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                return Err(NcError::Busy);
            }
            let (guard, wait) = self
                .cv
                .wait_timeout(locked, left)
                .unwrap_or_else(PoisonError::into_inner);
            locked = guard;
            if wait.timed_out() && *locked {
                return Err(NcError::Busy);
            }
        }
        *locked = true;
        Ok(IoGuard { owner: self })
    }

    /// Single acquisition attempt without waiting.
    pub fn try_acquire(&self) -> Result<IoGuard<'_>, NcError> {
        let mut locked = self
            .locked
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if *locked {
            return Err(NcError::Busy);
        }
        *locked = true;
        Ok(IoGuard { owner: self })
    }
}

impl Drop for IoGuard<'_> {
    fn drop(&mut self) {
        let mut locked = self
            .owner
            .locked
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *locked = false;
        self.owner.cv.notify_one();
    }
}
