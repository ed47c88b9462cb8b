// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{
    thread,
    time::{Duration, Instant},
};

use crate::errors::NcError;

/// Per-message read budget.
///
/// Captured once when the read of a logical message starts and passed
/// immutably down the stack; every partial read that came up empty burns one
/// ticker step against it. The three transports have no common blocking-read
/// primitive, so this is what bounds the worst-case wait for one message.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
    step: Duration,
}

impl Deadline {
    pub fn start(budget: Duration, step: Duration) -> Self {
        Self {
            at: Instant::now() + budget,
            step,
        }
    }

    pub fn expired(&self) -> bool {
        Instant::now() >= self.at
    }

    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    pub fn step(&self) -> Duration {
        self.step
    }

    /// Burns one step of the budget after an empty read.
    ///
    /// Fails with `ReadTimeout` once the budget is gone; otherwise sleeps a
    /// single step (never past the deadline itself).
    pub fn tick(&self) -> Result<(), NcError> {
        let left = self.remaining();
        if left.is_zero() {
            return Err(NcError::ReadTimeout);
        }
        thread::sleep(self.step.min(left));
        Ok(())
    }
}
