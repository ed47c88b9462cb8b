// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use core::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use crate::errors::NcError;

/// Session lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
    /// Post-construction, pre-hello.
    Starting = 0,
    /// Hello completed, transport healthy.
    Running = 1,
    /// Terminal; the termination reason is set.
    Invalid = 2,
    /// Caller-initiated graceful close in progress.
    Closing = 3,
}

/// Why a session reached `Invalid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TermReason {
    None = 0,
    Closed = 1,
    Killed = 2,
    Dropped = 3,
    Timeout = 4,
    Other = 5,
}

impl fmt::Display for TermReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TermReason::None => "none",
            TermReason::Closed => "closed",
            TermReason::Killed => "killed",
            TermReason::Dropped => "dropped",
            TermReason::Timeout => "timeout",
            TermReason::Other => "other",
        })
    }
}

/// Shared status + termination-reason cell.
///
/// Another thread may invalidate a session at any time; in-flight I/O loops
/// observe the change on their next iteration through [`StatusCell::check_io`].
#[derive(Debug)]
pub struct StatusCell {
    status: AtomicU8,
    reason: AtomicU8,
}

impl StatusCell {
    pub fn new(status: Status) -> Self {
        Self {
            status: AtomicU8::new(status as u8),
            reason: AtomicU8::new(TermReason::None as u8),
        }
    }

    pub fn status(&self) -> Status {
        match self.status.load(Ordering::SeqCst) {
            0 => Status::Starting,
            1 => Status::Running,
            2 => Status::Invalid,
            _ => Status::Closing,
        }
    }

    pub fn reason(&self) -> TermReason {
        match self.reason.load(Ordering::SeqCst) {
            0 => TermReason::None,
            1 => TermReason::Closed,
            2 => TermReason::Killed,
            3 => TermReason::Dropped,
            4 => TermReason::Timeout,
            _ => TermReason::Other,
        }
    }

    pub(crate) fn set_status(&self, status: Status) {
        self.status.store(status as u8, Ordering::SeqCst);
    }

    /// Transitions to `Invalid` and records the reason. The first recorded
    /// reason wins; later invalidations keep it.
    pub(crate) fn invalidate(&self, reason: TermReason) {
        let _ = self.reason.compare_exchange(
            TermReason::None as u8,
            reason as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
        self.status.store(Status::Invalid as u8, Ordering::SeqCst);
    }

    /// Whether read/write operations are currently legal.
    pub fn io_legal(&self) -> bool {
        matches!(self.status(), Status::Starting | Status::Running)
    }

    pub fn check_io(&self) -> Result<(), NcError> {
        if self.io_legal() {
            Ok(())
        } else {
            Err(NcError::Invalidated)
        }
    }
}
