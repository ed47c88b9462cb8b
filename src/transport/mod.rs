//! Uniform byte-level transport over raw descriptor pairs, SSH channels
//! and TLS streams.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

/// Raw file-descriptor pair transport.
pub mod fd;
/// SSH channel transport and its collaborator seam.
pub mod ssh;
/// TLS stream transport and its collaborator seam.
pub mod tls;

/// Per-message read budget.
pub mod ticker;

pub(crate) mod sigmask;

use std::{os::fd::RawFd, thread, time::Duration};

use enum_dispatch::enum_dispatch;

use crate::{
    cfg::enums::TransportKind,
    errors::NcError,
    session::state::StatusCell,
    transport::{fd::FdPair, sigmask::SigGuard, ssh::SshLink, tls::TlsLink},
};

/// Outcome of one non-blocking read attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// `n` bytes landed in the destination buffer.
    Data(usize),
    /// No data available right now; not EOF. Retry subject to the deadline.
    Empty,
    /// Orderly EOF / channel-eof.
    Closed,
}

/// Outcome of waiting for inbound data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Data is waiting for this session.
    Readable,
    /// The wait ran out without data.
    Timeout,
    /// Data arrived for a sibling channel multiplexed on the same SSH
    /// transport.
    Pending,
    /// The SSH layer received a non-data message (e.g. a global request).
    SshMessage,
    /// The peer opened another channel on the shared SSH transport.
    NewChannel,
}

/// Byte-level contract every transport variant satisfies.
///
/// Single non-blocking attempts only; the retry/budget loops live one level
/// up so all three transports share them.
#[enum_dispatch]
pub trait Wire {
    /// One read attempt. `Empty` means "nothing now", never EOF.
    fn try_read(&mut self, dst: &mut [u8]) -> Result<ReadOutcome, NcError>;

    /// One write attempt; may accept fewer bytes than offered. Returning 0
    /// means the transport cannot take data right now.
    fn try_write(&mut self, src: &[u8]) -> Result<usize, NcError>;

    /// Waits for inbound data with all signals blocked for the duration.
    fn poll_wait(&mut self, timeout: Duration) -> Result<PollOutcome, NcError>;

    /// Cheap liveness check: zero-timeout poll, connected iff no HUP/ERR.
    fn is_connected(&self) -> bool;

    /// Descriptor a multi-session poller can multiplex on.
    fn poll_fd(&self) -> RawFd;

    fn kind(&self) -> TransportKind;
}

/// Transport handle of a session; the selector is immutable for the
/// session lifetime.
#[enum_dispatch(Wire)]
#[derive(Debug)]
pub enum Link {
    Fd(FdPair),
    Ssh(SshLink),
    Tls(TlsLink),
}

impl Link {
    /// Maps one read attempt into "bytes or zero", turning EOF into
    /// `PeerClosed`.
    pub(crate) fn read_some(&mut self, dst: &mut [u8]) -> Result<usize, NcError> {
        match self.try_read(dst)? {
            ReadOutcome::Data(n) => Ok(n),
            ReadOutcome::Empty => Ok(0),
            ReadOutcome::Closed => Err(NcError::PeerClosed),
        }
    }

    /// Writes the whole buffer or fails terminally; partial writes never
    /// escape this function.
    ///
    /// A dead peer is detected up front so no broken-pipe signal can be
    /// raised; a transport that refuses bytes spins on the ticker step and
    /// re-checks the session status each turn.
    pub(crate) fn write_all(
        &mut self,
        src: &[u8],
        status: &StatusCell,
        step: Duration,
    ) -> Result<(), NcError> {
        if !self.is_connected() {
            return Err(NcError::PeerClosed);
        }
        let mut off = 0;
        while off < src.len() {
            status.check_io()?;
            let n = self.try_write(&src[off..])?;
            if n == 0 {
                thread::sleep(step);
                continue;
            }
            off += n;
        }
        Ok(())
    }
}

/// Readability wait on a raw descriptor, shared by the FD and TLS variants.
pub(crate) fn poll_readable_fd(
    fd: RawFd,
    timeout: Duration,
) -> Result<PollOutcome, NcError> {
    let _mask = SigGuard::block_all();
    let mut pfd = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };
    let millis = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;
    let ret = unsafe { libc::poll(&mut pfd, 1, millis) };
    if ret < 0 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EINTR) {
            // Signals are blocked for the wait; a stray EINTR is treated as
            // an empty wakeup.
            return Ok(PollOutcome::Timeout);
        }
        return Err(NcError::TransportBroken(err.to_string()));
    }
    if ret == 0 {
        return Ok(PollOutcome::Timeout);
    }
    if pfd.revents & (libc::POLLERR | libc::POLLNVAL) != 0 {
        return Err(NcError::TransportBroken(format!(
            "poll error condition (revents=0x{:x})",
            pfd.revents
        )));
    }
    if pfd.revents & libc::POLLIN != 0 {
        return Ok(PollOutcome::Readable);
    }
    if pfd.revents & libc::POLLHUP != 0 {
        return Err(NcError::PeerClosed);
    }
    Ok(PollOutcome::Timeout)
}

/// Zero-timeout liveness probe on a raw descriptor.
pub(crate) fn fd_is_connected(fd: RawFd) -> bool {
    let mut pfd = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };
    let ret = unsafe { libc::poll(&mut pfd, 1, 0) };
    if ret < 0 {
        return false;
    }
    pfd.revents & (libc::POLLHUP | libc::POLLERR | libc::POLLNVAL) == 0
}
