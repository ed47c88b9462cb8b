// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{
    os::fd::{AsRawFd, OwnedFd, RawFd},
    time::Duration,
};

use crate::{
    cfg::enums::TransportKind,
    errors::NcError,
    transport::{PollOutcome, ReadOutcome, Wire, fd_is_connected, poll_readable_fd},
};

/// Transport over a pre-established pair of file descriptors.
///
/// Input and output may be two ends of distinct pipes (the classic
/// ssh-subsystem stdin/stdout arrangement) or two duplicates of one socket.
/// Both descriptors are switched to non-blocking mode on construction; a
/// zero-byte `read` on a non-blocking descriptor is genuine EOF, `EAGAIN`
/// is "nothing yet".
#[derive(Debug)]
pub struct FdPair {
    input: OwnedFd,
    output: OwnedFd,
}

impl FdPair {
    pub fn new(input: OwnedFd, output: OwnedFd) -> Result<Self, NcError> {
        set_nonblocking(input.as_raw_fd())?;
        if output.as_raw_fd() != input.as_raw_fd() {
            set_nonblocking(output.as_raw_fd())?;
        }
        Ok(Self { input, output })
    }

    pub fn input_fd(&self) -> RawFd {
        self.input.as_raw_fd()
    }

    pub fn output_fd(&self) -> RawFd {
        self.output.as_raw_fd()
    }
}

fn set_nonblocking(fd: RawFd) -> Result<(), NcError> {
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFL);
        if flags < 0 {
            return Err(NcError::TransportBroken(
                std::io::Error::last_os_error().to_string(),
            ));
        }
        if libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) < 0 {
            return Err(NcError::TransportBroken(
                std::io::Error::last_os_error().to_string(),
            ));
        }
    }
    Ok(())
}

impl Wire for FdPair {
    fn try_read(&mut self, dst: &mut [u8]) -> Result<ReadOutcome, NcError> {
        let n = unsafe {
            libc::read(
                self.input.as_raw_fd(),
                dst.as_mut_ptr() as *mut libc::c_void,
                dst.len(),
            )
        };
        if n > 0 {
            return Ok(ReadOutcome::Data(n as usize));
        }
        if n == 0 {
            return Ok(ReadOutcome::Closed);
        }
        let err = std::io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::EAGAIN) | Some(libc::EINTR) => Ok(ReadOutcome::Empty),
            #[allow(unreachable_patterns)]
            Some(libc::EWOULDBLOCK) => Ok(ReadOutcome::Empty),
            _ => Err(NcError::TransportBroken(err.to_string())),
        }
    }

    fn try_write(&mut self, src: &[u8]) -> Result<usize, NcError> {
        let n = unsafe {
            libc::write(
                self.output.as_raw_fd(),
                src.as_ptr() as *const libc::c_void,
                src.len(),
            )
        };
        if n >= 0 {
            return Ok(n as usize);
        }
        let err = std::io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::EAGAIN) | Some(libc::EINTR) => Ok(0),
            Some(libc::EPIPE) => Err(NcError::PeerClosed),
            _ => Err(NcError::TransportBroken(err.to_string())),
        }
    }

    fn poll_wait(&mut self, timeout: Duration) -> Result<PollOutcome, NcError> {
        poll_readable_fd(self.input.as_raw_fd(), timeout)
    }

    fn is_connected(&self) -> bool {
        fd_is_connected(self.output.as_raw_fd())
    }

    fn poll_fd(&self) -> RawFd {
        self.input.as_raw_fd()
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Fd
    }
}
