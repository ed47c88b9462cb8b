// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{
    fmt,
    os::fd::RawFd,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use crate::{
    cfg::enums::TransportKind,
    errors::NcError,
    session::lock::TimedMutex,
    transport::{PollOutcome, ReadOutcome, Wire},
};

/// Outcome of one channel read as reported by the SSH collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelRead {
    Data(usize),
    /// The channel has no data buffered right now.
    Again,
    /// The peer sent channel-eof.
    Eof,
}

/// Outcome of the collaborator's channel-poll primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelPoll {
    /// Data is buffered for this channel.
    Data,
    /// The SSH transport is readable but the data belongs to a sibling
    /// channel.
    Pending,
    /// A non-data SSH message arrived (global request, keepalive, ...).
    SshMessage,
    /// The peer opened a new channel on this SSH transport.
    NewChannel,
    Timeout,
    Eof,
}

/// Established SSH channel handed over by the embedder.
///
/// Authentication, key exchange and host-key policy all happened before the
/// core ever sees the channel; this seam is deliberately as narrow as
/// "send bytes / receive bytes / is-eof". Errors are reported as the SSH
/// library's message text and always map to a broken transport.
pub trait SshChannel: Send + fmt::Debug {
    fn read(&mut self, dst: &mut [u8]) -> Result<ChannelRead, String>;

    /// One write attempt; `Ok(0)` means the window is exhausted right now.
    fn write(&mut self, src: &[u8]) -> Result<usize, String>;

    fn poll(&mut self, timeout: Duration) -> Result<ChannelPoll, String>;

    fn is_eof(&self) -> bool;

    /// Descriptor of the underlying SSH socket, for multi-session polling.
    fn raw_fd(&self) -> RawFd;
}

/// Shared owner of one SSH transport.
///
/// NETCONF sessions multiplexed over distinct channels of a single SSH
/// connection must serialize their I/O; they all hold this owner and share
/// its transport-access lock. The sibling set replaces the intrusive ring
/// list such stacks traditionally carry.
#[derive(Debug)]
pub struct SshOwner {
    lock: Arc<TimedMutex>,
    siblings: Mutex<Vec<u32>>,
}

impl SshOwner {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            lock: Arc::new(TimedMutex::new()),
            siblings: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn lock_handle(&self) -> Arc<TimedMutex> {
        Arc::clone(&self.lock)
    }

    pub(crate) fn adopt(&self, session_id: u32) {
        self.siblings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(session_id);
    }

    pub(crate) fn release(&self, session_id: u32) {
        self.siblings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|id| *id != session_id);
    }

    /// Ids of the sessions currently multiplexed over this transport.
    pub fn siblings(&self) -> Vec<u32> {
        self.siblings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// SSH channel transport variant.
#[derive(Debug)]
pub struct SshLink {
    channel: Box<dyn SshChannel>,
    owner: Arc<SshOwner>,
}

impl SshLink {
    pub(crate) fn new(channel: Box<dyn SshChannel>, owner: Arc<SshOwner>) -> Self {
        Self { channel, owner }
    }

    pub fn owner(&self) -> &Arc<SshOwner> {
        &self.owner
    }
}

impl Wire for SshLink {
    fn try_read(&mut self, dst: &mut [u8]) -> Result<ReadOutcome, NcError> {
        match self
            .channel
            .read(dst)
            .map_err(NcError::TransportBroken)?
        {
            ChannelRead::Data(0) => {
                if self.channel.is_eof() {
                    Ok(ReadOutcome::Closed)
                } else {
                    Ok(ReadOutcome::Empty)
                }
            },
            ChannelRead::Data(n) => Ok(ReadOutcome::Data(n)),
            ChannelRead::Again => Ok(ReadOutcome::Empty),
            ChannelRead::Eof => Ok(ReadOutcome::Closed),
        }
    }

    fn try_write(&mut self, src: &[u8]) -> Result<usize, NcError> {
        if self.channel.is_eof() {
            return Err(NcError::PeerClosed);
        }
        self.channel.write(src).map_err(NcError::TransportBroken)
    }

    fn poll_wait(&mut self, timeout: Duration) -> Result<PollOutcome, NcError> {
        match self
            .channel
            .poll(timeout)
            .map_err(NcError::TransportBroken)?
        {
            ChannelPoll::Data => Ok(PollOutcome::Readable),
            ChannelPoll::Pending => Ok(PollOutcome::Pending),
            ChannelPoll::SshMessage => Ok(PollOutcome::SshMessage),
            ChannelPoll::NewChannel => Ok(PollOutcome::NewChannel),
            ChannelPoll::Timeout => Ok(PollOutcome::Timeout),
            ChannelPoll::Eof => Err(NcError::PeerClosed),
        }
    }

    fn is_connected(&self) -> bool {
        !self.channel.is_eof()
    }

    fn poll_fd(&self) -> RawFd {
        self.channel.raw_fd()
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Ssh
    }
}
