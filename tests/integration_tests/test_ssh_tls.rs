// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{
    io::{Read, Write},
    os::{fd::AsRawFd, fd::RawFd, unix::net::UnixStream},
    sync::Arc,
    thread,
    time::Duration,
};

use anyhow::Result;
use netconf_peer_rs::{
    cfg::enums::Side,
    errors::NcError,
    msg::{BASE_NS, MsgType},
    poll::{PollSet, PollStatus},
    session::{Session, state::TermReason},
    transport::{
        ssh::{ChannelPoll, ChannelRead, SshChannel},
        tls::{TlsRead, TlsStream},
    },
};

use super::common::context_with;

fn poll_fd(fd: RawFd, timeout: Duration) -> (bool, bool) {
    let mut pfd = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };
    let millis = timeout.as_millis() as libc::c_int;
    let ret = unsafe { libc::poll(&mut pfd, 1, millis) };
    let readable = ret > 0 && pfd.revents & libc::POLLIN != 0;
    let hup = ret > 0 && pfd.revents & libc::POLLHUP != 0;
    (readable, hup)
}

/// Scripted stand-in for an established SSH channel, carried over a real
/// socketpair so the poll set has a descriptor to multiplex on.
#[derive(Debug)]
struct FakeChannel {
    wire: UnixStream,
    /// Report readable data as belonging to a sibling channel.
    pending: bool,
    eof_seen: bool,
}

impl FakeChannel {
    fn new(wire: UnixStream, pending: bool) -> Result<Self> {
        wire.set_nonblocking(true)?;
        Ok(Self {
            wire,
            pending,
            eof_seen: false,
        })
    }
}

impl SshChannel for FakeChannel {
    fn read(&mut self, dst: &mut [u8]) -> Result<ChannelRead, String> {
        match self.wire.read(dst) {
            Ok(0) => {
                self.eof_seen = true;
                Ok(ChannelRead::Eof)
            },
            Ok(n) => Ok(ChannelRead::Data(n)),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                Ok(ChannelRead::Again)
            },
            Err(e) => Err(e.to_string()),
        }
    }

    fn write(&mut self, src: &[u8]) -> Result<usize, String> {
        match self.wire.write(src) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(e.to_string()),
        }
    }

    fn poll(&mut self, timeout: Duration) -> Result<ChannelPoll, String> {
        let (readable, hup) = poll_fd(self.wire.as_raw_fd(), timeout);
        if readable {
            if self.pending {
                return Ok(ChannelPoll::Pending);
            }
            return Ok(ChannelPoll::Data);
        }
        if hup {
            return Ok(ChannelPoll::Eof);
        }
        Ok(ChannelPoll::Timeout)
    }

    fn is_eof(&self) -> bool {
        self.eof_seen
    }

    fn raw_fd(&self) -> RawFd {
        self.wire.as_raw_fd()
    }
}

/// Channel whose poll primitive is slow; used to pin the shared transport
/// lock for a while.
#[derive(Debug)]
struct SlowChannel {
    wire: UnixStream,
    hold: Duration,
}

impl SshChannel for SlowChannel {
    fn read(&mut self, _dst: &mut [u8]) -> Result<ChannelRead, String> {
        Ok(ChannelRead::Again)
    }

    fn write(&mut self, src: &[u8]) -> Result<usize, String> {
        Ok(src.len())
    }

    fn poll(&mut self, _timeout: Duration) -> Result<ChannelPoll, String> {
        thread::sleep(self.hold);
        Ok(ChannelPoll::Timeout)
    }

    fn is_eof(&self) -> bool {
        false
    }

    fn raw_fd(&self) -> RawFd {
        self.wire.as_raw_fd()
    }
}

/// Scripted stand-in for an established TLS stream.
#[derive(Debug)]
struct FakeTls {
    wire: UnixStream,
}

impl FakeTls {
    fn new(wire: UnixStream) -> Result<Self> {
        wire.set_nonblocking(true)?;
        Ok(Self { wire })
    }
}

impl TlsStream for FakeTls {
    fn read(&mut self, dst: &mut [u8]) -> Result<TlsRead, String> {
        match self.wire.read(dst) {
            Ok(0) => Ok(TlsRead::ZeroReturn),
            Ok(n) => Ok(TlsRead::Data(n)),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                Ok(TlsRead::WantRead)
            },
            Err(e) => Err(e.to_string()),
        }
    }

    fn write(&mut self, src: &[u8]) -> Result<usize, String> {
        match self.wire.write(src) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(e.to_string()),
        }
    }

    fn raw_fd(&self) -> RawFd {
        self.wire.as_raw_fd()
    }
}

fn reply_wire() -> Vec<u8> {
    format!("<rpc-reply xmlns=\"{BASE_NS}\" message-id=\"1\"><ok/></rpc-reply>]]>]]>")
        .into_bytes()
}

#[test]
fn ssh_session_reads_a_framed_message() -> Result<()> {
    let ctx = context_with(Side::Client, |_| {});
    let (wire, mut peer) = UnixStream::pair()?;
    let channel = FakeChannel::new(wire, false)?;
    let session = Session::new_ssh(Arc::clone(&ctx), Box::new(channel), None)?;

    peer.write_all(&reply_wire())?;
    let msg = session.read_msg(Duration::from_millis(500))?;
    assert_eq!(msg.kind, MsgType::Reply);
    Ok(())
}

#[test]
fn ssh_channel_eof_drops_the_session() -> Result<()> {
    let ctx = context_with(Side::Client, |_| {});
    let (wire, peer) = UnixStream::pair()?;
    let channel = FakeChannel::new(wire, false)?;
    let session = Session::new_ssh(Arc::clone(&ctx), Box::new(channel), None)?;

    drop(peer);
    let err = session
        .read_msg(Duration::from_millis(500))
        .expect_err("eof must fail the read");
    assert!(matches!(err, NcError::PeerClosed));
    assert_eq!(session.term_reason(), TermReason::Dropped);
    Ok(())
}

#[test]
fn ssh_siblings_share_the_owner_and_its_lock() -> Result<()> {
    let ctx = context_with(Side::Client, |cfg| {
        cfg.timeouts.read_timeout = Duration::from_millis(200);
    });
    let (wire1, _peer1) = UnixStream::pair()?;
    let (wire2, _peer2) = UnixStream::pair()?;

    let first = Session::new_ssh(
        Arc::clone(&ctx),
        Box::new(SlowChannel {
            wire: wire1,
            hold: Duration::from_millis(700),
        }),
        None,
    )?;
    let owner = Arc::clone(first.ssh_owner().expect("ssh owner"));
    let second = Session::new_ssh(
        Arc::clone(&ctx),
        Box::new(FakeChannel::new(wire2, false)?),
        Some(Arc::clone(&owner)),
    )?;
    assert_eq!(owner.siblings().len(), 2);

    // The first sibling pins the shared lock inside its slow poll; the
    // second cannot start a message meanwhile.
    let reader = thread::spawn({
        let first = Arc::clone(&first);
        move || first.read_msg(Duration::from_millis(100))
    });
    thread::sleep(Duration::from_millis(100));
    let err = second
        .read_msg(Duration::from_millis(10))
        .expect_err("shared lock is held");
    assert!(matches!(err, NcError::Busy));

    let first_result = reader.join().expect("no panic")?;
    assert_eq!(first_result.kind, MsgType::WouldBlock);

    drop(second);
    assert_eq!(owner.siblings().len(), 1);
    Ok(())
}

#[test]
fn ssh_pending_data_surfaces_through_the_poll_set() -> Result<()> {
    let ctx = context_with(Side::Client, |_| {});
    let (wire, mut peer) = UnixStream::pair()?;
    let channel = FakeChannel::new(wire, true)?;
    let session = Session::new_ssh(Arc::clone(&ctx), Box::new(channel), None)?;

    let ps = PollSet::new(ctx.config());
    ps.add(Arc::clone(&session))?;

    peer.write_all(b"x")?;
    let event = ps.poll(Duration::from_secs(1))?;
    assert_eq!(event.status, PollStatus::PENDING);
    assert_eq!(event.session.expect("event session").id(), session.id());
    Ok(())
}

#[test]
fn tls_session_reads_and_maps_zero_return() -> Result<()> {
    let ctx = context_with(Side::Client, |_| {});
    let (wire, mut peer) = UnixStream::pair()?;
    let session = Session::new_tls(Arc::clone(&ctx), Box::new(FakeTls::new(wire)?))?;

    peer.write_all(&reply_wire())?;
    let msg = session.read_msg(Duration::from_millis(500))?;
    assert_eq!(msg.kind, MsgType::Reply);

    drop(peer);
    let err = session
        .read_msg(Duration::from_millis(500))
        .expect_err("close_notify must fail the read");
    assert!(matches!(err, NcError::PeerClosed));
    assert_eq!(session.term_reason(), TermReason::Dropped);
    Ok(())
}
