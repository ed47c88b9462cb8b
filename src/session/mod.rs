//! NETCONF session objects: lifecycle state machine, serialized message
//! I/O, hello processing.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

/// Process-wide context object.
pub mod context;
/// Timed transport-access lock.
pub mod lock;
/// Status and termination-reason cell.
pub mod state;

use std::{
    os::fd::{OwnedFd, RawFd},
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU8, AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use chrono::{DateTime, SecondsFormat, Utc};
use once_cell::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::{
    cfg::enums::{Side, TransportKind, Version},
    errors::NcError,
    framing::{FrameWriter, read_frame},
    msg::{
        Message, MsgType, XmlFragment,
        classify::{Classified, RpcEnvelope, classify},
        error::RpcError,
        hello,
        writer::{self, Reply},
    },
    session::{
        context::Context,
        lock::TimedMutex,
        state::{Status, StatusCell, TermReason},
    },
    transport::{
        Link, PollOutcome, Wire,
        fd::FdPair,
        ssh::{SshChannel, SshLink, SshOwner},
        ticker::Deadline,
        tls::{TlsLink, TlsStream},
    },
};

/// What a poll-set read attempt produced.
#[derive(Debug)]
pub(crate) enum PollRead {
    Msg(Message),
    /// Inbound data belongs to a sibling channel on the shared SSH
    /// transport.
    Pending,
    SshMessage,
    NewChannel,
    WouldBlock,
}

/// One NETCONF conversation over an immutable transport.
///
/// All message I/O serializes on the transport-access lock; a reader or
/// writer holds it for the full duration of one message. Sessions are
/// shared behind `Arc` and may be invalidated from any thread.
#[derive(Debug)]
pub struct Session {
    id: u32,
    side: Side,
    transport: TransportKind,
    state: StatusCell,
    version: AtomicU8,
    io_lock: Arc<TimedMutex>,
    link: Mutex<Link>,
    fd: RawFd,
    next_msgid: AtomicU64,
    peer_caps: OnceCell<Vec<String>>,
    peer_session_id: OnceCell<u32>,
    created_at: Instant,
    last_rpc: Mutex<Instant>,
    ssh_owner: Option<Arc<SshOwner>>,
    ctx: Arc<Context>,
}

impl Session {
    /// Session over a pre-established descriptor pair.
    pub fn new_fd(
        ctx: Arc<Context>,
        input: OwnedFd,
        output: OwnedFd,
    ) -> Result<Arc<Self>, NcError> {
        let link = Link::from(FdPair::new(input, output)?);
        Ok(Self::build(ctx, link, Arc::new(TimedMutex::new()), None))
    }

    /// Session over an established SSH channel. Passing the owner of an
    /// existing session multiplexes this one onto the same SSH transport
    /// and shares its transport-access lock.
    pub fn new_ssh(
        ctx: Arc<Context>,
        channel: Box<dyn SshChannel>,
        owner: Option<Arc<SshOwner>>,
    ) -> Result<Arc<Self>, NcError> {
        let owner = owner.unwrap_or_else(SshOwner::new);
        let link = Link::from(SshLink::new(channel, Arc::clone(&owner)));
        let io_lock = owner.lock_handle();
        let session = Self::build(ctx, link, io_lock, Some(owner));
        if let Some(owner) = &session.ssh_owner {
            owner.adopt(session.id);
        }
        Ok(session)
    }

    /// Session over an established TLS stream.
    pub fn new_tls(
        ctx: Arc<Context>,
        stream: Box<dyn TlsStream>,
    ) -> Result<Arc<Self>, NcError> {
        let link = Link::from(TlsLink::new(stream));
        Ok(Self::build(ctx, link, Arc::new(TimedMutex::new()), None))
    }

    fn build(
        ctx: Arc<Context>,
        link: Link,
        io_lock: Arc<TimedMutex>,
        ssh_owner: Option<Arc<SshOwner>>,
    ) -> Arc<Self> {
        let id = ctx.next_session_id();
        let side = ctx.config().session.side;
        let transport = link.kind();
        let fd = link.poll_fd();
        info!(session = id, %side, %transport, "session created");
        Arc::new(Self {
            id,
            side,
            transport,
            state: StatusCell::new(Status::Starting),
            version: AtomicU8::new(Version::V1_0 as u8),
            io_lock,
            link: Mutex::new(link),
            fd,
            next_msgid: AtomicU64::new(1),
            peer_caps: OnceCell::new(),
            peer_session_id: OnceCell::new(),
            created_at: Instant::now(),
            last_rpc: Mutex::new(Instant::now()),
            ssh_owner,
            ctx,
        })
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn transport(&self) -> TransportKind {
        self.transport
    }

    pub fn status(&self) -> Status {
        self.state.status()
    }

    pub fn term_reason(&self) -> TermReason {
        self.state.reason()
    }

    pub fn version(&self) -> Version {
        if self.version.load(Ordering::SeqCst) == Version::V1_1 as u8 {
            Version::V1_1
        } else {
            Version::V1_0
        }
    }

    /// Peer capability list; set once on the client side when the hello
    /// exchange completes.
    pub fn peer_capabilities(&self) -> Option<&[String]> {
        self.peer_caps.get().map(Vec::as_slice)
    }

    /// Session id the server assigned, as seen by a client.
    pub fn peer_session_id(&self) -> Option<u32> {
        self.peer_session_id.get().copied()
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Shared SSH owner when this session multiplexes an SSH transport.
    pub fn ssh_owner(&self) -> Option<&Arc<SshOwner>> {
        self.ssh_owner.as_ref()
    }

    pub(crate) fn poll_descriptor(&self) -> RawFd {
        self.fd
    }

    /// Reads one whole message, waiting at most `timeout` for it to begin.
    ///
    /// Once the first byte is in flight the configured per-message read
    /// budget takes over. A quiet wire yields a `WouldBlock` message, not
    /// an error.
    pub fn read_msg(&self, timeout: Duration) -> Result<Message, NcError> {
        self.state.check_io()?;
        let cfg = self.ctx.config();
        let _turn = self.io_lock.acquire(cfg.timeouts.read_timeout)?;
        let res = (|| {
            let mut link = self.lock_link();
            match link.poll_wait(timeout)? {
                PollOutcome::Readable => {},
                _ => return Ok(Message::would_block()),
            }
            self.recv_locked(&mut link)
        })();
        if let Err(e) = &res {
            self.note_failure(e);
        }
        res
    }

    /// Reads the peer's hello, waiting out the configured hello timeout.
    pub fn read_hello(&self) -> Result<Message, NcError> {
        self.read_msg(self.ctx.config().timeouts.hello_timeout)
    }

    /// Zero-wait read attempt on behalf of the poll set. Lock contention
    /// surfaces as `Busy` without touching session state.
    pub(crate) fn poll_read(
        &self,
        lock_timeout: Duration,
    ) -> Result<PollRead, NcError> {
        self.state.check_io()?;
        let _turn = self.io_lock.acquire(lock_timeout)?;
        let res = (|| {
            let mut link = self.lock_link();
            match link.poll_wait(Duration::ZERO)? {
                PollOutcome::Readable => {},
                PollOutcome::Pending => return Ok(PollRead::Pending),
                PollOutcome::SshMessage => return Ok(PollRead::SshMessage),
                PollOutcome::NewChannel => return Ok(PollRead::NewChannel),
                PollOutcome::Timeout => return Ok(PollRead::WouldBlock),
            }
            self.recv_locked(&mut link).map(PollRead::Msg)
        })();
        if let Err(e) = &res {
            self.note_failure(e);
        }
        res
    }

    fn recv_locked(&self, link: &mut Link) -> Result<Message, NcError> {
        let cfg = self.ctx.config();
        let deadline =
            Deadline::start(cfg.timeouts.read_timeout, cfg.timeouts.timeout_step);
        let body = read_frame(
            link,
            self.version(),
            &deadline,
            &self.state,
            cfg.buffers.framing_buffer,
            None,
        )?
        .freeze();

        match classify(&body) {
            Classified::Hello => {
                debug!(session = self.id, "received hello");
                Ok(Message {
                    kind: MsgType::Hello,
                    body,
                    envelope: None,
                })
            },
            Classified::Rpc(envelope) => {
                debug!(session = self.id, "received rpc");
                if self.side.is_server() {
                    *self.lock_last_rpc() = Instant::now();
                }
                Ok(Message {
                    kind: MsgType::Rpc,
                    body,
                    envelope: Some(envelope),
                })
            },
            Classified::Reply => {
                debug!(session = self.id, "received rpc-reply");
                Ok(Message {
                    kind: MsgType::Reply,
                    body,
                    envelope: None,
                })
            },
            Classified::Notif => {
                debug!(session = self.id, "received notification");
                Ok(Message {
                    kind: MsgType::Notif,
                    body,
                    envelope: None,
                })
            },
            Classified::Malformed => {
                warn!(session = self.id, "received malformed message");
                if self.side.is_server() && self.version() == Version::V1_1 {
                    if let Err(e) = self.reply_malformed(link) {
                        warn!(
                            session = self.id,
                            error = %e,
                            "failed to send malformed-message reply"
                        );
                    }
                }
                Err(NcError::MalformedMsg)
            },
        }
    }

    fn reply_malformed(&self, link: &mut Link) -> Result<(), NcError> {
        let cfg = self.ctx.config();
        let mut out = FrameWriter::new(
            link,
            &self.state,
            self.version(),
            cfg.buffers.write_buffer,
            cfg.timeouts.timeout_step,
        );
        let errors = [RpcError::malformed_message()];
        writer::emit_reply(&mut out, None, &Reply::Error(&errors))
    }

    /// Emits one `<rpc>` and returns the message-id it carried. Client
    /// side only; ids start at 1 and increase by one per emitted rpc.
    pub fn write_rpc(
        &self,
        op: &dyn XmlFragment,
        attrs: Option<&str>,
    ) -> Result<u64, NcError> {
        if !self.side.is_client() {
            return Err(NcError::Invalidated);
        }
        self.state.check_io()?;
        let cfg = self.ctx.config();
        let _turn = self.io_lock.acquire(cfg.timeouts.read_timeout)?;
        let msgid = self.next_msgid.load(Ordering::SeqCst);
        let res = {
            let mut link = self.lock_link();
            let mut out = FrameWriter::new(
                &mut link,
                &self.state,
                self.version(),
                cfg.buffers.write_buffer,
                cfg.timeouts.timeout_step,
            );
            writer::emit_rpc(&mut out, msgid, attrs, op)
        };
        match res {
            Ok(()) => {
                self.next_msgid.store(msgid + 1, Ordering::SeqCst);
                debug!(session = self.id, msgid, "sent rpc");
                Ok(msgid)
            },
            Err(e) => {
                self.note_failure(&e);
                Err(e)
            },
        }
    }

    /// Emits one `<rpc-reply>` mirroring the originating rpc envelope.
    /// Server side only.
    pub fn write_reply(
        &self,
        envelope: Option<&RpcEnvelope>,
        reply: &Reply<'_>,
    ) -> Result<(), NcError> {
        if !self.side.is_server() {
            return Err(NcError::Invalidated);
        }
        self.with_writer(|out| writer::emit_reply(out, envelope, reply))
    }

    /// Emits one `<notification>`. Server side only.
    pub fn write_notif(
        &self,
        event_time: DateTime<Utc>,
        body: &dyn XmlFragment,
    ) -> Result<(), NcError> {
        if !self.side.is_server() {
            return Err(NcError::Invalidated);
        }
        let stamp = event_time.to_rfc3339_opts(SecondsFormat::Secs, true);
        self.with_writer(|out| writer::emit_notif(out, &stamp, body))
    }

    /// Emits the hello that opens the session. Hello always travels in 1.0
    /// end-tag framing; a session already negotiated to 1.1 refuses.
    /// Only servers may announce a session id.
    pub fn write_hello(
        &self,
        capabilities: &[String],
        session_id: Option<u32>,
    ) -> Result<(), NcError> {
        if self.version() != Version::V1_0 {
            return Err(NcError::FramingViolation(
                "hello requires 1.0 end-tag framing",
            ));
        }
        if session_id.is_some() && !self.side.is_server() {
            return Err(NcError::Invalidated);
        }
        self.with_writer(|out| writer::emit_hello(out, capabilities, session_id))
    }

    fn with_writer<F>(&self, emit: F) -> Result<(), NcError>
    where F: FnOnce(&mut FrameWriter<'_>) -> Result<(), NcError> {
        self.state.check_io()?;
        let cfg = self.ctx.config();
        let _turn = self.io_lock.acquire(cfg.timeouts.read_timeout)?;
        let res = {
            let mut link = self.lock_link();
            let mut out = FrameWriter::new(
                &mut link,
                &self.state,
                self.version(),
                cfg.buffers.write_buffer,
                cfg.timeouts.timeout_step,
            );
            emit(&mut out)
        };
        if let Err(e) = &res {
            self.note_failure(e);
        }
        res
    }

    /// Completes the hello exchange with a received hello message: fixes
    /// the protocol version, stores peer capabilities (client side) and
    /// moves the session to `Running`.
    pub fn process_hello(&self, msg: &Message) -> Result<(), NcError> {
        let res = (|| {
            if msg.kind != MsgType::Hello {
                return Err(NcError::BadHello);
            }
            if self.state.status() != Status::Starting {
                return Err(NcError::Invalidated);
            }
            let info = hello::parse_hello(&msg.body)?;
            if self.side.is_client() {
                let sid = info.session_id.ok_or(NcError::BadHello)?;
                let _ = self.peer_session_id.set(sid);
            } else if info.session_id.is_some() {
                // Clients must not announce a session id.
                return Err(NcError::BadHello);
            }
            let version = hello::negotiate_version(
                self.ctx.config().session.version_floor,
                &info.capabilities,
            )?;
            self.version.store(version as u8, Ordering::SeqCst);
            if self.side.is_client() {
                let _ = self.peer_caps.set(info.capabilities);
            }
            self.state.set_status(Status::Running);
            info!(session = self.id, %version, "hello exchange completed");
            Ok(())
        })();
        if let Err(e) = &res {
            self.note_failure(e);
        }
        res
    }

    /// Graceful close: waits out any in-flight message, then retires the
    /// session with reason `Closed`.
    pub fn close(&self) -> Result<(), NcError> {
        if self.state.status() != Status::Running {
            return Err(NcError::Invalidated);
        }
        let cfg = self.ctx.config();
        let _turn = self.io_lock.acquire(cfg.timeouts.read_timeout)?;
        self.state.set_status(Status::Closing);
        self.state.invalidate(TermReason::Closed);
        info!(session = self.id, "session closed");
        Ok(())
    }

    /// Forces the session invalid from any thread. In-flight reads and
    /// writes observe the change on their next iteration.
    pub fn kill(&self) {
        self.state.invalidate(TermReason::Killed);
        warn!(session = self.id, "session killed");
    }

    pub(crate) fn fail(&self, reason: TermReason) {
        self.state.invalidate(reason);
    }

    /// Server-side idle cutoff; invalidates with reason `Timeout` once no
    /// rpc arrived for the configured window.
    pub(crate) fn expire_idle(&self) -> bool {
        let cfg = self.ctx.config();
        if !self.side.is_server()
            || cfg.timeouts.idle_timeout.is_zero()
            || self.state.status() != Status::Running
        {
            return false;
        }
        let last = *self.lock_last_rpc();
        if last.elapsed() >= cfg.timeouts.idle_timeout {
            self.state.invalidate(TermReason::Timeout);
            warn!(session = self.id, "session idle timeout");
            true
        } else {
            false
        }
    }

    fn note_failure(&self, e: &NcError) {
        match e {
            NcError::PeerClosed => self.state.invalidate(TermReason::Dropped),
            NcError::TransportBroken(_)
            | NcError::ReadTimeout
            | NcError::FramingViolation(_)
            | NcError::MalformedMsg
            | NcError::BadHello
            | NcError::Internal(_) => self.state.invalidate(TermReason::Other),
            NcError::Busy | NcError::Invalidated => {},
        }
    }

    fn lock_link(&self) -> MutexGuard<'_, Link> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_last_rpc(&self) -> MutexGuard<'_, Instant> {
        self.last_rpc.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(owner) = &self.ssh_owner {
            owner.release(self.id);
        }
    }
}
