// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Multi-session poller with bounded fair queueing of concurrent workers.

use std::{
    collections::VecDeque,
    sync::{
        Arc, Condvar, Mutex, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use bitflags::bitflags;
use tracing::debug;

use crate::{
    cfg::config::Config,
    errors::NcError,
    msg::{Message, MsgType},
    session::{PollRead, Session, state::{Status, TermReason}},
    transport::sigmask::SigGuard,
};

bitflags! {
    /// What a poll turn observed. Several bits may combine (e.g.
    /// `SESSION_TERM | SESSION_ERROR`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PollStatus: u16 {
        const TIMEOUT       = 0x0001;
        const RPC           = 0x0002;
        const REPLY         = 0x0004;
        const HELLO         = 0x0008;
        const NOTIF         = 0x0010;
        /// Data arrived for a sibling channel on a shared SSH transport.
        const PENDING       = 0x0020;
        const SESSION_TERM  = 0x0040;
        const SESSION_ERROR = 0x0080;
        const SSH_MSG       = 0x0100;
        const SSH_CHANNEL   = 0x0200;
        const ERROR         = 0x0400;
        /// A session's transport lock was contended for the whole turn.
        const BUSY          = 0x0800;
    }
}

/// One poll result: the status bits, the session they concern and, for the
/// message kinds, the message itself.
#[derive(Debug)]
pub struct PollEvent {
    pub status: PollStatus,
    pub session: Option<Arc<Session>>,
    pub message: Option<Message>,
}

impl PollEvent {
    fn timeout() -> Self {
        Self {
            status: PollStatus::TIMEOUT,
            session: None,
            message: None,
        }
    }
}

#[derive(Debug)]
enum TurnError {
    Full,
    TimedOut,
}

/// Bounded FIFO of worker tickets guarding the poll loop.
///
/// Workers join the tail and proceed only when their ticket reaches the
/// head, so wakes happen strictly in arrival order and no worker starves.
/// Arriving at a full queue fails immediately instead of piling on.
#[derive(Debug)]
struct FairQueue {
    queue: Mutex<VecDeque<u64>>,
    cv: Condvar,
    depth: usize,
    tickets: AtomicU64,
}

struct QueueTurn<'a> {
    owner: &'a FairQueue,
}

impl FairQueue {
    fn new(depth: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::with_capacity(depth)),
            cv: Condvar::new(),
            depth,
            tickets: AtomicU64::new(0),
        }
    }

    fn enter(&self, timeout: Duration) -> Result<QueueTurn<'_>, TurnError> {
        let deadline = Instant::now() + timeout;
        let mut queue = self
            .queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if queue.len() >= self.depth {
            return Err(TurnError::Full);
        }
        let ticket = self.tickets.fetch_add(1, Ordering::Relaxed);
        queue.push_back(ticket);
        while queue.front() != Some(&ticket) {
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                queue.retain(|t| *t != ticket);
                return Err(TurnError::TimedOut);
            }
            let (guard, wait) = self
                .cv
                .wait_timeout(queue, left)
                .unwrap_or_else(PoisonError::into_inner);
            queue = guard;
            if wait.timed_out() && queue.front() != Some(&ticket) {
                queue.retain(|t| *t != ticket);
                return Err(TurnError::TimedOut);
            }
        }
        Ok(QueueTurn { owner: self })
    }
}

impl Drop for QueueTurn<'_> {
    fn drop(&mut self) {
        let mut queue = self
            .owner
            .queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        queue.pop_front();
        self.owner.cv.notify_all();
    }
}

/// Ordered set of sessions polled together.
#[derive(Debug)]
pub struct PollSet {
    sessions: Mutex<Vec<Arc<Session>>>,
    queue: FairQueue,
    lock_timeout: Duration,
}

impl PollSet {
    pub fn new(cfg: &Config) -> Self {
        Self {
            sessions: Mutex::new(Vec::new()),
            queue: FairQueue::new(cfg.poll.queue_depth),
            lock_timeout: cfg.poll.lock_timeout,
        }
    }

    pub fn add(&self, session: Arc<Session>) -> Result<(), NcError> {
        let mut list = self.lock_sessions();
        if list.iter().any(|s| s.id() == session.id()) {
            return Err(NcError::Internal(format!(
                "session {} is already in the poll set",
                session.id()
            )));
        }
        list.push(session);
        Ok(())
    }

    pub fn remove(&self, session_id: u32) -> Result<(), NcError> {
        let mut list = self.lock_sessions();
        let before = list.len();
        list.retain(|s| s.id() != session_id);
        if list.len() == before {
            return Err(NcError::Internal(format!(
                "session {session_id} is not in the poll set"
            )));
        }
        Ok(())
    }

    pub fn clear(&self) {
        self.lock_sessions().clear();
    }

    pub fn len(&self) -> usize {
        self.lock_sessions().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Waits for one event on any session in the set.
    ///
    /// The calling worker first takes its fair-queue turn, then multiplexes
    /// every session descriptor under a single signal-masked poll. A
    /// readable session is read with a short-timeout transport-lock
    /// attempt; contention is reported as `BUSY` once nothing else fired.
    pub fn poll(&self, timeout: Duration) -> Result<PollEvent, NcError> {
        let deadline = Instant::now() + timeout;
        let _turn = match self.queue.enter(timeout) {
            Ok(turn) => turn,
            Err(TurnError::Full) => return Err(NcError::Busy),
            Err(TurnError::TimedOut) => return Ok(PollEvent::timeout()),
        };

        loop {
            let sessions = self.lock_sessions().clone();
            if sessions.is_empty() {
                return Err(NcError::Internal("poll set is empty".to_string()));
            }

            // Sessions already terminated (or newly idle-expired) win the
            // turn before any descriptor work.
            for session in &sessions {
                if session.status() == Status::Invalid {
                    return Ok(term_event(session));
                }
                if session.expire_idle() {
                    return Ok(term_event(session));
                }
            }

            let mut pfds: Vec<libc::pollfd> = sessions
                .iter()
                .map(|s| libc::pollfd {
                    fd: s.poll_descriptor(),
                    events: libc::POLLIN,
                    revents: 0,
                })
                .collect();

            let left = deadline.saturating_duration_since(Instant::now());
            let millis = left.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;
            let ready = {
                let _mask = SigGuard::block_all();
                unsafe {
                    libc::poll(pfds.as_mut_ptr(), pfds.len() as libc::nfds_t, millis)
                }
            };
            if ready < 0 {
                let err = std::io::Error::last_os_error();
                if err.raw_os_error() == Some(libc::EINTR) {
                    continue;
                }
                return Err(NcError::TransportBroken(err.to_string()));
            }
            if ready == 0 {
                return Ok(PollEvent::timeout());
            }

            let mut busy: Option<Arc<Session>> = None;
            for (i, pfd) in pfds.iter().enumerate() {
                if pfd.revents == 0 {
                    continue;
                }
                let session = &sessions[i];
                debug!(
                    session = session.id(),
                    revents = pfd.revents,
                    "poll descriptor fired"
                );

                if pfd.revents & (libc::POLLERR | libc::POLLNVAL) != 0 {
                    session.fail(TermReason::Other);
                    return Ok(term_event(session));
                }
                if pfd.revents & libc::POLLHUP != 0
                    && pfd.revents & libc::POLLIN == 0
                {
                    session.fail(TermReason::Dropped);
                    return Ok(term_event(session));
                }

                match session.poll_read(self.lock_timeout) {
                    Ok(PollRead::Msg(msg)) => {
                        let status = match msg.kind {
                            MsgType::Hello => PollStatus::HELLO,
                            MsgType::Rpc => PollStatus::RPC,
                            MsgType::Reply => PollStatus::REPLY,
                            MsgType::Notif => PollStatus::NOTIF,
                            MsgType::WouldBlock => continue,
                        };
                        return Ok(PollEvent {
                            status,
                            session: Some(Arc::clone(session)),
                            message: Some(msg),
                        });
                    },
                    Ok(PollRead::Pending) => {
                        return Ok(PollEvent {
                            status: PollStatus::PENDING,
                            session: Some(Arc::clone(session)),
                            message: None,
                        });
                    },
                    Ok(PollRead::SshMessage) => {
                        return Ok(PollEvent {
                            status: PollStatus::SSH_MSG,
                            session: Some(Arc::clone(session)),
                            message: None,
                        });
                    },
                    Ok(PollRead::NewChannel) => {
                        return Ok(PollEvent {
                            status: PollStatus::SSH_CHANNEL,
                            session: Some(Arc::clone(session)),
                            message: None,
                        });
                    },
                    Ok(PollRead::WouldBlock) => continue,
                    Err(NcError::Busy) => {
                        busy = Some(Arc::clone(session));
                        continue;
                    },
                    Err(_) => return Ok(term_event(session)),
                }
            }

            if let Some(session) = busy {
                return Ok(PollEvent {
                    status: PollStatus::BUSY,
                    session: Some(session),
                    message: None,
                });
            }
            if deadline.saturating_duration_since(Instant::now()).is_zero() {
                return Ok(PollEvent::timeout());
            }
        }
    }

    fn lock_sessions(&self) -> std::sync::MutexGuard<'_, Vec<Arc<Session>>> {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn term_event(session: &Arc<Session>) -> PollEvent {
    let mut status = PollStatus::SESSION_TERM;
    if matches!(
        session.term_reason(),
        TermReason::Other | TermReason::None
    ) {
        status |= PollStatus::SESSION_ERROR;
    }
    PollEvent {
        status,
        session: Some(Arc::clone(session)),
        message: None,
    }
}
