// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{
    io::Read,
    os::{fd::OwnedFd, unix::net::UnixStream},
    sync::Arc,
    time::{Duration, Instant},
};

use anyhow::{Result, bail};
use netconf_peer_rs::{
    cfg::{config::Config, enums::Side},
    msg::{BASE_NS, CAP_BASE_1_0, CAP_BASE_1_1, MsgType},
    session::{Session, context::Context},
};

/// Context with fast test timeouts; `tune` can adjust further.
pub fn context_with(side: Side, tune: impl FnOnce(&mut Config)) -> Arc<Context> {
    let mut cfg = Config::default();
    cfg.session.side = side;
    cfg.timeouts.read_timeout = Duration::from_millis(500);
    cfg.timeouts.timeout_step = Duration::from_micros(500);
    cfg.timeouts.hello_timeout = Duration::from_secs(2);
    tune(&mut cfg);
    Context::new(cfg)
}

/// FD session over one end of a socketpair; the raw peer end drives the
/// test side of the wire.
pub fn fd_session(ctx: &Arc<Context>) -> Result<(Arc<Session>, UnixStream)> {
    let (ours, peer) = UnixStream::pair()?;
    let input: OwnedFd = ours.try_clone()?.into();
    let output: OwnedFd = ours.into();
    let session = Session::new_fd(Arc::clone(ctx), input, output)?;
    Ok((session, peer))
}

/// Reads from the raw peer until the wire ends with `suffix`.
pub fn read_wire_until(peer: &mut UnixStream, suffix: &[u8]) -> Result<Vec<u8>> {
    peer.set_read_timeout(Some(Duration::from_millis(100)))?;
    let deadline = Instant::now() + Duration::from_secs(2);
    let mut wire = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        if wire.ends_with(suffix) {
            return Ok(wire);
        }
        if Instant::now() >= deadline {
            bail!("peer wire never ended with {suffix:?}: {wire:?}");
        }
        match peer.read(&mut chunk) {
            Ok(0) => bail!("peer closed before {suffix:?} arrived"),
            Ok(n) => wire.extend_from_slice(&chunk[..n]),
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut => {},
            Err(e) => return Err(e.into()),
        }
    }
}

/// Hello body a server would send, framed for the 1.0 dialect.
pub fn server_hello_wire(caps: &[&str], session_id: u32) -> Vec<u8> {
    let mut wire = format!("<hello xmlns=\"{BASE_NS}\"><capabilities>");
    for cap in caps {
        wire.push_str(&format!("<capability>{cap}</capability>"));
    }
    wire.push_str(&format!(
        "</capabilities><session-id>{session_id}</session-id></hello>]]>]]>"
    ));
    wire.into_bytes()
}

/// Hello body a client would send, framed for the 1.0 dialect.
pub fn client_hello_wire(caps: &[&str]) -> Vec<u8> {
    let mut wire = format!("<hello xmlns=\"{BASE_NS}\"><capabilities>");
    for cap in caps {
        wire.push_str(&format!("<capability>{cap}</capability>"));
    }
    wire.push_str("</capabilities></hello>]]>]]>");
    wire.into_bytes()
}

/// Drives the peer's half of a hello exchange so `session` ends up
/// `Running` at the negotiated version.
pub fn complete_hello(session: &Arc<Session>, peer: &mut UnixStream) -> Result<()> {
    use std::io::Write;

    let wire = match session.side() {
        Side::Client => server_hello_wire(&[CAP_BASE_1_0, CAP_BASE_1_1], 7),
        Side::Server => client_hello_wire(&[CAP_BASE_1_0, CAP_BASE_1_1]),
    };
    peer.write_all(&wire)?;

    let msg = session.read_hello()?;
    if msg.kind != MsgType::Hello {
        bail!("expected hello, got {:?}", msg.kind);
    }
    session.process_hello(&msg)?;
    Ok(())
}
