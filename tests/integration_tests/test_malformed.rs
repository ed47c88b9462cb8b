// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{io::Write, time::Duration};

use anyhow::Result;
use netconf_peer_rs::{
    cfg::enums::{Side, Version},
    errors::NcError,
    msg::BASE_NS,
    session::state::{Status, TermReason},
};

use super::common::{complete_hello, context_with, fd_session, read_wire_until};

#[test]
fn server_1_1_answers_malformed_with_an_rpc_error() -> Result<()> {
    let ctx = context_with(Side::Server, |_| {});
    let (session, mut peer) = fd_session(&ctx)?;
    complete_hello(&session, &mut peer)?;
    assert_eq!(session.version(), Version::V1_1);

    peer.write_all(b"\n#6\n<foo/>\n##\n")?;
    let err = session
        .read_msg(Duration::from_millis(500))
        .expect_err("malformed message must fail");
    assert!(matches!(err, NcError::MalformedMsg));

    let wire = read_wire_until(&mut peer, b"\n##\n")?;
    let body = format!(
        "<rpc-reply xmlns=\"{BASE_NS}\"><rpc-error>\
<error-type>rpc</error-type>\
<error-tag>malformed-message</error-tag>\
<error-severity>error</error-severity>\
</rpc-error></rpc-reply>"
    );
    let expected = format!("\n#{}\n{}\n##\n", body.len(), body);
    assert_eq!(wire, expected.as_bytes());

    assert_eq!(session.status(), Status::Invalid);
    assert_eq!(session.term_reason(), TermReason::Other);
    Ok(())
}

#[test]
fn server_1_0_stays_silent_on_malformed() -> Result<()> {
    let ctx = context_with(Side::Server, |_| {});
    let (session, mut peer) = fd_session(&ctx)?;
    peer.write_all(
        format!(
            "<hello xmlns=\"{BASE_NS}\"><capabilities><capability>urn:ietf:params:netconf:base:1.0</capability></capabilities></hello>]]>]]>"
        )
        .as_bytes(),
    )?;
    let hello = session.read_msg(Duration::from_millis(500))?;
    session.process_hello(&hello)?;
    assert_eq!(session.version(), Version::V1_0);

    peer.write_all(b"<foo/>]]>]]>")?;
    let err = session
        .read_msg(Duration::from_millis(500))
        .expect_err("malformed message must fail");
    assert!(matches!(err, NcError::MalformedMsg));
    assert_eq!(session.status(), Status::Invalid);

    // Nothing came back.
    peer.set_read_timeout(Some(Duration::from_millis(100)))?;
    let mut probe = [0u8; 16];
    match std::io::Read::read(&mut peer, &mut probe) {
        Ok(0) => {},
        Ok(n) => panic!("unexpected {} bytes on the wire", n),
        Err(e) => assert!(
            e.kind() == std::io::ErrorKind::WouldBlock
                || e.kind() == std::io::ErrorKind::TimedOut
        ),
    }
    Ok(())
}

#[test]
fn client_never_answers_malformed() -> Result<()> {
    let ctx = context_with(Side::Client, |_| {});
    let (session, mut peer) = fd_session(&ctx)?;
    complete_hello(&session, &mut peer)?;
    assert_eq!(session.version(), Version::V1_1);

    peer.write_all(b"\n#6\n<foo/>\n##\n")?;
    let err = session
        .read_msg(Duration::from_millis(500))
        .expect_err("malformed message must fail");
    assert!(matches!(err, NcError::MalformedMsg));
    assert_eq!(session.status(), Status::Invalid);

    peer.set_read_timeout(Some(Duration::from_millis(100)))?;
    let mut probe = [0u8; 16];
    match std::io::Read::read(&mut peer, &mut probe) {
        Ok(0) => {},
        Ok(n) => panic!("unexpected {} bytes on the wire", n),
        Err(e) => assert!(
            e.kind() == std::io::ErrorKind::WouldBlock
                || e.kind() == std::io::ErrorKind::TimedOut
        ),
    }
    Ok(())
}

#[test]
fn io_is_rejected_after_invalidation() -> Result<()> {
    let ctx = context_with(Side::Client, |_| {});
    let (session, mut peer) = fd_session(&ctx)?;
    complete_hello(&session, &mut peer)?;

    session.kill();
    assert_eq!(session.status(), Status::Invalid);
    assert_eq!(session.term_reason(), TermReason::Killed);

    assert!(matches!(
        session.read_msg(Duration::from_millis(50)),
        Err(NcError::Invalidated)
    ));
    assert!(matches!(
        session.write_rpc(&b"<get/>"[..], None),
        Err(NcError::Invalidated)
    ));
    Ok(())
}
