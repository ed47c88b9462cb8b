// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{io::Write, time::Duration};

use anyhow::Result;
use netconf_peer_rs::{
    cfg::enums::Version,
    errors::NcError,
    framing::{FrameWriter, read_frame},
    transport::ticker::Deadline,
};

use super::{link_pair, running_status, test_config};

fn deadline(cfg: &netconf_peer_rs::cfg::config::Config) -> Deadline {
    Deadline::start(cfg.timeouts.read_timeout, cfg.timeouts.timeout_step)
}

#[test]
fn end_tag_frame_roundtrip() -> Result<()> {
    let cfg = test_config();
    let (mut link, mut peer) = link_pair()?;
    let status = running_status();

    peer.write_all(
        b"<hello xmlns=\"urn:ietf:params:xml:ns:netconf:base:1.0\"/>]]>]]>",
    )?;

    let body = read_frame(
        &mut link,
        Version::V1_0,
        &deadline(&cfg),
        &status,
        cfg.buffers.framing_buffer,
        None,
    )?;
    assert_eq!(
        &body[..],
        b"<hello xmlns=\"urn:ietf:params:xml:ns:netconf:base:1.0\"/>"
    );
    Ok(())
}

#[test]
fn chunked_frame_roundtrip_multiple_chunks() -> Result<()> {
    let cfg = test_config();
    let (mut link, mut peer) = link_pair()?;
    let status = running_status();

    peer.write_all(b"\n#7\n<hello>\n#8\n</hello>\n##\n")?;

    let body = read_frame(
        &mut link,
        Version::V1_1,
        &deadline(&cfg),
        &status,
        cfg.buffers.framing_buffer,
        None,
    )?;
    assert_eq!(&body[..], b"<hello></hello>");
    Ok(())
}

#[test]
fn chunk_boundaries_do_not_change_the_body() -> Result<()> {
    let cfg = test_config();
    let payload = b"abcdefghij";

    let splits: &[&[usize]] = &[&[10], &[1, 9], &[3, 3, 4], &[5, 5]];
    for split in splits {
        let (mut link, mut peer) = link_pair()?;
        let status = running_status();

        let mut wire = Vec::new();
        let mut off = 0;
        for len in *split {
            wire.extend_from_slice(format!("\n#{len}\n").as_bytes());
            wire.extend_from_slice(&payload[off..off + len]);
            off += len;
        }
        wire.extend_from_slice(b"\n##\n");
        peer.write_all(&wire)?;

        let body = read_frame(
            &mut link,
            Version::V1_1,
            &deadline(&cfg),
            &status,
            cfg.buffers.framing_buffer,
            None,
        )?;
        assert_eq!(&body[..], payload, "split {split:?} changed the body");
    }
    Ok(())
}

#[test]
fn zero_and_garbage_chunk_sizes_are_violations() -> Result<()> {
    for wire in [&b"\n#0\nx\n##\n"[..], &b"\n#3x\nabc\n##\n"[..]] {
        let cfg = test_config();
        let (mut link, mut peer) = link_pair()?;
        let status = running_status();
        peer.write_all(wire)?;

        let err = read_frame(
            &mut link,
            Version::V1_1,
            &deadline(&cfg),
            &status,
            cfg.buffers.framing_buffer,
            None,
        )
        .expect_err("bad chunk size must fail");
        assert!(matches!(
            err,
            NcError::FramingViolation("invalid chunk size")
        ));
    }
    Ok(())
}

#[test]
fn end_of_message_without_chunks_is_a_violation() -> Result<()> {
    let cfg = test_config();
    let (mut link, mut peer) = link_pair()?;
    let status = running_status();
    peer.write_all(b"\n##\n")?;

    let err = read_frame(
        &mut link,
        Version::V1_1,
        &deadline(&cfg),
        &status,
        cfg.buffers.framing_buffer,
        None,
    )
    .expect_err("empty message must fail");
    assert!(matches!(
        err,
        NcError::FramingViolation("invalid frame chunk delimiters")
    ));
    Ok(())
}

#[test]
fn stream_closing_mid_frame_is_a_violation() -> Result<()> {
    let cfg = test_config();
    let (mut link, mut peer) = link_pair()?;
    let status = running_status();

    peer.write_all(b"\n#6\n<hel")?;
    drop(peer);

    let err = read_frame(
        &mut link,
        Version::V1_1,
        &deadline(&cfg),
        &status,
        cfg.buffers.framing_buffer,
        None,
    )
    .expect_err("truncated stream must fail");
    assert!(matches!(
        err,
        NcError::FramingViolation("invalid frame chunk delimiters")
    ));
    Ok(())
}

#[test]
fn silent_wire_times_out_within_budget() -> Result<()> {
    let mut cfg = test_config();
    cfg.timeouts.read_timeout = Duration::from_millis(150);
    let (mut link, mut peer) = link_pair()?;
    let status = running_status();

    // A partial frame and then silence.
    peer.write_all(b"\n#6\nab")?;

    let started = std::time::Instant::now();
    let err = read_frame(
        &mut link,
        Version::V1_1,
        &Deadline::start(cfg.timeouts.read_timeout, cfg.timeouts.timeout_step),
        &status,
        cfg.buffers.framing_buffer,
        None,
    )
    .expect_err("quiet peer must time out");
    let elapsed = started.elapsed();

    assert!(matches!(err, NcError::ReadTimeout));
    assert!(elapsed >= Duration::from_millis(150));
    assert!(elapsed < Duration::from_millis(150) + Duration::from_millis(200));
    Ok(())
}

#[test]
fn end_tag_size_limit_is_enforced() -> Result<()> {
    let cfg = test_config();
    let (mut link, mut peer) = link_pair()?;
    let status = running_status();
    peer.write_all(b"0123456789abcdef]]>]]>")?;

    let err = read_frame(
        &mut link,
        Version::V1_0,
        &deadline(&cfg),
        &status,
        cfg.buffers.framing_buffer,
        Some(8),
    )
    .expect_err("oversize frame must fail");
    assert!(matches!(
        err,
        NcError::FramingViolation("missing end sequence")
    ));
    Ok(())
}

#[test]
fn writer_emits_single_chunk_and_terminator() -> Result<()> {
    let cfg = test_config();
    let (mut link, peer) = link_pair()?;
    let status = running_status();

    let mut out = FrameWriter::new(
        &mut link,
        &status,
        Version::V1_1,
        cfg.buffers.write_buffer,
        cfg.timeouts.timeout_step,
    );
    out.write(b"<rpc>")?;
    out.write(b"<get/>")?;
    out.write(b"</rpc>")?;
    out.finish()?;

    let wire = read_available(peer)?;
    assert_eq!(&wire[..], b"\n#17\n<rpc><get/></rpc>\n##\n");
    Ok(())
}

#[test]
fn writer_end_tag_dialect_appends_terminator() -> Result<()> {
    let cfg = test_config();
    let (mut link, peer) = link_pair()?;
    let status = running_status();

    let mut out = FrameWriter::new(
        &mut link,
        &status,
        Version::V1_0,
        cfg.buffers.write_buffer,
        cfg.timeouts.timeout_step,
    );
    out.write(b"<hello/>")?;
    out.finish()?;

    let wire = read_available(peer)?;
    assert_eq!(&wire[..], b"<hello/>]]>]]>");
    Ok(())
}

#[test]
fn oversize_payload_bypasses_the_buffer() -> Result<()> {
    let mut cfg = test_config();
    cfg.buffers.write_buffer = 32;
    let (mut link, peer) = link_pair()?;
    let status = running_status();

    let big = vec![b'x'; 100];
    let mut out = FrameWriter::new(
        &mut link,
        &status,
        Version::V1_1,
        cfg.buffers.write_buffer,
        cfg.timeouts.timeout_step,
    );
    out.write(b"small")?;
    out.write(&big)?;
    out.finish()?;

    let wire = read_available(peer)?;
    let mut expected = Vec::new();
    expected.extend_from_slice(b"\n#5\nsmall");
    expected.extend_from_slice(b"\n#100\n");
    expected.extend_from_slice(&big);
    expected.extend_from_slice(b"\n##\n");
    assert_eq!(wire, expected);

    // And the reader reassembles it.
    let (mut link2, mut peer2) = link_pair()?;
    peer2.write_all(&wire)?;
    let body = read_frame(
        &mut link2,
        Version::V1_1,
        &deadline(&cfg),
        &running_status(),
        cfg.buffers.framing_buffer,
        None,
    )?;
    let mut joined = Vec::new();
    joined.extend_from_slice(b"small");
    joined.extend_from_slice(&big);
    assert_eq!(&body[..], &joined[..]);
    Ok(())
}

#[test]
fn escape_writer_escapes_exactly_the_three_bytes() -> Result<()> {
    let cfg = test_config();
    let (mut link, peer) = link_pair()?;
    let status = running_status();

    let mut out = FrameWriter::new(
        &mut link,
        &status,
        Version::V1_0,
        cfg.buffers.write_buffer,
        cfg.timeouts.timeout_step,
    );
    out.write_escaped(b"a < b && c > \"d\"")?;
    out.finish()?;

    let wire = read_available(peer)?;
    assert_eq!(&wire[..], b"a &lt; b &amp;&amp; c &gt; \"d\"]]>]]>");
    Ok(())
}

#[test]
fn escaped_text_parses_back_to_the_original() -> Result<()> {
    let cfg = test_config();
    let original = b"1 < 2 & 3 > 2; plain text stays";

    let (mut link, peer) = link_pair()?;
    let status = running_status();
    let mut out = FrameWriter::new(
        &mut link,
        &status,
        Version::V1_0,
        cfg.buffers.write_buffer,
        cfg.timeouts.timeout_step,
    );
    out.write(b"<t>")?;
    out.write_escaped(original)?;
    out.write(b"</t>")?;
    out.finish()?;

    let mut wire = read_available(peer)?;
    wire.truncate(wire.len() - b"]]>]]>".len());

    let mut text = String::new();
    for event in xml::reader::EventReader::new(&wire[..]) {
        if let xml::reader::XmlEvent::Characters(s) = event? {
            text.push_str(&s);
        }
    }
    assert_eq!(text.as_bytes(), original);
    Ok(())
}

/// Drains whatever the writer left on the wire.
fn read_available(mut peer: std::os::unix::net::UnixStream) -> Result<Vec<u8>> {
    use std::io::Read;

    peer.set_read_timeout(Some(Duration::from_millis(200)))?;
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        match peer.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                break;
            },
            Err(e) => return Err(e.into()),
        }
    }
    Ok(buf)
}
