// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use bytes::BytesMut;

use crate::{
    cfg::enums::Version,
    errors::NcError,
    framing::END_TAG,
    session::state::StatusCell,
    transport::{Link, ticker::Deadline},
};

/// Assembles one complete message body from the transport.
///
/// The dialect is selected by the session version. One deadline spans every
/// partial read that contributes to the message; `limit`, when set, caps the
/// accumulated body size for the end-tag dialect.
pub fn read_frame(
    link: &mut Link,
    version: Version,
    deadline: &Deadline,
    status: &StatusCell,
    capacity: usize,
    limit: Option<usize>,
) -> Result<BytesMut, NcError> {
    match version {
        Version::V1_0 => read_frame_end_tag(link, deadline, status, capacity, limit),
        Version::V1_1 => read_frame_chunked(link, deadline, status, capacity),
    }
}

/// 1.0 dialect: accumulate until the six-byte `]]>]]>` tail, then strip it.
fn read_frame_end_tag(
    link: &mut Link,
    deadline: &Deadline,
    status: &StatusCell,
    capacity: usize,
    limit: Option<usize>,
) -> Result<BytesMut, NcError> {
    let mut buf = BytesMut::with_capacity(capacity);
    read_until(link, END_TAG, limit, deadline, status, &mut buf)
        .map_err(|e| eof_is_violation(e, !buf.is_empty(), "missing end sequence"))?;
    buf.truncate(buf.len() - END_TAG.len());
    Ok(buf)
}

/// 1.1 dialect: a sequence of `\n#<len>\n<bytes>` chunks closed by `\n##\n`.
fn read_frame_chunked(
    link: &mut Link,
    deadline: &Deadline,
    status: &StatusCell,
    capacity: usize,
) -> Result<BytesMut, NcError> {
    let mut body = BytesMut::with_capacity(capacity);
    let mut scratch = BytesMut::with_capacity(32);
    let mut chunks = 0usize;

    loop {
        let started = chunks > 0 || !body.is_empty();

        // Chunk header opener.
        scratch.clear();
        read_until(link, b"\n#", None, deadline, status, &mut scratch).map_err(
            |e| eof_is_violation(e, started, "invalid frame chunk delimiters"),
        )?;

        // Either "#\n" (end of message) or an ASCII decimal size line.
        scratch.clear();
        read_until(link, b"\n", Some(32), deadline, status, &mut scratch)
            .map_err(|e| eof_is_violation(e, true, "invalid frame chunk delimiters"))
            .map_err(|e| match e {
                NcError::FramingViolation("missing end sequence") => {
                    NcError::FramingViolation("invalid chunk size")
                },
                other => other,
            })?;

        if scratch[..] == *b"#\n" {
            if chunks == 0 {
                return Err(NcError::FramingViolation(
                    "invalid frame chunk delimiters",
                ));
            }
            return Ok(body);
        }

        let size = parse_chunk_size(&scratch[..scratch.len() - 1])?;
        read_exact(link, size, deadline, status, &mut body).map_err(|e| {
            eof_is_violation(e, true, "invalid frame chunk delimiters")
        })?;
        chunks += 1;
    }
}

/// A stream that closes mid-message is a framing violation, not an orderly
/// peer close.
fn eof_is_violation(e: NcError, started: bool, what: &'static str) -> NcError {
    match e {
        NcError::PeerClosed if started => NcError::FramingViolation(what),
        other => other,
    }
}

fn parse_chunk_size(digits: &[u8]) -> Result<usize, NcError> {
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return Err(NcError::FramingViolation("invalid chunk size"));
    }
    let text = std::str::from_utf8(digits)
        .map_err(|_| NcError::FramingViolation("invalid chunk size"))?;
    let size: usize = text
        .parse()
        .map_err(|_| NcError::FramingViolation("invalid chunk size"))?;
    if size == 0 {
        return Err(NcError::FramingViolation("invalid chunk size"));
    }
    Ok(size)
}

/// Reads byte-by-byte until the accumulated tail equals `pat`.
fn read_until(
    link: &mut Link,
    pat: &[u8],
    limit: Option<usize>,
    deadline: &Deadline,
    status: &StatusCell,
    buf: &mut BytesMut,
) -> Result<(), NcError> {
    let mut byte = [0u8; 1];
    loop {
        status.check_io()?;
        let n = link.read_some(&mut byte)?;
        if n == 0 {
            deadline.tick()?;
            continue;
        }
        buf.extend_from_slice(&byte);
        if let Some(limit) = limit
            && buf.len() > limit
        {
            return Err(NcError::FramingViolation("missing end sequence"));
        }
        if buf.len() >= pat.len() && buf[buf.len() - pat.len()..] == *pat {
            return Ok(());
        }
    }
}

/// Reads exactly `n` bytes, appending them to `out`.
fn read_exact(
    link: &mut Link,
    n: usize,
    deadline: &Deadline,
    status: &StatusCell,
    out: &mut BytesMut,
) -> Result<(), NcError> {
    let start = out.len();
    let end = start + n;
    out.resize(end, 0);
    let mut off = start;
    while off < end {
        status.check_io()?;
        let got = link.read_some(&mut out[off..end])?;
        if got == 0 {
            deadline.tick()?;
            continue;
        }
        off += got;
    }
    Ok(())
}
