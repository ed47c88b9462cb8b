// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::time::Duration;

use crate::{
    cfg::enums::Version,
    errors::NcError,
    framing::{CHUNK_END, END_TAG},
    session::state::StatusCell,
    transport::Link,
};

/// Buffered write callback external XML serializers stream into.
///
/// Payload accumulates in a fixed-capacity buffer; every flush leaves the
/// buffer as one framed chunk on the wire (1.1) or as raw bytes (1.0).
/// [`FrameWriter::finish`] is the mandatory end-of-message signal: it
/// flushes and emits the dialect terminator.
#[derive(Debug)]
pub struct FrameWriter<'a> {
    link: &'a mut Link,
    status: &'a StatusCell,
    version: Version,
    capacity: usize,
    step: Duration,
    buf: Vec<u8>,
}

impl<'a> FrameWriter<'a> {
    pub fn new(
        link: &'a mut Link,
        status: &'a StatusCell,
        version: Version,
        capacity: usize,
        step: Duration,
    ) -> Self {
        Self {
            link,
            status,
            version,
            capacity,
            step,
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn version(&self) -> Version {
        self.version
    }

    /// Appends raw bytes, flushing first if they would overflow the buffer.
    /// A payload larger than the whole buffer bypasses it as its own chunk.
    pub fn write(&mut self, src: &[u8]) -> Result<(), NcError> {
        if src.is_empty() {
            return Ok(());
        }
        if self.buf.len() + src.len() > self.capacity {
            self.flush()?;
        }
        if src.len() > self.capacity {
            return self.emit(src);
        }
        self.buf.extend_from_slice(src);
        Ok(())
    }

    pub fn write_str(&mut self, src: &str) -> Result<(), NcError> {
        self.write(src.as_bytes())
    }

    /// Appends payload text, escaping the XML-significant bytes on the way.
    pub fn write_escaped(&mut self, src: &[u8]) -> Result<(), NcError> {
        for &b in src {
            match b {
                b'&' => self.push_piece(b"&amp;")?,
                b'<' => self.push_piece(b"&lt;")?,
                b'>' => self.push_piece(b"&gt;")?,
                _ => self.push_piece(&[b])?,
            }
        }
        Ok(())
    }

    /// End-of-message: flush whatever is buffered and emit the terminator.
    pub fn finish(&mut self) -> Result<(), NcError> {
        self.flush()?;
        match self.version {
            Version::V1_1 => self.raw(CHUNK_END),
            Version::V1_0 => self.raw(END_TAG),
        }
    }

    fn push_piece(&mut self, piece: &[u8]) -> Result<(), NcError> {
        if self.buf.len() + piece.len() > self.capacity {
            self.flush()?;
        }
        self.buf.extend_from_slice(piece);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), NcError> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let chunk = std::mem::take(&mut self.buf);
        let res = self.emit(&chunk);
        self.buf = chunk;
        self.buf.clear();
        res
    }

    fn emit(&mut self, bytes: &[u8]) -> Result<(), NcError> {
        match self.version {
            Version::V1_1 => {
                let header = format!("\n#{}\n", bytes.len());
                self.raw(header.as_bytes())?;
                self.raw(bytes)
            },
            Version::V1_0 => self.raw(bytes),
        }
    }

    fn raw(&mut self, bytes: &[u8]) -> Result<(), NcError> {
        self.link.write_all(bytes, self.status, self.step)
    }
}
