//! NETCONF message model: classification, hello parsing, rpc-error
//! structure and the typed message writers.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

/// Root-element classification.
pub mod classify;
/// rpc-error model.
pub mod error;
/// Hello parsing and version negotiation.
pub mod hello;
/// Typed message writers.
pub mod writer;

use bytes::Bytes;

use crate::{errors::NcError, framing::FrameWriter, msg::classify::RpcEnvelope};

/// NETCONF base namespace (RFC 6241) for rpc / rpc-reply / hello.
pub const BASE_NS: &str = "urn:ietf:params:xml:ns:netconf:base:1.0";
/// Notification namespace for the `notification` element.
pub const NOTIF_NS: &str = "urn:ietf:params:xml:ns:netconf:notification:1.0";

/// Capability URI advertising the 1.0 dialect.
pub const CAP_BASE_1_0: &str = "urn:ietf:params:netconf:base:1.0";
/// Capability URI advertising the 1.1 dialect.
pub const CAP_BASE_1_1: &str = "urn:ietf:params:netconf:base:1.1";

/// Kind of a received message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MsgType {
    Hello,
    Rpc,
    Reply,
    Notif,
    /// Nothing arrived within the requested wait; not an error.
    WouldBlock,
}

/// One received message. The body is the raw UTF-8 of the deframed payload;
/// tree construction belongs to the embedder's XML layer.
#[derive(Debug)]
pub struct Message {
    pub kind: MsgType,
    pub body: Bytes,
    /// Captured `<rpc>` attributes for reply mirroring; present on `Rpc`.
    pub envelope: Option<RpcEnvelope>,
}

impl Message {
    pub(crate) fn would_block() -> Self {
        Self {
            kind: MsgType::WouldBlock,
            body: Bytes::new(),
            envelope: None,
        }
    }
}

/// With-defaults rendering mode passed through to the data serializer
/// (RFC 6243).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WithDefaults {
    #[default]
    Explicit,
    Trim,
    All,
    AllTag,
}

/// Anything the embedder's XML layer can stream into an outgoing message.
///
/// Raw pre-serialized fragments get a blanket implementation; real tree
/// serializers print straight into the frame writer.
pub trait XmlFragment {
    fn write_xml(&self, out: &mut FrameWriter<'_>) -> Result<(), NcError>;
}

impl XmlFragment for [u8] {
    fn write_xml(&self, out: &mut FrameWriter<'_>) -> Result<(), NcError> {
        out.write(self)
    }
}

impl XmlFragment for str {
    fn write_xml(&self, out: &mut FrameWriter<'_>) -> Result<(), NcError> {
        out.write(self.as_bytes())
    }
}

impl XmlFragment for Bytes {
    fn write_xml(&self, out: &mut FrameWriter<'_>) -> Result<(), NcError> {
        out.write(self)
    }
}

/// A reply data tree; unlike plain fragments it receives the negotiated
/// with-defaults mode.
pub trait DataTree {
    fn write_xml(
        &self,
        out: &mut FrameWriter<'_>,
        mode: WithDefaults,
    ) -> Result<(), NcError>;
}

impl DataTree for [u8] {
    fn write_xml(
        &self,
        out: &mut FrameWriter<'_>,
        _mode: WithDefaults,
    ) -> Result<(), NcError> {
        out.write(self)
    }
}

impl DataTree for str {
    fn write_xml(
        &self,
        out: &mut FrameWriter<'_>,
        _mode: WithDefaults,
    ) -> Result<(), NcError> {
        out.write(self.as_bytes())
    }
}
