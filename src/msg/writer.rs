// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use crate::{
    errors::NcError,
    framing::FrameWriter,
    msg::{
        BASE_NS, NOTIF_NS, WithDefaults, XmlFragment,
        classify::RpcEnvelope,
        error::RpcError,
    },
};

/// Body of an rpc-reply.
pub enum Reply<'a> {
    /// `<ok/>`.
    Ok,
    /// `<data>` wrapping an externally serialized tree.
    Data {
        mode: WithDefaults,
        tree: &'a dyn crate::msg::DataTree,
    },
    /// One `<rpc-error>` per entry.
    Error(&'a [RpcError]),
}

/// `<rpc message-id="N">` wrapping the operation fragment. The extra
/// attribute string, when given, is written verbatim and must carry its own
/// leading space.
pub(crate) fn emit_rpc(
    out: &mut FrameWriter<'_>,
    msgid: u64,
    attrs: Option<&str>,
    op: &dyn XmlFragment,
) -> Result<(), NcError> {
    out.write_str("<rpc xmlns=\"")?;
    out.write_str(BASE_NS)?;
    out.write_str("\" message-id=\"")?;
    out.write_str(&msgid.to_string())?;
    out.write_str("\"")?;
    if let Some(attrs) = attrs {
        out.write_str(attrs)?;
    }
    out.write_str(">")?;
    op.write_xml(out)?;
    out.write_str("</rpc>")?;
    out.finish()
}

/// `<rpc-reply>` mirroring the originating rpc's prefix and attributes.
///
/// Without an originating rpc (the malformed-message reply) only the base
/// namespace attribute is written.
pub(crate) fn emit_reply(
    out: &mut FrameWriter<'_>,
    envelope: Option<&RpcEnvelope>,
    reply: &Reply<'_>,
) -> Result<(), NcError> {
    let elem = match envelope.and_then(|e| e.prefix.as_deref()) {
        Some(prefix) => format!("{prefix}:rpc-reply"),
        None => "rpc-reply".to_string(),
    };

    out.write_str("<")?;
    out.write_str(&elem)?;
    match envelope {
        Some(env) => {
            match env.prefix.as_deref() {
                Some(prefix) => {
                    out.write_str(&format!(" xmlns:{prefix}=\""))?;
                },
                None => out.write_str(" xmlns=\"")?,
            }
            out.write_str(&env.namespace)?;
            out.write_str("\"")?;
            for (name, value) in &env.attrs {
                out.write_str(" ")?;
                out.write_str(name)?;
                out.write_str("=\"")?;
                out.write_escaped(value.as_bytes())?;
                out.write_str("\"")?;
            }
        },
        None => {
            out.write_str(" xmlns=\"")?;
            out.write_str(BASE_NS)?;
            out.write_str("\"")?;
        },
    }
    out.write_str(">")?;

    match reply {
        Reply::Ok => out.write_str("<ok/>")?,
        Reply::Data { mode, tree } => {
            out.write_str("<data xmlns=\"")?;
            out.write_str(BASE_NS)?;
            out.write_str("\">")?;
            tree.write_xml(out, *mode)?;
            out.write_str("</data>")?;
        },
        Reply::Error(errors) => {
            for err in *errors {
                emit_rpc_error(out, err)?;
            }
        },
    }

    out.write_str("</")?;
    out.write_str(&elem)?;
    out.write_str(">")?;
    out.finish()
}

/// One `<rpc-error>`; child order is fixed by RFC 6241.
fn emit_rpc_error(out: &mut FrameWriter<'_>, err: &RpcError) -> Result<(), NcError> {
    out.write_str("<rpc-error>")?;

    out.write_str("<error-type>")?;
    out.write_str(&err.typ.to_string())?;
    out.write_str("</error-type>")?;

    out.write_str("<error-tag>")?;
    out.write_str(&err.tag.to_string())?;
    out.write_str("</error-tag>")?;

    out.write_str("<error-severity>error</error-severity>")?;

    if let Some(app_tag) = &err.app_tag {
        out.write_str("<error-app-tag>")?;
        out.write_escaped(app_tag.as_bytes())?;
        out.write_str("</error-app-tag>")?;
    }
    if let Some(path) = &err.path {
        out.write_str("<error-path>")?;
        out.write_escaped(path.as_bytes())?;
        out.write_str("</error-path>")?;
    }
    if let Some(message) = &err.message {
        out.write_str("<error-message xml:lang=\"")?;
        out.write_str(err.message_lang.as_deref().unwrap_or("en"))?;
        out.write_str("\">")?;
        out.write_escaped(message.as_bytes())?;
        out.write_str("</error-message>")?;
    }
    if let Some(info) = &err.info {
        out.write_str("<error-info>")?;
        if let Some(sid) = info.session_id {
            out.write_str("<session-id>")?;
            out.write_str(&sid.to_string())?;
            out.write_str("</session-id>")?;
        }
        for attr in &info.bad_attribute {
            out.write_str("<bad-attribute>")?;
            out.write_escaped(attr.as_bytes())?;
            out.write_str("</bad-attribute>")?;
        }
        for elem in &info.bad_element {
            out.write_str("<bad-element>")?;
            out.write_escaped(elem.as_bytes())?;
            out.write_str("</bad-element>")?;
        }
        for ns in &info.bad_namespace {
            out.write_str("<bad-namespace>")?;
            out.write_escaped(ns.as_bytes())?;
            out.write_str("</bad-namespace>")?;
        }
        for subtree in &info.other {
            out.write_str(subtree)?;
        }
        out.write_str("</error-info>")?;
    }

    out.write_str("</rpc-error>")
}

/// `<notification><eventTime>…` wrapping the notification content.
pub(crate) fn emit_notif(
    out: &mut FrameWriter<'_>,
    event_time: &str,
    body: &dyn XmlFragment,
) -> Result<(), NcError> {
    out.write_str("<notification xmlns=\"")?;
    out.write_str(NOTIF_NS)?;
    out.write_str("\"><eventTime>")?;
    out.write_str(event_time)?;
    out.write_str("</eventTime>")?;
    body.write_xml(out)?;
    out.write_str("</notification>")?;
    out.finish()
}

/// `<hello>` with the capability list and, for servers, the session id.
pub(crate) fn emit_hello(
    out: &mut FrameWriter<'_>,
    capabilities: &[String],
    session_id: Option<u32>,
) -> Result<(), NcError> {
    out.write_str("<hello xmlns=\"")?;
    out.write_str(BASE_NS)?;
    out.write_str("\"><capabilities>")?;
    for cap in capabilities {
        out.write_str("<capability>")?;
        out.write_escaped(cap.as_bytes())?;
        out.write_str("</capability>")?;
    }
    out.write_str("</capabilities>")?;
    if let Some(sid) = session_id {
        out.write_str("<session-id>")?;
        out.write_str(&sid.to_string())?;
        out.write_str("</session-id>")?;
    }
    out.write_str("</hello>")?;
    out.finish()
}
