// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use xml::reader::{EventReader, XmlEvent};

use crate::msg::{BASE_NS, NOTIF_NS};

/// Attributes of a received `<rpc>` element, captured so a reply can mirror
/// its prefix and copy its attributes verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcEnvelope {
    /// Namespace prefix the rpc element carried, if any.
    pub prefix: Option<String>,
    /// Namespace the rpc element resolved to (always the base namespace).
    pub namespace: String,
    /// Attributes in document order as (qualified-name, value).
    pub attrs: Vec<(String, String)>,
}

impl RpcEnvelope {
    pub fn message_id(&self) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(name, _)| name == "message-id")
            .map(|(_, value)| value.as_str())
    }
}

/// Result of inspecting the top-level element of a message body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classified {
    Hello,
    Rpc(RpcEnvelope),
    Reply,
    Notif,
    /// XML parsed (or failed to), but the root is not a NETCONF message.
    Malformed,
}

/// Validates the top-level element namespace and local name.
pub fn classify(body: &[u8]) -> Classified {
    let mut reader = EventReader::new(body);
    loop {
        match reader.next() {
            Ok(XmlEvent::StartDocument { .. })
            | Ok(XmlEvent::ProcessingInstruction { .. })
            | Ok(XmlEvent::Comment(_))
            | Ok(XmlEvent::Whitespace(_)) => continue,
            Ok(XmlEvent::StartElement {
                name, attributes, ..
            }) => {
                let ns = name.namespace.as_deref().unwrap_or("");
                let namespace = ns.to_string();
                return match (ns, name.local_name.as_str()) {
                    (BASE_NS, "rpc") => Classified::Rpc(RpcEnvelope {
                        prefix: name.prefix,
                        namespace,
                        attrs: attributes
                            .iter()
                            .map(|a| {
                                let qname = match &a.name.prefix {
                                    Some(p) => format!("{p}:{}", a.name.local_name),
                                    None => a.name.local_name.clone(),
                                };
                                (qname, a.value.clone())
                            })
                            .collect(),
                    }),
                    (BASE_NS, "rpc-reply") => Classified::Reply,
                    (BASE_NS, "hello") => Classified::Hello,
                    (NOTIF_NS, "notification") => Classified::Notif,
                    _ => Classified::Malformed,
                };
            },
            _ => return Classified::Malformed,
        }
    }
}
