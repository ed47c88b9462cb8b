// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use xml::reader::{EventReader, XmlEvent};

use crate::{
    cfg::enums::{Version, VersionFloor},
    errors::NcError,
    msg::{BASE_NS, CAP_BASE_1_0, CAP_BASE_1_1},
};

/// Content of a received hello message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelloInfo {
    pub capabilities: Vec<String>,
    /// Present only in server hellos.
    pub session_id: Option<u32>,
}

/// Parses `<hello><capabilities><capability>…` plus the optional
/// `<session-id>`.
///
/// A hello without at least one base capability is rejected; so is any
/// parse failure or a non-numeric session id.
pub fn parse_hello(body: &[u8]) -> Result<HelloInfo, NcError> {
    let mut capabilities = Vec::new();
    let mut session_id = None;
    let mut path: Vec<String> = Vec::new();
    let mut text = String::new();

    for event in EventReader::new(body) {
        match event.map_err(|_| NcError::BadHello)? {
            XmlEvent::StartElement { name, .. } => {
                if path.is_empty()
                    && (name.namespace.as_deref() != Some(BASE_NS)
                        || name.local_name != "hello")
                {
                    return Err(NcError::BadHello);
                }
                path.push(name.local_name);
                text.clear();
            },
            XmlEvent::Characters(s) | XmlEvent::CData(s) => text.push_str(&s),
            XmlEvent::EndElement { .. } => {
                let names: Vec<&str> = path.iter().map(String::as_str).collect();
                match names.as_slice() {
                    ["hello", "capabilities", "capability"] => {
                        capabilities.push(text.trim().to_string());
                    },
                    ["hello", "session-id"] => {
                        let id = text
                            .trim()
                            .parse::<u32>()
                            .map_err(|_| NcError::BadHello)?;
                        session_id = Some(id);
                    },
                    _ => {},
                }
                path.pop();
                text.clear();
            },
            _ => {},
        }
    }

    if capabilities.is_empty() {
        return Err(NcError::BadHello);
    }
    if !capabilities.iter().any(|c| is_base_cap(c)) {
        return Err(NcError::BadHello);
    }

    Ok(HelloInfo {
        capabilities,
        session_id,
    })
}

fn is_base_cap(cap: &str) -> bool {
    cap_matches(cap, CAP_BASE_1_0) || cap_matches(cap, CAP_BASE_1_1)
}

/// Capability URIs may carry a query part; the base URI decides.
fn cap_matches(cap: &str, uri: &str) -> bool {
    cap == uri || (cap.starts_with(uri) && cap[uri.len()..].starts_with('?'))
}

/// Picks the session version from the peer capability list.
///
/// Both dialects advertised locally, 1.1 preferred; the configured floor
/// can force 1.1-only operation.
pub fn negotiate_version(
    floor: VersionFloor,
    peer_caps: &[String],
) -> Result<Version, NcError> {
    let peer_11 = peer_caps.iter().any(|c| cap_matches(c, CAP_BASE_1_1));
    let peer_10 = peer_caps.iter().any(|c| cap_matches(c, CAP_BASE_1_0));

    match floor {
        VersionFloor::V1_1 => {
            if peer_11 {
                Ok(Version::V1_1)
            } else {
                Err(NcError::BadHello)
            }
        },
        VersionFloor::V1_0 => {
            if peer_11 {
                Ok(Version::V1_1)
            } else if peer_10 {
                Ok(Version::V1_0)
            } else {
                Err(NcError::BadHello)
            }
        },
    }
}
