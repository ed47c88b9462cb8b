// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use core::fmt;

use serde::{Deserialize, Serialize};

/// Which end of the NETCONF conversation this process plays.
///
/// Clients number outgoing RPCs and collect the peer capability list;
/// servers track creation/last-rpc times and may answer malformed messages
/// with an rpc-error reply.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    #[serde(rename = "Client", alias = "client", alias = "CLIENT")]
    Client,
    #[serde(rename = "Server", alias = "server", alias = "SERVER")]
    Server,
}
impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Side::Client => "Client",
            Side::Server => "Server",
        })
    }
}
impl Side {
    pub fn is_client(self) -> bool {
        matches!(self, Side::Client)
    }

    pub fn is_server(self) -> bool {
        matches!(self, Side::Server)
    }
}

/// NETCONF protocol version, fixed at hello completion.
///
/// `V1_0` frames messages with the `]]>]]>` end tag (RFC 4742), `V1_1`
/// with chunked framing (RFC 6242).
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Version {
    #[serde(rename = "1.0", alias = "v1.0", alias = "V1_0")]
    V1_0,
    #[serde(rename = "1.1", alias = "v1.1", alias = "V1_1")]
    V1_1,
}
impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Version::V1_0 => "1.0",
            Version::V1_1 => "1.1",
        })
    }
}

/// Lowest protocol version the embedder is willing to run.
///
/// The floor restricts what the hello exchange may settle on; with the
/// default `V1_0` both dialects are acceptable and 1.1 is preferred.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VersionFloor {
    #[default]
    #[serde(rename = "1.0", alias = "v1.0", alias = "V1_0")]
    V1_0,
    #[serde(rename = "1.1", alias = "v1.1", alias = "V1_1")]
    V1_1,
}
impl fmt::Display for VersionFloor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            VersionFloor::V1_0 => "1.0",
            VersionFloor::V1_1 => "1.1",
        })
    }
}

/// Transport selector of a session; immutable for the session lifetime.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    #[serde(rename = "FD", alias = "fd")]
    Fd,
    #[serde(rename = "SSH", alias = "ssh")]
    Ssh,
    #[serde(rename = "TLS", alias = "tls")]
    Tls,
}
impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TransportKind::Fd => "FD",
            TransportKind::Ssh => "SSH",
            TransportKind::Tls => "TLS",
        })
    }
}
