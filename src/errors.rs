// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use thiserror::Error;

/// Error taxonomy of the peer core.
///
/// Framing and classification failures terminate the session they occurred
/// on; `Busy` and `Invalidated` leave session state untouched so the caller
/// may retry or inspect the termination reason.
#[derive(Debug, Error)]
pub enum NcError {
    /// Unrecoverable transport failure. The session becomes invalid.
    #[error("transport broken: {0}")]
    TransportBroken(String),

    /// Orderly EOF / channel-eof from the peer.
    #[error("peer closed the connection")]
    PeerClosed,

    /// The per-message read budget ran out.
    #[error("read timeout elapsed")]
    ReadTimeout,

    /// Bad chunk header, missing terminator or oversized frame.
    #[error("framing violation: {0}")]
    FramingViolation(&'static str),

    /// XML parsed but the root element is not a NETCONF message.
    #[error("malformed message")]
    MalformedMsg,

    /// A hello message that does not satisfy RFC 6241 section 8.1.
    #[error("invalid hello message")]
    BadHello,

    /// Operation attempted on a session outside STARTING/RUNNING, or an
    /// operation the session side/version does not permit.
    #[error("session is not usable for this operation")]
    Invalidated,

    /// A timed lock acquisition ran out of patience.
    #[error("session is busy")]
    Busy,

    /// Assertion-class failure; treated like a broken transport.
    #[error("internal error: {0}")]
    Internal(String),
}

impl NcError {
    /// Whether the error leaves the session usable (retryable contention or
    /// plain misuse) as opposed to terminating it.
    pub fn is_transient(&self) -> bool {
        matches!(self, NcError::Busy | NcError::Invalidated)
    }
}
