// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use core::fmt;

/// `<error-type>` values (RFC 6241 section 4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorType {
    Transport,
    Rpc,
    Protocol,
    Application,
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ErrorType::Transport => "transport",
            ErrorType::Rpc => "rpc",
            ErrorType::Protocol => "protocol",
            ErrorType::Application => "application",
        })
    }
}

/// `<error-tag>` values (RFC 6241 section 4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorTag {
    InUse,
    InvalidValue,
    TooBig,
    MissingAttribute,
    BadAttribute,
    UnknownAttribute,
    MissingElement,
    BadElement,
    UnknownElement,
    UnknownNamespace,
    AccessDenied,
    LockDenied,
    ResourceDenied,
    RollbackFailed,
    DataExists,
    DataMissing,
    OperationNotSupported,
    OperationFailed,
    PartialOperation,
    MalformedMessage,
}

impl fmt::Display for ErrorTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ErrorTag::InUse => "in-use",
            ErrorTag::InvalidValue => "invalid-value",
            ErrorTag::TooBig => "too-big",
            ErrorTag::MissingAttribute => "missing-attribute",
            ErrorTag::BadAttribute => "bad-attribute",
            ErrorTag::UnknownAttribute => "unknown-attribute",
            ErrorTag::MissingElement => "missing-element",
            ErrorTag::BadElement => "bad-element",
            ErrorTag::UnknownElement => "unknown-element",
            ErrorTag::UnknownNamespace => "unknown-namespace",
            ErrorTag::AccessDenied => "access-denied",
            ErrorTag::LockDenied => "lock-denied",
            ErrorTag::ResourceDenied => "resource-denied",
            ErrorTag::RollbackFailed => "rollback-failed",
            ErrorTag::DataExists => "data-exists",
            ErrorTag::DataMissing => "data-missing",
            ErrorTag::OperationNotSupported => "operation-not-supported",
            ErrorTag::OperationFailed => "operation-failed",
            ErrorTag::PartialOperation => "partial-operation",
            ErrorTag::MalformedMessage => "malformed-message",
        })
    }
}

/// Optional `<error-info>` content.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorInfo {
    /// `<session-id>` of the offending session.
    pub session_id: Option<u32>,
    pub bad_attribute: Vec<String>,
    pub bad_element: Vec<String>,
    pub bad_namespace: Vec<String>,
    /// Caller-supplied pre-serialized subtrees, emitted verbatim.
    pub other: Vec<String>,
}

/// One `<rpc-error>` entry. Severity is always `error`; RFC 6241 defines
/// no tag with warning severity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcError {
    pub typ: ErrorType,
    pub tag: ErrorTag,
    pub app_tag: Option<String>,
    pub path: Option<String>,
    pub message: Option<String>,
    /// `xml:lang` of the message text; `en` when unset.
    pub message_lang: Option<String>,
    pub info: Option<ErrorInfo>,
}

impl RpcError {
    pub fn new(typ: ErrorType, tag: ErrorTag) -> Self {
        Self {
            typ,
            tag,
            app_tag: None,
            path: None,
            message: None,
            message_lang: None,
            info: None,
        }
    }

    /// The reply body sent back for a message that parsed but is not a
    /// NETCONF request.
    pub fn malformed_message() -> Self {
        Self::new(ErrorType::Rpc, ErrorTag::MalformedMessage)
    }

    pub fn with_message<S: Into<String>>(mut self, text: S) -> Self {
        self.message = Some(text.into());
        self
    }

    pub fn with_app_tag<S: Into<String>>(mut self, tag: S) -> Self {
        self.app_tag = Some(tag.into());
        self
    }

    pub fn with_path<S: Into<String>>(mut self, path: S) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_info(mut self, info: ErrorInfo) -> Self {
        self.info = Some(info);
        self
    }
}
