//! Error types for the gateway crate

use std::io;
use std::time::Duration;
use thiserror::Error;
use userstream_core::NotificationKind;

/// Why a line could not be turned into a notification
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseErrorKind {
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    #[error("Missing field `{0}`")]
    MissingField(String),

    #[error("Invalid field `{field}`: {reason}")]
    InvalidField { field: String, reason: String },
}

impl ParseErrorKind {
    pub(crate) fn missing(field: &str) -> Self {
        ParseErrorKind::MissingField(field.to_string())
    }

    pub(crate) fn invalid(field: &str, reason: impl Into<String>) -> Self {
        ParseErrorKind::InvalidField {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

/// A line that failed to parse, with the raw text attached
///
/// Delivered through `StreamHandler::on_exception`; never terminates the
/// connection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}")]
pub struct ParseError {
    pub kind: ParseErrorKind,
    /// The line exactly as received
    pub raw: String,
}

impl ParseError {
    pub fn new(kind: ParseErrorKind, raw: impl Into<String>) -> Self {
        ParseError {
            kind,
            raw: raw.into(),
        }
    }
}

/// Handler registration errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("A callback is already registered for {0}")]
    AlreadyRegistered(NotificationKind),

    #[error("An exception callback is already registered")]
    ExceptionAlreadyRegistered,
}

/// Abnormal end of an ingestion loop
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("No line received within {0:?}")]
    Timeout(Duration),

    #[error("Read failed: {0}")]
    Io(#[from] io::Error),
}

/// Terminal connection failure - the connection stays down until
/// reconnected explicitly
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamFailure {
    #[error("{identity}: stream request rejected with HTTP {status}; tracked keywords: {keywords:?}")]
    RequestRejected {
        identity: String,
        status: u16,
        keywords: Vec<String>,
    },

    #[error("{identity}: HTTP {status} returned {attempts} times in a row")]
    HardErrorLimit {
        identity: String,
        status: u16,
        attempts: u32,
    },

    #[error("{identity}: stream closed by the server {attempts} times in a row")]
    ClosedTooOften { identity: String, attempts: u32 },

    #[error("{identity}: giving up after protocol errors (last HTTP {status}, next wait {wait:?})")]
    ProtocolBackoffExhausted {
        identity: String,
        status: u16,
        wait: Duration,
    },

    #[error("{identity}: giving up after network errors ({reason}, next wait {wait:?})")]
    NetworkBackoffExhausted {
        identity: String,
        reason: String,
        wait: Duration,
    },
}

impl StreamFailure {
    /// HTTP status involved, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            StreamFailure::RequestRejected { status, .. }
            | StreamFailure::HardErrorLimit { status, .. }
            | StreamFailure::ProtocolBackoffExhausted { status, .. } => Some(*status),
            StreamFailure::ClosedTooOften { .. }
            | StreamFailure::NetworkBackoffExhausted { .. } => None,
        }
    }
}
