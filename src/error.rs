//! # Error Taxonomy
//!
//! This module defines the error types produced by every layer of the wire
//! stack: transport, framing, PackStream, the message engine, and the
//! transaction/session core. All of them funnel into a single public
//! [`Error`] enum so callers can match on category without needing to know
//! which layer raised it.
//!
//! ## Fatal vs. recoverable
//!
//! [`Error::Transport`], [`Error::Protocol`] and [`Error::Security`] are
//! fatal to the connection that raised them: the connection must be closed
//! and never returned to the pool. [`Error::Database`] is scoped to the
//! request that triggered it and leaves the connection itself usable,
//! though the owning transaction moves to a failed state. [`Error::Client`]
//! indicates caller misuse and never touches the wire.

use std::fmt;
use std::net::SocketAddr;

use thiserror::Error as ThisError;

/// The unified error type for the wire stack.
#[derive(Debug, ThisError)]
pub enum Error {
    /// The socket closed, a DNS lookup failed, or the connection was refused.
    /// Fatal: the connection must be discarded.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// A decode error, an unknown struct tag, or a message arriving out of
    /// order. Fatal: the connection must be discarded.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// TLS certificate validation or authentication failed. Fatal.
    #[error("security error: {0}")]
    Security(String),

    /// No address in the resolved list was reachable within the configured
    /// timeout. Carries every inner error so the caller can diagnose which
    /// address(es) failed and how.
    #[error("service unavailable: no address reachable ({} attempted)", .attempts.len())]
    ServiceUnavailable {
        attempts: Vec<(SocketAddr, String)>,
    },

    /// The caller misused the API: running on a closed transaction, using a
    /// disposed session, a duplicate key in an encoded map, etc. Never
    /// touches the wire.
    #[error("client error: {0}")]
    Client(String),

    /// The server reported a FAILURE response, classified into transient
    /// (safe to retry) or fatal based on its status code.
    #[error("database error [{code}] ({classification}): {message}")]
    Database {
        code: String,
        message: String,
        classification: Classification,
    },

    /// The connect attempt was cancelled because it exceeded the configured
    /// connect timeout.
    #[error("connect timed out after {0:?}")]
    ConnectTimeout(std::time::Duration),
}

impl Error {
    pub fn client(msg: impl Into<String>) -> Self {
        Error::Client(msg.into())
    }

    pub fn security(msg: impl Into<String>) -> Self {
        Error::Security(msg.into())
    }

    /// True if the connection that produced this error must be discarded
    /// rather than returned to the pool.
    pub fn is_fatal_to_connection(&self) -> bool {
        matches!(
            self,
            Error::Transport(_) | Error::Protocol(_) | Error::Security(_) | Error::ConnectTimeout(_)
        )
    }
}

/// Classification of a server-reported [`Error::Database`].
///
/// Mirrors the Neo4j status-code family: `Neo.TransientError.*` is
/// transient, everything else (`Neo.ClientError.*`, `Neo.DatabaseError.*`)
/// is fatal and should not be retried blindly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Transient,
    Fatal,
}

impl Classification {
    pub fn from_status_code(code: &str) -> Self {
        if code.contains(".TransientError.") {
            Classification::Transient
        } else {
            Classification::Fatal
        }
    }
}

#[derive(Debug, ThisError)]
pub enum TransportError {
    #[error("failed to resolve host {host}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: std::io::Error,
    },

    #[error("connection refused or closed: {0}")]
    Io(#[from] std::io::Error),

    #[error("tls handshake failed: {0}")]
    Tls(String),

    #[error("socket already closed")]
    Closed,
}

#[derive(Debug, ThisError)]
pub enum ProtocolError {
    #[error("unknown packstream marker byte 0x{0:02x}")]
    UnknownMarker(u8),

    #[error("unexpected end of stream while decoding a value")]
    UnexpectedEof,

    #[error("invalid utf-8 in string value: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    #[error("struct with tag 0x{tag:02x} declared {declared} fields but {actual} were present")]
    StructArityMismatch {
        tag: u8,
        declared: usize,
        actual: usize,
    },

    #[error("duplicate key {0:?} in map")]
    DuplicateMapKey(String),

    #[error("map key must be a string, found a different value kind")]
    NonStringMapKey,

    #[error("no handler registered for struct tag 0x{0:02x}")]
    UnknownStructTag(u8),

    #[error("malformed chunk: illegal zero-length chunk inside a message")]
    MalformedChunk,

    #[error("server proposed handshake version 0 (no supported version)")]
    HandshakeRejected,

    #[error("response arrived for a request that was never enqueued")]
    UnexpectedResponse,
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Classification::Transient => write!(f, "transient"),
            Classification::Fatal => write!(f, "fatal"),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
