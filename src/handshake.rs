//! # Protocol version dispatcher (§4.5)
//!
//! The handshake is the one fixed-format exchange on the wire that
//! precedes chunked PackStream traffic: a 4-byte magic prefix followed by
//! four proposed 32-bit version numbers, answered by a single 32-bit
//! chosen version (`0` meaning "no supported version").

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::debug;

use crate::error::{Error, ProtocolError, TransportError};

/// `0x60 0x60 0xB0 0x17` — the fixed magic prefix that opens every Bolt
/// connection, before any version has been negotiated.
pub const MAGIC_PREFIX: [u8; 4] = [0x60, 0x60, 0xB0, 0x17];

/// A Bolt protocol version, encoded on the wire as major/minor bytes
/// within a 32-bit word (`0x00 0x00 minor major`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ProtocolVersion {
    pub major: u8,
    pub minor: u8,
}

impl ProtocolVersion {
    pub const fn new(major: u8, minor: u8) -> Self {
        ProtocolVersion { major, minor }
    }

    fn to_wire(self) -> u32 {
        u32::from_be_bytes([0, 0, self.minor, self.major])
    }

    fn from_wire(word: u32) -> Option<Self> {
        let bytes = word.to_be_bytes();
        if word == 0 {
            None
        } else {
            Some(ProtocolVersion {
                major: bytes[3],
                minor: bytes[2],
            })
        }
    }
}

/// The versions this driver proposes, newest first. The server picks the
/// first one of these four it also supports.
pub const PROPOSED_VERSIONS: [ProtocolVersion; 4] = [
    ProtocolVersion::new(5, 4),
    ProtocolVersion::new(5, 0),
    ProtocolVersion::new(4, 4),
    ProtocolVersion::new(4, 2),
];

/// Perform the handshake over an already-connected (and, if required,
/// already-TLS-wrapped) stream. Returns the version the server selected,
/// or a fatal [`ProtocolError::HandshakeRejected`] if it proposed none of
/// ours.
pub async fn negotiate<S>(stream: &mut S) -> crate::error::Result<ProtocolVersion>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let mut out = Vec::with_capacity(4 + 4 * 4);
    out.extend_from_slice(&MAGIC_PREFIX);
    for version in PROPOSED_VERSIONS {
        out.extend_from_slice(&version.to_wire().to_be_bytes());
    }
    stream
        .write_all(&out)
        .await
        .map_err(|e| Error::Transport(TransportError::Io(e)))?;
    stream
        .flush()
        .await
        .map_err(|e| Error::Transport(TransportError::Io(e)))?;

    let mut response = [0u8; 4];
    stream
        .read_exact(&mut response)
        .await
        .map_err(|e| Error::Transport(TransportError::Io(e)))?;
    let word = u32::from_be_bytes(response);

    match ProtocolVersion::from_wire(word) {
        Some(version) => {
            debug!(major = version.major, minor = version.minor, "bolt handshake negotiated version");
            Ok(version)
        }
        None => Err(Error::Protocol(ProtocolError::HandshakeRejected)),
    }
}
