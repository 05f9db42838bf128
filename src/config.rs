//! # Driver configuration (§6, §9C)
//!
//! `DriverConfig` gathers the recognized options from §6 into one plain
//! struct with a `Default` impl. URI parsing (`bolt://host:port`,
//! `bolt+s://...`, `bolt+ssc://...`) is kept separate from the socket
//! transport itself in [`parse_uri`].

use std::time::Duration;

use uriparse::URI;

use crate::error::Error;

/// Whether the transport wraps the stream in TLS before the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encryption {
    Off,
    Required,
}

/// Chooses the certificate validation predicate used during the TLS
/// handshake (§4.1 "a client handshake whose certificate validation
/// callback consults an injected trust strategy").
#[derive(Debug, Clone)]
pub enum TrustStrategy {
    /// Accept any server certificate. Intended for local development only.
    TrustAll,
    /// Validate against the platform's native CA roots.
    TrustSystemCas,
    /// Validate against a caller-supplied set of CA certificates (PEM).
    TrustCustomCas(Vec<Vec<u8>>),
}

/// Authentication principal/credentials sent in HELLO.
#[derive(Debug, Clone)]
pub struct AuthToken {
    pub scheme: String,
    pub principal: String,
    pub credentials: String,
}

impl AuthToken {
    pub fn basic(principal: impl Into<String>, credentials: impl Into<String>) -> Self {
        AuthToken {
            scheme: "basic".to_string(),
            principal: principal.into(),
            credentials: credentials.into(),
        }
    }

    pub fn none() -> Self {
        AuthToken {
            scheme: "none".to_string(),
            principal: String::new(),
            credentials: String::new(),
        }
    }

    pub fn into_fields(self) -> Vec<(String, crate::packstream::Value)> {
        vec![
            ("scheme".to_string(), crate::packstream::Value::String(self.scheme)),
            (
                "principal".to_string(),
                crate::packstream::Value::String(self.principal),
            ),
            (
                "credentials".to_string(),
                crate::packstream::Value::String(self.credentials),
            ),
        ]
    }
}

#[derive(Debug, Clone)]
pub struct DriverConfig {
    pub encryption: Encryption,
    pub trust_strategy: TrustStrategy,
    pub ipv6_enabled: bool,
    pub connection_timeout: Duration,
    pub socket_keepalive: bool,
    pub default_read_buffer_size: usize,
    pub max_read_buffer_size: usize,
    pub user_agent: String,
    pub auth: AuthToken,
}

impl Default for DriverConfig {
    fn default() -> Self {
        DriverConfig {
            encryption: Encryption::Off,
            trust_strategy: TrustStrategy::TrustSystemCas,
            ipv6_enabled: false,
            connection_timeout: Duration::from_secs(30),
            socket_keepalive: true,
            default_read_buffer_size: 8192,
            max_read_buffer_size: 8 * 1024 * 1024,
            user_agent: format!("bolt-driver/{}", crate::VERSION),
            auth: AuthToken::none(),
        }
    }
}

/// A parsed `bolt://host:port` style connection URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedUri {
    pub host: String,
    pub port: u16,
    pub encrypted: bool,
    /// `true` for `bolt+ssc://`: encrypted but the server certificate may
    /// be self-signed, i.e. the caller is expected to pair this with
    /// `TrustStrategy::TrustAll` rather than `TrustSystemCas`.
    pub self_signed_allowed: bool,
}

const DEFAULT_PORT: u16 = 7687;

/// Parse a `bolt://`, `bolt+s://`, or `bolt+ssc://` URI into host/port and
/// the encryption it implies. Built on `uriparse`, matching the URI crate
/// the reference Neo4j Rust driver depends on for this exact job.
pub fn parse_uri(raw: &str) -> crate::error::Result<ParsedUri> {
    let uri = URI::try_from(raw).map_err(|e| Error::client(format!("invalid uri {raw:?}: {e}")))?;

    let (encrypted, self_signed_allowed) = match uri.scheme().as_str() {
        "bolt" => (false, false),
        "bolt+s" => (true, false),
        "bolt+ssc" => (true, true),
        other => {
            return Err(Error::client(format!(
                "unsupported uri scheme {other:?}, expected bolt, bolt+s, or bolt+ssc"
            )))
        }
    };

    let authority = uri
        .authority()
        .ok_or_else(|| Error::client(format!("uri {raw:?} is missing a host")))?;
    let host = authority.host().to_string();
    let port = authority.port().unwrap_or(DEFAULT_PORT);

    Ok(ParsedUri {
        host,
        port,
        encrypted,
        self_signed_allowed,
    })
}
