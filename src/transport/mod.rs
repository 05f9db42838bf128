//! # Socket transport (§4.1)
//!
//! Resolves a host to its address list (honoring `ipv6_enabled`), tries
//! each address in turn under a connect timeout, enables `TCP_NODELAY` and
//! optional keepalive, and wraps the stream in TLS when required. The Bolt
//! handshake and chunk framer that ride on top of this module supply their
//! own framing; this layer only owns the raw byte stream.

mod tls;

use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{lookup_host, TcpStream};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::{DriverConfig, Encryption};
use crate::error::{Error, TransportError};

/// Any duplex byte stream the rest of the driver can speak Bolt over,
/// whether plaintext or TLS-wrapped.
pub trait BoltStream: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> BoltStream for T {}

/// An open connection's byte stream, boxed so the rest of the driver
/// doesn't need to be generic over plaintext vs. TLS.
pub struct Transport {
    stream: Option<Box<dyn BoltStream>>,
    peer: Option<SocketAddr>,
}

impl Transport {
    /// Resolve `host`, try each candidate address under `config`'s connect
    /// timeout, and optionally wrap the winning connection in TLS.
    ///
    /// Address fallback and the aggregate `ServiceUnavailable` error are
    /// per §4.1 / §8 property 11: every inner failure is recorded and
    /// surfaced together only if no address succeeds.
    pub async fn connect(host: &str, port: u16, config: &DriverConfig) -> crate::error::Result<Self> {
        let addrs = resolve(host, port, config.ipv6_enabled).await?;

        let mut attempts = Vec::new();
        for addr in addrs {
            match connect_one(addr, config.connection_timeout, config.socket_keepalive).await {
                Ok(tcp) => {
                    debug!(%addr, "tcp connect succeeded");
                    let stream: Box<dyn BoltStream> = match config.encryption {
                        Encryption::Off => Box::new(tcp),
                        Encryption::Required => {
                            Box::new(wrap_tls(tcp, host, config).await?)
                        }
                    };
                    return Ok(Transport {
                        stream: Some(stream),
                        peer: Some(addr),
                    });
                }
                Err(e) => {
                    // Aggregated with anyhow so each attempt keeps its own
                    // context even once flattened into `ServiceUnavailable`'s
                    // plain-string attempt list (§9B "anyhow used internally
                    // at aggregation points").
                    let aggregated = anyhow::anyhow!(e).context(format!("connecting to {addr}"));
                    warn!(%addr, error = %aggregated, "address unreachable, trying next");
                    attempts.push((addr, format!("{aggregated:#}")));
                }
            }
        }

        Err(Error::ServiceUnavailable { attempts })
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    /// Idempotent: calling this on an already-disconnected transport is a
    /// no-op, matching the open question in §9 about unconditionally
    /// releasing both the stream and the socket handle when non-null.
    pub fn disconnect(&mut self) {
        if self.stream.take().is_some() {
            debug!(peer = ?self.peer, "transport disconnected");
        }
        self.peer = None;
    }
}

impl AsyncRead for Transport {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.stream.as_mut() {
            Some(stream) => Pin::new(stream.as_mut()).poll_read(cx, buf),
            None => Poll::Ready(Err(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "transport is disconnected",
            ))),
        }
    }
}

impl AsyncWrite for Transport {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match self.stream.as_mut() {
            Some(stream) => Pin::new(stream.as_mut()).poll_write(cx, buf),
            None => Poll::Ready(Err(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "transport is disconnected",
            ))),
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.stream.as_mut() {
            Some(stream) => Pin::new(stream.as_mut()).poll_flush(cx),
            None => Poll::Ready(Ok(())),
        }
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.stream.as_mut() {
            Some(stream) => Pin::new(stream.as_mut()).poll_shutdown(cx),
            None => Poll::Ready(Ok(())),
        }
    }
}

async fn resolve(host: &str, port: u16, ipv6_enabled: bool) -> crate::error::Result<Vec<SocketAddr>> {
    let lookup = format!("{host}:{port}");
    let resolved = lookup_host(&lookup)
        .await
        .map_err(|e| Error::Transport(TransportError::Resolve {
            host: host.to_string(),
            source: e,
        }))?;

    let mut addrs: Vec<SocketAddr> = resolved
        .filter(|addr| ipv6_enabled || addr.is_ipv4())
        .collect();

    if addrs.is_empty() {
        return Err(Error::Transport(TransportError::Resolve {
            host: host.to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no usable addresses"),
        }));
    }

    // Prefer IPv6 first so a dual-stack host tries the modern path before
    // falling back, matching §8 property 11.
    addrs.sort_by_key(|a| a.is_ipv4());
    Ok(addrs)
}

async fn connect_one(
    addr: SocketAddr,
    connect_timeout: Duration,
    keepalive: bool,
) -> crate::error::Result<TcpStream> {
    let connect_future = TcpStream::connect(addr);
    match timeout(connect_timeout, connect_future).await {
        Ok(Ok(stream)) => configure_socket(stream, keepalive),
        Ok(Err(e)) => Err(Error::Transport(TransportError::Io(e))),
        Err(_) => Err(Error::ConnectTimeout(connect_timeout)),
    }
}

/// Set `TCP_NODELAY` always, and keepalive when configured, by dropping to
/// a `socket2::Socket` and back via `into_std()` /
/// `socket2::Socket::from(try_clone()?)` / `from_std()`.
fn configure_socket(stream: TcpStream, keepalive: bool) -> crate::error::Result<TcpStream> {
    let std_stream = stream
        .into_std()
        .map_err(|e| Error::Transport(TransportError::Io(e)))?;
    let socket = socket2::Socket::from(
        std_stream
            .try_clone()
            .map_err(|e| Error::Transport(TransportError::Io(e)))?,
    );
    socket
        .set_nodelay(true)
        .map_err(|e| Error::Transport(TransportError::Io(e)))?;
    if keepalive {
        let opts = socket2::TcpKeepalive::new().with_time(Duration::from_secs(60));
        socket
            .set_tcp_keepalive(&opts)
            .map_err(|e| Error::Transport(TransportError::Io(e)))?;
    }
    TcpStream::from_std(std_stream).map_err(|e| Error::Transport(TransportError::Io(e)))
}

async fn wrap_tls(
    tcp: TcpStream,
    host: &str,
    config: &DriverConfig,
) -> crate::error::Result<tokio_rustls::client::TlsStream<TcpStream>> {
    let connector = tls::connector(&config.trust_strategy)?;
    let server_name = rustls::ServerName::try_from(host)
        .map_err(|e| Error::security(format!("invalid server name {host:?}: {e}")))?;
    connector
        .connect(server_name, tcp)
        .await
        .map_err(|e| Error::Transport(TransportError::Tls(e.to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DriverConfig;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn connects_to_a_real_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let accept_task = tokio::spawn(async move {
            let _ = listener.accept().await.unwrap();
        });

        let config = DriverConfig::default();
        let transport = Transport::connect("127.0.0.1", addr.port(), &config)
            .await
            .unwrap();
        assert!(transport.is_open());
        accept_task.await.unwrap();
    }

    #[tokio::test]
    async fn disconnect_is_idempotent() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accept_task = tokio::spawn(async move {
            let _ = listener.accept().await.unwrap();
        });

        let config = DriverConfig::default();
        let mut transport = Transport::connect("127.0.0.1", addr.port(), &config)
            .await
            .unwrap();
        transport.disconnect();
        transport.disconnect();
        assert!(!transport.is_open());
        accept_task.await.unwrap();
    }

    #[tokio::test]
    async fn connect_timeout_on_blackholed_address() {
        // 10.255.255.1 is non-routable in most test environments and will
        // not complete a TCP handshake within the short timeout below.
        let mut config = DriverConfig::default();
        config.connection_timeout = Duration::from_millis(100);

        let result = Transport::connect("10.255.255.1", 7687, &config).await;
        assert!(result.is_err());
    }
}
