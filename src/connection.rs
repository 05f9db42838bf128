//! # Connection (§4.6, §6)
//!
//! Ties the transport, handshake, and message engine together into the
//! single type the rest of the driver programs against: open a socket,
//! negotiate a protocol version, authenticate with HELLO, and from then on
//! expose the pool-facing contract (`sync`, `reset_async`, `send_async`,
//! `receive_one_async`, `is_open`, `close_async`) plus the
//! [`crate::transaction::BoltConnection`] surface transactions drive.

use async_trait::async_trait;
use tracing::debug;

use crate::bookmark::Bookmark;
use crate::config::DriverConfig;
use crate::engine::{Engine, Outcome, ResponseHandler};
use crate::error::{Error, Result};
use crate::handshake::{self, ProtocolVersion};
use crate::messages::Request;
use crate::packstream::Value;
use crate::transport::Transport;

/// A oneshot-style handler that resolves a single future with the
/// request's terminal outcome, accumulating any RECORD responses it sees
/// first. Used for every request this module issues; a result cursor
/// streaming RECORDs to the application sits above this and is out of
/// scope here (see SPEC_FULL.md §2 Non-goals).
struct Collector {
    records: Vec<Vec<Value>>,
    tx: tokio::sync::oneshot::Sender<(Vec<Vec<Value>>, Outcome)>,
}

impl ResponseHandler for Collector {
    fn on_record(&mut self, fields: Vec<Value>) {
        self.records.push(fields);
    }

    fn on_terminal(self: Box<Self>, outcome: Outcome) {
        let _ = self.tx.send((self.records, outcome));
    }
}

/// An authenticated, version-bound connection (§4.6 "opened, authenticated
/// connection bound to one protocol version").
pub struct Connection {
    engine: Engine<Transport>,
    bolt_protocol: ProtocolVersion,
    open: bool,
}

impl Connection {
    /// Connect, negotiate a protocol version, and authenticate with
    /// HELLO. Mirrors §4.5 "perform initialization (authentication + user
    /// agent) by sending HELLO/INIT and awaiting its terminal response".
    pub async fn open(host: &str, port: u16, config: &DriverConfig) -> Result<Self> {
        let mut transport = Transport::connect(host, port, config).await?;
        let bolt_protocol = handshake::negotiate(&mut transport).await?;

        let engine = Engine::new(
            transport,
            config.default_read_buffer_size,
            config.max_read_buffer_size,
        );

        let mut connection = Connection {
            engine,
            bolt_protocol,
            open: true,
        };
        connection.hello(config).await?;
        Ok(connection)
    }

    async fn hello(&mut self, config: &DriverConfig) -> Result<()> {
        let auth = config.auth.clone().into_fields();
        let request = Request::Hello {
            user_agent: config.user_agent.clone(),
            auth,
        };
        let outcome = self.request(request).await?;
        match outcome {
            (_, Outcome::Success(_)) => {
                debug!(major = self.bolt_protocol.major, minor = self.bolt_protocol.minor, "hello succeeded");
                Ok(())
            }
            (_, Outcome::Failure { code, message }) => {
                self.open = false;
                Err(Error::security(format!("hello rejected: {code}: {message}")))
            }
            _ => Err(Error::client("unexpected response to HELLO")),
        }
    }

    pub fn bolt_protocol(&self) -> ProtocolVersion {
        self.bolt_protocol
    }

    pub fn is_open(&self) -> bool {
        self.open && !self.engine.is_broken()
    }

    /// Enqueue and immediately flush, returning the accumulated RECORDs
    /// and terminal outcome for this one request (§4.6 `sync()`).
    pub async fn sync(&mut self, request: Request) -> Result<(Vec<Vec<Value>>, Outcome)> {
        self.request(request).await
    }

    /// Send without waiting for the response to be dispatched (§4.6
    /// `send_async`); pairs with [`Connection::receive_one_async`].
    pub async fn send_async(&mut self, request: Request, handler: Box<dyn ResponseHandler>) -> Result<()> {
        self.engine.enqueue(request, handler)?;
        self.engine.flush().await
    }

    /// Pull and dispatch exactly the responses currently available,
    /// without enqueueing anything new (§4.6 `receive_one_async`).
    pub async fn receive_one_async(&mut self) -> Result<()> {
        self.engine.flush().await
    }

    /// RESET: abort whatever is outstanding, draining queued handlers as
    /// Ignored up to RESET's own SUCCESS (§4.4, §4.6 `reset_async`).
    pub async fn reset_async(&mut self) -> Result<()> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.engine.enqueue_reset(Box::new(Collector { records: Vec::new(), tx }))?;
        self.engine.flush().await?;
        let (_, outcome) = rx.await.map_err(|_| Error::client("reset handler dropped"))?;
        match outcome {
            Outcome::Success(_) => Ok(()),
            Outcome::Failure { code, message } => {
                let classification = crate::error::Classification::from_status_code(&code);
                Err(Error::Database { code, message, classification })
            }
            _ => Ok(()),
        }
    }

    pub async fn close_async(&mut self) -> Result<()> {
        if !self.open {
            return Ok(());
        }
        let _ = self.request(Request::Goodbye).await;
        self.open = false;
        Ok(())
    }

    async fn request(&mut self, request: Request) -> Result<(Vec<Vec<Value>>, Outcome)> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.engine.enqueue(request, Box::new(Collector { records: Vec::new(), tx }))?;
        self.engine.flush().await?;
        rx.await.map_err(|_| Error::client("response handler dropped before resolving"))
    }
}

#[async_trait]
impl crate::transaction::BoltConnection for Connection {
    async fn begin(&mut self, bookmark: &Bookmark, mut extra: Vec<(String, Value)>) -> Result<()> {
        if let Some(b) = bookmark.as_str() {
            extra.push(("bookmarks".to_string(), Value::List(vec![Value::String(b.to_string())])));
        }
        let (_, outcome) = self.request(Request::Begin { extra }).await?;
        expect_success(outcome)
    }

    async fn run(&mut self, statement: &str, parameters: Vec<(String, Value)>) -> Result<()> {
        let (_, outcome) = self
            .request(Request::Run {
                statement: statement.to_string(),
                parameters,
                extra: vec![],
            })
            .await?;
        expect_success(outcome)?;
        let (_, outcome) = self.request(Request::PullAll).await?;
        expect_success(outcome)
    }

    async fn commit(&mut self) -> Result<Bookmark> {
        let (_, outcome) = self.request(Request::Commit).await?;
        match outcome {
            Outcome::Success(meta) => {
                let bookmark = meta
                    .into_iter()
                    .find(|(k, _)| k == "bookmark")
                    .and_then(|(_, v)| v.as_str().map(|s| s.to_string()));
                Ok(Bookmark::from(bookmark))
            }
            Outcome::Failure { code, message } => {
                let classification = crate::error::Classification::from_status_code(&code);
                Err(Error::Database { code, message, classification })
            }
            _ => Err(Error::client("unexpected response to COMMIT")),
        }
    }

    async fn rollback(&mut self) -> Result<()> {
        let (_, outcome) = self.request(Request::Rollback).await?;
        expect_success(outcome)
    }
}

fn expect_success(outcome: Outcome) -> Result<()> {
    match outcome {
        Outcome::Success(_) => Ok(()),
        Outcome::Failure { code, message } => {
            let classification = crate::error::Classification::from_status_code(&code);
            Err(Error::Database { code, message, classification })
        }
        _ => Err(Error::client("unexpected response outcome")),
    }
}
