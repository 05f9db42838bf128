//! # bolt-driver
//!
//! Client-side wire stack for a Bolt-protocol graph database driver:
//! chunked message framing, the PackStream binary codec, struct-tag
//! domain values, the message dispatch engine, protocol version
//! negotiation, and the transaction/session state machine that sits above
//! all of it. Connection pooling and query result materialization are
//! left to a caller; see each module's `Non-goals` for the exact
//! boundary.

pub mod bookmark;
pub mod chunking;
pub mod config;
pub mod connection;
pub mod engine;
pub mod error;
pub mod handshake;
pub mod logging;
pub mod messages;
pub mod packstream;
pub mod session;
pub mod structs;
pub mod transaction;
pub mod transport;
pub mod utils;

pub use bookmark::Bookmark;
pub use config::{AuthToken, DriverConfig, Encryption, TrustStrategy};
pub use connection::Connection;
pub use error::{Error, Result};
pub use session::Session;
pub use transaction::Transaction;

/// The current version of the driver, sent as part of the user agent.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration values (§6).
pub mod defaults {
    use std::time::Duration;

    /// Default connect timeout.
    pub const CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

    /// Default socket read buffer size.
    pub const READ_BUFFER_SIZE: usize = 8192;

    /// Default maximum socket read buffer size before the chunk reader
    /// shrinks its backing store back down.
    pub const MAX_READ_BUFFER_SIZE: usize = 8 * 1024 * 1024;

    /// Default Bolt port.
    pub const PORT: u16 = 7687;
}
