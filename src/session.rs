//! # Session (§4.8)
//!
//! A session is the application-facing handle: it holds the causal
//! bookmark across transactions opened on it, feeding it into each BEGIN
//! and adopting whatever bookmark the previous transaction returned.
//! Autocommit `run` is a transient transaction that pipelines
//! BEGIN+RUN+COMMIT without exposing transaction control to the caller.

use crate::bookmark::Bookmark;
use crate::error::Result;
use crate::packstream::Value;
use crate::transaction::{BoltConnection, ResourceHandler, Transaction};

/// Single-consumer handle over one connection (§5 "A session is
/// single-consumer"). The caller must not issue overlapping operations on
/// the same session.
pub struct Session<C: BoltConnection> {
    connection: Option<C>,
    bookmark: Bookmark,
}

struct BookmarkAdopter<'a> {
    target: &'a mut Bookmark,
}

impl<'a> ResourceHandler for BookmarkAdopter<'a> {
    fn on_dispose(&mut self, bookmark: Bookmark) {
        // §4.8 "adopts the newly returned bookmark (possibly empty)" —
        // unconditional, unlike `Session::adopt` below which is the public
        // entry point for callers handing back a bookmark from elsewhere.
        *self.target = bookmark;
    }
}

impl<C: BoltConnection> Session<C> {
    pub fn new(connection: C) -> Self {
        Session {
            connection: Some(connection),
            bookmark: Bookmark::empty(),
        }
    }

    pub fn with_bookmark(connection: C, bookmark: Bookmark) -> Self {
        Session {
            connection: Some(connection),
            bookmark,
        }
    }

    pub fn bookmark(&self) -> &Bookmark {
        &self.bookmark
    }

    /// Open an explicit transaction, passing this session's current
    /// bookmark to BEGIN. The transaction only borrows the connection
    /// (§4.3 "an owning connection reference (borrowed from the pool; not
    /// owned)"), and carries a resource handler that writes the bookmark
    /// it terminates with straight back into this session, so the session
    /// is ready for more work the moment the returned `Transaction` is
    /// dropped.
    pub async fn begin_transaction(&mut self, extra: Vec<(String, Value)>) -> Result<Transaction<'_, C>> {
        let Session { connection, bookmark } = self;
        let connection = connection
            .as_mut()
            .ok_or_else(|| crate::error::Error::client("session has no connection, already closed"))?;
        let begin_bookmark = bookmark.clone();
        let handler = BookmarkAdopter { target: bookmark };
        let mut tx = Transaction::new(connection, Some(Box::new(handler)));
        tx.begin(&begin_bookmark, extra).await?;
        Ok(tx)
    }

    /// Record a bookmark handed back from elsewhere (e.g. chained in from
    /// another session), matching §4.8 "adopts the newly returned bookmark
    /// (possibly empty)".
    pub fn adopt(&mut self, bookmark: Bookmark) {
        self.bookmark = bookmark;
    }

    /// Autocommit RUN: a transient transaction that pipelines
    /// BEGIN+RUN+COMMIT and adopts the resulting bookmark (§4.8).
    pub async fn run(&mut self, statement: &str, parameters: Vec<(String, Value)>) -> Result<()> {
        let Session { connection, bookmark } = self;
        let connection = connection
            .as_mut()
            .ok_or_else(|| crate::error::Error::client("session has no connection, already closed"))?;
        let begin_bookmark = bookmark.clone();
        let handler = BookmarkAdopter { target: bookmark };
        let mut tx = Transaction::new(connection, Some(Box::new(handler)));

        tx.begin(&begin_bookmark, vec![]).await?;
        let run_result = tx.run(statement, parameters).await;
        match &run_result {
            Ok(()) => tx.success(),
            Err(_) => tx.failure(),
        }
        let dispose_result = tx.dispose().await;
        run_result.and(dispose_result)
    }

    pub fn close(&mut self) {
        self.connection = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Result as DriverResult};
    use async_trait::async_trait;

    #[derive(Default)]
    struct FakeConnection {
        seen_bookmark: Option<Bookmark>,
        fail_run: bool,
    }

    #[async_trait]
    impl BoltConnection for FakeConnection {
        async fn begin(&mut self, bookmark: &Bookmark, _extra: Vec<(String, Value)>) -> DriverResult<()> {
            self.seen_bookmark = Some(bookmark.clone());
            Ok(())
        }

        async fn run(&mut self, _statement: &str, _parameters: Vec<(String, Value)>) -> DriverResult<()> {
            if self.fail_run {
                Err(Error::client("boom"))
            } else {
                Ok(())
            }
        }

        async fn commit(&mut self) -> DriverResult<Bookmark> {
            Ok(Bookmark::new("tx:after-commit"))
        }

        async fn rollback(&mut self) -> DriverResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn autocommit_run_adopts_returned_bookmark() {
        let mut session = Session::new(FakeConnection::default());
        session.run("RETURN 1", vec![]).await.unwrap();
        assert_eq!(session.bookmark().as_str(), Some("tx:after-commit"));
    }

    #[tokio::test]
    async fn autocommit_run_passes_existing_bookmark_to_begin() {
        let mut session = Session::with_bookmark(FakeConnection::default(), Bookmark::new("tx:0"));
        session.run("RETURN 1", vec![]).await.unwrap();
        assert_eq!(session.bookmark().as_str(), Some("tx:after-commit"));
    }

    #[tokio::test]
    async fn failed_autocommit_run_surfaces_error() {
        let mut conn = FakeConnection::default();
        conn.fail_run = true;
        let mut session = Session::new(conn);
        let result = session.run("RETURN 1", vec![]).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn explicit_transaction_only_borrows_the_connection_so_the_session_stays_usable() {
        let mut session = Session::new(FakeConnection::default());
        {
            let mut tx = session.begin_transaction(vec![]).await.unwrap();
            tx.run("RETURN 1", vec![]).await.unwrap();
            tx.success();
            tx.dispose().await.unwrap();
        }
        assert_eq!(session.bookmark().as_str(), Some("tx:after-commit"));

        // the session's connection was only ever borrowed, never moved, so
        // a second operation on the same session still works.
        session.run("RETURN 2", vec![]).await.unwrap();
    }
}
