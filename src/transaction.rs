//! # Transaction state machine (§4.7)
//!
//! `Transaction` drives the explicit-transaction lifecycle over a
//! [`BoltConnection`]: `Ready → Active → Committing/RollingBack →
//! Succeeded | Failed | Aborted`, with a terminal `MarkedToClose` reachable
//! from any non-terminal state. State transitions are plain data; the
//! actual wire traffic is delegated to whatever connection the transaction
//! was opened on.

use async_trait::async_trait;

use crate::bookmark::Bookmark;
use crate::error::{Error, Result};
use crate::packstream::Value;

/// The transaction's lifecycle state (§4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Ready,
    Active,
    Committing,
    RollingBack,
    Succeeded,
    Failed,
    Aborted,
    MarkedToClose,
}

impl State {
    fn is_terminal(self) -> bool {
        matches!(
            self,
            State::Succeeded | State::Failed | State::Aborted | State::MarkedToClose
        )
    }
}

/// Notified exactly once per transaction life, when it reaches a terminal
/// state, so a session can adopt the returned bookmark (§4.8).
pub trait ResourceHandler: Send {
    fn on_dispose(&mut self, bookmark: Bookmark);
}

/// What a transaction needs from its owning connection: enough to drive
/// BEGIN/RUN/COMMIT/ROLLBACK without this module knowing about chunking,
/// PackStream, or the message engine directly.
#[async_trait]
pub trait BoltConnection: Send {
    async fn begin(&mut self, bookmark: &Bookmark, extra: Vec<(String, Value)>) -> Result<()>;
    async fn run(&mut self, statement: &str, parameters: Vec<(String, Value)>) -> Result<()>;
    async fn commit(&mut self) -> Result<Bookmark>;
    async fn rollback(&mut self) -> Result<()>;
}

/// An explicit transaction opened on a borrowed connection (§4.3 "an owning
/// connection reference (borrowed from the pool; not owned)"): the
/// transaction never takes the connection away from its session, so the
/// session stays usable for further transactions the moment this one is
/// dropped.
pub struct Transaction<'c, C: BoltConnection> {
    connection: &'c mut C,
    state: State,
    success_flag: bool,
    failure_flag: bool,
    disposed: bool,
    bookmark: Bookmark,
    resource_handler: Option<Box<dyn ResourceHandler + 'c>>,
}

impl<'c, C: BoltConnection> Transaction<'c, C> {
    pub fn new(connection: &'c mut C, resource_handler: Option<Box<dyn ResourceHandler + 'c>>) -> Self {
        Transaction {
            connection,
            state: State::Ready,
            success_flag: false,
            failure_flag: false,
            disposed: false,
            bookmark: Bookmark::empty(),
            resource_handler,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn bookmark(&self) -> &Bookmark {
        &self.bookmark
    }

    /// Replace the resource handler notified on dispose. Used by callers
    /// (e.g. a session's autocommit path) that only know which bookmark
    /// slot to adopt once the transaction object already exists.
    pub fn set_resource_handler(&mut self, handler: Box<dyn ResourceHandler + 'c>) {
        self.resource_handler = Some(handler);
    }

    /// Ready → Active: enqueue BEGIN with the session's bookmark (§4.7).
    pub async fn begin(&mut self, bookmark: &Bookmark, extra: Vec<(String, Value)>) -> Result<()> {
        if self.state != State::Ready {
            return Err(Error::client("begin() called outside the Ready state"));
        }
        self.connection.begin(bookmark, extra).await?;
        self.state = State::Active;
        Ok(())
    }

    /// Ready/Active → MarkedToClose, with no wire traffic (§4.7).
    pub fn mark_to_close(&mut self) {
        if !self.state.is_terminal() {
            self.state = State::MarkedToClose;
        }
    }

    /// Active → Active: enqueue RUN (§4.7). Any other state raises a
    /// client error; MarkedToClose uses the specific message the driver's
    /// callers are expected to match on.
    pub async fn run(&mut self, statement: &str, parameters: Vec<(String, Value)>) -> Result<()> {
        match self.state {
            State::Active => self.connection.run(statement, parameters).await.map_err(|e| {
                self.state = State::MarkedToClose;
                e
            }),
            State::MarkedToClose => Err(Error::client(
                "Cannot run more statements in this transaction, because it has been marked to close",
            )),
            _ => Err(Error::client("run() called outside the Active state")),
        }
    }

    /// Active → Committing → Succeeded|Failed (§4.7).
    pub async fn commit(&mut self) -> Result<()> {
        match self.state {
            State::Active => {}
            State::MarkedToClose => {
                return Err(Error::client(
                    "Cannot run more statements in this transaction, because it has been marked to close",
                ))
            }
            _ => return Err(Error::client("commit() called outside the Active state")),
        }
        self.state = State::Committing;
        match self.connection.commit().await {
            Ok(bookmark) => {
                self.bookmark = bookmark;
                self.state = State::Succeeded;
                self.notify_dispose();
                Ok(())
            }
            Err(e) => {
                self.state = State::Failed;
                self.notify_dispose();
                Err(e)
            }
        }
    }

    /// Active → RollingBack → Aborted (§4.7).
    pub async fn rollback(&mut self) -> Result<()> {
        match self.state {
            State::Active => {}
            State::MarkedToClose => {
                return Err(Error::client(
                    "Cannot run more statements in this transaction, because it has been marked to close",
                ))
            }
            _ => return Err(Error::client("rollback() called outside the Active state")),
        }
        self.state = State::RollingBack;
        let result = self.connection.rollback().await;
        self.state = State::Aborted;
        self.notify_dispose();
        result
    }

    /// Latching success flag: a later `failure()` wins over an earlier
    /// `success()` (§4.7 "rollback beats commit").
    pub fn success(&mut self) {
        self.success_flag = true;
    }

    pub fn failure(&mut self) {
        self.failure_flag = true;
    }

    /// Idempotent terminal operation (§4.7, §5 "Idempotence"): commits if
    /// `success()` was called and no `failure()` followed, otherwise rolls
    /// back. From `MarkedToClose`, does no wire traffic but still notifies
    /// the resource handler exactly once.
    pub async fn dispose(&mut self) -> Result<()> {
        if self.disposed {
            return Ok(());
        }
        self.disposed = true;

        match self.state {
            State::Active => {
                if self.success_flag && !self.failure_flag {
                    self.commit().await
                } else {
                    self.rollback().await
                }
            }
            State::MarkedToClose => {
                self.notify_dispose();
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn notify_dispose(&mut self) {
        if let Some(handler) = self.resource_handler.as_mut() {
            handler.on_dispose(self.bookmark.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct FakeConnection {
        began: bool,
        ran: Vec<String>,
        committed: bool,
        rolled_back: bool,
        fail_commit: bool,
    }

    #[async_trait]
    impl BoltConnection for FakeConnection {
        async fn begin(&mut self, _bookmark: &Bookmark, _extra: Vec<(String, Value)>) -> Result<()> {
            self.began = true;
            Ok(())
        }

        async fn run(&mut self, statement: &str, _parameters: Vec<(String, Value)>) -> Result<()> {
            self.ran.push(statement.to_string());
            Ok(())
        }

        async fn commit(&mut self) -> Result<Bookmark> {
            if self.fail_commit {
                return Err(Error::client("commit failed"));
            }
            self.committed = true;
            Ok(Bookmark::new("tx:1"))
        }

        async fn rollback(&mut self) -> Result<()> {
            self.rolled_back = true;
            Ok(())
        }
    }

    #[derive(Default, Clone)]
    struct RecordingHandler(Arc<Mutex<Vec<Bookmark>>>);

    impl ResourceHandler for RecordingHandler {
        fn on_dispose(&mut self, bookmark: Bookmark) {
            self.0.lock().unwrap().push(bookmark);
        }
    }

    #[tokio::test]
    async fn success_flag_without_failure_commits_on_dispose() {
        let log = RecordingHandler::default();
        let mut conn = FakeConnection::default();
        let mut tx = Transaction::new(&mut conn, Some(Box::new(log.clone())));
        tx.begin(&Bookmark::empty(), vec![]).await.unwrap();
        tx.run("RETURN 1", vec![]).await.unwrap();
        tx.success();
        tx.dispose().await.unwrap();

        assert_eq!(tx.state(), State::Succeeded);
        assert_eq!(log.0.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failure_after_success_wins_rollback_beats_commit() {
        let mut conn = FakeConnection::default();
        let mut tx = Transaction::new(&mut conn, None);
        tx.begin(&Bookmark::empty(), vec![]).await.unwrap();
        tx.success();
        tx.failure();
        tx.dispose().await.unwrap();
        assert_eq!(tx.state(), State::Aborted);
    }

    #[tokio::test]
    async fn dispose_without_success_rolls_back() {
        let mut conn = FakeConnection::default();
        let mut tx = Transaction::new(&mut conn, None);
        tx.begin(&Bookmark::empty(), vec![]).await.unwrap();
        tx.dispose().await.unwrap();
        assert_eq!(tx.state(), State::Aborted);
    }

    #[tokio::test]
    async fn dispose_is_idempotent() {
        let log = RecordingHandler::default();
        let mut conn = FakeConnection::default();
        let mut tx = Transaction::new(&mut conn, Some(Box::new(log.clone())));
        tx.begin(&Bookmark::empty(), vec![]).await.unwrap();
        tx.success();
        tx.dispose().await.unwrap();
        tx.dispose().await.unwrap();
        assert_eq!(log.0.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn mark_to_close_rejects_run_with_specific_message() {
        let mut conn = FakeConnection::default();
        let mut tx = Transaction::new(&mut conn, None);
        tx.begin(&Bookmark::empty(), vec![]).await.unwrap();
        tx.mark_to_close();
        let err = tx.run("RETURN 1", vec![]).await.unwrap_err();
        assert!(err.to_string().contains("Cannot run more statements in this transaction"));
    }

    #[tokio::test]
    async fn mark_to_close_dispose_notifies_without_wire_traffic() {
        let log = RecordingHandler::default();
        let mut conn = FakeConnection::default();
        let mut tx = Transaction::new(&mut conn, Some(Box::new(log.clone())));
        tx.begin(&Bookmark::empty(), vec![]).await.unwrap();
        tx.mark_to_close();
        tx.dispose().await.unwrap();
        assert_eq!(log.0.lock().unwrap().len(), 1);
        assert_eq!(tx.state(), State::MarkedToClose);
    }

    #[tokio::test]
    async fn failed_commit_marks_transaction_failed_and_notifies_once() {
        let log = RecordingHandler::default();
        let mut conn = FakeConnection::default();
        conn.fail_commit = true;
        let mut tx = Transaction::new(&mut conn, Some(Box::new(log.clone())));
        tx.begin(&Bookmark::empty(), vec![]).await.unwrap();
        tx.success();
        let err = tx.dispose().await;
        assert!(err.is_err());
        assert_eq!(tx.state(), State::Failed);
        assert_eq!(log.0.lock().unwrap().len(), 1);
    }
}
