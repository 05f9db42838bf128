//! # Message engine (§4.4)
//!
//! Owns the encoder/decoder pair and a FIFO queue of outstanding response
//! handlers. `enqueue` never touches the network; `flush` drains buffered
//! writes, pulls complete frames off the chunk reader, decodes each into a
//! [`Response`], and dispatches it to the handler at the head of the
//! queue. The split between a non-blocking enqueue path and an explicit
//! I/O-driving flush keeps request writes decoupled from response
//! dispatch, the way a chunked multi-response wire protocol needs.

use std::collections::VecDeque;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, warn};

use crate::chunking::{ChunkReader, ChunkWriter};
use crate::error::{Error, ProtocolError, Result, TransportError};
use crate::messages::{Request, Response};
use crate::packstream::{decode_one, encode};

/// The outcome delivered to a handler for one response message.
#[derive(Debug)]
pub enum Outcome {
    Success(Vec<(String, crate::packstream::Value)>),
    Record(Vec<crate::packstream::Value>),
    Failure { code: String, message: String },
    Ignored,
}

/// One outstanding request's response handler. Boxed so the engine can
/// hold a heterogeneous queue of callers' continuations (oneshot senders,
/// cursor accumulators, etc.) without being generic over them.
pub trait ResponseHandler: Send {
    /// Called once per RECORD response; may be called zero or more times
    /// before the terminal outcome.
    fn on_record(&mut self, fields: Vec<crate::packstream::Value>);

    /// Called exactly once, with the terminal outcome for this request.
    /// After this call the handler is dropped from the queue.
    fn on_terminal(self: Box<Self>, outcome: Outcome);
}

/// A queued handler that will be resolved as IGNORED while the engine is
/// draining up to a RESET's own terminal response (§4.4 "Reset").
enum QueueSlot {
    Normal(Box<dyn ResponseHandler>),
    /// The handler belonging to the RESET request itself: the engine stops
    /// ignoring once this slot's terminal response arrives.
    ResetBoundary(Box<dyn ResponseHandler>),
}

pub struct Engine<S> {
    stream: S,
    write_buf: Vec<u8>,
    reader: ChunkReader,
    read_buf: Vec<u8>,
    queue: VecDeque<QueueSlot>,
    draining_to_reset: bool,
    broken: bool,
}

impl<S> Engine<S>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    pub fn new(stream: S, default_buffer_size: usize, max_buffer_size: usize) -> Self {
        Engine {
            stream,
            write_buf: Vec::new(),
            reader: ChunkReader::new(default_buffer_size, max_buffer_size),
            read_buf: vec![0u8; default_buffer_size],
            queue: VecDeque::new(),
            draining_to_reset: false,
            broken: false,
        }
    }

    pub fn is_broken(&self) -> bool {
        self.broken
    }

    /// Encode `request` and append it to the write buffer and the handler
    /// queue. Does not touch the network (§4.4 "Enqueue request").
    pub fn enqueue(&mut self, request: Request, handler: Box<dyn ResponseHandler>) -> Result<()> {
        if self.broken {
            return Err(Error::client("connection is broken, cannot enqueue"));
        }
        let tag = request.tag();
        let payload = encode(&request.into_value())?;
        ChunkWriter::write_message(&mut self.write_buf, &payload);
        ChunkWriter::write_end_of_message(&mut self.write_buf);
        debug!(tag = format_args!("0x{tag:02x}"), "enqueued request");
        self.queue.push_back(QueueSlot::Normal(handler));
        Ok(())
    }

    /// Enqueue a RESET, marking the engine so every handler queued before
    /// it resolves to `Ignored` once RESET's own SUCCESS arrives (§4.4,
    /// §5 "Cancellation").
    pub fn enqueue_reset(&mut self, handler: Box<dyn ResponseHandler>) -> Result<()> {
        if self.broken {
            return Err(Error::client("connection is broken, cannot enqueue"));
        }
        let payload = encode(&Request::Reset.into_value())?;
        ChunkWriter::write_message(&mut self.write_buf, &payload);
        ChunkWriter::write_end_of_message(&mut self.write_buf);
        self.draining_to_reset = true;
        self.queue.push_back(QueueSlot::ResetBoundary(handler));
        Ok(())
    }

    /// Drain buffered outgoing bytes, read whatever complete responses are
    /// available, and dispatch each to the handler at the head of the
    /// queue (§4.4 "Flush (sync)"). On any I/O failure, every outstanding
    /// handler is completed with a transport failure and the connection
    /// is marked broken (§4.4 "Fatal I/O error").
    pub async fn flush(&mut self) -> Result<()> {
        if let Err(e) = self.write_all_buffered().await {
            self.fail_all(&e);
            return Err(e);
        }

        loop {
            while let Some(message) = self.reader.pop_message() {
                if let Err(e) = self.dispatch_one(message) {
                    self.fail_all(&e);
                    return Err(e);
                }
            }
            if self.queue.is_empty() {
                break;
            }
            match self.stream.read(&mut self.read_buf).await {
                Ok(0) => {
                    let e = Error::Transport(TransportError::Closed);
                    self.fail_all(&e);
                    return Err(e);
                }
                Ok(n) => {
                    if let Err(e) = self.reader.feed(&self.read_buf[..n]) {
                        self.fail_all(&e);
                        return Err(e);
                    }
                }
                Err(io_err) => {
                    let e = Error::Transport(TransportError::Io(io_err));
                    self.fail_all(&e);
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    async fn write_all_buffered(&mut self) -> Result<()> {
        if self.write_buf.is_empty() {
            return Ok(());
        }
        self.stream
            .write_all(&self.write_buf)
            .await
            .map_err(|e| Error::Transport(TransportError::Io(e)))?;
        self.stream
            .flush()
            .await
            .map_err(|e| Error::Transport(TransportError::Io(e)))?;
        self.write_buf.clear();
        Ok(())
    }

    fn dispatch_one(&mut self, raw: Vec<u8>) -> Result<()> {
        let value = decode_one(&raw)?;
        let (tag, fields) = match value {
            crate::packstream::Value::Struct { tag, fields } => (tag, fields),
            _ => return Err(Error::Protocol(ProtocolError::UnexpectedResponse)),
        };
        let response = Response::from_struct(tag, fields)?;

        if let Response::Record(values) = response {
            let slot = self
                .queue
                .front_mut()
                .ok_or(Error::Protocol(ProtocolError::UnexpectedResponse))?;
            match slot {
                QueueSlot::Normal(handler) => handler.on_record(values),
                QueueSlot::ResetBoundary(_) => {
                    return Err(Error::Protocol(ProtocolError::UnexpectedResponse))
                }
            }
            return Ok(());
        }

        let slot = self
            .queue
            .pop_front()
            .ok_or(Error::Protocol(ProtocolError::UnexpectedResponse))?;

        match slot {
            QueueSlot::Normal(handler) => {
                if self.draining_to_reset {
                    handler.on_terminal(Outcome::Ignored);
                } else {
                    handler.on_terminal(response_to_outcome(response));
                }
            }
            QueueSlot::ResetBoundary(handler) => {
                self.draining_to_reset = false;
                handler.on_terminal(response_to_outcome(response));
            }
        }
        Ok(())
    }

    /// Complete every outstanding handler with a transport failure and
    /// mark the connection broken so future operations fail fast.
    fn fail_all(&mut self, error: &Error) {
        self.broken = true;
        warn!(error = %error, "message engine failed, draining queue with transport failure");
        while let Some(slot) = self.queue.pop_front() {
            let handler = match slot {
                QueueSlot::Normal(h) => h,
                QueueSlot::ResetBoundary(h) => h,
            };
            handler.on_terminal(Outcome::Failure {
                code: "Neo.TransientError.Transaction.Terminated".to_string(),
                message: error.to_string(),
            });
        }
    }
}

fn response_to_outcome(response: Response) -> Outcome {
    match response {
        Response::Success(meta) => Outcome::Success(meta),
        Response::Record(values) => Outcome::Record(values),
        Response::Failure { code, message } => Outcome::Failure { code, message },
        Response::Ignored => Outcome::Ignored,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::tag;
    use crate::packstream::Value;
    use std::sync::{Arc, Mutex};
    use tokio::io::duplex;

    #[derive(Default, Clone)]
    struct Recorder(Arc<Mutex<Vec<String>>>);

    struct RecordingHandler {
        name: &'static str,
        log: Recorder,
    }

    impl ResponseHandler for RecordingHandler {
        fn on_record(&mut self, _fields: Vec<Value>) {
            self.log.0.lock().unwrap().push(format!("{}:record", self.name));
        }

        fn on_terminal(self: Box<Self>, outcome: Outcome) {
            let label = match outcome {
                Outcome::Success(_) => "success",
                Outcome::Record(_) => "record",
                Outcome::Failure { .. } => "failure",
                Outcome::Ignored => "ignored",
            };
            self.log.0.lock().unwrap().push(format!("{}:{}", self.name, label));
        }
    }

    fn write_raw_message(server: &mut Vec<u8>, value: &Value) {
        let payload = encode(value).unwrap();
        ChunkWriter::write_message(server, &payload);
        ChunkWriter::write_end_of_message(server);
    }

    #[tokio::test]
    async fn dispatches_success_in_fifo_order() {
        let (client, mut server) = duplex(4096);
        let mut engine = Engine::new(client, 256, 4096);
        let log = Recorder::default();

        engine
            .enqueue(
                Request::Run {
                    statement: "RETURN 1".into(),
                    parameters: vec![],
                    extra: vec![],
                },
                Box::new(RecordingHandler { name: "run", log: log.clone() }),
            )
            .unwrap();

        let mut server_bytes = Vec::new();
        write_raw_message(
            &mut server_bytes,
            &Value::Struct {
                tag: tag::SUCCESS,
                fields: vec![Value::Map(vec![])],
            },
        );

        let write_task = tokio::spawn(async move {
            use tokio::io::AsyncWriteExt;
            // discard whatever the client wrote (the RUN request)
            let mut discard = [0u8; 512];
            use tokio::io::AsyncReadExt;
            let _ = server.read(&mut discard).await.unwrap();
            server.write_all(&server_bytes).await.unwrap();
            server.flush().await.unwrap();
            server
        });

        engine.flush().await.unwrap();
        write_task.await.unwrap();

        assert_eq!(*log.0.lock().unwrap(), vec!["run:success".to_string()]);
    }

    #[tokio::test]
    async fn record_does_not_pop_handler() {
        let (client, mut server) = duplex(4096);
        let mut engine = Engine::new(client, 256, 4096);
        let log = Recorder::default();

        engine
            .enqueue(
                Request::PullAll,
                Box::new(RecordingHandler { name: "pull", log: log.clone() }),
            )
            .unwrap();

        let mut server_bytes = Vec::new();
        write_raw_message(
            &mut server_bytes,
            &Value::Struct {
                tag: tag::RECORD,
                fields: vec![Value::List(vec![Value::Int(1)])],
            },
        );
        write_raw_message(
            &mut server_bytes,
            &Value::Struct {
                tag: tag::SUCCESS,
                fields: vec![Value::Map(vec![])],
            },
        );

        let write_task = tokio::spawn(async move {
            use tokio::io::{AsyncReadExt, AsyncWriteExt};
            let mut discard = [0u8; 512];
            let _ = server.read(&mut discard).await.unwrap();
            server.write_all(&server_bytes).await.unwrap();
            server.flush().await.unwrap();
        });

        engine.flush().await.unwrap();
        write_task.await.unwrap();

        assert_eq!(
            *log.0.lock().unwrap(),
            vec!["pull:record".to_string(), "pull:success".to_string()]
        );
    }

    #[tokio::test]
    async fn fatal_io_error_fails_all_outstanding_handlers() {
        let (client, server) = duplex(4096);
        drop(server); // force a read error on the client side
        let mut engine = Engine::new(client, 256, 4096);
        let log = Recorder::default();

        engine
            .enqueue(Request::Reset, Box::new(RecordingHandler { name: "reset", log: log.clone() }))
            .unwrap();

        let result = engine.flush().await;
        assert!(result.is_err());
        assert!(engine.is_broken());
        assert_eq!(*log.0.lock().unwrap(), vec!["reset:failure".to_string()]);
    }
}
