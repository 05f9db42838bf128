//! # Chunk framer (§4.2)
//!
//! Bolt messages ride on the wire as one or more big-endian 16-bit
//! length-prefixed chunks, terminated by a zero-length chunk (`00 00`).
//! [`ChunkWriter`] accumulates one message's payload and splits it into
//! chunks on flush; [`ChunkReader`] reassembles chunks read off the socket
//! back into complete messages.

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

/// Chunks are length-prefixed with an unsigned 16-bit field, so a single
/// chunk can carry at most this many payload bytes.
pub const MAX_CHUNK_SIZE: usize = u16::MAX as usize;

/// Splits one message's bytes into wire chunks, writing directly into an
/// output buffer (typically the socket write buffer owned by the message
/// engine).
pub struct ChunkWriter;

impl ChunkWriter {
    /// Append `payload`, framed as one or more non-empty chunks, to `out`.
    /// Does **not** write the terminating zero chunk — callers append
    /// exactly one terminator per message via [`ChunkWriter::write_end_of_message`]
    /// once all of a message's payload has been queued.
    pub fn write_message(out: &mut Vec<u8>, payload: &[u8]) {
        if payload.is_empty() {
            return;
        }
        for chunk in payload.chunks(MAX_CHUNK_SIZE) {
            out.extend_from_slice(&(chunk.len() as u16).to_be_bytes());
            out.extend_from_slice(chunk);
        }
    }

    pub fn write_end_of_message(out: &mut Vec<u8>) {
        out.extend_from_slice(&[0x00, 0x00]);
    }
}

/// Reassembles chunked bytes read off the wire into complete messages.
///
/// The reader owns a single reusable backing buffer (§3 lifecycle: "the
/// reader may retain a reusable backing store but must shrink it back to a
/// default capacity once observed exceeding a configured maximum"). It is
/// driven by repeatedly feeding it freshly-read bytes via [`ChunkReader::feed`];
/// completed messages are pulled out with [`ChunkReader::pop_message`].
pub struct ChunkReader {
    /// Bytes belonging to the message currently being assembled.
    current: Vec<u8>,
    /// Completed messages waiting to be decoded, oldest first.
    completed: std::collections::VecDeque<Vec<u8>>,
    /// Bytes fed but not yet parsed into chunk headers/payloads.
    pending: Vec<u8>,
    default_capacity: usize,
    max_capacity: usize,
    shrink_events: AtomicU64,
}

impl ChunkReader {
    pub fn new(default_capacity: usize, max_capacity: usize) -> Self {
        ChunkReader {
            current: Vec::with_capacity(default_capacity),
            completed: std::collections::VecDeque::new(),
            pending: Vec::new(),
            default_capacity,
            max_capacity,
            shrink_events: AtomicU64::new(0),
        }
    }

    /// Feed freshly read bytes from the socket. Returns the number of
    /// complete messages now available via [`ChunkReader::pop_message`].
    pub fn feed(&mut self, bytes: &[u8]) -> crate::error::Result<usize> {
        self.pending.extend_from_slice(bytes);
        let mut made_progress = true;
        while made_progress {
            made_progress = self.try_parse_one_chunk()?;
        }
        self.maybe_shrink();
        Ok(self.completed.len())
    }

    fn try_parse_one_chunk(&mut self) -> crate::error::Result<bool> {
        if self.pending.len() < 2 {
            return Ok(false);
        }
        let len = u16::from_be_bytes([self.pending[0], self.pending[1]]) as usize;

        if len == 0 {
            if self.current.is_empty() {
                return Err(crate::error::Error::Protocol(
                    crate::error::ProtocolError::MalformedChunk,
                ));
            }
            self.pending.drain(0..2);
            let observed_capacity = self.current.capacity();
            let message = if observed_capacity > self.max_capacity {
                self.shrink_events.fetch_add(1, Ordering::Relaxed);
                debug!(
                    capacity = observed_capacity,
                    max = self.max_capacity,
                    "chunk reader buffer shrunk back to default capacity"
                );
                std::mem::replace(&mut self.current, Vec::with_capacity(self.default_capacity))
            } else {
                let message = self.current.clone();
                self.current.clear();
                message
            };
            self.completed.push_back(message);
            return Ok(true);
        }

        if self.pending.len() < 2 + len {
            return Ok(false);
        }

        self.current.extend_from_slice(&self.pending[2..2 + len]);
        self.pending.drain(0..2 + len);
        Ok(true)
    }

    /// Shrink the `pending` scratch buffer if it was observed to exceed the
    /// configured maximum while accumulating chunk headers/payloads that
    /// hadn't yet been fully read. The `current` message buffer is shrunk
    /// eagerly at each message boundary in `try_parse_one_chunk` instead,
    /// since that's the only point it's known to be empty.
    fn maybe_shrink(&mut self) {
        if self.pending.capacity() > self.max_capacity && self.pending.is_empty() {
            self.pending.shrink_to(self.default_capacity);
        }
    }

    pub fn pop_message(&mut self) -> Option<Vec<u8>> {
        self.completed.pop_front()
    }

    pub fn pending_messages(&self) -> usize {
        self.completed.len()
    }

    pub fn shrink_event_count(&self) -> u64 {
        self.shrink_events.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_message(payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        ChunkWriter::write_message(&mut out, payload);
        ChunkWriter::write_end_of_message(&mut out);
        out
    }

    #[test]
    fn single_chunk_roundtrip() {
        let payload = b"hello bolt".to_vec();
        let wire = frame_message(&payload);
        let mut reader = ChunkReader::new(1024, 1024 * 1024);
        assert_eq!(reader.feed(&wire).unwrap(), 1);
        assert_eq!(reader.pop_message().unwrap(), payload);
    }

    #[test]
    fn terminator_is_last_two_bytes() {
        let wire = frame_message(b"abc");
        assert_eq!(&wire[wire.len() - 2..], &[0x00, 0x00]);
    }

    #[test]
    fn splits_oversized_payload_across_chunks() {
        let payload = vec![0xAB; MAX_CHUNK_SIZE + 100];
        let wire = frame_message(&payload);
        let mut reader = ChunkReader::new(1024, 10 * 1024 * 1024);
        assert_eq!(reader.feed(&wire).unwrap(), 1);
        assert_eq!(reader.pop_message().unwrap(), payload);
    }

    #[test]
    fn feeding_byte_at_a_time_still_reassembles() {
        let payload = b"split across many small feeds".to_vec();
        let wire = frame_message(&payload);
        let mut reader = ChunkReader::new(16, 1024);
        let mut total = 0;
        for byte in &wire {
            total += reader.feed(std::slice::from_ref(byte)).unwrap();
        }
        assert_eq!(total, 1);
        assert_eq!(reader.pop_message().unwrap(), payload);
    }

    #[test]
    fn multiple_messages_in_one_feed() {
        let mut wire = frame_message(b"first");
        wire.extend(frame_message(b"second"));
        let mut reader = ChunkReader::new(1024, 1024 * 1024);
        assert_eq!(reader.feed(&wire).unwrap(), 2);
        assert_eq!(reader.pop_message().unwrap(), b"first");
        assert_eq!(reader.pop_message().unwrap(), b"second");
    }

    #[test]
    fn zero_length_chunk_at_start_of_message_is_malformed() {
        let mut reader = ChunkReader::new(16, 1024);
        // a stray terminator with nothing queued for the current message
        assert!(reader.feed(&[0x00, 0x00]).is_err());
    }

    #[test]
    fn large_message_round_trip_up_to_two_mebibytes() {
        let payload: Vec<u8> = (0..2 * 1024 * 1024).map(|i| (i % 251) as u8).collect();
        let wire = frame_message(&payload);
        let mut reader = ChunkReader::new(1024, 16 * 1024 * 1024);
        assert_eq!(reader.feed(&wire).unwrap(), 1);
        assert_eq!(reader.pop_message().unwrap(), payload);
    }

    #[test]
    fn shrinks_backing_buffer_after_crossing_max_capacity() {
        let mut reader = ChunkReader::new(64, 128);
        let payload = vec![1u8; 1024];
        let wire = frame_message(&payload);
        reader.feed(&wire).unwrap();
        assert_eq!(reader.shrink_event_count(), 1);
        assert!(reader.pop_message().unwrap() == payload);
    }
}
