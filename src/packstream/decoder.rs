//! PackStream decoding (§4.3).
//!
//! The decoder reads from an in-memory byte slice rather than an async
//! stream: by the time bytes reach here the chunk reader (§4.2) has already
//! reassembled one complete message, so decoding never needs to suspend.

use super::value::Value;
use crate::error::{Error, ProtocolError};

pub struct Decoder<'a> {
    buf: &'a [u8],
    pos: usize,
}

type DResult<T> = crate::error::Result<T>;

impl<'a> Decoder<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Decoder { buf, pos: 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn next_byte(&mut self) -> DResult<u8> {
        let b = *self
            .buf
            .get(self.pos)
            .ok_or_else(|| Error::Protocol(ProtocolError::UnexpectedEof))?;
        self.pos += 1;
        Ok(b)
    }

    fn take(&mut self, n: usize) -> DResult<&'a [u8]> {
        if self.pos + n > self.buf.len() {
            return Err(Error::Protocol(ProtocolError::UnexpectedEof));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn read_u8(&mut self) -> DResult<u8> {
        self.next_byte()
    }

    fn read_u16(&mut self) -> DResult<u16> {
        Ok(u16::from_be_bytes(self.take(2)?.try_into().unwrap()))
    }

    fn read_u32(&mut self) -> DResult<u32> {
        Ok(u32::from_be_bytes(self.take(4)?.try_into().unwrap()))
    }

    pub fn read_value(&mut self) -> DResult<Value> {
        let marker = self.next_byte()?;
        self.read_value_with_marker(marker)
    }

    fn read_value_with_marker(&mut self, marker: u8) -> DResult<Value> {
        match marker {
            0xC0 => Ok(Value::Null),
            0xC1 => {
                let bytes: [u8; 8] = self.take(8)?.try_into().unwrap();
                Ok(Value::Float(f64::from_be_bytes(bytes)))
            }
            0xC2 => Ok(Value::Bool(false)),
            0xC3 => Ok(Value::Bool(true)),

            // tiny int, positive and negative ranges fold into one byte
            0x00..=0x7F => Ok(Value::Int(marker as i8 as i64)),
            0xF0..=0xFF => Ok(Value::Int(marker as i8 as i64)),

            0xC8 => Ok(Value::Int(self.read_u8()? as i8 as i64)),
            0xC9 => Ok(Value::Int(self.read_u16()? as i16 as i64)),
            0xCA => Ok(Value::Int(self.read_u32()? as i32 as i64)),
            0xCB => {
                let bytes: [u8; 8] = self.take(8)?.try_into().unwrap();
                Ok(Value::Int(i64::from_be_bytes(bytes)))
            }

            0xCC => {
                let len = self.read_u8()? as usize;
                Ok(Value::Bytes(self.take(len)?.to_vec()))
            }
            0xCD => {
                let len = self.read_u16()? as usize;
                Ok(Value::Bytes(self.take(len)?.to_vec()))
            }
            0xCE => {
                let len = self.read_u32()? as usize;
                Ok(Value::Bytes(self.take(len)?.to_vec()))
            }

            0x80..=0x8F => self.read_string(usize::from(marker & 0x0F)),
            0xD0 => {
                let len = self.read_u8()? as usize;
                self.read_string(len)
            }
            0xD1 => {
                let len = self.read_u16()? as usize;
                self.read_string(len)
            }
            0xD2 => {
                let len = self.read_u32()? as usize;
                self.read_string(len)
            }

            0x90..=0x9F => self.read_list(usize::from(marker & 0x0F)),
            0xD4 => {
                let len = self.read_u8()? as usize;
                self.read_list(len)
            }
            0xD5 => {
                let len = self.read_u16()? as usize;
                self.read_list(len)
            }
            0xD6 => {
                let len = self.read_u32()? as usize;
                self.read_list(len)
            }

            0xA0..=0xAF => self.read_map(usize::from(marker & 0x0F)),
            0xD8 => {
                let len = self.read_u8()? as usize;
                self.read_map(len)
            }
            0xD9 => {
                let len = self.read_u16()? as usize;
                self.read_map(len)
            }
            0xDA => {
                let len = self.read_u32()? as usize;
                self.read_map(len)
            }

            0xB0..=0xBF => self.read_struct(usize::from(marker & 0x0F)),
            0xDC => {
                let len = self.read_u8()? as usize;
                self.read_struct(len)
            }
            0xDD => {
                let len = self.read_u16()? as usize;
                self.read_struct(len)
            }

            other => Err(Error::Protocol(ProtocolError::UnknownMarker(other))),
        }
    }

    fn read_string(&mut self, len: usize) -> DResult<Value> {
        let bytes = self.take(len)?;
        let s = std::str::from_utf8(bytes).map_err(|e| Error::Protocol(e.into()))?;
        Ok(Value::String(s.to_string()))
    }

    fn read_list(&mut self, len: usize) -> DResult<Value> {
        let mut items = Vec::with_capacity(len.min(4096));
        for _ in 0..len {
            items.push(self.read_value()?);
        }
        Ok(Value::List(items))
    }

    fn read_map(&mut self, len: usize) -> DResult<Value> {
        let mut entries = Vec::with_capacity(len.min(4096));
        let mut seen = std::collections::HashSet::with_capacity(len);
        for _ in 0..len {
            let key = match self.read_value()? {
                Value::String(s) => s,
                _ => return Err(Error::Protocol(ProtocolError::NonStringMapKey)),
            };
            if !seen.insert(key.clone()) {
                return Err(Error::Protocol(ProtocolError::DuplicateMapKey(key)));
            }
            let value = self.read_value()?;
            entries.push((key, value));
        }
        Ok(Value::Map(entries))
    }

    fn read_struct(&mut self, declared: usize) -> DResult<Value> {
        let tag = self.next_byte()?;
        let mut fields = Vec::with_capacity(declared.min(4096));
        for _ in 0..declared {
            fields.push(self.read_value()?);
        }
        // `declared` drove the loop, so an arity mismatch can only surface
        // as a later decode error (e.g. consuming the next message's
        // marker as a field) rather than here; callers validate arity
        // against a tag's expected field count via `check_struct_arity`.
        Ok(Value::Struct { tag, fields })
    }
}

/// Decode exactly one value from `buf`, erroring if bytes remain after it.
pub fn decode_one(buf: &[u8]) -> crate::error::Result<Value> {
    let mut decoder = Decoder::new(buf);
    let value = decoder.read_value()?;
    if !decoder.is_empty() {
        return Err(Error::Protocol(ProtocolError::UnexpectedResponse));
    }
    Ok(value)
}

/// Validate that a decoded struct's field count matches what its tag
/// declares (§3 invariant, §8 property 4). Handlers in the struct registry
/// call this immediately after decoding since the header-driven loop in
/// [`Decoder::read_struct`] cannot detect an arity mismatch on its own: a
/// struct advertising one field too few simply borrows the first value of
/// the next message as its missing field.
pub fn check_struct_arity(tag: u8, fields: &[Value], expected: usize) -> crate::error::Result<()> {
    if fields.len() != expected {
        return Err(Error::Protocol(ProtocolError::StructArityMismatch {
            tag,
            declared: expected,
            actual: fields.len(),
        }));
    }
    Ok(())
}
