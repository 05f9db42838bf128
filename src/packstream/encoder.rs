//! PackStream encoding (§4.3).
//!
//! Integers are always written in the smallest marker that represents them
//! exactly (property 2 of §8): tiny int, then Int8/16/32/64 in ascending
//! order. Strings, lists, maps, and structs follow the same "smallest
//! header that fits the length" rule.

use super::value::Value;
use crate::error::{Error, ProtocolError};

/// Markers from §4.3. Only the ones this encoder emits directly are named;
/// the tiny-X markers are computed, not matched, since they fold length
/// into the low nibble.
mod marker {
    pub const TINY_STRING: u8 = 0x80;
    pub const TINY_LIST: u8 = 0x90;
    pub const TINY_MAP: u8 = 0xA0;
    pub const TINY_STRUCT: u8 = 0xB0;

    pub const STRING_8: u8 = 0xD0;
    pub const STRING_16: u8 = 0xD1;
    pub const STRING_32: u8 = 0xD2;
    pub const LIST_8: u8 = 0xD4;
    pub const LIST_16: u8 = 0xD5;
    pub const LIST_32: u8 = 0xD6;
    pub const MAP_8: u8 = 0xD8;
    pub const MAP_16: u8 = 0xD9;
    pub const MAP_32: u8 = 0xDA;
    pub const STRUCT_8: u8 = 0xDC;
    pub const STRUCT_16: u8 = 0xDD;

    pub const NULL: u8 = 0xC0;
    pub const FLOAT: u8 = 0xC1;
    pub const FALSE: u8 = 0xC2;
    pub const TRUE: u8 = 0xC3;
    pub const BYTES_8: u8 = 0xCC;
    pub const BYTES_16: u8 = 0xCD;
    pub const BYTES_32: u8 = 0xCE;
    pub const INT_8: u8 = 0xC8;
    pub const INT_16: u8 = 0xC9;
    pub const INT_32: u8 = 0xCA;
    pub const INT_64: u8 = 0xCB;
}

/// Encodes [`Value`]s into a byte buffer, one message's worth at a time.
///
/// The buffer is owned by the caller (typically the message engine's
/// per-message scratch buffer) so repeated encodes can reuse its
/// allocation.
pub struct Encoder<'a> {
    out: &'a mut Vec<u8>,
}

impl<'a> Encoder<'a> {
    pub fn new(out: &'a mut Vec<u8>) -> Self {
        Encoder { out }
    }

    pub fn write_value(&mut self, value: &Value) -> crate::error::Result<()> {
        match value {
            Value::Null => self.out.push(marker::NULL),
            Value::Bool(b) => self.out.push(if *b { marker::TRUE } else { marker::FALSE }),
            Value::Int(i) => self.write_int(*i),
            Value::Float(f) => {
                self.out.push(marker::FLOAT);
                self.out.extend_from_slice(&f.to_be_bytes());
            }
            Value::String(s) => self.write_string(s),
            Value::Bytes(b) => self.write_bytes(b),
            Value::List(items) => self.write_list(items)?,
            Value::Map(entries) => self.write_map(entries)?,
            Value::Struct { tag, fields } => self.write_struct(*tag, fields)?,
        }
        Ok(())
    }

    fn write_int(&mut self, i: i64) {
        if (-16..=127).contains(&i) {
            self.out.push(i as u8);
        } else if (i8::MIN as i64..=i8::MAX as i64).contains(&i) {
            self.out.push(marker::INT_8);
            self.out.push(i as i8 as u8);
        } else if (i16::MIN as i64..=i16::MAX as i64).contains(&i) {
            self.out.push(marker::INT_16);
            self.out.extend_from_slice(&(i as i16).to_be_bytes());
        } else if (i32::MIN as i64..=i32::MAX as i64).contains(&i) {
            self.out.push(marker::INT_32);
            self.out.extend_from_slice(&(i as i32).to_be_bytes());
        } else {
            self.out.push(marker::INT_64);
            self.out.extend_from_slice(&i.to_be_bytes());
        }
    }

    fn write_string(&mut self, s: &str) {
        let bytes = s.as_bytes();
        let len = bytes.len();
        if len < 16 {
            self.out.push(marker::TINY_STRING | len as u8);
        } else if len <= u8::MAX as usize {
            self.out.push(marker::STRING_8);
            self.out.push(len as u8);
        } else if len <= u16::MAX as usize {
            self.out.push(marker::STRING_16);
            self.out.extend_from_slice(&(len as u16).to_be_bytes());
        } else {
            self.out.push(marker::STRING_32);
            self.out.extend_from_slice(&(len as u32).to_be_bytes());
        }
        self.out.extend_from_slice(bytes);
    }

    fn write_bytes(&mut self, b: &[u8]) {
        let len = b.len();
        if len <= u8::MAX as usize {
            self.out.push(marker::BYTES_8);
            self.out.push(len as u8);
        } else if len <= u16::MAX as usize {
            self.out.push(marker::BYTES_16);
            self.out.extend_from_slice(&(len as u16).to_be_bytes());
        } else {
            self.out.push(marker::BYTES_32);
            self.out.extend_from_slice(&(len as u32).to_be_bytes());
        }
        self.out.extend_from_slice(b);
    }

    fn write_list(&mut self, items: &[Value]) -> crate::error::Result<()> {
        let len = items.len();
        if len < 16 {
            self.out.push(marker::TINY_LIST | len as u8);
        } else if len <= u8::MAX as usize {
            self.out.push(marker::LIST_8);
            self.out.push(len as u8);
        } else if len <= u16::MAX as usize {
            self.out.push(marker::LIST_16);
            self.out.extend_from_slice(&(len as u16).to_be_bytes());
        } else {
            self.out.push(marker::LIST_32);
            self.out.extend_from_slice(&(len as u32).to_be_bytes());
        }
        for item in items {
            self.write_value(item)?;
        }
        Ok(())
    }

    fn write_map(&mut self, entries: &[(String, Value)]) -> crate::error::Result<()> {
        let mut seen = std::collections::HashSet::with_capacity(entries.len());
        for (k, _) in entries {
            if !seen.insert(k.as_str()) {
                return Err(Error::Protocol(ProtocolError::DuplicateMapKey(k.clone())));
            }
        }

        let len = entries.len();
        if len < 16 {
            self.out.push(marker::TINY_MAP | len as u8);
        } else if len <= u8::MAX as usize {
            self.out.push(marker::MAP_8);
            self.out.push(len as u8);
        } else if len <= u16::MAX as usize {
            self.out.push(marker::MAP_16);
            self.out.extend_from_slice(&(len as u16).to_be_bytes());
        } else {
            self.out.push(marker::MAP_32);
            self.out.extend_from_slice(&(len as u32).to_be_bytes());
        }
        for (k, v) in entries {
            self.write_string(k);
            self.write_value(v)?;
        }
        Ok(())
    }

    fn write_struct(&mut self, tag: u8, fields: &[Value]) -> crate::error::Result<()> {
        let len = fields.len();
        if len < 16 {
            self.out.push(marker::TINY_STRUCT | len as u8);
        } else if len <= u8::MAX as usize {
            self.out.push(marker::STRUCT_8);
            self.out.push(len as u8);
        } else {
            self.out.push(marker::STRUCT_16);
            self.out.extend_from_slice(&(len as u16).to_be_bytes());
        }
        self.out.push(tag);
        for field in fields {
            self.write_value(field)?;
        }
        Ok(())
    }
}

/// Convenience wrapper: encode a single value into a fresh buffer.
pub fn encode(value: &Value) -> crate::error::Result<Vec<u8>> {
    let mut out = Vec::new();
    Encoder::new(&mut out).write_value(value)?;
    Ok(out)
}
