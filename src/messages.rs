//! # Request/response message set (§3, §4.5)
//!
//! A [`Request`] is always encoded as a PackStream struct whose tag
//! identifies it; a [`Response`] is always decoded from one. The actual
//! field layout matches the version-appropriate message set selected by
//! the handshake (§4.5) — this module implements the common Bolt message
//! family used from the first widely deployed protocol version onward.

use crate::packstream::Value;

pub mod tag {
    pub const HELLO: u8 = 0x01;
    pub const RUN: u8 = 0x10;
    pub const DISCARD_ALL: u8 = 0x2F;
    pub const PULL_ALL: u8 = 0x3F;
    pub const RESET: u8 = 0x0F;
    pub const BEGIN: u8 = 0x11;
    pub const COMMIT: u8 = 0x12;
    pub const ROLLBACK: u8 = 0x13;
    pub const GOODBYE: u8 = 0x02;

    pub const SUCCESS: u8 = 0x70;
    pub const RECORD: u8 = 0x71;
    pub const IGNORED: u8 = 0x7E;
    pub const FAILURE: u8 = 0x7F;
}

/// An outgoing request message (§3 "Request message").
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Hello {
        user_agent: String,
        auth: Vec<(String, Value)>,
    },
    Run {
        statement: String,
        parameters: Vec<(String, Value)>,
        extra: Vec<(String, Value)>,
    },
    PullAll,
    DiscardAll,
    Begin {
        extra: Vec<(String, Value)>,
    },
    Commit,
    Rollback,
    Reset,
    Goodbye,
}

impl Request {
    pub fn into_value(self) -> Value {
        match self {
            Request::Hello { user_agent, auth } => {
                let mut fields = auth;
                fields.push(("user_agent".to_string(), Value::String(user_agent)));
                Value::Struct {
                    tag: tag::HELLO,
                    fields: vec![Value::Map(fields)],
                }
            }
            Request::Run {
                statement,
                parameters,
                extra,
            } => Value::Struct {
                tag: tag::RUN,
                fields: vec![
                    Value::String(statement),
                    Value::Map(parameters),
                    Value::Map(extra),
                ],
            },
            Request::PullAll => Value::Struct {
                tag: tag::PULL_ALL,
                fields: vec![],
            },
            Request::DiscardAll => Value::Struct {
                tag: tag::DISCARD_ALL,
                fields: vec![],
            },
            Request::Begin { extra } => Value::Struct {
                tag: tag::BEGIN,
                fields: vec![Value::Map(extra)],
            },
            Request::Commit => Value::Struct {
                tag: tag::COMMIT,
                fields: vec![],
            },
            Request::Rollback => Value::Struct {
                tag: tag::ROLLBACK,
                fields: vec![],
            },
            Request::Reset => Value::Struct {
                tag: tag::RESET,
                fields: vec![],
            },
            Request::Goodbye => Value::Struct {
                tag: tag::GOODBYE,
                fields: vec![],
            },
        }
    }

    /// The request's struct tag, used for tracing before it is consumed by
    /// `into_value`.
    pub fn tag(&self) -> u8 {
        match self {
            Request::Hello { .. } => tag::HELLO,
            Request::Run { .. } => tag::RUN,
            Request::PullAll => tag::PULL_ALL,
            Request::DiscardAll => tag::DISCARD_ALL,
            Request::Begin { .. } => tag::BEGIN,
            Request::Commit => tag::COMMIT,
            Request::Rollback => tag::ROLLBACK,
            Request::Reset => tag::RESET,
            Request::Goodbye => tag::GOODBYE,
        }
    }
}

/// A decoded response message (§3 "Response message").
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Success(Vec<(String, Value)>),
    Record(Vec<Value>),
    Failure { code: String, message: String },
    Ignored,
}

impl Response {
    pub fn from_struct(tag: u8, fields: Vec<Value>) -> crate::error::Result<Response> {
        use crate::error::{Error, ProtocolError};
        match tag {
            tag::SUCCESS => {
                crate::packstream::check_struct_arity(tag, &fields, 1)?;
                let metadata = match fields.into_iter().next().unwrap() {
                    Value::Map(m) => m,
                    _ => return Err(Error::client("SUCCESS metadata must be a map")),
                };
                Ok(Response::Success(metadata))
            }
            tag::RECORD => {
                crate::packstream::check_struct_arity(tag, &fields, 1)?;
                let values = match fields.into_iter().next().unwrap() {
                    Value::List(l) => l,
                    _ => return Err(Error::client("RECORD fields must be a list")),
                };
                Ok(Response::Record(values))
            }
            tag::FAILURE => {
                crate::packstream::check_struct_arity(tag, &fields, 1)?;
                let metadata = match fields.into_iter().next().unwrap() {
                    Value::Map(m) => m,
                    _ => return Err(Error::client("FAILURE metadata must be a map")),
                };
                let code = metadata
                    .iter()
                    .find(|(k, _)| k == "code")
                    .and_then(|(_, v)| v.as_str())
                    .unwrap_or("Neo.DatabaseError.General.UnknownError")
                    .to_string();
                let message = metadata
                    .iter()
                    .find(|(k, _)| k == "message")
                    .and_then(|(_, v)| v.as_str())
                    .unwrap_or("")
                    .to_string();
                Ok(Response::Failure { code, message })
            }
            tag::IGNORED => {
                crate::packstream::check_struct_arity(tag, &fields, 0)?;
                Ok(Response::Ignored)
            }
            other => Err(Error::Protocol(ProtocolError::UnknownStructTag(other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packstream::{decode_one, encode};

    #[test]
    fn run_request_encodes_expected_fields() {
        let req = Request::Run {
            statement: "RETURN 1".to_string(),
            parameters: vec![],
            extra: vec![],
        };
        let value = req.into_value();
        match value {
            Value::Struct { tag, fields } => {
                assert_eq!(tag, tag::RUN);
                assert_eq!(fields.len(), 3);
            }
            _ => panic!("expected struct"),
        }
    }

    #[test]
    fn success_response_decodes_metadata() {
        let value = Value::Struct {
            tag: tag::SUCCESS,
            fields: vec![Value::Map(vec![(
                "bookmark".to_string(),
                Value::String("tx:1".to_string()),
            )])],
        };
        let bytes = encode(&value).unwrap();
        let decoded = decode_one(&bytes).unwrap();
        if let Value::Struct { tag, fields } = decoded {
            let response = Response::from_struct(tag, fields).unwrap();
            match response {
                Response::Success(meta) => {
                    assert_eq!(meta[0].0, "bookmark");
                }
                _ => panic!("expected success"),
            }
        }
    }

    #[test]
    fn failure_response_extracts_code_and_message() {
        let value = Value::Struct {
            tag: tag::FAILURE,
            fields: vec![Value::Map(vec![
                ("code".to_string(), Value::String("Neo.ClientError.Statement.SyntaxError".to_string())),
                ("message".to_string(), Value::String("bad query".to_string())),
            ])],
        };
        if let Value::Struct { tag, fields } = value {
            let response = Response::from_struct(tag, fields).unwrap();
            match response {
                Response::Failure { code, message } => {
                    assert_eq!(code, "Neo.ClientError.Statement.SyntaxError");
                    assert_eq!(message, "bad query");
                }
                _ => panic!("expected failure"),
            }
        }
    }
}
