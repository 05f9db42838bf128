//! # Struct handler registry (§4.3 "Struct handler registry")
//!
//! Bidirectional mapping between PackStream struct tags and the domain
//! values the driver exposes to callers (nodes, relationships, paths,
//! spatial points, and the temporal family). Two lookup directions exist
//! because encode and decode start from different keys: decode starts from
//! the tag byte on the wire, encode starts from the domain value the
//! caller handed in.

use crate::error::{Error, ProtocolError};
use crate::packstream::{check_struct_arity, Value};

pub mod tag {
    pub const NODE: u8 = 0x4E;
    pub const RELATIONSHIP: u8 = 0x52;
    pub const UNBOUND_RELATIONSHIP: u8 = 0x72;
    pub const PATH: u8 = 0x50;
    pub const POINT_2D: u8 = 0x58;
    pub const POINT_3D: u8 = 0x59;
    pub const DATE: u8 = 0x44;
    pub const TIME: u8 = 0x54;
    pub const LOCAL_TIME: u8 = 0x74;
    pub const DATE_TIME_ZONE_ID: u8 = 0x66;
    pub const DATE_TIME_OFFSET: u8 = 0x49;
    pub const LOCAL_DATE_TIME: u8 = 0x64;
    pub const DURATION: u8 = 0x45;
}

/// A graph node: an id, a list of label names, and a property map.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: i64,
    pub labels: Vec<String>,
    pub properties: Vec<(String, Value)>,
}

/// A graph relationship bound to its endpoints.
#[derive(Debug, Clone, PartialEq)]
pub struct Relationship {
    pub id: i64,
    pub start_node_id: i64,
    pub end_node_id: i64,
    pub rel_type: String,
    pub properties: Vec<(String, Value)>,
}

/// A relationship as it appears inside a [`Path`], where the endpoints are
/// implied by the path's node sequence rather than carried explicitly.
#[derive(Debug, Clone, PartialEq)]
pub struct UnboundRelationship {
    pub id: i64,
    pub rel_type: String,
    pub properties: Vec<(String, Value)>,
}

/// An alternating walk of nodes and relationships returned by the server.
/// `rel_indices` encodes direction the way the wire does: a positive index
/// (1-based into `rels`) means the relationship is traversed start→end,
/// negative means end→start.
#[derive(Debug, Clone, PartialEq)]
pub struct Path {
    pub nodes: Vec<Node>,
    pub rels: Vec<UnboundRelationship>,
    pub indices: Vec<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point2D {
    pub srid: i64,
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point3D {
    pub srid: i64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Date {
    pub epoch_days: i64,
}

impl Date {
    /// Convert to a calendar date. Returns `None` if `epoch_days` falls
    /// outside `chrono::NaiveDate`'s representable range.
    pub fn to_naive_date(self) -> Option<chrono::NaiveDate> {
        chrono::NaiveDate::from_num_days_from_ce_opt(self.epoch_days as i32 + 719_163)
    }

    pub fn from_naive_date(date: chrono::NaiveDate) -> Self {
        Date {
            epoch_days: (date.num_days_from_ce() - 719_163) as i64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Time {
    pub nanos_of_day: i64,
    pub tz_offset_seconds: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalTime {
    pub nanos_of_day: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalDateTime {
    pub epoch_seconds: i64,
    pub nanos: i64,
}

impl LocalDateTime {
    pub fn to_naive_date_time(self) -> Option<chrono::NaiveDateTime> {
        chrono::NaiveDateTime::from_timestamp_opt(self.epoch_seconds, self.nanos as u32)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateTimeOffset {
    pub epoch_seconds: i64,
    pub nanos: i64,
    pub tz_offset_seconds: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateTimeZoneId {
    pub epoch_seconds: i64,
    pub nanos: i64,
    pub tz_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IsoDuration {
    pub months: i64,
    pub days: i64,
    pub seconds: i64,
    pub nanos: i64,
}

/// A decoded domain struct, tagged by which handler produced it.
#[derive(Debug, Clone, PartialEq)]
pub enum DomainValue {
    Node(Node),
    Relationship(Relationship),
    UnboundRelationship(UnboundRelationship),
    Path(Path),
    Point2D(Point2D),
    Point3D(Point3D),
    Date(Date),
    Time(Time),
    LocalTime(LocalTime),
    LocalDateTime(LocalDateTime),
    DateTimeOffset(DateTimeOffset),
    DateTimeZoneId(DateTimeZoneId),
    Duration(IsoDuration),
}

fn int(v: &Value) -> crate::error::Result<i64> {
    v.as_int()
        .ok_or_else(|| Error::client("expected an integer field in a struct"))
}

fn float(v: &Value) -> crate::error::Result<f64> {
    match v {
        Value::Float(f) => Ok(*f),
        _ => Err(Error::client("expected a float field in a struct")),
    }
}

fn string(v: &Value) -> crate::error::Result<String> {
    v.as_str()
        .map(str::to_string)
        .ok_or_else(|| Error::client("expected a string field in a struct"))
}

fn labels(v: &Value) -> crate::error::Result<Vec<String>> {
    v.as_list()
        .ok_or_else(|| Error::client("expected a list of labels"))?
        .iter()
        .map(string)
        .collect()
}

fn properties(v: &Value) -> crate::error::Result<Vec<(String, Value)>> {
    Ok(v.as_map()
        .ok_or_else(|| Error::client("expected a property map"))?
        .to_vec())
}

/// Decode a PackStream struct into a [`DomainValue`] based on its tag.
/// Unknown tags are a fatal [`ProtocolError::UnknownStructTag`] (§4.3).
pub fn decode_struct(tag: u8, fields: Vec<Value>) -> crate::error::Result<DomainValue> {
    match tag {
        tag::NODE => {
            check_struct_arity(tag, &fields, 3)?;
            Ok(DomainValue::Node(Node {
                id: int(&fields[0])?,
                labels: labels(&fields[1])?,
                properties: properties(&fields[2])?,
            }))
        }
        tag::RELATIONSHIP => {
            check_struct_arity(tag, &fields, 5)?;
            Ok(DomainValue::Relationship(Relationship {
                id: int(&fields[0])?,
                start_node_id: int(&fields[1])?,
                end_node_id: int(&fields[2])?,
                rel_type: string(&fields[3])?,
                properties: properties(&fields[4])?,
            }))
        }
        tag::UNBOUND_RELATIONSHIP => {
            check_struct_arity(tag, &fields, 3)?;
            Ok(DomainValue::UnboundRelationship(UnboundRelationship {
                id: int(&fields[0])?,
                rel_type: string(&fields[1])?,
                properties: properties(&fields[2])?,
            }))
        }
        tag::PATH => {
            check_struct_arity(tag, &fields, 3)?;
            let nodes = fields[0]
                .as_list()
                .ok_or_else(|| Error::client("expected a list of nodes in a path"))?
                .iter()
                .cloned()
                .map(|v| match v {
                    Value::Struct { tag, fields } => match decode_struct(tag, fields)? {
                        DomainValue::Node(n) => Ok(n),
                        _ => Err(Error::client("path node list contained a non-node struct")),
                    },
                    _ => Err(Error::client("path node list contained a non-struct value")),
                })
                .collect::<crate::error::Result<Vec<_>>>()?;
            let rels = fields[1]
                .as_list()
                .ok_or_else(|| Error::client("expected a list of relationships in a path"))?
                .iter()
                .cloned()
                .map(|v| match v {
                    Value::Struct { tag, fields } => match decode_struct(tag, fields)? {
                        DomainValue::UnboundRelationship(r) => Ok(r),
                        _ => Err(Error::client(
                            "path relationship list contained a non-relationship struct",
                        )),
                    },
                    _ => Err(Error::client(
                        "path relationship list contained a non-struct value",
                    )),
                })
                .collect::<crate::error::Result<Vec<_>>>()?;
            let indices = fields[2]
                .as_list()
                .ok_or_else(|| Error::client("expected a list of indices in a path"))?
                .iter()
                .map(int)
                .collect::<crate::error::Result<Vec<_>>>()?;
            Ok(DomainValue::Path(Path {
                nodes,
                rels,
                indices,
            }))
        }
        tag::POINT_2D => {
            check_struct_arity(tag, &fields, 3)?;
            Ok(DomainValue::Point2D(Point2D {
                srid: int(&fields[0])?,
                x: float(&fields[1])?,
                y: float(&fields[2])?,
            }))
        }
        tag::POINT_3D => {
            check_struct_arity(tag, &fields, 4)?;
            Ok(DomainValue::Point3D(Point3D {
                srid: int(&fields[0])?,
                x: float(&fields[1])?,
                y: float(&fields[2])?,
                z: float(&fields[3])?,
            }))
        }
        tag::DATE => {
            check_struct_arity(tag, &fields, 1)?;
            Ok(DomainValue::Date(Date {
                epoch_days: int(&fields[0])?,
            }))
        }
        tag::TIME => {
            check_struct_arity(tag, &fields, 2)?;
            Ok(DomainValue::Time(Time {
                nanos_of_day: int(&fields[0])?,
                tz_offset_seconds: int(&fields[1])?,
            }))
        }
        tag::LOCAL_TIME => {
            check_struct_arity(tag, &fields, 1)?;
            Ok(DomainValue::LocalTime(LocalTime {
                nanos_of_day: int(&fields[0])?,
            }))
        }
        tag::LOCAL_DATE_TIME => {
            check_struct_arity(tag, &fields, 2)?;
            Ok(DomainValue::LocalDateTime(LocalDateTime {
                epoch_seconds: int(&fields[0])?,
                nanos: int(&fields[1])?,
            }))
        }
        tag::DATE_TIME_OFFSET => {
            check_struct_arity(tag, &fields, 3)?;
            Ok(DomainValue::DateTimeOffset(DateTimeOffset {
                epoch_seconds: int(&fields[0])?,
                nanos: int(&fields[1])?,
                tz_offset_seconds: int(&fields[2])?,
            }))
        }
        tag::DATE_TIME_ZONE_ID => {
            check_struct_arity(tag, &fields, 3)?;
            Ok(DomainValue::DateTimeZoneId(DateTimeZoneId {
                epoch_seconds: int(&fields[0])?,
                nanos: int(&fields[1])?,
                tz_id: string(&fields[2])?,
            }))
        }
        tag::DURATION => {
            check_struct_arity(tag, &fields, 4)?;
            Ok(DomainValue::Duration(IsoDuration {
                months: int(&fields[0])?,
                days: int(&fields[1])?,
                seconds: int(&fields[2])?,
                nanos: int(&fields[3])?,
            }))
        }
        other => Err(Error::Protocol(ProtocolError::UnknownStructTag(other))),
    }
}

/// Encode a [`DomainValue`] back into its PackStream struct representation.
pub fn encode_struct(value: &DomainValue) -> Value {
    match value {
        DomainValue::Node(n) => Value::Struct {
            tag: tag::NODE,
            fields: vec![
                Value::Int(n.id),
                Value::List(n.labels.iter().cloned().map(Value::String).collect()),
                Value::Map(n.properties.clone()),
            ],
        },
        DomainValue::Relationship(r) => Value::Struct {
            tag: tag::RELATIONSHIP,
            fields: vec![
                Value::Int(r.id),
                Value::Int(r.start_node_id),
                Value::Int(r.end_node_id),
                Value::String(r.rel_type.clone()),
                Value::Map(r.properties.clone()),
            ],
        },
        DomainValue::UnboundRelationship(r) => Value::Struct {
            tag: tag::UNBOUND_RELATIONSHIP,
            fields: vec![
                Value::Int(r.id),
                Value::String(r.rel_type.clone()),
                Value::Map(r.properties.clone()),
            ],
        },
        DomainValue::Path(p) => Value::Struct {
            tag: tag::PATH,
            fields: vec![
                Value::List(
                    p.nodes
                        .iter()
                        .map(|n| encode_struct(&DomainValue::Node(n.clone())))
                        .collect(),
                ),
                Value::List(
                    p.rels
                        .iter()
                        .map(|r| encode_struct(&DomainValue::UnboundRelationship(r.clone())))
                        .collect(),
                ),
                Value::List(p.indices.iter().copied().map(Value::Int).collect()),
            ],
        },
        DomainValue::Point2D(p) => Value::Struct {
            tag: tag::POINT_2D,
            fields: vec![Value::Int(p.srid), Value::Float(p.x), Value::Float(p.y)],
        },
        DomainValue::Point3D(p) => Value::Struct {
            tag: tag::POINT_3D,
            fields: vec![
                Value::Int(p.srid),
                Value::Float(p.x),
                Value::Float(p.y),
                Value::Float(p.z),
            ],
        },
        DomainValue::Date(d) => Value::Struct {
            tag: tag::DATE,
            fields: vec![Value::Int(d.epoch_days)],
        },
        DomainValue::Time(t) => Value::Struct {
            tag: tag::TIME,
            fields: vec![Value::Int(t.nanos_of_day), Value::Int(t.tz_offset_seconds)],
        },
        DomainValue::LocalTime(t) => Value::Struct {
            tag: tag::LOCAL_TIME,
            fields: vec![Value::Int(t.nanos_of_day)],
        },
        DomainValue::LocalDateTime(dt) => Value::Struct {
            tag: tag::LOCAL_DATE_TIME,
            fields: vec![Value::Int(dt.epoch_seconds), Value::Int(dt.nanos)],
        },
        DomainValue::DateTimeOffset(dt) => Value::Struct {
            tag: tag::DATE_TIME_OFFSET,
            fields: vec![
                Value::Int(dt.epoch_seconds),
                Value::Int(dt.nanos),
                Value::Int(dt.tz_offset_seconds),
            ],
        },
        DomainValue::DateTimeZoneId(dt) => Value::Struct {
            tag: tag::DATE_TIME_ZONE_ID,
            fields: vec![
                Value::Int(dt.epoch_seconds),
                Value::Int(dt.nanos),
                Value::String(dt.tz_id.clone()),
            ],
        },
        DomainValue::Duration(d) => Value::Struct {
            tag: tag::DURATION,
            fields: vec![
                Value::Int(d.months),
                Value::Int(d.days),
                Value::Int(d.seconds),
                Value::Int(d.nanos),
            ],
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_roundtrip() {
        let node = DomainValue::Node(Node {
            id: 42,
            labels: vec!["Person".to_string()],
            properties: vec![("name".to_string(), Value::String("Ada".to_string()))],
        });
        let encoded = encode_struct(&node);
        if let Value::Struct { tag, fields } = encoded {
            let decoded = decode_struct(tag, fields).unwrap();
            assert_eq!(decoded, node);
        } else {
            panic!("expected struct");
        }
    }

    #[test]
    fn unknown_tag_is_fatal() {
        assert!(decode_struct(0xFF, vec![]).is_err());
    }

    #[test]
    fn node_arity_mismatch_is_rejected() {
        let err = decode_struct(tag::NODE, vec![Value::Int(1)]);
        assert!(err.is_err());
    }

    #[test]
    fn point_and_duration_roundtrip() {
        let point = DomainValue::Point3D(Point3D {
            srid: 4979,
            x: 1.0,
            y: 2.0,
            z: 3.0,
        });
        if let Value::Struct { tag, fields } = encode_struct(&point) {
            assert_eq!(decode_struct(tag, fields).unwrap(), point);
        }

        let duration = DomainValue::Duration(IsoDuration {
            months: 1,
            days: 2,
            seconds: 3,
            nanos: 4,
        });
        if let Value::Struct { tag, fields } = encode_struct(&duration) {
            assert_eq!(decode_struct(tag, fields).unwrap(), duration);
        }
    }

    #[test]
    fn date_converts_to_and_from_naive_date() {
        let epoch = Date { epoch_days: 0 };
        let naive = epoch.to_naive_date().unwrap();
        assert_eq!(naive, chrono::NaiveDate::from_ymd_opt(1970, 1, 1).unwrap());
        assert_eq!(Date::from_naive_date(naive), epoch);
    }
}
