//! Decoded value tree exchanged with the codec collaborator.

use std::collections::BTreeMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::crdt_types::{VECTOR_CLOCK_ENTRY, VECTOR_CLOCK_VERSION};
use crate::error::{Error, Result};
use crate::ids::PeerId;
use crate::vector_clock::{ClockEntry, VectorClock, VersionStamp};

/// A value shaped by a schema: what `decode(bytes, schema)` produces and `encode` consumes.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Datum {
    Null,
    Boolean(bool),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Bytes(Vec<u8>),
    String(String),
    Fixed(Vec<u8>),
    Enum(String),
    Array(Vec<Datum>),
    Map(BTreeMap<String, Datum>),
    /// A record value tagged with the full name of its record type.
    Record {
        name: String,
        fields: BTreeMap<String, Datum>,
    },
}

impl Datum {
    pub fn record<I, S>(name: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = (S, Datum)>,
        S: Into<String>,
    {
        Datum::Record {
            name: name.into(),
            fields: fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Datum::Null)
    }

    /// Record type name, for record values.
    pub fn record_name(&self) -> Option<&str> {
        match self {
            Datum::Record { name, .. } => Some(name),
            _ => None,
        }
    }

    pub fn field(&self, name: &str) -> Option<&Datum> {
        match self {
            Datum::Record { fields, .. } => fields.get(name),
            _ => None,
        }
    }
}

impl From<bool> for Datum {
    fn from(value: bool) -> Self {
        Datum::Boolean(value)
    }
}

impl From<i32> for Datum {
    fn from(value: i32) -> Self {
        Datum::Int(value)
    }
}

impl From<i64> for Datum {
    fn from(value: i64) -> Self {
        Datum::Long(value)
    }
}

impl From<f64> for Datum {
    fn from(value: f64) -> Self {
        Datum::Double(value)
    }
}

impl From<&str> for Datum {
    fn from(value: &str) -> Self {
        Datum::String(value.to_string())
    }
}

impl From<String> for Datum {
    fn from(value: String) -> Self {
        Datum::String(value)
    }
}

fn peer_from_datum(datum: Option<&Datum>) -> Result<PeerId> {
    match datum {
        Some(Datum::Fixed(bytes)) | Some(Datum::Bytes(bytes)) => PeerId::from_slice(bytes),
        other => Err(Error::Codec(format!("expected a peer id, got {other:?}"))),
    }
}

fn count_from_datum(datum: Option<&Datum>) -> Result<u64> {
    match datum {
        Some(Datum::Long(n)) => u64::try_from(*n)
            .map_err(|_| Error::Codec(format!("negative clock count {n}"))),
        Some(Datum::Int(n)) => u64::try_from(*n)
            .map_err(|_| Error::Codec(format!("negative clock count {n}"))),
        other => Err(Error::Codec(format!("expected a clock count, got {other:?}"))),
    }
}

fn count_to_datum(count: u64) -> Datum {
    Datum::Long(i64::try_from(count).unwrap_or(i64::MAX))
}

impl VectorClock {
    /// `array<VectorClockEntry>` form used by flow records.
    pub fn to_datum(&self) -> Datum {
        Datum::Array(
            self.entries()
                .iter()
                .map(|entry| {
                    Datum::record(
                        VECTOR_CLOCK_ENTRY,
                        [
                            ("peerID", Datum::Fixed(entry.peer.as_bytes().to_vec())),
                            ("count", count_to_datum(entry.count)),
                        ],
                    )
                })
                .collect(),
        )
    }

    pub fn from_datum(datum: &Datum) -> Result<Self> {
        let Datum::Array(items) = datum else {
            return Err(Error::Codec(format!(
                "expected a vector clock array, got {datum:?}"
            )));
        };
        let entries = items
            .iter()
            .map(|item| {
                Ok(ClockEntry {
                    peer: peer_from_datum(item.field("peerID"))?,
                    count: count_from_datum(item.field("count"))?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(VectorClock::from_entries(entries))
    }
}

impl VersionStamp {
    /// `VectorClockVersion` record form.
    pub fn to_datum(&self) -> Datum {
        Datum::record(
            VECTOR_CLOCK_VERSION,
            [
                ("lastWriterID", Datum::Fixed(self.last_writer.as_bytes().to_vec())),
                ("vectorClockSum", count_to_datum(self.clock_sum)),
            ],
        )
    }

    pub fn from_datum(datum: &Datum) -> Result<Self> {
        Ok(VersionStamp::new(
            peer_from_datum(datum.field("lastWriterID"))?,
            count_from_datum(datum.field("vectorClockSum"))?,
        ))
    }
}
