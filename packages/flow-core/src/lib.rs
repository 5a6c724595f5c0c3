#![forbid(unsafe_code)]
//! Core of the Flow data-modeling layer: converts application schemas into CRDT-versioned flow
//! schemas, and provides immutable models whose transactional updates propagate copy-on-write
//! to new root versions over persistent 2-3 trees.
//! Binary encoding stays with the host, behind the [`Codec`] trait.

pub mod accessor;
pub mod converter;
pub mod crdt_types;
pub mod datum;
pub mod error;
pub mod ids;
pub mod index;
pub mod map;
pub mod model;
pub mod peer;
pub mod registry;
pub mod root;
pub mod schema;
pub mod set;
pub mod traits;
pub mod transaction;
mod tree;
pub mod vector_clock;

pub use accessor::{get_field, set_field};
pub use converter::{convert, convert_json, convert_str, FlowSchema};
pub use datum::Datum;
pub use error::{Error, Result, ScopeError, SchemaError, TransactionStateError};
pub use ids::{ObjectId, PeerId, PEER_ID_LEN};
pub use index::{FlowIndex, IndexItem};
pub use map::TreeMap;
pub use model::{FieldValue, Model, Versioned};
pub use peer::{peer_id, reset_peer_id, set_peer_id};
pub use registry::{FieldDescriptor, FieldKind, RecordDescriptor, RecordRole, Registry};
pub use root::Root;
pub use schema::{Field, Name, Primitive, RecordKind, RecordSchema, Schema};
pub use set::TreeSet;
#[cfg(feature = "serde")]
pub use traits::JsonCodec;
pub use traits::{Codec, MemoryCodec};
pub use transaction::{transaction, transaction_many, Phase, Transaction};
pub use vector_clock::{ClockEntry, VectorClock, VersionStamp};
