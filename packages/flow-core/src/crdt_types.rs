//! Built-in support types referenced by every flow schema.
//!
//! A codec has to know these named types before it can parse a flow schema, since converted
//! records refer to them by name only.

use serde_json::json;

use crate::ids::PEER_ID_LEN;
use crate::schema::{Field, FixedSchema, Name, Primitive, RecordKind, RecordSchema, Schema};

pub const CRDT_NAMESPACE: &str = "com.flowprotocol.crdt";
pub const PEER_ID: &str = "com.flowprotocol.crdt.PeerID";
pub const VECTOR_CLOCK_ENTRY: &str = "com.flowprotocol.crdt.VectorClockEntry";
pub const VECTOR_CLOCK_VERSION: &str = "com.flowprotocol.crdt.VectorClockVersion";

/// Name of the synthetic vector clock field prepended to every converted record.
pub const VECTOR_CLOCK_FIELD: &str = "_flowVectorClock";

/// Prefix reserved for generated names; application schemas may not use it.
pub const RESERVED_PREFIX: &str = "_flow";

pub const RECORD_NAMESPACE: &str = "_flow_record";
pub const VERSIONED_NAMESPACE: &str = "_flow_versioned";
pub const FIELD_NAMESPACE: &str = "_flow_field";
pub const LIST_NAMESPACE: &str = "_flow_list";

/// `com.flowprotocol.crdt.Versioned<Type>`: `{value: Type, version}`.
pub fn versioned_name(primitive: Primitive) -> String {
    format!("{CRDT_NAMESPACE}.Versioned{}", primitive.type_suffix())
}

/// `com.flowprotocol.crdt.Optional<Type>`: `{value: [null, Type], version: [null, version]}`.
pub fn optional_name(primitive: Primitive) -> String {
    format!("{CRDT_NAMESPACE}.Optional{}", primitive.type_suffix())
}

/// True for the shared `Versioned*` / `Optional*` wrapper records.
pub fn is_shared_wrapper(fullname: &str) -> bool {
    fullname
        .strip_prefix(CRDT_NAMESPACE)
        .and_then(|rest| rest.strip_prefix('.'))
        .map(|local| local.starts_with("Versioned") || local.starts_with("Optional"))
        .unwrap_or(false)
}

fn crdt_name(local: &str) -> Name {
    Name::new(local, Some(CRDT_NAMESPACE.to_string()))
}

fn record(local: &str, fields: Vec<Field>) -> Schema {
    Schema::Record(RecordSchema {
        kind: RecordKind::Record,
        name: crdt_name(local),
        doc: None,
        semantics: None,
        fields,
    })
}

/// Field `{name, type: VectorClockVersion}`, or its nullable form.
pub fn version_field(name: &str, optional: bool) -> Field {
    let version = Schema::reference(VECTOR_CLOCK_VERSION);
    let schema = if optional {
        Schema::Union(vec![Schema::null(), version])
    } else {
        version
    };
    Field::new(name, schema)
}

/// Field `{name, type: array<VectorClockEntry>, default: []}`.
pub fn vector_clock_field(name: &str) -> Field {
    Field::new(name, Schema::array(Schema::reference(VECTOR_CLOCK_ENTRY))).with_default(json!([]))
}

/// All built-in definitions, in dependency order.
pub fn builtin_schemas() -> Vec<Schema> {
    let mut schemas = vec![
        Schema::Fixed(FixedSchema {
            name: crdt_name("PeerID"),
            size: PEER_ID_LEN,
        }),
        record(
            "VectorClockEntry",
            vec![
                Field::new("peerID", Schema::reference(PEER_ID)),
                Field::new("count", Schema::Primitive(Primitive::Long)),
            ],
        ),
        record(
            "VectorClockVersion",
            vec![
                Field::new("lastWriterID", Schema::reference(PEER_ID)),
                Field::new("vectorClockSum", Schema::Primitive(Primitive::Long)),
            ],
        ),
    ];
    for primitive in Primitive::ALL {
        schemas.push(record(
            &format!("Versioned{}", primitive.type_suffix()),
            vec![
                Field::new("value", Schema::Primitive(primitive)),
                version_field("version", false),
            ],
        ));
        schemas.push(record(
            &format!("Optional{}", primitive.type_suffix()),
            vec![
                Field::new(
                    "value",
                    Schema::Union(vec![Schema::null(), Schema::Primitive(primitive)]),
                )
                .with_default(json!(null)),
                version_field("version", true).with_default(json!(null)),
            ],
        ));
    }
    schemas
}
