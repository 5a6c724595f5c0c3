#![allow(dead_code)]

use std::sync::Arc;

use flow_core::{convert_json, Datum, Model, Registry, Root};
use serde_json::json;

pub const VERSIONED_STRING: &str = "com.flowprotocol.crdt.VersionedString";
pub const VERSIONED_LONG: &str = "com.flowprotocol.crdt.VersionedLong";

/// `Document { title, left: Branch, right: Branch, tags: [string] }`,
/// `Branch { label, leaf: Leaf }`, `Leaf { count }`.
pub fn registry() -> Registry {
    let flow = convert_json(&json!({
        "type": "record", "name": "Document", "namespace": "app", "fields": [
            {"name": "title", "type": "string"},
            {"name": "left", "type": {
                "type": "record", "name": "Branch", "fields": [
                    {"name": "label", "type": "string"},
                    {"name": "leaf", "type": {
                        "type": "record", "name": "Leaf", "fields": [
                            {"name": "count", "type": "long"}
                        ]
                    }}
                ]
            }},
            {"name": "right", "type": "Branch"},
            {"name": "tags", "type": {"type": "array", "items": "string"}}
        ]
    }))
    .unwrap();
    Registry::new(&flow).unwrap()
}

fn envelope(name: &str, value: Datum) -> Datum {
    Datum::record(name, [("value", value), ("version", Datum::Null)])
}

fn leaf(count: i64) -> Datum {
    Datum::record(
        "app._flow_record.Leaf",
        [
            ("_flowVectorClock", Datum::Array(vec![])),
            ("count", envelope(VERSIONED_LONG, Datum::Long(count))),
        ],
    )
}

fn branch(label: &str, count: i64) -> Datum {
    Datum::record(
        "app._flow_record.Branch",
        [
            ("_flowVectorClock", Datum::Array(vec![])),
            ("label", envelope(VERSIONED_STRING, Datum::from(label))),
            ("leaf", envelope("app._flow_versioned.Leaf", leaf(count))),
        ],
    )
}

pub fn document_datum() -> Datum {
    Datum::record(
        "app._flow_record.Document",
        [
            ("_flowVectorClock", Datum::Array(vec![])),
            ("title", envelope(VERSIONED_STRING, Datum::from("hello"))),
            ("left", envelope("app._flow_versioned.Branch", branch("L", 1))),
            ("right", envelope("app._flow_versioned.Branch", branch("R", 2))),
            ("tags", Datum::Null),
        ],
    )
}

pub fn document(registry: &Registry) -> Root {
    let model = Model::from_datum(&document_datum(), registry).unwrap();
    Root::new(Arc::new(model))
}

/// Nested model stored (through its envelope) in `field`.
pub fn child(model: &Arc<Model>, field: &str) -> Arc<Model> {
    model
        .field(field)
        .unwrap()
        .unwrap_versioned()
        .as_model()
        .unwrap()
        .clone()
}

pub fn scalar(model: &Arc<Model>, field: &str) -> Datum {
    model
        .field(field)
        .unwrap()
        .unwrap_versioned()
        .as_datum()
        .unwrap()
        .clone()
}
