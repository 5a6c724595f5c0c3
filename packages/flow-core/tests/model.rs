mod common;

use std::sync::Arc;

use common::{child, document, document_datum, registry, scalar};
use flow_core::{
    Codec, Datum, Error, FieldKind, FieldValue, MemoryCodec, Model, RecordRole, Root,
    SchemaError, VectorClock,
};

#[test]
fn registry_classifies_generated_records() {
    let registry = registry();
    assert_eq!(registry.root().name, "app._flow_record.Document");
    assert_eq!(registry.role("app._flow_record.Branch"), RecordRole::Model);
    assert_eq!(registry.role("app._flow_versioned.Branch"), RecordRole::Envelope);
    assert_eq!(
        registry.role("app._flow_list.Document.tags.OrderedList"),
        RecordRole::Plain
    );

    let document = registry.descriptor_for_app("app.Document").unwrap();
    let kinds: Vec<(&str, &FieldKind)> = document
        .fields
        .iter()
        .map(|f| (f.name.as_str(), &f.kind))
        .collect();
    assert_eq!(
        kinds,
        vec![
            ("_flowVectorClock", &FieldKind::VectorClock),
            (
                "title",
                &FieldKind::Versioned {
                    envelope: "com.flowprotocol.crdt.VersionedString".into()
                }
            ),
            (
                "left",
                &FieldKind::Versioned {
                    envelope: "app._flow_versioned.Branch".into()
                }
            ),
            (
                "right",
                &FieldKind::Versioned {
                    envelope: "app._flow_versioned.Branch".into()
                }
            ),
            ("tags", &FieldKind::Unversioned),
        ]
    );
}

#[test]
fn registry_requires_a_record_root() {
    let flow = flow_core::convert_json(&serde_json::json!("string")).unwrap();
    assert!(matches!(
        flow_core::Registry::new(&flow),
        Err(Error::Schema(SchemaError::RootNotRecord))
    ));
}

#[test]
fn decoded_records_become_models_with_fresh_ids() {
    let registry = registry();
    let first = Model::from_datum(&document_datum(), &registry).unwrap();
    let second = Model::from_datum(&document_datum(), &registry).unwrap();
    assert_ne!(first.object_id(), second.object_id());

    let first = Arc::new(first);
    let left = child(&first, "left");
    let right = child(&first, "right");
    assert_ne!(left.object_id(), right.object_id());
    assert_eq!(scalar(&left, "label"), Datum::from("L"));
    assert_eq!(scalar(&child(&right, "leaf"), "count"), Datum::Long(2));
    assert_eq!(first.child_models().len(), 2);
    assert!(matches!(first.field("tags"), Some(FieldValue::Scalar(Datum::Null))));
}

#[test]
fn to_datum_inverts_from_datum() {
    let registry = registry();
    let model = Model::from_datum(&document_datum(), &registry).unwrap();
    assert_eq!(model.to_datum(), document_datum());
}

#[test]
fn non_model_records_are_rejected_at_the_root() {
    let registry = registry();
    let datum = Datum::record("app.Unknown", [("x", Datum::Int(1))]);
    assert!(matches!(
        Model::from_datum(&datum, &registry),
        Err(Error::Codec(_))
    ));
}

#[test]
fn with_field_keeps_identity_and_input() {
    let registry = registry();
    let model = Arc::new(Model::from_datum(&document_datum(), &registry).unwrap());
    let renamed = model
        .with_initial_value("title", Datum::from("renamed"))
        .unwrap();
    assert_eq!(renamed.object_id(), model.object_id());
    assert_eq!(scalar(&model, "title"), Datum::from("hello"));
    assert_eq!(scalar(&Arc::new(renamed), "title"), Datum::from("renamed"));

    assert!(matches!(
        model.with_field("nope", FieldValue::null()),
        Err(Error::InvalidField(_))
    ));
    assert!(matches!(
        model.with_field("_flowVectorClock", FieldValue::null()),
        Err(Error::InvalidField(_))
    ));
}

#[test]
fn roots_round_trip_through_a_codec() {
    let registry = registry();
    let codec = MemoryCodec::new();
    let root = document(&registry);

    let bytes = root.encode(&codec, &registry).unwrap();
    assert_eq!(codec.len(), 1);
    let decoded = Root::decode(&codec, &bytes, &registry).unwrap();
    assert_eq!(decoded.model().to_datum(), root.model().to_datum());
    assert_ne!(decoded.model().object_id(), root.model().object_id());
    assert_eq!(decoded.index().len(), root.index().len());

    assert!(codec.decode(&[1, 2, 3], registry.schema()).is_err());
}

#[test]
fn clocks_survive_the_datum_boundary() {
    let registry = registry();
    let peer = flow_core::PeerId([9; 16]);
    let mut clock = VectorClock::new();
    clock.increment(&peer);
    clock.increment(&peer);

    let model = Model::from_datum(&document_datum(), &registry)
        .unwrap()
        .with_clock(clock.clone());
    let decoded = Model::from_datum(&model.to_datum(), &registry).unwrap();
    assert_eq!(decoded.clock(), &clock);
}
