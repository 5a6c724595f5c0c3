#[cfg(feature = "serde")]
#[test]
fn vector_clock_json_roundtrips() {
    use flow_core::{PeerId, VectorClock};

    let mut clock = VectorClock::new();
    clock.increment(&PeerId([2; 16]));
    clock.increment(&PeerId([1; 16]));
    clock.increment(&PeerId([2; 16]));

    let bytes = serde_json::to_vec(&clock).expect("serialize VectorClock");
    let json = std::str::from_utf8(&bytes).expect("VectorClock JSON must be UTF-8");
    assert!(
        json.contains("\"entries\"") && json.contains('['),
        "expected VectorClock to serialize as an entries list, got: {json}"
    );

    let roundtrip: VectorClock = serde_json::from_slice(&bytes).expect("deserialize VectorClock");
    assert_eq!(roundtrip, clock);
}

#[cfg(feature = "serde")]
#[test]
fn json_codec_roundtrips_a_root() {
    use flow_core::{convert_json, Codec, Datum, JsonCodec, Model, Registry, Root};
    use serde_json::json;
    use std::sync::Arc;

    let flow = convert_json(&json!({
        "type": "record", "name": "Note", "fields": [{"name": "body", "type": "string"}]
    }))
    .unwrap();
    let registry = Registry::new(&flow).unwrap();
    let note = Model::new(registry.root().clone())
        .with_initial_value("body", Datum::from("text"))
        .unwrap();
    let root = Root::new(Arc::new(note));

    let bytes = root.encode(&JsonCodec, &registry).unwrap();
    let decoded = Root::decode(&JsonCodec, &bytes, &registry).unwrap();
    assert_eq!(decoded.model().to_datum(), root.model().to_datum());

    let wrong = Datum::record("Other", [("x", Datum::Int(1))]);
    assert!(JsonCodec.encode(&wrong, registry.schema()).is_err());
}
