use std::env;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use flow_core::{
    convert_json, set_field, transaction, Datum, Model, Registry, Result, Root, TreeMap,
};
use serde_json::json;

#[derive(serde::Serialize)]
struct Output {
    implementation: &'static str,
    workload: String,
    timestamp: String,
    name: String,
    total_ops: u64,
    duration_ms: f64,
    ops_per_sec: f64,
    extra: Extra,
    source_file: Option<String>,
}

#[derive(serde::Serialize)]
struct Extra {
    count: u64,
}

fn chain_registry() -> Result<Registry> {
    let flow = convert_json(&json!({
        "type": "record",
        "name": "Node",
        "namespace": "bench",
        "fields": [
            {"name": "value", "type": "long"},
            {"name": "next", "type": ["null", "Node"]}
        ]
    }))?;
    Registry::new(&flow)
}

/// Linked chain of `depth` nodes; returns the root and the deepest node.
fn build_chain(registry: &Registry, depth: u64) -> Result<(Root, Arc<Model>)> {
    let node = registry
        .descriptor_for_app("bench.Node")
        .cloned()
        .ok_or_else(|| flow_core::Error::InvalidField("bench.Node".into()))?;
    let leaf = Arc::new(Model::new(node.clone()).with_initial_value("value", Datum::Long(0))?);
    let mut head = Arc::clone(&leaf);
    for i in 1..depth {
        head = Arc::new(
            Model::new(node.clone())
                .with_initial_value("value", Datum::Long(i as i64))?
                .with_initial_value("next", head)?,
        );
    }
    Ok((Root::new(head), leaf))
}

fn run(count: u64) -> Result<f64> {
    let registry = chain_registry()?;
    let (mut root, leaf) = build_chain(&registry, count)?;

    let start = Instant::now();
    let mut map = TreeMap::new();
    for i in 0..count {
        map = map.set(i, i);
    }
    for i in 0..count {
        map = map.delete(&i).0;
    }
    let leaf_id = leaf.object_id();
    for i in 0..count {
        let leaf = root
            .index()
            .get(&leaf_id)
            .map(|item| Arc::clone(&item.model))
            .unwrap_or_else(|| Arc::clone(&leaf));
        root = transaction(&root, |_| {
            set_field(&leaf, "value", Datum::Long(i as i64))?;
            Ok(())
        })?;
    }
    Ok(start.elapsed().as_secs_f64() * 1000.0)
}

fn main() -> Result<()> {
    let mut count: u64 = 200;
    let mut out_file: Option<PathBuf> = None;
    for arg in env::args().skip(1) {
        if let Some(val) = arg.strip_prefix("--count=") {
            count = val.parse().unwrap_or(count);
        } else if let Some(val) = arg.strip_prefix("--out=") {
            out_file = Some(PathBuf::from(val));
        }
    }

    let duration_ms = run(count)?;
    let output = Output {
        implementation: "flow-core",
        workload: format!("map-and-chain-commit-{}", count),
        timestamp: chrono::Utc::now().to_rfc3339(),
        name: format!("map-and-chain-commit-{}", count),
        total_ops: count * 3,
        duration_ms,
        ops_per_sec: if duration_ms > 0.0 {
            (count as f64 * 3.0) / duration_ms * 1000.0
        } else {
            f64::INFINITY
        },
        extra: Extra { count },
        source_file: out_file.as_ref().map(|p| p.display().to_string()),
    };

    let json = serde_json::to_string_pretty(&output).expect("serialize");
    if let Some(path) = out_file {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("mkdirs");
        }
        fs::write(&path, &json).expect("write output");
    }
    println!("{}", json);
    Ok(())
}
