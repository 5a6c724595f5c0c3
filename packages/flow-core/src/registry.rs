//! Static descriptor table built once from a flow schema.
//!
//! Models and accessors are generic over descriptors instead of being generated per record
//! type: a [`RecordDescriptor`] lists a model record's fields and how each one is stored.

use std::sync::Arc;

use crate::converter::FlowSchema;
use crate::crdt_types::{
    is_shared_wrapper, FIELD_NAMESPACE, LIST_NAMESPACE, RECORD_NAMESPACE, VECTOR_CLOCK_FIELD,
    VERSIONED_NAMESPACE,
};
use crate::error::{Result, SchemaError};
use crate::map::TreeMap;
use crate::schema::{namespace_of, RecordSchema, Schema};

/// What a generated record stands for at runtime.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordRole {
    /// Converted application record: becomes a [`crate::Model`].
    Model,
    /// `{value, version}` wrapper: becomes a [`crate::Versioned`] envelope.
    Envelope,
    /// Anything else (list metadata, atomic records, support types): kept as plain data.
    Plain,
}

/// Classify a record full name by the generated namespace it lives in.
pub fn role_of(fullname: &str) -> RecordRole {
    if is_shared_wrapper(fullname) {
        return RecordRole::Envelope;
    }
    let segments: Vec<&str> = namespace_of(fullname)
        .map(|ns| ns.split('.').collect())
        .unwrap_or_default();
    let has = |segment: &str| segments.iter().any(|s| *s == segment);
    if has(LIST_NAMESPACE) {
        RecordRole::Plain
    } else if has(VERSIONED_NAMESPACE) || has(FIELD_NAMESPACE) {
        RecordRole::Envelope
    } else if has(RECORD_NAMESPACE) {
        RecordRole::Model
    } else {
        RecordRole::Plain
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldKind {
    /// The synthetic `_flowVectorClock` field.
    VectorClock,
    /// A `{value, version}` envelope of the named wrapper record.
    Versioned { envelope: String },
    /// Stored as-is; no per-field version (ordered lists, for now).
    Unversioned,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: String,
    pub kind: FieldKind,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordDescriptor {
    /// Flow full name, e.g. `com.example._flow_record.Person`.
    pub name: String,
    pub fields: Vec<FieldDescriptor>,
}

impl RecordDescriptor {
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }
}

pub struct Registry {
    schema: Schema,
    root: Arc<RecordDescriptor>,
    descriptors: TreeMap<String, Arc<RecordDescriptor>>,
    roles: TreeMap<String, RecordRole>,
    app_names: TreeMap<String, String>,
}

impl Registry {
    pub fn new(flow: &FlowSchema) -> Result<Self> {
        Self::from_schema(flow.schema.clone(), flow.names.clone())
    }

    /// Build from a flow schema and the converter's application-name table.
    pub fn from_schema(schema: Schema, app_names: TreeMap<String, String>) -> Result<Self> {
        let mut records = Vec::new();
        collect_records(&schema, &mut records);

        let roles: TreeMap<String, RecordRole> = records
            .iter()
            .map(|r| {
                let name = r.name.fullname();
                let role = role_of(&name);
                (name, role)
            })
            .collect();

        let mut descriptors = TreeMap::new();
        for record in &records {
            let name = record.name.fullname();
            if roles.get(name.as_str()) != Some(&RecordRole::Model) {
                continue;
            }
            let fields = record
                .fields
                .iter()
                .map(|field| FieldDescriptor {
                    name: field.name.clone(),
                    kind: field_kind(&field.name, &field.schema, &roles),
                })
                .collect();
            let descriptor = Arc::new(RecordDescriptor {
                name: name.clone(),
                fields,
            });
            descriptors = descriptors.set(name, descriptor);
        }

        let root = match &schema {
            Schema::Record(record) => descriptors
                .get(record.name.fullname().as_str())
                .cloned()
                .ok_or(SchemaError::RootNotRecord)?,
            _ => return Err(SchemaError::RootNotRecord.into()),
        };

        tracing::debug!(
            root = %root.name,
            models = descriptors.len(),
            records = roles.len(),
            "built descriptor registry"
        );
        Ok(Self {
            schema,
            root,
            descriptors,
            roles,
            app_names,
        })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn root(&self) -> &Arc<RecordDescriptor> {
        &self.root
    }

    /// Model descriptor by flow full name.
    pub fn descriptor(&self, flow_name: &str) -> Option<&Arc<RecordDescriptor>> {
        self.descriptors.get(flow_name)
    }

    /// Model descriptor by application full name.
    pub fn descriptor_for_app(&self, app_name: &str) -> Option<&Arc<RecordDescriptor>> {
        self.app_names
            .get(app_name)
            .and_then(|flow_name| self.descriptor(flow_name))
    }

    pub fn role(&self, name: &str) -> RecordRole {
        self.roles.get(name).copied().unwrap_or_else(|| role_of(name))
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &Arc<RecordDescriptor>> + '_ {
        self.descriptors.values()
    }
}

fn collect_records<'a>(schema: &'a Schema, out: &mut Vec<&'a RecordSchema>) {
    match schema {
        Schema::Record(record) => {
            out.push(record);
            for field in &record.fields {
                collect_records(&field.schema, out);
            }
        }
        Schema::Array { items, .. } => collect_records(items, out),
        Schema::Map { values } => collect_records(values, out),
        Schema::Union(branches) => {
            for branch in branches {
                collect_records(branch, out);
            }
        }
        Schema::Primitive(_) | Schema::Enum(_) | Schema::Fixed(_) | Schema::Reference(_) => {}
    }
}

fn field_kind(name: &str, schema: &Schema, roles: &TreeMap<String, RecordRole>) -> FieldKind {
    if name == VECTOR_CLOCK_FIELD {
        return FieldKind::VectorClock;
    }
    match envelope_name(schema, roles) {
        Some(envelope) => FieldKind::Versioned { envelope },
        None => FieldKind::Unversioned,
    }
}

fn envelope_name(schema: &Schema, roles: &TreeMap<String, RecordRole>) -> Option<String> {
    let is_envelope = |name: &str| {
        roles.get(name).copied().unwrap_or_else(|| role_of(name)) == RecordRole::Envelope
    };
    match schema {
        Schema::Reference(name) if is_envelope(name) => Some(name.clone()),
        Schema::Record(record) if is_envelope(&record.name.fullname()) => {
            Some(record.name.fullname())
        }
        Schema::Union(branches) => {
            let mut non_null = branches.iter().filter(|b| !b.is_null());
            match (non_null.next(), non_null.next()) {
                (Some(only), None) => envelope_name(only, roles),
                _ => None,
            }
        }
        _ => None,
    }
}
