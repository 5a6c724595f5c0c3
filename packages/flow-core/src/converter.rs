//! Schema converter: application schema in, CRDT-versioned flow schema out.
//!
//! Every record is rewritten into the `_flow_record` sibling namespace with a vector clock
//! field prepended, and every field is replaced by a versioned wrapper. See the field rules in
//! [`Converter::field_schema`].

use serde_json::{json, Value};

use crate::crdt_types::{
    self, FIELD_NAMESPACE, LIST_NAMESPACE, PEER_ID, RECORD_NAMESPACE, RESERVED_PREFIX,
    VECTOR_CLOCK_FIELD, VERSIONED_NAMESPACE,
};
use crate::error::{Error, Result, SchemaError};
use crate::map::TreeMap;
use crate::schema::{join_name, Field, Name, Primitive, RecordKind, RecordSchema, Schema};

/// Output of a conversion.
#[derive(Clone, Debug, PartialEq)]
pub struct FlowSchema {
    pub schema: Schema,
    /// Application full name -> flow full name, for every named type defined in the input.
    pub names: TreeMap<String, String>,
}

impl FlowSchema {
    /// Flow full name generated for an application type.
    pub fn flow_name(&self, app_name: &str) -> Option<&str> {
        self.names.get(app_name).map(String::as_str)
    }

    pub fn to_json(&self) -> Value {
        self.schema.to_json()
    }
}

/// Convert an application schema. Pure and deterministic; the input is not modified.
pub fn convert(app_schema: &Schema) -> Result<FlowSchema> {
    tracing::debug!("converting application schema");
    let mut converter = Converter::default();
    let schema = converter.convert(app_schema, None, &FieldContext::default())?;
    tracing::debug!(
        named_types = converter.names.len(),
        versioned_types = converter.versioned_types.len(),
        "converted application schema"
    );
    Ok(FlowSchema {
        schema,
        names: converter.names,
    })
}

pub fn convert_json(app_schema: &Value) -> Result<FlowSchema> {
    convert(&Schema::from_json(app_schema)?)
}

pub fn convert_str(app_schema: &str) -> Result<FlowSchema> {
    convert(&Schema::parse_str(app_schema)?)
}

/// Naming context for metadata records generated below a field.
#[derive(Clone, Debug, Default)]
struct FieldContext {
    record_name: Option<String>,
    path: Vec<String>,
}

#[derive(Default)]
struct Converter {
    names: TreeMap<String, String>,
    /// Flow full name of a named type -> full name of its generated versioned companion.
    versioned_types: TreeMap<String, String>,
}

fn is_reserved(segment: &str) -> bool {
    segment.to_ascii_lowercase().starts_with(RESERVED_PREFIX)
}

fn name_of(schema: &Schema) -> Option<&Name> {
    match schema {
        Schema::Record(r) => Some(&r.name),
        Schema::Enum(e) => Some(&e.name),
        Schema::Fixed(f) => Some(&f.name),
        _ => None,
    }
}

fn with_name(schema: &Schema, name: Name) -> Schema {
    let mut schema = schema.clone();
    match &mut schema {
        Schema::Record(r) => r.name = name,
        Schema::Enum(e) => e.name = name,
        Schema::Fixed(f) => f.name = name,
        _ => {}
    }
    schema
}

fn record(name: &str, namespace: &str, fields: Vec<Field>) -> Schema {
    Schema::Record(RecordSchema {
        kind: RecordKind::Record,
        name: Name::new(name, Some(namespace.to_string())),
        doc: None,
        semantics: None,
        fields,
    })
}

impl Converter {
    fn convert(
        &mut self,
        schema: &Schema,
        namespace: Option<&str>,
        ctx: &FieldContext,
    ) -> Result<Schema> {
        match schema {
            Schema::Primitive(p) => Ok(Schema::Primitive(*p)),
            Schema::Record(_) | Schema::Enum(_) | Schema::Fixed(_) => {
                self.named_type(schema, namespace)
            }
            Schema::Array { items, semantics } => match semantics.as_deref().unwrap_or("list") {
                "list" => self.list_schema(items, namespace, ctx),
                tag @ ("set" | "map") => Err(Error::Unsupported(format!(
                    "array semantics {tag:?} are not implemented"
                ))),
                other => Err(SchemaError::UnknownSemantics(other.to_string()).into()),
            },
            Schema::Map { .. } => Err(Error::Unsupported("map types are not implemented".into())),
            Schema::Union(branches) => Ok(Schema::Union(
                branches
                    .iter()
                    .map(|branch| self.convert(branch, namespace, ctx))
                    .collect::<Result<_>>()?,
            )),
            Schema::Reference(name) => self.resolve_reference(name, namespace),
        }
    }

    fn resolve_reference(&self, name: &str, namespace: Option<&str>) -> Result<Schema> {
        let full_name = if name.contains('.') {
            name.to_string()
        } else {
            join_name(namespace, name)
        };
        self.names
            .get(full_name.as_str())
            .or_else(|| self.names.get(name))
            .map(|flow_name| Schema::Reference(flow_name.clone()))
            .ok_or_else(|| SchemaError::UnknownType(full_name).into())
    }

    fn named_type(&mut self, schema: &Schema, namespace: Option<&str>) -> Result<Schema> {
        let Some(raw) = name_of(schema) else {
            return Err(SchemaError::InvalidSchema(format!("not a named type: {schema:?}")).into());
        };
        let (local, namespace) = match raw.name.rsplit_once('.') {
            Some((ns, local)) => (local.to_string(), Some(ns.to_string())),
            None => (
                raw.name.clone(),
                raw.namespace
                    .clone()
                    .or_else(|| namespace.map(str::to_string)),
            ),
        };
        let namespace = namespace.filter(|ns| !ns.is_empty());
        let full_name = join_name(namespace.as_deref(), &local);

        if let Some(ns) = &namespace {
            if ns.split('.').any(is_reserved) {
                return Err(SchemaError::ReservedName(ns.clone()).into());
            }
        }
        if is_reserved(&local) {
            return Err(SchemaError::ReservedName(full_name).into());
        }
        if self.names.contains_key(full_name.as_str()) {
            return Err(SchemaError::DuplicateName(full_name).into());
        }

        let resolved = Name::new(local, namespace);
        match schema {
            Schema::Record(r) if r.semantics.as_deref() != Some("atomic") => {
                self.record_schema(r, resolved)
            }
            _ => {
                self.names = self.names.set(full_name.clone(), full_name);
                Ok(with_name(schema, resolved))
            }
        }
    }

    fn record_schema(&mut self, record: &RecordSchema, name: Name) -> Result<Schema> {
        let original_name = name.fullname();
        let generated_namespace = join_name(name.namespace.as_deref(), RECORD_NAMESPACE);
        self.names = self.names.set(
            original_name,
            join_name(Some(&generated_namespace), &name.name),
        );
        tracing::trace!(record = %name.fullname(), "converting record");

        let mut fields = vec![crdt_types::vector_clock_field(VECTOR_CLOCK_FIELD)];
        for field in &record.fields {
            fields.push(self.field_schema(field, name.namespace.as_deref(), &name.name)?);
        }

        Ok(Schema::Record(RecordSchema {
            kind: RecordKind::Record,
            name: Name::new(name.name, Some(generated_namespace)),
            doc: record.doc.clone(),
            semantics: None,
            fields,
        }))
    }

    /// Replace one application field by its versioned wrapper.
    ///
    /// - array: `[null, OrderedList]`, default null
    /// - required primitive: shared `Versioned<Type>`
    /// - optional primitive (`[null, T]`, no non-null default): shared `Optional<Type>`
    /// - named type seen before: its versioned companion (nullable when optional)
    /// - inline named definition: a new versioned companion (nullable when optional)
    /// - anything else: a per-field wrapper record `[null, {value, version}]`, default null
    fn field_schema(
        &mut self,
        field: &Field,
        namespace: Option<&str>,
        record_name: &str,
    ) -> Result<Field> {
        if is_reserved(&field.name) {
            return Err(SchemaError::ReservedName(field.name.clone()).into());
        }

        let ctx = FieldContext {
            record_name: Some(record_name.to_string()),
            path: vec![field.name.clone()],
        };
        let value_type = self.convert(&field.schema, namespace, &ctx)?;
        let has_default = field.default.is_some();
        let null_default = matches!(field.default, None | Some(Value::Null));
        let optional_type = match &value_type {
            Schema::Union(branches) if null_default => optional_branch(branches),
            _ => None,
        };

        let mut wrapper = Field {
            name: field.name.clone(),
            doc: field.doc.clone(),
            aliases: field.aliases.clone(),
            schema: Schema::null(),
            default: None,
        };

        if matches!(field.schema, Schema::Array { .. }) {
            wrapper.schema = Schema::Union(vec![Schema::null(), value_type]);
            wrapper.default = Some(Value::Null);
        } else if let (Schema::Primitive(p), false) = (&value_type, has_default) {
            wrapper.schema = Schema::reference(crdt_types::versioned_name(*p));
        } else if let Some(Schema::Primitive(p)) = optional_type {
            wrapper.schema = Schema::reference(crdt_types::optional_name(*p));
            wrapper.default = Some(json!({"value": null, "version": null}));
        } else if let Some(versioned) = self
            .versioned_reference(&value_type)
            .filter(|_| !has_default)
        {
            wrapper.schema = Schema::reference(versioned);
        } else if let Some(versioned) = optional_type.and_then(|t| self.versioned_reference(t)) {
            wrapper.schema = Schema::Union(vec![Schema::null(), Schema::reference(versioned)]);
            wrapper.default = Some(Value::Null);
        } else if value_type.is_named_definition() {
            wrapper.schema = self.versioned_named_type(&value_type);
        } else if let Some(named) = optional_type.filter(|t| t.is_named_definition()) {
            let versioned = self.versioned_named_type(named);
            wrapper.schema = Schema::Union(vec![Schema::null(), versioned]);
            wrapper.default = Some(Value::Null);
        } else {
            match &field.default {
                Some(Value::Object(obj)) if !obj.is_empty() => {
                    return Err(SchemaError::UnsupportedDefault(json!(obj).to_string()).into())
                }
                Some(Value::Array(items)) if !items.is_empty() => {
                    return Err(SchemaError::UnsupportedDefault(json!(items).to_string()).into())
                }
                _ => {}
            }
            let mut value_field = Field::new("value", value_type);
            value_field.default = field.default.clone();
            let per_field = Schema::Record(RecordSchema {
                kind: RecordKind::Record,
                name: Name::new(
                    field.name.clone(),
                    Some(join_name(
                        Some(&join_name(namespace, FIELD_NAMESPACE)),
                        record_name,
                    )),
                ),
                doc: None,
                semantics: None,
                fields: vec![value_field, crdt_types::version_field("version", false)],
            });
            wrapper.schema = Schema::Union(vec![Schema::null(), per_field]);
            wrapper.default = Some(Value::Null);
        }

        Ok(wrapper)
    }

    fn versioned_reference(&self, schema: &Schema) -> Option<String> {
        match schema {
            Schema::Reference(name) => self.versioned_types.get(name.as_str()).cloned(),
            _ => None,
        }
    }

    /// Generate the `{value: [null, Type], version}` companion of a named type.
    fn versioned_named_type(&mut self, schema: &Schema) -> Schema {
        let Some(name) = name_of(schema) else {
            return schema.clone();
        };
        let mut segments: Vec<&str> = name
            .namespace
            .as_deref()
            .map(|ns| ns.split('.').filter(|seg| *seg != RECORD_NAMESPACE).collect())
            .unwrap_or_default();
        segments.push(VERSIONED_NAMESPACE);
        let versioned_namespace = segments.join(".");

        self.versioned_types = self.versioned_types.set(
            name.fullname(),
            join_name(Some(&versioned_namespace), &name.name),
        );

        record(
            &name.name,
            &versioned_namespace,
            vec![
                Field::new("value", Schema::Union(vec![Schema::null(), schema.clone()]))
                    .with_default(Value::Null),
                crdt_types::version_field("version", false),
            ],
        )
    }

    fn list_schema(
        &mut self,
        items: &Schema,
        namespace: Option<&str>,
        ctx: &FieldContext,
    ) -> Result<Schema> {
        let mut segments: Vec<&str> = namespace.into_iter().collect();
        segments.push(LIST_NAMESPACE);
        segments.extend(ctx.record_name.as_deref());
        segments.extend(ctx.path.iter().map(String::as_str));
        let generated_namespace = segments.join(".");

        let mut value_ctx = ctx.clone();
        value_ctx.path.push("list".into());
        let item_type = self.convert(items, namespace, &value_ctx)?;
        let value_ref = definitions_to_references(&item_type);

        let element_value = match item_type {
            Schema::Union(mut branches) => {
                if !branches.iter().any(Schema::is_null) {
                    branches.insert(0, Schema::null());
                }
                Schema::Union(branches)
            }
            other => Schema::Union(vec![Schema::null(), other]),
        };

        let ns = generated_namespace.as_str();
        let element = record(
            "ListElement",
            ns,
            vec![
                crdt_types::version_field("id", false),
                crdt_types::version_field("valueVersion", false),
                crdt_types::version_field("positionVersion", false),
                Field::new("timestamp", Schema::Primitive(Primitive::Long)),
                Field::new("deleted", Schema::Primitive(Primitive::Boolean))
                    .with_default(json!(false)),
                Field::new("value", element_value),
            ],
        );

        let modifications = Schema::Union(vec![
            record(
                "ListInsert",
                ns,
                vec![
                    crdt_types::version_field("precedingElement", true),
                    Field::new("value", value_ref.clone()),
                ],
            ),
            record(
                "ListUpdate",
                ns,
                vec![
                    crdt_types::version_field("elementID", false),
                    Field::new("value", value_ref),
                ],
            ),
            record(
                "ListDelete",
                ns,
                vec![crdt_types::version_field("elementID", false)],
            ),
            record(
                "ListReorder",
                ns,
                vec![
                    crdt_types::version_field("elementID", false),
                    crdt_types::version_field("precedingElement", true),
                ],
            ),
        ]);

        let operation = record(
            "ListOperation",
            ns,
            vec![
                Field::new("writer", Schema::reference(PEER_ID)),
                crdt_types::vector_clock_field("vectorClock"),
                Field::new("timestamp", Schema::Primitive(Primitive::Long)),
                Field::new("modifications", Schema::array(modifications)),
            ],
        );

        Ok(record(
            "OrderedList",
            ns,
            vec![
                crdt_types::vector_clock_field(VECTOR_CLOCK_FIELD),
                Field::new("elements", Schema::array(element)).with_default(json!([])),
                Field::new("queue", Schema::array(operation)).with_default(json!([])),
            ],
        ))
    }
}

/// The non-null branch of a two-branch `[null, T]` union (ignoring duplicate branches).
fn optional_branch(branches: &[Schema]) -> Option<&Schema> {
    let mut distinct: Vec<&Schema> = Vec::new();
    for branch in branches {
        if !distinct.contains(&branch) {
            distinct.push(branch);
        }
    }
    match distinct.as_slice() {
        [a, b] if a.is_null() && !b.is_null() => Some(*b),
        [a, b] if b.is_null() && !a.is_null() => Some(*a),
        _ => None,
    }
}

/// Replace inline named definitions by references to them.
fn definitions_to_references(schema: &Schema) -> Schema {
    match schema {
        Schema::Record(_) | Schema::Enum(_) | Schema::Fixed(_) => match schema.fullname() {
            Some(name) => Schema::Reference(name),
            None => schema.clone(),
        },
        Schema::Array { items, .. } => Schema::array(definitions_to_references(items)),
        Schema::Map { values } => Schema::Map {
            values: Box::new(definitions_to_references(values)),
        },
        Schema::Union(branches) => {
            Schema::Union(branches.iter().map(definitions_to_references).collect())
        }
        Schema::Primitive(_) | Schema::Reference(_) => schema.clone(),
    }
}
