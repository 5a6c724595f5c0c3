//! Typed schema grammar shared by application schemas and generated flow schemas.
//!
//! Documents use the JSON shape of Avro schemas: primitive names as strings, unions as JSON
//! arrays, and objects with a `type` keyword for records, enums, fixed, arrays and maps.

use serde_json::{json, Map as JsonMap, Value};

use crate::error::{Result, SchemaError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Primitive {
    Null,
    Boolean,
    Int,
    Long,
    Float,
    Double,
    Bytes,
    String,
}

impl Primitive {
    pub const ALL: [Primitive; 8] = [
        Primitive::Null,
        Primitive::Boolean,
        Primitive::Int,
        Primitive::Long,
        Primitive::Float,
        Primitive::Double,
        Primitive::Bytes,
        Primitive::String,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "null" => Primitive::Null,
            "boolean" => Primitive::Boolean,
            "int" => Primitive::Int,
            "long" => Primitive::Long,
            "float" => Primitive::Float,
            "double" => Primitive::Double,
            "bytes" => Primitive::Bytes,
            "string" => Primitive::String,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Primitive::Null => "null",
            Primitive::Boolean => "boolean",
            Primitive::Int => "int",
            Primitive::Long => "long",
            Primitive::Float => "float",
            Primitive::Double => "double",
            Primitive::Bytes => "bytes",
            Primitive::String => "string",
        }
    }

    /// Name with the first letter upper-cased, as used in `VersionedLong`, `OptionalBytes`, ...
    pub fn type_suffix(self) -> String {
        let name = self.name();
        let mut chars = name.chars();
        match chars.next() {
            Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
            None => String::new(),
        }
    }
}

/// Name of a named type. `name` may still carry a dotted namespace prefix as written by the
/// schema author; the converter resolves it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Name {
    pub name: String,
    pub namespace: Option<String>,
}

impl Name {
    pub fn new(name: impl Into<String>, namespace: Option<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.filter(|ns| !ns.is_empty()),
        }
    }

    /// `namespace.name`, or just `name` without a namespace.
    pub fn fullname(&self) -> String {
        join_name(self.namespace.as_deref(), &self.name)
    }
}

pub(crate) fn join_name(namespace: Option<&str>, name: &str) -> String {
    match namespace {
        Some(ns) if !ns.is_empty() => format!("{ns}.{name}"),
        _ => name.to_string(),
    }
}

/// Namespace part of a full name, if any.
pub(crate) fn namespace_of(fullname: &str) -> Option<&str> {
    fullname.rsplit_once('.').map(|(ns, _)| ns)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordKind {
    Record,
    Error,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RecordSchema {
    pub kind: RecordKind,
    pub name: Name,
    pub doc: Option<String>,
    /// `Some("atomic")` opts a record out of per-field versioning.
    pub semantics: Option<String>,
    pub fields: Vec<Field>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Field {
    pub name: String,
    pub doc: Option<String>,
    pub aliases: Option<Vec<String>>,
    pub schema: Schema,
    /// `Some(Value::Null)` is an explicit `null` default, distinct from no default at all.
    pub default: Option<Value>,
}

impl Field {
    pub fn new(name: impl Into<String>, schema: Schema) -> Self {
        Self {
            name: name.into(),
            doc: None,
            aliases: None,
            schema,
            default: None,
        }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct EnumSchema {
    pub name: Name,
    pub doc: Option<String>,
    pub symbols: Vec<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FixedSchema {
    pub name: Name,
    pub size: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Schema {
    Primitive(Primitive),
    Record(RecordSchema),
    Enum(EnumSchema),
    Fixed(FixedSchema),
    Array {
        items: Box<Schema>,
        semantics: Option<String>,
    },
    Map {
        values: Box<Schema>,
    },
    Union(Vec<Schema>),
    /// Reference to a named type defined elsewhere.
    Reference(String),
}

impl Schema {
    pub fn array(items: Schema) -> Self {
        Schema::Array {
            items: Box::new(items),
            semantics: None,
        }
    }

    pub fn reference(name: impl Into<String>) -> Self {
        Schema::Reference(name.into())
    }

    pub fn null() -> Self {
        Schema::Primitive(Primitive::Null)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Schema::Primitive(Primitive::Null))
    }

    /// Full name of a named type definition.
    pub fn fullname(&self) -> Option<String> {
        match self {
            Schema::Record(r) => Some(r.name.fullname()),
            Schema::Enum(e) => Some(e.name.fullname()),
            Schema::Fixed(f) => Some(f.name.fullname()),
            _ => None,
        }
    }

    pub fn is_named_definition(&self) -> bool {
        matches!(self, Schema::Record(_) | Schema::Enum(_) | Schema::Fixed(_))
    }

    pub fn parse_str(input: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(input)
            .map_err(|e| SchemaError::InvalidSchema(format!("malformed JSON: {e}")))?;
        Self::from_json(&value)
    }

    pub fn from_json(value: &Value) -> Result<Self> {
        match value {
            Value::String(name) => Ok(match Primitive::from_name(name) {
                Some(p) => Schema::Primitive(p),
                None => Schema::Reference(name.clone()),
            }),
            Value::Array(branches) => Ok(Schema::Union(
                branches.iter().map(Schema::from_json).collect::<Result<_>>()?,
            )),
            Value::Object(obj) => Self::from_object(obj, value),
            other => Err(SchemaError::InvalidSchema(format!("unknown schema: {other}")).into()),
        }
    }

    fn from_object(obj: &JsonMap<String, Value>, raw: &Value) -> Result<Self> {
        let Some(type_name) = obj.get("type").and_then(Value::as_str) else {
            return Err(SchemaError::UnknownTypeKeyword(raw.to_string()).into());
        };
        if let Some(p) = Primitive::from_name(type_name) {
            return Ok(Schema::Primitive(p));
        }
        match type_name {
            "record" | "error" => {
                let fields = match obj.get("fields") {
                    None | Some(Value::Null) => Vec::new(),
                    Some(Value::Array(fields)) => fields
                        .iter()
                        .map(parse_field)
                        .collect::<Result<Vec<_>>>()?,
                    Some(other) => {
                        return Err(SchemaError::InvalidSchema(format!(
                            "record fields must be an array: {other}"
                        ))
                        .into())
                    }
                };
                Ok(Schema::Record(RecordSchema {
                    kind: if type_name == "error" {
                        RecordKind::Error
                    } else {
                        RecordKind::Record
                    },
                    name: parse_name(obj, raw)?,
                    doc: string_key(obj, "doc"),
                    semantics: string_key(obj, "semantics"),
                    fields,
                }))
            }
            "enum" => Ok(Schema::Enum(EnumSchema {
                name: parse_name(obj, raw)?,
                doc: string_key(obj, "doc"),
                symbols: obj
                    .get("symbols")
                    .and_then(Value::as_array)
                    .map(|symbols| {
                        symbols
                            .iter()
                            .filter_map(|s| s.as_str().map(str::to_string))
                            .collect()
                    })
                    .unwrap_or_default(),
            })),
            "fixed" => {
                let size = obj
                    .get("size")
                    .and_then(Value::as_u64)
                    .ok_or_else(|| {
                        SchemaError::InvalidSchema(format!("fixed without size: {raw}"))
                    })?;
                Ok(Schema::Fixed(FixedSchema {
                    name: parse_name(obj, raw)?,
                    size: size as usize,
                }))
            }
            "array" => {
                let items = obj
                    .get("items")
                    .ok_or_else(|| {
                        SchemaError::InvalidSchema(format!("array without items: {raw}"))
                    })?;
                Ok(Schema::Array {
                    items: Box::new(Schema::from_json(items)?),
                    semantics: string_key(obj, "semantics"),
                })
            }
            "map" => {
                let values = obj
                    .get("values")
                    .ok_or_else(|| {
                        SchemaError::InvalidSchema(format!("map without values: {raw}"))
                    })?;
                Ok(Schema::Map {
                    values: Box::new(Schema::from_json(values)?),
                })
            }
            _ => Err(SchemaError::UnknownTypeKeyword(raw.to_string()).into()),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Schema::Primitive(p) => Value::String(p.name().to_string()),
            Schema::Reference(name) => Value::String(name.clone()),
            Schema::Union(branches) => Value::Array(branches.iter().map(Schema::to_json).collect()),
            Schema::Array { items, semantics } => {
                let mut obj = JsonMap::new();
                obj.insert("type".into(), json!("array"));
                obj.insert("items".into(), items.to_json());
                if let Some(semantics) = semantics {
                    obj.insert("semantics".into(), json!(semantics));
                }
                Value::Object(obj)
            }
            Schema::Map { values } => json!({"type": "map", "values": values.to_json()}),
            Schema::Record(record) => {
                let mut obj = JsonMap::new();
                let kind = match record.kind {
                    RecordKind::Record => "record",
                    RecordKind::Error => "error",
                };
                obj.insert("type".into(), json!(kind));
                obj.insert("name".into(), json!(record.name.name));
                obj.insert("namespace".into(), json!(record.name.namespace));
                if let Some(doc) = &record.doc {
                    obj.insert("doc".into(), json!(doc));
                }
                if let Some(semantics) = &record.semantics {
                    obj.insert("semantics".into(), json!(semantics));
                }
                obj.insert(
                    "fields".into(),
                    Value::Array(record.fields.iter().map(Field::to_json).collect()),
                );
                Value::Object(obj)
            }
            Schema::Enum(e) => {
                let mut obj = JsonMap::new();
                obj.insert("type".into(), json!("enum"));
                obj.insert("name".into(), json!(e.name.name));
                obj.insert("namespace".into(), json!(e.name.namespace));
                if let Some(doc) = &e.doc {
                    obj.insert("doc".into(), json!(doc));
                }
                obj.insert("symbols".into(), json!(e.symbols));
                Value::Object(obj)
            }
            Schema::Fixed(f) => json!({
                "type": "fixed",
                "name": f.name.name,
                "namespace": f.name.namespace,
                "size": f.size,
            }),
        }
    }
}

impl Field {
    pub fn to_json(&self) -> Value {
        let mut obj = JsonMap::new();
        obj.insert("name".into(), json!(self.name));
        obj.insert("type".into(), self.schema.to_json());
        if let Some(default) = &self.default {
            obj.insert("default".into(), default.clone());
        }
        if let Some(doc) = &self.doc {
            obj.insert("doc".into(), json!(doc));
        }
        if let Some(aliases) = &self.aliases {
            obj.insert("aliases".into(), json!(aliases));
        }
        Value::Object(obj)
    }
}

fn string_key(obj: &JsonMap<String, Value>, key: &str) -> Option<String> {
    obj.get(key).and_then(Value::as_str).map(str::to_string)
}

fn parse_name(obj: &JsonMap<String, Value>, raw: &Value) -> Result<Name> {
    match obj.get("name").and_then(Value::as_str) {
        Some(name) if !name.is_empty() => Ok(Name::new(name, string_key(obj, "namespace"))),
        _ => Err(SchemaError::MissingName(raw.to_string()).into()),
    }
}

fn parse_field(raw: &Value) -> Result<Field> {
    let Some(obj) = raw.as_object() else {
        return Err(SchemaError::InvalidSchema(format!("field must be an object: {raw}")).into());
    };
    let name = match obj.get("name").and_then(Value::as_str) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => return Err(SchemaError::MissingFieldName(raw.to_string()).into()),
    };
    let schema = obj
        .get("type")
        .ok_or_else(|| SchemaError::InvalidSchema(format!("field without type: {raw}")))?;
    Ok(Field {
        name,
        doc: string_key(obj, "doc"),
        aliases: obj.get("aliases").and_then(Value::as_array).map(|aliases| {
            aliases
                .iter()
                .filter_map(|a| a.as_str().map(str::to_string))
                .collect()
        }),
        schema: Schema::from_json(schema)?,
        default: obj.get("default").cloned(),
    })
}
