//! Immutable models: one instance per version of a logical object.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::crdt_types::VECTOR_CLOCK_FIELD;
use crate::datum::Datum;
use crate::error::{Error, Result};
use crate::ids::ObjectId;
use crate::map::TreeMap;
use crate::registry::{FieldKind, RecordDescriptor, RecordRole, Registry};
use crate::vector_clock::{VectorClock, VersionStamp};

/// Value stored in a model field.
#[derive(Clone, Debug)]
pub enum FieldValue {
    Scalar(Datum),
    /// Nested model, compared by instance identity.
    Model(Arc<Model>),
    Versioned(Versioned),
}

impl PartialEq for FieldValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (FieldValue::Scalar(a), FieldValue::Scalar(b)) => a == b,
            (FieldValue::Model(a), FieldValue::Model(b)) => Arc::ptr_eq(a, b),
            (FieldValue::Versioned(a), FieldValue::Versioned(b)) => a == b,
            _ => false,
        }
    }
}

impl FieldValue {
    pub fn null() -> Self {
        FieldValue::Scalar(Datum::Null)
    }

    pub fn as_model(&self) -> Option<&Arc<Model>> {
        match self {
            FieldValue::Model(model) => Some(model),
            _ => None,
        }
    }

    pub fn as_datum(&self) -> Option<&Datum> {
        match self {
            FieldValue::Scalar(datum) => Some(datum),
            _ => None,
        }
    }

    /// The value with any envelope removed.
    pub fn unwrap_versioned(&self) -> &FieldValue {
        match self {
            FieldValue::Versioned(versioned) => versioned.value.unwrap_versioned(),
            other => other,
        }
    }

    /// Wrap a decoded value, turning model records into models and wrapper records into
    /// envelopes.
    pub fn from_datum(datum: &Datum, registry: &Registry) -> Result<Self> {
        let Datum::Record { name, fields } = datum else {
            return Ok(FieldValue::Scalar(datum.clone()));
        };
        match registry.role(name) {
            RecordRole::Model => Ok(FieldValue::Model(Arc::new(Model::from_datum(
                datum, registry,
            )?))),
            RecordRole::Envelope => {
                let value = match fields.get("value") {
                    Some(value) => FieldValue::from_datum(value, registry)?,
                    None => FieldValue::null(),
                };
                let version = match fields.get("version") {
                    None | Some(Datum::Null) => None,
                    Some(version) => Some(VersionStamp::from_datum(version)?),
                };
                Ok(FieldValue::Versioned(Versioned {
                    envelope: name.clone(),
                    value: Box::new(value),
                    version,
                }))
            }
            RecordRole::Plain => Ok(FieldValue::Scalar(datum.clone())),
        }
    }

    pub fn to_datum(&self) -> Datum {
        match self {
            FieldValue::Scalar(datum) => datum.clone(),
            FieldValue::Model(model) => model.to_datum(),
            FieldValue::Versioned(versioned) => Datum::record(
                versioned.envelope.clone(),
                [
                    ("value", versioned.value.to_datum()),
                    (
                        "version",
                        versioned
                            .version
                            .map(|stamp| stamp.to_datum())
                            .unwrap_or(Datum::Null),
                    ),
                ],
            ),
        }
    }

    fn push_models<'a>(&'a self, out: &mut Vec<&'a Arc<Model>>) {
        match self {
            FieldValue::Model(model) => out.push(model),
            FieldValue::Versioned(versioned) => versioned.value.push_models(out),
            FieldValue::Scalar(_) => {}
        }
    }
}

impl From<Datum> for FieldValue {
    fn from(datum: Datum) -> Self {
        FieldValue::Scalar(datum)
    }
}

impl From<Arc<Model>> for FieldValue {
    fn from(model: Arc<Model>) -> Self {
        FieldValue::Model(model)
    }
}

impl From<Model> for FieldValue {
    fn from(model: Model) -> Self {
        FieldValue::Model(Arc::new(model))
    }
}

/// `{value, version}` envelope of a versioned field.
#[derive(Clone, Debug, PartialEq)]
pub struct Versioned {
    /// Full name of the wrapper record this envelope encodes as.
    pub envelope: String,
    pub value: Box<FieldValue>,
    /// `None` until the field is written for the first time.
    pub version: Option<VersionStamp>,
}

impl Versioned {
    pub fn new(
        envelope: impl Into<String>,
        value: FieldValue,
        version: Option<VersionStamp>,
    ) -> Self {
        Self {
            envelope: envelope.into(),
            value: Box::new(value),
            version,
        }
    }
}

/// An immutable record value.
///
/// Field writes never change a model; they build a new instance with the same
/// [`ObjectId`]. Instance identity (`Arc::ptr_eq`) tells whether anything changed.
#[derive(Clone)]
pub struct Model {
    object_id: ObjectId,
    clock: VectorClock,
    fields: TreeMap<String, FieldValue>,
    descriptor: Arc<RecordDescriptor>,
}

impl Model {
    /// Fresh model with no fields set and an empty vector clock.
    pub fn new(descriptor: Arc<RecordDescriptor>) -> Self {
        Self {
            object_id: ObjectId::random(),
            clock: VectorClock::new(),
            fields: TreeMap::new(),
            descriptor,
        }
    }

    pub fn object_id(&self) -> ObjectId {
        self.object_id
    }

    pub fn clock(&self) -> &VectorClock {
        &self.clock
    }

    pub fn descriptor(&self) -> &Arc<RecordDescriptor> {
        &self.descriptor
    }

    pub fn fields(&self) -> &TreeMap<String, FieldValue> {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Copy of this object with `name` set to `value`.
    ///
    /// Only the descriptor's fields can be set; the vector clock has its own setter.
    pub fn with_field(&self, name: &str, value: FieldValue) -> Result<Self> {
        match self.descriptor.field(name).map(|f| &f.kind) {
            None => Err(Error::InvalidField(format!(
                "{} has no field {name}",
                self.descriptor.name
            ))),
            Some(FieldKind::VectorClock) => Err(Error::InvalidField(format!(
                "{name} holds the vector clock"
            ))),
            Some(_) => Ok(Self {
                fields: self.fields.set(name.to_string(), value),
                ..self.clone()
            }),
        }
    }

    /// Copy with `name` holding `value` as fresh, never-written data: versioned fields get
    /// their envelope without a version stamp.
    pub fn with_initial_value(&self, name: &str, value: impl Into<FieldValue>) -> Result<Self> {
        let value = value.into();
        match self.descriptor.field(name).map(|f| &f.kind) {
            Some(FieldKind::Versioned { envelope }) => self.with_field(
                name,
                FieldValue::Versioned(Versioned::new(envelope.clone(), value, None)),
            ),
            _ => self.with_field(name, value),
        }
    }

    pub fn with_clock(&self, clock: VectorClock) -> Self {
        Self {
            clock,
            ..self.clone()
        }
    }

    pub(crate) fn with_fields(&self, fields: TreeMap<String, FieldValue>) -> Self {
        Self {
            fields,
            ..self.clone()
        }
    }

    /// Directly nested models, in field order, looking through envelopes.
    pub fn child_models(&self) -> Vec<&Arc<Model>> {
        let mut out = Vec::new();
        for value in self.fields.values() {
            value.push_models(&mut out);
        }
        out
    }

    /// Build a model tree from a decoded record. Every model gets a fresh object id.
    pub fn from_datum(datum: &Datum, registry: &Registry) -> Result<Self> {
        let Datum::Record { name, fields } = datum else {
            return Err(Error::Codec(format!("expected a record, got {datum:?}")));
        };
        let descriptor = registry
            .descriptor(name)
            .ok_or_else(|| Error::Codec(format!("{name} is not a model record")))?;

        let mut clock = VectorClock::new();
        let mut values = TreeMap::new();
        for field in &descriptor.fields {
            let Some(raw) = fields.get(&field.name) else {
                continue;
            };
            match &field.kind {
                FieldKind::VectorClock => clock = VectorClock::from_datum(raw)?,
                FieldKind::Versioned { .. } | FieldKind::Unversioned => {
                    values = values.set(field.name.clone(), FieldValue::from_datum(raw, registry)?);
                }
            }
        }

        Ok(Self {
            object_id: ObjectId::random(),
            clock,
            fields: values,
            descriptor: Arc::clone(descriptor),
        })
    }

    pub fn to_datum(&self) -> Datum {
        let mut fields = BTreeMap::new();
        for field in &self.descriptor.fields {
            let value = match field.kind {
                FieldKind::VectorClock => self.clock.to_datum(),
                _ => match self.fields.get(field.name.as_str()) {
                    Some(value) => value.to_datum(),
                    None => continue,
                },
            };
            fields.insert(field.name.clone(), value);
        }
        if !fields.contains_key(VECTOR_CLOCK_FIELD) {
            fields.insert(VECTOR_CLOCK_FIELD.to_string(), self.clock.to_datum());
        }
        Datum::Record {
            name: self.descriptor.name.clone(),
            fields,
        }
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("type", &self.descriptor.name)
            .field("object_id", &self.object_id)
            .field("clock", &self.clock)
            .field("fields", &self.fields)
            .finish()
    }
}
