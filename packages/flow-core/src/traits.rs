use parking_lot::Mutex;

use crate::datum::Datum;
use crate::error::{Error, Result};
use crate::schema::Schema;

/// Schema-driven binary codec supplied by the host (Avro or similar).
///
/// The core only defines the flow schema's shape; turning datums into bytes and back is
/// the codec's job.
pub trait Codec {
    fn encode(&self, datum: &Datum, schema: &Schema) -> Result<Vec<u8>>;
    fn decode(&self, bytes: &[u8], schema: &Schema) -> Result<Datum>;
}

/// In-memory codec for tests and prototyping: "encoding" stores the datum and hands out its
/// slot number as the payload.
#[derive(Default)]
pub struct MemoryCodec {
    stored: Mutex<Vec<Datum>>,
}

impl MemoryCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.stored.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.stored.lock().is_empty()
    }
}

impl Codec for MemoryCodec {
    fn encode(&self, datum: &Datum, _schema: &Schema) -> Result<Vec<u8>> {
        let mut stored = self.stored.lock();
        stored.push(datum.clone());
        Ok(((stored.len() - 1) as u64).to_be_bytes().to_vec())
    }

    fn decode(&self, bytes: &[u8], _schema: &Schema) -> Result<Datum> {
        let slot: [u8; 8] = bytes
            .try_into()
            .map_err(|_| {
                Error::Codec(format!("expected an 8 byte slot, got {} bytes", bytes.len()))
            })?;
        let slot = u64::from_be_bytes(slot) as usize;
        self.stored
            .lock()
            .get(slot)
            .cloned()
            .ok_or_else(|| Error::Codec(format!("no datum stored in slot {slot}")))
    }
}

/// Serializes datums as JSON; the schema only checks the root record name.
#[cfg(feature = "serde")]
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonCodec;

#[cfg(feature = "serde")]
impl JsonCodec {
    fn check_root(datum: &Datum, schema: &Schema) -> Result<()> {
        match (datum.record_name(), schema.fullname()) {
            (Some(found), Some(expected)) if found != expected => Err(Error::Codec(format!(
                "datum is a {found}, schema expects {expected}"
            ))),
            _ => Ok(()),
        }
    }
}

#[cfg(feature = "serde")]
impl Codec for JsonCodec {
    fn encode(&self, datum: &Datum, schema: &Schema) -> Result<Vec<u8>> {
        Self::check_root(datum, schema)?;
        serde_json::to_vec(datum).map_err(|e| Error::Codec(e.to_string()))
    }

    fn decode(&self, bytes: &[u8], schema: &Schema) -> Result<Datum> {
        let datum: Datum = serde_json::from_slice(bytes).map_err(|e| Error::Codec(e.to_string()))?;
        Self::check_root(&datum, schema)?;
        Ok(datum)
    }
}
