use std::sync::Arc;

use crate::error::Result;
use crate::index::FlowIndex;
use crate::model::Model;
use crate::registry::Registry;
use crate::traits::Codec;

/// A root model together with the flow index of everything reachable from it.
#[derive(Clone, Debug)]
pub struct Root {
    model: Arc<Model>,
    index: FlowIndex,
}

impl Root {
    pub fn new(model: Arc<Model>) -> Self {
        let index = FlowIndex::new(&model);
        Self { model, index }
    }

    /// Root for `model`, a new version of `baseline`'s root. The index is rebuilt
    /// incrementally from the baseline's.
    pub fn from_update(model: Arc<Model>, baseline: &Root) -> Self {
        if Arc::ptr_eq(&model, &baseline.model) {
            return baseline.clone();
        }
        let index = FlowIndex::build(&model, &baseline.index);
        Self { model, index }
    }

    /// Decode a root record with the host codec against the registry's flow schema.
    pub fn decode<C: Codec + ?Sized>(codec: &C, bytes: &[u8], registry: &Registry) -> Result<Self> {
        let datum = codec.decode(bytes, registry.schema())?;
        let model = Model::from_datum(&datum, registry)?;
        Ok(Self::new(Arc::new(model)))
    }

    pub fn encode<C: Codec + ?Sized>(&self, codec: &C, registry: &Registry) -> Result<Vec<u8>> {
        codec.encode(&self.model.to_datum(), registry.schema())
    }

    pub fn model(&self) -> &Arc<Model> {
        &self.model
    }

    pub fn index(&self) -> &FlowIndex {
        &self.index
    }
}
