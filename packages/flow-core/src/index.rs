use std::sync::Arc;

use crate::error::{Error, Result};
use crate::ids::ObjectId;
use crate::map::TreeMap;
use crate::model::Model;

/// Where an object sits in a root's tree.
#[derive(Clone, Debug)]
pub struct IndexItem {
    pub model: Arc<Model>,
    pub parent: Option<Arc<Model>>,
}

impl IndexItem {
    pub fn new(model: Arc<Model>, parent: Option<Arc<Model>>) -> Self {
        Self { model, parent }
    }
}

/// Instance identity of both the model and its parent.
impl PartialEq for IndexItem {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.model, &other.model)
            && match (&self.parent, &other.parent) {
                (Some(a), Some(b)) => Arc::ptr_eq(a, b),
                (None, None) => true,
                _ => false,
            }
    }
}

/// Persistent map from every object id reachable from a root to its [`IndexItem`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FlowIndex {
    items: TreeMap<ObjectId, IndexItem>,
}

impl FlowIndex {
    /// Index `root` from scratch.
    pub fn new(root: &Arc<Model>) -> Self {
        Self::build(root, &FlowIndex::default())
    }

    /// Index `root`, reusing every entry of `baseline` whose model and parent are unchanged.
    ///
    /// Subtrees whose root entry is identical in `baseline` are not visited at all, so the
    /// work done is proportional to the number of changed objects.
    pub fn build(root: &Arc<Model>, baseline: &FlowIndex) -> Self {
        let items = index_model(baseline.items.clone(), root, None);
        tracing::trace!(
            objects = items.len(),
            reused = items.ptr_eq(&baseline.items),
            "built flow index"
        );
        Self { items }
    }

    pub fn get(&self, id: &ObjectId) -> Option<&IndexItem> {
        self.items.get(id)
    }

    pub fn contains(&self, id: &ObjectId) -> bool {
        self.items.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.items.ptr_eq(&other.items)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ObjectId, &IndexItem)> + '_ {
        self.items.iter()
    }

    /// Check that exactly the objects reachable from `root` are indexed, each with its
    /// current model instance. An object shared by several parents is indexed under one
    /// of them.
    pub fn validate_invariants(&self, root: &Arc<Model>) -> Result<()> {
        self.items.validate_invariants()?;
        // id -> whether some path reaches it through the indexed parent
        let mut reachable: TreeMap<ObjectId, bool> = TreeMap::new();
        let mut stack: Vec<(&Arc<Model>, Option<&Arc<Model>>)> = vec![(root, None)];
        while let Some((model, parent)) = stack.pop() {
            let id = model.object_id();
            let item = self.items.get(&id).ok_or_else(|| {
                Error::InconsistentState(format!("object {id} is reachable but not indexed"))
            })?;
            if !Arc::ptr_eq(&item.model, model) {
                return Err(Error::InconsistentState(format!("stale index entry for {id}")));
            }
            let via_parent = match (&item.parent, parent) {
                (Some(indexed), Some(parent)) => Arc::ptr_eq(indexed, parent),
                (None, None) => true,
                _ => false,
            };
            match reachable.get(&id).copied() {
                Some(seen) => {
                    if via_parent && !seen {
                        reachable = reachable.set(id, true);
                    }
                }
                None => {
                    reachable = reachable.set(id, via_parent);
                    let children = model.child_models().into_iter();
                    stack.extend(children.map(|child| (child, Some(model))));
                }
            }
        }
        if let Some((id, _)) = reachable.iter().find(|(_, via_parent)| !**via_parent) {
            return Err(Error::InconsistentState(format!(
                "index entry for {id} names a parent that does not hold it"
            )));
        }
        if reachable.len() != self.items.len() {
            return Err(Error::InconsistentState(format!(
                "index holds {} objects, {} reachable",
                self.items.len(),
                reachable.len()
            )));
        }
        Ok(())
    }
}

fn index_model(
    items: TreeMap<ObjectId, IndexItem>,
    model: &Arc<Model>,
    parent: Option<&Arc<Model>>,
) -> TreeMap<ObjectId, IndexItem> {
    let id = model.object_id();
    let item = IndexItem::new(Arc::clone(model), parent.cloned());
    let previous = items.get(&id).cloned();
    if previous.as_ref() == Some(&item) {
        return items;
    }

    let mut items = items;
    if let Some(previous) = previous {
        let kept: Vec<ObjectId> = model.child_models().iter().map(|c| c.object_id()).collect();
        for child in previous.model.child_models() {
            let child_id = child.object_id();
            let still_ours = items
                .get(&child_id)
                .and_then(|entry| entry.parent.as_ref())
                .is_some_and(|p| p.object_id() == id);
            if !kept.contains(&child_id) && still_ours {
                items = prune(items, &child_id);
            }
        }
    }

    tracing::trace!(object = %id, "indexed object");
    items = items.set(id, item);
    for child in model.child_models() {
        items = index_model(items, child, Some(model));
    }
    items
}

/// Remove `id` and everything indexed below it.
fn prune(items: TreeMap<ObjectId, IndexItem>, id: &ObjectId) -> TreeMap<ObjectId, IndexItem> {
    let (mut items, removed) = items.delete(id);
    let Some(removed) = removed else {
        return items;
    };
    tracing::trace!(object = %id, "pruned detached object");
    for child in removed.model.child_models() {
        let child_id = child.object_id();
        let below = items
            .get(&child_id)
            .and_then(|entry| entry.parent.as_ref())
            .is_some_and(|p| p.object_id() == *id);
        if below {
            items = prune(items, &child_id);
        }
    }
    items
}
