//! Transaction engine.
//!
//! A transaction is bound to one or more [`Root`]s. Field writes record new model instances
//! in an overlay and mark every strict ancestor of the written object dirty. At commit,
//! [`Transaction::updated_root`] rebuilds each dirty ancestor exactly once, bottom-up, and
//! leaves untouched subtrees as the very same instances.
//!
//! At most one transaction is entered per thread at a time. The current one is kept in a
//! thread-local slot that [`Transaction::enter`] fills and [`Transaction::exit`] clears; the
//! [`transaction`] drivers guarantee the exit on every path.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;

use crate::error::{Error, Result, ScopeError, TransactionStateError};
use crate::ids::{ObjectId, PeerId};
use crate::index::IndexItem;
use crate::map::TreeMap;
use crate::model::{FieldValue, Model, Versioned};
use crate::peer;
use crate::registry::FieldKind;
use crate::root::Root;
use crate::set::TreeSet;
use crate::vector_clock::VersionStamp;

thread_local! {
    static CURRENT: RefCell<Option<Transaction>> = const { RefCell::new(None) };
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    NotEntered,
    Entered,
    Exited,
}

/// Overlay entry. `settled` entries were rebuilt by propagation (or adopted unchanged) and
/// need no further work until written again.
#[derive(Clone, Debug, PartialEq)]
struct Pending {
    item: IndexItem,
    settled: bool,
}

struct State {
    roots: Vec<Root>,
    peer: PeerId,
    phase: Cell<Phase>,
    overlay: RefCell<TreeMap<ObjectId, Pending>>,
    dirty: RefCell<TreeSet<ObjectId>>,
}

/// Handle to a transaction; clones refer to the same transaction.
#[derive(Clone)]
pub struct Transaction {
    state: Rc<State>,
}

impl Transaction {
    /// Transaction over `roots`, writing as the process peer.
    pub fn new(roots: Vec<Root>) -> Self {
        Self::with_peer(roots, peer::peer_id())
    }

    pub fn with_peer(roots: Vec<Root>, peer: PeerId) -> Self {
        Self {
            state: Rc::new(State {
                roots,
                peer,
                phase: Cell::new(Phase::NotEntered),
                overlay: RefCell::new(TreeMap::new()),
                dirty: RefCell::new(TreeSet::new()),
            }),
        }
    }

    /// The transaction entered on this thread, if any.
    pub fn current() -> Option<Transaction> {
        CURRENT.with(|slot| slot.borrow().clone())
    }

    pub fn phase(&self) -> Phase {
        self.state.phase.get()
    }

    pub fn peer(&self) -> PeerId {
        self.state.peer
    }

    pub fn roots(&self) -> &[Root] {
        &self.state.roots
    }

    pub fn is_dirty(&self, id: &ObjectId) -> bool {
        self.state.dirty.borrow().contains(id)
    }

    fn is_current(&self) -> bool {
        CURRENT.with(|slot| {
            slot.borrow()
                .as_ref()
                .is_some_and(|current| Rc::ptr_eq(&current.state, &self.state))
        })
    }

    pub fn enter(&self) -> Result<()> {
        match self.phase() {
            Phase::Entered => return Err(TransactionStateError::AlreadyEntered.into()),
            Phase::Exited => return Err(TransactionStateError::AlreadyExited.into()),
            Phase::NotEntered => {}
        }
        CURRENT.with(|slot| {
            let mut slot = slot.borrow_mut();
            if slot.is_some() {
                return Err(Error::from(TransactionStateError::AlreadyInTransaction));
            }
            *slot = Some(self.clone());
            Ok(())
        })?;
        self.state.phase.set(Phase::Entered);
        tracing::debug!(roots = self.state.roots.len(), "entered transaction");
        Ok(())
    }

    pub fn exit(&self) -> Result<()> {
        match self.phase() {
            Phase::NotEntered => return Err(TransactionStateError::NotEntered.into()),
            Phase::Exited => return Err(TransactionStateError::AlreadyExited.into()),
            Phase::Entered => {}
        }
        if !self.is_current() {
            return Err(TransactionStateError::NotCurrent.into());
        }
        CURRENT.with(|slot| *slot.borrow_mut() = None);
        self.state.phase.set(Phase::Exited);
        tracing::debug!(
            dirty = self.state.dirty.borrow().len(),
            overlay = self.state.overlay.borrow().len(),
            "exited transaction"
        );
        Ok(())
    }

    fn ensure_entered(&self) -> Result<()> {
        match self.phase() {
            Phase::Entered => Ok(()),
            Phase::NotEntered => Err(TransactionStateError::NotEntered.into()),
            Phase::Exited => Err(TransactionStateError::AlreadyExited.into()),
        }
    }

    fn lookup(&self, id: &ObjectId) -> Option<IndexItem> {
        if let Some(pending) = self.state.overlay.borrow().get(id) {
            return Some(pending.item.clone());
        }
        self.state
            .roots
            .iter()
            .find_map(|root| root.index().get(id).cloned())
    }

    /// Current instance of `model`'s object: the overlay's, else the bound roots', else
    /// `model` itself. Handles from before an earlier commit resolve to the committed instance.
    fn latest(&self, model: &Arc<Model>) -> Arc<Model> {
        self.lookup(&model.object_id())
            .map(|item| item.model)
            .unwrap_or_else(|| Arc::clone(model))
    }

    /// Latest version of `model`'s object in this transaction's roots, or `model` itself.
    pub fn updated(&self, model: &Arc<Model>) -> Result<Arc<Model>> {
        self.ensure_entered()?;
        Ok(self.latest(model))
    }

    /// Record `model` as the latest version of its object and mark its ancestors dirty.
    ///
    /// Fails when the object is not reachable from the transaction's roots. The roots' own
    /// indexes are left untouched.
    pub fn set_latest_model(&self, model: Arc<Model>) -> Result<()> {
        self.ensure_entered()?;
        self.register(model, false)
    }

    fn register(&self, model: Arc<Model>, settled: bool) -> Result<()> {
        let id = model.object_id();
        let item = self
            .lookup(&id)
            .ok_or_else(|| ScopeError::NotInTree(id.to_string()))?;

        let mut ancestors = Vec::new();
        let mut terminal = id;
        let mut parent = item.parent.clone();
        while let Some(next) = parent {
            let parent_id = next.object_id();
            if parent_id == id || ancestors.contains(&parent_id) {
                return Err(Error::InconsistentState(format!(
                    "parent chain of {id} loops through {parent_id}"
                )));
            }
            ancestors.push(parent_id);
            terminal = parent_id;
            parent = self
                .lookup(&parent_id)
                .ok_or_else(|| ScopeError::NotInTree(parent_id.to_string()))?
                .parent;
        }
        if !self
            .state
            .roots
            .iter()
            .any(|root| root.model().object_id() == terminal)
        {
            return Err(ScopeError::OutsideScope(id.to_string()).into());
        }

        if !settled {
            let mut dirty = self.state.dirty.borrow_mut();
            for ancestor in ancestors {
                tracing::trace!(object = %ancestor, "marked ancestor dirty");
                *dirty = dirty.insert(ancestor);
            }
        }
        let pending = Pending {
            item: IndexItem::new(model, item.parent),
            settled,
        };
        let mut overlay = self.state.overlay.borrow_mut();
        *overlay = overlay.set(id, pending);
        Ok(())
    }

    /// Propagate pending writes below `model` into a new instance of it.
    ///
    /// Objects that are neither dirty nor written come back as [`Transaction::updated`]
    /// would return them. Rebuilt objects are settled, so repeated calls return the same
    /// instance until a later write re-opens the chain. Callable after exit.
    pub fn updated_root(&self, model: &Arc<Model>) -> Result<Arc<Model>> {
        let id = model.object_id();
        let unsettled = self
            .state
            .overlay
            .borrow()
            .get(&id)
            .is_some_and(|pending| !pending.settled);
        if !unsettled && !self.is_dirty(&id) {
            return Ok(self.latest(model));
        }

        let current = self.latest(model);
        let mut fields = current.fields().clone();
        for (name, value) in current.fields().iter() {
            let rebuilt = self.rebuild_value(value)?;
            fields = fields.set(name.clone(), rebuilt);
        }
        let rebuilt = if fields.ptr_eq(current.fields()) {
            current
        } else {
            Arc::new(current.with_fields(fields))
        };

        self.register(Arc::clone(&rebuilt), true)?;
        {
            let mut dirty = self.state.dirty.borrow_mut();
            *dirty = dirty.remove(&id);
        }
        tracing::trace!(object = %id, "rebuilt object");
        Ok(rebuilt)
    }

    fn rebuild_value(&self, value: &FieldValue) -> Result<FieldValue> {
        match value {
            FieldValue::Model(child) => {
                let rebuilt = self.updated_root(child)?;
                Ok(if Arc::ptr_eq(&rebuilt, child) {
                    value.clone()
                } else {
                    FieldValue::Model(rebuilt)
                })
            }
            FieldValue::Versioned(versioned) => {
                let inner = self.rebuild_value(&versioned.value)?;
                Ok(if inner == *versioned.value {
                    value.clone()
                } else {
                    FieldValue::Versioned(Versioned {
                        envelope: versioned.envelope.clone(),
                        value: Box::new(inner),
                        version: versioned.version,
                    })
                })
            }
            FieldValue::Scalar(_) => Ok(value.clone()),
        }
    }

    /// Write a versioned field of `owner`'s object.
    ///
    /// Bumps this transaction's peer in the object's vector clock by one, stamps the value
    /// with `(peer, clock sum)` and records the new instance. Models nested in `value` that
    /// the transaction does not know yet are adopted under the new instance.
    pub fn write_field(
        &self,
        owner: &Arc<Model>,
        name: &str,
        value: FieldValue,
    ) -> Result<Arc<Model>> {
        self.ensure_entered()?;
        let current = self.latest(owner);
        let envelope = match current.descriptor().field(name).map(|f| &f.kind) {
            Some(FieldKind::Versioned { envelope }) => envelope.clone(),
            Some(_) => {
                return Err(Error::InvalidField(format!(
                    "{name} of {} is not a versioned field",
                    current.descriptor().name
                )))
            }
            None => {
                return Err(Error::InvalidField(format!(
                    "{} has no field {name}",
                    current.descriptor().name
                )))
            }
        };
        let value = match value {
            FieldValue::Versioned(versioned) => *versioned.value,
            other => other,
        };

        let peer = self.state.peer;
        let mut clock = current.clock().clone();
        let count = clock.increment(&peer);
        let stamp = VersionStamp::local(&peer, &clock);
        let versioned = Versioned::new(envelope, value, Some(stamp));
        let updated = Arc::new(
            current
                .with_field(name, FieldValue::Versioned(versioned))?
                .with_clock(clock),
        );

        self.set_latest_model(Arc::clone(&updated))?;
        self.adopt_children(&updated);
        tracing::trace!(object = %updated.object_id(), field = name, count, "wrote field");
        Ok(updated)
    }

    fn adopt_children(&self, owner: &Arc<Model>) {
        for child in owner.child_models() {
            if self.lookup(&child.object_id()).is_some() {
                continue;
            }
            {
                let mut overlay = self.state.overlay.borrow_mut();
                *overlay = overlay.set(
                    child.object_id(),
                    Pending {
                        item: IndexItem::new(Arc::clone(child), Some(Arc::clone(owner))),
                        settled: true,
                    },
                );
            }
            tracing::trace!(object = %child.object_id(), "adopted nested model");
            self.adopt_children(child);
        }
    }

    /// Updated roots, in declaration order.
    pub fn commit(&self) -> Result<Vec<Root>> {
        let roots = self
            .state
            .roots
            .iter()
            .map(|root| Ok(Root::from_update(self.updated_root(root.model())?, root)))
            .collect::<Result<Vec<_>>>()?;
        tracing::debug!(
            roots = roots.len(),
            overlay = self.state.overlay.borrow().len(),
            "committed transaction"
        );
        Ok(roots)
    }

    /// Enter, run `block`, exit (also when `block` fails or panics), then commit.
    pub fn run<F>(&self, block: F) -> Result<Vec<Root>>
    where
        F: FnOnce(&Transaction) -> Result<()>,
    {
        self.enter()?;
        let outcome = {
            let _guard = ExitGuard(self);
            block(self)
        };
        outcome?;
        self.commit()
    }
}

struct ExitGuard<'a>(&'a Transaction);

impl Drop for ExitGuard<'_> {
    fn drop(&mut self) {
        if self.0.phase() == Phase::Entered {
            if let Err(err) = self.0.exit() {
                tracing::warn!(%err, "failed to exit transaction");
            }
        }
    }
}

/// Run `block` in a transaction over `root` and return the updated root.
pub fn transaction<F>(root: &Root, block: F) -> Result<Root>
where
    F: FnOnce(&Transaction) -> Result<()>,
{
    transaction_many(std::slice::from_ref(root), block)?
        .pop()
        .ok_or_else(|| Error::InconsistentState("commit returned no root".into()))
}

/// Run `block` in a transaction over `roots` and return the updated roots in order.
pub fn transaction_many<F>(roots: &[Root], block: F) -> Result<Vec<Root>>
where
    F: FnOnce(&Transaction) -> Result<()>,
{
    Transaction::new(roots.to_vec()).run(block)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enter_exit_state_machine() {
        let txn = Transaction::new(Vec::new());
        assert!(matches!(
            txn.exit(),
            Err(Error::TransactionState(TransactionStateError::NotEntered))
        ));
        txn.enter().unwrap();
        assert!(matches!(
            txn.enter(),
            Err(Error::TransactionState(TransactionStateError::AlreadyEntered))
        ));
        txn.exit().unwrap();
        assert!(matches!(
            txn.exit(),
            Err(Error::TransactionState(TransactionStateError::AlreadyExited))
        ));
        assert!(Transaction::current().is_none());
    }

    #[test]
    fn guard_releases_slot_on_error() {
        let txn = Transaction::new(Vec::new());
        let result = txn.run(|_| Err(Error::InvalidField("boom".into())));
        assert!(matches!(result, Err(Error::InvalidField(_))));
        assert_eq!(txn.phase(), Phase::Exited);
        assert!(Transaction::current().is_none());
    }
}
