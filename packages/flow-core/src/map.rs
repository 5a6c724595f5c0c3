use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::tree::{self, Child, Inserted, Link, Walk};

/// Immutable, key-ordered map backed by a persistent 2-3 tree.
///
/// `set` and `delete` return new maps that share all untouched subtrees with `self`. When an
/// operation changes nothing, the returned map has the very same root as the input, which can
/// be checked with [`TreeMap::ptr_eq`].
pub struct TreeMap<K, V> {
    root: Link<K, V>,
    len: usize,
}

impl<K, V> TreeMap<K, V> {
    pub fn new() -> Self {
        Self { root: None, len: 0 }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Identity comparison: true when both maps share the same root node (or are both empty).
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (&self.root, &other.root) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }

    /// Ascending iteration over `(key, value)` pairs. Each call starts a fresh traversal.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            walk: Walk::new(&self.root),
            remaining: self.len,
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> + '_ {
        self.iter().map(|(k, _)| k)
    }

    pub fn values(&self) -> impl Iterator<Item = &V> + '_ {
        self.iter().map(|(_, v)| v)
    }

    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        tree::get(&self.root, key).map(|(_, v)| v)
    }

    pub fn get_key_value<Q>(&self, key: &Q) -> Option<(&K, &V)>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        tree::get(&self.root, key)
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        tree::get(&self.root, key).is_some()
    }
}

impl<K, V> TreeMap<K, V>
where
    K: Ord + Clone,
    V: Clone + PartialEq,
{
    /// Map with `key` bound to `value`. Returns an identical map if `key` already maps to an
    /// equal value.
    #[must_use]
    pub fn set(&self, key: K, value: V) -> Self {
        let mut added = false;
        let root = match tree::insert(&self.root, key, value, &mut added) {
            Inserted::Unchanged => return self.clone(),
            Inserted::Replaced(root) => root,
            Inserted::Put(left, key, value, right) => tree::grow(left, key, value, right),
        };
        Self {
            root,
            len: if added { self.len + 1 } else { self.len },
        }
    }
}

impl<K, V> TreeMap<K, V>
where
    K: Ord + Clone,
    V: Clone,
{
    /// Map without `key`, plus the value it had. Deleting an absent key returns an identical map.
    #[must_use]
    pub fn delete<Q>(&self, key: &Q) -> (Self, Option<V>)
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let mut removed = None;
        match tree::remove(&self.root, key, &mut removed) {
            None => (self.clone(), None),
            Some(Child::Done(root)) | Some(Child::Short(root)) => (
                Self {
                    root,
                    len: self.len - 1,
                },
                removed,
            ),
        }
    }

    /// Check ordering, balance and the cached size. Intended for tests and debugging.
    pub fn validate_invariants(&self) -> Result<()> {
        if tree::balanced_height(&self.root).is_none() {
            return Err(Error::InconsistentState(
                "2-3 tree leaves at different depths".into(),
            ));
        }
        let mut count = 0;
        let mut previous: Option<&K> = None;
        for (key, _) in Walk::new(&self.root) {
            if let Some(prev) = previous {
                if prev >= key {
                    return Err(Error::InconsistentState(
                        "2-3 tree keys out of order".into(),
                    ));
                }
            }
            previous = Some(key);
            count += 1;
        }
        if count != self.len {
            return Err(Error::InconsistentState(format!(
                "2-3 tree holds {count} keys but records {}",
                self.len
            )));
        }
        Ok(())
    }
}

impl<K, V> Clone for TreeMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            root: self.root.clone(),
            len: self.len,
        }
    }
}

impl<K, V> Default for TreeMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Content equality, independent of tree shape.
impl<K: PartialEq, V: PartialEq> PartialEq for TreeMap<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || (self.len == other.len && self.iter().eq(other.iter()))
    }
}

impl<K: Eq, V: Eq> Eq for TreeMap<K, V> {}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for TreeMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K, V> FromIterator<(K, V)> for TreeMap<K, V>
where
    K: Ord + Clone,
    V: Clone + PartialEq,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        iter.into_iter().fold(Self::new(), |map, (k, v)| map.set(k, v))
    }
}

impl<'a, K, V> IntoIterator for &'a TreeMap<K, V> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

pub struct Iter<'a, K, V> {
    walk: Walk<'a, K, V>,
    remaining: usize,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.walk.next()?;
        self.remaining = self.remaining.saturating_sub(1);
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}
