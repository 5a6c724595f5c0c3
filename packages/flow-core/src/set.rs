use std::borrow::Borrow;
use std::fmt;

use crate::error::Result;
use crate::map::TreeMap;

/// Immutable ordered set; a [`TreeMap`] with unit values.
pub struct TreeSet<K> {
    map: TreeMap<K, ()>,
}

impl<K> TreeSet<K> {
    pub fn new() -> Self {
        Self {
            map: TreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.map.ptr_eq(&other.map)
    }

    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.map.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &K> + '_ {
        self.map.keys()
    }
}

impl<K: Ord + Clone> TreeSet<K> {
    /// Set with `key` added; identical to `self` if it was already present.
    #[must_use]
    pub fn insert(&self, key: K) -> Self {
        Self {
            map: self.map.set(key, ()),
        }
    }

    /// Set without `key`; identical to `self` if it was absent.
    #[must_use]
    pub fn remove<Q>(&self, key: &Q) -> Self
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        Self {
            map: self.map.delete(key).0,
        }
    }

    pub fn validate_invariants(&self) -> Result<()> {
        self.map.validate_invariants()
    }
}

impl<K> Clone for TreeSet<K> {
    fn clone(&self) -> Self {
        Self {
            map: self.map.clone(),
        }
    }
}

impl<K> Default for TreeSet<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: PartialEq> PartialEq for TreeSet<K> {
    fn eq(&self, other: &Self) -> bool {
        self.map == other.map
    }
}

impl<K: Eq> Eq for TreeSet<K> {}

impl<K: fmt::Debug> fmt::Debug for TreeSet<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl<K: Ord + Clone> FromIterator<K> for TreeSet<K> {
    fn from_iter<I: IntoIterator<Item = K>>(iter: I) -> Self {
        iter.into_iter().fold(Self::new(), |set, k| set.insert(k))
    }
}
