//! Persistent 2-3 search tree.
//!
//! Every modification returns a new root; unaffected subtrees are shared by reference with the
//! input. An operation that changes nothing reports [`None`] / `Unchanged` so callers can hand
//! back the very same root, which higher layers use as a cheap "did anything change" test.
//!
//! Insertion produces a transient oversize marker ([`Inserted::Put`]) that parents absorb on the
//! way up; deletion produces a transient undersize marker ([`Child::Short`]) that is resolved by
//! borrowing from a 3-node sibling or merging with a 2-node sibling. All root-to-leaf paths have
//! the same length at all times.

use std::borrow::Borrow;
use std::cmp::Ordering;
use std::sync::Arc;

pub(crate) type Link<K, V> = Option<Arc<Node<K, V>>>;

#[derive(Debug)]
pub(crate) enum Node<K, V> {
    Two {
        left: Link<K, V>,
        key: K,
        value: V,
        right: Link<K, V>,
    },
    Three {
        left: Link<K, V>,
        key1: K,
        value1: V,
        middle: Link<K, V>,
        key2: K,
        value2: V,
        right: Link<K, V>,
    },
}

/// Result of inserting below a node.
pub(crate) enum Inserted<K, V> {
    /// Key already held an equal value.
    Unchanged,
    /// Same height as before.
    Replaced(Link<K, V>),
    /// One level too tall; the parent must absorb the middle key.
    Put(Link<K, V>, K, V, Link<K, V>),
}

/// A rebuilt child after deletion.
pub(crate) enum Child<K, V> {
    Done(Link<K, V>),
    /// One level too short.
    Short(Link<K, V>),
}

fn two<K, V>(left: Link<K, V>, key: K, value: V, right: Link<K, V>) -> Link<K, V> {
    Some(Arc::new(Node::Two {
        left,
        key,
        value,
        right,
    }))
}

#[allow(clippy::too_many_arguments)]
fn three<K, V>(
    left: Link<K, V>,
    key1: K,
    value1: V,
    middle: Link<K, V>,
    key2: K,
    value2: V,
    right: Link<K, V>,
) -> Link<K, V> {
    Some(Arc::new(Node::Three {
        left,
        key1,
        value1,
        middle,
        key2,
        value2,
        right,
    }))
}

/// Collapse a root-level oversize marker into a real 2-node; the tree grows one level.
pub(crate) fn grow<K, V>(left: Link<K, V>, key: K, value: V, right: Link<K, V>) -> Link<K, V> {
    two(left, key, value, right)
}

fn sibling<K, V>(link: &Link<K, V>) -> &Node<K, V> {
    match link {
        Some(node) => node,
        None => unreachable!("2-3 tree leaves must all sit at the same depth"),
    }
}

pub(crate) fn get<'a, K, V, Q>(mut link: &'a Link<K, V>, key: &Q) -> Option<(&'a K, &'a V)>
where
    K: Borrow<Q>,
    Q: Ord + ?Sized,
{
    while let Some(node) = link {
        match &**node {
            Node::Two {
                left,
                key: k,
                value,
                right,
            } => match key.cmp(k.borrow()) {
                Ordering::Less => link = left,
                Ordering::Equal => return Some((k, value)),
                Ordering::Greater => link = right,
            },
            Node::Three {
                left,
                key1,
                value1,
                middle,
                key2,
                value2,
                right,
            } => match key.cmp(key1.borrow()) {
                Ordering::Less => link = left,
                Ordering::Equal => return Some((key1, value1)),
                Ordering::Greater => match key.cmp(key2.borrow()) {
                    Ordering::Less => link = middle,
                    Ordering::Equal => return Some((key2, value2)),
                    Ordering::Greater => link = right,
                },
            },
        }
    }
    None
}

/// Insert or update `key`. `added` is set when the key was not present before.
pub(crate) fn insert<K, V>(link: &Link<K, V>, key: K, value: V, added: &mut bool) -> Inserted<K, V>
where
    K: Ord + Clone,
    V: Clone + PartialEq,
{
    let Some(node) = link else {
        *added = true;
        return Inserted::Put(None, key, value, None);
    };

    match &**node {
        Node::Two {
            left,
            key: k,
            value: v,
            right,
        } => match key.cmp(k) {
            Ordering::Less => match insert(left, key, value, added) {
                Inserted::Unchanged => Inserted::Unchanged,
                Inserted::Replaced(l) => {
                    Inserted::Replaced(two(l, k.clone(), v.clone(), right.clone()))
                }
                Inserted::Put(a, x, xv, b) => Inserted::Replaced(three(
                    a,
                    x,
                    xv,
                    b,
                    k.clone(),
                    v.clone(),
                    right.clone(),
                )),
            },
            Ordering::Equal => {
                if *v == value {
                    Inserted::Unchanged
                } else {
                    Inserted::Replaced(two(left.clone(), k.clone(), value, right.clone()))
                }
            }
            Ordering::Greater => match insert(right, key, value, added) {
                Inserted::Unchanged => Inserted::Unchanged,
                Inserted::Replaced(r) => {
                    Inserted::Replaced(two(left.clone(), k.clone(), v.clone(), r))
                }
                Inserted::Put(a, x, xv, b) => Inserted::Replaced(three(
                    left.clone(),
                    k.clone(),
                    v.clone(),
                    a,
                    x,
                    xv,
                    b,
                )),
            },
        },
        Node::Three {
            left,
            key1,
            value1,
            middle,
            key2,
            value2,
            right,
        } => match key.cmp(key1) {
            Ordering::Less => match insert(left, key, value, added) {
                Inserted::Unchanged => Inserted::Unchanged,
                Inserted::Replaced(l) => Inserted::Replaced(three(
                    l,
                    key1.clone(),
                    value1.clone(),
                    middle.clone(),
                    key2.clone(),
                    value2.clone(),
                    right.clone(),
                )),
                Inserted::Put(a, x, xv, b) => Inserted::Put(
                    two(a, x, xv, b),
                    key1.clone(),
                    value1.clone(),
                    two(middle.clone(), key2.clone(), value2.clone(), right.clone()),
                ),
            },
            Ordering::Equal => {
                if *value1 == value {
                    Inserted::Unchanged
                } else {
                    Inserted::Replaced(three(
                        left.clone(),
                        key1.clone(),
                        value,
                        middle.clone(),
                        key2.clone(),
                        value2.clone(),
                        right.clone(),
                    ))
                }
            }
            Ordering::Greater => match key.cmp(key2) {
                Ordering::Less => match insert(middle, key, value, added) {
                    Inserted::Unchanged => Inserted::Unchanged,
                    Inserted::Replaced(m) => Inserted::Replaced(three(
                        left.clone(),
                        key1.clone(),
                        value1.clone(),
                        m,
                        key2.clone(),
                        value2.clone(),
                        right.clone(),
                    )),
                    Inserted::Put(a, x, xv, b) => Inserted::Put(
                        two(left.clone(), key1.clone(), value1.clone(), a),
                        x,
                        xv,
                        two(b, key2.clone(), value2.clone(), right.clone()),
                    ),
                },
                Ordering::Equal => {
                    if *value2 == value {
                        Inserted::Unchanged
                    } else {
                        Inserted::Replaced(three(
                            left.clone(),
                            key1.clone(),
                            value1.clone(),
                            middle.clone(),
                            key2.clone(),
                            value,
                            right.clone(),
                        ))
                    }
                }
                Ordering::Greater => match insert(right, key, value, added) {
                    Inserted::Unchanged => Inserted::Unchanged,
                    Inserted::Replaced(r) => Inserted::Replaced(three(
                        left.clone(),
                        key1.clone(),
                        value1.clone(),
                        middle.clone(),
                        key2.clone(),
                        value2.clone(),
                        r,
                    )),
                    Inserted::Put(a, x, xv, b) => Inserted::Put(
                        two(left.clone(), key1.clone(), value1.clone(), middle.clone()),
                        key2.clone(),
                        value2.clone(),
                        two(a, x, xv, b),
                    ),
                },
            },
        },
    }
}

/// Remove `key`. Returns `None` when the key is absent; the removed value goes to `removed`.
pub(crate) fn remove<K, V, Q>(
    link: &Link<K, V>,
    key: &Q,
    removed: &mut Option<V>,
) -> Option<Child<K, V>>
where
    K: Borrow<Q> + Clone,
    V: Clone,
    Q: Ord + ?Sized,
{
    let node = link.as_ref()?;
    let child = match &**node {
        Node::Two {
            left,
            key: k,
            value: v,
            right,
        } => match key.cmp(k.borrow()) {
            Ordering::Less => fix2_left(remove(left, key, removed)?, k, v, right),
            Ordering::Greater => fix2_right(left, k, v, remove(right, key, removed)?),
            Ordering::Equal => {
                *removed = Some(v.clone());
                match right {
                    None => Child::Short(None),
                    Some(right) => {
                        let (mk, mv, sub) = remove_min(right);
                        fix2_right(left, &mk, &mv, sub)
                    }
                }
            }
        },
        Node::Three {
            left,
            key1,
            value1,
            middle,
            key2,
            value2,
            right,
        } => match key.cmp(key1.borrow()) {
            Ordering::Less => fix3_left(
                remove(left, key, removed)?,
                key1,
                value1,
                middle,
                key2,
                value2,
                right,
            ),
            Ordering::Equal => {
                *removed = Some(value1.clone());
                match middle {
                    None => Child::Done(two(None, key2.clone(), value2.clone(), None)),
                    Some(middle) => {
                        let (mk, mv, sub) = remove_min(middle);
                        fix3_middle(left, &mk, &mv, sub, key2, value2, right)
                    }
                }
            }
            Ordering::Greater => match key.cmp(key2.borrow()) {
                Ordering::Less => fix3_middle(
                    left,
                    key1,
                    value1,
                    remove(middle, key, removed)?,
                    key2,
                    value2,
                    right,
                ),
                Ordering::Equal => {
                    *removed = Some(value2.clone());
                    match right {
                        None => Child::Done(two(None, key1.clone(), value1.clone(), None)),
                        Some(right) => {
                            let (mk, mv, sub) = remove_min(right);
                            fix3_right(left, key1, value1, middle, &mk, &mv, sub)
                        }
                    }
                }
                Ordering::Greater => fix3_right(
                    left,
                    key1,
                    value1,
                    middle,
                    key2,
                    value2,
                    remove(right, key, removed)?,
                ),
            },
        },
    };
    Some(child)
}

/// Remove the smallest key of a non-empty subtree.
fn remove_min<K: Clone, V: Clone>(node: &Arc<Node<K, V>>) -> (K, V, Child<K, V>) {
    match &**node {
        Node::Two {
            left: None,
            key,
            value,
            ..
        } => (key.clone(), value.clone(), Child::Short(None)),
        Node::Three {
            left: None,
            key1,
            value1,
            key2,
            value2,
            ..
        } => (
            key1.clone(),
            value1.clone(),
            Child::Done(two(None, key2.clone(), value2.clone(), None)),
        ),
        Node::Two {
            left: Some(left),
            key,
            value,
            right,
        } => {
            let (mk, mv, sub) = remove_min(left);
            (mk, mv, fix2_left(sub, key, value, right))
        }
        Node::Three {
            left: Some(left),
            key1,
            value1,
            middle,
            key2,
            value2,
            right,
        } => {
            let (mk, mv, sub) = remove_min(left);
            (
                mk,
                mv,
                fix3_left(sub, key1, value1, middle, key2, value2, right),
            )
        }
    }
}

fn fix2_left<K: Clone, V: Clone>(
    child: Child<K, V>,
    key: &K,
    value: &V,
    right: &Link<K, V>,
) -> Child<K, V> {
    match child {
        Child::Done(l) => Child::Done(two(l, key.clone(), value.clone(), right.clone())),
        Child::Short(t1) => match sibling(right) {
            Node::Two {
                left: t2,
                key: b,
                value: bv,
                right: t3,
            } => Child::Short(three(
                t1,
                key.clone(),
                value.clone(),
                t2.clone(),
                b.clone(),
                bv.clone(),
                t3.clone(),
            )),
            Node::Three {
                left: t2,
                key1: b,
                value1: bv,
                middle: t3,
                key2: c,
                value2: cv,
                right: t4,
            } => Child::Done(two(
                two(t1, key.clone(), value.clone(), t2.clone()),
                b.clone(),
                bv.clone(),
                two(t3.clone(), c.clone(), cv.clone(), t4.clone()),
            )),
        },
    }
}

fn fix2_right<K: Clone, V: Clone>(
    left: &Link<K, V>,
    key: &K,
    value: &V,
    child: Child<K, V>,
) -> Child<K, V> {
    match child {
        Child::Done(r) => Child::Done(two(left.clone(), key.clone(), value.clone(), r)),
        Child::Short(t3) => match sibling(left) {
            Node::Two {
                left: t1,
                key: a,
                value: av,
                right: t2,
            } => Child::Short(three(
                t1.clone(),
                a.clone(),
                av.clone(),
                t2.clone(),
                key.clone(),
                value.clone(),
                t3,
            )),
            Node::Three {
                left: t1,
                key1: a,
                value1: av,
                middle: t2,
                key2: b,
                value2: bv,
                right: t2b,
            } => Child::Done(two(
                two(t1.clone(), a.clone(), av.clone(), t2.clone()),
                b.clone(),
                bv.clone(),
                two(t2b.clone(), key.clone(), value.clone(), t3),
            )),
        },
    }
}

fn fix3_left<K: Clone, V: Clone>(
    child: Child<K, V>,
    key1: &K,
    value1: &V,
    middle: &Link<K, V>,
    key2: &K,
    value2: &V,
    right: &Link<K, V>,
) -> Child<K, V> {
    match child {
        Child::Done(l) => Child::Done(three(
            l,
            key1.clone(),
            value1.clone(),
            middle.clone(),
            key2.clone(),
            value2.clone(),
            right.clone(),
        )),
        Child::Short(t1) => match sibling(middle) {
            Node::Two {
                left: t2,
                key: x,
                value: xv,
                right: t3,
            } => Child::Done(two(
                three(
                    t1,
                    key1.clone(),
                    value1.clone(),
                    t2.clone(),
                    x.clone(),
                    xv.clone(),
                    t3.clone(),
                ),
                key2.clone(),
                value2.clone(),
                right.clone(),
            )),
            Node::Three {
                left: t2,
                key1: x,
                value1: xv,
                middle: t3,
                key2: y,
                value2: yv,
                right: t4,
            } => Child::Done(three(
                two(t1, key1.clone(), value1.clone(), t2.clone()),
                x.clone(),
                xv.clone(),
                two(t3.clone(), y.clone(), yv.clone(), t4.clone()),
                key2.clone(),
                value2.clone(),
                right.clone(),
            )),
        },
    }
}

fn fix3_middle<K: Clone, V: Clone>(
    left: &Link<K, V>,
    key1: &K,
    value1: &V,
    child: Child<K, V>,
    key2: &K,
    value2: &V,
    right: &Link<K, V>,
) -> Child<K, V> {
    match child {
        Child::Done(m) => Child::Done(three(
            left.clone(),
            key1.clone(),
            value1.clone(),
            m,
            key2.clone(),
            value2.clone(),
            right.clone(),
        )),
        Child::Short(t2) => match sibling(left) {
            Node::Two {
                left: t0,
                key: x,
                value: xv,
                right: t1,
            } => Child::Done(two(
                three(
                    t0.clone(),
                    x.clone(),
                    xv.clone(),
                    t1.clone(),
                    key1.clone(),
                    value1.clone(),
                    t2,
                ),
                key2.clone(),
                value2.clone(),
                right.clone(),
            )),
            Node::Three {
                left: t0,
                key1: x,
                value1: xv,
                middle: t1,
                key2: y,
                value2: yv,
                right: t1b,
            } => Child::Done(three(
                two(t0.clone(), x.clone(), xv.clone(), t1.clone()),
                y.clone(),
                yv.clone(),
                two(t1b.clone(), key1.clone(), value1.clone(), t2),
                key2.clone(),
                value2.clone(),
                right.clone(),
            )),
        },
    }
}

fn fix3_right<K: Clone, V: Clone>(
    left: &Link<K, V>,
    key1: &K,
    value1: &V,
    middle: &Link<K, V>,
    key2: &K,
    value2: &V,
    child: Child<K, V>,
) -> Child<K, V> {
    match child {
        Child::Done(r) => Child::Done(three(
            left.clone(),
            key1.clone(),
            value1.clone(),
            middle.clone(),
            key2.clone(),
            value2.clone(),
            r,
        )),
        Child::Short(t3) => match sibling(middle) {
            Node::Two {
                left: t1,
                key: x,
                value: xv,
                right: t2,
            } => Child::Done(two(
                left.clone(),
                key1.clone(),
                value1.clone(),
                three(
                    t1.clone(),
                    x.clone(),
                    xv.clone(),
                    t2.clone(),
                    key2.clone(),
                    value2.clone(),
                    t3,
                ),
            )),
            Node::Three {
                left: t1,
                key1: x,
                value1: xv,
                middle: t2,
                key2: y,
                value2: yv,
                right: t2b,
            } => Child::Done(three(
                left.clone(),
                key1.clone(),
                value1.clone(),
                two(t1.clone(), x.clone(), xv.clone(), t2.clone()),
                y.clone(),
                yv.clone(),
                two(t2b.clone(), key2.clone(), value2.clone(), t3),
            )),
        },
    }
}

/// Height of a subtree, or `None` if two leaves sit at different depths.
pub(crate) fn balanced_height<K, V>(link: &Link<K, V>) -> Option<usize> {
    let Some(node) = link else {
        return Some(0);
    };
    let children: Vec<&Link<K, V>> = match &**node {
        Node::Two { left, right, .. } => vec![left, right],
        Node::Three {
            left,
            middle,
            right,
            ..
        } => vec![left, middle, right],
    };
    let mut height = None;
    for child in children {
        let h = balanced_height(child)?;
        match height {
            None => height = Some(h),
            Some(expected) if expected != h => return None,
            Some(_) => {}
        }
    }
    height.map(|h| h + 1)
}

/// In-order traversal over a subtree, driven by an explicit stack.
pub(crate) struct Walk<'a, K, V> {
    // (node, index of the next key to yield)
    stack: Vec<(&'a Node<K, V>, u8)>,
}

impl<'a, K, V> Walk<'a, K, V> {
    pub(crate) fn new(root: &'a Link<K, V>) -> Self {
        let mut walk = Self { stack: Vec::new() };
        walk.descend_left(root);
        walk
    }

    fn descend_left(&mut self, mut link: &'a Link<K, V>) {
        while let Some(node) = link {
            self.stack.push((node, 0));
            link = match &**node {
                Node::Two { left, .. } | Node::Three { left, .. } => left,
            };
        }
    }
}

impl<'a, K, V> Iterator for Walk<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let (node, idx) = self.stack.pop()?;
        match (node, idx) {
            (Node::Two { key, value, right, .. }, _) => {
                self.descend_left(right);
                Some((key, value))
            }
            (
                Node::Three {
                    key1,
                    value1,
                    middle,
                    ..
                },
                0,
            ) => {
                self.stack.push((node, 1));
                self.descend_left(middle);
                Some((key1, value1))
            }
            (
                Node::Three {
                    key2, value2, right, ..
                },
                _,
            ) => {
                self.descend_left(right);
                Some((key2, value2))
            }
        }
    }
}
