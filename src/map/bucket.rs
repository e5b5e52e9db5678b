// MIT License
//
// Copyright (c) 2020 Gregory Meyer
//
// Permission is hereby granted, free of charge, to any person
// obtaining a copy of this software and associated documentation files
// (the "Software"), to deal in the Software without restriction,
// including without limitation the rights to use, copy, modify, merge,
// publish, distribute, sublicense, and/or sell copies of the Software,
// and to permit persons to whom the Software is furnished to do so,
// subject to the following conditions:
//
// The above copyright notice and this permission notice shall be
// included in all copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND,
// EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF
// MERCHANTABILITY, FITNESS FOR A PARTICULAR PURPOSE AND
// NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR COPYRIGHT HOLDERS
// BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER LIABILITY, WHETHER IN AN
// ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM, OUT OF OR IN
// CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
// SOFTWARE.

use crate::map::EqFn;

use std::{
    mem,
    sync::atomic::{AtomicUsize, Ordering},
};

use parking_lot::RwLock;

/// Entry count at which a bucket's chain is converted to a tree.
pub(crate) const TREE_THRESHOLD: usize = 16;

type Link<K, V> = Option<Box<Node<K, V>>>;

/// One entry of a bucket's collision structure.
///
/// In chain mode only `right` is meaningful and serves as the next pointer;
/// in tree mode `left` and `right` are the BST children.
struct Node<K, V> {
    hash: u32,
    key: K,
    value: V,
    left: Link<K, V>,
    right: Link<K, V>,
}

impl<K, V> Node<K, V> {
    fn new(hash: u32, key: K, value: V) -> Box<Node<K, V>> {
        Box::new(Node {
            hash,
            key,
            value,
            left: None,
            right: None,
        })
    }
}

/// The collision structure of a single bucket, guarded by the bucket's lock.
///
/// `tree` is set once by `treeify` and never cleared, even when removals
/// empty the bucket.
struct Entries<K, V> {
    root: Link<K, V>,
    tree: bool,
}

impl<K, V> Entries<K, V> {
    fn find(&self, hash: u32, key: &K, eq: EqFn<K>) -> Option<&Node<K, V>> {
        let mut next = self.root.as_deref();

        while let Some(node) = next {
            if node.hash == hash && eq(&node.key, key) {
                return Some(node);
            }

            next = if self.tree && node.hash > hash {
                node.left.as_deref()
            } else {
                node.right.as_deref()
            };
        }

        None
    }

    fn insert(&mut self, hash: u32, key: K, value: V, eq: EqFn<K>) -> Option<V> {
        if self.tree {
            Self::tree_insert(&mut self.root, hash, key, value, eq)
        } else {
            Self::chain_insert(&mut self.root, hash, key, value, eq)
        }
    }

    fn remove(&mut self, hash: u32, key: &K, eq: EqFn<K>) -> Option<Box<Node<K, V>>> {
        if self.tree {
            Self::tree_remove(&mut self.root, hash, key, eq)
        } else {
            Self::chain_remove(&mut self.root, hash, key, eq)
        }
    }

    fn chain_insert(
        mut link: &mut Link<K, V>,
        hash: u32,
        key: K,
        value: V,
        eq: EqFn<K>,
    ) -> Option<V> {
        loop {
            match link {
                Some(node) if node.hash == hash && eq(&node.key, &key) => {
                    return Some(mem::replace(&mut node.value, value));
                }
                Some(node) => link = &mut node.right,
                None => {
                    *link = Some(Node::new(hash, key, value));

                    return None;
                }
            }
        }
    }

    fn tree_insert(
        mut link: &mut Link<K, V>,
        hash: u32,
        key: K,
        value: V,
        eq: EqFn<K>,
    ) -> Option<V> {
        loop {
            match link {
                Some(node) if node.hash == hash && eq(&node.key, &key) => {
                    return Some(mem::replace(&mut node.value, value));
                }
                Some(node) => {
                    link = if node.hash > hash {
                        &mut node.left
                    } else {
                        &mut node.right
                    };
                }
                None => {
                    *link = Some(Node::new(hash, key, value));

                    return None;
                }
            }
        }
    }

    fn chain_remove(
        link: &mut Link<K, V>,
        hash: u32,
        key: &K,
        eq: EqFn<K>,
    ) -> Option<Box<Node<K, V>>> {
        let mut node = link.take()?;

        if node.hash == hash && eq(&node.key, key) {
            *link = node.right.take();

            return Some(node);
        }

        let removed = Self::chain_remove(&mut node.right, hash, key, eq);
        *link = Some(node);

        removed
    }

    fn tree_remove(
        link: &mut Link<K, V>,
        hash: u32,
        key: &K,
        eq: EqFn<K>,
    ) -> Option<Box<Node<K, V>>> {
        let mut node = link.take()?;

        if node.hash > hash {
            let removed = Self::tree_remove(&mut node.left, hash, key, eq);
            *link = Some(node);

            return removed;
        }

        if node.hash < hash || !eq(&node.key, key) {
            let removed = Self::tree_remove(&mut node.right, hash, key, eq);
            *link = Some(node);

            return removed;
        }

        if node.left.is_none() {
            *link = node.right.take();

            return Some(node);
        }

        if node.right.is_none() {
            *link = node.left.take();

            return Some(node);
        }

        // Two children: the in-order successor's entry moves into this node
        // and the successor's now-detached box leaves carrying the removed
        // entry.
        match Self::detach_min(&mut node.right) {
            Some(mut successor) => {
                mem::swap(&mut node.hash, &mut successor.hash);
                mem::swap(&mut node.key, &mut successor.key);
                mem::swap(&mut node.value, &mut successor.value);
                *link = Some(node);

                Some(successor)
            }
            None => {
                *link = Some(node);

                None
            }
        }
    }

    fn detach_min(link: &mut Link<K, V>) -> Option<Box<Node<K, V>>> {
        let mut node = link.take()?;

        if node.left.is_some() {
            let min = Self::detach_min(&mut node.left);
            *link = Some(node);

            min
        } else {
            *link = node.right.take();

            Some(node)
        }
    }

    /// Converts the chain into a near-balanced BST keyed by hash.
    ///
    /// Nodes are reused; only the links are rewritten.
    fn treeify(&mut self) {
        let mut nodes = Vec::with_capacity(TREE_THRESHOLD);
        let mut next = self.root.take();

        while let Some(mut node) = next {
            next = node.right.take();
            nodes.push(node);
        }

        nodes.sort_by_key(|node| node.hash);

        self.root = Self::median_split(nodes);
        self.tree = true;
    }

    fn median_split(mut nodes: Vec<Box<Node<K, V>>>) -> Link<K, V> {
        if nodes.is_empty() {
            return None;
        }

        let mut upper = nodes.split_off(nodes.len() / 2);
        let mut root = upper.remove(0);
        root.left = Self::median_split(nodes);
        root.right = Self::median_split(upper);

        Some(root)
    }
}

/// One slot of the map's bucket array.
///
/// The entry count lives outside the lock so `HashMap::len` can read it
/// without contending with writers; it is only written under the exclusive
/// lock.
pub(crate) struct Bucket<K, V> {
    entries: RwLock<Entries<K, V>>,
    len: AtomicUsize,
}

impl<K, V> Bucket<K, V> {
    pub(crate) fn new() -> Bucket<K, V> {
        Bucket {
            entries: RwLock::new(Entries {
                root: None,
                tree: false,
            }),
            len: AtomicUsize::new(0),
        }
    }

    pub(crate) fn get_and<T, F: FnOnce(&V) -> T>(
        &self,
        hash: u32,
        key: &K,
        eq: EqFn<K>,
        with_value: F,
    ) -> Option<T> {
        let entries = self.entries.read();

        entries
            .find(hash, key, eq)
            .map(|node| with_value(&node.value))
    }

    pub(crate) fn insert(&self, hash: u32, key: K, value: V, eq: EqFn<K>) -> Option<V> {
        let mut entries = self.entries.write();
        let previous = entries.insert(hash, key, value, eq);

        if previous.is_none() {
            let len = self.len.fetch_add(1, Ordering::Relaxed) + 1;

            if !entries.tree && len >= TREE_THRESHOLD {
                entries.treeify();
            }
        }

        previous
    }

    pub(crate) fn remove(&self, hash: u32, key: &K, eq: EqFn<K>) -> Option<V> {
        let mut entries = self.entries.write();
        let node = entries.remove(hash, key, eq)?;
        self.len.fetch_sub(1, Ordering::Relaxed);

        Some(node.value)
    }

    pub(crate) fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
impl<K, V> Bucket<K, V> {
    pub(crate) fn is_tree(&self) -> bool {
        self.entries.read().tree
    }

    pub(crate) fn root_key(&self) -> Option<K>
    where
        K: Clone,
    {
        self.entries
            .read()
            .root
            .as_deref()
            .map(|node| node.key.clone())
    }

    pub(crate) fn assert_invariants(&self) {
        let entries = self.entries.read();

        assert_eq!(count_nodes(&entries.root), self.len());

        if entries.tree {
            assert_ordered(&entries.root, None, None);
        } else {
            assert_flat(&entries.root);
        }
    }
}

#[cfg(test)]
fn count_nodes<K, V>(link: &Link<K, V>) -> usize {
    link.as_deref()
        .map_or(0, |node| 1 + count_nodes(&node.left) + count_nodes(&node.right))
}

#[cfg(test)]
fn assert_ordered<K, V>(link: &Link<K, V>, lower: Option<u32>, upper: Option<u32>) {
    if let Some(node) = link.as_deref() {
        if let Some(lower) = lower {
            assert!(node.hash >= lower);
        }

        if let Some(upper) = upper {
            assert!(node.hash <= upper);
        }

        assert_ordered(&node.left, lower, Some(node.hash));
        assert_ordered(&node.right, Some(node.hash), upper);
    }
}

#[cfg(test)]
fn assert_flat<K, V>(link: &Link<K, V>) {
    if let Some(node) = link.as_deref() {
        assert!(node.left.is_none());
        assert_flat(&node.right);
    }
}
