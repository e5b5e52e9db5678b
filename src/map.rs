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

//! A lock-striped concurrent hash map with treeifying buckets.

mod bucket;


use self::bucket::Bucket;

use crate::key::Key;

use std::{error, fmt};

/// A hash function supplied at construction.
///
/// The function must be consistent with the map's equality predicate: keys
/// that compare equal must hash equally. Behaviour when that contract is
/// violated is unspecified; entries may silently become unreachable.
pub type HashFn<K> = fn(&K) -> u32;

/// An equality predicate supplied at construction.
///
/// The predicate must be reflexive, symmetric, and transitive.
pub type EqFn<K> = fn(&K, &K) -> bool;

/// The bucket count used by [`HashMap::new`] and [`Options::new`].
pub const DEFAULT_CAPACITY: usize = 16;

/// The error returned when construction options are rejected.
///
/// Operations on a constructed map never fail; absent keys are reported
/// through return values, not errors.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Error {
    /// The requested capacity was zero or did not fit the 32-bit hash
    /// domain.
    InvalidCapacity,
    /// [`Options::build`] was invoked without a hash function or without an
    /// equality predicate.
    MissingCallback,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidCapacity => write!(f, "capacity must be positive"),
            Error::MissingCallback => {
                write!(f, "hash function and equality predicate are required")
            }
        }
    }
}

impl error::Error for Error {}

fn check_capacity(capacity: usize) -> Result<(), Error> {
    if capacity == 0 || capacity > u32::MAX as usize {
        Err(Error::InvalidCapacity)
    } else {
        Ok(())
    }
}

fn default_equals<K: Eq>(first: &K, second: &K) -> bool {
    first == second
}

/// A concurrent hash map implemented with lock striping at bucket
/// granularity.
///
/// The map owns a fixed array of buckets; each key is assigned to exactly
/// one bucket by `hash(key) mod capacity` for its entire lifetime in the
/// map. Every bucket owns a reader-writer lock over its entries, so readers
/// of a bucket proceed in parallel with each other and operations on
/// distinct buckets never contend at all. An operation holds at most one
/// bucket lock and never acquires a second, which rules out deadlock by
/// construction.
///
/// Entries that collide into a bucket are kept in a singly linked chain
/// until the bucket holds 16 of them. At that point the chain is converted
/// in place to a binary search tree keyed by the 32-bit hash, built
/// near-balanced by median-splitting the sorted entries. The tree is not
/// rebalanced afterwards and never reverts to a chain, so lookup cost in a
/// long-lived bucket stays bounded by tree depth even as entries come and
/// go. Because the tree is ordered by hash rather than by key, keys with
/// equal hashes are permitted as siblings; lookups always run the equality
/// predicate and never conclude from a hash match alone.
///
/// The bucket array never grows. Capacity should therefore be chosen to
/// match expected concurrency rather than expected cardinality: once trees
/// have formed, per-operation cost is logarithmic in the size of one
/// bucket's share of the map.
///
/// Key types implementing [`Key`] get a built-in hash function and `==` as
/// the equality predicate through [`new`] and [`with_capacity`]; any other
/// key type can be used by supplying both callbacks through [`Options`].
///
/// [`new`]: HashMap::new
/// [`with_capacity`]: HashMap::with_capacity
pub struct HashMap<K, V> {
    table: Box<[Bucket<K, V>]>,
    hash: HashFn<K>,
    equals: EqFn<K>,
}

impl<K: Key, V> HashMap<K, V> {
    /// Creates an empty `HashMap` with the default capacity of 16 buckets.
    ///
    /// Keys are hashed with [`Key::hash32`] and compared with `==`.
    pub fn new() -> HashMap<K, V> {
        HashMap::with_parts(DEFAULT_CAPACITY, K::hash32, default_equals)
    }

    /// Creates an empty `HashMap` with exactly `capacity` buckets.
    ///
    /// Keys are hashed with [`Key::hash32`] and compared with `==`. Returns
    /// [`Error::InvalidCapacity`] if `capacity` is zero or exceeds the
    /// 32-bit hash domain.
    pub fn with_capacity(capacity: usize) -> Result<HashMap<K, V>, Error> {
        check_capacity(capacity)?;

        Ok(HashMap::with_parts(capacity, K::hash32, default_equals))
    }
}

impl<K: Key, V> Default for HashMap<K, V> {
    fn default() -> HashMap<K, V> {
        HashMap::new()
    }
}

impl<K, V> HashMap<K, V> {
    fn with_parts(capacity: usize, hash: HashFn<K>, equals: EqFn<K>) -> HashMap<K, V> {
        let mut table = Vec::with_capacity(capacity);

        for _ in 0..capacity {
            table.push(Bucket::new());
        }

        HashMap {
            table: table.into_boxed_slice(),
            hash,
            equals,
        }
    }

    /// Returns the fixed number of buckets in this map.
    pub fn capacity(&self) -> usize {
        self.table.len()
    }

    /// Returns the number of entries in this map.
    ///
    /// This is a relaxed read: each bucket's count is loaded without taking
    /// its lock, so the sum may not correspond to any single instant while
    /// mutations are in flight. It is exact when no concurrent mutation is
    /// running.
    pub fn len(&self) -> usize {
        self.table.iter().map(Bucket::len).sum()
    }

    /// Returns true if this map contains no entries, with the same relaxed
    /// guarantee as [`len`].
    ///
    /// [`len`]: HashMap::len
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maps `key` to `value`, returning the value it replaced.
    ///
    /// If the key is already present, its value is overwritten in place and
    /// the previous value is returned; the entry count does not change.
    pub fn insert(&self, key: K, value: V) -> Option<V> {
        let hash = (self.hash)(&key);

        self.bucket(hash).insert(hash, key, value, self.equals)
    }

    /// Returns a copy of the value mapped by `key`.
    pub fn get(&self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        self.get_and(key, V::clone)
    }

    /// Invokes `with_value` with a reference to the value mapped by `key`.
    ///
    /// The bucket's shared lock is held while `with_value` runs, so the
    /// closure should not block on work of its own.
    pub fn get_and<T, F: FnOnce(&V) -> T>(&self, key: &K, with_value: F) -> Option<T> {
        let hash = (self.hash)(key);

        self.bucket(hash).get_and(hash, key, self.equals, with_value)
    }

    /// Returns a copy of the value mapped by `key`, or `default` if there
    /// is no such entry.
    ///
    /// The default is never inserted.
    pub fn get_or_default(&self, key: &K, default: V) -> V
    where
        V: Clone,
    {
        self.get(key).unwrap_or(default)
    }

    /// Returns true if there is an entry mapped by `key`.
    pub fn contains_key(&self, key: &K) -> bool {
        self.get_and(key, |_| ()).is_some()
    }

    /// Removes the entry mapped by `key`, returning its value.
    ///
    /// Removing an absent key is a no-op that returns [`None`].
    pub fn remove(&self, key: &K) -> Option<V> {
        let hash = (self.hash)(key);

        self.bucket(hash).remove(hash, key, self.equals)
    }

    fn bucket(&self, hash: u32) -> &Bucket<K, V> {
        &self.table[hash as usize % self.table.len()]
    }
}

#[cfg(test)]
impl<K, V> HashMap<K, V> {
    pub(crate) fn assert_invariants(&self) {
        for bucket in self.table.iter() {
            bucket.assert_invariants();
        }
    }
}

/// Construction options for a [`HashMap`] over keys of any type.
///
/// Capacity defaults to [`DEFAULT_CAPACITY`]; the hash function and the
/// equality predicate have no default and must both be supplied before
/// [`build`] succeeds.
///
/// ```
/// use chmap::{HashMap, Options};
///
/// let map: HashMap<i64, &str> = Options::new()
///     .capacity(64)
///     .hash(|key| *key as u32)
///     .equals(|first, second| first == second)
///     .build()
///     .expect("both callbacks were supplied");
///
/// map.insert(-3, "negative three");
/// assert_eq!(map.get(&-3), Some("negative three"));
/// ```
///
/// [`build`]: Options::build
pub struct Options<K> {
    capacity: usize,
    hash: Option<HashFn<K>>,
    equals: Option<EqFn<K>>,
}

impl<K> Options<K> {
    /// Creates options with the default capacity and no callbacks.
    pub fn new() -> Options<K> {
        Options {
            capacity: DEFAULT_CAPACITY,
            hash: None,
            equals: None,
        }
    }

    /// Sets the fixed bucket count.
    pub fn capacity(mut self, capacity: usize) -> Options<K> {
        self.capacity = capacity;

        self
    }

    /// Sets the hash function.
    pub fn hash(mut self, hash: HashFn<K>) -> Options<K> {
        self.hash = Some(hash);

        self
    }

    /// Sets the equality predicate.
    pub fn equals(mut self, equals: EqFn<K>) -> Options<K> {
        self.equals = Some(equals);

        self
    }

    /// Validates the options and constructs the map.
    ///
    /// Returns [`Error::InvalidCapacity`] if the capacity is zero or does
    /// not fit the 32-bit hash domain, and [`Error::MissingCallback`] if
    /// either callback was not supplied.
    pub fn build<V>(self) -> Result<HashMap<K, V>, Error> {
        check_capacity(self.capacity)?;

        match (self.hash, self.equals) {
            (Some(hash), Some(equals)) => Ok(HashMap::with_parts(self.capacity, hash, equals)),
            _ => Err(Error::MissingCallback),
        }
    }
}

impl<K> Default for Options<K> {
    fn default() -> Options<K> {
        Options::new()
    }
}
