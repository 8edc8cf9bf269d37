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

//! A concurrent hash set, wrapping [`HashMap`](crate::map::HashMap) with
//! unit values.

use crate::map::{DefaultHashBuilder, HashMap};

use std::{
    borrow::Borrow,
    hash::{BuildHasher, Hash},
};

/// A hash set for concurrent membership operations and fork-join bulk
/// traversal.
///
/// The locking discipline, growth behavior, and callable contracts are those
/// of [`HashMap`]; see its documentation. In particular, closures passed to
/// [`apply_all`] and [`map_reduce`] run under a bucket lock and must not
/// operate on the same set.
///
/// [`HashMap`]: crate::map::HashMap
/// [`apply_all`]: #method.apply_all
/// [`map_reduce`]: #method.map_reduce
pub struct HashSet<T, S = DefaultHashBuilder> {
    map: HashMap<T, (), S>,
}

#[cfg(feature = "num-cpus")]
impl<T> HashSet<T, DefaultHashBuilder> {
    /// Creates an empty `HashSet` with at least twice as many segments as
    /// the system has CPUs.
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
        }
    }

    /// Creates an empty `HashSet` with at least `capacity` buckets.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            map: HashMap::with_capacity(capacity),
        }
    }
}

#[cfg(feature = "num-cpus")]
impl<T, S: BuildHasher> HashSet<T, S> {
    /// Creates an empty `HashSet` which will use `build_hasher` to hash
    /// values.
    pub fn with_hasher(build_hasher: S) -> Self {
        Self {
            map: HashMap::with_hasher(build_hasher),
        }
    }
}

impl<T, S> HashSet<T, S> {
    /// Creates an empty `HashSet` with the specified number of segments and
    /// at least `capacity` buckets, using `build_hasher` to hash the values.
    ///
    /// # Panics
    ///
    /// Panics if `num_segments` is 0.
    pub fn with_num_segments_capacity_and_hasher(
        num_segments: usize,
        capacity: usize,
        build_hasher: S,
    ) -> Self {
        Self {
            map: HashMap::with_num_segments_capacity_and_hasher(
                num_segments,
                capacity,
                build_hasher,
            ),
        }
    }

    /// Returns the number of values in the set.
    pub fn get_n_keys(&self) -> usize {
        self.map.get_n_keys()
    }

    /// Returns the number of buckets.
    pub fn get_n_buckets(&self) -> usize {
        self.map.get_n_buckets()
    }

    /// Returns the ratio between the number of values and buckets.
    pub fn get_load_factor(&self) -> f64 {
        self.map.get_load_factor()
    }

    /// Grows the table to at least `min_buckets` buckets.
    pub fn reserve(&self, min_buckets: usize)
    where
        T: Send,
    {
        self.map.reserve(min_buckets);
    }

    /// Removes every value from the set, keeping the bucket count fixed.
    pub fn clear(&self) {
        self.map.clear();
    }
}

impl<T: Hash + Eq, S: BuildHasher> HashSet<T, S> {
    /// Adds `value` to the set. Adding a value already present is a no-op.
    pub fn add(&self, value: T)
    where
        T: Send,
    {
        self.map.set(value, ());
    }

    /// Removes `value` from the set. Removing an absent value is a no-op.
    pub fn remove<Q: ?Sized + Hash + Eq>(&self, value: &Q)
    where
        T: Borrow<Q>,
    {
        self.map.unset(value);
    }

    /// Tests whether `value` is in the set.
    pub fn has<Q: ?Sized + Hash + Eq>(&self, value: &Q) -> bool
    where
        T: Borrow<Q>,
    {
        self.map.has(value)
    }

    /// Invokes `f` on every value exactly once, fanning buckets out across
    /// the rayon thread pool.
    pub fn apply_all<F>(&self, f: F)
    where
        F: Fn(&T) + Sync,
        T: Send + Sync,
    {
        self.map.apply_all(|value, _| f(value));
    }

    /// Folds `mapper` over every value and combines the results with
    /// `reducer`, in parallel.
    ///
    /// `reducer` must be associative and commutative with `identity` as its
    /// neutral element. Returns `identity` when the set is empty.
    pub fn map_reduce<R, M, F>(&self, mapper: M, reducer: F, identity: R) -> R
    where
        R: Clone + Send + Sync,
        M: Fn(&T) -> R + Sync,
        F: Fn(R, R) -> R + Sync,
        T: Send + Sync,
    {
        self.map.map_reduce(|value, _| mapper(value), reducer, identity)
    }
}

#[cfg(feature = "num-cpus")]
impl<T, S: BuildHasher + Default> Default for HashSet<T, S> {
    fn default() -> Self {
        Self {
            map: HashMap::default(),
        }
    }
}
