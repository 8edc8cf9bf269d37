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

//! A lock-striped, chaining hash map for bulk parallel workloads.

pub(crate) mod bucket;
pub(crate) mod table;


use self::bucket::{Entry, Link};
use self::table::Table;

use std::{
    borrow::Borrow,
    cell::UnsafeCell,
    cmp,
    hash::{BuildHasher, Hash},
    sync::atomic::{AtomicUsize, Ordering},
};

use parking_lot::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use rayon::prelude::*;

/// Default hashing algorithm: [aHash].
///
/// [aHash]: https://docs.rs/ahash
pub type DefaultHashBuilder = ahash::RandomState;

/// Traversal splits the bucket array into blocks of at least this many
/// buckets per task.
const TRAVERSAL_MIN_BUCKETS_PER_TASK: usize = 64;

/// A hash map for concurrent point operations and fork-join bulk traversal,
/// implemented with per-bucket chaining and lock striping.
///
/// Every bucket owns a short singly-linked chain of entries guarded by its
/// own mutex, so point operations on different buckets never contend. A
/// smaller array of reader-writer segment locks coordinates table growth:
/// point operations acquire their key's segment lock in shared mode, while
/// rehashing, [`clear`], and bulk traversal acquire segment locks across the
/// whole table. The bucket count is kept a multiple of the segment count so
/// that the segment owning a key never changes as the table grows.
///
/// The table grows once the number of keys exceeds the number of buckets,
/// keeping expected chain length at or below one entry. Growth migrates
/// entries by their cached digests, so keys are hashed exactly once, and is
/// fanned out across the [rayon] thread pool for large tables, as is bulk
/// traversal via [`apply_all`] and [`map_reduce`].
///
/// The default hashing algorithm is currently [`AHash`], though this is
/// subject to change at any point in the future. This hash function is very
/// fast for all types of keys, but this algorithm will typically *not*
/// protect against attacks such as HashDoS. The hashing algorithm can be
/// replaced on a per-`HashMap` basis using the [`with_hasher`] and
/// [`with_capacity_and_hasher`] methods.
///
/// It is required that the keys implement the [`Eq`] and [`Hash`] traits,
/// although this can frequently be achieved by using
/// `#[derive(PartialEq, Eq, Hash)]`. If you implement these yourself, it is
/// important that the following property holds:
///
/// ```text
/// k1 == k2 -> hash(k1) == hash(k2)
/// ```
///
/// In other words, if two keys are equal, their hashes must be equal.
///
/// Closures passed to [`set_with`], [`set_with_default`], [`apply`],
/// [`apply_all`], [`map`], and [`map_reduce`] are invoked while the entry's
/// bucket lock is held; they must not call back into the same map, or any
/// lock ordered after its locks, on pain of deadlock.
///
/// There is no iterator. Bulk access is offered only as [`apply_all`] and
/// [`map_reduce`], which bound the lifetime of every entry borrow to a
/// bucket lock's critical section instead of freezing the whole table for
/// as long as an iterator lives.
///
/// [`AHash`]: https://crates.io/crates/ahash
/// [rayon]: https://docs.rs/rayon
/// [`clear`]: #method.clear
/// [`apply`]: #method.apply
/// [`apply_all`]: #method.apply_all
/// [`map`]: #method.map
/// [`map_reduce`]: #method.map_reduce
/// [`set_with`]: #method.set_with
/// [`set_with_default`]: #method.set_with_default
/// [`with_hasher`]: #method.with_hasher
/// [`with_capacity_and_hasher`]: #method.with_capacity_and_hasher
/// [`Eq`]: https://doc.rust-lang.org/std/cmp/trait.Eq.html
/// [`Hash`]: https://doc.rust-lang.org/std/hash/trait.Hash.html
pub struct HashMap<K, V, S = DefaultHashBuilder> {
    table: UnsafeCell<Table<K, V>>,
    segments: Box<[RwLock<()>]>,
    rehash_lock: Mutex<()>,
    len: AtomicUsize,
    build_hasher: S,
}

// The bucket array is only touched through the segment-lock protocol
// encoded in `table` and `table_mut`.
unsafe impl<K, V, S> Sync for HashMap<K, V, S>
where
    K: Send + Sync,
    V: Send + Sync,
    S: Sync,
{
}

#[cfg(feature = "num-cpus")]
impl<K, V> HashMap<K, V, DefaultHashBuilder> {
    /// Creates an empty `HashMap`.
    ///
    /// The map is created with one bucket per segment and at least twice as
    /// many segments as the system has CPUs.
    pub fn new() -> Self {
        Self::with_num_segments_capacity_and_hasher(
            default_num_segments(),
            0,
            DefaultHashBuilder::default(),
        )
    }

    /// Creates an empty `HashMap` with at least `capacity` buckets.
    ///
    /// The `HashMap` will be created with at least twice as many segments as
    /// the system has CPUs.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_num_segments_capacity_and_hasher(
            default_num_segments(),
            capacity,
            DefaultHashBuilder::default(),
        )
    }
}

#[cfg(feature = "num-cpus")]
impl<K, V, S: BuildHasher> HashMap<K, V, S> {
    /// Creates an empty `HashMap` which will use `build_hasher` to hash
    /// keys.
    ///
    /// The `HashMap` will be created with at least twice as many segments as
    /// the system has CPUs.
    pub fn with_hasher(build_hasher: S) -> Self {
        Self::with_num_segments_capacity_and_hasher(default_num_segments(), 0, build_hasher)
    }

    /// Creates an empty `HashMap` with at least `capacity` buckets, using
    /// `build_hasher` to hash the keys.
    ///
    /// The `HashMap` will be created with at least twice as many segments as
    /// the system has CPUs.
    pub fn with_capacity_and_hasher(capacity: usize, build_hasher: S) -> Self {
        Self::with_num_segments_capacity_and_hasher(default_num_segments(), capacity, build_hasher)
    }
}

impl<K, V> HashMap<K, V, DefaultHashBuilder> {
    /// Creates an empty `HashMap` with the specified number of segments.
    ///
    /// # Panics
    ///
    /// Panics if `num_segments` is 0.
    pub fn with_num_segments(num_segments: usize) -> Self {
        Self::with_num_segments_capacity_and_hasher(num_segments, 0, DefaultHashBuilder::default())
    }

    /// Creates an empty `HashMap` with the specified number of segments and
    /// at least `capacity` buckets.
    ///
    /// # Panics
    ///
    /// Panics if `num_segments` is 0.
    pub fn with_num_segments_and_capacity(num_segments: usize, capacity: usize) -> Self {
        Self::with_num_segments_capacity_and_hasher(
            num_segments,
            capacity,
            DefaultHashBuilder::default(),
        )
    }
}

impl<K, V, S> HashMap<K, V, S> {
    /// Creates an empty `HashMap` with the specified number of segments and
    /// at least `capacity` buckets, using `build_hasher` to hash the keys.
    ///
    /// The number of segments is rounded up to a power of two; the bucket
    /// count is always a multiple of it, so that growing the table never
    /// changes which segment a key belongs to.
    ///
    /// # Panics
    ///
    /// Panics if `num_segments` is 0.
    pub fn with_num_segments_capacity_and_hasher(
        num_segments: usize,
        capacity: usize,
        build_hasher: S,
    ) -> Self {
        assert!(num_segments > 0);

        let num_segments = num_segments.next_power_of_two();
        let num_buckets = round_up_to_multiple(cmp::max(capacity, num_segments), num_segments);

        Self {
            table: UnsafeCell::new(Table::with_num_buckets(num_buckets)),
            segments: (0..num_segments).map(|_| RwLock::new(())).collect(),
            rehash_lock: Mutex::new(()),
            len: AtomicUsize::new(0),
            build_hasher,
        }
    }

    /// Returns the number of keys in the map.
    ///
    /// A value observed while other threads are mutating the map is a valid
    /// intermediate total, not necessarily the count any single thread last
    /// saw.
    pub fn get_n_keys(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    /// Returns the number of buckets.
    ///
    /// The bucket count never decreases; `clear` keeps it fixed.
    pub fn get_n_buckets(&self) -> usize {
        let _segment = self.segments[0].read();

        // Safety: a shared segment lock pins the current bucket array.
        unsafe { self.table() }.num_buckets()
    }

    /// Returns the ratio between the number of keys and buckets.
    pub fn get_load_factor(&self) -> f64 {
        self.get_n_keys() as f64 / self.get_n_buckets() as f64
    }

    /// Grows the table to at least `min_buckets` buckets, rounded up to a
    /// multiple of the segment count.
    ///
    /// No work is performed if the table is already large enough. Entries
    /// are migrated by their cached digests; concurrent point operations are
    /// excluded for the duration but no entry is ever lost or duplicated,
    /// and a migration that does not complete leaves the old table in
    /// place.
    pub fn reserve(&self, min_buckets: usize)
    where
        K: Send,
        V: Send,
    {
        let _rehash = self.rehash_lock.lock();
        self.rehash(min_buckets);
    }

    /// Removes every entry from the map.
    ///
    /// The bucket count is left unchanged.
    pub fn clear(&self) {
        let _segments = self.lock_all_segments_exclusive();

        // Safety: every segment lock is held exclusively.
        let table = unsafe { self.table_mut() };

        table.clear();
        self.len.store(0, Ordering::Relaxed);
    }
}

impl<K: Hash + Eq, V, S: BuildHasher> HashMap<K, V, S> {
    /// Maps `key` to `value`, overwriting any previous value.
    pub fn set(&self, key: K, value: V)
    where
        K: Send,
        V: Send,
    {
        let digest = bucket::hash(&self.build_hasher, &key);

        let grow_to = {
            let mut locked = self.lock_bucket(digest);

            match bucket::find_mut(&mut *locked.chain, digest, &key) {
                Some(entry) => {
                    entry.value = value;

                    None
                }
                None => {
                    bucket::push_front(&mut *locked.chain, Box::new(Entry::new(key, value, digest)));

                    self.insert_committed(locked.num_buckets)
                }
            }
        };

        if let Some(min_buckets) = grow_to {
            self.grow(min_buckets);
        }
    }

    /// Updates the value of `key` in place with `setter`.
    ///
    /// If the key is absent, a defaulted value is inserted and `setter` is
    /// applied to it before the bucket lock is released. `setter` runs under
    /// the bucket lock and must not re-enter the map.
    pub fn set_with<F: FnOnce(&mut V)>(&self, key: K, setter: F)
    where
        K: Send,
        V: Default + Send,
    {
        self.set_with_inner(key, setter, V::default);
    }

    /// Updates the value of `key` in place with `setter`, inserting
    /// `default_value` first if the key is absent.
    ///
    /// `setter` runs under the bucket lock and must not re-enter the map.
    pub fn set_with_default<F: FnOnce(&mut V)>(&self, key: K, setter: F, default_value: V)
    where
        K: Send,
        V: Send,
    {
        self.set_with_inner(key, setter, move || default_value);
    }

    /// Removes `key` and its value. Removing an absent key is a no-op.
    ///
    /// The bucket array never shrinks.
    pub fn unset<Q: ?Sized + Hash + Eq>(&self, key: &Q)
    where
        K: Borrow<Q>,
    {
        let digest = bucket::hash(&self.build_hasher, key);
        let mut locked = self.lock_bucket(digest);

        if bucket::remove(&mut *locked.chain, digest, key).is_some() {
            self.len.fetch_sub(1, Ordering::Relaxed);
        }
    }

    /// Tests whether `key` is present.
    pub fn has<Q: ?Sized + Hash + Eq>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
    {
        let digest = bucket::hash(&self.build_hasher, key);
        let locked = self.lock_bucket(digest);

        bucket::find(&*locked.chain, digest, key).is_some()
    }

    /// Returns a copy of the value of `key`, or `default_value` if the key
    /// is absent.
    pub fn get_copy_or_default<Q: ?Sized + Hash + Eq>(&self, key: &Q, default_value: V) -> V
    where
        K: Borrow<Q>,
        V: Clone,
    {
        let digest = bucket::hash(&self.build_hasher, key);
        let locked = self.lock_bucket(digest);

        match bucket::find(&*locked.chain, digest, key) {
            Some(entry) => entry.value.clone(),
            None => default_value,
        }
    }

    /// Returns `mapper` applied to the value of `key`, or `default_value`
    /// if the key is absent.
    ///
    /// `mapper` runs under the bucket lock and must not re-enter the map.
    pub fn map<Q: ?Sized + Hash + Eq, R, F: FnOnce(&V) -> R>(
        &self,
        key: &Q,
        mapper: F,
        default_value: R,
    ) -> R
    where
        K: Borrow<Q>,
    {
        let digest = bucket::hash(&self.build_hasher, key);
        let locked = self.lock_bucket(digest);

        match bucket::find(&*locked.chain, digest, key) {
            Some(entry) => mapper(&entry.value),
            None => default_value,
        }
    }

    /// Invokes `f` on the value of `key`, if it is present.
    ///
    /// The update is atomic with respect to every other operation on `key`.
    /// `f` runs under the bucket lock and must not re-enter the map.
    pub fn apply<Q: ?Sized + Hash + Eq, F: FnOnce(&mut V)>(&self, key: &Q, f: F)
    where
        K: Borrow<Q>,
    {
        let digest = bucket::hash(&self.build_hasher, key);
        let mut locked = self.lock_bucket(digest);

        if let Some(entry) = bucket::find_mut(&mut *locked.chain, digest, key) {
            f(&mut entry.value);
        }
    }

    /// Invokes `f` on every entry exactly once, fanning buckets out across
    /// the rayon thread pool.
    ///
    /// Ordering among entries is unspecified. Rehashing is excluded for the
    /// duration, but point operations from other threads proceed
    /// concurrently; `f` observes every entry present from before the call
    /// to after it. `f` runs under the entry's bucket lock and must not
    /// operate on this map.
    pub fn apply_all<F>(&self, f: F)
    where
        F: Fn(&K, &mut V) + Sync,
        K: Send + Sync,
        V: Send,
    {
        let _segments = self.lock_all_segments_shared();

        // Safety: shared segment locks exclude table replacement.
        let table = unsafe { self.table() };

        table
            .buckets()
            .par_iter()
            .with_min_len(TRAVERSAL_MIN_BUCKETS_PER_TASK)
            .for_each(|bucket| {
                let mut chain = bucket.chain.lock();
                let mut link = chain.as_deref_mut();

                while let Some(entry) = link {
                    f(&entry.key, &mut entry.value);
                    link = entry.next.as_deref_mut();
                }
            });
    }

    /// Folds `mapper` over every entry and combines the results with
    /// `reducer`, in parallel.
    ///
    /// `reducer` must be associative and commutative with `identity` as its
    /// neutral element; each worker folds its share of the buckets into an
    /// accumulator seeded from `identity`, and the per-worker partials are
    /// combined with `reducer`. Returns `identity` when the map is empty.
    ///
    /// `mapper` runs under the entry's bucket lock; neither callable may
    /// operate on this map.
    pub fn map_reduce<R, M, F>(&self, mapper: M, reducer: F, identity: R) -> R
    where
        R: Clone + Send + Sync,
        M: Fn(&K, &V) -> R + Sync,
        F: Fn(R, R) -> R + Sync,
        K: Send + Sync,
        V: Send + Sync,
    {
        let _segments = self.lock_all_segments_shared();

        // Safety: shared segment locks exclude table replacement.
        let table = unsafe { self.table() };

        table
            .buckets()
            .par_iter()
            .with_min_len(TRAVERSAL_MIN_BUCKETS_PER_TASK)
            .fold(
                || identity.clone(),
                |mut partial, bucket| {
                    let chain = bucket.chain.lock();
                    let mut link = &*chain;

                    while let Some(entry) = link {
                        partial = reducer(partial, mapper(&entry.key, &entry.value));
                        link = &entry.next;
                    }

                    partial
                },
            )
            .reduce(|| identity.clone(), &reducer)
    }

    fn set_with_inner<F: FnOnce(&mut V), D: FnOnce() -> V>(&self, key: K, setter: F, make_value: D)
    where
        K: Send,
        V: Send,
    {
        let digest = bucket::hash(&self.build_hasher, &key);

        let grow_to = {
            let mut locked = self.lock_bucket(digest);

            match bucket::find_mut(&mut *locked.chain, digest, &key) {
                Some(entry) => {
                    setter(&mut entry.value);

                    None
                }
                None => {
                    let mut value = make_value();
                    setter(&mut value);
                    bucket::push_front(&mut *locked.chain, Box::new(Entry::new(key, value, digest)));

                    self.insert_committed(locked.num_buckets)
                }
            }
        };

        if let Some(min_buckets) = grow_to {
            self.grow(min_buckets);
        }
    }

    /// Records a completed insertion, returning the bucket count to grow to
    /// if the load factor now exceeds one entry per bucket.
    fn insert_committed(&self, num_buckets: usize) -> Option<usize> {
        let n_keys = self.len.fetch_add(1, Ordering::Relaxed) + 1;

        if n_keys > num_buckets {
            Some(n_keys)
        } else {
            None
        }
    }
}

impl<K, V, S> HashMap<K, V, S> {
    /// Requests a grow to at least `min_buckets` after an insertion pushed
    /// the load factor past the threshold.
    ///
    /// Many inserting threads may observe the breach at once; the rehash
    /// lock picks a single winner. Losers return immediately, since their
    /// insertion has already completed and the winner grows past the
    /// threshold on their behalf.
    fn grow(&self, min_buckets: usize)
    where
        K: Send,
        V: Send,
    {
        if let Some(_rehash) = self.rehash_lock.try_lock() {
            self.rehash(min_buckets);
        }
    }

    /// Replaces the bucket array with one of at least `min_buckets` slots
    /// and migrates every entry into it.
    ///
    /// The caller must hold `rehash_lock`.
    fn rehash(&self, min_buckets: usize)
    where
        K: Send,
        V: Send,
    {
        let _segments = self.lock_all_segments_exclusive();

        // Safety: every segment lock is held exclusively.
        let table = unsafe { self.table_mut() };

        let num_segments = self.segments.len();

        // With every segment lock held no insertion is in flight, so sizing
        // against the current key count covers inserts whose growth request
        // lost the race to this one.
        let min_buckets = cmp::max(min_buckets, self.len.load(Ordering::Relaxed));

        // Another thread may have grown the table before we acquired the
        // segment locks.
        if table.num_buckets() >= round_up_to_multiple(min_buckets, num_segments) {
            return;
        }

        let num_buckets = round_up_to_multiple(
            cmp::max(table.num_buckets() * 2, min_buckets),
            num_segments,
        );

        let new_table = Table::with_num_buckets(num_buckets);
        new_table.migrate_from(table);
        *table = new_table;
    }

    /// Acquires the owning segment lock in shared mode, then the bucket
    /// lock for `digest`.
    fn lock_bucket(&self, digest: u64) -> LockedBucket<'_, K, V> {
        let segment = self.segments[self.segment_index(digest)].read();

        // Safety: the shared segment lock pins the current bucket array.
        let table = unsafe { self.table() };

        LockedBucket {
            chain: table.bucket(digest).chain.lock(),
            num_buckets: table.num_buckets(),
            _segment: segment,
        }
    }

    fn segment_index(&self, digest: u64) -> usize {
        // The segment count is a power of two dividing the bucket count, so
        // this is bucket_index % segments.len() for whatever the bucket
        // count currently is.
        (digest & (self.segments.len() as u64 - 1)) as usize
    }

    fn lock_all_segments_shared(&self) -> Vec<RwLockReadGuard<'_, ()>> {
        self.segments.iter().map(RwLock::read).collect()
    }

    // Acquisition is in ascending index order on both segment paths.
    fn lock_all_segments_exclusive(&self) -> Vec<RwLockWriteGuard<'_, ()>> {
        self.segments.iter().map(RwLock::write).collect()
    }

    /// # Safety
    ///
    /// At least one segment lock must be held, in either mode, for the
    /// lifetime of the returned borrow.
    unsafe fn table(&self) -> &Table<K, V> {
        &*self.table.get()
    }

    /// # Safety
    ///
    /// Every segment lock must be held exclusively for the lifetime of the
    /// returned borrow.
    #[allow(clippy::mut_from_ref)]
    unsafe fn table_mut(&self) -> &mut Table<K, V> {
        &mut *self.table.get()
    }
}

#[cfg(feature = "num-cpus")]
impl<K, V, S: BuildHasher + Default> Default for HashMap<K, V, S> {
    fn default() -> Self {
        Self::with_num_segments_capacity_and_hasher(default_num_segments(), 0, S::default())
    }
}

/// A locked bucket, plus the table geometry observed while the locks are
/// held.
///
/// Field order matters: the chain guard must be released before the segment
/// guard.
struct LockedBucket<'m, K, V> {
    chain: MutexGuard<'m, Link<K, V>>,
    num_buckets: usize,
    _segment: RwLockReadGuard<'m, ()>,
}

fn round_up_to_multiple(n: usize, factor: usize) -> usize {
    (n + factor - 1) / factor * factor
}

#[cfg(feature = "num-cpus")]
fn default_num_segments() -> usize {
    num_cpus::get() * 2
}
