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

use crate::map::bucket::{self, Bucket};

use rayon::prelude::*;

/// Migrating a small table in parallel costs more in task plumbing than
/// the moves save.
const PARALLEL_MIGRATION_MIN_BUCKETS: usize = 1 << 12;

/// A fixed-size bucket array.
///
/// The table itself is dumb storage: which locks must be held to touch it
/// is decided by [`HashMap`](crate::map::HashMap), the sole owner.
pub(crate) struct Table<K, V> {
    buckets: Box<[Bucket<K, V>]>,
}

impl<K, V> Table<K, V> {
    pub(crate) fn with_num_buckets(num_buckets: usize) -> Self {
        assert!(num_buckets > 0);

        let buckets: Vec<_> = (0..num_buckets).map(|_| Bucket::new()).collect();

        Self {
            buckets: buckets.into_boxed_slice(),
        }
    }

    pub(crate) fn num_buckets(&self) -> usize {
        self.buckets.len()
    }

    pub(crate) fn buckets(&self) -> &[Bucket<K, V>] {
        &self.buckets
    }

    /// The bucket an entry with this digest resides in.
    pub(crate) fn bucket(&self, digest: u64) -> &Bucket<K, V> {
        &self.buckets[(digest % self.buckets.len() as u64) as usize]
    }

    /// Detaches and drops every chain in the table.
    pub(crate) fn clear(&mut self) {
        for bucket in self.buckets.iter_mut() {
            bucket.clear_chain();
        }
    }
}

impl<K: Send, V: Send> Table<K, V> {
    /// Moves every entry of `old` into this table, re-indexing each by its
    /// cached digest.
    ///
    /// The caller must hold every segment lock exclusively, so `old` is
    /// borrowed mutably and its bucket mutexes are bypassed. Workers claim
    /// disjoint ranges of old buckets; pushes onto this table's chains
    /// serialize on the receiving bucket's lock.
    pub(crate) fn migrate_from(&self, old: &mut Table<K, V>) {
        let drain = |bucket: &mut Bucket<K, V>| {
            let mut link = bucket.chain.get_mut().take();

            while let Some(mut entry) = link {
                link = entry.next.take();

                let mut chain = self.bucket(entry.digest).chain.lock();
                bucket::push_front(&mut chain, entry);
            }
        };

        if old.buckets.len() >= PARALLEL_MIGRATION_MIN_BUCKETS {
            old.buckets.par_iter_mut().for_each(drain);
        } else {
            old.buckets.iter_mut().for_each(drain);
        }
    }
}
