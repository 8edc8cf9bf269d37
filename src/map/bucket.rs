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

use std::{
    borrow::Borrow,
    hash::{BuildHasher, Hash, Hasher},
};

use parking_lot::Mutex;

/// A singly-linked chain of entries sharing a bucket.
pub(crate) type Link<K, V> = Option<Box<Entry<K, V>>>;

/// One key-value pair, owned by exactly one chain at any instant.
///
/// The digest is computed once on insertion and cached so that migration
/// never re-hashes a key.
pub(crate) struct Entry<K, V> {
    pub(crate) key: K,
    pub(crate) value: V,
    pub(crate) digest: u64,
    pub(crate) next: Link<K, V>,
}

impl<K, V> Entry<K, V> {
    pub(crate) fn new(key: K, value: V, digest: u64) -> Self {
        Self {
            key,
            value,
            digest,
            next: None,
        }
    }
}

/// One slot of the bucket array.
///
/// The mutex guards every read and write of the chain rooted here.
pub(crate) struct Bucket<K, V> {
    pub(crate) chain: Mutex<Link<K, V>>,
}

impl<K, V> Bucket<K, V> {
    pub(crate) fn new() -> Self {
        Self {
            chain: Mutex::new(None),
        }
    }

    /// Detaches and drops every entry in this chain, iteratively.
    pub(crate) fn clear_chain(&mut self) {
        let mut link = self.chain.get_mut().take();

        while let Some(mut entry) = link {
            link = entry.next.take();
        }
    }
}

// Box<Entry> would otherwise drop its tail recursively.
impl<K, V> Drop for Bucket<K, V> {
    fn drop(&mut self) {
        self.clear_chain();
    }
}

/// Pushes `entry` onto the head of the chain rooted at `head`.
pub(crate) fn push_front<K, V>(head: &mut Link<K, V>, mut entry: Box<Entry<K, V>>) {
    entry.next = head.take();
    *head = Some(entry);
}

/// Walks the chain comparing digests first and keys second, returning the
/// matching entry if there is one.
pub(crate) fn find<'a, K, V, Q>(
    mut link: &'a Link<K, V>,
    digest: u64,
    key: &Q,
) -> Option<&'a Entry<K, V>>
where
    K: Borrow<Q>,
    Q: ?Sized + Eq,
{
    while let Some(entry) = link {
        if entry.digest == digest && entry.key.borrow() == key {
            return Some(entry);
        }

        link = &entry.next;
    }

    None
}

/// As [`find`], but yields a mutable entry.
pub(crate) fn find_mut<'a, K, V, Q>(
    link: &'a mut Link<K, V>,
    digest: u64,
    key: &Q,
) -> Option<&'a mut Entry<K, V>>
where
    K: Borrow<Q>,
    Q: ?Sized + Eq,
{
    let found = match link {
        None => return None,
        Some(entry) => entry.digest == digest && entry.key.borrow() == key,
    };

    if found {
        link.as_deref_mut()
    } else {
        find_mut(&mut link.as_mut()?.next, digest, key)
    }
}

/// Unlinks and returns the entry for `key`, if the chain holds one.
pub(crate) fn remove<K, V, Q>(
    link: &mut Link<K, V>,
    digest: u64,
    key: &Q,
) -> Option<Box<Entry<K, V>>>
where
    K: Borrow<Q>,
    Q: ?Sized + Eq,
{
    let found = match link {
        None => return None,
        Some(entry) => entry.digest == digest && entry.key.borrow() == key,
    };

    if found {
        let mut removed = link.take()?;
        *link = removed.next.take();

        Some(removed)
    } else {
        remove(&mut link.as_mut()?.next, digest, key)
    }
}

pub(crate) fn hash<K: ?Sized + Hash, H: BuildHasher>(build_hasher: &H, key: &K) -> u64 {
    let mut hasher = build_hasher.build_hasher();
    key.hash(&mut hasher);

    hasher.finish()
}
