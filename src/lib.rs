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

//! Lock-striped resizeable hash map and set for fork-join parallel
//! workloads.
//!
//! Chained buckets behind per-bucket mutexes handle concurrent point
//! operations; a stripe of reader-writer segment locks, in the manner of the
//! segmented design popularized by [Java's `ConcurrentHashMap`], coordinates
//! table growth against them. Bulk traversal and map-reduce fan out over the
//! [rayon] thread pool.
//!
//! [Java's `ConcurrentHashMap`]: https://docs.oracle.com/javase/7/docs/api/java/util/concurrent/ConcurrentHashMap.html
//! [rayon]: https://docs.rs/rayon

pub mod map;
pub mod set;

pub use map::HashMap;
pub use set::HashSet;
