//! Map from Java thread id to per-thread state.
//!
//! A fixed array of buckets, each a singly linked chain, keyed by
//! `tid mod BUCKET_COUNT`. The registry does no locking of its own: the
//! event processor keeps it behind the single lock that also guards the
//! caches it holds.

use crate::events::ThreadId;

/// Number of hash buckets.
pub const BUCKET_COUNT: usize = 111;

#[derive(Debug)]
struct Entry<T> {
    tid: ThreadId,
    value: T,
    next: Option<Box<Entry<T>>>,
}

#[derive(Debug)]
pub struct ThreadRegistry<T> {
    buckets: Vec<Option<Box<Entry<T>>>>,
    len: usize,
}

impl<T> ThreadRegistry<T> {
    pub fn new() -> Self {
        ThreadRegistry {
            buckets: (0..BUCKET_COUNT).map(|_| None).collect(),
            len: 0,
        }
    }

    fn bucket(tid: ThreadId) -> usize {
        tid.rem_euclid(BUCKET_COUNT as ThreadId) as usize
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn contains(&self, tid: ThreadId) -> bool {
        self.get(tid).is_some()
    }

    /// Registers `value` under `tid`.
    ///
    /// Returns `false` and drops `value` if `tid` is already registered; the
    /// existing entry is kept.
    pub fn push(&mut self, tid: ThreadId, value: T) -> bool {
        if self.contains(tid) {
            return false;
        }
        let head = &mut self.buckets[Self::bucket(tid)];
        let next = head.take();
        *head = Some(Box::new(Entry { tid, value, next }));
        self.len += 1;
        true
    }

    pub fn get(&self, tid: ThreadId) -> Option<&T> {
        let mut cursor = self.buckets[Self::bucket(tid)].as_deref();
        while let Some(entry) = cursor {
            if entry.tid == tid {
                return Some(&entry.value);
            }
            cursor = entry.next.as_deref();
        }
        None
    }

    pub fn get_mut(&mut self, tid: ThreadId) -> Option<&mut T> {
        let mut cursor = self.buckets[Self::bucket(tid)].as_deref_mut();
        while let Some(entry) = cursor {
            if entry.tid == tid {
                return Some(&mut entry.value);
            }
            cursor = entry.next.as_deref_mut();
        }
        None
    }

    /// Removes and returns the value registered under `tid`.
    pub fn pop(&mut self, tid: ThreadId) -> Option<T> {
        let mut link = &mut self.buckets[Self::bucket(tid)];
        while link.as_ref().map_or(false, |entry| entry.tid != tid) {
            link = &mut link.as_mut()?.next;
        }
        let mut removed = link.take()?;
        *link = removed.next.take();
        self.len -= 1;
        Some(removed.value)
    }

    /// Drops every entry.
    pub fn clear(&mut self) {
        for bucket in self.buckets.iter_mut() {
            let mut chain = bucket.take();
            while let Some(mut entry) = chain {
                chain = entry.next.take();
            }
        }
        self.len = 0;
    }
}

impl<T> Default for ThreadRegistry<T> {
    fn default() -> Self {
        ThreadRegistry::new()
    }
}
