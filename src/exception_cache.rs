//! Per-thread ring buffer of exceptions that have already been reported.
//!
//! An exception propagating through several frames raises one JVMTI
//! `Exception` event per rethrow. The cache remembers the last few exception
//! objects a thread reported so the same object is reported once.
//!
//! Emptiness is structural: the cache is empty exactly when the `begin` slot
//! is unset. Entries are compared through [`SameThrowable`], which lets the
//! VM decide equality (and lets tests substitute plain values).

use tracing::warn;

use crate::error::Result;

/// Number of exceptions remembered per thread.
pub const DEFAULT_CAPACITY: usize = 5;

/// Equality between a stored exception handle and a probe.
///
/// An `Err` means the comparison itself failed (for instance `equals()`
/// threw); the cache treats that as "not found".
pub trait SameThrowable<Probe: ?Sized> {
    fn same_throwable(&self, probe: &Probe) -> Result<bool>;
}

/// Fixed-capacity FIFO of owned exception handles.
///
/// Dropping a handle releases whatever it holds, so eviction, [`clear`] and
/// dropping the cache all release references exactly once.
///
/// [`clear`]: ExceptionCache::clear
#[derive(Debug)]
pub struct ExceptionCache<H> {
    begin: usize,
    end: usize,
    slots: Box<[Option<H>]>,
}

impl<H> ExceptionCache<H> {
    /// Creates an empty cache.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "exception cache capacity must be non-zero");
        ExceptionCache {
            begin: 0,
            end: 0,
            slots: (0..capacity).map(|_| None).collect(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots[self.begin].is_none()
    }

    /// Number of stored handles.
    pub fn len(&self) -> usize {
        if self.is_empty() {
            0
        } else {
            (self.end + self.capacity() - self.begin) % self.capacity() + 1
        }
    }

    fn wrap(&self, index: usize) -> usize {
        index % self.capacity()
    }

    /// Stores `handle` as the newest entry, evicting the oldest one when full.
    ///
    /// Pushing a handle equal to one already stored is allowed.
    pub fn push(&mut self, handle: H) {
        if !self.is_empty() {
            let new_end = self.wrap(self.end + 1);
            if new_end == self.begin {
                // full: release the oldest entry
                self.slots[self.begin] = None;
                self.begin = self.wrap(self.begin + 1);
            }
            self.end = new_end;
        }
        self.slots[self.end] = Some(handle);
    }

    /// Finds the newest stored handle equal to `probe`.
    ///
    /// Scans from the most recent entry back to the oldest. A failing
    /// comparison stops the scan and reports "not found".
    pub fn find<P: ?Sized>(&self, probe: &P) -> Option<&H>
    where
        H: SameThrowable<P>,
    {
        if self.is_empty() {
            return None;
        }

        let mut index = self.end;
        loop {
            if let Some(handle) = &self.slots[index] {
                match handle.same_throwable(probe) {
                    Ok(true) => return Some(handle),
                    Ok(false) => {}
                    Err(err) => {
                        warn!("cannot compare exception with a cached one: {err}");
                        return None;
                    }
                }
            }
            if index == self.begin {
                return None;
            }
            index = self.wrap(index + self.capacity() - 1);
        }
    }

    /// Releases every stored handle and resets the cache to its initial state.
    pub fn clear(&mut self) {
        for slot in self.slots.iter_mut() {
            *slot = None;
        }
        self.begin = 0;
        self.end = 0;
    }

    /// Stored handles, newest first.
    pub fn iter(&self) -> impl Iterator<Item = &H> + '_ {
        let cap = self.capacity();
        let len = self.len();
        (0..len).filter_map(move |offset| self.slots[(self.end + cap - offset) % cap].as_ref())
    }
}

impl<H> Default for ExceptionCache<H> {
    fn default() -> Self {
        ExceptionCache::new(DEFAULT_CAPACITY)
    }
}
