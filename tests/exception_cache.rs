use std::cell::Cell;
use std::rc::Rc;

use abrt_java_agent::error::{AgentError, Result};
use abrt_java_agent::exception_cache::{ExceptionCache, SameThrowable, DEFAULT_CAPACITY};

/// Stand-in for a retained exception: compares by id, counts releases.
struct Handle {
    id: u32,
    released: Rc<Cell<usize>>,
}

impl Drop for Handle {
    fn drop(&mut self) {
        self.released.set(self.released.get() + 1);
    }
}

impl SameThrowable<u32> for Handle {
    fn same_throwable(&self, probe: &u32) -> Result<bool> {
        Ok(self.id == *probe)
    }
}

/// Probe whose `equals()` throws.
struct Throwing;

impl SameThrowable<Throwing> for Handle {
    fn same_throwable(&self, _probe: &Throwing) -> Result<bool> {
        Err(AgentError::EqualityCheck)
    }
}

fn handle(id: u32, released: &Rc<Cell<usize>>) -> Handle {
    Handle { id, released: Rc::clone(released) }
}

fn ids(cache: &ExceptionCache<Handle>) -> Vec<u32> {
    cache.iter().map(|h| h.id).collect()
}

#[test]
fn new_cache_is_empty() {
    let cache: ExceptionCache<Handle> = ExceptionCache::default();
    assert_eq!(cache.capacity(), DEFAULT_CAPACITY);
    assert!(cache.is_empty());
    assert_eq!(cache.len(), 0);
    assert!(cache.find(&1u32).is_none());
}

#[test]
#[should_panic]
fn zero_capacity_is_rejected() {
    let _ = ExceptionCache::<Handle>::new(0);
}

#[test]
fn oldest_entry_is_evicted_when_full() {
    let released = Rc::new(Cell::new(0));
    let mut cache = ExceptionCache::new(3);

    for id in [1, 2, 3] {
        cache.push(handle(id, &released));
    }
    assert_eq!(cache.len(), 3);
    assert_eq!(released.get(), 0);

    cache.push(handle(4, &released));
    assert_eq!(cache.len(), 3);
    assert_eq!(released.get(), 1, "the evicted entry is released once");
    assert!(cache.find(&1u32).is_none());
    for id in [2u32, 3, 4] {
        assert_eq!(cache.find(&id).map(|h| h.id), Some(id));
    }
    assert_eq!(ids(&cache), vec![4, 3, 2]);
}

#[test]
fn find_returns_newest_duplicate() {
    let released = Rc::new(Cell::new(0));
    let mut cache = ExceptionCache::new(4);
    cache.push(handle(7, &released));
    cache.push(handle(8, &released));
    cache.push(handle(7, &released));

    assert_eq!(cache.len(), 3);
    let found = cache.find(&7u32).map(|h| h as *const Handle);
    let newest = cache.iter().next().map(|h| h as *const Handle);
    assert_eq!(found, newest);
}

#[test]
fn failing_comparison_counts_as_not_found() {
    let released = Rc::new(Cell::new(0));
    let mut cache = ExceptionCache::new(2);
    cache.push(handle(1, &released));

    assert!(cache.find(&Throwing).is_none());
    assert_eq!(cache.len(), 1);
}

#[test]
fn clear_releases_everything_and_resets() {
    let released = Rc::new(Cell::new(0));
    let mut cache = ExceptionCache::new(3);
    for id in 0..5 {
        cache.push(handle(id, &released));
    }
    assert_eq!(released.get(), 2);

    cache.clear();
    assert_eq!(released.get(), 5);
    assert!(cache.is_empty());
    assert_eq!(cache.len(), 0);

    cache.push(handle(9, &released));
    assert_eq!(ids(&cache), vec![9]);
}

#[test]
fn dropping_the_cache_releases_each_handle_once() {
    let released = Rc::new(Cell::new(0));
    {
        let mut cache = ExceptionCache::new(5);
        for id in 0..3 {
            cache.push(handle(id, &released));
        }
    }
    assert_eq!(released.get(), 3);
}

#[test]
fn single_slot_cache_keeps_the_latest() {
    let released = Rc::new(Cell::new(0));
    let mut cache = ExceptionCache::new(1);
    cache.push(handle(1, &released));
    cache.push(handle(2, &released));

    assert_eq!(cache.len(), 1);
    assert_eq!(ids(&cache), vec![2]);
    assert_eq!(released.get(), 1);
}
