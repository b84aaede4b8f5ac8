use abrt_java_agent::thread_registry::{ThreadRegistry, BUCKET_COUNT};

#[test]
fn push_get_pop() {
    let mut registry = ThreadRegistry::new();
    assert!(registry.is_empty());

    assert!(registry.push(1, "main"));
    assert!(registry.push(2, "worker"));
    assert_eq!(registry.len(), 2);
    assert_eq!(registry.get(1), Some(&"main"));
    assert!(registry.contains(2));

    assert_eq!(registry.pop(1), Some("main"));
    assert!(!registry.contains(1));
    assert_eq!(registry.pop(1), None);
    assert_eq!(registry.len(), 1);
}

#[test]
fn duplicate_push_keeps_the_first_value() {
    let mut registry = ThreadRegistry::new();
    assert!(registry.push(5, 1));
    assert!(!registry.push(5, 2));
    assert_eq!(registry.get(5), Some(&1));
    assert_eq!(registry.len(), 1);
}

#[test]
fn colliding_ids_share_a_bucket() {
    let step = BUCKET_COUNT as i64;
    let ids = [3, 3 + step, 3 + 2 * step, 3 + 3 * step];

    let mut registry = ThreadRegistry::new();
    for tid in ids {
        assert!(registry.push(tid, tid * 10));
    }

    // remove from the middle of the chain
    assert_eq!(registry.pop(ids[1]), Some(ids[1] * 10));
    assert_eq!(registry.pop(ids[3]), Some(ids[3] * 10));
    assert_eq!(registry.get(ids[0]), Some(&(ids[0] * 10)));
    assert_eq!(registry.get(ids[2]), Some(&(ids[2] * 10)));
    assert_eq!(registry.len(), 2);
}

#[test]
fn negative_ids_are_accepted() {
    let mut registry = ThreadRegistry::new();
    assert!(registry.push(-1, "odd"));
    assert_eq!(registry.get(-1), Some(&"odd"));
}

#[test]
fn get_mut_updates_in_place() {
    let mut registry = ThreadRegistry::new();
    registry.push(42, Vec::new());
    if let Some(values) = registry.get_mut(42) {
        values.push("seen");
    }
    assert_eq!(registry.get(42).map(Vec::len), Some(1));
    assert!(registry.get_mut(43).is_none());
}

#[test]
fn clear_drops_everything() {
    let mut registry = ThreadRegistry::new();
    for tid in 0..500 {
        registry.push(tid, tid);
    }
    assert_eq!(registry.len(), 500);

    registry.clear();
    assert!(registry.is_empty());
    assert!(!registry.contains(0));
    assert!(registry.push(0, 0));
}
