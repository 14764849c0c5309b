//! Slot stability across simulated restarts.
//!
//! Each test opens the endpoint store, runs a discovery pass, drops the
//! store, then reopens it as a fresh process would. The property under test
//! is always the same: an identity that ever got a slot keeps that slot, no
//! matter what happened to the other devices in between.

use std::sync::Arc;

use tempfile::TempDir;

use slotbridge_core::Slot;
use slotbridge_devices::EndpointRegistry;
use slotbridge_storage::EndpointStore;

const CAPACITY: usize = 8;

fn open_registry(dir: &TempDir) -> EndpointRegistry {
    let store = EndpointStore::open(dir.path().join("endpoints.redb")).unwrap();
    EndpointRegistry::with_store(store, CAPACITY)
}

fn discovery_pass(registry: &mut EndpointRegistry, identities: &[&str]) -> Vec<Slot> {
    registry.begin_pass();
    let slots = identities
        .iter()
        .map(|identity| registry.assign(identity).unwrap())
        .collect();
    registry.commit_pass();
    slots
}

#[test]
fn test_fresh_start_allocates_in_order() {
    let dir = TempDir::new().unwrap();
    let mut registry = open_registry(&dir);
    let slots = discovery_pass(&mut registry, &["dev_a", "dev_b", "dev_c"]);
    assert_eq!(slots, vec![Slot(0), Slot(1), Slot(2)]);
    assert_eq!(registry.encoded_map(), "ccc");
}

#[test]
fn test_absent_device_keeps_its_slot_across_restart() {
    let dir = TempDir::new().unwrap();
    {
        let mut registry = open_registry(&dir);
        discovery_pass(&mut registry, &["dev_a", "dev_b"]);
    }

    // restart: only dev_b answers discovery
    let mut registry = open_registry(&dir);
    let slots = discovery_pass(&mut registry, &["dev_b"]);
    assert_eq!(slots, vec![Slot(1)]);
    // dev_a's slot is unconfirmed, not freed
    assert_eq!(registry.encoded_map(), "uc");
    assert_eq!(registry.slot_of("dev_a"), Some(Slot(0)));

    // dev_a comes back in a later pass and lands where it was
    let slots = discovery_pass(&mut registry, &["dev_a", "dev_b"]);
    assert_eq!(slots, vec![Slot(0), Slot(1)]);
    assert_eq!(registry.encoded_map(), "cc");
}

#[test]
fn test_slots_are_stable_across_many_restarts() {
    let dir = TempDir::new().unwrap();
    let first = {
        let mut registry = open_registry(&dir);
        discovery_pass(&mut registry, &["dev_a", "dev_b", "dev_c"])
    };

    for _ in 0..3 {
        let mut registry = open_registry(&dir);
        // discovery order changes between runs; slots must not
        let again = discovery_pass(&mut registry, &["dev_c", "dev_a", "dev_b"]);
        assert_eq!(again, vec![first[2], first[0], first[1]]);
    }
}

#[test]
fn test_new_device_takes_the_leftmost_freed_gap() {
    let dir = TempDir::new().unwrap();
    let mut registry = open_registry(&dir);
    discovery_pass(&mut registry, &["dev_a", "dev_b", "dev_c"]);

    assert_eq!(registry.forget("dev_b"), Some(Slot(1)));
    assert_eq!(registry.encoded_map(), "cfc");

    let mut slots = discovery_pass(&mut registry, &["dev_a", "dev_c", "dev_d"]);
    assert_eq!(slots.pop(), Some(Slot(1)));
    assert_eq!(registry.encoded_map(), "ccc");
}

#[test]
fn test_forget_survives_restart() {
    let dir = TempDir::new().unwrap();
    {
        let mut registry = open_registry(&dir);
        discovery_pass(&mut registry, &["dev_a", "dev_b"]);
        registry.forget("dev_a");
    }

    let mut registry = open_registry(&dir);
    assert_eq!(registry.slot_of("dev_a"), None);
    // a truly new identity may now take slot 0
    let slots = discovery_pass(&mut registry, &["dev_b", "dev_x"]);
    assert_eq!(slots, vec![Slot(1), Slot(0)]);
}

#[test]
fn test_out_of_bounds_binding_is_discarded() {
    let dir = TempDir::new().unwrap();
    {
        let store = EndpointStore::open(dir.path().join("endpoints.redb")).unwrap();
        let mut registry = EndpointRegistry::with_store(store.clone(), CAPACITY);
        discovery_pass(&mut registry, &["dev_a"]);
        // a binding pointing far past the persisted map, as a corrupt or
        // truncated store would leave behind
        store.save_binding("ghost", 40).unwrap();
    }

    let mut registry = open_registry(&dir);
    let slots = discovery_pass(&mut registry, &["dev_a", "ghost"]);
    assert_eq!(slots[0], Slot(0));
    // the stale binding was dropped and ghost got a real allocation
    assert_eq!(slots[1], Slot(1));
    assert_eq!(registry.slot_count(), 2);
}

#[test]
fn test_aliased_bindings_do_not_share_a_slot() {
    let dir = TempDir::new().unwrap();
    {
        let store = EndpointStore::open(dir.path().join("endpoints.redb")).unwrap();
        let mut registry = EndpointRegistry::with_store(store.clone(), CAPACITY);
        discovery_pass(&mut registry, &["dev_a"]);
        // corrupt store: second identity bound to dev_a's slot
        store.save_binding("dev_b", 0).unwrap();
    }

    let mut registry = open_registry(&dir);
    let slots = discovery_pass(&mut registry, &["dev_a", "dev_b"]);
    assert_eq!(slots[0], Slot(0));
    assert_ne!(slots[1], slots[0]);
}

#[test]
fn test_capacity_exhaustion_is_an_error_not_a_panic() {
    let mut registry = EndpointRegistry::in_memory(2);
    registry.begin_pass();
    registry.assign("dev_a").unwrap();
    registry.assign("dev_b").unwrap();
    let err = registry.assign("dev_c").unwrap_err();
    assert!(err.to_string().contains("capacity"));
    // the full map is untouched by the failed allocation
    assert_eq!(registry.encoded_map(), "cc");
}

#[test]
fn test_in_memory_registry_forgets_on_restart() {
    let mut registry = EndpointRegistry::in_memory(CAPACITY);
    discovery_pass(&mut registry, &["dev_a", "dev_b"]);
    drop(registry);

    let mut registry = EndpointRegistry::in_memory(CAPACITY);
    let slots = discovery_pass(&mut registry, &["dev_b"]);
    // without a store there is nothing to be stable against
    assert_eq!(slots, vec![Slot(0)]);
}

#[test]
fn test_persisted_store_shared_with_a_second_component() {
    let dir = TempDir::new().unwrap();
    let store = EndpointStore::open(dir.path().join("endpoints.redb")).unwrap();

    let mut registry = EndpointRegistry::with_store(Arc::clone(&store), CAPACITY);
    discovery_pass(&mut registry, &["dev_a"]);

    // another component reading the same store sees the committed state
    assert_eq!(store.load_slot_map().unwrap().as_deref(), Some("c"));
    assert_eq!(store.load_binding("dev_a").unwrap(), Some(0));
}
