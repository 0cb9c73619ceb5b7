/// Unit tests for ResourceRegistry

use super::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use crate::impl_resource;
use crate::resource::Buffer;
use crate::test_support::mock_context;

struct Counter {
    name: String,
    value: u32,
}

impl_resource!(Counter);

struct Other {
    name: String,
}

impl_resource!(Other);

struct DropTracked {
    name: String,
    drops: Arc<AtomicUsize>,
}

impl_resource!(DropTracked);

impl Drop for DropTracked {
    fn drop(&mut self) {
        self.drops.fetch_add(1, AtomicOrdering::SeqCst);
    }
}

fn counters(registry: &mut ResourceRegistry, count: u32, name: &str) -> Vec<ResourceHandle<Counter>> {
    registry
        .create_resources(count, name, |index, member| Ok(Counter { name: member.to_string(), value: index * 10 }))
        .unwrap()
}

fn pass_with(registry: &mut ResourceRegistry, name: &str, reads: &[&str], writes: &[&str]) -> PassId {
    let id = PassId::new();
    let declaration = DependencyDeclaration::new(reads.iter().copied(), writes.iter().copied());
    registry.register_pass(id, name, &declaration).unwrap();
    id
}

// ============================================================================
// Creation Tests
// ============================================================================

#[test]
fn test_create_resources_member_names() {
    let mut registry = ResourceRegistry::new();
    counters(&mut registry, 3, "Ubo");
    counters(&mut registry, 1, "Global");

    assert_eq!(registry.get::<Counter>("Ubo", 0).unwrap().name(), "Ubo #0");
    assert_eq!(registry.get::<Counter>("Ubo", 2).unwrap().name(), "Ubo #2");
    assert_eq!(registry.get::<Counter>("Global", 0).unwrap().name(), "Global");
    assert_eq!(registry.len(), 4);
}

#[test]
fn test_create_resources_records_group() {
    let mut registry = ResourceRegistry::new();
    counters(&mut registry, 2, "A");
    counters(&mut registry, 3, "B");

    assert_eq!(registry.group("A"), Some(ResourceGroup { base: 0, count: 2 }));
    assert_eq!(registry.group("B"), Some(ResourceGroup { base: 2, count: 3 }));
    assert!(registry.contains("A"));
    assert!(!registry.contains("C"));
}

#[test]
fn test_create_resources_handles_resolve() {
    let mut registry = ResourceRegistry::new();
    let handles = counters(&mut registry, 2, "Ubo");

    assert_eq!(handles.len(), 2);
    assert_eq!(handles[1].get(&registry).unwrap().value, 10);
    assert_eq!(handles[0].index(), 0);
}

#[test]
fn test_create_resources_zero_count_rejected() {
    let mut registry = ResourceRegistry::new();
    let result = registry.create_resources(0, "Empty", |_, member| Ok(Other { name: member.to_string() }));

    assert!(matches!(result, Err(Error::InvalidResource(_))));
}

#[test]
fn test_duplicate_group_rejected() {
    let mut registry = ResourceRegistry::new();
    counters(&mut registry, 1, "Ubo");
    let result = registry.create_resources(2, "Ubo", |_, member| Ok(Other { name: member.to_string() }));

    assert!(matches!(result, Err(Error::InvalidResource(_))));
    // The original group is untouched
    assert!(registry.get::<Counter>("Ubo", 0).is_ok());
    assert_eq!(registry.len(), 1);
}

#[test]
fn test_factory_failure_rolls_back() {
    let mut registry = ResourceRegistry::new();
    let drops = Arc::new(AtomicUsize::new(0));

    let result = registry.create_resources(3, "Tracked", |index, member| {
        if index == 2 {
            return Err(Error::BackendError("boom".to_string()));
        }
        Ok(DropTracked { name: member.to_string(), drops: Arc::clone(&drops) })
    });

    assert_eq!(result.unwrap_err(), Error::BackendError("boom".to_string()));
    assert_eq!(drops.load(AtomicOrdering::SeqCst), 2);
    assert!(!registry.contains("Tracked"));
    assert_eq!(registry.slot_count(), 0);
}

#[test]
fn test_create_resource_single() {
    let mut registry = ResourceRegistry::new();
    let handle = registry
        .create_resource("Camera", |name| Ok(Counter { name: name.to_string(), value: 7 }))
        .unwrap();

    assert_eq!(registry.resolve(&handle).unwrap().value, 7);
    assert_eq!(registry.group("Camera").unwrap().count, 1);
}

// ============================================================================
// Lookup Tests
// ============================================================================

#[test]
fn test_frame_index_wraps_modulo_count() {
    let mut registry = ResourceRegistry::new();
    counters(&mut registry, 1, "Pad");
    counters(&mut registry, 3, "Ring");
    let group = registry.group("Ring").unwrap();

    for frame_index in 0..20 {
        let expected = group.base + (frame_index % 3) as u32;
        assert_eq!(group.index_for(frame_index), expected);
        let resource = registry.get::<Counter>("Ring", frame_index).unwrap();
        assert_eq!(resource.value, (frame_index % 3) as u32 * 10);
        // Stable across repeated calls
        let again = registry.get::<Counter>("Ring", frame_index).unwrap();
        assert!(std::ptr::eq(resource, again));
    }
}

#[test]
fn test_global_resource_ignores_frame_index() {
    let mut registry = ResourceRegistry::new();
    counters(&mut registry, 1, "Global");

    let first = registry.get::<Counter>("Global", 0).unwrap() as *const Counter;
    let later = registry.get::<Counter>("Global", 5).unwrap() as *const Counter;
    assert_eq!(first, later);
}

#[test]
fn test_get_by_index_out_of_range() {
    let mut registry = ResourceRegistry::new();
    counters(&mut registry, 2, "Ubo");

    assert_eq!(
        registry.get_by_index::<Counter>(5).err(),
        Some(Error::OutOfRange { index: 5, len: 2 })
    );
}

#[test]
fn test_get_type_mismatch() {
    let mut registry = ResourceRegistry::new();
    counters(&mut registry, 1, "Ubo");

    match registry.get::<Other>("Ubo", 0) {
        Err(Error::TypeMismatch { name, expected }) => {
            assert_eq!(name, "Ubo");
            assert!(expected.ends_with("Other"));
        }
        other => panic!("expected TypeMismatch, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_get_unknown_name() {
    let registry = ResourceRegistry::new();

    assert_eq!(
        registry.get::<Counter>("Missing", 0).err(),
        Some(Error::ResourceNotFound("Missing".to_string()))
    );
}

#[test]
fn test_find_distinguishes_missing_from_mismatch() {
    let mut registry = ResourceRegistry::new();
    counters(&mut registry, 1, "Ubo");

    assert!(registry.find::<Counter>("Missing", 0).unwrap().is_none());
    assert_eq!(registry.find::<Counter>("Ubo", 0).unwrap().map(|c| c.value), Some(0));
    assert!(matches!(registry.find::<Other>("Ubo", 0), Err(Error::TypeMismatch { .. })));
}

#[test]
fn test_get_mut_modifies_member() {
    let mut registry = ResourceRegistry::new();
    counters(&mut registry, 2, "Ubo");

    registry.get_mut::<Counter>("Ubo", 1).unwrap().value = 99;

    assert_eq!(registry.get::<Counter>("Ubo", 1).unwrap().value, 99);
    assert_eq!(registry.get::<Counter>("Ubo", 0).unwrap().value, 0);
}

#[test]
fn test_global_resource_handle() {
    let mut registry = ResourceRegistry::new();
    counters(&mut registry, 2, "Ubo");

    let handle = registry.get_global_resource_handle::<Counter>("Ubo", 3).unwrap();
    assert_eq!(handle.get(&registry).unwrap().name(), "Ubo #1");

    assert!(matches!(
        registry.get_global_resource_handle::<Counter>("Missing", 0),
        Err(Error::ResourceNotFound(_))
    ));
    assert!(matches!(
        registry.get_global_resource_handle::<Other>("Ubo", 0),
        Err(Error::TypeMismatch { .. })
    ));
}

// ============================================================================
// Handle resolution Tests
// ============================================================================

#[test]
fn test_invalid_handle_does_not_resolve() {
    let registry = ResourceRegistry::new();
    let handle = ResourceHandle::<Counter>::invalid();

    assert!(matches!(registry.resolve(&handle), Err(Error::StaleHandle(_))));
}

#[test]
fn test_handle_from_other_registry_rejected() {
    let mut first = ResourceRegistry::new();
    let mut second = ResourceRegistry::new();
    let handle = counters(&mut first, 1, "Ubo")[0];
    counters(&mut second, 1, "Ubo");

    assert_ne!(first.graph_id(), second.graph_id());
    assert!(matches!(second.resolve(&handle), Err(Error::StaleHandle(_))));
}

#[test]
fn test_resolve_mut() {
    let mut registry = ResourceRegistry::new();
    let handle = counters(&mut registry, 1, "Ubo")[0];

    handle.get_mut(&mut registry).unwrap().value = 5;

    assert_eq!(handle.get(&registry).unwrap().value, 5);
}

// ============================================================================
// Removal Tests
// ============================================================================

#[test]
fn test_remove_resource_compacts_group() {
    let mut registry = ResourceRegistry::new();
    let mut handles = counters(&mut registry, 4, "Ring");
    let before: Vec<u32> = (0..4).map(|i| registry.get::<Counter>("Ring", i).unwrap().value).collect();
    assert_eq!(before, vec![0, 10, 20, 30]);

    registry.remove_resource(&mut handles[1]).unwrap();

    assert!(!handles[1].is_valid());
    assert_eq!(registry.group("Ring").unwrap().count, 3);
    let after: Vec<u32> = (0..3).map(|i| registry.get::<Counter>("Ring", i).unwrap().value).collect();
    assert_eq!(after, vec![0, 20, 30]);
    let names: Vec<String> = (0..3).map(|i| registry.get::<Counter>("Ring", i).unwrap().name.clone()).collect();
    assert_eq!(names, vec!["Ring #0", "Ring #2", "Ring #3"]);
}

#[test]
fn test_remove_resource_destroys_member() {
    let mut registry = ResourceRegistry::new();
    let drops = Arc::new(AtomicUsize::new(0));
    let mut handles = registry
        .create_resources(2, "Tracked", |_, member| {
            Ok(DropTracked { name: member.to_string(), drops: Arc::clone(&drops) })
        })
        .unwrap();

    registry.remove_resource(&mut handles[0]).unwrap();

    assert_eq!(drops.load(AtomicOrdering::SeqCst), 1);
    assert_eq!(registry.len(), 1);
}

#[test]
fn test_remove_resource_staleness() {
    let mut registry = ResourceRegistry::new();
    let mut handles = counters(&mut registry, 3, "Ring");

    registry.remove_resource(&mut handles[0]).unwrap();

    // Shifted and vacated slots changed generation
    assert!(matches!(registry.resolve(&handles[1]), Err(Error::StaleHandle(_))));
    assert!(matches!(registry.resolve(&handles[2]), Err(Error::StaleHandle(_))));
    // Removing through an invalidated handle fails
    assert!(registry.remove_resource(&mut handles[0]).is_err());
    // Fresh handles resolve
    let fresh = registry.get_global_resource_handle::<Counter>("Ring", 0).unwrap();
    assert_eq!(fresh.get(&registry).unwrap().value, 10);
}

#[test]
fn test_remove_resource_leaves_other_groups() {
    let mut registry = ResourceRegistry::new();
    let mut ring = counters(&mut registry, 2, "Ring");
    let other = counters(&mut registry, 1, "Other")[0];

    registry.remove_resource(&mut ring[1]).unwrap();

    assert_eq!(other.get(&registry).unwrap().name(), "Other");
}

#[test]
fn test_remove_last_member_drops_group() {
    let mut registry = ResourceRegistry::new();
    let mut handle = counters(&mut registry, 1, "Solo")[0];

    registry.remove_resource(&mut handle).unwrap();

    assert!(!registry.contains("Solo"));
    assert!(registry.find::<Counter>("Solo", 0).unwrap().is_none());
}

#[test]
fn test_remove_group_and_reuse_slots() {
    let mut registry = ResourceRegistry::new();
    let old = counters(&mut registry, 2, "First");
    counters(&mut registry, 1, "Second");

    registry.remove_group("First").unwrap();
    assert!(!registry.contains("First"));
    assert_eq!(registry.len(), 1);

    // A group that fits the vacated run reuses it
    counters(&mut registry, 2, "Third");
    assert_eq!(registry.group("Third"), Some(ResourceGroup { base: 0, count: 2 }));
    assert_eq!(registry.slot_count(), 3);

    // Old handles stay stale even though their slots are occupied again
    assert!(matches!(registry.resolve(&old[0]), Err(Error::StaleHandle(_))));
}

#[test]
fn test_vacant_tail_is_extended() {
    let mut registry = ResourceRegistry::new();
    counters(&mut registry, 1, "First");
    counters(&mut registry, 1, "Second");
    registry.remove_group("Second").unwrap();

    counters(&mut registry, 3, "Third");

    assert_eq!(registry.group("Third"), Some(ResourceGroup { base: 1, count: 3 }));
    assert_eq!(registry.slot_count(), 4);
}

// ============================================================================
// Access control Tests
// ============================================================================

#[test]
fn test_get_resource_handle_requires_declared_read() {
    let mut registry = ResourceRegistry::new();
    counters(&mut registry, 2, "X");
    let reader = pass_with(&mut registry, "Reader", &["X"], &[]);
    let stranger = pass_with(&mut registry, "Stranger", &[], &[]);

    let handle = registry.get_resource_handle::<Counter>("X", reader, 1).unwrap();
    assert_eq!(handle.get(&registry).unwrap().name(), "X #1");

    assert_eq!(
        registry.get_resource_handle::<Counter>("X", stranger, 0).err(),
        Some(Error::AccessDenied { pass: "Stranger".to_string(), resource: "X".to_string() })
    );
}

#[test]
fn test_write_declaration_does_not_grant_read() {
    let mut registry = ResourceRegistry::new();
    counters(&mut registry, 1, "X");
    let writer = pass_with(&mut registry, "Writer", &[], &["X"]);

    assert!(matches!(
        registry.get_resource_handle::<Counter>("X", writer, 0),
        Err(Error::AccessDenied { .. })
    ));
    assert!(registry.bind_output::<Counter>("X", writer, 0).is_ok());
}

#[test]
fn test_unknown_pass_rejected() {
    let mut registry = ResourceRegistry::new();
    counters(&mut registry, 1, "X");

    assert!(matches!(
        registry.get_resource_handle::<Counter>("X", PassId::new(), 0),
        Err(Error::PassNotFound(_))
    ));
}

#[test]
fn test_duplicate_pass_registration_rejected() {
    let mut registry = ResourceRegistry::new();
    let id = PassId::new();
    registry.register_pass(id, "P", &DependencyDeclaration::default()).unwrap();

    assert!(registry.register_pass(id, "P", &DependencyDeclaration::default()).is_err());
}

#[test]
fn test_access_table_records_and_repairs() {
    let mut registry = ResourceRegistry::new();
    let mut ring = counters(&mut registry, 3, "Ring");
    let reader = pass_with(&mut registry, "Reader", &["Ring"], &[]);

    for frame_index in 0..3 {
        registry.get_resource_handle::<Counter>("Ring", reader, frame_index).unwrap();
    }
    assert_eq!(registry.pass_reads(reader, "Ring"), Some(&[0u32, 1, 2][..]));

    registry.remove_resource(&mut ring[0]).unwrap();

    assert_eq!(registry.pass_reads(reader, "Ring"), Some(&[0u32, 1][..]));
    assert_eq!(registry.get_by_index::<Counter>(0).unwrap().value, 10);
}

#[test]
fn test_write_table_repaired_on_removal() {
    let mut registry = ResourceRegistry::new();
    counters(&mut registry, 2, "Pad");
    let mut out = counters(&mut registry, 3, "Out");
    counters(&mut registry, 1, "Tail");
    let writer = pass_with(&mut registry, "Writer", &[], &["Out", "Tail"]);
    let base = registry.group("Out").unwrap().base;
    let tail = registry.group("Tail").unwrap().base;

    for frame_index in 0..3 {
        registry.bind_output::<Counter>("Out", writer, frame_index).unwrap();
    }
    registry.bind_output::<Counter>("Tail", writer, 0).unwrap();
    assert_eq!(registry.pass_writes(writer, "Out"), Some(&[base, base + 1, base + 2][..]));

    registry.remove_resource(&mut out[1]).unwrap();

    assert_eq!(registry.pass_writes(writer, "Out"), Some(&[base, base + 1][..]));
    assert_eq!(registry.pass_writes(writer, "Tail"), Some(&[tail][..]));
    assert_eq!(registry.pass_reads(writer, "Out"), None);
    assert_eq!(registry.get_by_index::<Counter>(base + 1).unwrap().value, 20);
}

// ============================================================================
// Per-frame buffer Tests
// ============================================================================

#[test]
fn test_ubo_per_frame_payloads_do_not_mix() {
    let (_device, ctx) = mock_context();
    let mut registry = ResourceRegistry::new();
    registry
        .create_resources(2, "Ubo", |_, name| Buffer::uniform::<[f32; 4]>(&ctx, name))
        .unwrap();

    registry.get::<Buffer>("Ubo", 0).unwrap().write_pod(&[1.0f32, 2.0, 3.0, 4.0]).unwrap();
    registry.get::<Buffer>("Ubo", 1).unwrap().write_pod(&[5.0f32, 6.0, 7.0, 8.0]).unwrap();

    let read = |frame_index: usize| -> [f32; 4] {
        let bytes = registry.get::<Buffer>("Ubo", frame_index).unwrap().read(0, 16).unwrap();
        bytemuck::pod_read_unaligned(&bytes)
    };
    assert_eq!(read(0), [1.0, 2.0, 3.0, 4.0]);
    assert_eq!(read(1), [5.0, 6.0, 7.0, 8.0]);
    // Frame 2 wraps to slot 0
    assert_eq!(read(2), [1.0, 2.0, 3.0, 4.0]);
}

#[test]
fn test_registry_drop_destroys_backend_objects() {
    let (device, ctx) = mock_context();
    let mut registry = ResourceRegistry::new();
    registry
        .create_resources(2, "Ubo", |_, name| Buffer::uniform::<[f32; 4]>(&ctx, name))
        .unwrap();
    assert_eq!(device.live_count(crate::graphics_device::mock_graphics_device::ObjectKind::Buffer), 2);

    drop(registry);
    assert_eq!(device.live_count(crate::graphics_device::mock_graphics_device::ObjectKind::Buffer), 0);
}
