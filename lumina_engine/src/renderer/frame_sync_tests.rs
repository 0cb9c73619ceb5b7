/// Unit tests for FrameSync

use super::*;
use crate::graphics_device::mock_graphics_device::{MockEvent, MockGraphicsDevice, MockSwapchain};
use crate::graphics_device::{Extent2D, GraphicsDevice};
use crate::resource::CommandBuffer;
use crate::test_support::mock_context;

struct Harness {
    device: MockGraphicsDevice,
    registry: ResourceRegistry,
    swapchain: MockSwapchain,
    sync: FrameSync,
    command_buffers: Vec<ResourceHandle<CommandBuffer>>,
    render_done: Vec<ResourceHandle<Semaphore>>,
}

fn harness(image_count: usize) -> Harness {
    let (device, ctx) = mock_context();
    let mut registry = ResourceRegistry::new();
    let swapchain = device.create_swapchain(image_count, Extent2D::new(640, 480));
    let sync = FrameSync::new(&ctx, &mut registry, image_count).unwrap();
    let frames = ctx.max_frames_in_flight() as u32;
    let command_buffers = registry
        .create_resources(frames, "Frame Command Buffer", |_, name| CommandBuffer::new(&ctx, name))
        .unwrap();
    let render_done = registry
        .create_resources(frames, "Render Done", |_, name| Semaphore::new(&ctx, name))
        .unwrap();
    Harness { device, registry, swapchain, sync, command_buffers, render_done }
}

/// One renderer-style frame: acquire, claim, record, submit, fence, present
fn run_frame(h: &mut Harness) -> u32 {
    let image_index = match h.sync.begin_frame(&mut h.swapchain, &h.registry).unwrap() {
        FrameBegin::Ready { image_index, .. } => image_index,
        FrameBegin::OutOfDate => panic!("unexpected out-of-date swapchain"),
    };
    h.sync.claim_image(image_index, &h.registry).unwrap();

    let slot = h.sync.current_frame();
    let cb = h.command_buffers[slot].get(&h.registry).unwrap();
    let done = h.render_done[slot].get(&h.registry).unwrap().handle();
    cb.begin().unwrap();
    cb.draw(3, 0).unwrap();
    cb.end().unwrap();
    let acquired = h.sync.image_available_semaphore(&h.registry).unwrap();
    cb.submit(&[acquired], &[done], None).unwrap();
    h.sync.submit_frame_fence(&h.registry).unwrap();

    let result = h.sync.end_frame(&mut h.swapchain, image_index, &[done]).unwrap();
    assert_eq!(result, PresentResult::Presented);
    h.sync.advance();
    image_index
}

// ============================================================================
// Creation Tests
// ============================================================================

#[test]
fn test_new_creates_slot_groups() {
    let h = harness(3);

    assert_eq!(h.registry.group(FRAME_FENCE_GROUP).unwrap().count, 2);
    assert_eq!(h.registry.group(IMAGE_AVAILABLE_GROUP).unwrap().count, 2);
    assert_eq!(h.sync.images_in_flight(), &[None, None, None]);
    assert_eq!(h.sync.current_frame(), 0);

    // Fences start signaled so the first wait of each slot returns at once
    let fence = h.sync.frame_fence(&h.registry).unwrap().handle();
    assert!(h.device.fence_signaled(fence));
}

// ============================================================================
// Frame Begin Tests
// ============================================================================

#[test]
fn test_begin_frame_waits_fence_before_acquire() {
    let mut h = harness(3);
    h.device.clear_events();
    let fence = h.sync.frame_fence(&h.registry).unwrap().handle();
    let semaphore = h.sync.image_available_semaphore(&h.registry).unwrap();

    let begin = h.sync.begin_frame(&mut h.swapchain, &h.registry).unwrap();

    assert_eq!(begin, FrameBegin::Ready { image_index: 0, suboptimal: false });
    let events = h.device.events();
    let wait = events.iter().position(|e| *e == MockEvent::WaitFences(vec![fence])).unwrap();
    let acquire = events
        .iter()
        .position(|e| *e == MockEvent::Acquire { semaphore, image_index: 0 })
        .unwrap();
    assert!(wait < acquire);
    h.device.wait_idle().unwrap();
}

#[test]
fn test_begin_frame_reports_out_of_date() {
    let mut h = harness(3);
    h.device.set_acquire_out_of_date(true);

    assert_eq!(h.sync.begin_frame(&mut h.swapchain, &h.registry).unwrap(), FrameBegin::OutOfDate);
    let semaphore = h.sync.image_available_semaphore(&h.registry).unwrap();
    assert!(!h.device.semaphore_signaled(semaphore));
}

// ============================================================================
// Image Claim Tests
// ============================================================================

#[test]
fn test_claim_image_waits_previous_owner() {
    // One swapchain image shared by two frame slots
    let mut h = harness(1);
    run_frame(&mut h);
    let slot0_fence = h.sync.frame_fences[0].get(&h.registry).unwrap().handle();
    assert!(!h.device.fence_signaled(slot0_fence));

    let image_index = match h.sync.begin_frame(&mut h.swapchain, &h.registry).unwrap() {
        FrameBegin::Ready { image_index, .. } => image_index,
        FrameBegin::OutOfDate => panic!("unexpected out-of-date swapchain"),
    };
    h.device.clear_events();
    h.sync.claim_image(image_index, &h.registry).unwrap();

    assert_eq!(h.device.events(), vec![MockEvent::WaitFences(vec![slot0_fence])]);
    assert!(h.device.fence_signaled(slot0_fence));
    let slot1_fence = h.sync.frame_fence(&h.registry).unwrap().handle();
    assert_eq!(h.sync.images_in_flight(), &[Some(slot1_fence)]);
    h.device.wait_idle().unwrap();
}

#[test]
fn test_claim_image_out_of_range() {
    let mut h = harness(2);

    assert_eq!(
        h.sync.claim_image(5, &h.registry),
        Err(Error::OutOfRange { index: 5, len: 2 })
    );
}

// ============================================================================
// Pipelining Tests
// ============================================================================

#[test]
fn test_slot_fence_waited_before_rerecording() {
    let mut h = harness(3);
    let fences: Vec<NativeHandle> = h.sync.frame_fences
        .iter()
        .map(|f| f.get(&h.registry).unwrap().handle())
        .collect();
    let cbs: Vec<NativeHandle> = h.command_buffers
        .iter()
        .map(|c| c.get(&h.registry).unwrap().handle())
        .collect();
    h.device.clear_events();

    let images: Vec<u32> = (0..9).map(|_| run_frame(&mut h)).collect();

    assert_eq!(images, vec![0, 1, 2, 0, 1, 2, 0, 1, 2]);
    assert_eq!(h.sync.frame_number(), 9);
    assert_eq!(h.sync.current_frame(), 1);

    // Between a slot's submission and the next begin of its command buffer
    // the slot's fence is waited
    let events = h.device.events();
    for (slot, cb) in cbs.iter().enumerate() {
        let mut submitted = false;
        for event in &events {
            match event {
                MockEvent::Submit(info) if info.command_buffers.contains(cb) => submitted = true,
                MockEvent::WaitFences(waited) if waited.contains(&fences[slot]) => submitted = false,
                MockEvent::BeginCommandBuffer(begun) if begun == cb => {
                    assert!(!submitted, "slot {} re-recorded before its fence wait", slot);
                }
                _ => {}
            }
        }
    }
    h.device.wait_idle().unwrap();
}

#[test]
fn test_frame_fence_submitted_after_work() {
    let mut h = harness(3);
    h.device.clear_events();

    run_frame(&mut h);

    let submissions = h.device.submissions();
    assert_eq!(submissions.len(), 2);
    assert_eq!(submissions[0].fence, None);
    assert!(submissions[1].command_buffers.is_empty());
    assert_eq!(submissions[1].fence, Some(h.sync.frame_fences[0].get(&h.registry).unwrap().handle()));
    h.device.wait_idle().unwrap();
}

// ============================================================================
// Reset Tests
// ============================================================================

#[test]
fn test_reset_restarts_at_slot_zero() {
    let mut h = harness(3);
    run_frame(&mut h);
    assert_eq!(h.sync.current_frame(), 1);
    h.device.wait_idle().unwrap();

    h.sync.reset(4);

    assert_eq!(h.sync.current_frame(), 0);
    assert_eq!(h.sync.images_in_flight(), &[None, None, None, None]);
    assert_eq!(h.sync.frame_number(), 1);
}
