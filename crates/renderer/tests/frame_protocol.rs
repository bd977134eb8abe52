//! Integration tests for the frame protocol, driven by the headless backend.

use std::time::Duration;

use glam::Vec3;
use gpuframe_core::RendererConfig;
use gpuframe_renderer::{
    DrawableAsset, FrameState, Pass, PassConstants, Renderer, RendererError,
};
use gpuframe_rhi::headless::{Headless, HeadlessCommand, HeadlessWindow};
use gpuframe_rhi::{
    Device as _, Extent2D, ResourceState, RhiError, ScissorRect, Vertex, Viewport,
};
use proptest::prelude::*;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("gpuframe=debug")
        .try_init();
}

fn renderer_with(config: RendererConfig) -> (HeadlessWindow, Renderer<Headless>) {
    init_tracing();
    let window = HeadlessWindow::new(1280, 720);
    let renderer = Renderer::<Headless>::init(window.clone(), 1280, 720, config)
        .expect("Failed to initialize headless renderer");
    (window, renderer)
}

fn renderer() -> (HeadlessWindow, Renderer<Headless>) {
    renderer_with(RendererConfig::default())
}

fn run_frame(renderer: &mut Renderer<Headless>, constants: &PassConstants) {
    renderer.new_frame().unwrap();
    renderer.update_pass_constants(constants).unwrap();
    renderer.execute_command_list().unwrap();
    renderer.end_frame().unwrap();
}

fn camera(extent: Extent2D) -> PassConstants {
    PassConstants::look_at(
        Vec3::new(0.0, 2.0, 5.0),
        Vec3::ZERO,
        60.0_f32.to_radians(),
        extent,
        0.1,
        100.0,
    )
}

#[test]
fn test_single_frame_cycle() {
    let (_window, mut renderer) = renderer();
    assert_eq!(renderer.state(), FrameState::Idle);
    let count = renderer.back_buffer_count();
    let index = renderer.current_back_buffer_index();

    let constants = camera(renderer.extent());
    run_frame(&mut renderer, &constants);

    assert_eq!(renderer.state(), FrameState::Idle);
    assert_eq!(renderer.fence_value(), 1);
    assert_eq!(renderer.frame_number(), 1);
    assert_eq!(renderer.current_back_buffer_index(), (index + 1) % count);
}

#[test]
fn test_frame_preamble_and_present_transition() {
    let (_window, mut renderer) = renderer();
    let back_buffer = renderer.current_back_buffer_view().unwrap();

    renderer.new_frame().unwrap();
    renderer.execute_command_list().unwrap();
    renderer.flush_command_queue().unwrap();
    renderer.end_frame().unwrap();

    let executed = renderer.device().take_executed_lists();
    assert_eq!(executed.len(), 1);
    let commands = &executed[0].commands;

    assert_eq!(
        commands[0],
        HeadlessCommand::SetViewports(vec![Viewport::from_extent(Extent2D::new(1280, 720))])
    );
    assert!(commands.contains(&HeadlessCommand::Barrier {
        image: back_buffer.image.raw,
        before: ResourceState::Present,
        after: ResourceState::RenderTarget,
    }));
    assert_eq!(
        commands.last(),
        Some(&HeadlessCommand::Barrier {
            image: back_buffer.image.raw,
            before: ResourceState::RenderTarget,
            after: ResourceState::Present,
        })
    );
    assert!(commands.iter().any(|c| matches!(
        c,
        HeadlessCommand::ClearRenderTarget { handle, .. } if *handle == back_buffer.handle
    )));
}

#[test]
fn test_pass_constants_reach_the_gpu() {
    let (_window, mut renderer) = renderer();
    let constants = camera(renderer.extent()).with_time(1.5, 0.016);

    renderer.new_frame().unwrap();
    renderer.update_pass_constants(&constants).unwrap();
    renderer.execute_command_list().unwrap();
    renderer.flush_command_queue().unwrap();

    let executed = renderer.device().executed_lists();
    let bound: Vec<&[u8]> = executed[0].bound_constants().collect();
    assert_eq!(bound.len(), 1);
    assert_eq!(
        &bound[0][..PassConstants::SIZE],
        bytemuck::bytes_of(&constants)
    );
}

#[test]
fn test_each_frame_slot_binds_its_own_constants() {
    let (_window, mut renderer) = renderer();
    let extent = renderer.extent();
    let first = camera(extent).with_time(1.0, 0.5);
    let second = camera(extent).with_time(2.0, 0.5);

    run_frame(&mut renderer, &first);
    run_frame(&mut renderer, &second);
    renderer.flush_command_queue().unwrap();

    let executed = renderer.device().executed_lists();
    assert_eq!(executed.len(), 2);
    let seen: Vec<PassConstants> = executed
        .iter()
        .map(|list| {
            let bytes = list.bound_constants().next().unwrap();
            bytemuck::pod_read_unaligned(&bytes[..PassConstants::SIZE])
        })
        .collect();
    assert_eq!(seen, vec![first, second]);
}

#[test]
fn test_flush_waits_for_the_gpu() {
    let (_window, mut renderer) = renderer();
    renderer.device().set_gpu_latency(Duration::from_millis(30));

    renderer.new_frame().unwrap();
    renderer.execute_command_list().unwrap();
    renderer.flush_command_queue().unwrap();

    assert_eq!(renderer.state(), FrameState::Submitted(Pass::Frame));
    assert_eq!(renderer.completed_fence_value().unwrap(), renderer.fence_value());
    renderer.end_frame().unwrap();
}

#[test]
fn test_frames_in_flight_bound_the_cpu_lead() {
    let config = RendererConfig {
        frames_in_flight: 2,
        ..RendererConfig::default()
    };
    let (_window, mut renderer) = renderer_with(config);
    renderer.device().set_gpu_latency(Duration::from_millis(5));
    let constants = camera(renderer.extent());

    for _ in 0..6 {
        run_frame(&mut renderer, &constants);
        // The next slot's previous submission has completed.
        let completed = renderer.completed_fence_value().unwrap();
        assert!(completed + 1 >= renderer.fence_value());
    }
    assert_eq!(renderer.fence_value(), 6);
}

#[test]
fn test_end_frame_commits_when_slot_wait_times_out() {
    let config = RendererConfig {
        frames_in_flight: 1,
        fence_timeout_ms: Some(1),
        ..RendererConfig::default()
    };
    let (_window, mut renderer) = renderer_with(config);
    renderer.device().set_gpu_latency(Duration::from_millis(300));
    let count = renderer.back_buffer_count();
    let index = renderer.current_back_buffer_index();

    renderer.new_frame().unwrap();
    renderer.execute_command_list().unwrap();
    let result = renderer.end_frame();
    assert!(matches!(
        result,
        Err(RendererError::Rhi(RhiError::Timeout(1)))
    ));

    // The present happened once; the frame is over despite the failed wait.
    assert_eq!(renderer.state(), FrameState::Idle);
    assert_eq!(renderer.frame_number(), 1);
    assert_eq!(renderer.current_back_buffer_index(), (index + 1) % count);
    assert!(matches!(
        renderer.end_frame(),
        Err(RendererError::InvalidState { .. })
    ));
    assert_eq!(renderer.current_back_buffer_index(), (index + 1) % count);

    // The next frame repeats the wait once the GPU has caught up.
    renderer.device().wait_idle().unwrap();
    run_frame(&mut renderer, &PassConstants::default());
    assert_eq!(renderer.frame_number(), 2);
    assert_eq!(renderer.fence_value(), 2);
}

#[test]
fn test_pass_constants_update_marks_device_lost() {
    let (_window, mut renderer) = renderer();
    renderer.device().simulate_device_loss();

    assert!(matches!(
        renderer.update_pass_constants(&PassConstants::default()),
        Err(RendererError::DeviceLost)
    ));
    assert_eq!(renderer.state(), FrameState::Lost);
}

#[test]
fn test_upload_pass_ends_with_flush() {
    let (_window, mut renderer) = renderer();

    renderer.reset_command_list().unwrap();
    assert_eq!(renderer.state(), FrameState::Recording(Pass::Upload));
    renderer.command_list().unwrap();
    renderer.execute_command_list().unwrap();
    assert!(matches!(
        renderer.end_frame(),
        Err(RendererError::InvalidState { operation: "end_frame", .. })
    ));
    renderer.flush_command_queue().unwrap();

    assert_eq!(renderer.state(), FrameState::Idle);
    assert_eq!(renderer.fence_value(), 1);
    let executed = renderer.device().take_executed_lists();
    assert!(executed[0].commands.is_empty());
}

#[test]
fn test_out_of_order_calls_leave_state_unchanged() {
    let (_window, mut renderer) = renderer();

    assert!(matches!(
        renderer.end_frame(),
        Err(RendererError::InvalidState {
            operation: "end_frame",
            state: FrameState::Idle
        })
    ));
    assert!(matches!(
        renderer.command_list(),
        Err(RendererError::InvalidState { .. })
    ));
    assert!(matches!(
        renderer.execute_command_list(),
        Err(RendererError::InvalidState { .. })
    ));
    assert_eq!(renderer.state(), FrameState::Idle);

    renderer.new_frame().unwrap();
    assert!(matches!(
        renderer.new_frame(),
        Err(RendererError::InvalidState { .. })
    ));
    assert!(matches!(
        renderer.set_size(800, 600),
        Err(RendererError::InvalidState { operation: "set_size", .. })
    ));
    assert_eq!(renderer.state(), FrameState::Recording(Pass::Frame));

    renderer.execute_command_list().unwrap();
    assert!(matches!(
        renderer.update_pass_constants(&PassConstants::default()),
        Err(RendererError::InvalidState { .. })
    ));
    assert_eq!(renderer.state(), FrameState::Submitted(Pass::Frame));
    renderer.end_frame().unwrap();
    assert_eq!(renderer.fence_value(), 1);
}

#[test]
fn test_pass_constants_allowed_while_idle() {
    let (_window, mut renderer) = renderer();
    renderer
        .update_pass_constants(&PassConstants::default())
        .unwrap();
    assert_eq!(renderer.state(), FrameState::Idle);
}

#[test]
fn test_viewport_and_scissor_apply_to_next_frame() {
    let (_window, mut renderer) = renderer();
    let viewport = Viewport {
        x: 10.0,
        y: 20.0,
        width: 320.0,
        height: 240.0,
        min_depth: 0.0,
        max_depth: 1.0,
    };
    let scissor = ScissorRect::from_extent(Extent2D::new(320, 240));
    renderer.set_viewport(viewport);
    renderer.set_scissor_rect(scissor);

    renderer.new_frame().unwrap();
    renderer.execute_command_list().unwrap();
    renderer.flush_command_queue().unwrap();

    let executed = renderer.device().executed_lists();
    assert_eq!(executed[0].commands[0], HeadlessCommand::SetViewports(vec![viewport]));
    assert_eq!(executed[0].commands[1], HeadlessCommand::SetScissorRects(vec![scissor]));
}

#[test]
fn test_drawable_recorded_through_command_list() {
    let (_window, mut renderer) = renderer();
    let vertices = [
        Vertex::new(Vec3::new(-0.5, -0.5, 0.0), Vec3::Z, glam::Vec2::ZERO),
        Vertex::new(Vec3::new(0.5, -0.5, 0.0), Vec3::Z, glam::Vec2::X),
        Vertex::new(Vec3::new(0.0, 0.5, 0.0), Vec3::Z, glam::Vec2::Y),
    ];
    let asset = DrawableAsset::<Headless>::from_geometry(renderer.device(), &vertices, &[0, 1, 2])
        .unwrap();

    renderer.new_frame().unwrap();
    asset.record_draw(renderer.command_list().unwrap()).unwrap();
    renderer.execute_command_list().unwrap();
    renderer.flush_command_queue().unwrap();

    let executed = renderer.device().executed_lists();
    assert_eq!(executed[0].draw_count(), 1);
}

#[test]
fn test_device_loss_is_terminal() {
    let (_window, mut renderer) = renderer();
    run_frame(&mut renderer, &PassConstants::default());

    renderer.device().simulate_device_loss();
    assert!(matches!(renderer.new_frame(), Err(RendererError::DeviceLost)));
    assert_eq!(renderer.state(), FrameState::Lost);

    assert!(matches!(renderer.new_frame(), Err(RendererError::DeviceLost)));
    assert!(matches!(
        renderer.flush_command_queue(),
        Err(RendererError::DeviceLost)
    ));
    assert!(matches!(renderer.set_size(640, 480), Err(RendererError::DeviceLost)));
    assert!(matches!(
        renderer.update_pass_constants(&PassConstants::default()),
        Err(RendererError::DeviceLost)
    ));
    assert!(matches!(renderer.display_modes(), Err(RendererError::DeviceLost)));
    assert_eq!(renderer.fence_value(), 1);
}

#[test]
fn test_device_loss_during_submission() {
    let (_window, mut renderer) = renderer();
    renderer.new_frame().unwrap();
    renderer.device().simulate_device_loss();

    assert!(matches!(
        renderer.execute_command_list(),
        Err(RendererError::DeviceLost)
    ));
    assert!(renderer.state().is_lost());
}

#[test]
fn test_out_of_date_swap_chain_is_recreated() {
    let (window, mut renderer) = renderer();
    window.resize(640, 480);

    run_frame(&mut renderer, &PassConstants::default());

    assert_eq!(renderer.state(), FrameState::Idle);
    assert_eq!(renderer.extent(), Extent2D::new(640, 480));
    assert_eq!(
        renderer.depth_stencil_view().unwrap().extent,
        Extent2D::new(640, 480)
    );
    run_frame(&mut renderer, &PassConstants::default());
    assert_eq!(renderer.fence_value(), 2);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_fence_counts_submissions(frames in 1usize..12, frames_in_flight in 1u32..=3, uploads in 0usize..3) {
        let config = RendererConfig {
            frames_in_flight,
            ..RendererConfig::default()
        };
        let (_window, mut renderer) = renderer_with(config);
        let constants = PassConstants::default();

        let mut submissions = 0u64;
        for _ in 0..uploads {
            renderer.reset_command_list().unwrap();
            renderer.execute_command_list().unwrap();
            renderer.flush_command_queue().unwrap();
            submissions += 1;
            prop_assert_eq!(renderer.fence_value(), submissions);
        }

        let mut previous = renderer.fence_value();
        for _ in 0..frames {
            run_frame(&mut renderer, &constants);
            submissions += 1;
            prop_assert!(renderer.fence_value() > previous);
            prop_assert_eq!(renderer.fence_value(), submissions);
            previous = renderer.fence_value();
        }

        renderer.flush_command_queue().unwrap();
        prop_assert_eq!(renderer.completed_fence_value().unwrap(), submissions);
        prop_assert_eq!(renderer.frame_number(), frames as u64);
    }
}
