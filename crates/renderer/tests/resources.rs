//! Integration tests for size changes, display modes and descriptor registries.

use std::sync::Arc;
use std::time::Duration;

use gpuframe_core::RendererConfig;
use gpuframe_renderer::{FrameState, PassConstants, Renderer, RendererError};
use gpuframe_rhi::headless::{Headless, HeadlessDescriptor, HeadlessWindow};
use gpuframe_rhi::{
    DescriptorHeapKind, Device as _, Extent2D, Format, SamplerDesc, Texture as _, TextureDesc,
    Viewport,
};

fn renderer_with(
    width: u32,
    height: u32,
    config: RendererConfig,
) -> (HeadlessWindow, Renderer<Headless>) {
    let window = HeadlessWindow::new(width, height);
    let renderer = Renderer::<Headless>::init(window.clone(), width, height, config)
        .expect("Failed to initialize headless renderer");
    (window, renderer)
}

fn renderer(width: u32, height: u32) -> (HeadlessWindow, Renderer<Headless>) {
    renderer_with(width, height, RendererConfig::default())
}

fn run_frame(renderer: &mut Renderer<Headless>) {
    renderer.new_frame().unwrap();
    renderer.execute_command_list().unwrap();
    renderer.end_frame().unwrap();
}

fn texture(renderer: &Renderer<Headless>) -> Arc<gpuframe_rhi::headless::HeadlessTexture> {
    Arc::new(
        renderer
            .device()
            .create_texture(&TextureDesc::sampled(Extent2D::new(4, 4), Format::Rgba8Unorm))
            .unwrap(),
    )
}

#[test]
fn test_init_reports_configured_objects() {
    let config = RendererConfig {
        back_buffer_count: 3,
        frames_in_flight: 3,
        ..RendererConfig::default()
    };
    let (_window, renderer) = renderer_with(1280, 720, config);

    assert_eq!(renderer.back_buffer_count(), 3);
    assert_eq!(renderer.frames_in_flight(), 3);
    assert_eq!(renderer.extent(), Extent2D::new(1280, 720));
    assert_eq!(renderer.viewport(), Viewport::from_extent(Extent2D::new(1280, 720)));
    assert_eq!(renderer.current_back_buffer_view().unwrap().extent, Extent2D::new(1280, 720));
    assert_eq!(renderer.depth_stencil_view().unwrap().format(), Format::D32Float);
    assert_eq!(renderer.fence_value(), 0);
    assert!(!renderer.is_full_screen());
}

#[test]
fn test_invalid_config_is_rejected_before_device_creation() {
    let config = RendererConfig {
        frames_in_flight: 0,
        ..RendererConfig::default()
    };
    let result = Renderer::<Headless>::init(HeadlessWindow::new(64, 64), 64, 64, config);
    assert!(matches!(result, Err(RendererError::Config(_))));
}

#[test]
fn test_bad_shader_fails_at_shader_stage() {
    use gpuframe_renderer::{InitStage, ShaderSources};
    use gpuframe_rhi::ShaderSource;

    let shaders = ShaderSources {
        vertex: ShaderSource::wgsl("fn vs_main( {", "vs_main"),
        ..ShaderSources::default()
    };
    let result = Renderer::<Headless>::init_with_shaders(
        HeadlessWindow::new(64, 64),
        64,
        64,
        RendererConfig::default(),
        &shaders,
    );
    match result {
        Err(RendererError::Init { stage, .. }) => assert_eq!(stage, InitStage::Shaders),
        Err(e) => panic!("expected an init error, got {}", e),
        Ok(_) => panic!("expected an init error"),
    }
}

#[test]
fn test_set_size_recreates_targets() {
    let (window, mut renderer) = renderer(1280, 720);
    run_frame(&mut renderer);

    window.resize(1024, 768);
    renderer.set_size(1024, 768).unwrap();

    let extent = Extent2D::new(1024, 768);
    assert_eq!(renderer.state(), FrameState::Idle);
    assert_eq!(renderer.extent(), extent);
    assert_eq!(renderer.current_back_buffer_view().unwrap().extent, extent);
    assert_eq!(renderer.depth_stencil_view().unwrap().extent, extent);
    assert_eq!(renderer.viewport(), Viewport::from_extent(extent));
    assert_eq!(renderer.scissor_rect().width(), 1024);

    // Pending work was flushed before the buffers went away.
    assert_eq!(renderer.completed_fence_value().unwrap(), renderer.fence_value());
    run_frame(&mut renderer);
    assert_eq!(renderer.fence_value(), 2);
}

#[test]
fn test_set_size_restores_pass_constants() {
    let (window, mut renderer) = renderer(800, 600);
    let constants = PassConstants::default().with_time(4.0, 0.25);
    renderer.update_pass_constants(&constants).unwrap();

    window.resize(400, 300);
    renderer.set_size(400, 300).unwrap();

    renderer.new_frame().unwrap();
    renderer.execute_command_list().unwrap();
    renderer.flush_command_queue().unwrap();
    let executed = renderer.device().executed_lists();
    let bound = executed[0].bound_constants().next().unwrap();
    assert_eq!(&bound[..PassConstants::SIZE], bytemuck::bytes_of(&constants));
}

#[test]
fn test_zero_size_is_rejected() {
    let (_window, mut renderer) = renderer(800, 600);
    assert!(matches!(
        renderer.set_size(0, 600),
        Err(RendererError::InvalidArgument(_))
    ));
    assert_eq!(renderer.extent(), Extent2D::new(800, 600));
}

#[test]
fn test_full_screen_round_trip() {
    let config = RendererConfig {
        back_buffer_count: 3,
        ..RendererConfig::default()
    };
    let (_window, mut renderer) = renderer_with(800, 600, config);
    run_frame(&mut renderer);

    renderer.set_full_screen(true).unwrap();
    assert!(renderer.is_full_screen());
    assert_eq!(renderer.extent(), Extent2D::new(2560, 1440));
    assert_eq!(
        renderer.depth_stencil_view().unwrap().extent,
        Extent2D::new(2560, 1440)
    );
    run_frame(&mut renderer);

    renderer.set_full_screen(false).unwrap();
    assert!(!renderer.is_full_screen());
    assert_eq!(renderer.extent(), Extent2D::new(800, 600));
    assert_eq!(renderer.back_buffer_count(), 3);
    run_frame(&mut renderer);
    assert_eq!(renderer.state(), FrameState::Idle);
    assert_eq!(renderer.fence_value(), 3);
}

#[test]
fn test_full_screen_is_idempotent() {
    let (_window, mut renderer) = renderer(800, 600);
    renderer.set_full_screen(false).unwrap();
    assert_eq!(renderer.extent(), Extent2D::new(800, 600));

    renderer.set_full_screen(true).unwrap();
    renderer.set_full_screen(true).unwrap();
    assert_eq!(renderer.extent(), Extent2D::new(2560, 1440));
}

#[test]
fn test_display_modes_are_queried_per_call() {
    let (_window, mut renderer) = renderer(800, 600);
    let modes: Vec<_> = renderer.display_modes().unwrap().collect();
    assert_eq!(modes.len(), 4);
    assert!(modes.iter().any(|m| m.extent() == Extent2D::new(1920, 1080)));

    let mut iter = renderer.display_modes().unwrap();
    assert_eq!(iter.by_ref().count(), 4);
    assert!(iter.next().is_none());
}

#[test]
fn test_textures_fill_slots_in_order() {
    let config = RendererConfig {
        max_textures: 4,
        ..RendererConfig::default()
    };
    let (_window, mut renderer) = renderer_with(256, 256, config);
    let textures: Vec<_> = (0..4).map(|_| texture(&renderer)).collect();

    for (expected, texture) in textures.iter().enumerate() {
        let slot = renderer.add_texture(texture).unwrap();
        assert_eq!(slot, expected as u32);
    }

    for (slot, texture) in textures.iter().enumerate() {
        let resolved = renderer.texture_registry().resolve(slot as u32).unwrap();
        assert!(Arc::ptr_eq(&resolved, texture));
        assert_eq!(
            renderer.texture_heap().descriptor(slot as u32),
            Some(&HeadlessDescriptor::ShaderResource {
                texture: texture.id()
            })
        );
    }

    let extra = texture(&renderer);
    match renderer.add_texture(&extra) {
        Err(RendererError::CapacityExceeded { heap, capacity }) => {
            assert_eq!(heap, DescriptorHeapKind::ShaderResource);
            assert_eq!(capacity, 4);
        }
        other => panic!("expected CapacityExceeded, got {:?}", other),
    }
    assert_eq!(renderer.texture_registry().len(), 4);
    assert_eq!(renderer.texture_heap().occupied(), 4);
}

#[test]
fn test_texture_registry_does_not_own_textures() {
    let (_window, mut renderer) = renderer(256, 256);
    let texture = texture(&renderer);
    let slot = renderer.add_texture(&texture).unwrap();
    assert_eq!(Arc::strong_count(&texture), 1);

    drop(texture);
    assert!(renderer.texture_registry().resolve(slot).is_none());
    assert_eq!(renderer.texture_registry().dangling(), 1);
}

#[test]
fn test_samplers_fill_slots_in_order() {
    let config = RendererConfig {
        max_samplers: 2,
        ..RendererConfig::default()
    };
    let (_window, mut renderer) = renderer_with(256, 256, config);

    assert_eq!(renderer.add_sample(SamplerDesc::point_clamp()).unwrap(), 0);
    assert_eq!(renderer.add_sample(SamplerDesc::anisotropic_wrap(8)).unwrap(), 1);
    assert!(matches!(
        renderer.add_sample(SamplerDesc::default()),
        Err(RendererError::CapacityExceeded {
            heap: DescriptorHeapKind::Sampler,
            capacity: 2
        })
    ));

    assert_eq!(
        renderer.sampler_heap().descriptor(1),
        Some(&HeadlessDescriptor::Sampler(SamplerDesc::anisotropic_wrap(8)))
    );
    assert_eq!(renderer.sampler_registry().get(0), Some(&SamplerDesc::point_clamp()));
}

#[test]
fn test_registration_allowed_mid_frame() {
    let (_window, mut renderer) = renderer(256, 256);
    let texture = texture(&renderer);

    renderer.new_frame().unwrap();
    assert_eq!(renderer.add_texture(&texture).unwrap(), 0);
    assert_eq!(renderer.state(), FrameState::Recording(gpuframe_renderer::Pass::Frame));
    renderer.execute_command_list().unwrap();
    renderer.end_frame().unwrap();
}

#[test]
fn test_drop_flushes_pending_work_and_releases_registries() {
    let (_window, mut renderer) = renderer(256, 256);
    let device = Arc::clone(renderer.device());
    let texture = texture(&renderer);
    renderer.add_texture(&texture).unwrap();
    renderer.add_sample(SamplerDesc::point_clamp()).unwrap();

    device.set_gpu_latency(Duration::from_millis(50));
    renderer.new_frame().unwrap();
    renderer.execute_command_list().unwrap();
    assert_eq!(renderer.state(), FrameState::Submitted(gpuframe_renderer::Pass::Frame));
    assert!(device.executed_lists().is_empty());

    drop(renderer);

    // The submission completed before the renderer let go of its objects.
    assert_eq!(device.executed_lists().len(), 1);
    assert!(!device.is_lost());
    assert_eq!(Arc::strong_count(&texture), 1);
    assert_eq!(texture.desc().extent, Extent2D::new(4, 4));
}

#[test]
fn test_drop_while_recording_and_after_loss() {
    let (_window, mut renderer) = renderer(256, 256);
    renderer.new_frame().unwrap();
    drop(renderer);

    let (_window, mut renderer) = renderer_with(64, 64, RendererConfig::default());
    let device = Arc::clone(renderer.device());
    let texture = texture(&renderer);
    renderer.add_texture(&texture).unwrap();
    device.simulate_device_loss();
    assert!(renderer.new_frame().is_err());
    drop(renderer);

    assert_eq!(Arc::strong_count(&texture), 1);
}
