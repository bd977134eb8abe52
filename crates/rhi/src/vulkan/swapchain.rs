//! Swap chain over `VkSwapchainKHR`.
//!
//! The next image is acquired right after each present and the host waits
//! for the acquisition, so the current back buffer index is always known
//! while recording, as the frame loop expects. Presenting submits an empty
//! batch that signals a per-image semaphore; its signal scope covers every
//! earlier submission, which is exactly the frame's rendering.

use std::sync::Arc;

use ash::vk;
use ash::vk::Handle;
use tracing::{debug, info, trace, warn};

use gpuframe_platform::{VideoMode, Window};

use super::Vulkan;
use super::convert;
use super::device::VulkanDevice;
use super::queue::VulkanQueue;
use crate::backend::{Device as _, SwapChain};
use crate::error::{RhiError, RhiResult};
use crate::types::{DisplayMode, Extent2D, Format, ImageHandle, PresentStatus, SwapChainDesc};

/// What the surface supports for swap chain creation.
#[derive(Clone, Debug)]
pub struct SwapchainSupportDetails {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupportDetails {
    pub fn query(
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
    ) -> RhiResult<Self> {
        // SAFETY: plain queries on a live surface and physical device.
        unsafe {
            Ok(Self {
                capabilities: surface_loader
                    .get_physical_device_surface_capabilities(physical_device, surface)?,
                formats: surface_loader.get_physical_device_surface_formats(physical_device, surface)?,
                present_modes: surface_loader
                    .get_physical_device_surface_present_modes(physical_device, surface)?,
            })
        }
    }
}

pub struct VulkanSwapChain {
    device: Arc<VulkanDevice>,
    window: Window,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    desc: SwapChainDesc,
    color_space: vk::ColorSpaceKHR,
    present_mode: vk::PresentModeKHR,
    current: u32,
    out_of_date: bool,
    acquire_fence: vk::Fence,
    render_finished: Vec<vk::Semaphore>,
    fullscreen: bool,
}

struct Created {
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    desc: SwapChainDesc,
    color_space: vk::ColorSpaceKHR,
    present_mode: vk::PresentModeKHR,
}

impl VulkanSwapChain {
    pub(crate) fn new(
        device: Arc<VulkanDevice>,
        window: Window,
        desc: SwapChainDesc,
    ) -> RhiResult<Self> {
        if desc.extent.is_empty() {
            return Err(RhiError::SwapchainError(format!(
                "cannot create buffers of size {}",
                desc.extent
            )));
        }

        let created = create_swapchain(&device, &desc, vk::SwapchainKHR::null())?;

        // SAFETY: valid device and create info.
        let acquire_fence = unsafe {
            device
                .handle()
                .create_fence(&vk::FenceCreateInfo::default(), None)?
        };

        let mut this = Self {
            device,
            window,
            swapchain: created.swapchain,
            images: Vec::new(),
            desc: created.desc,
            color_space: created.color_space,
            present_mode: created.present_mode,
            current: 0,
            out_of_date: false,
            acquire_fence,
            render_finished: Vec::new(),
            fullscreen: false,
        };
        this.adopt_images(created.images)?;
        this.acquire_next()?;
        Ok(this)
    }

    /// Takes ownership of a new image set and sizes the per-image semaphores.
    fn adopt_images(&mut self, images: Vec<vk::Image>) -> RhiResult<()> {
        let raw = self.device.handle();
        while self.render_finished.len() < images.len() {
            // SAFETY: valid device and create info.
            let semaphore = unsafe { raw.create_semaphore(&vk::SemaphoreCreateInfo::default(), None)? };
            self.render_finished.push(semaphore);
        }
        for semaphore in self.render_finished.drain(images.len()..) {
            // SAFETY: callers idle the device before replacing images.
            unsafe { raw.destroy_semaphore(semaphore, None) };
        }
        self.desc.buffer_count = images.len() as u32;
        self.images = images;
        Ok(())
    }

    fn acquire_next(&mut self) -> RhiResult<()> {
        let loader = self.device.swapchain_loader();
        // SAFETY: the fence is unsignaled; it is waited on and reset below.
        let acquired = unsafe {
            loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                vk::Semaphore::null(),
                self.acquire_fence,
            )
        };
        match acquired {
            Ok((index, suboptimal)) => {
                let fences = [self.acquire_fence];
                // SAFETY: the fence was just submitted by the acquire.
                unsafe {
                    self.device.handle().wait_for_fences(&fences, true, u64::MAX)?;
                    self.device.handle().reset_fences(&fences)?;
                }
                self.current = index;
                if suboptimal {
                    debug!("Swap chain is suboptimal for the surface");
                }
                Ok(())
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                debug!("Swap chain out of date on acquire");
                self.out_of_date = true;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    pub fn color_space(&self) -> vk::ColorSpaceKHR {
        self.color_space
    }
}

fn create_swapchain(
    device: &VulkanDevice,
    requested: &SwapChainDesc,
    old_swapchain: vk::SwapchainKHR,
) -> RhiResult<Created> {
    let surface = device.surface();
    let support =
        SwapchainSupportDetails::query(device.physical().device, surface.handle(), surface.loader())?;

    let (surface_format, format) = choose_surface_format(&support.formats, requested.format)
        .ok_or_else(|| {
            RhiError::SwapchainError("surface offers no supported color format".to_string())
        })?;
    let present_mode = choose_present_mode(&support.present_modes, requested.vsync);
    let extent = choose_extent(&support.capabilities, requested.extent);
    let image_count = choose_image_count(&support.capabilities, requested.buffer_count);

    let families = device.queue_families();
    let family_indices: Vec<u32> = families.unique_families();
    let sharing_mode = if family_indices.len() > 1 {
        vk::SharingMode::CONCURRENT
    } else {
        vk::SharingMode::EXCLUSIVE
    };

    let mut create_info = vk::SwapchainCreateInfoKHR::default()
        .surface(surface.handle())
        .min_image_count(image_count)
        .image_format(surface_format.format)
        .image_color_space(surface_format.color_space)
        .image_extent(extent)
        .image_array_layers(1)
        .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
        .image_sharing_mode(sharing_mode)
        .pre_transform(support.capabilities.current_transform)
        .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
        .present_mode(present_mode)
        .clipped(true)
        .old_swapchain(old_swapchain);
    if sharing_mode == vk::SharingMode::CONCURRENT {
        create_info = create_info.queue_family_indices(&family_indices);
    }

    let loader = device.swapchain_loader();
    // SAFETY: the create info references locals that outlive the call.
    let swapchain = unsafe { loader.create_swapchain(&create_info, None)? };
    // SAFETY: the swap chain was just created.
    let images = match unsafe { loader.get_swapchain_images(swapchain) } {
        Ok(images) => images,
        Err(e) => {
            // SAFETY: no image of the new swap chain was acquired.
            unsafe { loader.destroy_swapchain(swapchain, None) };
            return Err(e.into());
        }
    };

    info!(
        "Swap chain created: {}x{}, {:?}, {:?}, {} image(s)",
        extent.width,
        extent.height,
        surface_format.format,
        present_mode,
        images.len()
    );

    Ok(Created {
        swapchain,
        desc: SwapChainDesc {
            extent: Extent2D::new(extent.width, extent.height),
            buffer_count: images.len() as u32,
            format,
            vsync: requested.vsync,
        },
        images,
        color_space: surface_format.color_space,
        present_mode,
    })
}

/// The requested format if offered, otherwise the first format this crate
/// can name.
fn choose_surface_format(
    formats: &[vk::SurfaceFormatKHR],
    requested: Format,
) -> Option<(vk::SurfaceFormatKHR, Format)> {
    let wanted = convert::format(requested);
    if let Some(&exact) = formats.iter().find(|f| {
        f.format == wanted && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
    }) {
        return Some((exact, requested));
    }

    let fallback = formats
        .iter()
        .find_map(|f| convert::format_from_vk(f.format).map(|format| (*f, format)));
    if let Some((surface_format, _)) = fallback {
        warn!(
            "Surface does not offer {:?}, using {:?}",
            requested, surface_format.format
        );
    }
    fallback
}

/// FIFO when synchronized to vblank; otherwise the lowest latency mode offered.
fn choose_present_mode(present_modes: &[vk::PresentModeKHR], vsync: bool) -> vk::PresentModeKHR {
    if !vsync {
        for mode in [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::IMMEDIATE] {
            if present_modes.contains(&mode) {
                return mode;
            }
        }
    }
    vk::PresentModeKHR::FIFO
}

fn choose_extent(capabilities: &vk::SurfaceCapabilitiesKHR, requested: Extent2D) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }
    vk::Extent2D {
        width: requested.width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: requested.height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR, requested: u32) -> u32 {
    let count = requested.max(capabilities.min_image_count);
    if capabilities.max_image_count > 0 {
        count.min(capabilities.max_image_count)
    } else {
        count
    }
}

/// Distinct monitor modes, tagged with the swap chain's format.
fn display_modes_from(video_modes: &[VideoMode], format: Format) -> Vec<DisplayMode> {
    let mut modes: Vec<DisplayMode> = Vec::with_capacity(video_modes.len());
    for video in video_modes {
        let mode = DisplayMode {
            width: video.width,
            height: video.height,
            refresh_rate_millihertz: video.refresh_rate_millihertz,
            format,
        };
        if !modes.contains(&mode) {
            modes.push(mode);
        }
    }
    modes
}

impl SwapChain<Vulkan> for VulkanSwapChain {
    fn desc(&self) -> SwapChainDesc {
        self.desc
    }

    fn current_back_buffer_index(&self) -> u32 {
        self.current
    }

    fn back_buffer(&self, index: u32) -> RhiResult<ImageHandle> {
        let image = self.images.get(index as usize).ok_or_else(|| {
            RhiError::InvalidArgument(format!(
                "back buffer {} out of range ({} buffers)",
                index,
                self.images.len()
            ))
        })?;
        Ok(ImageHandle {
            raw: image.as_raw(),
            format: self.desc.format,
            mip_levels: 1,
        })
    }

    /// The present mode is fixed when the buffers are created, from
    /// [`SwapChainDesc::vsync`]; `sync_interval` only has to agree with it.
    fn present(&mut self, queue: &VulkanQueue, sync_interval: u32) -> RhiResult<PresentStatus> {
        if self.out_of_date {
            return Ok(PresentStatus::OutOfDate);
        }
        if (sync_interval > 0) != self.desc.vsync {
            trace!(
                "Sync interval {} differs from the {:?} present mode",
                sync_interval, self.present_mode
            );
        }

        let semaphores = [self.render_finished[self.current as usize]];
        queue.submit(&vk::SubmitInfo::default().signal_semaphores(&semaphores))?;

        let swapchains = [self.swapchain];
        let indices = [self.current];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&semaphores)
            .swapchains(&swapchains)
            .image_indices(&indices);
        let loader = self.device.swapchain_loader();
        let present_queue = self.device.present_queue();
        // SAFETY: queue access is serialized by the queue lock; the present info
        // references locals that outlive the call.
        let presented = queue.with_queue_lock(|| unsafe {
            loader.queue_present(present_queue, &present_info)
        });

        let status = match presented {
            Ok(false) => PresentStatus::Presented,
            Ok(true) => PresentStatus::Suboptimal,
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                self.out_of_date = true;
                return Ok(PresentStatus::OutOfDate);
            }
            Err(e) => return Err(e.into()),
        };

        self.acquire_next()?;
        if self.out_of_date {
            return Ok(PresentStatus::OutOfDate);
        }
        Ok(status)
    }

    fn resize_buffers(&mut self, buffer_count: u32, extent: Extent2D) -> RhiResult<()> {
        if extent.is_empty() {
            return Err(RhiError::SwapchainError(format!(
                "cannot create buffers of size {}",
                extent
            )));
        }
        // Presentation may still read the old images.
        self.device.wait_idle()?;

        let requested = SwapChainDesc {
            buffer_count,
            extent,
            ..self.desc
        };
        let created = create_swapchain(&self.device, &requested, self.swapchain)?;
        // SAFETY: the device is idle and the old swap chain was retired above.
        unsafe {
            self.device
                .swapchain_loader()
                .destroy_swapchain(self.swapchain, None);
        }

        self.swapchain = created.swapchain;
        self.desc = created.desc;
        self.color_space = created.color_space;
        self.present_mode = created.present_mode;
        self.out_of_date = false;
        self.adopt_images(created.images)?;
        self.acquire_next()?;

        debug!(
            "Swap chain resized to {} x {}",
            self.desc.extent, self.desc.buffer_count
        );
        Ok(())
    }

    fn set_fullscreen_state(&mut self, window: &Window, mode: Option<&DisplayMode>) -> RhiResult<()> {
        let video = match mode {
            Some(mode) => Some(
                window
                    .video_modes()
                    .into_iter()
                    .find(|video| {
                        video.width == mode.width
                            && video.height == mode.height
                            && video.refresh_rate_millihertz == mode.refresh_rate_millihertz
                    })
                    .ok_or_else(|| {
                        RhiError::SwapchainError(format!(
                            "display mode {} is not offered by the output",
                            mode
                        ))
                    })?,
            ),
            None => None,
        };
        window.set_exclusive_fullscreen(video.as_ref())?;
        self.fullscreen = mode.is_some();
        Ok(())
    }

    fn is_fullscreen(&self) -> bool {
        self.fullscreen && self.window.is_fullscreen()
    }

    fn display_modes(&self, window: &Window) -> RhiResult<Vec<DisplayMode>> {
        Ok(display_modes_from(&window.video_modes(), self.desc.format))
    }
}

impl Drop for VulkanSwapChain {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            warn!("Failed to idle device before destroying swap chain: {}", e);
        }
        let raw = self.device.handle();
        // SAFETY: the device is idle; these objects belong to this swap chain.
        unsafe {
            for &semaphore in &self.render_finished {
                raw.destroy_semaphore(semaphore, None);
            }
            raw.destroy_fence(self.acquire_fence, None);
            self.device
                .swapchain_loader()
                .destroy_swapchain(self.swapchain, None);
        }
        debug!("Swap chain destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capabilities(current: (u32, u32), min_images: u32, max_images: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min_images,
            max_image_count: max_images,
            current_extent: vk::Extent2D {
                width: current.0,
                height: current.1,
            },
            min_image_extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            ..Default::default()
        }
    }

    fn surface_format(format: vk::Format) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }
    }

    #[test]
    fn test_requested_format_wins() {
        let formats = [
            surface_format(vk::Format::B8G8R8A8_SRGB),
            surface_format(vk::Format::B8G8R8A8_UNORM),
        ];
        let (chosen, format) = choose_surface_format(&formats, Format::Bgra8Unorm).unwrap();
        assert_eq!(chosen.format, vk::Format::B8G8R8A8_UNORM);
        assert_eq!(format, Format::Bgra8Unorm);
    }

    #[test]
    fn test_format_falls_back_to_known_format() {
        let formats = [
            surface_format(vk::Format::A2B10G10R10_UNORM_PACK32),
            surface_format(vk::Format::R8G8B8A8_UNORM),
        ];
        let (_, format) = choose_surface_format(&formats, Format::Bgra8Unorm).unwrap();
        assert_eq!(format, Format::Rgba8Unorm);

        let unknown = [surface_format(vk::Format::A2B10G10R10_UNORM_PACK32)];
        assert!(choose_surface_format(&unknown, Format::Bgra8Unorm).is_none());
    }

    #[test]
    fn test_vsync_selects_fifo() {
        let modes = [
            vk::PresentModeKHR::FIFO,
            vk::PresentModeKHR::MAILBOX,
            vk::PresentModeKHR::IMMEDIATE,
        ];
        assert_eq!(choose_present_mode(&modes, true), vk::PresentModeKHR::FIFO);
        assert_eq!(choose_present_mode(&modes, false), vk::PresentModeKHR::MAILBOX);
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::FIFO], false),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn test_extent_follows_surface_when_defined() {
        let caps = capabilities((800, 600), 2, 3);
        let extent = choose_extent(&caps, Extent2D::new(1024, 768));
        assert_eq!((extent.width, extent.height), (800, 600));
    }

    #[test]
    fn test_extent_clamped_when_surface_is_undefined() {
        let caps = capabilities((u32::MAX, u32::MAX), 2, 3);
        let extent = choose_extent(&caps, Extent2D::new(8000, 300));
        assert_eq!((extent.width, extent.height), (4096, 300));
    }

    #[test]
    fn test_image_count_respects_limits() {
        assert_eq!(choose_image_count(&capabilities((1, 1), 2, 3), 2), 2);
        assert_eq!(choose_image_count(&capabilities((1, 1), 3, 8), 2), 3);
        assert_eq!(choose_image_count(&capabilities((1, 1), 1, 2), 3), 2);
        assert_eq!(choose_image_count(&capabilities((1, 1), 2, 0), 3), 3);
    }

    #[test]
    fn test_display_modes_are_deduplicated() {
        let video = |w, h, r| VideoMode {
            width: w,
            height: h,
            refresh_rate_millihertz: r,
            bit_depth: 32,
        };
        let modes = display_modes_from(
            &[
                video(1920, 1080, 60_000),
                VideoMode {
                    bit_depth: 24,
                    ..video(1920, 1080, 60_000)
                },
                video(1280, 720, 60_000),
            ],
            Format::Bgra8Unorm,
        );
        assert_eq!(modes.len(), 2);
        assert!(modes.iter().all(|m| m.format == Format::Bgra8Unorm));
    }
}
