//! Physical device (adapter) selection.
//!
//! A usable adapter has a graphics queue, can present to the window's
//! surface, reports Vulkan 1.3, and supports the features the backend maps
//! the explicit object model onto: timeline semaphores for fences, dynamic
//! rendering and synchronization2 for command recording, and descriptor
//! indexing for heaps that are written while bound.

use ash::vk;
use tracing::{debug, info, warn};

use crate::error::{RhiError, RhiResult};
use crate::types::{AdapterInfo, AdapterKind};

/// Queue families the backend submits to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics_family: Option<u32>,
    pub present_family: Option<u32>,
}

impl QueueFamilyIndices {
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.graphics_family.is_some() && self.present_family.is_some()
    }

    /// Distinct family indices, graphics first.
    pub fn unique_families(&self) -> Vec<u32> {
        let mut families = Vec::with_capacity(2);
        if let Some(graphics) = self.graphics_family {
            families.push(graphics);
        }
        if let Some(present) = self.present_family
            && !families.contains(&present)
        {
            families.push(present);
        }
        families
    }
}

/// A selected physical device and what the backend needs to know about it.
#[derive(Clone)]
pub struct PhysicalDeviceInfo {
    pub device: vk::PhysicalDevice,
    pub properties: vk::PhysicalDeviceProperties,
    pub features: vk::PhysicalDeviceFeatures,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    pub queue_families: QueueFamilyIndices,
}

impl PhysicalDeviceInfo {
    pub fn device_name(&self) -> String {
        self.properties
            .device_name_as_c_str()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "Unknown Device".to_string())
    }

    pub fn api_version(&self) -> (u32, u32, u32) {
        let version = self.properties.api_version;
        (
            vk::api_version_major(version),
            vk::api_version_minor(version),
            vk::api_version_patch(version),
        )
    }

    /// Total device-local memory in bytes.
    pub fn device_local_memory(&self) -> u64 {
        self.memory_properties
            .memory_heaps
            .iter()
            .take(self.memory_properties.memory_heap_count as usize)
            .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
            .map(|heap| heap.size)
            .sum()
    }

    pub fn adapter_info(&self) -> AdapterInfo {
        AdapterInfo {
            name: self.device_name(),
            vendor_id: self.properties.vendor_id,
            device_id: self.properties.device_id,
            kind: adapter_kind(self.properties.device_type),
        }
    }
}

impl std::fmt::Debug for PhysicalDeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (major, minor, patch) = self.api_version();
        f.debug_struct("PhysicalDeviceInfo")
            .field("name", &self.device_name())
            .field("type", &adapter_kind(self.properties.device_type))
            .field("api_version", &format!("{}.{}.{}", major, minor, patch))
            .field("queue_families", &self.queue_families)
            .finish()
    }
}

pub(crate) fn adapter_kind(device_type: vk::PhysicalDeviceType) -> AdapterKind {
    match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => AdapterKind::Discrete,
        vk::PhysicalDeviceType::INTEGRATED_GPU => AdapterKind::Integrated,
        vk::PhysicalDeviceType::VIRTUAL_GPU => AdapterKind::Virtual,
        vk::PhysicalDeviceType::CPU => AdapterKind::Cpu,
        _ => AdapterKind::Software,
    }
}

/// Picks the highest rated adapter that can present to `surface`.
///
/// # Errors
///
/// Returns [`RhiError::NoSuitableGpu`] when no adapter qualifies.
pub fn select_physical_device(
    instance: &ash::Instance,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> RhiResult<PhysicalDeviceInfo> {
    // SAFETY: plain query on a live instance.
    let devices = unsafe { instance.enumerate_physical_devices()? };

    if devices.is_empty() {
        warn!("No Vulkan-capable GPUs found");
        return Err(RhiError::NoSuitableGpu);
    }

    info!("Found {} GPU(s)", devices.len());

    let best = devices
        .into_iter()
        .filter_map(|device| check_device_suitability(instance, device, surface, surface_loader))
        .map(|info| {
            let score = rate_device(
                info.properties.device_type,
                info.properties.limits.max_image_dimension2_d,
                info.device_local_memory(),
            );
            debug!("GPU '{}' scored {}", info.device_name(), score);
            (info, score)
        })
        .max_by_key(|(_, score)| *score);

    let Some((selected, score)) = best else {
        warn!("No suitable GPU found with required capabilities");
        return Err(RhiError::NoSuitableGpu);
    };

    let (major, minor, patch) = selected.api_version();
    info!(
        "Selected GPU: '{}' ({:?}) - Vulkan {}.{}.{}, score {}",
        selected.device_name(),
        adapter_kind(selected.properties.device_type),
        major,
        minor,
        patch,
        score
    );

    Ok(selected)
}

fn check_device_suitability(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> Option<PhysicalDeviceInfo> {
    // SAFETY: plain queries on a physical device enumerated from `instance`.
    let (properties, features, memory_properties) = unsafe {
        (
            instance.get_physical_device_properties(device),
            instance.get_physical_device_features(device),
            instance.get_physical_device_memory_properties(device),
        )
    };
    let name = properties
        .device_name_as_c_str()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    let (major, minor) = (
        vk::api_version_major(properties.api_version),
        vk::api_version_minor(properties.api_version),
    );
    if (major, minor) < (1, 3) {
        debug!("GPU '{}' skipped: Vulkan {}.{} < 1.3", name, major, minor);
        return None;
    }

    let queue_families = find_queue_families(instance, device, surface, surface_loader);
    if !queue_families.is_complete() {
        debug!(
            "GPU '{}' skipped: missing queue families (graphics={}, present={})",
            name,
            queue_families.graphics_family.is_some(),
            queue_families.present_family.is_some()
        );
        return None;
    }

    let mut features12 = vk::PhysicalDeviceVulkan12Features::default();
    let mut features13 = vk::PhysicalDeviceVulkan13Features::default();
    {
        let mut features2 = vk::PhysicalDeviceFeatures2::default()
            .push_next(&mut features12)
            .push_next(&mut features13);
        // SAFETY: the chain only references locals that outlive the call.
        unsafe { instance.get_physical_device_features2(device, &mut features2) };
    }

    let missing = missing_features(&features12, &features13);
    if !missing.is_empty() {
        debug!("GPU '{}' skipped: missing {}", name, missing.join(", "));
        return None;
    }

    Some(PhysicalDeviceInfo {
        device,
        properties,
        features,
        memory_properties,
        queue_families,
    })
}

/// Names of required features the device lacks.
pub(crate) fn missing_features(
    features12: &vk::PhysicalDeviceVulkan12Features<'_>,
    features13: &vk::PhysicalDeviceVulkan13Features<'_>,
) -> Vec<&'static str> {
    [
        ("timelineSemaphore", features12.timeline_semaphore),
        (
            "descriptorBindingPartiallyBound",
            features12.descriptor_binding_partially_bound,
        ),
        (
            "descriptorBindingSampledImageUpdateAfterBind",
            features12.descriptor_binding_sampled_image_update_after_bind,
        ),
        (
            "descriptorBindingUpdateUnusedWhilePending",
            features12.descriptor_binding_update_unused_while_pending,
        ),
        ("dynamicRendering", features13.dynamic_rendering),
        ("synchronization2", features13.synchronization2),
    ]
    .into_iter()
    .filter(|(_, supported)| *supported == vk::FALSE)
    .map(|(name, _)| name)
    .collect()
}

fn find_queue_families(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> QueueFamilyIndices {
    // SAFETY: plain query on a physical device enumerated from `instance`.
    let families = unsafe { instance.get_physical_device_queue_family_properties(device) };

    let mut indices = QueueFamilyIndices::default();
    for (i, family) in families.iter().enumerate() {
        let i = i as u32;
        if family.queue_count == 0 {
            continue;
        }

        let has_graphics = family.queue_flags.contains(vk::QueueFlags::GRAPHICS);
        // SAFETY: `i` is a valid family index of `device`.
        let can_present = unsafe {
            surface_loader
                .get_physical_device_surface_support(device, i, surface)
                .unwrap_or(false)
        };

        // A family doing both avoids a cross-queue hand-off at present.
        if has_graphics && can_present {
            return QueueFamilyIndices {
                graphics_family: Some(i),
                present_family: Some(i),
            };
        }
        if has_graphics && indices.graphics_family.is_none() {
            indices.graphics_family = Some(i);
        }
        if can_present && indices.present_family.is_none() {
            indices.present_family = Some(i);
        }
    }
    indices
}

/// Higher is better. Discrete GPUs dominate; image limits and VRAM break ties.
fn rate_device(device_type: vk::PhysicalDeviceType, max_image_dimension: u32, vram: u64) -> u32 {
    let kind_score = match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 100_000,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 10_000,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 1_000,
        vk::PhysicalDeviceType::CPU => 100,
        _ => 1,
    };
    let vram_mb = (vram / (1024 * 1024)).min(16_000) as u32;
    kind_score + max_image_dimension.min(32_768) + vram_mb
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_family_indices_completeness() {
        assert!(!QueueFamilyIndices::default().is_complete());
        assert!(
            !QueueFamilyIndices {
                graphics_family: Some(0),
                present_family: None,
            }
            .is_complete()
        );
        assert!(
            QueueFamilyIndices {
                graphics_family: Some(0),
                present_family: Some(1),
            }
            .is_complete()
        );
    }

    #[test]
    fn test_unique_families() {
        let shared = QueueFamilyIndices {
            graphics_family: Some(2),
            present_family: Some(2),
        };
        assert_eq!(shared.unique_families(), vec![2]);

        let split = QueueFamilyIndices {
            graphics_family: Some(0),
            present_family: Some(1),
        };
        assert_eq!(split.unique_families(), vec![0, 1]);
    }

    #[test]
    fn test_discrete_outranks_integrated() {
        let discrete = rate_device(vk::PhysicalDeviceType::DISCRETE_GPU, 8192, 1 << 30);
        let integrated =
            rate_device(vk::PhysicalDeviceType::INTEGRATED_GPU, 32_768, 16 << 30);
        assert!(discrete > integrated);
    }

    #[test]
    fn test_missing_features_lists_each_gap() {
        let features12 = vk::PhysicalDeviceVulkan12Features::default().timeline_semaphore(true);
        let features13 = vk::PhysicalDeviceVulkan13Features::default().dynamic_rendering(true);
        let missing = missing_features(&features12, &features13);
        assert!(!missing.contains(&"timelineSemaphore"));
        assert!(!missing.contains(&"dynamicRendering"));
        assert!(missing.contains(&"synchronization2"));
        assert!(missing.contains(&"descriptorBindingPartiallyBound"));
    }

    #[test]
    fn test_missing_features_empty_when_all_supported() {
        let features12 = vk::PhysicalDeviceVulkan12Features::default()
            .timeline_semaphore(true)
            .descriptor_binding_partially_bound(true)
            .descriptor_binding_sampled_image_update_after_bind(true)
            .descriptor_binding_update_unused_while_pending(true);
        let features13 = vk::PhysicalDeviceVulkan13Features::default()
            .dynamic_rendering(true)
            .synchronization2(true);
        assert!(missing_features(&features12, &features13).is_empty());
    }

    #[test]
    fn test_adapter_kind_mapping() {
        assert_eq!(
            adapter_kind(vk::PhysicalDeviceType::DISCRETE_GPU),
            AdapterKind::Discrete
        );
        assert_eq!(adapter_kind(vk::PhysicalDeviceType::CPU), AdapterKind::Cpu);
        assert_eq!(
            adapter_kind(vk::PhysicalDeviceType::OTHER),
            AdapterKind::Software
        );
    }
}
