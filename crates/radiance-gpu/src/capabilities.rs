//! GPU capability detection.

use ash::vk;
use std::collections::HashSet;
use std::ffi::CStr;

/// GPU vendor identification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuVendor {
    Nvidia,
    Amd,
    Intel,
    Other(u32),
}

impl GpuVendor {
    /// Identify vendor from PCI vendor ID.
    pub fn from_vendor_id(id: u32) -> Self {
        match id {
            0x10DE => Self::Nvidia,
            0x1002 => Self::Amd,
            0x8086 => Self::Intel,
            other => Self::Other(other),
        }
    }
}

/// Detected GPU capabilities.
#[derive(Debug, Clone)]
pub struct GpuCapabilities {
    pub vendor: GpuVendor,
    pub device_name: String,
    pub api_version: u32,
    pub driver_version: u32,

    pub supports_buffer_device_address: bool,
    pub supports_synchronization2: bool,
    /// `VK_KHR_acceleration_structure` plus deferred host operations.
    pub supports_acceleration_structure: bool,
    pub supports_ray_query: bool,

    /// Required alignment of acceleration-structure scratch addresses.
    pub min_scratch_offset_alignment: u32,
    pub max_instance_count: u64,

    /// Device-local memory in MB
    pub device_local_memory_mb: u64,

    pub available_extensions: HashSet<String>,
}

impl GpuCapabilities {
    /// Query capabilities from a physical device.
    ///
    /// # Safety
    /// The instance and physical device must be valid.
    pub unsafe fn query(instance: &ash::Instance, physical_device: vk::PhysicalDevice) -> Self {
        let properties = unsafe { instance.get_physical_device_properties(physical_device) };
        let memory_properties =
            unsafe { instance.get_physical_device_memory_properties(physical_device) };

        let extensions = unsafe { instance.enumerate_device_extension_properties(physical_device) }
            .unwrap_or_default();
        let available_extensions: HashSet<String> = extensions
            .iter()
            .filter_map(|ext| ext.extension_name_as_c_str().ok())
            .filter_map(|name| name.to_str().ok().map(String::from))
            .collect();

        let has = |name: &CStr| {
            name.to_str()
                .is_ok_and(|name| available_extensions.contains(name))
        };
        let supports_acceleration_structure = has(ash::khr::acceleration_structure::NAME)
            && has(ash::khr::deferred_host_operations::NAME);
        let supports_ray_query = has(ash::khr::ray_query::NAME);

        let mut as_properties = vk::PhysicalDeviceAccelerationStructurePropertiesKHR::default();
        if supports_acceleration_structure {
            let mut properties2 =
                vk::PhysicalDeviceProperties2::default().push_next(&mut as_properties);
            unsafe { instance.get_physical_device_properties2(physical_device, &mut properties2) };
        }

        let vendor = GpuVendor::from_vendor_id(properties.vendor_id);
        let device_name = properties
            .device_name_as_c_str()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        let device_local_memory_mb: u64 = memory_properties
            .memory_heaps
            .iter()
            .take(memory_properties.memory_heap_count as usize)
            .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
            .map(|heap| heap.size / (1024 * 1024))
            .sum();

        let api_version = properties.api_version;
        let has_vulkan_1_3 = api_at_least_1_3(api_version);

        Self {
            vendor,
            device_name,
            api_version,
            driver_version: properties.driver_version,

            supports_buffer_device_address: has_vulkan_1_3
                || available_extensions.contains("VK_KHR_buffer_device_address"),
            supports_synchronization2: has_vulkan_1_3,
            supports_acceleration_structure,
            supports_ray_query,

            min_scratch_offset_alignment: as_properties
                .min_acceleration_structure_scratch_offset_alignment
                .max(1),
            max_instance_count: as_properties.max_instance_count,

            device_local_memory_mb,
            available_extensions,
        }
    }

    /// Check if the GPU can build and trace acceleration structures.
    pub fn meets_requirements(&self) -> bool {
        api_at_least_1_3(self.api_version)
            && self.supports_buffer_device_address
            && self.supports_acceleration_structure
    }

    /// Get a human-readable summary of capabilities.
    pub fn summary(&self) -> String {
        format!(
            "{} ({:?}) - Vulkan {}.{}.{} - {} MB VRAM - ray query: {}",
            self.device_name,
            self.vendor,
            vk::api_version_major(self.api_version),
            vk::api_version_minor(self.api_version),
            vk::api_version_patch(self.api_version),
            self.device_local_memory_mb,
            self.supports_ray_query,
        )
    }
}

fn api_at_least_1_3(api_version: u32) -> bool {
    let major = vk::api_version_major(api_version);
    let minor = vk::api_version_minor(api_version);
    major > 1 || (major == 1 && minor >= 3)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capabilities(api_version: u32, acceleration: bool) -> GpuCapabilities {
        GpuCapabilities {
            vendor: GpuVendor::Nvidia,
            device_name: "Test GPU".to_string(),
            api_version,
            driver_version: 0,
            supports_buffer_device_address: true,
            supports_synchronization2: true,
            supports_acceleration_structure: acceleration,
            supports_ray_query: acceleration,
            min_scratch_offset_alignment: 128,
            max_instance_count: 1 << 24,
            device_local_memory_mb: 8192,
            available_extensions: HashSet::new(),
        }
    }

    #[test]
    fn vendor_identification() {
        assert_eq!(GpuVendor::from_vendor_id(0x10DE), GpuVendor::Nvidia);
        assert_eq!(GpuVendor::from_vendor_id(0x1002), GpuVendor::Amd);
        assert_eq!(GpuVendor::from_vendor_id(0x8086), GpuVendor::Intel);
        assert!(GpuVendor::Nvidia.ships_dlss());
        assert!(!GpuVendor::Amd.ships_dlss());
    }

    #[test]
    fn requirements_need_acceleration_structures() {
        assert!(capabilities(vk::API_VERSION_1_3, true).meets_requirements());
        assert!(!capabilities(vk::API_VERSION_1_3, false).meets_requirements());
        assert!(!capabilities(vk::API_VERSION_1_2, true).meets_requirements());
    }
}
