//! Backend seam between structure bookkeeping and the GPU.
//!
//! [`BlasCache`](crate::BlasCache) and [`TlasBuilder`](crate::TlasBuilder)
//! decide *what* to build and *when*; an [`AccelerationBackend`] performs the
//! builds. The Vulkan implementation lives in [`crate::vulkan`].

use crate::error::Result;
use crate::geometry::MeshGeometry;
use ash::vk;
use bytemuck::{Pod, Zeroable};
use radiance_core::MeshId;

/// Build mode of a top-level structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuildMode {
    /// Full build.
    Build,
    /// In-place refit of a structure built with allow-update.
    Update,
}

impl BuildMode {
    pub const fn to_vk(self) -> vk::BuildAccelerationStructureModeKHR {
        match self {
            Self::Build => vk::BuildAccelerationStructureModeKHR::BUILD,
            Self::Update => vk::BuildAccelerationStructureModeKHR::UPDATE,
        }
    }
}

/// A built bottom-level structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlasHandle {
    /// Backend-specific handle value.
    pub raw: u64,
    /// Address referenced by top-level instances.
    pub device_address: vk::DeviceAddress,
}

/// The current top-level structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TlasHandle {
    pub raw: u64,
    pub device_address: vk::DeviceAddress,
}

/// One top-level instance, laid out exactly like
/// `VkAccelerationStructureInstanceKHR`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct InstanceDescriptor {
    /// Row-major 3x4 object-to-world matrix.
    pub transform: [f32; 12],
    /// Instance id in the low 24 bits, visibility mask in the high 8.
    pub custom_index_and_mask: u32,
    /// Hit-group offset in the low 24 bits, instance flags in the high 8.
    pub sbt_offset_and_flags: u32,
    pub blas_address: vk::DeviceAddress,
}

const _: () = assert!(
    std::mem::size_of::<InstanceDescriptor>()
        == std::mem::size_of::<vk::AccelerationStructureInstanceKHR>()
);

impl InstanceDescriptor {
    /// Largest id representable in 24 bits.
    pub const MAX_INSTANCE_ID: u32 = 0x00FF_FFFF;

    pub fn new(
        transform: [f32; 12],
        instance_id: u32,
        mask: u8,
        flags: vk::GeometryInstanceFlagsKHR,
        blas_address: vk::DeviceAddress,
    ) -> Self {
        // Instance flags occupy 8 bits of the packed word.
        let flags = flags.as_raw() & 0xFF;
        Self {
            transform,
            custom_index_and_mask: (instance_id & Self::MAX_INSTANCE_ID) | (u32::from(mask) << 24),
            sbt_offset_and_flags: flags << 24,
            blas_address,
        }
    }

    pub const fn instance_id(&self) -> u32 {
        self.custom_index_and_mask & Self::MAX_INSTANCE_ID
    }

    pub const fn mask(&self) -> u8 {
        (self.custom_index_and_mask >> 24) as u8
    }

    pub const fn flags(&self) -> vk::GeometryInstanceFlagsKHR {
        vk::GeometryInstanceFlagsKHR::from_raw(self.sbt_offset_and_flags >> 24)
    }
}

/// Builds and destroys acceleration structures on a device.
pub trait AccelerationBackend {
    /// Build a bottom-level structure with prefer-fast-trace and wait for it.
    fn build_bottom_level(&mut self, mesh: MeshId, geometry: &MeshGeometry) -> Result<BlasHandle>;

    fn destroy_bottom_level(&mut self, handle: BlasHandle) -> Result<()>;

    /// Build or refit the top-level structure from `instances`.
    ///
    /// The structure is created with prefer-fast-trace and allow-update.
    /// Storage grows when `instances` exceeds the current capacity, which is
    /// only legal with [`BuildMode::Build`].
    fn build_top_level(
        &mut self,
        instances: &[InstanceDescriptor],
        mode: BuildMode,
    ) -> Result<TlasHandle>;

    fn destroy_top_level(&mut self) -> Result<()>;
}
