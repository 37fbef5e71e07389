//! Vulkan acceleration-structure backend.
//!
//! Builds are recorded into one-shot command buffers and waited on, which
//! keeps structure lifetimes trivially ordered with the frame loop.

use crate::backend::{AccelerationBackend, BlasHandle, BuildMode, InstanceDescriptor, TlasHandle};
use crate::error::{AccelError, Result};
use crate::geometry::MeshGeometry;
use ash::vk;
use ash::vk::Handle;
use gpu_allocator::MemoryLocation;
use hashbrown::HashMap;
use radiance_core::MeshId;
use radiance_gpu::{GpuBuffer, GpuContext, GpuError};
use std::sync::Arc;
use tracing::{debug, info, warn};

const TOP_LEVEL_FLAGS: vk::BuildAccelerationStructureFlagsKHR =
    vk::BuildAccelerationStructureFlagsKHR::from_raw(
        vk::BuildAccelerationStructureFlagsKHR::PREFER_FAST_TRACE.as_raw()
            | vk::BuildAccelerationStructureFlagsKHR::ALLOW_UPDATE.as_raw(),
    );

/// An acceleration structure with its backing storage.
struct Structure {
    handle: vk::AccelerationStructureKHR,
    buffer: GpuBuffer,
    device_address: vk::DeviceAddress,
}

/// The top-level structure and the buffers it is rebuilt from.
struct TopLevel {
    structure: Structure,
    instance_buffer: GpuBuffer,
    scratch: GpuBuffer,
    /// Instances the storage was sized for.
    capacity: u32,
}

/// [`AccelerationBackend`] on a [`GpuContext`].
pub struct VulkanAccelerationBackend {
    context: Arc<GpuContext>,
    bottom: HashMap<u64, Structure>,
    top: Option<TopLevel>,
}

impl VulkanAccelerationBackend {
    pub fn new(context: Arc<GpuContext>) -> Self {
        Self {
            context,
            bottom: HashMap::new(),
            top: None,
        }
    }

    fn scratch_alignment(&self) -> u64 {
        u64::from(self.context.capabilities().min_scratch_offset_alignment)
    }

    /// Allocate a scratch buffer whose aligned start holds `size` bytes.
    fn create_scratch(&self, size: u64, name: &str) -> Result<GpuBuffer> {
        let alignment = self.scratch_alignment();
        let buffer = self.context.allocator().lock().create_buffer(
            size + alignment,
            vk::BufferUsageFlags::STORAGE_BUFFER | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS,
            MemoryLocation::GpuOnly,
            name,
        )?;
        Ok(buffer)
    }

    fn aligned_address(&self, buffer: &GpuBuffer) -> vk::DeviceAddress {
        align_up(buffer.device_address, self.scratch_alignment())
    }

    fn create_structure(
        &self,
        ty: vk::AccelerationStructureTypeKHR,
        size: u64,
        name: &str,
    ) -> Result<Structure> {
        let mut buffer = self.context.allocator().lock().create_buffer(
            size,
            vk::BufferUsageFlags::ACCELERATION_STRUCTURE_STORAGE_KHR
                | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS,
            MemoryLocation::GpuOnly,
            name,
        )?;

        let create_info = vk::AccelerationStructureCreateInfoKHR::default()
            .buffer(buffer.buffer)
            .offset(0)
            .size(size)
            .ty(ty);

        let loader = self.context.acceleration_structure();
        let handle = match unsafe { loader.create_acceleration_structure(&create_info, None) } {
            Ok(handle) => handle,
            Err(err) => {
                self.context.allocator().lock().free_buffer(&mut buffer)?;
                return Err(err.into());
            }
        };

        let address_info =
            vk::AccelerationStructureDeviceAddressInfoKHR::default().acceleration_structure(handle);
        let device_address =
            unsafe { loader.get_acceleration_structure_device_address(&address_info) };

        Ok(Structure {
            handle,
            buffer,
            device_address,
        })
    }

    fn destroy_structure(&self, mut structure: Structure) -> Result<()> {
        unsafe {
            self.context
                .acceleration_structure()
                .destroy_acceleration_structure(structure.handle, None);
        }
        self.context
            .allocator()
            .lock()
            .free_buffer(&mut structure.buffer)?;
        Ok(())
    }

    fn free_buffer(&self, buffer: &mut GpuBuffer) -> Result<()> {
        self.context.allocator().lock().free_buffer(buffer)?;
        Ok(())
    }

    fn instance_geometry(address: vk::DeviceAddress) -> vk::AccelerationStructureGeometryKHR<'static> {
        vk::AccelerationStructureGeometryKHR::default()
            .geometry_type(vk::GeometryTypeKHR::INSTANCES)
            .geometry(vk::AccelerationStructureGeometryDataKHR {
                instances: vk::AccelerationStructureGeometryInstancesDataKHR::default()
                    .array_of_pointers(false)
                    .data(vk::DeviceOrHostAddressConstKHR {
                        device_address: address,
                    }),
            })
    }

    /// Create top-level storage for at least `count` instances.
    fn create_top_level(&self, count: u32) -> Result<TopLevel> {
        let capacity = count.max(1).next_power_of_two();

        let mut instance_buffer = self.context.allocator().lock().create_buffer(
            u64::from(capacity) * std::mem::size_of::<InstanceDescriptor>() as u64,
            vk::BufferUsageFlags::ACCELERATION_STRUCTURE_BUILD_INPUT_READ_ONLY_KHR
                | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS,
            MemoryLocation::CpuToGpu,
            "tlas_instance_buffer",
        )?;

        let geometry = Self::instance_geometry(instance_buffer.device_address);
        let build_info = vk::AccelerationStructureBuildGeometryInfoKHR::default()
            .ty(vk::AccelerationStructureTypeKHR::TOP_LEVEL)
            .flags(TOP_LEVEL_FLAGS)
            .mode(vk::BuildAccelerationStructureModeKHR::BUILD)
            .geometries(std::slice::from_ref(&geometry));

        let mut sizes = vk::AccelerationStructureBuildSizesInfoKHR::default();
        unsafe {
            self.context
                .acceleration_structure()
                .get_acceleration_structure_build_sizes(
                    vk::AccelerationStructureBuildTypeKHR::DEVICE,
                    &build_info,
                    &[capacity],
                    &mut sizes,
                );
        }

        let structure = match self.create_structure(
            vk::AccelerationStructureTypeKHR::TOP_LEVEL,
            sizes.acceleration_structure_size,
            "tlas_buffer",
        ) {
            Ok(structure) => structure,
            Err(err) => {
                self.free_buffer(&mut instance_buffer)?;
                return Err(err);
            }
        };

        let scratch_size = sizes.build_scratch_size.max(sizes.update_scratch_size);
        let scratch = match self.create_scratch(scratch_size, "tlas_scratch_buffer") {
            Ok(scratch) => scratch,
            Err(err) => {
                self.destroy_structure(structure)?;
                self.free_buffer(&mut instance_buffer)?;
                return Err(err);
            }
        };

        info!(capacity, "Allocated top-level acceleration structure");

        Ok(TopLevel {
            structure,
            instance_buffer,
            scratch,
            capacity,
        })
    }

    fn release_top_level(&self, mut top: TopLevel) -> Result<()> {
        self.free_buffer(&mut top.scratch)?;
        self.free_buffer(&mut top.instance_buffer)?;
        self.destroy_structure(top.structure)
    }
}

impl AccelerationBackend for VulkanAccelerationBackend {
    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    fn build_bottom_level(&mut self, mesh: MeshId, geometry: &MeshGeometry) -> Result<BlasHandle> {
        let triangles = vk::AccelerationStructureGeometryTrianglesDataKHR::default()
            .vertex_format(geometry.vertex_format)
            .vertex_data(vk::DeviceOrHostAddressConstKHR {
                device_address: geometry.vertex_address,
            })
            .vertex_stride(geometry.vertex_stride)
            .max_vertex(geometry.vertex_count.saturating_sub(1))
            .index_type(geometry.index_format.to_vk())
            .index_data(vk::DeviceOrHostAddressConstKHR {
                device_address: geometry.index_address,
            });

        let geometry_flags = if geometry.opaque {
            vk::GeometryFlagsKHR::OPAQUE
        } else {
            vk::GeometryFlagsKHR::empty()
        };
        let vk_geometry = vk::AccelerationStructureGeometryKHR::default()
            .geometry_type(vk::GeometryTypeKHR::TRIANGLES)
            .flags(geometry_flags)
            .geometry(vk::AccelerationStructureGeometryDataKHR { triangles });

        let mut build_info = vk::AccelerationStructureBuildGeometryInfoKHR::default()
            .ty(vk::AccelerationStructureTypeKHR::BOTTOM_LEVEL)
            .flags(vk::BuildAccelerationStructureFlagsKHR::PREFER_FAST_TRACE)
            .mode(vk::BuildAccelerationStructureModeKHR::BUILD)
            .geometries(std::slice::from_ref(&vk_geometry));

        let primitive_count = geometry.triangle_count();
        let mut sizes = vk::AccelerationStructureBuildSizesInfoKHR::default();
        unsafe {
            self.context
                .acceleration_structure()
                .get_acceleration_structure_build_sizes(
                    vk::AccelerationStructureBuildTypeKHR::DEVICE,
                    &build_info,
                    &[primitive_count],
                    &mut sizes,
                );
        }

        let name = format!("blas_{}", mesh.0);
        let structure = self.create_structure(
            vk::AccelerationStructureTypeKHR::BOTTOM_LEVEL,
            sizes.acceleration_structure_size,
            &name,
        )?;
        let mut scratch = match self.create_scratch(sizes.build_scratch_size, "blas_scratch_buffer")
        {
            Ok(scratch) => scratch,
            Err(err) => {
                self.destroy_structure(structure)?;
                return Err(err);
            }
        };

        build_info = build_info
            .dst_acceleration_structure(structure.handle)
            .scratch_data(vk::DeviceOrHostAddressKHR {
                device_address: self.aligned_address(&scratch),
            });
        let build_range =
            vk::AccelerationStructureBuildRangeInfoKHR::default().primitive_count(primitive_count);

        let loader = self.context.acceleration_structure();
        let submitted = self.context.submit_and_wait(|device, cmd| unsafe {
            loader.cmd_build_acceleration_structures(
                cmd,
                std::slice::from_ref(&build_info),
                &[std::slice::from_ref(&build_range)],
            );
            radiance_gpu::command::acceleration_structure_barrier(device, cmd);
        });

        self.free_buffer(&mut scratch)?;
        if let Err(err) = submitted {
            self.destroy_structure(structure)?;
            return Err(err.into());
        }

        let handle = BlasHandle {
            raw: structure.handle.as_raw(),
            device_address: structure.device_address,
        };
        debug!(%mesh, size = sizes.acceleration_structure_size, "Bottom-level structure ready");
        self.bottom.insert(handle.raw, structure);
        Ok(handle)
    }

    fn destroy_bottom_level(&mut self, handle: BlasHandle) -> Result<()> {
        match self.bottom.remove(&handle.raw) {
            Some(structure) => self.destroy_structure(structure),
            None => Err(GpuError::InvalidState(format!(
                "Unknown bottom-level structure {:#x}",
                handle.raw
            ))
            .into()),
        }
    }

    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    fn build_top_level(
        &mut self,
        instances: &[InstanceDescriptor],
        mode: BuildMode,
    ) -> Result<TlasHandle> {
        let max_instances = self.context.capabilities().max_instance_count;
        if max_instances != 0 && instances.len() as u64 > max_instances {
            return Err(AccelError::TooManyInstances(instances.len()));
        }
        let count =
            u32::try_from(instances.len()).map_err(|_| AccelError::TooManyInstances(instances.len()))?;

        let needs_storage = self.top.as_ref().map_or(true, |top| top.capacity < count);
        if needs_storage {
            if mode == BuildMode::Update {
                return Err(AccelError::UpdateWithoutBuild);
            }
            if let Some(old) = self.top.take() {
                self.release_top_level(old)?;
            }
            self.top = Some(self.create_top_level(count)?);
        }

        let top = self.top.as_ref().ok_or(AccelError::UpdateWithoutBuild)?;
        top.instance_buffer.write(0, instances)?;

        let geometry = Self::instance_geometry(top.instance_buffer.device_address);
        let mut build_info = vk::AccelerationStructureBuildGeometryInfoKHR::default()
            .ty(vk::AccelerationStructureTypeKHR::TOP_LEVEL)
            .flags(TOP_LEVEL_FLAGS)
            .mode(mode.to_vk())
            .dst_acceleration_structure(top.structure.handle)
            .geometries(std::slice::from_ref(&geometry))
            .scratch_data(vk::DeviceOrHostAddressKHR {
                device_address: self.aligned_address(&top.scratch),
            });
        if mode == BuildMode::Update {
            build_info = build_info.src_acceleration_structure(top.structure.handle);
        }
        let build_range =
            vk::AccelerationStructureBuildRangeInfoKHR::default().primitive_count(count);

        let loader = self.context.acceleration_structure();
        self.context.submit_and_wait(|device, cmd| unsafe {
            loader.cmd_build_acceleration_structures(
                cmd,
                std::slice::from_ref(&build_info),
                &[std::slice::from_ref(&build_range)],
            );
            radiance_gpu::command::acceleration_structure_barrier(device, cmd);
        })?;

        Ok(TlasHandle {
            raw: top.structure.handle.as_raw(),
            device_address: top.structure.device_address,
        })
    }

    fn destroy_top_level(&mut self) -> Result<()> {
        match self.top.take() {
            Some(top) => self.release_top_level(top),
            None => Ok(()),
        }
    }
}

impl Drop for VulkanAccelerationBackend {
    fn drop(&mut self) {
        if let Err(err) = self.context.wait_idle() {
            warn!("Failed to wait for idle before releasing acceleration structures: {err}");
        }
        if let Err(err) = self.destroy_top_level() {
            warn!("Failed to release top-level structure: {err}");
        }
        let bottom: Vec<Structure> = self.bottom.drain().map(|(_, structure)| structure).collect();
        for structure in bottom {
            if let Err(err) = self.destroy_structure(structure) {
                warn!("Failed to release bottom-level structure: {err}");
            }
        }
    }
}

const fn align_up(value: u64, alignment: u64) -> u64 {
    if alignment <= 1 {
        value
    } else {
        value.div_ceil(alignment) * alignment
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scratch_alignment_rounds_up() {
        assert_eq!(align_up(0, 128), 0);
        assert_eq!(align_up(1, 128), 128);
        assert_eq!(align_up(256, 128), 256);
        assert_eq!(align_up(257, 1), 257);
    }

    #[test]
    fn top_level_flags_allow_refit() {
        assert!(TOP_LEVEL_FLAGS.contains(vk::BuildAccelerationStructureFlagsKHR::ALLOW_UPDATE));
        assert!(TOP_LEVEL_FLAGS.contains(vk::BuildAccelerationStructureFlagsKHR::PREFER_FAST_TRACE));
    }
}
