//! Top-level structure builder.
//!
//! The instance list is regenerated from the frame's render instances on
//! every call. Only the build mode is incremental: a refit is issued when the
//! caller allows it and the previous full build had the same instance count.

use crate::backend::{AccelerationBackend, BuildMode, InstanceDescriptor, TlasHandle};
use crate::blas::BlasCache;
use crate::error::{AccelError, Result};
use ash::vk;
use glam::Mat4;
use radiance_core::constants::INSTANCE_MASK_ALL;
use radiance_core::RenderInstance;
use tracing::{debug, trace};

/// Convert a column-major matrix into the row-major 3x4 layout of instances.
pub fn to_row_major_3x4(matrix: Mat4) -> [f32; 12] {
    let mut out = [0.0; 12];
    for (row, chunk) in out.chunks_exact_mut(4).enumerate() {
        chunk.copy_from_slice(&matrix.row(row).to_array());
    }
    out
}

/// Instance flags for a render instance.
///
/// Visible instances are forced opaque, with counter-clockwise front faces
/// for right-handed meshes. Invisible instances stay in the structure and
/// are forced non-opaque so any-hit shaders can discard them.
pub fn instance_flags(instance: &RenderInstance) -> vk::GeometryInstanceFlagsKHR {
    if !instance.visible {
        return vk::GeometryInstanceFlagsKHR::FORCE_NO_OPAQUE;
    }

    let mut flags = vk::GeometryInstanceFlagsKHR::FORCE_OPAQUE;
    if instance.handedness.is_right_handed() {
        flags |= vk::GeometryInstanceFlagsKHR::TRIANGLE_FLIP_FACING;
    }
    flags
}

/// Builds and refits the top-level structure.
#[derive(Debug, Default)]
pub struct TlasBuilder {
    /// Instance count of the last full build.
    built_count: Option<usize>,
    handle: Option<TlasHandle>,
    descriptors: Vec<InstanceDescriptor>,
}

impl TlasBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the instance list and build or refit the structure.
    ///
    /// Every instance's mesh must already be in `blas`. Returns the build
    /// mode actually used, which is [`BuildMode::Build`] whenever a refit is
    /// not possible regardless of `update_only`.
    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    pub fn rebuild<B: AccelerationBackend + ?Sized>(
        &mut self,
        instances: &[RenderInstance],
        blas: &BlasCache,
        update_only: bool,
        backend: &mut B,
    ) -> Result<BuildMode> {
        self.write_descriptors(instances, blas)?;

        let mode = self.select_mode(instances.len(), update_only);
        match backend.build_top_level(&self.descriptors, mode) {
            Ok(handle) => {
                if mode == BuildMode::Build {
                    self.built_count = Some(instances.len());
                }
                self.handle = Some(handle);
                trace!(instances = instances.len(), ?mode, "Top-level structure built");
                Ok(mode)
            }
            Err(err) => {
                self.invalidate();
                Err(err)
            }
        }
    }

    fn write_descriptors(&mut self, instances: &[RenderInstance], blas: &BlasCache) -> Result<()> {
        if instances.len() > InstanceDescriptor::MAX_INSTANCE_ID as usize + 1 {
            return Err(AccelError::TooManyInstances(instances.len()));
        }

        self.descriptors.clear();
        self.descriptors.reserve(instances.len());
        for (index, (instance_id, instance)) in (0u32..).zip(instances).enumerate() {
            let bottom = blas
                .get(instance.mesh)
                .ok_or(AccelError::MissingBottomLevel {
                    mesh: instance.mesh,
                    instance: index,
                })?;

            self.descriptors.push(InstanceDescriptor::new(
                to_row_major_3x4(instance.corrected_transform()),
                instance_id,
                INSTANCE_MASK_ALL,
                instance_flags(instance),
                bottom.device_address,
            ));
        }
        Ok(())
    }

    fn select_mode(&self, count: usize, update_only: bool) -> BuildMode {
        if !update_only {
            return BuildMode::Build;
        }

        match self.built_count {
            Some(built) if built == count => BuildMode::Update,
            Some(built) => {
                debug!(built, count, "Instance count changed, forcing full top-level build");
                BuildMode::Build
            }
            None => {
                debug!("No prior full top-level build, forcing full build");
                BuildMode::Build
            }
        }
    }

    /// Forget the previous build so the next call performs a full build.
    pub fn invalidate(&mut self) {
        self.built_count = None;
        self.handle = None;
    }

    /// Destroy the structure and forget it.
    pub fn destroy<B: AccelerationBackend + ?Sized>(&mut self, backend: &mut B) -> Result<()> {
        self.invalidate();
        backend.destroy_top_level()
    }

    /// Current structure, if a build succeeded since the last invalidation.
    pub const fn handle(&self) -> Option<TlasHandle> {
        self.handle
    }

    /// Descriptors submitted by the last call.
    pub fn descriptors(&self) -> &[InstanceDescriptor] {
        &self.descriptors
    }
}
