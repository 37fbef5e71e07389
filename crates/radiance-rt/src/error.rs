//! Acceleration-structure error types.

use ash::vk;
use radiance_core::MeshId;
use radiance_gpu::GpuError;
use thiserror::Error;

/// Errors raised while building or updating acceleration structures.
#[derive(Error, Debug)]
pub enum AccelError {
    #[error(transparent)]
    Gpu(#[from] GpuError),

    /// The mesh was never registered with the geometry cache.
    #[error("No geometry registered for {0}")]
    MissingGeometry(MeshId),

    /// An instance references a mesh whose bottom-level structure was not built.
    #[error("Instance {instance} references {mesh} which has no bottom-level structure")]
    MissingBottomLevel { mesh: MeshId, instance: usize },

    /// Geometry that cannot produce a valid build.
    #[error("Invalid geometry for {mesh}: {reason}")]
    InvalidGeometry { mesh: MeshId, reason: String },

    /// Instance ids are 24 bits wide.
    #[error("{0} instances exceed the instance id range")]
    TooManyInstances(usize),

    /// The backend was asked to refit a structure it cannot refit.
    #[error("Top-level update requested without a compatible prior build")]
    UpdateWithoutBuild,
}

impl AccelError {
    /// Whether the underlying device was lost.
    pub fn is_device_lost(&self) -> bool {
        matches!(self, Self::Gpu(err) if err.is_device_lost())
    }
}

impl From<vk::Result> for AccelError {
    fn from(result: vk::Result) -> Self {
        Self::Gpu(GpuError::from(result))
    }
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, AccelError>;
