//! Renderer error types.

use std::path::PathBuf;

use radiance_gpu::GpuError;
use radiance_render::RenderError;
use radiance_rt::AccelError;
use thiserror::Error;

/// Errors returned from the frame orchestrator.
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Core(#[from] radiance_core::Error),

    #[error(transparent)]
    Gpu(#[from] GpuError),

    #[error(transparent)]
    Acceleration(#[from] AccelError),

    #[error(transparent)]
    Render(#[from] RenderError),

    /// The loader thread failed in a way the scene provider did not report
    /// as a scene problem.
    #[error("Scene loader failed for {}: {message}", path.display())]
    SceneLoader { path: PathBuf, message: String },

    #[error("Light provisioning failed: {0:#}")]
    Lights(anyhow::Error),

    #[error("Failed to spawn scene loader thread: {0}")]
    Spawn(#[source] std::io::Error),
}

impl AppError {
    /// Whether the underlying device was lost.
    pub fn is_device_lost(&self) -> bool {
        match self {
            Self::Gpu(err) => err.is_device_lost(),
            Self::Acceleration(err) => err.is_device_lost(),
            Self::Render(err) => err.is_device_lost(),
            _ => false,
        }
    }
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, AppError>;
