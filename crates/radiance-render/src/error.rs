//! Render pipeline error types.

use crate::postprocess::Stage;
use radiance_core::TextureType;
use radiance_gpu::GpuError;
use thiserror::Error;

/// Errors raised by the render pipeline.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error(transparent)]
    Core(#[from] radiance_core::Error),

    #[error(transparent)]
    Gpu(#[from] GpuError),

    /// A texture was looked up before it was allocated.
    #[error("Texture {0} is not allocated")]
    MissingTexture(TextureType),

    /// A post-processing stage failed for a reason other than unavailability.
    #[error("Stage {stage} failed: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: StageError,
    },

    /// A stage that must run every frame is missing or unavailable.
    #[error("Mandatory stage {0} is unavailable")]
    MandatoryStageUnavailable(Stage),
}

impl RenderError {
    /// Whether the underlying device was lost.
    pub fn is_device_lost(&self) -> bool {
        match self {
            Self::Gpu(err) => err.is_device_lost(),
            Self::Stage {
                source: StageError::Gpu(err),
                ..
            } => err.is_device_lost(),
            _ => false,
        }
    }
}

/// Errors reported by an external stage service.
#[derive(Error, Debug)]
pub enum StageError {
    /// The feature cannot run on this device right now. The stage is
    /// skipped and stays disabled until the settings change.
    #[error("Feature unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Gpu(#[from] GpuError),

    #[error("{0}")]
    Failed(String),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, RenderError>;
