//! Per-frame render orchestration for the Radiance renderer.
//!
//! This crate provides:
//! - Render resolution negotiation and the matching jitter pattern
//! - Camera matrices with previous-frame history
//! - Render targets and previous/current history texture pairs
//! - The post-processing sequencer and its stage service trait

pub mod camera;
pub mod error;
pub mod history;
pub mod jitter;
pub mod postprocess;
pub mod resolution;
pub mod ring;
pub mod targets;
pub mod vulkan;

pub use camera::{Camera, CameraHistory, CameraUniforms};
pub use error::{RenderError, Result, StageError};
pub use history::{HistoryBuffers, HISTORY_PAIRS};
pub use jitter::{apply_jitter, halton, JitterPattern};
pub use postprocess::{
    requested_stages, FrameParams, PostProcessSequencer, SequenceReport, SequenceTargets,
    SkipReason, Slot, Stage, StageContext, StageKind, StageRun, StageService, StageSet,
};
pub use resolution::{Negotiation, ResolutionNegotiator, ResolutionState, UpscalerQuery};
pub use ring::BufferRing;
pub use targets::{RenderTargets, TargetExtents, TextureAllocator};
pub use vulkan::{VulkanTextureAllocator, TARGET_LAYOUT};
