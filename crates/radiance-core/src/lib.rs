//! Core types, settings and temporal state for the Radiance renderer.
//!
//! This crate provides the foundational types shared by the other crates:
//! - Mesh identities and the per-frame render instance model
//! - The versioned render settings snapshot
//! - The temporal accumulation reset flag
//! - Render and material texture tables

pub mod error;
pub mod settings;
pub mod temporal;
pub mod texture;
pub mod types;

pub use error::{Error, Result};
pub use settings::{
    select_upscaler, DenoiserKind, LatencyMode, QualityMode, RenderSettings, SettingsChange,
    SettingsSnapshot, ToneMapOperator, UpscalerAvailability, UpscalerKind,
};
pub use temporal::{ResetConsumers, ResetReason, TemporalReset};
pub use texture::{
    DescriptorSlots, ExtentClass, MaterialTextureMap, MaterialTextureSlots, TextureFormat,
    TextureType,
};
pub use types::{Handedness, MeshId, RenderInstance};

/// Renderer-wide constants
pub mod constants {
    /// Instance mask that makes an instance visible to every ray type
    pub const INSTANCE_MASK_ALL: u8 = 0xFF;
    /// Number of previous/current history texture pairs
    pub const HISTORY_PAIR_COUNT: usize = 4;
    /// Jitter phases at native resolution; scaled by the upscale area ratio
    pub const BASE_JITTER_PHASES: f32 = 8.0;
}
