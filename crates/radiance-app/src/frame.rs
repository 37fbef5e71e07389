//! Per-frame tracing interface and frame results.

use radiance_core::{MaterialTextureSlots, RenderSettings, TextureType};
use radiance_render::{
    CameraUniforms, FrameParams, HistoryBuffers, RenderTargets, SequenceReport, Slot,
};
use radiance_rt::TlasHandle;

/// Everything the ray tracer reads for one frame.
pub struct TraceInputs<'a, T> {
    pub frame: FrameParams,
    pub tlas: TlasHandle,
    /// Material slots per instance, indexed by instance id.
    pub materials: &'a [MaterialTextureSlots],
    pub camera: &'a CameraUniforms,
    pub settings: &'a RenderSettings,
    pub targets: &'a RenderTargets<T>,
    pub history: &'a HistoryBuffers<T>,
    /// Whether history must be ignored this frame.
    pub reset: bool,
}

/// External ray-tracing pass producing color and auxiliary buffers at
/// render resolution.
pub trait RaytracingBackend<T> {
    fn trace(&mut self, inputs: &TraceInputs<'_, T>) -> radiance_render::Result<()>;

    /// Block until all submitted GPU work has finished.
    fn wait_idle(&mut self) -> radiance_render::Result<()>;
}

/// What one call to `run_frame` produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameOutput {
    pub frame_index: u64,
    /// Texture holding the composed color tone mapping consumed. `None`
    /// when no scene is published.
    pub composed: Option<TextureType>,
    pub post_process: Option<SequenceReport>,
}

impl FrameOutput {
    pub const fn rendered(&self) -> bool {
        self.composed.is_some()
    }
}

/// Texture backing a sequencer slot.
pub(crate) const fn slot_texture(slot: Slot) -> Option<TextureType> {
    match slot {
        Slot::Primary => Some(TextureType::Color),
        Slot::Scratch => Some(TextureType::FinalColor),
        Slot::Final => None,
    }
}
