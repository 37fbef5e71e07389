//! Render settings as an explicit, versioned snapshot.
//!
//! The frame loop never reads settings from shared mutable state. UI or
//! tooling builds a new [`RenderSettings`] value and hands it to
//! [`SettingsSnapshot::apply`], which clamps it, resolves upscaler fallback
//! against device availability, bumps the version, and reports what changed
//! so the caller can renegotiate resolution or reset temporal state.

use std::sync::Arc;

use bitflags::bitflags;
use glam::UVec2;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::temporal::ResetReason;
use crate::types::min_dimension;

/// Super-resolution upscaler selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UpscalerKind {
    #[default]
    None,
    /// Quality-mode driven upscaler with an optimal-size query (DLSS-like).
    Dlss,
    /// Upscaler with fixed per-quality ratios and a native mode (FSR-like).
    Fsr,
}

/// Super-resolution quality tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QualityMode {
    #[default]
    Auto,
    Native,
    Quality,
    Balanced,
    Performance,
    UltraPerformance,
}

impl QualityMode {
    /// Resolve `Auto` against the output size; other modes pass through.
    ///
    /// Buckets on the smaller output dimension: up to 720 renders natively,
    /// up to 1440 uses the quality tier, up to 2160 the performance tier, and
    /// anything larger the ultra-performance tier.
    pub fn resolve(self, output_size: UVec2) -> Self {
        if self != Self::Auto {
            return self;
        }
        match min_dimension(output_size) {
            0..=720 => Self::Native,
            721..=1440 => Self::Quality,
            1441..=2160 => Self::Performance,
            _ => Self::UltraPerformance,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DenoiserKind {
    #[default]
    None,
    ReBlur,
    ReLax,
}

/// Low-latency mode; frame generation requires it to be on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LatencyMode {
    #[default]
    Off,
    On,
    OnWithBoost,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ToneMapOperator {
    None,
    Saturate,
    Reinhard,
    #[default]
    AcesFilmic,
}

/// Color primary rotation applied by the HDR (ST.2084) tone mapper.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColorPrimaryRotation {
    #[default]
    HdtvToUhdtv,
    DciP3D65ToUhdtv,
    HdtvToDciP3D65,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraSettings {
    /// Horizontal field of view in degrees.
    pub horizontal_fov: f32,
    pub jitter: bool,
}

impl CameraSettings {
    pub const MIN_HORIZONTAL_FOV: f32 = 30.0;
    pub const MAX_HORIZONTAL_FOV: f32 = 120.0;
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            horizontal_fov: 90.0,
            jitter: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightSamplingSettings {
    pub enabled: bool,
    pub local_light_samples: u32,
    pub brdf_samples: u32,
    pub spatio_temporal_samples: u32,
}

impl LightSamplingSettings {
    pub const MAX_LOCAL_LIGHT_SAMPLES: u32 = 32;
    pub const MAX_BRDF_SAMPLES: u32 = 8;
    pub const MAX_SPATIO_TEMPORAL_SAMPLES: u32 = 8;
}

impl Default for LightSamplingSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            local_light_samples: 8,
            brdf_samples: 1,
            spatio_temporal_samples: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaytracingSettings {
    pub russian_roulette: bool,
    pub bounces: u32,
    pub samples_per_pixel: u32,
    pub light_sampling: LightSamplingSettings,
}

impl RaytracingSettings {
    pub const MAX_BOUNCES: u32 = 32;
    pub const MAX_SAMPLES_PER_PIXEL: u32 = 16;
}

impl Default for RaytracingSettings {
    fn default() -> Self {
        Self {
            russian_roulette: true,
            bounces: 3,
            samples_per_pixel: 1,
            light_sampling: LightSamplingSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DenoiserSettings {
    pub kind: DenoiserKind,
    pub validation_overlay: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuperResolutionSettings {
    pub upscaler: UpscalerKind,
    pub quality: QualityMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SharpenSettings {
    pub enabled: bool,
    /// Sharpness in `0.0..=1.0`.
    pub sharpness: f32,
}

impl Default for SharpenSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            sharpness: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BloomSettings {
    pub enabled: bool,
    /// Strength in `0.0..=1.0`.
    pub strength: f32,
}

impl Default for BloomSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            strength: 0.05,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HdrToneMapping {
    pub paper_white_nits: f32,
    pub color_primary_rotation: ColorPrimaryRotation,
}

impl HdrToneMapping {
    pub const MIN_PAPER_WHITE_NITS: f32 = 50.0;
    pub const MAX_PAPER_WHITE_NITS: f32 = 10_000.0;
}

impl Default for HdrToneMapping {
    fn default() -> Self {
        Self {
            paper_white_nits: 200.0,
            color_primary_rotation: ColorPrimaryRotation::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SdrToneMapping {
    pub operator: ToneMapOperator,
    /// Exposure in stops.
    pub exposure: f32,
}

impl SdrToneMapping {
    pub const MIN_EXPOSURE: f32 = -10.0;
    pub const MAX_EXPOSURE: f32 = 10.0;
}

impl Default for SdrToneMapping {
    fn default() -> Self {
        Self {
            operator: ToneMapOperator::default(),
            exposure: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ToneMappingSettings {
    pub hdr: HdrToneMapping,
    pub sdr: SdrToneMapping,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PostProcessingSettings {
    pub denoiser: DenoiserSettings,
    pub super_resolution: SuperResolutionSettings,
    pub frame_generation: bool,
    pub sharpen: SharpenSettings,
    pub chromatic_aberration: bool,
    pub bloom: BloomSettings,
    pub tone_mapping: ToneMappingSettings,
}

/// Complete render configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RenderSettings {
    pub hdr: bool,
    pub latency: LatencyMode,
    pub camera: CameraSettings,
    pub raytracing: RaytracingSettings,
    pub post_processing: PostProcessingSettings,
}

impl RenderSettings {
    /// Copy with every numeric value clamped to its supported range.
    #[must_use]
    pub fn clamped(mut self) -> Self {
        let camera = &mut self.camera;
        camera.horizontal_fov = camera.horizontal_fov.clamp(
            CameraSettings::MIN_HORIZONTAL_FOV,
            CameraSettings::MAX_HORIZONTAL_FOV,
        );

        let rt = &mut self.raytracing;
        rt.bounces = rt.bounces.min(RaytracingSettings::MAX_BOUNCES);
        rt.samples_per_pixel = rt
            .samples_per_pixel
            .clamp(1, RaytracingSettings::MAX_SAMPLES_PER_PIXEL);
        let lights = &mut rt.light_sampling;
        lights.local_light_samples = lights
            .local_light_samples
            .clamp(1, LightSamplingSettings::MAX_LOCAL_LIGHT_SAMPLES);
        lights.brdf_samples = lights.brdf_samples.min(LightSamplingSettings::MAX_BRDF_SAMPLES);
        lights.spatio_temporal_samples = lights
            .spatio_temporal_samples
            .min(LightSamplingSettings::MAX_SPATIO_TEMPORAL_SAMPLES);

        let post = &mut self.post_processing;
        post.sharpen.sharpness = post.sharpen.sharpness.clamp(0.0, 1.0);
        post.bloom.strength = post.bloom.strength.clamp(0.0, 1.0);
        let tone = &mut post.tone_mapping;
        tone.hdr.paper_white_nits = tone.hdr.paper_white_nits.clamp(
            HdrToneMapping::MIN_PAPER_WHITE_NITS,
            HdrToneMapping::MAX_PAPER_WHITE_NITS,
        );
        tone.sdr.exposure = tone
            .sdr
            .exposure
            .clamp(SdrToneMapping::MIN_EXPOSURE, SdrToneMapping::MAX_EXPOSURE);

        self
    }

    /// Whether frame generation should run given the latency mode.
    pub fn frame_generation_requested(&self) -> bool {
        self.post_processing.frame_generation && self.latency != LatencyMode::Off
    }

    /// Categories that differ between `self` and `newer`.
    pub fn diff(&self, newer: &Self) -> SettingsChange {
        let mut change = SettingsChange::empty();

        if self.camera.horizontal_fov.to_bits() != newer.camera.horizontal_fov.to_bits() {
            change |= SettingsChange::LENS;
        }
        if self.camera.jitter != newer.camera.jitter {
            change |= SettingsChange::JITTER;
        }
        if self.raytracing != newer.raytracing {
            change |= SettingsChange::RAYTRACING;
        }

        let (old, new) = (&self.post_processing, &newer.post_processing);
        if old.denoiser.kind != new.denoiser.kind {
            change |= SettingsChange::DENOISER;
        }
        if old.super_resolution != new.super_resolution {
            change |= SettingsChange::UPSCALER;
        }
        if old.denoiser.validation_overlay != new.denoiser.validation_overlay
            || old.frame_generation != new.frame_generation
            || old.sharpen != new.sharpen
            || old.chromatic_aberration != new.chromatic_aberration
            || old.bloom != new.bloom
            || old.tone_mapping != new.tone_mapping
        {
            change |= SettingsChange::POST_PROCESS;
        }
        if self.hdr != newer.hdr || self.latency != newer.latency {
            change |= SettingsChange::DISPLAY;
        }

        change
    }
}

bitflags! {
    /// Categories of a settings update.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SettingsChange: u32 {
        const LENS = 1 << 0;
        const JITTER = 1 << 1;
        const RAYTRACING = 1 << 2;
        const DENOISER = 1 << 3;
        /// Upscaler or quality mode; requires resolution negotiation.
        const UPSCALER = 1 << 4;
        const POST_PROCESS = 1 << 5;
        const DISPLAY = 1 << 6;
    }
}

impl SettingsChange {
    /// Whether resolution must be renegotiated.
    pub const fn requires_negotiation(self) -> bool {
        self.contains(Self::UPSCALER)
    }

    /// Temporal reset reasons implied by this change.
    pub fn reset_reasons(self) -> Vec<ResetReason> {
        [
            (Self::LENS, ResetReason::LensChanged),
            (Self::JITTER, ResetReason::JitterToggled),
            (Self::RAYTRACING, ResetReason::RaytracingChanged),
            (Self::DENOISER, ResetReason::DenoiserChanged),
            (Self::UPSCALER, ResetReason::UpscalerChanged),
        ]
        .into_iter()
        .filter(|(flag, _)| self.contains(*flag))
        .map(|(_, reason)| reason)
        .collect()
    }
}

/// Which upscalers the current device and drivers support.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpscalerAvailability {
    pub dlss: bool,
    pub fsr: bool,
}

impl UpscalerAvailability {
    pub const fn supports(self, kind: UpscalerKind) -> bool {
        match kind {
            UpscalerKind::None => true,
            UpscalerKind::Dlss => self.dlss,
            UpscalerKind::Fsr => self.fsr,
        }
    }
}

/// Apply upscaler fallback: an unsupported selection falls back to the
/// other upscaler when available, otherwise to no upscaling.
pub fn select_upscaler(requested: UpscalerKind, available: UpscalerAvailability) -> UpscalerKind {
    match requested {
        UpscalerKind::Dlss if !available.dlss => {
            if available.fsr {
                UpscalerKind::Fsr
            } else {
                UpscalerKind::None
            }
        }
        UpscalerKind::Fsr if !available.fsr => {
            if available.dlss {
                UpscalerKind::Dlss
            } else {
                UpscalerKind::None
            }
        }
        kind => kind,
    }
}

/// Immutable, versioned settings value shared with the frame loop.
#[derive(Debug, Clone)]
pub struct SettingsSnapshot {
    version: u64,
    settings: Arc<RenderSettings>,
}

impl SettingsSnapshot {
    /// Initial snapshot at version 0. Values are clamped and the upscaler
    /// selection is resolved against `available`.
    pub fn new(settings: RenderSettings, available: UpscalerAvailability) -> Self {
        Self {
            version: 0,
            settings: Arc::new(Self::normalize(settings, available)),
        }
    }

    pub const fn version(&self) -> u64 {
        self.version
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    /// Shared handle to the current settings value.
    pub fn share(&self) -> Arc<RenderSettings> {
        Arc::clone(&self.settings)
    }

    /// Replace the settings, returning what changed.
    ///
    /// The version only advances when something actually changed.
    pub fn apply(
        &mut self,
        settings: RenderSettings,
        available: UpscalerAvailability,
    ) -> SettingsChange {
        let settings = Self::normalize(settings, available);
        let change = self.settings.diff(&settings);
        if !change.is_empty() {
            self.version += 1;
            self.settings = Arc::new(settings);
            info!(version = self.version, ?change, "Render settings updated");
        }
        change
    }

    fn normalize(settings: RenderSettings, available: UpscalerAvailability) -> RenderSettings {
        let mut settings = settings.clamped();
        let requested = settings.post_processing.super_resolution.upscaler;
        let selected = select_upscaler(requested, available);
        if selected != requested {
            warn!(?requested, ?selected, "Upscaler unavailable, falling back");
            settings.post_processing.super_resolution.upscaler = selected;
        }
        settings
    }
}
