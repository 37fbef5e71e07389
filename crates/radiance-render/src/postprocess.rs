//! Post-processing stage sequencing.
//!
//! Stages run in a fixed order over two color buffers. A ping-pong stage
//! reads the current buffer, writes the other one, and the ring advances.
//! In-place and side-channel stages leave the ring alone. Tone mapping is
//! mandatory and writes the final color target.

use std::fmt;

use crate::error::{RenderError, Result, StageError};
use crate::ring::BufferRing;
use bitflags::bitflags;
use glam::{UVec2, Vec2};
use radiance_core::{
    DenoiserKind, RenderSettings, ResetConsumers, SettingsSnapshot, TemporalReset, UpscalerKind,
};
use tracing::{trace, warn};

/// A post-processing stage, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Denoise,
    Dlss,
    Fsr,
    Sharpen,
    ChromaticAberration,
    Bloom,
    FrameGeneration,
    ToneMap,
    ValidationOverlay,
}

/// How a stage uses the color ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    /// Writes back into the current buffer.
    InPlace,
    /// Reads the current buffer and writes the other; the ring advances.
    PingPong,
    /// Reads color without touching the ring.
    SideChannel,
    /// Reads the current buffer and writes the final color target.
    Resolve,
}

impl Stage {
    pub const COUNT: usize = 9;

    pub const ORDER: [Self; Self::COUNT] = [
        Self::Denoise,
        Self::Dlss,
        Self::Fsr,
        Self::Sharpen,
        Self::ChromaticAberration,
        Self::Bloom,
        Self::FrameGeneration,
        Self::ToneMap,
        Self::ValidationOverlay,
    ];

    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn kind(self) -> StageKind {
        match self {
            Self::Denoise => StageKind::InPlace,
            Self::Dlss | Self::Fsr | Self::Sharpen | Self::ChromaticAberration | Self::Bloom => {
                StageKind::PingPong
            }
            Self::FrameGeneration | Self::ValidationOverlay => StageKind::SideChannel,
            Self::ToneMap => StageKind::Resolve,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Denoise => "denoise",
            Self::Dlss => "dlss",
            Self::Fsr => "fsr",
            Self::Sharpen => "sharpen",
            Self::ChromaticAberration => "chromatic_aberration",
            Self::Bloom => "bloom",
            Self::FrameGeneration => "frame_generation",
            Self::ToneMap => "tone_map",
            Self::ValidationOverlay => "validation_overlay",
        }
    }

    const fn flag(self) -> StageSet {
        StageSet::from_bits_truncate(1 << self.index())
    }

    /// Temporal reset consumer this stage takes from, if any.
    const fn reset_consumer(self) -> Option<ResetConsumers> {
        match self {
            Self::Denoise => Some(ResetConsumers::DENOISER),
            Self::Dlss | Self::Fsr => Some(ResetConsumers::UPSCALER),
            _ => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

bitflags! {
    /// A set of stages.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub struct StageSet: u32 {
        const DENOISE = 1 << 0;
        const DLSS = 1 << 1;
        const FSR = 1 << 2;
        const SHARPEN = 1 << 3;
        const CHROMATIC_ABERRATION = 1 << 4;
        const BLOOM = 1 << 5;
        const FRAME_GENERATION = 1 << 6;
        const TONE_MAP = 1 << 7;
        const VALIDATION_OVERLAY = 1 << 8;
    }
}

impl StageSet {
    pub const fn has(self, stage: Stage) -> bool {
        self.contains(stage.flag())
    }
}

/// Stages the settings ask for. Availability is checked separately.
pub fn requested_stages(settings: &RenderSettings) -> StageSet {
    let post = &settings.post_processing;
    let mut stages = StageSet::TONE_MAP;

    let denoise = post.denoiser.kind != DenoiserKind::None;
    stages.set(StageSet::DENOISE, denoise);
    stages.set(
        StageSet::DLSS,
        post.super_resolution.upscaler == UpscalerKind::Dlss,
    );
    stages.set(
        StageSet::FSR,
        post.super_resolution.upscaler == UpscalerKind::Fsr,
    );
    stages.set(StageSet::SHARPEN, post.sharpen.enabled);
    stages.set(StageSet::CHROMATIC_ABERRATION, post.chromatic_aberration);
    stages.set(StageSet::BLOOM, post.bloom.enabled);
    stages.set(
        StageSet::FRAME_GENERATION,
        settings.frame_generation_requested(),
    );
    stages.set(
        StageSet::VALIDATION_OVERLAY,
        denoise && post.denoiser.validation_overlay,
    );

    stages
}

/// Per-frame values shared by every stage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameParams {
    pub frame_index: u64,
    pub render_size: UVec2,
    pub output_size: UVec2,
    pub jitter: Vec2,
}

/// What a stage sees when it runs.
#[derive(Debug, Clone, Copy)]
pub struct StageContext<'a> {
    pub frame: FrameParams,
    /// Whether this stage must drop its temporal state this frame.
    pub reset: bool,
    pub settings: &'a RenderSettings,
}

/// An external post-processing effect.
pub trait StageService<T> {
    fn is_available(&self) -> bool;

    fn process(
        &mut self,
        ctx: &StageContext<'_>,
        input: &T,
        output: &T,
    ) -> std::result::Result<(), StageError>;
}

/// Buffers handed to one sequencer run.
#[derive(Debug, Clone, Copy)]
pub struct SequenceTargets<'a, T> {
    /// Traced color; the ring starts here.
    pub primary: &'a T,
    pub scratch: &'a T,
    /// Tone-mapped output.
    pub final_color: &'a T,
}

/// Which of the run's buffers a stage touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Primary,
    Scratch,
    Final,
}

impl Slot {
    fn resolve<'a, T>(self, targets: &SequenceTargets<'a, T>) -> &'a T {
        match self {
            Self::Primary => targets.primary,
            Self::Scratch => targets.scratch,
            Self::Final => targets.final_color,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Turned off by a stage reporting unavailability earlier.
    Disabled,
    /// No service, or the service reports it cannot run.
    Unavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageRun {
    pub stage: Stage,
    pub input: Slot,
    pub output: Slot,
}

/// What one sequencer run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SequenceReport {
    /// Ring buffer tone mapping consumed.
    pub color: Option<Slot>,
    pub ran: Vec<StageRun>,
    pub skipped: Vec<(Stage, SkipReason)>,
}

impl SequenceReport {
    /// One line per stage that ran, as `stage: Input -> Output`.
    pub fn trace(&self) -> String {
        self.ran
            .iter()
            .map(|run| format!("{}: {:?} -> {:?}", run.stage, run.input, run.output))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Runs the post-processing chain each frame.
pub struct PostProcessSequencer<T> {
    services: [Option<Box<dyn StageService<T> + Send>>; Stage::COUNT],
    disabled: StageSet,
    disabled_at_version: u64,
}

impl<T> Default for PostProcessSequencer<T> {
    fn default() -> Self {
        Self {
            services: std::array::from_fn(|_| None),
            disabled: StageSet::empty(),
            disabled_at_version: 0,
        }
    }
}

impl<T> fmt::Debug for PostProcessSequencer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registered: Vec<Stage> = Stage::ORDER
            .into_iter()
            .filter(|stage| self.services[stage.index()].is_some())
            .collect();
        f.debug_struct("PostProcessSequencer")
            .field("registered", &registered)
            .field("disabled", &self.disabled)
            .finish()
    }
}

impl<T> PostProcessSequencer<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the service for a stage, replacing any previous one.
    pub fn register(&mut self, stage: Stage, service: Box<dyn StageService<T> + Send>) {
        self.services[stage.index()] = Some(service);
    }

    pub fn with_service(mut self, stage: Stage, service: Box<dyn StageService<T> + Send>) -> Self {
        self.register(stage, service);
        self
    }

    /// Stages disabled after reporting unavailability.
    pub const fn disabled(&self) -> StageSet {
        self.disabled
    }

    /// Run every enabled stage.
    ///
    /// A stage reporting [`StageError::Unavailable`] is skipped and stays
    /// disabled until the settings version changes. Tone mapping must run.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn run(
        &mut self,
        frame: FrameParams,
        settings: &SettingsSnapshot,
        reset: &TemporalReset,
        targets: SequenceTargets<'_, T>,
    ) -> Result<SequenceReport> {
        if settings.version() != self.disabled_at_version {
            self.disabled = StageSet::empty();
            self.disabled_at_version = settings.version();
        }

        let requested = requested_stages(settings.settings());
        let mut ring = BufferRing::new(Slot::Primary, Slot::Scratch);
        let mut report = SequenceReport::default();

        for stage in Stage::ORDER {
            if !requested.has(stage) {
                continue;
            }
            if self.disabled.has(stage) {
                report.skipped.push((stage, SkipReason::Disabled));
                continue;
            }
            let Some(service) = self.services[stage.index()]
                .as_mut()
                .filter(|service| service.is_available())
            else {
                if stage == Stage::ToneMap {
                    return Err(RenderError::MandatoryStageUnavailable(stage));
                }
                report.skipped.push((stage, SkipReason::Unavailable));
                continue;
            };

            let (input, output) = match stage.kind() {
                StageKind::InPlace => (*ring.current(), *ring.current()),
                StageKind::PingPong => (*ring.current(), *ring.other()),
                StageKind::SideChannel if stage == Stage::ValidationOverlay => {
                    (Slot::Final, Slot::Final)
                }
                StageKind::SideChannel => (*ring.current(), *ring.current()),
                StageKind::Resolve => (*ring.current(), Slot::Final),
            };

            let ctx = StageContext {
                frame,
                reset: stage
                    .reset_consumer()
                    .is_some_and(|consumer| reset.take(consumer)),
                settings: settings.settings(),
            };

            match service.process(&ctx, input.resolve(&targets), output.resolve(&targets)) {
                Ok(()) => {}
                Err(StageError::Unavailable(reason)) => {
                    if stage == Stage::ToneMap {
                        return Err(RenderError::MandatoryStageUnavailable(stage));
                    }
                    warn!(%stage, %reason, "Stage unavailable, disabling until settings change");
                    self.disabled |= stage.flag();
                    report.skipped.push((stage, SkipReason::Unavailable));
                    continue;
                }
                Err(source) => return Err(RenderError::Stage { stage, source }),
            }

            if stage.kind() == StageKind::PingPong {
                ring.advance();
            }
            if stage.kind() == StageKind::Resolve {
                report.color = Some(input);
            }
            report.ran.push(StageRun {
                stage,
                input,
                output,
            });
        }

        trace!(
            frame = frame.frame_index,
            ran = report.ran.len(),
            skipped = report.skipped.len(),
            "Post-processing complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use radiance_core::{ResetReason, UpscalerAvailability};
    use std::sync::{Arc, Mutex};

    type Log = Arc<Mutex<Vec<(Stage, u32, u32, bool)>>>;

    /// Records `(stage, input, output, reset)` for each call.
    struct Recorder {
        stage: Stage,
        log: Log,
        available: bool,
        fail_with: Option<fn() -> StageError>,
    }

    impl StageService<u32> for Recorder {
        fn is_available(&self) -> bool {
            self.available
        }

        fn process(
            &mut self,
            ctx: &StageContext<'_>,
            input: &u32,
            output: &u32,
        ) -> std::result::Result<(), StageError> {
            if let Some(fail) = self.fail_with {
                return Err(fail());
            }
            self.log
                .lock()
                .unwrap()
                .push((self.stage, *input, *output, ctx.reset));
            Ok(())
        }
    }

    const PRIMARY: u32 = 1;
    const SCRATCH: u32 = 2;
    const FINAL: u32 = 3;

    fn targets() -> SequenceTargets<'static, u32> {
        SequenceTargets {
            primary: &PRIMARY,
            scratch: &SCRATCH,
            final_color: &FINAL,
        }
    }

    fn frame() -> FrameParams {
        FrameParams {
            frame_index: 0,
            render_size: UVec2::new(1280, 720),
            output_size: UVec2::new(1920, 1080),
            jitter: Vec2::ZERO,
        }
    }

    fn sequencer_with_all(log: &Log) -> PostProcessSequencer<u32> {
        let mut sequencer = PostProcessSequencer::new();
        for stage in Stage::ORDER {
            sequencer.register(
                stage,
                Box::new(Recorder {
                    stage,
                    log: Arc::clone(log),
                    available: true,
                    fail_with: None,
                }),
            );
        }
        sequencer
    }

    fn snapshot(settings: RenderSettings) -> SettingsSnapshot {
        SettingsSnapshot::new(
            settings,
            UpscalerAvailability {
                dlss: true,
                fsr: true,
            },
        )
    }

    fn minimal_settings() -> RenderSettings {
        let mut settings = RenderSettings::default();
        let post = &mut settings.post_processing;
        post.denoiser.kind = DenoiserKind::None;
        post.super_resolution.upscaler = UpscalerKind::None;
        post.sharpen.enabled = false;
        post.chromatic_aberration = false;
        post.bloom.enabled = false;
        post.frame_generation = false;
        settings
    }

    fn full_settings() -> RenderSettings {
        let mut settings = RenderSettings::default();
        settings.latency = radiance_core::LatencyMode::On;
        let post = &mut settings.post_processing;
        post.denoiser.kind = DenoiserKind::ReLax;
        post.denoiser.validation_overlay = true;
        post.super_resolution.upscaler = UpscalerKind::Dlss;
        post.sharpen.enabled = true;
        post.chromatic_aberration = true;
        post.bloom.enabled = true;
        post.frame_generation = true;
        settings
    }

    #[test]
    fn only_tone_map_runs_when_everything_is_off() {
        let log = Log::default();
        let mut sequencer = sequencer_with_all(&log);
        let report = sequencer
            .run(frame(), &snapshot(minimal_settings()), &TemporalReset::new(), targets())
            .unwrap();

        assert_eq!(report.color, Some(Slot::Primary));
        assert_eq!(*log.lock().unwrap(), vec![(Stage::ToneMap, PRIMARY, FINAL, false)]);
        assert!(report.skipped.is_empty());
    }

    #[test]
    fn full_chain_order_and_buffers() {
        let log = Log::default();
        let mut sequencer = sequencer_with_all(&log);
        let report = sequencer
            .run(frame(), &snapshot(full_settings()), &TemporalReset::new(), targets())
            .unwrap();

        insta::assert_snapshot!(report.trace(), @r"
        denoise: Primary -> Primary
        dlss: Primary -> Scratch
        sharpen: Scratch -> Primary
        chromatic_aberration: Primary -> Scratch
        bloom: Scratch -> Primary
        frame_generation: Primary -> Primary
        tone_map: Primary -> Final
        validation_overlay: Final -> Final
        ");
        assert_eq!(report.color, Some(Slot::Primary));
    }

    #[test]
    fn single_ping_pong_leaves_result_in_scratch() {
        let log = Log::default();
        let mut sequencer = sequencer_with_all(&log);
        let mut settings = minimal_settings();
        settings.post_processing.bloom.enabled = true;

        let report = sequencer
            .run(frame(), &snapshot(settings), &TemporalReset::new(), targets())
            .unwrap();

        assert_eq!(report.color, Some(Slot::Scratch));
        assert_eq!(
            log.lock().unwrap().last(),
            Some(&(Stage::ToneMap, SCRATCH, FINAL, false))
        );
    }

    #[test]
    fn unavailable_service_is_skipped() {
        let log = Log::default();
        let mut sequencer = sequencer_with_all(&log);
        sequencer.register(
            Stage::Sharpen,
            Box::new(Recorder {
                stage: Stage::Sharpen,
                log: Arc::clone(&log),
                available: false,
                fail_with: None,
            }),
        );
        let mut settings = minimal_settings();
        settings.post_processing.sharpen.enabled = true;

        let report = sequencer
            .run(frame(), &snapshot(settings), &TemporalReset::new(), targets())
            .unwrap();

        assert_eq!(report.skipped, vec![(Stage::Sharpen, SkipReason::Unavailable)]);
        assert_eq!(report.color, Some(Slot::Primary));
    }

    #[test]
    fn mid_frame_unavailability_disables_until_settings_change() {
        let log = Log::default();
        let mut sequencer = sequencer_with_all(&log);
        sequencer.register(
            Stage::Bloom,
            Box::new(Recorder {
                stage: Stage::Bloom,
                log: Arc::clone(&log),
                available: true,
                fail_with: Some(|| StageError::Unavailable("out of memory".into())),
            }),
        );
        let mut settings = minimal_settings();
        settings.post_processing.bloom.enabled = true;
        let mut snapshot = snapshot(settings);
        let reset = TemporalReset::new();

        let first = sequencer.run(frame(), &snapshot, &reset, targets()).unwrap();
        assert_eq!(first.skipped, vec![(Stage::Bloom, SkipReason::Unavailable)]);
        assert_eq!(first.color, Some(Slot::Primary));

        let second = sequencer.run(frame(), &snapshot, &reset, targets()).unwrap();
        assert_eq!(second.skipped, vec![(Stage::Bloom, SkipReason::Disabled)]);

        settings.post_processing.bloom.strength = 0.25;
        snapshot.apply(settings, UpscalerAvailability::default());
        let third = sequencer.run(frame(), &snapshot, &reset, targets()).unwrap();
        assert_eq!(third.skipped, vec![(Stage::Bloom, SkipReason::Unavailable)]);
    }

    #[test]
    fn missing_tone_map_is_fatal() {
        let mut sequencer = PostProcessSequencer::<u32>::new();
        let result = sequencer.run(
            frame(),
            &snapshot(minimal_settings()),
            &TemporalReset::new(),
            targets(),
        );

        assert!(matches!(
            result,
            Err(RenderError::MandatoryStageUnavailable(Stage::ToneMap))
        ));
    }

    #[test]
    fn stage_failure_propagates() {
        let log = Log::default();
        let mut sequencer = sequencer_with_all(&log);
        sequencer.register(
            Stage::ChromaticAberration,
            Box::new(Recorder {
                stage: Stage::ChromaticAberration,
                log: Arc::clone(&log),
                available: true,
                fail_with: Some(|| StageError::Failed("dispatch failed".into())),
            }),
        );
        let mut settings = minimal_settings();
        settings.post_processing.chromatic_aberration = true;

        let result = sequencer.run(frame(), &snapshot(settings), &TemporalReset::new(), targets());
        assert!(matches!(
            result,
            Err(RenderError::Stage {
                stage: Stage::ChromaticAberration,
                source: StageError::Failed(_)
            })
        ));
    }

    #[test]
    fn denoiser_and_upscaler_consume_their_reset() {
        let log = Log::default();
        let mut sequencer = sequencer_with_all(&log);
        let reset = TemporalReset::new();
        reset.request(ResetReason::External);

        let snapshot = snapshot(full_settings());
        sequencer.run(frame(), &snapshot, &reset, targets()).unwrap();
        let resets: Vec<(Stage, bool)> = log
            .lock()
            .unwrap()
            .iter()
            .map(|(stage, _, _, reset)| (*stage, *reset))
            .filter(|(_, reset)| *reset)
            .collect();

        assert_eq!(resets, vec![(Stage::Denoise, true), (Stage::Dlss, true)]);
        assert!(reset.is_pending(ResetConsumers::HISTORY));
        assert!(!reset.is_pending(ResetConsumers::DENOISER | ResetConsumers::UPSCALER));
    }

    #[test]
    fn requested_stages_follow_settings() {
        let mut settings = full_settings();
        settings.latency = radiance_core::LatencyMode::Off;
        let stages = requested_stages(&settings);

        assert!(!stages.has(Stage::FrameGeneration));
        assert!(stages.has(Stage::Dlss));
        assert!(!stages.has(Stage::Fsr));

        settings.post_processing.denoiser.kind = DenoiserKind::None;
        let stages = requested_stages(&settings);
        assert!(!stages.has(Stage::Denoise));
        assert!(!stages.has(Stage::ValidationOverlay));
        assert!(stages.has(Stage::ToneMap));
    }

    #[test]
    fn stage_flags_match_order() {
        for stage in Stage::ORDER {
            assert_eq!(stage.flag().bits(), 1 << stage.index());
        }
        assert_eq!(StageSet::all().bits().count_ones() as usize, Stage::COUNT);
    }
}
