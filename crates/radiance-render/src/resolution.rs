//! Internal render resolution negotiation.
//!
//! The output size is what gets presented; the render size is what the ray
//! tracer fills. With an upscaler active the render size comes from the
//! upscaler's optimal settings for the chosen quality mode.

use crate::jitter::JitterPattern;
use glam::UVec2;
use radiance_core::{Error, QualityMode, ResetReason, TemporalReset, UpscalerKind};
use tracing::{debug, warn};

/// Upscaler capability queried during negotiation.
pub trait UpscalerQuery {
    fn is_available(&self) -> bool;

    /// Optimal input size for `output_size` at `quality`, or `None` if the
    /// upscaler cannot serve this combination.
    fn optimal_render_size(&self, output_size: UVec2, quality: QualityMode) -> Option<UVec2>;
}

/// Outcome of the last negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolutionState {
    pub output_size: UVec2,
    pub render_size: UVec2,
    pub upscaler: UpscalerKind,
    /// Resolved quality mode; never `Auto`.
    pub quality: QualityMode,
}

impl ResolutionState {
    pub fn is_upscaling(&self) -> bool {
        self.render_size != self.output_size
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Negotiation {
    pub state: ResolutionState,
    /// Whether resolution-dependent resources must be reallocated.
    pub changed: bool,
    pub jitter: JitterPattern,
}

/// Computes the render resolution and detects resolution events.
#[derive(Debug, Default)]
pub struct ResolutionNegotiator {
    state: Option<ResolutionState>,
    jitter: JitterPattern,
}

impl ResolutionNegotiator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Negotiate the render size for `output_size`.
    ///
    /// Any change to the resulting state requests a
    /// [`ResetReason::ResolutionChanged`] reset. Repeating a call with the
    /// same inputs reports no change.
    pub fn negotiate(
        &mut self,
        output_size: UVec2,
        upscaler: UpscalerKind,
        quality: QualityMode,
        query: Option<&dyn UpscalerQuery>,
        reset: &TemporalReset,
    ) -> Result<Negotiation, Error> {
        if output_size.x == 0 || output_size.y == 0 {
            return Err(Error::InvalidOutputSize {
                width: output_size.x,
                height: output_size.y,
            });
        }

        let state = Self::resolve(output_size, upscaler, quality, query);
        let changed = self.state != Some(state);
        if changed {
            self.jitter = JitterPattern::for_sizes(state.output_size, state.render_size);
            debug!(
                output = ?state.output_size,
                render = ?state.render_size,
                upscaler = ?state.upscaler,
                quality = ?state.quality,
                phases = self.jitter.phases(),
                "Resolution negotiated"
            );
            self.state = Some(state);
            reset.request(ResetReason::ResolutionChanged);
        }

        Ok(Negotiation {
            state,
            changed,
            jitter: self.jitter,
        })
    }

    fn resolve(
        output_size: UVec2,
        upscaler: UpscalerKind,
        quality: QualityMode,
        query: Option<&dyn UpscalerQuery>,
    ) -> ResolutionState {
        let native = ResolutionState {
            output_size,
            render_size: output_size,
            upscaler: UpscalerKind::None,
            quality: QualityMode::Native,
        };
        if upscaler == UpscalerKind::None {
            return native;
        }

        let Some(query) = query.filter(|query| query.is_available()) else {
            warn!(?upscaler, "Upscaler unavailable, rendering at output resolution");
            return native;
        };

        let quality = quality.resolve(output_size);
        let render_size = if quality == QualityMode::Native {
            output_size
        } else {
            match query.optimal_render_size(output_size, quality) {
                Some(size) => size.clamp(UVec2::ONE, output_size),
                None => {
                    warn!(
                        ?upscaler,
                        ?quality,
                        "Upscaler has no settings for this output, rendering at output resolution"
                    );
                    return native;
                }
            }
        };

        ResolutionState {
            output_size,
            render_size,
            upscaler,
            quality,
        }
    }

    pub const fn state(&self) -> Option<ResolutionState> {
        self.state
    }

    pub const fn jitter(&self) -> JitterPattern {
        self.jitter
    }

    /// Forget the last state so the next negotiation reports a change.
    pub fn invalidate(&mut self) {
        self.state = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use radiance_core::ResetConsumers;

    /// Scale factors of the common upscaler presets.
    struct ScaledQuery {
        available: bool,
    }

    impl UpscalerQuery for ScaledQuery {
        fn is_available(&self) -> bool {
            self.available
        }

        fn optimal_render_size(&self, output: UVec2, quality: QualityMode) -> Option<UVec2> {
            let scale = match quality {
                QualityMode::Quality => 1.5,
                QualityMode::Balanced => 1.7,
                QualityMode::Performance => 2.0,
                QualityMode::UltraPerformance => 3.0,
                QualityMode::Native | QualityMode::Auto => 1.0,
            };
            Some((output.as_vec2() / scale).round().as_uvec2())
        }
    }

    const FHD: UVec2 = UVec2::new(1920, 1080);
    const AVAILABLE: ScaledQuery = ScaledQuery { available: true };

    #[test]
    fn none_renders_at_output_and_resets_once() {
        let reset = TemporalReset::new();
        let mut negotiator = ResolutionNegotiator::new();
        let result = negotiator
            .negotiate(FHD, UpscalerKind::None, QualityMode::Auto, None, &reset)
            .unwrap();

        assert!(result.changed);
        assert_eq!(result.state.render_size, FHD);
        assert!(reset.take(ResetConsumers::HISTORY));
        assert!(!reset.take(ResetConsumers::HISTORY));
    }

    #[test]
    fn negotiation_is_idempotent() {
        let reset = TemporalReset::new();
        let mut negotiator = ResolutionNegotiator::new();
        let first = negotiator
            .negotiate(FHD, UpscalerKind::Dlss, QualityMode::Auto, Some(&AVAILABLE), &reset)
            .unwrap();
        reset.take(ResetConsumers::all());

        let second = negotiator
            .negotiate(FHD, UpscalerKind::Dlss, QualityMode::Auto, Some(&AVAILABLE), &reset)
            .unwrap();

        assert_eq!(first.state, second.state);
        assert!(!second.changed);
        assert!(reset.pending().is_empty());
    }

    #[test]
    fn enabling_upscaler_mid_session_uses_quality_tier() {
        let reset = TemporalReset::new();
        let mut negotiator = ResolutionNegotiator::new();
        negotiator
            .negotiate(FHD, UpscalerKind::None, QualityMode::Auto, None, &reset)
            .unwrap();
        reset.take(ResetConsumers::all());

        let result = negotiator
            .negotiate(FHD, UpscalerKind::Dlss, QualityMode::Auto, Some(&AVAILABLE), &reset)
            .unwrap();

        assert!(result.changed);
        assert_eq!(result.state.quality, QualityMode::Quality);
        assert_eq!(result.state.render_size, UVec2::new(1280, 720));
        assert!(reset.is_pending(ResetConsumers::HISTORY));
        assert_eq!(result.jitter.phases(), 18);
    }

    #[test]
    fn render_size_never_exceeds_output() {
        let reset = TemporalReset::new();
        let mut negotiator = ResolutionNegotiator::new();
        let outputs = [UVec2::new(1, 1), UVec2::new(3, 7), FHD, UVec2::new(7680, 4320)];
        let qualities = [
            QualityMode::Auto,
            QualityMode::Native,
            QualityMode::Quality,
            QualityMode::Balanced,
            QualityMode::Performance,
            QualityMode::UltraPerformance,
        ];

        for output in outputs {
            for upscaler in [UpscalerKind::None, UpscalerKind::Dlss, UpscalerKind::Fsr] {
                for quality in qualities {
                    let state = negotiator
                        .negotiate(output, upscaler, quality, Some(&AVAILABLE), &reset)
                        .unwrap()
                        .state;
                    assert!(state.render_size.cmple(output).all());
                    assert!(state.render_size.cmpge(UVec2::ONE).all());
                }
            }
        }
    }

    #[test]
    fn unavailable_upscaler_downgrades_to_none() {
        let reset = TemporalReset::new();
        let mut negotiator = ResolutionNegotiator::new();
        let query = ScaledQuery { available: false };
        let state = negotiator
            .negotiate(FHD, UpscalerKind::Fsr, QualityMode::Performance, Some(&query), &reset)
            .unwrap()
            .state;

        assert_eq!(state.upscaler, UpscalerKind::None);
        assert_eq!(state.render_size, FHD);
        assert!(!state.is_upscaling());
    }

    #[test]
    fn fsr_native_skips_query() {
        let reset = TemporalReset::new();
        let mut negotiator = ResolutionNegotiator::new();
        let state = negotiator
            .negotiate(FHD, UpscalerKind::Fsr, QualityMode::Native, Some(&AVAILABLE), &reset)
            .unwrap()
            .state;

        assert_eq!(state.upscaler, UpscalerKind::Fsr);
        assert_eq!(state.render_size, FHD);
    }

    #[test]
    fn zero_output_rejected() {
        let reset = TemporalReset::new();
        let mut negotiator = ResolutionNegotiator::new();
        let result = negotiator.negotiate(
            UVec2::new(0, 1080),
            UpscalerKind::None,
            QualityMode::Auto,
            None,
            &reset,
        );

        assert!(matches!(
            result,
            Err(Error::InvalidOutputSize {
                width: 0,
                height: 1080
            })
        ));
        assert!(reset.pending().is_empty());
        assert_eq!(negotiator.state(), None);
    }
}
