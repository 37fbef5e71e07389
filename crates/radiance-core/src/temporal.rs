//! Temporal accumulation reset tracking.
//!
//! A reset request marks accumulated temporal data (history textures,
//! denoiser and upscaler internal state) as unreliable. Every consumer sees
//! a request exactly once: [`TemporalReset::take`] reads and clears only the
//! caller's bit, so the history manager consuming the flag does not hide it
//! from the denoiser later in the same frame.

use std::sync::atomic::{AtomicU32, Ordering};

use bitflags::bitflags;
use tracing::debug;

bitflags! {
    /// Subsystems that consume temporal reset requests.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ResetConsumers: u32 {
        const HISTORY = 1 << 0;
        const DENOISER = 1 << 1;
        const UPSCALER = 1 << 2;
    }
}

/// Why a temporal reset was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResetReason {
    LensChanged,
    ResolutionChanged,
    DenoiserChanged,
    UpscalerChanged,
    SceneLoaded,
    JitterToggled,
    RaytracingChanged,
    /// Explicit request from the embedding application.
    External,
}

/// Process-wide "reset requested" flag with per-consumer consumption.
#[derive(Debug, Default)]
pub struct TemporalReset {
    pending: AtomicU32,
}

impl TemporalReset {
    pub const fn new() -> Self {
        Self {
            pending: AtomicU32::new(0),
        }
    }

    /// Request a reset for every consumer.
    pub fn request(&self, reason: ResetReason) {
        debug!(?reason, "Temporal reset requested");
        self.pending
            .fetch_or(ResetConsumers::all().bits(), Ordering::AcqRel);
    }

    /// Consume the request for one consumer.
    ///
    /// Returns `true` at most once per request.
    pub fn take(&self, consumer: ResetConsumers) -> bool {
        let previous = self.pending.fetch_and(!consumer.bits(), Ordering::AcqRel);
        ResetConsumers::from_bits_truncate(previous).intersects(consumer)
    }

    /// Whether `consumer` still has an unconsumed request.
    pub fn is_pending(&self, consumer: ResetConsumers) -> bool {
        ResetConsumers::from_bits_truncate(self.pending.load(Ordering::Acquire))
            .intersects(consumer)
    }

    /// Consumers with unconsumed requests.
    pub fn pending(&self) -> ResetConsumers {
        ResetConsumers::from_bits_truncate(self.pending.load(Ordering::Acquire))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_consumer_sees_request_once() {
        let reset = TemporalReset::new();
        reset.request(ResetReason::SceneLoaded);

        assert!(reset.take(ResetConsumers::HISTORY));
        assert!(!reset.take(ResetConsumers::HISTORY));

        assert!(reset.is_pending(ResetConsumers::DENOISER));
        assert!(reset.take(ResetConsumers::DENOISER));
        assert!(reset.take(ResetConsumers::UPSCALER));
        assert!(reset.pending().is_empty());
    }

    #[test]
    fn repeated_requests_collapse() {
        let reset = TemporalReset::new();
        reset.request(ResetReason::LensChanged);
        reset.request(ResetReason::ResolutionChanged);

        assert!(reset.take(ResetConsumers::HISTORY));
        assert!(!reset.take(ResetConsumers::HISTORY));
    }

    #[test]
    fn request_from_other_thread() {
        let reset = std::sync::Arc::new(TemporalReset::new());
        let remote = reset.clone();
        std::thread::spawn(move || remote.request(ResetReason::SceneLoaded))
            .join()
            .unwrap();
        assert_eq!(reset.pending(), ResetConsumers::all());
    }
}
