//! Sub-pixel camera jitter.
//!
//! Halton(2, 3) offsets cover the pixel uniformly over time. When rendering
//! below output resolution every output pixel must still be hit, so the
//! sequence grows with the upscale area ratio.

use glam::{Mat4, UVec2, Vec2, Vec4};
use radiance_core::constants::BASE_JITTER_PHASES;

/// Radical inverse of `index` in `base`, in `[0, 1)`.
#[inline]
pub fn halton(index: u32, base: u32) -> f32 {
    let mut result = 0.0f32;
    let mut f = 1.0f32;
    let mut i = index;

    while i > 0 {
        f /= base as f32;
        result += f * (i % base) as f32;
        i /= base;
    }

    result
}

/// Jitter sequence sized for one resolution pairing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JitterPattern {
    phases: u32,
}

impl Default for JitterPattern {
    fn default() -> Self {
        Self {
            phases: BASE_JITTER_PHASES as u32,
        }
    }
}

impl JitterPattern {
    /// Pattern for rendering at `render_size` and presenting at `output_size`.
    ///
    /// `phases = 8 * (output.x / render.x) * (output.y / render.y)`.
    pub fn for_sizes(output_size: UVec2, render_size: UVec2) -> Self {
        let render = render_size.max(UVec2::ONE).as_vec2();
        let ratio = output_size.as_vec2() / render;
        let phases = (BASE_JITTER_PHASES * ratio.x * ratio.y).round().max(1.0);
        Self {
            phases: phases as u32,
        }
    }

    pub const fn phases(&self) -> u32 {
        self.phases
    }

    /// Offset in pixels, in `[-0.5, 0.5)`, for a frame.
    pub fn offset(&self, frame_index: u64) -> Vec2 {
        // Index 0 would yield the pixel corner.
        let index = (frame_index % u64::from(self.phases)) as u32 + 1;
        Vec2::new(halton(index, 2), halton(index, 3)) - Vec2::splat(0.5)
    }
}

/// Offset a projection matrix by a pixel-space jitter.
///
/// The offset is scaled by clip-space `w`, so after the perspective divide
/// every depth shifts by the same NDC amount.
pub fn apply_jitter(projection: Mat4, offset: Vec2, render_size: UVec2) -> Mat4 {
    let ndc = 2.0 * offset / render_size.max(UVec2::ONE).as_vec2();
    let jitter = Mat4::from_cols(
        Vec4::X,
        Vec4::Y,
        Vec4::Z,
        Vec4::new(ndc.x, ndc.y, 0.0, 1.0),
    );
    jitter * projection
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn halton_base_2() {
        assert_relative_eq!(halton(1, 2), 0.5);
        assert_relative_eq!(halton(2, 2), 0.25);
        assert_relative_eq!(halton(3, 2), 0.75);
    }

    #[test]
    fn native_uses_base_phases() {
        let pattern = JitterPattern::for_sizes(UVec2::new(1920, 1080), UVec2::new(1920, 1080));
        assert_eq!(pattern.phases(), 8);
    }

    #[test]
    fn phases_scale_with_upscale_area() {
        let pattern = JitterPattern::for_sizes(UVec2::new(3840, 2160), UVec2::new(1920, 1080));
        assert_eq!(pattern.phases(), 32);

        let quality = JitterPattern::for_sizes(UVec2::new(1920, 1080), UVec2::new(1280, 720));
        assert_eq!(quality.phases(), 18);
    }

    #[test]
    fn offsets_repeat_after_phases() {
        let pattern = JitterPattern::default();
        for frame in 0..8 {
            let offset = pattern.offset(frame);
            assert!(offset.x >= -0.5 && offset.x < 0.5);
            assert!(offset.y >= -0.5 && offset.y < 0.5);
            assert_eq!(offset, pattern.offset(frame + 8));
        }
    }

    #[test]
    fn jitter_shift_is_independent_of_depth() {
        let projection = Mat4::perspective_rh(1.0, 1.0, 0.1, 100.0);
        let jittered = apply_jitter(projection, Vec2::new(0.5, -0.25), UVec2::new(100, 100));

        for depth in [-0.2, -1.0, -10.0, -90.0] {
            let point = Vec4::new(0.03, -0.02, depth, 1.0);
            let base = projection * point;
            let shifted = jittered * point;
            let delta = shifted.truncate().truncate() / shifted.w - base.truncate().truncate() / base.w;
            assert_relative_eq!(delta.x, 0.01, epsilon = 1e-5);
            assert_relative_eq!(delta.y, -0.005, epsilon = 1e-5);
            assert_relative_eq!(shifted.z / shifted.w, base.z / base.w, epsilon = 1e-6);
        }
    }

    #[test]
    fn zero_jitter_is_identity() {
        let projection = Mat4::perspective_rh(1.0, 1.5, 0.1, 100.0);
        let jittered = apply_jitter(projection, Vec2::ZERO, UVec2::new(100, 100));
        assert_eq!(projection, jittered);
    }
}
