//! Camera and per-frame view history.

use crate::jitter::apply_jitter;
use glam::{Mat4, UVec2, Vec2, Vec3};

/// Camera for rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    pub position: Vec3,
    pub direction: Vec3,
    pub up: Vec3,
    /// Horizontal field of view in degrees.
    pub horizontal_fov: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, 5.0),
            direction: Vec3::NEG_Z,
            up: Vec3::Y,
            horizontal_fov: 90.0,
            aspect: 16.0 / 9.0,
            near: 0.1,
            far: 1000.0,
        }
    }
}

impl Camera {
    pub fn look_at(position: Vec3, target: Vec3, up: Vec3) -> Self {
        Self {
            position,
            direction: (target - position).normalize(),
            up,
            ..Self::default()
        }
    }

    /// Set the aspect ratio from an output size.
    pub fn set_output_size(&mut self, size: UVec2) {
        self.aspect = size.x.max(1) as f32 / size.y.max(1) as f32;
    }

    /// Vertical field of view in radians.
    pub fn vertical_fov(&self) -> f32 {
        let half_horizontal = self.horizontal_fov.to_radians() * 0.5;
        2.0 * (half_horizontal.tan() / self.aspect).atan()
    }

    /// Whether projection parameters differ, which invalidates history.
    pub fn lens_differs(&self, other: &Self) -> bool {
        self.horizontal_fov.to_bits() != other.horizontal_fov.to_bits()
            || self.near.to_bits() != other.near.to_bits()
            || self.far.to_bits() != other.far.to_bits()
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_to_rh(self.position, self.direction, self.up)
    }

    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.vertical_fov(), self.aspect, self.near, self.far)
    }
}

/// Camera matrices for the current and previous frame.
///
/// Motion vectors and temporal reprojection need last frame's unjittered
/// view-projection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraHistory {
    pub view_projection: Mat4,
    pub previous_view_projection: Mat4,
    pub jitter: Vec2,
}

impl Default for CameraHistory {
    fn default() -> Self {
        Self {
            view_projection: Mat4::IDENTITY,
            previous_view_projection: Mat4::IDENTITY,
            jitter: Vec2::ZERO,
        }
    }
}

impl CameraHistory {
    /// Record this frame's matrices.
    ///
    /// After a temporal reset the previous matrix is replaced by the current
    /// one so reprojection sees no motion.
    pub fn update(&mut self, camera: &Camera, jitter: Vec2, reset: bool) {
        self.view_projection = camera.projection_matrix() * camera.view_matrix();
        if reset {
            self.previous_view_projection = self.view_projection;
        }
        self.jitter = jitter;
    }

    /// Carry this frame's matrices over as the previous frame's.
    pub fn advance(&mut self) {
        self.previous_view_projection = self.view_projection;
    }

    pub fn uniforms(&self, camera: &Camera, render_size: UVec2) -> CameraUniforms {
        let view = camera.view_matrix();
        let projection = apply_jitter(camera.projection_matrix(), self.jitter, render_size);
        CameraUniforms {
            view: view.to_cols_array_2d(),
            projection: projection.to_cols_array_2d(),
            inverse_view: view.inverse().to_cols_array_2d(),
            inverse_projection: projection.inverse().to_cols_array_2d(),
            previous_view_projection: self.previous_view_projection.to_cols_array_2d(),
            position: camera.position.extend(1.0).to_array(),
            jitter: [self.jitter.x, self.jitter.y, 0.0, 0.0],
        }
    }
}

/// Camera uniform buffer data for GPU.
#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CameraUniforms {
    pub view: [[f32; 4]; 4],
    pub projection: [[f32; 4]; 4],
    pub inverse_view: [[f32; 4]; 4],
    pub inverse_projection: [[f32; 4]; 4],
    pub previous_view_projection: [[f32; 4]; 4],
    pub position: [f32; 4],
    pub jitter: [f32; 4],
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn square_aspect_keeps_fov() {
        let camera = Camera {
            aspect: 1.0,
            horizontal_fov: 90.0,
            ..Camera::default()
        };
        assert_relative_eq!(camera.vertical_fov(), std::f32::consts::FRAC_PI_2, epsilon = 1e-5);
    }

    #[test]
    fn lens_change_detection_ignores_position() {
        let camera = Camera::default();
        let mut moved = camera.clone();
        moved.position = Vec3::ONE;
        assert!(!camera.lens_differs(&moved));

        moved.horizontal_fov = 60.0;
        assert!(camera.lens_differs(&moved));
    }

    #[test]
    fn reset_drops_previous_motion() {
        let mut camera = Camera::default();
        let mut history = CameraHistory::default();
        history.update(&camera, Vec2::ZERO, true);
        history.advance();

        camera.position.x += 1.0;
        history.update(&camera, Vec2::ZERO, false);
        assert_ne!(history.view_projection, history.previous_view_projection);

        history.update(&camera, Vec2::ZERO, true);
        assert_eq!(history.view_projection, history.previous_view_projection);
    }
}
