//! Scene-facing identifiers and the per-frame instance model.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, UVec2, Vec3};
use serde::{Deserialize, Serialize};

/// Stable identity of a loaded mesh.
///
/// Valid for the lifetime of the scene that owns the mesh. Reloading a scene
/// hands out fresh identities.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Pod, Zeroable, Serialize, Deserialize,
)]
#[repr(transparent)]
pub struct MeshId(pub u64);

impl std::fmt::Display for MeshId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "mesh#{}", self.0)
    }
}

/// Triangle winding convention a mesh was authored with.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Handedness {
    #[default]
    LeftHanded,
    RightHanded,
}

impl Handedness {
    /// Scale that maps the mesh into the renderer's convention.
    #[inline]
    pub const fn correction_scale(self) -> Vec3 {
        match self {
            Self::LeftHanded => Vec3::ONE,
            Self::RightHanded => Vec3::new(1.0, 1.0, -1.0),
        }
    }

    #[inline]
    pub const fn is_right_handed(self) -> bool {
        matches!(self, Self::RightHanded)
    }
}

/// One ray-traceable instance for the current frame.
///
/// Regenerated from the scene every frame. The position of an instance in
/// the frame's instance list is its shader-visible instance id.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderInstance {
    /// Mesh whose bottom-level structure this instance references.
    pub mesh: MeshId,
    /// Object-to-world transform, without handedness correction.
    pub transform: Mat4,
    /// Invisible instances stay in the structure but are flagged non-opaque.
    pub visible: bool,
    pub handedness: Handedness,
}

impl RenderInstance {
    pub fn new(mesh: MeshId, transform: Mat4) -> Self {
        Self {
            mesh,
            transform,
            visible: true,
            handedness: Handedness::LeftHanded,
        }
    }

    /// Set visibility.
    #[must_use]
    pub const fn with_visibility(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }

    /// Set winding convention.
    #[must_use]
    pub const fn with_handedness(mut self, handedness: Handedness) -> Self {
        self.handedness = handedness;
        self
    }

    /// Object-to-world transform with the handedness correction applied.
    pub fn corrected_transform(&self) -> Mat4 {
        Mat4::from_scale(self.handedness.correction_scale()) * self.transform
    }
}

/// Smaller of the two axes of a size.
#[inline]
pub fn min_dimension(size: UVec2) -> u32 {
    size.x.min(size.y)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn right_handed_flips_z() {
        let instance = RenderInstance::new(MeshId(1), Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0)))
            .with_handedness(Handedness::RightHanded);
        let p = instance.corrected_transform().transform_point3(Vec3::ZERO);
        assert_eq!(p, Vec3::new(1.0, 2.0, -3.0));
    }

    #[test]
    fn left_handed_is_untouched() {
        let transform = Mat4::from_rotation_y(0.5);
        let instance = RenderInstance::new(MeshId(7), transform);
        assert_eq!(instance.corrected_transform(), transform);
        assert!(instance.visible);
    }

    #[test]
    fn mesh_id_display() {
        assert_eq!(MeshId(42).to_string(), "mesh#42");
    }
}
