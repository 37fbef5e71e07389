//! Mesh geometry descriptions consumed by bottom-level builds.

use crate::error::{AccelError, Result};
use ash::vk;
use hashbrown::HashMap;
use radiance_core::MeshId;

/// Index element type of a mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexFormat {
    U16,
    U32,
}

impl IndexFormat {
    pub const fn to_vk(self) -> vk::IndexType {
        match self {
            Self::U16 => vk::IndexType::UINT16,
            Self::U32 => vk::IndexType::UINT32,
        }
    }
}

/// GPU-resident triangle geometry of one mesh.
///
/// Buffers are owned by the scene; only their device addresses are kept.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshGeometry {
    pub vertex_address: vk::DeviceAddress,
    pub vertex_count: u32,
    /// Bytes between consecutive vertex positions.
    pub vertex_stride: u64,
    pub vertex_format: vk::Format,
    pub index_address: vk::DeviceAddress,
    pub index_count: u32,
    pub index_format: IndexFormat,
    /// Opaque geometry skips any-hit shaders.
    pub opaque: bool,
}

impl MeshGeometry {
    /// Indexed triangle list with `R32G32B32_SFLOAT` positions.
    pub const fn indexed(
        vertex_address: vk::DeviceAddress,
        vertex_count: u32,
        vertex_stride: u64,
        index_address: vk::DeviceAddress,
        index_count: u32,
        index_format: IndexFormat,
    ) -> Self {
        Self {
            vertex_address,
            vertex_count,
            vertex_stride,
            vertex_format: vk::Format::R32G32B32_SFLOAT,
            index_address,
            index_count,
            index_format,
            opaque: true,
        }
    }

    pub const fn triangle_count(&self) -> u32 {
        self.index_count / 3
    }

    /// Reject geometry a build would fail on.
    pub fn validate(&self, mesh: MeshId) -> Result<()> {
        let invalid = |reason: &str| AccelError::InvalidGeometry {
            mesh,
            reason: reason.to_string(),
        };

        if self.vertex_address == 0 || self.index_address == 0 {
            return Err(invalid("buffer without device address"));
        }
        if self.vertex_count == 0 || self.index_count == 0 {
            return Err(invalid("empty mesh"));
        }
        if self.index_count % 3 != 0 {
            return Err(invalid("index count is not a multiple of 3"));
        }
        if self.vertex_stride == 0 {
            return Err(invalid("zero vertex stride"));
        }
        Ok(())
    }
}

/// Geometry of every mesh of the current scene, keyed by mesh identity.
#[derive(Debug, Default)]
pub struct GeometryCache {
    meshes: HashMap<MeshId, MeshGeometry>,
}

impl GeometryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register geometry for a mesh.
    ///
    /// Returns the replaced geometry, if any. Replacing geometry makes the
    /// mesh's bottom-level structure stale; the caller must evict it.
    pub fn insert(&mut self, mesh: MeshId, geometry: MeshGeometry) -> Option<MeshGeometry> {
        self.meshes.insert(mesh, geometry)
    }

    pub fn get(&self, mesh: MeshId) -> Result<&MeshGeometry> {
        self.meshes.get(&mesh).ok_or(AccelError::MissingGeometry(mesh))
    }

    pub fn contains(&self, mesh: MeshId) -> bool {
        self.meshes.contains_key(&mesh)
    }

    pub fn remove(&mut self, mesh: MeshId) -> Option<MeshGeometry> {
        self.meshes.remove(&mesh)
    }

    pub fn clear(&mut self) {
        self.meshes.clear();
    }

    pub fn len(&self) -> usize {
        self.meshes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }

    pub fn meshes(&self) -> impl Iterator<Item = MeshId> + '_ {
        self.meshes.keys().copied()
    }
}
