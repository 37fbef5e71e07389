//! Scene model and the provider that loads it.

use std::path::{Path, PathBuf};

use glam::Mat4;
use hashbrown::HashMap;
use radiance_core::{
    Handedness, MaterialTextureMap, MaterialTextureSlots, MeshId, RenderInstance,
};
use radiance_rt::MeshGeometry;
use thiserror::Error;

/// A loaded mesh.
#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    pub id: MeshId,
    pub geometry: MeshGeometry,
    /// Mesh-to-object transform.
    pub local_transform: Mat4,
    /// Whether any material of this mesh emits light.
    pub emissive: bool,
    /// Descriptor indices of the mesh's material textures.
    pub materials: MaterialTextureSlots,
}

impl Mesh {
    pub fn new(id: MeshId, geometry: MeshGeometry) -> Self {
        Self {
            id,
            geometry,
            local_transform: Mat4::IDENTITY,
            emissive: false,
            materials: MaterialTextureSlots::empty(),
        }
    }

    #[must_use]
    pub fn with_local_transform(mut self, transform: Mat4) -> Self {
        self.local_transform = transform;
        self
    }

    #[must_use]
    pub const fn with_emissive(mut self, emissive: bool) -> Self {
        self.emissive = emissive;
        self
    }

    #[must_use]
    pub fn with_material(mut self, map: MaterialTextureMap, descriptor_index: u32) -> Self {
        self.materials.assign(map, descriptor_index);
        self
    }
}

/// A placed object referencing one or more meshes.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderItem {
    pub meshes: Vec<MeshId>,
    /// Object-to-world transform.
    pub transform: Mat4,
    pub visible: bool,
    pub handedness: Handedness,
}

impl RenderItem {
    pub fn new(meshes: impl Into<Vec<MeshId>>, transform: Mat4) -> Self {
        Self {
            meshes: meshes.into(),
            transform,
            visible: true,
            handedness: Handedness::LeftHanded,
        }
    }

    #[must_use]
    pub const fn with_visibility(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }

    #[must_use]
    pub const fn with_handedness(mut self, handedness: Handedness) -> Self {
        self.handedness = handedness;
        self
    }
}

/// Expected scene loading failures. Reported to the user; the previous
/// scene keeps rendering.
#[derive(Error, Debug)]
pub enum SceneError {
    #[error("Scene file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Unsupported scene format: {}", .0.display())]
    UnsupportedFormat(PathBuf),

    #[error("Malformed scene: {0}")]
    Malformed(String),

    #[error("Render item {item} references unknown {mesh}")]
    UnknownMesh { item: usize, mesh: MeshId },

    #[error("Mesh {0} defined twice")]
    DuplicateMesh(MeshId),
}

/// An immutable, fully constructed scene.
#[derive(Debug, Clone, Default)]
pub struct Scene {
    name: String,
    meshes: Vec<Mesh>,
    lookup: HashMap<MeshId, usize>,
    items: Vec<RenderItem>,
}

impl Scene {
    /// Build a scene, checking that every item references a known mesh.
    pub fn new(
        name: impl Into<String>,
        meshes: Vec<Mesh>,
        items: Vec<RenderItem>,
    ) -> Result<Self, SceneError> {
        let mut lookup = HashMap::with_capacity(meshes.len());
        for (index, mesh) in meshes.iter().enumerate() {
            if lookup.insert(mesh.id, index).is_some() {
                return Err(SceneError::DuplicateMesh(mesh.id));
            }
        }

        for (item_index, item) in items.iter().enumerate() {
            if let Some(&mesh) = item.meshes.iter().find(|mesh| !lookup.contains_key(*mesh)) {
                return Err(SceneError::UnknownMesh {
                    item: item_index,
                    mesh,
                });
            }
        }

        Ok(Self {
            name: name.into(),
            meshes,
            lookup,
            items,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn meshes(&self) -> &[Mesh] {
        &self.meshes
    }

    pub fn mesh(&self, id: MeshId) -> Option<&Mesh> {
        self.lookup.get(&id).map(|&index| &self.meshes[index])
    }

    pub fn items(&self) -> &[RenderItem] {
        &self.items
    }

    pub fn items_mut(&mut self) -> &mut [RenderItem] {
        &mut self.items
    }

    /// Whether any mesh emits light.
    pub fn has_emissive(&self) -> bool {
        self.meshes.iter().any(|mesh| mesh.emissive)
    }

    /// Flatten items into render instances, in item order then mesh order.
    pub fn instances(&self) -> Vec<RenderInstance> {
        let mut instances = Vec::with_capacity(self.items.iter().map(|item| item.meshes.len()).sum());
        for item in &self.items {
            for id in &item.meshes {
                let Some(mesh) = self.mesh(*id) else {
                    continue;
                };
                instances.push(RenderInstance {
                    mesh: mesh.id,
                    transform: item.transform * mesh.local_transform,
                    visible: item.visible,
                    handedness: item.handedness,
                });
            }
        }
        instances
    }

    /// Material slots per render instance, in [`Scene::instances`] order.
    pub fn material_table(&self) -> Vec<MaterialTextureSlots> {
        self.items
            .iter()
            .flat_map(|item| item.meshes.iter())
            .filter_map(|id| self.mesh(*id))
            .map(|mesh| mesh.materials)
            .collect()
    }
}

/// Loads scenes on the loader thread.
///
/// Failures the user can fix (missing file, bad format) should be returned
/// as [`SceneError`]; anything else is treated as a loader fault.
pub trait SceneProvider: Send + Sync {
    fn load(&self, path: &Path) -> anyhow::Result<Scene>;
}

#[cfg(test)]
pub(crate) fn test_geometry(seed: u64) -> MeshGeometry {
    MeshGeometry::indexed(
        0x1000 * seed,
        3,
        12,
        0x1000 * seed + 0x800,
        3,
        radiance_rt::IndexFormat::U32,
    )
}
