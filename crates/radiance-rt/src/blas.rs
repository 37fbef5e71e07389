//! Bottom-level structure cache.

use crate::backend::{AccelerationBackend, BlasHandle};
use crate::error::Result;
use crate::geometry::GeometryCache;
use hashbrown::HashMap;
use radiance_core::MeshId;
use tracing::{debug, warn};

/// One bottom-level structure per unique mesh.
///
/// Entries are built on first use and never rebuilt implicitly. Only
/// [`BlasCache::evict`] and [`BlasCache::clear`] drop entries.
#[derive(Debug, Default)]
pub struct BlasCache {
    entries: HashMap<MeshId, BlasHandle>,
    builds: u64,
}

impl BlasCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the structure for `mesh`, building it first if needed.
    ///
    /// A failed build leaves no entry behind, so the next call retries.
    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    pub fn ensure_built<B: AccelerationBackend + ?Sized>(
        &mut self,
        mesh: MeshId,
        geometry: &GeometryCache,
        backend: &mut B,
    ) -> Result<BlasHandle> {
        if let Some(handle) = self.entries.get(&mesh) {
            return Ok(*handle);
        }

        let mesh_geometry = geometry.get(mesh)?;
        mesh_geometry.validate(mesh)?;

        let handle = backend.build_bottom_level(mesh, mesh_geometry)?;
        self.builds += 1;
        debug!(
            %mesh,
            triangles = mesh_geometry.triangle_count(),
            "Built bottom-level structure"
        );

        self.entries.insert(mesh, handle);
        Ok(handle)
    }

    /// Cached structure for `mesh` without building.
    pub fn get(&self, mesh: MeshId) -> Option<BlasHandle> {
        self.entries.get(&mesh).copied()
    }

    /// Destroy the structure of one mesh, e.g. after its geometry was replaced.
    ///
    /// Returns whether an entry existed.
    pub fn evict<B: AccelerationBackend + ?Sized>(
        &mut self,
        mesh: MeshId,
        backend: &mut B,
    ) -> Result<bool> {
        match self.entries.remove(&mesh) {
            Some(handle) => {
                backend.destroy_bottom_level(handle)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Destroy every structure.
    ///
    /// The cache is always left empty; the first destroy error is returned
    /// after all entries were attempted.
    pub fn clear<B: AccelerationBackend + ?Sized>(&mut self, backend: &mut B) -> Result<()> {
        let mut first_error = None;
        for (mesh, handle) in self.entries.drain() {
            if let Err(err) = backend.destroy_bottom_level(handle) {
                warn!(%mesh, "Failed to destroy bottom-level structure: {err}");
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Forget every entry without touching the device.
    ///
    /// Used after device loss, when the handles are already invalid.
    pub fn forget(&mut self) {
        self.entries.clear();
    }

    /// Total bottom-level builds issued since creation.
    pub const fn build_count(&self) -> u64 {
        self.builds
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
