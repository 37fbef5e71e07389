//! Scene-wide acceleration structures.

use crate::backend::{AccelerationBackend, BuildMode, TlasHandle};
use crate::blas::BlasCache;
use crate::error::Result;
use crate::geometry::{GeometryCache, MeshGeometry};
use crate::tlas::TlasBuilder;
use radiance_core::{MeshId, RenderInstance};
use tracing::{info, warn};

/// Geometry, bottom-level cache and top-level builder over one backend.
pub struct SceneAcceleration<B> {
    backend: B,
    geometry: GeometryCache,
    blas: BlasCache,
    tlas: TlasBuilder,
}

impl<B: AccelerationBackend> SceneAcceleration<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            geometry: GeometryCache::new(),
            blas: BlasCache::new(),
            tlas: TlasBuilder::new(),
        }
    }

    /// Register mesh geometry, evicting a stale structure when replaced.
    pub fn register_mesh(&mut self, mesh: MeshId, geometry: MeshGeometry) -> Result<()> {
        if self.geometry.insert(mesh, geometry).is_some() {
            self.blas.evict(mesh, &mut self.backend)?;
        }
        Ok(())
    }

    /// Build bottom-level structures for every listed mesh not yet cached.
    pub fn prepare_meshes(&mut self, meshes: impl IntoIterator<Item = MeshId>) -> Result<u64> {
        let before = self.blas.build_count();
        for mesh in meshes {
            self.blas.ensure_built(mesh, &self.geometry, &mut self.backend)?;
        }
        Ok(self.blas.build_count() - before)
    }

    /// Rebuild or refit the top-level structure for this frame.
    pub fn update(&mut self, instances: &[RenderInstance], update_only: bool) -> Result<BuildMode> {
        self.tlas
            .rebuild(instances, &self.blas, update_only, &mut self.backend)
    }

    /// Release every structure and all registered geometry.
    pub fn unload(&mut self) -> Result<()> {
        let top = self.tlas.destroy(&mut self.backend);
        let bottom = self.blas.clear(&mut self.backend);
        self.geometry.clear();
        info!("Acceleration structures released");
        top.and(bottom)
    }

    /// Drop all structure bookkeeping after the device was lost.
    ///
    /// Geometry registrations survive; structures are rebuilt on demand.
    pub fn handle_device_lost(&mut self) {
        warn!(
            structures = self.blas.len(),
            "Device lost, discarding acceleration structures"
        );
        self.blas.forget();
        self.tlas.invalidate();
    }

    pub const fn tlas(&self) -> Option<TlasHandle> {
        self.tlas.handle()
    }

    pub const fn blas(&self) -> &BlasCache {
        &self.blas
    }

    pub const fn geometry(&self) -> &GeometryCache {
        &self.geometry
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}
