//! Light-sampling resource provisioning.
//!
//! Light resources are provisioned when a scene is published and resized
//! when the render resolution changes. The sampler sits behind one lock, so
//! a holder of a shared handle never sees either step half done.

use std::sync::Arc;

use glam::UVec2;
use parking_lot::{Mutex, MutexGuard};

use crate::scene::Scene;

/// External many-light sampler.
pub trait LightSampler: Send {
    /// Build light resources for a newly loaded scene.
    fn provision(&mut self, scene: &Scene) -> anyhow::Result<()>;

    /// Resize resolution-dependent reservoirs.
    fn resize(&mut self, render_size: UVec2) -> anyhow::Result<()>;

    /// Per-frame preparation before tracing.
    fn prepare(&mut self, frame_index: u64) -> anyhow::Result<()>;
}

/// Shared handle to the light sampler.
#[derive(Clone)]
pub struct LightProvisioning {
    sampler: Arc<Mutex<Box<dyn LightSampler>>>,
}

impl std::fmt::Debug for LightProvisioning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LightProvisioning")
            .field("locked", &self.sampler.is_locked())
            .finish()
    }
}

impl LightProvisioning {
    pub fn new(sampler: Box<dyn LightSampler>) -> Self {
        Self {
            sampler: Arc::new(Mutex::new(sampler)),
        }
    }

    /// Hold the lock across a multi-step operation.
    pub fn lock(&self) -> MutexGuard<'_, Box<dyn LightSampler>> {
        self.sampler.lock()
    }

    pub fn provision(&self, scene: &Scene) -> anyhow::Result<()> {
        self.sampler.lock().provision(scene)
    }

    pub fn prepare(&self, frame_index: u64) -> anyhow::Result<()> {
        self.sampler.lock().prepare(frame_index)
    }

    /// Whether provisioning or a resize is in progress.
    pub fn is_busy(&self) -> bool {
        self.sampler.is_locked()
    }
}


#[cfg(test)]
mod tests {
    use super::mock::{LightLog, RecordingSampler};
    use super::*;
    use std::thread;

    #[test]
    fn provisioning_from_another_thread_is_serialized() {
        let log = Arc::new(Mutex::new(LightLog::default()));
        let lights = LightProvisioning::new(Box::new(RecordingSampler {
            log: Arc::clone(&log),
        }));

        let guard = lights.lock();
        assert!(lights.is_busy());

        let worker = {
            let lights = lights.clone();
            thread::spawn(move || lights.provision(&Scene::default()))
        };
        // The worker blocks until the guard is released.
        assert!(log.lock().provisioned.is_empty());
        drop(guard);

        worker.join().unwrap().unwrap();
        assert_eq!(log.lock().provisioned.len(), 1);
        assert!(!lights.is_busy());
    }
}
