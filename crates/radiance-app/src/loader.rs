//! Background scene loading.
//!
//! Each request runs on its own named thread and reports through a
//! single-slot channel. The frame loop polls without blocking; a new request
//! drops the previous receiver, so a superseded load finishes unobserved.
//! Loader threads only construct scenes and never touch renderer state.

use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use crossbeam::channel::{self, Receiver, Sender, TryRecvError};
use tracing::{debug, error, info, warn};

use crate::error::{AppError, Result};
use crate::scene::{Scene, SceneError, SceneProvider};

/// Observable loader state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SceneStatus {
    Idle,
    Loading { path: PathBuf },
    Loaded { path: PathBuf },
    Failed { path: PathBuf, message: String },
}

/// A finished load, as seen by the frame loop.
#[derive(Debug)]
pub enum LoadEvent {
    Loaded { path: PathBuf, scene: Scene },
    /// Expected failure with a user-visible message.
    Failed { path: PathBuf, message: String },
}

/// Result sent back from the loader thread.
enum LoadOutcome {
    Loaded(Scene),
    Failed(String),
    Crashed(String),
}

struct PendingLoad {
    path: PathBuf,
    receiver: Receiver<LoadOutcome>,
}

/// Runs scene loads off the frame thread.
pub struct SceneLoader {
    provider: Arc<dyn SceneProvider>,
    pending: Option<PendingLoad>,
    status: SceneStatus,
    requests: u64,
}

impl std::fmt::Debug for SceneLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneLoader")
            .field("status", &self.status)
            .field("requests", &self.requests)
            .finish_non_exhaustive()
    }
}

impl SceneLoader {
    pub fn new(provider: Arc<dyn SceneProvider>) -> Self {
        Self {
            provider,
            pending: None,
            status: SceneStatus::Idle,
            requests: 0,
        }
    }

    /// Start loading `path`, superseding any load in flight.
    pub fn load(&mut self, path: impl Into<PathBuf>) -> Result<()> {
        let path = path.into();
        let (sender, receiver) = channel::bounded(1);
        let provider = Arc::clone(&self.provider);
        let thread_path = path.clone();

        self.requests += 1;
        thread::Builder::new()
            .name(format!("scene-loader-{}", self.requests))
            .spawn(move || run_load(provider.as_ref(), &thread_path, &sender))
            .map_err(AppError::Spawn)?;

        if let Some(previous) = self.pending.replace(PendingLoad {
            path: path.clone(),
            receiver,
        }) {
            debug!(path = %previous.path.display(), "Superseding scene load");
        }
        info!(path = %path.display(), "Scene load started");
        self.status = SceneStatus::Loading { path };
        Ok(())
    }

    /// Check for a finished load without blocking.
    ///
    /// Returns `Ok(None)` while loading or idle. Loader faults are returned
    /// as [`AppError::SceneLoader`].
    pub fn poll(&mut self) -> Result<Option<LoadEvent>> {
        let Some(pending) = &self.pending else {
            return Ok(None);
        };

        let outcome = match pending.receiver.try_recv() {
            Ok(outcome) => outcome,
            Err(TryRecvError::Empty) => return Ok(None),
            Err(TryRecvError::Disconnected) => {
                LoadOutcome::Crashed("loader thread exited without a result".to_string())
            }
        };

        let Some(PendingLoad { path, .. }) = self.pending.take() else {
            return Ok(None);
        };

        match outcome {
            LoadOutcome::Loaded(scene) => {
                self.status = SceneStatus::Loaded { path: path.clone() };
                Ok(Some(LoadEvent::Loaded { path, scene }))
            }
            LoadOutcome::Failed(message) => {
                warn!(path = %path.display(), %message, "Scene failed to load");
                self.status = SceneStatus::Failed {
                    path: path.clone(),
                    message: message.clone(),
                };
                Ok(Some(LoadEvent::Failed { path, message }))
            }
            LoadOutcome::Crashed(message) => {
                error!(path = %path.display(), %message, "Scene loader failed");
                self.status = SceneStatus::Failed {
                    path: path.clone(),
                    message: message.clone(),
                };
                Err(AppError::SceneLoader { path, message })
            }
        }
    }

    pub const fn status(&self) -> &SceneStatus {
        &self.status
    }

    pub const fn is_loading(&self) -> bool {
        self.pending.is_some()
    }
}

fn run_load(provider: &dyn SceneProvider, path: &Path, sender: &Sender<LoadOutcome>) {
    let outcome = match panic::catch_unwind(AssertUnwindSafe(|| load_scene(provider, path))) {
        Ok(outcome) => outcome,
        Err(payload) => LoadOutcome::Crashed(panic_message(payload.as_ref())),
    };
    // The receiver is gone when the request was superseded.
    let _ = sender.send(outcome);
}

fn load_scene(provider: &dyn SceneProvider, path: &Path) -> LoadOutcome {
    let scene = match provider.load(path) {
        Ok(scene) => scene,
        Err(err) => {
            return match err.downcast_ref::<SceneError>() {
                Some(scene_error) => LoadOutcome::Failed(scene_error.to_string()),
                None => LoadOutcome::Crashed(format!("{err:#}")),
            };
        }
    };

    debug!(
        scene = scene.name(),
        meshes = scene.meshes().len(),
        items = scene.items().len(),
        "Scene constructed"
    );
    LoadOutcome::Loaded(scene)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| (*message).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "scene loader panicked".to_string())
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use crossbeam::channel::Receiver;
    use parking_lot::Mutex;

    /// Provider whose loads block until released by the test.
    #[derive(Default)]
    pub struct GatedProvider {
        gates: Mutex<Vec<(PathBuf, Receiver<()>)>>,
    }

    impl GatedProvider {
        /// Make loads of `path` wait for the returned sender.
        pub fn gate(&self, path: &str) -> Sender<()> {
            let (sender, receiver) = channel::bounded(1);
            self.gates.lock().push((PathBuf::from(path), receiver));
            sender
        }
    }

    impl SceneProvider for GatedProvider {
        fn load(&self, path: &Path) -> anyhow::Result<Scene> {
            let gate = {
                let gates = self.gates.lock();
                gates
                    .iter()
                    .find(|(gated, _)| gated == path)
                    .map(|(_, receiver)| receiver.clone())
            };
            if let Some(gate) = gate {
                let _ = gate.recv();
            }

            let name = path.to_string_lossy();
            if name.contains("missing") {
                return Err(SceneError::NotFound(path.to_path_buf()).into());
            }
            if name.contains("corrupt") {
                anyhow::bail!("decoder state corrupted");
            }
            if name.contains("panic") {
                panic!("loader exploded");
            }
            let mesh = crate::scene::Mesh::new(
                radiance_core::MeshId(1),
                crate::scene::test_geometry(1),
            )
            .with_emissive(name.contains("lit"));
            let item = crate::scene::RenderItem::new([radiance_core::MeshId(1)], glam::Mat4::IDENTITY);
            Ok(Scene::new(name.to_string(), vec![mesh], vec![item])?)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::GatedProvider;
    use super::*;
    use std::time::{Duration, Instant};

    fn wait_for_event(loader: &mut SceneLoader) -> Result<LoadEvent> {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if let Some(event) = loader.poll()? {
                return Ok(event);
            }
            assert!(Instant::now() < deadline, "scene load timed out");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn still_loading_until_released() {
        let provider = Arc::new(GatedProvider::default());
        let release = provider.gate("gated.scene");
        let mut loader = SceneLoader::new(provider);

        loader.load("gated.scene").unwrap();
        assert!(loader.poll().unwrap().is_none());
        assert!(loader.is_loading());
        assert_eq!(
            *loader.status(),
            SceneStatus::Loading {
                path: "gated.scene".into()
            }
        );

        release.send(()).unwrap();
        let event = wait_for_event(&mut loader).unwrap();
        assert!(matches!(event, LoadEvent::Loaded { ref scene, .. } if scene.name() == "gated.scene"));
        assert!(!loader.is_loading());
    }

    #[test]
    fn scene_errors_are_soft_failures() {
        let mut loader = SceneLoader::new(Arc::new(GatedProvider::default()));
        loader.load("missing.scene").unwrap();

        let event = wait_for_event(&mut loader).unwrap();
        let LoadEvent::Failed { message, .. } = event else {
            panic!("expected a soft failure");
        };
        assert!(message.contains("missing.scene"));
        assert!(matches!(loader.status(), SceneStatus::Failed { .. }));
    }

    #[test]
    fn unexpected_errors_are_raised() {
        let mut loader = SceneLoader::new(Arc::new(GatedProvider::default()));
        loader.load("corrupt.scene").unwrap();

        let err = wait_for_event(&mut loader).unwrap_err();
        assert!(
            matches!(err, AppError::SceneLoader { ref message, .. } if message.contains("decoder state corrupted"))
        );
    }

    #[test]
    fn panics_are_caught_and_raised() {
        let mut loader = SceneLoader::new(Arc::new(GatedProvider::default()));
        loader.load("panic.scene").unwrap();

        let err = wait_for_event(&mut loader).unwrap_err();
        assert!(
            matches!(err, AppError::SceneLoader { ref message, .. } if message == "loader exploded")
        );
    }

    #[test]
    fn superseded_request_is_discarded() {
        let provider = Arc::new(GatedProvider::default());
        let release_first = provider.gate("first.scene");
        let mut loader = SceneLoader::new(provider);

        loader.load("first.scene").unwrap();
        loader.load("second.scene").unwrap();

        let event = wait_for_event(&mut loader).unwrap();
        assert!(matches!(event, LoadEvent::Loaded { ref path, .. } if path == Path::new("second.scene")));

        release_first.send(()).unwrap();
        thread::sleep(Duration::from_millis(20));
        assert!(loader.poll().unwrap().is_none());
    }
}
