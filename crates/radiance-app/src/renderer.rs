//! The per-frame orchestrator.

use std::path::PathBuf;
use std::sync::Arc;

use glam::{UVec2, Vec2};
use radiance_core::{
    DenoiserKind, RenderSettings, ResetConsumers, ResetReason, SettingsChange, SettingsSnapshot,
    TemporalReset, TextureType, UpscalerAvailability, UpscalerKind,
};
use radiance_render::{
    Camera, CameraHistory, FrameParams, HistoryBuffers, PostProcessSequencer, RenderTargets,
    ResolutionNegotiator, ResolutionState, SequenceTargets, TargetExtents, TextureAllocator,
    UpscalerQuery,
};
use radiance_rt::{AccelerationBackend, SceneAcceleration};
use tracing::{debug, info, trace, warn};

use crate::config::RendererConfig;
use crate::error::{AppError, Result};
use crate::frame::{slot_texture, FrameOutput, RaytracingBackend, TraceInputs};
use crate::lights::{LightProvisioning, LightSampler};
use crate::loader::{LoadEvent, SceneLoader, SceneStatus};
use crate::scene::{Scene, SceneProvider};

/// Upscaler services consulted during resolution negotiation.
#[derive(Default)]
pub struct UpscalerServices {
    pub dlss: Option<Box<dyn UpscalerQuery + Send>>,
    pub fsr: Option<Box<dyn UpscalerQuery + Send>>,
}

impl UpscalerServices {
    pub fn availability(&self) -> UpscalerAvailability {
        let available = |query: &Option<Box<dyn UpscalerQuery + Send>>| {
            query.as_ref().is_some_and(|query| query.is_available())
        };
        UpscalerAvailability {
            dlss: available(&self.dlss),
            fsr: available(&self.fsr),
        }
    }

    pub fn query(&self, kind: UpscalerKind) -> Option<&dyn UpscalerQuery> {
        let query = match kind {
            UpscalerKind::None => None,
            UpscalerKind::Dlss => self.dlss.as_deref(),
            UpscalerKind::Fsr => self.fsr.as_deref(),
        };
        query.map(|query| query as &dyn UpscalerQuery)
    }
}

/// Everything the renderer drives, supplied by the embedding application.
pub struct RendererParts<A: TextureAllocator, B, R> {
    pub allocator: A,
    pub acceleration: B,
    pub raytracer: R,
    pub sequencer: PostProcessSequencer<A::Texture>,
    pub upscalers: UpscalerServices,
    pub scene_provider: Arc<dyn SceneProvider>,
    pub lights: Option<Box<dyn LightSampler>>,
}

/// Drives acceleration structures, render targets, tracing and
/// post-processing once per frame.
pub struct Renderer<A, B, R>
where
    A: TextureAllocator,
    B: AccelerationBackend,
    R: RaytracingBackend<A::Texture>,
{
    settings: SettingsSnapshot,
    reset: Arc<TemporalReset>,
    negotiator: ResolutionNegotiator,
    resolution: ResolutionState,
    allocator: A,
    targets: RenderTargets<A::Texture>,
    history: HistoryBuffers<A::Texture>,
    acceleration: SceneAcceleration<B>,
    raytracer: R,
    sequencer: PostProcessSequencer<A::Texture>,
    upscalers: UpscalerServices,
    loader: SceneLoader,
    lights: Option<LightProvisioning>,
    scene: Option<Scene>,
    staged: Option<StagedScene>,
    scene_error: Option<String>,
    camera: Camera,
    previous_camera: Camera,
    camera_history: CameraHistory,
    frame_index: u64,
    meshes_dirty: bool,
}

/// A loaded scene whose acceleration structures are not yet complete.
struct StagedScene {
    path: PathBuf,
    scene: Scene,
}

fn extents(state: &ResolutionState) -> TargetExtents {
    TargetExtents {
        output: state.output_size,
        render: state.render_size,
    }
}

fn denoiser_enabled(settings: &RenderSettings) -> bool {
    settings.post_processing.denoiser.kind != DenoiserKind::None
}

impl<A, B, R> Renderer<A, B, R>
where
    A: TextureAllocator,
    B: AccelerationBackend,
    R: RaytracingBackend<A::Texture>,
{
    /// Negotiate the initial resolution and allocate every render target.
    pub fn new(config: RendererConfig, parts: RendererParts<A, B, R>) -> Result<Self> {
        let RendererParts {
            mut allocator,
            acceleration,
            raytracer,
            sequencer,
            upscalers,
            scene_provider,
            lights,
        } = parts;

        let settings = SettingsSnapshot::new(config.settings, upscalers.availability());
        let reset = Arc::new(TemporalReset::new());
        let super_resolution = settings.settings().post_processing.super_resolution;

        let mut negotiator = ResolutionNegotiator::new();
        let negotiation = negotiator.negotiate(
            config.output_size,
            super_resolution.upscaler,
            super_resolution.quality,
            upscalers.query(super_resolution.upscaler),
            &reset,
        )?;
        let resolution = negotiation.state;

        let mut targets = RenderTargets::new();
        targets.reallocate(
            &mut allocator,
            extents(&resolution),
            denoiser_enabled(settings.settings()),
        )?;
        let history = HistoryBuffers::new(&mut allocator, resolution.render_size)?;

        let lights = lights.map(LightProvisioning::new);
        if let Some(lights) = &lights {
            lights
                .lock()
                .resize(resolution.render_size)
                .map_err(AppError::Lights)?;
        }

        let mut camera = Camera {
            horizontal_fov: settings.settings().camera.horizontal_fov,
            ..Camera::default()
        };
        camera.set_output_size(resolution.output_size);

        info!(
            app = %config.app_name,
            output = ?resolution.output_size,
            render = ?resolution.render_size,
            upscaler = ?resolution.upscaler,
            "Renderer initialized"
        );

        Ok(Self {
            settings,
            reset,
            negotiator,
            resolution,
            allocator,
            targets,
            history,
            acceleration: SceneAcceleration::new(acceleration),
            raytracer,
            sequencer,
            upscalers,
            loader: SceneLoader::new(scene_provider),
            lights,
            scene: None,
            staged: None,
            scene_error: None,
            previous_camera: camera.clone(),
            camera,
            camera_history: CameraHistory::default(),
            frame_index: 0,
            meshes_dirty: false,
        })
    }

    /// Render one frame, tone mapping into `present`.
    ///
    /// Without a published scene nothing is traced and the returned output
    /// has no composed texture.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn run_frame(&mut self, present: &A::Texture) -> Result<FrameOutput> {
        match self.loader.poll()? {
            Some(LoadEvent::Loaded { path, scene }) => self.stage_scene(path, scene)?,
            Some(LoadEvent::Failed { message, .. }) => self.scene_error = Some(message),
            None => {}
        }
        if self.staged.is_some() {
            self.publish_staged()?;
        }

        if self.camera.lens_differs(&self.previous_camera) {
            self.reset.request(ResetReason::LensChanged);
        }

        let frame_index = self.frame_index;
        let mut output = FrameOutput {
            frame_index,
            ..FrameOutput::default()
        };

        if let Some(scene) = &self.scene {
            let _span = tracing::trace_span!("frame.render", frame_index).entered();

            if self.meshes_dirty {
                let rebuilt = self
                    .acceleration
                    .prepare_meshes(scene.meshes().iter().map(|mesh| mesh.id))?;
                debug!(rebuilt, "Bottom-level structures rebuilt");
                self.meshes_dirty = false;
            }
            let instances = scene.instances();
            let materials = scene.material_table();
            let mode = self.acceleration.update(&instances, true)?;
            trace!(instances = instances.len(), ?mode, "Top-level structure updated");

            let settings = self.settings.settings();
            if settings.raytracing.light_sampling.enabled && scene.has_emissive() {
                if let Some(lights) = &self.lights {
                    lights.prepare(frame_index).map_err(AppError::Lights)?;
                }
            }

            let jitter = if settings.camera.jitter {
                self.negotiator.jitter().offset(frame_index)
            } else {
                Vec2::ZERO
            };
            let reset_history = self.reset.take(ResetConsumers::HISTORY);
            if reset_history {
                self.history.reset(&mut self.allocator)?;
            }
            self.camera_history
                .update(&self.camera, jitter, reset_history);
            let uniforms = self
                .camera_history
                .uniforms(&self.camera, self.resolution.render_size);

            let frame = FrameParams {
                frame_index,
                render_size: self.resolution.render_size,
                output_size: self.resolution.output_size,
                jitter,
            };

            if let Some(tlas) = self.acceleration.tlas() {
                self.raytracer.trace(&TraceInputs {
                    frame,
                    tlas,
                    materials: &materials,
                    camera: &uniforms,
                    settings,
                    targets: &self.targets,
                    history: &self.history,
                    reset: reset_history,
                })?;

                let report = self.sequencer.run(
                    frame,
                    &self.settings,
                    &self.reset,
                    SequenceTargets {
                        primary: self.targets.get(TextureType::Color)?,
                        scratch: self.targets.get(TextureType::FinalColor)?,
                        final_color: present,
                    },
                )?;
                trace!(stages = %report.trace(), "Post-processing chain");

                output.composed = report.color.and_then(slot_texture);
                output.post_process = Some(report);
            }
        }

        self.raytracer.wait_idle()?;
        if output.rendered() {
            self.history.swap();
            self.camera_history.advance();
        }
        self.previous_camera = self.camera.clone();
        self.frame_index += 1;

        Ok(output)
    }

    /// Drop the current scene and register the geometry of `scene`.
    ///
    /// The staged scene is published by [`Self::publish_staged`]; until then
    /// nothing renders.
    fn stage_scene(&mut self, path: PathBuf, scene: Scene) -> Result<()> {
        self.scene = None;
        self.staged = None;
        self.meshes_dirty = false;
        self.acceleration.unload()?;
        for mesh in scene.meshes() {
            self.acceleration.register_mesh(mesh.id, mesh.geometry)?;
        }
        debug!(path = %path.display(), scene = scene.name(), "Scene staged");
        self.staged = Some(StagedScene { path, scene });
        Ok(())
    }

    /// Build every structure and the light resources of the staged scene,
    /// then make it current.
    ///
    /// A failure leaves the scene staged; the next frame retries.
    fn publish_staged(&mut self) -> Result<()> {
        let Some(staged) = &self.staged else {
            return Ok(());
        };
        let scene = &staged.scene;

        let built = self
            .acceleration
            .prepare_meshes(scene.meshes().iter().map(|mesh| mesh.id))?;
        let instances = scene.instances();
        self.acceleration.update(&instances, false)?;
        if let Some(lights) = self.lights.as_ref().filter(|_| scene.has_emissive()) {
            lights.provision(scene).map_err(AppError::Lights)?;
        }

        let Some(StagedScene { path, scene }) = self.staged.take() else {
            return Ok(());
        };
        info!(
            path = %path.display(),
            scene = scene.name(),
            meshes = built,
            instances = instances.len(),
            "Scene published"
        );
        self.scene = Some(scene);
        self.scene_error = None;
        self.reset.request(ResetReason::SceneLoaded);
        Ok(())
    }

    /// Request a temporal reset on behalf of the application.
    pub fn request_temporal_reset(&self, reason: ResetReason) {
        self.reset.request(reason);
    }

    /// Change the presentation size and renegotiate.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        let output_size = UVec2::new(width, height);
        self.renegotiate(output_size, false)?;
        self.camera.set_output_size(output_size);
        Ok(())
    }

    /// Replace the render settings.
    ///
    /// Upscaler changes renegotiate resolution; denoiser changes reallocate
    /// targets. Every change category that invalidates history requests a
    /// reset.
    pub fn apply_settings(&mut self, settings: RenderSettings) -> Result<SettingsChange> {
        let change = self
            .settings
            .apply(settings, self.upscalers.availability());
        for reason in change.reset_reasons() {
            self.reset.request(reason);
        }
        self.camera.horizontal_fov = self.settings.settings().camera.horizontal_fov;

        let realloc = change.contains(SettingsChange::DENOISER);
        if change.requires_negotiation() || realloc {
            self.renegotiate(self.resolution.output_size, realloc)?;
        }
        Ok(change)
    }

    fn renegotiate(&mut self, output_size: UVec2, force_realloc: bool) -> Result<()> {
        let super_resolution = self.settings.settings().post_processing.super_resolution;
        let negotiation = self.negotiator.negotiate(
            output_size,
            super_resolution.upscaler,
            super_resolution.quality,
            self.upscalers.query(super_resolution.upscaler),
            &self.reset,
        )?;
        self.resolution = negotiation.state;

        if negotiation.changed || force_realloc {
            self.reallocate()?;
        }
        Ok(())
    }

    /// Recreate every resolution-dependent resource.
    ///
    /// Holds the light provisioning lock for the whole reallocation, so any
    /// other holder of the sampler waits until the resize is complete.
    fn reallocate(&mut self) -> Result<()> {
        let mut lights = self.lights.as_ref().map(LightProvisioning::lock);

        self.raytracer.wait_idle()?;
        let denoiser = denoiser_enabled(self.settings.settings());
        self.targets
            .reallocate(&mut self.allocator, extents(&self.resolution), denoiser)?;
        self.history
            .reallocate(&mut self.allocator, self.resolution.render_size)?;
        if let Some(sampler) = lights.as_mut() {
            sampler
                .resize(self.resolution.render_size)
                .map_err(AppError::Lights)?;
        }

        info!(
            output = ?self.resolution.output_size,
            render = ?self.resolution.render_size,
            denoiser,
            "Resolution-dependent resources reallocated"
        );
        Ok(())
    }

    /// Start loading a scene in the background.
    pub fn load_scene(&mut self, path: impl Into<PathBuf>) -> Result<()> {
        self.loader.load(path)
    }

    pub const fn scene_status(&self) -> &SceneStatus {
        self.loader.status()
    }

    /// Take the message of the last soft load failure.
    pub fn take_scene_error(&mut self) -> Option<String> {
        self.scene_error.take()
    }

    /// Discard acceleration structures after the device was lost; they are
    /// rebuilt on the next frame.
    pub fn handle_device_lost(&mut self) {
        warn!("Device lost, acceleration structures will be rebuilt");
        self.acceleration.handle_device_lost();
        self.meshes_dirty = self.scene.is_some();
    }

    pub const fn scene(&self) -> Option<&Scene> {
        self.scene.as_ref()
    }

    pub fn scene_mut(&mut self) -> Option<&mut Scene> {
        self.scene.as_mut()
    }

    pub const fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    pub const fn settings(&self) -> &SettingsSnapshot {
        &self.settings
    }

    pub const fn resolution(&self) -> ResolutionState {
        self.resolution
    }

    /// Shared light sampler handle, if light sampling is configured.
    pub fn lights(&self) -> Option<LightProvisioning> {
        self.lights.clone()
    }

    /// Shared reset flag, for other threads that invalidate history.
    pub fn temporal_reset(&self) -> Arc<TemporalReset> {
        Arc::clone(&self.reset)
    }

    pub const fn targets(&self) -> &RenderTargets<A::Texture> {
        &self.targets
    }

    pub const fn history(&self) -> &HistoryBuffers<A::Texture> {
        &self.history
    }

    pub const fn acceleration(&self) -> &SceneAcceleration<B> {
        &self.acceleration
    }

    pub const fn frame_index(&self) -> u64 {
        self.frame_index
    }
}

impl<A, B, R> Drop for Renderer<A, B, R>
where
    A: TextureAllocator,
    B: AccelerationBackend,
    R: RaytracingBackend<A::Texture>,
{
    fn drop(&mut self) {
        if let Err(err) = self.raytracer.wait_idle() {
            warn!(%err, "Failed to wait for GPU idle on shutdown");
        }
        if let Err(err) = self.acceleration.unload() {
            warn!(%err, "Failed to release acceleration structures");
        }
        if let Err(err) = self.targets.release_all(&mut self.allocator) {
            warn!(%err, "Failed to release render targets");
        }
        if let Err(err) = self.history.release(&mut self.allocator) {
            warn!(%err, "Failed to release history buffers");
        }
    }
}
