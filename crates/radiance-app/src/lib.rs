//! Frame orchestration for the Radiance renderer.
//!
//! This crate ties the other crates together:
//! - Renderer configuration and logging setup
//! - The scene model and background scene loading
//! - Light provisioning shared between the loader and the frame loop
//! - [`Renderer::run_frame`], the per-frame driver
//!
//! # Example
//!
//! ```no_run
//! use radiance_app::{init_tracing, Renderer, RendererConfig, RendererParts};
//! # fn parts() -> RendererParts<
//! #     radiance_render::VulkanTextureAllocator,
//! #     radiance_rt::VulkanAccelerationBackend,
//! #     MyTracer,
//! # > { unimplemented!() }
//! # struct MyTracer;
//! # impl radiance_app::RaytracingBackend<radiance_gpu::GpuTexture> for MyTracer {
//! #     fn trace(&mut self, _: &radiance_app::TraceInputs<'_, radiance_gpu::GpuTexture>) -> radiance_render::Result<()> { Ok(()) }
//! #     fn wait_idle(&mut self) -> radiance_render::Result<()> { Ok(()) }
//! # }
//! # fn present() -> radiance_gpu::GpuTexture { unimplemented!() }
//!
//! fn main() -> anyhow::Result<()> {
//!     init_tracing();
//!
//!     let config = RendererConfig::new("viewer").with_output_size(1920, 1080);
//!     let mut renderer = Renderer::new(config, parts())?;
//!     renderer.load_scene("scenes/sponza.scene")?;
//!
//!     let target = present();
//!     loop {
//!         let frame = renderer.run_frame(&target)?;
//!         if let Some(message) = renderer.take_scene_error() {
//!             eprintln!("{message}");
//!         }
//!         if frame.frame_index > 1000 {
//!             break;
//!         }
//!     }
//!     Ok(())
//! }
//! ```

mod config;
mod error;
mod frame;
mod lights;
mod loader;
mod renderer;
mod scene;

use tracing_subscriber::EnvFilter;

pub use config::RendererConfig;
pub use error::{AppError, Result};
pub use frame::{FrameOutput, RaytracingBackend, TraceInputs};
pub use lights::{LightProvisioning, LightSampler};
pub use loader::{LoadEvent, SceneLoader, SceneStatus};
pub use renderer::{Renderer, RendererParts, UpscalerServices};
pub use scene::{Mesh, RenderItem, Scene, SceneError, SceneProvider};

// Re-export commonly used types for convenience
pub use radiance_core::{RenderSettings, ResetReason};
pub use radiance_gpu::{GpuContext, GpuContextBuilder};
pub use radiance_render::{Camera, PostProcessSequencer, Stage, StageService};

/// Install the global `tracing` subscriber.
///
/// Honors `RUST_LOG`, defaulting to `info`. Calling it again is a no-op.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init();
}
