//! Acceleration-structure lifecycle for the Radiance renderer.
//!
//! This crate provides:
//! - Mesh geometry registration
//! - A bottom-level structure cache that builds each mesh exactly once
//! - A top-level builder that regenerates instances every frame and refits
//!   when possible
//! - A Vulkan backend using `VK_KHR_acceleration_structure`

pub mod backend;
pub mod blas;
pub mod error;
pub mod geometry;
pub mod scene;
pub mod tlas;
pub mod vulkan;

pub use backend::{AccelerationBackend, BlasHandle, BuildMode, InstanceDescriptor, TlasHandle};
pub use blas::BlasCache;
pub use error::{AccelError, Result};
pub use geometry::{GeometryCache, IndexFormat, MeshGeometry};
pub use scene::SceneAcceleration;
pub use tlas::{instance_flags, to_row_major_3x4, TlasBuilder};
pub use vulkan::VulkanAccelerationBackend;
