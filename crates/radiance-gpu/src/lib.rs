//! Vulkan layer for the Radiance renderer.
//!
//! This crate provides:
//! - Headless Vulkan instance and device management
//! - GPU capability detection, including acceleration-structure support
//! - Memory allocation via gpu-allocator
//! - One-shot command submission

pub mod capabilities;
pub mod command;
pub mod context;
pub mod error;
pub mod instance;
pub mod memory;

pub use capabilities::{GpuCapabilities, GpuVendor};
pub use context::{GpuContext, GpuContextBuilder};
pub use error::{GpuError, Result};
pub use memory::{to_vk_format, GpuAllocator, GpuBuffer, GpuTexture, COLOR_SUBRESOURCE_RANGE};
