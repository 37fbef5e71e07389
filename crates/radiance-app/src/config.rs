//! Renderer configuration.

use glam::UVec2;
use radiance_core::RenderSettings;
use serde::{Deserialize, Serialize};

/// Renderer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RendererConfig {
    /// Application name reported to the driver.
    pub app_name: String,
    /// Initial presentation size.
    pub output_size: UVec2,
    /// Initial render settings.
    pub settings: RenderSettings,
    /// Enable Vulkan validation layers (default: debug builds only).
    pub validation: bool,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            app_name: "Radiance".to_string(),
            output_size: UVec2::new(1280, 720),
            settings: RenderSettings::default(),
            validation: cfg!(debug_assertions),
        }
    }
}

impl RendererConfig {
    /// Create a new config with the given application name.
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            ..Default::default()
        }
    }

    /// Set the initial output size.
    pub fn with_output_size(mut self, width: u32, height: u32) -> Self {
        self.output_size = UVec2::new(width, height);
        self
    }

    /// Set the initial render settings.
    pub fn with_settings(mut self, settings: RenderSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Enable or disable validation layers.
    pub fn with_validation(mut self, validation: bool) -> Self {
        self.validation = validation;
        self
    }
}
