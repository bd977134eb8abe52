//! Renderer configuration.
//!
//! Values are read from a TOML file where every key is optional:
//!
//! ```toml
//! frames_in_flight = 2
//! back_buffer_count = 3
//! max_textures = 128
//! vsync = false
//! clear_color = [0.0, 0.0, 0.0, 1.0]
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// Maximum number of frames the CPU may record ahead of the GPU.
pub const MAX_FRAMES_IN_FLIGHT: u32 = 3;

/// Tunables consumed by the renderer at init time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RendererConfig {
    /// Frame slots, each with its own command allocator and constant buffer element.
    pub frames_in_flight: u32,
    /// Swap chain back buffers (double or triple buffering).
    pub back_buffer_count: u32,
    /// Capacity of the shader-resource heap used by the texture registry.
    pub max_textures: u32,
    /// Capacity of the sampler heap.
    pub max_samplers: u32,
    /// Enables the validation layer and debug messenger.
    pub debug_layer: bool,
    /// Present with vertical sync.
    pub vsync: bool,
    /// Back buffer clear color (linear RGBA).
    pub clear_color: [f32; 4],
    /// Upper bound for a single fence wait. `None` waits forever.
    pub fence_timeout_ms: Option<u64>,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: 2,
            back_buffer_count: 2,
            max_textures: 64,
            max_samplers: 16,
            debug_layer: cfg!(debug_assertions),
            vsync: true,
            clear_color: [0.1, 0.1, 0.15, 1.0],
            fence_timeout_ms: None,
        }
    }
}

impl RendererConfig {
    /// Reads and validates a TOML configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text)?;
        debug!("Loaded renderer config from {}", path.display());
        Ok(config)
    }

    /// Parses and validates TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every value against the range the renderer supports.
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_FRAMES_IN_FLIGHT).contains(&self.frames_in_flight) {
            return Err(Error::Config(format!(
                "frames_in_flight must be in 1..={MAX_FRAMES_IN_FLIGHT}, got {}",
                self.frames_in_flight
            )));
        }
        if !(2..=3).contains(&self.back_buffer_count) {
            return Err(Error::Config(format!(
                "back_buffer_count must be 2 or 3, got {}",
                self.back_buffer_count
            )));
        }
        if self.max_textures == 0 || self.max_samplers == 0 {
            return Err(Error::Config(
                "descriptor heap capacities must be non-zero".to_string(),
            ));
        }
        if self.clear_color.iter().any(|c| !c.is_finite()) {
            return Err(Error::Config("clear_color must be finite".to_string()));
        }
        Ok(())
    }

    /// Fence wait bound as a duration.
    pub fn fence_timeout(&self) -> Option<std::time::Duration> {
        self.fence_timeout_ms.map(std::time::Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = RendererConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.frames_in_flight, 2);
        assert_eq!(config.back_buffer_count, 2);
        assert!(config.fence_timeout().is_none());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = RendererConfig::from_toml_str("max_textures = 8\nvsync = false\n").unwrap();
        assert_eq!(config.max_textures, 8);
        assert!(!config.vsync);
        assert_eq!(config.max_samplers, RendererConfig::default().max_samplers);
    }

    #[test]
    fn test_rejects_out_of_range_values() {
        assert!(matches!(
            RendererConfig::from_toml_str("frames_in_flight = 0"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            RendererConfig::from_toml_str("back_buffer_count = 4"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            RendererConfig::from_toml_str("max_samplers = 0"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_rejects_unknown_keys() {
        assert!(matches!(
            RendererConfig::from_toml_str("frames = 2"),
            Err(Error::ConfigParse(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "frames_in_flight = 3\nfence_timeout_ms = 500").unwrap();

        let config = RendererConfig::load(file.path()).unwrap();
        assert_eq!(config.frames_in_flight, 3);
        assert_eq!(
            config.fence_timeout(),
            Some(std::time::Duration::from_millis(500))
        );
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        assert!(matches!(
            RendererConfig::load("/nonexistent/gpuframe.toml"),
            Err(Error::Io(_))
        ));
    }
}
