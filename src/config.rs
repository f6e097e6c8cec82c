//! Renderer configuration
//!
//! Capacities and culling defaults for the visibility pipeline. Loaded from
//! TOML; every field has a usable default so an empty file is valid.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::constants::{capacities, culling, packing};
use crate::error::{EngineError, EngineResult};
use crate::renderer::flags::{CullFlags, DebugView};

/// What to do with a mesh instance whose bounding volume is zero or invalid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundsPolicy {
    /// Treat the instance as always visible so geometry is never dropped silently
    #[default]
    FailOpen,
    /// Cull the instance
    Reject,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Mesh instances accepted per frame
    pub max_mesh_instances: u32,

    /// Meshlet-instance list capacity (also bounds each visible-meshlet list)
    pub max_meshlet_instances: u32,

    /// Reordered index buffer capacity of the main view
    pub max_reordered_indices: u32,

    /// Reordered index buffer capacity of each shadow cascade
    pub max_shadow_indices: u32,

    /// Upper bound on the Hi-Z mip chain length
    pub max_hiz_mips: u32,

    /// Frame slots in the per-frame resource ring
    pub frames_in_flight: u32,

    /// Acceptable projected LOD error in pixels
    pub lod_error_threshold: f32,

    pub cull_flags: CullFlags,

    pub bounds_policy: BoundsPolicy,

    pub debug_view: DebugView,

    /// Overdraw count mapped to the hottest heatmap colour
    pub debug_heatmap_scale: f32,

    pub shadow_cascade_count: u32,

    pub shadow_map_resolution: u32,

    /// Fraction of a buffer's capacity above which usage is logged as a near miss
    pub capacity_warning_ratio: f32,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            max_mesh_instances: capacities::DEFAULT_MAX_MESH_INSTANCES,
            max_meshlet_instances: capacities::DEFAULT_MAX_MESHLET_INSTANCES,
            max_reordered_indices: capacities::DEFAULT_MAX_REORDERED_INDICES,
            max_shadow_indices: capacities::DEFAULT_MAX_SHADOW_INDICES,
            max_hiz_mips: culling::MAX_HIZ_MIPS,
            frames_in_flight: capacities::DEFAULT_FRAMES_IN_FLIGHT,
            lod_error_threshold: 1.0,
            cull_flags: CullFlags::default(),
            bounds_policy: BoundsPolicy::default(),
            debug_view: DebugView::default(),
            debug_heatmap_scale: 8.0,
            shadow_cascade_count: 0,
            shadow_map_resolution: 2048,
            capacity_warning_ratio: 0.9,
        }
    }
}

impl RendererConfig {
    /// Load and validate a configuration file
    pub fn load(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        log::info!("[RendererConfig::load] Loaded renderer config from {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> EngineResult<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> EngineResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> EngineResult<()> {
        std::fs::write(path, self.to_toml_string()?)?;
        Ok(())
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.max_mesh_instances == 0 {
            return Err(config_error("max_mesh_instances must be non-zero"));
        }
        if self.max_meshlet_instances == 0
            || self.max_meshlet_instances > packing::MAX_PACKED_MESHLET_INSTANCES
        {
            return Err(config_error(format!(
                "max_meshlet_instances must be in 1..={}",
                packing::MAX_PACKED_MESHLET_INSTANCES
            )));
        }
        if self.max_reordered_indices == 0 || self.max_reordered_indices % 3 != 0 {
            return Err(config_error(
                "max_reordered_indices must be a non-zero multiple of 3",
            ));
        }
        if self.shadow_cascade_count > 0
            && (self.max_shadow_indices == 0 || self.max_shadow_indices % 3 != 0)
        {
            return Err(config_error(
                "max_shadow_indices must be a non-zero multiple of 3",
            ));
        }
        if self.max_hiz_mips == 0 || self.max_hiz_mips > culling::MAX_HIZ_MIPS {
            return Err(config_error(format!(
                "max_hiz_mips must be in 1..={}",
                culling::MAX_HIZ_MIPS
            )));
        }
        if self.frames_in_flight == 0 || self.frames_in_flight > capacities::MAX_FRAMES_IN_FLIGHT
        {
            return Err(config_error(format!(
                "frames_in_flight must be in 1..={}",
                capacities::MAX_FRAMES_IN_FLIGHT
            )));
        }
        if !(self.lod_error_threshold.is_finite() && self.lod_error_threshold > 0.0) {
            return Err(config_error("lod_error_threshold must be a positive number"));
        }
        if self.shadow_cascade_count > culling::MAX_SHADOW_CASCADES {
            return Err(config_error(format!(
                "shadow_cascade_count must be at most {}",
                culling::MAX_SHADOW_CASCADES
            )));
        }
        if self.shadow_cascade_count > 0 && self.shadow_map_resolution == 0 {
            return Err(config_error("shadow_map_resolution must be non-zero"));
        }
        if !(self.capacity_warning_ratio > 0.0 && self.capacity_warning_ratio <= 1.0) {
            return Err(config_error("capacity_warning_ratio must be in (0, 1]"));
        }
        if !(self.debug_heatmap_scale > 0.0) {
            return Err(config_error("debug_heatmap_scale must be positive"));
        }
        Ok(())
    }
}

fn config_error(message: impl Into<String>) -> EngineError {
    EngineError::Config {
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        RendererConfig::default().validate().unwrap();
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = RendererConfig::from_toml_str("").unwrap();
        assert_eq!(config, RendererConfig::default());
    }

    #[test]
    fn test_partial_toml_overrides() {
        let config = RendererConfig::from_toml_str(
            r#"
            max_meshlet_instances = 4096
            bounds_policy = "reject"
            debug_view = "overdraw"
            shadow_cascade_count = 2
            "#,
        )
        .unwrap();

        assert_eq!(config.max_meshlet_instances, 4096);
        assert_eq!(config.bounds_policy, BoundsPolicy::Reject);
        assert_eq!(config.debug_view, DebugView::Overdraw);
        assert_eq!(config.shadow_cascade_count, 2);
        assert_eq!(config.max_hiz_mips, culling::MAX_HIZ_MIPS);
    }

    #[test]
    fn test_rejects_unpackable_meshlet_capacity() {
        let config = RendererConfig {
            max_meshlet_instances: packing::MAX_PACKED_MESHLET_INSTANCES + 1,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(EngineError::Config { .. })));
    }

    #[test]
    fn test_rejects_index_capacity_not_multiple_of_three() {
        let config = RendererConfig {
            max_reordered_indices: 100,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("renderer.toml");

        let config = RendererConfig {
            cull_flags: CullFlags::FRUSTUM_CULLING | CullFlags::TRIANGLE_CULLING,
            frames_in_flight: 3,
            ..Default::default()
        };
        config.save(&path).unwrap();

        let loaded = RendererConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = RendererConfig::load(dir.path().join("missing.toml"));
        assert!(matches!(result, Err(EngineError::Io(_))));
    }
}
