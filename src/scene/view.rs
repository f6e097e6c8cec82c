//! Per-frame camera and shadow inputs

use glam::{Mat4, UVec2, Vec3};

use crate::config::RendererConfig;
use crate::math::Frustum;
use crate::renderer::flags::{CullFlags, DebugView};

/// Camera and culling parameters of the main view for one frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewParams {
    /// Reversed-Z view-projection matrix
    pub view_proj: Mat4,
    pub observer: Vec3,
    pub resolution: UVec2,
    /// Acceptable projected LOD error in pixels
    pub lod_error_threshold: f32,
    pub cull_flags: CullFlags,
    pub debug_view: DebugView,
    pub debug_heatmap_scale: f32,
}

impl ViewParams {
    pub fn new(view_proj: Mat4, observer: Vec3, resolution: UVec2) -> Self {
        Self::from_config(&RendererConfig::default(), view_proj, observer, resolution)
    }

    pub fn from_config(
        config: &RendererConfig,
        view_proj: Mat4,
        observer: Vec3,
        resolution: UVec2,
    ) -> Self {
        Self {
            view_proj,
            observer,
            resolution,
            lod_error_threshold: config.lod_error_threshold,
            cull_flags: config.cull_flags,
            debug_view: config.debug_view,
            debug_heatmap_scale: config.debug_heatmap_scale,
        }
    }

    pub fn with_cull_flags(mut self, cull_flags: CullFlags) -> Self {
        self.cull_flags = cull_flags;
        self
    }

    pub fn with_debug_view(mut self, debug_view: DebugView) -> Self {
        self.debug_view = debug_view;
        self
    }

    pub fn frustum(&self) -> Frustum {
        Frustum::from_view_proj(&self.view_proj)
    }
}

/// One shadow cascade: its light-space projection and square map size
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowCascade {
    pub view_proj: Mat4,
    pub resolution: u32,
}

impl ShadowCascade {
    pub fn new(view_proj: Mat4, resolution: u32) -> Self {
        Self {
            view_proj,
            resolution,
        }
    }

    pub fn extent(&self) -> UVec2 {
        UVec2::splat(self.resolution)
    }
}
