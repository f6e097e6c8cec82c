//! View and per-pass uniform layouts

use bytemuck::{Pod, Zeroable};

use crate::config::BoundsPolicy;
use crate::scene::{ShadowCascade, ViewParams};

/// Camera and culling state of one view
/// Total size: 272 bytes
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct ViewUniform {
    pub view_proj: [[f32; 4]; 4],
    pub inverse_view_proj: [[f32; 4]; 4],
    /// Left, right, bottom, top, near, far
    pub frustum_planes: [[f32; 4]; 6],
    pub observer: [f32; 3],
    pub lod_error_threshold: f32,
    pub resolution: [u32; 2],
    pub cull_flags: u32,
    pub debug_view: u32,
    pub debug_heatmap_scale: f32,
    pub hiz_mip_count: u32,
    /// Zero when no Hi-Z from an earlier depth pass exists; occlusion is skipped
    pub hiz_valid: u32,
    pub bounds_fail_open: u32,
}

impl ViewUniform {
    pub fn new(view: &ViewParams, policy: BoundsPolicy, hiz_mip_count: u32, hiz_valid: bool) -> Self {
        Self {
            view_proj: view.view_proj.to_cols_array_2d(),
            inverse_view_proj: view.view_proj.inverse().to_cols_array_2d(),
            frustum_planes: view.frustum().to_array(),
            observer: view.observer.to_array(),
            lod_error_threshold: view.lod_error_threshold,
            resolution: view.resolution.to_array(),
            cull_flags: view.cull_flags.bits(),
            debug_view: view.debug_view.as_u32(),
            debug_heatmap_scale: view.debug_heatmap_scale,
            hiz_mip_count,
            hiz_valid: hiz_valid as u32,
            bounds_fail_open: (policy == BoundsPolicy::FailOpen) as u32,
        }
    }

    /// Cascade view: shares the main view's observer and LOD inputs, never uses Hi-Z
    pub fn for_cascade(main: &ViewParams, cascade: &ShadowCascade, policy: BoundsPolicy) -> Self {
        let view = ViewParams {
            view_proj: cascade.view_proj,
            resolution: cascade.extent(),
            cull_flags: main.cull_flags.for_shadow_cascade(),
            ..*main
        };
        Self::new(&view, policy, 0, false)
    }
}

/// Capacities and counter routing for one culling dispatch
/// Total size: 32 bytes
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct PassLimits {
    pub meshlet_capacity: u32,
    pub index_capacity: u32,
    pub mesh_instance_count: u32,
    /// Counter slot incremented for each surviving meshlet
    pub visible_slot: u32,
    /// Counter slot incremented for each appended triangle index
    pub index_slot: u32,
    pub dispatch_slot: u32,
    pub draw_slot: u32,
    /// 0 early, 1 late, 2 shadow
    pub phase: u32,
}
