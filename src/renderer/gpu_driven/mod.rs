//! GPU-driven frame orchestration
//!
//! Counters, indirect commands, the visibility mask and LOD selection shared
//! by both backends, plus the two executors that walk the frame schedule:
//! the software reference renderer and the wgpu renderer.

pub mod counters;
pub mod frame_resources;
pub mod gpu_renderer;
pub mod gpu_resources;
pub mod indirect_commands;
pub mod lod_system;
pub mod software_renderer;
pub mod visibility_mask;

#[cfg(test)]
mod tests;

pub use counters::{AppendCounter, CapacityDiagnostic};
pub use frame_resources::{FrameBuffers, FrameRing};
pub use gpu_renderer::GpuVisibilityRenderer;
pub use gpu_resources::{scene_layout, GpuFrameBuffers, GpuSceneBuffers};
pub use lod_system::LodContext;
pub use software_renderer::SoftwareVisibilityRenderer;
pub use visibility_mask::VisibilityMask;

use glam::UVec2;

use crate::config::RendererConfig;
use crate::error::{EngineError, EngineResult};
use crate::gpu::buffer_layouts::{counter_slots, slots, FrameCounters, IndirectDrawIndexedCommand};

/// Per-cascade results of one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CascadeReport {
    pub visible_meshlets: u32,
    pub requested_indices: u32,
    pub draw: IndirectDrawIndexedCommand,
}

/// What one frame culled and drew
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FrameReport {
    pub frame_index: u64,
    pub mesh_instances_tested: u32,
    pub visible_mesh_instances: u32,
    /// Meshlet instances requested by mesh culling, including any that did not fit
    pub meshlet_instances: u32,
    pub early_meshlets: u32,
    pub late_meshlets: u32,
    pub early_draw: IndirectDrawIndexedCommand,
    pub late_draw: IndirectDrawIndexedCommand,
    /// Index requests of both main-view phases
    pub requested_indices: u32,
    pub cascades: Vec<CascadeReport>,
    pub covered_pixels: u32,
    pub diagnostics: Vec<CapacityDiagnostic>,
}

impl FrameReport {
    /// Assemble from counter values and draw commands laid out as in the GPU buffers.
    ///
    /// `scene_instances` is the scene's mesh-instance count, checked against the
    /// per-frame limit.
    pub fn from_counters(
        frame_index: u64,
        counters: &FrameCounters,
        draws: &[IndirectDrawIndexedCommand],
        config: &RendererConfig,
        scene_instances: usize,
    ) -> Self {
        let draw = |slot: u32| draws.get(slot as usize).copied().unwrap_or_default();
        let cascades: Vec<CascadeReport> = (0..config.shadow_cascade_count)
            .map(|c| CascadeReport {
                visible_meshlets: counters.shadow_meshlets(c),
                requested_indices: counters.shadow_indices(c),
                draw: draw(slots::DRAW_SHADOW_BASE + c),
            })
            .collect();

        let mut checks = vec![
            ("mesh instances".to_string(), config.max_mesh_instances, scene_instances as u64),
            (
                "meshlet instances".to_string(),
                config.max_meshlet_instances,
                counters.get(counter_slots::MESHLET_INSTANCES) as u64,
            ),
            (
                "early visible meshlets".to_string(),
                config.max_meshlet_instances,
                counters.get(counter_slots::EARLY_MESHLETS) as u64,
            ),
            (
                "late visible meshlets".to_string(),
                config.max_meshlet_instances,
                counters.get(counter_slots::LATE_MESHLETS) as u64,
            ),
            (
                "reordered indices".to_string(),
                config.max_reordered_indices,
                counters.get(counter_slots::INDICES) as u64,
            ),
        ];
        for (c, cascade) in cascades.iter().enumerate() {
            checks.push((
                format!("shadow visible meshlets[{c}]"),
                config.max_meshlet_instances,
                cascade.visible_meshlets as u64,
            ));
            checks.push((
                format!("shadow indices[{c}]"),
                config.max_shadow_indices,
                cascade.requested_indices as u64,
            ));
        }

        let mut diagnostics = Vec::new();
        for (buffer, capacity, requested) in checks {
            if let Some(diagnostic) = CapacityDiagnostic::new(buffer.as_str(), capacity as u64, requested) {
                diagnostics.push(diagnostic);
            } else if requested as f64 > capacity as f64 * config.capacity_warning_ratio as f64 {
                log::warn!(
                    "[FrameReport::from_counters] {} at {}/{} entries",
                    buffer,
                    requested,
                    capacity
                );
            }
        }

        Self {
            frame_index,
            mesh_instances_tested: counters.get(counter_slots::MESH_INSTANCES_TESTED),
            visible_mesh_instances: counters.get(counter_slots::VISIBLE_MESH_INSTANCES),
            meshlet_instances: counters.get(counter_slots::MESHLET_INSTANCES),
            early_meshlets: counters.get(counter_slots::EARLY_MESHLETS),
            late_meshlets: counters.get(counter_slots::LATE_MESHLETS),
            early_draw: draw(slots::DRAW_EARLY),
            late_draw: draw(slots::DRAW_LATE),
            requested_indices: counters.get(counter_slots::INDICES),
            cascades,
            covered_pixels: 0,
            diagnostics,
        }
    }

    /// Indices drawn by the main view
    pub fn drawn_indices(&self) -> u32 {
        self.early_draw.index_count + self.late_draw.index_count
    }

    pub fn visible_triangles(&self) -> u32 {
        self.drawn_indices() / 3
    }

    pub fn overflowed(&self) -> bool {
        !self.diagnostics.is_empty()
    }

    /// First overflow as an error, which is what `render_frame` returns
    pub fn capacity_error(&self) -> Option<EngineError> {
        self.diagnostics.first().map(CapacityDiagnostic::to_error)
    }

    pub fn log_summary(&self) {
        log::info!(
            "[FrameReport] frame {}: {}/{} instances, {} meshlet instances, meshlets early {} late {}, {} triangles, {} pixels",
            self.frame_index,
            self.visible_mesh_instances,
            self.mesh_instances_tested,
            self.meshlet_instances,
            self.early_meshlets,
            self.late_meshlets,
            self.visible_triangles(),
            self.covered_pixels
        );
        for (c, cascade) in self.cascades.iter().enumerate() {
            log::info!(
                "[FrameReport] frame {} cascade {}: {} meshlets, {} indices",
                self.frame_index,
                c,
                cascade.visible_meshlets,
                cascade.draw.index_count
            );
        }
        for diagnostic in &self.diagnostics {
            log::error!(
                "[FrameReport] frame {}: {} overflowed, {} of {} entries requested",
                self.frame_index,
                diagnostic.buffer,
                diagnostic.requested,
                diagnostic.capacity
            );
        }
    }
}

/// Render targets need a non-zero extent on both axes
pub(crate) fn check_resolution(resolution: UVec2) -> EngineResult<()> {
    if resolution.x == 0 || resolution.y == 0 {
        return Err(EngineError::resource(
            "visibility targets",
            format!("{}x{} has a zero extent", resolution.x, resolution.y),
        ));
    }
    Ok(())
}
