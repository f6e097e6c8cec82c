//! Shadow cascade culling
//!
//! Cascades reuse the main view's meshlet-instance list and rerun meshlet and
//! triangle culling against the cascade projection. Occlusion is never tested
//! and the visibility mask is not consulted. Each cascade owns its index
//! buffer and draw, and is rasterized depth-only.

use crate::constants::culling::MAX_SHADOW_CASCADES;
use crate::error::{EngineError, EngineResult};
use crate::gpu::buffer_layouts::IndirectDrawIndexedCommand;
use crate::gpu::GpuContext;
use crate::renderer::gpu_driven::counters::AppendCounter;
use crate::renderer::gpu_driven::indirect_commands;
use crate::scene::{MeshletInstance, SceneTables, ShadowCascade};

use super::meshlet_culler::MeshletCuller;
use super::triangle_culler::TriangleCuller;
use super::CullView;

pub const SHADOW_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Per-frame outputs of one cascade
#[derive(Debug, Clone)]
pub struct ShadowCascadeTargets {
    pub visible: Vec<u32>,
    pub meshlet_counter: AppendCounter,
    pub indices: Vec<u32>,
    pub index_counter: AppendCounter,
    pub draw: IndirectDrawIndexedCommand,
}

impl ShadowCascadeTargets {
    pub fn new(max_meshlets: u32, max_indices: u32) -> Self {
        Self {
            visible: Vec::new(),
            meshlet_counter: AppendCounter::new("shadow visible meshlets", max_meshlets),
            indices: Vec::new(),
            index_counter: AppendCounter::new("shadow indices", max_indices),
            draw: IndirectDrawIndexedCommand::reset(),
        }
    }

    pub fn reset(&mut self) {
        self.visible.clear();
        self.meshlet_counter.reset();
        self.indices.clear();
        self.index_counter.reset();
        self.draw = IndirectDrawIndexedCommand::reset();
    }
}

pub struct ShadowCascadeCuller;

impl ShadowCascadeCuller {
    pub fn cull_meshlets(
        scene: &SceneTables,
        view: &CullView,
        meshlet_instances: &[MeshletInstance],
        targets: &mut ShadowCascadeTargets,
    ) {
        MeshletCuller::run_unmasked(
            scene,
            view,
            meshlet_instances,
            &mut targets.meshlet_counter,
            &mut targets.visible,
        );
    }

    /// Cull triangles of the cascade's visible meshlets and close its draw
    pub fn cull_triangles(
        scene: &SceneTables,
        view: &CullView,
        meshlet_instances: &[MeshletInstance],
        targets: &mut ShadowCascadeTargets,
    ) -> EngineResult<()> {
        targets.draw = indirect_commands::begin_draw(&targets.index_counter);
        TriangleCuller::run(
            scene,
            view,
            meshlet_instances,
            &targets.visible,
            &mut targets.index_counter,
            &mut targets.indices,
        )?;
        indirect_commands::finalize_draw(&mut targets.draw, &targets.index_counter);
        Ok(())
    }
}

/// Check a cascade list against the configured count
pub fn validate_cascades(cascades: &[ShadowCascade], expected: u32) -> EngineResult<()> {
    if cascades.len() as u32 != expected || expected > MAX_SHADOW_CASCADES {
        return Err(EngineError::degenerate(
            "shadow cascades",
            format!(
                "{} cascades supplied, renderer configured for {} (at most {})",
                cascades.len(),
                expected,
                MAX_SHADOW_CASCADES
            ),
        ));
    }
    if let Some(index) = cascades.iter().position(|c| c.resolution == 0) {
        return Err(EngineError::degenerate(
            format!("shadow cascade {index}"),
            "zero resolution",
        ));
    }
    Ok(())
}

/// Depth-only targets for the cascades, recreated when a cascade changes size
pub struct ShadowMaps {
    maps: Vec<(u32, wgpu::Texture, wgpu::TextureView)>,
}

impl ShadowMaps {
    pub fn new() -> Self {
        Self { maps: Vec::new() }
    }

    pub fn ensure(&mut self, context: &GpuContext, cascades: &[ShadowCascade]) -> EngineResult<()> {
        self.maps.truncate(cascades.len());
        for (index, cascade) in cascades.iter().enumerate() {
            if self.maps.get(index).is_some_and(|(size, _, _)| *size == cascade.resolution) {
                continue;
            }

            let texture = context.create_checked("shadow map", |device| {
                device.create_texture(&wgpu::TextureDescriptor {
                    label: Some("Shadow Map"),
                    size: wgpu::Extent3d {
                        width: cascade.resolution,
                        height: cascade.resolution,
                        depth_or_array_layers: 1,
                    },
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format: SHADOW_FORMAT,
                    usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
                    view_formats: &[],
                })
            })?;
            let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
            let entry = (cascade.resolution, texture, view);
            if index < self.maps.len() {
                self.maps[index] = entry;
            } else {
                self.maps.push(entry);
            }
            log::info!(
                "[ShadowMaps::ensure] Created {}x{} shadow map for cascade {}",
                cascade.resolution,
                cascade.resolution,
                index
            );
        }
        Ok(())
    }

    pub fn view(&self, cascade: u32) -> Option<&wgpu::TextureView> {
        self.maps.get(cascade as usize).map(|(_, _, view)| view)
    }

    pub fn texture(&self, cascade: u32) -> Option<&wgpu::Texture> {
        self.maps.get(cascade as usize).map(|(_, texture, _)| texture)
    }

    pub fn len(&self) -> usize {
        self.maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }
}

impl Default for ShadowMaps {
    fn default() -> Self {
        Self::new()
    }
}
