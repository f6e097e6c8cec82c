//! Two-phase meshlet culling
//!
//! The early phase tests every meshlet instance against the previous frame's
//! Hi-Z and marks survivors in the visibility mask. The late phase skips
//! marked meshlets and retests the rest against the Hi-Z rebuilt from the
//! early depth, so each visible meshlet is emitted exactly once per frame.

use rayon::prelude::*;

use crate::error::EngineResult;
use crate::gpu::buffer_layouts::{commands::counter_slots, layouts, slots};
use crate::gpu::GpuContext;
use crate::math::{project_sphere, BoundingSphere};
use crate::renderer::gpu_driven::counters::AppendCounter;
use crate::renderer::gpu_driven::visibility_mask::VisibilityMask;
use crate::renderer::shaders::{self, MESHLET_CULL_WGSL};
use crate::scene::{MeshletInstance, SceneTables};

use super::hzb_builder::HiZPyramid;
use super::{resolve_meshlet, CullView};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CullPhase {
    Early,
    Late,
}

impl CullPhase {
    pub const ALL: [CullPhase; 2] = [CullPhase::Early, CullPhase::Late];

    /// Phase value seen by the shaders
    pub fn as_u32(self) -> u32 {
        match self {
            CullPhase::Early => 0,
            CullPhase::Late => 1,
        }
    }

    pub fn index(self) -> usize {
        self.as_u32() as usize
    }

    pub fn visible_counter_slot(self) -> u32 {
        match self {
            CullPhase::Early => counter_slots::EARLY_MESHLETS,
            CullPhase::Late => counter_slots::LATE_MESHLETS,
        }
    }

    pub fn dispatch_slot(self) -> u32 {
        match self {
            CullPhase::Early => slots::DISPATCH_TRIANGLES_EARLY,
            CullPhase::Late => slots::DISPATCH_TRIANGLES_LATE,
        }
    }

    pub fn draw_slot(self) -> u32 {
        match self {
            CullPhase::Early => slots::DRAW_EARLY,
            CullPhase::Late => slots::DRAW_LATE,
        }
    }
}

/// Phase value of shadow cascade passes
pub const PHASE_SHADOW: u32 = 2;

pub struct MeshletCuller;

impl MeshletCuller {
    /// Frustum and occlusion verdict for a world-space meshlet bound
    pub fn meshlet_visible(bounds: &BoundingSphere, view: &CullView, hiz: Option<&HiZPyramid>) -> bool {
        if !bounds.is_valid() {
            return view.accepts_invalid_bounds();
        }
        if view.flags.frustum() && !view.frustum.intersects_sphere(bounds.center, bounds.radius) {
            return false;
        }
        if let (true, Some(hiz)) = (view.flags.occlusion(), hiz) {
            if let Some(rect) = project_sphere(bounds, &view.view_proj, view.resolution) {
                return !hiz.is_occluded(&rect);
            }
        }
        true
    }

    /// Run one phase of the main view.
    ///
    /// `hiz` is `None` when no pyramid exists yet; occlusion is then skipped.
    #[allow(clippy::too_many_arguments)]
    pub fn run_phase(
        phase: CullPhase,
        scene: &SceneTables,
        view: &CullView,
        meshlet_instances: &[MeshletInstance],
        hiz: Option<&HiZPyramid>,
        mask: &mut VisibilityMask,
        counter: &mut AppendCounter,
        visible: &mut Vec<u32>,
    ) -> EngineResult<()> {
        let survivors = Self::survivors(scene, view, meshlet_instances, hiz, |index| {
            phase == CullPhase::Late && mask.contains(index)
        });

        for index in survivors {
            if phase == CullPhase::Early {
                mask.set(index);
            }
            if !counter.reserve(1).is_empty() {
                visible.push(index);
            }
        }

        log::debug!(
            "[MeshletCuller::run_phase] {:?}: {} of {} meshlet instances visible",
            phase,
            counter.requested(),
            meshlet_instances.len()
        );
        Ok(())
    }

    /// Cull against a view with no occlusion data or mask, as shadow cascades do
    pub fn run_unmasked(
        scene: &SceneTables,
        view: &CullView,
        meshlet_instances: &[MeshletInstance],
        counter: &mut AppendCounter,
        visible: &mut Vec<u32>,
    ) {
        for index in Self::survivors(scene, view, meshlet_instances, None, |_| false) {
            if !counter.reserve(1).is_empty() {
                visible.push(index);
            }
        }
    }

    fn survivors(
        scene: &SceneTables,
        view: &CullView,
        meshlet_instances: &[MeshletInstance],
        hiz: Option<&HiZPyramid>,
        skip: impl Fn(u32) -> bool + Sync,
    ) -> Vec<u32> {
        meshlet_instances
            .par_iter()
            .enumerate()
            .filter_map(|(index, meshlet_instance)| {
                let index = index as u32;
                if skip(index) {
                    return None;
                }
                let resolved = resolve_meshlet(scene, meshlet_instance)?;
                Self::meshlet_visible(&resolved.world_bounds(), view, hiz).then_some(index)
            })
            .collect()
    }
}

/// GPU meshlet culling pass shared by both phases and the shadow cascades
pub struct MeshletCullPipeline {
    pipeline: wgpu::ComputePipeline,
    layout: wgpu::BindGroupLayout,
}

impl MeshletCullPipeline {
    pub fn new(context: &GpuContext, scene_layout: &wgpu::BindGroupLayout) -> EngineResult<Self> {
        let device = &context.device;
        let stage = wgpu::ShaderStages::COMPUTE;
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Meshlet Cull Layout"),
            entries: &[
                layouts::storage_buffer_entry(0, true, stage),
                layouts::storage_buffer_entry(1, false, stage),
                layouts::storage_buffer_entry(2, false, stage),
                layouts::storage_buffer_entry(3, false, stage),
                layouts::texture_entry(4, wgpu::TextureSampleType::Float { filterable: false }, stage),
            ],
        });

        let module = shaders::create_shader_module(device, "meshlet_cull", MESHLET_CULL_WGSL)?;
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Meshlet Cull Pipeline Layout"),
            bind_group_layouts: &[scene_layout, &layout],
            push_constant_ranges: &[],
        });
        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Meshlet Cull Pipeline"),
            layout: Some(&pipeline_layout),
            module: &module,
            entry_point: "cull_meshlets",
        });

        Ok(Self { pipeline, layout })
    }

    pub fn bind_group(
        &self,
        device: &wgpu::Device,
        meshlet_instances: &wgpu::Buffer,
        visible: &wgpu::Buffer,
        counters: &wgpu::Buffer,
        mask: &wgpu::Buffer,
        hiz: &wgpu::TextureView,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Meshlet Cull Bind Group"),
            layout: &self.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: meshlet_instances.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: visible.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: counters.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: mask.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::TextureView(hiz),
                },
            ],
        })
    }

    /// Dispatch indirectly from the meshlet dispatch slot
    pub fn record(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        scene_group: &wgpu::BindGroup,
        group: &wgpu::BindGroup,
        dispatches: &wgpu::Buffer,
    ) {
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("Meshlet Cull"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, scene_group, &[]);
        pass.set_bind_group(1, group, &[]);
        pass.dispatch_workgroups_indirect(dispatches, dispatch_offset(slots::DISPATCH_MESHLETS));
    }
}

/// Byte offset of a dispatch-argument slot
pub(crate) fn dispatch_offset(slot: u32) -> u64 {
    slot as u64 * std::mem::size_of::<crate::gpu::DispatchIndirectCommand>() as u64
}
