//! Triangle culling and indirect draw building
//!
//! Each surviving meshlet's triangles are tested individually and the
//! survivors are appended to the reordered index buffer as packed
//! (meshlet instance, triangle, corner) indices. The vertex stage of the
//! visibility pass decodes those indices directly, so no vertex buffer is bound.

use glam::{UVec2, Vec2, Vec4};
use rayon::prelude::*;

use crate::constants::culling::NEAR_W_EPSILON;
use crate::constants::packing::{
    INDEX_CORNER_MASK, INDEX_MESHLET_SHIFT, INDEX_TRIANGLE_MASK, INDEX_TRIANGLE_SHIFT,
};
use crate::error::EngineResult;
use crate::gpu::buffer_layouts::layouts;
use crate::gpu::GpuContext;
use crate::math::ndc_to_pixel;
use crate::renderer::flags::CullFlags;
use crate::renderer::gpu_driven::counters::AppendCounter;
use crate::renderer::shaders::{self, COMMANDS_WGSL, TRIANGLE_CULL_WGSL};
use crate::scene::{MeshletInstance, SceneTables};

use super::meshlet_culler::dispatch_offset;
use super::{resolve_meshlet, CullView};

#[inline]
pub fn pack_index(meshlet_instance: u32, triangle: u32, corner: u32) -> u32 {
    meshlet_instance << INDEX_MESHLET_SHIFT
        | (triangle & INDEX_TRIANGLE_MASK) << INDEX_TRIANGLE_SHIFT
        | (corner & INDEX_CORNER_MASK)
}

/// Inverse of [`pack_index`]: (meshlet instance, triangle, corner)
#[inline]
pub fn unpack_index(packed: u32) -> (u32, u32, u32) {
    (
        packed >> INDEX_MESHLET_SHIFT,
        (packed >> INDEX_TRIANGLE_SHIFT) & INDEX_TRIANGLE_MASK,
        packed & INDEX_CORNER_MASK,
    )
}

/// Per-triangle verdict on clip-space corners.
///
/// Rejection never depends on a corner that cannot be projected; triangles
/// crossing the eye plane are kept unless all three corners lie beyond the
/// near plane.
pub fn triangle_visible(clip: [Vec4; 3], resolution: UVec2, flags: CullFlags) -> bool {
    let beyond_near = |v: &Vec4| v.w - v.z < 0.0 || v.w <= NEAR_W_EPSILON;
    if clip.iter().all(beyond_near) {
        return false;
    }
    if clip.iter().any(|v| v.w <= NEAR_W_EPSILON) {
        return true;
    }

    let ndc = clip.map(|v| Vec2::new(v.x, v.y) / v.w);
    let area = (ndc[1] - ndc[0]).perp_dot(ndc[2] - ndc[0]);
    if !(area.abs() > 0.0) {
        return false;
    }
    if flags.backfaces() && area < 0.0 {
        return false;
    }

    let pixels = ndc.map(|p| ndc_to_pixel(p, resolution));
    let min = pixels[0].min(pixels[1]).min(pixels[2]);
    let max = pixels[0].max(pixels[1]).max(pixels[2]);
    let size = resolution.as_vec2();
    if max.x < 0.0 || max.y < 0.0 || min.x > size.x || min.y > size.y {
        return false;
    }

    // No pixel centre inside the bounding box
    if flags.small_triangles() {
        let first = (min - 0.5).ceil();
        let last = (max - 0.5).floor();
        if first.x > last.x || first.y > last.y {
            return false;
        }
    }
    true
}

pub struct TriangleCuller;

impl TriangleCuller {
    /// Surviving triangle ids of one meshlet instance
    pub fn cull_meshlet(
        scene: &SceneTables,
        view: &CullView,
        meshlet_instance: &MeshletInstance,
    ) -> Vec<u32> {
        let Some(resolved) = resolve_meshlet(scene, meshlet_instance) else {
            return Vec::new();
        };
        (0..resolved.meshlet.triangle_count)
            .filter(|&triangle| {
                !view.flags.triangles()
                    || triangle_visible(
                        resolved.triangle_clip(scene, triangle, &view.view_proj),
                        view.resolution,
                        view.flags,
                    )
            })
            .collect()
    }

    /// Append the surviving triangles of every visible meshlet.
    ///
    /// Each triangle reserves three slots all-or-nothing; triangles that do not
    /// fit are counted but not written. Returns the number of triangles written.
    pub fn run(
        scene: &SceneTables,
        view: &CullView,
        meshlet_instances: &[MeshletInstance],
        visible: &[u32],
        counter: &mut AppendCounter,
        indices: &mut Vec<u32>,
    ) -> EngineResult<u32> {
        let survivors: Vec<(u32, Vec<u32>)> = visible
            .par_iter()
            .filter_map(|&index| {
                let meshlet_instance = meshlet_instances.get(index as usize)?;
                Some((index, Self::cull_meshlet(scene, view, meshlet_instance)))
            })
            .collect();

        let mut written = 0;
        for (meshlet_instance, triangles) in survivors {
            for triangle in triangles {
                if counter.reserve_exact(3).is_none() {
                    continue;
                }
                indices.extend((0..3).map(|corner| pack_index(meshlet_instance, triangle, corner)));
                written += 1;
            }
        }

        log::debug!(
            "[TriangleCuller::run] {} triangles from {} meshlets, {} indices requested",
            written,
            visible.len(),
            counter.requested()
        );
        Ok(written)
    }
}

/// GPU triangle culling: one workgroup per visible meshlet, one invocation per triangle
pub struct TriangleCullPipeline {
    pipeline: wgpu::ComputePipeline,
    layout: wgpu::BindGroupLayout,
}

impl TriangleCullPipeline {
    pub fn new(context: &GpuContext, scene_layout: &wgpu::BindGroupLayout) -> EngineResult<Self> {
        let device = &context.device;
        let stage = wgpu::ShaderStages::COMPUTE;
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Triangle Cull Layout"),
            entries: &[
                layouts::storage_buffer_entry(0, true, stage),
                layouts::storage_buffer_entry(1, true, stage),
                layouts::storage_buffer_entry(2, false, stage),
                layouts::storage_buffer_entry(3, false, stage),
            ],
        });

        let module = shaders::create_shader_module(device, "triangle_cull", TRIANGLE_CULL_WGSL)?;
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Triangle Cull Pipeline Layout"),
            bind_group_layouts: &[scene_layout, &layout],
            push_constant_ranges: &[],
        });
        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Triangle Cull Pipeline"),
            layout: Some(&pipeline_layout),
            module: &module,
            entry_point: "cull_triangles",
        });

        Ok(Self { pipeline, layout })
    }

    pub fn bind_group(
        &self,
        device: &wgpu::Device,
        meshlet_instances: &wgpu::Buffer,
        visible: &wgpu::Buffer,
        counters: &wgpu::Buffer,
        indices: &wgpu::Buffer,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Triangle Cull Bind Group"),
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
                    resource: indices.as_entire_binding(),
                },
            ],
        })
    }

    pub fn record(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        scene_group: &wgpu::BindGroup,
        group: &wgpu::BindGroup,
        dispatches: &wgpu::Buffer,
        dispatch_slot: u32,
    ) {
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("Triangle Cull"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, scene_group, &[]);
        pass.set_bind_group(1, group, &[]);
        pass.dispatch_workgroups_indirect(dispatches, dispatch_offset(dispatch_slot));
    }
}

/// Single-invocation passes that turn counters into dispatch and draw arguments
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandEntry {
    ResetFrame,
    PrepareMeshletDispatch,
    PrepareTriangleDispatch,
    BeginDraw,
    FinalizeDraw,
}

impl CommandEntry {
    const ALL: [CommandEntry; 5] = [
        CommandEntry::ResetFrame,
        CommandEntry::PrepareMeshletDispatch,
        CommandEntry::PrepareTriangleDispatch,
        CommandEntry::BeginDraw,
        CommandEntry::FinalizeDraw,
    ];

    fn entry_point(self) -> &'static str {
        match self {
            CommandEntry::ResetFrame => "reset_frame",
            CommandEntry::PrepareMeshletDispatch => "prepare_meshlet_dispatch",
            CommandEntry::PrepareTriangleDispatch => "prepare_triangle_dispatch",
            CommandEntry::BeginDraw => "begin_draw",
            CommandEntry::FinalizeDraw => "finalize_draw",
        }
    }
}

pub struct CommandPipeline {
    pipelines: Vec<(CommandEntry, wgpu::ComputePipeline)>,
    layout: wgpu::BindGroupLayout,
}

impl CommandPipeline {
    pub fn new(context: &GpuContext) -> EngineResult<Self> {
        let device = &context.device;
        let stage = wgpu::ShaderStages::COMPUTE;
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Command Layout"),
            entries: &[
                layouts::uniform_buffer_entry(0, stage),
                layouts::storage_buffer_entry(1, false, stage),
                layouts::storage_buffer_entry(2, false, stage),
                layouts::storage_buffer_entry(3, false, stage),
            ],
        });

        let module = shaders::create_shader_module(device, "commands", COMMANDS_WGSL)?;
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Command Pipeline Layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });
        let pipelines = CommandEntry::ALL
            .into_iter()
            .map(|entry| {
                let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                    label: Some(entry.entry_point()),
                    layout: Some(&pipeline_layout),
                    module: &module,
                    entry_point: entry.entry_point(),
                });
                (entry, pipeline)
            })
            .collect();

        Ok(Self { pipelines, layout })
    }

    /// Bind group over one pass's limits and the frame's counters, dispatch args and draws
    pub fn bind_group(
        &self,
        device: &wgpu::Device,
        limits: &wgpu::Buffer,
        counters: &wgpu::Buffer,
        dispatches: &wgpu::Buffer,
        draws: &wgpu::Buffer,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Command Bind Group"),
            layout: &self.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: limits.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: counters.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: dispatches.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: draws.as_entire_binding(),
                },
            ],
        })
    }

    pub fn record(&self, encoder: &mut wgpu::CommandEncoder, entry: CommandEntry, group: &wgpu::BindGroup) {
        let Some((_, pipeline)) = self.pipelines.iter().find(|(e, _)| *e == entry) else {
            return;
        };
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some(entry.entry_point()),
            timestamp_writes: None,
        });
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, group, &[]);
        pass.dispatch_workgroups(1, 1, 1);
    }
}
