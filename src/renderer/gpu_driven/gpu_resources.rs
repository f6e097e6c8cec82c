//! wgpu buffers of the visibility pipeline
//!
//! Scene tables are uploaded once per frame and bound at group 0 together
//! with the pass's view and limits uniforms. Per-frame buffers live in the
//! frame ring, one `GpuFrameBuffers` per frame in flight.

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::config::RendererConfig;
use crate::error::EngineResult;
use crate::gpu::buffer_layouts::{calculations, counter_slots, layouts, usage};
use crate::gpu::{
    DispatchIndirectCommand, FrameCounters, GpuContext, GpuSceneTables, IndirectDrawIndexedCommand, PassLimits,
    ViewUniform,
};
use crate::renderer::gpu_culling::CullPhase;
use crate::scene::{MeshletInstance, SceneTables};

/// Draw slots: early, late, one per cascade
pub const DRAW_SLOT_COUNT: u32 = crate::gpu::buffer_layouts::slots::DRAW_SHADOW_BASE
    + crate::constants::culling::MAX_SHADOW_CASCADES;

/// Dispatch slots: meshlets, early and late triangles, one per cascade
pub const DISPATCH_SLOT_COUNT: u32 = crate::gpu::buffer_layouts::slots::DISPATCH_SHADOW_BASE
    + crate::constants::culling::MAX_SHADOW_CASCADES;

/// Group 0 layout: view and limits uniforms followed by the scene tables
pub fn scene_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    let stages = wgpu::ShaderStages::COMPUTE | wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT;
    let mut entries = vec![
        layouts::uniform_buffer_entry(0, stages),
        layouts::uniform_buffer_entry(1, stages),
    ];
    entries.extend((2..10).map(|binding| layouts::storage_buffer_entry(binding, true, stages)));

    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("Scene Layout"),
        entries: &entries,
    })
}

/// Storage buffer initialised from `data`, padded to one element when empty
fn storage_init<T: Pod + Zeroable>(device: &wgpu::Device, label: &str, data: &[T]) -> wgpu::Buffer {
    let padding = [T::zeroed()];
    let contents: &[T] = if data.is_empty() { &padding } else { data };
    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some(label),
        contents: bytemuck::cast_slice(contents),
        usage: usage::STORAGE,
    })
}

pub(crate) fn create_buffer(
    context: &GpuContext,
    label: &str,
    size: u64,
    usage: wgpu::BufferUsages,
) -> EngineResult<wgpu::Buffer> {
    context.create_checked(label, |device| {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage,
            mapped_at_creation: false,
        })
    })
}

/// Scene tables resident on the GPU
pub struct GpuSceneBuffers {
    pub instances: wgpu::Buffer,
    pub meshes: wgpu::Buffer,
    pub lods: wgpu::Buffer,
    pub meshlets: wgpu::Buffer,
    pub transforms: wgpu::Buffer,
    pub vertices: wgpu::Buffer,
    pub meshlet_vertices: wgpu::Buffer,
    pub meshlet_triangles: wgpu::Buffer,
    pub materials: wgpu::Buffer,
    pub instance_count: u32,
}

impl GpuSceneBuffers {
    pub fn upload(context: &GpuContext, scene: &SceneTables) -> EngineResult<Self> {
        let tables = GpuSceneTables::from_scene(scene);
        let buffers = context.create_checked("scene tables", |device| Self {
            instances: storage_init(device, "Mesh Instances", &tables.instances),
            meshes: storage_init(device, "Meshes", &tables.meshes),
            lods: storage_init(device, "Mesh LODs", &tables.lods),
            meshlets: storage_init(device, "Meshlets", &tables.meshlets),
            transforms: storage_init(device, "Transforms", &tables.transforms),
            vertices: storage_init(device, "Vertices", &tables.vertices),
            meshlet_vertices: storage_init(device, "Meshlet Vertices", &tables.meshlet_vertices),
            meshlet_triangles: storage_init(device, "Meshlet Triangles", &tables.meshlet_triangles),
            materials: storage_init(device, "Materials", &tables.materials),
            instance_count: tables.instances.len() as u32,
        })?;

        log::debug!(
            "[GpuSceneBuffers::upload] {} instances, {} meshlets, {} vertices",
            tables.instances.len(),
            tables.meshlets.len(),
            tables.vertices.len()
        );
        Ok(buffers)
    }

    pub fn bind_group(
        &self,
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        view: &wgpu::Buffer,
        limits: &wgpu::Buffer,
    ) -> wgpu::BindGroup {
        let resources = [
            view,
            limits,
            &self.instances,
            &self.meshes,
            &self.lods,
            &self.meshlets,
            &self.transforms,
            &self.vertices,
            &self.meshlet_vertices,
            &self.meshlet_triangles,
        ];
        let entries: Vec<wgpu::BindGroupEntry> = resources
            .iter()
            .enumerate()
            .map(|(binding, buffer)| wgpu::BindGroupEntry {
                binding: binding as u32,
                resource: buffer.as_entire_binding(),
            })
            .collect();

        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Scene Bind Group"),
            layout,
            entries: &entries,
        })
    }
}

/// Uniforms of one culling view: the view itself plus the limits of its pass
pub struct PassUniforms {
    pub view: wgpu::Buffer,
    pub limits: wgpu::Buffer,
}

impl PassUniforms {
    fn new(context: &GpuContext, label: &str) -> EngineResult<Self> {
        Ok(Self {
            view: create_buffer(
                context,
                &format!("{label} View"),
                std::mem::size_of::<ViewUniform>() as u64,
                usage::UNIFORM,
            )?,
            limits: create_buffer(
                context,
                &format!("{label} Limits"),
                std::mem::size_of::<PassLimits>() as u64,
                usage::UNIFORM,
            )?,
        })
    }

    pub fn write(&self, queue: &wgpu::Queue, view: &ViewUniform, limits: &PassLimits) {
        queue.write_buffer(&self.view, 0, bytemuck::bytes_of(view));
        queue.write_buffer(&self.limits, 0, bytemuck::bytes_of(limits));
    }
}

/// Buffers of one cascade
pub struct GpuShadowBuffers {
    pub uniforms: PassUniforms,
    pub visible: wgpu::Buffer,
    pub indices: wgpu::Buffer,
}

/// Transient buffers of one GPU frame
pub struct GpuFrameBuffers {
    pub counters: wgpu::Buffer,
    pub dispatches: wgpu::Buffer,
    pub draws: wgpu::Buffer,
    pub meshlet_instances: wgpu::Buffer,
    pub instance_lods: wgpu::Buffer,
    /// Visible meshlet-instance ids, early then late
    pub visible: [wgpu::Buffer; 2],
    pub indices: wgpu::Buffer,
    /// One bit per meshlet instance, set by the early phase
    pub mask: wgpu::Buffer,
    /// Mesh culling pass, also used by the meshlet dispatch preparation
    pub mesh_uniforms: PassUniforms,
    pub phase_uniforms: [PassUniforms; 2],
    pub shadows: Vec<GpuShadowBuffers>,
    pub counters_staging: wgpu::Buffer,
    pub draws_staging: wgpu::Buffer,
}

impl GpuFrameBuffers {
    pub fn new(context: &GpuContext, config: &RendererConfig, slot: usize) -> EngineResult<Self> {
        let meshlets = config.max_meshlet_instances as u64;
        let counters_size = std::mem::size_of::<FrameCounters>() as u64;
        let draws_size = calculations::array_size::<IndirectDrawIndexedCommand>(DRAW_SLOT_COUNT as u64);
        let label = |name: &str| format!("{name} [{slot}]");

        let visible = [
            create_buffer(
                context,
                &label("Early Visible Meshlets"),
                calculations::array_size::<u32>(meshlets),
                usage::STORAGE,
            )?,
            create_buffer(
                context,
                &label("Late Visible Meshlets"),
                calculations::array_size::<u32>(meshlets),
                usage::STORAGE,
            )?,
        ];
        let shadows = (0..config.shadow_cascade_count)
            .map(|c| {
                Ok(GpuShadowBuffers {
                    uniforms: PassUniforms::new(context, &label(&format!("Cascade {c}")))?,
                    visible: create_buffer(
                        context,
                        &label(&format!("Cascade {c} Visible Meshlets")),
                        calculations::array_size::<u32>(meshlets),
                        usage::STORAGE,
                    )?,
                    indices: create_buffer(
                        context,
                        &label(&format!("Cascade {c} Indices")),
                        calculations::array_size::<u32>(config.max_shadow_indices as u64),
                        usage::INDEX_STORAGE,
                    )?,
                })
            })
            .collect::<EngineResult<Vec<_>>>()?;

        let frame = Self {
            counters: create_buffer(context, &label("Counters"), counters_size, usage::STORAGE_READ)?,
            dispatches: create_buffer(
                context,
                &label("Dispatch Arguments"),
                calculations::array_size::<DispatchIndirectCommand>(DISPATCH_SLOT_COUNT as u64),
                usage::INDIRECT,
            )?,
            draws: create_buffer(context, &label("Draw Commands"), draws_size, usage::INDIRECT)?,
            meshlet_instances: create_buffer(
                context,
                &label("Meshlet Instances"),
                calculations::array_size::<MeshletInstance>(meshlets),
                usage::STORAGE,
            )?,
            instance_lods: create_buffer(
                context,
                &label("Instance LODs"),
                calculations::array_size::<u32>(config.max_mesh_instances as u64),
                usage::STORAGE_READ,
            )?,
            visible,
            indices: create_buffer(
                context,
                &label("Reordered Indices"),
                calculations::array_size::<u32>(config.max_reordered_indices as u64),
                usage::INDEX_STORAGE,
            )?,
            mask: create_buffer(
                context,
                &label("Visibility Mask"),
                calculations::array_size::<u32>(calculations::mask_words(config.max_meshlet_instances) as u64),
                usage::STORAGE,
            )?,
            mesh_uniforms: PassUniforms::new(context, &label("Mesh Cull"))?,
            phase_uniforms: [
                PassUniforms::new(context, &label("Early"))?,
                PassUniforms::new(context, &label("Late"))?,
            ],
            shadows,
            counters_staging: create_buffer(context, &label("Counters Staging"), counters_size, usage::STAGING)?,
            draws_staging: create_buffer(context, &label("Draws Staging"), draws_size, usage::STAGING)?,
        };

        log::info!(
            "[GpuFrameBuffers::new] Allocated frame slot {} ({} meshlet instances, {} indices)",
            slot,
            meshlets,
            config.max_reordered_indices
        );
        Ok(frame)
    }

    pub fn phase(&self, phase: CullPhase) -> &PassUniforms {
        &self.phase_uniforms[phase.index()]
    }

    pub fn visible(&self, phase: CullPhase) -> &wgpu::Buffer {
        &self.visible[phase.index()]
    }
}

/// Limits of the mesh culling pass
pub fn mesh_limits(config: &RendererConfig, instance_count: u32) -> PassLimits {
    PassLimits {
        meshlet_capacity: config.max_meshlet_instances,
        index_capacity: config.max_reordered_indices,
        mesh_instance_count: instance_count.min(config.max_mesh_instances),
        visible_slot: counter_slots::MESHLET_INSTANCES,
        index_slot: counter_slots::INDICES,
        dispatch_slot: crate::gpu::buffer_layouts::slots::DISPATCH_MESHLETS,
        draw_slot: crate::gpu::buffer_layouts::slots::DRAW_EARLY,
        phase: CullPhase::Early.as_u32(),
    }
}

/// Limits of one main-view phase
pub fn phase_limits(config: &RendererConfig, instance_count: u32, phase: CullPhase) -> PassLimits {
    PassLimits {
        visible_slot: phase.visible_counter_slot(),
        dispatch_slot: phase.dispatch_slot(),
        draw_slot: phase.draw_slot(),
        phase: phase.as_u32(),
        ..mesh_limits(config, instance_count)
    }
}

/// Limits of one shadow cascade
pub fn cascade_limits(config: &RendererConfig, instance_count: u32, cascade: u32) -> PassLimits {
    use crate::gpu::buffer_layouts::slots;
    PassLimits {
        meshlet_capacity: config.max_meshlet_instances,
        index_capacity: config.max_shadow_indices,
        mesh_instance_count: instance_count.min(config.max_mesh_instances),
        visible_slot: counter_slots::SHADOW_MESHLETS_BASE + cascade,
        index_slot: counter_slots::SHADOW_INDICES_BASE + cascade,
        dispatch_slot: slots::DISPATCH_SHADOW_BASE + cascade,
        draw_slot: slots::DRAW_SHADOW_BASE + cascade,
        phase: crate::renderer::gpu_culling::PHASE_SHADOW,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_counts_match_shaders() {
        assert_eq!(DRAW_SLOT_COUNT, 6);
        assert_eq!(DISPATCH_SLOT_COUNT, 7);
    }

    #[test]
    fn test_phase_limits_route_counters() {
        let config = RendererConfig::default();
        let early = phase_limits(&config, 10, CullPhase::Early);
        let late = phase_limits(&config, 10, CullPhase::Late);
        assert_eq!(early.visible_slot, counter_slots::EARLY_MESHLETS);
        assert_eq!(late.visible_slot, counter_slots::LATE_MESHLETS);
        assert_eq!(early.index_slot, late.index_slot);
        assert_ne!(early.draw_slot, late.draw_slot);

        let cascade = cascade_limits(&config, 10, 1);
        assert_eq!(cascade.index_slot, counter_slots::SHADOW_INDICES_BASE + 1);
        assert_eq!(cascade.index_capacity, config.max_shadow_indices);
        assert_eq!(cascade.phase, crate::renderer::gpu_culling::PHASE_SHADOW);
    }

    #[test]
    fn test_mesh_limits_clamp_instance_count() {
        let config = RendererConfig {
            max_mesh_instances: 4,
            ..Default::default()
        };
        assert_eq!(mesh_limits(&config, 10).mesh_instance_count, 4);
    }
}
