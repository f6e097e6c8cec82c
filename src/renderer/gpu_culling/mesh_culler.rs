//! Mesh-instance culling and meshlet expansion
//!
//! Every mesh instance is frustum tested and assigned an LOD. Survivors append
//! one meshlet instance per meshlet of their LOD to the frame's meshlet list.

use rayon::prelude::*;

use crate::constants::workgroups::CULL_WORKGROUP_SIZE;
use crate::error::EngineResult;
use crate::gpu::buffer_layouts::{layouts, DispatchIndirectCommand};
use crate::gpu::GpuContext;
use crate::math::max_axis_scale;
use crate::renderer::gpu_driven::counters::{AppendCounter, CapacityDiagnostic};
use crate::renderer::shaders::{self, MESH_CULL_WGSL};
use crate::scene::{MeshInstance, MeshletInstance, SceneTables};

use super::CullView;

/// Value stored in the instance LOD table for culled instances
pub const LOD_CULLED: u32 = u32::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceDecision {
    Culled,
    Visible { lod: u32 },
}

impl InstanceDecision {
    pub fn lod_entry(self) -> u32 {
        match self {
            InstanceDecision::Culled => LOD_CULLED,
            InstanceDecision::Visible { lod } => lod,
        }
    }
}

/// Outputs of one mesh culling pass
#[derive(Debug, Default)]
pub struct MeshCullTargets {
    pub meshlet_instances: Vec<MeshletInstance>,
    /// Selected LOD per tested instance, `LOD_CULLED` when rejected
    pub instance_lods: Vec<u32>,
    pub tested: u32,
    pub visible: u32,
}

impl MeshCullTargets {
    pub fn clear(&mut self) {
        self.meshlet_instances.clear();
        self.instance_lods.clear();
        self.tested = 0;
        self.visible = 0;
    }
}

pub struct MeshCuller;

impl MeshCuller {
    /// Frustum and LOD decision for one instance
    pub fn cull_instance(
        scene: &SceneTables,
        instance: &MeshInstance,
        view: &CullView,
    ) -> EngineResult<InstanceDecision> {
        let transform = scene.instance_transform(instance);
        let world = instance.bounds.transformed(&transform);
        let mesh = scene.meshes.get(instance.mesh as usize);

        if !world.is_valid() {
            if !view.accepts_invalid_bounds() {
                return Ok(InstanceDecision::Culled);
            }
            log::warn!(
                "[MeshCuller::cull_instance] Mesh {} has invalid bounds {:?}, keeping it at LOD 0",
                instance.mesh,
                instance.bounds
            );
            return Ok(InstanceDecision::Visible { lod: 0 });
        }

        if view.flags.frustum() && !view.frustum.intersects_sphere(world.center, world.radius) {
            return Ok(InstanceDecision::Culled);
        }

        let Some(mesh) = mesh else {
            return Ok(InstanceDecision::Culled);
        };
        let lod = if view.flags.lod_selection() {
            view.lod
                .select(mesh, &world, max_axis_scale(&transform) * instance.lod_bias)?
        } else {
            0
        };
        Ok(InstanceDecision::Visible { lod })
    }

    /// Cull the first `max_instances` instances and expand survivors into `targets`.
    ///
    /// Returns a diagnostic when the scene holds more instances than the pass accepts.
    pub fn run(
        scene: &SceneTables,
        view: &CullView,
        max_instances: u32,
        counter: &mut AppendCounter,
        targets: &mut MeshCullTargets,
    ) -> EngineResult<Option<CapacityDiagnostic>> {
        let total = scene.instances.len();
        let accepted = total.min(max_instances as usize);
        let diagnostic = CapacityDiagnostic::new("mesh instances", max_instances as u64, total as u64);
        if diagnostic.is_some() {
            log::warn!(
                "[MeshCuller::run] {} mesh instances exceed the limit of {}, the rest are skipped",
                total,
                max_instances
            );
        }

        let decisions = scene.instances[..accepted]
            .par_iter()
            .map(|instance| Self::cull_instance(scene, instance, view))
            .collect::<EngineResult<Vec<_>>>()?;

        targets.tested = accepted as u32;
        targets.instance_lods = decisions.iter().map(|d| d.lod_entry()).collect();

        for (index, decision) in decisions.iter().enumerate() {
            let InstanceDecision::Visible { lod } = *decision else {
                continue;
            };
            let instance = &scene.instances[index];
            let Some(lod) = scene
                .meshes
                .get(instance.mesh as usize)
                .and_then(|mesh| mesh.lods.get(lod as usize))
            else {
                continue;
            };

            targets.visible += 1;
            let slots = counter.reserve(lod.meshlet_count);
            targets.meshlet_instances.extend(
                (0..slots.len() as u32)
                    .map(|i| MeshletInstance::new(index as u32, lod.first_meshlet + i)),
            );
        }

        log::debug!(
            "[MeshCuller::run] {} of {} instances visible, {} meshlet instances requested",
            targets.visible,
            targets.tested,
            counter.requested()
        );
        Ok(diagnostic)
    }
}

/// GPU mesh culling pass: one invocation per mesh instance
pub struct MeshCullPipeline {
    pipeline: wgpu::ComputePipeline,
    layout: wgpu::BindGroupLayout,
}

impl MeshCullPipeline {
    pub fn new(context: &GpuContext, scene_layout: &wgpu::BindGroupLayout) -> EngineResult<Self> {
        let device = &context.device;
        let stage = wgpu::ShaderStages::COMPUTE;
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Mesh Cull Layout"),
            entries: &[
                layouts::storage_buffer_entry(0, false, stage),
                layouts::storage_buffer_entry(1, false, stage),
                layouts::storage_buffer_entry(2, false, stage),
            ],
        });

        let module = shaders::create_shader_module(device, "mesh_cull", MESH_CULL_WGSL)?;
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Mesh Cull Pipeline Layout"),
            bind_group_layouts: &[scene_layout, &layout],
            push_constant_ranges: &[],
        });
        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Mesh Cull Pipeline"),
            layout: Some(&pipeline_layout),
            module: &module,
            entry_point: "cull_mesh_instances",
        });

        Ok(Self { pipeline, layout })
    }

    pub fn bind_group(
        &self,
        device: &wgpu::Device,
        meshlet_instances: &wgpu::Buffer,
        counters: &wgpu::Buffer,
        instance_lods: &wgpu::Buffer,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Mesh Cull Bind Group"),
            layout: &self.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: meshlet_instances.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: counters.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: instance_lods.as_entire_binding(),
                },
            ],
        })
    }

    pub fn record(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        scene_group: &wgpu::BindGroup,
        group: &wgpu::BindGroup,
        instance_count: u32,
    ) {
        let dispatch = DispatchIndirectCommand::for_items(instance_count, CULL_WORKGROUP_SIZE);
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("Mesh Cull"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, scene_group, &[]);
        pass.set_bind_group(1, group, &[]);
        pass.dispatch_workgroups(dispatch.workgroups_x, dispatch.workgroups_y, dispatch.workgroups_z);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BoundsPolicy;
    use crate::math::BoundingSphere;
    use crate::renderer::flags::CullFlags;
    use crate::scene::{LodSource, Material, Vertex, ViewParams};
    use glam::{Mat4, UVec2, Vec2, Vec3};

    fn camera() -> ViewParams {
        let proj = Mat4::perspective_infinite_reverse_rh(60f32.to_radians(), 1.0, 0.1);
        let view = Mat4::look_at_rh(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y);
        ViewParams::new(proj * view, Vec3::ZERO, UVec2::new(256, 256))
    }

    fn scene(positions: &[Vec3]) -> SceneTables {
        let vertices = [
            Vertex::new(Vec3::new(-1.0, -1.0, 0.0), Vec3::Z, Vec2::ZERO),
            Vertex::new(Vec3::new(1.0, -1.0, 0.0), Vec3::Z, Vec2::X),
            Vertex::new(Vec3::new(0.0, 1.0, 0.0), Vec3::Z, Vec2::Y),
        ];
        let indices = [0, 1, 2];
        let mut scene = SceneTables::new();
        let material = scene.add_material(Material::default());
        let lod = LodSource {
            vertices: &vertices,
            indices: &indices,
            error: 0.0,
        };
        let mesh = scene.add_mesh(&[lod], material).unwrap();
        for position in positions {
            scene.add_instance(mesh, Mat4::from_translation(*position)).unwrap();
        }
        scene
    }

    fn run(scene: &SceneTables, view: &CullView, max_instances: u32) -> (MeshCullTargets, AppendCounter) {
        let mut counter = AppendCounter::new("meshlet instances", 64);
        let mut targets = MeshCullTargets::default();
        MeshCuller::run(scene, view, max_instances, &mut counter, &mut targets).unwrap();
        (targets, counter)
    }

    #[test]
    fn test_instance_behind_camera_is_culled() {
        let scene = scene(&[Vec3::new(0.0, 0.0, -5.0), Vec3::new(0.0, 0.0, 5.0)]);
        let view = CullView::main(&camera(), BoundsPolicy::FailOpen);
        let (targets, counter) = run(&scene, &view, 16);

        assert_eq!(targets.tested, 2);
        assert_eq!(targets.visible, 1);
        assert_eq!(targets.meshlet_instances, vec![MeshletInstance::new(0, 0)]);
        assert_eq!(targets.instance_lods, vec![0, LOD_CULLED]);
        assert_eq!(counter.requested(), 1);
    }

    #[test]
    fn test_disabled_frustum_keeps_everything() {
        let scene = scene(&[Vec3::new(0.0, 0.0, 5.0)]);
        let view = CullView::main(
            &camera().with_cull_flags(CullFlags::default() - CullFlags::FRUSTUM_CULLING),
            BoundsPolicy::FailOpen,
        );
        let (targets, _) = run(&scene, &view, 16);
        assert_eq!(targets.meshlet_instances.len(), 1);
    }

    #[test]
    fn test_invalid_bounds_follow_policy() {
        let mut scene = scene(&[Vec3::new(0.0, 0.0, 50.0)]);
        scene.instances[0].bounds = BoundingSphere::new(Vec3::ZERO, 0.0);

        let fail_open = CullView::main(&camera(), BoundsPolicy::FailOpen);
        assert_eq!(
            MeshCuller::cull_instance(&scene, &scene.instances[0], &fail_open).unwrap(),
            InstanceDecision::Visible { lod: 0 }
        );

        let reject = CullView::main(&camera(), BoundsPolicy::Reject);
        assert_eq!(
            MeshCuller::cull_instance(&scene, &scene.instances[0], &reject).unwrap(),
            InstanceDecision::Culled
        );
    }

    #[test]
    fn test_instance_limit_is_reported() {
        let scene = scene(&[Vec3::new(0.0, 0.0, -5.0); 3]);
        let view = CullView::main(&camera(), BoundsPolicy::FailOpen);
        let mut counter = AppendCounter::new("meshlet instances", 64);
        let mut targets = MeshCullTargets::default();
        let diagnostic = MeshCuller::run(&scene, &view, 2, &mut counter, &mut targets)
            .unwrap()
            .unwrap();

        assert_eq!(targets.tested, 2);
        assert_eq!((diagnostic.capacity, diagnostic.requested), (2, 3));
    }

    #[test]
    fn test_meshlet_overflow_keeps_requested_count() {
        let scene = scene(&[Vec3::new(0.0, 0.0, -5.0); 5]);
        let view = CullView::main(&camera(), BoundsPolicy::FailOpen);
        let mut counter = AppendCounter::new("meshlet instances", 3);
        let mut targets = MeshCullTargets::default();
        MeshCuller::run(&scene, &view, 16, &mut counter, &mut targets).unwrap();

        assert_eq!(targets.meshlet_instances.len(), 3);
        assert_eq!(counter.requested(), 5);
        assert!(counter.overflowed());
    }
}
