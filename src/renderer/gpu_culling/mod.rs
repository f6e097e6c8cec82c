//! Culling stages of the visibility pipeline
//!
//! Each stage carries a CPU kernel, used by the software renderer and as the
//! reference for tests, and a wgpu compute pipeline that runs the same
//! decision on the GPU.

pub mod hzb_builder;
pub mod mesh_culler;
pub mod meshlet_culler;
pub mod shadow_cascades;
pub mod triangle_culler;

pub use hzb_builder::{mip_count, HiZGenerator, HiZPyramid, HIZ_FORMAT};
pub use mesh_culler::{InstanceDecision, MeshCullPipeline, MeshCullTargets, MeshCuller, LOD_CULLED};
pub use meshlet_culler::{CullPhase, MeshletCullPipeline, MeshletCuller, PHASE_SHADOW};
pub use shadow_cascades::{
    validate_cascades, ShadowCascadeCuller, ShadowCascadeTargets, ShadowMaps, SHADOW_FORMAT,
};
pub use triangle_culler::{
    pack_index, triangle_visible, unpack_index, CommandEntry, CommandPipeline, TriangleCullPipeline,
    TriangleCuller,
};

use glam::{Mat4, UVec2, Vec4};

use crate::config::BoundsPolicy;
use crate::math::{BoundingSphere, Frustum};
use crate::renderer::flags::CullFlags;
use crate::renderer::gpu_driven::lod_system::LodContext;
use crate::scene::{MeshInstance, Meshlet, MeshletInstance, SceneTables, ShadowCascade, ViewParams};

/// Per-view inputs shared by the CPU culling kernels
#[derive(Debug, Clone, Copy)]
pub struct CullView {
    pub view_proj: Mat4,
    pub frustum: Frustum,
    pub resolution: UVec2,
    pub flags: CullFlags,
    pub lod: LodContext,
    pub bounds_policy: BoundsPolicy,
}

impl CullView {
    pub fn main(view: &ViewParams, bounds_policy: BoundsPolicy) -> Self {
        Self {
            view_proj: view.view_proj,
            frustum: view.frustum(),
            resolution: view.resolution,
            flags: view.cull_flags,
            lod: LodContext {
                observer: view.observer,
                max_resolution: view.resolution.max_element() as f32,
                threshold: view.lod_error_threshold,
            },
            bounds_policy,
        }
    }

    /// Cascade views keep the main view's LOD inputs and never test occlusion
    pub fn cascade(view: &ViewParams, cascade: &ShadowCascade, bounds_policy: BoundsPolicy) -> Self {
        Self {
            view_proj: cascade.view_proj,
            frustum: Frustum::from_view_proj(&cascade.view_proj),
            resolution: cascade.extent(),
            flags: view.cull_flags.for_shadow_cascade(),
            ..Self::main(view, bounds_policy)
        }
    }

    /// Visibility verdict for a bound that cannot be tested
    pub fn accepts_invalid_bounds(&self) -> bool {
        self.bounds_policy == BoundsPolicy::FailOpen
    }
}

/// Meshlet record and world transform behind a meshlet instance
pub(crate) struct ResolvedMeshlet<'a> {
    pub instance: &'a MeshInstance,
    pub meshlet_index: u32,
    pub meshlet: &'a Meshlet,
    pub transform: Mat4,
}

pub(crate) fn resolve_meshlet<'a>(
    scene: &'a SceneTables,
    meshlet_instance: &MeshletInstance,
) -> Option<ResolvedMeshlet<'a>> {
    let instance = scene.instances.get(meshlet_instance.instance as usize)?;
    let mesh = scene.meshes.get(instance.mesh as usize)?;
    let meshlet_index = mesh.meshlet_index(meshlet_instance.meshlet);
    let meshlet = scene.geometry.meshlets.get(meshlet_index as usize)?;
    Some(ResolvedMeshlet {
        instance,
        meshlet_index,
        meshlet,
        transform: scene.instance_transform(instance),
    })
}

impl ResolvedMeshlet<'_> {
    pub fn world_bounds(&self) -> BoundingSphere {
        self.meshlet.bounds.transformed(&self.transform)
    }

    /// Clip-space corners of one triangle
    pub fn triangle_clip(&self, scene: &SceneTables, triangle: u32, view_proj: &Mat4) -> [Vec4; 3] {
        let to_clip = *view_proj * self.transform;
        scene
            .geometry
            .triangle_vertices(self.meshlet, triangle)
            .map(|vertex| to_clip * vertex.position.extend(1.0))
    }
}
