//! Mesh instances placed in the world

use crate::math::BoundingSphere;

/// One placed copy of a mesh. Owned by the scene collaborator, read-only to the pipeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshInstance {
    pub mesh: u32,
    /// Index into `SceneTables::transforms`
    pub transform: u32,
    /// Mesh-local bounding volume; transformed at cull time
    pub bounds: BoundingSphere,
    /// Multiplies the projected LOD error; values above 1 favour finer LODs
    pub lod_bias: f32,
}

impl MeshInstance {
    pub fn new(mesh: u32, transform: u32, bounds: BoundingSphere) -> Self {
        Self {
            mesh,
            transform,
            bounds,
            lod_bias: 1.0,
        }
    }
}

/// Meshlet produced by mesh culling: (mesh instance, meshlet-within-mesh)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MeshletInstance {
    pub instance: u32,
    pub meshlet: u32,
}

impl MeshletInstance {
    pub fn new(instance: u32, meshlet: u32) -> Self {
        Self { instance, meshlet }
    }
}
