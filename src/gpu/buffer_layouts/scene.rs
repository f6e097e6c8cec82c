//! Scene table layouts uploaded once per frame

use bytemuck::{Pod, Zeroable};

use crate::scene::{Material, Mesh, MeshInstance, Meshlet, SceneTables, Vertex};

/// Mesh instance record
/// Total size: 32 bytes
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, Pod, Zeroable)]
pub struct GpuMeshInstance {
    pub transform: u32,
    pub mesh: u32,
    pub lod_bias: f32,
    pub _padding: u32,
    /// Mesh-local bounding sphere (xyz = center, w = radius)
    pub bounds: [f32; 4],
}

impl From<&MeshInstance> for GpuMeshInstance {
    fn from(instance: &MeshInstance) -> Self {
        Self {
            transform: instance.transform,
            mesh: instance.mesh,
            lod_bias: instance.lod_bias,
            _padding: 0,
            bounds: instance.bounds.to_vec4().to_array(),
        }
    }
}

/// Total size: 32 bytes
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, Pod, Zeroable)]
pub struct GpuMesh {
    pub meshlet_offset: u32,
    pub meshlet_count: u32,
    /// First entry of this mesh in the LOD table
    pub lod_offset: u32,
    pub lod_count: u32,
    pub material: u32,
    pub _padding: [u32; 3],
}

/// Total size: 16 bytes
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, Pod, Zeroable)]
pub struct GpuMeshLod {
    pub first_meshlet: u32,
    pub meshlet_count: u32,
    pub error: f32,
    pub _padding: u32,
}

/// Total size: 32 bytes
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, Pod, Zeroable)]
pub struct GpuMeshlet {
    pub vertex_offset: u32,
    pub vertex_count: u32,
    /// Byte offset into the packed triangle table
    pub triangle_offset: u32,
    pub triangle_count: u32,
    pub bounds: [f32; 4],
}

impl From<&Meshlet> for GpuMeshlet {
    fn from(meshlet: &Meshlet) -> Self {
        Self {
            vertex_offset: meshlet.vertex_offset,
            vertex_count: meshlet.vertex_count,
            triangle_offset: meshlet.triangle_offset,
            triangle_count: meshlet.triangle_count,
            bounds: meshlet.bounds.to_vec4().to_array(),
        }
    }
}

/// Total size: 32 bytes
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, Pod, Zeroable)]
pub struct GpuVertex {
    pub position: [f32; 3],
    pub u: f32,
    pub normal: [f32; 3],
    pub v: f32,
}

impl From<&Vertex> for GpuVertex {
    fn from(vertex: &Vertex) -> Self {
        Self {
            position: vertex.position.to_array(),
            u: vertex.uv.x,
            normal: vertex.normal.to_array(),
            v: vertex.uv.y,
        }
    }
}

/// Total size: 48 bytes
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, Pod, Zeroable)]
pub struct GpuMaterial {
    pub base_color: [f32; 4],
    pub emissive: [f32; 3],
    pub metallic: f32,
    pub roughness: f32,
    pub occlusion: f32,
    pub _padding: [u32; 2],
}

impl From<&Material> for GpuMaterial {
    fn from(material: &Material) -> Self {
        Self {
            base_color: material.base_color.to_array(),
            emissive: material.emissive.to_array(),
            metallic: material.metallic,
            roughness: material.roughness,
            occlusion: material.occlusion,
            _padding: [0; 2],
        }
    }
}

/// Flattened scene tables in upload order
#[derive(Debug, Clone, Default)]
pub struct GpuSceneTables {
    pub instances: Vec<GpuMeshInstance>,
    pub meshes: Vec<GpuMesh>,
    pub lods: Vec<GpuMeshLod>,
    pub meshlets: Vec<GpuMeshlet>,
    pub vertices: Vec<GpuVertex>,
    pub meshlet_vertices: Vec<u32>,
    /// Triangle corner bytes, four per word, little-endian
    pub meshlet_triangles: Vec<u32>,
    pub materials: Vec<GpuMaterial>,
    pub transforms: Vec<[[f32; 4]; 4]>,
}

impl GpuSceneTables {
    pub fn from_scene(scene: &SceneTables) -> Self {
        let mut lods = Vec::new();
        let meshes = scene
            .meshes
            .iter()
            .map(|mesh: &Mesh| {
                let lod_offset = lods.len() as u32;
                lods.extend(mesh.lods.iter().map(|lod| GpuMeshLod {
                    first_meshlet: lod.first_meshlet,
                    meshlet_count: lod.meshlet_count,
                    error: lod.error,
                    _padding: 0,
                }));
                GpuMesh {
                    meshlet_offset: mesh.meshlet_offset,
                    meshlet_count: mesh.meshlet_count,
                    lod_offset,
                    lod_count: mesh.lods.len() as u32,
                    material: mesh.material,
                    _padding: [0; 3],
                }
            })
            .collect();

        Self {
            instances: scene.instances.iter().map(GpuMeshInstance::from).collect(),
            meshes,
            lods,
            meshlets: scene.geometry.meshlets.iter().map(GpuMeshlet::from).collect(),
            vertices: scene.geometry.vertices.iter().map(GpuVertex::from).collect(),
            meshlet_vertices: scene.geometry.meshlet_vertices.clone(),
            meshlet_triangles: pack_bytes(&scene.geometry.meshlet_triangles),
            materials: scene.materials.iter().map(GpuMaterial::from).collect(),
            transforms: scene.transforms.iter().map(|m| m.to_cols_array_2d()).collect(),
        }
    }
}

/// Pack bytes four to a word, the layout `extractBits(word, 8 * (i % 4), 8)` reads
pub fn pack_bytes(bytes: &[u8]) -> Vec<u32> {
    bytes
        .chunks(4)
        .map(|chunk| {
            chunk
                .iter()
                .enumerate()
                .fold(0u32, |word, (i, byte)| word | (*byte as u32) << (8 * i))
        })
        .collect()
}
