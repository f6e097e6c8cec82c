//! Scene-side data contracts read by the visibility pipeline
//!
//! The scene collaborator owns these tables and mutates them between frames.
//! Inside a frame every pass treats them as read-only.

pub mod instance;
pub mod mesh;
pub mod procedural;
pub mod view;

pub use instance::{MeshInstance, MeshletInstance};
pub use mesh::{LodSource, Material, Mesh, MeshLod, Meshlet, MeshletGeometry, Vertex};
pub use view::{ShadowCascade, ViewParams};

use glam::Mat4;

use crate::constants::meshlets::{MAX_MESHLET_TRIANGLES, MAX_MESHLET_VERTICES};
use crate::error::{EngineError, EngineResult};
use crate::math::BoundingSphere;
use crate::renderer::visibility::VisibilityId;

/// Mesh, meshlet, material, transform and instance tables for one scene
#[derive(Debug, Clone, Default)]
pub struct SceneTables {
    pub meshes: Vec<Mesh>,
    pub geometry: MeshletGeometry,
    pub materials: Vec<Material>,
    pub transforms: Vec<Mat4>,
    pub instances: Vec<MeshInstance>,
}

impl SceneTables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_material(&mut self, material: Material) -> u32 {
        self.materials.push(material);
        self.materials.len() as u32 - 1
    }

    pub fn add_transform(&mut self, transform: Mat4) -> u32 {
        self.transforms.push(transform);
        self.transforms.len() as u32 - 1
    }

    /// Pack each LOD into meshlets and register the mesh. LODs are given finest first.
    pub fn add_mesh(&mut self, lods: &[LodSource<'_>], material: u32) -> EngineResult<u32> {
        if lods.is_empty() {
            return Err(EngineError::degenerate("mesh", "a mesh needs at least one LOD"));
        }

        let meshlet_offset = self.geometry.meshlets.len() as u32;
        let mut mesh_lods = Vec::with_capacity(lods.len());
        let mut positions = Vec::new();

        for lod in lods {
            let (first, count) = self.geometry.push_mesh(lod.vertices, lod.indices)?;
            mesh_lods.push(MeshLod {
                first_meshlet: first - meshlet_offset,
                meshlet_count: count,
                error: lod.error,
            });
            positions.extend(lod.vertices.iter().map(|v| v.position));
        }

        let meshlet_count = self.geometry.meshlets.len() as u32 - meshlet_offset;
        self.meshes.push(Mesh {
            meshlet_offset,
            meshlet_count,
            lods: mesh_lods,
            material,
            bounds: BoundingSphere::from_points(&positions),
        });
        Ok(self.meshes.len() as u32 - 1)
    }

    /// Place a mesh, using the mesh's own bounds for culling
    pub fn add_instance(&mut self, mesh: u32, transform: Mat4) -> EngineResult<u32> {
        let bounds = self
            .meshes
            .get(mesh as usize)
            .map(|m| m.bounds)
            .ok_or_else(|| EngineError::degenerate("mesh instance", format!("unknown mesh {mesh}")))?;
        let transform = self.add_transform(transform);
        self.instances.push(MeshInstance::new(mesh, transform, bounds));
        Ok(self.instances.len() as u32 - 1)
    }

    /// Meshlets across every mesh instance, all LODs included
    pub fn meshlet_upper_bound(&self) -> u64 {
        self.instances
            .iter()
            .filter_map(|i| self.meshes.get(i.mesh as usize))
            .map(|m| m.meshlet_count as u64)
            .sum()
    }

    pub fn triangle_count(&self, meshlet_index: u32) -> u32 {
        self.geometry
            .meshlets
            .get(meshlet_index as usize)
            .map_or(0, |m| m.triangle_count)
    }

    pub fn instance_transform(&self, instance: &MeshInstance) -> Mat4 {
        self.transforms
            .get(instance.transform as usize)
            .copied()
            .unwrap_or(Mat4::IDENTITY)
    }

    /// Reject tables the passes could not index safely
    pub fn validate(&self) -> EngineResult<()> {
        check_meshlet_count(self.geometry.meshlets.len(), MAX_SCENE_MESHLETS)?;
        let meshlet_total = self.geometry.meshlets.len() as u64;

        for (index, meshlet) in self.geometry.meshlets.iter().enumerate() {
            self.validate_meshlet(meshlet)
                .map_err(|reason| EngineError::degenerate(format!("meshlet {index}"), reason))?;
        }

        for (index, mesh) in self.meshes.iter().enumerate() {
            let what = || format!("mesh {index}");
            if mesh.lods.is_empty() {
                return Err(EngineError::degenerate(what(), "LOD table has no entries"));
            }
            if mesh.meshlet_offset as u64 + mesh.meshlet_count as u64 > meshlet_total {
                return Err(EngineError::degenerate(what(), "meshlet range outside the meshlet table"));
            }
            for (level, lod) in mesh.lods.iter().enumerate() {
                if lod.first_meshlet as u64 + lod.meshlet_count as u64 > mesh.meshlet_count as u64 {
                    return Err(EngineError::degenerate(
                        what(),
                        format!("LOD {level} meshlet range outside the mesh"),
                    ));
                }
            }
            if mesh.material as usize >= self.materials.len() {
                return Err(EngineError::degenerate(
                    what(),
                    format!("unknown material {}", mesh.material),
                ));
            }
        }

        for (index, instance) in self.instances.iter().enumerate() {
            if instance.mesh as usize >= self.meshes.len() {
                return Err(EngineError::degenerate(
                    format!("mesh instance {index}"),
                    format!("unknown mesh {}", instance.mesh),
                ));
            }
            if instance.transform as usize >= self.transforms.len() {
                return Err(EngineError::degenerate(
                    format!("mesh instance {index}"),
                    format!("unknown transform {}", instance.transform),
                ));
            }
        }

        Ok(())
    }

    fn validate_meshlet(&self, meshlet: &Meshlet) -> Result<(), String> {
        if meshlet.triangle_count > MAX_MESHLET_TRIANGLES || meshlet.vertex_count > MAX_MESHLET_VERTICES {
            return Err(format!(
                "{} triangles / {} vertices exceeds {} / {}",
                meshlet.triangle_count, meshlet.vertex_count, MAX_MESHLET_TRIANGLES, MAX_MESHLET_VERTICES
            ));
        }

        let geometry = &self.geometry;
        let vertex_start = meshlet.vertex_offset as u64;
        let vertex_end = vertex_start + meshlet.vertex_count as u64;
        let triangle_start = meshlet.triangle_offset as u64;
        let triangle_end = triangle_start + meshlet.triangle_count as u64 * 3;
        if vertex_end > geometry.meshlet_vertices.len() as u64
            || triangle_end > geometry.meshlet_triangles.len() as u64
        {
            return Err("vertex or triangle range outside the geometry tables".to_string());
        }

        let vertices = &geometry.meshlet_vertices[vertex_start as usize..vertex_end as usize];
        if let Some(vertex) = vertices.iter().find(|v| **v as usize >= geometry.vertices.len()) {
            return Err(format!(
                "vertex {} outside the {}-entry vertex pool",
                vertex,
                geometry.vertices.len()
            ));
        }
        let corners = &geometry.meshlet_triangles[triangle_start as usize..triangle_end as usize];
        if let Some(local) = corners.iter().find(|c| **c as u32 >= meshlet.vertex_count) {
            return Err(format!(
                "local index {} outside {} meshlet vertices",
                local, meshlet.vertex_count
            ));
        }
        Ok(())
    }
}

/// Visibility ids carry the absolute meshlet index in 24 bits
const MAX_SCENE_MESHLETS: u64 = VisibilityId::MAX_MESHLET as u64 + 1;

fn check_meshlet_count(count: usize, limit: u64) -> EngineResult<()> {
    if count as u64 > limit {
        return Err(EngineError::degenerate(
            "meshlet table",
            format!("{count} meshlets exceeds the addressable {limit}"),
        ));
    }
    Ok(())
}
