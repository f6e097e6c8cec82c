//! Static geometry: meshes, LODs, meshlets and the shared vertex pool

use glam::{Vec2, Vec3, Vec4};
use rustc_hash::FxHashMap;

use crate::constants::meshlets::{MAX_MESHLET_TRIANGLES, MAX_MESHLET_VERTICES};
use crate::error::{EngineError, EngineResult};
use crate::math::BoundingSphere;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub uv: Vec2,
}

impl Vertex {
    pub fn new(position: Vec3, normal: Vec3, uv: Vec2) -> Self {
        Self {
            position,
            normal,
            uv,
        }
    }
}

/// A small cluster of triangles sharing at most `MAX_MESHLET_VERTICES` vertices
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Meshlet {
    /// First entry in `MeshletGeometry::meshlet_vertices`
    pub vertex_offset: u32,
    pub vertex_count: u32,
    /// First byte in `MeshletGeometry::meshlet_triangles` (three bytes per triangle)
    pub triangle_offset: u32,
    pub triangle_count: u32,
    /// Mesh-local bounds
    pub bounds: BoundingSphere,
}

/// One level of detail: a contiguous meshlet range relative to the mesh
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshLod {
    pub first_meshlet: u32,
    pub meshlet_count: u32,
    /// Object-space geometric error of this level relative to the source mesh
    pub error: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    /// First meshlet of this mesh in the global meshlet table
    pub meshlet_offset: u32,
    /// Meshlets across all LODs
    pub meshlet_count: u32,
    /// Finest first
    pub lods: Vec<MeshLod>,
    pub material: u32,
    pub bounds: BoundingSphere,
}

impl Mesh {
    /// Absolute meshlet index of a meshlet addressed relative to this mesh
    #[inline]
    pub fn meshlet_index(&self, meshlet_within_mesh: u32) -> u32 {
        self.meshlet_offset + meshlet_within_mesh
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Material {
    pub base_color: Vec4,
    pub emissive: Vec3,
    pub metallic: f32,
    pub roughness: f32,
    pub occlusion: f32,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            base_color: Vec4::ONE,
            emissive: Vec3::ZERO,
            metallic: 0.0,
            roughness: 0.5,
            occlusion: 1.0,
        }
    }
}

/// Source geometry for one LOD when assembling a mesh
#[derive(Debug, Clone, Copy)]
pub struct LodSource<'a> {
    pub vertices: &'a [Vertex],
    pub indices: &'a [u32],
    pub error: f32,
}

/// Shared vertex pool and meshlet tables for all meshes
#[derive(Debug, Clone, Default)]
pub struct MeshletGeometry {
    pub vertices: Vec<Vertex>,
    /// Absolute vertex indices, addressed by `Meshlet::vertex_offset`
    pub meshlet_vertices: Vec<u32>,
    /// Meshlet-local vertex indices, addressed by `Meshlet::triangle_offset`
    pub meshlet_triangles: Vec<u8>,
    pub meshlets: Vec<Meshlet>,
}

impl MeshletGeometry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Corner positions of one meshlet triangle, mesh-local
    pub fn triangle_vertices(&self, meshlet: &Meshlet, triangle: u32) -> [&Vertex; 3] {
        let base = (meshlet.triangle_offset + triangle * 3) as usize;
        [0, 1, 2].map(|corner| {
            let local = self.meshlet_triangles[base + corner] as u32;
            let vertex = self.meshlet_vertices[(meshlet.vertex_offset + local) as usize];
            &self.vertices[vertex as usize]
        })
    }

    /// Greedily pack an indexed triangle list into meshlets.
    ///
    /// Returns the index of the first appended meshlet and the number appended.
    pub fn push_mesh(&mut self, vertices: &[Vertex], indices: &[u32]) -> EngineResult<(u32, u32)> {
        if indices.len() % 3 != 0 {
            return Err(EngineError::degenerate(
                "mesh indices",
                format!("{} indices is not a whole number of triangles", indices.len()),
            ));
        }
        if let Some(bad) = indices.iter().find(|i| **i as usize >= vertices.len()) {
            return Err(EngineError::degenerate(
                "mesh indices",
                format!("index {} out of range for {} vertices", bad, vertices.len()),
            ));
        }

        let vertex_base = self.vertices.len() as u32;
        self.vertices.extend_from_slice(vertices);

        let first_meshlet = self.meshlets.len() as u32;
        let mut builder = MeshletPacker::default();

        for triangle in indices.chunks_exact(3) {
            if !builder.fits(triangle) {
                builder.flush(self, vertex_base);
            }
            builder.push(triangle);
        }
        builder.flush(self, vertex_base);

        let count = self.meshlets.len() as u32 - first_meshlet;
        log::debug!(
            "[MeshletGeometry::push_mesh] Packed {} triangles into {} meshlets",
            indices.len() / 3,
            count
        );
        Ok((first_meshlet, count))
    }
}

#[derive(Default)]
struct MeshletPacker {
    local: FxHashMap<u32, u8>,
    vertices: Vec<u32>,
    triangles: Vec<u8>,
}

impl MeshletPacker {
    fn fits(&self, triangle: &[u32]) -> bool {
        let new_vertices = triangle
            .iter()
            .enumerate()
            .filter(|(i, v)| !self.local.contains_key(*v) && !triangle[..*i].contains(*v))
            .count();
        self.vertices.len() + new_vertices <= MAX_MESHLET_VERTICES as usize
            && self.triangles.len() / 3 < MAX_MESHLET_TRIANGLES as usize
    }

    fn push(&mut self, triangle: &[u32]) {
        for vertex in triangle {
            let local = match self.local.get(vertex) {
                Some(local) => *local,
                None => {
                    let next = self.vertices.len() as u8;
                    self.local.insert(*vertex, next);
                    self.vertices.push(*vertex);
                    next
                }
            };
            self.triangles.push(local);
        }
    }

    fn flush(&mut self, geometry: &mut MeshletGeometry, vertex_base: u32) {
        if self.triangles.is_empty() {
            return;
        }

        let positions: Vec<Vec3> = self
            .vertices
            .iter()
            .map(|v| geometry.vertices[(vertex_base + v) as usize].position)
            .collect();

        geometry.meshlets.push(Meshlet {
            vertex_offset: geometry.meshlet_vertices.len() as u32,
            vertex_count: self.vertices.len() as u32,
            triangle_offset: geometry.meshlet_triangles.len() as u32,
            triangle_count: (self.triangles.len() / 3) as u32,
            bounds: BoundingSphere::from_points(&positions),
        });
        geometry
            .meshlet_vertices
            .extend(self.vertices.iter().map(|v| vertex_base + v));
        geometry.meshlet_triangles.extend_from_slice(&self.triangles);

        self.local.clear();
        self.vertices.clear();
        self.triangles.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(n: u32) -> (Vec<Vertex>, Vec<u32>) {
        let mut vertices = Vec::new();
        for y in 0..=n {
            for x in 0..=n {
                vertices.push(Vertex::new(
                    Vec3::new(x as f32, y as f32, 0.0),
                    Vec3::Z,
                    Vec2::new(x as f32 / n as f32, y as f32 / n as f32),
                ));
            }
        }
        let mut indices = Vec::new();
        for y in 0..n {
            for x in 0..n {
                let i = y * (n + 1) + x;
                indices.extend_from_slice(&[i, i + 1, i + n + 2, i, i + n + 2, i + n + 1]);
            }
        }
        (vertices, indices)
    }

    #[test]
    fn test_single_triangle_meshlet() {
        let mut geometry = MeshletGeometry::new();
        let vertices = [
            Vertex::new(Vec3::ZERO, Vec3::Z, Vec2::ZERO),
            Vertex::new(Vec3::X, Vec3::Z, Vec2::X),
            Vertex::new(Vec3::Y, Vec3::Z, Vec2::Y),
        ];
        let (first, count) = geometry.push_mesh(&vertices, &[0, 1, 2]).unwrap();

        assert_eq!((first, count), (0, 1));
        let meshlet = geometry.meshlets[0];
        assert_eq!(meshlet.vertex_count, 3);
        assert_eq!(meshlet.triangle_count, 1);
        let corners = geometry.triangle_vertices(&meshlet, 0);
        assert_eq!(corners[1].position, Vec3::X);
    }

    #[test]
    fn test_packing_respects_limits_and_preserves_triangles() {
        let (vertices, indices) = grid(16);
        let mut geometry = MeshletGeometry::new();
        let (_, count) = geometry.push_mesh(&vertices, &indices).unwrap();

        assert!(count > 1);
        let mut total_triangles = 0;
        for meshlet in &geometry.meshlets {
            assert!(meshlet.vertex_count <= MAX_MESHLET_VERTICES);
            assert!(meshlet.triangle_count <= MAX_MESHLET_TRIANGLES);
            total_triangles += meshlet.triangle_count;

            for t in 0..meshlet.triangle_count {
                for corner in geometry.triangle_vertices(meshlet, t) {
                    let p = corner.position;
                    assert!(p.distance(meshlet.bounds.center) <= meshlet.bounds.radius + 1.0e-4);
                }
            }
        }
        assert_eq!(total_triangles as usize, indices.len() / 3);
    }

    #[test]
    fn test_rejects_out_of_range_index() {
        let mut geometry = MeshletGeometry::new();
        let vertices = [Vertex::default(); 3];
        let result = geometry.push_mesh(&vertices, &[0, 1, 3]);
        assert!(matches!(result, Err(EngineError::DegenerateInput { .. })));
    }
}
