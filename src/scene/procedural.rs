//! Procedural test geometry: tessellated planes and boxes

use glam::{Vec2, Vec3};

use super::mesh::Vertex;

/// Square in the XY plane facing +Z, split into `cells` x `cells` quads.
///
/// Triangles wind counter-clockwise seen from +Z.
pub fn plane(half_extent: f32, cells: u32) -> (Vec<Vertex>, Vec<u32>) {
    let cells = cells.max(1);
    let side = cells + 1;
    let step = 2.0 * half_extent / cells as f32;

    let vertices = (0..side)
        .flat_map(|j| (0..side).map(move |i| (i, j)))
        .map(|(i, j)| {
            let uv = Vec2::new(i as f32, j as f32) / cells as f32;
            let position = Vec3::new(-half_extent + i as f32 * step, -half_extent + j as f32 * step, 0.0);
            Vertex::new(position, Vec3::Z, uv)
        })
        .collect();

    let indices = (0..cells)
        .flat_map(|j| (0..cells).map(move |i| j * side + i))
        .flat_map(|a| {
            let (b, c, d) = (a + 1, a + side + 1, a + side);
            [a, b, c, a, c, d]
        })
        .collect();

    (vertices, indices)
}

/// Axis-aligned box centred on the origin with outward-facing triangles
pub fn cuboid(half_extents: Vec3) -> (Vec<Vertex>, Vec<u32>) {
    // (normal, u, v) with u x v == normal
    let faces = [
        (Vec3::Z, Vec3::X, Vec3::Y),
        (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y),
        (Vec3::X, Vec3::NEG_Z, Vec3::Y),
        (Vec3::NEG_X, Vec3::Z, Vec3::Y),
        (Vec3::Y, Vec3::X, Vec3::NEG_Z),
        (Vec3::NEG_Y, Vec3::X, Vec3::Z),
    ];

    let mut vertices = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);
    for (normal, u, v) in faces {
        let base = vertices.len() as u32;
        let centre = normal * half_extents;
        let (u, v) = (u * half_extents, v * half_extents);
        let corners = [
            (centre - u - v, Vec2::new(0.0, 0.0)),
            (centre + u - v, Vec2::new(1.0, 0.0)),
            (centre + u + v, Vec2::new(1.0, 1.0)),
            (centre - u + v, Vec2::new(0.0, 1.0)),
        ];
        vertices.extend(corners.map(|(position, uv)| Vertex::new(position, normal, uv)));
        indices.extend([base, base + 1, base + 2, base, base + 2, base + 3]);
    }

    (vertices, indices)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plane_counts_and_winding() {
        let (vertices, indices) = plane(1.0, 4);
        assert_eq!(vertices.len(), 25);
        assert_eq!(indices.len(), 4 * 4 * 6);

        for triangle in indices.chunks_exact(3) {
            let [a, b, c] = [0, 1, 2].map(|k| vertices[triangle[k] as usize].position);
            assert!((b - a).cross(c - a).z > 0.0);
        }
        assert_eq!(vertices[24].position, Vec3::new(1.0, 1.0, 0.0));
    }

    #[test]
    fn test_cuboid_faces_point_outwards() {
        let (vertices, indices) = cuboid(Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(vertices.len(), 24);
        assert_eq!(indices.len(), 36);

        for triangle in indices.chunks_exact(3) {
            let [a, b, c] = [0, 1, 2].map(|k| vertices[triangle[k] as usize]);
            let geometric = (b.position - a.position).cross(c.position - a.position);
            assert!(geometric.dot(a.normal) > 0.0);
            assert!(a.position.dot(a.normal) > 0.0);
        }
    }
}
