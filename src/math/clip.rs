//! Near-plane clipping for clip-space triangles

use glam::Vec4;

use crate::constants::culling::NEAR_W_EPSILON;

/// Signed distance to the reversed-Z near plane (z <= w), also requiring w > 0
#[inline]
fn near_distance(v: Vec4) -> f32 {
    (v.w - v.z).min(v.w - NEAR_W_EPSILON)
}

/// Clip a triangle against the near plane.
///
/// Returns the resulting convex polygon (0, 3 or 4 vertices) in clip space.
pub fn clip_triangle_near(triangle: [Vec4; 3]) -> Vec<Vec4> {
    let distances = triangle.map(near_distance);
    if distances.iter().all(|d| *d >= 0.0) {
        return triangle.to_vec();
    }
    if distances.iter().all(|d| *d < 0.0) {
        return Vec::new();
    }

    let mut output = Vec::with_capacity(4);
    for i in 0..3 {
        let j = (i + 1) % 3;
        let (a, b) = (triangle[i], triangle[j]);
        let (da, db) = (distances[i], distances[j]);

        if da >= 0.0 {
            output.push(a);
        }
        if (da >= 0.0) != (db >= 0.0) {
            let t = da / (da - db);
            output.push(a + (b - a) * t);
        }
    }
    output
}

/// Fan-triangulate a convex polygon
pub fn fan_triangles(polygon: &[Vec4]) -> impl Iterator<Item = [Vec4; 3]> + '_ {
    (1..polygon.len().saturating_sub(1)).map(move |i| [polygon[0], polygon[i], polygon[i + 1]])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fully_inside_is_untouched() {
        let tri = [
            Vec4::new(0.0, 0.0, 0.5, 1.0),
            Vec4::new(1.0, 0.0, 0.5, 1.0),
            Vec4::new(0.0, 1.0, 0.5, 1.0),
        ];
        assert_eq!(clip_triangle_near(tri), tri.to_vec());
    }

    #[test]
    fn test_fully_behind_is_removed() {
        let tri = [
            Vec4::new(0.0, 0.0, 0.5, -1.0),
            Vec4::new(1.0, 0.0, 0.5, -1.0),
            Vec4::new(0.0, 1.0, 0.5, -2.0),
        ];
        assert!(clip_triangle_near(tri).is_empty());
    }

    #[test]
    fn test_one_vertex_behind_yields_quad() {
        let tri = [
            Vec4::new(0.0, 0.0, 0.1, 1.0),
            Vec4::new(1.0, 0.0, 0.1, 1.0),
            Vec4::new(0.0, 1.0, 0.1, -1.0),
        ];
        let polygon = clip_triangle_near(tri);
        assert_eq!(polygon.len(), 4);
        for v in &polygon {
            assert!(v.w - v.z >= -1.0e-5);
        }
        assert_eq!(fan_triangles(&polygon).count(), 2);
    }
}
