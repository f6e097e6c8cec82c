//! View frustum planes extracted from a view-projection matrix
//!
//! Clip space follows wgpu: x,y in [-w, w], z in [0, w]. Reversed-Z puts
//! the near plane at z = w and the far plane at z = 0. Infinite reversed
//! projections produce a zero-length far plane, which always passes.

use glam::{Mat4, Vec3, Vec4};

/// Plane order: left, right, bottom, top, near, far
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frustum {
    pub planes: [Vec4; 6],
}

impl Frustum {
    pub fn from_view_proj(view_proj: &Mat4) -> Self {
        let r0 = view_proj.row(0);
        let r1 = view_proj.row(1);
        let r2 = view_proj.row(2);
        let r3 = view_proj.row(3);

        let mut planes = [
            r3 + r0, // left
            r3 - r0, // right
            r3 + r1, // bottom
            r3 - r1, // top
            r3 - r2, // near (z <= w)
            r2,      // far (z >= 0)
        ];

        for plane in &mut planes {
            let length = plane.truncate().length();
            if length > 0.0 {
                *plane /= length;
            }
        }

        Self { planes }
    }

    /// Signed distance of a point to a plane; positive is inside
    #[inline]
    pub fn distance(plane: Vec4, point: Vec3) -> f32 {
        plane.truncate().dot(point) + plane.w
    }

    pub fn intersects_sphere(&self, center: Vec3, radius: f32) -> bool {
        self.planes
            .iter()
            .all(|plane| Self::distance(*plane, center) >= -radius)
    }

    pub fn to_array(&self) -> [[f32; 4]; 6] {
        self.planes.map(|plane| plane.to_array())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera() -> Mat4 {
        let projection = Mat4::perspective_infinite_reverse_rh(60f32.to_radians(), 1.0, 0.1);
        let view = Mat4::look_at_rh(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y);
        projection * view
    }

    #[test]
    fn test_sphere_in_front_is_inside() {
        let frustum = Frustum::from_view_proj(&camera());
        assert!(frustum.intersects_sphere(Vec3::new(0.0, 0.0, -10.0), 1.0));
    }

    #[test]
    fn test_sphere_behind_camera_is_outside() {
        let frustum = Frustum::from_view_proj(&camera());
        assert!(!frustum.intersects_sphere(Vec3::new(0.0, 0.0, 10.0), 1.0));
    }

    #[test]
    fn test_sphere_straddling_side_plane_intersects() {
        let frustum = Frustum::from_view_proj(&camera());
        // tan(30deg) * 10 ~= 5.77 is the half-width at distance 10
        assert!(frustum.intersects_sphere(Vec3::new(6.5, 0.0, -10.0), 1.5));
        assert!(!frustum.intersects_sphere(Vec3::new(9.0, 0.0, -10.0), 1.0));
    }

    #[test]
    fn test_infinite_far_plane_always_passes() {
        let frustum = Frustum::from_view_proj(&camera());
        assert!(frustum.intersects_sphere(Vec3::new(0.0, 0.0, -1.0e6), 1.0));
    }
}
