//! Bounding spheres and their conservative screen-space projection

use glam::{Mat4, UVec2, Vec2, Vec3, Vec4};
use serde::{Deserialize, Serialize};

use crate::constants::culling::NEAR_W_EPSILON;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingSphere {
    pub center: Vec3,
    pub radius: f32,
}

impl BoundingSphere {
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius }
    }

    /// A sphere with a finite centre and a finite, strictly positive radius
    pub fn is_valid(&self) -> bool {
        self.center.is_finite() && self.radius.is_finite() && self.radius > 0.0
    }

    /// Bounds of a point set: AABB centre, farthest point distance
    pub fn from_points(points: &[Vec3]) -> Self {
        let Some(first) = points.first() else {
            return Self::default();
        };

        let (min, max) = points
            .iter()
            .fold((*first, *first), |(min, max), p| (min.min(*p), max.max(*p)));
        let center = (min + max) * 0.5;
        let radius = points
            .iter()
            .map(|p| p.distance(center))
            .fold(0.0f32, f32::max);

        Self { center, radius }
    }

    /// Transform into another space, growing the radius by the largest axis scale
    pub fn transformed(&self, transform: &Mat4) -> Self {
        Self {
            center: transform.transform_point3(self.center),
            radius: self.radius * max_axis_scale(transform),
        }
    }

    pub fn to_vec4(&self) -> Vec4 {
        self.center.extend(self.radius)
    }
}

pub fn max_axis_scale(transform: &Mat4) -> f32 {
    transform
        .x_axis
        .truncate()
        .length()
        .max(transform.y_axis.truncate().length())
        .max(transform.z_axis.truncate().length())
}

/// Pixel-space rectangle with the nearest (largest reversed-Z) depth of a bound
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenRect {
    pub min: Vec2,
    pub max: Vec2,
    pub nearest_depth: f32,
}

impl ScreenRect {
    pub fn is_off_screen(&self, resolution: UVec2) -> bool {
        self.max.x < 0.0
            || self.max.y < 0.0
            || self.min.x > resolution.x as f32
            || self.min.y > resolution.y as f32
    }

    /// Largest side in pixels
    pub fn extent(&self) -> f32 {
        (self.max.x - self.min.x).max(self.max.y - self.min.y)
    }
}

/// Convert normalized device coordinates to pixel coordinates (y down)
#[inline]
pub fn ndc_to_pixel(ndc: Vec2, resolution: UVec2) -> Vec2 {
    Vec2::new(
        (ndc.x * 0.5 + 0.5) * resolution.x as f32,
        (0.5 - ndc.y * 0.5) * resolution.y as f32,
    )
}

/// Project a world-space sphere through the box enclosing it.
///
/// Returns `None` when any corner reaches the eye plane; such bounds cannot be
/// projected and callers must treat them as visible.
pub fn project_sphere(
    sphere: &BoundingSphere,
    view_proj: &Mat4,
    resolution: UVec2,
) -> Option<ScreenRect> {
    let mut min = Vec2::splat(f32::MAX);
    let mut max = Vec2::splat(f32::MIN);
    let mut nearest_depth = f32::MIN;

    for i in 0..8u32 {
        let sign = Vec3::new(
            if i & 1 == 0 { -1.0 } else { 1.0 },
            if i & 2 == 0 { -1.0 } else { 1.0 },
            if i & 4 == 0 { -1.0 } else { 1.0 },
        );
        let corner = sphere.center + sign * sphere.radius;
        let clip = *view_proj * corner.extend(1.0);
        if clip.w <= NEAR_W_EPSILON {
            return None;
        }

        let ndc = clip.truncate() / clip.w;
        let pixel = ndc_to_pixel(ndc.truncate(), resolution);
        min = min.min(pixel);
        max = max.max(pixel);
        nearest_depth = nearest_depth.max(ndc.z);
    }

    Some(ScreenRect {
        min,
        max,
        nearest_depth: nearest_depth.clamp(0.0, 1.0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera() -> Mat4 {
        Mat4::perspective_infinite_reverse_rh(90f32.to_radians(), 1.0, 0.1)
            * Mat4::look_at_rh(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y)
    }

    #[test]
    fn test_invalid_spheres() {
        assert!(!BoundingSphere::new(Vec3::ZERO, 0.0).is_valid());
        assert!(!BoundingSphere::new(Vec3::ZERO, -1.0).is_valid());
        assert!(!BoundingSphere::new(Vec3::NAN, 1.0).is_valid());
        assert!(!BoundingSphere::new(Vec3::ZERO, f32::INFINITY).is_valid());
        assert!(BoundingSphere::new(Vec3::ONE, 0.5).is_valid());
    }

    #[test]
    fn test_from_points_encloses_all() {
        let points = [
            Vec3::new(-1.0, 0.0, 0.0),
            Vec3::new(3.0, 2.0, 0.0),
            Vec3::new(0.0, -2.0, 1.0),
        ];
        let sphere = BoundingSphere::from_points(&points);
        for p in points {
            assert!(p.distance(sphere.center) <= sphere.radius + 1.0e-5);
        }
    }

    #[test]
    fn test_transform_scales_radius() {
        let sphere = BoundingSphere::new(Vec3::ZERO, 1.0);
        let transform = Mat4::from_scale_rotation_translation(
            Vec3::new(1.0, 3.0, 2.0),
            glam::Quat::IDENTITY,
            Vec3::new(5.0, 0.0, 0.0),
        );
        let moved = sphere.transformed(&transform);
        assert_eq!(moved.center, Vec3::new(5.0, 0.0, 0.0));
        assert!((moved.radius - 3.0).abs() < 1.0e-5);
    }

    #[test]
    fn test_centered_sphere_projects_to_screen_center() {
        let sphere = BoundingSphere::new(Vec3::new(0.0, 0.0, -10.0), 1.0);
        let rect = project_sphere(&sphere, &camera(), UVec2::new(100, 100)).unwrap();

        let center = (rect.min + rect.max) * 0.5;
        assert!((center.x - 50.0).abs() < 1.0e-3);
        assert!((center.y - 50.0).abs() < 1.0e-3);
        assert!(rect.nearest_depth > 0.0 && rect.nearest_depth < 1.0);
        // Nearest face of the enclosing box is 9 units away
        assert!((rect.nearest_depth - 0.1 / 9.0).abs() < 1.0e-5);
    }

    #[test]
    fn test_sphere_touching_eye_plane_is_unprojectable() {
        let sphere = BoundingSphere::new(Vec3::new(0.0, 0.0, -0.5), 1.0);
        assert!(project_sphere(&sphere, &camera(), UVec2::new(64, 64)).is_none());
    }

    #[test]
    fn test_off_screen_rect() {
        let rect = ScreenRect {
            min: Vec2::new(120.0, 10.0),
            max: Vec2::new(130.0, 20.0),
            nearest_depth: 0.5,
        };
        assert!(rect.is_off_screen(UVec2::new(100, 100)));
    }
}
