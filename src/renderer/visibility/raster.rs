//! Scanline-free half-space rasterizer for the software backend
//!
//! Matches the hardware rules the wgpu backend relies on: pixel-centre
//! sampling, a top-left fill rule so shared edges are covered exactly once,
//! near-plane clipping, and depth interpolated linearly in screen space.

use glam::{UVec2, Vec2, Vec4};

use crate::math::{clip_triangle_near, fan_triangles, ndc_to_pixel};

/// One rasterized fragment
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fragment {
    pub x: u32,
    pub y: u32,
    /// Reversed-Z depth in [0, 1]
    pub depth: f32,
}

#[inline]
fn edge(a: Vec2, b: Vec2, p: Vec2) -> f32 {
    (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x)
}

#[inline]
fn is_top_left(a: Vec2, b: Vec2) -> bool {
    let d = b - a;
    d.y < 0.0 || (d.y == 0.0 && d.x > 0.0)
}

/// Rasterize a clip-space triangle, calling `emit` for every covered pixel.
///
/// Both windings are drawn. Fragments behind the far plane are dropped.
pub fn rasterize_triangle(clip: [Vec4; 3], resolution: UVec2, mut emit: impl FnMut(Fragment)) {
    if resolution.x == 0 || resolution.y == 0 {
        return;
    }
    let polygon = clip_triangle_near(clip);
    for triangle in fan_triangles(&polygon) {
        rasterize_clipped(triangle, resolution, &mut emit);
    }
}

fn rasterize_clipped(triangle: [Vec4; 3], resolution: UVec2, emit: &mut impl FnMut(Fragment)) {
    let screen = triangle.map(|v| {
        let ndc = v.truncate() / v.w;
        (ndc_to_pixel(ndc.truncate(), resolution), ndc.z)
    });
    let (mut p0, mut z0) = screen[0];
    let (mut p1, mut z1) = screen[1];
    let (p2, z2) = screen[2];

    let mut area = edge(p0, p1, p2);
    if !area.is_finite() || area == 0.0 {
        return;
    }
    if area < 0.0 {
        std::mem::swap(&mut p0, &mut p1);
        std::mem::swap(&mut z0, &mut z1);
        area = -area;
    }

    let min = p0.min(p1).min(p2).floor().max(Vec2::ZERO);
    let max = p0.max(p1).max(p2).ceil().min(resolution.as_vec2());
    if min.x >= max.x || min.y >= max.y {
        return;
    }

    let bias = [
        is_top_left(p1, p2),
        is_top_left(p2, p0),
        is_top_left(p0, p1),
    ];

    for y in min.y as u32..max.y as u32 {
        for x in min.x as u32..max.x as u32 {
            let p = Vec2::new(x as f32 + 0.5, y as f32 + 0.5);
            let w = [edge(p1, p2, p), edge(p2, p0, p), edge(p0, p1, p)];
            let inside = w
                .iter()
                .zip(bias)
                .all(|(w, top_left)| *w > 0.0 || (*w == 0.0 && top_left));
            if !inside {
                continue;
            }

            let depth = (w[0] * z0 + w[1] * z1 + w[2] * z2) / area;
            if depth < 0.0 {
                continue;
            }
            emit(Fragment {
                x,
                y,
                depth: depth.min(1.0),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ndc(x: f32, y: f32, z: f32) -> Vec4 {
        Vec4::new(x, y, z, 1.0)
    }

    fn collect(clip: [Vec4; 3], resolution: UVec2) -> Vec<Fragment> {
        let mut fragments = Vec::new();
        rasterize_triangle(clip, resolution, |f| fragments.push(f));
        fragments
    }

    #[test]
    fn test_shared_diagonal_is_covered_once() {
        let res = UVec2::new(8, 8);
        let a = ndc(-1.0, -1.0, 0.5);
        let b = ndc(1.0, -1.0, 0.5);
        let c = ndc(1.0, 1.0, 0.5);
        let d = ndc(-1.0, 1.0, 0.5);

        let mut coverage = vec![0u32; 64];
        for triangle in [[a, b, c], [a, c, d]] {
            rasterize_triangle(triangle, res, |f| coverage[(f.y * 8 + f.x) as usize] += 1);
        }
        assert!(coverage.iter().all(|c| *c == 1), "{coverage:?}");
    }

    #[test]
    fn test_both_windings_are_drawn() {
        let res = UVec2::new(16, 16);
        let front = collect([ndc(-1.0, -1.0, 0.5), ndc(1.0, -1.0, 0.5), ndc(-1.0, 1.0, 0.5)], res);
        let back = collect([ndc(-1.0, -1.0, 0.5), ndc(-1.0, 1.0, 0.5), ndc(1.0, -1.0, 0.5)], res);
        assert!(!front.is_empty());
        assert_eq!(front.len(), back.len());
    }

    #[test]
    fn test_depth_is_interpolated() {
        let res = UVec2::new(4, 4);
        let fragments = collect([ndc(-1.0, -1.0, 0.25), ndc(3.0, -1.0, 0.25), ndc(-1.0, 3.0, 0.25)], res);
        assert_eq!(fragments.len(), 16);
        assert!(fragments.iter().all(|f| (f.depth - 0.25).abs() < 1e-6));
    }

    #[test]
    fn test_triangle_behind_far_plane_is_dropped() {
        let res = UVec2::new(4, 4);
        let fragments = collect([ndc(-1.0, -1.0, -0.5), ndc(3.0, -1.0, -0.5), ndc(-1.0, 3.0, -0.5)], res);
        assert!(fragments.is_empty());
    }

    #[test]
    fn test_triangle_crossing_near_plane_is_clipped() {
        let res = UVec2::new(8, 8);
        // Corner at z = 2w lies in front of the near plane
        let fragments = collect(
            [
                Vec4::new(-1.0, -1.0, 0.5, 1.0),
                Vec4::new(1.0, -1.0, 0.5, 1.0),
                Vec4::new(0.0, 1.0, 2.0, 1.0),
            ],
            res,
        );
        assert!(!fragments.is_empty());
        assert!(fragments.iter().all(|f| f.depth <= 1.0));
        let full = collect(
            [ndc(-1.0, -1.0, 0.5), ndc(1.0, -1.0, 0.5), ndc(0.0, 1.0, 0.5)],
            res,
        );
        assert!(fragments.len() < full.len());
    }
}
