//! Screen-space-error LOD selection

use glam::Vec3;

use crate::constants::culling::MIN_LOD_DISTANCE;
use crate::error::{EngineError, EngineResult};
use crate::math::BoundingSphere;
use crate::scene::{Mesh, MeshLod};

/// Inputs shared by every instance of a view
#[derive(Debug, Clone, Copy)]
pub struct LodContext {
    pub observer: Vec3,
    /// Larger of the render target's width and height
    pub max_resolution: f32,
    /// Acceptable error in pixels
    pub threshold: f32,
}

impl LodContext {
    /// Projected error of `lod` in pixels for a world-space bound.
    ///
    /// `scale` folds the instance's largest axis scale and its LOD bias.
    pub fn projected_error(&self, lod: &MeshLod, bounds: &BoundingSphere, scale: f32) -> f32 {
        let distance = (bounds.center.distance(self.observer) - bounds.radius).max(MIN_LOD_DISTANCE);
        lod.error * scale * self.max_resolution / distance
    }

    /// Coarsest LOD whose projected error stays within the threshold, else the finest
    pub fn select(&self, mesh: &Mesh, bounds: &BoundingSphere, scale: f32) -> EngineResult<u32> {
        if mesh.lods.is_empty() {
            return Err(EngineError::degenerate("mesh LOD table", "no LOD entries"));
        }

        let level = mesh
            .lods
            .iter()
            .rposition(|lod| self.projected_error(lod, bounds, scale) <= self.threshold)
            .unwrap_or(0);
        Ok(level as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mesh() -> Mesh {
        Mesh {
            meshlet_offset: 0,
            meshlet_count: 7,
            lods: vec![
                MeshLod { first_meshlet: 0, meshlet_count: 4, error: 0.0 },
                MeshLod { first_meshlet: 4, meshlet_count: 2, error: 0.01 },
                MeshLod { first_meshlet: 6, meshlet_count: 1, error: 0.1 },
            ],
            material: 0,
            bounds: BoundingSphere::new(Vec3::ZERO, 1.0),
        }
    }

    fn context() -> LodContext {
        LodContext {
            observer: Vec3::ZERO,
            max_resolution: 1000.0,
            threshold: 1.0,
        }
    }

    #[test]
    fn test_near_instances_use_finest_lod() {
        let bounds = BoundingSphere::new(Vec3::new(0.0, 0.0, -2.0), 1.0);
        assert_eq!(context().select(&mesh(), &bounds, 1.0).unwrap(), 0);
    }

    #[test]
    fn test_distant_instances_use_coarser_lods() {
        // 0.01 * 1000 / 19 ~= 0.53 px, 0.1 * 1000 / 19 ~= 5.3 px
        let mid = BoundingSphere::new(Vec3::new(0.0, 0.0, -20.0), 1.0);
        assert_eq!(context().select(&mesh(), &mid, 1.0).unwrap(), 1);

        let far = BoundingSphere::new(Vec3::new(0.0, 0.0, -500.0), 1.0);
        assert_eq!(context().select(&mesh(), &far, 1.0).unwrap(), 2);
    }

    #[test]
    fn test_bias_pushes_towards_finer_detail() {
        let mid = BoundingSphere::new(Vec3::new(0.0, 0.0, -20.0), 1.0);
        assert_eq!(context().select(&mesh(), &mid, 4.0).unwrap(), 0);
    }

    #[test]
    fn test_empty_lod_table_is_rejected() {
        let mut mesh = mesh();
        mesh.lods.clear();
        let bounds = BoundingSphere::new(Vec3::ZERO, 1.0);
        assert!(matches!(
            context().select(&mesh, &bounds, 1.0),
            Err(EngineError::DegenerateInput { .. })
        ));
    }
}
