// Shared scene builders for the integration tests

#![allow(dead_code)]

use glam::{Mat4, UVec2, Vec3, Vec4};
use meshlet_engine::scene::procedural;
use meshlet_engine::{LodSource, Material, SceneTables, ViewParams};

pub const RESOLUTION: UVec2 = UVec2::new(32, 32);

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// 90 degree camera at the origin looking down -Z; depth is `0.1 / distance`
pub fn camera_looking(direction: Vec3) -> Mat4 {
    Mat4::perspective_infinite_reverse_rh(90f32.to_radians(), 1.0, 0.1)
        * Mat4::look_at_rh(Vec3::ZERO, direction, Vec3::Y)
}

pub fn view() -> ViewParams {
    ViewParams::new(camera_looking(Vec3::NEG_Z), Vec3::ZERO, RESOLUTION)
}

pub fn view_looking(direction: Vec3) -> ViewParams {
    ViewParams::new(camera_looking(direction), Vec3::ZERO, RESOLUTION)
}

/// Adds a tessellated wall mesh and returns its id
pub fn add_wall_mesh(scene: &mut SceneTables, half_extent: f32, cells: u32) -> u32 {
    let material = match scene.materials.len() {
        0 => scene.add_material(Material {
            base_color: Vec4::new(0.8, 0.7, 0.6, 1.0),
            ..Material::default()
        }),
        _ => 0,
    };
    let (vertices, indices) = procedural::plane(half_extent, cells);
    scene
        .add_mesh(
            &[LodSource {
                vertices: &vertices,
                indices: &indices,
                error: 0.0,
            }],
            material,
        )
        .unwrap()
}

/// Walls facing a camera at the origin looking down -Z, one per `(half_extent, distance)`
pub fn walls(placements: &[(f32, f32)]) -> SceneTables {
    let mut scene = SceneTables::new();
    for &(half_extent, distance) in placements {
        let mesh = add_wall_mesh(&mut scene, half_extent, 8);
        scene
            .add_instance(mesh, Mat4::from_translation(Vec3::new(0.0, 0.0, -distance)))
            .unwrap();
    }
    scene
}
