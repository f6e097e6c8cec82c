// End-to-end culling scenarios on the software renderer
//
// Empty scenes, a single fully visible meshlet, and an instance behind the
// camera with and without frustum culling.

mod common;

use std::collections::HashSet;

use glam::{Mat4, Vec3};
use meshlet_engine::renderer::gpu_culling::{unpack_index, CullPhase};
use meshlet_engine::{CullFlags, EngineError, RendererConfig, SceneTables, SoftwareVisibilityRenderer};

use common::{add_wall_mesh, init_logging, view, RESOLUTION};

/// One small wall made of a single meshlet at `z`
fn single_meshlet_scene(z: f32) -> SceneTables {
    let mut scene = SceneTables::new();
    let mesh = add_wall_mesh(&mut scene, 2.0, 2);
    scene
        .add_instance(mesh, Mat4::from_translation(Vec3::new(0.0, 0.0, z)))
        .unwrap();
    assert_eq!(scene.geometry.meshlets.len(), 1);
    scene
}

#[test]
fn empty_scene_draws_nothing() {
    init_logging();
    let scene = SceneTables::new();
    let mut renderer = SoftwareVisibilityRenderer::new(RendererConfig::default(), RESOLUTION).unwrap();

    for _ in 0..2 {
        let report = renderer.render_frame(&scene, &view(), &[]).unwrap();
        assert_eq!(report.mesh_instances_tested, 0);
        assert_eq!(report.meshlet_instances, 0);
        assert_eq!(report.early_meshlets, 0);
        assert_eq!(report.late_meshlets, 0);
        assert_eq!(report.drawn_indices(), 0);
        assert_eq!(report.covered_pixels, 0);

        let frame = renderer.last_frame().unwrap();
        assert_eq!(frame.meshlet_dispatch.workgroup_count(), 0);
        for phase in CullPhase::ALL {
            assert_eq!(frame.triangle_dispatch[phase.index()].workgroup_count(), 0);
            assert_eq!(frame.draw(phase).index_count, 0);
        }
        assert_eq!(renderer.visibility().covered_pixels(), 0);
        assert!(renderer.gbuffer().is_clear());
    }
}

#[test]
fn single_visible_meshlet_is_drawn_once_by_the_early_phase() {
    init_logging();
    let scene = single_meshlet_scene(-4.0);
    let mut renderer = SoftwareVisibilityRenderer::new(RendererConfig::default(), RESOLUTION).unwrap();
    assert!(renderer.hiz().is_none());

    let report = renderer.render_frame(&scene, &view(), &[]).unwrap();
    assert_eq!(report.mesh_instances_tested, 1);
    assert_eq!(report.visible_mesh_instances, 1);
    assert_eq!(report.meshlet_instances, 1);
    assert_eq!(report.early_meshlets, 1);
    assert_eq!(report.late_meshlets, 0);

    let frame = renderer.last_frame().unwrap();
    assert_eq!(frame.visible(CullPhase::Early), &[0]);
    assert!(frame.visible(CullPhase::Late).is_empty());
    assert!(renderer.visibility_mask().contains(0));
    assert_eq!(renderer.visibility_mask().count_ones(), 1);

    // All eight triangles face the camera and each appears exactly once
    let early = *frame.draw(CullPhase::Early);
    assert_eq!(early.index_count, 8 * 3);
    assert_eq!(frame.draw(CullPhase::Late).index_count, 0);
    let range = early.first_index as usize..(early.first_index + early.index_count) as usize;
    let mut triangles = HashSet::new();
    for corners in frame.indices[range].chunks_exact(3) {
        let unpacked: Vec<(u32, u32, u32)> = corners.iter().map(|&i| unpack_index(i)).collect();
        let (meshlet_instance, triangle, _) = unpacked[0];
        assert_eq!(meshlet_instance, 0);
        assert_eq!(
            unpacked,
            vec![(0, triangle, 0), (0, triangle, 1), (0, triangle, 2)]
        );
        assert!(triangles.insert(triangle), "triangle {triangle} emitted twice");
    }
    assert_eq!(triangles.len(), 8);
    assert!(report.covered_pixels > 0);
}

#[test]
fn instance_behind_camera_depends_on_frustum_culling() {
    init_logging();
    let scene = single_meshlet_scene(5.0);

    let mut culled = SoftwareVisibilityRenderer::new(RendererConfig::default(), RESOLUTION).unwrap();
    let report = culled.render_frame(&scene, &view(), &[]).unwrap();
    assert_eq!(report.mesh_instances_tested, 1);
    assert_eq!(report.visible_mesh_instances, 0);
    assert_eq!(report.meshlet_instances, 0);
    assert_eq!(report.early_meshlets + report.late_meshlets, 0);

    let flags = CullFlags::all().difference(CullFlags::FRUSTUM_CULLING);
    let mut unculled = SoftwareVisibilityRenderer::new(RendererConfig::default(), RESOLUTION).unwrap();
    let report = unculled
        .render_frame(&scene, &view().with_cull_flags(flags), &[])
        .unwrap();
    assert_eq!(report.visible_mesh_instances, 1);
    assert_eq!(report.meshlet_instances, 1);
    assert_eq!(report.early_meshlets, 1);
    assert_eq!(report.covered_pixels, 0);
}

#[test]
fn corrupt_geometry_is_rejected_before_any_pass_runs() {
    init_logging();
    let mut renderer = SoftwareVisibilityRenderer::new(RendererConfig::default(), RESOLUTION).unwrap();

    let mut scene = single_meshlet_scene(-4.0);
    scene.geometry.meshlet_vertices[0] = scene.geometry.vertices.len() as u32 + 100;
    let error = renderer.render_frame(&scene, &view(), &[]).unwrap_err();
    assert!(matches!(error, EngineError::DegenerateInput { .. }));

    let mut scene = single_meshlet_scene(-4.0);
    scene.geometry.meshlet_triangles[0] = 200;
    assert!(renderer.render_frame(&scene, &view(), &[]).is_err());

    let mut scene = single_meshlet_scene(-4.0);
    scene.meshes[0].meshlet_offset = u32::MAX;
    assert!(renderer.render_frame(&scene, &view(), &[]).is_err());
    assert!(renderer.last_report().is_none());
}
