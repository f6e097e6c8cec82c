use glam::{Mat4, UVec2, Vec3, Vec4};

use super::*;
use crate::config::RendererConfig;
use crate::error::EngineError;
use crate::gpu::buffer_layouts::{counter_slots, FrameCounters, IndirectDrawIndexedCommand};
use crate::renderer::gpu_culling::CullPhase;
use crate::scene::{procedural, LodSource, Material, SceneTables, ShadowCascade, ViewParams};

const RESOLUTION: UVec2 = UVec2::new(32, 32);

fn camera() -> Mat4 {
    Mat4::perspective_infinite_reverse_rh(90f32.to_radians(), 1.0, 0.1)
        * Mat4::look_at_rh(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y)
}

fn view() -> ViewParams {
    ViewParams::new(camera(), Vec3::ZERO, RESOLUTION)
}

/// Walls facing the camera, one per `(half_extent, distance)`
fn walls(placements: &[(f32, f32)]) -> SceneTables {
    let mut scene = SceneTables::new();
    let material = scene.add_material(Material {
        base_color: Vec4::new(0.5, 0.5, 0.5, 1.0),
        ..Material::default()
    });
    for &(half_extent, distance) in placements {
        let (vertices, indices) = procedural::plane(half_extent, 8);
        let lod = LodSource {
            vertices: &vertices,
            indices: &indices,
            error: 0.0,
        };
        let mesh = scene.add_mesh(&[lod], material).unwrap();
        scene
            .add_instance(mesh, Mat4::from_translation(Vec3::new(0.0, 0.0, -distance)))
            .unwrap();
    }
    scene
}

#[test]
fn test_counters_do_not_accumulate_across_frames() {
    let scene = walls(&[(20.0, 10.0)]);
    let mut renderer = SoftwareVisibilityRenderer::new(RendererConfig::default(), RESOLUTION).unwrap();

    let reports: Vec<FrameReport> = (0..4)
        .map(|_| renderer.render_frame(&scene, &view(), &[]).unwrap())
        .collect();

    for (frame, report) in reports.iter().enumerate() {
        assert_eq!(report.frame_index, frame as u64);
        assert_eq!(report.mesh_instances_tested, 1);
        assert_eq!(report.meshlet_instances, reports[0].meshlet_instances);
        assert_eq!(report.drawn_indices(), reports[0].drawn_indices());
        assert!(!report.overflowed());
    }
    assert!(reports[0].drawn_indices() > 0);
    assert_eq!(renderer.frame_index(), 4);
}

#[test]
fn test_phases_never_share_a_meshlet() {
    let scene = walls(&[(20.0, 5.0), (5.0, 20.0)]);
    let mut renderer = SoftwareVisibilityRenderer::new(RendererConfig::default(), RESOLUTION).unwrap();

    for _ in 0..3 {
        renderer.render_frame(&scene, &view(), &[]).unwrap();
        let frame = renderer.last_frame().unwrap();
        let early = frame.visible(CullPhase::Early);
        let late = frame.visible(CullPhase::Late);
        assert!(late.iter().all(|id| !early.contains(id)));

        let early_draw = frame.draw(CullPhase::Early);
        let late_draw = frame.draw(CullPhase::Late);
        assert_eq!(late_draw.first_index, early_draw.first_index + early_draw.index_count);
    }
}

#[test]
fn test_overflowed_frame_keeps_clamped_report() {
    let config = RendererConfig {
        max_reordered_indices: 30,
        ..Default::default()
    };
    let scene = walls(&[(20.0, 10.0)]);
    let mut renderer = SoftwareVisibilityRenderer::new(config, RESOLUTION).unwrap();

    let error = renderer.render_frame(&scene, &view(), &[]).unwrap_err();
    assert!(matches!(
        &error,
        EngineError::CapacityExceeded { buffer, capacity: 30, .. } if buffer == "reordered indices"
    ));
    assert!(error.is_frame_local());

    let report = renderer.last_report().unwrap();
    assert!(report.overflowed());
    assert!(report.requested_indices > 30);
    assert!(report.drawn_indices() <= 30);

    // The renderer stays usable after an overflowing frame
    assert!(renderer.render_frame(&scene, &view(), &[]).is_err());
    assert_eq!(renderer.frame_index(), 2);
}

#[test]
fn test_report_flags_each_overflowing_buffer() {
    let config = RendererConfig {
        max_meshlet_instances: 100,
        max_shadow_indices: 300,
        shadow_cascade_count: 2,
        ..Default::default()
    };
    let mut counters = FrameCounters::default();
    counters.values[counter_slots::MESHLET_INSTANCES as usize] = 95;
    counters.values[counter_slots::LATE_MESHLETS as usize] = 101;
    counters.values[(counter_slots::SHADOW_INDICES_BASE + 1) as usize] = 303;
    let draws = vec![IndirectDrawIndexedCommand::new(0, 12); 4];

    let report = FrameReport::from_counters(7, &counters, &draws, &config, 3);
    let buffers: Vec<&str> = report.diagnostics.iter().map(|d| d.buffer.as_str()).collect();
    assert_eq!(buffers, ["late visible meshlets", "shadow indices[1]"]);
    assert_eq!(report.cascades.len(), 2);
    assert_eq!(report.cascades[1].requested_indices, 303);
    assert_eq!(report.drawn_indices(), 24);
    assert!(matches!(
        report.capacity_error(),
        Some(EngineError::CapacityExceeded { requested: 101, .. })
    ));
}

#[test]
fn test_report_counts_scene_instances_against_limit() {
    let config = RendererConfig {
        max_mesh_instances: 2,
        ..Default::default()
    };
    let report = FrameReport::from_counters(0, &FrameCounters::default(), &[], &config, 5);
    assert_eq!(report.diagnostics.len(), 1);
    assert_eq!(report.diagnostics[0].buffer, "mesh instances");
    assert_eq!(report.early_draw, IndirectDrawIndexedCommand::default());
}

#[test]
fn test_resize_drops_hiz_and_recreates_targets() {
    let scene = walls(&[(20.0, 10.0)]);
    let mut renderer = SoftwareVisibilityRenderer::new(RendererConfig::default(), RESOLUTION).unwrap();
    renderer.render_frame(&scene, &view(), &[]).unwrap();
    assert!(renderer.hiz().is_some());

    renderer.resize(UVec2::new(48, 16)).unwrap();
    assert!(renderer.hiz().is_none());
    assert_eq!(renderer.visibility().resolution(), UVec2::new(48, 16));
    assert!(renderer.resize(UVec2::new(0, 16)).is_err());

    // A view at another resolution resizes implicitly
    let report = renderer.render_frame(&scene, &view(), &[]).unwrap();
    assert_eq!(renderer.resolution(), RESOLUTION);
    assert!(report.covered_pixels > RESOLUTION.x * RESOLUTION.y / 2);
}

#[test]
fn test_shadow_cascades_are_reported_and_rasterized() {
    let config = RendererConfig {
        shadow_cascade_count: 1,
        ..Default::default()
    };
    let scene = walls(&[(20.0, 10.0)]);
    let mut renderer = SoftwareVisibilityRenderer::new(config, RESOLUTION).unwrap();

    let cascade = ShadowCascade::new(camera(), 64);
    let report = renderer.render_frame(&scene, &view(), &[cascade]).unwrap();
    assert_eq!(report.cascades.len(), 1);
    assert!(report.cascades[0].visible_meshlets > 0);
    assert!(report.cascades[0].draw.index_count > 0);
    assert!(renderer.shadow_map(0).unwrap().covered_texels() > 64 * 64 / 2);

    let mismatch = renderer.render_frame(&scene, &view(), &[]).unwrap_err();
    assert!(matches!(mismatch, EngineError::DegenerateInput { .. }));
}
