// wgpu renderer against the software reference
//
// Each test requests a headless adapter and returns early when none exists.

mod common;

use glam::UVec2;
use meshlet_engine::{
    EngineError, GpuContext, GpuVisibilityRenderer, RendererConfig, SoftwareVisibilityRenderer,
};

use common::{init_logging, view, walls, RESOLUTION};

fn gpu() -> Option<GpuContext> {
    init_logging();
    let context = GpuContext::try_headless();
    if context.is_none() {
        println!("No GPU adapter available, skipping");
    }
    context
}

#[test]
fn gpu_frames_match_software_culling() {
    let Some(context) = gpu() else {
        return;
    };
    let scene = walls(&[(8.0, 10.0)]);
    let mut gpu = GpuVisibilityRenderer::new(context, RendererConfig::default(), RESOLUTION).unwrap();
    let mut software = SoftwareVisibilityRenderer::new(RendererConfig::default(), RESOLUTION).unwrap();

    for frame in 0..3 {
        let expected = software.render_frame(&scene, &view(), &[]).unwrap();
        let report = gpu.render_frame(&scene, &view(), &[]).unwrap();

        assert_eq!(report.frame_index, frame);
        assert_eq!(report.mesh_instances_tested, expected.mesh_instances_tested);
        assert_eq!(report.visible_mesh_instances, expected.visible_mesh_instances);
        assert_eq!(report.meshlet_instances, expected.meshlet_instances);
        assert_eq!(
            report.early_meshlets + report.late_meshlets,
            expected.early_meshlets + expected.late_meshlets
        );
        assert!(report.visible_triangles() > 0);
        assert!(!report.overflowed());
    }

    let ids = gpu.read_visibility().unwrap();
    assert_eq!(ids.len(), (RESOLUTION.x * RESOLUTION.y) as usize);
    let covered: Vec<_> = ids.iter().filter(|id| !id.is_empty()).collect();
    assert!(!covered.is_empty());
    assert!(covered.iter().all(|id| id.mesh_instance == 0));

    let stats = gpu.stats_handle();
    assert_eq!(stats.read().frames, 3);
    assert_eq!(stats.read().overflowed_frames, 0);
}

#[test]
fn gpu_empty_scene_draws_nothing() {
    let Some(context) = gpu() else {
        return;
    };
    let scene = walls(&[]);
    let mut gpu = GpuVisibilityRenderer::new(context, RendererConfig::default(), RESOLUTION).unwrap();

    let report = gpu.render_frame(&scene, &view(), &[]).unwrap();
    assert_eq!(report.meshlet_instances, 0);
    assert_eq!(report.drawn_indices(), 0);
    assert!(gpu.read_visibility().unwrap().iter().all(|id| id.is_empty()));
}

#[test]
fn gpu_overflow_is_clamped_and_reported() {
    let Some(context) = gpu() else {
        return;
    };
    let config = RendererConfig {
        max_reordered_indices: 30,
        ..Default::default()
    };
    let scene = walls(&[(20.0, 10.0)]);
    let mut gpu = GpuVisibilityRenderer::new(context, config, RESOLUTION).unwrap();

    let error = gpu.render_frame(&scene, &view(), &[]).unwrap_err();
    assert!(matches!(
        &error,
        EngineError::CapacityExceeded { buffer, capacity: 30, .. } if buffer == "reordered indices"
    ));
    let report = gpu.last_report().unwrap();
    assert!(report.requested_indices > 30);
    assert!(report.drawn_indices() <= 30);
    assert_eq!(gpu.frame_index(), 1);
    assert_eq!(gpu.stats().overflowed_frames, 1);
}

#[test]
fn gpu_resize_invalidates_hiz() {
    let Some(context) = gpu() else {
        return;
    };
    let scene = walls(&[(20.0, 10.0)]);
    let mut gpu = GpuVisibilityRenderer::new(context, RendererConfig::default(), RESOLUTION).unwrap();
    gpu.render_frame(&scene, &view(), &[]).unwrap();
    assert!(gpu.hiz().is_valid());

    gpu.resize(UVec2::new(40, 24)).unwrap();
    assert!(!gpu.hiz().is_valid());
    assert_eq!(gpu.resolution(), UVec2::new(40, 24));
    assert!(gpu.resize(UVec2::new(40, 0)).is_err());

    gpu.render_frame(&scene, &view(), &[]).unwrap();
    assert_eq!(gpu.resolution(), RESOLUTION);
    assert!(gpu.hiz().is_valid());
}
