//! Culling report for a procedural scene
//!
//! Renders a grid of boxes partly hidden behind a wall and prints what each
//! frame culled and drew.
//!
//! Usage: cull_report [config.toml] [--gpu] [--frames N]

use anyhow::{bail, Context, Result};
use glam::{Mat4, UVec2, Vec3};
use meshlet_engine::scene::procedural;
use meshlet_engine::{
    FrameReport, GpuContext, GpuVisibilityRenderer, LodSource, Material, RendererConfig, SceneTables,
    ShadowCascade, SoftwareVisibilityRenderer, ViewParams,
};

const GRID: i32 = 12;
const SPACING: f32 = 6.0;
const RESOLUTION: UVec2 = UVec2::new(640, 360);

struct Options {
    config: Option<String>,
    gpu: bool,
    frames: u32,
}

fn parse_args() -> Result<Options> {
    let mut options = Options {
        config: None,
        gpu: false,
        frames: 4,
    };
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--gpu" => options.gpu = true,
            "--frames" => {
                let value = args.next().context("--frames needs a value")?;
                options.frames = value.parse().with_context(|| format!("invalid frame count '{value}'"))?;
            }
            flag if flag.starts_with("--") => bail!("unknown flag {flag}"),
            path => options.config = Some(path.to_string()),
        }
    }
    Ok(options)
}

fn build_scene() -> Result<SceneTables> {
    let mut scene = SceneTables::new();
    let stone = scene.add_material(Material::default());

    let (vertices, indices) = procedural::cuboid(Vec3::splat(1.5));
    let (coarse_vertices, coarse_indices) = procedural::cuboid(Vec3::splat(1.6));
    let crate_mesh = scene.add_mesh(
        &[
            LodSource {
                vertices: &vertices,
                indices: &indices,
                error: 0.0,
            },
            LodSource {
                vertices: &coarse_vertices,
                indices: &coarse_indices,
                error: 0.1,
            },
        ],
        stone,
    )?;
    for x in -GRID / 2..GRID / 2 {
        for z in 1..=GRID {
            let position = Vec3::new(x as f32 * SPACING, 0.0, -(z as f32) * SPACING - 10.0);
            scene.add_instance(crate_mesh, Mat4::from_translation(position))?;
        }
    }

    let (wall_vertices, wall_indices) = procedural::plane(12.0, 16);
    let wall = scene.add_mesh(
        &[LodSource {
            vertices: &wall_vertices,
            indices: &wall_indices,
            error: 0.0,
        }],
        stone,
    )?;
    scene.add_instance(wall, Mat4::from_translation(Vec3::new(0.0, 0.0, -8.0)))?;

    Ok(scene)
}

fn cascades(config: &RendererConfig) -> Vec<ShadowCascade> {
    (0..config.shadow_cascade_count)
        .map(|c| {
            let extent = 20.0 * (c + 1) as f32;
            let light = Mat4::look_at_rh(Vec3::new(0.0, 60.0, -40.0), Vec3::new(0.0, 0.0, -40.0), Vec3::NEG_Z);
            let projection = Mat4::orthographic_rh(-extent, extent, -extent, extent, 200.0, 0.1);
            ShadowCascade::new(projection * light, config.shadow_map_resolution)
        })
        .collect()
}

fn print_report(report: &FrameReport) {
    println!(
        "frame {:>3}  instances {:>4}/{:<4}  meshlets early {:>5} late {:>5}  triangles {:>7}  pixels {:>7}",
        report.frame_index,
        report.visible_mesh_instances,
        report.mesh_instances_tested,
        report.early_meshlets,
        report.late_meshlets,
        report.visible_triangles(),
        report.covered_pixels
    );
    for (c, cascade) in report.cascades.iter().enumerate() {
        println!(
            "           cascade {}  meshlets {:>5}  triangles {:>7}",
            c,
            cascade.visible_meshlets,
            cascade.draw.index_count / 3
        );
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let options = parse_args()?;
    let config = match &options.config {
        Some(path) => RendererConfig::load(path).with_context(|| format!("loading {path}"))?,
        None => RendererConfig::default(),
    };

    let scene = build_scene()?;
    let eye = Vec3::new(0.0, 2.0, 0.0);
    let view_proj = Mat4::perspective_infinite_reverse_rh(
        60f32.to_radians(),
        RESOLUTION.x as f32 / RESOLUTION.y as f32,
        0.1,
    ) * Mat4::look_at_rh(eye, Vec3::new(0.0, 0.0, -40.0), Vec3::Y);
    let view = ViewParams::from_config(&config, view_proj, eye, RESOLUTION);
    let cascades = cascades(&config);

    log::info!(
        "Scene: {} instances, {} meshlets, {} frames",
        scene.instances.len(),
        scene.geometry.meshlets.len(),
        options.frames
    );

    if options.gpu {
        let Some(context) = GpuContext::try_headless() else {
            bail!("no GPU adapter available");
        };
        let mut renderer = GpuVisibilityRenderer::new(context, config, RESOLUTION)?;
        for _ in 0..options.frames {
            let report = renderer.render_frame(&scene, &view, &cascades)?;
            print_report(&report);
        }
        let stats = renderer.stats();
        println!("{} frames, last frame {:.2} ms", stats.frames, stats.frame_time_ms);
    } else {
        let mut renderer = SoftwareVisibilityRenderer::new(config, RESOLUTION)?;
        for _ in 0..options.frames {
            let report = renderer.render_frame(&scene, &view, &cascades)?;
            print_report(&report);
        }
    }

    Ok(())
}
