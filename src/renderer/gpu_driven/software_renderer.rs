//! Software executor of the frame schedule
//!
//! Runs every pass on the CPU over plain vectors. Per-item kernels are
//! data-parallel through rayon; appends go through `AppendCounter`, which
//! hands out slots the same way the GPU atomics do. This backend is the
//! reference the wgpu renderer is checked against.

use glam::UVec2;

use crate::config::RendererConfig;
use crate::constants::workgroups::CULL_WORKGROUP_SIZE;
use crate::error::{EngineError, EngineResult};
use crate::renderer::flags::DebugView;
use crate::renderer::frame_graph::{FrameSchedule, PassKind};
use crate::renderer::gpu_culling::{
    validate_cascades, CullPhase, CullView, HiZPyramid, MeshCuller, MeshletCuller, ShadowCascadeCuller,
    TriangleCuller,
};
use crate::renderer::visibility::{GBuffer, ShadowMap, VisibilityDecoder, VisibilityEncoder, VisibilityTargets};
use crate::scene::{SceneTables, ShadowCascade, ViewParams};

use super::frame_resources::{FrameBuffers, FrameRing};
use super::indirect_commands;
use super::visibility_mask::VisibilityMask;
use super::{check_resolution, FrameReport};

/// Read-only inputs of one frame
struct FrameInputs<'a> {
    scene: &'a SceneTables,
    view: &'a ViewParams,
    main: CullView,
    cascades: &'a [ShadowCascade],
    cascade_views: Vec<CullView>,
}

pub struct SoftwareVisibilityRenderer {
    config: RendererConfig,
    schedule: FrameSchedule,
    frames: FrameRing<FrameBuffers>,
    resolution: UVec2,
    targets: VisibilityTargets,
    gbuffer: GBuffer,
    /// Pyramid of the latest early depth; `None` until built or after a resize
    hiz: Option<HiZPyramid>,
    mask: VisibilityMask,
    shadow_maps: Vec<ShadowMap>,
    last_report: Option<FrameReport>,
}

impl SoftwareVisibilityRenderer {
    pub fn new(config: RendererConfig, resolution: UVec2) -> EngineResult<Self> {
        config.validate()?;
        check_resolution(resolution)?;
        let schedule = FrameSchedule::build(config.shadow_cascade_count)?;
        let frames = FrameRing::new(config.frames_in_flight, |_| FrameBuffers::new(&config));

        log::info!(
            "[SoftwareVisibilityRenderer::new] {}x{}, {} frames in flight, {} passes",
            resolution.x,
            resolution.y,
            frames.len(),
            schedule.passes().len()
        );
        Ok(Self {
            schedule,
            frames,
            resolution,
            targets: VisibilityTargets::new(resolution),
            gbuffer: GBuffer::new(resolution),
            hiz: None,
            mask: VisibilityMask::new(),
            shadow_maps: Vec::new(),
            last_report: None,
            config,
        })
    }

    /// Recreate the resolution-dependent targets and drop the Hi-Z pyramid
    pub fn resize(&mut self, resolution: UVec2) -> EngineResult<()> {
        check_resolution(resolution)?;
        if resolution == self.resolution {
            return Ok(());
        }
        self.resolution = resolution;
        self.targets = VisibilityTargets::new(resolution);
        self.gbuffer = GBuffer::new(resolution);
        self.hiz = None;
        log::info!(
            "[SoftwareVisibilityRenderer::resize] Resized to {}x{}, Hi-Z invalidated",
            resolution.x,
            resolution.y
        );
        Ok(())
    }

    /// Run one frame of the schedule.
    ///
    /// On capacity overflow the frame still completes with clamped draws, its
    /// report is kept in `last_report`, and `CapacityExceeded` is returned.
    pub fn render_frame(
        &mut self,
        scene: &SceneTables,
        view: &ViewParams,
        cascades: &[ShadowCascade],
    ) -> EngineResult<FrameReport> {
        scene.validate()?;
        validate_cascades(cascades, self.config.shadow_cascade_count)?;
        if view.resolution != self.resolution {
            self.resize(view.resolution)?;
        }

        let policy = self.config.bounds_policy;
        let inputs = FrameInputs {
            scene,
            view,
            main: CullView::main(view, policy),
            cascades,
            cascade_views: cascades
                .iter()
                .map(|cascade| CullView::cascade(view, cascade, policy))
                .collect(),
        };

        let kinds: Vec<PassKind> = self.schedule.passes().iter().map(|pass| pass.kind).collect();
        for kind in kinds {
            log::debug!("[SoftwareVisibilityRenderer::render_frame] {}", kind.name());
            self.run_pass(kind, &inputs)?;
        }

        let frame = self.frames.current();
        let mut report = FrameReport::from_counters(
            self.frames.frame_index(),
            &frame.counters(),
            &frame.draw_commands(),
            &self.config,
            scene.instances.len(),
        );
        report.covered_pixels = frame.covered_pixels;
        self.frames.advance();
        self.last_report = Some(report.clone());

        match report.capacity_error() {
            Some(error) => {
                report.log_summary();
                Err(error)
            }
            None => Ok(report),
        }
    }

    fn run_pass(&mut self, kind: PassKind, inputs: &FrameInputs<'_>) -> EngineResult<()> {
        let scene = inputs.scene;
        let frame = self.frames.current_mut();

        match kind {
            PassKind::ResetFrame => {
                frame.reset();
                self.mask.reset(self.config.max_meshlet_instances as usize);
            }
            PassKind::MeshCull => {
                MeshCuller::run(
                    scene,
                    &inputs.main,
                    self.config.max_mesh_instances,
                    &mut frame.meshlet_counter,
                    &mut frame.mesh,
                )?;
            }
            PassKind::PrepareMeshletDispatch => {
                frame.meshlet_dispatch =
                    indirect_commands::meshlet_dispatch(&frame.meshlet_counter, CULL_WORKGROUP_SIZE);
            }
            PassKind::MeshletCull(phase) => {
                let i = phase.index();
                let covered = frame.meshlet_dispatch.workgroup_count() * CULL_WORKGROUP_SIZE as u64;
                let items = frame.mesh.meshlet_instances.len().min(covered as usize);
                MeshletCuller::run_phase(
                    phase,
                    scene,
                    &inputs.main,
                    &frame.mesh.meshlet_instances[..items],
                    self.hiz.as_ref(),
                    &mut self.mask,
                    &mut frame.visible_counters[i],
                    &mut frame.visible[i],
                )?;
            }
            PassKind::PrepareTriangleDispatch(phase) => {
                let i = phase.index();
                frame.triangle_dispatch[i] = indirect_commands::triangle_dispatch(&frame.visible_counters[i]);
            }
            PassKind::BeginDraw(phase) => {
                frame.draws[phase.index()] = indirect_commands::begin_draw(&frame.index_counter);
            }
            PassKind::TriangleCull(phase) => {
                let i = phase.index();
                let groups = frame.triangle_dispatch[i].workgroup_count() as usize;
                let visible = &frame.visible[i][..groups.min(frame.visible[i].len())];
                TriangleCuller::run(
                    scene,
                    &inputs.main,
                    &frame.mesh.meshlet_instances,
                    visible,
                    &mut frame.index_counter,
                    &mut frame.indices,
                )?;
            }
            PassKind::FinalizeDraw(phase) => {
                indirect_commands::finalize_draw(&mut frame.draws[phase.index()], &frame.index_counter);
                if phase == CullPhase::Early {
                    frame.early_index_requests = frame.index_counter.requested();
                }
            }
            PassKind::VisibilityEncode(phase) => {
                if phase == CullPhase::Early {
                    self.targets.clear();
                }
                VisibilityEncoder::encode(
                    scene,
                    &inputs.view.view_proj,
                    &frame.mesh.meshlet_instances,
                    &frame.indices,
                    frame.draw(phase),
                    &mut self.targets,
                    inputs.view.debug_view == DebugView::Overdraw,
                )?;
            }
            PassKind::HiZBuild => {
                let size = self.targets.resolution();
                self.hiz = Some(HiZPyramid::build(
                    &self.targets.depth,
                    size.x,
                    size.y,
                    self.config.max_hiz_mips,
                )?);
            }
            PassKind::VisibilityDecode => {
                self.gbuffer.clear();
                frame.covered_pixels = VisibilityDecoder::decode(
                    scene,
                    inputs.view,
                    &self.targets,
                    &frame.mesh.instance_lods,
                    &mut self.gbuffer,
                );
            }
            PassKind::ShadowMeshletCull(c) => {
                let view = inputs.cascade_views.get(c as usize).ok_or_else(|| missing_cascade(c))?;
                let targets = frame.shadows.get_mut(c as usize).ok_or_else(|| missing_cascade(c))?;
                ShadowCascadeCuller::cull_meshlets(scene, view, &frame.mesh.meshlet_instances, targets);
            }
            PassKind::ShadowTriangleCull(c) => {
                let view = inputs.cascade_views.get(c as usize).ok_or_else(|| missing_cascade(c))?;
                let targets = frame.shadows.get_mut(c as usize).ok_or_else(|| missing_cascade(c))?;
                ShadowCascadeCuller::cull_triangles(scene, view, &frame.mesh.meshlet_instances, targets)?;
            }
            PassKind::ShadowRaster(c) => {
                let cascade = inputs
                    .cascades
                    .get(c as usize)
                    .ok_or_else(|| missing_cascade(c))?;
                let targets = frame.shadows.get(c as usize).ok_or_else(|| missing_cascade(c))?;
                if self.shadow_maps.len() <= c as usize {
                    self.shadow_maps.resize_with(c as usize + 1, || ShadowMap::new(0));
                }
                let map = &mut self.shadow_maps[c as usize];
                if map.resolution != cascade.resolution {
                    *map = ShadowMap::new(cascade.resolution);
                } else {
                    map.clear();
                }
                VisibilityEncoder::encode_depth(
                    scene,
                    &cascade.view_proj,
                    &frame.mesh.meshlet_instances,
                    &targets.indices,
                    &targets.draw,
                    map,
                )?;
            }
        }
        Ok(())
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn schedule(&self) -> &FrameSchedule {
        &self.schedule
    }

    pub fn resolution(&self) -> UVec2 {
        self.resolution
    }

    /// Frames rendered so far
    pub fn frame_index(&self) -> u64 {
        self.frames.frame_index()
    }

    pub fn visibility(&self) -> &VisibilityTargets {
        &self.targets
    }

    pub fn gbuffer(&self) -> &GBuffer {
        &self.gbuffer
    }

    pub fn hiz(&self) -> Option<&HiZPyramid> {
        self.hiz.as_ref()
    }

    pub fn visibility_mask(&self) -> &VisibilityMask {
        &self.mask
    }

    pub fn shadow_map(&self, cascade: u32) -> Option<&ShadowMap> {
        self.shadow_maps.get(cascade as usize)
    }

    /// Buffers of the most recently finished frame
    pub fn last_frame(&self) -> Option<&FrameBuffers> {
        self.frames.previous()
    }

    /// Report of the most recent frame, including frames that overflowed
    pub fn last_report(&self) -> Option<&FrameReport> {
        self.last_report.as_ref()
    }
}

fn missing_cascade(cascade: u32) -> EngineError {
    EngineError::degenerate(format!("shadow cascade {cascade}"), "no cascade for scheduled pass")
}
