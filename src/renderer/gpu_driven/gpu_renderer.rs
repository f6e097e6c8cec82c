//! wgpu executor of the frame schedule
//!
//! Every pass of a frame is recorded into one command encoder. Counts stay on
//! the GPU between passes: the command passes turn counters into dispatch and
//! draw arguments, so the CPU only reads the counters back after submission
//! to build the frame report.

use std::sync::Arc;
use std::time::Instant;

use glam::UVec2;
use parking_lot::RwLock;

use crate::config::RendererConfig;
use crate::error::{EngineError, EngineResult};
use crate::gpu::buffer_layouts::{calculations, usage};
use crate::gpu::{read_staging_blocking, FrameCounters, GpuContext, IndirectDrawIndexedCommand, ViewUniform};
use crate::renderer::error::gpu_operation_error;
use crate::renderer::frame_graph::{FrameSchedule, PassKind};
use crate::renderer::gpu_culling::{
    validate_cascades, CommandEntry, CommandPipeline, CullPhase, HiZGenerator, MeshCullPipeline,
    MeshletCullPipeline, ShadowMaps, TriangleCullPipeline,
};
use crate::renderer::visibility::{
    DecodePipeline, GBufferTargets, VisibilityAttachments, VisibilityId, VisibilityRasterPipeline,
};
use crate::scene::{SceneTables, ShadowCascade, ViewParams};

use super::frame_resources::FrameRing;
use super::gpu_resources::{
    cascade_limits, create_buffer, mesh_limits, phase_limits, scene_layout, GpuFrameBuffers, GpuSceneBuffers,
};
use super::{check_resolution, FrameReport};

/// Statistics for GPU-driven rendering
#[derive(Debug, Default, Clone)]
pub struct RenderStats {
    /// Frames submitted
    pub frames: u64,

    /// Frames that hit a capacity limit
    pub overflowed_frames: u64,

    /// Triangles drawn by the main view last frame
    pub visible_triangles: u32,

    /// CPU time from recording to readback, in ms
    pub frame_time_ms: f32,
}

/// Bind groups of one frame, rebuilt after the scene tables are uploaded
struct FrameBindings {
    scene_mesh: wgpu::BindGroup,
    scene_phase: [wgpu::BindGroup; 2],
    scene_shadow: Vec<wgpu::BindGroup>,
    commands_mesh: wgpu::BindGroup,
    commands_phase: [wgpu::BindGroup; 2],
    commands_shadow: Vec<wgpu::BindGroup>,
    mesh_cull: wgpu::BindGroup,
    meshlet_cull: [wgpu::BindGroup; 2],
    meshlet_shadow: Vec<wgpu::BindGroup>,
    triangle_cull: [wgpu::BindGroup; 2],
    triangle_shadow: Vec<wgpu::BindGroup>,
    raster: wgpu::BindGroup,
    decode: wgpu::BindGroup,
}

pub struct GpuVisibilityRenderer {
    context: GpuContext,
    config: RendererConfig,
    schedule: FrameSchedule,
    scene_layout: wgpu::BindGroupLayout,
    mesh_cull: MeshCullPipeline,
    meshlet_cull: MeshletCullPipeline,
    triangle_cull: TriangleCullPipeline,
    commands: CommandPipeline,
    raster: VisibilityRasterPipeline,
    decode: DecodePipeline,
    frames: FrameRing<GpuFrameBuffers>,
    hiz: HiZGenerator,
    attachments: VisibilityAttachments,
    /// Fragments per pixel, written only in the overdraw debug view
    overdraw: wgpu::Buffer,
    gbuffer: GBufferTargets,
    shadow_maps: ShadowMaps,
    resolution: UVec2,
    stats: Arc<RwLock<RenderStats>>,
    last_report: Option<FrameReport>,
}

impl GpuVisibilityRenderer {
    pub fn new(context: GpuContext, config: RendererConfig, resolution: UVec2) -> EngineResult<Self> {
        config.validate()?;
        check_resolution(resolution)?;
        let schedule = FrameSchedule::build(config.shadow_cascade_count)?;

        let scene_layout = scene_layout(&context.device);
        let mesh_cull = MeshCullPipeline::new(&context, &scene_layout)?;
        let meshlet_cull = MeshletCullPipeline::new(&context, &scene_layout)?;
        let triangle_cull = TriangleCullPipeline::new(&context, &scene_layout)?;
        let commands = CommandPipeline::new(&context)?;
        let raster = VisibilityRasterPipeline::new(&context, &scene_layout)?;
        let decode = DecodePipeline::new(&context, &scene_layout)?;

        let frames = FrameRing::try_new(config.frames_in_flight, |slot| {
            GpuFrameBuffers::new(&context, &config, slot)
        })?;
        let hiz = HiZGenerator::new(&context, resolution.x, resolution.y, config.max_hiz_mips)?;
        let attachments = VisibilityAttachments::new(&context, resolution)?;
        let overdraw = overdraw_buffer(&context, resolution)?;
        let gbuffer = GBufferTargets::new(&context, resolution)?;

        log::info!(
            "[GpuVisibilityRenderer::new] {}x{} on {}, {} frames in flight, {} passes",
            resolution.x,
            resolution.y,
            context.adapter_info.name,
            frames.len(),
            schedule.passes().len()
        );
        Ok(Self {
            context,
            config,
            schedule,
            scene_layout,
            mesh_cull,
            meshlet_cull,
            triangle_cull,
            commands,
            raster,
            decode,
            frames,
            hiz,
            attachments,
            overdraw,
            gbuffer,
            shadow_maps: ShadowMaps::new(),
            resolution,
            stats: Arc::new(RwLock::new(RenderStats::default())),
            last_report: None,
        })
    }

    /// Recreate the resolution-dependent attachments; the Hi-Z pyramid becomes invalid
    pub fn resize(&mut self, resolution: UVec2) -> EngineResult<()> {
        check_resolution(resolution)?;
        if resolution == self.resolution {
            return Ok(());
        }
        self.attachments = VisibilityAttachments::new(&self.context, resolution)?;
        self.gbuffer = GBufferTargets::new(&self.context, resolution)?;
        self.overdraw = overdraw_buffer(&self.context, resolution)?;
        self.hiz.resize(&self.context, resolution.x, resolution.y)?;
        self.resolution = resolution;
        log::info!(
            "[GpuVisibilityRenderer::resize] Resized to {}x{}",
            resolution.x,
            resolution.y
        );
        Ok(())
    }

    /// Record, submit and read back one frame.
    ///
    /// Overflow handling matches the software renderer: the frame completes
    /// with clamped draws and `CapacityExceeded` is returned afterwards.
    pub fn render_frame(
        &mut self,
        scene: &SceneTables,
        view: &ViewParams,
        cascades: &[ShadowCascade],
    ) -> EngineResult<FrameReport> {
        let start_time = Instant::now();
        scene.validate()?;
        validate_cascades(cascades, self.config.shadow_cascade_count)?;
        if view.resolution != self.resolution {
            self.resize(view.resolution)?;
        }
        self.shadow_maps.ensure(&self.context, cascades)?;

        let scene_buffers = GpuSceneBuffers::upload(&self.context, scene)?;
        self.write_uniforms(view, cascades, scene_buffers.instance_count);
        let bindings = self.bind(&scene_buffers);

        self.context.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let mut encoder = self
            .context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Visibility Frame"),
            });

        let kinds: Vec<PassKind> = self.schedule.passes().iter().map(|pass| pass.kind).collect();
        let recorded = kinds
            .into_iter()
            .try_for_each(|kind| self.record_pass(&mut encoder, kind, &bindings, scene_buffers.instance_count));

        let frame = self.frames.current();
        if recorded.is_ok() {
            encoder.copy_buffer_to_buffer(&frame.counters, 0, &frame.counters_staging, 0, frame.counters.size());
            encoder.copy_buffer_to_buffer(&frame.draws, 0, &frame.draws_staging, 0, frame.draws.size());
            self.context.queue.submit(Some(encoder.finish()));
        }

        let validation = pollster::block_on(self.context.device.pop_error_scope());
        if let Err(error) = recorded {
            self.hiz.invalidate();
            return Err(error);
        }
        if let Some(error) = validation {
            self.hiz.invalidate();
            return Err(gpu_operation_error("record visibility frame", error));
        }
        if self.schedule.position(PassKind::HiZBuild).is_some() {
            self.hiz.mark_built();
        }

        let counters = read_staging_blocking::<FrameCounters>(&self.context.device, &frame.counters_staging)?
            .first()
            .copied()
            .unwrap_or_default();
        let draws = read_staging_blocking::<IndirectDrawIndexedCommand>(&self.context.device, &frame.draws_staging)?;

        let report = FrameReport::from_counters(
            self.frames.frame_index(),
            &counters,
            &draws,
            &self.config,
            scene.instances.len(),
        );
        self.frames.advance();
        self.last_report = Some(report.clone());

        {
            let mut stats = self.stats.write();
            stats.frames += 1;
            stats.overflowed_frames += report.overflowed() as u64;
            stats.visible_triangles = report.visible_triangles();
            stats.frame_time_ms = start_time.elapsed().as_secs_f32() * 1000.0;
        }

        match report.capacity_error() {
            Some(error) => {
                report.log_summary();
                Err(error)
            }
            None => Ok(report),
        }
    }

    fn write_uniforms(&self, view: &ViewParams, cascades: &[ShadowCascade], instance_count: u32) {
        let queue = &self.context.queue;
        let policy = self.config.bounds_policy;
        let frame = self.frames.current();

        // Early culls against last frame's pyramid, late against the one built this frame
        let early = ViewUniform::new(view, policy, self.hiz.mip_count(), self.hiz.is_valid());
        let late = ViewUniform::new(view, policy, self.hiz.mip_count(), true);

        frame.mesh_uniforms.write(queue, &early, &mesh_limits(&self.config, instance_count));
        frame.phase(CullPhase::Early).write(
            queue,
            &early,
            &phase_limits(&self.config, instance_count, CullPhase::Early),
        );
        frame.phase(CullPhase::Late).write(
            queue,
            &late,
            &phase_limits(&self.config, instance_count, CullPhase::Late),
        );
        for (c, (shadow, cascade)) in frame.shadows.iter().zip(cascades).enumerate() {
            shadow.uniforms.write(
                queue,
                &ViewUniform::for_cascade(view, cascade, policy),
                &cascade_limits(&self.config, instance_count, c as u32),
            );
        }
    }

    fn bind(&self, scene: &GpuSceneBuffers) -> FrameBindings {
        let device = &self.context.device;
        let frame = self.frames.current();
        let scene_group = |view: &wgpu::Buffer, limits: &wgpu::Buffer| {
            scene.bind_group(device, &self.scene_layout, view, limits)
        };
        let command_group =
            |limits: &wgpu::Buffer| self.commands.bind_group(device, limits, &frame.counters, &frame.dispatches, &frame.draws);
        let meshlet_group = |visible: &wgpu::Buffer| {
            self.meshlet_cull.bind_group(
                device,
                &frame.meshlet_instances,
                visible,
                &frame.counters,
                &frame.mask,
                self.hiz.view(),
            )
        };
        let phases = CullPhase::ALL;

        FrameBindings {
            scene_mesh: scene_group(&frame.mesh_uniforms.view, &frame.mesh_uniforms.limits),
            scene_phase: phases.map(|p| scene_group(&frame.phase(p).view, &frame.phase(p).limits)),
            scene_shadow: frame
                .shadows
                .iter()
                .map(|s| scene_group(&s.uniforms.view, &s.uniforms.limits))
                .collect(),
            commands_mesh: command_group(&frame.mesh_uniforms.limits),
            commands_phase: phases.map(|p| command_group(&frame.phase(p).limits)),
            commands_shadow: frame.shadows.iter().map(|s| command_group(&s.uniforms.limits)).collect(),
            mesh_cull: self
                .mesh_cull
                .bind_group(device, &frame.meshlet_instances, &frame.counters, &frame.instance_lods),
            meshlet_cull: phases.map(|p| meshlet_group(frame.visible(p))),
            meshlet_shadow: frame.shadows.iter().map(|s| meshlet_group(&s.visible)).collect(),
            triangle_cull: phases.map(|p| {
                self.triangle_cull.bind_group(
                    device,
                    &frame.meshlet_instances,
                    frame.visible(p),
                    &frame.counters,
                    &frame.indices,
                )
            }),
            triangle_shadow: frame
                .shadows
                .iter()
                .map(|s| {
                    self.triangle_cull
                        .bind_group(device, &frame.meshlet_instances, &s.visible, &frame.counters, &s.indices)
                })
                .collect(),
            raster: self.raster.bind_group(device, &frame.meshlet_instances, &self.overdraw),
            decode: self.decode.bind_group(
                device,
                &self.attachments.visibility_view,
                &self.attachments.depth_view,
                &self.overdraw,
                &frame.instance_lods,
                &scene.materials,
            ),
        }
    }

    fn record_pass(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        kind: PassKind,
        bindings: &FrameBindings,
        instance_count: u32,
    ) -> EngineResult<()> {
        let frame = self.frames.current();

        match kind {
            PassKind::ResetFrame => {
                encoder.clear_buffer(&frame.mask, 0, None);
                self.commands
                    .record(encoder, CommandEntry::ResetFrame, &bindings.commands_mesh);
            }
            PassKind::MeshCull => {
                self.mesh_cull.record(
                    encoder,
                    &bindings.scene_mesh,
                    &bindings.mesh_cull,
                    instance_count.min(self.config.max_mesh_instances),
                );
            }
            PassKind::PrepareMeshletDispatch => {
                self.commands
                    .record(encoder, CommandEntry::PrepareMeshletDispatch, &bindings.commands_mesh);
            }
            PassKind::MeshletCull(phase) => {
                let i = phase.index();
                self.meshlet_cull.record(
                    encoder,
                    &bindings.scene_phase[i],
                    &bindings.meshlet_cull[i],
                    &frame.dispatches,
                );
            }
            PassKind::PrepareTriangleDispatch(phase) => {
                self.commands.record(
                    encoder,
                    CommandEntry::PrepareTriangleDispatch,
                    &bindings.commands_phase[phase.index()],
                );
            }
            PassKind::BeginDraw(phase) => {
                self.commands
                    .record(encoder, CommandEntry::BeginDraw, &bindings.commands_phase[phase.index()]);
            }
            PassKind::TriangleCull(phase) => {
                let i = phase.index();
                self.triangle_cull.record(
                    encoder,
                    &bindings.scene_phase[i],
                    &bindings.triangle_cull[i],
                    &frame.dispatches,
                    phase.dispatch_slot(),
                );
            }
            PassKind::FinalizeDraw(phase) => {
                self.commands
                    .record(encoder, CommandEntry::FinalizeDraw, &bindings.commands_phase[phase.index()]);
            }
            PassKind::VisibilityEncode(phase) => {
                let clear = phase == CullPhase::Early;
                if clear {
                    encoder.clear_buffer(&self.overdraw, 0, None);
                }
                self.raster.record(
                    encoder,
                    &self.attachments,
                    clear,
                    &bindings.scene_phase[phase.index()],
                    &bindings.raster,
                    &frame.indices,
                    &frame.draws,
                    phase.draw_slot(),
                );
            }
            PassKind::HiZBuild => {
                self.hiz
                    .record(&self.context.device, encoder, &self.attachments.depth_view);
            }
            PassKind::VisibilityDecode => {
                self.decode.record(
                    encoder,
                    &self.gbuffer,
                    &bindings.scene_phase[CullPhase::Early.index()],
                    &bindings.decode,
                );
            }
            PassKind::ShadowMeshletCull(c) => {
                let cascade = c as usize;
                self.meshlet_cull.record(
                    encoder,
                    bindings.scene_shadow.get(cascade).ok_or_else(|| missing_cascade(c))?,
                    bindings.meshlet_shadow.get(cascade).ok_or_else(|| missing_cascade(c))?,
                    &frame.dispatches,
                );
            }
            PassKind::ShadowTriangleCull(c) => {
                let cascade = c as usize;
                let commands = bindings.commands_shadow.get(cascade).ok_or_else(|| missing_cascade(c))?;
                let scene_group = bindings.scene_shadow.get(cascade).ok_or_else(|| missing_cascade(c))?;
                let group = bindings.triangle_shadow.get(cascade).ok_or_else(|| missing_cascade(c))?;
                let slot = crate::gpu::buffer_layouts::slots::DISPATCH_SHADOW_BASE + c;

                self.commands
                    .record(encoder, CommandEntry::PrepareTriangleDispatch, commands);
                self.commands.record(encoder, CommandEntry::BeginDraw, commands);
                self.triangle_cull
                    .record(encoder, scene_group, group, &frame.dispatches, slot);
                self.commands.record(encoder, CommandEntry::FinalizeDraw, commands);
            }
            PassKind::ShadowRaster(c) => {
                let cascade = c as usize;
                let shadow = frame.shadows.get(cascade).ok_or_else(|| missing_cascade(c))?;
                self.raster.record_shadow(
                    encoder,
                    self.shadow_maps.view(c).ok_or_else(|| missing_cascade(c))?,
                    bindings.scene_shadow.get(cascade).ok_or_else(|| missing_cascade(c))?,
                    &bindings.raster,
                    &shadow.indices,
                    &frame.draws,
                    crate::gpu::buffer_layouts::slots::DRAW_SHADOW_BASE + c,
                );
            }
        }
        Ok(())
    }

    /// Copy the visibility attachment back to the CPU
    pub fn read_visibility(&self) -> EngineResult<Vec<VisibilityId>> {
        let resolution = self.attachments.resolution;
        let row_bytes = calculations::align_buffer_size(
            resolution.x as u64 * std::mem::size_of::<VisibilityId>() as u64,
            wgpu::COPY_BYTES_PER_ROW_ALIGNMENT as u64,
        );
        let staging = create_buffer(
            &self.context,
            "Visibility Staging",
            row_bytes * resolution.y as u64,
            usage::STAGING,
        )?;

        let mut encoder = self
            .context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Visibility Readback"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &self.attachments.visibility,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &staging,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(row_bytes as u32),
                    rows_per_image: Some(resolution.y),
                },
            },
            wgpu::Extent3d {
                width: resolution.x,
                height: resolution.y,
                depth_or_array_layers: 1,
            },
        );
        self.context.queue.submit(Some(encoder.finish()));

        let words = read_staging_blocking::<u32>(&self.context.device, &staging)?;
        let row_words = (row_bytes / 4) as usize;
        let pixel_words = resolution.x as usize * 2;
        Ok(words
            .chunks(row_words)
            .flat_map(|row| row[..pixel_words].chunks_exact(2))
            .map(|pair| VisibilityId::from_words([pair[0], pair[1]]))
            .collect())
    }

    pub fn context(&self) -> &GpuContext {
        &self.context
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

    pub fn frame_index(&self) -> u64 {
        self.frames.frame_index()
    }

    pub fn gbuffer(&self) -> &GBufferTargets {
        &self.gbuffer
    }

    pub fn hiz(&self) -> &HiZGenerator {
        &self.hiz
    }

    pub fn shadow_maps(&self) -> &ShadowMaps {
        &self.shadow_maps
    }

    pub fn stats(&self) -> RenderStats {
        self.stats.read().clone()
    }

    /// Shared handle for readers on other threads
    pub fn stats_handle(&self) -> Arc<RwLock<RenderStats>> {
        Arc::clone(&self.stats)
    }

    pub fn last_report(&self) -> Option<&FrameReport> {
        self.last_report.as_ref()
    }
}

fn overdraw_buffer(context: &GpuContext, resolution: UVec2) -> EngineResult<wgpu::Buffer> {
    create_buffer(
        context,
        "Overdraw Counts",
        calculations::array_size::<u32>(resolution.x as u64 * resolution.y as u64),
        usage::STORAGE_READ,
    )
}

fn missing_cascade(cascade: u32) -> EngineError {
    EngineError::degenerate(format!("shadow cascade {cascade}"), "no cascade for scheduled pass")
}
