//! Visibility buffer encoding
//!
//! Renders the reordered index buffer with a reversed-Z greater-or-equal depth
//! test, storing a [`VisibilityId`] per covered pixel. Overdraw is counted
//! only while the overdraw debug view is active.

use glam::{Mat4, UVec2};

use crate::error::{EngineError, EngineResult};
use crate::gpu::buffer_layouts::{layouts, IndirectDrawIndexedCommand};
use crate::gpu::GpuContext;
use crate::renderer::gpu_culling::{resolve_meshlet, unpack_index, SHADOW_FORMAT};
use crate::renderer::shaders::{self, VISIBILITY_WGSL};
use crate::scene::{MeshletInstance, SceneTables};

use super::raster::rasterize_triangle;
use super::VisibilityId;

pub const VISIBILITY_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rg32Uint;
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Software visibility, depth and overdraw targets
#[derive(Debug, Clone)]
pub struct VisibilityTargets {
    resolution: UVec2,
    pub ids: Vec<VisibilityId>,
    /// Reversed-Z, cleared to 0 (far)
    pub depth: Vec<f32>,
    pub overdraw: Vec<u32>,
}

impl VisibilityTargets {
    pub fn new(resolution: UVec2) -> Self {
        let pixels = resolution.x as usize * resolution.y as usize;
        Self {
            resolution,
            ids: vec![VisibilityId::EMPTY; pixels],
            depth: vec![0.0; pixels],
            overdraw: vec![0; pixels],
        }
    }

    pub fn clear(&mut self) {
        self.ids.fill(VisibilityId::EMPTY);
        self.depth.fill(0.0);
        self.overdraw.fill(0);
    }

    pub fn resolution(&self) -> UVec2 {
        self.resolution
    }

    #[inline]
    pub fn index(&self, x: u32, y: u32) -> usize {
        (y * self.resolution.x + x) as usize
    }

    pub fn id(&self, x: u32, y: u32) -> VisibilityId {
        self.ids[self.index(x, y)]
    }

    pub fn covered_pixels(&self) -> u32 {
        self.ids.iter().filter(|id| !id.is_empty()).count() as u32
    }
}

/// Depth-only software shadow map
#[derive(Debug, Clone)]
pub struct ShadowMap {
    pub resolution: u32,
    pub depth: Vec<f32>,
}

impl ShadowMap {
    pub fn new(resolution: u32) -> Self {
        Self {
            resolution,
            depth: vec![0.0; resolution as usize * resolution as usize],
        }
    }

    pub fn clear(&mut self) {
        self.depth.fill(0.0);
    }

    pub fn covered_texels(&self) -> u32 {
        self.depth.iter().filter(|d| **d > 0.0).count() as u32
    }
}

pub struct VisibilityEncoder;

impl VisibilityEncoder {
    /// Rasterize the triangles of `draw` into the visibility targets.
    ///
    /// Returns the number of fragments that passed the depth test.
    #[allow(clippy::too_many_arguments)]
    pub fn encode(
        scene: &SceneTables,
        view_proj: &Mat4,
        meshlet_instances: &[MeshletInstance],
        indices: &[u32],
        draw: &IndirectDrawIndexedCommand,
        targets: &mut VisibilityTargets,
        track_overdraw: bool,
    ) -> EngineResult<u32> {
        let resolution = targets.resolution;
        let mut written = 0;

        for_each_triangle(scene, view_proj, meshlet_instances, indices, draw, |id, clip| {
            rasterize_triangle(clip, resolution, |fragment| {
                let index = targets.index(fragment.x, fragment.y);
                if track_overdraw {
                    targets.overdraw[index] += 1;
                }
                if fragment.depth >= targets.depth[index] {
                    targets.depth[index] = fragment.depth;
                    targets.ids[index] = id;
                    written += 1;
                }
            });
        })?;

        log::debug!(
            "[VisibilityEncoder::encode] {} indices from {}, {} fragments written",
            draw.index_count,
            draw.first_index,
            written
        );
        Ok(written)
    }

    /// Depth-only raster of a shadow cascade's draw
    pub fn encode_depth(
        scene: &SceneTables,
        view_proj: &Mat4,
        meshlet_instances: &[MeshletInstance],
        indices: &[u32],
        draw: &IndirectDrawIndexedCommand,
        map: &mut ShadowMap,
    ) -> EngineResult<()> {
        let size = map.resolution;
        let resolution = UVec2::splat(size);
        for_each_triangle(scene, view_proj, meshlet_instances, indices, draw, |_, clip| {
            rasterize_triangle(clip, resolution, |fragment| {
                let texel = &mut map.depth[(fragment.y * size + fragment.x) as usize];
                if fragment.depth >= *texel {
                    *texel = fragment.depth;
                }
            });
        })
    }
}

/// Fetch each triangle of an indexed draw the way the vertex stage does
fn for_each_triangle(
    scene: &SceneTables,
    view_proj: &Mat4,
    meshlet_instances: &[MeshletInstance],
    indices: &[u32],
    draw: &IndirectDrawIndexedCommand,
    mut visit: impl FnMut(VisibilityId, [glam::Vec4; 3]),
) -> EngineResult<()> {
    let range = draw.index_range();
    let Some(slice) = indices.get(range.clone()) else {
        return Err(EngineError::degenerate(
            "indexed draw",
            format!("index range {:?} exceeds the {} stored indices", range, indices.len()),
        ));
    };

    for corners in slice.chunks_exact(3) {
        let (meshlet_instance, triangle, _) = unpack_index(corners[0]);
        let Some(resolved) = meshlet_instances
            .get(meshlet_instance as usize)
            .and_then(|mi| resolve_meshlet(scene, mi))
        else {
            continue;
        };
        let clip = resolved.triangle_clip(scene, triangle, view_proj);
        let ordered = [0, 1, 2].map(|i| clip[(unpack_index(corners[i]).2 as usize).min(2)]);
        let id = VisibilityId::new(
            meshlet_instances[meshlet_instance as usize].instance,
            resolved.meshlet_index,
            triangle,
        );
        visit(id, ordered);
    }
    Ok(())
}

/// Visibility and depth attachments of the wgpu backend
pub struct VisibilityAttachments {
    pub visibility: wgpu::Texture,
    pub visibility_view: wgpu::TextureView,
    pub depth: wgpu::Texture,
    pub depth_view: wgpu::TextureView,
    pub resolution: UVec2,
}

impl VisibilityAttachments {
    pub fn new(context: &GpuContext, resolution: UVec2) -> EngineResult<Self> {
        let usage = wgpu::TextureUsages::RENDER_ATTACHMENT
            | wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::COPY_SRC;
        let visibility = create_attachment(context, "Visibility Buffer", VISIBILITY_FORMAT, resolution, usage)?;
        let depth = create_attachment(context, "Visibility Depth", DEPTH_FORMAT, resolution, usage)?;

        log::info!(
            "[VisibilityAttachments::new] Created {}x{} visibility and depth attachments",
            resolution.x,
            resolution.y
        );
        Ok(Self {
            visibility_view: visibility.create_view(&wgpu::TextureViewDescriptor::default()),
            visibility,
            depth_view: depth.create_view(&wgpu::TextureViewDescriptor::default()),
            depth,
            resolution,
        })
    }
}

pub(crate) fn create_attachment(
    context: &GpuContext,
    label: &str,
    format: wgpu::TextureFormat,
    resolution: UVec2,
    usage: wgpu::TextureUsages,
) -> EngineResult<wgpu::Texture> {
    let limit = context.device.limits().max_texture_dimension_2d;
    if resolution.x == 0 || resolution.y == 0 || resolution.max_element() > limit {
        return Err(EngineError::resource(
            label,
            format!("{}x{} outside 1..={}", resolution.x, resolution.y, limit),
        ));
    }
    context.create_checked(label, |device| {
        device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: resolution.x,
                height: resolution.y,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage,
            view_formats: &[],
        })
    })
}

/// Visibility raster pipeline plus the depth-only variant used for shadow maps
pub struct VisibilityRasterPipeline {
    visibility_pipeline: wgpu::RenderPipeline,
    shadow_pipeline: wgpu::RenderPipeline,
    layout: wgpu::BindGroupLayout,
}

impl VisibilityRasterPipeline {
    pub fn new(context: &GpuContext, scene_layout: &wgpu::BindGroupLayout) -> EngineResult<Self> {
        let device = &context.device;
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Visibility Raster Layout"),
            entries: &[
                layouts::storage_buffer_entry(0, true, wgpu::ShaderStages::VERTEX),
                layouts::storage_buffer_entry(1, false, wgpu::ShaderStages::FRAGMENT),
            ],
        });

        let module = shaders::create_shader_module(device, "visibility", VISIBILITY_WGSL)?;
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Visibility Raster Pipeline Layout"),
            bind_group_layouts: &[scene_layout, &layout],
            push_constant_ranges: &[],
        });

        let primitive = wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            unclipped_depth: false,
            polygon_mode: wgpu::PolygonMode::Fill,
            conservative: false,
        };
        let depth_state = |format| wgpu::DepthStencilState {
            format,
            depth_write_enabled: true,
            depth_compare: wgpu::CompareFunction::GreaterEqual,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        };

        let visibility_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Visibility Raster Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &module,
                entry_point: "vs_main",
                buffers: &[],
            },
            fragment: Some(wgpu::FragmentState {
                module: &module,
                entry_point: "fs_main",
                targets: &[Some(wgpu::ColorTargetState {
                    format: VISIBILITY_FORMAT,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive,
            depth_stencil: Some(depth_state(DEPTH_FORMAT)),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
        });

        let shadow_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Shadow Depth Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &module,
                entry_point: "vs_main",
                buffers: &[],
            },
            fragment: None,
            primitive,
            depth_stencil: Some(depth_state(SHADOW_FORMAT)),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
        });

        Ok(Self {
            visibility_pipeline,
            shadow_pipeline,
            layout,
        })
    }

    pub fn bind_group(
        &self,
        device: &wgpu::Device,
        meshlet_instances: &wgpu::Buffer,
        overdraw: &wgpu::Buffer,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Visibility Raster Bind Group"),
            layout: &self.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: meshlet_instances.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: overdraw.as_entire_binding(),
                },
            ],
        })
    }

    /// Draw one phase; the early phase clears the attachments first
    #[allow(clippy::too_many_arguments)]
    pub fn record(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        attachments: &VisibilityAttachments,
        clear: bool,
        scene_group: &wgpu::BindGroup,
        group: &wgpu::BindGroup,
        indices: &wgpu::Buffer,
        draws: &wgpu::Buffer,
        draw_slot: u32,
    ) {
        let empty = crate::constants::packing::VISIBILITY_EMPTY as f64;
        let (color_load, depth_load) = if clear {
            (
                wgpu::LoadOp::Clear(wgpu::Color {
                    r: empty,
                    g: empty,
                    b: 0.0,
                    a: 0.0,
                }),
                wgpu::LoadOp::Clear(0.0),
            )
        } else {
            (wgpu::LoadOp::Load, wgpu::LoadOp::Load)
        };

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Visibility Encode"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &attachments.visibility_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: color_load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &attachments.depth_view,
                depth_ops: Some(wgpu::Operations {
                    load: depth_load,
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(&self.visibility_pipeline);
        pass.set_bind_group(0, scene_group, &[]);
        pass.set_bind_group(1, group, &[]);
        pass.set_index_buffer(indices.slice(..), wgpu::IndexFormat::Uint32);
        pass.draw_indexed_indirect(draws, draw_offset(draw_slot));
    }

    /// Depth-only raster of one cascade, cleared to the far plane
    #[allow(clippy::too_many_arguments)]
    pub fn record_shadow(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        shadow_map: &wgpu::TextureView,
        scene_group: &wgpu::BindGroup,
        group: &wgpu::BindGroup,
        indices: &wgpu::Buffer,
        draws: &wgpu::Buffer,
        draw_slot: u32,
    ) {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Shadow Raster"),
            color_attachments: &[],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: shadow_map,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(0.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(&self.shadow_pipeline);
        pass.set_bind_group(0, scene_group, &[]);
        pass.set_bind_group(1, group, &[]);
        pass.set_index_buffer(indices.slice(..), wgpu::IndexFormat::Uint32);
        pass.draw_indexed_indirect(draws, draw_offset(draw_slot));
    }
}

/// Byte offset of a draw-command slot
pub(crate) fn draw_offset(slot: u32) -> u64 {
    slot as u64 * std::mem::size_of::<IndirectDrawIndexedCommand>() as u64
}
