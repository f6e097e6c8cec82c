//! Visibility buffer decoding
//!
//! For each covered pixel the surface is rebuilt from its id: world position
//! from depth, barycentrics by projecting that position onto the world-space
//! triangle, then interpolated normal and UV. Empty pixels keep the G-buffer
//! clear value.

use glam::{Mat3, Mat4, UVec2, Vec2, Vec3, Vec4};
use rayon::prelude::*;

use crate::error::EngineResult;
use crate::gpu::buffer_layouts::layouts;
use crate::gpu::GpuContext;
use crate::renderer::flags::DebugView;
use crate::renderer::gpu_culling::LOD_CULLED;
use crate::renderer::shaders::{self, DECODE_WGSL};
use crate::scene::{SceneTables, ViewParams};

use super::encoder::VisibilityTargets;
use super::gbuffer::{GBuffer, GBufferTargets, GBufferTexel, GBUFFER_FORMATS};
use super::VisibilityId;

/// Surface attributes recovered for one pixel
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceSample {
    pub position: Vec3,
    pub normal: Vec3,
    pub uv: Vec2,
    pub barycentrics: Vec3,
    pub material: u32,
}

/// Barycentric weights of `p` projected onto triangle `abc`; degenerate triangles give (1, 0, 0)
pub fn barycentrics(p: Vec3, a: Vec3, b: Vec3, c: Vec3) -> Vec3 {
    let (v0, v1, v2) = (b - a, c - a, p - a);
    let d00 = v0.dot(v0);
    let d01 = v0.dot(v1);
    let d11 = v1.dot(v1);
    let d20 = v2.dot(v0);
    let d21 = v2.dot(v1);
    let denom = d00 * d11 - d01 * d01;
    if denom.abs() <= 1e-12 {
        return Vec3::X;
    }
    let v = (d11 * d20 - d01 * d21) / denom;
    let w = (d00 * d21 - d01 * d20) / denom;
    Vec3::new(1.0 - v - w, v, w)
}

/// Cofactor matrix of the upper 3x3, sign-corrected for mirroring transforms
pub fn normal_matrix(transform: &Mat4) -> Mat3 {
    let a = transform.x_axis.truncate();
    let b = transform.y_axis.truncate();
    let c = transform.z_axis.truncate();
    let sign = if a.dot(b.cross(c)) < 0.0 { -1.0 } else { 1.0 };
    Mat3::from_cols(b.cross(c) * sign, c.cross(a) * sign, a.cross(b) * sign)
}

/// PCG integer hash, identical to `hash_u32` in the shaders
pub fn hash_u32(value: u32) -> u32 {
    let state = value.wrapping_mul(747_796_405).wrapping_add(2_891_336_453);
    let word = ((state >> ((state >> 28) + 4)) ^ state).wrapping_mul(277_803_737);
    (word >> 22) ^ word
}

pub fn hash_color(key: u32) -> Vec4 {
    let h = hash_u32(key);
    Vec4::new(
        (h & 0xFF) as f32 / 255.0,
        ((h >> 8) & 0xFF) as f32 / 255.0,
        ((h >> 16) & 0xFF) as f32 / 255.0,
        1.0,
    )
}

/// Blue at 0, green at 0.5, red at 1
pub fn heatmap(t: f32) -> Vec4 {
    let x = t.clamp(0.0, 1.0);
    if x < 0.5 {
        let k = x * 2.0;
        Vec4::new(0.0, k, 1.0 - k, 1.0)
    } else {
        let k = (x - 0.5) * 2.0;
        Vec4::new(k, 1.0 - k, 0.0, 1.0)
    }
}

pub struct VisibilityDecoder;

impl VisibilityDecoder {
    /// Rebuild the surface under pixel (x, y)
    pub fn reconstruct(
        scene: &SceneTables,
        inverse_view_proj: &Mat4,
        resolution: UVec2,
        id: VisibilityId,
        x: u32,
        y: u32,
        depth: f32,
    ) -> Option<SurfaceSample> {
        if id.is_empty() {
            return None;
        }
        let instance = scene.instances.get(id.mesh_instance as usize)?;
        let mesh = scene.meshes.get(instance.mesh as usize)?;
        let meshlet = scene.geometry.meshlets.get(id.meshlet() as usize)?;
        if id.triangle() >= meshlet.triangle_count {
            return None;
        }

        let size = resolution.as_vec2();
        let ndc = Vec2::new(
            (x as f32 + 0.5) / size.x * 2.0 - 1.0,
            1.0 - (y as f32 + 0.5) / size.y * 2.0,
        );
        let world = inverse_view_proj.project_point3(ndc.extend(depth));

        let transform = scene.instance_transform(instance);
        let corners = scene.geometry.triangle_vertices(meshlet, id.triangle());
        let p = corners.map(|v| transform.transform_point3(v.position));
        let weights = barycentrics(world, p[0], p[1], p[2]);

        let local_normal =
            corners[0].normal * weights.x + corners[1].normal * weights.y + corners[2].normal * weights.z;
        let uv = corners[0].uv * weights.x + corners[1].uv * weights.y + corners[2].uv * weights.z;

        Some(SurfaceSample {
            position: world,
            normal: (normal_matrix(&transform) * local_normal).normalize_or_zero(),
            uv,
            barycentrics: weights,
            material: mesh.material,
        })
    }

    /// Debug colour of one pixel for the selected view
    #[allow(clippy::too_many_arguments)]
    pub fn debug_color(
        view: DebugView,
        id: VisibilityId,
        material: u32,
        depth: f32,
        overdraw: u32,
        heatmap_scale: f32,
        instance_lods: &[u32],
    ) -> Vec4 {
        match view {
            DebugView::None => Vec4::ZERO,
            DebugView::Triangles => hash_color(hash_u32(id.mesh_instance) ^ id.packed),
            DebugView::Meshlets => hash_color(hash_u32(id.mesh_instance) ^ id.meshlet()),
            DebugView::MeshInstances => hash_color(id.mesh_instance),
            DebugView::Lods => hash_color(
                instance_lods
                    .get(id.mesh_instance as usize)
                    .copied()
                    .unwrap_or(LOD_CULLED),
            ),
            DebugView::Overdraw => heatmap(overdraw as f32 / heatmap_scale.max(1e-6)),
            DebugView::Materials => hash_color(material),
            DebugView::Depth => Vec4::new(depth, depth, depth, 1.0),
        }
    }

    /// Decode every covered pixel into `gbuffer`; returns the number decoded
    pub fn decode(
        scene: &SceneTables,
        view: &ViewParams,
        targets: &VisibilityTargets,
        instance_lods: &[u32],
        gbuffer: &mut GBuffer,
    ) -> u32 {
        let resolution = targets.resolution();
        let inverse = view.view_proj.inverse();

        let texels: Vec<(usize, GBufferTexel)> = (0..targets.ids.len())
            .into_par_iter()
            .filter_map(|index| {
                let id = targets.ids[index];
                let (x, y) = (index as u32 % resolution.x, index as u32 / resolution.x);
                let depth = targets.depth[index];
                let sample = Self::reconstruct(scene, &inverse, resolution, id, x, y, depth)?;
                let material = scene.materials.get(sample.material as usize).copied().unwrap_or_default();

                Some((
                    index,
                    GBufferTexel {
                        albedo: material.base_color,
                        normal: sample.normal.extend(0.0),
                        emissive: material.emissive.extend(1.0),
                        mro: Vec4::new(material.metallic, material.roughness, material.occlusion, 1.0),
                        debug: Self::debug_color(
                            view.debug_view,
                            id,
                            sample.material,
                            depth,
                            targets.overdraw[index],
                            view.debug_heatmap_scale,
                            instance_lods,
                        ),
                    },
                ))
            })
            .collect();

        let decoded = texels.len() as u32;
        for (index, texel) in texels {
            gbuffer.write(index, texel);
        }
        log::debug!("[VisibilityDecoder::decode] Decoded {} pixels", decoded);
        decoded
    }
}

/// Full-screen decode pass of the wgpu backend
pub struct DecodePipeline {
    pipeline: wgpu::RenderPipeline,
    layout: wgpu::BindGroupLayout,
}

impl DecodePipeline {
    pub fn new(context: &GpuContext, scene_layout: &wgpu::BindGroupLayout) -> EngineResult<Self> {
        let device = &context.device;
        let stage = wgpu::ShaderStages::FRAGMENT;
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Visibility Decode Layout"),
            entries: &[
                layouts::texture_entry(0, wgpu::TextureSampleType::Uint, stage),
                layouts::texture_entry(1, wgpu::TextureSampleType::Depth, stage),
                layouts::storage_buffer_entry(2, true, stage),
                layouts::storage_buffer_entry(3, true, stage),
                layouts::storage_buffer_entry(4, true, stage),
            ],
        });

        let module = shaders::create_shader_module(device, "decode", DECODE_WGSL)?;
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Visibility Decode Pipeline Layout"),
            bind_group_layouts: &[scene_layout, &layout],
            push_constant_ranges: &[],
        });
        let targets: Vec<Option<wgpu::ColorTargetState>> = GBUFFER_FORMATS
            .iter()
            .map(|format| {
                Some(wgpu::ColorTargetState {
                    format: *format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })
            })
            .collect();

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Visibility Decode Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &module,
                entry_point: "vs_fullscreen",
                buffers: &[],
            },
            fragment: Some(wgpu::FragmentState {
                module: &module,
                entry_point: "fs_decode",
                targets: &targets,
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
        });

        Ok(Self { pipeline, layout })
    }

    #[allow(clippy::too_many_arguments)]
    pub fn bind_group(
        &self,
        device: &wgpu::Device,
        visibility: &wgpu::TextureView,
        depth: &wgpu::TextureView,
        overdraw: &wgpu::Buffer,
        instance_lods: &wgpu::Buffer,
        materials: &wgpu::Buffer,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Visibility Decode Bind Group"),
            layout: &self.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(visibility),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(depth),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: overdraw.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: instance_lods.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: materials.as_entire_binding(),
                },
            ],
        })
    }

    pub fn record(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        gbuffer: &GBufferTargets,
        scene_group: &wgpu::BindGroup,
        group: &wgpu::BindGroup,
    ) {
        let attachments: Vec<Option<wgpu::RenderPassColorAttachment>> = gbuffer
            .views
            .iter()
            .map(|view| {
                Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                })
            })
            .collect();

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Visibility Decode"),
            color_attachments: &attachments,
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, scene_group, &[]);
        pass.set_bind_group(1, group, &[]);
        pass.draw(0..3, 0..1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::buffer_layouts::IndirectDrawIndexedCommand;
    use crate::renderer::gpu_culling::pack_index;
    use crate::renderer::visibility::VisibilityEncoder;
    use crate::scene::{LodSource, Material, MeshletInstance, Vertex};

    #[test]
    fn test_barycentrics_of_corners_and_centroid() {
        let (a, b, c) = (Vec3::ZERO, Vec3::X, Vec3::Y);
        assert!(barycentrics(a, a, b, c).abs_diff_eq(Vec3::X, 1e-6));
        assert!(barycentrics(c, a, b, c).abs_diff_eq(Vec3::Z, 1e-6));
        let centroid = (a + b + c) / 3.0;
        assert!(barycentrics(centroid, a, b, c).abs_diff_eq(Vec3::splat(1.0 / 3.0), 1e-6));
        assert_eq!(barycentrics(a, a, a, a), Vec3::X);
    }

    #[test]
    fn test_normal_matrix_handles_scale_and_mirroring() {
        let stretched = Mat4::from_scale(Vec3::new(4.0, 1.0, 1.0));
        let n = (normal_matrix(&stretched) * Vec3::new(1.0, 1.0, 0.0).normalize()).normalize();
        // Stretching along x flattens the normal towards y
        assert!(n.y > n.x);

        let mirrored = Mat4::from_scale(Vec3::new(-1.0, 1.0, 1.0));
        let n = (normal_matrix(&mirrored) * Vec3::X).normalize();
        assert!(n.abs_diff_eq(Vec3::NEG_X, 1e-6));
    }

    #[test]
    fn test_hash_matches_reference_values() {
        assert_eq!(hash_u32(0), 129_708_002);
        assert_ne!(hash_u32(1), hash_u32(2));
        assert_eq!(hash_color(5).w, 1.0);
    }

    #[test]
    fn test_heatmap_endpoints() {
        assert_eq!(heatmap(0.0), Vec4::new(0.0, 0.0, 1.0, 1.0));
        assert_eq!(heatmap(0.5), Vec4::new(0.0, 1.0, 0.0, 1.0));
        assert_eq!(heatmap(2.0), Vec4::new(1.0, 0.0, 0.0, 1.0));
    }

    #[test]
    fn test_decode_rebuilds_surface_attributes() {
        let quad = [
            Vertex::new(Vec3::new(-20.0, -20.0, 0.0), Vec3::Z, Vec2::ZERO),
            Vertex::new(Vec3::new(20.0, -20.0, 0.0), Vec3::Z, Vec2::X),
            Vertex::new(Vec3::new(20.0, 20.0, 0.0), Vec3::Z, Vec2::ONE),
            Vertex::new(Vec3::new(-20.0, 20.0, 0.0), Vec3::Z, Vec2::Y),
        ];
        let mut scene = SceneTables::new();
        let material = scene.add_material(Material {
            base_color: Vec4::new(0.2, 0.4, 0.6, 1.0),
            metallic: 0.7,
            ..Material::default()
        });
        let lod = LodSource {
            vertices: &quad,
            indices: &[0, 1, 2, 0, 2, 3],
            error: 0.0,
        };
        let mesh = scene.add_mesh(&[lod], material).unwrap();
        let instance = scene
            .add_instance(mesh, Mat4::from_translation(Vec3::new(0.0, 0.0, -10.0)))
            .unwrap();

        let view_proj = Mat4::perspective_infinite_reverse_rh(90f32.to_radians(), 1.0, 0.1)
            * Mat4::look_at_rh(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y);
        let resolution = UVec2::new(8, 8);
        let view = ViewParams::new(view_proj, Vec3::ZERO, resolution).with_debug_view(DebugView::Depth);

        let meshlet_instances = [MeshletInstance::new(instance, 0)];
        let indices: Vec<u32> = (0..2).flat_map(|t| (0..3).map(move |c| pack_index(0, t, c))).collect();
        let draw = IndirectDrawIndexedCommand::new(0, 6);
        let mut targets = VisibilityTargets::new(resolution);
        VisibilityEncoder::encode(&scene, &view_proj, &meshlet_instances, &indices, &draw, &mut targets, false)
            .unwrap();

        let mut gbuffer = GBuffer::new(resolution);
        let decoded = VisibilityDecoder::decode(&scene, &view, &targets, &[0], &mut gbuffer);
        assert_eq!(decoded, 64);

        let texel = gbuffer.texel(4, 4);
        assert_eq!(texel.albedo, Vec4::new(0.2, 0.4, 0.6, 1.0));
        assert!(texel.normal.truncate().abs_diff_eq(Vec3::Z, 1e-4));
        assert!((texel.mro.x - 0.7).abs() < 1e-6);
        assert!((texel.debug.x - 0.01).abs() < 1e-4);

        let id = targets.id(4, 4);
        let sample = VisibilityDecoder::reconstruct(
            &scene,
            &view_proj.inverse(),
            resolution,
            id,
            4,
            4,
            targets.depth[targets.index(4, 4)],
        )
        .unwrap();
        assert!((sample.position.z + 10.0).abs() < 1e-2);
        assert!((sample.barycentrics.element_sum() - 1.0).abs() < 1e-4);
        // Pixel (4, 4) centre maps to world (0.125 * 10, -0.125 * 10)
        assert!(sample.uv.abs_diff_eq(Vec2::new(0.5 + 1.25 / 40.0, 0.5 - 1.25 / 40.0), 1e-3));
    }
}
