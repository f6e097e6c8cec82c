//! Hierarchical Z pyramid
//!
//! Each texel holds the minimum (farthest, in reversed Z) depth of the 2x2
//! texels below it, so a bound whose nearest depth is below the pyramid value
//! over its whole footprint is certainly hidden. Odd mip sizes round up and
//! clamp their sample coordinates.

use glam::{UVec2, Vec2};

use crate::constants::workgroups::HIZ_TILE_SIZE;
use crate::error::{EngineError, EngineResult};
use crate::gpu::buffer_layouts::layouts;
use crate::gpu::GpuContext;
use crate::math::ScreenRect;
use crate::renderer::shaders::{self, HIZ_COPY_WGSL, HIZ_DOWNSAMPLE_WGSL};

pub const HIZ_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R32Float;

/// Number of mips down to 1x1, capped at `max_mips`
pub fn mip_count(width: u32, height: u32, max_mips: u32) -> u32 {
    let (mut w, mut h, mut count) = (width.max(1), height.max(1), 1);
    while (w > 1 || h > 1) && count < max_mips {
        w = w.div_ceil(2);
        h = h.div_ceil(2);
        count += 1;
    }
    count
}

fn mip_extent(width: u32, height: u32, level: u32) -> UVec2 {
    (0..level).fold(UVec2::new(width, height), |size, _| {
        UVec2::new(size.x.div_ceil(2).max(1), size.y.div_ceil(2).max(1))
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct HiZMip {
    pub width: u32,
    pub height: u32,
    pub texels: Vec<f32>,
}

impl HiZMip {
    #[inline]
    fn load(&self, x: u32, y: u32) -> f32 {
        let x = x.min(self.width - 1);
        let y = y.min(self.height - 1);
        self.texels[(y * self.width + x) as usize]
    }
}

/// CPU Hi-Z pyramid
#[derive(Debug, Clone, PartialEq)]
pub struct HiZPyramid {
    mips: Vec<HiZMip>,
}

impl HiZPyramid {
    /// Build from a full-resolution reversed-Z depth image
    pub fn build(depth: &[f32], width: u32, height: u32, max_mips: u32) -> EngineResult<Self> {
        if width == 0 || height == 0 {
            return Err(EngineError::resource("Hi-Z pyramid", "zero extent"));
        }
        if depth.len() != (width * height) as usize {
            return Err(EngineError::resource(
                "Hi-Z pyramid",
                format!("depth image has {} texels, expected {}x{}", depth.len(), width, height),
            ));
        }

        let count = mip_count(width, height, max_mips);
        let mut mips = Vec::with_capacity(count as usize);
        mips.push(HiZMip {
            width,
            height,
            texels: depth.to_vec(),
        });

        for level in 1..count {
            let previous = &mips[level as usize - 1];
            let size = mip_extent(width, height, level);
            let mut texels = Vec::with_capacity((size.x * size.y) as usize);
            for y in 0..size.y {
                for x in 0..size.x {
                    let (sx, sy) = (x * 2, y * 2);
                    texels.push(
                        previous
                            .load(sx, sy)
                            .min(previous.load(sx + 1, sy))
                            .min(previous.load(sx, sy + 1))
                            .min(previous.load(sx + 1, sy + 1)),
                    );
                }
            }
            mips.push(HiZMip {
                width: size.x,
                height: size.y,
                texels,
            });
        }

        log::debug!(
            "[HiZPyramid::build] {}x{} with {} mips",
            width,
            height,
            mips.len()
        );
        Ok(Self { mips })
    }

    pub fn mip_count(&self) -> u32 {
        self.mips.len() as u32
    }

    pub fn mip(&self, level: u32) -> Option<&HiZMip> {
        self.mips.get(level as usize)
    }

    pub fn extent(&self) -> UVec2 {
        UVec2::new(self.mips[0].width, self.mips[0].height)
    }

    /// Whether a projected bound lies entirely behind the stored depth.
    ///
    /// Samples the mip where the rectangle spans at most 2x2 texels. Bounds
    /// too large for the available chain are reported visible.
    pub fn is_occluded(&self, rect: &ScreenRect) -> bool {
        let size = self.extent().as_vec2();
        let min = rect.min.max(Vec2::ZERO);
        let max = rect.max.min(size);
        if min.x >= max.x || min.y >= max.y {
            return false;
        }

        let extent = (max - min).max_element().max(1.0);
        let level = extent.log2().ceil() as u32;
        let Some(mip) = self.mip(level) else {
            return false;
        };

        let x0 = (min.x.floor() as u32) >> level;
        let y0 = (min.y.floor() as u32) >> level;
        let x1 = ((max.x.ceil() as u32).saturating_sub(1) >> level).min(mip.width - 1);
        let y1 = ((max.y.ceil() as u32).saturating_sub(1) >> level).min(mip.height - 1);

        let mut farthest = f32::MAX;
        for y in y0..=y1 {
            for x in x0..=x1 {
                farthest = farthest.min(mip.load(x, y));
            }
        }
        rect.nearest_depth < farthest
    }
}

/// GPU Hi-Z texture plus the compute pipelines that rebuild it from a depth attachment
pub struct HiZGenerator {
    copy_pipeline: wgpu::ComputePipeline,
    copy_layout: wgpu::BindGroupLayout,
    downsample_pipeline: wgpu::ComputePipeline,
    downsample_layout: wgpu::BindGroupLayout,
    texture: wgpu::Texture,
    full_view: wgpu::TextureView,
    mip_views: Vec<wgpu::TextureView>,
    width: u32,
    height: u32,
    max_mips: u32,
    valid: bool,
}

impl HiZGenerator {
    pub fn new(context: &GpuContext, width: u32, height: u32, max_mips: u32) -> EngineResult<Self> {
        let device = &context.device;

        let copy_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Hi-Z Copy Layout"),
            entries: &[
                layouts::texture_entry(0, wgpu::TextureSampleType::Depth, wgpu::ShaderStages::COMPUTE),
                layouts::storage_texture_entry(1, HIZ_FORMAT),
            ],
        });
        let downsample_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Hi-Z Downsample Layout"),
            entries: &[
                layouts::texture_entry(
                    0,
                    wgpu::TextureSampleType::Float { filterable: false },
                    wgpu::ShaderStages::COMPUTE,
                ),
                layouts::storage_texture_entry(1, HIZ_FORMAT),
            ],
        });

        let copy_pipeline = compute_pipeline(device, "Hi-Z Copy", HIZ_COPY_WGSL, &copy_layout, "copy_depth")?;
        let downsample_pipeline = compute_pipeline(
            device,
            "Hi-Z Downsample",
            HIZ_DOWNSAMPLE_WGSL,
            &downsample_layout,
            "downsample",
        )?;

        let (texture, full_view, mip_views) = create_texture(context, width, height, max_mips)?;

        Ok(Self {
            copy_pipeline,
            copy_layout,
            downsample_pipeline,
            downsample_layout,
            texture,
            full_view,
            mip_views,
            width,
            height,
            max_mips,
            valid: false,
        })
    }

    /// Recreate for a new render target size; the previous contents are discarded
    pub fn resize(&mut self, context: &GpuContext, width: u32, height: u32) -> EngineResult<()> {
        if width == self.width && height == self.height {
            return Ok(());
        }
        let (texture, full_view, mip_views) = create_texture(context, width, height, self.max_mips)?;
        self.texture = texture;
        self.full_view = full_view;
        self.mip_views = mip_views;
        self.width = width;
        self.height = height;
        self.valid = false;
        log::info!("[HiZGenerator::resize] Recreated Hi-Z at {}x{}", width, height);
        Ok(())
    }

    /// Encode mip 0 copy and the min-reduction chain
    pub fn record(&mut self, device: &wgpu::Device, encoder: &mut wgpu::CommandEncoder, depth: &wgpu::TextureView) {
        let copy_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Hi-Z Copy Bind Group"),
            layout: &self.copy_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(depth),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&self.mip_views[0]),
                },
            ],
        });
        let downsample_groups: Vec<_> = (1..self.mip_views.len())
            .map(|level| {
                device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("Hi-Z Downsample Bind Group"),
                    layout: &self.downsample_layout,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: wgpu::BindingResource::TextureView(&self.mip_views[level - 1]),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: wgpu::BindingResource::TextureView(&self.mip_views[level]),
                        },
                    ],
                })
            })
            .collect();

        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("Hi-Z Build"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.copy_pipeline);
        pass.set_bind_group(0, &copy_group, &[]);
        pass.dispatch_workgroups(
            self.width.div_ceil(HIZ_TILE_SIZE),
            self.height.div_ceil(HIZ_TILE_SIZE),
            1,
        );

        pass.set_pipeline(&self.downsample_pipeline);
        for (index, group) in downsample_groups.iter().enumerate() {
            let size = mip_extent(self.width, self.height, index as u32 + 1);
            pass.set_bind_group(0, group, &[]);
            pass.dispatch_workgroups(size.x.div_ceil(HIZ_TILE_SIZE), size.y.div_ceil(HIZ_TILE_SIZE), 1);
        }
        drop(pass);
    }

    /// The frame that recorded the build was submitted without errors
    pub fn mark_built(&mut self) {
        self.valid = true;
    }

    pub fn invalidate(&mut self) {
        self.valid = false;
    }

    /// All mips, for `textureLoad` in the culling passes
    pub fn view(&self) -> &wgpu::TextureView {
        &self.full_view
    }

    pub fn mip_count(&self) -> u32 {
        self.mip_views.len() as u32
    }

    /// False until the first submitted build after creation or resize
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }
}

fn compute_pipeline(
    device: &wgpu::Device,
    label: &str,
    source: &str,
    layout: &wgpu::BindGroupLayout,
    entry_point: &str,
) -> EngineResult<wgpu::ComputePipeline> {
    let module = shaders::create_shader_module(device, label, source)?;
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(label),
        bind_group_layouts: &[layout],
        push_constant_ranges: &[],
    });
    Ok(device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(label),
        layout: Some(&pipeline_layout),
        module: &module,
        entry_point,
    }))
}

fn create_texture(
    context: &GpuContext,
    width: u32,
    height: u32,
    max_mips: u32,
) -> EngineResult<(wgpu::Texture, wgpu::TextureView, Vec<wgpu::TextureView>)> {
    if width == 0 || height == 0 {
        return Err(EngineError::resource("Hi-Z pyramid", "zero extent"));
    }
    let max_dimension = context.device.limits().max_texture_dimension_2d;
    if width > max_dimension || height > max_dimension {
        return Err(EngineError::resource(
            "Hi-Z pyramid",
            format!("{}x{} exceeds the device limit {}", width, height, max_dimension),
        ));
    }

    let mip_level_count = mip_count(width, height, max_mips);
    let texture = context.create_checked("Hi-Z pyramid", |device| {
        device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Hi-Z Pyramid"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: HIZ_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::STORAGE_BINDING,
            view_formats: &[],
        })
    })?;

    let full_view = texture.create_view(&wgpu::TextureViewDescriptor {
        label: Some("Hi-Z Full View"),
        ..Default::default()
    });
    let mip_views = (0..mip_level_count)
        .map(|level| {
            texture.create_view(&wgpu::TextureViewDescriptor {
                label: Some("Hi-Z Mip View"),
                base_mip_level: level,
                mip_level_count: Some(1),
                ..Default::default()
            })
        })
        .collect();

    Ok((texture, full_view, mip_views))
}
