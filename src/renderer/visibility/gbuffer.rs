//! G-buffer targets written by the decode pass

use glam::{UVec2, Vec4};

use crate::error::EngineResult;
use crate::gpu::GpuContext;

use super::encoder::create_attachment;

/// Attributes decoded for one pixel
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GBufferTexel {
    pub albedo: Vec4,
    /// World-space normal in xyz, w = 0
    pub normal: Vec4,
    pub emissive: Vec4,
    /// Metallic, roughness, occlusion
    pub mro: Vec4,
    pub debug: Vec4,
}

/// Software G-buffer, one attachment per attribute; cleared to zero
#[derive(Debug, Clone)]
pub struct GBuffer {
    resolution: UVec2,
    pub albedo: Vec<Vec4>,
    pub normal: Vec<Vec4>,
    pub emissive: Vec<Vec4>,
    pub mro: Vec<Vec4>,
    pub debug: Vec<Vec4>,
}

impl GBuffer {
    pub fn new(resolution: UVec2) -> Self {
        let pixels = resolution.x as usize * resolution.y as usize;
        Self {
            resolution,
            albedo: vec![Vec4::ZERO; pixels],
            normal: vec![Vec4::ZERO; pixels],
            emissive: vec![Vec4::ZERO; pixels],
            mro: vec![Vec4::ZERO; pixels],
            debug: vec![Vec4::ZERO; pixels],
        }
    }

    pub fn clear(&mut self) {
        for attachment in [
            &mut self.albedo,
            &mut self.normal,
            &mut self.emissive,
            &mut self.mro,
            &mut self.debug,
        ] {
            attachment.fill(Vec4::ZERO);
        }
    }

    pub fn resolution(&self) -> UVec2 {
        self.resolution
    }

    pub fn texel(&self, x: u32, y: u32) -> GBufferTexel {
        let i = (y * self.resolution.x + x) as usize;
        GBufferTexel {
            albedo: self.albedo[i],
            normal: self.normal[i],
            emissive: self.emissive[i],
            mro: self.mro[i],
            debug: self.debug[i],
        }
    }

    pub fn write(&mut self, index: usize, texel: GBufferTexel) {
        self.albedo[index] = texel.albedo;
        self.normal[index] = texel.normal;
        self.emissive[index] = texel.emissive;
        self.mro[index] = texel.mro;
        self.debug[index] = texel.debug;
    }

    /// True when every attachment still holds its clear value
    pub fn is_clear(&self) -> bool {
        [&self.albedo, &self.normal, &self.emissive, &self.mro, &self.debug]
            .iter()
            .all(|attachment| attachment.iter().all(|v| *v == Vec4::ZERO))
    }
}

/// Attachment formats, in fragment output order
pub const GBUFFER_FORMATS: [wgpu::TextureFormat; 5] = [
    wgpu::TextureFormat::Rgba8Unorm,
    wgpu::TextureFormat::Rgba16Float,
    wgpu::TextureFormat::Rgba16Float,
    wgpu::TextureFormat::Rgba8Unorm,
    wgpu::TextureFormat::Rgba8Unorm,
];

const GBUFFER_LABELS: [&str; 5] = [
    "GBuffer Albedo",
    "GBuffer Normal",
    "GBuffer Emissive",
    "GBuffer Metallic Roughness",
    "Debug View",
];

/// wgpu G-buffer attachments
pub struct GBufferTargets {
    pub textures: Vec<wgpu::Texture>,
    pub views: Vec<wgpu::TextureView>,
    pub resolution: UVec2,
}

impl GBufferTargets {
    pub fn new(context: &GpuContext, resolution: UVec2) -> EngineResult<Self> {
        let usage = wgpu::TextureUsages::RENDER_ATTACHMENT
            | wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::COPY_SRC;
        let textures = GBUFFER_FORMATS
            .iter()
            .zip(GBUFFER_LABELS)
            .map(|(format, label)| create_attachment(context, label, *format, resolution, usage))
            .collect::<EngineResult<Vec<_>>>()?;
        let views = textures
            .iter()
            .map(|texture| texture.create_view(&wgpu::TextureViewDescriptor::default()))
            .collect();

        log::info!(
            "[GBufferTargets::new] Created {} attachments at {}x{}",
            GBUFFER_FORMATS.len(),
            resolution.x,
            resolution.y
        );
        Ok(Self {
            textures,
            views,
            resolution,
        })
    }

    pub fn albedo(&self) -> &wgpu::Texture {
        &self.textures[0]
    }

    pub fn debug(&self) -> &wgpu::Texture {
        &self.textures[4]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_then_clear() {
        let mut gbuffer = GBuffer::new(UVec2::new(4, 2));
        assert!(gbuffer.is_clear());

        let texel = GBufferTexel {
            albedo: Vec4::ONE,
            normal: Vec4::new(0.0, 0.0, 1.0, 0.0),
            ..Default::default()
        };
        gbuffer.write(5, texel);
        assert_eq!(gbuffer.texel(1, 1), texel);
        assert!(!gbuffer.is_clear());

        gbuffer.clear();
        assert!(gbuffer.is_clear());
    }
}
