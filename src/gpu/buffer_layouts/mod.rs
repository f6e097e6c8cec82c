//! Byte layouts of the scene tables, uniforms and per-frame culling buffers
//!
//! Every struct here is mirrored field-for-field by `renderer/shaders/common.wgsl`.
//! Sizes are pinned by tests so a layout change on one side cannot go unnoticed.

pub mod commands;
pub mod scene;
pub mod view;

#[cfg(test)]
mod tests;

pub use commands::{counter_slots, DispatchIndirectCommand, FrameCounters, IndirectDrawIndexedCommand};
pub use scene::{GpuMaterial, GpuMesh, GpuMeshInstance, GpuMeshLod, GpuMeshlet, GpuSceneTables, GpuVertex};
pub use view::{PassLimits, ViewUniform};

/// Slots inside the draw-command and dispatch-argument buffers
pub mod slots {
    pub const DRAW_EARLY: u32 = 0;
    pub const DRAW_LATE: u32 = 1;
    pub const DRAW_SHADOW_BASE: u32 = 2;

    pub const DISPATCH_MESHLETS: u32 = 0;
    pub const DISPATCH_TRIANGLES_EARLY: u32 = 1;
    pub const DISPATCH_TRIANGLES_LATE: u32 = 2;
    pub const DISPATCH_SHADOW_BASE: u32 = 3;
}

/// Buffer usage patterns
pub mod usage {
    use wgpu::BufferUsages;

    /// Scene tables and per-frame lists
    pub const STORAGE: BufferUsages = BufferUsages::STORAGE.union(BufferUsages::COPY_DST);

    /// Per-frame lists that may be copied out for inspection
    pub const STORAGE_READ: BufferUsages = STORAGE.union(BufferUsages::COPY_SRC);

    /// Reordered index buffer: written by compute, consumed by indexed draws
    pub const INDEX_STORAGE: BufferUsages = BufferUsages::INDEX.union(BufferUsages::STORAGE);

    /// View and pass-limit uniforms, rewritten every frame
    pub const UNIFORM: BufferUsages = BufferUsages::UNIFORM.union(BufferUsages::COPY_DST);

    /// Indirect argument buffers written by compute and read back for reports
    pub const INDIRECT: BufferUsages = BufferUsages::INDIRECT
        .union(BufferUsages::STORAGE)
        .union(BufferUsages::COPY_SRC)
        .union(BufferUsages::COPY_DST);

    /// CPU readback staging
    pub const STAGING: BufferUsages = BufferUsages::MAP_READ.union(BufferUsages::COPY_DST);
}

/// Bind group layout entries
pub mod layouts {
    use wgpu::{
        BindGroupLayoutEntry, BindingType, BufferBindingType, ShaderStages, StorageTextureAccess,
        TextureFormat, TextureSampleType, TextureViewDimension,
    };

    /// Create a storage buffer binding entry
    pub fn storage_buffer_entry(
        binding: u32,
        read_only: bool,
        visibility: ShaderStages,
    ) -> BindGroupLayoutEntry {
        BindGroupLayoutEntry {
            binding,
            visibility,
            ty: BindingType::Buffer {
                ty: BufferBindingType::Storage { read_only },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }
    }

    /// Create a uniform buffer binding entry
    pub fn uniform_buffer_entry(binding: u32, visibility: ShaderStages) -> BindGroupLayoutEntry {
        BindGroupLayoutEntry {
            binding,
            visibility,
            ty: BindingType::Buffer {
                ty: BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }
    }

    /// Sampled texture read with `textureLoad`
    pub fn texture_entry(
        binding: u32,
        sample_type: TextureSampleType,
        visibility: ShaderStages,
    ) -> BindGroupLayoutEntry {
        BindGroupLayoutEntry {
            binding,
            visibility,
            ty: BindingType::Texture {
                sample_type,
                view_dimension: TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        }
    }

    /// Write-only storage texture for one mip level
    pub fn storage_texture_entry(binding: u32, format: TextureFormat) -> BindGroupLayoutEntry {
        BindGroupLayoutEntry {
            binding,
            visibility: ShaderStages::COMPUTE,
            ty: BindingType::StorageTexture {
                access: StorageTextureAccess::WriteOnly,
                format,
                view_dimension: TextureViewDimension::D2,
            },
            count: None,
        }
    }
}

/// Size helpers
pub mod calculations {
    /// Byte size of `count` elements, never zero so the buffer can always be bound
    #[inline]
    pub fn array_size<T>(count: u64) -> u64 {
        count.max(1) * std::mem::size_of::<T>() as u64
    }

    /// Words needed for a bit-per-item mask
    #[inline]
    pub fn mask_words(bits: u32) -> u32 {
        bits.div_ceil(32).max(1)
    }

    /// Round `size` up to a power-of-two `alignment`, e.g. texture copy row pitch
    #[inline]
    pub fn align_buffer_size(size: u64, alignment: u64) -> u64 {
        (size + alignment - 1) & !(alignment - 1)
    }
}
