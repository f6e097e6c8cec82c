//! GPU plumbing: device acquisition, shader-visible layouts and readback

pub mod buffer_layouts;
pub mod context;
pub mod readback;

pub use buffer_layouts::{
    DispatchIndirectCommand, FrameCounters, GpuMaterial, GpuMesh, GpuMeshInstance, GpuMeshLod,
    GpuMeshlet, GpuSceneTables, GpuVertex, IndirectDrawIndexedCommand, PassLimits, ViewUniform,
};
pub use context::GpuContext;
pub use readback::{read_staging, read_staging_blocking};
