//! Meshlet Engine
//!
//! GPU-driven two-phase occlusion culling feeding a visibility buffer. Each
//! frame culls mesh instances, then meshlets in an early phase against the
//! previous frame's Hi-Z pyramid and a late phase against the pyramid built
//! from the early depth, then triangles. Survivors are rasterized as packed
//! ids and decoded into a G-buffer. Shadow cascades reuse the frame's
//! meshlet list.
//!
//! Two renderers walk the same frame schedule: [`SoftwareVisibilityRenderer`]
//! runs every pass on the CPU and [`GpuVisibilityRenderer`] records them
//! with wgpu.

pub mod config;
pub mod constants;
pub mod error;
pub mod gpu;
pub mod math;
pub mod renderer;
pub mod scene;

pub use config::{BoundsPolicy, RendererConfig};
pub use error::{EngineError, EngineResult};
pub use gpu::GpuContext;
pub use renderer::{
    CascadeReport, CullFlags, DebugView, FrameReport, FrameSchedule, GpuVisibilityRenderer, PassKind,
    SoftwareVisibilityRenderer,
};
pub use scene::{
    LodSource, Material, MeshInstance, MeshletInstance, SceneTables, ShadowCascade, Vertex, ViewParams,
};
