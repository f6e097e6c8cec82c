//! Two-phase occlusion culling and visibility-buffer rendering
//!
//! `frame_graph` declares the pass order and the resources each pass touches.
//! `gpu_culling` and `visibility` hold the per-pass kernels, each with a CPU
//! implementation and a wgpu pipeline. `gpu_driven` owns the per-frame
//! buffers and the two renderers that execute the schedule.

pub mod error;
pub mod flags;
pub mod frame_graph;
pub mod gpu_culling;
pub mod gpu_driven;
pub mod shaders;
pub mod visibility;

pub use flags::{CullFlags, DebugView};
pub use frame_graph::{FrameSchedule, PassKind};
pub use gpu_driven::{
    CascadeReport, FrameReport, GpuVisibilityRenderer, SoftwareVisibilityRenderer,
};
