//! Visibility buffer encode and decode
//!
//! The encoder rasterizes the reordered index buffer into a per-pixel
//! (mesh instance, meshlet, triangle) id plus reversed-Z depth. The decoder
//! turns those ids back into surface attributes for the G-buffer.

pub mod decoder;
pub mod encoder;
pub mod gbuffer;
pub mod raster;
pub mod visibility_id;

pub use decoder::{DecodePipeline, SurfaceSample, VisibilityDecoder};
pub use encoder::{ShadowMap, VisibilityAttachments, VisibilityEncoder, VisibilityRasterPipeline, VisibilityTargets};
pub use gbuffer::{GBuffer, GBufferTargets, GBufferTexel};
pub use visibility_id::VisibilityId;
