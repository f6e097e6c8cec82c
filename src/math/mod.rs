//! Geometry helpers shared by the culling and visibility passes

pub mod bounds;
pub mod clip;
pub mod frustum;

pub use bounds::{max_axis_scale, ndc_to_pixel, project_sphere, BoundingSphere, ScreenRect};
pub use clip::{clip_triangle_near, fan_triangles};
pub use frustum::Frustum;
