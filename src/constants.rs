// Meshlet Engine Constants - SINGLE SOURCE OF TRUTH
//
// This file contains the constants shared by the CPU kernels and the WGSL
// shaders. build.rs includes this file directly and emits the same values as
// a WGSL prelude, so it must stay free of crate dependencies.

/// Compute workgroup sizes
pub mod workgroups {
    /// Threads per workgroup for the mesh-instance and meshlet-instance passes
    pub const CULL_WORKGROUP_SIZE: u32 = 64;

    /// Threads per workgroup for triangle culling (one workgroup per meshlet)
    pub const TRIANGLE_WORKGROUP_SIZE: u32 = 128;

    /// Tile edge for the Hi-Z downsample pass
    pub const HIZ_TILE_SIZE: u32 = 8;

    /// Largest workgroup count a single dispatch dimension may carry
    pub const MAX_DISPATCH_DIMENSION: u32 = 65_535;
}

/// Meshlet shape limits
pub mod meshlets {
    /// Maximum unique vertices referenced by one meshlet
    pub const MAX_MESHLET_VERTICES: u32 = 64;

    /// Maximum triangles in one meshlet
    pub const MAX_MESHLET_TRIANGLES: u32 = 128;
}

/// Bit layouts of the packed identifiers
pub mod packing {
    /// Reordered index = meshlet instance << 10 | triangle << 2 | corner
    pub const INDEX_CORNER_BITS: u32 = 2;
    pub const INDEX_TRIANGLE_BITS: u32 = 8;
    pub const INDEX_TRIANGLE_SHIFT: u32 = INDEX_CORNER_BITS;
    pub const INDEX_MESHLET_SHIFT: u32 = INDEX_CORNER_BITS + INDEX_TRIANGLE_BITS;
    pub const INDEX_CORNER_MASK: u32 = (1 << INDEX_CORNER_BITS) - 1;
    pub const INDEX_TRIANGLE_MASK: u32 = (1 << INDEX_TRIANGLE_BITS) - 1;

    /// Largest meshlet-instance id representable in a packed index
    pub const MAX_PACKED_MESHLET_INSTANCES: u32 = 1 << (32 - INDEX_MESHLET_SHIFT);

    /// Visibility id word 1 = meshlet << 8 | triangle
    pub const VISIBILITY_TRIANGLE_BITS: u32 = 8;
    pub const VISIBILITY_TRIANGLE_MASK: u32 = (1 << VISIBILITY_TRIANGLE_BITS) - 1;

    /// Clear value of both visibility words
    pub const VISIBILITY_EMPTY: u32 = 0xFFFF_FFFF;
}

/// Culling thresholds
pub mod culling {
    /// Clip-space w below which a point is treated as crossing the eye plane
    pub const NEAR_W_EPSILON: f32 = 1.0e-5;

    /// Minimum distance used in LOD error projection
    pub const MIN_LOD_DISTANCE: f32 = 1.0e-3;

    /// Hard cap for the Hi-Z mip chain
    pub const MAX_HIZ_MIPS: u32 = 16;

    /// Maximum number of shadow cascades
    pub const MAX_SHADOW_CASCADES: u32 = 4;
}

/// Default capacities
pub mod capacities {
    pub const DEFAULT_MAX_MESH_INSTANCES: u32 = 65_536;
    pub const DEFAULT_MAX_MESHLET_INSTANCES: u32 = 1 << 20;
    pub const DEFAULT_MAX_REORDERED_INDICES: u32 = 3 << 22;
    pub const DEFAULT_MAX_SHADOW_INDICES: u32 = 3 << 21;
    pub const DEFAULT_FRAMES_IN_FLIGHT: u32 = 2;
    pub const MAX_FRAMES_IN_FLIGHT: u32 = 4;
}
