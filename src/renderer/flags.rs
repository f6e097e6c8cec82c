//! Cull feature flags and debug view selection

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Per-feature culling switches consumed by every culling pass.
    ///
    /// `BACKFACE_CULLING` and `SMALL_TRIANGLE_CULLING` refine the triangle
    /// stage and only take effect while `TRIANGLE_CULLING` is also set.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct CullFlags: u32 {
        const FRUSTUM_CULLING = 1 << 0;
        const OCCLUSION_CULLING = 1 << 1;
        const TRIANGLE_CULLING = 1 << 2;
        const BACKFACE_CULLING = 1 << 3;
        const SMALL_TRIANGLE_CULLING = 1 << 4;
        const LOD_SELECTION = 1 << 5;
    }
}

impl Default for CullFlags {
    fn default() -> Self {
        CullFlags::all()
    }
}

impl CullFlags {
    /// Flags applied to shadow cascades: occlusion never applies there
    pub fn for_shadow_cascade(self) -> Self {
        self.difference(CullFlags::OCCLUSION_CULLING)
    }

    #[inline]
    pub fn frustum(self) -> bool {
        self.contains(CullFlags::FRUSTUM_CULLING)
    }

    #[inline]
    pub fn occlusion(self) -> bool {
        self.contains(CullFlags::OCCLUSION_CULLING)
    }

    #[inline]
    pub fn triangles(self) -> bool {
        self.contains(CullFlags::TRIANGLE_CULLING)
    }

    #[inline]
    pub fn backfaces(self) -> bool {
        self.contains(CullFlags::TRIANGLE_CULLING | CullFlags::BACKFACE_CULLING)
    }

    #[inline]
    pub fn small_triangles(self) -> bool {
        self.contains(CullFlags::TRIANGLE_CULLING | CullFlags::SMALL_TRIANGLE_CULLING)
    }

    #[inline]
    pub fn lod_selection(self) -> bool {
        self.contains(CullFlags::LOD_SELECTION)
    }
}

/// Debug visualisation written to the debug attachment by the decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebugView {
    #[default]
    None,
    Triangles,
    Meshlets,
    MeshInstances,
    Lods,
    Overdraw,
    Materials,
    Depth,
}

impl DebugView {
    pub const ALL: [DebugView; 8] = [
        DebugView::None,
        DebugView::Triangles,
        DebugView::Meshlets,
        DebugView::MeshInstances,
        DebugView::Lods,
        DebugView::Overdraw,
        DebugView::Materials,
        DebugView::Depth,
    ];

    /// Value written into shader uniforms
    pub fn as_u32(self) -> u32 {
        match self {
            DebugView::None => 0,
            DebugView::Triangles => 1,
            DebugView::Meshlets => 2,
            DebugView::MeshInstances => 3,
            DebugView::Lods => 4,
            DebugView::Overdraw => 5,
            DebugView::Materials => 6,
            DebugView::Depth => 7,
        }
    }

    pub fn from_u32(value: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|view| view.as_u32() == value)
    }

    /// Overdraw is only accumulated while the heatmap is being displayed
    pub fn tracks_overdraw(self) -> bool {
        self == DebugView::Overdraw
    }
}
