//! Indirect command and counter buffer layouts

use bytemuck::{Pod, Zeroable};

use crate::constants::workgroups::MAX_DISPATCH_DIMENSION;

/// Arguments of `draw_indexed_indirect`, filled by `begin_draw`/`finalize_draw`.
///
/// Each phase and cascade owns one of these in the frame's draw buffer; the
/// index range selects its slice of the reordered index buffer.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct IndirectDrawIndexedCommand {
    pub index_count: u32,

    /// Always 1: every triangle of a frame lives in one instance
    pub instance_count: u32,

    /// End of the previous phase's indices
    pub first_index: u32,

    /// Packed indices are decoded in the vertex stage, so these stay 0
    pub base_vertex: i32,
    pub first_instance: u32,
}

impl IndirectDrawIndexedCommand {
    /// Empty draw as written by the frame reset
    pub fn reset() -> Self {
        Self {
            instance_count: 1,
            ..Default::default()
        }
    }

    pub fn new(first_index: u32, index_count: u32) -> Self {
        Self {
            index_count,
            instance_count: 1,
            first_index,
            base_vertex: 0,
            first_instance: 0,
        }
    }

    pub fn index_range(&self) -> std::ops::Range<usize> {
        self.first_index as usize..(self.first_index + self.index_count) as usize
    }
}

/// Workgroup counts of an indirect compute dispatch
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct DispatchIndirectCommand {
    pub workgroups_x: u32,
    pub workgroups_y: u32,
    pub workgroups_z: u32,
}

impl DispatchIndirectCommand {
    pub fn new(x: u32, y: u32, z: u32) -> Self {
        Self {
            workgroups_x: x,
            workgroups_y: y,
            workgroups_z: z,
        }
    }

    /// Cover `groups` workgroups, folding into Y once X exceeds the per-dimension limit.
    ///
    /// Shaders linearize with `id.y * MAX_DISPATCH_DIMENSION + id.x` and drop the tail.
    pub fn for_workgroups(groups: u32) -> Self {
        if groups == 0 {
            return Self::new(0, 1, 1);
        }
        if groups <= MAX_DISPATCH_DIMENSION {
            return Self::new(groups, 1, 1);
        }
        Self::new(MAX_DISPATCH_DIMENSION, groups.div_ceil(MAX_DISPATCH_DIMENSION), 1)
    }

    /// One invocation per item with `group_size` invocations per workgroup
    pub fn for_items(items: u32, group_size: u32) -> Self {
        Self::for_workgroups(items.div_ceil(group_size))
    }

    pub fn workgroup_count(&self) -> u64 {
        self.workgroups_x as u64 * self.workgroups_y as u64 * self.workgroups_z as u64
    }
}

/// Indices into `FrameCounters::values`
pub mod counter_slots {
    /// Meshlet instances requested by mesh culling (may exceed capacity)
    pub const MESHLET_INSTANCES: u32 = 0;
    pub const EARLY_MESHLETS: u32 = 1;
    pub const LATE_MESHLETS: u32 = 2;
    /// Reordered indices requested across both phases of the main view
    pub const INDICES: u32 = 3;
    /// Value of `INDICES` when the early draw was finalized
    pub const EARLY_INDICES: u32 = 4;
    pub const VISIBLE_MESH_INSTANCES: u32 = 5;
    pub const MESH_INSTANCES_TESTED: u32 = 6;
    pub const SHADOW_MESHLETS_BASE: u32 = 8;
    pub const SHADOW_INDICES_BASE: u32 = 12;
    pub const COUNT: usize = 16;
}

/// Every atomic counter of one frame
/// Total size: 64 bytes
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct FrameCounters {
    pub values: [u32; counter_slots::COUNT],
}

impl FrameCounters {
    #[inline]
    pub fn get(&self, slot: u32) -> u32 {
        self.values[slot as usize]
    }

    pub fn shadow_meshlets(&self, cascade: u32) -> u32 {
        self.get(counter_slots::SHADOW_MESHLETS_BASE + cascade)
    }

    pub fn shadow_indices(&self, cascade: u32) -> u32 {
        self.get(counter_slots::SHADOW_INDICES_BASE + cascade)
    }
}
