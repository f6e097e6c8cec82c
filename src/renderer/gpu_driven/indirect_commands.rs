//! Indirect draw construction from append counters
//!
//! Both phases of the main view share one index buffer and one counter. The
//! early draw starts at zero; the late draw starts wherever the early phase
//! stopped, so the two draws never overlap.

use crate::gpu::buffer_layouts::{DispatchIndirectCommand, IndirectDrawIndexedCommand};

use super::counters::AppendCounter;

/// Open a draw at the counter's current (clamped) position
pub fn begin_draw(counter: &AppendCounter) -> IndirectDrawIndexedCommand {
    IndirectDrawIndexedCommand::new(counter.count(), 0)
}

/// Close a draw at the counter's current (clamped) position
pub fn finalize_draw(draw: &mut IndirectDrawIndexedCommand, counter: &AppendCounter) {
    draw.index_count = counter.count().saturating_sub(draw.first_index);
}

/// Dispatch covering the stored entries of a meshlet-instance list
pub fn meshlet_dispatch(counter: &AppendCounter, group_size: u32) -> DispatchIndirectCommand {
    DispatchIndirectCommand::for_items(counter.count(), group_size)
}

/// One workgroup per stored visible meshlet
pub fn triangle_dispatch(counter: &AppendCounter) -> DispatchIndirectCommand {
    DispatchIndirectCommand::for_workgroups(counter.count())
}
