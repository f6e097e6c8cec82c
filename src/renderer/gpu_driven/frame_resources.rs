//! Per-frame resource ring
//!
//! Frame `n` owns slot `n % frames_in_flight`. Nothing in a slot is read by a
//! later frame; the Hi-Z pyramid and visibility mask live outside the ring.

use crate::config::RendererConfig;
use crate::error::EngineResult;
use crate::gpu::buffer_layouts::{counter_slots, DispatchIndirectCommand, FrameCounters, IndirectDrawIndexedCommand};
use crate::renderer::gpu_culling::{CullPhase, MeshCullTargets, ShadowCascadeTargets};

use super::counters::AppendCounter;

/// Fixed set of slots handed out round-robin, one per frame in flight
#[derive(Debug)]
pub struct FrameRing<T> {
    slots: Vec<T>,
    frame_index: u64,
}

impl<T> FrameRing<T> {
    pub fn new(frames_in_flight: u32, make: impl FnMut(usize) -> T) -> Self {
        Self {
            slots: (0..frames_in_flight.max(1) as usize).map(make).collect(),
            frame_index: 0,
        }
    }

    /// Fallible slot construction, for slots holding GPU allocations
    pub fn try_new(frames_in_flight: u32, make: impl FnMut(usize) -> EngineResult<T>) -> EngineResult<Self> {
        Ok(Self {
            slots: (0..frames_in_flight.max(1) as usize)
                .map(make)
                .collect::<EngineResult<Vec<_>>>()?,
            frame_index: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Frames started so far
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    pub fn slot_index(&self) -> usize {
        (self.frame_index % self.slots.len() as u64) as usize
    }

    /// Slot of the frame being recorded
    pub fn current(&self) -> &T {
        &self.slots[self.slot_index()]
    }

    pub fn current_mut(&mut self) -> &mut T {
        let slot = self.slot_index();
        &mut self.slots[slot]
    }

    /// Slot of the most recently finished frame
    pub fn previous(&self) -> Option<&T> {
        if self.frame_index == 0 {
            return None;
        }
        let slot = ((self.frame_index - 1) % self.slots.len() as u64) as usize;
        self.slots.get(slot)
    }

    /// Retire the current frame; the next call to `current` returns the following slot
    pub fn advance(&mut self) -> usize {
        self.frame_index += 1;
        self.slot_index()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.slots.iter_mut()
    }
}

/// Transient buffers of one software frame
#[derive(Debug)]
pub struct FrameBuffers {
    pub mesh: MeshCullTargets,
    pub meshlet_counter: AppendCounter,
    pub meshlet_dispatch: DispatchIndirectCommand,
    /// Visible meshlet-instance ids per phase
    pub visible: [Vec<u32>; 2],
    pub visible_counters: [AppendCounter; 2],
    pub triangle_dispatch: [DispatchIndirectCommand; 2],
    pub indices: Vec<u32>,
    pub index_counter: AppendCounter,
    /// Index requests recorded when the early draw was finalized
    pub early_index_requests: u64,
    pub draws: [IndirectDrawIndexedCommand; 2],
    pub shadows: Vec<ShadowCascadeTargets>,
    pub covered_pixels: u32,
}

impl FrameBuffers {
    pub fn new(config: &RendererConfig) -> Self {
        let meshlets = config.max_meshlet_instances;
        Self {
            mesh: MeshCullTargets::default(),
            meshlet_counter: AppendCounter::new("meshlet instances", meshlets),
            meshlet_dispatch: DispatchIndirectCommand::for_workgroups(0),
            visible: [Vec::new(), Vec::new()],
            visible_counters: [
                AppendCounter::new("early visible meshlets", meshlets),
                AppendCounter::new("late visible meshlets", meshlets),
            ],
            triangle_dispatch: [DispatchIndirectCommand::for_workgroups(0); 2],
            indices: Vec::new(),
            index_counter: AppendCounter::new("reordered indices", config.max_reordered_indices),
            early_index_requests: 0,
            draws: [IndirectDrawIndexedCommand::reset(); 2],
            shadows: (0..config.shadow_cascade_count)
                .map(|_| ShadowCascadeTargets::new(meshlets, config.max_shadow_indices))
                .collect(),
            covered_pixels: 0,
        }
    }

    /// Zero counters and commands; list storage is kept for reuse
    pub fn reset(&mut self) {
        self.mesh.clear();
        self.meshlet_counter.reset();
        self.meshlet_dispatch = DispatchIndirectCommand::for_workgroups(0);
        for phase in CullPhase::ALL {
            self.visible[phase.index()].clear();
            self.visible_counters[phase.index()].reset();
        }
        self.triangle_dispatch = [DispatchIndirectCommand::for_workgroups(0); 2];
        self.indices.clear();
        self.index_counter.reset();
        self.early_index_requests = 0;
        self.draws = [IndirectDrawIndexedCommand::reset(); 2];
        self.shadows.iter_mut().for_each(ShadowCascadeTargets::reset);
        self.covered_pixels = 0;
    }

    pub fn draw(&self, phase: CullPhase) -> &IndirectDrawIndexedCommand {
        &self.draws[phase.index()]
    }

    pub fn visible(&self, phase: CullPhase) -> &[u32] {
        &self.visible[phase.index()]
    }

    /// Counter values in the layout the GPU counter buffer uses
    pub fn counters(&self) -> FrameCounters {
        let clamp = |value: u64| value.min(u32::MAX as u64) as u32;
        let mut counters = FrameCounters::default();
        let mut set = |slot: u32, value: u64| counters.values[slot as usize] = clamp(value);

        set(counter_slots::MESH_INSTANCES_TESTED, self.mesh.tested as u64);
        set(counter_slots::VISIBLE_MESH_INSTANCES, self.mesh.visible as u64);
        set(counter_slots::MESHLET_INSTANCES, self.meshlet_counter.requested());
        set(counter_slots::EARLY_MESHLETS, self.visible_counters[0].requested());
        set(counter_slots::LATE_MESHLETS, self.visible_counters[1].requested());
        set(counter_slots::INDICES, self.index_counter.requested());
        set(counter_slots::EARLY_INDICES, self.early_index_requests);
        for (cascade, shadow) in self.shadows.iter().enumerate() {
            let cascade = cascade as u32;
            set(counter_slots::SHADOW_MESHLETS_BASE + cascade, shadow.meshlet_counter.requested());
            set(counter_slots::SHADOW_INDICES_BASE + cascade, shadow.index_counter.requested());
        }
        counters
    }

    /// Draw commands in draw-slot order: early, late, then one per cascade
    pub fn draw_commands(&self) -> Vec<IndirectDrawIndexedCommand> {
        self.draws
            .iter()
            .copied()
            .chain(self.shadows.iter().map(|shadow| shadow.draw))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_cycles_slots() {
        let mut ring = FrameRing::new(3, |slot| slot * 10);
        assert_eq!(*ring.current(), 0);
        assert!(ring.previous().is_none());

        ring.advance();
        assert_eq!(*ring.current(), 10);
        assert_eq!(ring.previous(), Some(&0));

        ring.advance();
        ring.advance();
        assert_eq!(ring.frame_index(), 3);
        assert_eq!(*ring.current(), 0);
        assert_eq!(ring.previous(), Some(&20));
    }

    #[test]
    fn test_ring_never_empty() {
        let ring = FrameRing::new(0, |_| ());
        assert_eq!(ring.len(), 1);
    }

    #[test]
    fn test_try_new_propagates_errors() {
        let result: EngineResult<FrameRing<u32>> = FrameRing::try_new(2, |slot| {
            if slot == 1 {
                Err(crate::error::EngineError::resource("slot", "out of memory"))
            } else {
                Ok(0)
            }
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_counters_mirror_gpu_layout() {
        let config = RendererConfig {
            max_meshlet_instances: 4,
            shadow_cascade_count: 1,
            ..Default::default()
        };
        let mut frame = FrameBuffers::new(&config);
        frame.meshlet_counter.reserve(6);
        frame.visible_counters[1].reserve(2);
        frame.shadows[0].index_counter.reserve(9);

        let counters = frame.counters();
        assert_eq!(counters.get(counter_slots::MESHLET_INSTANCES), 6);
        assert_eq!(counters.get(counter_slots::LATE_MESHLETS), 2);
        assert_eq!(counters.shadow_indices(0), 9);
        assert_eq!(frame.draw_commands().len(), 3);

        frame.reset();
        assert_eq!(frame.counters(), FrameCounters::default());
    }
}
