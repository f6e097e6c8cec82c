//! Append counters with preallocated capacity
//!
//! Mirrors the GPU `atomicAdd` protocol: every request bumps the counter, but
//! only slots below capacity are handed out. The counter therefore records how
//! much space the frame actually needed, and overflow is detected afterwards
//! without any write landing out of bounds.

use std::ops::Range;

use crate::error::EngineError;

#[derive(Debug, Clone)]
pub struct AppendCounter {
    label: &'static str,
    capacity: u32,
    requested: u64,
}

impl AppendCounter {
    pub fn new(label: &'static str, capacity: u32) -> Self {
        Self {
            label,
            capacity,
            requested: 0,
        }
    }

    pub fn reset(&mut self) {
        self.requested = 0;
    }

    /// Request `count` consecutive slots; returns the part that fits
    pub fn reserve(&mut self, count: u32) -> Range<u32> {
        let start = self.requested;
        self.requested += count as u64;
        let end = self.requested.min(self.capacity as u64);
        let start = start.min(end);
        start as u32..end as u32
    }

    /// Request `count` slots all-or-nothing
    pub fn reserve_exact(&mut self, count: u32) -> Option<u32> {
        let range = self.reserve(count);
        (range.len() == count as usize).then_some(range.start)
    }

    /// Entries actually stored
    pub fn count(&self) -> u32 {
        self.requested.min(self.capacity as u64) as u32
    }

    pub fn requested(&self) -> u64 {
        self.requested
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn overflowed(&self) -> bool {
        self.requested > self.capacity as u64
    }

    pub fn overflow_error(&self) -> Option<EngineError> {
        self.overflowed()
            .then(|| EngineError::capacity(self.label, self.capacity as u64, self.requested))
    }
}

/// Record of one capacity overflow, kept in the frame report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapacityDiagnostic {
    pub buffer: String,
    pub capacity: u64,
    pub requested: u64,
}

impl CapacityDiagnostic {
    pub fn new(buffer: impl Into<String>, capacity: u64, requested: u64) -> Option<Self> {
        (requested > capacity).then(|| Self {
            buffer: buffer.into(),
            capacity,
            requested,
        })
    }

    pub fn to_error(&self) -> EngineError {
        EngineError::CapacityExceeded {
            buffer: self.buffer.clone(),
            capacity: self.capacity,
            requested: self.requested,
        }
    }
}
