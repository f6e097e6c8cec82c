//! Tests for GPU buffer layouts

use std::mem;

use glam::{Mat4, UVec2, Vec3};

use super::scene::pack_bytes;
use super::*;
use crate::config::BoundsPolicy;
use crate::scene::ViewParams;

#[test]
fn test_buffer_sizes() {
    assert_eq!(mem::size_of::<GpuMeshInstance>(), 32);
    assert_eq!(mem::size_of::<GpuMesh>(), 32);
    assert_eq!(mem::size_of::<GpuMeshLod>(), 16);
    assert_eq!(mem::size_of::<GpuMeshlet>(), 32);
    assert_eq!(mem::size_of::<GpuVertex>(), 32);
    assert_eq!(mem::size_of::<GpuMaterial>(), 48);
    assert_eq!(mem::size_of::<ViewUniform>(), 272);
    assert_eq!(mem::size_of::<PassLimits>(), 32);
    assert_eq!(mem::size_of::<FrameCounters>(), 64);
    assert_eq!(mem::size_of::<IndirectDrawIndexedCommand>(), 20);
    assert_eq!(mem::size_of::<DispatchIndirectCommand>(), 12);
}

#[test]
fn test_uniform_sizes_are_16_byte_multiples() {
    assert_eq!(mem::size_of::<ViewUniform>() % 16, 0);
    assert_eq!(mem::size_of::<PassLimits>() % 16, 0);
}

#[test]
fn test_dispatch_folds_into_second_dimension() {
    let small = DispatchIndirectCommand::for_items(130, 64);
    assert_eq!(small, DispatchIndirectCommand::new(3, 1, 1));

    let empty = DispatchIndirectCommand::for_items(0, 64);
    assert_eq!(empty.workgroup_count(), 0);

    let large = DispatchIndirectCommand::for_workgroups(70_000);
    assert_eq!(large.workgroups_x, 65_535);
    assert_eq!(large.workgroups_y, 2);
    assert!(large.workgroup_count() >= 70_000);
}

#[test]
fn test_triangle_bytes_pack_little_endian() {
    let words = pack_bytes(&[1, 2, 3, 4, 5]);
    assert_eq!(words, vec![0x0403_0201, 0x0000_0005]);
}

#[test]
fn test_view_uniform_flags() {
    let view = ViewParams::new(Mat4::IDENTITY, Vec3::ZERO, UVec2::new(320, 200));
    let uniform = ViewUniform::new(&view, BoundsPolicy::FailOpen, 9, false);
    assert_eq!(uniform.resolution, [320, 200]);
    assert_eq!(uniform.hiz_valid, 0);
    assert_eq!(uniform.bounds_fail_open, 1);
    assert_eq!(uniform.cull_flags, view.cull_flags.bits());
}

#[test]
fn test_mask_words() {
    assert_eq!(calculations::mask_words(0), 1);
    assert_eq!(calculations::mask_words(32), 1);
    assert_eq!(calculations::mask_words(33), 2);
}
