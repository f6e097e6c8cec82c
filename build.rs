//! Build script for generating the WGSL constant prelude from src/constants.rs

use std::{env, fs, path::Path};

#[allow(dead_code)]
#[path = "src/constants.rs"]
mod constants;

use constants::{culling, meshlets, packing, workgroups};

fn main() {
    println!("cargo:rerun-if-changed=src/constants.rs");
    println!("cargo:rerun-if-changed=build.rs");

    let out_dir = env::var("OUT_DIR").expect("OUT_DIR is set by cargo");
    let prelude_path = Path::new(&out_dir).join("constants.wgsl");

    fs::write(&prelude_path, generate_wgsl_constants())
        .expect("Failed to write generated WGSL constants");
}

/// Generate WGSL constant definitions
fn generate_wgsl_constants() -> String {
    format!(
        r#"// AUTO-GENERATED - DO NOT EDIT
// Generated from src/constants.rs by build.rs

const CULL_WORKGROUP_SIZE: u32 = {cull_wg}u;
const TRIANGLE_WORKGROUP_SIZE: u32 = {tri_wg}u;
const HIZ_TILE_SIZE: u32 = {hiz_tile}u;
const MAX_DISPATCH_DIMENSION: u32 = {max_dim}u;

const MAX_MESHLET_VERTICES: u32 = {max_verts}u;
const MAX_MESHLET_TRIANGLES: u32 = {max_tris}u;

const INDEX_TRIANGLE_SHIFT: u32 = {tri_shift}u;
const INDEX_MESHLET_SHIFT: u32 = {meshlet_shift}u;
const INDEX_CORNER_MASK: u32 = {corner_mask}u;
const INDEX_TRIANGLE_MASK: u32 = {tri_mask}u;

const VISIBILITY_TRIANGLE_BITS: u32 = {vis_bits}u;
const VISIBILITY_TRIANGLE_MASK: u32 = {vis_mask}u;
const VISIBILITY_EMPTY: u32 = {vis_empty}u;

const NEAR_W_EPSILON: f32 = {near_eps:e};
const MIN_LOD_DISTANCE: f32 = {min_lod:e};
"#,
        cull_wg = workgroups::CULL_WORKGROUP_SIZE,
        tri_wg = workgroups::TRIANGLE_WORKGROUP_SIZE,
        hiz_tile = workgroups::HIZ_TILE_SIZE,
        max_dim = workgroups::MAX_DISPATCH_DIMENSION,
        max_verts = meshlets::MAX_MESHLET_VERTICES,
        max_tris = meshlets::MAX_MESHLET_TRIANGLES,
        tri_shift = packing::INDEX_TRIANGLE_SHIFT,
        meshlet_shift = packing::INDEX_MESHLET_SHIFT,
        corner_mask = packing::INDEX_CORNER_MASK,
        tri_mask = packing::INDEX_TRIANGLE_MASK,
        vis_bits = packing::VISIBILITY_TRIANGLE_BITS,
        vis_mask = packing::VISIBILITY_TRIANGLE_MASK,
        vis_empty = packing::VISIBILITY_EMPTY,
        near_eps = culling::NEAR_W_EPSILON,
        min_lod = culling::MIN_LOD_DISTANCE,
    )
}
