//! Embedded WGSL sources and `#include` resolution
//!
//! Shaders are compiled into the binary so pipelines never depend on the
//! working directory. `constants.wgsl` is generated by build.rs from
//! `src/constants.rs`.

use rustc_hash::FxHashSet;

use crate::error::{EngineError, EngineResult};

pub const CONSTANTS_WGSL: &str = include_str!(concat!(env!("OUT_DIR"), "/constants.wgsl"));
pub const COMMON_WGSL: &str = include_str!("shaders/common.wgsl");
pub const SCENE_WGSL: &str = include_str!("shaders/scene.wgsl");

pub const COMMANDS_WGSL: &str = include_str!("shaders/commands.wgsl");
pub const MESH_CULL_WGSL: &str = include_str!("shaders/mesh_cull.wgsl");
pub const MESHLET_CULL_WGSL: &str = include_str!("shaders/meshlet_cull.wgsl");
pub const TRIANGLE_CULL_WGSL: &str = include_str!("shaders/triangle_cull.wgsl");
pub const VISIBILITY_WGSL: &str = include_str!("shaders/visibility.wgsl");
pub const DECODE_WGSL: &str = include_str!("shaders/decode.wgsl");
pub const HIZ_COPY_WGSL: &str = include_str!("shaders/hiz_copy.wgsl");
pub const HIZ_DOWNSAMPLE_WGSL: &str = include_str!("shaders/hiz_downsample.wgsl");

/// Every pass shader, by label
pub const PASS_SHADERS: [(&str, &str); 8] = [
    ("commands", COMMANDS_WGSL),
    ("mesh_cull", MESH_CULL_WGSL),
    ("meshlet_cull", MESHLET_CULL_WGSL),
    ("triangle_cull", TRIANGLE_CULL_WGSL),
    ("visibility", VISIBILITY_WGSL),
    ("decode", DECODE_WGSL),
    ("hiz_copy", HIZ_COPY_WGSL),
    ("hiz_downsample", HIZ_DOWNSAMPLE_WGSL),
];

/// Get shader include content by name
pub fn get_shader_include(name: &str) -> Option<&'static str> {
    match name {
        "constants.wgsl" | "generated/constants.wgsl" => Some(CONSTANTS_WGSL),
        "common.wgsl" => Some(COMMON_WGSL),
        "scene.wgsl" => Some(SCENE_WGSL),
        _ => None,
    }
}

/// Resolve `#include "name"` lines against the embedded table.
///
/// Each include is expanded at most once.
pub fn compose(label: &str, source: &str) -> EngineResult<String> {
    let mut included = FxHashSet::default();
    let mut output = String::with_capacity(
        source.len() + SCENE_WGSL.len() + COMMON_WGSL.len() + CONSTANTS_WGSL.len(),
    );
    expand(label, source, &mut included, &mut output)?;
    Ok(output)
}

fn expand(
    label: &str,
    source: &str,
    included: &mut FxHashSet<&'static str>,
    output: &mut String,
) -> EngineResult<()> {
    for line in source.lines() {
        let Some(name) = parse_include_directive(line) else {
            output.push_str(line);
            output.push('\n');
            continue;
        };

        let content = get_shader_include(name).ok_or_else(|| {
            EngineError::resource(format!("shader '{label}'"), format!("unknown include {name}"))
        })?;
        if included.insert(content) {
            expand(label, content, included, output)?;
        }
    }
    Ok(())
}

fn parse_include_directive(line: &str) -> Option<&str> {
    let rest = line.trim().strip_prefix("#include")?.trim();
    rest.strip_prefix('"')
        .and_then(|r| r.strip_suffix('"'))
        .or_else(|| rest.strip_prefix('<').and_then(|r| r.strip_suffix('>')))
}

/// Compose and compile a shader module
pub fn create_shader_module(
    device: &wgpu::Device,
    label: &str,
    source: &str,
) -> EngineResult<wgpu::ShaderModule> {
    let composed = compose(label, source)?;
    Ok(device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(composed.into()),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::workgroups;
    use crate::constants::culling::MAX_SHADOW_CASCADES;
    use crate::gpu::buffer_layouts::{counter_slots, slots};
    use crate::renderer::flags::{CullFlags, DebugView};

    #[test]
    fn test_includes_are_resolved_once() {
        let composed = compose(
            "test",
            "#include \"common.wgsl\"\n#include <common.wgsl>\nfn main() {}\n",
        )
        .unwrap();
        assert!(!composed.contains("#include"));
        assert_eq!(composed.matches("struct ViewUniform").count(), 1);
        assert!(composed.contains("const CULL_WORKGROUP_SIZE"));
    }

    #[test]
    fn test_scene_include_pulls_in_common() {
        let composed = compose("test", "#include \"scene.wgsl\"\n#include \"common.wgsl\"\n").unwrap();
        assert_eq!(composed.matches("struct ViewUniform").count(), 1);
        assert_eq!(composed.matches("var<uniform> view").count(), 1);
    }

    #[test]
    fn test_unknown_include_fails() {
        assert!(compose("test", "#include \"missing.wgsl\"").is_err());
    }

    #[test]
    fn test_flag_and_slot_constants_match() {
        let pairs = [
            ("CULL_FRUSTUM", CullFlags::FRUSTUM_CULLING.bits()),
            ("CULL_OCCLUSION", CullFlags::OCCLUSION_CULLING.bits()),
            ("CULL_TRIANGLES", CullFlags::TRIANGLE_CULLING.bits()),
            ("CULL_BACKFACES", CullFlags::BACKFACE_CULLING.bits()),
            ("CULL_SMALL_TRIANGLES", CullFlags::SMALL_TRIANGLE_CULLING.bits()),
            ("CULL_LOD", CullFlags::LOD_SELECTION.bits()),
            ("DEBUG_TRIANGLES", DebugView::Triangles.as_u32()),
            ("DEBUG_MESHLETS", DebugView::Meshlets.as_u32()),
            ("DEBUG_MESH_INSTANCES", DebugView::MeshInstances.as_u32()),
            ("DEBUG_LODS", DebugView::Lods.as_u32()),
            ("DEBUG_OVERDRAW", DebugView::Overdraw.as_u32()),
            ("DEBUG_MATERIALS", DebugView::Materials.as_u32()),
            ("DEBUG_DEPTH", DebugView::Depth.as_u32()),
            ("COUNTER_MESHLET_INSTANCES", counter_slots::MESHLET_INSTANCES),
            ("COUNTER_INDICES", counter_slots::INDICES),
            ("COUNTER_EARLY_INDICES", counter_slots::EARLY_INDICES),
            ("COUNTER_VISIBLE_MESH_INSTANCES", counter_slots::VISIBLE_MESH_INSTANCES),
            ("COUNTER_MESH_INSTANCES_TESTED", counter_slots::MESH_INSTANCES_TESTED),
            ("COUNTER_COUNT", counter_slots::COUNT as u32),
            ("DISPATCH_MESHLETS", slots::DISPATCH_MESHLETS),
            ("DISPATCH_SLOT_COUNT", slots::DISPATCH_SHADOW_BASE + MAX_SHADOW_CASCADES),
            ("DRAW_SLOT_COUNT", slots::DRAW_SHADOW_BASE + MAX_SHADOW_CASCADES),
        ];
        for (name, value) in pairs {
            let declaration = format!("const {name}: u32 = {value}u;");
            assert!(COMMON_WGSL.contains(&declaration), "missing `{declaration}`");
        }
    }

    #[test]
    fn test_workgroup_sizes_match() {
        assert!(MESH_CULL_WGSL.contains(&format!("@workgroup_size({})", workgroups::CULL_WORKGROUP_SIZE)));
        assert!(MESHLET_CULL_WGSL.contains(&format!("@workgroup_size({})", workgroups::CULL_WORKGROUP_SIZE)));
        assert!(TRIANGLE_CULL_WGSL
            .contains(&format!("@workgroup_size({})", workgroups::TRIANGLE_WORKGROUP_SIZE)));
        let tile = workgroups::HIZ_TILE_SIZE;
        assert!(HIZ_DOWNSAMPLE_WGSL.contains(&format!("@workgroup_size({tile}, {tile})")));
    }

    #[test]
    fn test_pass_shaders_validate() {
        for (label, source) in PASS_SHADERS {
            let composed = compose(label, source).unwrap();
            let module = naga::front::wgsl::parse_str(&composed)
                .unwrap_or_else(|e| panic!("{label}: {}", e.emit_to_string(&composed)));
            naga::valid::Validator::new(
                naga::valid::ValidationFlags::all(),
                naga::valid::Capabilities::all(),
            )
            .validate(&module)
            .unwrap_or_else(|e| panic!("{label}: {e:?}"));
        }
    }
}
