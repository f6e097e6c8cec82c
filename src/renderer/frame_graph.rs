//! Frame schedule: which passes run, in which order, touching which resources
//!
//! Passes only declare bindings. Ordering constraints between them are derived
//! from those declarations, and the schedule is rejected up front when a pass
//! would read a per-frame resource nothing has produced yet.

use std::fmt;

use rustc_hash::FxHashMap;

use crate::error::{EngineError, EngineResult};
use crate::renderer::gpu_culling::CullPhase;

/// Named resources a pass can bind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceId {
    SceneTables,
    ViewUniforms,
    Counters,
    MeshletInstances,
    MeshletDispatch,
    InstanceLods,
    VisibilityMask,
    VisibleMeshlets(CullPhase),
    TriangleDispatch(CullPhase),
    IndexBuffer,
    DrawCommands,
    VisibilityTarget,
    DepthTarget,
    OverdrawTarget,
    HiZPyramid,
    GBufferAlbedo,
    GBufferNormal,
    GBufferEmissive,
    GBufferMetallicRoughness,
    DebugTarget,
    ShadowMeshlets(u32),
    ShadowDispatch(u32),
    ShadowIndices(u32),
    ShadowDraw(u32),
    ShadowMap(u32),
}

/// How long a resource's contents stay meaningful
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceLifetime {
    /// Provided by the scene collaborator before the frame starts
    External,
    /// Read by the next frame before this frame overwrites it
    CrossFrame,
    /// Written and consumed within one frame
    Transient,
}

impl ResourceId {
    pub fn lifetime(self) -> ResourceLifetime {
        match self {
            ResourceId::SceneTables | ResourceId::ViewUniforms => ResourceLifetime::External,
            ResourceId::HiZPyramid | ResourceId::VisibilityMask => ResourceLifetime::CrossFrame,
            _ => ResourceLifetime::Transient,
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceId::VisibleMeshlets(phase) => write!(f, "VisibleMeshlets[{phase:?}]"),
            ResourceId::TriangleDispatch(phase) => write!(f, "TriangleDispatch[{phase:?}]"),
            ResourceId::ShadowMeshlets(c) => write!(f, "ShadowMeshlets[{c}]"),
            ResourceId::ShadowDispatch(c) => write!(f, "ShadowDispatch[{c}]"),
            ResourceId::ShadowIndices(c) => write!(f, "ShadowIndices[{c}]"),
            ResourceId::ShadowDraw(c) => write!(f, "ShadowDraw[{c}]"),
            ResourceId::ShadowMap(c) => write!(f, "ShadowMap[{c}]"),
            other => write!(f, "{other:?}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
    ReadWrite,
}

impl Access {
    pub fn reads(self) -> bool {
        matches!(self, Access::Read | Access::ReadWrite)
    }

    pub fn writes(self) -> bool {
        matches!(self, Access::Write | Access::ReadWrite)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceBinding {
    pub resource: ResourceId,
    pub access: Access,
}

/// Pass kinds, in the order a frame normally runs them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassKind {
    ResetFrame,
    MeshCull,
    PrepareMeshletDispatch,
    MeshletCull(CullPhase),
    PrepareTriangleDispatch(CullPhase),
    BeginDraw(CullPhase),
    TriangleCull(CullPhase),
    FinalizeDraw(CullPhase),
    VisibilityEncode(CullPhase),
    HiZBuild,
    VisibilityDecode,
    ShadowMeshletCull(u32),
    ShadowTriangleCull(u32),
    ShadowRaster(u32),
}

impl PassKind {
    pub fn name(self) -> String {
        match self {
            PassKind::MeshletCull(p) => format!("MeshletCull{{{p:?}}}"),
            PassKind::PrepareTriangleDispatch(p) => format!("PrepareTriangleDispatch{{{p:?}}}"),
            PassKind::BeginDraw(p) => format!("BeginDraw{{{p:?}}}"),
            PassKind::TriangleCull(p) => format!("TriangleCull{{{p:?}}}"),
            PassKind::FinalizeDraw(p) => format!("FinalizeDraw{{{p:?}}}"),
            PassKind::VisibilityEncode(p) => format!("VisibilityEncode{{{p:?}}}"),
            PassKind::ShadowMeshletCull(c) => format!("ShadowMeshletCull{{{c}}}"),
            PassKind::ShadowTriangleCull(c) => format!("ShadowTriangleCull{{{c}}}"),
            PassKind::ShadowRaster(c) => format!("ShadowRaster{{{c}}}"),
            other => format!("{other:?}"),
        }
    }

    /// Bindings declared by each pass kind
    pub fn bindings(self, cascade_count: u32) -> Vec<ResourceBinding> {
        use Access::*;
        use ResourceId::*;

        let bind = |resource, access| ResourceBinding { resource, access };
        match self {
            PassKind::ResetFrame => {
                let mut bindings = vec![
                    bind(Counters, Write),
                    bind(DrawCommands, Write),
                    bind(VisibilityMask, Write),
                ];
                bindings.extend((0..cascade_count).map(|c| bind(ShadowDraw(c), Write)));
                bindings
            }
            PassKind::MeshCull => vec![
                bind(SceneTables, Read),
                bind(ViewUniforms, Read),
                bind(Counters, ReadWrite),
                bind(MeshletInstances, Write),
                bind(InstanceLods, Write),
            ],
            PassKind::PrepareMeshletDispatch => {
                vec![bind(Counters, Read), bind(MeshletDispatch, Write)]
            }
            PassKind::MeshletCull(phase) => vec![
                bind(SceneTables, Read),
                bind(ViewUniforms, Read),
                bind(MeshletDispatch, Read),
                bind(MeshletInstances, Read),
                bind(HiZPyramid, Read),
                bind(
                    VisibilityMask,
                    match phase {
                        CullPhase::Early => ReadWrite,
                        CullPhase::Late => Read,
                    },
                ),
                bind(Counters, ReadWrite),
                bind(VisibleMeshlets(phase), Write),
            ],
            PassKind::PrepareTriangleDispatch(phase) => {
                vec![bind(Counters, Read), bind(TriangleDispatch(phase), Write)]
            }
            PassKind::BeginDraw(_) | PassKind::FinalizeDraw(_) => {
                vec![bind(Counters, Read), bind(DrawCommands, ReadWrite)]
            }
            PassKind::TriangleCull(phase) => vec![
                bind(SceneTables, Read),
                bind(ViewUniforms, Read),
                bind(TriangleDispatch(phase), Read),
                bind(VisibleMeshlets(phase), Read),
                bind(MeshletInstances, Read),
                bind(Counters, ReadWrite),
                bind(IndexBuffer, Write),
            ],
            PassKind::VisibilityEncode(phase) => {
                let target_access = match phase {
                    CullPhase::Early => Write,
                    CullPhase::Late => ReadWrite,
                };
                vec![
                    bind(SceneTables, Read),
                    bind(ViewUniforms, Read),
                    bind(MeshletInstances, Read),
                    bind(IndexBuffer, Read),
                    bind(DrawCommands, Read),
                    bind(VisibilityTarget, target_access),
                    bind(DepthTarget, target_access),
                    bind(OverdrawTarget, target_access),
                ]
            }
            PassKind::HiZBuild => vec![bind(DepthTarget, Read), bind(HiZPyramid, Write)],
            PassKind::VisibilityDecode => vec![
                bind(SceneTables, Read),
                bind(ViewUniforms, Read),
                bind(VisibilityTarget, Read),
                bind(DepthTarget, Read),
                bind(OverdrawTarget, Read),
                bind(InstanceLods, Read),
                bind(GBufferAlbedo, Write),
                bind(GBufferNormal, Write),
                bind(GBufferEmissive, Write),
                bind(GBufferMetallicRoughness, Write),
                bind(DebugTarget, Write),
            ],
            PassKind::ShadowMeshletCull(c) => vec![
                bind(SceneTables, Read),
                bind(ViewUniforms, Read),
                bind(MeshletDispatch, Read),
                bind(MeshletInstances, Read),
                bind(Counters, ReadWrite),
                bind(ShadowMeshlets(c), Write),
                bind(ShadowDispatch(c), Write),
            ],
            PassKind::ShadowTriangleCull(c) => vec![
                bind(SceneTables, Read),
                bind(ViewUniforms, Read),
                bind(ShadowDispatch(c), Read),
                bind(ShadowMeshlets(c), Read),
                bind(MeshletInstances, Read),
                bind(Counters, ReadWrite),
                bind(ShadowIndices(c), Write),
                bind(ShadowDraw(c), ReadWrite),
            ],
            PassKind::ShadowRaster(c) => vec![
                bind(SceneTables, Read),
                bind(ViewUniforms, Read),
                bind(MeshletInstances, Read),
                bind(ShadowIndices(c), Read),
                bind(ShadowDraw(c), Read),
                bind(ShadowMap(c), Write),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PassDesc {
    pub kind: PassKind,
    pub name: String,
    pub bindings: Vec<ResourceBinding>,
}

impl PassDesc {
    pub fn new(kind: PassKind, cascade_count: u32) -> Self {
        Self {
            kind,
            name: kind.name(),
            bindings: kind.bindings(cascade_count),
        }
    }

    pub fn access(&self, resource: ResourceId) -> Option<Access> {
        self.bindings
            .iter()
            .find(|b| b.resource == resource)
            .map(|b| b.access)
    }
}

/// Kind of ordering constraint between two passes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hazard {
    ReadAfterWrite,
    WriteAfterWrite,
    WriteAfterRead,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dependency {
    pub before: usize,
    pub after: usize,
    pub resource: ResourceId,
    pub hazard: Hazard,
}

/// Validated, ordered pass list for one frame
#[derive(Debug, Clone)]
pub struct FrameSchedule {
    passes: Vec<PassDesc>,
    cascade_count: u32,
}

impl FrameSchedule {
    /// Standard frame: two-phase main view followed by `cascade_count` shadow cascades
    pub fn build(cascade_count: u32) -> EngineResult<Self> {
        let mut kinds = vec![
            PassKind::ResetFrame,
            PassKind::MeshCull,
            PassKind::PrepareMeshletDispatch,
        ];
        kinds.extend(phase_chain(CullPhase::Early));
        kinds.push(PassKind::VisibilityEncode(CullPhase::Early));
        kinds.push(PassKind::HiZBuild);
        kinds.extend(phase_chain(CullPhase::Late));
        kinds.push(PassKind::VisibilityEncode(CullPhase::Late));
        kinds.push(PassKind::VisibilityDecode);
        for c in 0..cascade_count {
            kinds.push(PassKind::ShadowMeshletCull(c));
            kinds.push(PassKind::ShadowTriangleCull(c));
            kinds.push(PassKind::ShadowRaster(c));
        }

        let passes = kinds
            .into_iter()
            .map(|kind| PassDesc::new(kind, cascade_count))
            .collect();
        Self::from_passes(passes, cascade_count)
    }

    /// Validate an arbitrary pass list
    pub fn from_passes(passes: Vec<PassDesc>, cascade_count: u32) -> EngineResult<Self> {
        let schedule = Self {
            passes,
            cascade_count,
        };
        schedule.validate()?;
        log::debug!(
            "[FrameSchedule::from_passes] {} passes, {} dependencies",
            schedule.passes.len(),
            schedule.dependencies().len()
        );
        Ok(schedule)
    }

    pub fn passes(&self) -> &[PassDesc] {
        &self.passes
    }

    pub fn cascade_count(&self) -> u32 {
        self.cascade_count
    }

    pub fn position(&self, kind: PassKind) -> Option<usize> {
        self.passes.iter().position(|p| p.kind == kind)
    }

    /// Reject transient reads that no earlier pass has written
    pub fn validate(&self) -> EngineResult<()> {
        let mut written: FxHashMap<ResourceId, usize> = FxHashMap::default();

        for (index, pass) in self.passes.iter().enumerate() {
            for binding in &pass.bindings {
                if binding.access.reads()
                    && binding.resource.lifetime() == ResourceLifetime::Transient
                    && !written.contains_key(&binding.resource)
                {
                    return Err(EngineError::ScheduleViolation {
                        pass: pass.name.clone(),
                        resource: binding.resource.to_string(),
                        reason: "read before any pass in the frame wrote it".to_string(),
                    });
                }
            }
            for binding in pass.bindings.iter().filter(|b| b.access.writes()) {
                written.insert(binding.resource, index);
            }
        }
        Ok(())
    }

    /// Every ordering constraint implied by the declared bindings
    pub fn dependencies(&self) -> Vec<Dependency> {
        let mut dependencies = Vec::new();
        for (after, later) in self.passes.iter().enumerate() {
            for (before, earlier) in self.passes[..after].iter().enumerate() {
                for binding in &later.bindings {
                    let Some(previous) = earlier.access(binding.resource) else {
                        continue;
                    };
                    let hazard = if previous.writes() && binding.access.reads() {
                        Hazard::ReadAfterWrite
                    } else if previous.writes() && binding.access.writes() {
                        Hazard::WriteAfterWrite
                    } else if previous.reads() && binding.access.writes() {
                        Hazard::WriteAfterRead
                    } else {
                        continue;
                    };
                    dependencies.push(Dependency {
                        before,
                        after,
                        resource: binding.resource,
                        hazard,
                    });
                }
            }
        }
        dependencies
    }

    /// Whether two passes may run in either order
    pub fn independent(&self, a: usize, b: usize) -> bool {
        let (Some(first), Some(second)) = (self.passes.get(a), self.passes.get(b)) else {
            return false;
        };
        !first.bindings.iter().any(|binding| {
            second
                .access(binding.resource)
                .is_some_and(|other| binding.access.writes() || other.writes())
        })
    }
}

fn phase_chain(phase: CullPhase) -> [PassKind; 5] {
    [
        PassKind::MeshletCull(phase),
        PassKind::PrepareTriangleDispatch(phase),
        PassKind::BeginDraw(phase),
        PassKind::TriangleCull(phase),
        PassKind::FinalizeDraw(phase),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_schedule_order() {
        let schedule = FrameSchedule::build(2).unwrap();
        let early = schedule.position(PassKind::MeshletCull(CullPhase::Early)).unwrap();
        let hiz = schedule.position(PassKind::HiZBuild).unwrap();
        let late = schedule.position(PassKind::MeshletCull(CullPhase::Late)).unwrap();
        let encode = schedule
            .position(PassKind::VisibilityEncode(CullPhase::Early))
            .unwrap();

        assert_eq!(schedule.passes()[0].kind, PassKind::ResetFrame);
        assert!(early < encode && encode < hiz && hiz < late);
        assert_eq!(schedule.passes().last().unwrap().kind, PassKind::ShadowRaster(1));
        assert_eq!(schedule.passes().len(), 3 + 5 + 2 + 5 + 2 + 6);
    }

    #[test]
    fn test_late_cull_depends_on_hiz_build() {
        let schedule = FrameSchedule::build(0).unwrap();
        let hiz = schedule.position(PassKind::HiZBuild).unwrap();
        let late = schedule.position(PassKind::MeshletCull(CullPhase::Late)).unwrap();

        assert!(schedule.dependencies().iter().any(|d| d.before == hiz
            && d.after == late
            && d.resource == ResourceId::HiZPyramid
            && d.hazard == Hazard::ReadAfterWrite));
    }

    #[test]
    fn test_late_triangles_wait_for_early_encode() {
        let schedule = FrameSchedule::build(0).unwrap();
        let encode = schedule
            .position(PassKind::VisibilityEncode(CullPhase::Early))
            .unwrap();
        let late = schedule.position(PassKind::TriangleCull(CullPhase::Late)).unwrap();

        assert!(schedule.dependencies().iter().any(|d| d.before == encode
            && d.after == late
            && d.hazard == Hazard::WriteAfterRead));
    }

    #[test]
    fn test_reading_unwritten_transient_is_rejected() {
        let passes = vec![
            PassDesc::new(PassKind::ResetFrame, 0),
            PassDesc::new(PassKind::PrepareMeshletDispatch, 0),
            PassDesc::new(PassKind::MeshletCull(CullPhase::Early), 0),
        ];
        let result = FrameSchedule::from_passes(passes, 0);
        match result {
            Err(EngineError::ScheduleViolation { pass, resource, .. }) => {
                assert_eq!(pass, "MeshletCull{Early}");
                assert_eq!(resource, "MeshletInstances");
            }
            other => panic!("expected schedule violation, got {other:?}"),
        }
    }

    #[test]
    fn test_cross_frame_resources_may_be_read_first() {
        let passes = vec![PassDesc::new(PassKind::HiZBuild, 0)];
        assert!(FrameSchedule::from_passes(passes, 0).is_err());

        let passes = vec![
            PassDesc::new(PassKind::ResetFrame, 0),
            PassDesc::new(PassKind::MeshCull, 0),
            PassDesc::new(PassKind::PrepareMeshletDispatch, 0),
            PassDesc::new(PassKind::MeshletCull(CullPhase::Early), 0),
        ];
        FrameSchedule::from_passes(passes, 0).unwrap();
    }

    #[test]
    fn test_independent_shadow_rasters() {
        let schedule = FrameSchedule::build(2).unwrap();
        let first = schedule.position(PassKind::ShadowRaster(0)).unwrap();
        let second = schedule.position(PassKind::ShadowRaster(1)).unwrap();
        let cull_a = schedule.position(PassKind::ShadowMeshletCull(0)).unwrap();
        let cull_b = schedule.position(PassKind::ShadowMeshletCull(1)).unwrap();

        assert!(schedule.independent(first, second));
        assert!(!schedule.independent(cull_a, cull_b));
    }
}
