// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Fragmentation of the domain box by the imported geometry.
//!
//! The kernel reports descendants positionally; this module turns that into
//! an explicit provenance map (child -> input entity) so later stages never
//! depend on the order of the fragmentation call.

use std::collections::BTreeMap;

use intake_mesh_kernel::{Dim, Entity, GeometryKernel, HealingOptions, KernelError};
use rustc_hash::FxHashSet;

use crate::error::FragmentError;

/// Relative margin of the box rebuilt when no volume survives.
const RECOVERY_MARGIN: f64 = 0.01;

/// Where the fluid volume came from when the fragmentation result lacked one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeRecovery {
    /// At least one volume came out of fragmentation.
    NotNeeded,
    /// Rebuilt from every surface as one surface loop.
    SurfaceLoop,
    /// Replaced by the model bounding box.
    BoundingBox,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FragmentResult {
    pub entities: Vec<Entity>,
    /// Child -> the input entity it descends from.
    pub provenance: BTreeMap<Entity, Entity>,
    /// False when the kernel listed some child under two inputs.
    pub partition_consistent: bool,
    pub recovery: VolumeRecovery,
}

impl FragmentResult {
    /// Children descended from any of `inputs`.
    pub fn children_of(&self, inputs: &[Entity]) -> Vec<Entity> {
        self.provenance
            .iter()
            .filter(|(_, parent)| inputs.contains(parent))
            .map(|(child, _)| *child)
            .collect()
    }

    /// The provenance is usable for classification.
    pub fn has_provenance(&self) -> bool {
        self.partition_consistent && !self.provenance.is_empty()
    }
}

/// Fragment `domain` by every imported surface and volume, heal the result
/// and make sure at least one volume remains.
pub fn fragment<K: GeometryKernel>(
    kernel: &mut K,
    domain: Entity,
    tools: &[Entity],
    healing: &HealingOptions,
) -> Result<FragmentResult, FragmentError> {
    let output = kernel
        .fragment(&[domain], tools)
        .map_err(|e| FragmentError::BooleanFailed(e.to_string()))?;
    kernel.synchronize()?;

    let inputs: Vec<Entity> = std::iter::once(domain).chain(tools.iter().copied()).collect();
    let (mut provenance, partition_consistent) = build_provenance(&inputs, &output.parent_map);
    if !partition_consistent {
        tracing::warn!("Fragmentation parent map lists an entity twice, provenance will not be used");
    }
    if provenance.is_empty() {
        tracing::warn!("Fragmentation returned no parent map");
    }

    heal_volumes(kernel, healing);

    // Healing may have merged or dropped children
    let live: FxHashSet<Entity> = kernel.entities(None)?.into_iter().collect();
    let entities = drop_dead_children(&mut provenance, &output.entities, &live);

    let recovery = ensure_volume(kernel)?;

    tracing::info!(
        entities = entities.len(),
        volumes = kernel.entities(Some(Dim::Volume))?.len(),
        recovery = ?recovery,
        "Fragmented domain"
    );
    Ok(FragmentResult {
        entities,
        provenance,
        partition_consistent,
        recovery,
    })
}

/// Invert a positional parent map. The second value is false when a child
/// appears under more than one input.
pub fn build_provenance(inputs: &[Entity], parent_map: &[Vec<Entity>]) -> (BTreeMap<Entity, Entity>, bool) {
    let mut provenance = BTreeMap::new();
    let mut consistent = true;
    for (input, children) in inputs.iter().zip(parent_map) {
        for child in children {
            if provenance.insert(*child, *input).is_some() {
                consistent = false;
            }
        }
    }
    (provenance, consistent)
}

/// Seams left by fragmentation are a common source of tiny faces.
fn heal_volumes<K: GeometryKernel>(kernel: &mut K, healing: &HealingOptions) {
    let volumes = match kernel.entities(Some(Dim::Volume)) {
        Ok(volumes) if !volumes.is_empty() => volumes,
        _ => return,
    };
    match kernel.heal(&volumes, healing) {
        Ok(report) if report.changed() => {
            tracing::info!(
                curves = report.removed_curves + report.merged_curves,
                surfaces = report.removed_surfaces + report.merged_surfaces,
                "Healed fragmented volumes"
            );
        }
        Ok(_) => {}
        Err(e) => tracing::warn!(error = %e, "Healing after fragmentation failed"),
    }
    if let Err(e) = kernel.synchronize() {
        tracing::warn!(error = %e, "Synchronize after healing failed");
    }
}

fn ensure_volume<K: GeometryKernel>(kernel: &mut K) -> Result<VolumeRecovery, FragmentError> {
    if !kernel.entities(Some(Dim::Volume))?.is_empty() {
        return Ok(VolumeRecovery::NotNeeded);
    }

    tracing::warn!("Fragmentation left no volume, rebuilding one from the surfaces");
    let surfaces = kernel.entities(Some(Dim::Surface))?;
    let from_loop = kernel
        .add_surface_loop_volume(&surfaces)
        .and_then(|_| kernel.synchronize());
    match from_loop {
        Ok(()) => return Ok(VolumeRecovery::SurfaceLoop),
        Err(e) => tracing::warn!(error = %e, "Surface loop volume failed, using the model bounds"),
    }

    let bounds = kernel
        .model_bounding_box()?
        .ok_or(FragmentError::EmptyResult)?;
    let margin = RECOVERY_MARGIN * bounds.max_extent().max(f64::EPSILON);
    let bounds = bounds.inflated(margin);
    kernel
        .add_box(bounds.min(), bounds.extents())
        .and_then(|_| kernel.synchronize())
        .map_err(|e: KernelError| {
            tracing::warn!(error = %e, "Bounding box volume failed");
            FragmentError::EmptyResult
        })?;
    Ok(VolumeRecovery::BoundingBox)
}

/// Forget children that no longer exist; returns the surviving `entities`.
fn drop_dead_children(
    provenance: &mut BTreeMap<Entity, Entity>,
    entities: &[Entity],
    live: &FxHashSet<Entity>,
) -> Vec<Entity> {
    provenance.retain(|child, _| live.contains(child));
    entities.iter().copied().filter(|e| live.contains(e)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use intake_mesh_kernel::{BuiltinKernel, Point3, Vector3};

    #[test]
    fn test_provenance_inverts_parent_map() {
        let domain = Entity::volume(1);
        let body = Entity::volume(2);
        let face = Entity::surface(7);
        let (map, consistent) = build_provenance(
            &[domain, body, face],
            &[vec![domain], vec![body], vec![face]],
        );
        assert!(consistent);
        assert_eq!(map[&face], face);
        assert_eq!(map.len(), 3);

        let (_, consistent) = build_provenance(&[domain, body], &[vec![domain], vec![domain]]);
        assert!(!consistent);
    }

    #[test]
    fn test_dead_children_are_forgotten() {
        let domain = Entity::volume(1);
        let faces: Vec<Entity> = (1..=2000).map(Entity::surface).collect();
        let mut inputs = vec![domain];
        inputs.extend(faces.iter().copied());
        let parent_map: Vec<Vec<Entity>> = inputs.iter().map(|&e| vec![e]).collect();
        let (mut provenance, _) = build_provenance(&inputs, &parent_map);

        // Healing merged every odd face into its neighbour
        let live: FxHashSet<Entity> = inputs
            .iter()
            .copied()
            .filter(|e| *e == domain || e.tag % 2 == 0)
            .collect();
        let entities = drop_dead_children(&mut provenance, &inputs, &live);

        assert_eq!(entities.len(), 1 + 1000);
        assert_eq!(entities[0], domain);
        assert_eq!(provenance.len(), entities.len());
        assert!(provenance.keys().all(|e| live.contains(e)));
        assert!(!provenance.contains_key(&Entity::surface(1)));
    }

    #[test]
    fn test_every_child_has_one_parent() {
        let mut kernel = BuiltinKernel::new();
        kernel.add_model("t").unwrap();
        let body = kernel.add_box(Point3::origin(), Vector3::new(1.0, 1.0, 1.0)).unwrap();
        let faces = kernel.boundary(&[body], Default::default()).unwrap();
        let domain = kernel
            .add_box(Point3::new(-2.0, -2.0, -2.0), Vector3::new(5.0, 5.0, 5.0))
            .unwrap();
        kernel.synchronize().unwrap();

        let mut tools = vec![body];
        tools.extend(faces.iter().copied());
        let result = fragment(&mut kernel, domain, &tools, &HealingOptions::all(1e-2)).unwrap();

        assert!(result.has_provenance());
        assert_eq!(result.recovery, VolumeRecovery::NotNeeded);
        for entity in &result.entities {
            assert!(result.provenance.contains_key(entity));
        }
        assert_eq!(result.children_of(&[domain]), vec![domain]);
        let from_body = result.children_of(&tools);
        assert_eq!(from_body.len(), 7);
    }

    #[test]
    fn test_crossing_geometry_is_boolean_failure() {
        let mut kernel = BuiltinKernel::new();
        kernel.add_model("t").unwrap();
        let body = kernel.add_box(Point3::origin(), Vector3::new(4.0, 1.0, 1.0)).unwrap();
        let domain = kernel.add_box(Point3::new(1.0, -1.0, -1.0), Vector3::new(2.0, 3.0, 3.0)).unwrap();
        kernel.synchronize().unwrap();
        let err = fragment(&mut kernel, domain, &[body], &HealingOptions::all(1e-2)).unwrap_err();
        assert!(matches!(err, FragmentError::BooleanFailed(_)));
    }

    #[test]
    fn test_volume_rebuilt_from_surfaces() {
        let mut kernel = BuiltinKernel::new();
        kernel.add_model("t").unwrap();
        let body = kernel.add_box(Point3::origin(), Vector3::new(1.0, 1.0, 1.0)).unwrap();
        kernel.synchronize().unwrap();
        kernel.remove(&[body], false).unwrap();
        assert!(kernel.entities(Some(Dim::Volume)).unwrap().is_empty());

        assert_eq!(ensure_volume(&mut kernel).unwrap(), VolumeRecovery::SurfaceLoop);
        assert_eq!(kernel.entities(Some(Dim::Volume)).unwrap().len(), 1);
    }
}
