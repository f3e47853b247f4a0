// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Fluid volume selection and intake/far-field surface classification.

use rustc_hash::FxHashSet;
use serde::Serialize;

use intake_mesh_kernel::{BoundaryQuery, Dim, Entity, GeometryKernel, KernelError};

use crate::domain::DomainBox;
use crate::error::ClassificationError;
use crate::fragment::FragmentResult;

/// Physical group names written to the mesh.
pub const FLUID_GROUP: &str = "fluid";
pub const INTAKE_GROUP: &str = "intake";
pub const FARFIELD_GROUP: &str = "farfield";

/// Which rule produced the intake surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationPath {
    Provenance,
    DomainDifference,
    AllBoundaries,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub fluid: Entity,
    pub intake_surfaces: Vec<Entity>,
    pub intake_edges: Vec<Entity>,
    pub farfield_surfaces: Vec<Entity>,
    pub path: ClassificationPath,
}

/// Pick the fluid volume and remove every other volume, so the mesh holds
/// exactly one.
///
/// The fluid is the child of the domain box; without provenance the first
/// volume is used.
pub fn select_fluid_volume<K: GeometryKernel>(
    kernel: &mut K,
    domain: &DomainBox,
    fragments: &FragmentResult,
) -> Result<Entity, KernelError> {
    let volumes = kernel.entities(Some(Dim::Volume))?;
    let from_domain = fragments
        .children_of(&[domain.volume])
        .into_iter()
        .find(|e| e.dim == Dim::Volume && volumes.contains(e));
    let fluid = match from_domain {
        Some(volume) => volume,
        None => *volumes
            .first()
            .ok_or_else(|| KernelError::Geometry("no volume to mesh".into()))?,
    };

    let others: Vec<Entity> = volumes.into_iter().filter(|v| *v != fluid).collect();
    if !others.is_empty() {
        tracing::debug!(removed = others.len(), "Removed solid volumes");
        kernel.remove(&others, false)?;
        kernel.synchronize()?;
    }
    Ok(fluid)
}

pub fn classify<K: GeometryKernel>(
    kernel: &mut K,
    fluid: Entity,
    domain: &DomainBox,
    fragments: &FragmentResult,
) -> Result<Classification, KernelError> {
    let fluid_boundary = kernel.boundary(&[fluid], BoundaryQuery::default())?;
    let imported: Vec<Entity> = fragments
        .provenance
        .iter()
        .filter(|(_, parent)| **parent != domain.volume)
        .map(|(_, parent)| *parent)
        .collect();

    let (intake_surfaces, path) = match from_provenance(fragments, &imported, &fluid_boundary) {
        Ok(surfaces) => (surfaces, ClassificationPath::Provenance),
        Err(_) => match domain_difference(&fluid_boundary, &domain.faces) {
            Ok(surfaces) => (surfaces, ClassificationPath::DomainDifference),
            Err(ClassificationError::NoSurfacesFound) => {
                tracing::warn!("No intake surfaces identified, using every fluid boundary surface");
                (fluid_boundary.clone(), ClassificationPath::AllBoundaries)
            }
        },
    };

    let intake_set: FxHashSet<Entity> = intake_surfaces.iter().copied().collect();
    let farfield_surfaces: Vec<Entity> = fluid_boundary
        .iter()
        .copied()
        .filter(|s| !intake_set.contains(s))
        .collect();

    let intake_edges = intake_edges(kernel, &intake_surfaces)?;

    tracing::info!(
        path = ?path,
        intake_surfaces = intake_surfaces.len(),
        intake_edges = intake_edges.len(),
        farfield_surfaces = farfield_surfaces.len(),
        "Classified surfaces"
    );
    Ok(Classification {
        fluid,
        intake_surfaces,
        intake_edges,
        farfield_surfaces,
        path,
    })
}

/// Surfaces descended from the imported geometry.
fn from_provenance(
    fragments: &FragmentResult,
    imported: &[Entity],
    fluid_boundary: &[Entity],
) -> Result<Vec<Entity>, ClassificationError> {
    if !fragments.has_provenance() {
        return Err(ClassificationError::NoSurfacesFound);
    }
    let surfaces: Vec<Entity> = fragments
        .children_of(imported)
        .into_iter()
        .filter(|e| e.dim == Dim::Surface && fluid_boundary.contains(e))
        .collect();
    if surfaces.is_empty() {
        Err(ClassificationError::NoSurfacesFound)
    } else {
        Ok(surfaces)
    }
}

/// Fluid boundary minus the faces the domain box had on its own.
fn domain_difference(fluid_boundary: &[Entity], box_faces: &[Entity]) -> Result<Vec<Entity>, ClassificationError> {
    let surfaces: Vec<Entity> = fluid_boundary
        .iter()
        .copied()
        .filter(|s| !box_faces.contains(s))
        .collect();
    if surfaces.is_empty() {
        Err(ClassificationError::NoSurfacesFound)
    } else {
        Ok(surfaces)
    }
}

/// Boundary curves of the intake surfaces, building discrete edges first
/// when the plain query finds none.
fn intake_edges<K: GeometryKernel>(kernel: &mut K, surfaces: &[Entity]) -> Result<Vec<Entity>, KernelError> {
    if surfaces.is_empty() {
        return Ok(Vec::new());
    }
    let edges = kernel.boundary(surfaces, BoundaryQuery::default())?;
    if !edges.is_empty() {
        return Ok(edges);
    }
    let created = kernel.create_edges()?;
    if created > 0 {
        kernel.synchronize()?;
        tracing::debug!(created, "Created discrete edges");
    }
    kernel.boundary(surfaces, BoundaryQuery::default())
}

/// Register the `fluid`, `intake` and `farfield` physical groups.
pub fn add_physical_groups<K: GeometryKernel>(kernel: &mut K, classes: &Classification) -> Result<(), KernelError> {
    kernel.add_physical_group(Dim::Volume, &[classes.fluid.tag], FLUID_GROUP)?;
    let tags = |entities: &[Entity]| entities.iter().map(|e| e.tag).collect::<Vec<i32>>();
    if !classes.intake_surfaces.is_empty() {
        kernel.add_physical_group(Dim::Surface, &tags(&classes.intake_surfaces), INTAKE_GROUP)?;
    }
    if !classes.farfield_surfaces.is_empty() {
        kernel.add_physical_group(Dim::Surface, &tags(&classes.farfield_surfaces), FARFIELD_GROUP)?;
    }
    Ok(())
}
