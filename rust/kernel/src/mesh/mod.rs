// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Mesh storage and the progressive 1D → 2D → 3D generator.

pub mod curve;
pub mod surface;
pub mod volume;

use std::collections::BTreeMap;
use std::time::Instant;

use nalgebra::Point3;
use rayon::ThreadPool;

use crate::entity::{Dim, Entity};
use crate::error::Result;
use crate::field::SizeFunction;
use crate::model::Model;
use crate::options::MeshOptions;

/// Nodes of one meshed curve, from its start point to its end point.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CurveMesh {
    pub nodes: Vec<usize>,
}

impl CurveMesh {
    pub fn segments(&self) -> impl Iterator<Item = [usize; 2]> + '_ {
        self.nodes.windows(2).map(|w| [w[0], w[1]])
    }
}

/// The mesh of the active model. Node indices are 0-based; every node is
/// classified on the entity that created it.
#[derive(Debug, Clone, Default)]
pub struct MeshData {
    pub(crate) nodes: Vec<Point3<f64>>,
    pub(crate) owners: Vec<Entity>,
    pub(crate) points: BTreeMap<i32, usize>,
    pub(crate) curves: BTreeMap<i32, CurveMesh>,
    pub(crate) triangles: BTreeMap<i32, Vec<[usize; 3]>>,
    pub(crate) tetrahedra: BTreeMap<i32, Vec<[usize; 4]>>,
    /// Highest dimension completely meshed.
    pub(crate) level: Option<Dim>,
}

impl MeshData {
    pub fn add_node(&mut self, position: Point3<f64>, owner: Entity) -> usize {
        self.nodes.push(position);
        self.owners.push(owner);
        self.nodes.len() - 1
    }

    pub fn nodes(&self) -> &[Point3<f64>] {
        &self.nodes
    }

    pub fn owner(&self, node: usize) -> Entity {
        self.owners[node]
    }

    pub fn point_node(&self, tag: i32) -> Option<usize> {
        self.points.get(&tag).copied()
    }

    pub fn curve(&self, tag: i32) -> Option<&CurveMesh> {
        self.curves.get(&tag)
    }

    pub fn curves(&self) -> &BTreeMap<i32, CurveMesh> {
        &self.curves
    }

    pub fn triangles(&self) -> &BTreeMap<i32, Vec<[usize; 3]>> {
        &self.triangles
    }

    pub fn tetrahedra(&self) -> &BTreeMap<i32, Vec<[usize; 4]>> {
        &self.tetrahedra
    }

    pub fn level(&self) -> Option<Dim> {
        self.level
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of elements of one dimension.
    pub fn element_count(&self, dim: Dim) -> usize {
        match dim {
            Dim::Point => self.points.len(),
            Dim::Curve => self.curves.values().map(|c| c.nodes.len().saturating_sub(1)).sum(),
            Dim::Surface => self.triangles.values().map(Vec::len).sum(),
            Dim::Volume => self.tetrahedra.values().map(Vec::len).sum(),
        }
    }

    pub fn clear(&mut self) {
        *self = MeshData::default();
    }

    /// Drop everything one failed level created.
    fn rollback(&mut self, node_count: usize, dim: Dim) {
        self.nodes.truncate(node_count);
        self.owners.truncate(node_count);
        match dim {
            Dim::Point => self.points.clear(),
            Dim::Curve => self.curves.clear(),
            Dim::Surface => self.triangles.clear(),
            Dim::Volume => self.tetrahedra.clear(),
        }
    }
}

/// Mesh every level up to `target` that is not meshed yet.
///
/// A failing level leaves the mesh at the previous level, so the caller can
/// retry it with other options or dump what exists.
pub(crate) fn generate(
    model: &mut Model,
    target: Dim,
    options: &MeshOptions,
    pool: Option<&ThreadPool>,
) -> Result<()> {
    let sizes = SizeFunction::compile(model, options.size_min, options.size_max)?;
    let mut mesh = std::mem::take(&mut model.mesh);
    let result = generate_levels(model, &mut mesh, target, options, &sizes, pool);
    model.mesh = mesh;
    result
}

fn generate_levels(
    model: &Model,
    mesh: &mut MeshData,
    target: Dim,
    options: &MeshOptions,
    sizes: &SizeFunction,
    pool: Option<&ThreadPool>,
) -> Result<()> {
    for dim in Dim::ALL {
        if dim > target || mesh.level.is_some_and(|done| done >= dim) {
            continue;
        }
        let start = Instant::now();
        let checkpoint = mesh.nodes.len();
        let outcome = match dim {
            Dim::Point => curve::mesh_points(model, mesh),
            Dim::Curve => curve::mesh_curves(model, mesh, sizes, options),
            Dim::Surface => surface::mesh_surfaces(model, mesh, options.algorithm_2d),
            Dim::Volume => volume::mesh_volumes(model, mesh, sizes, options, pool),
        };
        if let Err(e) = outcome {
            mesh.rollback(checkpoint, dim);
            return Err(e);
        }
        mesh.level = Some(dim);
        tracing::info!(
            dim = %dim,
            elements = mesh.element_count(dim),
            nodes = mesh.nodes.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Meshed"
        );
    }
    Ok(())
}
