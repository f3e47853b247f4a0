// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Octree tetrahedralisation of volumes.
//!
//! Each volume's bounding box is refined until a cell is no larger than the
//! size function at its centre. Cells whose centre lies inside the volume
//! are split into six tetrahedra around their main diagonal (Kuhn
//! subdivision). Cells live on an integer lattice so neighbouring cells
//! share their corner nodes. The result is non-conforming across refinement
//! levels and does not conform to the surface mesh.

use nalgebra::{Point3, Vector3};
use rayon::prelude::*;
use rayon::ThreadPool;
use rustc_hash::FxHashMap;

use intake_mesh_core::BoundingBox;

use super::MeshData;
use crate::entity::{Dim, Entity};
use crate::error::{KernelError, Result};
use crate::field::SizeFunction;
use crate::geom::{point_in_facets, point_triangle_distance, tet_signed_volume, Triangle};
use crate::model::{Model, VolumeData};
use crate::options::{Algorithm3D, MeshOptions};

const MAX_LEVEL: u32 = 10;
const MIN_LEVEL: u32 = 2;

/// Axis permutations of the Kuhn subdivision, as corner bit masks.
const KUHN_PATHS: [[usize; 2]; 6] = [[1, 2], [1, 4], [2, 1], [2, 4], [4, 1], [4, 2]];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Cell {
    level: u32,
    i: u32,
    j: u32,
    k: u32,
}

impl Cell {
    /// Edge length in lattice units.
    fn span(&self) -> u32 {
        1 << (MAX_LEVEL - self.level)
    }

    fn children(&self) -> [Cell; 8] {
        let half = self.span() / 2;
        std::array::from_fn(|bits| Cell {
            level: self.level + 1,
            i: self.i + if bits & 1 != 0 { half } else { 0 },
            j: self.j + if bits & 2 != 0 { half } else { 0 },
            k: self.k + if bits & 4 != 0 { half } else { 0 },
        })
    }

    fn corner(&self, bits: usize) -> (u32, u32, u32) {
        let s = self.span();
        (
            self.i + if bits & 1 != 0 { s } else { 0 },
            self.j + if bits & 2 != 0 { s } else { 0 },
            self.k + if bits & 4 != 0 { s } else { 0 },
        )
    }
}

enum Verdict {
    Split,
    Keep,
    Drop,
}

/// Maps lattice coordinates into the volume's bounding box.
struct Lattice {
    origin: Point3<f64>,
    step: Vector3<f64>,
}

impl Lattice {
    fn new(bounds: &BoundingBox) -> Self {
        let cells = (1u32 << MAX_LEVEL) as f64;
        Self {
            origin: bounds.min(),
            step: bounds.extents() / cells,
        }
    }

    fn point(&self, (i, j, k): (u32, u32, u32)) -> Point3<f64> {
        self.origin + Vector3::new(i as f64 * self.step.x, j as f64 * self.step.y, k as f64 * self.step.z)
    }

    fn center(&self, cell: &Cell) -> Point3<f64> {
        let h = cell.span() as f64 / 2.0;
        self.origin
            + Vector3::new(
                (cell.i as f64 + h) * self.step.x,
                (cell.j as f64 + h) * self.step.y,
                (cell.k as f64 + h) * self.step.z,
            )
    }

    fn edges(&self, cell: &Cell) -> Vector3<f64> {
        self.step * cell.span() as f64
    }
}

struct Octree<'a> {
    lattice: Lattice,
    facets: &'a [Triangle],
    sizes: &'a SizeFunction,
    refine: bool,
}

impl Octree<'_> {
    fn judge(&self, cell: &Cell) -> Verdict {
        let center = self.lattice.center(cell);
        let edges = self.lattice.edges(cell);
        let inside = point_in_facets(&center, self.facets);

        if !inside {
            let half_diagonal = edges.norm() / 2.0;
            let clear = self
                .facets
                .iter()
                .all(|t| point_triangle_distance(&center, t) > half_diagonal);
            if clear {
                return Verdict::Drop;
            }
        }

        let too_big = cell.level < MIN_LEVEL || (self.refine && edges.max() > self.sizes.size_at(&center));
        if too_big && cell.level < MAX_LEVEL {
            Verdict::Split
        } else if inside {
            Verdict::Keep
        } else {
            Verdict::Drop
        }
    }
}

pub(crate) fn mesh_volumes(
    model: &Model,
    mesh: &mut MeshData,
    sizes: &SizeFunction,
    options: &MeshOptions,
    pool: Option<&ThreadPool>,
) -> Result<()> {
    let mut volumes: Vec<&VolumeData> = model.volumes.values().collect();
    volumes.sort_by_key(|v| v.tag);

    let mut total = 0usize;
    for volume in volumes {
        let facets = boundary_facets(model, mesh, volume)?;
        let bounds = BoundingBox::from_points(facets.iter().flatten()).ok_or_else(|| {
            KernelError::meshing(Dim::Volume, format!("volume {} has no boundary", volume.tag))
        })?;
        if bounds.extents().min() <= 0.0 {
            return Err(KernelError::meshing(
                Dim::Volume,
                format!("volume {} has no thickness", volume.tag),
            ));
        }

        let octree = Octree {
            lattice: Lattice::new(&bounds),
            facets: &facets,
            sizes,
            refine: options.algorithm_3d != Algorithm3D::InitialMeshOnly,
        };
        let budget = if options.max_elements > 0 {
            options.max_elements.saturating_sub(total)
        } else {
            usize::MAX
        };
        let leaves = match pool {
            Some(pool) => pool.install(|| refine(&octree, budget, options.max_elements)),
            None => refine(&octree, budget, options.max_elements),
        }?;
        if leaves.is_empty() {
            return Err(KernelError::meshing(
                Dim::Volume,
                format!("volume {}: no cell centre falls inside the boundary", volume.tag),
            ));
        }

        let tets = tetrahedralise(mesh, &octree.lattice, &leaves, Entity::volume(volume.tag));
        total += tets.len();
        tracing::debug!(volume = volume.tag, cells = leaves.len(), tetrahedra = tets.len(), "Octree meshed");
        mesh.tetrahedra.insert(volume.tag, tets);
    }
    Ok(())
}

/// Triangles of every shell of a volume, from the surface mesh when there
/// is one.
fn boundary_facets(model: &Model, mesh: &MeshData, volume: &VolumeData) -> Result<Vec<Triangle>> {
    let mut facets = Vec::new();
    for &surface in volume.shells.iter().flatten() {
        let tag = model.surfaces[surface].tag;
        match mesh.triangles.get(&tag) {
            Some(tris) => facets.extend(tris.iter().map(|t| t.map(|n| mesh.nodes[n]))),
            None => facets.extend(model.surface_facets(surface).map_err(|e| {
                KernelError::meshing(Dim::Volume, format!("volume {}: {}", volume.tag, e))
            })?),
        }
    }
    Ok(facets)
}

/// Breadth-first refinement, one level per parallel sweep.
fn refine(octree: &Octree<'_>, budget: usize, limit: usize) -> Result<Vec<Cell>> {
    let mut frontier = vec![Cell {
        level: 0,
        i: 0,
        j: 0,
        k: 0,
    }];
    let mut leaves = Vec::new();

    while !frontier.is_empty() {
        let verdicts: Vec<Verdict> = frontier.par_iter().map(|cell| octree.judge(cell)).collect();
        let mut next = Vec::new();
        for (cell, verdict) in frontier.iter().zip(verdicts) {
            match verdict {
                Verdict::Split => next.extend(cell.children()),
                Verdict::Keep => leaves.push(*cell),
                Verdict::Drop => {}
            }
        }
        if (leaves.len() + next.len()).saturating_mul(6) > budget {
            return Err(KernelError::ElementBudgetExceeded { limit });
        }
        frontier = next;
    }
    Ok(leaves)
}

fn tetrahedralise(mesh: &mut MeshData, lattice: &Lattice, leaves: &[Cell], owner: Entity) -> Vec<[usize; 4]> {
    let mut nodes: FxHashMap<(u32, u32, u32), usize> = FxHashMap::default();
    let mut tets = Vec::with_capacity(leaves.len() * 6);
    for cell in leaves {
        let corner: [usize; 8] = std::array::from_fn(|bits| {
            let key = cell.corner(bits);
            *nodes
                .entry(key)
                .or_insert_with(|| mesh.add_node(lattice.point(key), owner))
        });
        for [a, b] in KUHN_PATHS {
            let mut tet = [corner[0], corner[a], corner[a | b], corner[7]];
            let [p0, p1, p2, p3] = tet.map(|n| mesh.nodes[n]);
            if tet_signed_volume(&p0, &p1, &p2, &p3) < 0.0 {
                tet.swap(1, 2);
            }
            tets.push(tet);
        }
    }
    tets
}
