// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Surface meshing from the 1D mesh of the boundary loops.

use nalgebra::Point3;
use rustc_hash::FxHashMap;

use super::MeshData;
use crate::entity::{Dim, Entity};
use crate::error::{KernelError, Result};
use crate::model::{CurveLoop, Model};
use crate::options::Algorithm2D;
use crate::tessellate::{fan_triangulate, triangulate_loops};

pub(crate) fn mesh_surfaces(model: &Model, mesh: &mut MeshData, algorithm: Algorithm2D) -> Result<()> {
    let mut surfaces: Vec<_> = model.surfaces.values().collect();
    surfaces.sort_by_key(|s| s.tag);

    for surface in surfaces {
        let owner = Entity::surface(surface.tag);
        let triangles = if surface.is_discrete() {
            discrete_triangles(mesh, &surface.facets, owner)
        } else {
            if surface.loops.is_empty() {
                return Err(KernelError::meshing(
                    Dim::Surface,
                    format!("surface {} has no boundary", surface.tag),
                ));
            }
            let loops = loop_nodes(model, mesh, &surface.loops)?;
            triangulate(mesh, &loops, algorithm, owner).map_err(|reason| {
                KernelError::meshing(Dim::Surface, format!("surface {}: {}", surface.tag, reason))
            })?
        };
        mesh.triangles.insert(surface.tag, triangles);
    }
    Ok(())
}

/// Facets reused as they are, with vertices shared inside the surface.
fn discrete_triangles(mesh: &mut MeshData, facets: &[[Point3<f64>; 3]], owner: Entity) -> Vec<[usize; 3]> {
    let mut ids: FxHashMap<[u64; 3], usize> = FxHashMap::default();
    facets
        .iter()
        .map(|facet| {
            facet.map(|p| {
                let key = [p.x.to_bits(), p.y.to_bits(), p.z.to_bits()];
                *ids.entry(key).or_insert_with(|| mesh.add_node(p, owner))
            })
        })
        .collect()
}

/// Node rings of each boundary loop, without repeating the first node.
fn loop_nodes(model: &Model, mesh: &MeshData, loops: &[CurveLoop]) -> Result<Vec<Vec<usize>>> {
    loops
        .iter()
        .map(|curve_loop| {
            let mut ring = Vec::new();
            for &(curve, forward) in curve_loop {
                let tag = model.curves[curve].tag;
                let meshed = mesh.curve(tag).ok_or_else(|| {
                    KernelError::meshing(Dim::Surface, format!("curve {} is not meshed", tag))
                })?;
                let mut nodes = meshed.nodes.clone();
                if !forward {
                    nodes.reverse();
                }
                nodes.pop();
                ring.extend(nodes);
            }
            Ok(ring)
        })
        .collect()
}

fn triangulate(
    mesh: &mut MeshData,
    loops: &[Vec<usize>],
    algorithm: Algorithm2D,
    owner: Entity,
) -> std::result::Result<Vec<[usize; 3]>, String> {
    let outer = loops.first().ok_or("no outer loop")?;
    match algorithm {
        Algorithm2D::InitialMeshOnly => {
            let ring: Vec<Point3<f64>> = outer.iter().map(|&n| mesh.nodes[n]).collect();
            let (points, triangles) = fan_triangulate(&ring)?;
            let centroid = mesh.add_node(points[ring.len()], owner);
            let node = |i: usize| if i < outer.len() { outer[i] } else { centroid };
            Ok(triangles
                .into_iter()
                .map(|[a, b, c]| [node(a), node(b), node(c)])
                .collect())
        }
        Algorithm2D::MeshAdapt | Algorithm2D::Automatic | Algorithm2D::Delaunay | Algorithm2D::Frontal => {
            // Same hole filter as the triangulator so indices line up
            let kept: Vec<&Vec<usize>> = std::iter::once(outer)
                .chain(loops.iter().skip(1).filter(|l| l.len() >= 3))
                .collect();
            let rings: Vec<Vec<Point3<f64>>> = kept
                .iter()
                .map(|l| l.iter().map(|&n| mesh.nodes[n]).collect())
                .collect();
            let flat: Vec<usize> = kept.iter().flat_map(|l| l.iter().copied()).collect();
            let (_, triangles) = triangulate_loops(&rings)?;
            Ok(triangles
                .into_iter()
                .map(|[a, b, c]| [flat[a], flat[b], flat[c]])
                .collect())
        }
        other => Err(format!("algorithm {} is not available in the built-in kernel", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::add_box;
    use crate::field::SizeFunction;
    use crate::mesh::curve::{mesh_curves, mesh_points};
    use crate::options::MeshOptions;
    use nalgebra::Vector3;

    fn meshed_box_curves(size: f64) -> (Model, MeshData) {
        let mut model = Model::new("t");
        add_box(&mut model, Point3::origin(), Vector3::new(1.0, 1.0, 1.0));
        let mut mesh = MeshData::default();
        mesh_points(&model, &mut mesh).unwrap();
        mesh_curves(&model, &mut mesh, &SizeFunction::uniform(size), &MeshOptions::default()).unwrap();
        (model, mesh)
    }

    fn area(mesh: &MeshData, tris: &[[usize; 3]]) -> f64 {
        tris.iter()
            .map(|t| {
                let [a, b, c] = t.map(|i| mesh.nodes[i]);
                (b - a).cross(&(c - a)).norm() / 2.0
            })
            .sum()
    }

    #[test]
    fn test_box_faces_cover_their_area() {
        let (model, mut mesh) = meshed_box_curves(0.25);
        mesh_surfaces(&model, &mut mesh, Algorithm2D::Delaunay).unwrap();
        assert_eq!(mesh.triangles.len(), 6);
        for tris in mesh.triangles.values() {
            assert!((area(&mesh, tris) - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_fan_adds_one_node_per_surface() {
        let (model, mut mesh) = meshed_box_curves(0.5);
        let before = mesh.nodes.len();
        mesh_surfaces(&model, &mut mesh, Algorithm2D::InitialMeshOnly).unwrap();
        assert_eq!(mesh.nodes.len(), before + 6);
        // 8 boundary nodes per face, one triangle per boundary segment
        assert!(mesh.triangles.values().all(|t| t.len() == 8));
    }

    #[test]
    fn test_quad_algorithm_is_unavailable() {
        let (model, mut mesh) = meshed_box_curves(0.5);
        let err = mesh_surfaces(&model, &mut mesh, Algorithm2D::FrontalQuads).unwrap_err();
        assert!(matches!(err, KernelError::Meshing { dim: Dim::Surface, .. }));
    }
}
