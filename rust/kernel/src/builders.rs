// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Primitive constructors on top of the model arena.

use nalgebra::{Point3, Vector3};
use rustc_hash::FxHashMap;

use crate::entity::{Dim, Entity};
use crate::error::{KernelError, Result};
use crate::model::{CurveKey, Model, PointKey, SurfaceKey};

/// Corner index bits: x = 1, y = 2, z = 4.
const BOX_EDGES: [(usize, usize); 12] = [
    (0, 1),
    (2, 3),
    (4, 5),
    (6, 7),
    (0, 2),
    (1, 3),
    (4, 6),
    (5, 7),
    (0, 4),
    (1, 5),
    (2, 6),
    (3, 7),
];

/// Faces as corner cycles, counter-clockwise seen from outside.
const BOX_FACES: [[usize; 4]; 6] = [
    [0, 2, 3, 1],
    [4, 5, 7, 6],
    [0, 1, 5, 4],
    [1, 3, 7, 5],
    [3, 2, 6, 7],
    [2, 0, 4, 6],
];

/// Axis-aligned box solid: 8 points, 12 curves, 6 outward-facing surfaces
/// and one volume, which is returned.
pub fn add_box(model: &mut Model, origin: Point3<f64>, size: Vector3<f64>) -> Entity {
    let corners: Vec<PointKey> = (0..8)
        .map(|bits: usize| {
            let offset = Vector3::new(
                if bits & 1 != 0 { size.x } else { 0.0 },
                if bits & 2 != 0 { size.y } else { 0.0 },
                if bits & 4 != 0 { size.z } else { 0.0 },
            );
            model.add_point(origin + offset)
        })
        .collect();

    let mut edges: FxHashMap<(usize, usize), CurveKey> = FxHashMap::default();
    for &(a, b) in &BOX_EDGES {
        let key = model.add_curve(corners[a], corners[b], Vec::new());
        edges.insert((a, b), key);
    }

    let faces: Vec<SurfaceKey> = BOX_FACES
        .iter()
        .map(|cycle| {
            let curve_loop = (0..4)
                .map(|i| {
                    let (a, b) = (cycle[i], cycle[(i + 1) % 4]);
                    match edges.get(&(a, b)) {
                        Some(&curve) => (curve, true),
                        None => (edges[&(b, a)], false),
                    }
                })
                .collect();
            model.add_surface(vec![curve_loop])
        })
        .collect();

    let volume = model.add_volume(vec![faces]);
    Entity::volume(model.volumes[volume].tag)
}

/// Volume bounded by the given surfaces taken as one shell.
pub fn add_surface_loop_volume(model: &mut Model, surfaces: &[Entity]) -> Result<Entity> {
    if surfaces.is_empty() {
        return Err(KernelError::Geometry("surface loop is empty".into()));
    }
    let mut shell = Vec::with_capacity(surfaces.len());
    for surface in surfaces {
        if surface.dim != Dim::Surface {
            return Err(KernelError::Geometry(format!("{} is not a surface", surface)));
        }
        shell.push(model.surface_key(surface.tag)?);
    }
    let volume = model.add_volume(vec![shell]);
    Ok(Entity::volume(model.volumes[volume].tag))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tessellate::newell_normal;
    use approx::assert_relative_eq;

    #[test]
    fn test_box_faces_point_outward() {
        let mut model = Model::new("t");
        let volume = add_box(&mut model, Point3::new(1.0, 2.0, 3.0), Vector3::new(2.0, 4.0, 6.0));
        assert_eq!(model.counts(), [8, 12, 6, 1]);

        let center = model.bounding_box(volume).unwrap().center();
        for (key, surface) in &model.surfaces {
            let ring = model.loop_polyline(&surface.loops[0]);
            let normal = newell_normal(&ring);
            let face_center = ring.iter().fold(Vector3::zeros(), |acc, p| acc + p.coords) / 4.0;
            assert!(normal.dot(&(face_center - center.coords)) > 0.0, "{:?}", key);
        }
        let total: f64 = model.surfaces.keys().map(|k| model.surface_area(k)).sum();
        assert_relative_eq!(total, 2.0 * (8.0 + 12.0 + 24.0), epsilon = 1e-9);
    }

    #[test]
    fn test_surface_loop_volume_rejects_curves() {
        let mut model = Model::new("t");
        add_box(&mut model, Point3::origin(), Vector3::new(1.0, 1.0, 1.0));
        assert!(add_surface_loop_volume(&mut model, &[Entity::curve(1)]).is_err());
        let surfaces = model.entities(Some(Dim::Surface));
        let volume = add_surface_loop_volume(&mut model, &surfaces).unwrap();
        assert_eq!(volume, Entity::volume(2));
    }
}
