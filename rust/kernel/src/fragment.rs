// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Boolean fragmentation of object volumes by tool entities.
//!
//! Tools must lie strictly inside exactly one object. A tool volume keeps
//! its tag and its surfaces; its outer shell is added to the object as an
//! inner shell so both children share the interface. Free tool surfaces are
//! grouped into connected sets: closed sets become inner shells of the
//! object, open sets are embedded in it. Objects keep their tags.

use nalgebra::Point3;
use rustc_hash::{FxHashMap, FxHashSet};

use intake_mesh_core::BoundingBox;

use crate::entity::{Dim, Entity};
use crate::error::{KernelError, Result};
use crate::geom::{point_in_facets, Triangle};
use crate::model::{CurveKey, Model, SurfaceKey, VolumeKey};

/// Result of a fragmentation: every resulting entity, and per input entity
/// (objects first, then tools, in call order) the entities it became.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FragmentOutput {
    pub entities: Vec<Entity>,
    pub parent_map: Vec<Vec<Entity>>,
}

struct ObjectShape {
    key: VolumeKey,
    bounds: BoundingBox,
    facets: Vec<Triangle>,
}

impl ObjectShape {
    fn strictly_contains(&self, points: &[Point3<f64>], tol: f64) -> bool {
        let inner = self.bounds.inflated(-tol);
        points
            .iter()
            .all(|p| inner.contains_point(p, 0.0) && point_in_facets(p, &self.facets))
    }
}

pub fn fragment(model: &mut Model, objects: &[Entity], tools: &[Entity]) -> Result<FragmentOutput> {
    if objects.is_empty() {
        return Err(KernelError::Boolean("no object entities".into()));
    }

    let mut shapes = Vec::with_capacity(objects.len());
    for object in objects {
        if object.dim != Dim::Volume {
            return Err(KernelError::Boolean(format!(
                "object {} is not a volume",
                object
            )));
        }
        let key = model.volume_key(object.tag)?;
        let outer = model.volumes[key].shells.first().cloned().unwrap_or_default();
        let mut facets = Vec::new();
        for surface in outer {
            facets.extend(model.surface_facets(surface)?);
        }
        shapes.push(ObjectShape {
            key,
            bounds: model.bounding_box(*object)?,
            facets,
        });
    }

    let mut tool_volumes: Vec<VolumeKey> = Vec::new();
    let mut free_surfaces: Vec<SurfaceKey> = Vec::new();
    let mut seen: FxHashSet<Entity> = FxHashSet::default();
    for tool in tools {
        if !seen.insert(*tool) || objects.contains(tool) {
            continue;
        }
        match tool.dim {
            Dim::Volume => tool_volumes.push(model.volume_key(tool.tag)?),
            Dim::Surface => free_surfaces.push(model.surface_key(tool.tag)?),
            _ => {
                return Err(KernelError::Boolean(format!(
                    "tool {} has dimension below 2",
                    tool
                )))
            }
        }
    }

    // Surfaces bounding a tool volume travel with that volume
    let bound: FxHashSet<SurfaceKey> = tool_volumes
        .iter()
        .flat_map(|&v| model.volumes[v].shells.iter().flatten().copied().collect::<Vec<_>>())
        .collect();
    free_surfaces.retain(|s| !bound.contains(s));

    let scale = shapes
        .iter()
        .map(|s| s.bounds.max_extent())
        .fold(0.0, f64::max)
        .max(1.0);
    let tol = 1e-9 * scale;

    check_tool_overlap(model, &tool_volumes, tol)?;

    // (object index, new inner shells, new embedded surfaces)
    let mut inner_shells: Vec<Vec<Vec<SurfaceKey>>> = vec![Vec::new(); shapes.len()];
    let mut embedded: Vec<Vec<SurfaceKey>> = vec![Vec::new(); shapes.len()];

    for &volume in &tool_volumes {
        let tag = model.volumes[volume].tag;
        let points = model.entity_points(Entity::volume(tag))?;
        let owner = owning_object(&shapes, &points, tol)
            .ok_or_else(|| KernelError::Boolean(format!("tool volume {} crosses the object boundary", tag)))?;
        if let Some(outer) = model.volumes[volume].shells.first() {
            inner_shells[owner].push(outer.clone());
        }
    }

    for group in connected_surface_sets(model, &free_surfaces) {
        let mut points = Vec::new();
        for &surface in &group {
            points.extend(model.entity_points(Entity::surface(model.surfaces[surface].tag))?);
        }
        let owner = owning_object(&shapes, &points, tol).ok_or_else(|| {
            KernelError::Boolean(format!(
                "tool surface {} crosses the object boundary",
                model.surfaces[group[0]].tag
            ))
        })?;
        if is_closed_set(model, &group) {
            inner_shells[owner].push(group);
        } else {
            embedded[owner].extend(group);
        }
    }

    for (i, shape) in shapes.iter().enumerate() {
        let volume = &mut model.volumes[shape.key];
        volume.shells.extend(inner_shells[i].drain(..));
        volume.embedded.extend(embedded[i].drain(..));
    }
    model.reindex();

    let mut output = FragmentOutput::default();
    for object in objects {
        output.parent_map.push(vec![*object]);
    }
    let mut listed: FxHashSet<Entity> = FxHashSet::default();
    for tool in tools {
        if listed.insert(*tool) && !objects.contains(tool) {
            output.parent_map.push(vec![*tool]);
        } else {
            output.parent_map.push(Vec::new());
        }
    }
    output.entities = output.parent_map.iter().flatten().copied().collect();

    tracing::debug!(
        objects = objects.len(),
        tool_volumes = tool_volumes.len(),
        free_surfaces = free_surfaces.len(),
        "Fragmented"
    );
    Ok(output)
}

fn owning_object(shapes: &[ObjectShape], points: &[Point3<f64>], tol: f64) -> Option<usize> {
    if points.is_empty() {
        return None;
    }
    shapes.iter().position(|shape| shape.strictly_contains(points, tol))
}

/// Tool volumes may touch but not overlap.
fn check_tool_overlap(model: &Model, volumes: &[VolumeKey], tol: f64) -> Result<()> {
    let mut boxes = Vec::with_capacity(volumes.len());
    for &v in volumes {
        let entity = Entity::volume(model.volumes[v].tag);
        boxes.push((entity, model.bounding_box(entity)?));
    }
    for (i, (a, box_a)) in boxes.iter().enumerate() {
        for (b, box_b) in boxes.iter().skip(i + 1) {
            let overlap = box_a.min_x.max(box_b.min_x) + tol < box_a.max_x.min(box_b.max_x)
                && box_a.min_y.max(box_b.min_y) + tol < box_a.max_y.min(box_b.max_y)
                && box_a.min_z.max(box_b.min_z) + tol < box_a.max_z.min(box_b.max_z);
            if !overlap {
                continue;
            }
            let shape_of = |e: &Entity| -> Result<ObjectShape> {
                let key = model.volume_key(e.tag)?;
                let mut facets = Vec::new();
                for &s in model.volumes[key].shells.iter().flatten() {
                    facets.extend(model.surface_facets(s)?);
                }
                Ok(ObjectShape {
                    key,
                    bounds: model.bounding_box(*e)?,
                    facets,
                })
            };
            let (shape_a, shape_b) = (shape_of(a)?, shape_of(b)?);
            let points_a = model.entity_points(*a)?;
            let points_b = model.entity_points(*b)?;
            let any_inside = |shape: &ObjectShape, points: &[Point3<f64>]| {
                points.iter().any(|p| shape.strictly_contains(std::slice::from_ref(p), tol))
            };
            if any_inside(&shape_a, &points_b) || any_inside(&shape_b, &points_a) || box_a == box_b {
                return Err(KernelError::Boolean(format!("tool volumes {} and {} overlap", a, b)));
            }
        }
    }
    Ok(())
}

/// Group surfaces that share curves.
fn connected_surface_sets(model: &Model, surfaces: &[SurfaceKey]) -> Vec<Vec<SurfaceKey>> {
    let mut by_curve: FxHashMap<CurveKey, Vec<usize>> = FxHashMap::default();
    for (i, &s) in surfaces.iter().enumerate() {
        for &(curve, _) in model.surfaces[s].loops.iter().flatten() {
            by_curve.entry(curve).or_default().push(i);
        }
    }

    let mut group_of: Vec<Option<usize>> = vec![None; surfaces.len()];
    let mut groups: Vec<Vec<SurfaceKey>> = Vec::new();
    for start in 0..surfaces.len() {
        if group_of[start].is_some() {
            continue;
        }
        let id = groups.len();
        let mut members = Vec::new();
        let mut stack = vec![start];
        group_of[start] = Some(id);
        while let Some(i) = stack.pop() {
            members.push(surfaces[i]);
            for &(curve, _) in model.surfaces[surfaces[i]].loops.iter().flatten() {
                for &j in &by_curve[&curve] {
                    if group_of[j].is_none() {
                        group_of[j] = Some(id);
                        stack.push(j);
                    }
                }
            }
        }
        groups.push(members);
    }
    groups
}

/// Every curve used exactly twice, or a single discrete surface without
/// free edges.
fn is_closed_set(model: &Model, surfaces: &[SurfaceKey]) -> bool {
    if let [single] = surfaces {
        let s = &model.surfaces[*single];
        if s.is_discrete() && s.loops.is_empty() {
            return true;
        }
    }
    let mut uses: FxHashMap<CurveKey, usize> = FxHashMap::default();
    for &s in surfaces {
        for &(curve, _) in model.surfaces[s].loops.iter().flatten() {
            *uses.entry(curve).or_default() += 1;
        }
    }
    !uses.is_empty() && uses.values().all(|&n| n == 2)
}
