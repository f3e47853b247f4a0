// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Shape healing.
//!
//! One pass runs, in order: point welding, duplicate-curve merging, removal
//! of degenerate and small curves, duplicate-face merging, removal of small
//! faces, and finally removal of volumes that lost all their boundary. Each
//! step only removes what the previous steps exposed, so a second pass with
//! the same options finds nothing to do.

use nalgebra::Point3;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::entity::{Dim, Entity};
use crate::error::Result;
use crate::model::{CurveKey, Model, PointKey, SurfaceKey, VolumeKey};
use crate::options::HealingOptions;

/// What one healing pass changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HealReport {
    pub welded_points: usize,
    pub merged_curves: usize,
    pub removed_curves: usize,
    pub merged_surfaces: usize,
    pub removed_surfaces: usize,
    pub removed_volumes: usize,
}

impl HealReport {
    pub fn changed(&self) -> bool {
        *self != HealReport::default()
    }
}

/// Entities a healing pass may touch.
struct Scope {
    points: FxHashSet<PointKey>,
    curves: FxHashSet<CurveKey>,
    surfaces: FxHashSet<SurfaceKey>,
    volumes: FxHashSet<VolumeKey>,
}

impl Scope {
    fn everything(model: &Model) -> Self {
        Self {
            points: model.points.keys().collect(),
            curves: model.curves.keys().collect(),
            surfaces: model.surfaces.keys().collect(),
            volumes: model.volumes.keys().collect(),
        }
    }

    /// The given entities and everything on their boundaries.
    fn closure(model: &Model, entities: &[Entity]) -> Result<Self> {
        let mut scope = Scope {
            points: FxHashSet::default(),
            curves: FxHashSet::default(),
            surfaces: FxHashSet::default(),
            volumes: FxHashSet::default(),
        };
        for entity in entities {
            match entity.dim {
                Dim::Volume => {
                    let key = model.volume_key(entity.tag)?;
                    scope.volumes.insert(key);
                    let volume = &model.volumes[key];
                    scope
                        .surfaces
                        .extend(volume.shells.iter().flatten().chain(volume.embedded.iter()));
                }
                Dim::Surface => {
                    scope.surfaces.insert(model.surface_key(entity.tag)?);
                }
                Dim::Curve => {
                    scope.curves.insert(model.curve_key(entity.tag)?);
                }
                Dim::Point => {
                    scope.points.insert(model.point_key(entity.tag)?);
                }
            }
        }
        for &surface in &scope.surfaces {
            for &(curve, _) in model.surfaces[surface].loops.iter().flatten() {
                scope.curves.insert(curve);
            }
        }
        for &curve in &scope.curves {
            let data = &model.curves[curve];
            scope.points.insert(data.start);
            scope.points.insert(data.end);
        }
        Ok(scope)
    }
}

/// Heal the whole model.
pub fn heal_model(model: &mut Model, options: &HealingOptions) -> HealReport {
    let scope = Scope::everything(model);
    heal_scope(model, options, scope)
}

/// Heal the given entities and their boundaries.
pub fn heal_entities(model: &mut Model, entities: &[Entity], options: &HealingOptions) -> Result<HealReport> {
    let scope = Scope::closure(model, entities)?;
    Ok(heal_scope(model, options, scope))
}

fn heal_scope(model: &mut Model, options: &HealingOptions, mut scope: Scope) -> HealReport {
    let tol = options.tolerance.max(0.0);
    let mut report = HealReport::default();

    if options.sew_faces || options.fix_small_edges {
        report.welded_points = weld_points(model, &mut scope, tol);
    }
    if options.sew_faces {
        report.merged_curves = merge_duplicate_curves(model, &mut scope, tol);
    }
    if options.fix_degenerate || options.fix_small_edges {
        report.removed_curves = remove_short_curves(model, &mut scope, tol, options);
    }
    if options.sew_faces {
        report.merged_surfaces = merge_duplicate_surfaces(model, &mut scope);
    }
    if options.fix_small_faces || options.fix_degenerate {
        report.removed_surfaces = remove_small_surfaces(model, &mut scope, tol, options);
    }
    if report.removed_surfaces > 0 || options.make_solids {
        report.removed_volumes = remove_empty_volumes(model, &scope);
    }

    if report.changed() {
        model.reindex();
        tracing::debug!(
            welded = report.welded_points,
            merged_curves = report.merged_curves,
            curves = report.removed_curves,
            merged_surfaces = report.merged_surfaces,
            surfaces = report.removed_surfaces,
            volumes = report.removed_volumes,
            tolerance = tol,
            "Healing pass"
        );
    }
    report
}

pub(crate) type Cell = (i64, i64, i64);

/// Grid cell of `p` for cells of edge `size`. Out-of-range values clamp to
/// the outermost cell.
pub(crate) fn cell_of(p: &Point3<f64>, size: f64) -> Cell {
    let axis = |v: f64| (v / size).floor() as i64;
    (axis(p.x), axis(p.y), axis(p.z))
}

/// The 27 cells around and including `cell`, saturating at the grid edge.
pub(crate) fn neighbour_cells(cell: Cell) -> impl Iterator<Item = Cell> {
    let (cx, cy, cz) = cell;
    (-1..=1i64).flat_map(move |dx| {
        (-1..=1i64).flat_map(move |dy| {
            (-1..=1i64).map(move |dz| {
                (cx.saturating_add(dx), cy.saturating_add(dy), cz.saturating_add(dz))
            })
        })
    })
}

fn find(parent: &mut FxHashMap<PointKey, PointKey>, key: PointKey) -> PointKey {
    let mut root = key;
    while let Some(&next) = parent.get(&root) {
        if next == root {
            break;
        }
        root = next;
    }
    // Path compression
    let mut current = key;
    while current != root {
        let next = parent[&current];
        parent.insert(current, root);
        current = next;
    }
    root
}

/// Merge points closer than `tol`; the lowest tag of each cluster survives
/// in place.
fn weld_points(model: &mut Model, scope: &mut Scope, tol: f64) -> usize {
    if tol <= 0.0 || scope.points.len() < 2 {
        return 0;
    }

    let mut ordered: Vec<PointKey> = scope.points.iter().copied().collect();
    ordered.sort_by_key(|&k| model.points[k].tag);

    let mut grid: FxHashMap<Cell, Vec<PointKey>> = FxHashMap::default();
    for &key in &ordered {
        grid.entry(cell_of(&model.points[key].position, tol))
            .or_default()
            .push(key);
    }

    let mut parent: FxHashMap<PointKey, PointKey> = ordered.iter().map(|&k| (k, k)).collect();
    for &key in &ordered {
        let p = model.points[key].position;
        for cell in neighbour_cells(cell_of(&p, tol)) {
            let Some(neighbours) = grid.get(&cell) else {
                continue;
            };
            for &other in neighbours {
                if other == key || (model.points[other].position - p).norm() >= tol {
                    continue;
                }
                let a = find(&mut parent, key);
                let b = find(&mut parent, other);
                if a != b {
                    // Keep the lower tag as the root
                    let (keep, drop) = if model.points[a].tag < model.points[b].tag {
                        (a, b)
                    } else {
                        (b, a)
                    };
                    parent.insert(drop, keep);
                }
            }
        }
    }

    let mut replacement: FxHashMap<PointKey, PointKey> = FxHashMap::default();
    for &key in &ordered {
        let root = find(&mut parent, key);
        if root != key {
            replacement.insert(key, root);
        }
    }
    if replacement.is_empty() {
        return 0;
    }

    for curve in model.curves.values_mut() {
        if let Some(&r) = replacement.get(&curve.start) {
            curve.start = r;
        }
        if let Some(&r) = replacement.get(&curve.end) {
            curve.end = r;
        }
    }
    for &dropped in replacement.keys() {
        model.remove_point_unchecked(dropped);
        scope.points.remove(&dropped);
    }
    replacement.len()
}

/// Two curves are duplicates when they join the same points along the same
/// path (within `tol`).
fn same_path(model: &Model, a: CurveKey, b: CurveKey, tol: f64) -> Option<bool> {
    let ca = &model.curves[a];
    let cb = &model.curves[b];
    if ca.interior.len() != cb.interior.len() {
        return None;
    }
    let forward = ca.start == cb.start && ca.end == cb.end;
    let reverse = ca.start == cb.end && ca.end == cb.start;
    let close = |x: &Point3<f64>, y: &Point3<f64>| (x - y).norm() < tol.max(1e-12);

    if forward && ca.interior.iter().zip(&cb.interior).all(|(x, y)| close(x, y)) {
        return Some(true);
    }
    if reverse && ca.interior.iter().zip(cb.interior.iter().rev()).all(|(x, y)| close(x, y)) {
        return Some(false);
    }
    None
}

fn merge_duplicate_curves(model: &mut Model, scope: &mut Scope, tol: f64) -> usize {
    let mut ordered: Vec<CurveKey> = scope.curves.iter().copied().collect();
    ordered.sort_by_key(|&k| model.curves[k].tag);

    let mut by_ends: FxHashMap<(PointKey, PointKey), Vec<CurveKey>> = FxHashMap::default();
    // duplicate -> (kept curve, same direction)
    let mut replacement: FxHashMap<CurveKey, (CurveKey, bool)> = FxHashMap::default();

    for &key in &ordered {
        let c = &model.curves[key];
        let ends = if c.start <= c.end { (c.start, c.end) } else { (c.end, c.start) };
        let bucket = by_ends.entry(ends).or_default();
        let original = bucket
            .iter()
            .find_map(|&kept| same_path(model, kept, key, tol).map(|dir| (kept, dir)));
        match original {
            Some(found) => {
                replacement.insert(key, found);
            }
            None => bucket.push(key),
        }
    }
    if replacement.is_empty() {
        return 0;
    }

    for surface in model.surfaces.values_mut() {
        for (curve, forward) in surface.loops.iter_mut().flatten() {
            if let Some(&(kept, same_direction)) = replacement.get(&*curve) {
                *curve = kept;
                if !same_direction {
                    *forward = !*forward;
                }
            }
        }
    }
    for &dup in replacement.keys() {
        model.remove_curve_unchecked(dup);
        scope.curves.remove(&dup);
    }
    replacement.len()
}

fn remove_short_curves(model: &mut Model, scope: &mut Scope, tol: f64, options: &HealingOptions) -> usize {
    let doomed: FxHashSet<CurveKey> = scope
        .curves
        .iter()
        .copied()
        .filter(|&key| {
            let length = model.curve_length(key);
            let closed = model.curves[key].start == model.curves[key].end;
            (options.fix_degenerate && closed && length <= tol)
                || (options.fix_small_edges && length < tol)
        })
        .collect();
    if doomed.is_empty() {
        return 0;
    }

    for surface in model.surfaces.values_mut() {
        for curve_loop in surface.loops.iter_mut() {
            curve_loop.retain(|(curve, _)| !doomed.contains(curve));
        }
        surface.loops.retain(|l| !l.is_empty());
    }
    for &key in &doomed {
        model.remove_curve_unchecked(key);
        scope.curves.remove(&key);
    }
    doomed.len()
}

/// Coincident bounded surfaces (same curves, any order or direction) are
/// merged so that the volumes on both sides share one face.
fn merge_duplicate_surfaces(model: &mut Model, scope: &mut Scope) -> usize {
    let mut ordered: Vec<SurfaceKey> = scope
        .surfaces
        .iter()
        .copied()
        .filter(|&k| !model.surfaces[k].is_discrete() && !model.surfaces[k].loops.is_empty())
        .collect();
    ordered.sort_by_key(|&k| model.surfaces[k].tag);

    let mut seen: FxHashMap<Vec<CurveKey>, SurfaceKey> = FxHashMap::default();
    let mut replacement: FxHashMap<SurfaceKey, SurfaceKey> = FxHashMap::default();
    for key in ordered {
        let mut signature: Vec<CurveKey> = model.surfaces[key]
            .loops
            .iter()
            .flatten()
            .map(|&(curve, _)| curve)
            .collect();
        signature.sort_unstable();
        match seen.get(&signature) {
            Some(&kept) => {
                replacement.insert(key, kept);
            }
            None => {
                seen.insert(signature, key);
            }
        }
    }
    if replacement.is_empty() {
        return 0;
    }

    for volume in model.volumes.values_mut() {
        for surface in volume.shells.iter_mut().flatten().chain(volume.embedded.iter_mut()) {
            if let Some(&kept) = replacement.get(&*surface) {
                *surface = kept;
            }
        }
    }
    for &dup in replacement.keys() {
        model.remove_surface_unchecked(dup);
        scope.surfaces.remove(&dup);
    }
    replacement.len()
}

fn is_small_surface(model: &Model, key: SurfaceKey, tol: f64) -> bool {
    let surface = &model.surfaces[key];
    if !surface.is_discrete() && surface.loops.is_empty() {
        return true;
    }
    let Ok(bounds) = model.bounding_box(Entity::surface(surface.tag)) else {
        return true;
    };
    if bounds.max_extent() < tol {
        return true;
    }
    // Non-planar loops that cannot be projected are kept; meshing decides
    match model.surface_facets(key) {
        Ok(facets) => {
            let area: f64 = facets
                .iter()
                .map(|[a, b, c]| (b - a).cross(&(c - a)).norm() / 2.0)
                .sum();
            area < tol * tol
        }
        Err(_) => false,
    }
}

fn remove_small_surfaces(model: &mut Model, scope: &mut Scope, tol: f64, options: &HealingOptions) -> usize {
    let doomed: FxHashSet<SurfaceKey> = scope
        .surfaces
        .iter()
        .copied()
        .filter(|&key| {
            let surface = &model.surfaces[key];
            let empty = !surface.is_discrete() && surface.loops.is_empty();
            (options.fix_degenerate && empty) || (options.fix_small_faces && is_small_surface(model, key, tol))
        })
        .collect();
    if doomed.is_empty() {
        return 0;
    }

    for volume in model.volumes.values_mut() {
        for shell in volume.shells.iter_mut() {
            shell.retain(|s| !doomed.contains(s));
        }
        volume.embedded.retain(|s| !doomed.contains(s));
    }
    for &key in &doomed {
        model.remove_surface_unchecked(key);
        scope.surfaces.remove(&key);
    }
    doomed.len()
}

fn remove_empty_volumes(model: &mut Model, scope: &Scope) -> usize {
    let mut removed = 0;
    for &key in &scope.volumes {
        let Some(volume) = model.volumes.get_mut(key) else {
            continue;
        };
        volume.shells.retain(|shell| !shell.is_empty());
        if volume.shells.is_empty() {
            model.remove_volume_unchecked(key);
            removed += 1;
        }
    }
    removed
}
