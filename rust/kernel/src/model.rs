// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Arena-based storage for the kernel's geometric model.
//!
//! The [`Model`] owns every point, curve, surface and volume in slot maps with
//! stable generational keys. Integer tags (the public handle of an
//! [`Entity`]) map onto those keys per dimension. Upward adjacency
//! (point → curves → surfaces → volumes) is rebuilt after each topological
//! edit so that queries such as "which volumes use this surface" stay O(1).
//!
//! Surfaces come in two flavours:
//! - **bounded**: one or more closed loops of oriented curves, the first loop
//!   being the outer boundary. The surface is the (assumed planar-ish) region
//!   enclosed by the loops.
//! - **discrete**: an explicit triangle soup, as produced by STL import.
//!   Boundary curves are only created on request (see
//!   [`Model::create_discrete_edges`]).

use nalgebra::Point3;
use rustc_hash::{FxHashMap, FxHashSet};
use slotmap::{new_key_type, SlotMap};
use smallvec::SmallVec;

use intake_mesh_core::BoundingBox;

use crate::entity::{Dim, Entity};
use crate::error::{KernelError, Result};
use crate::field::FieldSet;
use crate::mesh::MeshData;
use crate::tessellate::triangulate_loops;

new_key_type! {
    /// Key for a geometric point.
    pub struct PointKey;

    /// Key for a curve (polyline between two points).
    pub struct CurveKey;

    /// Key for a surface (bounded by curve loops, or discrete).
    pub struct SurfaceKey;

    /// Key for a volume (bounded by surface shells).
    pub struct VolumeKey;
}

/// A point in 3D space.
#[derive(Debug, Clone)]
pub struct PointData {
    pub tag: i32,
    pub position: Point3<f64>,
}

/// A curve: polyline from `start` through `interior` to `end`.
#[derive(Debug, Clone)]
pub struct CurveData {
    pub tag: i32,
    pub start: PointKey,
    pub end: PointKey,
    pub interior: Vec<Point3<f64>>,
}

/// Closed loop of curves; `true` traverses a curve from start to end.
pub type CurveLoop = Vec<(CurveKey, bool)>;

#[derive(Debug, Clone)]
pub struct SurfaceData {
    pub tag: i32,
    /// Outer loop first, then holes. Empty for discrete surfaces until
    /// their edges are created.
    pub loops: Vec<CurveLoop>,
    /// Explicit triangles of a discrete surface.
    pub facets: Vec<[Point3<f64>; 3]>,
}

impl SurfaceData {
    pub fn is_discrete(&self) -> bool {
        !self.facets.is_empty()
    }
}

/// A volume: `shells[0]` is the outer boundary, further shells are voids.
#[derive(Debug, Clone)]
pub struct VolumeData {
    pub tag: i32,
    pub shells: Vec<Vec<SurfaceKey>>,
    /// Open surfaces imprinted inside the volume without bounding it.
    pub embedded: Vec<SurfaceKey>,
}

/// Named group of entities of one dimension, written to mesh files.
#[derive(Debug, Clone, PartialEq)]
pub struct PhysicalGroup {
    pub dim: Dim,
    pub tag: i32,
    pub name: String,
    pub entities: Vec<i32>,
}

/// The kernel's geometric model.
#[derive(Debug)]
pub struct Model {
    pub name: String,

    pub(crate) points: SlotMap<PointKey, PointData>,
    pub(crate) curves: SlotMap<CurveKey, CurveData>,
    pub(crate) surfaces: SlotMap<SurfaceKey, SurfaceData>,
    pub(crate) volumes: SlotMap<VolumeKey, VolumeData>,

    // Tag → key lookup per dimension
    point_tags: FxHashMap<i32, PointKey>,
    curve_tags: FxHashMap<i32, CurveKey>,
    surface_tags: FxHashMap<i32, SurfaceKey>,
    volume_tags: FxHashMap<i32, VolumeKey>,
    next_tag: [i32; 4],

    // Upward adjacency: child → parents
    point_to_curves: FxHashMap<PointKey, FxHashSet<CurveKey>>,
    curve_to_surfaces: FxHashMap<CurveKey, FxHashSet<SurfaceKey>>,
    surface_to_volumes: FxHashMap<SurfaceKey, FxHashSet<VolumeKey>>,

    /// Set by construction calls, cleared by `synchronize`.
    pub(crate) dirty: bool,

    pub(crate) physical_groups: Vec<PhysicalGroup>,
    pub(crate) fields: FieldSet,
    pub(crate) mesh: MeshData,
}

impl Model {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            points: SlotMap::with_key(),
            curves: SlotMap::with_key(),
            surfaces: SlotMap::with_key(),
            volumes: SlotMap::with_key(),
            point_tags: FxHashMap::default(),
            curve_tags: FxHashMap::default(),
            surface_tags: FxHashMap::default(),
            volume_tags: FxHashMap::default(),
            next_tag: [1; 4],
            point_to_curves: FxHashMap::default(),
            curve_to_surfaces: FxHashMap::default(),
            surface_to_volumes: FxHashMap::default(),
            dirty: false,
            physical_groups: Vec::new(),
            fields: FieldSet::default(),
            mesh: MeshData::default(),
        }
    }

    fn take_tag(&mut self, dim: Dim) -> i32 {
        let slot = &mut self.next_tag[dim as usize];
        let tag = *slot;
        *slot += 1;
        tag
    }

    // --- Construction ---

    pub fn add_point(&mut self, position: Point3<f64>) -> PointKey {
        let tag = self.take_tag(Dim::Point);
        let key = self.points.insert(PointData { tag, position });
        self.point_tags.insert(tag, key);
        self.dirty = true;
        key
    }

    pub fn add_curve(&mut self, start: PointKey, end: PointKey, interior: Vec<Point3<f64>>) -> CurveKey {
        let tag = self.take_tag(Dim::Curve);
        let key = self.curves.insert(CurveData {
            tag,
            start,
            end,
            interior,
        });
        self.curve_tags.insert(tag, key);
        self.point_to_curves.entry(start).or_default().insert(key);
        self.point_to_curves.entry(end).or_default().insert(key);
        self.dirty = true;
        key
    }

    pub fn add_surface(&mut self, loops: Vec<CurveLoop>) -> SurfaceKey {
        self.insert_surface(loops, Vec::new())
    }

    pub fn add_discrete_surface(&mut self, facets: Vec<[Point3<f64>; 3]>) -> SurfaceKey {
        self.insert_surface(Vec::new(), facets)
    }

    fn insert_surface(&mut self, loops: Vec<CurveLoop>, facets: Vec<[Point3<f64>; 3]>) -> SurfaceKey {
        let tag = self.take_tag(Dim::Surface);
        let key = self.surfaces.insert(SurfaceData { tag, loops, facets });
        self.surface_tags.insert(tag, key);
        for &(curve, _) in self.surfaces[key].loops.iter().flatten() {
            self.curve_to_surfaces.entry(curve).or_default().insert(key);
        }
        self.dirty = true;
        key
    }

    pub fn add_volume(&mut self, shells: Vec<Vec<SurfaceKey>>) -> VolumeKey {
        let tag = self.take_tag(Dim::Volume);
        let key = self.volumes.insert(VolumeData {
            tag,
            shells,
            embedded: Vec::new(),
        });
        self.volume_tags.insert(tag, key);
        for &surface in self.volumes[key].shells.iter().flatten() {
            self.surface_to_volumes.entry(surface).or_default().insert(key);
        }
        self.dirty = true;
        key
    }

    /// Rebuild upward adjacency after in-place edits of loops or shells.
    pub(crate) fn reindex(&mut self) {
        self.point_to_curves.clear();
        self.curve_to_surfaces.clear();
        self.surface_to_volumes.clear();

        for (key, curve) in &self.curves {
            self.point_to_curves.entry(curve.start).or_default().insert(key);
            self.point_to_curves.entry(curve.end).or_default().insert(key);
        }
        for (key, surface) in &self.surfaces {
            for &(curve, _) in surface.loops.iter().flatten() {
                self.curve_to_surfaces.entry(curve).or_default().insert(key);
            }
        }
        for (key, volume) in &self.volumes {
            for &surface in volume.shells.iter().flatten().chain(volume.embedded.iter()) {
                self.surface_to_volumes.entry(surface).or_default().insert(key);
            }
        }
        self.dirty = true;
    }

    // --- Tag lookup ---

    pub fn point_key(&self, tag: i32) -> Result<PointKey> {
        self.point_tags
            .get(&tag)
            .copied()
            .ok_or(KernelError::EntityNotFound(Entity::point(tag)))
    }

    pub fn curve_key(&self, tag: i32) -> Result<CurveKey> {
        self.curve_tags
            .get(&tag)
            .copied()
            .ok_or(KernelError::EntityNotFound(Entity::curve(tag)))
    }

    pub fn surface_key(&self, tag: i32) -> Result<SurfaceKey> {
        self.surface_tags
            .get(&tag)
            .copied()
            .ok_or(KernelError::EntityNotFound(Entity::surface(tag)))
    }

    pub fn volume_key(&self, tag: i32) -> Result<VolumeKey> {
        self.volume_tags
            .get(&tag)
            .copied()
            .ok_or(KernelError::EntityNotFound(Entity::volume(tag)))
    }

    pub fn contains(&self, entity: Entity) -> bool {
        match entity.dim {
            Dim::Point => self.point_tags.contains_key(&entity.tag),
            Dim::Curve => self.curve_tags.contains_key(&entity.tag),
            Dim::Surface => self.surface_tags.contains_key(&entity.tag),
            Dim::Volume => self.volume_tags.contains_key(&entity.tag),
        }
    }

    /// All entities of one dimension (or every dimension), sorted by tag.
    pub fn entities(&self, dim: Option<Dim>) -> Vec<Entity> {
        let dims: SmallVec<[Dim; 4]> = match dim {
            Some(d) => SmallVec::from_slice(&[d]),
            None => SmallVec::from_slice(&Dim::ALL),
        };
        let mut out = Vec::new();
        for d in dims {
            let mut tags: Vec<i32> = match d {
                Dim::Point => self.point_tags.keys().copied().collect(),
                Dim::Curve => self.curve_tags.keys().copied().collect(),
                Dim::Surface => self.surface_tags.keys().copied().collect(),
                Dim::Volume => self.volume_tags.keys().copied().collect(),
            };
            tags.sort_unstable();
            out.extend(tags.into_iter().map(|tag| Entity::new(d, tag)));
        }
        out
    }

    pub fn count(&self, dim: Dim) -> usize {
        match dim {
            Dim::Point => self.points.len(),
            Dim::Curve => self.curves.len(),
            Dim::Surface => self.surfaces.len(),
            Dim::Volume => self.volumes.len(),
        }
    }

    /// Entity counts indexed by dimension.
    pub fn counts(&self) -> [usize; 4] {
        Dim::ALL.map(|d| self.count(d))
    }

    // --- Geometry queries ---

    /// Points of a curve in traversal order, endpoints included.
    pub fn curve_polyline(&self, key: CurveKey, forward: bool) -> Vec<Point3<f64>> {
        let curve = &self.curves[key];
        let mut pts = Vec::with_capacity(curve.interior.len() + 2);
        pts.push(self.points[curve.start].position);
        pts.extend(curve.interior.iter().copied());
        pts.push(self.points[curve.end].position);
        if !forward {
            pts.reverse();
        }
        pts
    }

    pub fn curve_length(&self, key: CurveKey) -> f64 {
        self.curve_polyline(key, true)
            .windows(2)
            .map(|w| (w[1] - w[0]).norm())
            .sum()
    }

    /// Closed polyline of a curve loop, without repeating the first point.
    pub fn loop_polyline(&self, curve_loop: &[(CurveKey, bool)]) -> Vec<Point3<f64>> {
        let mut pts = Vec::new();
        for &(curve, forward) in curve_loop {
            let poly = self.curve_polyline(curve, forward);
            pts.extend_from_slice(&poly[..poly.len() - 1]);
        }
        pts
    }

    /// Triangles covering a surface: its facets, or a triangulation of its
    /// boundary loops.
    pub fn surface_facets(&self, key: SurfaceKey) -> Result<Vec<[Point3<f64>; 3]>> {
        let surface = &self.surfaces[key];
        if surface.is_discrete() {
            return Ok(surface.facets.clone());
        }
        let loops: Vec<Vec<Point3<f64>>> = surface
            .loops
            .iter()
            .map(|l| self.loop_polyline(l))
            .collect();
        let (points, triangles) = triangulate_loops(&loops).map_err(|reason| {
            KernelError::Geometry(format!("surface {} cannot be tessellated: {}", surface.tag, reason))
        })?;
        Ok(triangles
            .into_iter()
            .map(|[a, b, c]| [points[a], points[b], points[c]])
            .collect())
    }

    pub fn surface_area(&self, key: SurfaceKey) -> f64 {
        self.surface_facets(key)
            .map(|facets| {
                facets
                    .iter()
                    .map(|[a, b, c]| (b - a).cross(&(c - a)).norm() / 2.0)
                    .sum()
            })
            .unwrap_or(0.0)
    }

    /// Every coordinate that contributes to an entity's extent.
    pub fn entity_points(&self, entity: Entity) -> Result<Vec<Point3<f64>>> {
        let mut out = Vec::new();
        match entity.dim {
            Dim::Point => out.push(self.points[self.point_key(entity.tag)?].position),
            Dim::Curve => out.extend(self.curve_polyline(self.curve_key(entity.tag)?, true)),
            Dim::Surface => self.collect_surface_points(self.surface_key(entity.tag)?, &mut out),
            Dim::Volume => {
                let volume = &self.volumes[self.volume_key(entity.tag)?];
                for &surface in volume.shells.iter().flatten().chain(volume.embedded.iter()) {
                    self.collect_surface_points(surface, &mut out);
                }
            }
        }
        Ok(out)
    }

    fn collect_surface_points(&self, key: SurfaceKey, out: &mut Vec<Point3<f64>>) {
        let surface = &self.surfaces[key];
        for curve_loop in &surface.loops {
            out.extend(self.loop_polyline(curve_loop));
        }
        for facet in &surface.facets {
            out.extend_from_slice(facet);
        }
    }

    pub fn bounding_box(&self, entity: Entity) -> Result<BoundingBox> {
        let points = self.entity_points(entity)?;
        BoundingBox::from_points(&points)
            .ok_or_else(|| KernelError::Geometry(format!("entity {} has no extent", entity)))
    }

    /// Bounds of everything in the model, `None` for an empty model.
    pub fn model_bounding_box(&self) -> Option<BoundingBox> {
        let mut bounds = BoundingBox::empty();
        for point in self.points.values() {
            bounds.expand(&point.position);
        }
        for curve in self.curves.values() {
            for p in &curve.interior {
                bounds.expand(p);
            }
        }
        for surface in self.surfaces.values() {
            for p in surface.facets.iter().flatten() {
                bounds.expand(p);
            }
        }
        bounds.is_valid().then_some(bounds)
    }

    // --- Topology queries ---

    /// Direct boundary of an entity with orientation flags.
    pub fn boundary_of(&self, entity: Entity) -> Result<Vec<(Entity, bool)>> {
        Ok(match entity.dim {
            Dim::Point => {
                self.point_key(entity.tag)?;
                Vec::new()
            }
            Dim::Curve => {
                let curve = &self.curves[self.curve_key(entity.tag)?];
                vec![
                    (Entity::point(self.points[curve.start].tag), true),
                    (Entity::point(self.points[curve.end].tag), false),
                ]
            }
            Dim::Surface => {
                let surface = &self.surfaces[self.surface_key(entity.tag)?];
                surface
                    .loops
                    .iter()
                    .flatten()
                    .map(|&(curve, forward)| (Entity::curve(self.curves[curve].tag), forward))
                    .collect()
            }
            Dim::Volume => {
                let volume = &self.volumes[self.volume_key(entity.tag)?];
                volume
                    .shells
                    .iter()
                    .flatten()
                    .map(|&surface| (Entity::surface(self.surfaces[surface].tag), true))
                    .collect()
            }
        })
    }

    /// Volumes bounded by (or embedding) a surface.
    pub fn volumes_of_surface(&self, key: SurfaceKey) -> Vec<VolumeKey> {
        self.surface_to_volumes
            .get(&key)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn surfaces_of_curve(&self, key: CurveKey) -> Vec<SurfaceKey> {
        self.curve_to_surfaces
            .get(&key)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn curves_of_point(&self, key: PointKey) -> Vec<CurveKey> {
        self.point_to_curves
            .get(&key)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// True when the entity bounds something of higher dimension.
    pub fn is_used(&self, entity: Entity) -> Result<bool> {
        Ok(match entity.dim {
            Dim::Point => !self.curves_of_point(self.point_key(entity.tag)?).is_empty(),
            Dim::Curve => !self.surfaces_of_curve(self.curve_key(entity.tag)?).is_empty(),
            Dim::Surface => !self.volumes_of_surface(self.surface_key(entity.tag)?).is_empty(),
            Dim::Volume => {
                self.volume_key(entity.tag)?;
                false
            }
        })
    }

    // --- Removal ---

    /// Remove one entity; with `recursive`, also its boundary entities that
    /// end up unused.
    pub fn remove(&mut self, entity: Entity, recursive: bool) -> Result<()> {
        if self.is_used(entity)? {
            return Err(KernelError::EntityInUse(entity));
        }
        let children: Vec<Entity> = if recursive {
            self.boundary_of(entity)?.into_iter().map(|(e, _)| e).collect()
        } else {
            Vec::new()
        };

        match entity.dim {
            Dim::Point => {
                let key = self.point_key(entity.tag)?;
                self.points.remove(key);
                self.point_tags.remove(&entity.tag);
            }
            Dim::Curve => {
                let key = self.curve_key(entity.tag)?;
                self.curves.remove(key);
                self.curve_tags.remove(&entity.tag);
            }
            Dim::Surface => {
                let key = self.surface_key(entity.tag)?;
                self.surfaces.remove(key);
                self.surface_tags.remove(&entity.tag);
            }
            Dim::Volume => {
                let key = self.volume_key(entity.tag)?;
                self.volumes.remove(key);
                self.volume_tags.remove(&entity.tag);
            }
        }
        self.reindex();

        if recursive {
            let unique: FxHashSet<Entity> = children.into_iter().collect();
            let mut ordered: Vec<Entity> = unique.into_iter().collect();
            ordered.sort();
            for child in ordered {
                if self.contains(child) && !self.is_used(child)? {
                    self.remove(child, true)?;
                }
            }
        }
        Ok(())
    }

    // Raw removal for healing and fragmentation; callers fix references and
    // call `reindex` afterwards.

    pub(crate) fn remove_point_unchecked(&mut self, key: PointKey) {
        if let Some(point) = self.points.remove(key) {
            self.point_tags.remove(&point.tag);
        }
    }

    pub(crate) fn remove_curve_unchecked(&mut self, key: CurveKey) {
        if let Some(curve) = self.curves.remove(key) {
            self.curve_tags.remove(&curve.tag);
        }
    }

    pub(crate) fn remove_surface_unchecked(&mut self, key: SurfaceKey) {
        if let Some(surface) = self.surfaces.remove(key) {
            self.surface_tags.remove(&surface.tag);
        }
    }

    pub(crate) fn remove_volume_unchecked(&mut self, key: VolumeKey) {
        if let Some(volume) = self.volumes.remove(key) {
            self.volume_tags.remove(&volume.tag);
        }
    }

    // --- Discrete surfaces ---

    /// Build boundary curves for discrete surfaces that have none yet.
    ///
    /// Free edges of the facet set (edges used by exactly one facet) are
    /// chained into closed loops. Returns the number of curves created.
    pub fn create_discrete_edges(&mut self) -> usize {
        let pending: Vec<SurfaceKey> = self
            .surfaces
            .iter()
            .filter(|(_, s)| s.is_discrete() && s.loops.is_empty())
            .map(|(k, _)| k)
            .collect();

        let mut created = 0;
        for key in pending {
            let chains = free_edge_chains(&self.surfaces[key].facets);
            let mut loops = Vec::with_capacity(chains.len());
            for chain in chains {
                let start = self.add_point(chain[0]);
                let interior = chain[1..].to_vec();
                let curve = self.add_curve(start, start, interior);
                loops.push(vec![(curve, true)]);
                created += 1;
            }
            self.surfaces[key].loops = loops;
        }
        if created > 0 {
            self.reindex();
        }
        created
    }

    // --- Physical groups ---

    pub fn add_physical_group(&mut self, dim: Dim, entities: Vec<i32>, name: &str) -> Result<i32> {
        for &tag in &entities {
            if !self.contains(Entity::new(dim, tag)) {
                return Err(KernelError::EntityNotFound(Entity::new(dim, tag)));
            }
        }
        let tag = self
            .physical_groups
            .iter()
            .filter(|g| g.dim == dim)
            .map(|g| g.tag)
            .max()
            .unwrap_or(0)
            + 1;
        self.physical_groups.push(PhysicalGroup {
            dim,
            tag,
            name: name.to_string(),
            entities,
        });
        Ok(tag)
    }

    pub fn physical_groups(&self) -> &[PhysicalGroup] {
        &self.physical_groups
    }

    /// Physical group tags containing an entity.
    pub fn physical_tags_of(&self, entity: Entity) -> Vec<i32> {
        self.physical_groups
            .iter()
            .filter(|g| g.dim == entity.dim && g.entities.contains(&entity.tag))
            .map(|g| g.tag)
            .collect()
    }
}

/// Chain the free edges of a triangle soup into closed point loops.
///
/// Vertices are matched by exact coordinates; welding happens before this.
fn free_edge_chains(facets: &[[Point3<f64>; 3]]) -> Vec<Vec<Point3<f64>>> {
    let mut ids: FxHashMap<[u64; 3], usize> = FxHashMap::default();
    let mut coords: Vec<Point3<f64>> = Vec::new();
    let mut id_of = |p: &Point3<f64>| {
        let key = [p.x.to_bits(), p.y.to_bits(), p.z.to_bits()];
        *ids.entry(key).or_insert_with(|| {
            coords.push(*p);
            coords.len() - 1
        })
    };

    let mut edge_count: FxHashMap<(usize, usize), (usize, usize, usize)> = FxHashMap::default();
    for facet in facets {
        let v = [id_of(&facet[0]), id_of(&facet[1]), id_of(&facet[2])];
        for i in 0..3 {
            let (a, b) = (v[i], v[(i + 1) % 3]);
            let key = (a.min(b), a.max(b));
            let entry = edge_count.entry(key).or_insert((0, a, b));
            entry.0 += 1;
        }
    }

    // Directed free edges, keyed by their start vertex
    let mut next: FxHashMap<usize, usize> = FxHashMap::default();
    let mut free: Vec<(usize, usize)> = edge_count
        .values()
        .filter(|(count, _, _)| *count == 1)
        .map(|&(_, a, b)| (a, b))
        .collect();
    free.sort_unstable();
    for &(a, b) in &free {
        next.insert(a, b);
    }

    let mut visited: FxHashSet<usize> = FxHashSet::default();
    let mut chains = Vec::new();
    for &(start, _) in &free {
        if visited.contains(&start) {
            continue;
        }
        let mut chain = Vec::new();
        let mut current = start;
        while visited.insert(current) {
            chain.push(coords[current]);
            match next.get(&current) {
                Some(&n) => current = n,
                None => break,
            }
        }
        if chain.len() >= 3 {
            chains.push(chain);
        }
    }
    chains
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(model: &mut Model) -> SurfaceKey {
        let p: Vec<PointKey> = [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)]
            .iter()
            .map(|&(x, y)| model.add_point(Point3::new(x, y, 0.0)))
            .collect();
        let c: Vec<CurveKey> = (0..4)
            .map(|i| model.add_curve(p[i], p[(i + 1) % 4], Vec::new()))
            .collect();
        model.add_surface(vec![c.into_iter().map(|k| (k, true)).collect()])
    }

    #[test]
    fn test_tags_are_per_dimension() {
        let mut model = Model::new("t");
        square(&mut model);
        assert_eq!(model.counts(), [4, 4, 1, 0]);
        let surfaces = model.entities(Some(Dim::Surface));
        assert_eq!(surfaces, vec![Entity::surface(1)]);
        assert_eq!(model.entities(None).len(), 9);
    }

    #[test]
    fn test_surface_area_and_bounds() {
        let mut model = Model::new("t");
        let s = square(&mut model);
        assert!((model.surface_area(s) - 1.0).abs() < 1e-12);
        let bb = model.bounding_box(Entity::surface(1)).unwrap();
        assert_eq!(bb.max_x, 1.0);
        assert_eq!(bb.max_z, 0.0);
    }

    #[test]
    fn test_remove_in_use_and_recursive() {
        let mut model = Model::new("t");
        square(&mut model);
        assert!(matches!(
            model.remove(Entity::curve(1), false),
            Err(KernelError::EntityInUse(_))
        ));
        model.remove(Entity::surface(1), true).unwrap();
        assert_eq!(model.counts(), [0, 0, 0, 0]);
    }

    #[test]
    fn test_boundary_of_surface_keeps_orientation() {
        let mut model = Model::new("t");
        square(&mut model);
        let b = model.boundary_of(Entity::surface(1)).unwrap();
        assert_eq!(b.len(), 4);
        assert!(b.iter().all(|(e, fwd)| e.dim == Dim::Curve && *fwd));
    }

    #[test]
    fn test_discrete_edges_from_free_boundary() {
        let mut model = Model::new("t");
        let a = Point3::new(0.0, 0.0, 0.0);
        let b = Point3::new(1.0, 0.0, 0.0);
        let c = Point3::new(1.0, 1.0, 0.0);
        let d = Point3::new(0.0, 1.0, 0.0);
        let s = model.add_discrete_surface(vec![[a, b, c], [a, c, d]]);
        assert!(model.boundary_of(Entity::surface(1)).unwrap().is_empty());

        assert_eq!(model.create_discrete_edges(), 1);
        let curve = model.surfaces[s].loops[0][0].0;
        // Four boundary corners: one as the closing point, three interior
        assert_eq!(model.curves[curve].interior.len(), 3);
        assert_eq!(model.create_discrete_edges(), 0);
    }

    #[test]
    fn test_physical_group_validates_members() {
        let mut model = Model::new("t");
        square(&mut model);
        assert_eq!(model.add_physical_group(Dim::Surface, vec![1], "intake").unwrap(), 1);
        assert!(model.add_physical_group(Dim::Surface, vec![9], "bad").is_err());
        assert_eq!(model.physical_tags_of(Entity::surface(1)), vec![1]);
    }
}
