// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! B-rep extraction from STEP (ISO-10303-21) files
//!
//! Walks the topological part of an AP203/AP214/AP242 file
//! (solids → shells → faces → loops → edges → vertices) and produces an
//! index-based [`StepBrep`] in millimetres. Surface geometry is not decoded;
//! faces are described by their boundary loops only. Curved edges carry
//! interior sample points so that downstream meshing sees their shape.
//!
//! ```rust,ignore
//! use intake_mesh_core::step::StepBrep;
//!
//! let brep = StepBrep::parse(&std::fs::read_to_string("part.step")?)?;
//! println!("{} faces in {} solids", brep.faces.len(), brep.solids.len());
//! ```

use std::f64::consts::PI;

use nalgebra::{Point3, Vector3};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::bounds::is_plausible_point;
use crate::decoder::EntityDecoder;
use crate::error::{Error, Result};
use crate::parser::EntityScanner;
use crate::units::extract_length_unit_scale;

/// Maximum angle subtended by one sampled segment of a circular edge
const ARC_SEGMENT_ANGLE: f64 = PI / 8.0;

/// An edge between two vertices, with optional interior polyline samples
#[derive(Debug, Clone, PartialEq)]
pub struct StepEdge {
    pub start: usize,
    pub end: usize,
    /// Interior samples ordered from `start` to `end`
    pub interior: Vec<Point3<f64>>,
}

/// Closed boundary loop of a face as `(edge index, forward)` pairs
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StepLoop {
    pub edges: Vec<(usize, bool)>,
}

/// A face described by its bounds; `loops[0]` is the outer bound
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StepFace {
    pub step_id: u32,
    pub loops: Vec<StepLoop>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct StepShell {
    pub faces: Vec<usize>,
    pub closed: bool,
}

/// A solid: `shells[0]` is the outer shell, the rest are voids
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StepSolid {
    pub shells: Vec<usize>,
}

/// Topology of a STEP file flattened into index-based tables
#[derive(Debug, Clone, Default)]
pub struct StepBrep {
    pub points: Vec<Point3<f64>>,
    pub edges: Vec<StepEdge>,
    pub faces: Vec<StepFace>,
    pub shells: Vec<StepShell>,
    pub solids: Vec<StepSolid>,
    /// Length unit scale applied to every coordinate (file unit → mm)
    pub unit_scale: f64,
    /// Faces dropped because their instances could not be decoded
    pub skipped_faces: usize,
}

impl StepBrep {
    /// Extract the B-rep from STEP file content
    ///
    /// A missing DATA section is an error. Individual faces that fail to
    /// decode are skipped and counted in `skipped_faces`.
    pub fn parse(content: &str) -> Result<Self> {
        // Reject files without a DATA section before indexing
        EntityScanner::data_section(content)?;

        let mut extractor = Extractor {
            decoder: EntityDecoder::new(content),
            scale: extract_length_unit_scale(content),
            brep: StepBrep::default(),
            point_ids: FxHashMap::default(),
            edge_ids: FxHashMap::default(),
            face_ids: FxHashMap::default(),
            shell_ids: FxHashMap::default(),
            failed_faces: FxHashSet::default(),
        };
        extractor.brep.unit_scale = extractor.scale;
        extractor.run()?;
        if let Some(bad) = extractor.brep.all_points().find(|p| !is_plausible_point(p)) {
            return Err(Error::coordinate("B-rep geometry", bad));
        }
        Ok(extractor.brep)
    }

    /// Coordinates of every vertex and edge sample
    pub fn all_points(&self) -> impl Iterator<Item = &Point3<f64>> {
        self.points
            .iter()
            .chain(self.edges.iter().flat_map(|e| e.interior.iter()))
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    /// Polyline of an edge traversed in the given direction
    pub fn edge_polyline(&self, edge: usize, forward: bool) -> Vec<Point3<f64>> {
        let e = &self.edges[edge];
        let mut pts = Vec::with_capacity(e.interior.len() + 2);
        pts.push(self.points[e.start]);
        pts.extend(e.interior.iter().copied());
        pts.push(self.points[e.end]);
        if !forward {
            pts.reverse();
        }
        pts
    }
}

struct Extractor<'a> {
    decoder: EntityDecoder<'a>,
    scale: f64,
    brep: StepBrep,
    point_ids: FxHashMap<u32, usize>,
    edge_ids: FxHashMap<u32, usize>,
    face_ids: FxHashMap<u32, usize>,
    shell_ids: FxHashMap<u32, usize>,
    failed_faces: FxHashSet<u32>,
}

impl<'a> Extractor<'a> {
    fn run(&mut self) -> Result<()> {
        let mut shells_in_solids = FxHashSet::default();

        for id in self.decoder.ids_of_type("MANIFOLD_SOLID_BREP") {
            let entity = self.decoder.decode_by_id(id)?;
            let outer = entity.ref_at(1)?;
            shells_in_solids.insert(outer);
            let shell = self.shell(outer)?;
            self.brep.solids.push(StepSolid { shells: vec![shell] });
        }

        for id in self.decoder.ids_of_type("BREP_WITH_VOIDS") {
            let entity = self.decoder.decode_by_id(id)?;
            let outer = entity.ref_at(1)?;
            let voids = entity.refs_at(2)?;
            shells_in_solids.insert(outer);
            let mut shells = vec![self.shell(outer)?];
            for void in voids {
                let target = self.resolve_oriented_shell(void)?;
                shells_in_solids.insert(target);
                shells.push(self.shell(target)?);
            }
            self.brep.solids.push(StepSolid { shells });
        }

        // Shells outside any solid become free surface sets
        let mut free_shells = self.decoder.ids_of_type("CLOSED_SHELL");
        free_shells.extend(self.decoder.ids_of_type("OPEN_SHELL"));
        free_shells.sort_unstable();
        for id in free_shells {
            if !shells_in_solids.contains(&id) {
                self.shell(id)?;
            }
        }

        // Faces not reached through any shell
        let mut loose_faces = self.decoder.ids_of_type("ADVANCED_FACE");
        loose_faces.extend(self.decoder.ids_of_type("FACE_SURFACE"));
        loose_faces.sort_unstable();
        for id in loose_faces {
            if !self.face_ids.contains_key(&id) {
                self.face(id);
            }
        }

        Ok(())
    }

    fn resolve_oriented_shell(&self, id: u32) -> Result<u32> {
        let entity = self.decoder.decode_by_id(id)?;
        if entity.type_name == "ORIENTED_CLOSED_SHELL" {
            entity.ref_at(2)
        } else {
            Ok(id)
        }
    }

    fn shell(&mut self, id: u32) -> Result<usize> {
        if let Some(&index) = self.shell_ids.get(&id) {
            return Ok(index);
        }
        let entity = self.decoder.decode_by_id(id)?;
        let closed = match entity.type_name {
            "CLOSED_SHELL" => true,
            "OPEN_SHELL" => false,
            other => return Err(Error::malformed(id, other, "expected a shell")),
        };

        let mut faces = Vec::new();
        for face_id in entity.refs_at(1)? {
            if let Some(face) = self.face(face_id) {
                faces.push(face);
            }
        }

        let index = self.brep.shells.len();
        self.brep.shells.push(StepShell { faces, closed });
        self.shell_ids.insert(id, index);
        Ok(index)
    }

    /// Decode a face; failures are counted and yield `None`
    fn face(&mut self, id: u32) -> Option<usize> {
        if let Some(&index) = self.face_ids.get(&id) {
            return Some(index);
        }
        if self.failed_faces.contains(&id) {
            return None;
        }
        match self.decode_face(id) {
            Ok(face) if !face.loops.is_empty() => {
                let index = self.brep.faces.len();
                self.brep.faces.push(face);
                self.face_ids.insert(id, index);
                Some(index)
            }
            _ => {
                self.failed_faces.insert(id);
                self.brep.skipped_faces += 1;
                None
            }
        }
    }

    fn decode_face(&mut self, id: u32) -> Result<StepFace> {
        let entity = self.decoder.decode_by_id(id)?;
        let bounds = entity.refs_at(1)?;

        let mut outer = None;
        let mut inner = Vec::new();
        for bound_id in bounds {
            let bound = self.decoder.decode_by_id(bound_id)?;
            let loop_id = bound.ref_at(1)?;
            let orientation = bound.bool_at(2);
            let is_outer = bound.type_name == "FACE_OUTER_BOUND";

            let mut step_loop = self.face_loop(loop_id)?;
            if step_loop.edges.is_empty() {
                continue;
            }
            if !orientation {
                step_loop.edges.reverse();
                for (_, forward) in &mut step_loop.edges {
                    *forward = !*forward;
                }
            }
            if is_outer && outer.is_none() {
                outer = Some(step_loop);
            } else {
                inner.push(step_loop);
            }
        }

        // Without an explicit outer bound the first bound is taken as outer
        let mut loops = Vec::with_capacity(inner.len() + 1);
        if let Some(outer) = outer {
            loops.push(outer);
        }
        loops.extend(inner);

        Ok(StepFace { step_id: id, loops })
    }

    fn face_loop(&mut self, id: u32) -> Result<StepLoop> {
        let entity = self.decoder.decode_by_id(id)?;
        match entity.type_name {
            "EDGE_LOOP" => {
                let mut edges = Vec::new();
                for oriented_id in entity.refs_at(1)? {
                    let oriented = self.decoder.decode_by_id(oriented_id)?;
                    let (edge_id, forward) = if oriented.type_name == "ORIENTED_EDGE" {
                        (oriented.ref_at(3)?, oriented.bool_at(4))
                    } else {
                        (oriented_id, true)
                    };
                    edges.push((self.edge_curve(edge_id)?, forward));
                }
                Ok(StepLoop { edges })
            }
            "POLY_LOOP" => {
                let point_ids = entity.refs_at(1)?;
                let mut vertices = Vec::with_capacity(point_ids.len());
                for pid in point_ids {
                    vertices.push(self.point(pid)?);
                }
                if vertices.len() < 3 {
                    return Err(Error::malformed(id, "POLY_LOOP", "fewer than three points"));
                }
                let edges = (0..vertices.len())
                    .map(|i| {
                        let edge = self.brep.edges.len();
                        self.brep.edges.push(StepEdge {
                            start: vertices[i],
                            end: vertices[(i + 1) % vertices.len()],
                            interior: Vec::new(),
                        });
                        (edge, true)
                    })
                    .collect();
                Ok(StepLoop { edges })
            }
            // VERTEX_LOOP and friends carry no area
            _ => Ok(StepLoop::default()),
        }
    }

    fn edge_curve(&mut self, id: u32) -> Result<usize> {
        if let Some(&index) = self.edge_ids.get(&id) {
            return Ok(index);
        }
        let entity = self.decoder.decode_by_id(id)?;
        if entity.type_name != "EDGE_CURVE" {
            return Err(Error::malformed(id, entity.type_name, "expected EDGE_CURVE"));
        }
        let start_vertex = entity.ref_at(1)?;
        let end_vertex = entity.ref_at(2)?;
        let curve_id = entity.ref_at(3)?;
        let same_sense = entity.bool_at(4);

        let start_point = self.vertex_point(start_vertex)?;
        let end_point = self.vertex_point(end_vertex)?;
        let start = self.point(start_point)?;
        let end = self.point(end_point)?;

        let raw_start = self.decoder.point(start_point)?;
        let raw_end = self.decoder.point(end_point)?;
        let interior = self
            .curve_samples(curve_id, &raw_start, &raw_end, same_sense)
            .unwrap_or_default()
            .into_iter()
            .map(|p| Point3::from(p.coords * self.scale))
            .collect();

        let index = self.brep.edges.len();
        self.brep.edges.push(StepEdge { start, end, interior });
        self.edge_ids.insert(id, index);
        Ok(index)
    }

    fn vertex_point(&self, id: u32) -> Result<u32> {
        let entity = self.decoder.decode_by_id(id)?;
        if entity.type_name != "VERTEX_POINT" {
            return Err(Error::malformed(id, entity.type_name, "expected VERTEX_POINT"));
        }
        entity.ref_at(1)
    }

    /// Index of a cartesian point, scaled to millimetres
    fn point(&mut self, id: u32) -> Result<usize> {
        if let Some(&index) = self.point_ids.get(&id) {
            return Ok(index);
        }
        let raw = self.decoder.point(id)?;
        let index = self.brep.points.len();
        self.brep.points.push(Point3::from(raw.coords * self.scale));
        self.point_ids.insert(id, index);
        Ok(index)
    }

    /// Interior samples of a curve between two raw (unscaled) endpoints
    fn curve_samples(
        &mut self,
        curve_id: u32,
        start: &Point3<f64>,
        end: &Point3<f64>,
        same_sense: bool,
    ) -> Result<Vec<Point3<f64>>> {
        let curve = self.decoder.decode_by_id(curve_id)?;
        match curve.type_name {
            "CIRCLE" => {
                let placement = curve.ref_at(1)?;
                let radius = curve.f64_at(2)?;
                let (center, x_axis, y_axis) = self.placement_frame(placement)?;
                Ok(sample_arc(&center, &x_axis, &y_axis, radius, start, end, same_sense))
            }
            "B_SPLINE_CURVE_WITH_KNOTS" => {
                let control = curve.refs_at(2)?;
                let mut pts = Vec::with_capacity(control.len());
                if control.len() > 2 {
                    for cp in &control[1..control.len() - 1] {
                        pts.push(self.decoder.point(*cp)?);
                    }
                }
                if !same_sense {
                    pts.reverse();
                }
                Ok(pts)
            }
            _ => Ok(Vec::new()),
        }
    }

    /// Origin and in-plane axes of an `AXIS2_PLACEMENT_3D`
    fn placement_frame(&mut self, id: u32) -> Result<(Point3<f64>, Vector3<f64>, Vector3<f64>)> {
        let placement = self.decoder.decode_by_id(id)?;
        let origin = self.decoder.point(placement.ref_at(1)?)?;

        let axis = match placement.arg(2)?.as_entity_ref() {
            Some(dir) => Vector3::from(self.decoder.direction(dir)?),
            None => Vector3::z(),
        };
        let axis = axis
            .try_normalize(1e-12)
            .ok_or_else(|| Error::malformed(id, placement.type_name, "zero axis"))?;

        let reference = match placement.args.get(3).and_then(|t| t.as_entity_ref()) {
            Some(dir) => Vector3::from(self.decoder.direction(dir)?),
            None => arbitrary_perpendicular(&axis),
        };
        // Project out any axial component of the reference direction
        let x_axis = (reference - axis * reference.dot(&axis))
            .try_normalize(1e-12)
            .unwrap_or_else(|| arbitrary_perpendicular(&axis));
        let y_axis = axis.cross(&x_axis);

        Ok((origin, x_axis, y_axis))
    }
}

fn arbitrary_perpendicular(axis: &Vector3<f64>) -> Vector3<f64> {
    let helper = if axis.x.abs() < 0.9 { Vector3::x() } else { Vector3::y() };
    axis.cross(&helper).normalize()
}

/// Points strictly between `start` and `end` along a circular arc
///
/// Coincident endpoints denote a full circle.
fn sample_arc(
    center: &Point3<f64>,
    x_axis: &Vector3<f64>,
    y_axis: &Vector3<f64>,
    radius: f64,
    start: &Point3<f64>,
    end: &Point3<f64>,
    same_sense: bool,
) -> Vec<Point3<f64>> {
    let angle_of = |p: &Point3<f64>| {
        let d = p - center;
        d.dot(y_axis).atan2(d.dot(x_axis))
    };
    let a0 = angle_of(start);
    let a1 = angle_of(end);

    let mut sweep = if same_sense { a1 - a0 } else { a0 - a1 };
    sweep = sweep.rem_euclid(2.0 * PI);
    if sweep < 1e-9 {
        sweep = 2.0 * PI;
    }
    let direction = if same_sense { 1.0 } else { -1.0 };

    let segments = ((sweep / ARC_SEGMENT_ANGLE).ceil() as usize).max(2);
    (1..segments)
        .map(|i| {
            let a = a0 + direction * sweep * i as f64 / segments as f64;
            center + x_axis * (radius * a.cos()) + y_axis * (radius * a.sin())
        })
        .collect()
}
