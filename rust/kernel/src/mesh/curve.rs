// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Point and curve meshing.

use nalgebra::Point3;

use super::{CurveMesh, MeshData};
use crate::entity::{Dim, Entity};
use crate::error::{KernelError, Result};
use crate::field::SizeFunction;
use crate::model::Model;
use crate::options::MeshOptions;

/// One node per geometric point.
pub(crate) fn mesh_points(model: &Model, mesh: &mut MeshData) -> Result<()> {
    let mut points: Vec<_> = model.points.values().collect();
    points.sort_by_key(|p| p.tag);
    for point in points {
        let node = mesh.add_node(point.position, Entity::point(point.tag));
        mesh.points.insert(point.tag, node);
    }
    Ok(())
}

/// Split each curve into `ceil(length / size)` equal arc-length segments,
/// the size being sampled at the curve midpoint.
pub(crate) fn mesh_curves(
    model: &Model,
    mesh: &mut MeshData,
    sizes: &SizeFunction,
    options: &MeshOptions,
) -> Result<()> {
    let mut curves: Vec<_> = model.curves.iter().collect();
    curves.sort_by_key(|(_, c)| c.tag);

    let mut total = 0usize;
    for (key, curve) in curves {
        let polyline = model.curve_polyline(key, true);
        let arc = ArcLength::new(&polyline);
        let length = arc.total();
        if length <= 0.0 {
            return Err(KernelError::meshing(
                Dim::Curve,
                format!("curve {} has zero length", curve.tag),
            ));
        }

        let h = sizes.size_at(&arc.point_at(length / 2.0));
        let mut segments = ((length / h).ceil() as usize).max(1);
        if curve.start == curve.end {
            segments = segments.max(3);
        }
        total += segments;
        if options.max_elements > 0 && total > options.max_elements {
            return Err(KernelError::ElementBudgetExceeded {
                limit: options.max_elements,
            });
        }

        let start = node_of_point(mesh, model.points[curve.start].tag)?;
        let end = node_of_point(mesh, model.points[curve.end].tag)?;
        let mut nodes = Vec::with_capacity(segments + 1);
        nodes.push(start);
        for k in 1..segments {
            let p = arc.point_at(length * k as f64 / segments as f64);
            nodes.push(mesh.add_node(p, Entity::curve(curve.tag)));
        }
        nodes.push(end);
        mesh.curves.insert(curve.tag, CurveMesh { nodes });
    }
    Ok(())
}

fn node_of_point(mesh: &MeshData, tag: i32) -> Result<usize> {
    mesh.point_node(tag)
        .ok_or_else(|| KernelError::meshing(Dim::Curve, format!("point {} has no mesh node", tag)))
}

/// Arc-length parametrisation of a polyline.
struct ArcLength<'a> {
    points: &'a [Point3<f64>],
    cumulative: Vec<f64>,
}

impl<'a> ArcLength<'a> {
    fn new(points: &'a [Point3<f64>]) -> Self {
        let mut cumulative = Vec::with_capacity(points.len());
        let mut s = 0.0;
        cumulative.push(0.0);
        for w in points.windows(2) {
            s += (w[1] - w[0]).norm();
            cumulative.push(s);
        }
        Self { points, cumulative }
    }

    fn total(&self) -> f64 {
        self.cumulative.last().copied().unwrap_or(0.0)
    }

    fn point_at(&self, s: f64) -> Point3<f64> {
        let i = self.cumulative.partition_point(|&c| c < s).clamp(1, self.points.len() - 1);
        let (s0, s1) = (self.cumulative[i - 1], self.cumulative[i]);
        let t = if s1 > s0 { (s - s0) / (s1 - s0) } else { 0.0 };
        self.points[i - 1] + (self.points[i] - self.points[i - 1]) * t.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_arc_length_sampling() {
        let pts = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 2.0, 0.0),
        ];
        let arc = ArcLength::new(&pts);
        assert_relative_eq!(arc.total(), 3.0);
        let p = arc.point_at(2.0);
        assert_relative_eq!(p.x, 1.0);
        assert_relative_eq!(p.y, 1.0);
        assert_relative_eq!(arc.point_at(0.5).x, 0.5);
    }

    #[test]
    fn test_segment_count_follows_size() {
        let mut model = Model::new("t");
        let a = model.add_point(Point3::origin());
        let b = model.add_point(Point3::new(1.0, 0.0, 0.0));
        let c = model.add_point(Point3::new(1.0, 1.0, 0.0));
        model.add_curve(a, b, Vec::new());
        model.add_curve(c, c, vec![Point3::new(1.0, 1.1, 0.0), Point3::new(1.1, 1.0, 0.0)]);

        let mut mesh = MeshData::default();
        let options = MeshOptions::default();
        mesh_points(&model, &mut mesh).unwrap();
        mesh_curves(&model, &mut mesh, &SizeFunction::uniform(0.3), &options).unwrap();

        // ceil(1 / 0.3) = 4 segments, endpoints shared with point nodes
        let line = mesh.curve(1).unwrap();
        assert_eq!(line.nodes.len(), 5);
        assert_eq!(line.nodes[0], mesh.point_node(1).unwrap());
        // A short closed curve still gets three segments
        assert_eq!(mesh.curve(2).unwrap().nodes.len(), 4);
        assert_eq!(mesh.element_count(Dim::Curve), 7);
    }
}
