// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Polygon triangulation of 3D boundary loops.
//!
//! Loops are projected onto the plane given by the Newell normal of the
//! outer loop, triangulated with earcut, and the triangles oriented so that
//! they agree with that normal.

use nalgebra::{Point2, Point3, Vector3};

/// Newell's method: robust normal of a possibly non-planar polygon.
/// The length is twice the projected area.
pub fn newell_normal(points: &[Point3<f64>]) -> Vector3<f64> {
    let mut n = Vector3::zeros();
    for i in 0..points.len() {
        let a = &points[i];
        let b = &points[(i + 1) % points.len()];
        n.x += (a.y - b.y) * (a.z + b.z);
        n.y += (a.z - b.z) * (a.x + b.x);
        n.z += (a.x - b.x) * (a.y + b.y);
    }
    n
}

/// Orthonormal in-plane axes for a unit normal.
pub fn plane_axes(normal: &Vector3<f64>) -> (Vector3<f64>, Vector3<f64>) {
    let helper = if normal.x.abs() < 0.9 {
        Vector3::x()
    } else {
        Vector3::y()
    };
    let u = normal.cross(&helper).normalize();
    let v = normal.cross(&u);
    (u, v)
}

/// Triangulate an outer loop with holes.
///
/// Returns the flattened point list (outer loop first, then every hole with
/// at least three points) and triangle indices into it.
pub fn triangulate_loops(
    loops: &[Vec<Point3<f64>>],
) -> Result<(Vec<Point3<f64>>, Vec<[usize; 3]>), String> {
    let outer = loops.first().ok_or("surface has no boundary loop")?;
    if outer.len() < 3 {
        return Err(format!("outer loop has {} points", outer.len()));
    }

    let normal = newell_normal(outer);
    let area2 = normal.norm();
    let scale: f64 = outer.iter().map(|p| p.coords.norm()).fold(1.0, f64::max);
    if area2 <= 1e-12 * scale * scale {
        return Err("degenerate projection: outer loop encloses no area".into());
    }
    let normal = normal / area2;
    let (u, v) = plane_axes(&normal);
    let origin = outer[0];

    let mut points: Vec<Point3<f64>> = outer.clone();
    let mut hole_indices = Vec::new();
    for hole in loops.iter().skip(1).filter(|h| h.len() >= 3) {
        hole_indices.push(points.len());
        points.extend_from_slice(hole);
    }

    let projected: Vec<Point2<f64>> = points
        .iter()
        .map(|p| {
            let d = p - origin;
            Point2::new(d.dot(&u), d.dot(&v))
        })
        .collect();
    let mut flat = Vec::with_capacity(projected.len() * 2);
    for p in &projected {
        flat.push(p.x);
        flat.push(p.y);
    }

    let indices = earcutr::earcut(&flat, &hole_indices, 2).map_err(|e| format!("{:?}", e))?;
    if indices.is_empty() {
        return Err("earcut produced no triangles".into());
    }

    let triangles = indices
        .chunks_exact(3)
        .map(|t| {
            let (a, b, c) = (&projected[t[0]], &projected[t[1]], &projected[t[2]]);
            let signed = (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x);
            if signed < 0.0 {
                [t[0], t[2], t[1]]
            } else {
                [t[0], t[1], t[2]]
            }
        })
        .collect();

    Ok((points, triangles))
}

/// Fan of triangles from the centroid of the outer loop.
///
/// Always succeeds for three or more points; holes are not honoured. The
/// centroid is appended as the last point.
pub fn fan_triangulate(outer: &[Point3<f64>]) -> Result<(Vec<Point3<f64>>, Vec<[usize; 3]>), String> {
    if outer.len() < 3 {
        return Err(format!("outer loop has {} points", outer.len()));
    }
    let centroid = Point3::from(
        outer.iter().fold(Vector3::zeros(), |acc, p| acc + p.coords) / outer.len() as f64,
    );
    let mut points = outer.to_vec();
    points.push(centroid);
    let c = outer.len();
    let triangles = (0..outer.len())
        .map(|i| [c, i, (i + 1) % outer.len()])
        .collect();
    Ok((points, triangles))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn square(z: f64, size: f64, offset: f64) -> Vec<Point3<f64>> {
        vec![
            Point3::new(offset, offset, z),
            Point3::new(offset + size, offset, z),
            Point3::new(offset + size, offset + size, z),
            Point3::new(offset, offset + size, z),
        ]
    }

    fn area(points: &[Point3<f64>], tris: &[[usize; 3]]) -> f64 {
        tris.iter()
            .map(|t| {
                (points[t[1]] - points[t[0]])
                    .cross(&(points[t[2]] - points[t[0]]))
                    .norm()
                    / 2.0
            })
            .sum()
    }

    #[test]
    fn test_newell_normal_of_square() {
        let n = newell_normal(&square(0.0, 2.0, 0.0));
        assert_relative_eq!(n.x, 0.0);
        assert_relative_eq!(n.y, 0.0);
        assert_relative_eq!(n.z, 8.0);
    }

    #[test]
    fn test_square_with_hole() {
        let loops = vec![square(1.0, 4.0, 0.0), square(1.0, 2.0, 1.0)];
        let (points, tris) = triangulate_loops(&loops).unwrap();
        assert_eq!(points.len(), 8);
        assert_relative_eq!(area(&points, &tris), 12.0, epsilon = 1e-9);

        // Every triangle agrees with the outer loop's normal
        for t in &tris {
            let n = (points[t[1]] - points[t[0]]).cross(&(points[t[2]] - points[t[0]]));
            assert!(n.z > 0.0);
        }
    }

    #[test]
    fn test_collinear_loop_is_degenerate() {
        let line = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
        ];
        let err = triangulate_loops(&[line]).unwrap_err();
        assert!(err.contains("degenerate"));
    }

    #[test]
    fn test_fan() {
        let (points, tris) = fan_triangulate(&square(0.0, 1.0, 0.0)).unwrap();
        assert_eq!(tris.len(), 4);
        assert_relative_eq!(area(&points, &tris), 1.0, epsilon = 1e-12);
    }
}
