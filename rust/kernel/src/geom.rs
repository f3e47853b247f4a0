// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Small computational-geometry helpers: distances, containment, tet shape.

use nalgebra::{Point3, Vector3};

pub type Triangle = [Point3<f64>; 3];

pub fn point_segment_distance(p: &Point3<f64>, a: &Point3<f64>, b: &Point3<f64>) -> f64 {
    let ab = b - a;
    let len2 = ab.norm_squared();
    if len2 == 0.0 {
        return (p - a).norm();
    }
    let t = ((p - a).dot(&ab) / len2).clamp(0.0, 1.0);
    (p - (a + ab * t)).norm()
}

/// Exact distance from a point to a triangle (Ericson, Real-Time Collision
/// Detection, 5.1.5).
pub fn point_triangle_distance(p: &Point3<f64>, tri: &Triangle) -> f64 {
    let [a, b, c] = tri;
    let ab = b - a;
    let ac = c - a;
    let ap = p - a;

    let d1 = ab.dot(&ap);
    let d2 = ac.dot(&ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return ap.norm();
    }

    let bp = p - b;
    let d3 = ab.dot(&bp);
    let d4 = ac.dot(&bp);
    if d3 >= 0.0 && d4 <= d3 {
        return bp.norm();
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        let v = d1 / (d1 - d3);
        return (p - (a + ab * v)).norm();
    }

    let cp = p - c;
    let d5 = ab.dot(&cp);
    let d6 = ac.dot(&cp);
    if d6 >= 0.0 && d5 <= d6 {
        return cp.norm();
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        let w = d2 / (d2 - d6);
        return (p - (a + ac * w)).norm();
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        return (p - (b + (c - b) * w)).norm();
    }

    let denom = 1.0 / (va + vb + vc);
    if !denom.is_finite() {
        // Degenerate triangle: fall back to its edges
        return point_segment_distance(p, a, b)
            .min(point_segment_distance(p, b, c))
            .min(point_segment_distance(p, c, a));
    }
    let v = vb * denom;
    let w = vc * denom;
    (p - (a + ab * v + ac * w)).norm()
}

/// Distance from a point to a polyline.
pub fn point_polyline_distance(p: &Point3<f64>, polyline: &[Point3<f64>]) -> f64 {
    match polyline {
        [] => f64::INFINITY,
        [only] => (p - only).norm(),
        _ => polyline
            .windows(2)
            .map(|w| point_segment_distance(p, &w[0], &w[1]))
            .fold(f64::INFINITY, f64::min),
    }
}

/// Möller–Trumbore: does the ray `origin + t·dir, t > 0` cross the triangle?
fn ray_hits_triangle(origin: &Point3<f64>, dir: &Vector3<f64>, tri: &Triangle) -> bool {
    let e1 = tri[1] - tri[0];
    let e2 = tri[2] - tri[0];
    let h = dir.cross(&e2);
    let det = e1.dot(&h);
    if det.abs() < 1e-14 {
        return false;
    }
    let inv = 1.0 / det;
    let s = origin - tri[0];
    let u = inv * s.dot(&h);
    if !(0.0..=1.0).contains(&u) {
        return false;
    }
    let q = s.cross(&e1);
    let v = inv * dir.dot(&q);
    if v < 0.0 || u + v > 1.0 {
        return false;
    }
    inv * e2.dot(&q) > 1e-12
}

/// Ray-parity containment test against a closed triangle set.
///
/// An irrational-looking ray direction keeps the ray off edges and vertices
/// of axis-aligned geometry; two extra rays vote when crossings disagree.
pub fn point_in_facets(p: &Point3<f64>, facets: &[Triangle]) -> bool {
    const DIRS: [[f64; 3]; 3] = [
        [0.573_462_5, 0.619_120_3, 0.536_497_1],
        [-0.397_011_4, 0.712_334_9, -0.578_862_6],
        [0.681_123_7, -0.303_910_2, -0.666_178_4],
    ];
    let votes = DIRS
        .iter()
        .filter(|d| {
            let dir = Vector3::new(d[0], d[1], d[2]);
            facets
                .iter()
                .filter(|tri| ray_hits_triangle(p, &dir, tri))
                .count()
                % 2
                == 1
        })
        .count();
    votes >= 2
}

pub fn tet_signed_volume(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>, d: &Point3<f64>) -> f64 {
    (b - a).dot(&(c - a).cross(&(d - a))) / 6.0
}

/// Normalised inradius-to-circumradius ratio `3·r/R`: 1 for a regular
/// tetrahedron, 0 for a flat one.
pub fn tet_quality(p: &[Point3<f64>; 4]) -> f64 {
    let volume = tet_signed_volume(&p[0], &p[1], &p[2], &p[3]).abs();
    if volume <= 0.0 {
        return 0.0;
    }

    let face_area = |a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>| (b - a).cross(&(c - a)).norm() / 2.0;
    let area = face_area(&p[0], &p[1], &p[2])
        + face_area(&p[0], &p[1], &p[3])
        + face_area(&p[0], &p[2], &p[3])
        + face_area(&p[1], &p[2], &p[3]);
    let inradius = 3.0 * volume / area;

    // Circumradius from the products of opposite edge lengths
    let ab = (p[1] - p[0]).norm();
    let ac = (p[2] - p[0]).norm();
    let ad = (p[3] - p[0]).norm();
    let bc = (p[2] - p[1]).norm();
    let bd = (p[3] - p[1]).norm();
    let cd = (p[3] - p[2]).norm();
    let (x, y, z) = (ab * cd, ac * bd, ad * bc);
    let s = (x + y + z) * (-x + y + z) * (x - y + z) * (x + y - z);
    if s <= 0.0 {
        return 0.0;
    }
    let circumradius = s.sqrt() / (24.0 * volume);

    (3.0 * inradius / circumradius).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn unit_cube_facets() -> Vec<Triangle> {
        let v = |x: f64, y: f64, z: f64| Point3::new(x, y, z);
        let quads = [
            [v(0., 0., 0.), v(0., 1., 0.), v(1., 1., 0.), v(1., 0., 0.)],
            [v(0., 0., 1.), v(1., 0., 1.), v(1., 1., 1.), v(0., 1., 1.)],
            [v(0., 0., 0.), v(1., 0., 0.), v(1., 0., 1.), v(0., 0., 1.)],
            [v(1., 0., 0.), v(1., 1., 0.), v(1., 1., 1.), v(1., 0., 1.)],
            [v(1., 1., 0.), v(0., 1., 0.), v(0., 1., 1.), v(1., 1., 1.)],
            [v(0., 1., 0.), v(0., 0., 0.), v(0., 0., 1.), v(0., 1., 1.)],
        ];
        quads
            .iter()
            .flat_map(|q| [[q[0], q[1], q[2]], [q[0], q[2], q[3]]])
            .collect()
    }

    #[test]
    fn test_point_triangle_regions() {
        let tri = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        assert_relative_eq!(point_triangle_distance(&Point3::new(0.2, 0.2, 3.0), &tri), 3.0);
        assert_relative_eq!(point_triangle_distance(&Point3::new(-1.0, -1.0, 0.0), &tri), 2f64.sqrt());
        assert_relative_eq!(point_triangle_distance(&Point3::new(0.5, -2.0, 0.0), &tri), 2.0);
        assert_relative_eq!(
            point_triangle_distance(&Point3::new(1.0, 1.0, 0.0), &tri),
            0.5f64.sqrt(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_point_in_cube() {
        let facets = unit_cube_facets();
        assert!(point_in_facets(&Point3::new(0.5, 0.5, 0.5), &facets));
        assert!(point_in_facets(&Point3::new(0.1, 0.9, 0.2), &facets));
        assert!(!point_in_facets(&Point3::new(1.5, 0.5, 0.5), &facets));
        assert!(!point_in_facets(&Point3::new(-0.1, -0.1, -0.1), &facets));
    }

    #[test]
    fn test_regular_tet_quality_is_one() {
        let tet = [
            Point3::new(1.0, 1.0, 1.0),
            Point3::new(1.0, -1.0, -1.0),
            Point3::new(-1.0, 1.0, -1.0),
            Point3::new(-1.0, -1.0, 1.0),
        ];
        assert_relative_eq!(tet_quality(&tet), 1.0, epsilon = 1e-9);
        let flat = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
        ];
        assert_eq!(tet_quality(&flat), 0.0);
    }

    #[test]
    fn test_polyline_distance() {
        let line = [Point3::new(0.0, 0.0, 0.0), Point3::new(2.0, 0.0, 0.0)];
        assert_relative_eq!(point_polyline_distance(&Point3::new(1.0, 1.0, 0.0), &line), 1.0);
        assert!(point_polyline_distance(&Point3::origin(), &[]).is_infinite());
    }
}
