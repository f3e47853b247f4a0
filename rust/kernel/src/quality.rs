// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Element counts and tetrahedron shape quality.

use rayon::prelude::*;

use crate::entity::Dim;
use crate::geom::{tet_quality, tet_signed_volume};
use crate::mesh::MeshData;

/// Summary of the current mesh.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshStats {
    pub nodes: usize,
    pub points: usize,
    pub lines: usize,
    pub triangles: usize,
    pub tetrahedra: usize,
    /// Worst normalised inradius/circumradius ratio, `None` without tets.
    pub min_quality: Option<f64>,
    pub mean_quality: Option<f64>,
    /// Tetrahedra with non-positive signed volume.
    pub inverted: usize,
}

impl MeshStats {
    pub fn compute(mesh: &MeshData) -> Self {
        let tets: Vec<[usize; 4]> = mesh.tetrahedra().values().flatten().copied().collect();
        let nodes = mesh.nodes();

        let shapes: Vec<(f64, bool)> = tets
            .par_iter()
            .map(|t| {
                let p = t.map(|n| nodes[n]);
                (tet_quality(&p), tet_signed_volume(&p[0], &p[1], &p[2], &p[3]) <= 0.0)
            })
            .collect();

        let (min_quality, mean_quality) = if shapes.is_empty() {
            (None, None)
        } else {
            let min = shapes.iter().map(|s| s.0).fold(f64::INFINITY, f64::min);
            let mean = shapes.iter().map(|s| s.0).sum::<f64>() / shapes.len() as f64;
            (Some(min), Some(mean))
        };

        Self {
            nodes: nodes.len(),
            points: mesh.element_count(Dim::Point),
            lines: mesh.element_count(Dim::Curve),
            triangles: mesh.element_count(Dim::Surface),
            tetrahedra: tets.len(),
            min_quality,
            mean_quality,
            inverted: shapes.iter().filter(|s| s.1).count(),
        }
    }

    pub fn elements(&self) -> usize {
        self.points + self.lines + self.triangles + self.tetrahedra
    }

    pub fn log(&self) {
        tracing::info!(
            nodes = self.nodes,
            lines = self.lines,
            triangles = self.triangles,
            tetrahedra = self.tetrahedra,
            min_quality = self.min_quality.unwrap_or(0.0),
            mean_quality = self.mean_quality.unwrap_or(0.0),
            inverted = self.inverted,
            "Mesh statistics"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Entity;
    use nalgebra::Point3;

    #[test]
    fn test_stats_of_single_tet() {
        let mut mesh = MeshData::default();
        let owner = Entity::volume(1);
        let a = mesh.add_node(Point3::new(0.0, 0.0, 0.0), owner);
        let b = mesh.add_node(Point3::new(1.0, 0.0, 0.0), owner);
        let c = mesh.add_node(Point3::new(0.0, 1.0, 0.0), owner);
        let d = mesh.add_node(Point3::new(0.0, 0.0, 1.0), owner);
        mesh.tetrahedra.insert(1, vec![[a, b, c, d], [a, c, b, d]]);

        let stats = MeshStats::compute(&mesh);
        assert_eq!(stats.nodes, 4);
        assert_eq!(stats.tetrahedra, 2);
        assert_eq!(stats.inverted, 1);
        let q = stats.min_quality.unwrap();
        assert!(q > 0.5 && q < 1.0);
    }

    #[test]
    fn test_empty_mesh() {
        let stats = MeshStats::compute(&MeshData::default());
        assert_eq!(stats, MeshStats::default());
    }
}
