// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! File import into the active model.
//!
//! STEP boundary representations become points, curves, surfaces and
//! volumes; STL files become one discrete surface. Healing is applied to the
//! imported entities only.

use std::path::Path;

use nalgebra::Point3;
use rustc_hash::FxHashMap;

use intake_mesh_core::{parse_stl, StepBrep};

use crate::entity::{Dim, Entity};
use crate::error::{KernelError, Result};
use crate::heal::{cell_of, heal_entities, neighbour_cells, Cell, HealReport};
use crate::model::{CurveKey, Model, PointKey, SurfaceKey};
use crate::options::HealingOptions;

/// Input formats the built-in kernel reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Step,
    Stl,
}

impl FileFormat {
    /// Format from the file extension, falling back to content sniffing.
    pub fn detect(path: &Path, content: &[u8]) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("step") | Some("stp") => return Ok(FileFormat::Step),
            Some("stl") => return Ok(FileFormat::Stl),
            Some("brep") | Some("iges") | Some("igs") => {
                return Err(KernelError::UnsupportedFormat(format!(
                    "{} files need a full geometry kernel",
                    path.display()
                )))
            }
            _ => {}
        }

        let head = &content[..content.len().min(256)];
        if memchr::memmem::find(head, b"ISO-10303-21").is_some() {
            Ok(FileFormat::Step)
        } else if head.starts_with(b"solid") || content.len() >= 84 {
            Ok(FileFormat::Stl)
        } else {
            Err(KernelError::UnsupportedFormat(path.display().to_string()))
        }
    }
}

/// Read a file and merge its entities into the model.
pub fn import_file(model: &mut Model, path: &Path, healing: &HealingOptions) -> Result<HealReport> {
    let content = std::fs::read(path)?;
    let format = FileFormat::detect(path, &content)?;

    let created = match format {
        FileFormat::Step => {
            let text = String::from_utf8_lossy(&content);
            let brep = StepBrep::parse(&text)?;
            if brep.skipped_faces > 0 {
                tracing::warn!(
                    skipped = brep.skipped_faces,
                    path = %path.display(),
                    "Skipped undecodable STEP faces"
                );
            }
            step_into_model(model, &brep)
        }
        FileFormat::Stl => {
            let mesh = parse_stl(&content)?;
            stl_into_model(model, mesh.triangles, healing)
        }
    };

    tracing::debug!(
        path = %path.display(),
        format = ?format,
        entities = created.len(),
        "Imported file"
    );

    if healing.is_enabled() && !created.is_empty() {
        heal_entities(model, &created, healing)
    } else {
        Ok(HealReport::default())
    }
}

/// Copy a STEP B-rep into the model. Returns the created surfaces and
/// volumes.
pub fn step_into_model(model: &mut Model, brep: &StepBrep) -> Vec<Entity> {
    let points: Vec<PointKey> = brep.points.iter().map(|p| model.add_point(*p)).collect();
    let curves: Vec<CurveKey> = brep
        .edges
        .iter()
        .map(|e| model.add_curve(points[e.start], points[e.end], e.interior.clone()))
        .collect();

    let mut created = Vec::new();
    let faces: Vec<Option<SurfaceKey>> = brep
        .faces
        .iter()
        .map(|face| {
            let loops: Vec<Vec<(CurveKey, bool)>> = face
                .loops
                .iter()
                .filter(|l| !l.edges.is_empty())
                .map(|l| l.edges.iter().map(|&(edge, forward)| (curves[edge], forward)).collect())
                .collect();
            if loops.is_empty() {
                return None;
            }
            let key = model.add_surface(loops);
            created.push(Entity::surface(model.surfaces[key].tag));
            Some(key)
        })
        .collect();

    for solid in &brep.solids {
        let shells: Vec<Vec<SurfaceKey>> = solid
            .shells
            .iter()
            .map(|&shell| brep.shells[shell].faces.iter().filter_map(|&f| faces[f]).collect())
            .filter(|shell: &Vec<SurfaceKey>| !shell.is_empty())
            .collect();
        if shells.is_empty() {
            continue;
        }
        let key = model.add_volume(shells);
        created.push(Entity::volume(model.volumes[key].tag));
    }
    created
}

/// Add a facet soup as one discrete surface, welding vertices within the
/// healing tolerance and dropping facets that collapse.
pub fn stl_into_model(model: &mut Model, triangles: Vec<[Point3<f64>; 3]>, healing: &HealingOptions) -> Vec<Entity> {
    let tol = if healing.sew_faces { healing.tolerance } else { 0.0 };
    let mut welder = VertexWelder::new(tol);
    let facets: Vec<[Point3<f64>; 3]> = triangles
        .iter()
        .map(|t| [welder.weld(&t[0]), welder.weld(&t[1]), welder.weld(&t[2])])
        .filter(|t| t[0] != t[1] && t[1] != t[2] && t[2] != t[0])
        .collect();
    if facets.is_empty() {
        return Vec::new();
    }
    let key = model.add_discrete_surface(facets);
    vec![Entity::new(Dim::Surface, model.surfaces[key].tag)]
}

/// Snaps points to the first previously seen point within the tolerance.
struct VertexWelder {
    tol: f64,
    grid: FxHashMap<Cell, Vec<Point3<f64>>>,
}

impl VertexWelder {
    fn new(tol: f64) -> Self {
        Self {
            tol,
            grid: FxHashMap::default(),
        }
    }

    fn weld(&mut self, p: &Point3<f64>) -> Point3<f64> {
        if self.tol <= 0.0 {
            return *p;
        }
        let home = cell_of(p, self.tol);
        let existing = neighbour_cells(home)
            .filter_map(|cell| self.grid.get(&cell))
            .flat_map(|bucket| bucket.iter())
            .find(|q| (*q - p).norm() < self.tol);
        if let Some(q) = existing {
            return *q;
        }
        self.grid.entry(home).or_default().push(*p);
        *p
    }
}
