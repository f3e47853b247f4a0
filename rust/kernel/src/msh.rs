// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Mesh writers: MSH 4.1 (ASCII or binary) and STL of the surface mesh.
//!
//! Nodes are renumbered from 1 and grouped by the entity they are
//! classified on. When the model has physical groups, only elements of
//! entities belonging to a group are written.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use nalgebra::Point3;

use intake_mesh_core::{save_stl, BoundingBox, StlMesh};

use crate::entity::{Dim, Entity};
use crate::error::{KernelError, Result};
use crate::mesh::MeshData;
use crate::model::Model;
use crate::options::WriteOptions;

const ELEMENT_POINT: i32 = 15;
const ELEMENT_LINE: i32 = 1;
const ELEMENT_TRIANGLE: i32 = 2;
const ELEMENT_TETRAHEDRON: i32 = 4;

/// Writes MSH values either as whitespace-separated text or as native
/// little-endian binary.
struct Encoder<W: Write> {
    out: W,
    binary: bool,
    line_start: bool,
}

impl<W: Write> Encoder<W> {
    fn new(out: W, binary: bool) -> Self {
        Self {
            out,
            binary,
            line_start: true,
        }
    }

    fn token(&mut self, value: impl std::fmt::Display) -> io::Result<()> {
        if !self.line_start {
            self.out.write_all(b" ")?;
        }
        self.line_start = false;
        write!(self.out, "{}", value)
    }

    fn int(&mut self, value: i32) -> io::Result<()> {
        if self.binary {
            self.out.write_all(&value.to_le_bytes())
        } else {
            self.token(value)
        }
    }

    fn size(&mut self, value: usize) -> io::Result<()> {
        if self.binary {
            self.out.write_all(&(value as u64).to_le_bytes())
        } else {
            self.token(value)
        }
    }

    fn double(&mut self, value: f64) -> io::Result<()> {
        if self.binary {
            self.out.write_all(&value.to_le_bytes())
        } else {
            self.token(value)
        }
    }

    /// Line break of the ASCII layout; nothing in binary.
    fn end_line(&mut self) -> io::Result<()> {
        self.line_start = true;
        if self.binary {
            Ok(())
        } else {
            self.out.write_all(b"\n")
        }
    }

    /// Section markers and other text written in both layouts.
    fn text(&mut self, text: &str) -> io::Result<()> {
        self.line_start = true;
        self.out.write_all(text.as_bytes())
    }

    fn end_section(&mut self, name: &str) -> io::Result<()> {
        if self.binary {
            self.out.write_all(b"\n")?;
        }
        self.text(&format!("$End{}\n", name))
    }
}

/// Element blocks in file order: `(entity, element type, connectivity)`.
type Block = (Entity, i32, Vec<Vec<usize>>);

fn element_blocks(model: &Model, mesh: &MeshData) -> Vec<Block> {
    let filtered = !model.physical_groups().is_empty();
    let keep = |entity: Entity| !filtered || !model.physical_tags_of(entity).is_empty();

    let mut blocks: Vec<Block> = Vec::new();
    for (&tag, &node) in &mesh.points {
        if keep(Entity::point(tag)) {
            blocks.push((Entity::point(tag), ELEMENT_POINT, vec![vec![node]]));
        }
    }
    for (&tag, curve) in mesh.curves() {
        if keep(Entity::curve(tag)) {
            blocks.push((
                Entity::curve(tag),
                ELEMENT_LINE,
                curve.segments().map(|s| s.to_vec()).collect(),
            ));
        }
    }
    for (&tag, tris) in mesh.triangles() {
        if keep(Entity::surface(tag)) {
            blocks.push((Entity::surface(tag), ELEMENT_TRIANGLE, tris.iter().map(|t| t.to_vec()).collect()));
        }
    }
    for (&tag, tets) in mesh.tetrahedra() {
        if keep(Entity::volume(tag)) {
            blocks.push((Entity::volume(tag), ELEMENT_TETRAHEDRON, tets.iter().map(|t| t.to_vec()).collect()));
        }
    }
    blocks.retain(|(_, _, elements)| !elements.is_empty());
    blocks
}

/// Write the model's mesh in MSH 4.1.
pub fn write_msh(model: &Model, path: &Path, options: &WriteOptions) -> Result<()> {
    if options.msh_version != (4, 1) {
        return Err(KernelError::InvalidOption(format!(
            "MSH version {}.{} is not supported, only 4.1",
            options.msh_version.0, options.msh_version.1
        )));
    }
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    encode_msh(model, &mut writer, options.binary)?;
    writer.flush()?;
    tracing::debug!(path = %path.display(), binary = options.binary, "Wrote MSH 4.1");
    Ok(())
}

pub fn encode_msh<W: Write>(model: &Model, out: W, binary: bool) -> Result<()> {
    let mesh = &model.mesh;
    let mut enc = Encoder::new(out, binary);

    enc.text("$MeshFormat\n")?;
    enc.text(if binary { "4.1 1 8\n" } else { "4.1 0 8\n" })?;
    if binary {
        enc.int(1)?;
        enc.text("\n")?;
    }
    enc.text("$EndMeshFormat\n")?;

    let groups = model.physical_groups();
    if !groups.is_empty() {
        enc.text("$PhysicalNames\n")?;
        enc.text(&format!("{}\n", groups.len()))?;
        for group in groups {
            enc.text(&format!("{} {} \"{}\"\n", group.dim.as_i32(), group.tag, group.name))?;
        }
        enc.text("$EndPhysicalNames\n")?;
    }

    write_entities(model, &mut enc)?;

    // Node blocks per owning entity, in (dim, tag) order
    let mut owners: Vec<Entity> = mesh.owners.clone();
    owners.sort_unstable();
    owners.dedup();
    let mut renumber = vec![0usize; mesh.nodes.len()];
    let mut node_blocks: Vec<(Entity, Vec<usize>)> = owners.iter().map(|&e| (e, Vec::new())).collect();
    for (node, owner) in mesh.owners.iter().enumerate() {
        if let Ok(i) = owners.binary_search(owner) {
            node_blocks[i].1.push(node);
        }
    }
    let mut next_tag = 1;
    for (_, nodes) in &node_blocks {
        for &n in nodes {
            renumber[n] = next_tag;
            next_tag += 1;
        }
    }

    let total_nodes = mesh.nodes.len();
    enc.text("$Nodes\n")?;
    enc.size(node_blocks.len())?;
    enc.size(total_nodes)?;
    enc.size(if total_nodes > 0 { 1 } else { 0 })?;
    enc.size(total_nodes)?;
    enc.end_line()?;
    for (entity, nodes) in &node_blocks {
        enc.int(entity.dim.as_i32())?;
        enc.int(entity.tag)?;
        enc.int(0)?;
        enc.size(nodes.len())?;
        enc.end_line()?;
        for &n in nodes {
            enc.size(renumber[n])?;
            enc.end_line()?;
        }
        for &n in nodes {
            let p: &Point3<f64> = &mesh.nodes[n];
            enc.double(p.x)?;
            enc.double(p.y)?;
            enc.double(p.z)?;
            enc.end_line()?;
        }
    }
    enc.end_section("Nodes")?;

    let blocks = element_blocks(model, mesh);
    let total_elements: usize = blocks.iter().map(|(_, _, e)| e.len()).sum();
    enc.text("$Elements\n")?;
    enc.size(blocks.len())?;
    enc.size(total_elements)?;
    enc.size(if total_elements > 0 { 1 } else { 0 })?;
    enc.size(total_elements)?;
    enc.end_line()?;
    let mut element_tag = 1;
    for (entity, element_type, elements) in &blocks {
        enc.int(entity.dim.as_i32())?;
        enc.int(entity.tag)?;
        enc.int(*element_type)?;
        enc.size(elements.len())?;
        enc.end_line()?;
        for element in elements {
            enc.size(element_tag)?;
            element_tag += 1;
            for &n in element {
                enc.size(renumber[n])?;
            }
            enc.end_line()?;
        }
    }
    enc.end_section("Elements")?;
    Ok(())
}

fn write_entities<W: Write>(model: &Model, enc: &mut Encoder<W>) -> Result<()> {
    let by_dim: Vec<Vec<Entity>> = Dim::ALL.iter().map(|&d| model.entities(Some(d))).collect();

    enc.text("$Entities\n")?;
    for list in &by_dim {
        enc.size(list.len())?;
    }
    enc.end_line()?;

    for (dim, list) in Dim::ALL.iter().zip(&by_dim) {
        for &entity in list {
            enc.int(entity.tag)?;
            if *dim == Dim::Point {
                let p = model.entity_points(entity)?[0];
                enc.double(p.x)?;
                enc.double(p.y)?;
                enc.double(p.z)?;
            } else {
                let bounds = model
                    .bounding_box(entity)
                    .unwrap_or_else(|_| BoundingBox::new(Point3::origin(), Point3::origin()));
                for v in [bounds.min_x, bounds.min_y, bounds.min_z, bounds.max_x, bounds.max_y, bounds.max_z] {
                    enc.double(v)?;
                }
            }
            let physical = model.physical_tags_of(entity);
            enc.size(physical.len())?;
            for tag in physical {
                enc.int(tag)?;
            }
            if *dim != Dim::Point {
                let boundary = model.boundary_of(entity)?;
                enc.size(boundary.len())?;
                for (child, forward) in boundary {
                    enc.int(if forward { child.tag } else { -child.tag })?;
                }
            }
            enc.end_line()?;
        }
    }
    enc.end_section("Entities")?;
    Ok(())
}

/// Write the surface mesh as binary STL.
pub fn write_surface_stl(mesh: &MeshData, path: &Path) -> Result<()> {
    let triangles: Vec<[Point3<f64>; 3]> = mesh
        .triangles()
        .values()
        .flatten()
        .map(|t| t.map(|n| mesh.nodes()[n]))
        .collect();
    if triangles.is_empty() {
        return Err(KernelError::Geometry("no surface mesh to write".into()));
    }
    save_stl(&StlMesh::new(triangles), path)?;
    Ok(())
}
