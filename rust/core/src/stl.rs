// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! STL facet files, ASCII and binary
//!
//! Binary layout: 80-byte header, `u32` facet count, then per facet a normal,
//! three vertices (all little-endian `f32`) and a `u16` attribute count.
//! ASCII files start with `solid` and list `facet`/`vertex` records.
//! Readers autodetect the flavour; the writer always emits binary.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use nalgebra::{Point3, Vector3};

use crate::bounds::is_plausible_point;
use crate::error::{Error, Result};

const HEADER_SIZE: usize = 80;
const TRIANGLE_SIZE: usize = 50;

/// Triangle soup as read from or written to an STL file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StlMesh {
    pub triangles: Vec<[Point3<f64>; 3]>,
}

impl StlMesh {
    pub fn new(triangles: Vec<[Point3<f64>; 3]>) -> Self {
        Self { triangles }
    }

    pub fn len(&self) -> usize {
        self.triangles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }
}

/// Read an STL file from disk
pub fn load_stl<P: AsRef<Path>>(path: P) -> Result<StlMesh> {
    let bytes = std::fs::read(path)?;
    parse_stl(&bytes)
}

/// Parse STL content, detecting ASCII vs binary
pub fn parse_stl(bytes: &[u8]) -> Result<StlMesh> {
    if bytes.len() < 6 {
        return Err(Error::InvalidStl("file too small to be valid STL".into()));
    }
    if looks_ascii(bytes) {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| Error::InvalidStl(format!("ASCII STL is not UTF-8: {}", e)))?;
        parse_ascii(text)
    } else {
        parse_binary(bytes)
    }
}

/// `solid` prefix alone is not enough: some binary exporters write it into
/// the header. A binary file's size always matches its facet count.
fn looks_ascii(bytes: &[u8]) -> bool {
    let head = &bytes[..bytes.len().min(HEADER_SIZE)];
    let starts_solid = String::from_utf8_lossy(head).trim_start().starts_with("solid");
    if !starts_solid {
        return false;
    }
    if bytes.len() >= HEADER_SIZE + 4 {
        let count = u32::from_le_bytes([
            bytes[HEADER_SIZE],
            bytes[HEADER_SIZE + 1],
            bytes[HEADER_SIZE + 2],
            bytes[HEADER_SIZE + 3],
        ]) as usize;
        if HEADER_SIZE + 4 + count * TRIANGLE_SIZE == bytes.len() {
            return false;
        }
    }
    true
}

fn parse_binary(bytes: &[u8]) -> Result<StlMesh> {
    if bytes.len() < HEADER_SIZE + 4 {
        return Err(Error::InvalidStl(format!(
            "binary header truncated: {} bytes",
            bytes.len()
        )));
    }
    let count = u32::from_le_bytes([
        bytes[HEADER_SIZE],
        bytes[HEADER_SIZE + 1],
        bytes[HEADER_SIZE + 2],
        bytes[HEADER_SIZE + 3],
    ]) as usize;

    let body = &bytes[HEADER_SIZE + 4..];
    if body.len() < count * TRIANGLE_SIZE {
        return Err(Error::InvalidStl(format!(
            "expected {} facets, found data for {}",
            count,
            body.len() / TRIANGLE_SIZE
        )));
    }

    let mut triangles = Vec::with_capacity(count);
    for (index, facet) in body.chunks_exact(TRIANGLE_SIZE).take(count).enumerate() {
        let corners = [
            read_vertex(&facet[12..24]),
            read_vertex(&facet[24..36]),
            read_vertex(&facet[36..48]),
        ];
        if let Some(bad) = corners.iter().find(|p| !is_plausible_point(p)) {
            return Err(Error::coordinate(format!("facet {}", index), bad));
        }
        triangles.push(corners);
    }

    Ok(StlMesh { triangles })
}

fn read_vertex(buf: &[u8]) -> Point3<f64> {
    let x = f32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
    let y = f32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
    let z = f32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]);
    Point3::new(f64::from(x), f64::from(y), f64::from(z))
}

fn parse_ascii(text: &str) -> Result<StlMesh> {
    let mut triangles = Vec::new();
    let mut corners: Vec<Point3<f64>> = Vec::with_capacity(3);

    for (line_no, line) in text.lines().enumerate() {
        let mut parts = line.split_whitespace();
        match parts.next().map(str::to_ascii_lowercase).as_deref() {
            Some("outer") => corners.clear(),
            Some("vertex") => {
                let mut coord = || -> Result<f64> {
                    parts
                        .next()
                        .and_then(|v| fast_float::parse::<f64, _>(v).ok())
                        .ok_or_else(|| {
                            Error::InvalidStl(format!("bad vertex on line {}", line_no + 1))
                        })
                };
                let p = Point3::new(coord()?, coord()?, coord()?);
                if !is_plausible_point(&p) {
                    return Err(Error::coordinate(format!("line {}", line_no + 1), &p));
                }
                corners.push(p);
            }
            Some("endfacet") => {
                if corners.len() == 3 {
                    triangles.push([corners[0], corners[1], corners[2]]);
                }
                corners.clear();
            }
            Some("endsolid") => break,
            _ => {}
        }
    }

    Ok(StlMesh { triangles })
}

/// Write binary STL to disk
pub fn save_stl<P: AsRef<Path>>(mesh: &StlMesh, path: P) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    write_stl_binary(mesh, &mut writer)?;
    writer.flush()?;
    Ok(())
}

pub fn write_stl_binary<W: Write>(mesh: &StlMesh, writer: &mut W) -> Result<()> {
    let mut header = [b' '; HEADER_SIZE];
    let text = b"binary STL written by intake-mesh";
    header[..text.len()].copy_from_slice(text);
    writer.write_all(&header)?;

    let count = u32::try_from(mesh.triangles.len())
        .map_err(|_| Error::InvalidStl("more than u32::MAX facets".into()))?;
    writer.write_all(&count.to_le_bytes())?;

    for [a, b, c] in &mesh.triangles {
        let normal = (b - a).cross(&(c - a));
        let normal = normal.try_normalize(f64::EPSILON).unwrap_or_else(Vector3::zeros);
        for value in [normal.x, normal.y, normal.z] {
            writer.write_all(&(value as f32).to_le_bytes())?;
        }
        for p in [a, b, c] {
            for value in [p.x, p.y, p.z] {
                writer.write_all(&(value as f32).to_le_bytes())?;
            }
        }
        writer.write_all(&0u16.to_le_bytes())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> StlMesh {
        StlMesh::new(vec![[
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ]])
    }

    #[test]
    fn test_binary_file_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tri.stl");
        save_stl(&triangle(), &path).unwrap();

        let len = std::fs::metadata(&path).unwrap().len() as usize;
        assert_eq!(len, HEADER_SIZE + 4 + TRIANGLE_SIZE);
        assert_eq!(load_stl(&path).unwrap(), triangle());
    }

    #[test]
    fn test_ascii_parsing() {
        let text = "solid test
  facet normal 0 0 1
    outer loop
      vertex 0 0 0
      vertex 2 0 0
      vertex 0 2 0
    endloop
  endfacet
endsolid test
";
        let mesh = parse_stl(text.as_bytes()).unwrap();
        assert_eq!(mesh.len(), 1);
        assert_eq!(mesh.triangles[0][1], Point3::new(2.0, 0.0, 0.0));
    }

    #[test]
    fn test_binary_with_solid_header() {
        let mut bytes = Vec::new();
        write_stl_binary(&triangle(), &mut bytes).unwrap();
        bytes[..5].copy_from_slice(b"solid");
        assert_eq!(parse_stl(&bytes).unwrap().len(), 1);
    }

    #[test]
    fn test_non_finite_and_far_vertices_are_rejected() {
        for bad in ["inf 0 0", "0 nan 0", "1e300 0 0"] {
            let text = format!(
                "solid x\nfacet normal 0 0 1\nouter loop\nvertex 0 0 0\nvertex 1 0 0\nvertex {}\nendloop\nendfacet\nendsolid x\n",
                bad
            );
            let err = parse_stl(text.as_bytes()).unwrap_err();
            assert!(matches!(err, Error::CoordinateOutOfRange { .. }), "{}: {}", bad, err);
        }

        let mut bytes = Vec::new();
        write_stl_binary(&triangle(), &mut bytes).unwrap();
        // First vertex x of facet 0
        let offset = HEADER_SIZE + 4 + 12;
        bytes[offset..offset + 4].copy_from_slice(&f32::INFINITY.to_le_bytes());
        assert!(matches!(parse_stl(&bytes), Err(Error::CoordinateOutOfRange { .. })));
    }

    #[test]
    fn test_facet_count_larger_than_body() {
        let mut bytes = Vec::new();
        write_stl_binary(&triangle(), &mut bytes).unwrap();
        bytes[HEADER_SIZE..HEADER_SIZE + 4].copy_from_slice(&1000u32.to_le_bytes());
        assert!(matches!(parse_stl(&bytes), Err(Error::InvalidStl(_))));
    }

    #[test]
    fn test_truncated_binary() {
        let mut bytes = Vec::new();
        write_stl_binary(&triangle(), &mut bytes).unwrap();
        bytes.truncate(bytes.len() - 10);
        assert!(matches!(parse_stl(&bytes), Err(Error::InvalidStl(_))));
    }

    #[test]
    fn test_bad_ascii_vertex() {
        let text = "solid x\nfacet normal 0 0 1\nouter loop\nvertex 0 nope 0\n";
        assert!(parse_stl(text.as_bytes()).is_err());
    }
}
