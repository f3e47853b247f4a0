// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Option structs passed across the kernel interface.
//!
//! Algorithm numbers follow the conventional gmsh numbering so that command
//! lines written for that mesher keep working.

use std::fmt;

use crate::error::KernelError;

/// Surface meshing algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Algorithm2D {
    MeshAdapt = 1,
    Automatic = 2,
    /// Boundary-only mesh, the most tolerant choice.
    InitialMeshOnly = 3,
    Delaunay = 5,
    Frontal = 6,
    Bamg = 7,
    FrontalQuads = 8,
    PackingParallelograms = 9,
    QuasiStructuredQuad = 11,
}

impl Algorithm2D {
    pub fn number(self) -> i32 {
        self as i32
    }
}

impl TryFrom<i32> for Algorithm2D {
    type Error = KernelError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        Ok(match value {
            1 => Algorithm2D::MeshAdapt,
            2 => Algorithm2D::Automatic,
            3 => Algorithm2D::InitialMeshOnly,
            5 => Algorithm2D::Delaunay,
            6 => Algorithm2D::Frontal,
            7 => Algorithm2D::Bamg,
            8 => Algorithm2D::FrontalQuads,
            9 => Algorithm2D::PackingParallelograms,
            11 => Algorithm2D::QuasiStructuredQuad,
            other => {
                return Err(KernelError::InvalidOption(format!(
                    "unknown 2D algorithm {}",
                    other
                )))
            }
        })
    }
}

impl fmt::Display for Algorithm2D {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ({})", self, self.number())
    }
}

/// Volume meshing algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Algorithm3D {
    Delaunay = 1,
    InitialMeshOnly = 3,
    Frontal = 4,
    Mmg3d = 7,
    RTree = 9,
    Hxt = 10,
}

impl Algorithm3D {
    pub fn number(self) -> i32 {
        self as i32
    }
}

impl TryFrom<i32> for Algorithm3D {
    type Error = KernelError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        Ok(match value {
            1 => Algorithm3D::Delaunay,
            3 => Algorithm3D::InitialMeshOnly,
            4 => Algorithm3D::Frontal,
            7 => Algorithm3D::Mmg3d,
            9 => Algorithm3D::RTree,
            10 => Algorithm3D::Hxt,
            other => {
                return Err(KernelError::InvalidOption(format!(
                    "unknown 3D algorithm {}",
                    other
                )))
            }
        })
    }
}

impl fmt::Display for Algorithm3D {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ({})", self, self.number())
    }
}

/// Global meshing options of the active model.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshOptions {
    pub size_min: f64,
    pub size_max: f64,
    pub algorithm_2d: Algorithm2D,
    pub algorithm_3d: Algorithm3D,
    pub optimize_netgen: bool,
    /// Hard cap on generated elements; 0 disables the cap.
    pub max_elements: usize,
}

impl Default for MeshOptions {
    fn default() -> Self {
        Self {
            size_min: 0.0,
            size_max: 1e22,
            algorithm_2d: Algorithm2D::Delaunay,
            algorithm_3d: Algorithm3D::Delaunay,
            optimize_netgen: false,
            max_elements: 5_000_000,
        }
    }
}

/// Shape-healing switches applied on import and on request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HealingOptions {
    pub tolerance: f64,
    pub fix_degenerate: bool,
    pub fix_small_edges: bool,
    pub fix_small_faces: bool,
    pub sew_faces: bool,
    pub make_solids: bool,
}

impl HealingOptions {
    /// Every fix enabled at the given tolerance.
    pub fn all(tolerance: f64) -> Self {
        Self {
            tolerance,
            fix_degenerate: true,
            fix_small_edges: true,
            fix_small_faces: true,
            sew_faces: true,
            make_solids: true,
        }
    }

    /// Healing disabled.
    pub fn none() -> Self {
        Self {
            tolerance: 1e-8,
            fix_degenerate: false,
            fix_small_edges: false,
            fix_small_faces: false,
            sew_faces: false,
            make_solids: false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.fix_degenerate || self.fix_small_edges || self.fix_small_faces || self.sew_faces
    }
}

impl Default for HealingOptions {
    fn default() -> Self {
        Self::none()
    }
}

/// Shape of a boundary query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BoundaryQuery {
    /// Boundary of the union: entities shared by two inputs cancel out.
    pub combined: bool,
    /// Report orientation by negating tags of reversed entities.
    pub oriented: bool,
    /// Descend to points.
    pub recursive: bool,
}

/// Mesh file output options.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WriteOptions {
    pub binary: bool,
    /// MSH format version; only 4.1 is written.
    pub msh_version: (u32, u32),
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            binary: true,
            msh_version: (4, 1),
        }
    }
}
