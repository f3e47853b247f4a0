// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! # Intake-Mesh Kernel
//!
//! The geometry and meshing kernel behind the intake pipeline, exposed
//! through the narrow [`GeometryKernel`] trait.
//!
//! [`BuiltinKernel`] is a pure-Rust implementation:
//!
//! - **Model**: slotmap arena of points, curves, surfaces and volumes with
//!   gmsh-style integer tags
//! - **Import**: STEP faceted B-reps and STL triangle soups
//! - **Healing**: vertex welding, small edge/face removal, duplicate merging
//! - **Fragmentation**: conformal partition of a box by nested solids
//! - **Fields**: distance, threshold, constant and boundary-layer sizes
//! - **Meshing**: arc-length curves, earcut surfaces, octree volumes on rayon
//! - **Output**: MSH 4.1 (ASCII or binary) and STL
//!
//! ```rust,ignore
//! use intake_mesh_kernel::{BuiltinKernel, Dim, GeometryKernel, WriteOptions};
//!
//! let mut kernel = BuiltinKernel::new();
//! kernel.add_model("intake")?;
//! kernel.merge("intake.stl".as_ref())?;
//! kernel.synchronize()?;
//! kernel.generate(Dim::Volume)?;
//! kernel.write("intake.msh".as_ref(), &WriteOptions::default())?;
//! ```

pub mod builders;
pub mod engine;
pub mod entity;
pub mod error;
pub mod field;
pub mod fragment;
pub mod geom;
pub mod heal;
pub mod import;
pub mod mesh;
pub mod model;
pub mod msh;
pub mod options;
pub mod quality;
pub mod tessellate;

pub use nalgebra::{Point3, Vector3};

pub use engine::{BuiltinKernel, GeometryKernel};
pub use entity::{Dim, Entity};
pub use error::{KernelError, Result};
pub use field::{BoundaryLayerSpec, FieldId, FieldSpec, SizeFunction, MAX_BOUNDARY_LAYERS};
pub use fragment::FragmentOutput;
pub use heal::HealReport;
pub use import::FileFormat;
pub use mesh::{CurveMesh, MeshData};
pub use model::Model;
pub use options::{Algorithm2D, Algorithm3D, BoundaryQuery, HealingOptions, MeshOptions, WriteOptions};
pub use quality::MeshStats;
