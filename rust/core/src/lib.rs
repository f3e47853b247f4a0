// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! # Intake-Mesh Core
//!
//! File formats and geometric primitives for the intake meshing pipeline,
//! built with [nom](https://docs.rs/nom) and [memchr](https://docs.rs/memchr).
//!
//! ## Modules
//!
//! - [`parser`]: borrowed tokens for ISO-10303-21 instance records
//! - [`decoder`]: byte-range index and on-demand decoding by id
//! - [`step`]: solids, shells, faces, loops and edges in millimetres
//! - [`stl`]: ASCII and binary facet files
//! - [`bounds`]: axis-aligned boxes with degenerate-extent correction
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use intake_mesh_core::{parse_entity, EntityScanner, StepBrep};
//!
//! let content = std::fs::read_to_string("intake.step")?;
//! let mut scanner = EntityScanner::data_section(&content)?;
//! while let Some((id, type_name, _, _)) = scanner.next_entity() {
//!     println!("#{} {}", id, type_name);
//! }
//!
//! let brep = StepBrep::parse(&content)?;
//! println!("{} faces", brep.faces.len());
//! ```
//!
//! ## Feature Flags
//!
//! - `serde`: Enable serialization support for bounding boxes

pub mod bounds;
pub mod decoder;
pub mod error;
pub mod parser;
pub mod step;
pub mod stl;
pub mod units;

pub use bounds::{is_plausible_point, BoundingBox, COORDINATE_LIMIT, DEGENERATE_EXTENT_RATIO};
pub use decoder::{build_entity_index, DecodedEntity, EntityDecoder, EntityIndex};
pub use error::{Error, Result};
pub use parser::{entity_type_name, parse_entity, EntityScanner, Token};
pub use step::{StepBrep, StepEdge, StepFace, StepLoop, StepShell, StepSolid};
pub use stl::{load_stl, parse_stl, save_stl, write_stl_binary, StlMesh};
pub use units::{extract_length_unit_scale, prefixed_metre_in_mm};
