// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! # Intake-Mesh Pipeline
//!
//! Turns a CAD file of unknown quality into a volumetric fluid-domain mesh:
//!
//! 1. **Import** with healing ([`importer`])
//! 2. **Bounds** with degenerate-extent correction ([`bounds`])
//! 3. **Domain box** scaled around the geometry ([`domain`])
//! 4. **Fragmentation** of the box by the geometry ([`fragment`])
//! 5. **Classification** of intake and far-field surfaces ([`classify`])
//! 6. **Size and boundary-layer fields** ([`fields`])
//! 7. **Mesh generation** 1D, 2D, 3D and output ([`driver`])
//!
//! The [`cascade`] wraps all of it in ordered recovery stages and always
//! returns a [`PipelineOutcome`].
//!
//! ```rust,ignore
//! use intake_mesh_pipeline::{run, PipelineConfig};
//!
//! let report = run("intake.step".as_ref(), "intake.msh".as_ref(), &PipelineConfig::default())?;
//! println!("{}", report.to_json()?);
//! ```

pub mod bounds;
pub mod cascade;
pub mod classify;
pub mod config;
pub mod domain;
pub mod driver;
pub mod error;
pub mod fields;
pub mod fragment;
pub mod importer;
pub mod report;
pub mod session;

pub use cascade::{run, run_cascade};
pub use classify::{Classification, ClassificationPath};
pub use config::{BoundaryLayerParams, IntersectionPolicy, PipelineConfig, SizeFieldRatios, ValidatedConfig};
pub use domain::{DomainBox, DomainSpec};
pub use driver::{DriverState, MeshDriver};
pub use error::{
    ClassificationError, ConfigError, FragmentError, ImportError, MeshError, PipelineError, SessionError,
    StageError,
};
pub use fields::{FieldInstaller, LayerPlan, SizeFieldPlan};
pub use fragment::FragmentResult;
pub use importer::ImportedEntities;
pub use report::{MeshSummary, PipelineOutcome, RunReport, Stage, StageAttempt};
pub use session::{ModelScope, Session};

#[cfg(test)]
pub(crate) mod testing {
    use std::path::{Path, PathBuf};

    /// Axis-aligned box as a STEP faceted solid, in millimetres.
    pub(crate) fn write_step_box(dir: &Path, origin: [f64; 3], size: [f64; 3]) -> PathBuf {
        let corner = |bits: usize| {
            let mut p = origin;
            for (axis, value) in p.iter_mut().enumerate() {
                if bits & (1 << axis) != 0 {
                    *value += size[axis];
                }
            }
            p
        };
        let faces: [[usize; 4]; 6] = [
            [0, 2, 3, 1],
            [4, 5, 7, 6],
            [0, 1, 5, 4],
            [1, 3, 7, 5],
            [3, 2, 6, 7],
            [2, 0, 4, 6],
        ];

        let mut data = String::new();
        for bits in 0..8 {
            let [x, y, z] = corner(bits);
            data.push_str(&format!("#{}=CARTESIAN_POINT('',({:?},{:?},{:?}));\n", bits + 1, x, y, z));
        }
        for (i, face) in faces.iter().enumerate() {
            let refs: Vec<String> = face.iter().map(|c| format!("#{}", c + 1)).collect();
            data.push_str(&format!("#{}=POLY_LOOP('',({}));\n", 11 + i, refs.join(",")));
            data.push_str(&format!("#{}=FACE_OUTER_BOUND('',#{},.T.);\n", 21 + i, 11 + i));
            data.push_str(&format!("#{}=FACE_SURFACE('',(#{}),#99,.T.);\n", 31 + i, 21 + i));
        }
        data.push_str("#40=CLOSED_SHELL('',(#31,#32,#33,#34,#35,#36));\n");
        data.push_str("#41=MANIFOLD_SOLID_BREP('box',#40);\n");

        let content = format!(
            "ISO-10303-21;\nHEADER;\nFILE_SCHEMA(('AUTOMOTIVE_DESIGN'));\nENDSEC;\nDATA;\n{}ENDSEC;\nEND-ISO-10303-21;\n",
            data
        );
        let path = dir.join("box.step");
        std::fs::write(&path, content).unwrap();
        path
    }

    pub(crate) const TETRA_STL: &str = "solid t
facet normal 0 0 -1
 outer loop
  vertex 0 0 0
  vertex 0 1 0
  vertex 1 0 0
 endloop
endfacet
facet normal 0 -1 0
 outer loop
  vertex 0 0 0
  vertex 1 0 0
  vertex 0 0 1
 endloop
endfacet
facet normal -1 0 0
 outer loop
  vertex 0 0 0
  vertex 0 0 1
  vertex 0 1 0
 endloop
endfacet
facet normal 1 1 1
 outer loop
  vertex 1 0 0
  vertex 0 1 0
  vertex 0 0 1
 endloop
endfacet
endsolid t
";
}
