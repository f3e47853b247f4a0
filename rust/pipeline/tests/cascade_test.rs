// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Recovery cascade scenarios, end to end on the built-in kernel.

mod common;

use approx::assert_relative_eq;
use common::{session_lock, write_step_box, write_step_boxes};

use intake_mesh_pipeline::{
    run, BoundaryLayerParams, ClassificationPath, ConfigError, PipelineConfig, PipelineError,
    PipelineOutcome, Session, Stage,
};

/// Coarse enough to keep the tests quick on a unit-sized body.
fn config() -> PipelineConfig {
    PipelineConfig {
        base_mesh_size: 2.0,
        threads: 2,
        ..PipelineConfig::default()
    }
}

fn read_msh_header(path: &std::path::Path) -> Vec<u8> {
    let bytes = std::fs::read(path).unwrap();
    bytes[..20.min(bytes.len())].to_vec()
}

#[test]
fn test_watertight_box_meshes_at_first_stage() {
    let _lock = session_lock();
    let dir = tempfile::tempdir().unwrap();
    let input = write_step_box(dir.path(), [0.0; 3], [1.0, 1.0, 1.0]);
    let output = dir.path().join("box.msh");

    let report = run(&input, &output, &config()).unwrap();

    assert_eq!(
        report.outcome,
        PipelineOutcome::Success {
            mesh: output.clone()
        }
    );
    assert_eq!(report.final_stage(), Some(Stage::Nominal));
    assert_eq!(report.attempts.len(), 1);
    assert_eq!(report.classification, Some(ClassificationPath::Provenance));

    let domain = report.domain.unwrap();
    assert_relative_eq!(domain.scale, 5.0);
    assert_eq!(domain.size, [5.0, 5.0, 5.0]);

    let mesh = report.mesh.unwrap();
    assert!(mesh.tetrahedra > 0);
    assert_eq!(mesh.inverted, 0);

    assert_eq!(read_msh_header(&output), b"$MeshFormat\n4.1 1 8\n".to_vec());
    assert!(!Session::<intake_mesh_kernel::BuiltinKernel>::is_open());
}

#[test]
fn test_empty_file_falls_through_to_box_only() {
    let _lock = session_lock();
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("empty.step");
    std::fs::write(&input, b"").unwrap();
    let output = dir.path().join("empty.msh");

    let report = run(&input, &output, &config()).unwrap();

    match &report.outcome {
        PipelineOutcome::PartialSuccess { warnings, .. } => {
            assert!(warnings.iter().any(|w| w.contains("no geometry")));
            assert!(warnings.iter().any(|w| w.contains("no intake geometry")));
        }
        other => panic!("expected partial success, got {:?}", other),
    }
    let nominal = &report.attempts[0];
    assert!(nominal.error.as_deref().unwrap().contains("empty"));
    assert!(report.attempts[1].skipped && report.attempts[2].skipped);
    assert_eq!(report.final_stage(), Some(Stage::BoxOnly));
    assert!(output.exists());
}

#[test]
fn test_failed_fragmentation_recovers_through_round_trip() {
    let _lock = session_lock();
    let dir = tempfile::tempdir().unwrap();
    // Two solids that overlap cannot be imprinted as separate volumes
    let input = write_step_boxes(
        dir.path(),
        "overlap.step",
        &[([0.0; 3], [2.0, 2.0, 2.0]), ([1.0, 1.0, 1.0], [2.0, 2.0, 2.0])],
    );
    let output = dir.path().join("overlap.msh");

    let report = run(&input, &output, &config()).unwrap();

    let stages: Vec<(Stage, bool)> = report.attempts.iter().map(|a| (a.stage, a.succeeded)).collect();
    assert_eq!(
        stages,
        vec![
            (Stage::Nominal, false),
            (Stage::Coarse, false),
            (Stage::StlRoundTrip, true)
        ]
    );
    for failed in &report.attempts[..2] {
        assert!(failed.error.as_deref().unwrap().contains("fragmentation"));
    }
    assert!(matches!(report.outcome, PipelineOutcome::Success { .. }));
    // The intermediate tessellation is cleaned up outside debug runs
    assert!(!dir.path().join("overlap_roundtrip.stl").exists());
}

#[test]
fn test_auto_boundary_layer_and_size_field() {
    let _lock = session_lock();
    let dir = tempfile::tempdir().unwrap();
    let input = write_step_box(dir.path(), [0.0; 3], [1.0, 1.0, 1.0]);
    let output = dir.path().join("layers.msh");
    let config = PipelineConfig {
        boundary_layer: BoundaryLayerParams {
            first_layer_thickness: 0.05,
            progression: 1.2,
            total_thickness: 0.5,
            num_layers: 0,
            ..BoundaryLayerParams::default()
        },
        ..config()
    };

    let report = run(&input, &output, &config).unwrap();

    let size_field = report.size_field.unwrap();
    assert_relative_eq!(size_field.size_min, 2.0 / 5.0);
    assert_relative_eq!(size_field.dist_min, 0.1);
    assert_relative_eq!(size_field.dist_max, 0.5);

    let layers = report.boundary_layer.unwrap();
    assert_eq!(layers.layers, 7);
    assert_eq!(layers.edges, 12);
    let thickest = 0.05 * 1.2f64.powi(6);
    assert!(layers.stack_thickness >= 0.5);
    assert!(layers.stack_thickness - 0.5 <= thickest);
}

#[test]
fn test_invalid_domain_scale_fails_before_any_session() {
    let _lock = session_lock();
    let dir = tempfile::tempdir().unwrap();
    let input = write_step_box(dir.path(), [0.0; 3], [1.0, 1.0, 1.0]);
    let output = dir.path().join("never.msh");
    let config = PipelineConfig {
        domain_scale: 0.5,
        ..config()
    };

    let err = run(&input, &output, &config).unwrap_err();
    assert!(matches!(err, PipelineError::Config(ConfigError::InvalidDomainScale(_))));
    assert!(!output.exists());
    assert!(!dir.path().join("never_debug.msh").exists());
}

/// Two facets, the last vertex replaced by `far`.
fn stl_with_vertex(far: &str) -> Vec<u8> {
    format!(
        "solid far
facet normal 0 0 1
 outer loop
  vertex 0 0 0
  vertex 1 0 0
  vertex 0 1 0
 endloop
endfacet
facet normal 0 0 1
 outer loop
  vertex 1 0 0
  vertex 1 1 0
  vertex {}
 endloop
endfacet
endsolid far
",
        far
    )
    .into_bytes()
}

/// Binary STL announcing more facets than it carries.
fn short_binary_stl() -> Vec<u8> {
    let mut bytes = vec![0u8; 80];
    bytes.extend_from_slice(&5u32.to_le_bytes());
    for value in [0.0f32, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0] {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes.extend_from_slice(&0u16.to_le_bytes());
    bytes
}

#[test]
fn test_cascade_always_terminates() {
    let _lock = session_lock();
    let dir = tempfile::tempdir().unwrap();
    let inputs: Vec<(&str, Vec<u8>)> = vec![
        ("truncated.step", b"ISO-10303-21;\nHEADER;\nENDSEC;\nDATA;\n#1=CARTESIAN_POINT('',(0.,0.".to_vec()),
        ("garbage.stl", b"solid x\nfacet normal what\n".to_vec()),
        ("unknown.iges", b"S      1\n".to_vec()),
        ("infinite.stl", stl_with_vertex("inf 0 0")),
        ("far.stl", stl_with_vertex("1e300 0 0")),
        ("nan.stl", stl_with_vertex("0 nan 0")),
        ("short.stl", short_binary_stl()),
    ];
    for (name, content) in inputs {
        let input = dir.path().join(name);
        std::fs::write(&input, content).unwrap();
        let output = dir.path().join(format!("{}.msh", name));

        let report = run(&input, &output, &config()).unwrap();
        assert!(!report.outcome.is_failure(), "{}: {:?}", name, report.outcome);
        assert_eq!(report.final_stage(), Some(Stage::BoxOnly), "{}", name);
        assert!(output.exists(), "{}", name);
        // Without usable bounds the fallback box is the default one
        assert_eq!(report.domain.as_ref().unwrap().size, [1800.0, 1000.0, 400.0], "{}", name);
        let json = report.to_json().unwrap();
        assert!(json.contains("\"partial_success\""));
    }
}
