// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Recovery cascade.
//!
//! Each [`Stage`] is a complete pipeline of its own, run in a fresh model.
//! The first stage to produce a mesh ends the run; failures are logged,
//! recorded and the next stage starts. The box-only stage needs nothing
//! from the input, so the cascade always ends with an outcome.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::time::Instant;

use intake_mesh_core::{is_plausible_point, BoundingBox};
use intake_mesh_kernel::{
    Algorithm3D, BoundaryQuery, BuiltinKernel, Dim, GeometryKernel, HealingOptions, KernelError, MeshOptions,
    Point3, Vector3, WriteOptions,
};

use crate::bounds;
use crate::classify::{self, ClassificationPath, FARFIELD_GROUP, FLUID_GROUP};
use crate::config::{PipelineConfig, ValidatedConfig};
use crate::domain::{self, DomainSpec};
use crate::driver::{MeshDriver, FALLBACK_ALGORITHM_2D};
use crate::error::{MeshError, PipelineError, StageError};
use crate::fields::{FieldInstaller, LayerPlan, SizeFieldPlan};
use crate::fragment::{self, VolumeRecovery};
use crate::importer;
use crate::report::{MeshSummary, PipelineOutcome, RunReport, Stage, StageAttempt};
use crate::session::Session;

/// Box meshed when the input yields no usable bounds.
pub const DEFAULT_BOX_ORIGIN: [f64; 3] = [-900.0, -500.0, -200.0];
pub const DEFAULT_BOX_SIZE: [f64; 3] = [1800.0, 1000.0, 400.0];

/// The coarse stage multiplies the mesh size and the healing tolerance.
const COARSE_SIZE_FACTOR: f64 = 2.0;
const COARSE_TOLERANCE_FACTOR: f64 = 10.0;

/// Box-only cells are never smaller than this fraction of the box.
const BOX_ONLY_CELLS: f64 = 10.0;

/// Per-stage knobs of the geometry pipeline.
#[derive(Debug, Clone)]
struct StageSettings {
    base_mesh_size: f64,
    healing: HealingOptions,
    algorithm_3d: Algorithm3D,
}

impl StageSettings {
    fn nominal(config: &ValidatedConfig) -> Self {
        Self {
            base_mesh_size: config.base_mesh_size,
            healing: config.healing(),
            algorithm_3d: config.algorithm_3d,
        }
    }

    fn coarse(config: &ValidatedConfig) -> Self {
        Self {
            base_mesh_size: config.base_mesh_size * COARSE_SIZE_FACTOR,
            healing: HealingOptions::all(config.healing_tolerance * COARSE_TOLERANCE_FACTOR),
            algorithm_3d: Algorithm3D::Delaunay,
        }
    }
}

/// What a successful stage learned along the way.
#[derive(Debug, Default)]
struct StageSuccess {
    mesh: MeshSummary,
    domain: Option<DomainSpec>,
    classification: Option<ClassificationPath>,
    size_field: Option<SizeFieldPlan>,
    boundary_layer: Option<LayerPlan>,
    warnings: Vec<String>,
}

/// Validate `config`, open a session on the built-in kernel and run the
/// cascade. Only configuration and session errors are returned as `Err`.
pub fn run(input: &Path, output: &Path, config: &PipelineConfig) -> Result<RunReport, PipelineError> {
    let config = config.validate()?;
    let mut session = Session::open(BuiltinKernel::new(), config.threads)?;
    Ok(run_cascade(&mut session, input, output, &config))
}

/// Try every stage in order until one writes `output`.
pub fn run_cascade<K: GeometryKernel>(
    session: &mut Session<K>,
    input: &Path,
    output: &Path,
    config: &ValidatedConfig,
) -> RunReport {
    let started = Instant::now();
    let mut report = RunReport {
        input: input.to_path_buf(),
        output: output.to_path_buf(),
        outcome: PipelineOutcome::Failure {
            stage: Stage::Nominal,
            reason: "no stage ran".into(),
        },
        attempts: Vec::new(),
        warnings: Vec::new(),
        domain: None,
        classification: None,
        size_field: None,
        boundary_layer: None,
        mesh: None,
        elapsed_ms: 0,
    };
    let mut input_missing = false;
    let mut failures: Vec<String> = Vec::new();

    for stage in Stage::ALL {
        if input_missing && stage != Stage::BoxOnly {
            report.attempts.push(StageAttempt {
                stage,
                succeeded: false,
                skipped: true,
                error: None,
                elapsed_ms: 0,
            });
            continue;
        }

        tracing::info!(stage = stage.name(), "Starting recovery stage");
        let stage_start = Instant::now();
        let result = catch_unwind(AssertUnwindSafe(|| run_stage(session, stage, input, output, config)))
            .unwrap_or_else(|panic| Err(StageError::Kernel(panic_error(panic))));
        let elapsed_ms = stage_start.elapsed().as_millis() as u64;

        match result {
            Ok(success) => {
                tracing::info!(stage = stage.name(), elapsed_ms, "Recovery stage succeeded");
                report.attempts.push(StageAttempt {
                    stage,
                    succeeded: true,
                    skipped: false,
                    error: None,
                    elapsed_ms,
                });
                report.outcome = if stage == Stage::BoxOnly {
                    PipelineOutcome::PartialSuccess {
                        mesh: output.to_path_buf(),
                        warnings: success.warnings.clone(),
                    }
                } else {
                    PipelineOutcome::Success {
                        mesh: output.to_path_buf(),
                    }
                };
                report.warnings.extend(success.warnings);
                report.domain = success.domain;
                report.classification = success.classification;
                report.size_field = success.size_field;
                report.boundary_layer = success.boundary_layer;
                report.mesh = Some(success.mesh);
                break;
            }
            Err(e) => {
                tracing::warn!(stage = stage.name(), error = %e, elapsed_ms, "Recovery stage failed");
                if let StageError::Import(import) = &e {
                    input_missing |= import.is_missing_input();
                }
                failures.push(format!("{}: {}", stage, e));
                report.attempts.push(StageAttempt {
                    stage,
                    succeeded: false,
                    skipped: false,
                    error: Some(e.to_string()),
                    elapsed_ms,
                });
                report.outcome = PipelineOutcome::Failure {
                    stage,
                    reason: failures.join("; "),
                };
            }
        }
    }

    report.elapsed_ms = started.elapsed().as_millis() as u64;
    match &report.outcome {
        PipelineOutcome::Failure { reason, .. } => {
            tracing::error!(reason = %reason, "Every recovery stage failed");
        }
        outcome => tracing::info!(
            outcome = ?outcome,
            elapsed_ms = report.elapsed_ms,
            "Pipeline finished"
        ),
    }
    report
}

fn panic_error(panic: Box<dyn std::any::Any + Send>) -> KernelError {
    let message = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    KernelError::Geometry(format!("stage panicked: {}", message))
}

fn run_stage<K: GeometryKernel>(
    session: &mut Session<K>,
    stage: Stage,
    input: &Path,
    output: &Path,
    config: &ValidatedConfig,
) -> Result<StageSuccess, StageError> {
    match stage {
        Stage::Nominal => {
            let mut model = session.model("intake_nominal")?;
            mesh_geometry(&mut *model, input, output, &StageSettings::nominal(config), config)
        }
        Stage::Coarse => {
            let mut model = session.model("intake_coarse")?;
            mesh_geometry(&mut *model, input, output, &StageSettings::coarse(config), config)
        }
        Stage::StlRoundTrip => stl_round_trip(session, input, output, config),
        Stage::BoxOnly => box_only(session, input, output, config),
    }
}

/// Import, domain, fragmentation, classification, fields and meshing.
fn mesh_geometry<K: GeometryKernel>(
    kernel: &mut K,
    input: &Path,
    output: &Path,
    settings: &StageSettings,
    config: &ValidatedConfig,
) -> Result<StageSuccess, StageError> {
    let mut success = StageSuccess::default();

    let imported = importer::import(kernel, input, &settings.healing)?;
    let tools = imported.surfaces_and_volumes();
    let bounds = bounds::bounding_box(kernel, &tools)?;
    let domain = domain::build_domain(kernel, &bounds, config.domain_scale)?;
    success.domain = Some(domain.spec);

    let fragments = fragment::fragment(kernel, domain.volume, &tools, &settings.healing)?;
    if fragments.recovery != VolumeRecovery::NotNeeded {
        success
            .warnings
            .push(format!("fluid volume rebuilt after fragmentation ({:?})", fragments.recovery));
    }

    let fluid = classify::select_fluid_volume(kernel, &domain, &fragments)?;
    let classes = classify::classify(kernel, fluid, &domain, &fragments)?;
    classify::add_physical_groups(kernel, &classes)?;
    success.classification = Some(classes.path);

    let mut fields = FieldInstaller::new();
    if classes.intake_surfaces.is_empty() {
        success.warnings.push("no intake surfaces, mesh size is uniform".into());
    } else {
        let plan = SizeFieldPlan::new(settings.base_mesh_size, bounds.max_extent(), &config.size_field);
        fields.install_size_field(kernel, &classes.intake_surfaces, &plan)?;
        success.size_field = Some(plan);
    }
    if classes.intake_edges.is_empty() {
        tracing::warn!("No intake edges, boundary layer skipped");
        success.warnings.push("no intake edges, boundary layer skipped".into());
    } else {
        let (_, plan) = fields.install_boundary_layer(kernel, &classes.intake_edges, &config.boundary_layer)?;
        success.boundary_layer = Some(plan);
    }

    apply_mesh_options(kernel, settings.base_mesh_size, settings.algorithm_3d, config)?;
    finish(kernel, output, &mut success)?;
    Ok(success)
}

fn apply_mesh_options<K: GeometryKernel>(
    kernel: &mut K,
    base_mesh_size: f64,
    algorithm_3d: Algorithm3D,
    config: &ValidatedConfig,
) -> Result<(), StageError> {
    kernel.set_mesh_options(MeshOptions {
        size_min: base_mesh_size / 10.0,
        size_max: base_mesh_size,
        algorithm_2d: config.algorithm_2d,
        algorithm_3d,
        optimize_netgen: config.optimize_netgen,
        max_elements: config.max_elements,
    })?;
    Ok(())
}

/// Mesh, write and collect statistics.
fn finish<K: GeometryKernel>(kernel: &mut K, output: &Path, success: &mut StageSuccess) -> Result<(), StageError> {
    let retried = {
        let mut driver = MeshDriver::new(kernel);
        driver.run(output)?;
        driver.retried_2d()
    };
    if retried {
        success
            .warnings
            .push(format!("2D mesh needed the fallback algorithm {}", FALLBACK_ALGORITHM_2D));
    }
    let stats = kernel.mesh_stats()?;
    stats.log();
    success.mesh = MeshSummary::from(&stats);
    Ok(())
}

/// Tessellate the input, write it as STL and run the full pipeline on that.
fn stl_round_trip<K: GeometryKernel>(
    session: &mut Session<K>,
    input: &Path,
    output: &Path,
    config: &ValidatedConfig,
) -> Result<StageSuccess, StageError> {
    let intermediate = sibling(output, "_roundtrip.stl");
    let settings = StageSettings::nominal(config);
    {
        let mut model = session.model("intake_tessellation")?;
        importer::import(&mut *model, input, &settings.healing)?;
        apply_mesh_options(&mut *model, settings.base_mesh_size, settings.algorithm_3d, config)?;
        tessellate(&mut *model)?;
        model
            .write(&intermediate, &WriteOptions::default())
            .map_err(MeshError::WriteFailed)?;
        tracing::info!(path = %intermediate.display(), "Wrote surface tessellation");
    }

    let result = {
        let mut model = session.model("intake_round_trip")?;
        mesh_geometry(&mut *model, &intermediate, output, &settings, config)
    };
    if !config.debug {
        let _ = std::fs::remove_file(&intermediate);
    }
    result
}

/// 2D mesh of the imported surfaces, falling back to the tolerant algorithm.
fn tessellate<K: GeometryKernel>(kernel: &mut K) -> Result<(), StageError> {
    if let Err(first) = kernel.generate(Dim::Surface) {
        tracing::warn!(error = %first, "Tessellation failed, retrying with the tolerant algorithm");
        let mut options = kernel.mesh_options();
        options.algorithm_2d = FALLBACK_ALGORITHM_2D;
        kernel.set_mesh_options(options)?;
        kernel.clear_mesh()?;
        kernel.generate(Dim::Surface).map_err(MeshError::Mesh2DFailed)?;
    }
    Ok(())
}

/// Mesh a box around the input's bounds, or the default box without them.
fn box_only<K: GeometryKernel>(
    session: &mut Session<K>,
    input: &Path,
    output: &Path,
    config: &ValidatedConfig,
) -> Result<StageSuccess, StageError> {
    let mut success = StageSuccess::default();
    success.warnings.push("output contains no intake geometry".into());

    // Nothing the input does here may stop the box from being meshed
    let geometry_bounds = catch_unwind(AssertUnwindSafe(|| input_bounds(session, input, config)))
        .unwrap_or_else(|panic| Err(StageError::Kernel(panic_error(panic))));
    let geometry_bounds = match geometry_bounds {
        Ok(b) => Some(b),
        Err(e) => {
            tracing::warn!(error = %e, "Using the default domain box");
            success.warnings.push(format!("no geometry: {}", e));
            None
        }
    };
    let spec = match geometry_bounds {
        Some(b) => DomainSpec::around(&b, config.domain_scale),
        None => default_box(),
    };
    success.domain = Some(spec);

    let mut model = session.model("intake_box_only")?;
    let volume = model.add_box(spec.origin(), spec.extent())?;
    model.synchronize()?;
    let faces = model.boundary(&[volume], BoundaryQuery::default())?;
    model.add_physical_group(Dim::Volume, &[volume.tag], FLUID_GROUP)?;
    let face_tags: Vec<i32> = faces.iter().map(|f| f.tag).collect();
    model.add_physical_group(Dim::Surface, &face_tags, FARFIELD_GROUP)?;

    let size = config.base_mesh_size.max(spec.extent().max() / BOX_ONLY_CELLS);
    apply_mesh_options(&mut *model, size, config.algorithm_3d, config)?;
    tracing::warn!(size, "Meshing the domain box without intake geometry");
    finish(&mut *model, output, &mut success)?;
    Ok(success)
}

/// Corrected bounds of the input's surfaces and volumes.
fn input_bounds<K: GeometryKernel>(
    session: &mut Session<K>,
    input: &Path,
    config: &ValidatedConfig,
) -> Result<BoundingBox, StageError> {
    let mut model = session.model("intake_bounds")?;
    let imported = importer::import(&mut *model, input, &config.healing())?;
    let b = bounds::bounding_box(&*model, &imported.surfaces_and_volumes())?;
    if !(is_plausible_point(&b.min()) && is_plausible_point(&b.max())) {
        return Err(StageError::Kernel(KernelError::Geometry(format!(
            "bounds out of range: {:?}",
            b
        ))));
    }
    Ok(b)
}

fn default_box() -> DomainSpec {
    let origin = Point3::from(DEFAULT_BOX_ORIGIN);
    let size = Vector3::from(DEFAULT_BOX_SIZE);
    let center = origin + size / 2.0;
    DomainSpec {
        scale: 1.0,
        center: [center.x, center.y, center.z],
        size: DEFAULT_BOX_SIZE,
    }
}

/// `dir/out.msh` + `_suffix.ext` -> `dir/out_suffix.ext`
fn sibling(output: &Path, suffix: &str) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "mesh".to_string());
    output.with_file_name(format!("{}{}", stem, suffix))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::tests::serial;
    use crate::testing::write_step_box;

    fn small_config() -> ValidatedConfig {
        PipelineConfig {
            base_mesh_size: 2.0,
            threads: 1,
            ..PipelineConfig::default()
        }
        .validate()
        .unwrap()
    }

    #[test]
    fn test_default_box_spec() {
        let spec = default_box();
        assert_eq!(spec.center, [0.0, 0.0, 0.0]);
        assert_eq!(spec.origin(), Point3::new(-900.0, -500.0, -200.0));
    }

    #[test]
    fn test_sibling_paths() {
        assert_eq!(sibling(Path::new("/a/out.msh"), "_roundtrip.stl"), PathBuf::from("/a/out_roundtrip.stl"));
    }

    #[test]
    fn test_box_input_succeeds_at_first_stage() {
        let _guard = serial();
        let dir = tempfile::tempdir().unwrap();
        let input = write_step_box(dir.path(), [0.0; 3], [1.0, 1.0, 1.0]);
        let output = dir.path().join("out.msh");

        let mut session = Session::open(BuiltinKernel::new(), 1).unwrap();
        let report = run_cascade(&mut session, &input, &output, &small_config());
        assert_eq!(report.final_stage(), Some(Stage::Nominal));
        assert!(matches!(report.outcome, PipelineOutcome::Success { .. }));
        assert_eq!(report.classification, Some(ClassificationPath::Provenance));
        assert!(output.exists());
        assert!(!session.kernel().has_model());
    }

    #[test]
    fn test_missing_input_goes_straight_to_box_only() {
        let _guard = serial();
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.msh");

        let mut session = Session::open(BuiltinKernel::new(), 1).unwrap();
        let report = run_cascade(&mut session, &dir.path().join("nope.step"), &output, &small_config());
        assert!(matches!(report.outcome, PipelineOutcome::PartialSuccess { .. }));
        let skipped: Vec<Stage> = report.attempts.iter().filter(|a| a.skipped).map(|a| a.stage).collect();
        assert_eq!(skipped, vec![Stage::Coarse, Stage::StlRoundTrip]);
        assert_eq!(report.domain.unwrap().size, DEFAULT_BOX_SIZE);
    }
}
