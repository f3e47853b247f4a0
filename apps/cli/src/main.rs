// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Intake-Mesh command line.
//!
//! ```text
//! intake-mesh intake.step intake.msh --base_mesh_size 0.5 --bl_num_layers 8 -nopopup
//! ```
//!
//! Exits with 0 when a mesh was written (including the box-only fallback)
//! and non-zero on invalid configuration or when every stage failed.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use intake_mesh_pipeline::{IntersectionPolicy, PipelineConfig, PipelineOutcome};

/// Generate a CFD fluid-domain mesh around intake geometry.
#[derive(Parser, Debug)]
#[command(name = "intake-mesh")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Volumetric fluid-domain meshing of intake geometry", long_about = None)]
struct Cli {
    /// STEP or STL geometry
    input_file: PathBuf,

    /// Mesh to write (.msh)
    output_file: PathBuf,

    /// Domain box size as a multiple of the geometry bounds
    #[arg(long = "domain_scale")]
    domain_scale: Option<f64>,

    #[arg(long = "base_mesh_size")]
    base_mesh_size: Option<f64>,

    /// 2D algorithm number
    #[arg(long = "alg_2d")]
    alg_2d: Option<i32>,

    /// 3D algorithm number
    #[arg(long = "alg_3d")]
    alg_3d: Option<i32>,

    /// Worker threads, 0 for all cores
    #[arg(long)]
    threads: Option<usize>,

    /// Skip the Netgen optimisation pass
    #[arg(long = "no_netgen_opt")]
    no_netgen_opt: bool,

    #[arg(long = "bl_first_layer")]
    bl_first_layer: Option<f64>,

    #[arg(long = "bl_progression")]
    bl_progression: Option<f64>,

    #[arg(long = "bl_thickness")]
    bl_thickness: Option<f64>,

    /// Layer count, 0 derives it from the thicknesses
    #[arg(long = "bl_num_layers")]
    bl_num_layers: Option<usize>,

    #[arg(long = "bl_smooth_normals", value_parser = clap::value_parser!(u8).range(0..=1))]
    bl_smooth_normals: Option<u8>,

    /// Degrees
    #[arg(long = "bl_angle_tolerance")]
    bl_angle_tolerance: Option<f64>,

    /// 0 none, 1 restrict, 2 split
    #[arg(long = "bl_intersect_method", value_parser = clap::value_parser!(i32).range(0..=2))]
    bl_intersect_method: Option<i32>,

    /// Verbose logging and keep intermediate files
    #[arg(long)]
    debug: bool,

    /// Do not open a viewer (there is none; accepted for compatibility)
    #[arg(long)]
    nopopup: bool,

    /// Write a JSON run report here
    #[arg(long)]
    report: Option<PathBuf>,
}

impl Cli {
    /// Parse `args`, accepting the single-dash `-nopopup` spelling.
    fn parse_from_args<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        Self::try_parse_from(args.into_iter().map(|arg| {
            let arg = arg.into();
            if arg == "-nopopup" {
                OsString::from("--nopopup")
            } else {
                arg
            }
        }))
    }

    /// Flags over the environment over the defaults.
    fn to_config(&self) -> anyhow::Result<PipelineConfig> {
        let mut config = PipelineConfig::from_env();
        if let Some(v) = self.domain_scale {
            config.domain_scale = v;
        }
        if let Some(v) = self.base_mesh_size {
            config.base_mesh_size = v;
        }
        if let Some(v) = self.alg_2d {
            config.algorithm_2d = v;
        }
        if let Some(v) = self.alg_3d {
            config.algorithm_3d = v;
        }
        if let Some(v) = self.threads {
            config.threads = v;
        }
        config.optimize_netgen = !self.no_netgen_opt;
        config.debug = self.debug;
        config.interactive = !self.nopopup;

        let layers = &mut config.boundary_layer;
        if let Some(v) = self.bl_first_layer {
            layers.first_layer_thickness = v;
        }
        if let Some(v) = self.bl_progression {
            layers.progression = v;
        }
        if let Some(v) = self.bl_thickness {
            layers.total_thickness = v;
        }
        if let Some(v) = self.bl_num_layers {
            layers.num_layers = v;
        }
        if let Some(v) = self.bl_smooth_normals {
            layers.smooth_normals = v == 1;
        }
        if let Some(v) = self.bl_angle_tolerance {
            layers.angle_tolerance_deg = v;
        }
        if let Some(v) = self.bl_intersect_method {
            layers.intersection = IntersectionPolicy::try_from(v)?;
        }
        Ok(config)
    }
}

fn init_logging(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = match Cli::parse_from_args(std::env::args_os()) {
        Ok(cli) => cli,
        Err(e) => e.exit(),
    };
    init_logging(cli.debug);

    let config = cli.to_config()?;
    tracing::info!(
        input = %cli.input_file.display(),
        output = %cli.output_file.display(),
        domain_scale = config.domain_scale,
        base_mesh_size = config.base_mesh_size,
        threads = config.threads,
        "Starting Intake-Mesh"
    );

    let report = intake_mesh_pipeline::run(&cli.input_file, &cli.output_file, &config)
        .context("pipeline could not start")?;

    if let Some(path) = &cli.report {
        report
            .write_json(path)
            .with_context(|| format!("writing report to {}", path.display()))?;
    }

    match &report.outcome {
        PipelineOutcome::Success { mesh } => {
            println!("Mesh written to {}", mesh.display());
            Ok(ExitCode::SUCCESS)
        }
        PipelineOutcome::PartialSuccess { mesh, warnings } => {
            println!("Fallback mesh written to {}", mesh.display());
            for warning in warnings {
                eprintln!("warning: {}", warning);
            }
            Ok(ExitCode::SUCCESS)
        }
        PipelineOutcome::Failure { stage, reason } => {
            eprintln!("meshing failed at {}: {}", stage, reason);
            eprintln!("{}", serde_json::to_string(&report.attempts)?);
            Ok(ExitCode::FAILURE)
        }
    }
}
