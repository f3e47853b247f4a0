// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Outcome of a run and its JSON report.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use intake_mesh_kernel::MeshStats;

use crate::classify::ClassificationPath;
use crate::domain::DomainSpec;
use crate::fields::{LayerPlan, SizeFieldPlan};

/// Recovery stages, in the order they are tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Full pipeline with the configured settings.
    Nominal,
    /// Coarser mesh, looser healing, simpler 3D algorithm.
    Coarse,
    /// Input re-imported through a surface tessellation.
    StlRoundTrip,
    /// Mesh of the bounding box alone.
    BoxOnly,
}

impl Stage {
    pub const ALL: [Stage; 4] = [Stage::Nominal, Stage::Coarse, Stage::StlRoundTrip, Stage::BoxOnly];

    pub fn name(self) -> &'static str {
        match self {
            Stage::Nominal => "nominal",
            Stage::Coarse => "coarse",
            Stage::StlRoundTrip => "stl_round_trip",
            Stage::BoxOnly => "box_only",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PipelineOutcome {
    Success { mesh: PathBuf },
    PartialSuccess { mesh: PathBuf, warnings: Vec<String> },
    Failure { stage: Stage, reason: String },
}

impl PipelineOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, PipelineOutcome::Failure { .. })
    }

    pub fn mesh_path(&self) -> Option<&Path> {
        match self {
            PipelineOutcome::Success { mesh } | PipelineOutcome::PartialSuccess { mesh, .. } => Some(mesh),
            PipelineOutcome::Failure { .. } => None,
        }
    }
}

/// One stage the cascade tried or skipped.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageAttempt {
    pub stage: Stage,
    pub succeeded: bool,
    pub skipped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

/// Serializable copy of the kernel's mesh statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MeshSummary {
    pub nodes: usize,
    pub lines: usize,
    pub triangles: usize,
    pub tetrahedra: usize,
    pub min_quality: Option<f64>,
    pub mean_quality: Option<f64>,
    pub inverted: usize,
}

impl From<&MeshStats> for MeshSummary {
    fn from(stats: &MeshStats) -> Self {
        Self {
            nodes: stats.nodes,
            lines: stats.lines,
            triangles: stats.triangles,
            tetrahedra: stats.tetrahedra,
            min_quality: stats.min_quality,
            mean_quality: stats.mean_quality,
            inverted: stats.inverted,
        }
    }
}

/// Everything known about a finished run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub input: PathBuf,
    pub output: PathBuf,
    pub outcome: PipelineOutcome,
    pub attempts: Vec<StageAttempt>,
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<DomainSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classification: Option<ClassificationPath>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_field: Option<SizeFieldPlan>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub boundary_layer: Option<LayerPlan>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mesh: Option<MeshSummary>,
    pub elapsed_ms: u64,
}

impl RunReport {
    /// The stage that produced the mesh, if any.
    pub fn final_stage(&self) -> Option<Stage> {
        self.attempts.iter().find(|a| a.succeeded).map(|a| a.stage)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn write_json(&self, path: &Path) -> std::io::Result<()> {
        let json = self.to_json().map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_json_is_tagged() {
        let outcome = PipelineOutcome::PartialSuccess {
            mesh: PathBuf::from("out.msh"),
            warnings: vec!["no geometry".into()],
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "partial_success");
        assert_eq!(json["mesh"], "out.msh");

        let failure = PipelineOutcome::Failure {
            stage: Stage::BoxOnly,
            reason: "disk full".into(),
        };
        assert!(failure.is_failure());
        assert!(failure.mesh_path().is_none());
        assert_eq!(serde_json::to_value(&failure).unwrap()["stage"], "box_only");
    }
}
