// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error taxonomy of the pipeline.
//!
//! [`ConfigError`] is fatal and raised before any kernel session opens.
//! Everything else is local to one recovery stage and is wrapped in a
//! [`StageError`] that the cascade records before moving on.

use std::path::PathBuf;

use intake_mesh_kernel::{FieldId, KernelError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid boundary layer parameters: {0}")]
    InvalidBoundaryLayerParams(String),

    #[error("invalid mesh size: {0}")]
    InvalidMeshSize(String),

    #[error("domain scale must be greater than 1.0, got {0}")]
    InvalidDomainScale(f64),

    #[error("invalid mesh algorithm: {0}")]
    InvalidAlgorithm(String),

    #[error("invalid size field ratios: {0}")]
    InvalidSizeField(String),
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("input file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("input file is empty: {}", .0.display())]
    Empty(PathBuf),

    #[error("import produced no new entities")]
    NoGeometry,

    #[error("import produced no surfaces or volumes")]
    NoSurfacesOrVolumes,

    #[error("kernel import failed: {0}")]
    Kernel(#[from] KernelError),
}

impl ImportError {
    /// No other representation of the same input can succeed after this.
    pub fn is_missing_input(&self) -> bool {
        matches!(self, ImportError::NotFound(_) | ImportError::Empty(_))
    }
}

#[derive(Debug, Error)]
pub enum FragmentError {
    #[error("boolean fragmentation failed: {0}")]
    BooleanFailed(String),

    #[error("fragmentation left no volume and none could be rebuilt")]
    EmptyResult,

    #[error("kernel error after fragmentation: {0}")]
    Kernel(#[from] KernelError),
}

/// Raised internally by the preferred and fallback classification paths;
/// the classifier recovers by using every fluid boundary surface.
#[derive(Debug, Error)]
pub enum ClassificationError {
    #[error("no intake surfaces found")]
    NoSurfacesFound,
}

#[derive(Debug, Error)]
pub enum MeshError {
    #[error("1D meshing failed: {0}")]
    Mesh1DFailed(#[source] KernelError),

    #[error("2D meshing failed: {0}")]
    Mesh2DFailed(#[source] KernelError),

    #[error("3D meshing failed: {0}")]
    Mesh3DFailed(#[source] KernelError),

    #[error("writing mesh failed: {0}")]
    WriteFailed(#[source] KernelError),

    #[error("background size field {0} is already installed")]
    BackgroundFieldActive(FieldId),

    #[error("size field setup failed: {0}")]
    Field(#[source] KernelError),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("a kernel session is already open in this process")]
    AlreadyOpen,

    #[error("kernel session setup failed: {0}")]
    Kernel(#[from] KernelError),
}

/// Failure of one recovery stage.
#[derive(Debug, Error)]
pub enum StageError {
    #[error(transparent)]
    Import(#[from] ImportError),

    #[error(transparent)]
    Fragment(#[from] FragmentError),

    #[error(transparent)]
    Mesh(#[from] MeshError),

    #[error("kernel: {0}")]
    Kernel(#[from] KernelError),
}

/// Errors that stop a run before the cascade starts.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Session(#[from] SessionError),
}
