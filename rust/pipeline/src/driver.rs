// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Progressive mesh generation and output.

use std::path::{Path, PathBuf};

use intake_mesh_kernel::{Algorithm2D, Dim, GeometryKernel, KernelError, WriteOptions};

use crate::error::MeshError;

/// Output format version, pinned rather than left to the kernel default.
pub const MSH_VERSION: (u32, u32) = (4, 1);

/// The tolerant surface algorithm used for the single 2D retry.
pub const FALLBACK_ALGORITHM_2D: Algorithm2D = Algorithm2D::InitialMeshOnly;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    NotStarted,
    Mesh1D,
    Mesh2D,
    Mesh3D,
    Written,
    /// Failed while attempting the given state.
    Failed(Step),
}

/// A transition the driver can fail in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Mesh1D,
    Mesh2D,
    Mesh3D,
    Write,
}

/// Drives 1D, 2D and 3D generation on a prepared model and writes the mesh.
pub struct MeshDriver<'k, K: GeometryKernel> {
    kernel: &'k mut K,
    state: DriverState,
    retried_2d: bool,
}

impl<'k, K: GeometryKernel> MeshDriver<'k, K> {
    pub fn new(kernel: &'k mut K) -> Self {
        Self {
            kernel,
            state: DriverState::NotStarted,
            retried_2d: false,
        }
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    /// Whether the 2D retry with [`FALLBACK_ALGORITHM_2D`] was needed.
    pub fn retried_2d(&self) -> bool {
        self.retried_2d
    }

    /// Generate up to 3D and write `output`. On failure the partial mesh is
    /// dumped next to `output` before the error is returned.
    pub fn run(&mut self, output: &Path) -> Result<(), MeshError> {
        let result = self.mesh_all().and_then(|()| self.write(output));
        if result.is_err() {
            self.dump_debug(output);
        }
        result
    }

    fn mesh_all(&mut self) -> Result<(), MeshError> {
        self.step(Step::Mesh1D, Dim::Curve)
            .map_err(MeshError::Mesh1DFailed)?;
        self.state = DriverState::Mesh1D;

        if let Err(first) = self.step(Step::Mesh2D, Dim::Surface) {
            self.retry_2d(first)?;
        }
        self.state = DriverState::Mesh2D;

        self.step(Step::Mesh3D, Dim::Volume)
            .map_err(MeshError::Mesh3DFailed)?;
        self.state = DriverState::Mesh3D;
        Ok(())
    }

    fn step(&mut self, step: Step, dim: Dim) -> Result<(), KernelError> {
        tracing::info!(dim = %dim, "Generating mesh");
        self.kernel.generate(dim).map_err(|e| {
            self.state = DriverState::Failed(step);
            e
        })
    }

    /// One retry with the tolerant algorithm; only the algorithm changes.
    fn retry_2d(&mut self, first: KernelError) -> Result<(), MeshError> {
        let mut options = self.kernel.mesh_options();
        if options.algorithm_2d == FALLBACK_ALGORITHM_2D {
            return Err(MeshError::Mesh2DFailed(first));
        }
        tracing::warn!(
            error = %first,
            from = %options.algorithm_2d,
            to = %FALLBACK_ALGORITHM_2D,
            "2D meshing failed, retrying with a more tolerant algorithm"
        );
        options.algorithm_2d = FALLBACK_ALGORITHM_2D;
        self.kernel.set_mesh_options(options).map_err(MeshError::Mesh2DFailed)?;
        self.retried_2d = true;
        self.step(Step::Mesh2D, Dim::Surface).map_err(MeshError::Mesh2DFailed)
    }

    fn write(&mut self, output: &Path) -> Result<(), MeshError> {
        let options = WriteOptions {
            binary: true,
            msh_version: MSH_VERSION,
        };
        self.kernel.write(output, &options).map_err(|e| {
            self.state = DriverState::Failed(Step::Write);
            MeshError::WriteFailed(e)
        })?;
        self.state = DriverState::Written;
        tracing::info!(path = %output.display(), "Wrote mesh");
        Ok(())
    }

    fn dump_debug(&self, output: &Path) {
        let path = debug_path(output);
        let options = WriteOptions {
            binary: true,
            msh_version: MSH_VERSION,
        };
        match self.kernel.write(&path, &options) {
            Ok(()) => tracing::info!(path = %path.display(), "Wrote partial mesh for debugging"),
            Err(e) => tracing::debug!(error = %e, "Could not write partial mesh"),
        }
    }
}

/// `out.msh` -> `out_debug.msh`, in the same directory.
pub fn debug_path(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "mesh".to_string());
    output.with_file_name(format!("{}_debug.msh", stem))
}
