// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for kernel operations.

use crate::entity::{Dim, Entity};
use crate::field::FieldId;

/// Result type alias for kernel operations.
pub type Result<T> = std::result::Result<T, KernelError>;

/// Errors raised by a geometry/meshing kernel.
#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    #[error("no active model")]
    NoActiveModel,

    #[error("model '{0}' is already active")]
    ModelAlreadyActive(String),

    #[error("entity not found: {0}")]
    EntityNotFound(Entity),

    #[error("entity {0} is still bounded by a higher-dimensional entity")]
    EntityInUse(Entity),

    #[error("geometry changed since the last synchronize")]
    NotSynchronized,

    #[error("unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("file format error: {0}")]
    Format(#[from] intake_mesh_core::Error),

    #[error("invalid geometry: {0}")]
    Geometry(String),

    #[error("boolean operation failed: {0}")]
    Boolean(String),

    #[error("field {0} does not exist")]
    UnknownField(FieldId),

    #[error("invalid field: {0}")]
    InvalidField(String),

    #[error("background field {0} is already installed")]
    BackgroundFieldActive(FieldId),

    #[error("invalid mesh option: {0}")]
    InvalidOption(String),

    #[error("{dim} meshing failed: {reason}")]
    Meshing { dim: Dim, reason: String },

    #[error("mesh would exceed {limit} elements")]
    ElementBudgetExceeded { limit: usize },

    #[error("thread pool: {0}")]
    ThreadPool(String),
}

impl KernelError {
    pub fn meshing(dim: Dim, reason: impl Into<String>) -> Self {
        KernelError::Meshing {
            dim,
            reason: reason.into(),
        }
    }
}
