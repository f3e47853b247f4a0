// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use thiserror::Error;

/// Result type for file-format operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while reading or writing geometry files
#[derive(Error, Debug)]
pub enum Error {
    #[error("Parse error at byte {position}: {message}")]
    Parse { position: usize, message: String },

    #[error("Entity #{0} not found")]
    EntityNotFound(u32),

    #[error("Entity #{id} ({type_name}) is malformed: {reason}")]
    MalformedEntity {
        id: u32,
        type_name: String,
        reason: String,
    },

    #[error("Missing DATA section")]
    MissingDataSection,

    #[error("Coordinate out of range in {context}: ({x}, {y}, {z})")]
    CoordinateOutOfRange {
        context: String,
        x: f64,
        y: f64,
        z: f64,
    },

    #[error("Invalid STL content: {0}")]
    InvalidStl(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn parse(position: usize, message: impl Into<String>) -> Self {
        Error::Parse {
            position,
            message: message.into(),
        }
    }

    pub fn coordinate(context: impl Into<String>, p: &nalgebra::Point3<f64>) -> Self {
        Error::CoordinateOutOfRange {
            context: context.into(),
            x: p.x,
            y: p.y,
            z: p.z,
        }
    }

    pub fn malformed(id: u32, type_name: &str, reason: impl Into<String>) -> Self {
        Error::MalformedEntity {
            id,
            type_name: type_name.to_string(),
            reason: reason.into(),
        }
    }
}
