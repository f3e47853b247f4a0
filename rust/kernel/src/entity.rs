// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Entity handles exchanged across the kernel interface.
//!
//! An [`Entity`] is an opaque `(dimension, tag)` pair. Tags are unique per
//! dimension within one model and are never reused while the model lives.

use std::fmt;

/// Topological dimension of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Dim {
    Point = 0,
    Curve = 1,
    Surface = 2,
    Volume = 3,
}

impl Dim {
    pub const ALL: [Dim; 4] = [Dim::Point, Dim::Curve, Dim::Surface, Dim::Volume];

    /// Integer dimension as used by mesh file formats.
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn from_i32(dim: i32) -> Option<Dim> {
        match dim {
            0 => Some(Dim::Point),
            1 => Some(Dim::Curve),
            2 => Some(Dim::Surface),
            3 => Some(Dim::Volume),
            _ => None,
        }
    }

    /// Dimension one below, or `None` for points.
    pub fn lower(self) -> Option<Dim> {
        Dim::from_i32(self.as_i32() - 1)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Dim::Point => "point",
            Dim::Curve => "curve",
            Dim::Surface => "surface",
            Dim::Volume => "volume",
        }
    }
}

impl fmt::Display for Dim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque `(dimension, tag)` handle owned by the kernel's active model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Entity {
    pub dim: Dim,
    pub tag: i32,
}

impl Entity {
    pub const fn new(dim: Dim, tag: i32) -> Self {
        Self { dim, tag }
    }

    pub const fn point(tag: i32) -> Self {
        Self::new(Dim::Point, tag)
    }

    pub const fn curve(tag: i32) -> Self {
        Self::new(Dim::Curve, tag)
    }

    pub const fn surface(tag: i32) -> Self {
        Self::new(Dim::Surface, tag)
    }

    pub const fn volume(tag: i32) -> Self {
        Self::new(Dim::Volume, tag)
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.dim.as_i32(), self.tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering_is_dim_then_tag() {
        let mut v = vec![Entity::volume(1), Entity::surface(7), Entity::surface(2)];
        v.sort();
        assert_eq!(v, vec![Entity::surface(2), Entity::surface(7), Entity::volume(1)]);
    }

    #[test]
    fn test_display() {
        assert_eq!(Entity::curve(12).to_string(), "(1, 12)");
        assert_eq!(Dim::Volume.lower(), Some(Dim::Surface));
        assert_eq!(Dim::Point.lower(), None);
    }
}
