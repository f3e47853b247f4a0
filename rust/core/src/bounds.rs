// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Axis-aligned bounding boxes in f64 precision
//!
//! Used to size the synthetic fluid domain around imported geometry and to
//! tell far-field surfaces apart from imported ones.

use nalgebra::{Point3, Vector3};

/// Extents below this fraction of the largest extent count as degenerate
pub const DEGENERATE_EXTENT_RATIO: f64 = 0.01;

/// Largest coordinate magnitude a geometry file may carry, in millimetres
pub const COORDINATE_LIMIT: f64 = 1.0e9;

/// Finite and within [`COORDINATE_LIMIT`] on every axis
pub fn is_plausible_point(p: &Point3<f64>) -> bool {
    p.iter().all(|v| v.is_finite() && v.abs() <= COORDINATE_LIMIT)
}

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub min_z: f64,
    pub max_x: f64,
    pub max_y: f64,
    pub max_z: f64,
}

impl BoundingBox {
    /// Create new bounds initialized to invalid state
    pub fn empty() -> Self {
        Self {
            min_x: f64::MAX,
            min_y: f64::MAX,
            min_z: f64::MAX,
            max_x: f64::MIN,
            max_y: f64::MIN,
            max_z: f64::MIN,
        }
    }

    pub fn new(min: Point3<f64>, max: Point3<f64>) -> Self {
        Self {
            min_x: min.x.min(max.x),
            min_y: min.y.min(max.y),
            min_z: min.z.min(max.z),
            max_x: min.x.max(max.x),
            max_y: min.y.max(max.y),
            max_z: min.z.max(max.z),
        }
    }

    /// Box spanning `origin .. origin + size`
    pub fn from_origin_size(origin: Point3<f64>, size: Vector3<f64>) -> Self {
        Self::new(origin, origin + size)
    }

    /// Bounds of a point set; `None` when empty
    pub fn from_points<'a, I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a Point3<f64>>,
    {
        let mut bounds = Self::empty();
        for p in points {
            bounds.expand(p);
        }
        bounds.is_valid().then_some(bounds)
    }

    /// Check if bounds are valid (at least one point added)
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.min_x <= self.max_x && self.min_y <= self.max_y && self.min_z <= self.max_z
    }

    /// Expand bounds to include a point
    #[inline]
    pub fn expand(&mut self, p: &Point3<f64>) {
        self.min_x = self.min_x.min(p.x);
        self.min_y = self.min_y.min(p.y);
        self.min_z = self.min_z.min(p.z);
        self.max_x = self.max_x.max(p.x);
        self.max_y = self.max_y.max(p.y);
        self.max_z = self.max_z.max(p.z);
    }

    /// Expand bounds to include another box
    #[inline]
    pub fn union(&mut self, other: &BoundingBox) {
        if !other.is_valid() {
            return;
        }
        self.expand(&other.min());
        self.expand(&other.max());
    }

    #[inline]
    pub fn min(&self) -> Point3<f64> {
        Point3::new(self.min_x, self.min_y, self.min_z)
    }

    #[inline]
    pub fn max(&self) -> Point3<f64> {
        Point3::new(self.max_x, self.max_y, self.max_z)
    }

    /// Get centroid (center of bounding box)
    #[inline]
    pub fn center(&self) -> Point3<f64> {
        Point3::new(
            (self.min_x + self.max_x) / 2.0,
            (self.min_y + self.max_y) / 2.0,
            (self.min_z + self.max_z) / 2.0,
        )
    }

    #[inline]
    pub fn extents(&self) -> Vector3<f64> {
        Vector3::new(
            self.max_x - self.min_x,
            self.max_y - self.min_y,
            self.max_z - self.min_z,
        )
    }

    #[inline]
    pub fn max_extent(&self) -> f64 {
        self.extents().max()
    }

    /// True when some extent is below 1% of the largest one
    pub fn is_degenerate(&self) -> bool {
        let extents = self.extents();
        let largest = extents.max();
        extents.iter().any(|&e| e < DEGENERATE_EXTENT_RATIO * largest)
    }

    /// Replace every degenerate extent with the largest extent, keeping the
    /// center fixed, so near-planar or near-linear geometry still yields a
    /// box with volume.
    pub fn with_degenerate_extents_corrected(&self) -> BoundingBox {
        let extents = self.extents();
        let largest = extents.max();
        if largest <= 0.0 {
            return *self;
        }

        let center = self.center();
        let corrected = extents.map(|e| {
            if e < DEGENERATE_EXTENT_RATIO * largest {
                largest
            } else {
                e
            }
        });
        BoundingBox::new(center - corrected / 2.0, center + corrected / 2.0)
    }

    /// Grow the box by `margin` on every side
    pub fn inflated(&self, margin: f64) -> BoundingBox {
        let m = Vector3::repeat(margin);
        BoundingBox::new(self.min() - m, self.max() + m)
    }

    /// True when `other` lies strictly inside this box on every axis
    pub fn strictly_contains(&self, other: &BoundingBox) -> bool {
        self.min_x < other.min_x
            && self.min_y < other.min_y
            && self.min_z < other.min_z
            && self.max_x > other.max_x
            && self.max_y > other.max_y
            && self.max_z > other.max_z
    }

    /// Containment with a tolerance on every face
    pub fn contains_box(&self, other: &BoundingBox, tolerance: f64) -> bool {
        other.min_x >= self.min_x - tolerance
            && other.min_y >= self.min_y - tolerance
            && other.min_z >= self.min_z - tolerance
            && other.max_x <= self.max_x + tolerance
            && other.max_y <= self.max_y + tolerance
            && other.max_z <= self.max_z + tolerance
    }

    pub fn contains_point(&self, p: &Point3<f64>, tolerance: f64) -> bool {
        p.x >= self.min_x - tolerance
            && p.y >= self.min_y - tolerance
            && p.z >= self.min_z - tolerance
            && p.x <= self.max_x + tolerance
            && p.y <= self.max_y + tolerance
            && p.z <= self.max_z + tolerance
    }

    /// Check if the boxes overlap (touching counts)
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_x <= other.max_x
            && self.max_x >= other.min_x
            && self.min_y <= other.max_y
            && self.max_y >= other.min_y
            && self.min_z <= other.max_z
            && self.max_z >= other.min_z
    }

    /// Distance from a point to the box (0 inside)
    pub fn distance_to(&self, p: &Point3<f64>) -> f64 {
        let dx = (self.min_x - p.x).max(0.0).max(p.x - self.max_x);
        let dy = (self.min_y - p.y).max(0.0).max(p.y - self.max_y);
        let dz = (self.min_z - p.z).max(0.0).max(p.z - self.max_z);
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::empty()
    }
}
