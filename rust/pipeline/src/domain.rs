// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Synthetic fluid-domain box around the imported geometry.

use serde::Serialize;

use intake_mesh_core::BoundingBox;
use intake_mesh_kernel::{BoundaryQuery, Entity, GeometryKernel, KernelError, Point3, Vector3};

/// Scale used when the configured one would not enclose the geometry.
pub const SAFE_DOMAIN_SCALE: f64 = 1.5;

/// Placement of the domain box, fixed once computed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DomainSpec {
    pub scale: f64,
    pub center: [f64; 3],
    pub size: [f64; 3],
}

impl DomainSpec {
    /// Scale the bounding box about its center. Scales of 1.0 or less are
    /// replaced by [`SAFE_DOMAIN_SCALE`].
    pub fn around(bounds: &BoundingBox, scale: f64) -> Self {
        let scale = if scale.is_finite() && scale > 1.0 {
            scale
        } else {
            tracing::warn!(scale, fallback = SAFE_DOMAIN_SCALE, "Domain scale must exceed 1.0");
            SAFE_DOMAIN_SCALE
        };
        let center = bounds.center();
        let size = bounds.extents() * scale;
        Self {
            scale,
            center: [center.x, center.y, center.z],
            size: [size.x, size.y, size.z],
        }
    }

    pub fn origin(&self) -> Point3<f64> {
        Point3::from(self.center) - self.extent() / 2.0
    }

    pub fn extent(&self) -> Vector3<f64> {
        Vector3::from(self.size)
    }

    pub fn bounds(&self) -> BoundingBox {
        BoundingBox::from_origin_size(self.origin(), self.extent())
    }
}

/// The box volume and the faces it had before fragmentation.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainBox {
    pub spec: DomainSpec,
    pub volume: Entity,
    pub faces: Vec<Entity>,
}

/// Create the domain box in the active model and synchronize.
pub fn build_domain<K: GeometryKernel>(
    kernel: &mut K,
    bounds: &BoundingBox,
    scale: f64,
) -> Result<DomainBox, KernelError> {
    let spec = DomainSpec::around(bounds, scale);
    let volume = kernel.add_box(spec.origin(), spec.extent())?;
    kernel.synchronize()?;
    let faces = kernel.boundary(&[volume], BoundaryQuery::default())?;

    tracing::info!(
        volume = %volume,
        scale = spec.scale,
        size = ?spec.size,
        "Built domain box"
    );
    Ok(DomainBox { spec, volume, faces })
}
