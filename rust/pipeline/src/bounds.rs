// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Bounding volume of a set of entities.

use intake_mesh_core::BoundingBox;
use intake_mesh_kernel::{Entity, GeometryKernel, KernelError};

/// Union of the per-entity boxes with degenerate extents corrected.
///
/// Entities are queried one by one; kernels are not assumed to offer a
/// batch query.
pub fn bounding_box<K: GeometryKernel>(kernel: &K, entities: &[Entity]) -> Result<BoundingBox, KernelError> {
    let mut bounds = BoundingBox::empty();
    for &entity in entities {
        bounds.union(&kernel.bounding_box(entity)?);
    }
    if !bounds.is_valid() {
        return Err(KernelError::Geometry("no bounded entities".into()));
    }
    Ok(correct_degenerate(&bounds))
}

/// Replace extents below 1% of the largest with the largest one.
pub fn correct_degenerate(bounds: &BoundingBox) -> BoundingBox {
    if !bounds.is_degenerate() {
        return *bounds;
    }
    let corrected = bounds.with_degenerate_extents_corrected();
    tracing::warn!(
        extents = ?bounds.extents().as_slice(),
        corrected = ?corrected.extents().as_slice(),
        "Corrected degenerate bounding box"
    );
    corrected
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use intake_mesh_kernel::{BuiltinKernel, Point3, Vector3};

    #[test]
    fn test_union_of_entities() {
        let mut kernel = BuiltinKernel::new();
        kernel.add_model("t").unwrap();
        let a = kernel.add_box(Point3::origin(), Vector3::new(1.0, 1.0, 1.0)).unwrap();
        let b = kernel
            .add_box(Point3::new(2.0, 0.0, 0.0), Vector3::new(1.0, 2.0, 1.0))
            .unwrap();
        let bounds = bounding_box(&kernel, &[a, b]).unwrap();
        assert_relative_eq!(bounds.max_x, 3.0);
        assert_relative_eq!(bounds.max_y, 2.0);
        assert!(bounding_box(&kernel, &[]).is_err());
    }

    #[test]
    fn test_flat_extent_is_replaced_by_largest() {
        let plate = BoundingBox::new(Point3::new(0.0, 0.0, 5.0), Point3::new(10.0, 4.0, 5.0));
        let corrected = correct_degenerate(&plate);
        let extents = corrected.extents();
        assert!(extents.iter().all(|&e| e > 0.0));
        assert_relative_eq!(extents.z, 10.0);
        assert_relative_eq!(extents.y, 4.0);
        assert_relative_eq!(corrected.center().z, 5.0);
    }
}
