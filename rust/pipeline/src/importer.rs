// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Geometry import with healing.

use std::path::Path;

use rustc_hash::FxHashSet;

use intake_mesh_kernel::{Dim, Entity, GeometryKernel, HealingOptions};

use crate::error::ImportError;

/// Entities introduced by one import.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportedEntities {
    pub entities: Vec<Entity>,
}

impl ImportedEntities {
    /// The surfaces and volumes, which are what fragmentation can use.
    pub fn surfaces_and_volumes(&self) -> Vec<Entity> {
        self.entities
            .iter()
            .copied()
            .filter(|e| e.dim >= Dim::Surface)
            .collect()
    }

    pub fn of_dim(&self, dim: Dim) -> impl Iterator<Item = Entity> + '_ {
        self.entities.iter().copied().filter(move |e| e.dim == dim)
    }
}

/// Merge `path` into the active model and report what it added.
pub fn import<K: GeometryKernel>(
    kernel: &mut K,
    path: &Path,
    healing: &HealingOptions,
) -> Result<ImportedEntities, ImportError> {
    let metadata = std::fs::metadata(path).map_err(|_| ImportError::NotFound(path.to_path_buf()))?;
    if !metadata.is_file() {
        return Err(ImportError::NotFound(path.to_path_buf()));
    }
    if metadata.len() == 0 {
        return Err(ImportError::Empty(path.to_path_buf()));
    }

    let before: FxHashSet<Entity> = kernel.entities(None)?.into_iter().collect();

    kernel.set_healing(*healing);
    kernel.merge(path)?;
    kernel.synchronize()?;

    let entities: Vec<Entity> = kernel
        .entities(None)?
        .into_iter()
        .filter(|e| !before.contains(e))
        .collect();

    if entities.is_empty() {
        return Err(ImportError::NoGeometry);
    }
    let imported = ImportedEntities { entities };
    if imported.surfaces_and_volumes().is_empty() {
        return Err(ImportError::NoSurfacesOrVolumes);
    }

    tracing::info!(
        path = %path.display(),
        points = imported.of_dim(Dim::Point).count(),
        curves = imported.of_dim(Dim::Curve).count(),
        surfaces = imported.of_dim(Dim::Surface).count(),
        volumes = imported.of_dim(Dim::Volume).count(),
        "Imported geometry"
    );
    Ok(imported)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{write_step_box, TETRA_STL};
    use intake_mesh_kernel::{BuiltinKernel, Point3, Vector3};

    fn kernel() -> BuiltinKernel {
        let mut kernel = BuiltinKernel::new();
        kernel.add_model("t").unwrap();
        kernel
    }

    #[test]
    fn test_missing_and_empty_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut kernel = kernel();
        let healing = HealingOptions::all(1e-2);

        let missing = dir.path().join("missing.step");
        assert!(matches!(
            import(&mut kernel, &missing, &healing),
            Err(ImportError::NotFound(_))
        ));

        let empty = dir.path().join("empty.step");
        std::fs::write(&empty, b"").unwrap();
        assert!(matches!(import(&mut kernel, &empty, &healing), Err(ImportError::Empty(_))));
    }

    #[test]
    fn test_reports_only_new_entities() {
        let dir = tempfile::tempdir().unwrap();
        let mut kernel = kernel();
        // Leftover state from a previous use of the model
        kernel
            .add_box(Point3::new(100.0, 0.0, 0.0), Vector3::new(1.0, 1.0, 1.0))
            .unwrap();
        kernel.synchronize().unwrap();

        let path = write_step_box(dir.path(), [0.0; 3], [1.0, 2.0, 3.0]);
        let imported = import(&mut kernel, &path, &HealingOptions::all(1e-2)).unwrap();
        assert_eq!(imported.of_dim(Dim::Volume).count(), 1);
        assert_eq!(imported.of_dim(Dim::Surface).count(), 6);
        assert!(!imported.entities.contains(&Entity::volume(1)));
    }

    #[test]
    fn test_surfaces_only_from_stl() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tetra.stl");
        std::fs::write(&path, TETRA_STL).unwrap();
        let mut kernel = kernel();
        let imported = import(&mut kernel, &path, &HealingOptions::all(1e-2)).unwrap();
        assert_eq!(imported.surfaces_and_volumes().len(), 1);
    }

    #[test]
    fn test_corrupt_file_is_a_kernel_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.step");
        std::fs::write(&path, b"ISO-10303-21;\nHEADER;\nENDSEC;\n").unwrap();
        let mut kernel = kernel();
        assert!(matches!(
            import(&mut kernel, &path, &HealingOptions::all(1e-2)),
            Err(ImportError::Kernel(_))
        ));
    }
}
