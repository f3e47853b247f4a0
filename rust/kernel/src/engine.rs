// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The geometry/meshing engine interface and its built-in implementation.
//!
//! Every operation acts on the single active model. Construction calls
//! (import, primitives, fragmentation) leave the model unsynchronized;
//! fragmentation and mesh generation refuse to run until
//! [`GeometryKernel::synchronize`] has been called.

use std::path::Path;

use nalgebra::{Point3, Vector3};
use rayon::{ThreadPool, ThreadPoolBuilder};
use rustc_hash::FxHashMap;

use intake_mesh_core::BoundingBox;

use crate::builders;
use crate::entity::{Dim, Entity};
use crate::error::{KernelError, Result};
use crate::field::{FieldId, FieldSpec};
use crate::fragment::{self, FragmentOutput};
use crate::heal::{heal_entities, heal_model, HealReport};
use crate::import::import_file;
use crate::mesh;
use crate::model::Model;
use crate::msh::{write_msh, write_surface_stl};
use crate::options::{BoundaryQuery, HealingOptions, MeshOptions, WriteOptions};
use crate::quality::MeshStats;

/// Narrow, synchronous interface to a geometry kernel and mesher.
pub trait GeometryKernel {
    /// Open a new active model. Fails while another model is active.
    fn add_model(&mut self, name: &str) -> Result<()>;
    /// Discard the active model with all its entities, fields and mesh.
    fn remove_model(&mut self) -> Result<()>;
    fn has_model(&self) -> bool;

    /// Worker threads for meshing; 0 picks the hardware concurrency.
    fn set_threads(&mut self, threads: usize) -> Result<()>;
    /// Healing applied by `merge`.
    fn set_healing(&mut self, options: HealingOptions);

    /// Import a STEP or STL file into the active model.
    fn merge(&mut self, path: &Path) -> Result<()>;

    fn entities(&self, dim: Option<Dim>) -> Result<Vec<Entity>>;
    fn bounding_box(&self, entity: Entity) -> Result<BoundingBox>;
    /// Bounds of the whole model, `None` when it is empty.
    fn model_bounding_box(&self) -> Result<Option<BoundingBox>>;

    fn add_box(&mut self, origin: Point3<f64>, size: Vector3<f64>) -> Result<Entity>;
    fn add_surface_loop_volume(&mut self, surfaces: &[Entity]) -> Result<Entity>;
    fn synchronize(&mut self) -> Result<()>;

    /// Fragment `objects` by `tools`; the parent map is positional over
    /// `objects` followed by `tools`.
    fn fragment(&mut self, objects: &[Entity], tools: &[Entity]) -> Result<FragmentOutput>;
    /// Heal the given entities, or the whole model when `entities` is empty.
    fn heal(&mut self, entities: &[Entity], options: &HealingOptions) -> Result<HealReport>;
    fn boundary(&self, entities: &[Entity], query: BoundaryQuery) -> Result<Vec<Entity>>;
    /// Build boundary curves of discrete surfaces; returns how many.
    fn create_edges(&mut self) -> Result<usize>;
    fn remove(&mut self, entities: &[Entity], recursive: bool) -> Result<()>;
    fn add_physical_group(&mut self, dim: Dim, tags: &[i32], name: &str) -> Result<i32>;

    fn add_field(&mut self, spec: FieldSpec) -> Result<FieldId>;
    fn set_background_field(&mut self, id: FieldId) -> Result<()>;
    fn set_boundary_layer_field(&mut self, id: FieldId) -> Result<()>;

    fn set_mesh_options(&mut self, options: MeshOptions) -> Result<()>;
    fn mesh_options(&self) -> MeshOptions;
    /// Mesh every dimension up to `dim` that is not meshed yet.
    fn generate(&mut self, dim: Dim) -> Result<()>;
    fn clear_mesh(&mut self) -> Result<()>;
    fn mesh_stats(&self) -> Result<MeshStats>;
    /// Write the mesh; the format follows the file extension.
    fn write(&self, path: &Path, options: &WriteOptions) -> Result<()>;
}

/// Pure-Rust reference kernel.
#[derive(Default)]
pub struct BuiltinKernel {
    model: Option<Model>,
    threads: usize,
    pool: Option<ThreadPool>,
    healing: HealingOptions,
    mesh_options: MeshOptions,
}

impl BuiltinKernel {
    pub fn new() -> Self {
        Self::default()
    }

    /// The active model, for inspection.
    pub fn model(&self) -> Option<&Model> {
        self.model.as_ref()
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    fn active(&self) -> Result<&Model> {
        self.model.as_ref().ok_or(KernelError::NoActiveModel)
    }

    fn active_mut(&mut self) -> Result<&mut Model> {
        self.model.as_mut().ok_or(KernelError::NoActiveModel)
    }

    fn synchronized_mut(&mut self) -> Result<&mut Model> {
        let model = self.active_mut()?;
        if model.dirty {
            return Err(KernelError::NotSynchronized);
        }
        Ok(model)
    }
}

impl GeometryKernel for BuiltinKernel {
    fn add_model(&mut self, name: &str) -> Result<()> {
        if let Some(active) = &self.model {
            return Err(KernelError::ModelAlreadyActive(active.name.clone()));
        }
        tracing::debug!(model = name, "Added model");
        self.model = Some(Model::new(name));
        Ok(())
    }

    fn remove_model(&mut self) -> Result<()> {
        let model = self.model.take().ok_or(KernelError::NoActiveModel)?;
        tracing::debug!(model = %model.name, "Removed model");
        Ok(())
    }

    fn has_model(&self) -> bool {
        self.model.is_some()
    }

    fn set_threads(&mut self, threads: usize) -> Result<()> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("mesh-worker-{}", i))
            .build()
            .map_err(|e| KernelError::ThreadPool(e.to_string()))?;
        self.threads = pool.current_num_threads();
        self.pool = Some(pool);
        Ok(())
    }

    fn set_healing(&mut self, options: HealingOptions) {
        self.healing = options;
    }

    fn merge(&mut self, path: &Path) -> Result<()> {
        let healing = self.healing;
        let model = self.active_mut()?;
        let report = import_file(model, path, &healing)?;
        if report.changed() {
            tracing::info!(
                welded = report.welded_points,
                curves = report.removed_curves + report.merged_curves,
                surfaces = report.removed_surfaces + report.merged_surfaces,
                volumes = report.removed_volumes,
                "Healed imported geometry"
            );
        }
        Ok(())
    }

    fn entities(&self, dim: Option<Dim>) -> Result<Vec<Entity>> {
        Ok(self.active()?.entities(dim))
    }

    fn bounding_box(&self, entity: Entity) -> Result<BoundingBox> {
        self.active()?.bounding_box(entity)
    }

    fn model_bounding_box(&self) -> Result<Option<BoundingBox>> {
        Ok(self.active()?.model_bounding_box())
    }

    fn add_box(&mut self, origin: Point3<f64>, size: Vector3<f64>) -> Result<Entity> {
        if !(size.x > 0.0 && size.y > 0.0 && size.z > 0.0) {
            return Err(KernelError::Geometry(format!(
                "box size must be positive, got {} x {} x {}",
                size.x, size.y, size.z
            )));
        }
        Ok(builders::add_box(self.active_mut()?, origin, size))
    }

    fn add_surface_loop_volume(&mut self, surfaces: &[Entity]) -> Result<Entity> {
        builders::add_surface_loop_volume(self.active_mut()?, surfaces)
    }

    fn synchronize(&mut self) -> Result<()> {
        let model = self.active_mut()?;
        model.dirty = false;
        Ok(())
    }

    fn fragment(&mut self, objects: &[Entity], tools: &[Entity]) -> Result<FragmentOutput> {
        let model = self.synchronized_mut()?;
        model.mesh.clear();
        fragment::fragment(model, objects, tools)
    }

    fn heal(&mut self, entities: &[Entity], options: &HealingOptions) -> Result<HealReport> {
        let model = self.active_mut()?;
        if entities.is_empty() {
            Ok(heal_model(model, options))
        } else {
            heal_entities(model, entities, options)
        }
    }

    fn boundary(&self, entities: &[Entity], query: BoundaryQuery) -> Result<Vec<Entity>> {
        let model = self.active()?;

        let mut current: Vec<(Entity, bool)> = Vec::new();
        for &entity in entities {
            current.extend(model.boundary_of(entity)?);
        }
        if query.recursive {
            while current.first().is_some_and(|(e, _)| e.dim != Dim::Point) {
                let mut lower = Vec::new();
                for (entity, _) in &current {
                    lower.extend(model.boundary_of(*entity)?);
                }
                current = lower;
            }
        }

        if query.combined && !query.recursive {
            let mut uses: FxHashMap<Entity, usize> = FxHashMap::default();
            for (entity, _) in &current {
                *uses.entry(*entity).or_default() += 1;
            }
            current.retain(|(entity, _)| uses[entity] % 2 == 1);
        }

        let mut seen = rustc_hash::FxHashSet::default();
        Ok(current
            .into_iter()
            .filter(|(entity, _)| seen.insert(*entity))
            .map(|(entity, forward)| {
                if query.oriented && !forward {
                    Entity::new(entity.dim, -entity.tag)
                } else {
                    entity
                }
            })
            .collect())
    }

    fn create_edges(&mut self) -> Result<usize> {
        Ok(self.active_mut()?.create_discrete_edges())
    }

    fn remove(&mut self, entities: &[Entity], recursive: bool) -> Result<()> {
        let model = self.active_mut()?;
        for &entity in entities {
            model.remove(entity, recursive)?;
        }
        model.mesh.clear();
        Ok(())
    }

    fn add_physical_group(&mut self, dim: Dim, tags: &[i32], name: &str) -> Result<i32> {
        self.active_mut()?.add_physical_group(dim, tags.to_vec(), name)
    }

    fn add_field(&mut self, spec: FieldSpec) -> Result<FieldId> {
        let model = self.active_mut()?;
        let mut fields = std::mem::take(&mut model.fields);
        let added = fields.add(model, spec);
        model.fields = fields;
        added
    }

    fn set_background_field(&mut self, id: FieldId) -> Result<()> {
        self.active_mut()?.fields.set_background(id)
    }

    fn set_boundary_layer_field(&mut self, id: FieldId) -> Result<()> {
        self.active_mut()?.fields.set_boundary_layer(id)
    }

    fn set_mesh_options(&mut self, options: MeshOptions) -> Result<()> {
        if !(options.size_min >= 0.0 && options.size_max > 0.0 && options.size_min <= options.size_max) {
            return Err(KernelError::InvalidOption(format!(
                "mesh sizes must satisfy 0 <= min <= max and max > 0, got {} and {}",
                options.size_min, options.size_max
            )));
        }
        if options.optimize_netgen {
            tracing::debug!("Netgen optimisation is not available in the built-in kernel");
        }
        self.mesh_options = options;
        Ok(())
    }

    fn mesh_options(&self) -> MeshOptions {
        self.mesh_options.clone()
    }

    fn generate(&mut self, dim: Dim) -> Result<()> {
        let options = self.mesh_options.clone();
        let model = self.model.as_mut().ok_or(KernelError::NoActiveModel)?;
        if model.dirty {
            return Err(KernelError::NotSynchronized);
        }
        mesh::generate(model, dim, &options, self.pool.as_ref())
    }

    fn clear_mesh(&mut self) -> Result<()> {
        self.active_mut()?.mesh.clear();
        Ok(())
    }

    fn mesh_stats(&self) -> Result<MeshStats> {
        let model = self.active()?;
        Ok(match &self.pool {
            Some(pool) => pool.install(|| MeshStats::compute(&model.mesh)),
            None => MeshStats::compute(&model.mesh),
        })
    }

    fn write(&self, path: &Path, options: &WriteOptions) -> Result<()> {
        let model = self.active()?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "msh" => write_msh(model, path, options),
            "stl" => write_surface_stl(&model.mesh, path),
            _ => Err(KernelError::UnsupportedFormat(path.display().to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kernel_with_box() -> BuiltinKernel {
        let mut kernel = BuiltinKernel::new();
        kernel.add_model("t").unwrap();
        kernel
            .add_box(Point3::origin(), Vector3::new(1.0, 1.0, 1.0))
            .unwrap();
        kernel.synchronize().unwrap();
        kernel
    }

    #[test]
    fn test_single_active_model() {
        let mut kernel = BuiltinKernel::new();
        assert!(matches!(kernel.entities(None), Err(KernelError::NoActiveModel)));
        kernel.add_model("a").unwrap();
        assert!(matches!(kernel.add_model("b"), Err(KernelError::ModelAlreadyActive(name)) if name == "a"));
        kernel.remove_model().unwrap();
        assert!(!kernel.has_model());
        assert!(kernel.remove_model().is_err());
    }

    #[test]
    fn test_generate_requires_synchronize() {
        let mut kernel = BuiltinKernel::new();
        kernel.add_model("t").unwrap();
        kernel
            .add_box(Point3::origin(), Vector3::new(1.0, 1.0, 1.0))
            .unwrap();
        assert!(matches!(kernel.generate(Dim::Volume), Err(KernelError::NotSynchronized)));
        kernel.synchronize().unwrap();
        kernel.generate(Dim::Curve).unwrap();
        assert_eq!(kernel.model().unwrap().mesh.level(), Some(Dim::Curve));
    }

    #[test]
    fn test_boundary_queries() {
        let kernel = kernel_with_box();
        let faces = kernel.boundary(&[Entity::volume(1)], BoundaryQuery::default()).unwrap();
        assert_eq!(faces.len(), 6);

        // Faces of a closed shell share every edge, so the combined boundary is empty
        let combined = BoundaryQuery {
            combined: true,
            ..BoundaryQuery::default()
        };
        assert!(kernel.boundary(&faces, combined).unwrap().is_empty());

        let recursive = BoundaryQuery {
            recursive: true,
            ..BoundaryQuery::default()
        };
        let points = kernel.boundary(&[Entity::volume(1)], recursive).unwrap();
        assert_eq!(points.len(), 8);
        assert!(points.iter().all(|p| p.dim == Dim::Point));

        let oriented = BoundaryQuery {
            oriented: true,
            ..BoundaryQuery::default()
        };
        let ends = kernel.boundary(&[Entity::curve(1)], oriented).unwrap();
        assert_eq!(ends, vec![Entity::point(1), Entity::point(-2)]);
    }

    #[test]
    fn test_invalid_mesh_options() {
        let mut kernel = BuiltinKernel::new();
        let options = MeshOptions {
            size_min: 2.0,
            size_max: 1.0,
            ..MeshOptions::default()
        };
        assert!(kernel.set_mesh_options(options).is_err());
        assert!(kernel.add_box(Point3::origin(), Vector3::zeros()).is_err());
    }

    #[test]
    fn test_threads_and_write() {
        let mut kernel = kernel_with_box();
        kernel.set_threads(2).unwrap();
        assert_eq!(kernel.threads(), 2);
        kernel
            .set_mesh_options(MeshOptions {
                size_max: 0.5,
                ..MeshOptions::default()
            })
            .unwrap();
        kernel.generate(Dim::Volume).unwrap();
        let stats = kernel.mesh_stats().unwrap();
        assert_eq!(stats.tetrahedra, 384);
        assert_eq!(stats.inverted, 0);

        let dir = tempfile::tempdir().unwrap();
        kernel.write(&dir.path().join("out.msh"), &WriteOptions::default()).unwrap();
        assert!(matches!(
            kernel.write(&dir.path().join("out.vtk"), &WriteOptions::default()),
            Err(KernelError::UnsupportedFormat(_))
        ));
    }
}
