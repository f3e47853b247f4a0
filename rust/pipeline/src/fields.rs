// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Mesh size and boundary-layer fields.

use serde::Serialize;

use intake_mesh_kernel::{BoundaryLayerSpec, Entity, FieldId, FieldSpec, GeometryKernel};

use crate::config::{BoundaryLayerParams, SizeFieldRatios};
use crate::error::MeshError;

/// Distance/threshold sizing around the intake surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SizeFieldPlan {
    pub size_min: f64,
    pub size_max: f64,
    pub dist_min: f64,
    pub dist_max: f64,
}

impl SizeFieldPlan {
    pub fn new(base_mesh_size: f64, geometry_extent: f64, ratios: &SizeFieldRatios) -> Self {
        Self {
            size_min: base_mesh_size / ratios.size_min_divisor,
            size_max: base_mesh_size,
            dist_min: ratios.dist_min_factor * geometry_extent,
            dist_max: ratios.dist_max_factor * geometry_extent,
        }
    }
}

/// Boundary-layer stack as installed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerPlan {
    pub layers: usize,
    pub first_layer: f64,
    pub progression: f64,
    /// Sum of the generated layer thicknesses.
    pub stack_thickness: f64,
    pub edges: usize,
}

impl LayerPlan {
    /// The stack the kernel will grow for `spec`.
    pub fn new(spec: &BoundaryLayerSpec) -> Self {
        let layers = spec.layer_thicknesses();
        Self {
            layers: layers.len(),
            first_layer: spec.size,
            progression: spec.ratio,
            stack_thickness: layers.iter().sum(),
            edges: spec.curves.len(),
        }
    }
}

/// Installs fields on a model, allowing exactly one background field.
#[derive(Debug, Default)]
pub struct FieldInstaller {
    background: Option<FieldId>,
}

impl FieldInstaller {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn background(&self) -> Option<FieldId> {
        self.background
    }

    /// Distance to `surfaces` ramped into a size, installed as background.
    pub fn install_size_field<K: GeometryKernel>(
        &mut self,
        kernel: &mut K,
        surfaces: &[Entity],
        plan: &SizeFieldPlan,
    ) -> Result<FieldId, MeshError> {
        if let Some(active) = self.background {
            return Err(MeshError::BackgroundFieldActive(active));
        }
        let distance = kernel
            .add_field(FieldSpec::Distance {
                surfaces: surfaces.iter().map(|s| s.tag).collect(),
                curves: Vec::new(),
            })
            .map_err(MeshError::Field)?;
        let threshold = kernel
            .add_field(FieldSpec::Threshold {
                input: distance,
                size_min: plan.size_min,
                size_max: plan.size_max,
                dist_min: plan.dist_min,
                dist_max: plan.dist_max,
            })
            .map_err(MeshError::Field)?;
        kernel.set_background_field(threshold).map_err(MeshError::Field)?;
        self.background = Some(threshold);

        tracing::info!(
            field = %threshold,
            size_min = plan.size_min,
            size_max = plan.size_max,
            dist_min = plan.dist_min,
            dist_max = plan.dist_max,
            "Installed background size field"
        );
        Ok(threshold)
    }

    /// Boundary-layer field grown from `edges`.
    pub fn install_boundary_layer<K: GeometryKernel>(
        &mut self,
        kernel: &mut K,
        edges: &[Entity],
        params: &BoundaryLayerParams,
    ) -> Result<(FieldId, LayerPlan), MeshError> {
        let spec = params.to_spec(edges.iter().map(|e| e.tag).collect());
        let plan = LayerPlan::new(&spec);
        let field = kernel
            .add_field(FieldSpec::BoundaryLayer(spec))
            .map_err(MeshError::Field)?;
        kernel.set_boundary_layer_field(field).map_err(MeshError::Field)?;

        tracing::info!(
            field = %field,
            layers = plan.layers,
            stack_thickness = plan.stack_thickness,
            edges = plan.edges,
            "Installed boundary layer field"
        );
        Ok((field, plan))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use intake_mesh_kernel::{BoundaryQuery, BuiltinKernel, Point3, Vector3};

    fn kernel_with_box() -> (BuiltinKernel, Vec<Entity>) {
        let mut kernel = BuiltinKernel::new();
        kernel.add_model("t").unwrap();
        let body = kernel.add_box(Point3::origin(), Vector3::new(1.0, 1.0, 1.0)).unwrap();
        kernel.synchronize().unwrap();
        let faces = kernel.boundary(&[body], BoundaryQuery::default()).unwrap();
        (kernel, faces)
    }

    #[test]
    fn test_plan_ratios() {
        let plan = SizeFieldPlan::new(1.0, 20.0, &SizeFieldRatios::default());
        assert_relative_eq!(plan.size_min, 0.2);
        assert_relative_eq!(plan.size_max, 1.0);
        assert_relative_eq!(plan.dist_min, 2.0);
        assert_relative_eq!(plan.dist_max, 10.0);
    }

    #[test]
    fn test_second_background_field_is_refused() {
        let (mut kernel, faces) = kernel_with_box();
        let plan = SizeFieldPlan::new(0.5, 1.0, &SizeFieldRatios::default());
        let mut fields = FieldInstaller::new();
        let first = fields.install_size_field(&mut kernel, &faces, &plan).unwrap();
        assert_eq!(fields.background(), Some(first));

        let err = fields.install_size_field(&mut kernel, &faces, &plan).unwrap_err();
        assert!(matches!(err, MeshError::BackgroundFieldActive(id) if id == first));
    }

    #[test]
    fn test_boundary_layer_stack() {
        let (mut kernel, faces) = kernel_with_box();
        let edges = kernel.boundary(&faces, BoundaryQuery::default()).unwrap();
        let mut fields = FieldInstaller::new();
        let (_, plan) = fields
            .install_boundary_layer(&mut kernel, &edges, &BoundaryLayerParams::default())
            .unwrap();
        assert_eq!(plan.layers, 7);
        assert_eq!(plan.edges, 12);
        // Overshoot stays below the thickest layer
        assert!(plan.stack_thickness >= 0.5);
        assert!(plan.stack_thickness - 0.5 < 0.05 * 1.2f64.powi(6));
    }

    #[test]
    fn test_plan_matches_installed_field() {
        let (mut kernel, faces) = kernel_with_box();
        let edges = kernel.boundary(&faces, BoundaryQuery::default()).unwrap();
        let params = BoundaryLayerParams {
            first_layer_thickness: 0.01,
            progression: 1.0,
            total_thickness: 0.1,
            ..BoundaryLayerParams::default()
        };
        let (_, plan) = FieldInstaller::new()
            .install_boundary_layer(&mut kernel, &edges, &params)
            .unwrap();
        assert_eq!(plan.layers, 10);
        assert_relative_eq!(plan.stack_thickness, 0.1, epsilon = 1e-12);

        let handed_over = params.to_spec(edges.iter().map(|e| e.tag).collect());
        assert_eq!(plan, LayerPlan::new(&handed_over));
        assert_eq!(handed_over.layer_count(), Some(plan.layers));
    }
}
