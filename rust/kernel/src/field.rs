// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Mesh size fields.
//!
//! Fields are declared with a [`FieldSpec`] and stored per model in a
//! [`FieldSet`]. Before meshing they are compiled against the model geometry
//! into a [`SizeFunction`], a plain-data evaluator that can be shared across
//! worker threads.

use std::collections::BTreeMap;
use std::fmt;

use nalgebra::Point3;

use crate::entity::Entity;
use crate::error::{KernelError, Result};
use crate::geom::{point_polyline_distance, point_triangle_distance, Triangle};
use crate::model::Model;

/// Handle of a field within one model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldId(pub i32);

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Most layers one boundary-layer stack may have.
pub const MAX_BOUNDARY_LAYERS: usize = 10_000;

/// Boundary-layer field settings.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryLayerSpec {
    /// Curves the layers grow from.
    pub curves: Vec<i32>,
    /// First layer thickness.
    pub size: f64,
    pub ratio: f64,
    pub thickness: f64,
    /// Number of layers; 0 grows layers until `thickness` is reached.
    pub num_layers: usize,
    pub smooth_normals: bool,
    pub angle_tolerance_deg: f64,
    /// 0 none, 1 restrict, 2 split
    pub intersect_metrics: i32,
    pub beta_law: bool,
}

impl BoundaryLayerSpec {
    /// `num_layers`, or the fewest geometric layers whose sum reaches
    /// `thickness`. `None` when that exceeds [`MAX_BOUNDARY_LAYERS`].
    pub fn layer_count(&self) -> Option<usize> {
        if self.num_layers > 0 {
            return (self.num_layers <= MAX_BOUNDARY_LAYERS).then_some(self.num_layers);
        }
        // Relative slack so exact fits such as 5 x 0.1 = 0.5 do not gain a layer
        let target = self.thickness * (1.0 - 1e-12);
        let mut total = 0.0;
        let mut t = self.size;
        for n in 1..=MAX_BOUNDARY_LAYERS {
            total += t;
            if total >= target {
                return Some(n);
            }
            t *= self.ratio;
        }
        None
    }

    /// Thickness of each layer, innermost first. Empty when the stack is
    /// not representable.
    pub fn layer_thicknesses(&self) -> Vec<f64> {
        let n = self.layer_count().unwrap_or(0);
        std::iter::successors(Some(self.size), |t| Some(t * self.ratio))
            .take(n)
            .collect()
    }
}

/// Declarative description of a size field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldSpec {
    /// Distance to a set of surfaces and curves.
    Distance { surfaces: Vec<i32>, curves: Vec<i32> },
    /// Linear ramp of another field's value (a distance) into a size.
    Threshold {
        input: FieldId,
        size_min: f64,
        size_max: f64,
        dist_min: f64,
        dist_max: f64,
    },
    BoundaryLayer(BoundaryLayerSpec),
    Constant(f64),
}

impl FieldSpec {
    fn kind(&self) -> &'static str {
        match self {
            FieldSpec::Distance { .. } => "Distance",
            FieldSpec::Threshold { .. } => "Threshold",
            FieldSpec::BoundaryLayer(_) => "BoundaryLayer",
            FieldSpec::Constant(_) => "Constant",
        }
    }
}

/// Fields of one model plus which of them drive meshing.
#[derive(Debug, Clone, Default)]
pub struct FieldSet {
    fields: BTreeMap<FieldId, FieldSpec>,
    next_id: i32,
    background: Option<FieldId>,
    boundary_layer: Option<FieldId>,
}

impl FieldSet {
    /// Validate and store a field against the model's entities.
    pub fn add(&mut self, model: &Model, spec: FieldSpec) -> Result<FieldId> {
        self.validate(model, &spec)?;
        self.next_id += 1;
        let id = FieldId(self.next_id);
        tracing::debug!(field = %id, kind = spec.kind(), "Added size field");
        self.fields.insert(id, spec);
        Ok(id)
    }

    fn validate(&self, model: &Model, spec: &FieldSpec) -> Result<()> {
        let check_entities = |surfaces: &[i32], curves: &[i32]| -> Result<()> {
            for &tag in surfaces {
                model.surface_key(tag)?;
            }
            for &tag in curves {
                model.curve_key(tag)?;
            }
            Ok(())
        };

        match spec {
            FieldSpec::Distance { surfaces, curves } => {
                if surfaces.is_empty() && curves.is_empty() {
                    return Err(KernelError::InvalidField(
                        "distance field needs at least one surface or curve".into(),
                    ));
                }
                check_entities(surfaces, curves)
            }
            FieldSpec::Threshold {
                input,
                size_min,
                size_max,
                dist_min,
                dist_max,
            } => {
                if !self.fields.contains_key(input) {
                    return Err(KernelError::UnknownField(*input));
                }
                if !(*size_min > 0.0 && size_max >= size_min) {
                    return Err(KernelError::InvalidField(format!(
                        "threshold sizes must satisfy 0 < min <= max, got {} and {}",
                        size_min, size_max
                    )));
                }
                if !(*dist_min >= 0.0 && dist_max >= dist_min) {
                    return Err(KernelError::InvalidField(format!(
                        "threshold distances must satisfy 0 <= min <= max, got {} and {}",
                        dist_min, dist_max
                    )));
                }
                Ok(())
            }
            FieldSpec::BoundaryLayer(bl) => {
                if !(bl.size > 0.0 && bl.ratio > 0.0 && bl.thickness >= bl.size) {
                    return Err(KernelError::InvalidField(format!(
                        "boundary layer needs size > 0, ratio > 0, thickness >= size; got {}, {}, {}",
                        bl.size, bl.ratio, bl.thickness
                    )));
                }
                if bl.layer_count().is_none() {
                    return Err(KernelError::InvalidField(format!(
                        "boundary layer needs more than {} layers",
                        MAX_BOUNDARY_LAYERS
                    )));
                }
                check_entities(&[], &bl.curves)
            }
            FieldSpec::Constant(size) => {
                if *size > 0.0 {
                    Ok(())
                } else {
                    Err(KernelError::InvalidField(format!("constant size {} is not positive", size)))
                }
            }
        }
    }

    pub fn get(&self, id: FieldId) -> Option<&FieldSpec> {
        self.fields.get(&id)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Install the background size field. Only one may be active; a second
    /// installation is refused instead of silently replacing the first.
    pub fn set_background(&mut self, id: FieldId) -> Result<()> {
        if !self.fields.contains_key(&id) {
            return Err(KernelError::UnknownField(id));
        }
        match self.background {
            Some(active) if active != id => Err(KernelError::BackgroundFieldActive(active)),
            _ => {
                self.background = Some(id);
                Ok(())
            }
        }
    }

    pub fn background(&self) -> Option<FieldId> {
        self.background
    }

    pub fn set_boundary_layer(&mut self, id: FieldId) -> Result<()> {
        match self.fields.get(&id) {
            Some(FieldSpec::BoundaryLayer(_)) => {
                self.boundary_layer = Some(id);
                Ok(())
            }
            Some(other) => Err(KernelError::InvalidField(format!(
                "field {} is a {} field, not a boundary layer",
                id,
                other.kind()
            ))),
            None => Err(KernelError::UnknownField(id)),
        }
    }

    pub fn boundary_layer(&self) -> Option<FieldId> {
        self.boundary_layer
    }

    fn compile(&self, model: &Model, id: FieldId, depth: usize) -> Result<CompiledField> {
        if depth > 16 {
            return Err(KernelError::InvalidField("field references are cyclic".into()));
        }
        let spec = self.fields.get(&id).ok_or(KernelError::UnknownField(id))?;
        Ok(match spec {
            FieldSpec::Distance { surfaces, curves } => CompiledField::Distance(Anchors::collect(model, surfaces, curves)?),
            FieldSpec::Threshold {
                input,
                size_min,
                size_max,
                dist_min,
                dist_max,
            } => CompiledField::Threshold {
                input: Box::new(self.compile(model, *input, depth + 1)?),
                size_min: *size_min,
                size_max: *size_max,
                dist_min: *dist_min,
                dist_max: *dist_max,
            },
            FieldSpec::BoundaryLayer(bl) => {
                let layers = bl.layer_thicknesses();
                let mut outer_edges = Vec::with_capacity(layers.len());
                let mut total = 0.0;
                for t in &layers {
                    total += t;
                    outer_edges.push(total);
                }
                CompiledField::BoundaryLayer {
                    anchors: Anchors::collect(model, &[], &bl.curves)?,
                    layers,
                    outer_edges,
                }
            }
            FieldSpec::Constant(size) => CompiledField::Constant(*size),
        })
    }
}

/// Geometry a distance is measured to.
#[derive(Debug, Clone, Default)]
struct Anchors {
    triangles: Vec<Triangle>,
    polylines: Vec<Vec<Point3<f64>>>,
}

impl Anchors {
    fn collect(model: &Model, surfaces: &[i32], curves: &[i32]) -> Result<Self> {
        let mut anchors = Anchors::default();
        for &tag in surfaces {
            let key = model.surface_key(tag)?;
            anchors.triangles.extend(model.surface_facets(key)?);
        }
        for &tag in curves {
            let key = model.curve_key(tag)?;
            anchors.polylines.push(model.curve_polyline(key, true));
        }
        Ok(anchors)
    }

    fn distance(&self, p: &Point3<f64>) -> f64 {
        let to_triangles = self
            .triangles
            .iter()
            .map(|t| point_triangle_distance(p, t))
            .fold(f64::INFINITY, f64::min);
        let to_curves = self
            .polylines
            .iter()
            .map(|poly| point_polyline_distance(p, poly))
            .fold(f64::INFINITY, f64::min);
        to_triangles.min(to_curves)
    }
}

#[derive(Debug, Clone)]
enum CompiledField {
    Distance(Anchors),
    Threshold {
        input: Box<CompiledField>,
        size_min: f64,
        size_max: f64,
        dist_min: f64,
        dist_max: f64,
    },
    BoundaryLayer {
        anchors: Anchors,
        layers: Vec<f64>,
        /// Cumulative distance of each layer's outer face
        outer_edges: Vec<f64>,
    },
    Constant(f64),
}

impl CompiledField {
    fn eval(&self, p: &Point3<f64>) -> f64 {
        match self {
            CompiledField::Distance(anchors) => anchors.distance(p),
            CompiledField::Threshold {
                input,
                size_min,
                size_max,
                dist_min,
                dist_max,
            } => {
                let d = input.eval(p);
                if d <= *dist_min {
                    *size_min
                } else if d >= *dist_max {
                    *size_max
                } else {
                    let t = (d - dist_min) / (dist_max - dist_min);
                    size_min + t * (size_max - size_min)
                }
            }
            CompiledField::BoundaryLayer {
                anchors,
                layers,
                outer_edges,
            } => {
                let d = anchors.distance(p);
                match outer_edges.iter().position(|&edge| d <= edge) {
                    Some(k) => layers[k],
                    None => f64::INFINITY,
                }
            }
            CompiledField::Constant(size) => *size,
        }
    }
}

/// Effective element size at any point of the model.
#[derive(Debug, Clone)]
pub struct SizeFunction {
    background: Option<CompiledField>,
    boundary_layer: Option<CompiledField>,
    size_min: f64,
    size_max: f64,
}

impl SizeFunction {
    /// Compile the active fields of a model with global size bounds.
    pub fn compile(model: &Model, size_min: f64, size_max: f64) -> Result<Self> {
        let fields = &model.fields;
        let background = fields
            .background
            .map(|id| fields.compile(model, id, 0))
            .transpose()?;
        let boundary_layer = fields
            .boundary_layer
            .map(|id| fields.compile(model, id, 0))
            .transpose()?;
        Ok(Self {
            background,
            boundary_layer,
            size_min,
            size_max,
        })
    }

    /// A uniform size function.
    pub fn uniform(size: f64) -> Self {
        Self {
            background: None,
            boundary_layer: None,
            size_min: size,
            size_max: size,
        }
    }

    /// Minimum of every active field and `size_max`, clamped below by
    /// `size_min`.
    pub fn size_at(&self, p: &Point3<f64>) -> f64 {
        let mut size = self.size_max;
        if let Some(bg) = &self.background {
            size = size.min(bg.eval(p));
        }
        if let Some(bl) = &self.boundary_layer {
            size = size.min(bl.eval(p));
        }
        size.max(self.size_min)
    }

    pub fn size_max(&self) -> f64 {
        self.size_max
    }
}

/// Anchored distance of an entity, used by tests and diagnostics.
pub fn distance_to(model: &Model, entity: Entity, p: &Point3<f64>) -> Result<f64> {
    let anchors = match entity.dim {
        crate::entity::Dim::Surface => Anchors::collect(model, &[entity.tag], &[])?,
        crate::entity::Dim::Curve => Anchors::collect(model, &[], &[entity.tag])?,
        _ => {
            return Err(KernelError::InvalidField(format!(
                "distance to {} is not supported",
                entity
            )))
        }
    };
    Ok(anchors.distance(p))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn plate() -> Model {
        let mut model = Model::new("t");
        let p: Vec<_> = [(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)]
            .iter()
            .map(|&(x, y)| model.add_point(Point3::new(x, y, 0.0)))
            .collect();
        let c: Vec<_> = (0..4)
            .map(|i| model.add_curve(p[i], p[(i + 1) % 4], Vec::new()))
            .collect();
        model.add_surface(vec![c.into_iter().map(|k| (k, true)).collect()]);
        model
    }

    fn bl(num_layers: usize) -> BoundaryLayerSpec {
        BoundaryLayerSpec {
            curves: vec![1],
            size: 0.05,
            ratio: 1.2,
            thickness: 0.5,
            num_layers,
            smooth_normals: true,
            angle_tolerance_deg: 30.0,
            intersect_metrics: 2,
            beta_law: false,
        }
    }

    #[test]
    fn test_threshold_ramp() {
        let mut model = plate();
        let mut fields = FieldSet::default();
        let d = fields
            .add(&model, FieldSpec::Distance { surfaces: vec![1], curves: vec![] })
            .unwrap();
        let t = fields
            .add(
                &model,
                FieldSpec::Threshold {
                    input: d,
                    size_min: 0.2,
                    size_max: 1.0,
                    dist_min: 1.0,
                    dist_max: 5.0,
                },
            )
            .unwrap();
        fields.set_background(t).unwrap();
        model.fields = fields;

        let f = SizeFunction::compile(&model, 0.1, 1.0).unwrap();
        assert_relative_eq!(f.size_at(&Point3::new(5.0, 5.0, 0.5)), 0.2);
        assert_relative_eq!(f.size_at(&Point3::new(5.0, 5.0, 3.0)), 0.6, epsilon = 1e-12);
        assert_relative_eq!(f.size_at(&Point3::new(5.0, 5.0, 9.0)), 1.0);
    }

    #[test]
    fn test_second_background_is_refused() {
        let model = plate();
        let mut fields = FieldSet::default();
        let a = fields.add(&model, FieldSpec::Constant(1.0)).unwrap();
        let b = fields.add(&model, FieldSpec::Constant(2.0)).unwrap();
        fields.set_background(a).unwrap();
        fields.set_background(a).unwrap();
        assert!(matches!(
            fields.set_background(b),
            Err(KernelError::BackgroundFieldActive(FieldId(1)))
        ));
        assert_eq!(fields.background(), Some(a));
    }

    #[test]
    fn test_auto_layers_reach_thickness() {
        let layers = bl(0).layer_thicknesses();
        let total: f64 = layers.iter().sum();
        assert_eq!(layers.len(), 7);
        assert!(total >= 0.5);
        assert!(total - 0.5 < *layers.last().unwrap());
        assert_eq!(bl(3).layer_thicknesses().len(), 3);
    }

    #[test]
    fn test_oversized_stack_is_refused() {
        let model = plate();
        let thin = BoundaryLayerSpec {
            size: 1e-6,
            ratio: 1.0,
            ..bl(0)
        };
        assert_eq!(thin.layer_count(), None);
        assert!(thin.layer_thicknesses().is_empty());
        let many = BoundaryLayerSpec {
            num_layers: usize::MAX,
            ..bl(0)
        };
        assert_eq!(many.layer_count(), None);

        let mut fields = FieldSet::default();
        for spec in [thin, many] {
            assert!(matches!(
                fields.add(&model, FieldSpec::BoundaryLayer(spec)),
                Err(KernelError::InvalidField(_))
            ));
        }
        let capped = BoundaryLayerSpec {
            num_layers: MAX_BOUNDARY_LAYERS,
            ..bl(0)
        };
        assert_eq!(capped.layer_count(), Some(MAX_BOUNDARY_LAYERS));
    }

    #[test]
    fn test_boundary_layer_grading() {
        let mut model = plate();
        let mut fields = FieldSet::default();
        let id = fields.add(&model, FieldSpec::BoundaryLayer(bl(0))).unwrap();
        fields.set_boundary_layer(id).unwrap();
        model.fields = fields;

        let f = SizeFunction::compile(&model, 0.01, 1.0).unwrap();
        // Curve 1 runs along y = 0
        assert_relative_eq!(f.size_at(&Point3::new(5.0, 0.01, 0.0)), 0.05);
        assert_relative_eq!(f.size_at(&Point3::new(5.0, 0.08, 0.0)), 0.06, epsilon = 1e-12);
        assert_relative_eq!(f.size_at(&Point3::new(5.0, 3.0, 0.0)), 1.0);
    }

    #[test]
    fn test_invalid_fields() {
        let model = plate();
        let mut fields = FieldSet::default();
        assert!(fields
            .add(&model, FieldSpec::Distance { surfaces: vec![], curves: vec![] })
            .is_err());
        assert!(matches!(
            fields.add(&model, FieldSpec::Distance { surfaces: vec![42], curves: vec![] }),
            Err(KernelError::EntityNotFound(_))
        ));
        let mut bad = bl(0);
        bad.thickness = 0.01;
        assert!(fields.add(&model, FieldSpec::BoundaryLayer(bad)).is_err());
    }

    #[test]
    fn test_distance_to_curve() {
        let model = plate();
        let d = distance_to(&model, Entity::curve(2), &Point3::new(12.0, 5.0, 0.0)).unwrap();
        assert_relative_eq!(d, 2.0);
    }
}
