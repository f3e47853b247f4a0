// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Pipeline configuration.
//!
//! A [`PipelineConfig`] is validated exactly once, before any kernel session
//! opens, into a [`ValidatedConfig`] whose values are resolved (thread
//! count, algorithms, boundary-layer count) and known to be in range.

use serde::{Deserialize, Serialize};

use intake_mesh_kernel::{Algorithm2D, Algorithm3D, BoundaryLayerSpec, HealingOptions, MAX_BOUNDARY_LAYERS};

use crate::error::ConfigError;

/// How boundary-layer metrics are combined where layers of different walls meet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntersectionPolicy {
    None = 0,
    Restrict = 1,
    Split = 2,
}

impl TryFrom<i32> for IntersectionPolicy {
    type Error = ConfigError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(IntersectionPolicy::None),
            1 => Ok(IntersectionPolicy::Restrict),
            2 => Ok(IntersectionPolicy::Split),
            other => Err(ConfigError::InvalidBoundaryLayerParams(format!(
                "intersection method must be 0, 1 or 2, got {}",
                other
            ))),
        }
    }
}

/// Boundary-layer settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundaryLayerParams {
    pub first_layer_thickness: f64,
    pub progression: f64,
    pub total_thickness: f64,
    /// 0 derives the count from the other three values.
    pub num_layers: usize,
    pub smooth_normals: bool,
    pub angle_tolerance_deg: f64,
    pub intersection: IntersectionPolicy,
}

impl Default for BoundaryLayerParams {
    fn default() -> Self {
        Self {
            first_layer_thickness: 0.05,
            progression: 1.2,
            total_thickness: 0.5,
            num_layers: 0,
            smooth_normals: true,
            angle_tolerance_deg: 30.0,
            intersection: IntersectionPolicy::Split,
        }
    }
}

impl BoundaryLayerParams {
    /// Check the values and resolve the layer count.
    pub fn validate(&self) -> Result<usize, ConfigError> {
        let invalid = |msg: String| Err(ConfigError::InvalidBoundaryLayerParams(msg));
        let (f, r, t) = (self.first_layer_thickness, self.progression, self.total_thickness);

        if !(f.is_finite() && f > 0.0) {
            return invalid(format!("first layer thickness must be positive, got {}", f));
        }
        if !(r.is_finite() && r > 0.0) {
            return invalid(format!("progression must be positive, got {}", r));
        }
        if !(t.is_finite() && t >= f) {
            return invalid(format!(
                "total thickness {} must be at least the first layer thickness {}",
                t, f
            ));
        }
        if !(0.0..=180.0).contains(&self.angle_tolerance_deg) {
            return invalid(format!(
                "angle tolerance must be within 0..180 degrees, got {}",
                self.angle_tolerance_deg
            ));
        }
        // A shrinking stack converges to f / (1 - r) and may never reach t
        if self.num_layers == 0 && r < 1.0 && t >= f / (1.0 - r) {
            return invalid(format!(
                "progression {} never reaches total thickness {} from first layer {}",
                r, t, f
            ));
        }
        let count = self.layer_count().ok_or_else(|| {
            ConfigError::InvalidBoundaryLayerParams(format!(
                "stack needs more than {} layers (first {}, progression {}, total {}, requested {})",
                MAX_BOUNDARY_LAYERS, f, r, t, self.num_layers
            ))
        })?;
        let stack: f64 = self.to_spec(Vec::new()).layer_thicknesses().iter().sum();
        if !stack.is_finite() {
            return invalid(format!("{} layers at progression {} overflow", count, r));
        }
        Ok(count)
    }

    /// Kernel field settings for layers grown from `curves`.
    pub fn to_spec(&self, curves: Vec<i32>) -> BoundaryLayerSpec {
        BoundaryLayerSpec {
            curves,
            size: self.first_layer_thickness,
            ratio: self.progression,
            thickness: self.total_thickness,
            num_layers: self.num_layers,
            smooth_normals: self.smooth_normals,
            angle_tolerance_deg: self.angle_tolerance_deg,
            intersect_metrics: self.intersection as i32,
            beta_law: false,
        }
    }

    /// Layer count as the kernel resolves it; `None` past the layer cap.
    pub fn layer_count(&self) -> Option<usize> {
        self.to_spec(Vec::new()).layer_count()
    }
}

/// Ratios of the distance/threshold size field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizeFieldRatios {
    /// Size at the intake surfaces is the base size divided by this.
    pub size_min_divisor: f64,
    /// Fractions of the geometry extent where the ramp starts and ends.
    pub dist_min_factor: f64,
    pub dist_max_factor: f64,
}

impl Default for SizeFieldRatios {
    fn default() -> Self {
        Self {
            size_min_divisor: 5.0,
            dist_min_factor: 0.1,
            dist_max_factor: 0.5,
        }
    }
}

/// Raw pipeline configuration, as given on the command line or in code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub domain_scale: f64,
    pub base_mesh_size: f64,
    pub algorithm_2d: i32,
    pub algorithm_3d: i32,
    /// 0 asks the hardware.
    pub threads: usize,
    /// Used when the hardware cannot be queried.
    pub fallback_threads: usize,
    pub optimize_netgen: bool,
    pub healing_tolerance: f64,
    pub size_field: SizeFieldRatios,
    pub boundary_layer: BoundaryLayerParams,
    pub debug: bool,
    /// Accepted for command-line compatibility; there is no GUI to pop up.
    pub interactive: bool,
    /// Element budget handed to the kernel; 0 disables it.
    pub max_elements: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            domain_scale: 5.0,
            base_mesh_size: 0.5,
            algorithm_2d: Algorithm2D::Delaunay.number(),
            algorithm_3d: Algorithm3D::Hxt.number(),
            threads: 0,
            fallback_threads: 4,
            optimize_netgen: true,
            healing_tolerance: 1e-2,
            size_field: SizeFieldRatios::default(),
            boundary_layer: BoundaryLayerParams::default(),
            debug: false,
            interactive: false,
            max_elements: 5_000_000,
        }
    }
}

impl PipelineConfig {
    /// Defaults with environment overrides applied.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Override fields from `INTAKE_MESH_THREADS` and
    /// `INTAKE_MESH_MAX_ELEMENTS`; unparsable values are ignored.
    pub fn apply_env(&mut self) {
        self.threads = std::env::var("INTAKE_MESH_THREADS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(self.threads);
        self.max_elements = std::env::var("INTAKE_MESH_MAX_ELEMENTS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(self.max_elements);
    }

    pub fn validate(&self) -> Result<ValidatedConfig, ConfigError> {
        if !(self.domain_scale.is_finite() && self.domain_scale > 1.0) {
            return Err(ConfigError::InvalidDomainScale(self.domain_scale));
        }
        if !(self.base_mesh_size.is_finite() && self.base_mesh_size > 0.0) {
            return Err(ConfigError::InvalidMeshSize(format!(
                "base mesh size must be positive, got {}",
                self.base_mesh_size
            )));
        }
        if !(self.healing_tolerance.is_finite() && self.healing_tolerance > 0.0) {
            return Err(ConfigError::InvalidMeshSize(format!(
                "healing tolerance must be positive, got {}",
                self.healing_tolerance
            )));
        }
        let ratios = &self.size_field;
        if !(ratios.size_min_divisor >= 1.0
            && ratios.dist_min_factor >= 0.0
            && ratios.dist_max_factor > ratios.dist_min_factor)
        {
            return Err(ConfigError::InvalidSizeField(format!(
                "need divisor >= 1 and 0 <= dist_min < dist_max, got {}, {}, {}",
                ratios.size_min_divisor, ratios.dist_min_factor, ratios.dist_max_factor
            )));
        }
        let layer_count = self.boundary_layer.validate()?;

        let algorithm_2d = Algorithm2D::try_from(self.algorithm_2d)
            .map_err(|e| ConfigError::InvalidAlgorithm(e.to_string()))?;
        let algorithm_3d = Algorithm3D::try_from(self.algorithm_3d)
            .map_err(|e| ConfigError::InvalidAlgorithm(e.to_string()))?;

        let threads = resolve_threads(self.threads, self.fallback_threads, hardware_threads);

        Ok(ValidatedConfig {
            domain_scale: self.domain_scale,
            base_mesh_size: self.base_mesh_size,
            algorithm_2d,
            algorithm_3d,
            threads,
            optimize_netgen: self.optimize_netgen,
            healing_tolerance: self.healing_tolerance,
            size_field: self.size_field.clone(),
            layer_count,
            boundary_layer: self.boundary_layer.clone(),
            debug: self.debug,
            max_elements: self.max_elements,
        })
    }
}

fn hardware_threads() -> Option<usize> {
    std::thread::available_parallelism()
        .ok()
        .map(std::num::NonZeroUsize::get)
}

/// `requested`, or what `detect` reports when it is 0. Detection failure
/// yields `fallback`.
fn resolve_threads(requested: usize, fallback: usize, detect: impl FnOnce() -> Option<usize>) -> usize {
    if requested > 0 {
        return requested;
    }
    match detect() {
        Some(n) if n > 0 => n,
        _ => {
            tracing::warn!(fallback, "Hardware thread count unavailable");
            fallback.max(1)
        }
    }
}

/// Configuration whose values are known to be usable.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedConfig {
    pub domain_scale: f64,
    pub base_mesh_size: f64,
    pub algorithm_2d: Algorithm2D,
    pub algorithm_3d: Algorithm3D,
    pub threads: usize,
    pub optimize_netgen: bool,
    pub healing_tolerance: f64,
    pub size_field: SizeFieldRatios,
    pub boundary_layer: BoundaryLayerParams,
    /// Resolved boundary-layer count.
    pub layer_count: usize,
    pub debug: bool,
    pub max_elements: usize,
}

impl ValidatedConfig {
    /// Healing applied on import and after fragmentation.
    pub fn healing(&self) -> HealingOptions {
        HealingOptions::all(self.healing_tolerance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_defaults_validate() {
        let config = PipelineConfig::default().validate().unwrap();
        assert_eq!(config.algorithm_2d, Algorithm2D::Delaunay);
        assert_eq!(config.algorithm_3d, Algorithm3D::Hxt);
        assert!(config.threads >= 1);
        assert_eq!(config.layer_count, 7);
    }

    #[test]
    fn test_thread_resolution() {
        assert_eq!(resolve_threads(3, 4, || None), 3);
        assert_eq!(resolve_threads(0, 4, || Some(16)), 16);
        assert_eq!(resolve_threads(0, 4, || None), 4);
        assert_eq!(resolve_threads(0, 4, || Some(0)), 4);
        assert_eq!(resolve_threads(0, 0, || None), 1);
    }

    #[test]
    fn test_domain_scale_must_exceed_one() {
        for scale in [0.5, 1.0, f64::NAN] {
            let config = PipelineConfig {
                domain_scale: scale,
                ..PipelineConfig::default()
            };
            assert!(matches!(config.validate(), Err(ConfigError::InvalidDomainScale(_))));
        }
    }

    #[test]
    fn test_rejects_bad_values() {
        let bad_size = PipelineConfig {
            base_mesh_size: 0.0,
            ..PipelineConfig::default()
        };
        assert!(matches!(bad_size.validate(), Err(ConfigError::InvalidMeshSize(_))));

        let bad_layer = PipelineConfig {
            boundary_layer: BoundaryLayerParams {
                total_thickness: 0.01,
                ..BoundaryLayerParams::default()
            },
            ..PipelineConfig::default()
        };
        assert!(matches!(
            bad_layer.validate(),
            Err(ConfigError::InvalidBoundaryLayerParams(_))
        ));

        let bad_alg = PipelineConfig {
            algorithm_2d: 4,
            ..PipelineConfig::default()
        };
        assert!(matches!(bad_alg.validate(), Err(ConfigError::InvalidAlgorithm(_))));

        assert!(IntersectionPolicy::try_from(3).is_err());
    }

    #[test]
    fn test_shrinking_stack_that_never_reaches_thickness() {
        let params = BoundaryLayerParams {
            progression: 0.5,
            ..BoundaryLayerParams::default()
        };
        // Converges to 0.1 < 0.5
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_auto_layer_count() {
        let params = BoundaryLayerParams::default();
        assert_eq!(params.layer_count(), Some(7));
        assert_eq!(params.validate().unwrap(), 7);

        let layers = params.to_spec(Vec::new()).layer_thicknesses();
        for pair in layers.windows(2) {
            assert!(pair[1] > pair[0]);
        }
        let total: f64 = layers.iter().sum();
        let last = layers[layers.len() - 1];
        assert!(total >= params.total_thickness);
        assert!(total - params.total_thickness <= last);

        let uniform = BoundaryLayerParams {
            progression: 1.0,
            first_layer_thickness: 0.1,
            total_thickness: 0.5,
            ..BoundaryLayerParams::default()
        };
        assert_eq!(uniform.layer_count(), Some(5));
        let uniform_layers = uniform.to_spec(Vec::new()).layer_thicknesses();
        assert_relative_eq!(uniform_layers.iter().sum::<f64>(), 0.5, epsilon = 1e-12);

        let explicit = BoundaryLayerParams {
            num_layers: 3,
            ..BoundaryLayerParams::default()
        };
        assert_eq!(explicit.validate().unwrap(), 3);
    }

    #[test]
    fn test_layer_cap() {
        // 500 000 uniform layers would be needed
        let thin = PipelineConfig {
            boundary_layer: BoundaryLayerParams {
                first_layer_thickness: 1e-6,
                progression: 1.0,
                total_thickness: 0.5,
                ..BoundaryLayerParams::default()
            },
            ..PipelineConfig::default()
        };
        assert!(matches!(
            thin.validate(),
            Err(ConfigError::InvalidBoundaryLayerParams(_))
        ));

        let huge = PipelineConfig {
            boundary_layer: BoundaryLayerParams {
                num_layers: usize::MAX,
                ..BoundaryLayerParams::default()
            },
            ..PipelineConfig::default()
        };
        assert!(matches!(
            huge.validate(),
            Err(ConfigError::InvalidBoundaryLayerParams(_))
        ));

        let overflowing = BoundaryLayerParams {
            num_layers: MAX_BOUNDARY_LAYERS,
            ..BoundaryLayerParams::default()
        };
        assert!(overflowing.validate().is_err());

        let at_cap = PipelineConfig {
            boundary_layer: BoundaryLayerParams {
                num_layers: MAX_BOUNDARY_LAYERS,
                progression: 1.0,
                ..BoundaryLayerParams::default()
            },
            ..PipelineConfig::default()
        };
        assert_eq!(at_cap.validate().unwrap().layer_count, MAX_BOUNDARY_LAYERS);
    }
}
