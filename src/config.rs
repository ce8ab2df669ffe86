// src/config.rs
//! Tuning parameters for the three engines.
//!
//! Every threshold the algorithms rely on lives here with its production
//! default, so a deployment can retune them from a JSON file without a
//! rebuild. Missing fields fall back to the defaults.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::mesh::{Axis, BandRule};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed settings JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid setting `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Top-level settings document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub raycast: RaycastConfig,
    pub partition: PartitionConfig,
}

impl Settings {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let settings: Settings = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.raycast.validate()
    }
}

/// Depth raycaster thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RaycastConfig {
    /// Texels per side of each eye's depth buffer.
    pub resolution: usize,
    /// Depth jump between neighbouring samples above which a hit is ambiguous.
    pub discontinuity_threshold: f32,
    /// Allowed deviation of `|direction|` from 1.
    pub unit_length_tolerance: f32,
    /// Slack when testing a re-entry point against the frustum planes.
    pub frustum_tolerance: f32,
    /// Cosine above which a reconstructed normal agrees with the average.
    pub normal_agreement_cos: f32,
    /// Texel step of the normal reconstruction cross pattern.
    pub normal_tap_step: usize,
    pub place_box: PlaceBoxConfig,
}

impl Default for RaycastConfig {
    fn default() -> Self {
        RaycastConfig {
            resolution: 128,
            discontinuity_threshold: 0.3,
            unit_length_tolerance: 1e-3,
            frustum_tolerance: 1e-4,
            normal_agreement_cos: 0.95,
            normal_tap_step: 2,
            place_box: PlaceBoxConfig::default(),
        }
    }
}

impl RaycastConfig {
    /// Texels that must separate a normal sample from the buffer edge: the
    /// outer taps reach two steps away from the centre.
    pub fn normal_margin(&self) -> usize {
        self.normal_tap_step * 2
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.resolution < 2 * self.normal_margin() + 1 {
            return Err(ConfigError::Invalid {
                field: "raycast.resolution",
                reason: format!(
                    "{} texels cannot fit the {}-texel normal margin",
                    self.resolution,
                    self.normal_margin()
                ),
            });
        }
        if self.discontinuity_threshold <= 0.0 {
            return Err(ConfigError::Invalid {
                field: "raycast.discontinuity_threshold",
                reason: "must be positive".into(),
            });
        }
        if self.normal_tap_step == 0 {
            return Err(ConfigError::Invalid {
                field: "raycast.normal_tap_step",
                reason: "must be at least one texel".into(),
            });
        }
        Ok(())
    }
}

/// Thresholds for `DepthRaycaster::place_box` and `check_box`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaceBoxConfig {
    /// Smallest accepted box width/height.
    pub min_lateral_size: f32,
    /// Boxes thinner than this are swept as a single face.
    pub thin_box_depth: f32,
    pub min_center_confidence: f32,
    pub corner_normal_cos: f32,
    pub plane_normal_cos: f32,
    /// Corner deviation from the centre plane, as a fraction of the box's larger side.
    pub coplanar_tolerance_ratio: f32,
    /// Gap kept between the surface and the collision sweep.
    pub collision_offset: f32,
    /// Longest edge segment traced by `check_box`.
    pub edge_sample_spacing: f32,
}

impl Default for PlaceBoxConfig {
    fn default() -> Self {
        PlaceBoxConfig {
            min_lateral_size: 0.01,
            thin_box_depth: 0.001,
            min_center_confidence: 0.5,
            corner_normal_cos: 0.6,
            plane_normal_cos: 0.9,
            coplanar_tolerance_ratio: 0.1,
            collision_offset: 0.02,
            edge_sample_spacing: 0.1,
        }
    }
}

/// Mesh partitioner options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PartitionConfig {
    /// Axis used when a reserved band is given without an explicit axis.
    pub band_axis: Axis,
    pub band_rule: BandRule,
    /// Split every seed segment into its connected components.
    pub split_disconnected: bool,
    /// Triangles per rayon work item during classification.
    pub chunk_size: usize,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        PartitionConfig {
            band_axis: Axis::Y,
            band_rule: BandRule::AllVertices,
            split_disconnected: false,
            chunk_size: 4096,
        }
    }
}
