//! JSON pipeline configuration.
//!
//! Every stage parameter set lives here and is passed explicitly to the
//! pipeline. Missing keys fall back to the defaults below, so a config file
//! only needs the values a scene actually tunes.

use serde::{Deserialize, Serialize};
use sl_stereo_core::RemapParams;
use sl_stereo_disparity::{
    CrossCheckParams, DisparityMode, FilterParams, MatchParams, MergeParams, ReliabilityThresholds,
    ReprojectParams, SearchWindow, SecondStageParams,
};
use std::{fs, path::Path};

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Scene-wide settings shared by several stages.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneSettings {
    /// Vertical slack tolerated in rectified captures, in pixels.
    pub y_disparity_threshold: f32,
    /// Horizontal search half-width in rectified captures, in pixels.
    pub max_x_disparity: u32,
    /// Largest per-axis code difference for a stereo match.
    pub code_tolerance: f32,
}

impl Default for SceneSettings {
    fn default() -> Self {
        Self {
            y_disparity_threshold: 1.0,
            max_x_disparity: 1080,
            code_tolerance: 0.5,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RectifyConfig {
    pub remap: RemapParams,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisparityConfig {
    pub subpixel: bool,
    /// Check right after matching (x and y).
    pub first_check: CrossCheckParams,
    /// Per-side filter of rectified disparities; `y_threshold` is taken
    /// from the scene when unset.
    pub filter: FilterParams,
    /// Check after filtering (x only).
    pub final_check: CrossCheckParams,
}

impl Default for DisparityConfig {
    fn default() -> Self {
        Self {
            subpixel: true,
            first_check: CrossCheckParams::new(0.5, false, false),
            filter: FilterParams::default(),
            final_check: CrossCheckParams::new(0.5, true, false),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    pub merge: MergeParams,
    /// Check between the two merged sides (rectified only).
    pub check: CrossCheckParams,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            merge: MergeParams::default(),
            check: CrossCheckParams::new(0.5, true, false),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReprojectConfig {
    pub reproject: ReprojectParams,
    /// Loose filter applied to the reprojected disparity.
    pub filter: FilterParams,
}

impl Default for ReprojectConfig {
    fn default() -> Self {
        Self {
            reproject: ReprojectParams::default(),
            filter: FilterParams {
                y_threshold: None,
                window_x: 3,
                window_y: 0,
                max_diff: 2.0,
                min_support: 1,
                min_component_size: 0,
                max_hole_size: 200,
            },
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Merge2Config {
    pub merge: SecondStageParams,
    pub reliability: ReliabilityThresholds,
    /// Used for both filter passes after the merge.
    pub filter: FilterParams,
    /// Used for both cross-check passes after the merge.
    pub check: CrossCheckParams,
}

impl Default for Merge2Config {
    fn default() -> Self {
        Self {
            merge: SecondStageParams::default(),
            reliability: ReliabilityThresholds::default(),
            filter: FilterParams {
                y_threshold: None,
                window_x: 0,
                window_y: 0,
                max_diff: 1.0,
                min_support: 0,
                min_component_size: 20,
                max_hole_size: 20,
            },
            check: CrossCheckParams::new(1.0, true, true),
        }
    }
}

/// Complete configuration of a reconstruction run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub scene: SceneSettings,
    pub rectify: RectifyConfig,
    pub disparity: DisparityConfig,
    pub merge: MergeConfig,
    pub reproject: ReprojectConfig,
    pub merge2: Merge2Config,
}

impl PipelineConfig {
    /// Load a JSON config from disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write this config to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn match_params(&self, mode: DisparityMode) -> MatchParams {
        MatchParams {
            window: SearchWindow::for_mode(
                mode,
                self.scene.max_x_disparity,
                self.scene.y_disparity_threshold,
            ),
            code_tolerance: self.scene.code_tolerance,
            subpixel: self.disparity.subpixel,
        }
    }

    /// Disparity filter with the scene y threshold filled in.
    pub fn disparity_filter(&self) -> FilterParams {
        FilterParams {
            y_threshold: self
                .disparity
                .filter
                .y_threshold
                .or(Some(self.scene.y_disparity_threshold)),
            ..self.disparity.filter
        }
    }
}
