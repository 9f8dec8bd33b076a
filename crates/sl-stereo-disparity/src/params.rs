use serde::{Deserialize, Serialize};

/// Whether decoded fields were warped into the rectified frame first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisparityMode {
    Rectified,
    Unrectified,
}

impl DisparityMode {
    pub fn is_rectified(self) -> bool {
        matches!(self, DisparityMode::Rectified)
    }
}

/// Inclusive bounds on the spatial offset of a match.
///
/// A zero-width window is a real constraint: only the pixel's own column
/// and row qualify. An unconstrained search is expressed by having no
/// window at all (see [`MatchParams::window`]).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchWindow {
    pub dx_min: i32,
    pub dx_max: i32,
    pub dy_min: i32,
    pub dy_max: i32,
}

impl SearchWindow {
    /// Window used by each mode. Unrectified captures match on codes alone
    /// (`None`); rectified captures allow `±max_dx` horizontally and
    /// `±round(y_threshold)` vertically.
    pub fn for_mode(mode: DisparityMode, max_dx: u32, y_threshold: f32) -> Option<Self> {
        match mode {
            DisparityMode::Unrectified => None,
            DisparityMode::Rectified => {
                let dx = max_dx.min(i32::MAX as u32) as i32;
                let dy = if y_threshold.is_finite() && y_threshold > 0.0 {
                    y_threshold.round() as i32
                } else {
                    0
                };
                Some(Self {
                    dx_min: -dx,
                    dx_max: dx,
                    dy_min: -dy,
                    dy_max: dy,
                })
            }
        }
    }

    #[inline]
    pub fn contains(&self, dx: i64, dy: i64) -> bool {
        dx >= self.dx_min as i64
            && dx <= self.dx_max as i64
            && dy >= self.dy_min as i64
            && dy <= self.dy_max as i64
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchParams {
    /// Bounds on the match offset; `None` leaves it unconstrained.
    pub window: Option<SearchWindow>,
    /// Largest per-axis code difference accepted as a match.
    pub code_tolerance: f32,
    /// Refine integer matches with the local code gradient of the other view.
    pub subpixel: bool,
}

impl Default for MatchParams {
    fn default() -> Self {
        Self {
            window: None,
            code_tolerance: 0.5,
            subpixel: true,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrossCheckParams {
    /// Largest tolerated `|d + d'|`; equality keeps the pixel.
    pub threshold: f32,
    /// Ignore the y component (target row is the pixel's own row).
    pub x_only: bool,
    /// Keep pixels whose target is invalid instead of dropping them.
    pub half_occlusion: bool,
}

impl Default for CrossCheckParams {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            x_only: false,
            half_occlusion: false,
        }
    }
}

impl CrossCheckParams {
    pub fn new(threshold: f32, x_only: bool, half_occlusion: bool) -> Self {
        Self {
            threshold,
            x_only,
            half_occlusion,
        }
    }
}

/// Single-map outlier removal and hole filling. Every pass of the pipeline
/// runs with its own instance.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterParams {
    /// Invalidate pixels with `|dy|` above this; `None` disables the test.
    pub y_threshold: Option<f32>,
    /// Half-width of the support window.
    pub window_x: usize,
    /// Half-height of the support window.
    pub window_y: usize,
    /// Largest difference for two disparities to agree.
    pub max_diff: f32,
    /// Agreeing neighbors required inside the support window.
    pub min_support: usize,
    /// Consistent 4-connected segments below this size are removed.
    pub min_component_size: usize,
    /// Enclosed invalid regions up to this size are filled; 0 disables.
    pub max_hole_size: usize,
}

impl Default for FilterParams {
    fn default() -> Self {
        Self {
            y_threshold: None,
            window_x: 3,
            window_y: 0,
            max_diff: 1.0,
            min_support: 2,
            min_component_size: 20,
            max_hole_size: 200,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeParams {
    /// Agreeing samples needed to emit a merged value.
    pub min_group: usize,
    /// Largest difference between two samples of a group.
    pub max_diff: f32,
}

impl Default for MergeParams {
    fn default() -> Self {
        Self {
            min_group: 2,
            max_diff: 1.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReprojectParams {
    /// Minimum (pixel, disparity, code) observations for a model fit.
    pub min_fit_points: usize,
    /// Code residual above which a fit observation is dropped on refit.
    pub inlier_threshold: f64,
    /// Largest per-axis code difference when checking the other view.
    pub code_tolerance: f32,
    /// Residual / disparity difference counted as "bad" in the log.
    pub bad_threshold: f64,
}

impl Default for ReprojectParams {
    fn default() -> Self {
        Self {
            min_fit_points: 50,
            inlier_threshold: 2.0,
            code_tolerance: 1.0,
            bad_threshold: 1.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecondStageParams {
    /// Largest difference between the anchor and a corroborating sample.
    pub max_diff: f32,
    /// Keep a valid anchor that no sample corroborates (reported with a
    /// sample count of 0). When false such pixels become invalid.
    pub keep_uncorroborated_anchor: bool,
    /// Group size needed to fill a pixel that has no anchor.
    pub fallback_min_group: usize,
}

impl Default for SecondStageParams {
    fn default() -> Self {
        Self {
            max_diff: 1.0,
            keep_uncorroborated_anchor: true,
            fallback_min_group: 2,
        }
    }
}
