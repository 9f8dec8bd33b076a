//! Numeric stages of structured-light stereo reconstruction.
//!
//! Every stage is a pure function from borrowed fields to new owned fields:
//!
//! - [`compute_disparities`]: code-value matching between two views.
//! - [`cross_check`]: bidirectional consistency test.
//! - [`filter_disparities`]: outlier removal and hole filling.
//! - [`merge_projectors`]: per-pixel consensus across projectors.
//! - [`reproject`]: projective code model fit and reprojected disparity.
//! - [`ReliabilityRecord::is_reliable`]: classification of reprojections.
//! - [`merge_second_stage`]: anchor-based combine of direct and reprojected
//!   disparities.
//!
//! Invalid pixels carry [`sl_stereo_core::INVALID`] and never take part in a
//! vote or an average.

mod crosscheck;
mod error;
mod filter;
mod matcher;
mod merge;
mod merge2;
mod params;
mod reliability;
mod reproject;

pub use crosscheck::cross_check;
pub use error::{LogParseError, StageError};
pub use filter::filter_disparities;
pub use matcher::{compute_disparities, StereoDisparity};
pub use merge::merge_projectors;
pub use merge2::{merge_second_stage, SecondStageMerge};
pub use params::{
    CrossCheckParams, DisparityMode, FilterParams, MatchParams, MergeParams, ReprojectParams,
    SearchWindow, SecondStageParams,
};
pub use reliability::{ReliabilityRecord, ReliabilityThresholds, ReprojectionStats, StatLine};
pub use reproject::{reproject, Reprojection};
