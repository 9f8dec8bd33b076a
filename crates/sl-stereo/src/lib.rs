//! High-level facade for the `sl-stereo-*` workspace.
//!
//! This crate provides:
//! - re-exports of the core types (`sl_stereo::core`) and the numeric stages
//!   (`sl_stereo::disparity`)
//! - [`SceneStore`]: the on-disk layout of a scene's computed products
//! - [`Pipeline`]: stage sequences per projector and stereo pair, plus batch
//!   drivers that skip and log failing units
//! - [`PipelineConfig`]: every stage parameter, loadable from JSON
//! - (feature `image`) PNG previews of float fields
//! - (feature `cli`) the `sl-stereo` command-line tool
//!
//! ## Quickstart
//!
//! ```no_run
//! use sl_stereo::{Pipeline, PipelineConfig, SceneStore};
//! use sl_stereo::disparity::DisparityMode;
//!
//! let pipeline = Pipeline::new(SceneStore::new("scenes/mug"), PipelineConfig::default());
//! let summary = pipeline.run_all(DisparityMode::Rectified);
//! println!("{summary}");
//! ```

mod config;
mod error;
mod pipeline;
mod storage;

#[cfg(feature = "image")]
pub mod preview;

pub use sl_stereo_core as core;
pub use sl_stereo_disparity as disparity;

pub use config::{
    ConfigError, DisparityConfig, Merge2Config, MergeConfig, PipelineConfig, RectifyConfig,
    ReprojectConfig, SceneSettings,
};
pub use error::PipelineError;
pub use pipeline::{Pipeline, ReliabilityEntry, RunSummary};
pub use storage::{
    Axis, CodeAxis, DisparityStage, Merged2Stage, MergedStage, ReprojectedStage, SceneStore,
};

pub use sl_stereo_core::{PositionId, ProjectorId, Side, StereoPair};
