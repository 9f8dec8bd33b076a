use crate::config::ConfigError;
use sl_stereo_core::{PfmError, RectifyError};
use sl_stereo_disparity::{LogParseError, StageError};
use std::path::PathBuf;

/// Errors of one pipeline unit of work.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("missing input {}", path.display())]
    MissingInput { path: PathBuf },

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: PfmError,
    },

    #[error("failed to read {}: {source}", path.display())]
    ReadText {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed reprojection log {}: {source}", path.display())]
    Log {
        path: PathBuf,
        #[source]
        source: LogParseError,
    },

    #[error(transparent)]
    Stage(#[from] StageError),

    #[error(transparent)]
    Rectify(#[from] RectifyError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl PipelineError {
    /// Missing inputs are expected in partially captured scenes.
    pub fn is_missing_input(&self) -> bool {
        matches!(
            self,
            PipelineError::MissingInput { .. } | PipelineError::Stage(StageError::NoInputs { .. })
        )
    }
}
