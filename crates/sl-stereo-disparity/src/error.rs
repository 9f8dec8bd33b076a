use sl_stereo_core::FieldError;

/// Errors returned by the disparity stages.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum StageError {
    #[error(transparent)]
    Field(#[from] FieldError),
    #[error("{stage}: no input fields")]
    NoInputs { stage: &'static str },
    #[error("invalid parameter {name}: {reason}")]
    InvalidParams {
        name: &'static str,
        reason: &'static str,
    },
}

/// Errors from parsing a reprojection log.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum LogParseError {
    #[error("reprojection log has {found} line(s), expected 2")]
    TooFewLines { found: usize },
    #[error("reprojection log line {line} has {found} numeric token(s), expected 4")]
    TooFewNumbers { line: usize, found: usize },
}
