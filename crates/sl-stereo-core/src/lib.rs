//! Core types for structured-light stereo reconstruction.
//!
//! Dense `f32` fields with an explicit invalid sentinel, decoded code maps,
//! disparity maps, PFM storage, the projective code model used by
//! reprojection, and rectification. No stage logic lives here.

mod field;
mod logger;
mod pfm;
mod projective;
mod rectify;
mod transform;
mod view;

pub use field::{
    is_valid, sample_bilinear, sample_nearest, CodeMap, DisparityMap, FieldError, ScalarField,
    ScalarFieldView, INVALID,
};
pub use pfm::{decode_pfm, encode_pfm, read_pfm, write_atomic, write_pfm, PfmError};
pub use projective::{CodeCorrespondence, ProjectiveModel, MIN_CORRESPONDENCES};
pub use rectify::{Rectifier, RectifyError, RemapParams, RemapRectifier};
pub use transform::{FieldTransform, UnknownTransform};
pub use view::{PositionId, ProjectorId, Side, StereoPair};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::{init_from_verbosity, level_from_verbosity};
