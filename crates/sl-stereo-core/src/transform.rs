use crate::ScalarField;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Whole-field reorientation applied to decoded fields captured with a
/// rotated or mirrored camera.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FieldTransform {
    /// Rotate 90° clockwise; width and height swap.
    Rotate90Cw,
    /// Mirror across the vertical axis.
    FlipY,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown field transform {0:?} (expected rotate90cw or flip-y)")]
pub struct UnknownTransform(pub String);

impl FromStr for FieldTransform {
    type Err = UnknownTransform;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rotate90cw" | "rotate90-cw" => Ok(Self::Rotate90Cw),
            "flipY" | "flip-y" | "flipy" => Ok(Self::FlipY),
            other => Err(UnknownTransform(other.to_string())),
        }
    }
}

impl FieldTransform {
    pub fn apply(self, src: &ScalarField) -> ScalarField {
        let (w, h) = src.dims();
        match self {
            FieldTransform::Rotate90Cw => {
                let mut out = ScalarField::invalid(h, w);
                for y in 0..h {
                    for x in 0..w {
                        out.set(h - 1 - y, x, src.get(x, y));
                    }
                }
                out
            }
            FieldTransform::FlipY => {
                ScalarField::from_fn(w, h, |x, y| src.get(w - 1 - x, y))
            }
        }
    }
}
