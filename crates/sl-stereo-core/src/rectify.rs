use crate::{is_valid, sample_bilinear, sample_nearest, CodeMap, FieldError, ScalarField};
use serde::{Deserialize, Serialize};

#[derive(thiserror::Error, Debug)]
pub enum RectifyError {
    #[error("rectification map components disagree: {0}")]
    MapShape(#[source] FieldError),
    #[error("rectification map contains no finite coordinate")]
    EmptyMap,
}

/// Warps a view's decoded fields into the rectified frame, where
/// corresponding pixels share a row.
pub trait Rectifier {
    /// Output dimensions.
    fn dims(&self) -> (usize, usize);

    fn rectify_field(&self, field: &ScalarField) -> ScalarField;

    fn rectify_codes(&self, codes: &CodeMap) -> CodeMap {
        CodeMap {
            u: self.rectify_field(&codes.u),
            v: self.rectify_field(&codes.v),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemapParams {
    /// Largest allowed gap between the interpolated and nearest-neighbour
    /// samples; beyond it the interpolation straddles a code discontinuity
    /// and the nearest sample is kept instead.
    pub max_interpolation_jump: f32,
}

impl Default for RemapParams {
    fn default() -> Self {
        Self {
            max_interpolation_jump: 1.0,
        }
    }
}

/// Dense lookup-table rectifier: output pixel `(x, y)` reads the source at
/// `(map_x(x, y), map_y(x, y))`.
#[derive(Clone, Debug)]
pub struct RemapRectifier {
    map_x: ScalarField,
    map_y: ScalarField,
    params: RemapParams,
}

impl RemapRectifier {
    pub fn new(
        map_x: ScalarField,
        map_y: ScalarField,
        params: RemapParams,
    ) -> Result<Self, RectifyError> {
        map_x.ensure_same_dims(&map_y).map_err(RectifyError::MapShape)?;
        if map_x.is_all_invalid() {
            return Err(RectifyError::EmptyMap);
        }
        Ok(Self {
            map_x,
            map_y,
            params,
        })
    }

    /// Identity map of the given size, mostly useful for already rectified
    /// captures.
    pub fn identity(width: usize, height: usize) -> Self {
        Self {
            map_x: ScalarField::from_fn(width, height, |x, _| x as f32),
            map_y: ScalarField::from_fn(width, height, |_, y| y as f32),
            params: RemapParams::default(),
        }
    }
}

impl Rectifier for RemapRectifier {
    fn dims(&self) -> (usize, usize) {
        self.map_x.dims()
    }

    fn rectify_field(&self, field: &ScalarField) -> ScalarField {
        let src = field.view();
        let mut out = ScalarField::invalid(self.map_x.width, self.map_x.height);
        for (i, dst) in out.data.iter_mut().enumerate() {
            let (sx, sy) = (self.map_x.data[i], self.map_y.data[i]);
            if !is_valid(sx) || !is_valid(sy) {
                continue;
            }
            let nearest = sample_nearest(&src, sx, sy);
            let linear = sample_bilinear(&src, sx, sy);
            *dst = if is_valid(linear)
                && (linear - nearest).abs() <= self.params.max_interpolation_jump
            {
                linear
            } else {
                nearest
            };
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::INVALID;

    #[test]
    fn identity_map_is_lossless() {
        let f = ScalarField::from_fn(5, 4, |x, y| if x == 2 { INVALID } else { (x + 10 * y) as f32 });
        let out = RemapRectifier::identity(5, 4).rectify_field(&f);
        assert_eq!(out, f);
    }

    #[test]
    fn falls_back_to_nearest_across_code_jumps() {
        // step from 0 to 100 between x=1 and x=2
        let f = ScalarField::from_fn(4, 1, |x, _| if x < 2 { x as f32 } else { 100.0 });
        let map_x = ScalarField::new(3, 1, vec![0.5, 1.6, 3.0]).unwrap();
        let map_y = ScalarField::filled(3, 1, 0.0);
        let r = RemapRectifier::new(map_x, map_y, RemapParams::default()).unwrap();
        let out = r.rectify_field(&f);
        assert!((out.data[0] - 0.5).abs() < 1e-6);
        assert_eq!(out.data[1], 100.0);
        assert_eq!(out.data[2], 100.0);
    }

    #[test]
    fn out_of_bounds_coordinates_become_invalid() {
        let f = ScalarField::filled(2, 2, 3.0);
        let map_x = ScalarField::new(2, 1, vec![-5.0, INVALID]).unwrap();
        let map_y = ScalarField::new(2, 1, vec![0.0, 0.0]).unwrap();
        let r = RemapRectifier::new(map_x, map_y, RemapParams::default()).unwrap();
        assert!(r.rectify_field(&f).is_all_invalid());
    }

    #[test]
    fn rejects_mismatched_maps() {
        let err = RemapRectifier::new(
            ScalarField::filled(2, 2, 0.0),
            ScalarField::filled(2, 3, 0.0),
            RemapParams::default(),
        );
        assert!(matches!(err, Err(RectifyError::MapShape(_))));
    }
}
