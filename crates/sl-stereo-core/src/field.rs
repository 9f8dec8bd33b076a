//! Dense per-pixel float fields and the invalid-pixel sentinel.

/// Value stored in pixels that carry no measurement.
///
/// Matches the on-disk convention of historical scans (`+inf`). Zero is a
/// valid disparity and must never be used to mean "unknown".
pub const INVALID: f32 = f32::INFINITY;

/// `true` if `v` is a measurement rather than the sentinel.
///
/// NaN and `-inf` are treated as invalid too, so fields written by other
/// tools behave the same way.
#[inline]
pub fn is_valid(v: f32) -> bool {
    v.is_finite()
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FieldError {
    #[error("field buffer length mismatch (expected {expected}, got {got})")]
    BufferLength { expected: usize, got: usize },
    #[error("field dimensions mismatch (expected {expected:?}, got {got:?})")]
    DimensionMismatch {
        expected: (usize, usize),
        got: (usize, usize),
    },
}

#[derive(Clone, Copy, Debug)]
pub struct ScalarFieldView<'a> {
    pub width: usize,
    pub height: usize,
    pub data: &'a [f32], // row-major, len = w*h
}

impl ScalarFieldView<'_> {
    #[inline]
    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.data[y * self.width + x]
    }

    /// Value at signed coordinates, `None` outside the field.
    #[inline]
    pub fn get_checked(&self, x: i64, y: i64) -> Option<f32> {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return None;
        }
        Some(self.data[y as usize * self.width + x as usize])
    }

    pub fn to_owned_field(&self) -> ScalarField {
        ScalarField {
            width: self.width,
            height: self.height,
            data: self.data.to_vec(),
        }
    }
}

/// A width × height grid of `f32` values, row-major.
#[derive(Clone, Debug, PartialEq)]
pub struct ScalarField {
    pub width: usize,
    pub height: usize,
    pub data: Vec<f32>,
}

impl ScalarField {
    pub fn new(width: usize, height: usize, data: Vec<f32>) -> Result<Self, FieldError> {
        let expected = width * height;
        if data.len() != expected {
            return Err(FieldError::BufferLength {
                expected,
                got: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn filled(width: usize, height: usize, value: f32) -> Self {
        Self {
            width,
            height,
            data: vec![value; width * height],
        }
    }

    /// A field with every pixel set to [`INVALID`].
    pub fn invalid(width: usize, height: usize) -> Self {
        Self::filled(width, height, INVALID)
    }

    /// Build a field by evaluating `f(x, y)` at every pixel.
    pub fn from_fn(width: usize, height: usize, mut f: impl FnMut(usize, usize) -> f32) -> Self {
        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Self {
            width,
            height,
            data,
        }
    }

    #[inline]
    pub fn view(&self) -> ScalarFieldView<'_> {
        ScalarFieldView {
            width: self.width,
            height: self.height,
            data: &self.data,
        }
    }

    #[inline]
    pub fn dims(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.data[y * self.width + x]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, v: f32) {
        self.data[y * self.width + x] = v;
    }

    #[inline]
    pub fn get_checked(&self, x: i64, y: i64) -> Option<f32> {
        self.view().get_checked(x, y)
    }

    #[inline]
    pub fn is_valid_at(&self, x: usize, y: usize) -> bool {
        is_valid(self.get(x, y))
    }

    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|v| is_valid(**v)).count()
    }

    pub fn is_all_invalid(&self) -> bool {
        !self.data.iter().any(|v| is_valid(*v))
    }

    /// Error unless `other` has the same width and height.
    pub fn ensure_same_dims(&self, other: &ScalarField) -> Result<(), FieldError> {
        if self.dims() != other.dims() {
            return Err(FieldError::DimensionMismatch {
                expected: self.dims(),
                got: other.dims(),
            });
        }
        Ok(())
    }

    /// Replace NaN and `-inf` with [`INVALID`] so that equality and
    /// bit-level comparisons see a single sentinel.
    pub fn normalize_invalid(&mut self) {
        for v in &mut self.data {
            if !is_valid(*v) {
                *v = INVALID;
            }
        }
    }

    /// Smallest and largest valid value, if any.
    pub fn valid_range(&self) -> Option<(f32, f32)> {
        let mut range: Option<(f32, f32)> = None;
        for &v in self.data.iter().filter(|v| is_valid(**v)) {
            range = Some(match range {
                None => (v, v),
                Some((lo, hi)) => (lo.min(v), hi.max(v)),
            });
        }
        range
    }
}

/// Disparity of one view: offsets to the corresponding pixel in the other view.
///
/// `y` is absent for x-only products. When present, both components share
/// the same invalid mask after every stage.
#[derive(Clone, Debug, PartialEq)]
pub struct DisparityMap {
    pub x: ScalarField,
    pub y: Option<ScalarField>,
}

impl DisparityMap {
    pub fn new(x: ScalarField, y: Option<ScalarField>) -> Result<Self, FieldError> {
        if let Some(y) = &y {
            x.ensure_same_dims(y)?;
        }
        Ok(Self { x, y })
    }

    pub fn from_x(x: ScalarField) -> Self {
        Self { x, y: None }
    }

    pub fn invalid(width: usize, height: usize, with_y: bool) -> Self {
        Self {
            x: ScalarField::invalid(width, height),
            y: with_y.then(|| ScalarField::invalid(width, height)),
        }
    }

    #[inline]
    pub fn dims(&self) -> (usize, usize) {
        self.x.dims()
    }

    #[inline]
    pub fn has_y(&self) -> bool {
        self.y.is_some()
    }

    /// `(dx, dy)` at a linear index; `dy` is 0 for x-only maps.
    #[inline]
    pub fn at(&self, idx: usize) -> (f32, f32) {
        let dy = self.y.as_ref().map_or(0.0, |y| y.data[idx]);
        (self.x.data[idx], dy)
    }

    /// Valid when every present component is valid.
    #[inline]
    pub fn is_valid_index(&self, idx: usize) -> bool {
        let (dx, dy) = self.at(idx);
        is_valid(dx) && is_valid(dy)
    }

    #[inline]
    pub fn set(&mut self, idx: usize, dx: f32, dy: f32) {
        self.x.data[idx] = dx;
        if let Some(y) = &mut self.y {
            y.data[idx] = dy;
        }
    }

    #[inline]
    pub fn invalidate(&mut self, idx: usize) {
        self.set(idx, INVALID, INVALID);
    }

    pub fn valid_count(&self) -> usize {
        (0..self.x.len())
            .filter(|&i| self.is_valid_index(i))
            .count()
    }

    pub fn ensure_same_dims(&self, other: &DisparityMap) -> Result<(), FieldError> {
        self.x.ensure_same_dims(&other.x)
    }
}

/// Decoded structured-light code values of one view, one field per axis.
#[derive(Clone, Debug, PartialEq)]
pub struct CodeMap {
    pub u: ScalarField,
    pub v: ScalarField,
}

impl CodeMap {
    pub fn new(u: ScalarField, v: ScalarField) -> Result<Self, FieldError> {
        u.ensure_same_dims(&v)?;
        Ok(Self { u, v })
    }

    #[inline]
    pub fn dims(&self) -> (usize, usize) {
        self.u.dims()
    }

    /// `(u, v)` at a linear index, `None` when either axis is invalid.
    #[inline]
    pub fn code_at(&self, idx: usize) -> Option<(f32, f32)> {
        let (u, v) = (self.u.data[idx], self.v.data[idx]);
        (is_valid(u) && is_valid(v)).then_some((u, v))
    }
}

#[inline]
fn tap(src: &ScalarFieldView<'_>, x: i64, y: i64) -> f32 {
    src.get_checked(x, y).unwrap_or(INVALID)
}

/// Bilinear sample with pixel centers at integer coordinates.
///
/// Any invalid or out-of-range tap with non-zero weight makes the result
/// [`INVALID`], so integer coordinates on the last row or column still sample.
#[inline]
pub fn sample_bilinear(src: &ScalarFieldView<'_>, x: f32, y: f32) -> f32 {
    if !x.is_finite() || !y.is_finite() {
        return INVALID;
    }
    let x0 = x.floor() as i64;
    let y0 = y.floor() as i64;
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let taps = [
        (x0, y0, (1.0 - fx) * (1.0 - fy)),
        (x0 + 1, y0, fx * (1.0 - fy)),
        (x0, y0 + 1, (1.0 - fx) * fy),
        (x0 + 1, y0 + 1, fx * fy),
    ];
    let mut acc = 0.0;
    for (tx, ty, w) in taps {
        if w == 0.0 {
            continue;
        }
        let v = tap(src, tx, ty);
        if !is_valid(v) {
            return INVALID;
        }
        acc += w * v;
    }
    acc
}

#[inline]
pub fn sample_nearest(src: &ScalarFieldView<'_>, x: f32, y: f32) -> f32 {
    if !x.is_finite() || !y.is_finite() {
        return INVALID;
    }
    tap(src, x.round() as i64, y.round() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_rejects_wrong_buffer_length() {
        let err = ScalarField::new(3, 2, vec![0.0; 5]).unwrap_err();
        assert_eq!(err, FieldError::BufferLength { expected: 6, got: 5 });
    }

    #[test]
    fn zero_is_valid_and_nan_is_not() {
        assert!(is_valid(0.0));
        assert!(!is_valid(INVALID));
        assert!(!is_valid(f32::NAN));
        assert!(!is_valid(f32::NEG_INFINITY));
    }

    #[test]
    fn disparity_map_rejects_misaligned_components() {
        let x = ScalarField::filled(4, 4, 1.0);
        let y = ScalarField::filled(4, 3, 0.0);
        assert!(matches!(
            DisparityMap::new(x, Some(y)),
            Err(FieldError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn bilinear_propagates_invalid_taps() {
        let mut f = ScalarField::from_fn(4, 4, |x, _| x as f32);
        assert!((sample_bilinear(&f.view(), 1.5, 1.0) - 1.5).abs() < 1e-6);
        f.set(2, 1, INVALID);
        assert!(!is_valid(sample_bilinear(&f.view(), 1.5, 1.0)));
        assert!(!is_valid(sample_bilinear(&f.view(), 3.5, 0.0)));
        assert_eq!(sample_nearest(&f.view(), 0.6, 0.2), 1.0);
    }

    #[test]
    fn normalize_maps_nan_to_sentinel() {
        let mut f = ScalarField::new(2, 1, vec![f32::NAN, 2.0]).unwrap();
        f.normalize_invalid();
        assert_eq!(f.data[0].to_bits(), INVALID.to_bits());
        assert_eq!(f.valid_range(), Some((2.0, 2.0)));
    }
}
