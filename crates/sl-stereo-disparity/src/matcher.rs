//! Code-value correspondence search between two views.

use crate::{MatchParams, SearchWindow, StageError};
use log::debug;
use sl_stereo_core::{is_valid, CodeMap, DisparityMap, ScalarField};
use std::collections::HashMap;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Raw per-view disparities of one projector and stereo pair.
#[derive(Clone, Debug, PartialEq)]
pub struct StereoDisparity {
    pub left: DisparityMap,
    pub right: DisparityMap,
}

type BucketKey = (i64, i64);

/// Pixels of one view bucketed by quantized code.
struct CodeIndex<'a> {
    codes: &'a CodeMap,
    cell: f32,
    buckets: HashMap<BucketKey, Vec<usize>>,
}

impl<'a> CodeIndex<'a> {
    fn build(codes: &'a CodeMap, cell: f32) -> Self {
        let mut buckets: HashMap<BucketKey, Vec<usize>> = HashMap::new();
        for idx in 0..codes.u.len() {
            if let Some((u, v)) = codes.code_at(idx) {
                buckets.entry(key(u, v, cell)).or_default().push(idx);
            }
        }
        Self {
            codes,
            cell,
            buckets,
        }
    }

    /// Best match for `code` seen from `(x, y)`, as an integer pixel index.
    fn best_match(
        &self,
        x: usize,
        y: usize,
        code: (f32, f32),
        tolerance: f32,
        window: Option<&SearchWindow>,
    ) -> Option<usize> {
        let width = self.codes.u.width;
        let (ku, kv) = key(code.0, code.1, self.cell);
        // (cost, |offset|, index)
        let mut best: Option<(f32, i64, usize)> = None;
        for bu in ku - 1..=ku + 1 {
            for bv in kv - 1..=kv + 1 {
                let Some(bucket) = self.buckets.get(&(bu, bv)) else {
                    continue;
                };
                for &j in bucket {
                    let (u, v) = (self.codes.u.data[j], self.codes.v.data[j]);
                    let (du, dv) = ((u - code.0).abs(), (v - code.1).abs());
                    if du > tolerance || dv > tolerance {
                        continue;
                    }
                    let dx = (j % width) as i64 - x as i64;
                    let dy = (j / width) as i64 - y as i64;
                    if window.is_some_and(|w| !w.contains(dx, dy)) {
                        continue;
                    }
                    let cand = (du * du + dv * dv, dx.abs() + dy.abs(), j);
                    let better = match best {
                        None => true,
                        Some(b) => (cand.0, cand.1, cand.2) < (b.0, b.1, b.2),
                    };
                    if better {
                        best = Some(cand);
                    }
                }
            }
        }
        best.map(|b| b.2)
    }

    /// Sub-pixel correction `(δx, δy)` solving `J·δ = code − code(j)` with the
    /// central-difference code Jacobian at `j`, clamped to half a pixel.
    fn refine(&self, j: usize, code: (f32, f32)) -> (f32, f32) {
        let width = self.codes.u.width as i64;
        let (jx, jy) = (j as i64 % width, j as i64 / width);
        let grad = |field: &ScalarField| -> Option<(f32, f32)> {
            let d = |ax: i64, ay: i64| -> Option<f32> {
                let fwd = field.get_checked(jx + ax, jy + ay).filter(|v| is_valid(*v));
                let back = field.get_checked(jx - ax, jy - ay).filter(|v| is_valid(*v));
                let here = field.data[j];
                match (back, fwd) {
                    (Some(b), Some(f)) => Some((f - b) * 0.5),
                    (None, Some(f)) => Some(f - here),
                    (Some(b), None) => Some(here - b),
                    (None, None) => None,
                }
            };
            Some((d(1, 0)?, d(0, 1)?))
        };
        let (Some((ux, uy)), Some((vx, vy))) = (grad(&self.codes.u), grad(&self.codes.v)) else {
            return (0.0, 0.0);
        };
        let det = ux * vy - uy * vx;
        if det.abs() < 1e-6 {
            return (0.0, 0.0);
        }
        let ru = code.0 - self.codes.u.data[j];
        let rv = code.1 - self.codes.v.data[j];
        let sx = (vy * ru - uy * rv) / det;
        let sy = (ux * rv - vx * ru) / det;
        if !sx.is_finite() || !sy.is_finite() {
            return (0.0, 0.0);
        }
        (sx.clamp(-0.5, 0.5), sy.clamp(-0.5, 0.5))
    }
}

#[inline]
fn key(u: f32, v: f32, cell: f32) -> BucketKey {
    ((u / cell).floor() as i64, (v / cell).floor() as i64)
}

fn match_view(this: &CodeMap, other: &CodeMap, params: &MatchParams) -> DisparityMap {
    let (w, h) = this.dims();
    let cell = params.code_tolerance.max(1e-3);
    let index = CodeIndex::build(other, cell);
    let mut out = DisparityMap::invalid(w, h, true);
    for y in 0..h {
        for x in 0..w {
            let idx = y * w + x;
            let Some(code) = this.code_at(idx) else {
                continue;
            };
            let Some(j) = index.best_match(x, y, code, params.code_tolerance, params.window.as_ref())
            else {
                continue;
            };
            let mut dx = (j % w) as f32 - x as f32;
            let mut dy = (j / w) as f32 - y as f32;
            if params.subpixel {
                let (sx, sy) = index.refine(j, code);
                dx += sx;
                dy += sy;
            }
            out.set(idx, dx, dy);
        }
    }
    out
}

/// Match every pixel of each view against the other view's codes.
///
/// Disparity is `p_other − p_this`; unmatched pixels are invalid.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip_all, fields(width = left.u.width, height = left.u.height))
)]
pub fn compute_disparities(
    left: &CodeMap,
    right: &CodeMap,
    params: &MatchParams,
) -> Result<StereoDisparity, StageError> {
    left.u.ensure_same_dims(&left.v)?;
    right.u.ensure_same_dims(&right.v)?;
    left.u.ensure_same_dims(&right.u)?;
    if !(params.code_tolerance >= 0.0) || !params.code_tolerance.is_finite() {
        return Err(StageError::InvalidParams {
            name: "code_tolerance",
            reason: "must be a finite non-negative value",
        });
    }

    let out = StereoDisparity {
        left: match_view(left, right, params),
        right: match_view(right, left, params),
    };
    debug!(
        "matched {} left / {} right pixels",
        out.left.valid_count(),
        out.right.valid_count()
    );
    Ok(out)
}
