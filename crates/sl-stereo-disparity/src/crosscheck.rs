use crate::{CrossCheckParams, StageError};
use log::debug;
use sl_stereo_core::{is_valid, DisparityMap};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// `pos + round(d)` when it lands inside `0..len`.
#[inline]
pub(crate) fn shifted(pos: usize, d: f32, len: usize) -> Option<usize> {
    // also rejects offsets that would overflow the integer add
    if !(d.abs() < len as f32) {
        return None;
    }
    let t = pos as i64 + d.round() as i64;
    (0..len as i64).contains(&t).then_some(t as usize)
}

fn check_side(this: &DisparityMap, other: &DisparityMap, params: &CrossCheckParams) -> DisparityMap {
    let (w, h) = this.dims();
    let x_only = params.x_only || !this.has_y() || !other.has_y();
    let mut out = this.clone();

    for y in 0..h {
        for x in 0..w {
            let idx = y * w + x;
            if !this.is_valid_index(idx) {
                out.invalidate(idx);
                continue;
            }
            let (dx, dy) = this.at(idx);
            let tx = shifted(x, dx, w);
            let ty = if x_only { Some(y) } else { shifted(y, dy, h) };
            let (Some(tx), Some(ty)) = (tx, ty) else {
                out.invalidate(idx);
                continue;
            };
            let tidx = ty * w + tx;
            let (odx, ody) = other.at(tidx);
            let target_valid = is_valid(odx) && (x_only || is_valid(ody));
            if !target_valid {
                if !params.half_occlusion {
                    out.invalidate(idx);
                }
                continue;
            }
            let bad_x = (dx + odx).abs() > params.threshold;
            let bad_y = !x_only && (dy + ody).abs() > params.threshold;
            if bad_x || bad_y {
                out.invalidate(idx);
            }
        }
    }
    out
}

/// Bidirectional consistency test between the two views' disparities.
///
/// A valid pixel survives when the pixel it points at carries the opposite
/// disparity within `threshold` (inclusive). With `half_occlusion`, pixels
/// pointing at an invalid target survive too. Both outputs are computed from
/// the unmodified inputs.
#[cfg_attr(feature = "tracing", instrument(level = "info", skip_all, fields(threshold = params.threshold)))]
pub fn cross_check(
    left: &DisparityMap,
    right: &DisparityMap,
    params: &CrossCheckParams,
) -> Result<(DisparityMap, DisparityMap), StageError> {
    left.ensure_same_dims(right)?;
    let out_left = check_side(left, right, params);
    let out_right = check_side(right, left, params);
    debug!(
        "cross-check kept {}/{} left, {}/{} right",
        out_left.valid_count(),
        left.valid_count(),
        out_right.valid_count(),
        right.valid_count()
    );
    Ok((out_left, out_right))
}
