//! Reprojection of projector codes through a disparity map.
//!
//! The pixels of one view that have both a disparity and a decoded code pin
//! down a projective map `(x, y, d) → (u, v)`: the projector seen from the
//! rectified stereo frame. Inverting that map at every pixel with a code
//! yields a disparity for pixels the stereo match missed, validated against
//! the other view's codes.

use crate::crosscheck::shifted;
use crate::{ReprojectParams, ReprojectionStats, StageError, StatLine};
use log::{debug, warn};
use sl_stereo_core::{
    is_valid, CodeCorrespondence, CodeMap, DisparityMap, ProjectiveModel, ScalarField,
};

#[cfg(feature = "tracing")]
use tracing::instrument;

#[derive(Clone, Debug, PartialEq)]
pub struct Reprojection {
    /// Re-derived disparity; `y` is 0 wherever `x` is valid.
    pub disparity: DisparityMap,
    /// Cross-view code residual at accepted pixels.
    pub error: ScalarField,
    /// `None` when there were too few observations or the fit degenerated.
    pub model: Option<ProjectiveModel>,
    pub stats: ReprojectionStats,
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        100.0 * part as f64 / whole as f64
    }
}

fn rms(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    (values.iter().map(|v| v * v).sum::<f64>() / values.len() as f64).sqrt()
}

fn count_above(values: &[f64], threshold: f64) -> usize {
    values.iter().filter(|v| v.abs() > threshold).count()
}

fn failed(w: usize, h: usize, code_pixels: usize, fit_points: usize, threshold: f64) -> Reprojection {
    let line = |match_percent| StatLine {
        match_percent,
        rms: f64::NAN,
        bad_percent: 100.0,
        threshold,
    };
    Reprojection {
        disparity: DisparityMap::invalid(w, h, true),
        error: ScalarField::invalid(w, h),
        model: None,
        stats: ReprojectionStats {
            direct: line(percent(fit_points, code_pixels)),
            reprojected: line(0.0),
        },
    }
}

/// Fit the code model on `disparity`/`codes_this` and reproject every coded
/// pixel, checking the result against `codes_other`.
#[cfg_attr(feature = "tracing", instrument(level = "info", skip_all))]
pub fn reproject(
    disparity: &DisparityMap,
    codes_this: &CodeMap,
    codes_other: &CodeMap,
    params: &ReprojectParams,
) -> Result<Reprojection, StageError> {
    codes_this.u.ensure_same_dims(&codes_this.v)?;
    codes_other.u.ensure_same_dims(&codes_other.v)?;
    disparity.x.ensure_same_dims(&codes_this.u)?;
    disparity.x.ensure_same_dims(&codes_other.u)?;
    let (w, h) = disparity.dims();

    let mut points = Vec::new();
    let mut code_pixels = 0usize;
    for idx in 0..w * h {
        let Some((u, v)) = codes_this.code_at(idx) else {
            continue;
        };
        code_pixels += 1;
        let d = disparity.x.data[idx];
        if is_valid(d) {
            points.push(CodeCorrespondence {
                x: (idx % w) as f64,
                y: (idx / w) as f64,
                d: d as f64,
                u: u as f64,
                v: v as f64,
            });
        }
    }

    if points.len() < params.min_fit_points.max(sl_stereo_core::MIN_CORRESPONDENCES) {
        warn!(
            "reprojection: {} fit observations, need {}",
            points.len(),
            params.min_fit_points
        );
        return Ok(failed(w, h, code_pixels, points.len(), params.bad_threshold));
    }
    let Some(model) = ProjectiveModel::fit_robust(&points, params.inlier_threshold) else {
        warn!("reprojection: degenerate code model");
        return Ok(failed(w, h, code_pixels, points.len(), params.bad_threshold));
    };

    let fit_residuals: Vec<f64> = points
        .iter()
        .map(|c| model.residual(c).unwrap_or(f64::INFINITY))
        .collect();

    let mut out = DisparityMap::invalid(w, h, true);
    let mut error = ScalarField::invalid(w, h);
    let mut accepted = 0usize;
    let mut disagreement = Vec::new();
    for idx in 0..w * h {
        let Some((u, v)) = codes_this.code_at(idx) else {
            continue;
        };
        let (x, y) = (idx % w, idx / w);
        let Some(d) = model.solve_disparity(x as f64, y as f64, u as f64, v as f64) else {
            continue;
        };
        let Some(tx) = shifted(x, d as f32, w) else {
            continue;
        };
        let Some((ou, ov)) = codes_other.code_at(y * w + tx) else {
            continue;
        };
        let (du, dv) = (ou - u, ov - v);
        if du.abs() > params.code_tolerance || dv.abs() > params.code_tolerance {
            continue;
        }
        out.set(idx, d as f32, 0.0);
        error.data[idx] = (du * du + dv * dv).sqrt();
        accepted += 1;

        let direct = disparity.x.data[idx];
        if is_valid(direct) {
            disagreement.push(d - direct as f64);
        }
    }

    let stats = ReprojectionStats {
        direct: StatLine {
            match_percent: percent(points.len(), code_pixels),
            rms: rms(&fit_residuals),
            bad_percent: percent(
                count_above(&fit_residuals, params.bad_threshold),
                fit_residuals.len(),
            ),
            threshold: params.bad_threshold,
        },
        reprojected: StatLine {
            match_percent: percent(accepted, code_pixels),
            rms: rms(&disagreement),
            bad_percent: percent(
                count_above(&disagreement, params.bad_threshold),
                disagreement.len(),
            ),
            threshold: params.bad_threshold,
        },
    };
    debug!(
        "reprojection: {} fit points, {} accepted, rms {:.3}/{:.3}",
        points.len(),
        accepted,
        stats.direct.rms,
        stats.reprojected.rms
    );

    Ok(Reprojection {
        disparity: out,
        error,
        model: Some(model),
        stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ReliabilityRecord, ReliabilityThresholds};
    use approx::assert_relative_eq;
    use sl_stereo_core::INVALID;

    const W: usize = 40;
    const H: usize = 10;

    fn true_d(x: usize) -> f32 {
        -8.0 + (x / 10) as f32
    }

    /// This view sees projector column `x + d`, the other view sees its own
    /// column; both see the row as `v`.
    fn scene() -> (DisparityMap, CodeMap, CodeMap) {
        let disp = ScalarField::from_fn(W, H, |x, _| if x >= 8 { true_d(x) } else { INVALID });
        let this = CodeMap::new(
            ScalarField::from_fn(W, H, |x, _| if x >= 8 { x as f32 + true_d(x) } else { INVALID }),
            ScalarField::from_fn(W, H, |x, y| if x >= 8 { y as f32 } else { INVALID }),
        )
        .unwrap();
        let other = CodeMap::new(
            ScalarField::from_fn(W, H, |x, _| x as f32),
            ScalarField::from_fn(W, H, |_, y| y as f32),
        )
        .unwrap();
        (DisparityMap::from_x(disp), this, other)
    }

    #[test]
    fn consistent_scene_reprojects_exactly() {
        let (disp, this, other) = scene();
        let r = reproject(&disp, &this, &other, &ReprojectParams::default()).unwrap();
        assert!(r.model.is_some());
        for x in 8..W {
            assert_relative_eq!(r.disparity.x.get(x, 4), true_d(x), epsilon = 1e-3);
            assert_eq!(r.disparity.y.as_ref().unwrap().get(x, 4), 0.0);
        }
        assert_relative_eq!(r.stats.direct.match_percent, 100.0);
        assert_relative_eq!(r.stats.reprojected.match_percent, 100.0);
        assert!(r.stats.reprojected.rms < 1e-3);
        assert!(ReliabilityRecord::from_stats(&r.stats).is_reliable(&ReliabilityThresholds::default()));
    }

    #[test]
    fn fills_pixels_without_direct_disparity() {
        let (mut disp, this, other) = scene();
        for y in 0..H {
            for x in 20..24 {
                disp.x.set(x, y, INVALID);
            }
        }
        let r = reproject(&disp, &this, &other, &ReprojectParams::default()).unwrap();
        assert_relative_eq!(r.disparity.x.get(21, 3), -6.0, epsilon = 1e-3);
        assert!(r.error.get(21, 3) < 1e-3);
    }

    #[test]
    fn huge_solved_disparity_is_rejected_as_out_of_image() {
        let (mut disp, mut this, other) = scene();
        // a stray code far outside the projector range, not used by the fit
        this.u.set(30, 5, 1e20);
        disp.x.set(30, 5, INVALID);
        let r = reproject(&disp, &this, &other, &ReprojectParams::default()).unwrap();
        assert!(r.model.is_some());
        assert!(!r.disparity.x.is_valid_at(30, 5));
        assert!(!r.error.is_valid_at(30, 5));
        assert_relative_eq!(r.disparity.x.get(31, 5), true_d(31), epsilon = 1e-3);
    }

    #[test]
    fn too_few_observations_yield_an_unreliable_empty_result() {
        let (_, this, other) = scene();
        let mut disp = DisparityMap::invalid(W, H, false);
        disp.x.set(10, 1, -7.0);
        let r = reproject(&disp, &this, &other, &ReprojectParams::default()).unwrap();
        assert!(r.model.is_none());
        assert!(r.disparity.x.is_all_invalid());
        assert_eq!(r.stats.direct.bad_percent, 100.0);
        assert!(!ReliabilityRecord::from_stats(&r.stats).is_reliable(&ReliabilityThresholds::default()));
    }

    #[test]
    fn dimension_mismatch_is_an_error() {
        let (disp, this, _) = scene();
        let small = CodeMap::new(ScalarField::filled(3, 3, 0.0), ScalarField::filled(3, 3, 0.0)).unwrap();
        assert!(matches!(
            reproject(&disp, &this, &small, &ReprojectParams::default()),
            Err(StageError::Field(_))
        ));
    }
}
