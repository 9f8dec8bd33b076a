use crate::merge::{group_mean, largest_group};
use crate::{SecondStageParams, StageError};
use log::debug;
use sl_stereo_core::{is_valid, ScalarField};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Output of the second-stage merge for one view.
#[derive(Clone, Debug, PartialEq)]
pub struct SecondStageMerge {
    pub merged: ScalarField,
    /// Population standard deviation of the values that formed `merged`.
    pub std_dev: ScalarField,
    /// Per-projector samples (direct and reprojected) averaged into
    /// `merged`. The anchor is never counted, so an anchored pixel and a
    /// pixel filled from samples alone report the same number for the same
    /// agreeing samples. 0 for an anchor-only pixel or no output.
    pub samples: ScalarField,
}

fn mean_std(values: &[f32]) -> (f32, f32) {
    let n = values.len() as f64;
    let mean = values.iter().map(|&v| v as f64).sum::<f64>() / n;
    let var = values.iter().map(|&v| (v as f64 - mean).powi(2)).sum::<f64>() / n;
    (mean as f32, var.sqrt() as f32)
}

/// Combine the anchor (cross-checked merged disparity) with per-projector
/// direct disparities and reliable reprojected disparities of the same view.
///
/// A valid anchor is averaged with the samples within `max_diff` of it. An
/// anchor nobody corroborates is kept with a sample count of 0 when
/// `keep_uncorroborated_anchor` is set. Where the anchor is invalid the
/// samples must form a group of `fallback_min_group` on their own.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip_all, fields(direct = direct.len(), reprojected = reprojected.len()))
)]
pub fn merge_second_stage(
    anchor: &ScalarField,
    direct: &[ScalarField],
    reprojected: &[ScalarField],
    params: &SecondStageParams,
) -> Result<SecondStageMerge, StageError> {
    for f in direct.iter().chain(reprojected) {
        anchor.ensure_same_dims(f)?;
    }
    let (w, h) = anchor.dims();
    let mut merged = ScalarField::invalid(w, h);
    let mut std_dev = ScalarField::invalid(w, h);
    let mut samples = ScalarField::filled(w, h, 0.0);

    let mut values: Vec<f32> = Vec::new();
    let mut pairs: Vec<(f32, f32)> = Vec::new();
    let (mut anchored, mut uncorroborated, mut filled) = (0usize, 0usize, 0usize);
    for idx in 0..w * h {
        values.clear();
        values.extend(
            direct
                .iter()
                .chain(reprojected)
                .map(|f| f.data[idx])
                .filter(|v| is_valid(*v)),
        );

        let a = anchor.data[idx];
        if is_valid(a) {
            let corroborating = values.iter().filter(|v| (**v - a).abs() <= params.max_diff).count();
            if corroborating == 0 {
                if params.keep_uncorroborated_anchor {
                    merged.data[idx] = a;
                    std_dev.data[idx] = 0.0;
                    uncorroborated += 1;
                }
                continue;
            }
            values.retain(|v| (*v - a).abs() <= params.max_diff);
            values.push(a);
            let (m, s) = mean_std(&values);
            merged.data[idx] = m;
            std_dev.data[idx] = s;
            samples.data[idx] = corroborating as f32;
            anchored += 1;
            continue;
        }

        pairs.clear();
        pairs.extend(values.iter().map(|&v| (v, 0.0)));
        let Some((center, size)) = largest_group(&pairs, params.max_diff) else {
            continue;
        };
        if size < params.fallback_min_group.max(1) {
            continue;
        }
        let (cx, _) = pairs[center];
        let (m, _) = group_mean(&pairs, center, params.max_diff);
        values.retain(|v| (*v - cx).abs() <= params.max_diff);
        let (_, s) = mean_std(&values);
        merged.data[idx] = m;
        std_dev.data[idx] = s;
        samples.data[idx] = values.len() as f32;
        filled += 1;
    }
    debug!(
        "second-stage merge: {anchored} corroborated, {uncorroborated} anchor-only, {filled} filled from samples"
    );
    Ok(SecondStageMerge {
        merged,
        std_dev,
        samples,
    })
}
