use crate::{MergeParams, StageError};
use log::debug;
use sl_stereo_core::{is_valid, DisparityMap};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Largest agreement group among `samples`.
///
/// The group of sample `i` is every sample within `max_diff` of it on both
/// components. Returns `(center, size)`; ties keep the earliest center.
pub(crate) fn largest_group(samples: &[(f32, f32)], max_diff: f32) -> Option<(usize, usize)> {
    let mut best: Option<(usize, usize)> = None;
    for (i, &(xi, yi)) in samples.iter().enumerate() {
        let size = samples
            .iter()
            .filter(|&&(xj, yj)| (xi - xj).abs() <= max_diff && (yi - yj).abs() <= max_diff)
            .count();
        if best.is_none_or(|(_, s)| size > s) {
            best = Some((i, size));
        }
    }
    best
}

/// Mean of the group centred on `samples[center]`.
pub(crate) fn group_mean(samples: &[(f32, f32)], center: usize, max_diff: f32) -> (f32, f32) {
    let (cx, cy) = samples[center];
    let (mut sx, mut sy, mut n) = (0.0f64, 0.0f64, 0usize);
    for &(x, y) in samples {
        if (x - cx).abs() <= max_diff && (y - cy).abs() <= max_diff {
            sx += x as f64;
            sy += y as f64;
            n += 1;
        }
    }
    ((sx / n as f64) as f32, (sy / n as f64) as f32)
}

/// Per-pixel consensus over the per-projector disparities of one view.
///
/// A pixel gets the mean of its largest agreeing group when that group has
/// at least `min_group` members, otherwise it is invalid. The y component is
/// merged only if every input has one.
#[cfg_attr(feature = "tracing", instrument(level = "info", skip_all, fields(inputs = inputs.len())))]
pub fn merge_projectors(
    inputs: &[DisparityMap],
    params: &MergeParams,
) -> Result<DisparityMap, StageError> {
    let first = inputs.first().ok_or(StageError::NoInputs { stage: "merge" })?;
    for m in &inputs[1..] {
        first.ensure_same_dims(m)?;
    }
    let (w, h) = first.dims();
    let with_y = inputs.iter().all(DisparityMap::has_y);
    let mut out = DisparityMap::invalid(w, h, with_y);

    let mut samples = Vec::with_capacity(inputs.len());
    for idx in 0..w * h {
        samples.clear();
        for m in inputs {
            let (dx, dy) = m.at(idx);
            if !is_valid(dx) {
                continue;
            }
            if with_y {
                if !is_valid(dy) {
                    continue;
                }
                samples.push((dx, dy));
            } else {
                samples.push((dx, 0.0));
            }
        }
        let Some((center, size)) = largest_group(&samples, params.max_diff) else {
            continue;
        };
        if size >= params.min_group.max(1) {
            let (mx, my) = group_mean(&samples, center, params.max_diff);
            out.set(idx, mx, my);
        }
    }
    debug!(
        "merged {} inputs: {} valid pixels",
        inputs.len(),
        out.valid_count()
    );
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sl_stereo_core::{ScalarField, INVALID};

    fn single(v: f32) -> DisparityMap {
        DisparityMap::from_x(ScalarField::filled(1, 1, v))
    }

    #[test]
    fn group_ties_keep_first_center() {
        let samples = [(1.0, 0.0), (5.0, 0.0)];
        assert_eq!(largest_group(&samples, 1.0), Some((0, 1)));
        assert_eq!(largest_group(&[], 1.0), None);
    }

    #[test]
    fn invalid_samples_never_vote() {
        let inputs = [single(INVALID), single(2.0), single(2.5), single(INVALID)];
        let out = merge_projectors(&inputs, &MergeParams::default()).unwrap();
        assert_eq!(out.x.data[0], 2.25);
    }

    #[test]
    fn y_is_dropped_unless_every_input_has_it() {
        let with_y =
            DisparityMap::new(ScalarField::filled(1, 1, 1.0), Some(ScalarField::filled(1, 1, 0.0)))
                .unwrap();
        let out = merge_projectors(&[with_y.clone(), single(1.0)], &MergeParams::default()).unwrap();
        assert!(!out.has_y());
        let out = merge_projectors(&[with_y.clone(), with_y], &MergeParams::default()).unwrap();
        assert!(out.has_y());
    }

    #[test]
    fn empty_input_is_an_error() {
        assert_eq!(
            merge_projectors(&[], &MergeParams::default()),
            Err(StageError::NoInputs { stage: "merge" })
        );
    }
}
