//! Single-map outlier removal and hole filling.

use crate::FilterParams;
use log::debug;
use sl_stereo_core::{is_valid, DisparityMap};

#[cfg(feature = "tracing")]
use tracing::instrument;

#[inline]
fn agree(map: &DisparityMap, a: usize, b: usize, max_diff: f32) -> bool {
    let (ax, ay) = map.at(a);
    let (bx, by) = map.at(b);
    (ax - bx).abs() <= max_diff && (ay - by).abs() <= max_diff
}

fn reject_y_outliers(map: &mut DisparityMap, threshold: f32) -> usize {
    let Some(y) = map.y.as_ref() else {
        return 0;
    };
    let bad: Vec<usize> = y
        .data
        .iter()
        .enumerate()
        .filter(|(_, v)| is_valid(**v) && v.abs() > threshold)
        .map(|(i, _)| i)
        .collect();
    for &i in &bad {
        map.invalidate(i);
    }
    bad.len()
}

fn reject_unsupported(map: &mut DisparityMap, params: &FilterParams) -> usize {
    if params.window_x == 0 && params.window_y == 0 {
        return 0;
    }
    let snapshot = map.clone();
    let (w, h) = snapshot.dims();
    let (kx, ky) = (params.window_x as i64, params.window_y as i64);
    let mut removed = 0;
    for y in 0..h as i64 {
        for x in 0..w as i64 {
            let idx = (y * w as i64 + x) as usize;
            if !snapshot.is_valid_index(idx) {
                continue;
            }
            let mut support = 0usize;
            'window: for ny in (y - ky).max(0)..=(y + ky).min(h as i64 - 1) {
                for nx in (x - kx).max(0)..=(x + kx).min(w as i64 - 1) {
                    if nx == x && ny == y {
                        continue;
                    }
                    let n = (ny * w as i64 + nx) as usize;
                    if snapshot.is_valid_index(n) && agree(&snapshot, idx, n, params.max_diff) {
                        support += 1;
                        if support >= params.min_support {
                            break 'window;
                        }
                    }
                }
            }
            if support < params.min_support {
                map.invalidate(idx);
                removed += 1;
            }
        }
    }
    removed
}

#[inline]
fn neighbors4(idx: usize, w: usize, h: usize) -> impl Iterator<Item = usize> {
    let (x, y) = (idx % w, idx / w);
    [
        (x > 0).then(|| idx - 1),
        (x + 1 < w).then(|| idx + 1),
        (y > 0).then(|| idx - w),
        (y + 1 < h).then(|| idx + w),
    ]
    .into_iter()
    .flatten()
}

/// Label 4-connected regions grown by `joins(a, b)` over seeds where
/// `member(i)` holds. Calls `visit` with each finished region.
fn for_each_region(
    w: usize,
    h: usize,
    member: impl Fn(usize) -> bool,
    joins: impl Fn(usize, usize) -> bool,
    mut visit: impl FnMut(&[usize]),
) {
    let mut seen = vec![false; w * h];
    let mut stack = Vec::new();
    let mut region = Vec::new();
    for seed in 0..w * h {
        if seen[seed] || !member(seed) {
            continue;
        }
        seen[seed] = true;
        stack.push(seed);
        region.clear();
        while let Some(i) = stack.pop() {
            region.push(i);
            for n in neighbors4(i, w, h) {
                if !seen[n] && member(n) && joins(i, n) {
                    seen[n] = true;
                    stack.push(n);
                }
            }
        }
        visit(&region);
    }
}

fn remove_small_components(map: &mut DisparityMap, params: &FilterParams) -> usize {
    if params.min_component_size <= 1 {
        return 0;
    }
    let snapshot = map.clone();
    let (w, h) = snapshot.dims();
    let mut doomed = Vec::new();
    for_each_region(
        w,
        h,
        |i| snapshot.is_valid_index(i),
        |a, b| agree(&snapshot, a, b, params.max_diff),
        |region| {
            if region.len() < params.min_component_size {
                doomed.extend_from_slice(region);
            }
        },
    );
    for &i in &doomed {
        map.invalidate(i);
    }
    doomed.len()
}

fn fill_holes(map: &mut DisparityMap, params: &FilterParams) -> usize {
    if params.max_hole_size == 0 {
        return 0;
    }
    let snapshot = map.clone();
    let (w, h) = snapshot.dims();
    let mut holes: Vec<Vec<usize>> = Vec::new();
    for_each_region(
        w,
        h,
        |i| !snapshot.is_valid_index(i),
        |_, _| true,
        |region| {
            let touches_border = region.iter().any(|&i| {
                let (x, y) = (i % w, i / w);
                x == 0 || y == 0 || x + 1 == w || y + 1 == h
            });
            if !touches_border && region.len() <= params.max_hole_size {
                holes.push(region.to_vec());
            }
        },
    );

    let mut filled = 0;
    for mut hole in holes {
        hole.sort_unstable();
        // row-major order: split into maximal horizontal runs
        let mut start = 0;
        while start < hole.len() {
            let mut end = start;
            while end + 1 < hole.len() && hole[end + 1] == hole[end] + 1 && hole[end + 1] % w != 0 {
                end += 1;
            }
            // enclosed: both ends of every run are valid pixels in the same row
            let (left, right) = (hole[start] - 1, hole[end] + 1);
            let (lx, ly) = snapshot.at(left);
            let (rx, ry) = snapshot.at(right);
            let span = (right - left) as f32;
            let lerp = (lx - rx).abs() <= params.max_diff && (ly - ry).abs() <= params.max_diff;
            for (k, &i) in hole[start..=end].iter().enumerate() {
                let (dx, dy) = if lerp {
                    let t = (k + 1) as f32 / span;
                    (lx + t * (rx - lx), ly + t * (ry - ly))
                } else if lx.abs() <= rx.abs() {
                    (lx, ly)
                } else {
                    (rx, ry)
                };
                map.set(i, dx, dy);
            }
            filled += end - start + 1;
            start = end + 1;
        }
    }
    filled
}

/// Apply, in order: y-threshold rejection, local support vote, small
/// segment removal and enclosed-hole filling.
///
/// The x and y components always share one invalid mask in the output.
#[cfg_attr(feature = "tracing", instrument(level = "info", skip_all))]
pub fn filter_disparities(map: &DisparityMap, params: &FilterParams) -> DisparityMap {
    let mut out = map.clone();
    // align masks first so a half-valid pixel never votes
    for i in 0..out.x.len() {
        if !out.is_valid_index(i) {
            out.invalidate(i);
        }
    }
    let y_rejected = match params.y_threshold {
        Some(t) => reject_y_outliers(&mut out, t),
        None => 0,
    };
    let unsupported = reject_unsupported(&mut out, params);
    let small = remove_small_components(&mut out, params);
    let filled = fill_holes(&mut out, params);
    debug!(
        "filter: {y_rejected} y-outliers, {unsupported} unsupported, {small} in small segments, {filled} filled"
    );
    out
}
