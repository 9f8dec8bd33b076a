use sl_stereo_core::{is_valid, CodeMap, DisparityMap, ScalarField, INVALID};
use sl_stereo_disparity::{
    compute_disparities, cross_check, filter_disparities, merge_projectors, merge_second_stage,
    reproject, CrossCheckParams, DisparityMode, FilterParams, MatchParams, MergeParams,
    ReprojectParams, SearchWindow, SecondStageParams,
};

fn shifted_codes(w: usize, h: usize, shift: usize) -> (CodeMap, CodeMap) {
    let left = CodeMap::new(
        ScalarField::from_fn(w, h, |x, _| x as f32),
        ScalarField::from_fn(w, h, |_, y| y as f32),
    )
    .unwrap();
    let right = CodeMap::new(
        ScalarField::from_fn(w, h, |x, _| {
            if x + shift < w {
                (x + shift) as f32
            } else {
                INVALID
            }
        }),
        ScalarField::from_fn(w, h, |_, y| y as f32),
    )
    .unwrap();
    (left, right)
}

fn rectified_match() -> MatchParams {
    MatchParams {
        window: SearchWindow::for_mode(DisparityMode::Rectified, 1080, 1.0),
        ..MatchParams::default()
    }
}

fn small_filter() -> FilterParams {
    FilterParams {
        y_threshold: Some(1.0),
        window_x: 1,
        window_y: 0,
        max_diff: 1.0,
        min_support: 1,
        min_component_size: 2,
        max_hole_size: 0,
    }
}

/// match → cross-check → filter → cross-check (x only)
fn first_stages(left: &CodeMap, right: &CodeMap) -> (DisparityMap, DisparityMap) {
    let raw = compute_disparities(left, right, &rectified_match()).unwrap();
    let (l, r) = cross_check(&raw.left, &raw.right, &CrossCheckParams::new(0.5, false, false)).unwrap();
    let l = filter_disparities(&l, &small_filter());
    let r = filter_disparities(&r, &small_filter());
    cross_check(&l, &r, &CrossCheckParams::new(0.5, true, false)).unwrap()
}

fn bits(field: &ScalarField) -> Vec<u32> {
    field.data.iter().map(|v| v.to_bits()).collect()
}

#[test]
fn four_by_four_shift_survives_every_first_stage() {
    let (left, right) = shifted_codes(4, 4, 2);
    let (l, r) = first_stages(&left, &right);
    for y in 0..4 {
        for x in 0..4 {
            if x < 2 {
                assert_eq!(r.x.get(x, y), 2.0, "right ({x}, {y})");
                assert!(!l.x.is_valid_at(x, y), "left ({x}, {y})");
            } else {
                assert_eq!(l.x.get(x, y), -2.0, "left ({x}, {y})");
                assert!(!r.x.is_valid_at(x, y), "right ({x}, {y})");
            }
        }
    }
    assert_eq!(l.y.as_ref().unwrap().get(3, 3), 0.0);
}

#[test]
fn first_stages_are_deterministic() {
    let (left, right) = shifted_codes(24, 12, 5);
    let (l1, r1) = first_stages(&left, &right);
    let (l2, r2) = first_stages(&left, &right);
    assert_eq!(bits(&l1.x), bits(&l2.x));
    assert_eq!(bits(&r1.x), bits(&r2.x));
    assert_eq!(bits(l1.y.as_ref().unwrap()), bits(l2.y.as_ref().unwrap()));
}

#[test]
fn cross_check_flips_one_epsilon_past_threshold() {
    let threshold = 0.5f32;
    let eps = 1e-3f32;
    let left = DisparityMap::from_x(ScalarField::new(4, 1, vec![1.0, 1.0, INVALID, INVALID]).unwrap());
    let right = DisparityMap::from_x(
        ScalarField::new(4, 1, vec![INVALID, -1.0 - threshold + eps, -1.0 - threshold - eps, INVALID])
            .unwrap(),
    );
    let params = CrossCheckParams::new(threshold, true, false);
    let (l, r) = cross_check(&left, &right, &params).unwrap();
    assert!(l.x.is_valid_at(0, 0));
    assert!(!l.x.is_valid_at(1, 0));
    // symmetric on the right side: -1.499 rounds back onto the left pixel
    assert!(r.x.is_valid_at(1, 0));
    assert!(!r.x.is_valid_at(2, 0));
}

#[test]
fn three_of_five_consensus() {
    let v = 4.0;
    let field = |x: f32| DisparityMap::from_x(ScalarField::filled(2, 2, x));
    let inputs = [field(v), field(10.0), field(v), field(-3.0), field(v)];
    let three = merge_projectors(
        &inputs,
        &MergeParams {
            min_group: 3,
            max_diff: 1.0,
        },
    )
    .unwrap();
    assert!(three.x.data.iter().all(|&d| d == v));
    let four = merge_projectors(
        &inputs,
        &MergeParams {
            min_group: 4,
            max_diff: 1.0,
        },
    )
    .unwrap();
    assert!(four.x.is_all_invalid());
}

#[test]
fn all_invalid_inputs_stay_invalid_through_every_stage() {
    let (w, h) = (12, 9);
    let dead_codes = CodeMap::new(ScalarField::invalid(w, h), ScalarField::invalid(w, h)).unwrap();
    let raw = compute_disparities(&dead_codes, &dead_codes, &rectified_match()).unwrap();
    assert!(raw.left.x.is_all_invalid());

    let dead = DisparityMap::invalid(w, h, true);
    let (l, r) = cross_check(&dead, &dead, &CrossCheckParams::new(1.0, true, true)).unwrap();
    assert!(l.x.is_all_invalid() && r.x.is_all_invalid());

    let filtered = filter_disparities(&dead, &FilterParams::default());
    assert!(filtered.x.is_all_invalid());

    let merged = merge_projectors(&[dead.clone(), dead.clone()], &MergeParams::default()).unwrap();
    assert!(merged.x.is_all_invalid());

    let second = merge_second_stage(
        &dead.x,
        &[dead.x.clone()],
        &[dead.x.clone()],
        &SecondStageParams::default(),
    )
    .unwrap();
    assert!(second.merged.is_all_invalid());

    let (left, right) = shifted_codes(w, h, 2);
    let rep = reproject(&dead, &left, &right, &ReprojectParams::default()).unwrap();
    assert!(rep.disparity.x.is_all_invalid());
    assert!(rep.error.is_all_invalid());
}

#[test]
fn unrectified_matching_uses_codes_only() {
    let (left, right) = shifted_codes(10, 4, 7);
    let raw = compute_disparities(&left, &right, &MatchParams::default()).unwrap();
    // offsets far beyond any rectified window are still found
    assert_eq!(raw.right.x.get(0, 2), 7.0);
    assert_eq!(raw.left.x.get(9, 2), -7.0);
    assert!(is_valid(raw.left.y.as_ref().unwrap().get(9, 2)));
}
