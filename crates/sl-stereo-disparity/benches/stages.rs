use criterion::{black_box, criterion_group, criterion_main, Criterion};
use sl_stereo_core::{CodeMap, ScalarField};
use sl_stereo_disparity::{
    compute_disparities, cross_check, filter_disparities, merge_projectors, CrossCheckParams,
    DisparityMode, FilterParams, MatchParams, MergeParams, SearchWindow,
};

const W: usize = 320;
const H: usize = 240;

fn codes(shift: f32) -> CodeMap {
    // slanted plane with a little row-dependent parallax
    let u = ScalarField::from_fn(W, H, |x, y| x as f32 + shift + 0.01 * y as f32);
    let v = ScalarField::from_fn(W, H, |_, y| y as f32);
    CodeMap { u, v }
}

fn bench_stages(c: &mut Criterion) {
    let left = codes(0.0);
    let right = codes(12.3);
    let params = MatchParams {
        window: SearchWindow::for_mode(DisparityMode::Rectified, 1080, 1.0),
        ..MatchParams::default()
    };

    c.bench_function("compute_disparities_320x240", |b| {
        b.iter(|| compute_disparities(black_box(&left), black_box(&right), &params))
    });

    let raw = match compute_disparities(&left, &right, &params) {
        Ok(raw) => raw,
        Err(e) => panic!("matching failed: {e}"),
    };
    let check = CrossCheckParams::new(0.5, false, false);
    c.bench_function("cross_check_320x240", |b| {
        b.iter(|| cross_check(black_box(&raw.left), black_box(&raw.right), &check))
    });

    let filter = FilterParams {
        y_threshold: Some(1.0),
        ..FilterParams::default()
    };
    c.bench_function("filter_320x240", |b| {
        b.iter(|| filter_disparities(black_box(&raw.left), &filter))
    });

    let inputs = vec![raw.left.clone(); 5];
    c.bench_function("merge_5_projectors_320x240", |b| {
        b.iter(|| merge_projectors(black_box(&inputs), &MergeParams::default()))
    });
}

criterion_group!(benches, bench_stages);
criterion_main!(benches);
