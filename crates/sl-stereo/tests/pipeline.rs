//! End-to-end runs over a synthetic two-projector scene on disk.
//!
//! Rows are grouped in bands of five; each band is a fronto-parallel slab at
//! a different depth, so the left-view disparity is `-6, -8, -10, -12` from
//! top to bottom. The projector sits halfway between the cameras: both views
//! see code `u = x + d/2` with their own disparity `d`, and `v = y`.

use approx::assert_relative_eq;
use sl_stereo::core::{is_valid, ScalarField};
use sl_stereo::disparity::DisparityMode;
use sl_stereo::{
    Axis, CodeAxis, DisparityStage, Merged2Stage, MergedStage, Pipeline, PipelineConfig,
    PositionId, ProjectorId, ReprojectedStage, SceneStore, Side, StereoPair,
};
use std::path::Path;

const W: usize = 48;
const H: usize = 20;

fn left_disparity(y: usize) -> f32 {
    -6.0 - 2.0 * (y / 5) as f32
}

fn pair() -> StereoPair {
    StereoPair::new(0, 1)
}

/// Projector `proj` shifts its codes so projectors never share values.
fn codes(proj: u32, side: Side, axis: CodeAxis) -> ScalarField {
    let offset = 100.0 * proj as f32;
    ScalarField::from_fn(W, H, |x, y| {
        let d = match side {
            Side::Left => left_disparity(y),
            Side::Right => -left_disparity(y),
        };
        match axis {
            CodeAxis::U => x as f32 + d / 2.0 + offset,
            CodeAxis::V => y as f32 + offset,
        }
    })
}

fn write_scene(root: &Path) -> SceneStore {
    let store = SceneStore::new(root);
    for proj in [0, 1] {
        for side in Side::BOTH {
            for axis in CodeAxis::BOTH {
                let path =
                    store.unrectified_code_path(ProjectorId(proj), pair().position(side), axis);
                store.save_field(&path, &codes(proj, side, axis)).unwrap();
            }
        }
    }
    for side in Side::BOTH {
        let map_x = ScalarField::from_fn(W, H, |x, _| x as f32);
        let map_y = ScalarField::from_fn(W, H, |_, y| y as f32);
        store
            .save_field(&store.rectification_map_path(pair(), side, Axis::X), &map_x)
            .unwrap();
        store
            .save_field(&store.rectification_map_path(pair(), side, Axis::Y), &map_y)
            .unwrap();
    }
    store
}

#[test]
fn rectified_run_produces_every_product() {
    let dir = tempfile::tempdir().unwrap();
    let store = write_scene(dir.path());
    let pipeline = Pipeline::new(store.clone(), PipelineConfig::default());

    let summary = pipeline.run_all(DisparityMode::Rectified);
    // 2 rectify + 2 disparity + 1 merge + 2 reproject + 1 merge2
    assert_eq!(summary.completed, 8, "{summary}");
    assert_eq!(summary.skipped, 0);
    assert_eq!(summary.failed, 0);

    let mode = DisparityMode::Rectified;
    for proj in [ProjectorId(0), ProjectorId(1)] {
        for stage in [
            DisparityStage::Initial,
            DisparityStage::CrossChecked,
            DisparityStage::Filtered,
            DisparityStage::Final,
        ] {
            for axis in [Axis::X, Axis::Y] {
                assert!(store
                    .disparity_path(mode, proj, pair(), Side::Right, axis, stage)
                    .exists());
            }
        }
        for side in Side::BOTH {
            assert!(store.error_path(proj, pair(), side).exists());
            assert!(store.matrix_path(proj, pair(), side).exists());
            assert!(store.log_path(proj, pair(), side).exists());
        }
    }

    let merged = store
        .load_field(&store.merged_path(mode, pair(), Side::Left, Axis::X, MergedStage::CrossChecked))
        .unwrap();
    assert_eq!(merged.get(30, 2), -6.0);
    assert!(!merged.is_valid_at(3, 2));

    let final_left = store
        .load_field(&store.merged2_path(pair(), Side::Left, Merged2Stage::Final))
        .unwrap();
    assert_relative_eq!(final_left.get(30, 2), -6.0, epsilon = 1e-3);
    assert_relative_eq!(final_left.get(40, 17), -12.0, epsilon = 1e-3);

    let final_right = store
        .load_field(&store.merged2_path(pair(), Side::Right, Merged2Stage::Final))
        .unwrap();
    assert_relative_eq!(final_right.get(10, 17), 12.0, epsilon = 1e-3);
    assert!(!final_right.is_valid_at(40, 17));

    // two direct and two reprojected samples agree with the anchor
    let samples = store
        .load_field(&store.merged2_samples_path(pair(), Side::Left))
        .unwrap();
    assert_eq!(samples.get(30, 2), 4.0);
}

#[test]
fn reprojections_of_a_consistent_scene_are_reliable() {
    let dir = tempfile::tempdir().unwrap();
    let store = write_scene(dir.path());
    let pipeline = Pipeline::new(store.clone(), PipelineConfig::default());
    let summary = pipeline.run_all(DisparityMode::Rectified);
    assert!(summary.is_success(), "{summary}");

    let report = pipeline.reliability_report(pair());
    assert_eq!(report.len(), 4);
    assert!(report.iter().all(|e| e.reliable), "{report:?}");

    let reprojected = store
        .load_field(&store.reprojected_path(
            ProjectorId(1),
            pair(),
            Side::Left,
            Axis::X,
            ReprojectedStage::Filtered,
        ))
        .unwrap();
    assert_relative_eq!(reprojected.get(20, 7), -8.0, epsilon = 1e-3);
}

#[test]
fn unrectified_run_matches_on_codes_alone() {
    let dir = tempfile::tempdir().unwrap();
    let store = write_scene(dir.path());
    let pipeline = Pipeline::new(store.clone(), PipelineConfig::default());

    let summary = pipeline.run_all(DisparityMode::Unrectified);
    // 2 disparity + 1 merge
    assert_eq!(summary.completed, 3, "{summary}");
    assert!(!store
        .disparity_path(
            DisparityMode::Unrectified,
            ProjectorId(0),
            pair(),
            Side::Left,
            Axis::X,
            DisparityStage::Filtered
        )
        .exists());

    let mode = DisparityMode::Unrectified;
    let merged_x = store
        .load_field(&store.merged_path(mode, pair(), Side::Left, Axis::X, MergedStage::Initial))
        .unwrap();
    let merged_y = store
        .load_field(&store.merged_path(mode, pair(), Side::Left, Axis::Y, MergedStage::Initial))
        .unwrap();
    assert_eq!(merged_x.get(30, 12), -10.0);
    assert_eq!(merged_y.get(30, 12), 0.0);
}

#[test]
fn missing_inputs_are_skipped_without_writing() {
    let dir = tempfile::tempdir().unwrap();
    let store = write_scene(dir.path());
    let pipeline = Pipeline::new(store.clone(), PipelineConfig::default());

    // position 7 was never captured
    let lonely = StereoPair::new(0, 7);
    let summary =
        pipeline.run_disparity(&[ProjectorId(0)], &[lonely], DisparityMode::Unrectified);
    assert_eq!((summary.completed, summary.skipped, summary.failed), (0, 1, 0));
    assert!(!store
        .disparity_dir(DisparityMode::Unrectified, ProjectorId(0), PositionId(0))
        .exists());

    // nothing merged yet for this pair
    let summary = pipeline.run_merge2(&[pair()]);
    assert_eq!(summary.skipped, 1);
    let err = pipeline.merge(pair(), DisparityMode::Rectified).unwrap_err();
    assert!(err.is_missing_input(), "{err}");
}

#[test]
fn rectify_writes_pair_specific_decodes() {
    let dir = tempfile::tempdir().unwrap();
    let store = write_scene(dir.path());
    let pipeline = Pipeline::new(store.clone(), PipelineConfig::default());
    pipeline.rectify_decoded(ProjectorId(1), pair()).unwrap();

    let u = store
        .load_field(&store.rectified_code_path(ProjectorId(1), pair(), Side::Right, CodeAxis::U))
        .unwrap();
    assert_eq!(u, codes(1, Side::Right, CodeAxis::U));
    assert!(u.data.iter().all(|v| is_valid(*v)));
}
