//! On-disk layout of a scene's computed products.
//!
//! ```text
//! <root>/computed/decoded/<mode>/proj<P>/pos<N>/result<N><u|v>-2holefilled.pfm
//! <root>/computed/decoded/rectified/proj<P>/pos<N>/result<L><R><u|v>-0rectified.pfm
//! <root>/computed/disparity/<mode>/proj<P>/pos<N>/disp<L><R><x|y>-<stage>.pfm
//! <root>/computed/merged/<mode>/pos<N>/disp<L><R><x|y>-<stage>.pfm
//! <root>/computed/reprojected/proj<P>/pos<N>/{disp..., error<L><R>.pfm, mat<L><R>.txt, log<L><R>.txt}
//! <root>/computed/merged2/pos<N>/disp<L><R>x-{<stage>,sd,nsamples}.pfm
//! <root>/computed/calibration/rectification/maps<L><R>/<left|right><x|y>.pfm
//! ```
//!
//! Stage suffix strings exist only in this module.

use crate::PipelineError;
use sl_stereo_core::{
    read_pfm, write_atomic, write_pfm, CodeMap, DisparityMap, PfmError, PositionId, ProjectorId,
    ScalarField, Side, StereoPair,
};
use sl_stereo_disparity::{DisparityMode, StageError};
use std::collections::BTreeSet;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Axis {
    X,
    Y,
}

impl Axis {
    fn tag(self) -> char {
        match self {
            Axis::X => 'x',
            Axis::Y => 'y',
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CodeAxis {
    U,
    V,
}

impl CodeAxis {
    pub const BOTH: [CodeAxis; 2] = [CodeAxis::U, CodeAxis::V];

    fn tag(self) -> char {
        match self {
            CodeAxis::U => 'u',
            CodeAxis::V => 'v',
        }
    }
}

/// Per-projector disparity products.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DisparityStage {
    Initial,
    CrossChecked,
    Filtered,
    Final,
}

/// Cross-projector merge products.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MergedStage {
    Initial,
    CrossChecked,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReprojectedStage {
    Initial,
    Filtered,
}

/// Second-stage merge products, in pipeline order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Merged2Stage {
    Initial,
    Filtered,
    CrossChecked,
    Refiltered,
    Final,
}

trait StageSuffix: Copy {
    fn suffix(self) -> &'static str;
}

impl StageSuffix for DisparityStage {
    fn suffix(self) -> &'static str {
        match self {
            DisparityStage::Initial => "0initial",
            DisparityStage::CrossChecked => "1crosscheck1",
            DisparityStage::Filtered => "2filtered",
            DisparityStage::Final => "3crosscheck2",
        }
    }
}

impl StageSuffix for MergedStage {
    fn suffix(self) -> &'static str {
        match self {
            MergedStage::Initial => "0initial",
            MergedStage::CrossChecked => "1crosscheck",
        }
    }
}

impl StageSuffix for ReprojectedStage {
    fn suffix(self) -> &'static str {
        match self {
            ReprojectedStage::Initial => "0initial",
            ReprojectedStage::Filtered => "1filtered",
        }
    }
}

impl StageSuffix for Merged2Stage {
    fn suffix(self) -> &'static str {
        match self {
            Merged2Stage::Initial => "0initial",
            Merged2Stage::Filtered => "1filtered",
            Merged2Stage::CrossChecked => "2crosscheck1",
            Merged2Stage::Refiltered => "3filtered",
            Merged2Stage::Final => "4crosscheck2",
        }
    }
}

fn mode_dir(mode: DisparityMode) -> &'static str {
    if mode.is_rectified() {
        "rectified"
    } else {
        "unrectified"
    }
}

fn side_name(side: Side) -> &'static str {
    match side {
        Side::Left => "left",
        Side::Right => "right",
    }
}

fn disp_name(pair: StereoPair, axis: Axis, suffix: &str) -> String {
    format!("disp{}{}{}-{suffix}.pfm", pair.left, pair.right, axis.tag())
}

/// Numeric ids of the `<prefix><id>` entries of `dir`, sorted. A missing
/// directory has no entries.
fn ids_in(dir: &Path, prefix: &str) -> Vec<u32> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut ids: Vec<u32> = entries
        .filter_map(Result::ok)
        .filter(|e| e.path().is_dir())
        .filter_map(|e| {
            e.file_name()
                .to_str()
                .and_then(|name| name.strip_prefix(prefix))
                .and_then(|id| id.parse().ok())
        })
        .collect();
    ids.sort_unstable();
    ids.dedup();
    ids
}

fn read_error(path: &Path, source: PfmError) -> PipelineError {
    match source {
        PfmError::Io(e) if e.kind() == io::ErrorKind::NotFound => PipelineError::MissingInput {
            path: path.to_path_buf(),
        },
        source => PipelineError::Read {
            path: path.to_path_buf(),
            source,
        },
    }
}

fn write_error(path: &Path, source: io::Error) -> PipelineError {
    PipelineError::Write {
        path: path.to_path_buf(),
        source,
    }
}

/// Path builder and file access for one scene directory.
#[derive(Clone, Debug)]
pub struct SceneStore {
    root: PathBuf,
}

impl SceneStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn computed(&self) -> PathBuf {
        self.root.join("computed")
    }

    pub fn decoded_dir(&self, mode: DisparityMode, proj: ProjectorId, pos: PositionId) -> PathBuf {
        self.computed()
            .join("decoded")
            .join(mode_dir(mode))
            .join(format!("proj{proj}"))
            .join(format!("pos{pos}"))
    }

    pub fn disparity_dir(&self, mode: DisparityMode, proj: ProjectorId, pos: PositionId) -> PathBuf {
        self.computed()
            .join("disparity")
            .join(mode_dir(mode))
            .join(format!("proj{proj}"))
            .join(format!("pos{pos}"))
    }

    pub fn merged_dir(&self, mode: DisparityMode, pos: PositionId) -> PathBuf {
        self.computed()
            .join("merged")
            .join(mode_dir(mode))
            .join(format!("pos{pos}"))
    }

    pub fn reprojected_dir(&self, proj: ProjectorId, pos: PositionId) -> PathBuf {
        self.computed()
            .join("reprojected")
            .join(format!("proj{proj}"))
            .join(format!("pos{pos}"))
    }

    pub fn merged2_dir(&self, pos: PositionId) -> PathBuf {
        self.computed().join("merged2").join(format!("pos{pos}"))
    }

    /// Hole-filled decode of a single position, before rectification.
    pub fn unrectified_code_path(&self, proj: ProjectorId, pos: PositionId, axis: CodeAxis) -> PathBuf {
        self.decoded_dir(DisparityMode::Unrectified, proj, pos)
            .join(format!("result{pos}{}-2holefilled.pfm", axis.tag()))
    }

    /// Decode of one side of `pair` warped into the pair's rectified frame.
    pub fn rectified_code_path(
        &self,
        proj: ProjectorId,
        pair: StereoPair,
        side: Side,
        axis: CodeAxis,
    ) -> PathBuf {
        self.decoded_dir(DisparityMode::Rectified, proj, pair.position(side))
            .join(format!(
                "result{}{}{}-0rectified.pfm",
                pair.left,
                pair.right,
                axis.tag()
            ))
    }

    /// Code file a disparity run in `mode` reads for one side of `pair`.
    pub fn code_path(
        &self,
        mode: DisparityMode,
        proj: ProjectorId,
        pair: StereoPair,
        side: Side,
        axis: CodeAxis,
    ) -> PathBuf {
        match mode {
            DisparityMode::Rectified => self.rectified_code_path(proj, pair, side, axis),
            DisparityMode::Unrectified => {
                self.unrectified_code_path(proj, pair.position(side), axis)
            }
        }
    }

    pub fn disparity_path(
        &self,
        mode: DisparityMode,
        proj: ProjectorId,
        pair: StereoPair,
        side: Side,
        axis: Axis,
        stage: DisparityStage,
    ) -> PathBuf {
        self.disparity_dir(mode, proj, pair.position(side))
            .join(disp_name(pair, axis, stage.suffix()))
    }

    pub fn merged_path(
        &self,
        mode: DisparityMode,
        pair: StereoPair,
        side: Side,
        axis: Axis,
        stage: MergedStage,
    ) -> PathBuf {
        self.merged_dir(mode, pair.position(side))
            .join(disp_name(pair, axis, stage.suffix()))
    }

    pub fn reprojected_path(
        &self,
        proj: ProjectorId,
        pair: StereoPair,
        side: Side,
        axis: Axis,
        stage: ReprojectedStage,
    ) -> PathBuf {
        self.reprojected_dir(proj, pair.position(side))
            .join(disp_name(pair, axis, stage.suffix()))
    }

    pub fn error_path(&self, proj: ProjectorId, pair: StereoPair, side: Side) -> PathBuf {
        self.reprojected_dir(proj, pair.position(side))
            .join(format!("error{}{}.pfm", pair.left, pair.right))
    }

    pub fn matrix_path(&self, proj: ProjectorId, pair: StereoPair, side: Side) -> PathBuf {
        self.reprojected_dir(proj, pair.position(side))
            .join(format!("mat{}{}.txt", pair.left, pair.right))
    }

    pub fn log_path(&self, proj: ProjectorId, pair: StereoPair, side: Side) -> PathBuf {
        self.reprojected_dir(proj, pair.position(side))
            .join(format!("log{}{}.txt", pair.left, pair.right))
    }

    pub fn merged2_path(&self, pair: StereoPair, side: Side, stage: Merged2Stage) -> PathBuf {
        self.merged2_dir(pair.position(side))
            .join(disp_name(pair, Axis::X, stage.suffix()))
    }

    pub fn merged2_std_dev_path(&self, pair: StereoPair, side: Side) -> PathBuf {
        self.merged2_dir(pair.position(side))
            .join(disp_name(pair, Axis::X, "sd"))
    }

    pub fn merged2_samples_path(&self, pair: StereoPair, side: Side) -> PathBuf {
        self.merged2_dir(pair.position(side))
            .join(disp_name(pair, Axis::X, "nsamples"))
    }

    /// Lookup map (source coordinate per rectified pixel) of one side.
    pub fn rectification_map_path(&self, pair: StereoPair, side: Side, axis: Axis) -> PathBuf {
        self.computed()
            .join("calibration")
            .join("rectification")
            .join(format!("maps{}{}", pair.left, pair.right))
            .join(format!("{}{}.pfm", side_name(side), axis.tag()))
    }

    // ---- discovery -------------------------------------------------------

    pub fn decoded_projectors(&self, mode: DisparityMode) -> Vec<ProjectorId> {
        let dir = self.computed().join("decoded").join(mode_dir(mode));
        ids_in(&dir, "proj").into_iter().map(ProjectorId).collect()
    }

    pub fn disparity_projectors(&self, mode: DisparityMode) -> Vec<ProjectorId> {
        let dir = self.computed().join("disparity").join(mode_dir(mode));
        ids_in(&dir, "proj").into_iter().map(ProjectorId).collect()
    }

    pub fn reprojected_projectors(&self) -> Vec<ProjectorId> {
        let dir = self.computed().join("reprojected");
        ids_in(&dir, "proj").into_iter().map(ProjectorId).collect()
    }

    pub fn decoded_positions(&self, mode: DisparityMode, proj: ProjectorId) -> Vec<PositionId> {
        let dir = self
            .computed()
            .join("decoded")
            .join(mode_dir(mode))
            .join(format!("proj{proj}"));
        ids_in(&dir, "pos").into_iter().map(PositionId).collect()
    }

    /// Adjacent position pairs over every position with decoded data, in
    /// either mode and for any projector.
    pub fn pairs(&self) -> Vec<StereoPair> {
        let mut positions = BTreeSet::new();
        for mode in [DisparityMode::Unrectified, DisparityMode::Rectified] {
            for proj in self.decoded_projectors(mode) {
                positions.extend(self.decoded_positions(mode, proj));
            }
        }
        let positions: Vec<PositionId> = positions.into_iter().collect();
        StereoPair::adjacent(&positions)
    }

    // ---- file access -----------------------------------------------------

    pub fn load_field(&self, path: &Path) -> Result<ScalarField, PipelineError> {
        read_pfm(path).map_err(|e| read_error(path, e))
    }

    pub fn save_field(&self, path: &Path, field: &ScalarField) -> Result<(), PipelineError> {
        write_pfm(path, field).map_err(|e| write_error(path, e))
    }

    pub fn load_codes(&self, path: impl Fn(CodeAxis) -> PathBuf) -> Result<CodeMap, PipelineError> {
        let u = self.load_field(&path(CodeAxis::U))?;
        let v = self.load_field(&path(CodeAxis::V))?;
        Ok(CodeMap::new(u, v).map_err(StageError::from)?)
    }

    pub fn save_codes(
        &self,
        path: impl Fn(CodeAxis) -> PathBuf,
        codes: &CodeMap,
    ) -> Result<(), PipelineError> {
        self.save_field(&path(CodeAxis::U), &codes.u)?;
        self.save_field(&path(CodeAxis::V), &codes.v)
    }

    /// Load a disparity map; the y component is read only when `with_y`.
    pub fn load_disparity(
        &self,
        path: impl Fn(Axis) -> PathBuf,
        with_y: bool,
    ) -> Result<DisparityMap, PipelineError> {
        let x = self.load_field(&path(Axis::X))?;
        let y = if with_y {
            Some(self.load_field(&path(Axis::Y))?)
        } else {
            None
        };
        Ok(DisparityMap::new(x, y).map_err(StageError::from)?)
    }

    /// Save both components present in `map`.
    pub fn save_disparity(
        &self,
        path: impl Fn(Axis) -> PathBuf,
        map: &DisparityMap,
    ) -> Result<(), PipelineError> {
        self.save_field(&path(Axis::X), &map.x)?;
        if let Some(y) = &map.y {
            self.save_field(&path(Axis::Y), y)?;
        }
        Ok(())
    }

    pub fn load_text(&self, path: &Path) -> Result<String, PipelineError> {
        fs::read_to_string(path).map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                PipelineError::MissingInput {
                    path: path.to_path_buf(),
                }
            } else {
                PipelineError::ReadText {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })
    }

    pub fn save_text(&self, path: &Path, text: &str) -> Result<(), PipelineError> {
        write_atomic(path, |w: &mut dyn Write| w.write_all(text.as_bytes()))
            .map_err(|e| write_error(path, e))
    }

    /// All `.pfm` files directly inside `dir`, sorted.
    pub fn pfm_files(&self, dir: &Path) -> Result<Vec<PathBuf>, PipelineError> {
        let entries = fs::read_dir(dir).map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                PipelineError::MissingInput {
                    path: dir.to_path_buf(),
                }
            } else {
                PipelineError::ReadText {
                    path: dir.to_path_buf(),
                    source,
                }
            }
        })?;
        let mut files: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "pfm"))
            .collect();
        files.sort();
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> StereoPair {
        StereoPair::new(1, 2)
    }

    #[test]
    fn paths_follow_the_scene_layout() {
        let store = SceneStore::new("/scene");
        let p = ProjectorId(3);
        assert_eq!(
            store.disparity_path(
                DisparityMode::Rectified,
                p,
                pair(),
                Side::Right,
                Axis::Y,
                DisparityStage::Final
            ),
            Path::new("/scene/computed/disparity/rectified/proj3/pos2/disp12y-3crosscheck2.pfm")
        );
        assert_eq!(
            store.merged_path(
                DisparityMode::Unrectified,
                pair(),
                Side::Left,
                Axis::X,
                MergedStage::Initial
            ),
            Path::new("/scene/computed/merged/unrectified/pos1/disp12x-0initial.pfm")
        );
        assert_eq!(
            store.code_path(DisparityMode::Unrectified, p, pair(), Side::Right, CodeAxis::V),
            Path::new("/scene/computed/decoded/unrectified/proj3/pos2/result2v-2holefilled.pfm")
        );
        assert_eq!(
            store.code_path(DisparityMode::Rectified, p, pair(), Side::Left, CodeAxis::U),
            Path::new("/scene/computed/decoded/rectified/proj3/pos1/result12u-0rectified.pfm")
        );
        assert_eq!(
            store.merged2_samples_path(pair(), Side::Left),
            Path::new("/scene/computed/merged2/pos1/disp12x-nsamples.pfm")
        );
        assert_eq!(
            store.log_path(p, pair(), Side::Left),
            Path::new("/scene/computed/reprojected/proj3/pos1/log12.txt")
        );
        assert_eq!(
            store.rectification_map_path(pair(), Side::Right, Axis::X),
            Path::new("/scene/computed/calibration/rectification/maps12/rightx.pfm")
        );
    }

    #[test]
    fn missing_files_are_reported_as_missing_input() {
        let dir = tempfile::tempdir().unwrap();
        let store = SceneStore::new(dir.path());
        let err = store.load_field(&dir.path().join("nope.pfm")).unwrap_err();
        assert!(err.is_missing_input());
        let err = store.load_text(&dir.path().join("nope.txt")).unwrap_err();
        assert!(err.is_missing_input());
    }

    #[test]
    fn discovers_projectors_and_adjacent_pairs() {
        let dir = tempfile::tempdir().unwrap();
        let store = SceneStore::new(dir.path());
        let field = ScalarField::filled(2, 2, 1.0);
        for (proj, pos) in [(0, 0), (0, 1), (4, 2), (4, 1)] {
            let path = store.unrectified_code_path(ProjectorId(proj), PositionId(pos), CodeAxis::U);
            store.save_field(&path, &field).unwrap();
        }
        fs::create_dir_all(dir.path().join("computed/decoded/unrectified/notes")).unwrap();

        assert_eq!(
            store.decoded_projectors(DisparityMode::Unrectified),
            vec![ProjectorId(0), ProjectorId(4)]
        );
        assert!(store.decoded_projectors(DisparityMode::Rectified).is_empty());
        assert_eq!(store.pairs(), vec![StereoPair::new(0, 1), StereoPair::new(1, 2)]);
    }

    #[test]
    fn disparity_without_y_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = SceneStore::new(dir.path());
        let map = DisparityMap::from_x(ScalarField::from_fn(3, 2, |x, _| x as f32));
        let path = |axis| {
            store.reprojected_path(ProjectorId(0), pair(), Side::Left, axis, ReprojectedStage::Filtered)
        };
        store.save_disparity(path, &map).unwrap();
        assert!(!path(Axis::Y).exists());
        assert_eq!(store.load_disparity(path, false).unwrap(), map);
        assert!(store.load_disparity(path, true).unwrap_err().is_missing_input());
    }
}
