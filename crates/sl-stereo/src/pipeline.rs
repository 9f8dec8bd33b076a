//! Orchestration of the reconstruction stages over a scene directory.
//!
//! Every unit of work (one projector and stereo pair, or one pair) loads its
//! inputs, runs its stage sequence in memory and only then writes its
//! products. The batch drivers run many units, log and skip the ones that
//! fail and keep going.

use crate::config::PipelineConfig;
use crate::storage::{
    Axis, DisparityStage, Merged2Stage, MergedStage, ReprojectedStage, SceneStore,
};
use crate::PipelineError;
use log::{debug, error, info, warn};
use sl_stereo_core::{
    CodeMap, DisparityMap, FieldTransform, PositionId, ProjectiveModel, ProjectorId, Rectifier,
    RemapRectifier, ScalarField, Side, StereoPair,
};
use sl_stereo_disparity::{
    compute_disparities, cross_check, filter_disparities, merge_projectors, merge_second_stage,
    DisparityMode, ReliabilityRecord, ReprojectionStats, SecondStageMerge,
};
use std::fmt;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Outcome counts of a batch run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub completed: usize,
    /// Units skipped because an input was not there.
    pub skipped: usize,
    pub failed: usize,
}

impl RunSummary {
    fn record<T>(&mut self, unit: &str, result: Result<T, PipelineError>) {
        match result {
            Ok(_) => {
                self.completed += 1;
                info!("{unit}: done");
            }
            Err(e) if e.is_missing_input() => {
                self.skipped += 1;
                warn!("{unit}: skipped, {e}");
            }
            Err(e) => {
                self.failed += 1;
                error!("{unit}: {e}");
            }
        }
    }

    pub fn absorb(&mut self, other: RunSummary) {
        self.completed += other.completed;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} completed, {} skipped, {} failed",
            self.completed, self.skipped, self.failed
        )
    }
}

/// Reliability of one reprojection, as read back from its log.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ReliabilityEntry {
    pub projector: ProjectorId,
    pub side: Side,
    /// `None` when the log is missing or malformed.
    pub record: Option<ReliabilityRecord>,
    pub reliable: bool,
}

/// Reliable projectors of one view, in report order.
fn reliable_on(report: &[ReliabilityEntry], side: Side) -> Vec<ProjectorId> {
    report
        .iter()
        .filter(|e| e.side == side && e.reliable)
        .map(|e| e.projector)
        .collect()
}

fn matrix_text(model: &ProjectiveModel) -> String {
    let mut text = String::new();
    for row in model.to_rows() {
        let cols: Vec<String> = row.iter().map(|v| v.to_string()).collect();
        text.push_str(&cols.join(" "));
        text.push('\n');
    }
    text
}

/// Stage sequences bound to one scene and one configuration.
#[derive(Clone, Debug)]
pub struct Pipeline {
    store: SceneStore,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(store: SceneStore, config: PipelineConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &SceneStore {
        &self.store
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Per-projector product the cross-projector merge consumes.
    pub fn final_disparity_stage(mode: DisparityMode) -> DisparityStage {
        if mode.is_rectified() {
            DisparityStage::Final
        } else {
            DisparityStage::CrossChecked
        }
    }

    /// Load one value per projector, leaving out projectors whose input is
    /// missing.
    fn load_each<T>(
        &self,
        projectors: &[ProjectorId],
        load: impl Fn(ProjectorId) -> Result<T, PipelineError>,
    ) -> Result<Vec<T>, PipelineError> {
        let mut out = Vec::with_capacity(projectors.len());
        for &proj in projectors {
            match load(proj) {
                Ok(v) => out.push(v),
                Err(e) if e.is_missing_input() => debug!("projector {proj} left out: {e}"),
                Err(e) => return Err(e),
            }
        }
        Ok(out)
    }

    // ---- rectification ---------------------------------------------------

    /// Lookup-map rectifier of one side of `pair`, built from the maps in
    /// the calibration directory.
    pub fn rectifier(&self, pair: StereoPair, side: Side) -> Result<RemapRectifier, PipelineError> {
        let store = &self.store;
        let map_x = store.load_field(&store.rectification_map_path(pair, side, Axis::X))?;
        let map_y = store.load_field(&store.rectification_map_path(pair, side, Axis::Y))?;
        Ok(RemapRectifier::new(map_x, map_y, self.config.rectify.remap)?)
    }

    /// Warp the unrectified decodes of both positions of `pair` into the
    /// pair's rectified frame using the stored lookup maps.
    #[cfg_attr(feature = "tracing", instrument(level = "info", skip(self)))]
    pub fn rectify_decoded(&self, proj: ProjectorId, pair: StereoPair) -> Result<(), PipelineError> {
        let left = self.rectifier(pair, Side::Left)?;
        let right = self.rectifier(pair, Side::Right)?;
        self.rectify_decoded_with(proj, pair, &left, &right)
    }

    /// Same as [`Pipeline::rectify_decoded`] with caller-provided rectifiers.
    #[cfg_attr(feature = "tracing", instrument(level = "info", skip_all))]
    pub fn rectify_decoded_with(
        &self,
        proj: ProjectorId,
        pair: StereoPair,
        left: &dyn Rectifier,
        right: &dyn Rectifier,
    ) -> Result<(), PipelineError> {
        let store = &self.store;
        let mut rectified: Vec<(Side, CodeMap)> = Vec::with_capacity(2);
        for (side, rectifier) in [(Side::Left, left), (Side::Right, right)] {
            let pos = pair.position(side);
            let codes = store.load_codes(|a| store.unrectified_code_path(proj, pos, a))?;
            rectified.push((side, rectifier.rectify_codes(&codes)));
        }
        for (side, codes) in &rectified {
            store.save_codes(|a| store.rectified_code_path(proj, pair, *side, a), codes)?;
        }
        info!("rectified decodes of projector {proj}, pair {pair}");
        Ok(())
    }

    // ---- per-projector disparity -----------------------------------------

    /// Match, cross-check and (rectified only) filter and re-check the
    /// disparities of one projector and pair.
    #[cfg_attr(feature = "tracing", instrument(level = "info", skip(self)))]
    pub fn disparity(
        &self,
        proj: ProjectorId,
        pair: StereoPair,
        mode: DisparityMode,
    ) -> Result<(), PipelineError> {
        let store = &self.store;
        let cfg = &self.config;
        let left = store.load_codes(|a| store.code_path(mode, proj, pair, Side::Left, a))?;
        let right = store.load_codes(|a| store.code_path(mode, proj, pair, Side::Right, a))?;

        let raw = compute_disparities(&left, &right, &cfg.match_params(mode))?;
        let (l1, r1) = cross_check(&raw.left, &raw.right, &cfg.disparity.first_check)?;
        let mut products = vec![(DisparityStage::Initial, raw.left, raw.right)];
        if mode.is_rectified() {
            let filter = cfg.disparity_filter();
            let l2 = filter_disparities(&l1, &filter);
            let r2 = filter_disparities(&r1, &filter);
            let (l3, r3) = cross_check(&l2, &r2, &cfg.disparity.final_check)?;
            products.push((DisparityStage::CrossChecked, l1, r1));
            products.push((DisparityStage::Filtered, l2, r2));
            products.push((DisparityStage::Final, l3, r3));
        } else {
            products.push((DisparityStage::CrossChecked, l1, r1));
        }

        for (stage, l, r) in &products {
            store.save_disparity(
                |a| store.disparity_path(mode, proj, pair, Side::Left, a, *stage),
                l,
            )?;
            store.save_disparity(
                |a| store.disparity_path(mode, proj, pair, Side::Right, a, *stage),
                r,
            )?;
        }
        if let Some((_, l, r)) = products.last() {
            info!(
                "disparity projector {proj}, pair {pair}: {} left / {} right valid",
                l.valid_count(),
                r.valid_count()
            );
        }
        Ok(())
    }

    // ---- cross-projector merge -------------------------------------------

    /// Merge the final per-projector disparities of every projector for
    /// both views of `pair`; rectified merges are cross-checked as well.
    #[cfg_attr(feature = "tracing", instrument(level = "info", skip(self)))]
    pub fn merge(&self, pair: StereoPair, mode: DisparityMode) -> Result<(), PipelineError> {
        let store = &self.store;
        let cfg = &self.config.merge;
        let stage = Self::final_disparity_stage(mode);
        let projectors = store.disparity_projectors(mode);

        let merge_side = |side: Side| -> Result<DisparityMap, PipelineError> {
            let inputs = self.load_each(&projectors, |p| {
                store.load_disparity(|a| store.disparity_path(mode, p, pair, side, a, stage), true)
            })?;
            debug!("merging {} projectors for {side:?} of {pair}", inputs.len());
            Ok(merge_projectors(&inputs, &cfg.merge)?)
        };
        let left = merge_side(Side::Left)?;
        let right = merge_side(Side::Right)?;
        let checked = if mode.is_rectified() {
            Some(cross_check(&left, &right, &cfg.check)?)
        } else {
            None
        };

        let save = |side: Side, stage: MergedStage, map: &DisparityMap| {
            store.save_disparity(|a| store.merged_path(mode, pair, side, a, stage), map)
        };
        save(Side::Left, MergedStage::Initial, &left)?;
        save(Side::Right, MergedStage::Initial, &right)?;
        if let Some((l, r)) = &checked {
            save(Side::Left, MergedStage::CrossChecked, l)?;
            save(Side::Right, MergedStage::CrossChecked, r)?;
        }
        info!("merged {} projectors for pair {pair}", projectors.len());
        Ok(())
    }

    // ---- reprojection ----------------------------------------------------

    /// Reproject the decoded codes of one projector through the merged,
    /// cross-checked disparity of each view of `pair`.
    #[cfg_attr(feature = "tracing", instrument(level = "info", skip(self)))]
    pub fn reproject(
        &self,
        proj: ProjectorId,
        pair: StereoPair,
    ) -> Result<[ReprojectionStats; 2], PipelineError> {
        let store = &self.store;
        let cfg = &self.config.reproject;
        let mode = DisparityMode::Rectified;
        let left = store.load_codes(|a| store.code_path(mode, proj, pair, Side::Left, a))?;
        let right = store.load_codes(|a| store.code_path(mode, proj, pair, Side::Right, a))?;

        let mut outputs = Vec::with_capacity(2);
        for side in Side::BOTH {
            let disparity = store.load_disparity(
                |a| store.merged_path(mode, pair, side, a, MergedStage::CrossChecked),
                false,
            )?;
            let (this, other) = match side {
                Side::Left => (&left, &right),
                Side::Right => (&right, &left),
            };
            let rep = sl_stereo_disparity::reproject(&disparity, this, other, &cfg.reproject)?;
            let filtered =
                filter_disparities(&DisparityMap::from_x(rep.disparity.x.clone()), &cfg.filter);
            outputs.push((side, rep, filtered));
        }

        for (side, rep, filtered) in &outputs {
            let side = *side;
            store.save_disparity(
                |a| store.reprojected_path(proj, pair, side, a, ReprojectedStage::Initial),
                &rep.disparity,
            )?;
            store.save_disparity(
                |a| store.reprojected_path(proj, pair, side, a, ReprojectedStage::Filtered),
                filtered,
            )?;
            store.save_field(&store.error_path(proj, pair, side), &rep.error)?;
            if let Some(model) = &rep.model {
                store.save_text(&store.matrix_path(proj, pair, side), &matrix_text(model))?;
            }
            store.save_text(&store.log_path(proj, pair, side), &rep.stats.to_log_string())?;
            info!(
                "reprojected projector {proj} {side:?} of {pair}: {:.1}% direct, {:.1}% reprojected",
                rep.stats.direct.match_percent, rep.stats.reprojected.match_percent
            );
        }
        Ok([outputs[0].1.stats, outputs[1].1.stats])
    }

    // ---- reliability -----------------------------------------------------

    /// Read back the reliability statistics of one reprojection.
    pub fn reliability(
        &self,
        proj: ProjectorId,
        pair: StereoPair,
        side: Side,
    ) -> Result<ReliabilityRecord, PipelineError> {
        let path = self.store.log_path(proj, pair, side);
        let text = self.store.load_text(&path)?;
        let stats = ReprojectionStats::parse_log(&text)
            .map_err(|source| PipelineError::Log { path, source })?;
        Ok(ReliabilityRecord::from_stats(&stats))
    }

    /// Projectors whose reprojection for this view passes the reliability
    /// thresholds. Missing or malformed logs exclude the projector.
    pub fn reliable_projectors(&self, pair: StereoPair, side: Side) -> Vec<ProjectorId> {
        reliable_on(&self.reliability_report(pair), side)
    }

    /// Classify every reprojection of `pair`.
    pub fn reliability_report(&self, pair: StereoPair) -> Vec<ReliabilityEntry> {
        let thresholds = &self.config.merge2.reliability;
        let mut entries = Vec::new();
        for projector in self.store.reprojected_projectors() {
            for side in Side::BOTH {
                let record = match self.reliability(projector, pair, side) {
                    Ok(r) => Some(r),
                    Err(e) => {
                        warn!("projector {projector} {side:?} of {pair} excluded: {e}");
                        None
                    }
                };
                let reliable = record.is_some_and(|r| r.is_reliable(thresholds));
                if record.is_some() && !reliable {
                    debug!("projector {projector} {side:?} of {pair} is unreliable");
                }
                entries.push(ReliabilityEntry {
                    projector,
                    side,
                    record,
                    reliable,
                });
            }
        }
        entries
    }

    // ---- second-stage merge ----------------------------------------------

    fn merge2_side(
        &self,
        pair: StereoPair,
        side: Side,
        reliable: &[ProjectorId],
    ) -> Result<SecondStageMerge, PipelineError> {
        let store = &self.store;
        let mode = DisparityMode::Rectified;
        let anchor_path = store.merged_path(mode, pair, side, Axis::X, MergedStage::CrossChecked);
        let anchor = store.load_field(&anchor_path)?;
        let direct = self.load_each(&store.disparity_projectors(mode), |p| {
            store.load_field(&store.disparity_path(
                mode,
                p,
                pair,
                side,
                Axis::X,
                DisparityStage::Filtered,
            ))
        })?;
        let reprojected = self.load_each(reliable, |p| {
            let stage = ReprojectedStage::Filtered;
            store.load_field(&store.reprojected_path(p, pair, side, Axis::X, stage))
        })?;
        debug!(
            "second-stage merge of {side:?} of {pair}: {} direct, {} reprojected",
            direct.len(),
            reprojected.len()
        );
        Ok(merge_second_stage(
            &anchor,
            &direct,
            &reprojected,
            &self.config.merge2.merge,
        )?)
    }

    /// Combine the merged disparity with per-projector direct and reliable
    /// reprojected disparities, then filter and cross-check twice.
    #[cfg_attr(feature = "tracing", instrument(level = "info", skip(self)))]
    pub fn merge2(&self, pair: StereoPair) -> Result<(), PipelineError> {
        let store = &self.store;
        let cfg = &self.config.merge2;
        let report = self.reliability_report(pair);
        let left = self.merge2_side(pair, Side::Left, &reliable_on(&report, Side::Left))?;
        let right = self.merge2_side(pair, Side::Right, &reliable_on(&report, Side::Right))?;

        let filter = |field: &ScalarField| {
            filter_disparities(&DisparityMap::from_x(field.clone()), &cfg.filter)
        };
        let (l1, r1) = (filter(&left.merged), filter(&right.merged));
        let (l2, r2) = cross_check(&l1, &r1, &cfg.check)?;
        let (l3, r3) = (filter(&l2.x), filter(&r2.x));
        let (l4, r4) = cross_check(&l3, &r3, &cfg.check)?;

        let sides = [
            (Side::Left, &left, [&l1, &l2, &l3, &l4]),
            (Side::Right, &right, [&r1, &r2, &r3, &r4]),
        ];
        for (side, merged, stages) in sides {
            let initial = store.merged2_path(pair, side, Merged2Stage::Initial);
            store.save_field(&initial, &merged.merged)?;
            store.save_field(&store.merged2_std_dev_path(pair, side), &merged.std_dev)?;
            store.save_field(&store.merged2_samples_path(pair, side), &merged.samples)?;
            let names = [
                Merged2Stage::Filtered,
                Merged2Stage::CrossChecked,
                Merged2Stage::Refiltered,
                Merged2Stage::Final,
            ];
            for (stage, map) in names.into_iter().zip(stages) {
                store.save_field(&store.merged2_path(pair, side, stage), &map.x)?;
            }
        }
        info!(
            "second-stage merge of {pair}: {} left / {} right valid",
            l4.valid_count(),
            r4.valid_count()
        );
        Ok(())
    }

    // ---- field transforms ------------------------------------------------

    /// Apply `transform` in place to every decoded field of one projector
    /// and position. Returns the number of fields rewritten.
    #[cfg_attr(feature = "tracing", instrument(level = "info", skip(self)))]
    pub fn transform_decoded(
        &self,
        mode: DisparityMode,
        proj: ProjectorId,
        pos: PositionId,
        transform: FieldTransform,
    ) -> Result<usize, PipelineError> {
        let store = &self.store;
        let files = store.pfm_files(&store.decoded_dir(mode, proj, pos))?;
        let transformed = files
            .iter()
            .map(|path| -> Result<_, PipelineError> {
                Ok((path, transform.apply(&store.load_field(path)?)))
            })
            .collect::<Result<Vec<_>, _>>()?;
        for (path, field) in &transformed {
            store.save_field(path, field)?;
        }
        Ok(transformed.len())
    }

    // ---- batch drivers ---------------------------------------------------

    pub fn run_rectify(&self, projectors: &[ProjectorId], pairs: &[StereoPair]) -> RunSummary {
        let mut summary = RunSummary::default();
        for &proj in projectors {
            for &pair in pairs {
                let unit = format!("rectify projector {proj}, pair {pair}");
                summary.record(&unit, self.rectify_decoded(proj, pair));
            }
        }
        summary
    }

    pub fn run_disparity(
        &self,
        projectors: &[ProjectorId],
        pairs: &[StereoPair],
        mode: DisparityMode,
    ) -> RunSummary {
        let mut summary = RunSummary::default();
        for &proj in projectors {
            for &pair in pairs {
                let unit = format!("disparity projector {proj}, pair {pair}");
                summary.record(&unit, self.disparity(proj, pair, mode));
            }
        }
        summary
    }

    pub fn run_merge(&self, pairs: &[StereoPair], mode: DisparityMode) -> RunSummary {
        let mut summary = RunSummary::default();
        for &pair in pairs {
            summary.record(&format!("merge pair {pair}"), self.merge(pair, mode));
        }
        summary
    }

    pub fn run_reproject(&self, projectors: &[ProjectorId], pairs: &[StereoPair]) -> RunSummary {
        let mut summary = RunSummary::default();
        for &proj in projectors {
            for &pair in pairs {
                let unit = format!("reproject projector {proj}, pair {pair}");
                summary.record(&unit, self.reproject(proj, pair));
            }
        }
        summary
    }

    pub fn run_merge2(&self, pairs: &[StereoPair]) -> RunSummary {
        let mut summary = RunSummary::default();
        for &pair in pairs {
            summary.record(&format!("merge2 pair {pair}"), self.merge2(pair));
        }
        summary
    }

    /// Transform every decoded field of the scene, in both modes.
    pub fn run_transform(&self, transform: FieldTransform) -> RunSummary {
        let mut summary = RunSummary::default();
        for mode in [DisparityMode::Unrectified, DisparityMode::Rectified] {
            for proj in self.store.decoded_projectors(mode) {
                for pos in self.store.decoded_positions(mode, proj) {
                    let unit = format!("transform projector {proj}, position {pos}");
                    summary.record(&unit, self.transform_decoded(mode, proj, pos, transform));
                }
            }
        }
        summary
    }

    /// Every stage for every discovered projector and adjacent pair.
    ///
    /// Rectified runs rectify the unrectified decodes first, then go through
    /// reprojection and the second-stage merge after the cross-projector
    /// merge.
    pub fn run_all(&self, mode: DisparityMode) -> RunSummary {
        let store = &self.store;
        let pairs = store.pairs();
        info!("running {mode:?} pipeline over {} pairs", pairs.len());
        let mut summary = RunSummary::default();
        if mode.is_rectified() {
            let unrectified = store.decoded_projectors(DisparityMode::Unrectified);
            summary.absorb(self.run_rectify(&unrectified, &pairs));
        }
        summary.absorb(self.run_disparity(&store.decoded_projectors(mode), &pairs, mode));
        summary.absorb(self.run_merge(&pairs, mode));
        if mode.is_rectified() {
            summary.absorb(self.run_reproject(&store.disparity_projectors(mode), &pairs));
            summary.absorb(self.run_merge2(&pairs));
        }
        info!("pipeline finished: {summary}");
        summary
    }
}
