use std::path::PathBuf;
use std::sync::Arc;

use burn::tensor::backend::Backend;
use burn_ndarray::NdArray;
use diffreg_core::image::{LabelVolume, Volume};
use diffreg_registration::inference::{
    CancellationToken, DiffusionModel, ExampleWriter, InMemoryDataset, InferenceConfig,
    InferenceOrchestrator, OutputMode, RunOutcome, Sample, Trajectory, TrajectoryFrame,
};
use diffreg_registration::{HistoryCallback, RegistrationError, Result};
use ndarray::{Array3, Array4};

type B = NdArray<f32>;

/// Model whose final flow is a constant displacement along width.
#[derive(Default)]
struct ShiftModel {
    width_shift: f32,
    steps: usize,
    fed: usize,
    shape: Option<[usize; 3]>,
    trajectory: Option<Trajectory>,
}

impl ShiftModel {
    fn identity() -> Self {
        Self {
            steps: 3,
            ..Default::default()
        }
    }

    fn shifting(width_shift: f32) -> Self {
        Self {
            width_shift,
            steps: 3,
            ..Default::default()
        }
    }
}

impl DiffusionModel<B> for ShiftModel {
    fn feed(&mut self, sample: &Sample<B>) -> Result<()> {
        self.fed += 1;
        self.shape = Some(sample.shape());
        Ok(())
    }

    fn infer(&mut self, return_all_steps: bool) -> Result<()> {
        let [d, h, w] = self
            .shape
            .ok_or_else(|| RegistrationError::model("infer called before feed"))?;
        let steps = if return_all_steps { self.steps } else { 1 };
        let frames = (0..=steps)
            .map(|t| {
                let fraction = t as f32 / steps as f32;
                let mut flow = Array4::<f32>::zeros((3, d, h, w));
                flow.index_axis_mut(ndarray::Axis(0), 2)
                    .fill(self.width_shift * fraction);
                TrajectoryFrame {
                    deform: Array3::from_elem((d, h, w), fraction),
                    code: Array3::from_elem((d, h, w), 1.0 - fraction),
                    flow,
                }
            })
            .collect();
        self.trajectory = Some(Trajectory::new(frames)?);
        Ok(())
    }

    fn current_outputs(&self) -> Result<Trajectory> {
        self.trajectory
            .clone()
            .ok_or_else(|| RegistrationError::model("no trajectory"))
    }
}

/// Writer that records what it was asked to save.
#[derive(Default)]
struct RecordingWriter {
    volumes: Vec<String>,
    snapshots: Vec<(String, usize)>,
}

impl<Bk: Backend> ExampleWriter<Bk> for RecordingWriter {
    fn write_volumes(&mut self, sample: &Sample<Bk>, _trajectory: &Trajectory) -> Result<Vec<PathBuf>> {
        self.volumes.push(sample.id.clone());
        Ok(["mov", "fix", "mov_label", "fix_label", "scores", "moved"]
            .iter()
            .map(|suffix| PathBuf::from(format!("{}_{suffix}.nii.gz", sample.id)))
            .collect())
    }

    fn write_snapshots(
        &mut self,
        sample: &Sample<Bk>,
        _trajectory: &Trajectory,
        slice: usize,
    ) -> Result<Vec<PathBuf>> {
        self.snapshots.push((sample.id.clone(), slice));
        Ok(vec![PathBuf::from(format!("{}_mov.png", sample.id))])
    }
}

const SHAPE: [usize; 3] = [2, 3, 4];

/// Two structures: label 1 in the left half of each row, label 2 in the right.
fn labels(shift: usize) -> LabelVolume<B> {
    let [d, h, w] = SHAPE;
    let array = Array3::from_shape_fn((d, h, w), |(_, _, x)| {
        let x = x + shift;
        if x >= w {
            0
        } else if x < w / 2 {
            1
        } else {
            2
        }
    });
    LabelVolume::from_array(&array, &Default::default())
}

fn sample(id: &str, moving_label: LabelVolume<B>) -> Sample<B> {
    let device = Default::default();
    let [d, h, w] = SHAPE;
    let volume = Volume::from_array(&Array3::from_elem((d, h, w), 0.25), &device);
    Sample {
        id: id.to_string(),
        moving: volume.clone(),
        fixed: volume,
        moving_label,
        fixed_label: labels(0),
    }
}

fn dataset(n: usize) -> InMemoryDataset<B> {
    InMemoryDataset::new((0..n).map(|i| sample(&format!("case{i}"), labels(0))).collect())
}

fn config() -> InferenceConfig {
    InferenceConfig::new(vec![1, 2])
}

#[test]
fn test_identical_pair_scores_one_before_and_after() {
    let mut orchestrator =
        InferenceOrchestrator::<B, _, _>::new(config(), ShiftModel::identity(), RecordingWriter::default())
            .unwrap();
    let outcome = orchestrator.run(&dataset(1)).unwrap();

    assert!(outcome.is_completed());
    let summary = outcome.summary();
    assert_eq!(summary.len(), 1);
    assert!(summary.pre_matrix().iter().all(|&v| v == 1.0));
    assert!(summary.post_matrix().iter().all(|&v| v == 1.0));
    assert_eq!(summary.pre_dice().unwrap().mean, 1.0);
    assert_eq!(summary.post_dice().unwrap().mean, 1.0);
}

#[test]
fn test_final_flow_realigns_shifted_labels() {
    // Moving labels are the fixed labels read one voxel further along width,
    // so a flow of -1 voxel along width realigns them.
    let moved = labels(1);
    let dataset = InMemoryDataset::new(vec![sample("shifted", moved)]);

    let mut orchestrator = InferenceOrchestrator::<B, _, _>::new(
        config(),
        ShiftModel::shifting(-1.0),
        RecordingWriter::default(),
    )
    .unwrap();
    let outcome = orchestrator.run(&dataset).unwrap();
    let summary = outcome.summary();

    let pre = summary.pre_dice().unwrap().mean;
    let post = summary.post_dice().unwrap().mean;
    assert!(pre < 1.0, "pre = {pre}");
    assert!(post > pre, "post {post} did not improve on pre {pre}");
}

#[test]
fn test_save_cap_stops_before_next_sample() {
    let mut cfg = config();
    cfg.save_examples = Some(1);

    let mut orchestrator =
        InferenceOrchestrator::<B, _, _>::new(cfg, ShiftModel::identity(), RecordingWriter::default())
            .unwrap();
    let outcome = orchestrator.run(&dataset(3)).unwrap();

    match &outcome {
        RunOutcome::StopRequested { reason, partial } => {
            assert!(reason.contains("1 saved"));
            assert_eq!(partial.len(), 1);
            assert_eq!(partial.saved(), 1);
        }
        other => panic!("expected StopRequested, got {other:?}"),
    }
    assert_eq!(orchestrator.writer().volumes, vec!["case0".to_string()]);
    // The second sample was never fed to the model.
    assert_eq!(orchestrator.model().fed, 1);
}

#[test]
fn test_save_cap_without_stop_keeps_evaluating() {
    let mut cfg = config();
    cfg.save_examples = Some(1);
    cfg.stop_after_save_cap = false;

    let mut orchestrator =
        InferenceOrchestrator::<B, _, _>::new(cfg, ShiftModel::identity(), RecordingWriter::default())
            .unwrap();
    let outcome = orchestrator.run(&dataset(3)).unwrap();

    assert!(outcome.is_completed());
    assert_eq!(outcome.summary().len(), 3);
    assert_eq!(outcome.summary().saved(), 1);
    assert_eq!(orchestrator.writer().volumes.len(), 1);
}

#[test]
fn test_png_mode_writes_snapshots() {
    let mut cfg = config();
    cfg.output_mode = OutputMode::Png;
    cfg.snapshot_slice = 1;

    let mut orchestrator =
        InferenceOrchestrator::<B, _, _>::new(cfg, ShiftModel::identity(), RecordingWriter::default())
            .unwrap();
    orchestrator.run(&dataset(2)).unwrap();

    let writer = orchestrator.writer();
    assert!(writer.volumes.is_empty());
    assert_eq!(writer.snapshots, vec![("case0".to_string(), 1), ("case1".to_string(), 1)]);
}

#[test]
fn test_snapshot_slice_outside_volume_is_rejected() {
    let mut cfg = config();
    cfg.output_mode = OutputMode::Png;

    let mut orchestrator =
        InferenceOrchestrator::<B, _, _>::new(cfg, ShiftModel::identity(), RecordingWriter::default())
            .unwrap();
    let result = orchestrator.run(&dataset(1));
    assert!(matches!(result, Err(RegistrationError::InvalidConfiguration(_))));
}

#[test]
fn test_output_mode_none_saves_nothing() {
    let mut cfg = config();
    cfg.output_mode = OutputMode::None;
    cfg.save_examples = Some(1);
    cfg.stop_after_save_cap = true;

    let mut orchestrator =
        InferenceOrchestrator::<B, _, _>::new(cfg, ShiftModel::identity(), RecordingWriter::default())
            .unwrap();
    let outcome = orchestrator.run(&dataset(3)).unwrap();

    assert!(outcome.is_completed());
    assert_eq!(outcome.summary().saved(), 0);
}

#[test]
fn test_cancelled_run() {
    let token = CancellationToken::new();
    token.cancel();

    let mut orchestrator =
        InferenceOrchestrator::<B, _, _>::new(config(), ShiftModel::identity(), RecordingWriter::default())
            .unwrap()
            .with_cancellation(token);
    let outcome = orchestrator.run(&dataset(2)).unwrap();

    assert!(matches!(outcome, RunOutcome::Cancelled { ref partial } if partial.is_empty()));
    assert_eq!(orchestrator.model().fed, 0);
}

#[test]
fn test_shape_mismatch_aborts_run() {
    let device = Default::default();
    let mut bad = sample("bad", labels(0));
    bad.fixed_label = LabelVolume::from_vec(vec![0; 8], [2, 2, 2], &device).unwrap();
    let dataset = InMemoryDataset::new(vec![bad]);

    let mut orchestrator =
        InferenceOrchestrator::<B, _, _>::new(config(), ShiftModel::identity(), RecordingWriter::default())
            .unwrap();
    assert!(matches!(
        orchestrator.run(&dataset),
        Err(RegistrationError::ShapeMismatch { .. })
    ));
}

#[test]
fn test_progress_reports_every_sample() {
    let history = Arc::new(HistoryCallback::new());
    let mut cfg = config();
    cfg.output_mode = OutputMode::None;

    let mut orchestrator =
        InferenceOrchestrator::<B, _, _>::new(cfg, ShiftModel::identity(), RecordingWriter::default())
            .unwrap()
            .with_progress(history.clone());
    orchestrator.run(&dataset(3)).unwrap();

    let reports = history.get_history();
    assert_eq!(reports.len(), 3);
    assert_eq!(reports[2].id, "case2");
    assert_eq!(reports[2].total, 3);
    assert_eq!(reports[0].post_dice, 1.0);
}

#[test]
fn test_invalid_label_selection_is_rejected() {
    let result = InferenceOrchestrator::<B, _, _>::new(
        InferenceConfig::new(vec![]),
        ShiftModel::identity(),
        RecordingWriter::default(),
    );
    assert!(result.is_err());
}
