use std::path::PathBuf;

use burn::config::Config;
use burn::tensor::backend::Backend;
use burn::tensor::{Distribution, Tensor};
use burn_ndarray::NdArray;
use diffreg_core::image::{LabelVolume, Volume};
use diffreg_model::{ConvDenoiserConfig, Denoiser, DiffusionConfig, NoiseScheduleConfig};
use diffreg_registration::inference::{
    CancellationToken, DiffusionModel, ExampleWriter, InMemoryDataset, InferenceConfig,
    InferenceOrchestrator, OutputMode, Sample, Trajectory,
};
use diffreg_registration::{RegistrationError, Result};
use ndarray::Array3;

type B = NdArray<f32>;

const SHAPE: [usize; 3] = [3, 4, 5];

fn config(steps: usize) -> DiffusionConfig {
    DiffusionConfig::new()
        .with_denoiser(ConvDenoiserConfig::new().with_hidden_channels(4).with_max_displacement(1.5))
        .with_schedule(NoiseScheduleConfig::new().with_steps(steps))
}

fn sample(id: &str) -> Sample<B> {
    let device = Default::default();
    let [d, h, w] = SHAPE;
    let moving = Array3::from_shape_fn((d, h, w), |(z, y, x)| {
        (z + y + x) as f32 / (d + h + w) as f32 * 2.0 - 1.0
    });
    let labels = Array3::from_shape_fn((d, h, w), |(_, _, x)| if x < w / 2 { 1 } else { 2 });
    Sample {
        id: id.to_string(),
        moving: Volume::from_array(&moving, &device),
        fixed: Volume::from_array(&moving.mapv(|v| -v), &device),
        moving_label: LabelVolume::from_array(&labels, &device),
        fixed_label: LabelVolume::from_array(&labels, &device),
    }
}

#[test]
fn test_full_trajectory_has_one_frame_per_step() {
    let device = Default::default();
    let mut model = config(4).init::<B>(None, &device).unwrap();
    let sample = sample("case");

    model.feed(&sample).unwrap();
    model.infer(true).unwrap();
    let trajectory = model.current_outputs().unwrap();

    assert_eq!(trajectory.len(), 5);
    assert_eq!(trajectory.shape(), SHAPE);
    assert_eq!(trajectory.initial().deform, sample.moving.to_array().unwrap());
    assert!(trajectory.initial().flow.iter().all(|&v| v == 0.0));
    assert_eq!(trajectory.deform_stack().dim(), (3, 4, 5, 4));
}

#[test]
fn test_final_only_trajectory() {
    let device = Default::default();
    let mut model = config(4).init::<B>(None, &device).unwrap();
    model.feed(&sample("case")).unwrap();
    model.infer(false).unwrap();
    assert_eq!(model.current_outputs().unwrap().len(), 2);
}

#[test]
fn test_flows_respect_displacement_bound() {
    let device = Default::default();
    let mut model = config(3).init::<B>(None, &device).unwrap();
    model.feed(&sample("case")).unwrap();
    model.infer(true).unwrap();
    for frame in model.current_outputs().unwrap().frames() {
        assert!(frame.flow.iter().all(|v| v.abs() <= 1.5 + 1e-5));
        assert!(frame.deform.iter().all(|v| v.is_finite()));
    }
}

#[test]
fn test_infer_requires_feed() {
    let device = Default::default();
    let mut model = config(2).init::<B>(None, &device).unwrap();
    assert!(matches!(model.infer(true), Err(RegistrationError::ModelError(_))));
    assert!(model.current_outputs().is_err());
}

#[test]
fn test_feed_rejects_mismatched_pair() {
    let device = Default::default();
    let mut model = config(2).init::<B>(None, &device).unwrap();
    let mut bad = sample("bad");
    bad.fixed = Volume::from_array(&Array3::zeros((3, 4, 4)), &device);
    assert!(matches!(
        model.feed(&bad),
        Err(RegistrationError::ShapeMismatch { .. })
    ));
}

#[test]
fn test_cancelled_sampling_fails() {
    let device = Default::default();
    let token = CancellationToken::new();
    let mut model = config(3)
        .init::<B>(None, &device)
        .unwrap()
        .with_cancellation(token.clone());
    model.feed(&sample("case")).unwrap();
    token.cancel();
    assert!(model.infer(true).is_err());
}

#[test]
fn test_config_json_round_trip() {
    let saved = config(5);
    let loaded = DiffusionConfig::load_binary(saved.to_string().as_bytes()).unwrap();
    assert_eq!(loaded, saved);
    assert_eq!(loaded.schedule.init().unwrap().steps(), 5);
}

#[test]
fn test_invalid_schedule_is_rejected() {
    let device = Default::default();
    let cfg = DiffusionConfig::new().with_schedule(NoiseScheduleConfig::new().with_steps(0));
    assert!(cfg.init::<B>(None, &device).is_err());
}

#[test]
fn test_checkpoint_round_trip() {
    let device = Default::default();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("denoiser");

    let denoiser_config = ConvDenoiserConfig::new().with_hidden_channels(4);
    let saved = denoiser_config.init::<B>(&device).unwrap();
    saved.save_checkpoint(&path).unwrap();
    assert!(dir.path().join("denoiser.mpk").exists());

    let restored = denoiser_config
        .init::<B>(&device)
        .unwrap()
        .load_checkpoint(&path, &device)
        .unwrap();

    let input = || Tensor::<B, 5>::random([1, 1, 3, 3, 3], Distribution::Default, &device);
    let (x, m, f) = (input(), input(), input());
    let expected = saved.denoise(x.clone(), m.clone(), f.clone(), 1, 4).flow;
    let actual = restored.denoise(x, m, f, 1, 4).flow;
    let diff = (expected - actual).abs().max().into_scalar();
    assert!(diff < 1e-6, "restored weights differ by {diff}");
}

#[test]
fn test_missing_checkpoint_is_a_model_error() {
    let device = Default::default();
    let dir = tempfile::tempdir().unwrap();
    let result = config(2).init::<B>(Some(dir.path().join("absent").as_path()), &device);
    assert!(matches!(result, Err(RegistrationError::ModelError(_))));
}

struct NullWriter;

impl<Bk: Backend> ExampleWriter<Bk> for NullWriter {
    fn write_volumes(&mut self, _: &Sample<Bk>, _: &Trajectory) -> Result<Vec<PathBuf>> {
        Ok(Vec::new())
    }

    fn write_snapshots(&mut self, _: &Sample<Bk>, _: &Trajectory, _: usize) -> Result<Vec<PathBuf>> {
        Ok(Vec::new())
    }
}

#[test]
fn test_orchestrated_run_scores_every_sample() {
    let device = Default::default();
    let model = config(2).init::<B>(None, &device).unwrap();
    let dataset = InMemoryDataset::new(vec![sample("a"), sample("b")]);

    let mut inference = InferenceConfig::new(vec![1, 2]);
    inference.output_mode = OutputMode::None;
    let mut orchestrator = InferenceOrchestrator::<B, _, _>::new(inference, model, NullWriter).unwrap();
    let outcome = orchestrator.run(&dataset).unwrap();

    assert!(outcome.is_completed());
    let summary = outcome.summary();
    assert_eq!(summary.len(), 2);
    assert_eq!(summary.pre_dice().unwrap().mean, 1.0);
    let post = summary.post_dice().unwrap().mean;
    assert!((0.0..=1.0).contains(&post), "post dice {post}");
}
