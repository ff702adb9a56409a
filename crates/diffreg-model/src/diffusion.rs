//! Ancestral DDPM sampling that produces a registration trajectory.
//!
//! Sampling starts from `x_T ~ N(0, I)` and walks the schedule backwards.
//! Each step asks the denoiser for a noise estimate and a flow, takes one
//! posterior step on `x`, warps the moving volume by the flow and copies the
//! step's outputs to host memory before the next step.

use std::path::Path;

use burn::prelude::*;
use burn::tensor::Distribution;
use diffreg_core::filter::warp_volume_by_flow;
use diffreg_core::image::{float_tensor_to_vec, Volume};
use diffreg_core::transform::DisplacementField;
use diffreg_registration::inference::{
    CancellationToken, DiffusionModel, Sample, Trajectory, TrajectoryFrame,
};
use diffreg_registration::RegistrationError;
use ndarray::{Array3, Array4};
use tracing::debug;

use crate::denoiser::{ConvDenoiser, ConvDenoiserConfig, Denoiser};
use crate::schedule::{NoiseSchedule, NoiseScheduleConfig};

/// Configuration for [`DiffusionRegistration`] with a [`ConvDenoiser`].
#[derive(Config, Debug, PartialEq)]
pub struct DiffusionConfig {
    #[config(default = "ConvDenoiserConfig::new()")]
    pub denoiser: ConvDenoiserConfig,
    #[config(default = "NoiseScheduleConfig::new()")]
    pub schedule: NoiseScheduleConfig,
}

impl DiffusionConfig {
    /// Build the model, optionally restoring denoiser weights from `checkpoint`.
    pub fn init<B: Backend>(
        &self,
        checkpoint: Option<&Path>,
        device: &B::Device,
    ) -> diffreg_registration::Result<DiffusionRegistration<B, ConvDenoiser<B>>> {
        let schedule = self.schedule.init()?;
        let mut denoiser = self.denoiser.init::<B>(device)?;
        if let Some(path) = checkpoint {
            denoiser = denoiser.load_checkpoint(path, device)?;
            debug!("loaded denoiser weights from {}", path.display());
        }
        Ok(DiffusionRegistration::new(denoiser, schedule))
    }
}

/// Moving/fixed pair held between `feed` and `infer`.
#[derive(Debug, Clone)]
struct FedPair<B: Backend> {
    moving: Volume<B>,
    fixed: Volume<B>,
}

/// Reference diffusion registration model.
pub struct DiffusionRegistration<B: Backend, N: Denoiser<B>> {
    denoiser: N,
    schedule: NoiseSchedule,
    seed: Option<u64>,
    cancel: CancellationToken,
    pair: Option<FedPair<B>>,
    trajectory: Option<Trajectory>,
}

impl<B: Backend, N: Denoiser<B>> DiffusionRegistration<B, N> {
    pub fn new(denoiser: N, schedule: NoiseSchedule) -> Self {
        Self {
            denoiser,
            schedule,
            seed: None,
            cancel: CancellationToken::new(),
            pair: None,
            trajectory: None,
        }
    }

    /// Reseed the backend at the start of every `infer`, so repeated
    /// inference on one pair yields the same trajectory.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Token checked before every denoising step.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn schedule(&self) -> &NoiseSchedule {
        &self.schedule
    }

    pub fn denoiser(&self) -> &N {
        &self.denoiser
    }

    fn step(
        &self,
        pair: &FedPair<B>,
        x: Tensor<B, 5>,
        noise: Tensor<B, 5>,
        t: usize,
    ) -> diffreg_registration::Result<(Tensor<B, 5>, TrajectoryFrame)> {
        let steps = self.schedule.steps();
        let out = self.denoiser.denoise(
            x.clone(),
            pair.moving.to_batched(),
            pair.fixed.to_batched(),
            t,
            steps,
        );

        let (a, b) = self.schedule.mean_coefficients(t);
        let mut next = (x - out.score.clone().mul_scalar(b)).mul_scalar(a);
        if t > 0 {
            let sigma = self.schedule.posterior_variance(t).sqrt();
            next = next + noise.mul_scalar(sigma);
        }

        let flow = DisplacementField::new(out.flow)?;
        let deform = warp_volume_by_flow(&pair.moving, &flow)?;
        let frame = TrajectoryFrame {
            deform: deform.to_array()?,
            code: host_volume(&out.score, pair.moving.shape())?,
            flow: host_flow(flow.tensor(), pair.moving.shape())?,
        };
        Ok((next, frame))
    }
}

impl<B: Backend, N: Denoiser<B>> DiffusionModel<B> for DiffusionRegistration<B, N> {
    fn feed(&mut self, sample: &Sample<B>) -> diffreg_registration::Result<()> {
        sample.validate()?;
        self.pair = Some(FedPair {
            moving: sample.moving.clone(),
            fixed: sample.fixed.clone(),
        });
        self.trajectory = None;
        Ok(())
    }

    fn infer(&mut self, return_all_steps: bool) -> diffreg_registration::Result<()> {
        let pair = self
            .pair
            .clone()
            .ok_or_else(|| RegistrationError::model("infer called before feed"))?;
        if let Some(seed) = self.seed {
            B::seed(seed);
        }

        let shape = pair.moving.shape();
        let [d, h, w] = shape;
        let device = pair.moving.device();
        let steps = self.schedule.steps();

        // Row 0 is x_T and row k is the posterior noise of step T - k. One
        // draw right after seeding keeps the whole trajectory reproducible.
        let noise = Tensor::<B, 5>::random(
            [steps, 1, d, h, w],
            Distribution::Normal(0.0, 1.0),
            &device,
        );
        let row = |k: usize| noise.clone().slice([k..k + 1, 0..1, 0..d, 0..h, 0..w]);
        let mut x = row(0);

        let mut frames = vec![TrajectoryFrame {
            deform: pair.moving.to_array()?,
            code: host_volume(&x, shape)?,
            flow: Array4::zeros((3, d, h, w)),
        }];

        for t in (0..steps).rev() {
            if self.cancel.is_cancelled() {
                return Err(RegistrationError::model(format!(
                    "sampling cancelled at step {t} of {steps}"
                )));
            }
            // Step 0 adds no noise, so its row is a placeholder.
            let (next, frame) = self.step(&pair, x, row((steps - t) % steps), t)?;
            x = next;
            if return_all_steps || t == 0 {
                frames.push(frame);
            }
        }
        debug!("sampled {} frames over {} steps", frames.len(), steps);

        self.trajectory = Some(Trajectory::new(frames)?);
        Ok(())
    }

    fn current_outputs(&self) -> diffreg_registration::Result<Trajectory> {
        self.trajectory
            .clone()
            .ok_or_else(|| RegistrationError::model("no trajectory, infer has not run"))
    }
}

fn host_volume<B: Backend>(
    tensor: &Tensor<B, 5>,
    [d, h, w]: [usize; 3],
) -> diffreg_registration::Result<Array3<f32>> {
    Array3::from_shape_vec((d, h, w), float_tensor_to_vec(tensor)?)
        .map_err(|e| RegistrationError::data_conversion(e.to_string()))
}

fn host_flow<B: Backend>(
    tensor: &Tensor<B, 5>,
    [d, h, w]: [usize; 3],
) -> diffreg_registration::Result<Array4<f32>> {
    Array4::from_shape_vec((3, d, h, w), float_tensor_to_vec(tensor)?)
        .map_err(|e| RegistrationError::data_conversion(e.to_string()))
}
