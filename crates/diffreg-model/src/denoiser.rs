//! Score and flow prediction for one reverse-diffusion step.
//!
//! ```text
//! [x_t, moving, fixed, t / T]   4 channels
//!          │
//!     Conv3d + GELU  × layers
//!          │
//!     ┌────┴────┐
//!   score     flow          1 and 3 channels
//!            tanh · max_displacement
//! ```

use std::path::Path;

use burn::module::Ignored;
use burn::nn::conv::{Conv3d, Conv3dConfig};
use burn::nn::{Gelu, PaddingConfig3d};
use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder};
use diffreg_registration::RegistrationError;

/// Image channels fed to the body: noisy state, moving, fixed.
const IMAGE_CHANNELS: usize = 3;

/// Prediction of one denoising step.
#[derive(Debug, Clone)]
pub struct DenoiserOutput<B: Backend> {
    /// Predicted noise `[N, 1, D, H, W]`.
    pub score: Tensor<B, 5>,
    /// Displacement in voxels `[N, 3, D, H, W]`, channels (d, h, w).
    pub flow: Tensor<B, 5>,
}

/// Network evaluated once per reverse-diffusion step.
pub trait Denoiser<B: Backend> {
    /// Predict noise and flow for `x_t` at step `t` of `steps`.
    ///
    /// All image inputs are `[N, 1, D, H, W]`.
    fn denoise(
        &self,
        x_t: Tensor<B, 5>,
        moving: Tensor<B, 5>,
        fixed: Tensor<B, 5>,
        t: usize,
        steps: usize,
    ) -> DenoiserOutput<B>;
}

/// Configuration for [`ConvDenoiser`].
#[derive(Config, Debug, PartialEq)]
pub struct ConvDenoiserConfig {
    /// Feature channels of the convolutional body.
    #[config(default = "16")]
    pub hidden_channels: usize,
    /// Number of Conv3d + GELU layers in the body.
    #[config(default = "2")]
    pub layers: usize,
    /// Bound on the predicted displacement, in voxels.
    #[config(default = "4.0")]
    pub max_displacement: f64,
}

impl ConvDenoiserConfig {
    pub fn validate(&self) -> diffreg_registration::Result<()> {
        if self.hidden_channels == 0 || self.layers == 0 {
            return Err(RegistrationError::invalid_configuration(format!(
                "denoiser needs at least one layer and channel, got {} layers of {} channels",
                self.layers, self.hidden_channels
            )));
        }
        if self.max_displacement.is_nan() || self.max_displacement <= 0.0 {
            return Err(RegistrationError::invalid_configuration(format!(
                "max_displacement must be positive, got {}",
                self.max_displacement
            )));
        }
        Ok(())
    }

    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> diffreg_registration::Result<ConvDenoiser<B>> {
        self.validate()?;
        let hidden = self.hidden_channels;

        let body = (0..self.layers)
            .map(|i| {
                let in_channels = if i == 0 { IMAGE_CHANNELS + 1 } else { hidden };
                conv3x3(in_channels, hidden, device)
            })
            .collect();

        Ok(ConvDenoiser {
            body,
            act: Gelu::new(),
            score_head: conv3x3(hidden, 1, device),
            flow_head: conv3x3(hidden, 3, device),
            max_displacement: Ignored(self.max_displacement as f32),
        })
    }
}

fn conv3x3<B: Backend>(in_channels: usize, out_channels: usize, device: &B::Device) -> Conv3d<B> {
    Conv3dConfig::new([in_channels, out_channels], [3, 3, 3])
        .with_padding(PaddingConfig3d::Explicit(1, 1, 1))
        .init(device)
}

/// Small fully convolutional denoiser with a time-conditioning channel.
#[derive(Module, Debug)]
pub struct ConvDenoiser<B: Backend> {
    body: Vec<Conv3d<B>>,
    act: Gelu,
    score_head: Conv3d<B>,
    flow_head: Conv3d<B>,
    max_displacement: Ignored<f32>,
}

impl<B: Backend> ConvDenoiser<B> {
    /// Restore weights saved by [`ConvDenoiser::save_checkpoint`].
    pub fn load_checkpoint(
        self,
        path: &Path,
        device: &B::Device,
    ) -> diffreg_registration::Result<Self> {
        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        self.load_file(path.to_path_buf(), &recorder, device)
            .map_err(|e| {
                RegistrationError::model(format!(
                    "failed to load checkpoint {}: {e:?}",
                    path.display()
                ))
            })
    }

    /// Save the weights; the recorder appends the `.mpk` extension.
    pub fn save_checkpoint(&self, path: &Path) -> diffreg_registration::Result<()> {
        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        self.clone()
            .save_file(path.to_path_buf(), &recorder)
            .map_err(|e| {
                RegistrationError::model(format!(
                    "failed to save checkpoint {}: {e:?}",
                    path.display()
                ))
            })
    }

    pub fn max_displacement(&self) -> f32 {
        self.max_displacement.0
    }
}

impl<B: Backend> Denoiser<B> for ConvDenoiser<B> {
    fn denoise(
        &self,
        x_t: Tensor<B, 5>,
        moving: Tensor<B, 5>,
        fixed: Tensor<B, 5>,
        t: usize,
        steps: usize,
    ) -> DenoiserOutput<B> {
        let [n, _, d, h, w] = x_t.dims();
        let level = t as f32 / steps.max(1) as f32;
        let time = Tensor::<B, 5>::full([n, 1, d, h, w], level, &x_t.device());

        let mut features = Tensor::cat(vec![x_t, moving, fixed, time], 1);
        for conv in &self.body {
            features = self.act.forward(conv.forward(features));
        }

        let score = self.score_head.forward(features.clone());
        let flow = self
            .flow_head
            .forward(features)
            .tanh()
            .mul_scalar(self.max_displacement.0);
        DenoiserOutput { score, flow }
    }
}
