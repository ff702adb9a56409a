use burn::tensor::backend::Backend;
use burn::tensor::ops::ConvOptions;
use burn::tensor::Tensor;

use crate::error::{RegistrationError, Result};

/// Uniform box filter computing local window sums.
///
/// The kernel is an all-ones `[1, C, kd, kh, kw]` tensor, so the output of
/// [`BoxFilter::apply`] is a single-channel `[N, 1, D, H, W]` tensor of sums
/// over every channel and every voxel of the window. Padding is `(k - 1) / 2`
/// per axis with zeros, which keeps the spatial shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoxFilter {
    window: [usize; 3],
}

impl BoxFilter {
    /// Create a box filter. Every window dimension must be odd.
    pub fn new(window: [usize; 3]) -> Result<Self> {
        if let Some(k) = window.iter().find(|&&k| k == 0 || k % 2 == 0) {
            return Err(RegistrationError::invalid_configuration(format!(
                "box filter window {window:?} has dimension {k}; every dimension must be odd"
            )));
        }
        Ok(Self { window })
    }

    /// Window size `[kd, kh, kw]`.
    pub fn window(&self) -> [usize; 3] {
        self.window
    }

    /// Number of voxels in the window.
    pub fn volume(&self) -> usize {
        self.window.iter().product()
    }

    /// All-ones kernel for `channels` input channels.
    pub fn kernel<B: Backend>(&self, channels: usize, device: &B::Device) -> Tensor<B, 5> {
        let [kd, kh, kw] = self.window;
        Tensor::ones([1, channels, kd, kh, kw], device)
    }

    /// Convolve `input` with a kernel built by [`BoxFilter::kernel`].
    pub fn apply<B: Backend>(&self, input: Tensor<B, 5>, kernel: Tensor<B, 5>) -> Tensor<B, 5> {
        let padding = self.window.map(|k| (k - 1) / 2);
        let options = ConvOptions::new([1, 1, 1], padding, [1, 1, 1], 1);
        burn::tensor::module::conv3d(input, kernel, None, options)
    }
}
