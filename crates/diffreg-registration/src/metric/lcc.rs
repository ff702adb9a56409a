use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use diffreg_core::error::ensure_same_shape;
use diffreg_core::filter::BoxFilter;
use once_cell::sync::OnceCell;

use super::trait_::Metric;
use crate::error::{RegistrationError, Result};

/// Local Cross Correlation (LCC) dissimilarity.
///
/// Squared correlation coefficient over a box window around each voxel,
/// computed from local sums:
///
/// cc = cross² / (var_I · var_T + ε)
///
/// with `cross = ΣIT − Î·ΣT − T̂·ΣI + T̂·Î·N` and the variances formed the same
/// way, `N` the window volume and `ε = 1e-5`. The target is mapped from
/// [-1, 1] to [0, 1] before the sums are taken. The loss is `-mean(cc)`.
///
/// The all-ones window kernel is built on first use and reused afterwards.
pub struct LocalCrossCorrelation<B: Backend> {
    in_channels: usize,
    filter: BoxFilter,
    epsilon: f32,
    kernel: OnceCell<Tensor<B, 5>>,
}

impl<B: Backend> LocalCrossCorrelation<B> {
    /// Create a new LCC metric.
    ///
    /// # Arguments
    /// * `in_channels` - Channel count of the volumes to compare.
    /// * `window` - Window size `[kd, kh, kw]`; every dimension must be odd.
    pub fn new(in_channels: usize, window: [usize; 3]) -> Result<Self> {
        if in_channels == 0 {
            return Err(RegistrationError::invalid_configuration(
                "local cross correlation needs at least one channel",
            ));
        }
        Ok(Self {
            in_channels,
            filter: BoxFilter::new(window)?,
            epsilon: 1e-5,
            kernel: OnceCell::new(),
        })
    }

    /// Window size `[kd, kh, kw]`.
    pub fn window(&self) -> [usize; 3] {
        self.filter.window()
    }

    /// Whether the window kernel has been built.
    pub fn is_kernel_initialized(&self) -> bool {
        self.kernel.get().is_some()
    }

    fn kernel(&self, device: &B::Device) -> Tensor<B, 5> {
        let kernel = self
            .kernel
            .get_or_init(|| self.filter.kernel(self.in_channels, device))
            .clone();
        if &kernel.device() != device {
            kernel.to_device(device)
        } else {
            kernel
        }
    }
}

impl<B: Backend> Metric<B> for LocalCrossCorrelation<B> {
    fn forward(&self, input: &Tensor<B, 5>, target: &Tensor<B, 5>) -> Result<Tensor<B, 1>> {
        let dims = input.dims();
        ensure_same_shape(&dims, &target.dims())?;
        if dims[1] != self.in_channels {
            return Err(RegistrationError::dimension_mismatch(format!(
                "expected {} channels, got shape {dims:?}",
                self.in_channels
            )));
        }

        let kernel = self.kernel(&input.device());
        let sum = |t: Tensor<B, 5>| self.filter.apply(t, kernel.clone());

        let i = input.clone();
        let t = target.clone().add_scalar(1.0).div_scalar(2.0);

        let i_sum = sum(i.clone());
        let t_sum = sum(t.clone());
        let i2_sum = sum(i.clone() * i.clone());
        let t2_sum = sum(t.clone() * t.clone());
        let it_sum = sum(i * t);

        let n = self.filter.volume() as f32;
        let i_hat = i_sum.clone().div_scalar(n);
        let t_hat = t_sum.clone().div_scalar(n);

        let cross = it_sum - i_hat.clone() * t_sum.clone() - t_hat.clone() * i_sum.clone()
            + (t_hat.clone() * i_hat.clone()).mul_scalar(n);
        let t_var = t2_sum - t_hat.clone().mul_scalar(2.0) * t_sum
            + (t_hat.clone() * t_hat).mul_scalar(n);
        let i_var = i2_sum - i_hat.clone().mul_scalar(2.0) * i_sum
            + (i_hat.clone() * i_hat).mul_scalar(n);

        let cc = (cross.clone() * cross) / (i_var * t_var).add_scalar(self.epsilon);
        Ok(cc.mean().neg())
    }

    fn name(&self) -> &'static str {
        "LocalCrossCorrelation"
    }
}
