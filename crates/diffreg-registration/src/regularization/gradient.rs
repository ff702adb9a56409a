//! First-order gradient penalty for displacement and code fields.
//!
//! For a field `u` of shape `[N, C, D, H, W]` the penalty is
//!
//! R(u) = (mean|∂_d u|^p + mean|∂_h u|^p + mean|∂_w u|^p) / 3
//!
//! with forward differences over interior pairs and `p = 1` (L1) or
//! `p = 2` (L2).

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use serde::{Deserialize, Serialize};

use super::trait_::utils::forward_differences_3d;
use super::trait_::Regularizer;
use crate::error::{RegistrationError, Result};

/// Norm applied to each finite difference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Penalty {
    /// Absolute difference.
    #[default]
    L1,
    /// Squared difference.
    L2,
}

/// Smoothness penalty on spatial forward differences.
///
/// # Example
///
/// ```rust,ignore
/// use diffreg_registration::regularization::{GradientPenalty, Penalty, Regularizer};
///
/// let reg = GradientPenalty::new(Penalty::L2);
/// let flow = Tensor::zeros([1, 3, 32, 32, 32], &device);
/// let loss = reg.compute_loss(flow)?;
/// ```
#[derive(Clone, Debug)]
pub struct GradientPenalty {
    penalty: Penalty,
    weight: f64,
}

impl GradientPenalty {
    /// Create a gradient penalty with unit weight.
    pub fn new(penalty: Penalty) -> Self {
        Self {
            penalty,
            weight: 1.0,
        }
    }

    /// Set the weight.
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    /// Norm in use.
    pub fn penalty(&self) -> Penalty {
        self.penalty
    }

    fn reduce<B: Backend>(&self, diff: Tensor<B, 5>) -> Tensor<B, 1> {
        match self.penalty {
            Penalty::L1 => diff.abs().mean(),
            Penalty::L2 => diff.powf_scalar(2.0).mean(),
        }
    }
}

impl Default for GradientPenalty {
    fn default() -> Self {
        Self::new(Penalty::default())
    }
}

impl<B: Backend> Regularizer<B> for GradientPenalty {
    fn compute_loss(&self, field: Tensor<B, 5>) -> Result<Tensor<B, 1>> {
        let dims = field.dims();
        if dims[2..].iter().any(|&s| s < 2) {
            return Err(RegistrationError::dimension_mismatch(format!(
                "gradient penalty needs at least 2 voxels along every spatial axis, got shape {dims:?}"
            )));
        }

        let (dd, dh, dw) = forward_differences_3d(field);
        let total = self.reduce(dd) + self.reduce(dh) + self.reduce(dw);
        Ok(total.div_scalar(3.0).mul_scalar(self.weight))
    }

    fn weight(&self) -> f64 {
        self.weight
    }

    fn set_weight(&mut self, weight: f64) {
        self.weight = weight;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::{ElementConversion, Shape, TensorData};
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    fn scalar(t: Tensor<TestBackend, 1>) -> f32 {
        t.into_scalar().elem::<f32>()
    }

    /// Field whose value grows by `slope` per voxel along `axis`.
    fn ramp(shape: [usize; 3], axis: usize, slope: f32) -> Tensor<TestBackend, 5> {
        let [d, h, w] = shape;
        let mut values = Vec::with_capacity(d * h * w);
        for z in 0..d {
            for y in 0..h {
                for x in 0..w {
                    values.push([z, y, x][axis] as f32 * slope);
                }
            }
        }
        Tensor::from_data(
            TensorData::new(values, Shape::new([1, 1, d, h, w])),
            &Default::default(),
        )
    }

    #[test]
    fn test_default_is_unit_weight_l1() {
        let reg = GradientPenalty::default();
        assert_eq!(reg.penalty(), Penalty::L1);

        // Slope 2 along one of three axes: L1 gives 2 / 3, L2 would give 4 / 3.
        let loss = reg.compute_loss(ramp([3, 3, 3], 2, 2.0)).unwrap();
        assert!((scalar(loss) - 2.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_constant_field_has_zero_penalty() {
        let field = Tensor::<TestBackend, 5>::ones([1, 3, 4, 5, 6], &Default::default()).mul_scalar(7.0);
        for penalty in [Penalty::L1, Penalty::L2] {
            let loss = GradientPenalty::new(penalty).compute_loss(field.clone()).unwrap();
            assert_eq!(scalar(loss), 0.0);
        }
    }

    #[test]
    fn test_ramp_penalties() {
        let slope = 0.6;
        for axis in 0..3 {
            let field = ramp([4, 5, 6], axis, slope);
            let l1 = scalar(GradientPenalty::new(Penalty::L1).compute_loss(field.clone()).unwrap());
            let l2 = scalar(GradientPenalty::new(Penalty::L2).compute_loss(field).unwrap());

            assert!((l1 - slope / 3.0).abs() < 1e-5, "axis {axis}: l1 = {l1}");
            assert!((l2 - slope * slope / 3.0).abs() < 1e-5, "axis {axis}: l2 = {l2}");
            assert!((l2 - 3.0 * l1 * l1).abs() < 1e-5);
        }
    }

    #[test]
    fn test_negative_slope_uses_magnitude() {
        let field = ramp([3, 3, 3], 2, -2.0);
        let l1 = scalar(GradientPenalty::new(Penalty::L1).compute_loss(field).unwrap());
        assert!((l1 - 2.0 / 3.0).abs() < 1e-5);
    }

    #[test]
    fn test_weight_scales_loss() {
        let field = ramp([3, 3, 3], 1, 1.0);
        let reg = GradientPenalty::new(Penalty::L1).with_weight(3.0);
        assert!((scalar(reg.compute_loss(field).unwrap()) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_singleton_axis_is_rejected() {
        let field = Tensor::<TestBackend, 5>::zeros([1, 3, 1, 4, 4], &Default::default());
        let result = GradientPenalty::new(Penalty::L2).compute_loss(field);
        assert!(matches!(result, Err(RegistrationError::DimensionMismatch(_))));
    }

}
