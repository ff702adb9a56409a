//! Regularizer trait definition.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use crate::error::Result;

/// Trait for smoothness penalties over volume-valued fields.
///
/// # Type Parameters
/// * `B` - The backend type
pub trait Regularizer<B: Backend> {
    /// Compute the penalty for a field of shape `[N, C, D, H, W]`.
    ///
    /// # Returns
    /// A single-element tensor containing the weighted penalty.
    fn compute_loss(&self, field: Tensor<B, 5>) -> Result<Tensor<B, 1>>;

    /// Get the weight (scaling factor) for this regularizer.
    fn weight(&self) -> f64;

    /// Set the weight (scaling factor) for this regularizer.
    fn set_weight(&mut self, weight: f64);
}

/// Finite-difference helpers.
pub mod utils {
    use burn::tensor::backend::Backend;
    use burn::tensor::Tensor;

    /// Forward differences along each spatial axis of a `[N, C, D, H, W]` field.
    ///
    /// Only valid interior pairs are differenced, so each result is one
    /// element shorter along its own axis. The caller must ensure every
    /// spatial dimension is at least 2.
    pub fn forward_differences_3d<B: Backend>(
        field: Tensor<B, 5>,
    ) -> (Tensor<B, 5>, Tensor<B, 5>, Tensor<B, 5>) {
        let [b, c, d, h, w] = field.dims();

        let grad_d = field.clone().slice([0..b, 0..c, 1..d, 0..h, 0..w])
            - field.clone().slice([0..b, 0..c, 0..(d - 1), 0..h, 0..w]);
        let grad_h = field.clone().slice([0..b, 0..c, 0..d, 1..h, 0..w])
            - field.clone().slice([0..b, 0..c, 0..d, 0..(h - 1), 0..w]);
        let grad_w = field.clone().slice([0..b, 0..c, 0..d, 0..h, 1..w])
            - field.slice([0..b, 0..c, 0..d, 0..h, 0..(w - 1)]);

        (grad_d, grad_h, grad_w)
    }
}
