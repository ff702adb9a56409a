//! Metric trait for volume similarity measurement.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use crate::error::Result;

/// Dissimilarity between two batched volumes.
///
/// Lower values indicate better alignment.
///
/// # Type Parameters
/// * `B` - The tensor backend
pub trait Metric<B: Backend> {
    /// Calculate the loss between `input` and `target`.
    ///
    /// # Arguments
    /// * `input` - Predicted volume `[N, C, D, H, W]`
    /// * `target` - Reference volume of the same shape
    ///
    /// # Returns
    /// Single-element tensor holding the loss
    fn forward(&self, input: &Tensor<B, 5>, target: &Tensor<B, 5>) -> Result<Tensor<B, 1>>;

    /// Get the name of this metric.
    fn name(&self) -> &'static str;
}
