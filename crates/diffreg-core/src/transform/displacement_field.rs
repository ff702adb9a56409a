//! Dense displacement fields and normalized sampling grids.
//!
//! A [`DisplacementField`] stores per-voxel displacements in voxel units with
//! channels in (depth, height, width) order. A [`SamplingGrid`] stores
//! normalized [-1, 1] source coordinates with the coordinate axis last, in
//! (x, y, z) = (width, height, depth) order. Conversions between the two
//! live in [`super::convention`].

use burn::tensor::backend::Backend;
use burn::tensor::{Shape, Tensor, TensorData};
use ndarray::Array4;

use crate::error::{RegistrationError, Result};

/// Dense displacement field `[N, 3, D, H, W]` in voxel units.
#[derive(Debug, Clone)]
pub struct DisplacementField<B: Backend> {
    displacement: Tensor<B, 5>,
}

impl<B: Backend> DisplacementField<B> {
    /// Create a displacement field from a `[N, 3, D, H, W]` tensor.
    pub fn new(displacement: Tensor<B, 5>) -> Result<Self> {
        let dims = displacement.dims();
        if dims[1] != 3 {
            return Err(RegistrationError::dimension_mismatch(format!(
                "displacement field needs 3 channels, got shape {dims:?}"
            )));
        }
        Ok(Self { displacement })
    }

    /// Create a zero displacement field for a single `[D, H, W]` volume.
    pub fn zeros(shape: [usize; 3], device: &B::Device) -> Self {
        let [d, h, w] = shape;
        Self {
            displacement: Tensor::zeros([1, 3, d, h, w], device),
        }
    }

    /// Upload a host field `[3, D, H, W]` as a single-item batch.
    pub fn from_array(array: &Array4<f32>, device: &B::Device) -> Result<Self> {
        let (c, d, h, w) = array.dim();
        let values: Vec<f32> = array.iter().copied().collect();
        let tensor = Tensor::<B, 5>::from_data(
            TensorData::new(values, Shape::new([1, c, d, h, w])),
            device,
        );
        Self::new(tensor)
    }

    /// Get the displacement tensor.
    pub fn tensor(&self) -> &Tensor<B, 5> {
        &self.displacement
    }

    /// Consume the field and return its tensor.
    pub fn into_tensor(self) -> Tensor<B, 5> {
        self.displacement
    }

    /// Full shape `[N, 3, D, H, W]`.
    pub fn dims(&self) -> [usize; 5] {
        self.displacement.dims()
    }

    /// Spatial shape `[D, H, W]`.
    pub fn spatial_shape(&self) -> [usize; 3] {
        let [_, _, d, h, w] = self.dims();
        [d, h, w]
    }

    /// Device the field lives on.
    pub fn device(&self) -> B::Device {
        self.displacement.device()
    }
}

/// Normalized sampling grid `[N, D, H, W, 3]`, last axis `(x, y, z)`.
#[derive(Debug, Clone)]
pub struct SamplingGrid<B: Backend> {
    grid: Tensor<B, 5>,
}

impl<B: Backend> SamplingGrid<B> {
    /// Create a sampling grid from a `[N, D, H, W, 3]` tensor.
    pub fn new(grid: Tensor<B, 5>) -> Result<Self> {
        let dims = grid.dims();
        if dims[4] != 3 {
            return Err(RegistrationError::dimension_mismatch(format!(
                "sampling grid needs 3 coordinates on its last axis, got shape {dims:?}"
            )));
        }
        Ok(Self { grid })
    }

    pub(crate) fn from_tensor(grid: Tensor<B, 5>) -> Self {
        Self { grid }
    }

    /// Get the grid tensor.
    pub fn tensor(&self) -> &Tensor<B, 5> {
        &self.grid
    }

    /// Consume the grid and return its tensor.
    pub fn into_tensor(self) -> Tensor<B, 5> {
        self.grid
    }

    /// Batch size `N`.
    pub fn batch(&self) -> usize {
        self.grid.dims()[0]
    }

    /// Destination shape `[D, H, W]`.
    pub fn spatial_shape(&self) -> [usize; 3] {
        let [_, d, h, w, _] = self.grid.dims();
        [d, h, w]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_displacement_field_requires_three_channels() {
        let device = Default::default();
        let tensor = Tensor::<TestBackend, 5>::zeros([1, 2, 4, 4, 4], &device);
        assert!(DisplacementField::new(tensor).is_err());
    }

    #[test]
    fn test_displacement_field_zeros() {
        let device = Default::default();
        let field = DisplacementField::<TestBackend>::zeros([4, 5, 6], &device);
        assert_eq!(field.dims(), [1, 3, 4, 5, 6]);
        assert_eq!(field.spatial_shape(), [4, 5, 6]);
    }

    #[test]
    fn test_displacement_field_from_array() {
        let device = Default::default();
        let mut array = Array4::<f32>::zeros((3, 2, 2, 2));
        array[[2, 1, 0, 1]] = 1.5;
        let field = DisplacementField::<TestBackend>::from_array(&array, &device).unwrap();
        let values = field.tensor().to_data().to_vec::<f32>().unwrap();
        // channel 2, voxel (1, 0, 1) -> 2 * 8 + 4 + 1
        assert_eq!(values[21], 1.5);
    }

    #[test]
    fn test_sampling_grid_requires_trailing_coordinates() {
        let device = Default::default();
        let tensor = Tensor::<TestBackend, 5>::zeros([1, 3, 4, 4, 4], &device);
        assert!(SamplingGrid::new(tensor).is_err());
    }
}
