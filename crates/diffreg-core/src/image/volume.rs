//! Intensity and label volumes.
//!
//! Every volume in diffreg is stored as a tensor in (depth, height, width)
//! order with the width axis contiguous. Intensity volumes are expected to be
//! normalized to [-1, 1] by the dataset that produces them.

use burn::tensor::backend::Backend;
use burn::tensor::{ElementConversion, Int, Shape, Tensor, TensorData};
use ndarray::Array3;

use crate::error::{RegistrationError, Result};

/// Intensity volume `[D, H, W]`.
///
/// # Examples
/// ```rust
/// use diffreg_core::image::Volume;
/// use burn::tensor::Tensor;
/// use burn_ndarray::NdArray;
///
/// type Backend = NdArray<f32>;
///
/// let device = Default::default();
/// let volume = Volume::new(Tensor::<Backend, 3>::zeros([4, 8, 8], &device));
/// assert_eq!(volume.shape(), [4, 8, 8]);
/// assert_eq!(volume.to_batched().dims(), [1, 1, 4, 8, 8]);
/// ```
#[derive(Debug, Clone)]
pub struct Volume<B: Backend> {
    data: Tensor<B, 3>,
}

impl<B: Backend> Volume<B> {
    /// Wrap an existing `[D, H, W]` tensor.
    pub fn new(data: Tensor<B, 3>) -> Self {
        Self { data }
    }

    /// Build a volume from row-major values.
    pub fn from_vec(values: Vec<f32>, shape: [usize; 3], device: &B::Device) -> Result<Self> {
        check_len(values.len(), shape)?;
        let data = Tensor::<B, 3>::from_data(TensorData::new(values, Shape::new(shape)), device);
        Ok(Self::new(data))
    }

    /// Build a volume from a host array in (depth, height, width) order.
    pub fn from_array(array: &Array3<f32>, device: &B::Device) -> Self {
        let (d, h, w) = array.dim();
        let values: Vec<f32> = array.iter().copied().collect();
        let data = Tensor::<B, 3>::from_data(TensorData::new(values, Shape::new([d, h, w])), device);
        Self::new(data)
    }

    /// Get the intensity tensor.
    pub fn data(&self) -> &Tensor<B, 3> {
        &self.data
    }

    /// Consume the volume and return its tensor.
    pub fn into_data(self) -> Tensor<B, 3> {
        self.data
    }

    /// Spatial shape `[D, H, W]`.
    pub fn shape(&self) -> [usize; 3] {
        self.data.dims()
    }

    /// Device the volume lives on.
    pub fn device(&self) -> B::Device {
        self.data.device()
    }

    /// View as a single-item, single-channel batch `[1, 1, D, H, W]`.
    pub fn to_batched(&self) -> Tensor<B, 5> {
        let [d, h, w] = self.shape();
        self.data.clone().reshape([1, 1, d, h, w])
    }

    /// Recover a volume from a `[1, 1, D, H, W]` batch.
    pub fn from_batched(batched: Tensor<B, 5>) -> Result<Self> {
        let [n, c, d, h, w] = batched.dims();
        if n != 1 || c != 1 {
            return Err(RegistrationError::dimension_mismatch(format!(
                "expected a [1, 1, D, H, W] batch, got [{n}, {c}, {d}, {h}, {w}]"
            )));
        }
        Ok(Self::new(batched.reshape([d, h, w])))
    }

    /// Copy the volume to host memory.
    pub fn to_array(&self) -> Result<Array3<f32>> {
        let [d, h, w] = self.shape();
        let values = float_tensor_to_vec(&self.data)?;
        Array3::from_shape_vec((d, h, w), values)
            .map_err(|e| RegistrationError::data_conversion(e.to_string()))
    }
}

/// Label volume `[D, H, W]` of integer structure identifiers.
#[derive(Debug, Clone)]
pub struct LabelVolume<B: Backend> {
    data: Tensor<B, 3, Int>,
}

impl<B: Backend> LabelVolume<B> {
    /// Wrap an existing integer tensor.
    pub fn new(data: Tensor<B, 3, Int>) -> Self {
        Self { data }
    }

    /// Build a label volume from row-major values.
    pub fn from_vec(values: Vec<i64>, shape: [usize; 3], device: &B::Device) -> Result<Self> {
        check_len(values.len(), shape)?;
        let data =
            Tensor::<B, 3, Int>::from_data(TensorData::new(values, Shape::new(shape)), device);
        Ok(Self::new(data))
    }

    /// Build a label volume from a host array in (depth, height, width) order.
    pub fn from_array(array: &Array3<i32>, device: &B::Device) -> Self {
        let (d, h, w) = array.dim();
        let values: Vec<i64> = array.iter().map(|&v| v as i64).collect();
        let data =
            Tensor::<B, 3, Int>::from_data(TensorData::new(values, Shape::new([d, h, w])), device);
        Self::new(data)
    }

    /// Rebuild labels from a float tensor, rounding to the nearest integer.
    ///
    /// Used after resampling, where labels travel through float grids.
    pub fn from_float(data: Tensor<B, 3>) -> Self {
        Self::new(data.round().int())
    }

    /// Get the label tensor.
    pub fn data(&self) -> &Tensor<B, 3, Int> {
        &self.data
    }

    /// Spatial shape `[D, H, W]`.
    pub fn shape(&self) -> [usize; 3] {
        self.data.dims()
    }

    /// Device the labels live on.
    pub fn device(&self) -> B::Device {
        self.data.device()
    }

    /// Labels as a float tensor `[D, H, W]`.
    pub fn to_float(&self) -> Tensor<B, 3> {
        self.data.clone().float()
    }

    /// Labels as a float single-item, single-channel batch `[1, 1, D, H, W]`.
    pub fn to_batched_float(&self) -> Tensor<B, 5> {
        let [d, h, w] = self.shape();
        self.to_float().reshape([1, 1, d, h, w])
    }

    /// Number of voxels carrying `label`.
    pub fn count(&self, label: i64) -> usize {
        let count = self.data.clone().equal_elem(label).int().sum().into_scalar();
        count.elem::<i64>() as usize
    }

    /// Copy the labels to host memory.
    pub fn to_array(&self) -> Result<Array3<i32>> {
        let [d, h, w] = self.shape();
        let values = self
            .data
            .to_data()
            .convert::<i64>()
            .to_vec::<i64>()
            .map_err(|e| RegistrationError::data_conversion(format!("{e:?}")))?;
        let values = values.into_iter().map(|v| v as i32).collect();
        Array3::from_shape_vec((d, h, w), values)
            .map_err(|e| RegistrationError::data_conversion(e.to_string()))
    }
}

/// Copy any float tensor to a row-major host vector.
pub fn float_tensor_to_vec<B: Backend, const D: usize>(tensor: &Tensor<B, D>) -> Result<Vec<f32>> {
    tensor
        .to_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| RegistrationError::data_conversion(format!("{e:?}")))
}

fn check_len(len: usize, shape: [usize; 3]) -> Result<()> {
    let expected = shape.iter().product::<usize>();
    if len != expected {
        return Err(RegistrationError::dimension_mismatch(format!(
            "{len} values cannot fill a volume of shape {shape:?} ({expected} voxels)"
        )));
    }
    Ok(())
}
