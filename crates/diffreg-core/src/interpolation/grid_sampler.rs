//! Grid sampling with nearest and trilinear interpolation.
//!
//! Samples a `[N, C, D, H, W]` input at the normalized coordinates of a
//! [`SamplingGrid`]. With `align_corners` the grid value -1 addresses voxel
//! index 0 and +1 addresses index `size - 1`, which is the exact inverse of
//! [`crate::transform::normalize_coordinates`].

use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor};

use crate::error::{RegistrationError, Result};
use crate::transform::SamplingGrid;

/// Value used for coordinates outside the input volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PaddingMode {
    /// Out-of-bounds samples read as zero.
    #[default]
    Zeros,
    /// Out-of-bounds samples read the nearest border voxel.
    Border,
}

/// Interpolation kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterpolationMode {
    /// Nearest neighbour. The only mode valid for label volumes.
    Nearest,
    /// Trilinear.
    Linear,
}

/// Samples tensors at sampling-grid coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridSampler {
    pub interpolation: InterpolationMode,
    pub padding: PaddingMode,
    pub align_corners: bool,
}

impl GridSampler {
    /// Nearest-neighbour sampler with zero padding and aligned corners.
    pub fn nearest() -> Self {
        Self {
            interpolation: InterpolationMode::Nearest,
            padding: PaddingMode::Zeros,
            align_corners: true,
        }
    }

    /// Trilinear sampler with zero padding and aligned corners.
    pub fn trilinear() -> Self {
        Self {
            interpolation: InterpolationMode::Linear,
            padding: PaddingMode::Zeros,
            align_corners: true,
        }
    }

    pub fn with_padding(mut self, padding: PaddingMode) -> Self {
        self.padding = padding;
        self
    }

    pub fn with_align_corners(mut self, align_corners: bool) -> Self {
        self.align_corners = align_corners;
        self
    }

    /// Sample `input` at every grid location.
    ///
    /// Returns `[N, C, D_out, H_out, W_out]` where the output spatial shape is
    /// the grid's. The grid batch must match the input batch.
    pub fn sample<B: Backend>(
        &self,
        input: Tensor<B, 5>,
        grid: &SamplingGrid<B>,
    ) -> Result<Tensor<B, 5>> {
        let [n, _, d_in, h_in, w_in] = input.dims();
        if grid.batch() != n {
            return Err(RegistrationError::dimension_mismatch(format!(
                "sampling grid batch {} does not match input batch {n}",
                grid.batch()
            )));
        }
        if d_in == 0 || h_in == 0 || w_in == 0 {
            return Err(RegistrationError::dimension_mismatch(
                "cannot sample an empty volume",
            ));
        }

        let (ix, iy, iz) = self.denormalize(grid, [d_in, h_in, w_in]);
        let out = match self.interpolation {
            InterpolationMode::Nearest => self.sample_nearest(&input, ix, iy, iz),
            InterpolationMode::Linear => self.sample_trilinear(&input, ix, iy, iz),
        };
        Ok(out)
    }

    /// Split the grid into voxel-index coordinates `(x, y, z)` = `(w, h, d)`.
    fn denormalize<B: Backend>(
        &self,
        grid: &SamplingGrid<B>,
        [d_in, h_in, w_in]: [usize; 3],
    ) -> (Tensor<B, 4>, Tensor<B, 4>, Tensor<B, 4>) {
        let grid = grid.tensor();
        let [n, d, h, w, _] = grid.dims();
        let coordinate = |c: usize, size: usize| {
            let v = grid
                .clone()
                .slice([0..n, 0..d, 0..h, 0..w, c..c + 1])
                .squeeze::<4>(4);
            if self.align_corners {
                v.add_scalar(1.0).mul_scalar((size - 1) as f32 / 2.0)
            } else {
                v.add_scalar(1.0).mul_scalar(size as f32).sub_scalar(1.0).div_scalar(2.0)
            }
        };
        (
            coordinate(0, w_in),
            coordinate(1, h_in),
            coordinate(2, d_in),
        )
    }

    fn sample_nearest<B: Backend>(
        &self,
        input: &Tensor<B, 5>,
        ix: Tensor<B, 4>,
        iy: Tensor<B, 4>,
        iz: Tensor<B, 4>,
    ) -> Tensor<B, 5> {
        let [_, _, d_in, h_in, w_in] = input.dims();
        let ix = ix.round();
        let iy = iy.round();
        let iz = iz.round();

        let mask = match self.padding {
            PaddingMode::Zeros => Some(
                in_bounds(&ix, w_in) * in_bounds(&iy, h_in) * in_bounds(&iz, d_in),
            ),
            PaddingMode::Border => None,
        };

        let values = gather(
            input,
            &clamp_index(iz, d_in),
            &clamp_index(iy, h_in),
            &clamp_index(ix, w_in),
        );
        apply_mask(values, mask)
    }

    fn sample_trilinear<B: Backend>(
        &self,
        input: &Tensor<B, 5>,
        ix: Tensor<B, 4>,
        iy: Tensor<B, 4>,
        iz: Tensor<B, 4>,
    ) -> Tensor<B, 5> {
        let [_, _, d_in, h_in, w_in] = input.dims();
        let (ix, iy, iz) = match self.padding {
            PaddingMode::Border => (
                ix.clamp(0.0, (w_in - 1) as f32),
                iy.clamp(0.0, (h_in - 1) as f32),
                iz.clamp(0.0, (d_in - 1) as f32),
            ),
            PaddingMode::Zeros => (ix, iy, iz),
        };

        let x = Corners::new(ix, w_in, self.padding);
        let y = Corners::new(iy, h_in, self.padding);
        let z = Corners::new(iz, d_in, self.padding);

        let [n, c, _, _, _] = input.dims();
        let [_, d_out, h_out, w_out] = x.w0.dims();
        let weight = |t: &Tensor<B, 4>| t.clone().reshape([n, 1, d_out, h_out, w_out]);

        let mut result = Tensor::<B, 5>::zeros([n, c, d_out, h_out, w_out], &input.device());
        for (zi, wz) in [(&z.i0, &z.w0), (&z.i1, &z.w1)] {
            for (yi, wy) in [(&y.i0, &y.w0), (&y.i1, &y.w1)] {
                for (xi, wx) in [(&x.i0, &x.w0), (&x.i1, &x.w1)] {
                    let corner = gather(input, zi, yi, xi);
                    let w = weight(wz) * weight(wy) * weight(wx);
                    result = result + corner * w;
                }
            }
        }
        result
    }
}

/// Lower and upper neighbour along one axis with their interpolation weights.
///
/// Under zero padding a neighbour outside the volume keeps its weight at zero,
/// so partially outside samples blend with zero.
struct Corners<B: Backend> {
    i0: Tensor<B, 4, Int>,
    i1: Tensor<B, 4, Int>,
    w0: Tensor<B, 4>,
    w1: Tensor<B, 4>,
}

impl<B: Backend> Corners<B> {
    fn new(coord: Tensor<B, 4>, size: usize, padding: PaddingMode) -> Self {
        let lower = coord.clone().floor();
        let upper = lower.clone().add_scalar(1.0);
        let w1 = coord - lower.clone();
        let w0 = w1.clone().neg().add_scalar(1.0);

        let (w0, w1) = match padding {
            PaddingMode::Zeros => (w0 * in_bounds(&lower, size), w1 * in_bounds(&upper, size)),
            PaddingMode::Border => (w0, w1),
        };

        Self {
            i0: clamp_index(lower, size),
            i1: clamp_index(upper, size),
            w0,
            w1,
        }
    }
}

/// 1.0 where `index` lies inside `[0, size - 1]`, else 0.0.
fn in_bounds<B: Backend>(index: &Tensor<B, 4>, size: usize) -> Tensor<B, 4> {
    let lower = index.clone().greater_equal_elem(0.0).float();
    let upper = index.clone().lower_equal_elem((size - 1) as f32).float();
    lower * upper
}

fn clamp_index<B: Backend>(index: Tensor<B, 4>, size: usize) -> Tensor<B, 4, Int> {
    index.clamp(0.0, (size - 1) as f32).int()
}

fn apply_mask<B: Backend>(values: Tensor<B, 5>, mask: Option<Tensor<B, 4>>) -> Tensor<B, 5> {
    match mask {
        Some(mask) => {
            let [n, d, h, w] = mask.dims();
            values * mask.reshape([n, 1, d, h, w])
        }
        None => values,
    }
}

/// Gather input values at integer `(z, y, x)` indices, one per output voxel.
fn gather<B: Backend>(
    input: &Tensor<B, 5>,
    iz: &Tensor<B, 4, Int>,
    iy: &Tensor<B, 4, Int>,
    ix: &Tensor<B, 4, Int>,
) -> Tensor<B, 5> {
    let [n, c, d_in, h_in, w_in] = input.dims();
    let [_, d_out, h_out, w_out] = iz.dims();

    let flat = input.clone().reshape([n, c, d_in * h_in * w_in]);
    let idx = iz.clone().mul_scalar((h_in * w_in) as i64)
        + iy.clone().mul_scalar(w_in as i64)
        + ix.clone();
    let idx = idx
        .reshape([n, 1, d_out * h_out * w_out])
        .repeat(&[1, c, 1]);

    flat.gather(2, idx).reshape([n, c, d_out, h_out, w_out])
}
