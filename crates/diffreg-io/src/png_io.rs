//! 8-bit grayscale PNG snapshots of single depth slices.

use std::path::Path;

use anyhow::{bail, Context, Result};
use image::GrayImage;
use ndarray::{Array3, ArrayView2, Axis};

/// Write a `[H, W]` slice of values in [0, 255]. Out-of-range values are
/// clamped and the rest rounded to the nearest integer.
pub fn write_slice_png<P: AsRef<Path>>(path: P, slice: ArrayView2<'_, f32>) -> Result<()> {
    let path = path.as_ref();
    let (height, width) = slice.dim();
    let pixels: Vec<u8> = slice
        .iter()
        .map(|&v| if v.is_nan() { 0 } else { v.clamp(0.0, 255.0).round() as u8 })
        .collect();
    let image = GrayImage::from_raw(width as u32, height as u32, pixels)
        .with_context(|| format!("Failed to build {width}x{height} image"))?;
    image
        .save(path)
        .with_context(|| format!("Failed to write PNG file {}", path.display()))
}

/// Depth slice `index` of a `[D, H, W]` volume, checked against the depth.
pub fn depth_slice(volume: &Array3<f32>, index: usize) -> Result<ArrayView2<'_, f32>> {
    let depth = volume.len_of(Axis(0));
    if index >= depth {
        bail!("Slice {index} is outside a volume of depth {depth}");
    }
    Ok(volume.index_axis(Axis(0), index))
}
