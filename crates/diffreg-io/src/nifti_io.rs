//! NIfTI reading and writing.
//!
//! NIfTI stores voxels as `[X, Y, Z(, T)]` with x fastest. Volumes in diffreg
//! are `[D, H, W]`, so spatial axes are reversed on the way in and on the way
//! out. Everything is written with an identity affine.

use std::path::Path;

use anyhow::{bail, Context, Result};
use burn::tensor::backend::Backend;
use diffreg_core::image::{LabelVolume, Volume};
use nalgebra::Matrix4;
use ndarray::{Array3, Array4, Ix3};
use nifti::writer::WriterOptions;
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};

/// Read a 3D NIfTI file into a host `[D, H, W]` array.
pub fn read_array<P: AsRef<Path>>(path: P) -> Result<Array3<f32>> {
    let path = path.as_ref();
    let obj = ReaderOptions::new()
        .read_file(path)
        .with_context(|| format!("Failed to read NIfTI file {}", path.display()))?;

    let volume = obj
        .into_volume()
        .into_ndarray::<f32>()
        .context("Failed to convert volume to ndarray")?;
    if volume.ndim() != 3 {
        bail!("Expected 3D NIfTI file, found {} dimensions", volume.ndim());
    }
    let xyz = volume
        .into_dimensionality::<Ix3>()
        .context("Failed to view volume as 3D")?;

    // [X, Y, Z] -> [D, H, W] in standard layout whatever the source strides.
    let dhw = xyz.reversed_axes();
    let (d, h, w) = dhw.dim();
    let values: Vec<f32> = dhw.iter().copied().collect();
    Array3::from_shape_vec((d, h, w), values).context("Failed to build [D, H, W] array")
}

/// Read an intensity volume.
pub fn read_volume<B: Backend, P: AsRef<Path>>(path: P, device: &B::Device) -> Result<Volume<B>> {
    Ok(Volume::from_array(&read_array(path)?, device))
}

/// Read a label volume; stored values are rounded to the nearest integer.
pub fn read_labels<B: Backend, P: AsRef<Path>>(
    path: P,
    device: &B::Device,
) -> Result<LabelVolume<B>> {
    let labels = read_array(path)?.mapv(|v| v.round() as i32);
    Ok(LabelVolume::from_array(&labels, device))
}

/// Header carrying an identity sform.
fn identity_header() -> NiftiHeader {
    let affine = Matrix4::<f32>::identity();
    let row = |r: usize| [affine[(r, 0)], affine[(r, 1)], affine[(r, 2)], affine[(r, 3)]];
    NiftiHeader {
        sform_code: 1,
        qform_code: 0,
        srow_x: row(0),
        srow_y: row(1),
        srow_z: row(2),
        ..NiftiHeader::default()
    }
}

/// Write a host `[D, H, W]` array. A `.gz` suffix enables compression.
pub fn write_array<P: AsRef<Path>>(path: P, array: &Array3<f32>) -> Result<()> {
    let path = path.as_ref();
    let xyz = array.view().reversed_axes().as_standard_layout().into_owned();
    WriterOptions::new(path)
        .reference_header(&identity_header())
        .write_nifti(&xyz)
        .with_context(|| format!("Failed to write NIfTI file {}", path.display()))
}

/// Write an intensity volume.
pub fn write_volume<B: Backend, P: AsRef<Path>>(path: P, volume: &Volume<B>) -> Result<()> {
    let array = volume.to_array().context("Failed to copy volume to host")?;
    write_array(path, &array)
}

/// Write a label volume as floating point voxels.
pub fn write_labels<B: Backend, P: AsRef<Path>>(path: P, labels: &LabelVolume<B>) -> Result<()> {
    let array = labels.to_array().context("Failed to copy labels to host")?;
    write_array(path, &array.mapv(|v| v as f32))
}

/// Write a `[D, H, W, T]` stack as a 4D NIfTI file with frames last.
pub fn write_stack<P: AsRef<Path>>(path: P, stack: &Array4<f32>) -> Result<()> {
    let path = path.as_ref();
    if stack.len_of(ndarray::Axis(3)) == 0 {
        bail!("Refusing to write an empty frame stack to {}", path.display());
    }
    let xyzt = stack
        .view()
        .permuted_axes([2, 1, 0, 3])
        .as_standard_layout()
        .into_owned();
    WriterOptions::new(path)
        .reference_header(&identity_header())
        .write_nifti(&xyzt)
        .with_context(|| format!("Failed to write NIfTI file {}", path.display()))
}
