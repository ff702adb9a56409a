//! Result directory writer for evaluated samples.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use burn::tensor::backend::Backend;
use diffreg_registration::inference::{ExampleWriter, Sample, Trajectory};
use diffreg_registration::RegistrationError;
use ndarray::Array3;

use crate::nifti_io::{write_labels, write_stack, write_volume};
use crate::png_io::{depth_slice, write_slice_png};

/// Writes sample artifacts into one result directory.
#[derive(Debug, Clone)]
pub struct ResultWriter {
    dir: PathBuf,
}

impl ResultWriter {
    /// Use `dir` as the result directory, creating it if needed.
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create result directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, id: &str, suffix: &str) -> PathBuf {
        self.dir.join(format!("{id}_{suffix}"))
    }

    fn volumes<B: Backend>(&self, sample: &Sample<B>, trajectory: &Trajectory) -> Result<Vec<PathBuf>> {
        let id = &sample.id;
        let paths = ["mov", "fix", "mov_label", "fix_label", "scores", "moved"]
            .map(|suffix| self.path(id, &format!("{suffix}.nii.gz")));

        write_volume(&paths[0], &sample.moving)?;
        write_volume(&paths[1], &sample.fixed)?;
        write_labels(&paths[2], &sample.moving_label)?;
        write_labels(&paths[3], &sample.fixed_label)?;
        write_stack(&paths[4], &trajectory.code_stack())?;
        write_stack(&paths[5], &trajectory.deform_stack())?;
        Ok(paths.to_vec())
    }

    fn snapshots<B: Backend>(
        &self,
        sample: &Sample<B>,
        trajectory: &Trajectory,
        slice: usize,
    ) -> Result<Vec<PathBuf>> {
        let id = &sample.id;
        let mut written = Vec::new();

        for (suffix, volume) in [("mov", &sample.moving), ("fix", &sample.fixed)] {
            let array = volume.to_array()?.mapv(|v| (v + 1.0) / 2.0 * 255.0);
            let path = self.path(id, &format!("{suffix}.png"));
            write_slice_png(&path, depth_slice(&array, slice)?)?;
            written.push(path);
        }

        let refined = trajectory.refined_frames();
        let Some(last) = refined.last() else {
            return Ok(written);
        };
        let (offset, scale) = code_normalization(&last.code, slice)?;

        for (k, frame) in refined.iter().enumerate() {
            let k = k + 1;
            let deform = frame.deform.mapv(|v| v * 255.0);
            let path = self.path(id, &format!("frame{k}.png"));
            write_slice_png(&path, depth_slice(&deform, slice)?)?;
            written.push(path);

            let code = frame.code.mapv(|v| (v - offset) / scale * 255.0);
            let path = self.path(id, &format!("code{k}.png"));
            write_slice_png(&path, depth_slice(&code, slice)?)?;
            written.push(path);
        }
        Ok(written)
    }
}

/// Offset and scale mapping the final code slice onto [0, 1].
fn code_normalization(code: &Array3<f32>, slice: usize) -> Result<(f32, f32)> {
    let view = depth_slice(code, slice)?;
    let (min, max) = view.fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
        (lo.min(v), hi.max(v))
    });
    let range = max - min;
    let scale = if range.is_finite() && range > f32::EPSILON { range } else { 1.0 };
    let offset = if min.is_finite() { min } else { 0.0 };
    Ok((offset, scale))
}

fn output_error(e: anyhow::Error) -> RegistrationError {
    RegistrationError::output(format!("{e:#}"))
}

impl<B: Backend> ExampleWriter<B> for ResultWriter {
    fn write_volumes(
        &mut self,
        sample: &Sample<B>,
        trajectory: &Trajectory,
    ) -> diffreg_registration::Result<Vec<PathBuf>> {
        self.volumes(sample, trajectory).map_err(output_error)
    }

    fn write_snapshots(
        &mut self,
        sample: &Sample<B>,
        trajectory: &Trajectory,
        slice: usize,
    ) -> diffreg_registration::Result<Vec<PathBuf>> {
        self.snapshots(sample, trajectory, slice).map_err(output_error)
    }
}
