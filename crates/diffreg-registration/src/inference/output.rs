use std::path::PathBuf;

use burn::tensor::backend::Backend;

use super::dataset::Sample;
use super::model::Trajectory;
use crate::error::Result;

/// Persists the artifacts of one evaluated sample.
pub trait ExampleWriter<B: Backend> {
    /// Write `{id}_mov`, `{id}_fix`, `{id}_mov_label`, `{id}_fix_label`,
    /// `{id}_scores` and `{id}_moved` volumes.
    fn write_volumes(&mut self, sample: &Sample<B>, trajectory: &Trajectory) -> Result<Vec<PathBuf>>;

    /// Write 2D snapshots of depth slice `slice`.
    fn write_snapshots(
        &mut self,
        sample: &Sample<B>,
        trajectory: &Trajectory,
        slice: usize,
    ) -> Result<Vec<PathBuf>>;
}
