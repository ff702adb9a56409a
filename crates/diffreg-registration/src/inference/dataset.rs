//! Registration samples and the dataset seam.

use std::path::Path;

use burn::tensor::backend::Backend;
use diffreg_core::error::ensure_same_shape;
use diffreg_core::image::{LabelVolume, Volume};

use crate::error::{RegistrationError, Result};

/// One moving/fixed pair with its segmentations.
#[derive(Debug, Clone)]
pub struct Sample<B: Backend> {
    /// Identifier used to name saved artifacts.
    pub id: String,
    /// Source volume, intensities in [-1, 1].
    pub moving: Volume<B>,
    /// Target volume, intensities in [-1, 1].
    pub fixed: Volume<B>,
    /// Labels of the moving volume.
    pub moving_label: LabelVolume<B>,
    /// Labels of the fixed volume.
    pub fixed_label: LabelVolume<B>,
}

impl<B: Backend> Sample<B> {
    /// Spatial shape `[D, H, W]` shared by all four volumes.
    pub fn shape(&self) -> [usize; 3] {
        self.moving.shape()
    }

    /// Check that all four volumes share one spatial shape.
    pub fn validate(&self) -> Result<()> {
        let shape = self.shape();
        ensure_same_shape(&shape, &self.fixed.shape())?;
        ensure_same_shape(&shape, &self.moving_label.shape())?;
        ensure_same_shape(&shape, &self.fixed_label.shape())?;
        Ok(())
    }

    pub fn device(&self) -> B::Device {
        self.moving.device()
    }
}

/// Finite, indexable source of registration samples.
pub trait RegistrationDataset<B: Backend> {
    /// Total number of samples.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Load the sample at `index`.
    fn get(&self, index: usize) -> Result<Sample<B>>;
}

/// Dataset over samples already held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDataset<B: Backend> {
    samples: Vec<Sample<B>>,
}

impl<B: Backend> InMemoryDataset<B> {
    pub fn new(samples: Vec<Sample<B>>) -> Self {
        Self { samples }
    }

    pub fn push(&mut self, sample: Sample<B>) {
        self.samples.push(sample);
    }
}

impl<B: Backend> RegistrationDataset<B> for InMemoryDataset<B> {
    fn len(&self) -> usize {
        self.samples.len()
    }

    fn get(&self, index: usize) -> Result<Sample<B>> {
        self.samples.get(index).cloned().ok_or_else(|| {
            RegistrationError::dataset(format!(
                "sample index {index} out of range for {} samples",
                self.samples.len()
            ))
        })
    }
}

/// Derive a sample id from a file path.
///
/// The directory and every NIfTI extension are dropped, so
/// `data/patient001_frame01.nii.gz` becomes `patient001_frame01`.
pub fn sample_id_from_path(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    for ext in [".nii.gz", ".nii", ".gz"] {
        if let Some(stem) = name.strip_suffix(ext) {
            return stem.to_string();
        }
    }
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => name,
    }
}
