//! Moving/fixed pairs stored as NIfTI files in one directory.
//!
//! Each sample `{id}` is four sibling files sharing one extension
//! (`.nii` or `.nii.gz`): `{id}_mov`, `{id}_fix`, `{id}_mov_label` and
//! `{id}_fix_label`. Samples are ordered by id.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use burn::tensor::backend::Backend;
use diffreg_registration::inference::{sample_id_from_path, RegistrationDataset, Sample};
use diffreg_registration::RegistrationError;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::nifti_io::{read_labels, read_volume};

const MOVING_SUFFIX: &str = "_mov";
const EXTENSIONS: [&str; 2] = [".nii.gz", ".nii"];

/// Paths of the four files of one sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairFiles {
    pub id: String,
    pub moving: PathBuf,
    pub fixed: PathBuf,
    pub moving_label: PathBuf,
    pub fixed_label: PathBuf,
}

impl PairFiles {
    fn from_moving(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        let ext = EXTENSIONS.into_iter().find(|ext| name.ends_with(*ext))?;
        let stem = sample_id_from_path(path);
        let id = stem.strip_suffix(MOVING_SUFFIX).filter(|id| !id.is_empty())?;
        let dir = path.parent()?;
        let sibling = |suffix: &str| dir.join(format!("{id}{suffix}{ext}"));
        Some(Self {
            id: id.to_string(),
            moving: path.to_path_buf(),
            fixed: sibling("_fix"),
            moving_label: sibling("_mov_label"),
            fixed_label: sibling("_fix_label"),
        })
    }

    fn missing(&self) -> Vec<&Path> {
        [&self.fixed, &self.moving_label, &self.fixed_label]
            .into_iter()
            .filter(|p| !p.is_file())
            .map(PathBuf::as_path)
            .collect()
    }
}

/// Dataset over the `{id}_mov` files of a directory.
#[derive(Debug, Clone)]
pub struct NiftiPairDataset<B: Backend> {
    pairs: Vec<PairFiles>,
    device: B::Device,
}

impl<B: Backend> NiftiPairDataset<B> {
    /// Scan `root` (not recursively). Fails when a sibling file is missing.
    pub fn open<P: AsRef<Path>>(root: P, device: &B::Device) -> Result<Self> {
        let root = root.as_ref();
        if !root.is_dir() {
            bail!("Dataset root {} is not a directory", root.display());
        }

        let mut pairs = Vec::new();
        for entry in WalkDir::new(root).min_depth(1).max_depth(1) {
            let entry = entry.with_context(|| format!("Failed to scan {}", root.display()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(pair) = PairFiles::from_moving(entry.path()) else {
                continue;
            };
            let missing = pair.missing();
            if !missing.is_empty() {
                bail!(
                    "Sample {} is incomplete, missing {}",
                    pair.id,
                    missing
                        .iter()
                        .map(|p| p.display().to_string())
                        .collect::<Vec<_>>()
                        .join(", ")
                );
            }
            debug!("found sample {}", pair.id);
            pairs.push(pair);
        }
        pairs.sort_by(|a, b| a.id.cmp(&b.id));

        info!("Found {} samples in {}", pairs.len(), root.display());
        Ok(Self {
            pairs,
            device: device.clone(),
        })
    }

    pub fn pairs(&self) -> &[PairFiles] {
        &self.pairs
    }

    fn load(&self, pair: &PairFiles) -> Result<Sample<B>> {
        Ok(Sample {
            id: pair.id.clone(),
            moving: read_volume(&pair.moving, &self.device)?,
            fixed: read_volume(&pair.fixed, &self.device)?,
            moving_label: read_labels(&pair.moving_label, &self.device)?,
            fixed_label: read_labels(&pair.fixed_label, &self.device)?,
        })
    }
}

impl<B: Backend> RegistrationDataset<B> for NiftiPairDataset<B> {
    fn len(&self) -> usize {
        self.pairs.len()
    }

    fn get(&self, index: usize) -> diffreg_registration::Result<Sample<B>> {
        let pair = self.pairs.get(index).ok_or_else(|| {
            RegistrationError::dataset(format!(
                "sample index {index} out of range for {} samples",
                self.pairs.len()
            ))
        })?;
        self.load(pair)
            .map_err(|e| RegistrationError::dataset(format!("{e:#}")))
    }
}
