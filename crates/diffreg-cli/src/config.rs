//! Run configuration loaded from JSON.

use std::path::Path;

use anyhow::{anyhow, bail, Result};
use burn::prelude::*;
use diffreg_model::DiffusionConfig;
use diffreg_registration::InferenceConfig;

/// Everything one inference run needs.
#[derive(Config, Debug)]
pub struct RunConfig {
    /// Run name, used in logs.
    pub name: String,
    /// Directory receiving saved examples.
    pub results_dir: String,
    /// Directory holding `{id}_mov` / `{id}_fix` NIfTI pairs.
    pub dataset_root: String,
    /// Evaluation settings.
    pub inference: InferenceConfig,
    /// Reference model settings.
    #[config(default = "DiffusionConfig::new()")]
    pub model: DiffusionConfig,
    /// Denoiser weights saved by the recorder, without the `.mpk` extension.
    pub checkpoint: Option<String>,
    /// Seed for weight initialisation and sampling noise.
    #[config(default = "42")]
    pub seed: u64,
}

impl RunConfig {
    /// Load and validate a JSON run configuration.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let config = Self::load(path)
            .map_err(|e| anyhow!("Failed to load config {}: {e}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.results_dir.trim().is_empty() {
            bail!("results_dir must not be empty");
        }
        if self.dataset_root.trim().is_empty() {
            bail!("dataset_root must not be empty");
        }
        self.inference.validate()?;
        self.model.denoiser.validate()?;
        self.model.schedule.init()?;
        Ok(())
    }

    pub fn checkpoint_path(&self) -> Option<&Path> {
        self.checkpoint.as_deref().map(Path::new)
    }
}
