use burn::config::Config;
use burn::tensor::backend::Backend;
use serde::{Deserialize, Serialize};

use super::dataset::Sample;
use crate::error::RegistrationError;
use crate::metric::LabelSelection;

/// Artifact format for saved examples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// Evaluate only.
    None,
    /// Volumes and stacked trajectories as `.nii.gz`.
    Nifti,
    /// Grayscale snapshots of one depth slice.
    Png,
}

/// Configuration for an inference run.
#[derive(Config, Debug)]
pub struct InferenceConfig {
    /// Structure labels scored by Dice, in reporting order.
    pub labels: Vec<i64>,
    /// Name of the label selection, used in logs.
    #[config(default = "String::from(\"structures\")")]
    pub label_set_name: String,
    /// Artifact format.
    #[config(default = "OutputMode::Nifti")]
    pub output_mode: OutputMode,
    /// Maximum number of samples whose artifacts are saved.
    pub save_examples: Option<usize>,
    /// Stop the run once the save cap is reached. When unset, saving stops
    /// and evaluation continues.
    #[config(default = "true")]
    pub stop_after_save_cap: bool,
    /// Depth slice written in PNG mode.
    #[config(default = "12")]
    pub snapshot_slice: usize,
    /// Keep every reverse-diffusion step in the trajectory.
    #[config(default = "true")]
    pub return_all_steps: bool,
}

impl InferenceConfig {
    /// Validate the configuration and build its label selection.
    pub fn validate(&self) -> crate::error::Result<LabelSelection> {
        if self.save_examples == Some(0) {
            return Err(RegistrationError::invalid_configuration(
                "save_examples must be at least 1; use output_mode \"none\" to disable saving",
            ));
        }
        LabelSelection::new(self.label_set_name.clone(), self.labels.clone())
    }

    /// Check settings that depend on the sample geometry.
    pub fn validate_sample<B: Backend>(&self, sample: &Sample<B>) -> crate::error::Result<()> {
        let [depth, _, _] = sample.shape();
        if self.output_mode == OutputMode::Png && self.snapshot_slice >= depth {
            return Err(RegistrationError::invalid_configuration(format!(
                "snapshot slice {} is outside a volume of depth {depth}",
                self.snapshot_slice
            )));
        }
        Ok(())
    }

    /// Whether artifacts are written at all.
    pub fn saves_output(&self) -> bool {
        self.output_mode != OutputMode::None
    }

    /// Whether `saved` examples exhaust the save cap.
    pub fn save_cap_reached(&self, saved: usize) -> bool {
        self.saves_output() && self.save_examples.is_some_and(|cap| saved >= cap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = InferenceConfig::new(vec![1, 2, 3]);
        assert_eq!(config.output_mode, OutputMode::Nifti);
        assert_eq!(config.snapshot_slice, 12);
        assert!(config.return_all_steps);
        assert!(config.stop_after_save_cap);
        assert_eq!(config.save_examples, None);
        assert_eq!(config.validate().unwrap().labels(), &[1, 2, 3]);
    }

    #[test]
    fn test_json_round_trip() {
        let mut config = InferenceConfig::new(vec![2, 3]);
        config.output_mode = OutputMode::Png;
        config.save_examples = Some(4);

        let loaded = InferenceConfig::load_binary(config.to_string().as_bytes()).unwrap();
        assert_eq!(loaded.labels, vec![2, 3]);
        assert_eq!(loaded.output_mode, OutputMode::Png);
        assert_eq!(loaded.save_examples, Some(4));
        assert!(loaded.stop_after_save_cap);
    }

    #[test]
    fn test_save_cap() {
        let mut config = InferenceConfig::new(vec![1]);
        assert!(!config.save_cap_reached(100));

        config.save_examples = Some(2);
        assert!(!config.save_cap_reached(1));
        assert!(config.save_cap_reached(2));

        config.output_mode = OutputMode::None;
        assert!(!config.save_cap_reached(2));
    }

    #[test]
    fn test_invalid_configurations() {
        assert!(InferenceConfig::new(vec![]).validate().is_err());
        assert!(InferenceConfig::new(vec![1, 1]).validate().is_err());

        let mut config = InferenceConfig::new(vec![1]);
        config.save_examples = Some(0);
        assert!(config.validate().is_err());
    }
}
