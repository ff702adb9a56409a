//! Per-structure Dice overlap between label volumes.

use std::collections::HashSet;
use std::fmt;

use burn::tensor::backend::Backend;
use burn::tensor::ElementConversion;
use diffreg_core::error::ensure_same_shape;
use diffreg_core::image::LabelVolume;
use serde::{Deserialize, Serialize};

use crate::error::{RegistrationError, Result};

/// Named, ordered set of structure labels to score.
///
/// Labels are unique and the selection is never empty. The background label
/// 0 is only accepted through [`LabelSelection::including_background`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelSelection {
    name: String,
    labels: Vec<i64>,
}

impl LabelSelection {
    /// Create a selection of foreground labels.
    pub fn new(name: impl Into<String>, labels: Vec<i64>) -> Result<Self> {
        if labels.contains(&0) {
            return Err(RegistrationError::invalid_configuration(
                "label selection contains background label 0",
            ));
        }
        Self::including_background(name, labels)
    }

    /// Create a selection that may contain the background label.
    pub fn including_background(name: impl Into<String>, labels: Vec<i64>) -> Result<Self> {
        let name = name.into();
        if labels.is_empty() {
            return Err(RegistrationError::invalid_configuration(format!(
                "label selection '{name}' is empty"
            )));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = labels.iter().find(|&&l| !seen.insert(l)) {
            return Err(RegistrationError::invalid_configuration(format!(
                "label selection '{name}' lists label {dup} more than once"
            )));
        }
        Ok(Self { name, labels })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn labels(&self) -> &[i64] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// One Dice score per selected label, in selection order.
#[derive(Debug, Clone, PartialEq)]
pub struct DiceScores {
    labels: Vec<i64>,
    scores: Vec<f64>,
}

impl DiceScores {
    /// Pair precomputed scores with their labels.
    pub fn new(labels: Vec<i64>, scores: Vec<f64>) -> Result<Self> {
        if labels.len() != scores.len() {
            return Err(RegistrationError::metric(format!(
                "{} scores for {} labels",
                scores.len(),
                labels.len()
            )));
        }
        Ok(Self { labels, scores })
    }

    pub fn labels(&self) -> &[i64] {
        &self.labels
    }

    pub fn values(&self) -> &[f64] {
        &self.scores
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Score for `label`, if selected.
    pub fn get(&self, label: i64) -> Option<f64> {
        self.labels
            .iter()
            .position(|&l| l == label)
            .map(|i| self.scores[i])
    }

    /// Mean over all selected structures.
    pub fn mean(&self) -> f64 {
        self.scores.iter().sum::<f64>() / self.scores.len() as f64
    }
}

impl fmt::Display for DiceScores {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .labels
            .iter()
            .zip(&self.scores)
            .map(|(l, s)| format!("{l}: {s:.4}"))
            .collect();
        write!(f, "[{}]", parts.join(", "))
    }
}

/// Dice overlap `2|A ∩ B| / (|A| + |B|)` per selected structure.
///
/// A structure absent from both volumes scores 1.0.
#[derive(Debug, Clone)]
pub struct DiceMetric {
    selection: LabelSelection,
}

impl DiceMetric {
    pub fn new(selection: LabelSelection) -> Self {
        Self { selection }
    }

    pub fn selection(&self) -> &LabelSelection {
        &self.selection
    }

    /// Score `a` against `b`. Both volumes must have the same shape.
    pub fn compute<B: Backend>(&self, a: &LabelVolume<B>, b: &LabelVolume<B>) -> Result<DiceScores> {
        ensure_same_shape(&a.shape(), &b.shape())?;

        let scores = self
            .selection
            .labels()
            .iter()
            .map(|&label| {
                let in_a = a.data().clone().equal_elem(label).int();
                let in_b = b.data().clone().equal_elem(label).int();
                let size_a = in_a.clone().sum().into_scalar().elem::<i64>();
                let size_b = in_b.clone().sum().into_scalar().elem::<i64>();
                let overlap = (in_a * in_b).sum().into_scalar().elem::<i64>();
                dice(overlap, size_a, size_b)
            })
            .collect();

        Ok(DiceScores {
            labels: self.selection.labels().to_vec(),
            scores,
        })
    }
}

fn dice(overlap: i64, size_a: i64, size_b: i64) -> f64 {
    let total = size_a + size_b;
    if total == 0 {
        1.0
    } else {
        2.0 * overlap as f64 / total as f64
    }
}
