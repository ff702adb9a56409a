//! Dataset-wide Dice and timing statistics.

use std::fmt;
use std::time::Duration;

use ndarray::{Array1, Array2};

use crate::error::{RegistrationError, Result};
use crate::metric::DiceScores;

/// Evaluation of one sample.
#[derive(Debug, Clone)]
pub struct SampleRecord {
    pub id: String,
    /// Dice of the moving labels against the fixed labels.
    pub pre: DiceScores,
    /// Dice of the warped moving labels against the fixed labels.
    pub post: DiceScores,
    /// Duration of the model feed and inference calls.
    pub inference_time: Duration,
    /// Whether artifacts were written.
    pub saved: bool,
}

/// Mean and population standard deviation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stats {
    pub mean: f64,
    pub std: f64,
}

impl Stats {
    fn of(values: Array1<f64>) -> Option<Self> {
        let mean = values.mean()?;
        Some(Self {
            mean,
            std: values.std(0.0),
        })
    }
}

/// Per-sample Dice rows and timings accumulated over a run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    labels: Vec<i64>,
    records: Vec<SampleRecord>,
}

impl RunSummary {
    /// Empty summary for the given label selection.
    pub fn new(labels: Vec<i64>) -> Self {
        Self {
            labels,
            records: Vec::new(),
        }
    }

    /// Append one sample. Its scores must follow the summary's labels.
    pub fn push(&mut self, record: SampleRecord) -> Result<()> {
        if record.pre.labels() != self.labels.as_slice()
            || record.post.labels() != self.labels.as_slice()
        {
            return Err(RegistrationError::metric(format!(
                "scores for '{}' do not follow labels {:?}",
                record.id, self.labels
            )));
        }
        self.records.push(record);
        Ok(())
    }

    pub fn labels(&self) -> &[i64] {
        &self.labels
    }

    pub fn records(&self) -> &[SampleRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of samples whose artifacts were written.
    pub fn saved(&self) -> usize {
        self.records.iter().filter(|r| r.saved).count()
    }

    /// Pre-registration Dice, samples × structures.
    pub fn pre_matrix(&self) -> Array2<f64> {
        self.matrix(|r| &r.pre)
    }

    /// Post-registration Dice, samples × structures.
    pub fn post_matrix(&self) -> Array2<f64> {
        self.matrix(|r| &r.post)
    }

    /// Inference time per sample in seconds.
    pub fn timings(&self) -> Array1<f64> {
        self.records
            .iter()
            .map(|r| r.inference_time.as_secs_f64())
            .collect()
    }

    /// Statistics of the flattened pre-registration Dice matrix.
    pub fn pre_dice(&self) -> Option<Stats> {
        Stats::of(self.pre_matrix().into_iter().collect())
    }

    /// Statistics of the flattened post-registration Dice matrix.
    pub fn post_dice(&self) -> Option<Stats> {
        Stats::of(self.post_matrix().into_iter().collect())
    }

    /// Statistics of the inference timings in seconds.
    pub fn time(&self) -> Option<Stats> {
        Stats::of(self.timings())
    }

    fn matrix(&self, scores: impl Fn(&SampleRecord) -> &DiceScores) -> Array2<f64> {
        let mut matrix = Array2::<f64>::zeros((self.records.len(), self.labels.len()));
        for (mut row, record) in matrix.rows_mut().into_iter().zip(&self.records) {
            for (cell, value) in row.iter_mut().zip(scores(record).values()) {
                *cell = *value;
            }
        }
        matrix
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn line(f: &mut fmt::Formatter<'_>, name: &str, stats: Option<Stats>) -> fmt::Result {
            match stats {
                Some(s) => writeln!(f, "{name} | mean = {:.3}, std= {:.3}", s.mean, s.std),
                None => writeln!(f, "{name} | no samples"),
            }
        }

        writeln!(f, "---------------------------------------------")?;
        writeln!(f, "Total Dice and Time Metrics------------------")?;
        writeln!(f, "---------------------------------------------")?;
        line(f, "origin Dice", self.pre_dice())?;
        line(f, "Deform Dice", self.post_dice())?;
        line(f, "Deform Time", self.time())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, pre: [f64; 2], post: [f64; 2], secs: f64) -> SampleRecord {
        SampleRecord {
            id: id.to_string(),
            pre: DiceScores::new(vec![1, 2], pre.to_vec()).unwrap(),
            post: DiceScores::new(vec![1, 2], post.to_vec()).unwrap(),
            inference_time: Duration::from_secs_f64(secs),
            saved: false,
        }
    }

    #[test]
    fn test_statistics_use_population_std() {
        let mut summary = RunSummary::new(vec![1, 2]);
        summary.push(record("a", [0.5, 0.5], [0.8, 1.0], 1.0)).unwrap();
        summary.push(record("b", [0.5, 0.5], [0.6, 0.6], 3.0)).unwrap();

        assert_eq!(summary.pre_matrix().dim(), (2, 2));
        assert_eq!(summary.post_matrix()[[0, 1]], 1.0);

        let pre = summary.pre_dice().unwrap();
        assert!((pre.mean - 0.5).abs() < 1e-12 && pre.std.abs() < 1e-12);

        let post = summary.post_dice().unwrap();
        assert!((post.mean - 0.75).abs() < 1e-12);
        // deviations 0.05, 0.25, -0.15, -0.15
        let expected = ((0.0025 + 0.0625 + 0.0225 + 0.0225) / 4.0f64).sqrt();
        assert!((post.std - expected).abs() < 1e-12);

        let time = summary.time().unwrap();
        assert!((time.mean - 2.0).abs() < 1e-9 && (time.std - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_summary_has_no_statistics() {
        let summary = RunSummary::new(vec![1]);
        assert!(summary.pre_dice().is_none());
        assert!(summary.to_string().contains("no samples"));
    }

    #[test]
    fn test_mismatched_labels_are_rejected() {
        let mut summary = RunSummary::new(vec![1, 3]);
        assert!(summary.push(record("a", [1.0, 1.0], [1.0, 1.0], 0.1)).is_err());
    }

    #[test]
    fn test_console_summary() {
        let mut summary = RunSummary::new(vec![1, 2]);
        summary.push(record("a", [0.5, 0.5], [1.0, 1.0], 2.0)).unwrap();
        let text = summary.to_string();
        assert!(text.contains("origin Dice | mean = 0.500, std= 0.000"));
        assert!(text.contains("Deform Dice | mean = 1.000, std= 0.000"));
        assert!(text.contains("Deform Time | mean = 2.000, std= 0.000"));
    }
}
