//! Similarity metrics and segmentation overlap.

pub mod trait_;
pub mod lcc;
pub mod dice;

pub use trait_::Metric;
pub use lcc::LocalCrossCorrelation;
pub use dice::{DiceMetric, DiceScores, LabelSelection};
