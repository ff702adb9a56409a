//! Smoothness regularization for displacement and code fields.

pub mod trait_;
pub mod gradient;

pub use trait_::Regularizer;
pub use gradient::{GradientPenalty, Penalty};
