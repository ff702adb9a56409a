//! File I/O for diffreg: NIfTI volumes, PNG slice snapshots, the NIfTI pair
//! dataset and the result writer used by the inference orchestrator.

pub mod dataset;
pub mod nifti_io;
pub mod png_io;
pub mod writer;

pub use dataset::{NiftiPairDataset, PairFiles};
pub use nifti_io::{read_labels, read_volume, write_labels, write_stack, write_volume};
pub use png_io::write_slice_png;
pub use writer::ResultWriter;
