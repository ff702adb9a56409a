//! Error types shared with `diffreg-core`.

pub use diffreg_core::error::{ensure_same_shape, RegistrationError, Result};
