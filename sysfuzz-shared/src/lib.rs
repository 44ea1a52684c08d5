//! Error types shared between `sysfuzz-core` and `sysfuzz-cli`.

pub mod errors;

pub use errors::{SysfuzzError, SysfuzzResult};
