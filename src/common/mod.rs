//! Shared definitions used throughout the lowering pipeline.

pub mod error;

pub use error::{Error, Result};
