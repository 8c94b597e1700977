//! Shared error handling utilities used across all imcore crates.

pub mod error;

pub use error::{Error, FromMessage, ImCoreError, Result};
