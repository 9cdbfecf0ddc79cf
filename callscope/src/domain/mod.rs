//! Domain model for callscope
//!
//! This module contains the session-level types and errors:
//! - Options forwarded to the instrumentation backend
//! - Structured error handling per concern

pub mod errors;
pub mod types;

pub use types::ProfileOptions;

pub use errors::{ConfigError, InstrumentationError, ProfileError, StorageError};
