//! Session configuration
//!
//! A [`ProfileRequest`] bundles the three inputs of a session besides the
//! work itself. Environment variables let CI widen what gets collected
//! without touching test code:
//!
//! - `CALLSCOPE_FLAGS` - flags for [`ProfileRequest::from_env`], e.g. `no_builtins|cpu`
//! - `CALLSCOPE_OUTPUT_DIR` - initial output destination of the tracing backend

use crate::domain::{ConfigError, ProfileOptions};
use callscope_common::Flags;
use std::env::{self, VarError};

pub const FLAGS_ENV: &str = "CALLSCOPE_FLAGS";
pub const OUTPUT_DIR_ENV: &str = "CALLSCOPE_OUTPUT_DIR";

/// Everything a session needs besides the unit of work.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileRequest {
    /// Inclusion filter over edge identifiers; empty keeps every edge
    pub match_expressions: Vec<String>,

    /// Metric categories to collect
    pub flags: Flags,

    /// Forwarded untouched to the instrumentation
    pub options: ProfileOptions,
}

impl ProfileRequest {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults, with flags taken from `CALLSCOPE_FLAGS` when set.
    ///
    /// # Errors
    /// Returns an error if the variable holds an unknown flag name.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut request = Self::new();
        if let Some(flags) = parse_flags_var(env::var(FLAGS_ENV))? {
            request.flags = flags;
        }
        Ok(request)
    }

    /// Append match expressions.
    #[must_use]
    pub fn matching<I, S>(mut self, expressions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.match_expressions
            .extend(expressions.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn with_flags(mut self, flags: Flags) -> Self {
        self.flags = flags;
        self
    }

    #[must_use]
    pub fn with_options(mut self, options: ProfileOptions) -> Self {
        self.options = options;
        self
    }
}

/// Output destination configured through `CALLSCOPE_OUTPUT_DIR`, if any.
#[must_use]
pub fn output_dir_from_env() -> Option<String> {
    env::var(OUTPUT_DIR_ENV).ok().filter(|dir| !dir.is_empty())
}

fn parse_flags_var(value: Result<String, VarError>) -> Result<Option<Flags>, ConfigError> {
    match value {
        Ok(raw) if raw.trim().is_empty() => Ok(None),
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|source| ConfigError::InvalidFlags {
                variable: FLAGS_ENV,
                source,
            }),
        Err(VarError::NotPresent) => Ok(None),
        Err(VarError::NotUnicode(_)) => Err(ConfigError::InvalidVariable(FLAGS_ENV)),
    }
}
