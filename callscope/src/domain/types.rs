//! Session-level configuration types

/// Secondary instrumentation options, forwarded untouched to the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileOptions {
    /// Functions that are transparent in the graph: their callees are
    /// attributed to the nearest recorded caller. Matched against the
    /// qualified name (`my_crate::helper`) or the bare name (`helper`).
    pub ignored_functions: Vec<String>,

    /// Extra span target prefixes treated as built-ins when
    /// [`Flags::NO_BUILTINS`](callscope_common::Flags::NO_BUILTINS) is set.
    pub builtin_targets: Vec<String>,
}

impl ProfileOptions {
    #[must_use]
    pub fn ignoring<I, S>(mut self, functions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignored_functions.extend(functions.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn with_builtin_targets<I, S>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.builtin_targets.extend(targets.into_iter().map(Into::into));
        self
    }
}
