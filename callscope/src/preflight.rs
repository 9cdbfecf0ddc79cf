//! Pre-flight checks for callscope
//!
//! Decides whether call-graph instrumentation can run in this process before
//! anything is enabled. A missing backend is reported as a skipped test, never
//! as a failure.

use crate::capability::Instrumentation;
use crate::domain::InstrumentationError;
use crate::profiling::{memory, TracingInstrumentation};
use callscope_common::Flags;
use log::warn;

/// Reason given to the test harness when instrumentation is missing
pub const SKIP_REASON: &str =
    "Call-graph instrumentation is not installed; test must be skipped";

/// Whether the default tracing backend is installed for the current thread.
#[must_use]
pub fn is_profiling_available() -> bool {
    TracingInstrumentation.is_available()
}

/// Fail unless `instrumentation` is usable.
///
/// # Errors
/// `NotInstalled` when the backend is missing from the current dispatcher.
pub fn check_instrumentation<I>(instrumentation: &I) -> Result<(), InstrumentationError>
where
    I: Instrumentation + ?Sized,
{
    if instrumentation.is_available() {
        Ok(())
    } else {
        Err(InstrumentationError::NotInstalled)
    }
}

/// Warn when memory metrics are requested but no tracking allocator runs.
pub fn warn_if_memory_untracked(flags: Flags) {
    if flags.contains(Flags::MEMORY) && !memory::is_tracking() {
        warn!(
            "memory metrics requested but no TrackingAllocator is installed; \
             mu/pmu will read 0"
        );
    }
}
