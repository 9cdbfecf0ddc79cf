//! # Profiling Capability
//!
//! The seams between a test fixture, the session, and the instrumentation:
//!
//! - [`Instrumentation`] - handle to whatever records calls (tracing backend,
//!   or a fake in tests of the session itself)
//! - [`ProfilingCapability`] - what a test fixture composes in to get
//!   `profile_closure`; the availability check and the skip hook are
//!   overridable
//! - [`Profile`] - outcome of a session: a graph, or a skip
//!
//! ## Usage
//!
//! ```ignore
//! #[tracing::instrument]
//! fn fetch(id: u32) { /* ... */ }
//!
//! #[test]
//! fn lookup_fetches_once() {
//!     callscope::install().ok();
//!     let profile = Profiler::default()
//!         .profile_closure_matching(|| lookup(7), &[".+::fetch$"])
//!         .unwrap();
//!     let Some(graph) = profile.into_call_graph() else { return };
//!     assert!(graph.edges_to("my_crate::fetch").all(|(_, m)| m.ct <= 1));
//! }
//! ```

use crate::config::ProfileRequest;
use crate::domain::{InstrumentationError, ProfileError, ProfileOptions};
use crate::profiling::TracingInstrumentation;
use crate::session;
use callscope_common::{CallGraph, Flags};
use log::warn;

/// Process-wide call-graph instrumentation.
///
/// All methods take `&self`: implementations address global state.
pub trait Instrumentation {
    /// Whether the instrumentation is present and usable.
    fn is_available(&self) -> bool;

    /// Start recording on the calling thread. `root` names the unit of work.
    ///
    /// # Errors
    /// `AlreadyEnabled` if a session is active.
    fn enable(
        &self,
        root: &str,
        flags: Flags,
        options: &ProfileOptions,
    ) -> Result<(), InstrumentationError>;

    /// Stop recording and hand over the raw graph.
    ///
    /// # Errors
    /// `NotEnabled` if the calling thread has no active session.
    fn disable(&self) -> Result<CallGraph, InstrumentationError>;

    /// Current output destination.
    fn output_destination(&self) -> Option<String>;

    /// Replace the output destination, returning the previous one.
    fn set_output_destination(&self, destination: Option<String>) -> Option<String>;
}

/// Outcome of a profiling session.
#[must_use]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Profile {
    /// The work ran under instrumentation; this is the (filtered) graph
    Captured(CallGraph),
    /// Instrumentation was unavailable; the work did not run
    Skipped { reason: String },
}

impl Profile {
    #[must_use]
    pub fn is_skipped(&self) -> bool {
        matches!(self, Profile::Skipped { .. })
    }

    #[must_use]
    pub fn call_graph(&self) -> Option<&CallGraph> {
        match self {
            Profile::Captured(graph) => Some(graph),
            Profile::Skipped { .. } => None,
        }
    }

    #[must_use]
    pub fn into_call_graph(self) -> Option<CallGraph> {
        match self {
            Profile::Captured(graph) => Some(graph),
            Profile::Skipped { .. } => None,
        }
    }
}

/// Call-graph profiling for test fixtures.
pub trait ProfilingCapability {
    type Instrumentation: Instrumentation + ?Sized;

    fn instrumentation(&self) -> &Self::Instrumentation;

    fn is_profiling_available(&self) -> bool {
        self.instrumentation().is_available()
    }

    /// Tell the harness the current test cannot run.
    ///
    /// The built-in harness has no runtime skip, so the default logs the
    /// reason and prints it next to the test output.
    fn mark_skipped(&self, reason: &str) {
        warn!("{reason}");
        eprintln!("test skipped: {reason}");
    }

    /// Profile `work` and return the unfiltered graph.
    ///
    /// # Errors
    /// See [`ProfilingCapability::profile_closure_with`].
    fn profile_closure<F>(&self, work: F) -> Result<Profile, ProfileError>
    where
        F: FnOnce(),
    {
        self.profile_closure_with(work, &ProfileRequest::new())
    }

    /// Profile `work`, keeping edges that match any of `match_expressions`.
    ///
    /// # Errors
    /// See [`ProfilingCapability::profile_closure_with`].
    fn profile_closure_matching<F>(
        &self,
        work: F,
        match_expressions: &[&str],
    ) -> Result<Profile, ProfileError>
    where
        F: FnOnce(),
    {
        let request = ProfileRequest::new().matching(match_expressions.iter().copied());
        self.profile_closure_with(work, &request)
    }

    /// Profile `work` with full control over filter, flags and options.
    ///
    /// # Errors
    /// Invalid match expressions, or instrumentation refusing to enable
    /// (e.g. a nested session). A panic in `work` propagates after cleanup.
    fn profile_closure_with<F>(&self, work: F, request: &ProfileRequest) -> Result<Profile, ProfileError>
    where
        F: FnOnce(),
    {
        session::run(self, work, request)
    }
}

/// Default fixture: the tracing backend with the stock skip hook.
#[derive(Debug, Clone, Copy, Default)]
pub struct Profiler {
    instrumentation: TracingInstrumentation,
}

impl Profiler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProfilingCapability for Profiler {
    type Instrumentation = TracingInstrumentation;

    fn instrumentation(&self) -> &TracingInstrumentation {
        &self.instrumentation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_accessors() {
        let captured = Profile::Captured(CallGraph::new());
        assert!(!captured.is_skipped());
        assert!(captured.call_graph().is_some());

        let skipped = Profile::Skipped {
            reason: "missing".to_string(),
        };
        assert!(skipped.is_skipped());
        assert_eq!(skipped.into_call_graph(), None);
    }
}
