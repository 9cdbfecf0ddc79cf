//! # callscope - Call-Graph Assertions for Tests
//!
//! callscope runs a closure under call-graph instrumentation and hands back
//! the `caller==>callee` edges it observed, so a test can assert on how code
//! executes ("`load` must not call `fetch` more than once") and not only on
//! what it returns.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                           Test Body                             │
//! │         profiler.profile_closure_matching(|| work(), &[..])     │
//! └───────────────────────┬─────────────────────────────────────────┘
//!                         │
//!                         ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    callscope (This Crate)                       │
//! │                                                                 │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐         │
//! │  │  Preflight   │──▶│   Session    │──▶│   Analysis   │         │
//! │  │ (available?) │   │ (guards)     │   │  (filter)    │         │
//! │  └──────────────┘   └──────┬───────┘   └──────────────┘         │
//! │                            │                                    │
//! │              ┌─────────────┴──────────────┐                     │
//! │              ▼                            ▼                     │
//! │      ┌──────────────┐             ┌──────────────┐              │
//! │      │  Profiling   │             │   Storage    │              │
//! │      │ (tracing)    │             │  (mem://)    │              │
//! │      └──────────────┘             └──────────────┘              │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! - [`capability`]: `Instrumentation` and `ProfilingCapability` traits, the
//!   `Profile` outcome and the default `Profiler` fixture
//! - [`session`]: the enable/run/disable/restore bracket
//! - [`analysis`]: match-expression filtering of recorded graphs
//! - [`profiling`]: the `tracing`-based backend, CPU and heap counters
//! - [`storage`]: in-memory output locations
//! - [`preflight`]: availability check and skip reason
//! - [`config`]: `ProfileRequest` and environment overrides
//! - [`domain`]: options and error types
//!
//! ## Typical Usage
//!
//! ```ignore
//! use callscope::{Profiler, ProfilingCapability};
//!
//! #[tracing::instrument]
//! fn sleepy_time() {}
//!
//! #[test]
//! fn calls_sleepy_time_twice() {
//!     callscope::install().ok();
//!     let profile = Profiler::new()
//!         .profile_closure(|| {
//!             sleepy_time();
//!             sleepy_time();
//!         })
//!         .unwrap();
//!     let Some(graph) = profile.into_call_graph() else { return };
//!     assert_eq!(
//!         graph.call_count("my_tests::calls_sleepy_time_twice::{closure}==>my_tests::sleepy_time"),
//!         2
//!     );
//! }
//! ```
//!
//! ## Key Concepts
//!
//! - **Edge identifier**: `caller==>callee`, qualified with `::`; closures are
//!   `<enclosing fn>::{closure}`, recursion adds `@depth`
//! - **Metrics**: `ct` calls, `wt` wall µs, `cpu` CPU µs, `mu`/`pmu` heap bytes
//! - **Test attributes**: macros that wrap the test body in a closure
//!   (`#[serial]`, `#[tokio::test]`) add one more `::{closure}` segment to the
//!   caller; [`qualified_name_of_val`] on the closure itself gives the exact
//!   name
//! - **Methods**: span names carry no `Self` type; use
//!   `#[instrument(name = "Type::method")]` to keep methods of different types
//!   apart
//! - **Skip**: without instrumentation the work is not run and the session
//!   returns `Profile::Skipped`

pub mod analysis;
pub mod capability;
pub mod config;
pub mod domain;
pub mod preflight;
pub mod profiling;
pub mod session;
pub mod storage;

pub use callscope_common::{
    closure_name, edge_id, qualified_name_of_val, split_edge_id, CallGraph, Flags, Metrics,
};

pub use analysis::{filter_call_graph, MatchSet};
pub use capability::{Instrumentation, Profile, Profiler, ProfilingCapability};
pub use config::ProfileRequest;
pub use domain::{InstrumentationError, ProfileError, ProfileOptions};
pub use preflight::is_profiling_available;
pub use profiling::{CallGraphLayer, TracingInstrumentation, TrackingAllocator};

/// Install the default tracing backend as the global subscriber.
///
/// Safe to call from every test; only the first call installs.
///
/// # Errors
/// Fails if another global subscriber was installed first.
pub fn install() -> Result<TracingInstrumentation, InstrumentationError> {
    TracingInstrumentation::install()
}
