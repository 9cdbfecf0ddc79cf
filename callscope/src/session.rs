//! # Scoped Profiling Session
//!
//! Brackets a unit of work with instrumentation:
//!
//! ```text
//! available? ──no──▶ mark_skipped(reason) ──▶ Profile::Skipped
//!     │yes
//!     ▼
//! compile match expressions            (fails fast, nothing enabled yet)
//! lock session                         (one session per process)
//! redirect output ──▶ mem://store-N/profiles      ┐
//! enable(flags, options)                ┐         │ restored on
//! work()                                │ disable │ every exit path,
//! disable() ──▶ raw graph               ┘ on drop │ including panics
//! restore output                                  ┘
//! filter ──▶ Profile::Captured
//! ```
//!
//! A panic in the work unwinds through the guards, which disable the
//! instrumentation and restore the output destination, then keeps
//! propagating to the test.

use crate::analysis::MatchSet;
use crate::capability::{Instrumentation, Profile, ProfilingCapability};
use crate::config::ProfileRequest;
use crate::domain::{InstrumentationError, ProfileError};
use crate::preflight::SKIP_REASON;
use crate::storage::EphemeralStore;
use callscope_common::{qualified_name_of, CallGraph};
use log::{debug, warn};
use parking_lot::ReentrantMutex;

/// Name of the ephemeral directory handed to the instrumentation
pub const OUTPUT_DIR_NAME: &str = "profiles";

/// Serialises sessions across threads. Reentrant so that a nested session on
/// the same thread reaches the instrumentation and is rejected there instead
/// of deadlocking.
static SESSION_LOCK: ReentrantMutex<()> = parking_lot::const_reentrant_mutex(());

/// Run `work` exactly once under `capability`'s instrumentation.
///
/// # Errors
/// Invalid match expressions, storage failures, or instrumentation refusing
/// to enable/disable.
pub fn run<C, F>(capability: &C, work: F, request: &ProfileRequest) -> Result<Profile, ProfileError>
where
    C: ProfilingCapability + ?Sized,
    F: FnOnce(),
{
    if !capability.is_profiling_available() {
        capability.mark_skipped(SKIP_REASON);
        return Ok(Profile::Skipped {
            reason: SKIP_REASON.to_string(),
        });
    }

    let matcher = MatchSet::new(&request.match_expressions)?;
    let root = qualified_name_of::<F>();

    let _exclusive = SESSION_LOCK.lock();
    let store = EphemeralStore::new();
    let output_dir = store.create_dir(OUTPUT_DIR_NAME)?;

    let instrumentation = capability.instrumentation();
    let destination = DestinationGuard::redirect(instrumentation, output_dir);

    instrumentation.enable(&root, request.flags, &request.options)?;
    let recording = RecordingGuard::new(instrumentation);
    work();
    let graph = recording.finish()?;
    drop(destination);

    debug!(
        "Profiled {root}: {} entries, {} match expressions",
        graph.len(),
        matcher.len()
    );
    Ok(Profile::Captured(matcher.filter(graph)))
}

/// Restores the previous output destination when dropped.
struct DestinationGuard<'a, I: Instrumentation + ?Sized> {
    instrumentation: &'a I,
    previous: Option<String>,
}

impl<'a, I: Instrumentation + ?Sized> DestinationGuard<'a, I> {
    fn redirect(instrumentation: &'a I, destination: String) -> Self {
        let previous = instrumentation.set_output_destination(Some(destination));
        Self {
            instrumentation,
            previous,
        }
    }
}

impl<I: Instrumentation + ?Sized> Drop for DestinationGuard<'_, I> {
    fn drop(&mut self) {
        self.instrumentation
            .set_output_destination(self.previous.take());
    }
}

/// Disables the instrumentation if the work unwinds before `finish`.
struct RecordingGuard<'a, I: Instrumentation + ?Sized> {
    instrumentation: &'a I,
    finished: bool,
}

impl<'a, I: Instrumentation + ?Sized> RecordingGuard<'a, I> {
    fn new(instrumentation: &'a I) -> Self {
        Self {
            instrumentation,
            finished: false,
        }
    }

    fn finish(mut self) -> Result<CallGraph, InstrumentationError> {
        self.finished = true;
        self.instrumentation.disable()
    }
}

impl<I: Instrumentation + ?Sized> Drop for RecordingGuard<'_, I> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(e) = self.instrumentation.disable() {
            warn!("Failed to disable instrumentation after an aborted session: {e}");
        }
    }
}
