//! # Tracing Instrumentation Backend
//!
//! Observes calls through `tracing` spans. Each span entered on the session's
//! thread counts as one call of `<target>::<name>`; for a function annotated
//! with `#[tracing::instrument]` that is its module path and function name.
//!
//! Span names carry no `Self` type, so methods of different types in one
//! module share a name. Name them explicitly to keep edges apart:
//!
//! ```ignore
//! impl Square {
//!     #[instrument(name = "Square::area", skip_all)]
//!     fn area(&self) -> f64 { /* ... */ }
//! }
//! // my_crate::shapes::Square::area==>my_crate::shapes::Circle::area
//! ```
//!
//! ## Wiring
//!
//! ```text
//! #[instrument] fn sleepy_time()
//!         │ span enter/exit
//!         ▼
//! ┌──────────────────┐   owner thread only   ┌──────────────┐
//! │  CallGraphLayer  │ ────────────────────▶ │   Recorder   │
//! └──────────────────┘                       └──────┬───────┘
//!                                                   │ disable()
//!                                                   ▼
//!                                               CallGraph
//! ```
//!
//! The layer is installed once per process, either by [`TracingInstrumentation::install`]
//! or by composing [`CallGraphLayer`] into an existing subscriber. Recording
//! state is process-wide: one session at a time.

use crate::capability::Instrumentation;
use crate::config;
use crate::domain::{InstrumentationError, ProfileOptions};
use crate::preflight;
use callscope_common::{CallGraph, Flags};
use log::{debug, info};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;
use std::thread::{self, ThreadId};
use tracing::span;
use tracing::Subscriber;
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;

use super::recorder::{Recorder, SpanSite};

// =============================================================================
// PROCESS-WIDE STATE
// =============================================================================

/// Fast check for the span callbacks; the lock is only taken while recording.
static RECORDING: AtomicBool = AtomicBool::new(false);

static SESSION: Mutex<Option<ActiveSession>> = parking_lot::const_mutex(None);

/// Output directory setting, saved and restored around every session.
static OUTPUT_DESTINATION: Mutex<Option<String>> = parking_lot::const_mutex(None);

#[derive(Debug)]
struct ActiveSession {
    owner: ThreadId,
    recorder: Recorder,
}

/// Run `f` against the recorder if the calling thread owns the session.
fn with_owned_recorder(f: impl FnOnce(&mut Recorder)) {
    let me = thread::current().id();
    let mut session = SESSION.lock();
    if let Some(active) = session.as_mut().filter(|active| active.owner == me) {
        f(&mut active.recorder);
    }
}

// =============================================================================
// LAYER
// =============================================================================

/// `tracing_subscriber` layer feeding span activity to the active session.
#[derive(Debug, Default)]
pub struct CallGraphLayer {
    _private: (),
}

impl CallGraphLayer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl<S> Layer<S> for CallGraphLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_enter(&self, id: &span::Id, ctx: Context<'_, S>) {
        if !RECORDING.load(Ordering::Acquire) {
            return;
        }
        let Some(metadata) = ctx.metadata(id) else {
            return;
        };
        with_owned_recorder(|recorder| {
            recorder.enter(id.into_u64(), SpanSite::from_metadata(metadata));
        });
    }

    fn on_exit(&self, id: &span::Id, _ctx: Context<'_, S>) {
        if !RECORDING.load(Ordering::Acquire) {
            return;
        }
        with_owned_recorder(|recorder| recorder.exit(id.into_u64()));
    }
}

// =============================================================================
// INSTRUMENTATION HANDLE
// =============================================================================

/// Handle to the process-wide tracing backend.
///
/// Copies are interchangeable; they all address the same state.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingInstrumentation;

impl TracingInstrumentation {
    /// Install a global subscriber made of a registry and a [`CallGraphLayer`].
    ///
    /// Idempotent. Also seeds the output destination from
    /// `CALLSCOPE_OUTPUT_DIR`.
    ///
    /// # Errors
    /// Fails if a different global subscriber was installed first. Compose
    /// [`CallGraphLayer`] into that subscriber instead.
    pub fn install() -> Result<Self, InstrumentationError> {
        static INSTALLED: OnceLock<Result<(), String>> = OnceLock::new();

        INSTALLED
            .get_or_init(|| {
                if let Some(dir) = config::output_dir_from_env() {
                    *OUTPUT_DESTINATION.lock() = Some(dir);
                }
                let subscriber = tracing_subscriber::registry().with(CallGraphLayer::new());
                tracing::subscriber::set_global_default(subscriber).map_err(|e| e.to_string())?;
                info!("Installed call-graph instrumentation");
                Ok(())
            })
            .clone()
            .map(|()| Self)
            .map_err(InstrumentationError::Subscriber)
    }
}

impl Instrumentation for TracingInstrumentation {
    fn is_available(&self) -> bool {
        tracing::dispatcher::get_default(|dispatch| dispatch.downcast_ref::<CallGraphLayer>().is_some())
    }

    fn enable(
        &self,
        root: &str,
        flags: Flags,
        options: &ProfileOptions,
    ) -> Result<(), InstrumentationError> {
        preflight::check_instrumentation(self)?;

        let mut session = SESSION.lock();
        if session.is_some() {
            return Err(InstrumentationError::AlreadyEnabled);
        }
        preflight::warn_if_memory_untracked(flags);

        *session = Some(ActiveSession {
            owner: thread::current().id(),
            recorder: Recorder::new(root, flags, options),
        });
        RECORDING.store(true, Ordering::Release);
        debug!("Call-graph recording enabled for {root} (flags: {flags})");
        Ok(())
    }

    fn disable(&self) -> Result<CallGraph, InstrumentationError> {
        let me = thread::current().id();
        let mut session = SESSION.lock();
        match session.take() {
            Some(active) if active.owner == me => {
                RECORDING.store(false, Ordering::Release);
                let graph = active.recorder.finish();
                debug!("Call-graph recording disabled, {} entries", graph.len());
                Ok(graph)
            }
            other => {
                *session = other;
                Err(InstrumentationError::NotEnabled)
            }
        }
    }

    fn output_destination(&self) -> Option<String> {
        OUTPUT_DESTINATION.lock().clone()
    }

    fn set_output_destination(&self, destination: Option<String>) -> Option<String> {
        std::mem::replace(&mut *OUTPUT_DESTINATION.lock(), destination)
    }
}
