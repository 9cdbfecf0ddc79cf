//! Profiling core modules
//!
//! The default instrumentation backend and the counters it samples:
//! - `tracing` layer and process-wide session state
//! - Span stack → call-graph recording
//! - Thread CPU time
//! - Heap tracking allocator

pub mod cpu_utils;
pub mod layer;
pub mod memory;
mod recorder;

// Re-export common types
pub use cpu_utils::thread_cpu_time_us;
pub use layer::{CallGraphLayer, TracingInstrumentation};
pub use memory::TrackingAllocator;
