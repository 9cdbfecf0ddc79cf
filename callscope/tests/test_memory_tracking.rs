//! Heap metrics through the tracking allocator.
//!
//! Note: this is an integration test as the global allocator must be
//! overridden, and doing so in the unit tests would count every other test's
//! allocations too.

use callscope::{Flags, ProfileRequest, Profiler, ProfilingCapability, TrackingAllocator};
use tracing::instrument;

#[global_allocator]
static ALLOC: TrackingAllocator = TrackingAllocator::system();

const BUFFER_LEN: usize = 1 << 20;

#[instrument]
fn build_buffer() -> Vec<u8> {
    vec![1u8; BUFFER_LEN]
}

#[instrument]
fn scratch() {
    let buffer = vec![2u8; BUFFER_LEN];
    std::hint::black_box(&buffer);
}

#[test]
fn test_memory_metrics_follow_allocations() {
    let _ = env_logger::builder().is_test(true).try_init();
    callscope::install().expect("no other global subscriber in this test binary");
    assert!(callscope::profiling::memory::is_tracking());

    let request = ProfileRequest::new()
        .with_flags(Flags::NO_BUILTINS | Flags::MEMORY)
        .matching([".+build_buffer$", ".+scratch$"]);
    let mut kept = Vec::new();

    let graph = Profiler::new()
        .profile_closure_with(
            || {
                kept = build_buffer();
                scratch();
            },
            &request,
        )
        .unwrap()
        .into_call_graph()
        .expect("instrumentation is installed");

    let (_, retained) = graph
        .edges_to("test_memory_tracking::build_buffer")
        .next()
        .expect("build_buffer edge recorded");
    let retained_bytes = i64::try_from(BUFFER_LEN).unwrap();
    assert!(retained.mu.unwrap() >= retained_bytes, "{}", graph.to_json_pretty());
    assert!(retained.pmu.unwrap() >= 0);

    let (_, released) = graph
        .edges_to("test_memory_tracking::scratch")
        .next()
        .expect("scratch edge recorded");
    assert!(released.mu.unwrap() < retained_bytes);
    assert_eq!(released.cpu, None);

    assert_eq!(kept.len(), BUFFER_LEN);
}
