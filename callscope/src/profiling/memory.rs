//! Heap tracking for the `mu`/`pmu` metrics.
//!
//! Rust has no runtime heap counter to query, so memory figures come from a
//! counting [`GlobalAlloc`] wrapper that the test binary opts into:
//!
//! ```ignore
//! #[global_allocator]
//! static ALLOC: callscope::TrackingAllocator = callscope::TrackingAllocator::system();
//! ```
//!
//! Allocations through any wrapper instance are counted process-wide, but
//! [`is_tracking`] only reports true when the wrapper is the global allocator.
//! Without it every reading is 0 and the session logs a warning when `memory`
//! is requested.

#![allow(unsafe_code)] // GlobalAlloc is an unsafe trait

use std::alloc::{GlobalAlloc, Layout, System};
use std::cell::Cell;
use std::sync::atomic::{AtomicI64, Ordering};

static LIVE_BYTES: AtomicI64 = AtomicI64::new(0);
static PEAK_BYTES: AtomicI64 = AtomicI64::new(0);

thread_local! {
    // Const-initialised without a destructor, so it never allocates itself.
    static THREAD_ALLOCS: Cell<u64> = const { Cell::new(0) };
}

/// Counting wrapper around another allocator.
#[derive(Debug, Default)]
pub struct TrackingAllocator<A = System> {
    inner: A,
}

impl TrackingAllocator<System> {
    /// Track the system allocator.
    #[must_use]
    pub const fn system() -> Self {
        Self { inner: System }
    }
}

impl<A> TrackingAllocator<A> {
    #[must_use]
    pub const fn new(inner: A) -> Self {
        Self { inner }
    }
}

fn record_alloc(size: usize) {
    let size = i64::try_from(size).unwrap_or(i64::MAX);
    let live = LIVE_BYTES.fetch_add(size, Ordering::Relaxed).saturating_add(size);
    PEAK_BYTES.fetch_max(live, Ordering::Relaxed);
    let _ = THREAD_ALLOCS.try_with(|count| count.set(count.get().wrapping_add(1)));
}

fn record_dealloc(size: usize) {
    let size = i64::try_from(size).unwrap_or(i64::MAX);
    LIVE_BYTES.fetch_sub(size, Ordering::Relaxed);
}

// SAFETY: every call is forwarded unchanged to `inner`; the counters have no
// effect on the returned memory.
unsafe impl<A: GlobalAlloc> GlobalAlloc for TrackingAllocator<A> {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = self.inner.alloc(layout);
        if !ptr.is_null() {
            record_alloc(layout.size());
        }
        ptr
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        let ptr = self.inner.alloc_zeroed(layout);
        if !ptr.is_null() {
            record_alloc(layout.size());
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        self.inner.dealloc(ptr, layout);
        record_dealloc(layout.size());
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let new_ptr = self.inner.realloc(ptr, layout, new_size);
        if !new_ptr.is_null() {
            record_dealloc(layout.size());
            record_alloc(new_size);
        }
        new_ptr
    }
}

/// Whether the global allocator is a [`TrackingAllocator`].
///
/// Allocates one box through the global allocator and checks that a wrapper
/// on this thread saw it.
#[must_use]
pub fn is_tracking() -> bool {
    let before = thread_allocs();
    drop(std::hint::black_box(Box::new(0u64)));
    thread_allocs() != before
}

fn thread_allocs() -> u64 {
    THREAD_ALLOCS.try_with(Cell::get).unwrap_or(0)
}

/// Bytes currently allocated through tracking allocators.
#[must_use]
pub fn live_bytes() -> i64 {
    LIVE_BYTES.load(Ordering::Relaxed)
}

/// Highest value [`live_bytes`] has reached.
#[must_use]
pub fn peak_bytes() -> i64 {
    PEAK_BYTES.load(Ordering::Relaxed)
}
