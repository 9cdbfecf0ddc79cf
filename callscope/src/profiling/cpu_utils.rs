//! CPU utility functions
//!
//! Per-thread CPU time for the `cpu` metric. Only the session's own thread
//! is measured, so time spent by unrelated test threads never leaks in.

#![allow(unsafe_code)] // clock_gettime() requires unsafe

/// CPU time consumed by the calling thread, in microseconds.
///
/// Reads `CLOCK_THREAD_CPUTIME_ID`. Returns 0 if the clock is unavailable.
#[cfg(unix)]
#[must_use]
pub fn thread_cpu_time_us() -> u64 {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    // SAFETY: `ts` is a valid, writable timespec for the duration of the call
    let rc = unsafe { libc::clock_gettime(libc::CLOCK_THREAD_CPUTIME_ID, &mut ts) };
    if rc != 0 {
        return 0;
    }
    let secs = u64::try_from(ts.tv_sec).unwrap_or(0);
    let nanos = u64::try_from(ts.tv_nsec).unwrap_or(0);
    secs.saturating_mul(1_000_000).saturating_add(nanos / 1_000)
}

#[cfg(not(unix))]
#[must_use]
pub fn thread_cpu_time_us() -> u64 {
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_cpu_time_is_monotonic() {
        let before = thread_cpu_time_us();
        let mut acc = 0u64;
        for i in 0..200_000u64 {
            acc = acc.wrapping_add(std::hint::black_box(i));
        }
        std::hint::black_box(acc);
        let after = thread_cpu_time_us();
        assert!(after >= before);

        #[cfg(target_os = "linux")]
        assert!(after > 0, "thread CPU clock should be readable on Linux");
    }
}
