//! Monotonic per-CPU cycle counter used by the timed barrier variants.
//!
//! Grounded directly on the teacher's `rdtsc_timer` module: a raw `rdtsc`
//! intrinsic on x86, with a `SystemTime`-based fallback elsewhere. Differences
//! between two reads are meaningful only when both reads happen on the same
//! pinned thread, exactly as the external-collaborator contract in the spec
//! requires.

/// Read the current cycle count on the calling core.
#[inline]
pub(crate) fn now() -> u64 {
    unsafe { rdtsc() }
}

/// Cycles elapsed since `start`, saturating on counter wraparound.
#[inline]
pub(crate) fn elapsed_since(start: u64) -> u64 {
    now().saturating_sub(start)
}

#[inline]
unsafe fn rdtsc() -> u64 {
    #[cfg(target_arch = "x86_64")]
    {
        std::arch::x86_64::_rdtsc()
    }
    #[cfg(target_arch = "x86")]
    {
        std::arch::x86::_rdtsc()
    }
    #[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
    {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos() as u64
    }
}
