//! Cache-line isolation helper.
//!
//! The original C implementation hand-rolled `aligned_malloc`/`memalign` calls
//! (see `align.h`) to keep each barrier's counter and sense flag, and each data
//! exchange slot, on its own cache line. Rust's allocator already honors a
//! type's `Layout` alignment, so a `Vec<CachePadded<T>>` gets the same
//! guarantee for free — no manual aligned-allocation helper is needed.

/// Wraps `T` in a struct padded and aligned to 128 bytes, the spec's stated
/// safe upper bound for a cache line, so that no two instances in an array
/// ever share a cache line and invalidate each other under concurrent writes.
#[repr(align(128))]
#[derive(Debug, Default)]
pub(crate) struct CachePadded<T>(pub T);

impl<T> CachePadded<T> {
    pub(crate) const fn new(value: T) -> Self {
        Self(value)
    }
}

impl<T> std::ops::Deref for CachePadded<T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.0
    }
}
