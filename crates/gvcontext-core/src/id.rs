//! Context identifier type

use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier for an execution context
///
/// Zero is reserved as the "no context" sentinel (the thread's root flow
/// before it has been captured).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct ContextId(u64);

impl ContextId {
    /// Sentinel value indicating no context
    pub const NONE: ContextId = ContextId(0);

    /// Allocate a fresh identifier
    #[inline]
    pub fn next() -> Self {
        ContextId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw value
    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Check if this is the NONE sentinel
    #[inline]
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "ContextId(NONE)")
        } else {
            write!(f, "ContextId({})", self.0)
        }
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "-")
        } else {
            write!(f, "{}", self.0)
        }
    }
}
