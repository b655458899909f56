//! Error types for GVContext

use core::fmt;

/// Result type for context operations
pub type ContextResult<T> = Result<T, ContextError>;

/// Errors that can occur in context operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextError {
    /// Stack region memory could not be obtained
    Allocation(AllocationError),

    /// Platform lacks context-switching support (soft, skip the feature)
    UnsupportedPlatform,

    /// Malformed build input or illegal state transition
    InvalidContext(InvalidContextError),

    /// The switch primitive itself failed; fatal to the calling flow
    Switch(SwitchError),

    /// Other OS failure (raw errno)
    Platform(i32),
}

impl ContextError {
    /// Capability absence rather than a real failure
    #[inline]
    pub fn is_unsupported(&self) -> bool {
        matches!(self, ContextError::UnsupportedPlatform)
    }
}

impl fmt::Display for ContextError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextError::Allocation(e) => write!(f, "allocation error: {}", e),
            ContextError::UnsupportedPlatform => write!(f, "context handling not supported"),
            ContextError::InvalidContext(e) => write!(f, "invalid context: {}", e),
            ContextError::Switch(e) => write!(f, "switch failed: {}", e),
            ContextError::Platform(code) => write!(f, "platform error: {}", code),
        }
    }
}

impl std::error::Error for ContextError {}

/// Stack allocation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllocationError {
    /// Zero, too small, or overflowing size
    InvalidSize,

    /// Alignment not a power of two or below the ABI minimum
    InvalidAlignment,

    /// Heap allocator returned null
    AllocationFailed,

    /// mmap failed
    MapFailed,

    /// mprotect on the guard page failed
    ProtectionFailed,
}

impl fmt::Display for AllocationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocationError::InvalidSize => write!(f, "invalid stack size"),
            AllocationError::InvalidAlignment => write!(f, "invalid stack alignment"),
            AllocationError::AllocationFailed => write!(f, "stack allocation failed"),
            AllocationError::MapFailed => write!(f, "stack mapping failed"),
            AllocationError::ProtectionFailed => write!(f, "guard page protection failed"),
        }
    }
}

impl From<AllocationError> for ContextError {
    fn from(e: AllocationError) -> Self {
        ContextError::Allocation(e)
    }
}

/// Defensive checks on build/switch input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidContextError {
    /// Context is running or suspended mid-entry; cannot be rebuilt
    InUse,

    /// Builder has no stack region
    MissingStack,

    /// Builder has no entry binding
    MissingEntry,

    /// `save_into` is not the flow currently executing on this thread
    NotCurrent,

    /// Target holds no resumable state (unbound, or captured but never saved)
    NotResumable,

    /// Target is already the active context
    AlreadyActive,

    /// Target's entry has returned
    Retired,

    /// Stack is still live under a suspended entry
    StackInUse,

    /// Successor chain leads back to the context itself
    SuccessorCycle,
}

impl fmt::Display for InvalidContextError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidContextError::InUse => write!(f, "context is in use"),
            InvalidContextError::MissingStack => write!(f, "no stack region bound"),
            InvalidContextError::MissingEntry => write!(f, "no entry function bound"),
            InvalidContextError::NotCurrent => write!(f, "save target is not the current context"),
            InvalidContextError::NotResumable => write!(f, "context has no resumable state"),
            InvalidContextError::AlreadyActive => write!(f, "context is already active"),
            InvalidContextError::Retired => write!(f, "context has retired"),
            InvalidContextError::StackInUse => write!(f, "stack region is still live"),
            InvalidContextError::SuccessorCycle => write!(f, "successor chain loops back to the context"),
        }
    }
}

impl From<InvalidContextError> for ContextError {
    fn from(e: InvalidContextError) -> Self {
        ContextError::InvalidContext(e)
    }
}

/// Failures reported by the switch primitive
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwitchError {
    /// pthread_sigmask failed (raw errno)
    SignalMask(i32),
}

impl fmt::Display for SwitchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwitchError::SignalMask(code) => write!(f, "signal mask update failed: {}", code),
        }
    }
}

impl From<SwitchError> for ContextError {
    fn from(e: SwitchError) -> Self {
        ContextError::Switch(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = ContextError::UnsupportedPlatform;
        assert_eq!(format!("{}", e), "context handling not supported");

        let e = ContextError::Allocation(AllocationError::InvalidAlignment);
        assert_eq!(format!("{}", e), "allocation error: invalid stack alignment");

        let e = ContextError::Switch(SwitchError::SignalMask(22));
        assert_eq!(format!("{}", e), "switch failed: signal mask update failed: 22");
    }

    #[test]
    fn test_error_conversion() {
        let err: ContextError = AllocationError::InvalidSize.into();
        assert!(matches!(err, ContextError::Allocation(AllocationError::InvalidSize)));

        let err: ContextError = InvalidContextError::Retired.into();
        assert!(matches!(err, ContextError::InvalidContext(InvalidContextError::Retired)));
        assert!(!err.is_unsupported());
        assert!(ContextError::UnsupportedPlatform.is_unsupported());
    }
}
