//! Execution context lifecycle state

use core::fmt;

/// State of an execution context
///
/// ```text
/// Unbound ──capture──▶ Captured ──┐
///    │                            ├─switch in─▶ Active ◀──switch in── Suspended
///    └────build────▶ Built ───────┘               │ ╲                   ▲
///                                                 │  ╲──switch away─────┘
///                                      entry returns (built only)
///                                                 ▼
///                                              Retired
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ContextState {
    /// Just declared, holds nothing
    Unbound = 0,

    /// Snapshot of the calling flow; registers filled on first save
    Captured = 1,

    /// Entry bound, not yet started
    Built = 2,

    /// Currently executing on this thread
    Active = 3,

    /// Switched away from, registers saved
    Suspended = 4,

    /// Entry returned and control fell through to the successor
    Retired = 5,
}

impl ContextState {
    /// Can a switch transfer control into this context?
    #[inline]
    pub const fn is_resumable(&self) -> bool {
        matches!(self, ContextState::Built | ContextState::Suspended)
    }

    /// Can the root flow (no tracked current context) save into this context?
    #[inline]
    pub const fn accepts_root_save(&self) -> bool {
        matches!(self, ContextState::Unbound | ContextState::Captured)
    }

    /// Can a builder (re)configure this context?
    #[inline]
    pub const fn is_buildable(&self) -> bool {
        !matches!(self, ContextState::Active | ContextState::Suspended)
    }
}

impl fmt::Display for ContextState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ContextState::Unbound => "unbound",
            ContextState::Captured => "captured",
            ContextState::Built => "built",
            ContextState::Active => "active",
            ContextState::Suspended => "suspended",
            ContextState::Retired => "retired",
        };
        f.write_str(name)
    }
}
