//! Thread signal masks
//!
//! A context carries the signal mask of the flow it represents. `capture`
//! records it, `switch` saves the outgoing mask and installs the incoming
//! one. Platforms without signal masks use an empty placeholder.

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        mod unix;
        pub use unix::*;
    } else {
        use gvcontext_core::error::{ContextResult, SwitchError};

        /// Placeholder mask
        #[derive(Debug, Clone, Default, PartialEq, Eq)]
        pub struct SignalMask;

        pub fn current_mask() -> ContextResult<SignalMask> {
            Ok(SignalMask)
        }

        pub fn swap_mask(_new: &SignalMask) -> Result<SignalMask, SwitchError> {
            Ok(SignalMask)
        }
    }
}
