//! Unix signal masks via pthread_sigmask

use gvcontext_core::error::{ContextError, ContextResult, SwitchError};
use nix::errno::Errno;
use nix::sys::signal::{pthread_sigmask, SigSet, SigmaskHow};

/// Blocked-signal set of a context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalMask(SigSet);

impl SignalMask {
    /// Wrap a nix signal set
    pub fn from_sigset(set: SigSet) -> Self {
        SignalMask(set)
    }

    pub fn as_sigset(&self) -> &SigSet {
        &self.0
    }
}

impl Default for SignalMask {
    fn default() -> Self {
        SignalMask(SigSet::empty())
    }
}

/// Mask of the calling thread
///
/// `ENOSYS` means the kernel has no signal-mask support, which is reported
/// as a missing capability rather than a failure.
pub fn current_mask() -> ContextResult<SignalMask> {
    let mut old = SigSet::empty();
    match pthread_sigmask(SigmaskHow::SIG_BLOCK, None, Some(&mut old)) {
        Ok(()) => Ok(SignalMask(old)),
        Err(Errno::ENOSYS) => Err(ContextError::UnsupportedPlatform),
        Err(e) => Err(ContextError::Platform(e as i32)),
    }
}

/// Install `new` on the calling thread and return the previous mask
pub fn swap_mask(new: &SignalMask) -> Result<SignalMask, SwitchError> {
    let mut old = SigSet::empty();
    pthread_sigmask(SigmaskHow::SIG_SETMASK, Some(&new.0), Some(&mut old))
        .map_err(|e| SwitchError::SignalMask(e as i32))?;
    Ok(SignalMask(old))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::sys::signal::Signal;

    #[test]
    fn test_swap_restores_previous_mask() {
        let original = current_mask().unwrap();

        let mut blocked = original.as_sigset().clone();
        blocked.add(Signal::SIGUSR2);
        let prev = swap_mask(&SignalMask::from_sigset(blocked)).unwrap();
        assert_eq!(prev, original);
        assert!(current_mask().unwrap().as_sigset().contains(Signal::SIGUSR2));

        swap_mask(&original).unwrap();
        assert_eq!(current_mask().unwrap(), original);
    }
}
