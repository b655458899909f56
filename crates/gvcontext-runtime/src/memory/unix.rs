//! Unix memory implementation using mmap

use gvcontext_core::error::AllocationError;
use gvcontext_core::kwarn;
use std::ptr::NonNull;
use std::sync::OnceLock;

/// System page size (cached)
pub fn page_size() -> usize {
    static PAGE_SIZE: OnceLock<usize> = OnceLock::new();
    *PAGE_SIZE.get_or_init(|| {
        // SAFETY: sysconf has no memory-safety preconditions.
        let n = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if n > 0 {
            n as usize
        } else {
            4096
        }
    })
}

/// Map `len` bytes of private, zero-filled, read/write memory
pub(super) fn map_anonymous(len: usize) -> Result<NonNull<u8>, AllocationError> {
    // MAP_NORESERVE: large stacks only cost what they touch.
    let base = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            len,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_NORESERVE,
            -1,
            0,
        )
    };

    if base == libc::MAP_FAILED {
        return Err(AllocationError::MapFailed);
    }

    NonNull::new(base as *mut u8).ok_or(AllocationError::MapFailed)
}

/// Make a page range inaccessible (guard page)
pub(super) fn protect_none(addr: *mut u8, len: usize) -> Result<(), AllocationError> {
    let ret = unsafe { libc::mprotect(addr as *mut libc::c_void, len, libc::PROT_NONE) };
    if ret != 0 {
        return Err(AllocationError::ProtectionFailed);
    }
    Ok(())
}

/// Release a mapping made by `map_anonymous`
pub(super) fn unmap(base: NonNull<u8>, len: usize) {
    let ret = unsafe { libc::munmap(base.as_ptr() as *mut libc::c_void, len) };
    if ret != 0 {
        kwarn!("munmap({:p}, {}) failed", base, len);
    }
}
