//! Stack regions
//!
//! A `StackRegion` is a block of memory a built context runs on. It is
//! either a heap allocation with the requested layout, or an anonymous
//! mapping whose lowest page is `PROT_NONE` so that an overrun faults
//! instead of corrupting the neighbouring memory.
//!
//! ```text
//!  low addresses                                            high addresses
//!  ┌───────┬─────────────────────────────────┬──────────────────────┐
//!  │ guard │  usable stack (grows down ◀──)  │ tail (never written) │
//!  └───────┴─────────────────────────────────┴──────────────────────┘
//!          base                        top_pointer()         base+capacity
//! ```
//!
//! The tail exists only after `truncate`; it is the part of the region the
//! context is not allowed to touch, which is what the probe tooling poisons
//! and checks.

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        mod unix;
        pub use unix::page_size;
    }
}

use crate::config;
use gvcontext_core::constants::{GUARD_SIZE, MIN_STACK_SIZE, STACK_ALIGN};
use gvcontext_core::error::AllocationError;
use std::alloc::Layout;
use std::fmt;
use std::ptr::NonNull;

enum Backing {
    Heap(Layout),
    Mapped {
        map_base: NonNull<u8>,
        map_len: usize,
        guarded: bool,
    },
}

/// Memory designated as a context's call stack
pub struct StackRegion {
    base: NonNull<u8>,
    capacity: usize,
    usable: usize,
    align: usize,
    backing: Backing,
}

// The region exclusively owns its memory.
unsafe impl Send for StackRegion {}

#[inline]
const fn align_up(n: usize, align: usize) -> Option<usize> {
    match n.checked_add(align - 1) {
        Some(v) => Some(v & !(align - 1)),
        None => None,
    }
}

#[inline]
const fn align_down(n: usize, align: usize) -> usize {
    n & !(align - 1)
}

/// Check size/alignment and return the capacity rounded up to `align`
fn checked_capacity(size: usize, align: usize) -> Result<usize, AllocationError> {
    if !align.is_power_of_two() || align < STACK_ALIGN {
        return Err(AllocationError::InvalidAlignment);
    }
    if size < MIN_STACK_SIZE {
        return Err(AllocationError::InvalidSize);
    }
    align_up(size, align).ok_or(AllocationError::InvalidSize)
}

impl StackRegion {
    /// Allocate a stack of at least `size` bytes whose top is `alignment`
    /// aligned.
    ///
    /// Uses a guarded mapping when `guard_page` is configured, the heap
    /// otherwise.
    pub fn allocate(size: usize, alignment: usize) -> Result<Self, AllocationError> {
        if config::current().guard_page {
            Self::allocate_mapped(size, alignment, true)
        } else {
            Self::allocate_heap(size, alignment)
        }
    }

    /// Allocate using the configured default size and alignment
    pub fn with_default_size() -> Result<Self, AllocationError> {
        let cfg = config::current();
        Self::allocate(cfg.stack_size, cfg.stack_align)
    }

    /// Allocate zeroed heap memory with the given layout
    pub fn allocate_heap(size: usize, alignment: usize) -> Result<Self, AllocationError> {
        let capacity = checked_capacity(size, alignment)?;
        let layout = Layout::from_size_align(capacity, alignment)
            .map_err(|_| AllocationError::InvalidSize)?;

        // SAFETY: layout has non-zero size (capacity >= MIN_STACK_SIZE).
        let ptr = unsafe { std::alloc::alloc_zeroed(layout) };
        let base = NonNull::new(ptr).ok_or(AllocationError::AllocationFailed)?;

        Ok(Self {
            base,
            capacity,
            usable: capacity,
            align: alignment,
            backing: Backing::Heap(layout),
        })
    }

    /// Allocate an anonymous mapping, optionally with a guard page below
    /// the stack
    #[cfg(unix)]
    pub fn allocate_mapped(
        size: usize,
        alignment: usize,
        guard: bool,
    ) -> Result<Self, AllocationError> {
        let capacity = checked_capacity(size, alignment)?;
        let page = page_size();

        let guard_len = if guard { align_up(GUARD_SIZE, page).unwrap_or(page) } else { 0 };
        let slack = if alignment > page { alignment } else { 0 };
        let map_len = align_up(capacity, page)
            .and_then(|n| n.checked_add(guard_len))
            .and_then(|n| n.checked_add(slack))
            .ok_or(AllocationError::InvalidSize)?;

        let map_base = unix::map_anonymous(map_len)?;

        // Stack top sits at the (aligned) end of the mapping.
        let map_start = map_base.as_ptr() as usize;
        let end = align_down(map_start + map_len, alignment);
        let base = end - capacity;

        if guard {
            let guard_start = align_down(base, page) - guard_len;
            debug_assert!(guard_start >= map_start);
            if let Err(e) = unix::protect_none(guard_start as *mut u8, guard_len) {
                unix::unmap(map_base, map_len);
                return Err(e);
            }
        }

        Ok(Self {
            // SAFETY: base lies inside the fresh mapping, which is non-null.
            base: unsafe { NonNull::new_unchecked(base as *mut u8) },
            capacity,
            usable: capacity,
            align: alignment,
            backing: Backing::Mapped { map_base, map_len, guarded: guard },
        })
    }

    #[cfg(not(unix))]
    pub fn allocate_mapped(
        _size: usize,
        _alignment: usize,
        _guard: bool,
    ) -> Result<Self, AllocationError> {
        Err(AllocationError::MapFailed)
    }

    /// Lowest usable address
    #[inline]
    pub fn base(&self) -> *mut u8 {
        self.base.as_ptr()
    }

    /// Total bytes owned, including any truncated tail
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes a context may use
    #[inline]
    pub fn usable_size(&self) -> usize {
        self.usable
    }

    #[inline]
    pub fn alignment(&self) -> usize {
        self.align
    }

    /// Whether an overrun of the usable part faults
    #[inline]
    pub fn has_guard_page(&self) -> bool {
        match self.backing {
            Backing::Mapped { guarded, .. } => guarded,
            Backing::Heap(_) => false,
        }
    }

    /// Initial stack pointer: one past the usable end, rounded down to the
    /// region alignment
    #[inline]
    pub fn top_pointer(&self) -> *mut u8 {
        let offset = align_down(self.usable, self.align);
        // SAFETY: offset <= capacity, so the result stays within (or one
        // past) the allocation.
        unsafe { self.base.as_ptr().add(offset) }
    }

    /// Restrict the context to the low `usable` bytes of the region
    pub fn truncate(&mut self, usable: usize) -> Result<(), AllocationError> {
        if usable == 0 || usable > self.capacity || align_down(usable, self.align) == 0 {
            return Err(AllocationError::InvalidSize);
        }
        self.usable = usable;
        Ok(())
    }

    /// Make the whole capacity usable again
    #[inline]
    pub fn reset(&mut self) {
        self.usable = self.capacity;
    }

    /// The whole region, tail included
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: memory is owned, initialized (zeroed) and `capacity` long.
        unsafe { std::slice::from_raw_parts(self.base.as_ptr(), self.capacity) }
    }

    /// The whole region, tail included
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: as above, and `&mut self` gives exclusive access.
        unsafe { std::slice::from_raw_parts_mut(self.base.as_ptr(), self.capacity) }
    }

    /// Fill the usable part with `pattern`
    pub fn poison(&mut self, pattern: u8) {
        let usable = self.usable;
        self.as_mut_slice()[..usable].fill(pattern);
    }

    /// Fill the tail (between usable size and capacity) with `pattern`
    pub fn poison_tail(&mut self, pattern: u8) {
        let usable = self.usable;
        self.as_mut_slice()[usable..].fill(pattern);
    }

    /// Highest tail offset that no longer holds `pattern`, if any
    pub fn tail_damage(&self, pattern: u8) -> Option<usize> {
        self.as_slice()[self.usable..].iter().rposition(|&b| b != pattern)
    }

    /// Bytes at the top of the usable part that were written since
    /// `poison(pattern)`
    ///
    /// Approximate by nature: a frame may store a value equal to the
    /// pattern at its deepest slot.
    pub fn high_water_mark(&self, pattern: u8) -> usize {
        let usable = &self.as_slice()[..self.usable];
        match usable.iter().position(|&b| b != pattern) {
            Some(first) => usable.len() - first,
            None => 0,
        }
    }
}

impl Drop for StackRegion {
    fn drop(&mut self) {
        match self.backing {
            // SAFETY: allocated in allocate_heap with this exact layout.
            Backing::Heap(layout) => unsafe { std::alloc::dealloc(self.base.as_ptr(), layout) },
            #[cfg(unix)]
            Backing::Mapped { map_base, map_len, .. } => unix::unmap(map_base, map_len),
            #[cfg(not(unix))]
            Backing::Mapped { .. } => {}
        }
    }
}

impl fmt::Debug for StackRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StackRegion")
            .field("base", &self.base)
            .field("capacity", &self.capacity)
            .field("usable", &self.usable)
            .field("align", &self.align)
            .field("mapped", &matches!(self.backing, Backing::Mapped { .. }))
            .finish()
    }
}
