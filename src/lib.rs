//! A dynamic memory allocator built on a contiguous growable heap region.
//!
//! The allocator manages a single break-grown heap the way the classic
//! `sbrk` mallocs do. Every allocated block is prefixed with a header and
//! threaded into a registry, a singly linked sequence in allocation order:
//!
//! ```text
//!    head                                          tail
//!     |                                             |
//! +---v----+---------+    +--------+---------+    +-v------+---------+
//! | Header | Payload | -> | Header | Payload | -> | Header | Payload |
//! +--------+---------+    +--------+---------+    +--------+---------+
//!                                                           ^
//!                                            Program break -+
//! ```
//!
//! Released blocks are marked free and stay registered; a later allocation
//! reuses the first free block that fits (first fit, no splitting). Only a
//! block sitting at the current end of the heap is physically given back,
//! by retreating the break over it. There is no coalescing and no
//! compaction.
//!
//! # Quick start
//!
//! ```
//! use brkalloc::{BrkAlloc, FixedSegment};
//!
//! let allocator = BrkAlloc::with_segment(FixedSegment::new(4096));
//!
//! unsafe {
//!     let addr = allocator.allocate(64);
//!     assert!(!addr.is_null());
//!
//!     addr.write_bytes(7, 64);
//!     allocator.release(addr);
//! }
//! ```
//!
//! On Unix and Windows, [`BrkAlloc::new`] drives the process's own program
//! break (emulated over a reserved virtual range on Windows) and the
//! allocator can be installed with `#[global_allocator]`; see
//! `demos/global.rs`. Since there is only one break per process, keep a
//! single such instance.
//!
//! Every operation serializes on one internal lock, so the allocator can be
//! shared freely across threads. Failure is always reported as a null
//! address, never a panic. When the allocator is installed globally, do not
//! install a logger that allocates: the `log` statements here fire inside
//! the allocator itself.

mod block;
mod list;
mod raw;
mod segment;
mod utils;

use std::alloc::{GlobalAlloc, Layout};
use std::ptr;

use spin::Mutex;

pub use block::ALIGNMENT;
pub use raw::RawAlloc;
pub use segment::{FixedSegment, HeapSegment, ProgramBreak};

use block::BlockHeader;

/// The locked allocator: a [`RawAlloc`] behind a single mutex.
///
/// All four operations lock for their entire body, so registry state and
/// the heap break only ever change under mutual exclusion. The exception is
/// [`reallocate`], whose allocate/copy/release steps each take the lock on
/// their own; a concurrent thread may observe the old block already free
/// before the call returns, but the new block belongs to the resizing
/// thread alone until it is handed back.
///
/// [`reallocate`]: BrkAlloc::reallocate
pub struct BrkAlloc<S: HeapSegment = ProgramBreak> {
    inner: Mutex<RawAlloc<S>>,
}

impl BrkAlloc<ProgramBreak> {
    /// An allocator over the process's program break.
    pub const fn new() -> Self {
        Self::with_segment(ProgramBreak::new())
    }
}

impl Default for BrkAlloc<ProgramBreak> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: HeapSegment> BrkAlloc<S> {
    /// An allocator over its own heap segment, independent of every other
    /// instance.
    pub const fn with_segment(segment: S) -> Self {
        Self {
            inner: Mutex::new(RawAlloc::new(segment)),
        }
    }

    /// Allocates `size` bytes. Null if `size` is zero or the heap is
    /// exhausted. See [`RawAlloc::allocate`].
    pub unsafe fn allocate(&self, size: usize) -> *mut u8 {
        unsafe { self.inner.lock().allocate(size) }
    }

    /// Allocates a zero-filled region for `count` elements of `elem_size`
    /// bytes each. See [`RawAlloc::allocate_zeroed`].
    pub unsafe fn allocate_zeroed(&self, count: usize, elem_size: usize) -> *mut u8 {
        unsafe { self.inner.lock().allocate_zeroed(count, elem_size) }
    }

    /// Grows the block behind `payload` to at least `new_size` bytes,
    /// moving its contents if a new block is needed.
    ///
    /// Unlike the other operations this is not one critical section: the
    /// internal allocate, copy and release steps lock independently.
    ///
    /// **SAFETY**: `payload` must be null or a live address returned by
    /// this allocator.
    pub unsafe fn reallocate(&self, payload: *mut u8, new_size: usize) -> *mut u8 {
        unsafe {
            if payload.is_null() {
                return self.allocate(new_size);
            }
            if new_size == 0 {
                self.release(payload);
                return ptr::null_mut();
            }

            // The block is live and owned by the caller, so its recorded
            // size cannot change under us.
            let old_size = BlockHeader::from_payload(payload).as_ref().size;
            if old_size >= new_size {
                return payload;
            }

            let new_payload = self.allocate(new_size);
            if new_payload.is_null() {
                return ptr::null_mut();
            }

            ptr::copy_nonoverlapping(payload, new_payload, old_size);
            self.release(payload);

            new_payload
        }
    }

    /// Releases the block behind `payload`. Null is a no-op. See
    /// [`RawAlloc::release`].
    ///
    /// **SAFETY**: `payload` must be null or a live address returned by
    /// this allocator.
    pub unsafe fn release(&self, payload: *mut u8) {
        unsafe { self.inner.lock().release(payload) }
    }

    /// Current end address of the heap segment. Diagnostic only.
    pub fn heap_end(&self) -> *mut u8 {
        self.inner.lock().heap_end()
    }

    /// Number of registered blocks, live and free.
    pub fn block_count(&self) -> usize {
        self.inner.lock().block_count()
    }

    /// Number of registered blocks currently waiting for reuse.
    pub fn free_block_count(&self) -> usize {
        self.inner.lock().free_block_count()
    }
}

/// `GlobalAlloc` view of the allocator, so it can back `Box`, `Vec` and
/// friends via `#[global_allocator]`.
///
/// Payloads come out on [`ALIGNMENT`] boundaries and never finer, so
/// requests for stricter alignments are refused with a null address.
unsafe impl<S: HeapSegment> GlobalAlloc for BrkAlloc<S> {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if layout.align() > ALIGNMENT {
            return ptr::null_mut();
        }
        unsafe { self.allocate(layout.size()) }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        unsafe { self.release(ptr) }
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        if layout.align() > ALIGNMENT {
            return ptr::null_mut();
        }
        unsafe { self.allocate_zeroed(1, layout.size()) }
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        if layout.align() > ALIGNMENT {
            return ptr::null_mut();
        }
        unsafe { self.reallocate(ptr, new_size) }
    }
}
