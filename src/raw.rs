use std::ptr;

use log::trace;

use crate::{
    block::{span_of, BlockHeader},
    list::BlockList,
    segment::HeapSegment,
};

/// Largest payload we will ever try to carve. Anything above this cannot be
/// represented as a single extension request, so it is refused up front the
/// same way a failed extension would be.
const MAX_REQUEST: usize = isize::MAX as usize - span_of(0);

/// The allocation engine, without any locking.
///
/// Owns the block registry and the heap segment it grows blocks into. Every
/// operation takes `&mut self`, so a single thread can embed a `RawAlloc`
/// directly; concurrent callers go through [`BrkAlloc`], which is nothing
/// more than a lock around this type.
///
/// [`BrkAlloc`]: crate::BrkAlloc
pub struct RawAlloc<S: HeapSegment> {
    registry: BlockList,
    segment: S,
}

impl<S: HeapSegment> RawAlloc<S> {
    pub const fn new(segment: S) -> Self {
        Self {
            registry: BlockList::new(),
            segment,
        }
    }

    /// Allocates `size` bytes and returns the payload address, or null if
    /// `size` is zero or the heap cannot be grown.
    ///
    /// A free registered block large enough for the request is reused as is
    /// (first fit, no splitting); only when none exists is the segment
    /// extended by the new block's span.
    pub unsafe fn allocate(&mut self, size: usize) -> *mut u8 {
        if size == 0 || size > MAX_REQUEST {
            return ptr::null_mut();
        }

        unsafe {
            if let Some(mut header) = self.registry.find_free_block(size) {
                header.as_mut().is_free = false;
                trace!(
                    "reused a free {} byte block for a {} byte request",
                    header.as_ref().size,
                    size
                );
                return BlockHeader::payload(header);
            }

            let span = span_of(size);
            let Some(addr) = self.segment.extend(span) else {
                return ptr::null_mut();
            };
            trace!("heap grown by {span} bytes for a {size} byte request");

            let header = addr.cast::<BlockHeader>();
            header.as_ptr().write(BlockHeader {
                size,
                is_free: false,
                next: None,
            });
            self.registry.push_back(header);

            BlockHeader::payload(header)
        }
    }

    /// Allocates a zero-filled region of `count * elem_size` bytes.
    ///
    /// Returns null if either argument is zero, if the multiplication
    /// overflows, or if the underlying allocation fails. On overflow nothing
    /// is allocated; a truncated region is never handed out.
    pub unsafe fn allocate_zeroed(&mut self, count: usize, elem_size: usize) -> *mut u8 {
        if count == 0 || elem_size == 0 {
            return ptr::null_mut();
        }
        let Some(total) = count.checked_mul(elem_size) else {
            return ptr::null_mut();
        };

        unsafe {
            let payload = self.allocate(total);
            if !payload.is_null() {
                ptr::write_bytes(payload, 0, total);
            }
            payload
        }
    }

    /// Grows (never shrinks) the block behind `payload` to at least
    /// `new_size` bytes.
    ///
    /// A null `payload` is a plain [`allocate`]; a zero `new_size` releases
    /// the block and returns null. If the block already covers `new_size`
    /// the same address comes back untouched, nominal size included.
    /// Otherwise the contents move to a freshly allocated block and the old
    /// one is released; if that allocation fails the original block is left
    /// untouched and null is returned.
    ///
    /// **SAFETY**: `payload` must be null or a live address returned by
    /// this engine.
    ///
    /// [`allocate`]: RawAlloc::allocate
    pub unsafe fn reallocate(&mut self, payload: *mut u8, new_size: usize) -> *mut u8 {
        unsafe {
            if payload.is_null() {
                return self.allocate(new_size);
            }
            if new_size == 0 {
                self.release(payload);
                return ptr::null_mut();
            }

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

    /// Releases the block behind `payload`. Null is a no-op.
    ///
    /// If the block sits at the current end of the segment it is unlinked
    /// from the registry and its span is physically given back. Any other
    /// block is only marked free and stays registered for reuse; the heap
    /// is never compacted around it.
    ///
    /// **SAFETY**: `payload` must be null or a live address returned by
    /// this engine.
    pub unsafe fn release(&mut self, payload: *mut u8) {
        if payload.is_null() {
            return;
        }

        unsafe {
            let mut header = BlockHeader::from_payload(payload);
            let span = header.as_ref().span();

            if header.as_ptr().cast::<u8>().add(span) == self.segment.end() {
                // Blocks are appended in address order, so the block ending
                // at the break is the registry tail.
                debug_assert_eq!(Some(header), self.registry.last());

                self.registry.detach_tail();
                self.segment.shrink(span);
                trace!("heap shrunk by {span} bytes");
                return;
            }

            header.as_mut().is_free = true;
        }
    }

    /// Current end address of the heap segment. Diagnostic only.
    pub fn heap_end(&self) -> *mut u8 {
        unsafe { self.segment.end() }
    }

    /// Number of registered blocks, live and free.
    pub fn block_count(&self) -> usize {
        self.registry.len()
    }

    /// Number of registered blocks currently waiting for reuse.
    pub fn free_block_count(&self) -> usize {
        self.registry
            .iter()
            .filter(|header| unsafe { header.as_ref().is_free })
            .count()
    }

    #[cfg(test)]
    pub(crate) fn registry(&self) -> &BlockList {
        &self.registry
    }
}

// The registry links are owned exclusively by this engine; nothing aliases
// them from outside.
unsafe impl<S: HeapSegment + Send> Send for RawAlloc<S> {}
