//! Growable scratch memory with caller-specified alignment.
//!
//! Native factorization kernels report the scratch they need as a byte size
//! plus a power-of-two alignment that can exceed what the global allocator
//! guarantees for a byte buffer. [`AlignedWorkspace`] over-allocates and hands
//! out an aligned sub-range instead of relying on the allocator.

use std::mem::MaybeUninit;

use dyn_stack::{MemStack, StackReq};

/// Per-instance scratch buffer that grows to the largest request seen and never shrinks.
#[derive(Debug, Default)]
pub struct AlignedWorkspace {
    buffer: Vec<MaybeUninit<u8>>,
}

impl AlignedWorkspace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes currently allocated, including alignment slack.
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Returns `size` bytes starting at an address that is a multiple of `align`.
    ///
    /// # Panics
    /// Panics if `align` is not a power of two.
    pub fn ensure(&mut self, size: usize, align: usize) -> &mut [MaybeUninit<u8>] {
        assert!(
            align.is_power_of_two(),
            "workspace alignment {align} is not a power of two"
        );

        let required = size + align - 1;
        if self.buffer.len() < required {
            self.buffer.resize(required, MaybeUninit::uninit());
        }

        let offset = self.buffer.as_ptr().align_offset(align);
        &mut self.buffer[offset..offset + size]
    }

    /// Aligned stack satisfying a `dyn-stack` requirement, as consumed by faer kernels.
    pub fn stack(&mut self, req: StackReq) -> &mut MemStack {
        MemStack::new(self.ensure(req.size_bytes(), req.align_bytes()))
    }
}
