//! Static memory management
//!
//! Storage that lives as long as the interpreter: global variables, the
//! string pool and the backing buffers of owned dynamic array constants.

use crate::memory::MemorySegment;
use crate::memory::sanitizer::{AllocKind, AllocationMap};

#[derive(Debug, Default)]
pub struct Statics {
    allocations: AllocationMap,
    buffers: Vec<Box<[u8]>>,
}

impl MemorySegment for Statics {
    fn allocations(&self) -> &AllocationMap {
        &self.allocations
    }
}

impl Statics {
    /// Allocates zeroed storage for a global variable.
    pub fn alloc(&mut self, size: usize) -> usize {
        self.keep(vec![0u8; size].into_boxed_slice(), AllocKind::Global)
    }

    /// Allocates a copy of `bytes` backing a constant.
    pub fn alloc_bytes(&mut self, bytes: &[u8]) -> usize {
        self.keep(bytes.into(), AllocKind::Constant)
    }

    /// Copies `value` into the pool as a NUL-terminated string.
    pub fn intern_string(&mut self, value: &str) -> usize {
        let mut bytes = Vec::with_capacity(value.len() + 1);
        bytes.extend_from_slice(value.as_bytes());
        bytes.push(0);
        self.keep(bytes.into_boxed_slice(), AllocKind::Str)
    }

    pub fn allocation_count(&self) -> usize {
        self.buffers.len()
    }

    fn keep(&mut self, buf: Box<[u8]>, kind: AllocKind) -> usize {
        let address = buf.as_ptr() as usize;
        self.allocations.insert(&buf, kind);
        self.buffers.push(buf);
        address
    }
}
