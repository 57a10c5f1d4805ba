//! Interpreter-owned memory and raw pointer access.
//!
//! Pointers produced by the interpreter are real host addresses, so they can
//! be handed to native code unchanged. When sanitizing is enabled, every raw
//! access must fall inside an allocation owned by one of the segments.

pub mod sanitizer;
pub mod stack;
pub mod statics;

use crate::error::InterpError;
use crate::value::Value;
use anyhow::{Result, bail};
use fir::Ty;
use tracing::trace;
use sanitizer::{AllocKind, AllocationMap};
use stack::Stack;
use statics::Statics;

/// A region of interpreter-owned memory.
pub trait MemorySegment {
    fn allocations(&self) -> &AllocationMap;

    /// Kind of the allocation of this segment holding the whole range.
    fn owner(&self, address: usize, size: usize) -> Option<AllocKind> {
        self.allocations().owner(address, size)
    }
}

#[derive(Debug, Default)]
pub struct Memory {
    pub stack: Stack,
    pub statics: Statics,
    sanitize: bool,
}

impl Memory {
    pub fn new(sanitize: bool) -> Self {
        Self {
            sanitize,
            ..Self::default()
        }
    }

    /// Loads a value of type `ty` from `address`.
    pub fn read_value(&self, address: usize, ty: &Ty) -> Result<Value> {
        let size = crate::ty::PackedLayout::size(ty);
        self.check_access(address, size)?;
        if size == 0 {
            return Ok(Value::zeroed(ty.clone()));
        }
        // SAFETY: the address is non-null and, when sanitizing, inside a live
        // allocation. Otherwise the IR is trusted to produce valid pointers.
        let bytes = unsafe { std::slice::from_raw_parts(address as *const u8, size) };
        Value::from_bytes(ty.clone(), bytes)
    }

    /// Stores raw bytes at `address`.
    pub fn write_addr(&self, address: usize, data: &[u8]) -> Result<()> {
        self.check_access(address, data.len())?;
        if !data.is_empty() {
            // SAFETY: see `read_value`.
            unsafe { std::ptr::copy(data.as_ptr(), address as *mut u8, data.len()) };
        }
        Ok(())
    }

    fn check_access(&self, address: usize, size: usize) -> Result<()> {
        if size == 0 {
            return Ok(());
        }
        if address == 0 {
            bail!(InterpError::InvalidMemoryAccess { address, size });
        }
        if self.sanitize {
            let Some(kind) = self
                .stack
                .owner(address, size)
                .or_else(|| self.statics.owner(address, size))
            else {
                bail!(InterpError::InvalidMemoryAccess { address, size });
            };
            trace!("Access of {size} bytes at 0x{address:x} inside {kind} allocation");
        }
        Ok(())
    }
}
