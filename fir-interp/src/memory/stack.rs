//! Call stack.
//!
//! A stack frame holds the bindings of one function invocation together with
//! the buffers created by scoped allocations (`StackAlloc`, `CreateLVal`).
//! Buffers are boxed so their addresses stay stable while the frame lives,
//! and are released exactly once when the frame is popped.

use crate::error::InterpError;
use crate::memory::MemorySegment;
use crate::memory::sanitizer::{AllocKind, AllocationMap};
use crate::value::Value;
use anyhow::{Result, bail};
use fir::{BlockIdx, FuncId, Local};

/// Frames of the active calls and the allocations they own.
#[derive(Debug, Default)]
pub struct Stack {
    allocations: AllocationMap,
    frames: Vec<StackFrame>,
}

impl MemorySegment for Stack {
    fn allocations(&self) -> &AllocationMap {
        &self.allocations
    }
}

impl Stack {
    pub fn push(&mut self, frame: StackFrame) {
        self.frames.push(frame);
    }

    /// Removes the innermost frame and releases its scoped allocations.
    pub fn pop(&mut self) -> Option<StackFrame> {
        let mut frame = self.frames.pop()?;
        for buf in frame.allocs.drain(..) {
            self.allocations.remove(&buf);
        }
        Some(frame)
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn current(&self) -> Option<&StackFrame> {
        self.frames.last()
    }

    pub fn current_mut(&mut self) -> Option<&mut StackFrame> {
        self.frames.last_mut()
    }

    /// Allocates zeroed storage owned by the innermost frame.
    ///
    /// Returns `None` when there is no active frame.
    pub fn alloc(&mut self, size: usize) -> Option<usize> {
        let frame = self.frames.last_mut()?;
        let buf = vec![0u8; size].into_boxed_slice();
        let address = buf.as_ptr() as usize;
        self.allocations.insert(&buf, AllocKind::Frame);
        frame.allocs.push(buf);
        Some(address)
    }
}

/// Bindings and scoped allocations of one function invocation.
#[derive(Debug)]
pub struct StackFrame {
    function: FuncId,
    /// Current binding of every argument and instruction result.
    locals: Vec<Option<Value>>,
    current_block: BlockIdx,
    previous_block: Option<BlockIdx>,
    allocs: Vec<Box<[u8]>>,
}

impl StackFrame {
    pub fn new(function: FuncId, local_count: usize) -> Self {
        Self {
            function,
            locals: vec![None; local_count],
            current_block: BlockIdx(0),
            previous_block: None,
            allocs: Vec::new(),
        }
    }

    pub fn function(&self) -> FuncId {
        self.function
    }

    /// Binds `local`, replacing any previous binding.
    pub fn record_local(&mut self, local: Local, value: Value) -> Result<()> {
        let Some(slot) = self.locals.get_mut(local.index()) else {
            bail!(InterpError::InvalidOperand(format!(
                "{local} is outside the frame of {} ({} locals)",
                self.function,
                self.locals.len()
            )));
        };
        *slot = Some(value);
        Ok(())
    }

    pub fn lookup(&self, local: Local) -> Option<&Value> {
        self.locals.get(local.index())?.as_ref()
    }

    pub fn current_block(&self) -> BlockIdx {
        self.current_block
    }

    /// The block control arrived from, used to resolve PHI nodes.
    pub fn previous_block(&self) -> Option<BlockIdx> {
        self.previous_block
    }

    pub fn enter_block(&mut self, block: BlockIdx) {
        self.previous_block = Some(self.current_block);
        self.current_block = block;
    }

    pub fn alloc_count(&self) -> usize {
        self.allocs.len()
    }
}
