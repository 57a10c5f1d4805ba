//! Allocation bookkeeping for the memory sanitizer.
//!
//! Every buffer the interpreter hands out an address for is recorded here
//! with its kind, so raw accesses can be checked against live allocations
//! and rejected accesses can say what they missed. Buffers never overlap;
//! recording an overlapping one is an interpreter bug and panics.
use std::collections::BTreeMap;
use std::fmt;

/// What an allocation backs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocKind {
    /// `StackAlloc`/`CreateLVal` storage of a live frame.
    Frame,
    /// Storage of a global variable.
    Global,
    /// Entry of the string pool.
    Str,
    /// Backing buffer of an owned constant.
    Constant,
}

impl fmt::Display for AllocKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AllocKind::Frame => "stack",
            AllocKind::Global => "global",
            AllocKind::Str => "string",
            AllocKind::Constant => "constant",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy)]
struct Allocation {
    size: usize,
    kind: AllocKind,
}

/// Live allocations keyed by start address.
#[derive(Debug, Default)]
pub struct AllocationMap {
    allocations: BTreeMap<usize, Allocation>,
}

impl AllocationMap {
    /// Records `buf`. Empty buffers have no addressable bytes and are skipped.
    pub fn insert(&mut self, buf: &[u8], kind: AllocKind) {
        if buf.is_empty() {
            return;
        }
        let (start, size) = (buf.as_ptr() as usize, buf.len());
        if let Some((other, existing)) = self.overlapping(start, size) {
            panic!(
                "{kind} allocation 0x{start:x}+{size} overlaps {} allocation at 0x{other:x}",
                existing.kind
            );
        }
        self.allocations.insert(start, Allocation { size, kind });
    }

    /// Forgets `buf`, which must have been recorded.
    pub fn remove(&mut self, buf: &[u8]) {
        if buf.is_empty() {
            return;
        }
        let start = buf.as_ptr() as usize;
        if self.allocations.remove(&start).is_none() {
            panic!("no allocation recorded at 0x{start:x}");
        }
    }

    /// Kind of the single allocation covering `address..address + size`.
    pub fn owner(&self, address: usize, size: usize) -> Option<AllocKind> {
        let end = address.checked_add(size)?;
        let (&start, alloc) = self.allocations.range(..=address).next_back()?;
        (end <= start + alloc.size).then_some(alloc.kind)
    }

    pub fn contains(&self, address: usize, size: usize) -> bool {
        self.owner(address, size).is_some()
    }

    pub fn len(&self) -> usize {
        self.allocations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.allocations.is_empty()
    }

    fn overlapping(&self, start: usize, size: usize) -> Option<(usize, Allocation)> {
        // Only the last allocation starting before our end can reach into us.
        let (&other, &alloc) = self.allocations.range(..start + size).next_back()?;
        (start < other + alloc.size).then_some((other, alloc))
    }
}
