use crate::module::{ConstId, FuncId, GlobalId, StringId};
use crate::ty::Ty;

/// An immutable constant. Constants are shared between instructions and are
/// identified by their [`ConstId`].
#[derive(Debug, Clone, PartialEq)]
pub struct Constant {
    pub ty: Ty,
    pub kind: ConstKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConstKind {
    /// Integer literal. Truncated to the width of the constant type.
    Int(i128),
    Float(f64),
    Bool(bool),
    /// All-zero value of the constant type. Also used for null pointers.
    Zero,
    /// String literal; materializes as a pointer to NUL-terminated bytes.
    String(String),
    /// Reinterprets another constant as the type of this one.
    Bitcast(ConstId),
    Array(Vec<ConstId>),
    Tuple(Vec<ConstId>),
    EnumCase { index: ConstId, value: ConstId },
    Slice { data: ConstId, len: ConstId },
    DynamicArray(DynamicArrayConst),
    /// Reference to a function without calling it.
    Function(FuncId),
    /// Reference to a global variable. The constant type is the type of the
    /// variable and the reference is an l-value.
    GlobalVar(GlobalId),
    /// Reference to an entry of the module's global string pool.
    GlobalString(StringId),
}

#[derive(Debug, Clone, PartialEq)]
pub enum DynamicArrayConst {
    /// Backed by storage owned by the constant itself.
    Owned { array: ConstId },
    /// Built from explicit data pointer, length and capacity.
    Parts {
        data: ConstId,
        len: ConstId,
        capacity: ConstId,
    },
}
