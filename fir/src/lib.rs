//! Typed intermediate representation consumed by the interpreter.
//!
//! This crate only models the IR: types, constants, functions, blocks and
//! instructions. It is produced by the type checker and code generator and is
//! treated as already verified by everything that consumes it.

mod builder;
mod constant;
mod module;
mod ty;

pub use builder::FunctionBuilder;
pub use constant::{ConstKind, Constant, DynamicArrayConst};
pub use module::{
    Block, BlockIdx, ConstId, FuncId, Function, Global, GlobalId, Instruction, Local, LocalDecl,
    Module, OpKind, Operand, StringId,
};
pub use ty::{FloatTy, Ty, TyKind};
