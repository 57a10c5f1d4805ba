//! Direct, indirect and virtual calls.

use super::InterpState;
use super::function::arity;
use crate::error::InterpError;
use crate::ffi::{self, ForeignFn};
use crate::ty::WORD_SIZE;
use crate::value::Value;
use anyhow::{Result, bail};
use fir::{ConstKind, FuncId, Instruction, OpKind, Operand, Ty};
use tracing::debug;

/// Remaining host stack below which an interpreted call moves to a new segment.
const STACK_RED_ZONE: usize = 128 * 1024;
/// Size of each segment allocated when the host stack runs low.
const STACK_GROW_SIZE: usize = 4 * 1024 * 1024;

impl<'m> InterpState<'m> {
    /// Calls `id` with already evaluated arguments.
    ///
    /// Functions with a body are interpreted in a new frame. Declarations are
    /// forwarded to native code.
    pub(super) fn call_function(&mut self, id: FuncId, args: Vec<Value>) -> Result<Value> {
        let func = self.module.function(id);
        let fixed = func.param_count();
        let arity_ok = if func.is_variadic() {
            args.len() >= fixed
        } else {
            args.len() == fixed
        };
        if !arity_ok {
            bail!(InterpError::ArgumentCountMismatch {
                function: func.name().to_string(),
                expected: fixed,
                found: args.len(),
            });
        }
        if func.is_declaration() {
            return self.call_foreign_function(id, &args);
        }

        self.compile_function(id)?;
        debug!("Calling {} with {} arguments", func.name(), args.len());
        // Interpreted calls recurse on the host stack.
        let result = stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || {
            self.with_stack_frame(id, args, |state| state.run_blocks(id))
        })?;
        debug!("{} returned {result}", func.name());
        Ok(result)
    }

    fn call_foreign_function(&mut self, id: FuncId, args: &[Value]) -> Result<Value> {
        let func = self.module.function(id);
        let symbol = self
            .symbol_aliases
            .get(&id)
            .map_or(func.name(), String::as_str);
        let Some(address) = self.resolver.resolve(symbol) else {
            bail!(InterpError::ForeignSymbolNotFound(symbol.to_string()));
        };
        let callee = ForeignFn {
            name: symbol,
            address,
            ret: func.return_ty(),
            fixed_params: func.param_count(),
            variadic: func.is_variadic(),
        };
        ffi::call_foreign(callee, args)
    }

    /// Calls through a function identity, falling back to native code for
    /// addresses the interpreter did not hand out.
    fn call_pointer(&mut self, pointer: &Value, fn_ty: &Ty, args: Vec<Value>) -> Result<Value> {
        let address = pointer.as_address()?;
        if let Some(id) = self.function_at(address) {
            return self.call_function(id, args);
        }
        let Some((params, ret, variadic)) = fn_ty.fn_signature() else {
            bail!(InterpError::UnknownFunction(address));
        };
        if address == 0 {
            bail!(InterpError::UnknownFunction(address));
        }
        debug!("Calling native function pointer 0x{address:x}");
        let callee = ForeignFn {
            name: "<function pointer>",
            address,
            ret,
            fixed_params: params.len(),
            variadic,
        };
        ffi::call_foreign(callee, &args)
    }

    pub(super) fn execute_call(&mut self, inst: &Instruction) -> Result<Value> {
        let module = self.module;
        match (inst.op, inst.args.as_slice()) {
            (OpKind::CallFunction, [Operand::Const(callee), args @ ..]) => {
                let ConstKind::Function(id) = module.constant(*callee).kind else {
                    bail!(InterpError::InvalidOperand(format!(
                        "constant {callee} is not a function"
                    )));
                };
                let args = self.operands(args)?;
                self.call_function(id, args)
            }
            (OpKind::CallFunctionPointer, [callee, args @ ..]) => {
                let pointer = self.operand(callee)?;
                let args = self.operands(args)?;
                let fn_ty = pointer.ty().clone();
                self.call_pointer(&pointer, &fn_ty, args)
            }
            (
                OpKind::CallVirtualMethod,
                [Operand::Type(_class), index, Operand::Type(fn_ty), receiver, rest @ ..],
            ) => {
                let index = self.operand(index)?;
                let Some(index) = index.as_int().filter(|_| index.ty().is_integer()) else {
                    bail!(InterpError::UnsupportedOperandTypes {
                        op: "vtable index".into(),
                        types: index.ty().to_string(),
                    });
                };
                let receiver = self.operand(receiver)?;
                let object = receiver.as_address()?;
                // The vtable pointer is the first member of every class.
                let vtable = self.memory.read_value(object, &Ty::uword())?.as_address()?;
                let slot = vtable.wrapping_add((index as usize).wrapping_mul(WORD_SIZE));
                let pointer = self.memory.read_value(slot, fn_ty)?;
                debug!("Virtual call through slot {index} of vtable 0x{vtable:x}");

                let mut args = Vec::with_capacity(rest.len() + 1);
                args.push(receiver);
                args.extend(self.operands(rest)?);
                self.call_pointer(&pointer, fn_ty, args)
            }
            _ => bail!(arity(inst, "callee and argument")),
        }
    }
}
