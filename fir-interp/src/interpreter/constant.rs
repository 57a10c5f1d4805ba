//! Constant materialization.
//!
//! Constants are immutable and shared between instructions, so each one is
//! materialized once and cached by its [`ConstId`].

use super::InterpState;
use crate::error::InterpError;
use crate::ty::PackedLayout;
use crate::value::{Origin, Value};
use anyhow::{Context, Result, bail};
use fir::{ConstId, ConstKind, DynamicArrayConst, Ty};
use tracing::trace;

impl<'m> InterpState<'m> {
    /// The materialized value of a constant.
    ///
    /// Global variable references yield the address of the variable.
    pub(super) fn const_value(&mut self, id: ConstId) -> Result<Value> {
        if let Some(value) = self.constants.get(&id) {
            return Ok(value.clone());
        }
        let value = self
            .materialize(id)
            .with_context(|| format!("Failed to materialize constant {id}"))?
            .with_origin(Origin::Const(id));
        trace!("Materialized {id} = {value}");
        self.constants.insert(id, value.clone());
        Ok(value)
    }

    /// A constant used as an operand. Global variable references are
    /// l-values and decay to the current contents of the variable.
    pub(super) fn const_operand(&mut self, id: ConstId) -> Result<Value> {
        let constant = self.module.constant(id);
        let value = self.const_value(id)?;
        match constant.kind {
            ConstKind::GlobalVar(_) => {
                let loaded = self.memory.read_value(value.as_address()?, &constant.ty)?;
                Ok(loaded.with_origin(Origin::Const(id)))
            }
            _ => Ok(value),
        }
    }

    fn materialize(&mut self, id: ConstId) -> Result<Value> {
        let module = self.module;
        let constant = module.constant(id);
        let ty = constant.ty.clone();
        match &constant.kind {
            ConstKind::Int(value) => Value::from_int(ty, *value),
            ConstKind::Float(value) => Value::from_float(ty, *value),
            ConstKind::Bool(value) => Value::from_int(ty, i128::from(*value)),
            ConstKind::Zero => Ok(Value::zeroed(ty)),
            ConstKind::String(value) => {
                let address = self.memory.statics.intern_string(value);
                address_value(ty, address)
            }
            ConstKind::GlobalString(string) => {
                let address = self.global_string(*string);
                address_value(ty, address)
            }
            ConstKind::Bitcast(inner) => self.const_operand(*inner)?.retype(ty),
            ConstKind::Array(elements) | ConstKind::Tuple(elements) => {
                self.composite(ty, elements)
            }
            ConstKind::EnumCase { index, value } => self.composite(ty, &[*index, *value]),
            ConstKind::Slice { data, len } => self.composite(ty, &[*data, *len]),
            ConstKind::DynamicArray(DynamicArrayConst::Parts {
                data,
                len,
                capacity,
            }) => {
                let parts = [
                    self.const_operand(*data)?,
                    self.const_operand(*len)?,
                    self.const_operand(*capacity)?,
                    Value::from_int(Ty::word(), 0)?,
                ];
                concat(ty, &parts)
            }
            ConstKind::DynamicArray(DynamicArrayConst::Owned { array }) => {
                // The backing storage lives as long as the interpreter.
                let array = self.const_operand(*array)?;
                let len = self.layouts.layout(array.ty()).member_count();
                let address = self.memory.statics.alloc_bytes(array.as_bytes());
                let Some(data_ty) = ty.member_types().first().cloned() else {
                    bail!(InterpError::UnsupportedOperandTypes {
                        op: "dynamic array constant".into(),
                        types: ty.to_string(),
                    });
                };
                let parts = [
                    Value::from_address(data_ty, address),
                    Value::from_int(Ty::word(), len as i128)?,
                    Value::from_int(Ty::word(), -1)?,
                    Value::from_int(Ty::word(), 0)?,
                ];
                concat(ty, &parts)
            }
            ConstKind::Function(func) => {
                let address = self.compile_function(*func)?;
                address_value(ty, address)
            }
            ConstKind::GlobalVar(global) => match self.globals.get(global) {
                Some(reference) => Ok(reference.clone()),
                None => bail!(InterpError::UnresolvedGlobal(
                    module.global(*global).name.clone()
                )),
            },
        }
    }

    /// Concatenates the members of a composite constant.
    fn composite(&mut self, ty: Ty, members: &[ConstId]) -> Result<Value> {
        let values = members
            .iter()
            .map(|member| self.const_operand(*member))
            .collect::<Result<Vec<_>>>()?;
        concat(ty, &values)
    }
}

fn address_value(ty: Ty, address: usize) -> Result<Value> {
    Value::from_int(ty, address as i128)
}

/// Builds a value of `ty` from member values laid out back to back.
fn concat(ty: Ty, members: &[Value]) -> Result<Value> {
    let bytes: Vec<u8> = members
        .iter()
        .flat_map(|member| member.as_bytes().iter().copied())
        .collect();
    if bytes.len() != ty.size() {
        bail!(InterpError::SizeMismatch {
            expected: ty.size(),
            found: bytes.len(),
        });
    }
    Value::from_bytes(ty, &bytes)
}
