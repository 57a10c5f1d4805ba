//! Operand evaluation, l-values and raw memory operations.

use super::InterpState;
use super::function::result_decl;
use crate::error::InterpError;
use crate::ty::{Member, PackedLayout};
use crate::value::{Origin, Value};
use anyhow::{Result, bail};
use fir::{ConstKind, Function, Instruction, OpKind, Operand, Ty};

impl<'m> InterpState<'m> {
    /// Evaluates an operand to its value.
    ///
    /// L-value operands are decayed: the value is loaded from the address
    /// they are bound to.
    pub(super) fn operand(&mut self, operand: &Operand) -> Result<Value> {
        match operand {
            Operand::Local(local) => {
                let frame = self.frame()?;
                let func = self.module.function(frame.function());
                let Some(value) = frame.lookup(*local) else {
                    bail!(InterpError::UnboundValue {
                        value: local.to_string(),
                        function: func.name().to_string(),
                    });
                };
                match func.local(*local) {
                    Some(decl) if decl.lvalue => {
                        let address = value.as_address()?;
                        let loaded = self.memory.read_value(address, &decl.ty)?;
                        Ok(loaded.with_origin(Origin::Local(*local)))
                    }
                    _ => Ok(value.clone()),
                }
            }
            Operand::Const(id) => self.const_operand(*id),
            Operand::Block(_) | Operand::Type(_) => bail!(InterpError::InvalidOperand(format!(
                "{operand:?} is not a value"
            ))),
        }
    }

    pub(super) fn operands(&mut self, operands: &[Operand]) -> Result<Vec<Value>> {
        operands.iter().map(|op| self.operand(op)).collect()
    }

    /// Address and value type of an l-value operand.
    pub(super) fn operand_address(&mut self, operand: &Operand) -> Result<(usize, Ty)> {
        match operand {
            Operand::Local(local) => {
                let frame = self.frame()?;
                let func = self.module.function(frame.function());
                match (frame.lookup(*local), func.local(*local)) {
                    (Some(value), Some(decl)) if decl.lvalue => {
                        Ok((value.as_address()?, decl.ty.clone()))
                    }
                    (None, _) => bail!(InterpError::UnboundValue {
                        value: local.to_string(),
                        function: func.name().to_string(),
                    }),
                    _ => bail!(InterpError::InvalidOperand(format!(
                        "{local} is not an l-value"
                    ))),
                }
            }
            Operand::Const(id) => {
                let constant = self.module.constant(*id);
                if !matches!(constant.kind, ConstKind::GlobalVar(_)) {
                    bail!(InterpError::InvalidOperand(format!("constant {id} is not an l-value")));
                }
                let address = self.const_value(*id)?.as_address()?;
                Ok((address, constant.ty.clone()))
            }
            _ => bail!(InterpError::InvalidOperand(format!(
                "{operand:?} is not an l-value"
            ))),
        }
    }

    /// A non-negative integer constant, as used for member indices.
    pub(super) fn const_index(&self, operand: &Operand) -> Result<usize> {
        if let Operand::Const(id) = operand
            && let ConstKind::Int(index) = self.module.constant(*id).kind
            && let Ok(index) = usize::try_from(index)
        {
            return Ok(index);
        }
        bail!(InterpError::InvalidOperand(format!(
            "expected a constant index, found {operand:?}"
        )))
    }

    /// An integer operand extended according to its signedness.
    fn int_operand(&mut self, operand: &Operand) -> Result<i128> {
        let value = self.operand(operand)?;
        match value.as_int() {
            Some(int) if value.ty().is_integer() => Ok(int),
            _ => bail!(InterpError::UnsupportedOperandTypes {
                op: "index".into(),
                types: value.ty().to_string(),
            }),
        }
    }

    fn pointer_operand(&mut self, operand: &Operand) -> Result<(usize, Ty)> {
        let value = self.operand(operand)?;
        match value.ty().pointee() {
            Some(pointee) => Ok((value.as_address()?, pointee.clone())),
            None => bail!(InterpError::UnsupportedOperandTypes {
                op: "pointer".into(),
                types: value.ty().to_string(),
            }),
        }
    }

    /// Member `index` of `ty` according to its packed layout.
    pub(super) fn member(&mut self, ty: &Ty, index: usize) -> Result<Member> {
        match self.layouts.layout(ty).member(index) {
            Some(member) => Ok(member),
            None => bail!(InterpError::InvalidOperand(format!(
                "{ty} has no member {index}"
            ))),
        }
    }

    /// Executes memory and address instructions. Returns `None` for
    /// instructions without a result.
    pub(super) fn execute_place(
        &mut self,
        func: &Function,
        inst: &Instruction,
    ) -> Result<Option<Value>> {
        let args = inst.args.as_slice();
        let value = match (inst.op, args) {
            (OpKind::ReadPtr, [ptr]) => {
                let address = self.operand(ptr)?.as_address()?;
                let ty = &result_decl(func, inst)?.ty;
                self.memory.read_value(address, ty)?
            }
            (OpKind::WritePtr, [value, ptr]) => {
                let value = self.operand(value)?;
                let (address, pointee) = self.pointer_operand(ptr)?;
                self.store(address, &pointee, &value)?;
                return Ok(None);
            }
            (OpKind::Store, [value, lvalue]) => {
                let value = self.operand(value)?;
                let (address, ty) = self.operand_address(lvalue)?;
                self.store(address, &ty, &value)?;
                return Ok(None);
            }
            (OpKind::StackAlloc | OpKind::CreateLVal, [Operand::Type(ty)]) => {
                // Zero-sized types still get a distinct address.
                let size = ty.size().max(1);
                let Some(address) = self.memory.stack.alloc(size) else {
                    bail!("No active stack frame");
                };
                Value::from_address(ty.mut_pointer_to(), address)
            }
            (OpKind::AddressOf, [lvalue]) => {
                let (address, ty) = self.operand_address(lvalue)?;
                Value::from_address(ty.mut_pointer_to(), address)
            }
            (OpKind::Dereference, [ptr]) => {
                let (address, pointee) = self.pointer_operand(ptr)?;
                Value::from_address(pointee.mut_pointer_to(), address)
            }
            (OpKind::GetPointer, [ptr, index]) => {
                let base = self.operand(ptr)?;
                let Some(pointee) = base.ty().pointee() else {
                    bail!(InterpError::UnsupportedOperandTypes {
                        op: "GetPointer".into(),
                        types: base.ty().to_string(),
                    });
                };
                let stride = pointee.size() as i128;
                let index = self.int_operand(index)?;
                let address = offset(base.as_address()?, index * stride);
                Value::from_address(base.ty().clone(), address)
            }
            (OpKind::GetGep2, [ptr, first, second]) => {
                let (base, array) = self.pointer_operand(ptr)?;
                let Some(elem) = array.element().cloned() else {
                    bail!(InterpError::UnsupportedOperandTypes {
                        op: "GetGep2".into(),
                        types: array.to_string(),
                    });
                };
                let first = self.int_operand(first)? * array.size() as i128;
                let second = self.int_operand(second)? * elem.size() as i128;
                Value::from_address(elem.mut_pointer_to(), offset(base, first + second))
            }
            (OpKind::GetStructMember, [lvalue, index]) => {
                let (address, ty) = self.operand_address(lvalue)?;
                let member = self.member(&ty, self.const_index(index)?)?;
                Value::from_address(member.ty.mut_pointer_to(), address + member.offset)
            }
            (OpKind::GetPointerToStructMember, [ptr, ptr_index, index]) => {
                let (base, pointee) = self.pointer_operand(ptr)?;
                let member = self.member(&pointee, self.const_index(index)?)?;
                let element = self.int_operand(ptr_index)? * pointee.size() as i128;
                let address = offset(base, element) + member.offset;
                Value::from_address(member.ty.mut_pointer_to(), address)
            }
            (OpKind::RawUnionGep, [lvalue, Operand::Type(variant)]) => {
                let (address, _) = self.operand_address(lvalue)?;
                Value::from_address(variant.mut_pointer_to(), address)
            }
            (OpKind::Sizeof, [Operand::Type(ty)]) => {
                let result = result_decl(func, inst)?.ty.clone();
                Value::from_int(result, ty.size() as i128)?
            }
            (OpKind::Select, [cond, then, otherwise]) => {
                let cond = self.operand(cond)?;
                match cond.as_bool() {
                    Some(true) => self.operand(then)?,
                    Some(false) => self.operand(otherwise)?,
                    None => bail!(InterpError::UnsupportedOperandTypes {
                        op: "Select".into(),
                        types: cond.ty().to_string(),
                    }),
                }
            }
            _ => bail!(InterpError::InvalidOperand(format!(
                "malformed operands for {:?}: {:?}",
                inst.op, inst.args
            ))),
        };
        Ok(Some(value))
    }

    fn store(&mut self, address: usize, ty: &Ty, value: &Value) -> Result<()> {
        if ty.size() != value.size() {
            bail!(InterpError::SizeMismatch {
                expected: ty.size(),
                found: value.size(),
            });
        }
        self.memory.write_addr(address, value.as_bytes())
    }
}

fn offset(address: usize, delta: i128) -> usize {
    (address as i128).wrapping_add(delta) as usize
}
