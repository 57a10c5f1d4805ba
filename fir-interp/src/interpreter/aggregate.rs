//! Value-semantics access to aggregates and builtin containers.
//!
//! Setters never modify their operand. They clone the aggregate, patch the
//! member bytes and yield the copy.

use super::InterpState;
use super::function::arity;
use crate::error::InterpError;
use crate::ty::{Member, WORD_SIZE, slot};
use crate::value::Value;
use anyhow::{Result, bail};
use fir::{Instruction, OpKind, Operand, Ty, TyKind};

/// Builtin container families and the types they accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Container {
    DynamicArray,
    Slice,
    Any,
    Range,
    Enum,
    Union,
}

impl Container {
    fn accepts(self, ty: &Ty) -> bool {
        matches!(
            (self, ty.kind()),
            (Self::DynamicArray, TyKind::DynamicArray { .. } | TyKind::String)
                | (Self::Slice, TyKind::Slice { .. })
                | (Self::Any, TyKind::Any)
                | (Self::Range, TyKind::Range)
                | (Self::Enum, TyKind::Enum { .. })
                | (Self::Union, TyKind::Union { .. })
        )
    }
}

/// Container, slot and whether the op writes the slot.
fn container_access(op: OpKind) -> Option<(Container, usize, bool)> {
    use Container::*;
    use OpKind::*;
    let access = match op {
        SaaGetData => (DynamicArray, slot::SAA_DATA, false),
        SaaGetLength => (DynamicArray, slot::SAA_LENGTH, false),
        SaaGetCapacity => (DynamicArray, slot::SAA_CAPACITY, false),
        SaaGetRefCountPtr => (DynamicArray, slot::SAA_REFCOUNT, false),
        SaaSetData => (DynamicArray, slot::SAA_DATA, true),
        SaaSetLength => (DynamicArray, slot::SAA_LENGTH, true),
        SaaSetCapacity => (DynamicArray, slot::SAA_CAPACITY, true),
        SaaSetRefCountPtr => (DynamicArray, slot::SAA_REFCOUNT, true),

        ArraySliceGetData => (Slice, slot::SLICE_DATA, false),
        ArraySliceGetLength => (Slice, slot::SLICE_LENGTH, false),
        ArraySliceSetData => (Slice, slot::SLICE_DATA, true),
        ArraySliceSetLength => (Slice, slot::SLICE_LENGTH, true),

        AnyGetTypeId => (Any, slot::ANY_TYPEID, false),
        AnyGetRefCountPtr => (Any, slot::ANY_REFCOUNT, false),
        AnyGetData => (Any, slot::ANY_DATA, false),
        AnySetTypeId => (Any, slot::ANY_TYPEID, true),
        AnySetRefCountPtr => (Any, slot::ANY_REFCOUNT, true),
        AnySetData => (Any, slot::ANY_DATA, true),

        RangeGetLower => (Range, slot::RANGE_LOWER, false),
        RangeGetUpper => (Range, slot::RANGE_UPPER, false),
        RangeGetStep => (Range, slot::RANGE_STEP, false),
        RangeSetLower => (Range, slot::RANGE_LOWER, true),
        RangeSetUpper => (Range, slot::RANGE_UPPER, true),
        RangeSetStep => (Range, slot::RANGE_STEP, true),

        EnumGetIndex => (Enum, slot::ENUM_INDEX, false),
        EnumGetValue => (Enum, slot::ENUM_VALUE, false),
        EnumSetIndex => (Enum, slot::ENUM_INDEX, true),
        EnumSetValue => (Enum, slot::ENUM_VALUE, true),
        _ => return None,
    };
    Some(access)
}

/// The variant id of a tagged union occupies the first word.
fn variant_id_member() -> Member {
    Member {
        offset: 0,
        size: WORD_SIZE,
        ty: Ty::word(),
    }
}

impl<'m> InterpState<'m> {
    pub(super) fn execute_aggregate(&mut self, inst: &Instruction) -> Result<Value> {
        let args = inst.args.as_slice();
        match (inst.op, args) {
            (OpKind::InsertValue, [aggregate, element, index]) => {
                let aggregate = self.operand(aggregate)?;
                let element = self.operand(element)?;
                let member = self.member(aggregate.ty(), self.const_index(index)?)?;
                with_member(&aggregate, &member, &element)
            }
            (OpKind::ExtractValue, [aggregate, index]) => {
                let aggregate = self.operand(aggregate)?;
                let member = self.member(aggregate.ty(), self.const_index(index)?)?;
                aggregate.read_at(member.offset, member.ty)
            }
            (OpKind::UnionGetVariantId, [union]) => {
                let union = self.container_operand(Container::Union, inst.op, union)?;
                union.read_at(0, Ty::word())
            }
            (OpKind::UnionSetVariantId, [union, id]) => {
                let union = self.container_operand(Container::Union, inst.op, union)?;
                let id = self.word_operand(id)?;
                with_member(&union, &variant_id_member(), &id)
            }
            (OpKind::UnionGetValue, [union, variant]) => {
                let union = self.container_operand(Container::Union, inst.op, union)?;
                let member = self.member(union.ty(), self.const_index(variant)?)?;
                union.read_at(member.offset, member.ty)
            }
            (OpKind::UnionSetValue, [union, variant, value]) => {
                let union = self.container_operand(Container::Union, inst.op, union)?;
                let index = self.const_index(variant)?;
                let member = self.member(union.ty(), index)?;
                let value = self.operand(value)?;
                let id = Value::from_int(Ty::word(), index as i128)?;
                let union = with_member(&union, &variant_id_member(), &id)?;
                with_member(&union, &member, &value)
            }
            (op, [aggregate, rest @ ..]) => {
                let Some((container, slot, write)) = container_access(op) else {
                    bail!(InterpError::InvalidOperand(format!(
                        "{op:?} is not an aggregate operation"
                    )));
                };
                let aggregate = self.container_operand(container, op, aggregate)?;
                let member = self.member(aggregate.ty(), slot)?;
                match (write, rest) {
                    (false, []) => aggregate.read_at(member.offset, member.ty),
                    (true, [value]) => {
                        let value = self.operand(value)?;
                        with_member(&aggregate, &member, &value)
                    }
                    _ => bail!(arity(inst, if write { "2" } else { "1" })),
                }
            }
            _ => bail!(arity(inst, "more")),
        }
    }

    fn container_operand(
        &mut self,
        container: Container,
        op: OpKind,
        operand: &Operand,
    ) -> Result<Value> {
        let value = self.operand(operand)?;
        if !container.accepts(value.ty()) {
            bail!(InterpError::UnsupportedOperandTypes {
                op: format!("{op:?}"),
                types: value.ty().to_string(),
            });
        }
        Ok(value)
    }

    fn word_operand(&mut self, operand: &Operand) -> Result<Value> {
        let value = self.operand(operand)?;
        match value.as_int() {
            Some(int) if value.ty().is_integer() => Value::from_int(Ty::word(), int),
            _ => bail!(InterpError::UnsupportedOperandTypes {
                op: "variant id".into(),
                types: value.ty().to_string(),
            }),
        }
    }
}

/// Copy of `aggregate` with `member` replaced by the bytes of `element`.
fn with_member(aggregate: &Value, member: &Member, element: &Value) -> Result<Value> {
    if element.size() != member.size {
        bail!(InterpError::SizeMismatch {
            expected: member.size,
            found: element.size(),
        });
    }
    let mut copy = Value::from_bytes(aggregate.ty().clone(), aggregate.as_bytes())?;
    copy.write_at(member.offset, element.as_bytes())?;
    Ok(copy)
}
