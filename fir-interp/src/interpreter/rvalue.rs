//! Arithmetic, comparison, bitwise and cast semantics.
//!
//! Integers are computed in `i128` after extending both operands according
//! to the operation, then truncated back to the operand width. This gives
//! two's complement wrapping for every width without per-width code.

use crate::error::InterpError;
use crate::ty::PackedLayout;
use crate::value::Value;
use anyhow::{Result, bail};
use fir::{FloatTy, OpKind, Ty, TyKind};
use num_traits::Float;
use std::cmp::Ordering;
use zerocopy::FromBytes;

/// Trait for evaluating binary operations on values.
pub trait BinaryEval {
    /// Evaluates a binary operation on two values.
    ///
    /// # Arguments
    /// * `left` - Left operand value
    /// * `right` - Right operand value
    ///
    /// # Returns
    /// * `Ok(Value)` - Result of the operation
    /// * `Err(anyhow::Error)` - If operation fails or is unsupported
    fn eval(&self, left: &Value, right: &Value) -> Result<Value>;
}

/// Trait for evaluating unary operations on values.
pub trait UnaryEval {
    /// Evaluates a unary operation on a value.
    fn eval_unary(&self, operand: &Value) -> Result<Value>;
}

impl BinaryEval for OpKind {
    fn eval(&self, left: &Value, right: &Value) -> Result<Value> {
        use OpKind::*;
        match self {
            SignedAdd | UnsignedAdd | SignedSub | UnsignedSub | SignedMul | UnsignedMul
            | SignedDiv | UnsignedDiv | SignedMod | UnsignedMod => {
                eval_int_arith(*self, left, right)
            }
            FloatingAdd | FloatingSub | FloatingMul | FloatingDiv | FloatingMod => {
                eval_float_arith(*self, left, right)
            }
            ICompareEqual | ICompareNotEqual | ICompareGreater | ICompareLess
            | ICompareGreaterEqual | ICompareLessEqual | ICompareMulti => {
                eval_int_compare(*self, left, right)
            }
            FCompareEqualOrd | FCompareEqualUnord | FCompareNotEqualOrd
            | FCompareNotEqualUnord | FCompareGreaterOrd | FCompareGreaterUnord
            | FCompareLessOrd | FCompareLessUnord | FCompareGreaterEqualOrd
            | FCompareGreaterEqualUnord | FCompareLessEqualOrd | FCompareLessEqualUnord
            | FCompareMulti => eval_float_compare(*self, left, right),
            BitwiseAnd | BitwiseOr | BitwiseXor => eval_bitwise(*self, left, right),
            BitwiseShl | BitwiseLogicalShr | BitwiseArithmeticShr => {
                eval_shift(*self, left, right)
            }
            _ => Err(unsupported(*self, &[left, right])),
        }
    }
}

impl UnaryEval for OpKind {
    fn eval_unary(&self, operand: &Value) -> Result<Value> {
        let ty = operand.ty().clone();
        match (self, ty.kind()) {
            (OpKind::SignedNeg, TyKind::Int { .. }) => {
                let value = int_operand(*self, operand, true)?;
                Value::from_int(ty, value.wrapping_neg())
            }
            (OpKind::FloatingNeg, TyKind::Float(FloatTy::F32)) => {
                Ok(Value::from_f32(-float_operand::<f32>(*self, operand)?))
            }
            (OpKind::FloatingNeg, TyKind::Float(FloatTy::F64)) => {
                Ok(Value::from_f64(-float_operand::<f64>(*self, operand)?))
            }
            (OpKind::BitwiseNot, TyKind::Int { .. }) => {
                let bytes: Vec<u8> = operand.as_bytes().iter().map(|b| !b).collect();
                Value::from_bytes(ty, &bytes)
            }
            (OpKind::LogicalNot, TyKind::Bool) => match operand.as_bool() {
                Some(value) => Ok(Value::from_bool(!value)),
                None => Err(unsupported(*self, &[operand])),
            },
            _ => Err(unsupported(*self, &[operand])),
        }
    }
}

fn unsupported(op: OpKind, operands: &[&Value]) -> anyhow::Error {
    let types = operands
        .iter()
        .map(|value| value.ty().to_string())
        .collect::<Vec<_>>()
        .join(", ");
    InterpError::UnsupportedOperandTypes {
        op: format!("{op:?}"),
        types,
    }
    .into()
}

fn int_operand(op: OpKind, value: &Value, signed: bool) -> Result<i128> {
    value
        .to_int(signed)
        .ok_or_else(|| unsupported(op, &[value]))
}

fn float_operand<F: FromBytes>(op: OpKind, value: &Value) -> Result<F> {
    value
        .as_type::<F>()
        .ok_or_else(|| unsupported(op, &[value]))
}

fn eval_int_arith(op: OpKind, left: &Value, right: &Value) -> Result<Value> {
    use OpKind::*;
    if left.ty() != right.ty() || !left.ty().is_integer() {
        return Err(unsupported(op, &[left, right]));
    }
    let signed = matches!(op, SignedAdd | SignedSub | SignedMul | SignedDiv | SignedMod);
    let l = int_operand(op, left, signed)?;
    let r = int_operand(op, right, signed)?;
    let result = match op {
        SignedAdd | UnsignedAdd => l.wrapping_add(r),
        SignedSub | UnsignedSub => l.wrapping_sub(r),
        SignedMul | UnsignedMul => l.wrapping_mul(r),
        SignedDiv | UnsignedDiv | SignedMod | UnsignedMod if r == 0 => {
            bail!(InterpError::DivisionByZero)
        }
        SignedDiv | UnsignedDiv => l / r,
        // Truncating remainder: the result takes the sign of the dividend.
        _ => l % r,
    };
    Value::from_int(left.ty().clone(), result)
}

fn eval_float_arith(op: OpKind, left: &Value, right: &Value) -> Result<Value> {
    if left.ty() != right.ty() {
        return Err(unsupported(op, &[left, right]));
    }
    match left.ty().kind() {
        TyKind::Float(FloatTy::F32) => {
            let l = float_operand::<f32>(op, left)?;
            let r = float_operand::<f32>(op, right)?;
            Ok(Value::from_f32(float_binop(op, l, r)))
        }
        TyKind::Float(FloatTy::F64) => {
            let l = float_operand::<f64>(op, left)?;
            let r = float_operand::<f64>(op, right)?;
            Ok(Value::from_f64(float_binop(op, l, r)))
        }
        _ => Err(unsupported(op, &[left, right])),
    }
}

fn float_binop<F: Float>(op: OpKind, left: F, right: F) -> F {
    match op {
        OpKind::FloatingAdd => left + right,
        OpKind::FloatingSub => left - right,
        OpKind::FloatingMul => left * right,
        OpKind::FloatingDiv => left / right,
        // `%` on floats is the C `fmod`.
        _ => left % right,
    }
}

fn ordering_value(ordering: Option<Ordering>) -> Value {
    let value = match ordering {
        Some(Ordering::Greater) => 1,
        Some(Ordering::Equal) => 0,
        Some(Ordering::Less) | None => -1,
    };
    Value::from_i64(value)
}

fn eval_int_compare(op: OpKind, left: &Value, right: &Value) -> Result<Value> {
    let ty = left.ty();
    let comparable = ty.is_integer() || ty.is_bool() || ty.is_pointer();
    if !comparable || !ty.same_repr(right.ty()) {
        return Err(unsupported(op, &[left, right]));
    }
    let signed = ty.is_signed();
    let ordering = int_operand(op, left, signed)?.cmp(&int_operand(op, right, signed)?);
    let result = match op {
        OpKind::ICompareEqual => ordering.is_eq(),
        OpKind::ICompareNotEqual => ordering.is_ne(),
        OpKind::ICompareGreater => ordering.is_gt(),
        OpKind::ICompareLess => ordering.is_lt(),
        OpKind::ICompareGreaterEqual => ordering.is_ge(),
        OpKind::ICompareLessEqual => ordering.is_le(),
        _ => return Ok(ordering_value(Some(ordering))),
    };
    Ok(Value::from_bool(result))
}

fn eval_float_compare(op: OpKind, left: &Value, right: &Value) -> Result<Value> {
    use OpKind::*;
    if left.ty() != right.ty() {
        return Err(unsupported(op, &[left, right]));
    }
    let (Some(l), Some(r)) = (left.as_float(), right.as_float()) else {
        return Err(unsupported(op, &[left, right]));
    };
    let ordering = l.partial_cmp(&r);
    let (predicate, unordered): (fn(Ordering) -> bool, bool) = match op {
        FCompareEqualOrd => (Ordering::is_eq, false),
        FCompareEqualUnord => (Ordering::is_eq, true),
        FCompareNotEqualOrd => (Ordering::is_ne, false),
        FCompareNotEqualUnord => (Ordering::is_ne, true),
        FCompareGreaterOrd => (Ordering::is_gt, false),
        FCompareGreaterUnord => (Ordering::is_gt, true),
        FCompareLessOrd => (Ordering::is_lt, false),
        FCompareLessUnord => (Ordering::is_lt, true),
        FCompareGreaterEqualOrd => (Ordering::is_ge, false),
        FCompareGreaterEqualUnord => (Ordering::is_ge, true),
        FCompareLessEqualOrd => (Ordering::is_le, false),
        FCompareLessEqualUnord => (Ordering::is_le, true),
        _ => return Ok(ordering_value(ordering)),
    };
    Ok(Value::from_bool(ordering.map_or(unordered, predicate)))
}

fn eval_bitwise(op: OpKind, left: &Value, right: &Value) -> Result<Value> {
    let ty = left.ty();
    if ty != right.ty() || !(ty.is_integer() || ty.is_bool()) {
        return Err(unsupported(op, &[left, right]));
    }
    let bytes: Vec<u8> = left
        .as_bytes()
        .iter()
        .zip(right.as_bytes())
        .map(|(l, r)| match op {
            OpKind::BitwiseAnd => l & r,
            OpKind::BitwiseOr => l | r,
            _ => l ^ r,
        })
        .collect();
    Value::from_bytes(ty.clone(), &bytes)
}

/// The shift amount may have any integer type and is taken modulo the width
/// of the shifted value.
fn eval_shift(op: OpKind, left: &Value, right: &Value) -> Result<Value> {
    if !left.ty().is_integer() || !right.ty().is_integer() {
        return Err(unsupported(op, &[left, right]));
    }
    let bits = (left.size() * 8) as u32;
    let amount = (int_operand(op, right, false)? as u32) & (bits - 1);
    let result = match op {
        OpKind::BitwiseShl => int_operand(op, left, false)? << amount,
        OpKind::BitwiseLogicalShr => int_operand(op, left, false)? >> amount,
        _ => int_operand(op, left, true)? >> amount,
    };
    Value::from_int(left.ty().clone(), result)
}

/// Evaluates a cast of `value` to `target`.
///
/// Only `CastFloatToInt`, `CastIntToFloat` and the floating width casts
/// convert numerically. Every other cast keeps the bit pattern, extending or
/// truncating integers as the cast requires.
pub(super) fn eval_cast(op: OpKind, value: &Value, target: &Ty) -> Result<Value> {
    use OpKind::*;
    let source = value.ty();
    let int_like = |ty: &Ty| ty.is_integer() || ty.is_bool();
    let result = match op {
        CastIntSize if int_like(source) && target.is_integer() => {
            Value::from_int(target.clone(), int_operand(op, value, source.is_signed())?)
        }
        IntegerZeroExt | IntegerTruncate if int_like(source) && int_like(target) => {
            Value::from_int(target.clone(), int_operand(op, value, false)?)
        }
        CastBitcast | CastSignedness | CastIntSignedness | CastPointerType => {
            value.clone().retype(target.clone())
        }
        CastPointerToInt if source.is_pointer() && target.is_integer() => {
            Value::from_int(target.clone(), int_operand(op, value, false)?)
        }
        CastIntToPointer if int_like(source) && target.is_pointer() => {
            Value::from_int(target.clone(), int_operand(op, value, source.is_signed())?)
        }
        CastFloatToInt if source.is_float() => match (value.as_float(), target.kind()) {
            (Some(float), TyKind::Int { bits, signed }) => {
                Value::from_int(target.clone(), saturate(float, *bits, *signed))
            }
            _ => Err(cast_error(op, value, target)),
        },
        CastIntToFloat if int_like(source) => {
            let int = int_operand(op, value, source.is_signed())?;
            match target.kind() {
                TyKind::Float(FloatTy::F32) => Value::from_type(target.clone(), int as f32),
                TyKind::Float(FloatTy::F64) => Value::from_type(target.clone(), int as f64),
                _ => Err(cast_error(op, value, target)),
            }
        }
        FloatingTruncate | FloatingExtend if source.is_float() => match value.as_float() {
            Some(float) => Value::from_float(target.clone(), float),
            None => Err(cast_error(op, value, target)),
        },
        _ => Err(cast_error(op, value, target)),
    }?;
    debug_assert_eq!(result.size(), target.size());
    Ok(result)
}

fn cast_error(op: OpKind, value: &Value, target: &Ty) -> anyhow::Error {
    InterpError::UnsupportedOperandTypes {
        op: format!("{op:?}"),
        types: format!("{} -> {target}", value.ty()),
    }
    .into()
}

/// Converts with Rust `as` semantics: NaN becomes 0 and out-of-range values
/// clamp to the bounds of the target integer.
fn saturate(value: f64, bits: u8, signed: bool) -> i128 {
    match (bits, signed) {
        (8, true) => i128::from(value as i8),
        (16, true) => i128::from(value as i16),
        (32, true) => i128::from(value as i32),
        (64, true) => i128::from(value as i64),
        (8, false) => i128::from(value as u8),
        (16, false) => i128::from(value as u16),
        (32, false) => i128::from(value as u32),
        _ => i128::from(value as u64),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::interp_error;

    fn scalar<T: FromBytes>(value: &Value) -> T {
        value.as_type::<T>().unwrap()
    }

    #[test]
    fn test_signed_add_is_four_bytes() {
        let sum = OpKind::SignedAdd
            .eval(&Value::from_i32(5), &Value::from_i32(3))
            .unwrap();
        assert_eq!(sum.size(), 4);
        assert_eq!(scalar::<i32>(&sum), 8);
    }

    #[test]
    fn test_division_and_remainder() {
        let quotient = OpKind::UnsignedDiv
            .eval(&Value::from_u32(7), &Value::from_u32(2))
            .unwrap();
        assert_eq!(scalar::<u32>(&quotient), 3);
        let rem = OpKind::SignedMod
            .eval(&Value::from_i32(-7), &Value::from_i32(3))
            .unwrap();
        assert_eq!(scalar::<i32>(&rem), -1);
        // Unsigned ops read the bits as unsigned regardless of the type.
        let rem = OpKind::UnsignedMod
            .eval(&Value::from_i8(-1), &Value::from_i8(10))
            .unwrap();
        assert_eq!(scalar::<i8>(&rem), 5);
    }

    #[test]
    fn test_division_by_zero() {
        let err = OpKind::SignedDiv
            .eval(&Value::from_i64(1), &Value::from_i64(0))
            .unwrap_err();
        assert_eq!(interp_error(&err), Some(&InterpError::DivisionByZero));
    }

    #[test]
    fn test_wrapping() {
        let sum = OpKind::SignedAdd
            .eval(&Value::from_i8(i8::MAX), &Value::from_i8(1))
            .unwrap();
        assert_eq!(scalar::<i8>(&sum), i8::MIN);
        let product = OpKind::UnsignedMul
            .eval(&Value::from_u64(u64::MAX), &Value::from_u64(u64::MAX))
            .unwrap();
        assert_eq!(scalar::<u64>(&product), 1);
    }

    #[test]
    fn test_mismatched_operands() {
        let err = OpKind::SignedAdd
            .eval(&Value::from_i32(1), &Value::from_i64(1))
            .unwrap_err();
        assert!(matches!(
            interp_error(&err),
            Some(InterpError::UnsupportedOperandTypes { types, .. }) if types == "i32, i64"
        ));
        assert!(
            OpKind::FloatingAdd
                .eval(&Value::from_f32(1.0), &Value::from_f64(1.0))
                .is_err()
        );
    }

    #[test]
    fn test_float_arith() {
        let rem = OpKind::FloatingMod
            .eval(&Value::from_f64(-7.5), &Value::from_f64(2.0))
            .unwrap();
        assert_eq!(scalar::<f64>(&rem), -1.5);
        let quotient = OpKind::FloatingDiv
            .eval(&Value::from_f32(1.0), &Value::from_f32(4.0))
            .unwrap();
        assert_eq!(quotient.ty(), &Ty::f32());
        assert_eq!(scalar::<f32>(&quotient), 0.25);
    }

    #[test]
    fn test_int_compare_uses_signedness() {
        let lt = OpKind::ICompareLess
            .eval(&Value::from_i8(-1), &Value::from_i8(1))
            .unwrap();
        assert_eq!(lt.as_bool(), Some(true));
        let lt = OpKind::ICompareLess
            .eval(&Value::from_u8(0xff), &Value::from_u8(1))
            .unwrap();
        assert_eq!(lt.as_bool(), Some(false));
        let multi = OpKind::ICompareMulti
            .eval(&Value::from_i32(2), &Value::from_i32(9))
            .unwrap();
        assert_eq!(multi.as_int(), Some(-1));
    }

    #[test]
    fn test_float_compare_nan() {
        let nan = Value::from_f64(f64::NAN);
        let one = Value::from_f64(1.0);
        let eq_ord = OpKind::FCompareEqualOrd.eval(&nan, &one).unwrap();
        let ne_unord = OpKind::FCompareNotEqualUnord.eval(&nan, &one).unwrap();
        let lt_unord = OpKind::FCompareLessUnord.eval(&nan, &one).unwrap();
        let ne_ord = OpKind::FCompareNotEqualOrd.eval(&nan, &one).unwrap();
        assert_eq!(eq_ord.as_bool(), Some(false));
        assert_eq!(ne_unord.as_bool(), Some(true));
        assert_eq!(lt_unord.as_bool(), Some(true));
        assert_eq!(ne_ord.as_bool(), Some(false));
        let multi = OpKind::FCompareMulti.eval(&one, &Value::from_f64(0.5)).unwrap();
        assert_eq!(multi.as_int(), Some(1));
    }

    #[test]
    fn test_bitwise_and_shifts() {
        let and = OpKind::BitwiseAnd
            .eval(&Value::from_u16(0xff0f), &Value::from_u16(0x0ff0))
            .unwrap();
        assert_eq!(scalar::<u16>(&and), 0x0f00);
        let xor = OpKind::BitwiseXor
            .eval(&Value::from_bool(true), &Value::from_bool(true))
            .unwrap();
        assert_eq!(xor.as_bool(), Some(false));

        let shl = OpKind::BitwiseShl
            .eval(&Value::from_u8(0x81), &Value::from_i64(1))
            .unwrap();
        assert_eq!(scalar::<u8>(&shl), 0x02);
        let lshr = OpKind::BitwiseLogicalShr
            .eval(&Value::from_i8(-128), &Value::from_i8(7))
            .unwrap();
        assert_eq!(scalar::<i8>(&lshr), 1);
        let ashr = OpKind::BitwiseArithmeticShr
            .eval(&Value::from_i8(-128), &Value::from_i8(7))
            .unwrap();
        assert_eq!(scalar::<i8>(&ashr), -1);
        // Amounts wrap at the bit width.
        let wrapped = OpKind::BitwiseShl
            .eval(&Value::from_u32(1), &Value::from_u32(33))
            .unwrap();
        assert_eq!(scalar::<u32>(&wrapped), 2);
    }

    #[test]
    fn test_unary() {
        let neg = OpKind::SignedNeg.eval_unary(&Value::from_i16(300)).unwrap();
        assert_eq!(scalar::<i16>(&neg), -300);
        let neg = OpKind::FloatingNeg.eval_unary(&Value::from_f32(2.5)).unwrap();
        assert_eq!(scalar::<f32>(&neg), -2.5);
        let not = OpKind::BitwiseNot.eval_unary(&Value::from_u8(0x0f)).unwrap();
        assert_eq!(scalar::<u8>(&not), 0xf0);
        let not = OpKind::LogicalNot.eval_unary(&Value::from_bool(false)).unwrap();
        assert_eq!(not.as_bool(), Some(true));
        assert!(OpKind::LogicalNot.eval_unary(&Value::from_i32(0)).is_err());
    }

    #[test]
    fn test_int_casts() {
        let widened = eval_cast(OpKind::CastIntSize, &Value::from_i8(-2), &Ty::i64()).unwrap();
        assert_eq!(scalar::<i64>(&widened), -2);
        let zext = eval_cast(OpKind::IntegerZeroExt, &Value::from_i8(-2), &Ty::u32()).unwrap();
        assert_eq!(scalar::<u32>(&zext), 0xfe);
        let trunc =
            eval_cast(OpKind::IntegerTruncate, &Value::from_u32(0x1234_5678), &Ty::u8()).unwrap();
        assert_eq!(scalar::<u8>(&trunc), 0x78);
        let sign =
            eval_cast(OpKind::CastIntSignedness, &Value::from_u16(0xffff), &Ty::i16()).unwrap();
        assert_eq!(scalar::<i16>(&sign), -1);
    }

    #[test]
    fn test_bitcast_requires_equal_sizes() {
        let bits = eval_cast(OpKind::CastBitcast, &Value::from_f32(1.0), &Ty::u32()).unwrap();
        assert_eq!(scalar::<u32>(&bits), 0x3f80_0000);
        let err = eval_cast(OpKind::CastBitcast, &Value::from_f32(1.0), &Ty::u64()).unwrap_err();
        assert_eq!(
            interp_error(&err),
            Some(&InterpError::SizeMismatch {
                expected: 8,
                found: 4
            })
        );
    }

    #[test]
    fn test_pointer_casts() {
        let ptr_ty = Ty::u8().pointer_to();
        let ptr = eval_cast(OpKind::CastIntToPointer, &Value::from_u32(0x1000), &ptr_ty).unwrap();
        assert_eq!(ptr.as_address().unwrap(), 0x1000);
        let int = eval_cast(OpKind::CastPointerToInt, &ptr, &Ty::u16()).unwrap();
        assert_eq!(scalar::<u16>(&int), 0x1000);
        let other = eval_cast(OpKind::CastPointerType, &ptr, &Ty::f64().pointer_to()).unwrap();
        assert_eq!(other.as_bytes(), ptr.as_bytes());
    }

    #[test]
    fn test_numeric_conversions() {
        let int = eval_cast(OpKind::CastFloatToInt, &Value::from_f64(-3.9), &Ty::i32()).unwrap();
        assert_eq!(scalar::<i32>(&int), -3);
        let clamped = eval_cast(OpKind::CastFloatToInt, &Value::from_f64(300.0), &Ty::u8()).unwrap();
        assert_eq!(scalar::<u8>(&clamped), 255);
        let float = eval_cast(OpKind::CastIntToFloat, &Value::from_i64(-5), &Ty::f32()).unwrap();
        assert_eq!(scalar::<f32>(&float), -5.0);
        let float = eval_cast(OpKind::CastIntToFloat, &Value::from_u8(200), &Ty::f64()).unwrap();
        assert_eq!(scalar::<f64>(&float), 200.0);
        let narrow =
            eval_cast(OpKind::FloatingTruncate, &Value::from_f64(0.1), &Ty::f32()).unwrap();
        assert_eq!(scalar::<f32>(&narrow), 0.1f32);
        assert!(eval_cast(OpKind::CastIntToFloat, &Value::from_f32(1.0), &Ty::f64()).is_err());
    }
}
