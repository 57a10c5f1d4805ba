//! Block execution and instruction dispatch.

use super::InterpState;
use super::rvalue::{BinaryEval, UnaryEval, eval_cast};
use crate::error::InterpError;
use crate::value::{Origin, Value};
use anyhow::{Context, Result, bail};
use fir::{BlockIdx, FuncId, Function, Instruction, LocalDecl, OpKind, Operand};
use tracing::{debug, trace};

/// Outcome of executing one instruction.
#[derive(Debug)]
pub(super) enum Flow {
    Normal,
    Return(Value),
    Branch(BlockIdx),
}

impl<'m> InterpState<'m> {
    /// Executes the body of `id` in the current frame until it returns.
    pub(super) fn run_blocks(&mut self, id: FuncId) -> Result<Value> {
        let func = self.module.function(id);
        let mut block_idx = BlockIdx(0);
        loop {
            let Some(block) = func.block(block_idx) else {
                bail!(InterpError::InvalidOperand(format!(
                    "`{}` has no block {block_idx}",
                    func.name()
                )));
            };
            debug!("Executing block {} of {}", block.name, func.name());

            let mut next = None;
            for inst in &block.instructions {
                trace!("Executing {:?} {:?}", inst.op, inst.args);
                let flow = self.execute_instruction(func, inst).with_context(|| {
                    format!("{:?} in `{}` block `{}`", inst.op, func.name(), block.name)
                })?;
                match flow {
                    Flow::Normal => {}
                    Flow::Return(value) => return Ok(value),
                    Flow::Branch(target) => {
                        next = Some(target);
                        break;
                    }
                }
            }

            let Some(target) = next else {
                bail!(InterpError::InvalidOperand(format!(
                    "control fell off the end of block `{}` in `{}`",
                    block.name,
                    func.name()
                )));
            };
            self.frame_mut()?.enter_block(target);
            block_idx = target;
        }
    }

    fn execute_instruction(&mut self, func: &'m Function, inst: &Instruction) -> Result<Flow> {
        use OpKind::*;
        let args = inst.args.as_slice();
        let value = match inst.op {
            Return => {
                let ret = func.return_ty().clone();
                let value = match args {
                    [] => Value::zeroed(ret),
                    [value] => self.operand(value)?.retype(ret)?,
                    _ => bail!(arity(inst, "0 or 1")),
                };
                return Ok(Flow::Return(value.with_origin(Origin::Intermediate)));
            }
            Branch => {
                let [target] = args else {
                    bail!(arity(inst, "1"))
                };
                return Ok(Flow::Branch(block_operand(target)?));
            }
            CondBranch => {
                let [cond, then, otherwise] = args else {
                    bail!(arity(inst, "3"))
                };
                let taken = self.bool_operand(cond)?;
                let target = if taken { then } else { otherwise };
                return Ok(Flow::Branch(block_operand(target)?));
            }
            Unreachable => bail!(InterpError::ReachedUnreachable {
                function: func.name().to_string(),
            }),
            CreatePhi => self.resolve_phi(func, inst)?,

            SignedNeg | FloatingNeg | BitwiseNot | LogicalNot => {
                let [operand] = args else {
                    bail!(arity(inst, "1"))
                };
                let operand = self.operand(operand)?;
                inst.op.eval_unary(&operand)?
            }
            FloatingTruncate | FloatingExtend | CastIntSize | IntegerZeroExt | IntegerTruncate
            | CastBitcast | CastSignedness | CastIntSignedness | CastPointerType
            | CastPointerToInt | CastIntToPointer | CastFloatToInt | CastIntToFloat => {
                let [value, Operand::Type(target)] = args else {
                    bail!(arity(inst, "value and target type"))
                };
                let value = self.operand(value)?;
                eval_cast(inst.op, &value, target)?
            }
            ICompareMulti | FCompareMulti => {
                let [left, right] = args else {
                    bail!(arity(inst, "2"))
                };
                let (left, right) = (self.operand(left)?, self.operand(right)?);
                let ordering = inst.op.eval(&left, &right)?;
                let ty = result_decl(func, inst)?.ty.clone();
                Value::from_int(ty, ordering.as_int().unwrap_or(-1))?
            }

            ReadPtr | WritePtr | Store | StackAlloc | CreateLVal | AddressOf | Dereference
            | GetPointer | GetGep2 | GetStructMember | GetPointerToStructMember
            | RawUnionGep | Sizeof | Select => match self.execute_place(func, inst)? {
                Some(value) => value,
                None => return Ok(Flow::Normal),
            },

            InsertValue | ExtractValue | SaaGetData | SaaGetLength | SaaGetCapacity
            | SaaGetRefCountPtr | SaaSetData | SaaSetLength | SaaSetCapacity
            | SaaSetRefCountPtr | ArraySliceGetData | ArraySliceGetLength
            | ArraySliceSetData | ArraySliceSetLength | AnyGetData | AnyGetTypeId
            | AnyGetRefCountPtr | AnySetData | AnySetTypeId | AnySetRefCountPtr
            | RangeGetLower | RangeGetUpper | RangeGetStep | RangeSetLower | RangeSetUpper
            | RangeSetStep | EnumGetIndex | EnumGetValue | EnumSetIndex | EnumSetValue
            | UnionGetVariantId | UnionSetVariantId | UnionGetValue | UnionSetValue => {
                self.execute_aggregate(inst)?
            }

            CallFunction | CallFunctionPointer | CallVirtualMethod => {
                let value = self.execute_call(inst)?;
                if inst.result.is_none() {
                    return Ok(Flow::Normal);
                }
                value
            }

            _ => {
                let [left, right] = args else {
                    bail!(arity(inst, "2"))
                };
                let (left, right) = (self.operand(left)?, self.operand(right)?);
                inst.op.eval(&left, &right)?
            }
        };
        self.bind_result(func, inst, value)?;
        Ok(Flow::Normal)
    }

    /// Selects the incoming value for the block control arrived from.
    fn resolve_phi(&mut self, func: &Function, inst: &Instruction) -> Result<Value> {
        let previous = self.frame()?.previous_block();
        if inst.args.len() % 2 != 0 {
            bail!(arity(inst, "predecessor and value pairs"));
        }
        for pair in inst.args.chunks_exact(2) {
            if Some(block_operand(&pair[0])?) == previous {
                return self.operand(&pair[1]);
            }
        }
        let block = match previous.and_then(|idx| func.block(idx)) {
            Some(block) => block.name.clone(),
            None => "<entry>".to_string(),
        };
        bail!(InterpError::UnlistedPredecessor {
            function: func.name().to_string(),
            block,
        })
    }

    /// Records the result of `inst` in the current frame.
    ///
    /// L-value results are addresses and are bound as pointers to the
    /// declared type.
    fn bind_result(&mut self, func: &Function, inst: &Instruction, value: Value) -> Result<()> {
        let Some(local) = inst.result else {
            return Ok(());
        };
        let decl = result_decl(func, inst)?;
        let ty = if decl.lvalue {
            decl.ty.mut_pointer_to()
        } else {
            decl.ty.clone()
        };
        let value = value.retype(ty)?.with_origin(Origin::Local(local));
        trace!("{local} = {value}");
        self.frame_mut()?.record_local(local, value)
    }

    fn bool_operand(&mut self, operand: &Operand) -> Result<bool> {
        let value = self.operand(operand)?;
        match value.as_bool() {
            Some(cond) if value.ty().is_bool() => Ok(cond),
            _ => bail!(InterpError::UnsupportedOperandTypes {
                op: "condition".into(),
                types: value.ty().to_string(),
            }),
        }
    }
}

pub(super) fn result_decl<'f>(func: &'f Function, inst: &Instruction) -> Result<&'f LocalDecl> {
    match inst.result.and_then(|local| func.local(local)) {
        Some(decl) => Ok(decl),
        None => bail!(InterpError::InvalidOperand(format!(
            "{:?} has no declared result",
            inst.op
        ))),
    }
}

fn block_operand(operand: &Operand) -> Result<BlockIdx> {
    match operand {
        Operand::Block(block) => Ok(*block),
        other => bail!(InterpError::InvalidOperand(format!(
            "expected a block, found {other:?}"
        ))),
    }
}

pub(super) fn arity(inst: &Instruction, expected: &str) -> InterpError {
    InterpError::InvalidOperand(format!(
        "{:?} expects {expected} operands, found {}",
        inst.op,
        inst.args.len()
    ))
}
