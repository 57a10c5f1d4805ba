//! Small convenience layer to assemble function bodies.
//!
//! The builder performs no verification. Misuse such as emitting into a
//! function without positioning the builder first panics.

use crate::module::{BlockIdx, FuncId, GlobalId, Instruction, Local, Module, OpKind, Operand};
use crate::ty::{Ty, TyKind};

pub struct FunctionBuilder<'m> {
    module: &'m mut Module,
    func: FuncId,
    current: Option<BlockIdx>,
}

impl<'m> FunctionBuilder<'m> {
    pub fn new(module: &'m mut Module, func: FuncId) -> Self {
        Self {
            module,
            func,
            current: None,
        }
    }

    pub fn module(&mut self) -> &mut Module {
        self.module
    }

    pub fn func(&self) -> FuncId {
        self.func
    }

    /// Appends a new empty block to the function.
    pub fn add_block(&mut self, name: impl Into<String>) -> BlockIdx {
        self.module.function_mut(self.func).add_block(name.into())
    }

    /// Subsequent instructions are appended to `block`.
    pub fn position_at_end(&mut self, block: BlockIdx) {
        self.current = Some(block);
    }

    pub fn arg(&self, index: usize) -> Operand {
        Operand::Local(self.module.function(self.func).arg(index))
    }

    pub fn const_int(&mut self, ty: Ty, value: i128) -> Operand {
        Operand::Const(self.module.const_int(ty, value))
    }

    pub fn const_bool(&mut self, value: bool) -> Operand {
        Operand::Const(self.module.const_bool(value))
    }

    pub fn const_float(&mut self, ty: Ty, value: f64) -> Operand {
        Operand::Const(self.module.const_float(ty, value))
    }

    pub fn const_zero(&mut self, ty: Ty) -> Operand {
        Operand::Const(self.module.const_zero(ty))
    }

    pub fn const_string(&mut self, value: impl Into<String>) -> Operand {
        Operand::Const(self.module.const_string(value))
    }

    pub fn const_function(&mut self, func: FuncId) -> Operand {
        Operand::Const(self.module.const_function(func))
    }

    /// L-value operand referring to a global variable.
    pub fn global(&mut self, global: GlobalId) -> Operand {
        Operand::Const(self.module.const_global(global))
    }

    /// Static type of an operand. L-value operands report their value type.
    pub fn type_of(&self, operand: &Operand) -> Ty {
        match operand {
            Operand::Local(local) => self
                .module
                .function(self.func)
                .local(*local)
                .unwrap_or_else(|| panic!("unknown local {local}"))
                .ty
                .clone(),
            Operand::Const(id) => self.module.constant(*id).ty.clone(),
            Operand::Type(ty) => ty.clone(),
            Operand::Block(block) => panic!("block {block} has no type"),
        }
    }

    /// Appends an instruction. `result` is the result type and whether the
    /// result is an l-value.
    pub fn emit(&mut self, op: OpKind, args: Vec<Operand>, result: Option<(Ty, bool)>) -> Option<Local> {
        let block = self
            .current
            .expect("builder must be positioned before emitting instructions");
        let func = self.module.function_mut(self.func);
        let result = result.map(|(ty, lvalue)| func.add_local(ty, lvalue));
        func.block_mut(block)
            .instructions
            .push(Instruction { op, args, result });
        result
    }

    fn emit_value(&mut self, op: OpKind, args: Vec<Operand>, ty: Ty) -> Operand {
        let local = self.emit(op, args, Some((ty, false)));
        Operand::Local(local.expect("result requested"))
    }

    fn emit_lvalue(&mut self, op: OpKind, args: Vec<Operand>, ty: Ty) -> Operand {
        let local = self.emit(op, args, Some((ty, true)));
        Operand::Local(local.expect("result requested"))
    }

    /// Binary arithmetic, bitwise or comparison instruction.
    pub fn binary(&mut self, op: OpKind, lhs: Operand, rhs: Operand) -> Operand {
        let ty = match op {
            OpKind::ICompareMulti | OpKind::FCompareMulti => Ty::word(),
            op if is_comparison(op) => Ty::bool(),
            _ => self.type_of(&lhs),
        };
        self.emit_value(op, vec![lhs, rhs], ty)
    }

    /// Negation and `not` instructions.
    pub fn unary(&mut self, op: OpKind, value: Operand) -> Operand {
        let ty = self.type_of(&value);
        self.emit_value(op, vec![value], ty)
    }

    pub fn cast(&mut self, op: OpKind, value: Operand, target: Ty) -> Operand {
        self.emit_value(op, vec![value, Operand::Type(target.clone())], target)
    }

    pub fn ret(&mut self, value: Option<Operand>) {
        self.emit(OpKind::Return, value.into_iter().collect(), None);
    }

    pub fn branch(&mut self, target: BlockIdx) {
        self.emit(OpKind::Branch, vec![Operand::Block(target)], None);
    }

    pub fn cond_branch(&mut self, cond: Operand, then: BlockIdx, otherwise: BlockIdx) {
        self.emit(
            OpKind::CondBranch,
            vec![cond, Operand::Block(then), Operand::Block(otherwise)],
            None,
        );
    }

    pub fn unreachable(&mut self) {
        self.emit(OpKind::Unreachable, Vec::new(), None);
    }

    pub fn phi(&mut self, ty: Ty, incoming: Vec<(BlockIdx, Operand)>) -> Operand {
        let args = incoming
            .into_iter()
            .flat_map(|(block, value)| [Operand::Block(block), value])
            .collect();
        self.emit_value(OpKind::CreatePhi, args, ty)
    }

    /// Direct call. Returns `None` for void functions.
    pub fn call(&mut self, callee: FuncId, args: Vec<Operand>) -> Option<Operand> {
        let ret = self.module.function(callee).return_ty().clone();
        let mut operands = vec![self.const_function(callee)];
        operands.extend(args);
        self.emit_call(OpKind::CallFunction, operands, ret)
    }

    pub fn call_pointer(&mut self, callee: Operand, args: Vec<Operand>) -> Option<Operand> {
        let callee_ty = self.type_of(&callee);
        let (_, ret, _) = callee_ty
            .fn_signature()
            .unwrap_or_else(|| panic!("cannot call value of type {callee_ty}"));
        let ret = ret.clone();
        let mut operands = vec![callee];
        operands.extend(args);
        self.emit_call(OpKind::CallFunctionPointer, operands, ret)
    }

    /// Calls slot `index` of the vtable stored at the start of `receiver`.
    pub fn call_virtual(
        &mut self,
        class: Ty,
        index: i128,
        fn_ty: Ty,
        receiver: Operand,
        args: Vec<Operand>,
    ) -> Option<Operand> {
        let ret = fn_ty
            .fn_signature()
            .unwrap_or_else(|| panic!("virtual call through non-function type {fn_ty}"))
            .1
            .clone();
        let index = self.const_int(Ty::word(), index);
        let mut operands = vec![Operand::Type(class), index, Operand::Type(fn_ty), receiver];
        operands.extend(args);
        self.emit_call(OpKind::CallVirtualMethod, operands, ret)
    }

    fn emit_call(&mut self, op: OpKind, args: Vec<Operand>, ret: Ty) -> Option<Operand> {
        if ret.is_void() {
            self.emit(op, args, None);
            None
        } else {
            Some(self.emit_value(op, args, ret))
        }
    }

    /// Scoped allocation; yields a mutable pointer to zeroed storage.
    pub fn stack_alloc(&mut self, ty: Ty) -> Operand {
        let ptr = ty.mut_pointer_to();
        self.emit_value(OpKind::StackAlloc, vec![Operand::Type(ty)], ptr)
    }

    /// Scoped allocation; yields an l-value.
    pub fn create_lval(&mut self, ty: Ty) -> Operand {
        self.emit_lvalue(OpKind::CreateLVal, vec![Operand::Type(ty.clone())], ty)
    }

    pub fn store(&mut self, value: Operand, lvalue: Operand) {
        self.emit(OpKind::Store, vec![value, lvalue], None);
    }

    pub fn address_of(&mut self, lvalue: Operand) -> Operand {
        let ty = self.type_of(&lvalue).mut_pointer_to();
        self.emit_value(OpKind::AddressOf, vec![lvalue], ty)
    }

    pub fn dereference(&mut self, ptr: Operand) -> Operand {
        let ty = self.pointee_of(&ptr);
        self.emit_lvalue(OpKind::Dereference, vec![ptr], ty)
    }

    pub fn read_ptr(&mut self, ptr: Operand) -> Operand {
        let ty = self.pointee_of(&ptr);
        self.emit_value(OpKind::ReadPtr, vec![ptr], ty)
    }

    pub fn write_ptr(&mut self, value: Operand, ptr: Operand) {
        self.emit(OpKind::WritePtr, vec![value, ptr], None);
    }

    pub fn get_pointer(&mut self, ptr: Operand, index: Operand) -> Operand {
        let ty = self.type_of(&ptr);
        self.emit_value(OpKind::GetPointer, vec![ptr, index], ty)
    }

    pub fn get_gep2(&mut self, ptr: Operand, first: Operand, second: Operand) -> Operand {
        let array = self.pointee_of(&ptr);
        let elem = array
            .element()
            .unwrap_or_else(|| panic!("GEP2 into non-array {array}"))
            .mut_pointer_to();
        self.emit_value(OpKind::GetGep2, vec![ptr, first, second], elem)
    }

    pub fn get_struct_member(&mut self, lvalue: Operand, member: usize) -> Operand {
        let ty = member_ty(&self.type_of(&lvalue), member);
        let index = self.const_int(Ty::word(), member as i128);
        self.emit_lvalue(OpKind::GetStructMember, vec![lvalue, index], ty)
    }

    pub fn get_pointer_to_struct_member(
        &mut self,
        ptr: Operand,
        ptr_index: Operand,
        member: usize,
    ) -> Operand {
        let ty = member_ty(&self.pointee_of(&ptr), member).mut_pointer_to();
        let index = self.const_int(Ty::word(), member as i128);
        self.emit_value(
            OpKind::GetPointerToStructMember,
            vec![ptr, ptr_index, index],
            ty,
        )
    }

    pub fn sizeof(&mut self, ty: Ty) -> Operand {
        self.emit_value(OpKind::Sizeof, vec![Operand::Type(ty)], Ty::word())
    }

    pub fn select(&mut self, cond: Operand, then: Operand, otherwise: Operand) -> Operand {
        let ty = self.type_of(&then);
        self.emit_value(OpKind::Select, vec![cond, then, otherwise], ty)
    }

    pub fn insert_value(&mut self, aggregate: Operand, element: Operand, index: usize) -> Operand {
        let ty = self.type_of(&aggregate);
        let index = self.const_int(Ty::word(), index as i128);
        self.emit_value(OpKind::InsertValue, vec![aggregate, element, index], ty)
    }

    pub fn extract_value(&mut self, aggregate: Operand, index: usize) -> Operand {
        let ty = member_ty(&self.type_of(&aggregate), index);
        let index = self.const_int(Ty::word(), index as i128);
        self.emit_value(OpKind::ExtractValue, vec![aggregate, index], ty)
    }

    /// Container getter such as `SaaGetLength` or `RangeGetStep`.
    pub fn get_field(&mut self, op: OpKind, aggregate: Operand) -> Operand {
        let ty = field_ty(op, &self.type_of(&aggregate));
        self.emit_value(op, vec![aggregate], ty)
    }

    /// Container setter; yields the updated aggregate.
    pub fn set_field(&mut self, op: OpKind, aggregate: Operand, value: Operand) -> Operand {
        let ty = self.type_of(&aggregate);
        self.emit_value(op, vec![aggregate, value], ty)
    }

    pub fn union_get_value(&mut self, union: Operand, variant: usize) -> Operand {
        let ty = member_ty(&self.type_of(&union), variant);
        let index = self.const_int(Ty::word(), variant as i128);
        self.emit_value(OpKind::UnionGetValue, vec![union, index], ty)
    }

    pub fn union_set_value(&mut self, union: Operand, variant: usize, value: Operand) -> Operand {
        let ty = self.type_of(&union);
        let index = self.const_int(Ty::word(), variant as i128);
        self.emit_value(OpKind::UnionSetValue, vec![union, index, value], ty)
    }

    pub fn raw_union_gep(&mut self, lvalue: Operand, variant: Ty) -> Operand {
        self.emit_lvalue(
            OpKind::RawUnionGep,
            vec![lvalue, Operand::Type(variant.clone())],
            variant,
        )
    }

    fn pointee_of(&self, ptr: &Operand) -> Ty {
        let ty = self.type_of(ptr);
        ty.pointee()
            .unwrap_or_else(|| panic!("expected pointer, found {ty}"))
            .clone()
    }
}

fn is_comparison(op: OpKind) -> bool {
    use OpKind::*;
    matches!(
        op,
        ICompareEqual
            | ICompareNotEqual
            | ICompareGreater
            | ICompareLess
            | ICompareGreaterEqual
            | ICompareLessEqual
            | FCompareEqualOrd
            | FCompareEqualUnord
            | FCompareNotEqualOrd
            | FCompareNotEqualUnord
            | FCompareGreaterOrd
            | FCompareGreaterUnord
            | FCompareLessOrd
            | FCompareLessUnord
            | FCompareGreaterEqualOrd
            | FCompareGreaterEqualUnord
            | FCompareLessEqualOrd
            | FCompareLessEqualUnord
    )
}

/// Type of member `index` of a struct, class, tuple, array or union.
fn member_ty(ty: &Ty, index: usize) -> Ty {
    let member = match ty.kind() {
        TyKind::Struct { fields, .. } => fields.get(index),
        TyKind::Class { fields, .. } => match index {
            0 => return Ty::i8().pointer_to(),
            _ => fields.get(index - 1),
        },
        TyKind::Tuple(members) => members.get(index),
        TyKind::Union { variants, .. } | TyKind::RawUnion { variants, .. } => variants.get(index),
        TyKind::Array { elem, len } => (index < *len).then_some(elem),
        _ => None,
    };
    member
        .unwrap_or_else(|| panic!("{ty} has no member {index}"))
        .clone()
}

fn field_ty(op: OpKind, ty: &Ty) -> Ty {
    use OpKind::*;
    match op {
        SaaGetData | ArraySliceGetData => match ty.kind() {
            TyKind::String => Ty::i8().mut_pointer_to(),
            _ => ty
                .element()
                .unwrap_or_else(|| panic!("{ty} has no element type"))
                .mut_pointer_to(),
        },
        SaaGetLength | SaaGetCapacity | ArraySliceGetLength => Ty::word(),
        RangeGetLower | RangeGetUpper | RangeGetStep => Ty::word(),
        SaaGetRefCountPtr | AnyGetRefCountPtr => Ty::word().mut_pointer_to(),
        AnyGetTypeId => Ty::uword(),
        AnyGetData => Ty::array(Ty::i8(), 32),
        EnumGetIndex | UnionGetVariantId => Ty::word(),
        EnumGetValue => match ty.kind() {
            TyKind::Enum { case_ty, .. } => case_ty.clone(),
            _ => panic!("{ty} is not an enum"),
        },
        _ => panic!("{op:?} is not a container getter"),
    }
}
