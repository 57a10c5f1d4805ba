//! Modules, functions, blocks and instructions.

use std::fmt;

use crate::constant::{ConstKind, Constant};
use crate::ty::{Ty, TyKind};

macro_rules! index_type {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u32);

        impl $name {
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

index_type!(
    /// Identifies a function in its module.
    FuncId,
    "fn"
);
index_type!(
    /// Identifies a constant in its module.
    ConstId,
    "c"
);
index_type!(
    /// Identifies a global variable in its module.
    GlobalId,
    "g"
);
index_type!(
    /// Identifies an entry of the module's global string pool.
    StringId,
    "str"
);
index_type!(
    /// Index of a block inside its function.
    BlockIdx,
    "bb"
);
index_type!(
    /// Index of an argument or instruction result inside its function.
    /// Arguments always come first.
    Local,
    "%"
);

/// Instruction operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Local(Local),
    Const(ConstId),
    /// Successor or PHI predecessor block.
    Block(BlockIdx),
    /// Type operand, e.g. a cast target or an allocation type.
    Type(Ty),
}

/// Opcode tags.
///
/// Unless noted, operands are ordinary values and the result type is the
/// type declared for the result local.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    SignedAdd,
    UnsignedAdd,
    FloatingAdd,
    SignedSub,
    UnsignedSub,
    FloatingSub,
    SignedMul,
    UnsignedMul,
    FloatingMul,
    SignedDiv,
    UnsignedDiv,
    FloatingDiv,
    SignedMod,
    UnsignedMod,
    FloatingMod,
    SignedNeg,
    FloatingNeg,

    ICompareEqual,
    ICompareNotEqual,
    ICompareGreater,
    ICompareLess,
    ICompareGreaterEqual,
    ICompareLessEqual,
    /// Three-way comparison yielding -1, 0 or 1.
    ICompareMulti,
    FCompareEqualOrd,
    FCompareEqualUnord,
    FCompareNotEqualOrd,
    FCompareNotEqualUnord,
    FCompareGreaterOrd,
    FCompareGreaterUnord,
    FCompareLessOrd,
    FCompareLessUnord,
    FCompareGreaterEqualOrd,
    FCompareGreaterEqualUnord,
    FCompareLessEqualOrd,
    FCompareLessEqualUnord,
    FCompareMulti,

    BitwiseXor,
    BitwiseLogicalShr,
    BitwiseArithmeticShr,
    BitwiseShl,
    BitwiseAnd,
    BitwiseOr,
    BitwiseNot,
    LogicalNot,

    /// `(value, Type(target))`
    FloatingTruncate,
    /// `(value, Type(target))`
    FloatingExtend,
    /// `(value, Type(target))`; sign-extends signed sources.
    CastIntSize,
    /// `(value, Type(target))`
    IntegerZeroExt,
    /// `(value, Type(target))`
    IntegerTruncate,
    /// `(value, Type(target))`; the remaining casts reinterpret bits.
    CastBitcast,
    CastSignedness,
    CastIntSignedness,
    CastPointerType,
    CastPointerToInt,
    CastIntToPointer,
    /// `(value, Type(target))`; numeric conversion.
    CastFloatToInt,
    /// `(value, Type(target))`; numeric conversion.
    CastIntToFloat,

    /// `(value, pointer)`
    WritePtr,
    /// `(pointer)`
    ReadPtr,
    /// `(Block(pred), value)*`
    CreatePhi,
    /// `()` or `(value)`
    Return,
    /// `(Block(target))`
    Branch,
    /// `(cond, Block(then), Block(else))`
    CondBranch,
    /// `(pointer, index)`: pointer plus index elements.
    GetPointer,
    /// `(pointer-to-array, index, index)`
    GetGep2,
    /// `(l-value, Const(member index))`; the result is an l-value.
    GetStructMember,
    /// `(pointer, pointer index, Const(member index))`
    GetPointerToStructMember,
    /// `(Const(function), args...)`
    CallFunction,
    /// `(function pointer, args...)`
    CallFunctionPointer,
    /// `(Type(class), vtable index, Type(function), self, args...)`
    CallVirtualMethod,
    /// `(Type(ty))`
    Sizeof,
    /// `(Type(ty))`; the result is an l-value.
    CreateLVal,
    /// `(Type(ty))`; the result is a pointer.
    StackAlloc,
    /// `(value, l-value)`
    Store,
    /// `(l-value)`
    AddressOf,
    /// `(pointer)`; the result is an l-value.
    Dereference,
    /// `(cond, then, else)`
    Select,
    /// `(aggregate, element, index)`
    InsertValue,
    /// `(aggregate, index)`
    ExtractValue,

    SaaGetData,
    SaaGetLength,
    SaaGetCapacity,
    SaaGetRefCountPtr,
    SaaSetData,
    SaaSetLength,
    SaaSetCapacity,
    SaaSetRefCountPtr,

    ArraySliceGetData,
    ArraySliceGetLength,
    ArraySliceSetData,
    ArraySliceSetLength,

    AnyGetData,
    AnyGetTypeId,
    AnyGetRefCountPtr,
    AnySetData,
    AnySetTypeId,
    AnySetRefCountPtr,

    RangeGetLower,
    RangeGetUpper,
    RangeGetStep,
    RangeSetLower,
    RangeSetUpper,
    RangeSetStep,

    EnumGetIndex,
    EnumGetValue,
    EnumSetIndex,
    EnumSetValue,

    UnionGetVariantId,
    UnionSetVariantId,
    /// `(union, Const(variant))`
    UnionGetValue,
    /// `(union, Const(variant), value)`
    UnionSetValue,
    /// `(l-value, Type(variant))`; the result is an l-value.
    RawUnionGep,

    Unreachable,
}

impl OpKind {
    /// Instructions that end a block.
    pub fn is_terminator(self) -> bool {
        matches!(
            self,
            Self::Return | Self::Branch | Self::CondBranch | Self::Unreachable
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub op: OpKind,
    pub args: Vec<Operand>,
    pub result: Option<Local>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub name: String,
    pub instructions: Vec<Instruction>,
}

/// Declaration of an argument or instruction result.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalDecl {
    pub ty: Ty,
    /// L-values hold the address of their storage.
    pub lvalue: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    name: String,
    ty: Ty,
    locals: Vec<LocalDecl>,
    blocks: Vec<Block>,
}

impl Function {
    fn new(name: String, ty: Ty) -> Self {
        let (params, _, _) = ty
            .fn_signature()
            .unwrap_or_else(|| panic!("function `{name}` declared with non-function type {ty}"));
        let locals = params
            .iter()
            .map(|ty| LocalDecl {
                ty: ty.clone(),
                lvalue: false,
            })
            .collect();
        Self {
            name,
            ty,
            locals,
            blocks: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The function type.
    pub fn ty(&self) -> &Ty {
        &self.ty
    }

    pub fn params(&self) -> &[Ty] {
        self.signature().0
    }

    pub fn return_ty(&self) -> &Ty {
        self.signature().1
    }

    pub fn is_variadic(&self) -> bool {
        self.signature().2
    }

    pub fn param_count(&self) -> usize {
        self.params().len()
    }

    /// The local bound to the `index`-th argument.
    pub fn arg(&self, index: usize) -> Local {
        assert!(index < self.param_count(), "argument {index} out of range");
        Local(index as u32)
    }

    pub fn locals(&self) -> &[LocalDecl] {
        &self.locals
    }

    pub fn local(&self, local: Local) -> Option<&LocalDecl> {
        self.locals.get(local.index())
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn block(&self, idx: BlockIdx) -> Option<&Block> {
        self.blocks.get(idx.index())
    }

    /// Functions without a body are provided by native code.
    pub fn is_declaration(&self) -> bool {
        self.blocks.is_empty()
    }

    fn signature(&self) -> (&[Ty], &Ty, bool) {
        match self.ty.kind() {
            TyKind::Function {
                params,
                ret,
                variadic,
            } => (params, ret, *variadic),
            _ => unreachable!("checked on construction"),
        }
    }

    pub(crate) fn add_local(&mut self, ty: Ty, lvalue: bool) -> Local {
        self.locals.push(LocalDecl { ty, lvalue });
        Local((self.locals.len() - 1) as u32)
    }

    pub(crate) fn add_block(&mut self, name: String) -> BlockIdx {
        self.blocks.push(Block {
            name,
            instructions: Vec::new(),
        });
        BlockIdx((self.blocks.len() - 1) as u32)
    }

    pub(crate) fn block_mut(&mut self, idx: BlockIdx) -> &mut Block {
        &mut self.blocks[idx.index()]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Global {
    pub name: String,
    pub ty: Ty,
    pub init: Option<ConstId>,
}

/// A compilation unit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Module {
    name: String,
    constants: Vec<Constant>,
    functions: Vec<Function>,
    globals: Vec<Global>,
    strings: Vec<String>,
    intrinsics: Vec<(String, FuncId)>,
    global_init: Option<FuncId>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_constant(&mut self, ty: Ty, kind: ConstKind) -> ConstId {
        self.constants.push(Constant { ty, kind });
        ConstId((self.constants.len() - 1) as u32)
    }

    pub fn const_int(&mut self, ty: Ty, value: i128) -> ConstId {
        self.add_constant(ty, ConstKind::Int(value))
    }

    pub fn const_bool(&mut self, value: bool) -> ConstId {
        self.add_constant(Ty::bool(), ConstKind::Bool(value))
    }

    pub fn const_float(&mut self, ty: Ty, value: f64) -> ConstId {
        self.add_constant(ty, ConstKind::Float(value))
    }

    pub fn const_zero(&mut self, ty: Ty) -> ConstId {
        self.add_constant(ty, ConstKind::Zero)
    }

    pub fn const_string(&mut self, value: impl Into<String>) -> ConstId {
        self.add_constant(Ty::i8().pointer_to(), ConstKind::String(value.into()))
    }

    /// Reference to `func` as a function value.
    pub fn const_function(&mut self, func: FuncId) -> ConstId {
        let ty = self.function(func).ty().clone();
        self.add_constant(ty, ConstKind::Function(func))
    }

    /// L-value reference to a global variable.
    pub fn const_global(&mut self, global: GlobalId) -> ConstId {
        let ty = self.global(global).ty.clone();
        self.add_constant(ty, ConstKind::GlobalVar(global))
    }

    pub fn const_global_string(&mut self, string: StringId) -> ConstId {
        self.add_constant(Ty::i8().pointer_to(), ConstKind::GlobalString(string))
    }

    pub fn constant(&self, id: ConstId) -> &Constant {
        &self.constants[id.index()]
    }

    pub fn constants(&self) -> &[Constant] {
        &self.constants
    }

    /// Declares a function. It stays a declaration until blocks are added.
    pub fn declare_function(&mut self, name: impl Into<String>, ty: Ty) -> FuncId {
        self.functions.push(Function::new(name.into(), ty));
        FuncId((self.functions.len() - 1) as u32)
    }

    pub fn function(&self, id: FuncId) -> &Function {
        &self.functions[id.index()]
    }

    pub(crate) fn function_mut(&mut self, id: FuncId) -> &mut Function {
        &mut self.functions[id.index()]
    }

    pub fn functions(&self) -> impl Iterator<Item = (FuncId, &Function)> {
        self.functions
            .iter()
            .enumerate()
            .map(|(i, f)| (FuncId(i as u32), f))
    }

    pub fn function_by_name(&self, name: &str) -> Option<FuncId> {
        self.functions().find(|(_, f)| f.name() == name).map(|(id, _)| id)
    }

    pub fn add_global(&mut self, name: impl Into<String>, ty: Ty, init: Option<ConstId>) -> GlobalId {
        self.globals.push(Global {
            name: name.into(),
            ty,
            init,
        });
        GlobalId((self.globals.len() - 1) as u32)
    }

    pub fn global(&self, id: GlobalId) -> &Global {
        &self.globals[id.index()]
    }

    pub fn globals(&self) -> impl Iterator<Item = (GlobalId, &Global)> {
        self.globals
            .iter()
            .enumerate()
            .map(|(i, g)| (GlobalId(i as u32), g))
    }

    pub fn add_string(&mut self, value: impl Into<String>) -> StringId {
        self.strings.push(value.into());
        StringId((self.strings.len() - 1) as u32)
    }

    pub fn string(&self, id: StringId) -> &str {
        &self.strings[id.index()]
    }

    pub fn strings(&self) -> impl Iterator<Item = (StringId, &str)> {
        self.strings
            .iter()
            .enumerate()
            .map(|(i, s)| (StringId(i as u32), s.as_str()))
    }

    /// Marks `func` as the implementation of the intrinsic `name`.
    pub fn add_intrinsic(&mut self, name: impl Into<String>, func: FuncId) {
        self.intrinsics.push((name.into(), func));
    }

    pub fn intrinsics(&self) -> &[(String, FuncId)] {
        &self.intrinsics
    }

    pub fn set_global_init(&mut self, func: FuncId) {
        self.global_init = Some(func);
    }

    /// Function that runs the non-constant global initializers.
    pub fn global_init(&self) -> Option<FuncId> {
        self.global_init
    }
}
