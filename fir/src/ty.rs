//! IR types.
//!
//! A [`Ty`] is a cheap handle to an immutable [`TyKind`]. Types compare
//! structurally, so two independently built `i32*` are the same type.

use std::fmt;
use std::rc::Rc;

/// Floating point widths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FloatTy {
    F32,
    F64,
}

/// Structural classification of an IR type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TyKind {
    Void,
    Bool,
    /// Integer of 8, 16, 32 or 64 bits.
    Int { bits: u8, signed: bool },
    Float(FloatTy),
    Pointer { pointee: Ty, mutable: bool },
    Array { elem: Ty, len: usize },
    Struct { name: String, fields: Vec<Ty> },
    /// Classes store a vtable pointer in front of their fields. Member
    /// indices count the vtable pointer as member 0.
    Class { name: String, fields: Vec<Ty>, vtable_len: usize },
    Tuple(Vec<Ty>),
    Slice { elem: Ty, mutable: bool },
    DynamicArray { elem: Ty },
    String,
    Any,
    Range,
    Enum { name: String, case_ty: Ty },
    /// Tagged union: a variant id followed by the payload of the largest variant.
    Union { name: String, variants: Vec<Ty> },
    /// Untagged union, as large as its largest variant.
    RawUnion { name: String, variants: Vec<Ty> },
    Function { params: Vec<Ty>, ret: Ty, variadic: bool },
}

/// Handle to an IR type.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Ty(Rc<TyKind>);

impl Ty {
    pub fn new(kind: TyKind) -> Self {
        Self(Rc::new(kind))
    }

    pub fn kind(&self) -> &TyKind {
        &self.0
    }

    pub fn void() -> Self {
        Self::new(TyKind::Void)
    }

    pub fn bool() -> Self {
        Self::new(TyKind::Bool)
    }

    pub fn int(bits: u8, signed: bool) -> Self {
        assert!(
            matches!(bits, 8 | 16 | 32 | 64),
            "unsupported integer width {bits}"
        );
        Self::new(TyKind::Int { bits, signed })
    }

    pub fn i8() -> Self {
        Self::int(8, true)
    }

    pub fn i16() -> Self {
        Self::int(16, true)
    }

    pub fn i32() -> Self {
        Self::int(32, true)
    }

    pub fn i64() -> Self {
        Self::int(64, true)
    }

    pub fn u8() -> Self {
        Self::int(8, false)
    }

    pub fn u16() -> Self {
        Self::int(16, false)
    }

    pub fn u32() -> Self {
        Self::int(32, false)
    }

    pub fn u64() -> Self {
        Self::int(64, false)
    }

    /// The native signed word.
    pub fn word() -> Self {
        Self::i64()
    }

    /// The native unsigned word.
    pub fn uword() -> Self {
        Self::u64()
    }

    pub fn f32() -> Self {
        Self::new(TyKind::Float(FloatTy::F32))
    }

    pub fn f64() -> Self {
        Self::new(TyKind::Float(FloatTy::F64))
    }

    pub fn pointer_to(&self) -> Self {
        Self::new(TyKind::Pointer {
            pointee: self.clone(),
            mutable: false,
        })
    }

    pub fn mut_pointer_to(&self) -> Self {
        Self::new(TyKind::Pointer {
            pointee: self.clone(),
            mutable: true,
        })
    }

    pub fn array(elem: Ty, len: usize) -> Self {
        Self::new(TyKind::Array { elem, len })
    }

    pub fn tuple(members: Vec<Ty>) -> Self {
        Self::new(TyKind::Tuple(members))
    }

    pub fn structure(name: impl Into<String>, fields: Vec<Ty>) -> Self {
        Self::new(TyKind::Struct {
            name: name.into(),
            fields,
        })
    }

    pub fn class(name: impl Into<String>, fields: Vec<Ty>, vtable_len: usize) -> Self {
        Self::new(TyKind::Class {
            name: name.into(),
            fields,
            vtable_len,
        })
    }

    pub fn slice(elem: Ty, mutable: bool) -> Self {
        Self::new(TyKind::Slice { elem, mutable })
    }

    pub fn dynamic_array(elem: Ty) -> Self {
        Self::new(TyKind::DynamicArray { elem })
    }

    pub fn string() -> Self {
        Self::new(TyKind::String)
    }

    pub fn any() -> Self {
        Self::new(TyKind::Any)
    }

    pub fn range() -> Self {
        Self::new(TyKind::Range)
    }

    pub fn enumeration(name: impl Into<String>, case_ty: Ty) -> Self {
        Self::new(TyKind::Enum {
            name: name.into(),
            case_ty,
        })
    }

    pub fn union(name: impl Into<String>, variants: Vec<Ty>) -> Self {
        Self::new(TyKind::Union {
            name: name.into(),
            variants,
        })
    }

    pub fn raw_union(name: impl Into<String>, variants: Vec<Ty>) -> Self {
        Self::new(TyKind::RawUnion {
            name: name.into(),
            variants,
        })
    }

    pub fn function(params: Vec<Ty>, ret: Ty, variadic: bool) -> Self {
        Self::new(TyKind::Function {
            params,
            ret,
            variadic,
        })
    }

    pub fn is_void(&self) -> bool {
        matches!(self.kind(), TyKind::Void)
    }

    pub fn is_bool(&self) -> bool {
        matches!(self.kind(), TyKind::Bool)
    }

    pub fn is_integer(&self) -> bool {
        matches!(self.kind(), TyKind::Int { .. })
    }

    pub fn is_signed(&self) -> bool {
        matches!(self.kind(), TyKind::Int { signed: true, .. })
    }

    pub fn is_float(&self) -> bool {
        matches!(self.kind(), TyKind::Float(_))
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self.kind(), TyKind::Pointer { .. })
    }

    /// The pointee of a pointer type.
    pub fn pointee(&self) -> Option<&Ty> {
        match self.kind() {
            TyKind::Pointer { pointee, .. } => Some(pointee),
            _ => None,
        }
    }

    /// Element type of arrays, slices and dynamic arrays.
    pub fn element(&self) -> Option<&Ty> {
        match self.kind() {
            TyKind::Array { elem, .. }
            | TyKind::Slice { elem, .. }
            | TyKind::DynamicArray { elem } => Some(elem),
            _ => None,
        }
    }

    /// Returns `(params, ret, variadic)` for function types, looking through
    /// one level of pointer.
    pub fn fn_signature(&self) -> Option<(&[Ty], &Ty, bool)> {
        match self.kind() {
            TyKind::Function {
                params,
                ret,
                variadic,
            } => Some((params, ret, *variadic)),
            TyKind::Pointer { pointee, .. } => match pointee.kind() {
                TyKind::Function {
                    params,
                    ret,
                    variadic,
                } => Some((params, ret, *variadic)),
                _ => None,
            },
            _ => None,
        }
    }

    /// Equal types, or pointers to the same pointee regardless of mutability.
    pub fn same_repr(&self, other: &Ty) -> bool {
        self == other
            || matches!(
                (self.pointee(), other.pointee()),
                (Some(a), Some(b)) if a == b
            )
    }
}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            TyKind::Void => write!(f, "void"),
            TyKind::Bool => write!(f, "bool"),
            TyKind::Int { bits, signed } => write!(f, "{}{bits}", if *signed { 'i' } else { 'u' }),
            TyKind::Float(FloatTy::F32) => write!(f, "f32"),
            TyKind::Float(FloatTy::F64) => write!(f, "f64"),
            TyKind::Pointer { pointee, mutable } => {
                write!(f, "{pointee}{}", if *mutable { "&" } else { "*" })
            }
            TyKind::Array { elem, len } => write!(f, "[{elem}: {len}]"),
            TyKind::Struct { name, .. } | TyKind::Class { name, .. } => write!(f, "{name}"),
            TyKind::Enum { name, .. } => write!(f, "enum {name}"),
            TyKind::Union { name, .. } => write!(f, "union {name}"),
            TyKind::RawUnion { name, .. } => write!(f, "raw union {name}"),
            TyKind::Tuple(members) => {
                write!(f, "(")?;
                for (i, member) in members.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{member}")?;
                }
                write!(f, ")")
            }
            TyKind::Slice { elem, mutable } => {
                write!(f, "[{}{elem}:]", if *mutable { "mut " } else { "" })
            }
            TyKind::DynamicArray { elem } => write!(f, "[{elem}]"),
            TyKind::String => write!(f, "string"),
            TyKind::Any => write!(f, "any"),
            TyKind::Range => write!(f, "range"),
            TyKind::Function {
                params,
                ret,
                variadic,
            } => {
                write!(f, "fn(")?;
                for (i, param) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{param}")?;
                }
                if *variadic {
                    write!(f, "{}...", if params.is_empty() { "" } else { ", " })?;
                }
                write!(f, ") -> {ret}")
            }
        }
    }
}

impl fmt::Debug for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
