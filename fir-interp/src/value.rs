use crate::error::InterpError;
use crate::ty::{PackedLayout, WORD_SIZE};
use anyhow::{Result, bail};
use fir::{ConstId, FloatTy, GlobalId, Local, Ty, TyKind};
use smallvec::SmallVec;
use std::fmt;
use zerocopy::{FromBytes, Immutable, IntoBytes};

/// Values up to this size are stored inline.
pub const INLINE_SIZE: usize = 32;

/// The IR value that produced a runtime value. Only used for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Origin {
    #[default]
    Intermediate,
    Local(Local),
    Const(ConstId),
    Global(GlobalId),
}

/// Runtime value: a typed, packed byte representation.
///
/// Uses SmallVec to keep values of at most [`INLINE_SIZE`] bytes inline.
/// Larger values own a heap buffer; cloning a value always copies it.
#[derive(Debug, Clone)]
pub struct Value {
    ty: Ty,
    origin: Origin,
    /// Raw bytes; the length is always the packed size of `ty`.
    data: SmallVec<[u8; INLINE_SIZE]>,
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.ty == other.ty && self.data == other.data
    }
}

impl Value {
    /// All-zero value of `ty`.
    pub fn zeroed(ty: Ty) -> Self {
        let data = SmallVec::from_elem(0, ty.size());
        Self {
            ty,
            origin: Origin::default(),
            data,
        }
    }

    /// Create value of `ty` from its raw bytes.
    pub fn from_bytes(ty: Ty, bytes: &[u8]) -> Result<Self> {
        check_size(ty.size(), bytes.len())?;
        Ok(Self {
            ty,
            origin: Origin::default(),
            data: SmallVec::from_slice(bytes),
        })
    }

    /// Create value of `ty` from a native scalar with the same size.
    pub fn from_type<T: IntoBytes + Immutable>(ty: Ty, value: T) -> Result<Self> {
        Self::from_bytes(ty, value.as_bytes())
    }

    pub fn from_bool(value: bool) -> Self {
        Self::scalar(Ty::bool(), &[u8::from(value)])
    }

    pub fn from_i8(value: i8) -> Self {
        Self::scalar(Ty::i8(), value.as_bytes())
    }

    pub fn from_i16(value: i16) -> Self {
        Self::scalar(Ty::i16(), value.as_bytes())
    }

    pub fn from_i32(value: i32) -> Self {
        Self::scalar(Ty::i32(), value.as_bytes())
    }

    pub fn from_i64(value: i64) -> Self {
        Self::scalar(Ty::i64(), value.as_bytes())
    }

    pub fn from_u8(value: u8) -> Self {
        Self::scalar(Ty::u8(), value.as_bytes())
    }

    pub fn from_u16(value: u16) -> Self {
        Self::scalar(Ty::u16(), value.as_bytes())
    }

    pub fn from_u32(value: u32) -> Self {
        Self::scalar(Ty::u32(), value.as_bytes())
    }

    pub fn from_u64(value: u64) -> Self {
        Self::scalar(Ty::u64(), value.as_bytes())
    }

    pub fn from_f32(value: f32) -> Self {
        Self::scalar(Ty::f32(), value.as_bytes())
    }

    pub fn from_f64(value: f64) -> Self {
        Self::scalar(Ty::f64(), value.as_bytes())
    }

    /// Address-sized value of a pointer or function type.
    pub fn from_address(ty: Ty, address: usize) -> Self {
        debug_assert_eq!(ty.size(), WORD_SIZE, "{ty} is not address sized");
        Self::scalar(ty, &(address as u64).to_le_bytes())
    }

    /// Integer-like value of `ty` holding the low bytes of `value`.
    pub fn from_int(ty: Ty, value: i128) -> Result<Self> {
        match ty.kind() {
            TyKind::Int { .. } | TyKind::Bool | TyKind::Pointer { .. } | TyKind::Function { .. } => {
                let size = ty.size();
                Ok(Self::scalar(ty, &value.to_le_bytes()[..size]))
            }
            _ => bail!(InterpError::UnsupportedOperandTypes {
                op: "integer construction".into(),
                types: ty.to_string(),
            }),
        }
    }

    /// Floating point value of `ty`, rounding to its width.
    pub fn from_float(ty: Ty, value: f64) -> Result<Self> {
        match ty.kind() {
            TyKind::Float(FloatTy::F32) => Ok(Self::scalar(ty, (value as f32).as_bytes())),
            TyKind::Float(FloatTy::F64) => Ok(Self::scalar(ty, value.as_bytes())),
            _ => bail!(InterpError::UnsupportedOperandTypes {
                op: "float construction".into(),
                types: ty.to_string(),
            }),
        }
    }

    fn scalar(ty: Ty, bytes: &[u8]) -> Self {
        Self {
            ty,
            origin: Origin::default(),
            data: SmallVec::from_slice(bytes),
        }
    }

    pub fn ty(&self) -> &Ty {
        &self.ty
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }

    pub fn with_origin(mut self, origin: Origin) -> Self {
        self.origin = origin;
        self
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Whether the bytes live in the inline buffer instead of the heap.
    pub fn is_inline(&self) -> bool {
        !self.data.spilled()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Reinterprets the bytes as another type of the same size.
    pub fn retype(mut self, ty: Ty) -> Result<Self> {
        check_size(ty.size(), self.size())?;
        self.ty = ty;
        Ok(self)
    }

    /// Overwrites every byte of the value.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        check_size(self.size(), bytes.len())?;
        self.data.copy_from_slice(bytes);
        Ok(())
    }

    /// Overwrites `bytes.len()` bytes starting at `offset`.
    pub fn write_at(&mut self, offset: usize, bytes: &[u8]) -> Result<()> {
        let Some(dest) = self.data.get_mut(offset..offset + bytes.len()) else {
            bail!(InterpError::InvalidOperand(format!(
                "write of {} bytes at offset {offset} into {}",
                bytes.len(),
                self.ty
            )));
        };
        dest.copy_from_slice(bytes);
        Ok(())
    }

    /// Copies the sub-range starting at `offset` into a value of type `ty`.
    pub fn read_at(&self, offset: usize, ty: Ty) -> Result<Value> {
        let size = ty.size();
        let Some(bytes) = self.data.get(offset..offset + size) else {
            bail!(InterpError::InvalidOperand(format!(
                "read of {ty} at offset {offset} from {}",
                self.ty
            )));
        };
        Value::from_bytes(ty, bytes)
    }

    /// Try to interpret as a native type of exactly the same size.
    pub fn as_type<T: FromBytes>(&self) -> Option<T> {
        T::read_from_bytes(&self.data).ok()
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.data.as_slice() {
            [b] => Some(*b != 0),
            _ => None,
        }
    }

    /// Reads an integer of 1, 2, 4 or 8 bytes, extending it to `i128`.
    pub fn to_int(&self, signed: bool) -> Option<i128> {
        let value = match (self.size(), signed) {
            (1, true) => i128::from(self.as_type::<i8>()?),
            (2, true) => i128::from(self.as_type::<i16>()?),
            (4, true) => i128::from(self.as_type::<i32>()?),
            (8, true) => i128::from(self.as_type::<i64>()?),
            (1, false) => i128::from(self.as_type::<u8>()?),
            (2, false) => i128::from(self.as_type::<u16>()?),
            (4, false) => i128::from(self.as_type::<u32>()?),
            (8, false) => i128::from(self.as_type::<u64>()?),
            _ => return None,
        };
        Some(value)
    }

    /// Reads an integer, extending it according to the signedness of its type.
    pub fn as_int(&self) -> Option<i128> {
        self.to_int(self.ty.is_signed())
    }

    /// Reads a float value widened to `f64`.
    pub fn as_float(&self) -> Option<f64> {
        match self.ty.kind() {
            TyKind::Float(FloatTy::F32) => self.as_type::<f32>().map(f64::from),
            TyKind::Float(FloatTy::F64) => self.as_type::<f64>(),
            _ => None,
        }
    }

    /// Reads an address-sized value.
    pub fn as_address(&self) -> Result<usize> {
        match self.as_type::<u64>() {
            Some(address) => Ok(address as usize),
            None => bail!(InterpError::UnsupportedOperandTypes {
                op: "address".into(),
                types: self.ty.to_string(),
            }),
        }
    }
}

fn check_size(expected: usize, found: usize) -> Result<()> {
    if expected != found {
        bail!(InterpError::SizeMismatch { expected, found });
    }
    Ok(())
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ty.kind() {
            TyKind::Void => write!(f, "void"),
            TyKind::Bool => match self.as_bool() {
                Some(b) => write!(f, "{b}"),
                None => write!(f, "invalid_bool"),
            },
            TyKind::Int { .. } => match self.as_int() {
                Some(i) => write!(f, "{i}"),
                None => write!(f, "invalid_{}", self.ty),
            },
            TyKind::Float(_) => match self.as_float() {
                Some(x) => write!(f, "{x}"),
                None => write!(f, "invalid_{}", self.ty),
            },
            TyKind::Pointer { .. } | TyKind::Function { .. } => match self.as_address() {
                Ok(address) => write!(f, "0x{address:x}"),
                Err(_) => write!(f, "invalid_ptr"),
            },
            _ => {
                write!(f, "{} {{", self.ty)?;
                for (i, byte) in self.data.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{byte:02x}")?;
                }
                write!(f, "}}")
            }
        }
    }
}
