//! Foreign-call bridge.
//!
//! Calls into natively compiled code are described to `libffi` at run time:
//! each argument and the return value get the C type of their ABI class, so
//! any number of arguments, and variadic callees, follow the platform calling
//! convention.
//!
//! Symbol lookup is delegated to a [`SymbolResolver`].

use crate::error::InterpError;
use crate::value::Value;
use anyhow::{Result, bail};
use fir::{FloatTy, Ty, TyKind};
use libffi::middle::{Arg, Cif, CodePtr, Type};
use std::collections::HashMap;
use std::ffi::c_void;
use tracing::debug;

/// Whether [`ProcessSymbols`] can find symbols of the running process.
pub const PROCESS_SYMBOLS_SUPPORTED: bool = cfg!(unix);

/// Finds the address of a native symbol.
pub trait SymbolResolver {
    fn resolve(&self, name: &str) -> Option<usize>;
}

/// Looks symbols up in the objects already loaded into the process.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessSymbols;

impl SymbolResolver for ProcessSymbols {
    #[cfg(unix)]
    fn resolve(&self, name: &str) -> Option<usize> {
        let name = std::ffi::CString::new(name).ok()?;
        // SAFETY: `name` is NUL-terminated and outlives the call.
        let symbol = unsafe { libc::dlsym(libc::RTLD_DEFAULT, name.as_ptr()) };
        (!symbol.is_null()).then_some(symbol as usize)
    }

    #[cfg(not(unix))]
    fn resolve(&self, _name: &str) -> Option<usize> {
        None
    }
}

/// Explicit registry of symbol addresses.
#[derive(Debug, Default, Clone)]
pub struct SymbolTable {
    symbols: HashMap<String, usize>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, address: usize) {
        self.symbols.insert(name.into(), address);
    }

    pub fn with(mut self, name: impl Into<String>, address: usize) -> Self {
        self.insert(name, address);
        self
    }
}

impl SymbolResolver for SymbolTable {
    fn resolve(&self, name: &str) -> Option<usize> {
        self.symbols.get(name).copied()
    }
}

/// Tries each resolver in order.
#[derive(Default)]
pub struct Chain(Vec<Box<dyn SymbolResolver>>);

impl Chain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(mut self, resolver: impl SymbolResolver + 'static) -> Self {
        self.0.push(Box::new(resolver));
        self
    }
}

impl SymbolResolver for Chain {
    fn resolve(&self, name: &str) -> Option<usize> {
        self.0.iter().find_map(|resolver| resolver.resolve(name))
    }
}

/// Native ABI category of a scalar type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AbiClass {
    Int { size: usize, signed: bool },
    F32,
    F64,
    Void,
}

fn classify(ty: &Ty) -> Result<AbiClass> {
    let class = match ty.kind() {
        TyKind::Void => AbiClass::Void,
        TyKind::Bool => AbiClass::Int {
            size: 1,
            signed: false,
        },
        TyKind::Int { bits, signed } => AbiClass::Int {
            size: usize::from(*bits) / 8,
            signed: *signed,
        },
        TyKind::Pointer { .. } | TyKind::Function { .. } => AbiClass::Int {
            size: 8,
            signed: false,
        },
        TyKind::Float(FloatTy::F32) => AbiClass::F32,
        TyKind::Float(FloatTy::F64) => AbiClass::F64,
        _ => bail!(InterpError::UnsupportedAbiType(ty.to_string())),
    };
    Ok(class)
}

impl AbiClass {
    fn ffi_type(self) -> Result<Type> {
        let ty = match self {
            AbiClass::Int { size: 1, signed } => {
                if signed { Type::i8() } else { Type::u8() }
            }
            AbiClass::Int { size: 2, signed } => {
                if signed { Type::i16() } else { Type::u16() }
            }
            AbiClass::Int { size: 4, signed } => {
                if signed { Type::i32() } else { Type::u32() }
            }
            AbiClass::Int { size: 8, signed } => {
                if signed { Type::i64() } else { Type::u64() }
            }
            AbiClass::Int { size, .. } => {
                bail!(InterpError::UnsupportedAbiType(format!("{size}-byte integer")))
            }
            AbiClass::F32 => Type::f32(),
            AbiClass::F64 => Type::f64(),
            AbiClass::Void => Type::void(),
        };
        Ok(ty)
    }
}

/// Argument converted to the exact C type it is passed as.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Scalar {
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
}

impl Scalar {
    fn class(self) -> AbiClass {
        let int = |size, signed| AbiClass::Int { size, signed };
        match self {
            Scalar::I8(_) => int(1, true),
            Scalar::U8(_) => int(1, false),
            Scalar::I16(_) => int(2, true),
            Scalar::U16(_) => int(2, false),
            Scalar::I32(_) => int(4, true),
            Scalar::U32(_) => int(4, false),
            Scalar::I64(_) => int(8, true),
            Scalar::U64(_) => int(8, false),
            Scalar::F32(_) => AbiClass::F32,
            Scalar::F64(_) => AbiClass::F64,
        }
    }

    fn arg(&self) -> Arg {
        match self {
            Scalar::I8(v) => Arg::new(v),
            Scalar::U8(v) => Arg::new(v),
            Scalar::I16(v) => Arg::new(v),
            Scalar::U16(v) => Arg::new(v),
            Scalar::I32(v) => Arg::new(v),
            Scalar::U32(v) => Arg::new(v),
            Scalar::I64(v) => Arg::new(v),
            Scalar::U64(v) => Arg::new(v),
            Scalar::F32(v) => Arg::new(v),
            Scalar::F64(v) => Arg::new(v),
        }
    }
}

/// Converts `arg` to its C representation. Variadic arguments follow the
/// default argument promotions: narrow integers widen to `int` and `float`
/// widens to `double`.
fn marshal(arg: &Value, variadic: bool) -> Result<Scalar> {
    let scalar = match classify(arg.ty())? {
        AbiClass::Int { size, signed } => {
            let value = arg.to_int(signed).ok_or_else(|| size_mismatch(arg))?;
            // `to_int` already extended the value, so these casts only drop
            // bits that were never there.
            match (size, signed) {
                (1 | 2, _) if variadic => Scalar::I32(value as i32),
                (1, true) => Scalar::I8(value as i8),
                (1, false) => Scalar::U8(value as u8),
                (2, true) => Scalar::I16(value as i16),
                (2, false) => Scalar::U16(value as u16),
                (4, true) => Scalar::I32(value as i32),
                (4, false) => Scalar::U32(value as u32),
                (_, true) => Scalar::I64(value as i64),
                (_, false) => Scalar::U64(value as u64),
            }
        }
        AbiClass::F32 => {
            let value = arg.as_type::<f32>().ok_or_else(|| size_mismatch(arg))?;
            if variadic {
                Scalar::F64(f64::from(value))
            } else {
                Scalar::F32(value)
            }
        }
        AbiClass::F64 => Scalar::F64(arg.as_type::<f64>().ok_or_else(|| size_mismatch(arg))?),
        AbiClass::Void => bail!(InterpError::UnsupportedAbiType(arg.ty().to_string())),
    };
    Ok(scalar)
}

fn size_mismatch(arg: &Value) -> anyhow::Error {
    InterpError::SizeMismatch {
        expected: crate::ty::PackedLayout::size(arg.ty()),
        found: arg.size(),
    }
    .into()
}

/// Description of a native callee.
#[derive(Debug, Clone, Copy)]
pub struct ForeignFn<'a> {
    pub name: &'a str,
    pub address: usize,
    pub ret: &'a Ty,
    /// Number of declared, non-variadic parameters.
    pub fixed_params: usize,
    pub variadic: bool,
}

/// Calls native code and captures its result as a value of the return type.
pub fn call_foreign(callee: ForeignFn<'_>, args: &[Value]) -> Result<Value> {
    let ret = classify(callee.ret)?;
    let scalars = args
        .iter()
        .enumerate()
        .map(|(i, arg)| marshal(arg, i >= callee.fixed_params))
        .collect::<Result<Vec<_>>>()?;
    if callee.address == 0 {
        bail!(InterpError::UnknownFunction(0));
    }
    let variadic = callee.variadic || args.len() > callee.fixed_params;
    let types = scalars
        .iter()
        .map(|scalar| scalar.class().ffi_type())
        .collect::<Result<Vec<_>>>()?;
    let cif = if variadic {
        Cif::new_variadic(types, callee.fixed_params, ret.ffi_type()?)
    } else {
        Cif::new(types, ret.ffi_type()?)
    };
    let ffi_args: Vec<Arg> = scalars.iter().map(Scalar::arg).collect();
    debug!(
        "Foreign call to {} at 0x{:x} ({} args{})",
        callee.name,
        callee.address,
        scalars.len(),
        if variadic { ", variadic" } else { "" }
    );

    let code = CodePtr::from_ptr(callee.address as *const c_void);
    // SAFETY: the address was resolved for a function whose declared
    // signature matches `cif`, and every `Arg` borrows from `scalars`, which
    // outlives the call. Integer results are widened by libffi to a full
    // return register, so reading them as `u64` is always in bounds.
    let value = match ret {
        AbiClass::Void => {
            unsafe { cif.call::<()>(code, &ffi_args) };
            Value::zeroed(callee.ret.clone())
        }
        AbiClass::Int { size, .. } => {
            let raw = unsafe { cif.call::<u64>(code, &ffi_args) };
            Value::from_bytes(callee.ret.clone(), &raw.to_le_bytes()[..size])?
        }
        AbiClass::F32 => {
            let raw = unsafe { cif.call::<f32>(code, &ffi_args) };
            Value::from_bytes(callee.ret.clone(), &raw.to_le_bytes())?
        }
        AbiClass::F64 => {
            let raw = unsafe { cif.call::<f64>(code, &ffi_args) };
            Value::from_bytes(callee.ret.clone(), &raw.to_le_bytes())?
        }
    };
    Ok(value)
}
