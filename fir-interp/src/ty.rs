//! Packed layouts of IR types.
//!
//! Aggregates are the concatenation of their members in declared order with
//! no padding anywhere. The member orderings of the builtin containers are
//! shared with native code and must not change.
use fir::{FloatTy, Ty, TyKind};
use std::collections::HashMap;
use std::rc::Rc;

/// Size of the native word and of pointers.
pub const WORD_SIZE: usize = 8;

/// Inline payload bytes of an `any` box.
pub const ANY_DATA_SIZE: usize = 32;

/// Slot indices of the builtin containers.
pub mod slot {
    pub const SLICE_DATA: usize = 0;
    pub const SLICE_LENGTH: usize = 1;

    pub const SAA_DATA: usize = 0;
    pub const SAA_LENGTH: usize = 1;
    pub const SAA_CAPACITY: usize = 2;
    pub const SAA_REFCOUNT: usize = 3;

    pub const ANY_TYPEID: usize = 0;
    pub const ANY_REFCOUNT: usize = 1;
    pub const ANY_DATA: usize = 2;

    pub const RANGE_LOWER: usize = 0;
    pub const RANGE_UPPER: usize = 1;
    pub const RANGE_STEP: usize = 2;

    pub const ENUM_INDEX: usize = 0;
    pub const ENUM_VALUE: usize = 1;
}

pub trait PackedLayout {
    /// Return the size of the type in bytes.
    fn size(&self) -> usize;

    /// Return the member types in layout order. Empty for scalars.
    fn member_types(&self) -> Vec<Ty>;
}

impl PackedLayout for Ty {
    fn size(&self) -> usize {
        match self.kind() {
            TyKind::Void => 0,
            TyKind::Bool => 1,
            TyKind::Int { bits, .. } => usize::from(*bits) / 8,
            TyKind::Float(FloatTy::F32) => 4,
            TyKind::Float(FloatTy::F64) => 8,
            TyKind::Pointer { .. } | TyKind::Function { .. } => WORD_SIZE,
            TyKind::Array { elem, len } => elem.size() * len,
            TyKind::Union { variants, .. } => WORD_SIZE + max_size(variants),
            TyKind::RawUnion { variants, .. } => max_size(variants),
            _ => self.member_types().iter().map(PackedLayout::size).sum(),
        }
    }

    fn member_types(&self) -> Vec<Ty> {
        let word = Ty::word;
        match self.kind() {
            TyKind::Struct { fields, .. } => fields.clone(),
            TyKind::Class { fields, .. } => std::iter::once(Ty::i8().pointer_to())
                .chain(fields.iter().cloned())
                .collect(),
            TyKind::Tuple(members) => members.clone(),
            TyKind::Slice { elem, mutable } => {
                let data = if *mutable {
                    elem.mut_pointer_to()
                } else {
                    elem.pointer_to()
                };
                vec![data, word()]
            }
            TyKind::DynamicArray { elem } => {
                vec![elem.mut_pointer_to(), word(), word(), word().mut_pointer_to()]
            }
            TyKind::String => vec![
                Ty::i8().mut_pointer_to(),
                word(),
                word(),
                word().mut_pointer_to(),
            ],
            TyKind::Any => vec![
                Ty::uword(),
                word().mut_pointer_to(),
                Ty::array(Ty::i8(), ANY_DATA_SIZE),
            ],
            TyKind::Range => vec![word(), word(), word()],
            TyKind::Enum { case_ty, .. } => vec![word(), case_ty.clone()],
            TyKind::Array { elem, len } => vec![elem.clone(); *len],
            TyKind::Union { variants, .. } | TyKind::RawUnion { variants, .. } => variants.clone(),
            _ => Vec::new(),
        }
    }
}

fn max_size(tys: &[Ty]) -> usize {
    tys.iter().map(PackedLayout::size).max().unwrap_or(0)
}

/// Position of one member inside its aggregate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub offset: usize,
    pub size: usize,
    pub ty: Ty,
}

/// Layout descriptor of a type, computed once and reused for every access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub size: usize,
    members: Members,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Members {
    Scalar,
    Array { elem: Ty, stride: usize, len: usize },
    Fields(Vec<Member>),
}

impl Layout {
    pub fn of(ty: &Ty) -> Self {
        let members = match ty.kind() {
            TyKind::Array { elem, len } => Members::Array {
                elem: elem.clone(),
                stride: elem.size(),
                len: *len,
            },
            TyKind::Union { variants, .. } => Members::Fields(at_offset(variants, WORD_SIZE)),
            TyKind::RawUnion { variants, .. } => Members::Fields(at_offset(variants, 0)),
            _ => {
                let mut offset = 0;
                let fields: Vec<_> = ty
                    .member_types()
                    .into_iter()
                    .map(|ty| {
                        let size = ty.size();
                        let member = Member { offset, size, ty };
                        offset += size;
                        member
                    })
                    .collect();
                if fields.is_empty() {
                    Members::Scalar
                } else {
                    Members::Fields(fields)
                }
            }
        };
        Self {
            size: ty.size(),
            members,
        }
    }

    /// Member `index`; for unions, the payload of variant `index`.
    pub fn member(&self, index: usize) -> Option<Member> {
        match &self.members {
            Members::Scalar => None,
            Members::Array { elem, stride, len } => (index < *len).then(|| Member {
                offset: index * stride,
                size: *stride,
                ty: elem.clone(),
            }),
            Members::Fields(fields) => fields.get(index).cloned(),
        }
    }

    pub fn member_count(&self) -> usize {
        match &self.members {
            Members::Scalar => 0,
            Members::Array { len, .. } => *len,
            Members::Fields(fields) => fields.len(),
        }
    }
}

fn at_offset(variants: &[Ty], offset: usize) -> Vec<Member> {
    variants
        .iter()
        .map(|ty| Member {
            offset,
            size: ty.size(),
            ty: ty.clone(),
        })
        .collect()
}

/// Memoizes [`Layout`]s per type.
#[derive(Debug, Default)]
pub struct LayoutCache {
    layouts: HashMap<Ty, Rc<Layout>>,
}

impl LayoutCache {
    pub fn layout(&mut self, ty: &Ty) -> Rc<Layout> {
        self.layouts
            .entry(ty.clone())
            .or_insert_with(|| Rc::new(Layout::of(ty)))
            .clone()
    }
}
