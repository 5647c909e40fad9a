//! Record layout descriptions.
//!
//! A [`Record`] type knows two things: the exact layout of its fields in
//! memory ([`Record::layout`]) and a canonical empty instance
//! ([`Record::sentinel`]) used to pad short rows. The in-memory layout,
//! padding included, is the transfer type; [`DataLayout::packed`] derives
//! the contiguous on-disk equivalent so storage stays dense.

use std::mem;
use std::slice;

use serde::Deserialize;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AtomType {
    F32,
    F64,
    I32,
    I64,
    Bool,
}

impl AtomType {
    pub fn size(&self) -> usize {
        match self {
            AtomType::F32 | AtomType::I32 => 4,
            AtomType::F64 | AtomType::I64 => 8,
            AtomType::Bool => 1,
        }
    }
}

/// One named member of a compound layout. `offset` is a byte offset from
/// the start of the record, real for in-memory descriptors and contiguous
/// for packed ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub offset: usize,
    pub dtype: DataLayout,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataLayout {
    Atomic(AtomType),
    Compound {
        size: usize,
        fields: Vec<FieldDescriptor>,
    },
}

impl DataLayout {
    /// Record stride in bytes under this layout.
    pub fn size(&self) -> usize {
        match self {
            DataLayout::Atomic(atom) => atom.size(),
            DataLayout::Compound { size, .. } => *size,
        }
    }

    /// Same fields in the same order, with contiguous offsets and no
    /// padding. Atomic layouts pack to themselves.
    pub fn packed(&self) -> DataLayout {
        match self {
            DataLayout::Atomic(atom) => DataLayout::Atomic(*atom),
            DataLayout::Compound { fields, .. } => {
                let mut offset = 0;
                let fields = fields
                    .iter()
                    .map(|f| {
                        let dtype = f.dtype.packed();
                        let packed = FieldDescriptor {
                            name: f.name.clone(),
                            offset,
                            dtype,
                        };
                        offset += packed.dtype.size();
                        packed
                    })
                    .collect::<Vec<_>>();
                DataLayout::Compound {
                    size: offset,
                    fields,
                }
            }
        }
    }
}

/// A value type that can be stored.
///
/// # Safety
///
/// `layout()` must describe the type's real memory layout: the type must
/// be `#[repr(C)]`, every field must appear with its true `offset_of!`
/// offset, and every byte of the type (padding included) must be safe to
/// read as `u8` once a value has been constructed. The store does not
/// verify any of this; a descriptor that disagrees with the real layout
/// silently corrupts every subsequent write.
pub unsafe trait Record: Copy + 'static {
    fn layout() -> DataLayout;
    fn sentinel() -> Self;
}

macro_rules! atomic_record {
    ($ty:ty, $atom:ident, $empty:expr) => {
        unsafe impl Record for $ty {
            fn layout() -> DataLayout {
                DataLayout::Atomic(AtomType::$atom)
            }

            fn sentinel() -> Self {
                $empty
            }
        }
    };
}

atomic_record!(f32, F32, 0.0);
atomic_record!(f64, F64, 0.0);
atomic_record!(i32, I32, 0);
atomic_record!(i64, I64, 0);
atomic_record!(bool, Bool, false);

/// Builds a [`FieldDescriptor`] for a named struct member:
/// `field!(Track, pt)`. The member's own `Record` impl supplies the
/// nested descriptor, so compounds may contain compounds.
#[macro_export]
macro_rules! field {
    ($strukt:ty, $member:ident) => {
        $crate::layout::FieldDescriptor {
            name: stringify!($member).to_string(),
            offset: std::mem::offset_of!($strukt, $member),
            dtype: $crate::layout::member_layout(|s: &$strukt| &s.$member),
        }
    };
}

/// Resolves the layout of a struct member through a typed accessor.
/// Only the accessor's signature matters; it is never called.
pub fn member_layout<S, M: Record>(accessor: fn(&S) -> &M) -> DataLayout {
    let _ = accessor;
    M::layout()
}

/// The in-memory bytes of a record slice, used as the transfer buffer.
/// Sound per the `Record` contract: every byte is initialized.
pub fn raw_bytes<T: Record>(records: &[T]) -> &[u8] {
    unsafe { slice::from_raw_parts(records.as_ptr().cast::<u8>(), mem::size_of_val(records)) }
}

/// Translates a memory-layout buffer into the packed on-disk
/// representation: each record's atoms are copied, in field order, to
/// contiguous positions. Byte-exact by construction.
pub fn pack_records(buf: &[u8], mem_type: &DataLayout) -> Vec<u8> {
    let stride = mem_type.size();
    assert_eq!(
        buf.len() % stride,
        0,
        "buffer is not a whole number of records"
    );
    let mut out = Vec::with_capacity((buf.len() / stride) * mem_type.packed().size());
    for record in buf.chunks_exact(stride) {
        pack_one(record, 0, mem_type, &mut out);
    }
    out
}

fn pack_one(record: &[u8], base: usize, dtype: &DataLayout, out: &mut Vec<u8>) {
    match dtype {
        DataLayout::Atomic(atom) => out.extend_from_slice(&record[base..base + atom.size()]),
        DataLayout::Compound { fields, .. } => {
            for f in fields {
                pack_one(record, base + f.offset, &f.dtype, out);
            }
        }
    }
}
