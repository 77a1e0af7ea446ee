//! Concrete native type descriptors and the host primitive registry.
//!
//! Descriptors are interned into a thread-local arena and handled by
//! `TypeId` (16M types is plenty for a build-phase tool); callers never hold
//! borrows into the table. The primitive registry is read-only after
//! construction and is seeded once from the host platform's widths.

use std::cell::RefCell;
use std::ffi::{c_char, c_int, c_long, c_longlong, c_short};
use std::fmt;
use std::mem::size_of;

use hashbrown::HashMap;
use thin_vec::ThinVec;

use crate::structs::StructId;

/// A fully lowered, host-representable type descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NativeType {
    /// The canonical "no value" type.
    Void,
    /// A fixed-width integer scalar.
    Int { bits: u8, signed: bool },
    /// A floating-point scalar with the given storage width in bytes.
    Float { bytes: u8 },
    /// The platform wide character.
    WChar { bits: u8, signed: bool },
    /// The platform's opaque file-stream structure. Never laid out.
    FileStream,
    /// A generic untyped pointer (`void *`).
    VoidPtr,
    /// A pointer to an exact layout (struct, fixed array, function).
    Ptr(TypeId),
    /// A pointer to an unknown-extent array of scalars. `read_only` marks
    /// pointers whose pointee was const-qualified.
    ArrayPtr { elem: TypeId, read_only: bool },
    /// A fixed-size array with a known element count.
    FixedArray { elem: TypeId, len: usize },
    /// A callable signature (only ever appears behind `Ptr`).
    Func {
        args: ThinVec<TypeId>,
        result: TypeId,
    },
    /// A struct/union by forward-reference handle; the layout behind the
    /// handle is backfilled once by the probe pass.
    Struct(StructId),
}

impl NativeType {
    /// Container types take `Ptr`, scalars take `ArrayPtr`, when pointed at.
    pub fn is_container(&self) -> bool {
        matches!(
            self,
            NativeType::Struct(_)
                | NativeType::FixedArray { .. }
                | NativeType::Func { .. }
                | NativeType::FileStream
        )
    }
}

// -----------------------------
// Thread-local descriptor arena
// -----------------------------
// Single-threaded build-phase component; thread_local + RefCell avoids
// borrow-checker friction and keeps TypeId meaningful across TypeSpaces.
thread_local! {
    static TYPE_TABLE: RefCell<TypeTable> = RefCell::new(TypeTable::new());
}

/// Handle to an interned `NativeType`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct TypeId(u32);

impl TypeId {
    /// Intern a descriptor, returning the existing handle for duplicates.
    pub fn intern(kind: &NativeType) -> TypeId {
        TYPE_TABLE.with(|tbl| tbl.borrow_mut().intern_local(kind))
    }

    /// Return a cloned descriptor so callers don't hold borrows.
    pub fn kind(self) -> NativeType {
        TYPE_TABLE.with(|tbl| tbl.borrow().types[self.0 as usize].clone())
    }

    pub fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T#{}", self.0)
    }
}

struct TypeTable {
    types: Vec<NativeType>,
    map: HashMap<NativeType, u32>,
}

impl TypeTable {
    fn new() -> Self {
        TypeTable {
            types: Vec::new(),
            map: HashMap::new(),
        }
    }

    fn intern_local(&mut self, kind: &NativeType) -> TypeId {
        if let Some(&idx) = self.map.get(kind) {
            return TypeId(idx);
        }
        let idx = self.types.len() as u32;
        self.types.push(kind.clone());
        self.map.insert(kind.clone(), idx);
        TypeId(idx)
    }
}

// -----------------------------
// Primitive registry
// -----------------------------

const CHAR_SIGNED: bool = (c_char::MIN as i64) != 0;

#[cfg(windows)]
const WCHAR: NativeType = NativeType::WChar {
    bits: 16,
    signed: false,
};
#[cfg(not(windows))]
const WCHAR: NativeType = NativeType::WChar {
    bits: 32,
    signed: true,
};

#[cfg(windows)]
const LONG_DOUBLE_BYTES: u8 = 8;
#[cfg(not(windows))]
const LONG_DOUBLE_BYTES: u8 = 16;

/// Read-only table mapping canonical C primitive spellings to concrete
/// scalar descriptors, derived from the host platform.
///
/// Invariant: every spelling the frontend can produce has exactly one entry;
/// a missed lookup is reported as an unknown primitive by the lowering pass.
pub struct PrimRegistry {
    map: HashMap<&'static str, NativeType>,
}

impl PrimRegistry {
    /// Build the host registry. Cheap enough to construct per `TypeSpace`.
    pub fn host() -> Self {
        let mut map = HashMap::new();

        let int = |bits: usize, signed: bool| NativeType::Int {
            bits: bits as u8,
            signed,
        };

        let short_bits = size_of::<c_short>() * 8;
        let int_bits = size_of::<c_int>() * 8;
        let long_bits = size_of::<c_long>() * 8;
        let llong_bits = size_of::<c_longlong>() * 8;
        let ptr_bits = size_of::<usize>() * 8;

        map.insert("char", int(8, CHAR_SIGNED));
        map.insert("signed char", int(8, true));
        map.insert("unsigned char", int(8, false));
        map.insert("_Bool", int(8, false));

        for (spelling, bits, signed) in [
            ("short", short_bits, true),
            ("short int", short_bits, true),
            ("signed short", short_bits, true),
            ("unsigned short", short_bits, false),
            ("unsigned short int", short_bits, false),
            ("int", int_bits, true),
            ("signed", int_bits, true),
            ("signed int", int_bits, true),
            ("unsigned", int_bits, false),
            ("unsigned int", int_bits, false),
            ("long", long_bits, true),
            ("long int", long_bits, true),
            ("signed long", long_bits, true),
            ("unsigned long", long_bits, false),
            ("unsigned long int", long_bits, false),
            ("long long", llong_bits, true),
            ("long long int", llong_bits, true),
            ("signed long long", llong_bits, true),
            ("unsigned long long", llong_bits, false),
            ("unsigned long long int", llong_bits, false),
        ] {
            map.insert(spelling, int(bits, signed));
        }

        for (spelling, bits, signed) in [
            ("int8_t", 8, true),
            ("uint8_t", 8, false),
            ("int16_t", 16, true),
            ("uint16_t", 16, false),
            ("int32_t", 32, true),
            ("uint32_t", 32, false),
            ("int64_t", 64, true),
            ("uint64_t", 64, false),
        ] {
            map.insert(spelling, int(bits, signed));
        }

        map.insert("size_t", int(ptr_bits, false));
        map.insert("ptrdiff_t", int(ptr_bits, true));
        map.insert("intptr_t", int(ptr_bits, true));
        map.insert("uintptr_t", int(ptr_bits, false));
        // MSVC headers do not define ssize_t; the C level falls back to long.
        if cfg!(windows) {
            map.insert("ssize_t", int(long_bits, true));
        } else {
            map.insert("ssize_t", int(ptr_bits, true));
        }

        map.insert("float", NativeType::Float { bytes: 4 });
        map.insert("double", NativeType::Float { bytes: 8 });
        map.insert(
            "long double",
            NativeType::Float {
                bytes: LONG_DOUBLE_BYTES,
            },
        );

        map.insert("wchar_t", WCHAR);
        map.insert("FILE", NativeType::FileStream);

        PrimRegistry { map }
    }

    pub fn lookup(&self, spelling: &str) -> Option<&NativeType> {
        self.map.get(spelling)
    }
}

// -----------------------------
// Scalar values for cast()
// -----------------------------

/// A host-representable scalar value, used by `TypeSpace::cast`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CValue {
    Int(i64),
    UInt(u64),
    Float(f64),
    Ptr(u64),
}

impl CValue {
    fn as_u64(self) -> u64 {
        match self {
            CValue::Int(v) => v as u64,
            CValue::UInt(v) => v,
            CValue::Float(v) => v as i64 as u64,
            CValue::Ptr(v) => v,
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            CValue::Int(v) => v as f64,
            CValue::UInt(v) => v as f64,
            CValue::Float(v) => v,
            CValue::Ptr(v) => v as f64,
        }
    }
}

impl NativeType {
    /// Reinterpret `value` as this type. This is a raw, unchecked numeric
    /// cast in the manner of a C cast: integers are truncated or extended to
    /// the target width, floats converted, pointers treated as addresses.
    pub fn cast_value(&self, value: CValue) -> CValue {
        match *self {
            NativeType::Int { bits, signed } | NativeType::WChar { bits, signed } => {
                let raw = value.as_u64();
                let masked = if bits >= 64 {
                    raw
                } else {
                    raw & ((1u64 << bits) - 1)
                };
                if signed {
                    let shift = 64 - u32::from(bits);
                    CValue::Int(((masked << shift) as i64) >> shift)
                } else {
                    CValue::UInt(masked)
                }
            }
            NativeType::Float { bytes } => {
                let v = value.as_f64();
                if bytes == 4 {
                    CValue::Float(v as f32 as f64)
                } else {
                    CValue::Float(v)
                }
            }
            NativeType::Ptr(_)
            | NativeType::VoidPtr
            | NativeType::ArrayPtr { .. }
            | NativeType::FixedArray { .. }
            | NativeType::Func { .. }
            | NativeType::Struct(_)
            | NativeType::FileStream => CValue::Ptr(value.as_u64()),
            NativeType::Void => value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interned_ids_are_stable() {
        let a = TypeId::intern(&NativeType::Void);
        let b = TypeId::intern(&NativeType::Void);
        assert_eq!(a, b);

        let p = TypeId::intern(&NativeType::ArrayPtr {
            elem: a,
            read_only: false,
        });
        let q = TypeId::intern(&NativeType::ArrayPtr {
            elem: a,
            read_only: true,
        });
        assert_ne!(p, q);
    }

    #[test]
    fn registry_knows_every_reference_spelling() {
        let reg = PrimRegistry::host();
        for spelling in [
            "int",
            "unsigned long",
            "double",
            "char",
            "float",
            "long double",
            "wchar_t",
        ] {
            assert!(reg.lookup(spelling).is_some(), "missing {}", spelling);
        }
        assert!(reg.lookup("quux_t").is_none());
    }

    #[test]
    fn cast_truncates_and_extends() {
        let uchar = NativeType::Int {
            bits: 8,
            signed: false,
        };
        assert_eq!(uchar.cast_value(CValue::Int(-1)), CValue::UInt(255));

        let schar = NativeType::Int {
            bits: 8,
            signed: true,
        };
        assert_eq!(schar.cast_value(CValue::UInt(0xff)), CValue::Int(-1));

        let dbl = NativeType::Float { bytes: 8 };
        assert_eq!(dbl.cast_value(CValue::Int(2)), CValue::Float(2.0));
    }
}
