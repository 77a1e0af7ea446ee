//! Abstract C type nodes produced by the declaration frontend.
//!
//! Invariants:
//! - Nodes are plain values; identity matters only for struct/union nodes,
//!   which carry a process-unique `StructNodeId` into a side table so that
//!   forward references and repeated mentions of the same tag share a node.
//! - The node set is closed: lowering matches exhaustively over `CType`.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use thin_vec::ThinVec;

use crate::StringId;

bitflags::bitflags! {
    /// Type qualifiers attached to a declaration or a pointee.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Qualifiers: u8 {
        const CONST    = 0b001;
        const VOLATILE = 0b010;
        const RESTRICT = 0b100;
    }
}

/// Stable identity of a struct/union node in the frontend's side table.
///
/// Ids are allocated from a process-wide counter so that merging one parsed
/// unit into another (`include`) never renumbers nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StructNodeId(u32);

static NEXT_STRUCT_NODE: AtomicU32 = AtomicU32::new(1);

impl StructNodeId {
    pub fn fresh() -> Self {
        StructNodeId(NEXT_STRUCT_NODE.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for StructNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S#{}", self.0)
    }
}

/// An abstract, un-lowered C type expression.
#[derive(Debug, Clone, PartialEq)]
pub enum CType {
    /// A primitive spelled exactly as the registry knows it ("unsigned long").
    Primitive(StringId),
    /// A struct or union, by node identity.
    StructRef(StructNodeId),
    /// A pointer; `quals` are the qualifiers of the pointed-to type.
    Pointer {
        pointee: Box<CType>,
        quals: Qualifiers,
    },
    /// A fixed-length array.
    Array { elem: Box<CType>, len: usize },
    /// A pointer to a function.
    FunctionPtr {
        args: ThinVec<CType>,
        result: Box<CType>,
        variadic: bool,
    },
    Void,
    /// A use of a typedef name, carrying the aliased type and its qualifiers.
    Defined {
        name: StringId,
        real: Box<CType>,
        quals: Qualifiers,
    },
}

/// One field of a struct/union node.
#[derive(Debug, Clone, PartialEq)]
pub struct StructField {
    pub name: StringId,
    pub ty: CType,
    pub quals: Qualifiers,
}

/// A struct/union node in the frontend's side table.
///
/// `fields` stays `None` for a forward declaration until the definition is
/// seen; the node is mutated in place so earlier references pick it up.
#[derive(Debug, Clone, PartialEq)]
pub struct StructNode {
    pub id: StructNodeId,
    pub tag: Option<StringId>,
    pub is_union: bool,
    pub fields: Option<ThinVec<StructField>>,
}

impl StructNode {
    /// The structural name: the declared tag, or a synthetic `$N` marker for
    /// anonymous aggregates.
    pub fn struct_name(&self) -> String {
        match self.tag {
            Some(tag) => tag.as_str().to_owned(),
            None => format!("${}", self.id.raw()),
        }
    }
}

/// A captured macro value (`#define NAME value`).
#[derive(Debug, Clone, PartialEq)]
pub enum MacroValue {
    Int(i64),
    Str(String),
}

impl fmt::Display for MacroValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MacroValue::Int(v) => write!(f, "{}", v),
            MacroValue::Str(s) => write!(f, "{:?}", s),
        }
    }
}
