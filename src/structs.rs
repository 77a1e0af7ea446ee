//! Delayed struct cells: aggregates whose existence is known before their
//! layout is.
//!
//! Each struct/union encountered during lowering gets a cell in a
//! thread-local arena. The `StructId` handle is stable and may be embedded
//! in other descriptors before the layout exists; the probe pass backfills
//! the layout behind the handle exactly once.

use std::cell::RefCell;
use std::fmt;

use thin_vec::ThinVec;

use crate::lower::LowerError;
use crate::native::TypeId;
use crate::StringId;

/// Concrete layout of a resolved aggregate, as reported by the probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructLayout {
    pub size: u64,
    pub align: u64,
    /// Byte offset per field, parallel to the cell's field list.
    pub offsets: ThinVec<u64>,
}

/// A struct/union descriptor cell.
///
/// Lifecycle: allocated (fields empty) and cached before field lowering, so
/// re-entrant references find the cell instead of recursing; field list
/// attached; queued for the probe once nameable; layout written once.
#[derive(Debug, Clone, PartialEq)]
pub struct StructCell {
    /// Declared tag, or a synthetic `$N` marker for anonymous aggregates.
    pub struct_name: String,
    /// Type-alias name acquired from the binding typedef, if any.
    pub type_name: Option<String>,
    pub is_union: bool,
    pub fields: ThinVec<(StringId, TypeId)>,
    /// Written exactly once by the probe pass.
    pub layout: Option<StructLayout>,
    /// Set when a layout request has been queued, so a cell is probed at
    /// most once.
    pub requested: bool,
}

impl StructCell {
    /// The name the probe program uses to denote this aggregate.
    ///
    /// Anonymous aggregates are only nameable through a typedef; without one
    /// there is no C spelling to probe and the resolution fails.
    pub fn probe_name(&self) -> Result<String, LowerError> {
        if let Some(name) = &self.type_name {
            return Ok(name.clone());
        }
        if !self.struct_name.starts_with('$') {
            let kw = if self.is_union { "union" } else { "struct" };
            return Ok(format!("{} {}", kw, self.struct_name));
        }
        Err(LowerError::AnonymousStruct(self.struct_name.clone()))
    }
}

impl fmt::Display for StructCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<struct {}>", self.struct_name)
    }
}

thread_local! {
    static STRUCT_TABLE: RefCell<Vec<StructCell>> = const { RefCell::new(Vec::new()) };
}

/// Forward-reference handle to a struct cell.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct StructId(u32);

impl StructId {
    /// Allocate a fresh, field-less cell.
    pub fn alloc(struct_name: String, is_union: bool) -> StructId {
        STRUCT_TABLE.with(|tbl| {
            let mut t = tbl.borrow_mut();
            let idx = t.len() as u32;
            t.push(StructCell {
                struct_name,
                type_name: None,
                is_union,
                fields: ThinVec::new(),
                layout: None,
                requested: false,
            });
            StructId(idx)
        })
    }

    /// Return a cloned cell so callers don't hold borrows into the arena.
    pub fn cell(self) -> StructCell {
        STRUCT_TABLE.with(|tbl| tbl.borrow()[self.0 as usize].clone())
    }

    /// Arena index; cells allocate in first-encounter order.
    pub fn index(self) -> u32 {
        self.0
    }

    pub fn set_fields(self, fields: ThinVec<(StringId, TypeId)>) {
        STRUCT_TABLE.with(|tbl| tbl.borrow_mut()[self.0 as usize].fields = fields);
    }

    /// Attach the type-alias name from a binding typedef, keeping the first
    /// one if several typedefs bind the same aggregate.
    pub fn name_from_typedef(self, name: &str) {
        STRUCT_TABLE.with(|tbl| {
            let cell = &mut tbl.borrow_mut()[self.0 as usize];
            if cell.type_name.is_none() {
                cell.type_name = Some(name.to_owned());
            }
        });
    }

    pub fn mark_requested(self) {
        STRUCT_TABLE.with(|tbl| tbl.borrow_mut()[self.0 as usize].requested = true);
    }

    /// One-shot layout backfill. A second write indicates a broken probe
    /// protocol and is rejected.
    pub fn backfill(self, layout: StructLayout) -> Result<(), LowerError> {
        STRUCT_TABLE.with(|tbl| {
            let cell = &mut tbl.borrow_mut()[self.0 as usize];
            if cell.layout.is_some() {
                return Err(LowerError::AlreadyResolved(cell.struct_name.clone()));
            }
            cell.layout = Some(layout);
            Ok(())
        })
    }

    /// The resolved layout, or an error if the cell was never probed.
    pub fn layout(self) -> Result<StructLayout, LowerError> {
        STRUCT_TABLE.with(|tbl| {
            let cell = &tbl.borrow()[self.0 as usize];
            cell.layout
                .clone()
                .ok_or_else(|| LowerError::IncompleteStruct(cell.struct_name.clone()))
        })
    }

    /// The interned descriptor handle other types embed.
    pub fn handle(self) -> TypeId {
        TypeId::intern(&crate::native::NativeType::Struct(self))
    }
}

impl fmt::Debug for StructId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "C#{}", self.0)
    }
}
