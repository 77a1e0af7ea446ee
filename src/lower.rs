//! Type lowering: abstract `CType` nodes to concrete `NativeType`
//! descriptors.
//!
//! The algorithm is a pure recursion except for aggregate nodes, which go
//! through the struct cache so that self-referential and mutually-recursive
//! aggregates terminate on the placeholder registered before their fields
//! are lowered.

use log::trace;
use thin_vec::ThinVec;
use thiserror::Error;

use crate::model::{CType, Qualifiers};
use crate::native::{NativeType, TypeId};
use crate::space::TypeSpace;
use crate::structs::StructId;

/// An error raised while lowering an abstract type node.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LowerError {
    /// A primitive spelling the registry does not know.
    #[error("unknown primitive type `{0}`")]
    UnknownPrimitive(String),

    /// Variadic function pointers cannot be captured in a fixed signature.
    #[error("variadic function pointers are not supported")]
    VariadicFunctionPointer,

    /// Lowering the signature of a variadic function declaration.
    #[error("cannot lower arguments of variadic function `{0}`")]
    VariadicFunction(String),

    /// An anonymous aggregate reached the probe without a typedef name.
    #[error("anonymous struct `{0}` cannot be named for layout probing")]
    AnonymousStruct(String),

    /// A struct cell received a second layout, which the one-shot backfill
    /// protocol forbids.
    #[error("struct `{0}` layout resolved twice")]
    AlreadyResolved(String),

    /// A forward-declared aggregate was queued for probing without fields.
    #[error("struct `{0}` has no field list to lay out")]
    IncompleteStruct(String),
}

/// The result of lowering one node: either a finished descriptor or a
/// still-delayed aggregate placeholder.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Lowered {
    Ty(TypeId),
    Delayed(StructId),
}

impl Lowered {
    /// Collapse to a descriptor handle; a delayed aggregate collapses to its
    /// forward-reference handle.
    pub fn as_type(self) -> TypeId {
        match self {
            Lowered::Ty(t) => t,
            Lowered::Delayed(s) => s.handle(),
        }
    }
}

impl TypeSpace {
    /// Lower an abstract type node to a concrete descriptor.
    ///
    /// The qualifier argument mirrors the frontend's `(type, qualifiers)`
    /// declaration pairs; pointer constness is read off the pointer node
    /// itself.
    pub(crate) fn lower_type(
        &mut self,
        obj: &CType,
        quals: Qualifiers,
    ) -> Result<Lowered, LowerError> {
        trace!("lowering {:?} (quals {:?})", obj, quals);
        match obj {
            CType::Defined { real, quals, .. } => self.lower_type(real, *quals),

            CType::Primitive(name) => {
                let kind = self
                    .registry
                    .lookup(name.as_str())
                    .ok_or_else(|| LowerError::UnknownPrimitive(name.as_str().to_owned()))?
                    .clone();
                Ok(Lowered::Ty(TypeId::intern(&kind)))
            }

            CType::StructRef(node) => {
                // The cache hit is what breaks recursion for aggregates that
                // reference themselves, directly or mutually.
                if let Some(entry) = self.struct_cache.get(node) {
                    return Ok(*entry);
                }
                self.new_struct(*node)
            }

            CType::Pointer { pointee, quals } => {
                let to = self.lower_type(pointee, Qualifiers::empty())?;
                let kind = match to {
                    Lowered::Delayed(cell) => NativeType::Ptr(cell.handle()),
                    Lowered::Ty(t) => match t.kind() {
                        NativeType::Void => NativeType::VoidPtr,
                        k if k.is_container() => NativeType::Ptr(t),
                        _ => NativeType::ArrayPtr {
                            elem: t,
                            read_only: quals.contains(Qualifiers::CONST),
                        },
                    },
                };
                Ok(Lowered::Ty(TypeId::intern(&kind)))
            }

            CType::FunctionPtr {
                args,
                result,
                variadic,
            } => {
                if *variadic {
                    return Err(LowerError::VariadicFunctionPointer);
                }
                let args = args
                    .iter()
                    .map(|arg| self.lower_field(arg))
                    .collect::<Result<ThinVec<_>, _>>()?;
                let result = self.lower_field(result)?;
                let func = TypeId::intern(&NativeType::Func { args, result });
                Ok(Lowered::Ty(TypeId::intern(&NativeType::Ptr(func))))
            }

            CType::Void => Ok(Lowered::Ty(TypeId::intern(&NativeType::Void))),

            CType::Array { elem, len } => {
                let elem = self.lower_field(elem)?;
                Ok(Lowered::Ty(TypeId::intern(&NativeType::FixedArray {
                    elem,
                    len: *len,
                })))
            }
        }
    }

    /// Lower a node used in a field or signature position, collapsing
    /// delayed aggregates to their forward-reference handle.
    pub(crate) fn lower_field(&mut self, obj: &CType) -> Result<TypeId, LowerError> {
        Ok(self.lower_type(obj, Qualifiers::empty())?.as_type())
    }
}
