//! A C declaration type space.
//!
//! Feeds textual C declarations (header text, inline snippets) through a
//! small declaration frontend, lowers the resulting abstract type nodes to
//! concrete native type descriptors, and resolves struct layouts by probing
//! an actual C toolchain in one batch per configuration pass.

/// Contains the error types for the crate.
pub mod error;
/// Contains the declaration frontend (lexer + parser).
pub mod frontend;
/// Contains the type lowering algorithm.
pub mod lower;
/// Contains the abstract C type model.
pub mod model;
/// Contains the native type registry and descriptor arena.
pub mod native;
/// Contains the layout probe oracle.
pub mod probe;
/// Contains the orchestrating type space.
pub mod space;
/// Contains delayed struct cells and the struct arena.
pub mod structs;

#[cfg(test)]
mod tests;

pub use symbol_table::GlobalSymbol as StringId;

pub use error::Error;
pub use model::{CType, MacroValue, Qualifiers};
pub use native::{CValue, NativeType, TypeId};
pub use probe::{CcOracle, LayoutOracle, NaturalLayoutOracle};
pub use space::{parse_source, FuncDecl, SpaceStats, TypeSpace};
pub use structs::{StructId, StructLayout};
