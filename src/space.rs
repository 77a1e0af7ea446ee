//! The type space: the stateful facade tying the frontend, the lowering
//! pass and the layout probe together.
//!
//! Declarations accumulate across `parse_source`/`parse_header` calls; each
//! call ends with a configuration pass that lowers every new named
//! declaration and resolves all queued aggregate layouts with a single
//! probe batch.

use hashbrown::HashMap;

use log::{debug, info};
use thin_vec::ThinVec;

use crate::error::{Error, Result};
use crate::frontend::{DeclKind, FuncSig, Parser};
use crate::lower::{LowerError, Lowered};
use crate::model::{CType, MacroValue, Qualifiers, StructNodeId};
use crate::native::{CValue, NativeType, PrimRegistry, TypeId};
use crate::probe::{CcOracle, LayoutOracle, LayoutRequest, ProbeError, ProbeUnit};
use crate::structs::StructId;

/// Counters for cache behavior, mostly interesting to tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpaceStats {
    /// Type expressions actually parsed and lowered by `gettype`.
    pub type_parses: u64,
    /// `gettype` calls answered from the declaration-string cache.
    pub cache_hits: u64,
}

/// A space of C declarations and their lowered native descriptors.
pub struct TypeSpace {
    frontend: Parser,
    pub(crate) registry: PrimRegistry,
    /// Lowered typedef bindings by name.
    definitions: HashMap<String, TypeId>,
    macros: HashMap<String, MacroValue>,
    functions: HashMap<String, FuncSig>,
    /// Struct nodes already lowered, registered before their fields are so
    /// that recursive references terminate.
    pub(crate) struct_cache: HashMap<StructNodeId, Lowered>,
    /// Tags that lower to a fixed descriptor instead of a probed aggregate.
    opaque_aliases: HashMap<String, NativeType>,
    /// Aggregates awaiting the next probe batch.
    pending: Vec<(StructId, LayoutRequest)>,
    /// Index of the first declaration not yet configured.
    handled: usize,
    headers: Vec<String>,
    sources: Vec<String>,
    cdecl_cache: HashMap<String, TypeId>,
    oracle: Box<dyn LayoutOracle>,
    stats: SpaceStats,
}

impl TypeSpace {
    /// A space resolving layouts with the platform C compiler.
    pub fn new() -> Self {
        Self::with_oracle(Box::new(CcOracle::default()))
    }

    /// A space resolving layouts with the given oracle.
    pub fn with_oracle(oracle: Box<dyn LayoutOracle>) -> Self {
        let mut opaque_aliases = HashMap::new();
        // glibc spells the FILE structure this way; it is opaque to us.
        opaque_aliases.insert("_IO_FILE".to_owned(), NativeType::FileStream);
        TypeSpace {
            frontend: Parser::new(),
            registry: PrimRegistry::host(),
            definitions: HashMap::new(),
            macros: HashMap::new(),
            functions: HashMap::new(),
            struct_cache: HashMap::new(),
            opaque_aliases,
            pending: Vec::new(),
            handled: 0,
            headers: vec!["sys/types.h".to_owned(), "stdarg.h".to_owned()],
            sources: Vec::new(),
            cdecl_cache: HashMap::new(),
            oracle,
            stats: SpaceStats::default(),
        }
    }

    /// Merge another space's declarations into this one.
    ///
    /// The other space's declarations become part of this space's lookup
    /// tables and probe context, but are never re-configured or re-probed:
    /// descriptor handles are global, so the other space's results stay
    /// valid here.
    pub fn include(&mut self, other: &TypeSpace) {
        info!("including a space with {} typedefs", other.definitions.len());
        self.frontend.include(&other.frontend);
        for (name, ty) in &other.definitions {
            self.definitions.entry(name.clone()).or_insert(*ty);
        }
        for (name, value) in &other.macros {
            self.macros
                .entry(name.clone())
                .or_insert_with(|| value.clone());
        }
        for (name, sig) in &other.functions {
            self.functions
                .entry(name.clone())
                .or_insert_with(|| sig.clone());
        }
        for (node, entry) in &other.struct_cache {
            self.struct_cache.entry(*node).or_insert(*entry);
        }
        for (tag, kind) in &other.opaque_aliases {
            self.opaque_aliases
                .entry(tag.clone())
                .or_insert_with(|| kind.clone());
        }
        self.headers.extend(other.headers.iter().cloned());
        self.sources.extend(other.sources.iter().cloned());
        for (cdecl, ty) in &other.cdecl_cache {
            self.cdecl_cache.entry(cdecl.clone()).or_insert(*ty);
        }
    }

    /// Parse a chunk of declaration text and configure everything it added.
    /// The text also becomes part of the probe context.
    pub fn parse_source(&mut self, text: &str) -> Result<()> {
        self.frontend.parse(text)?;
        self.sources.push(text.to_owned());
        self.configure_types()
    }

    /// Parse the contents of a named header and configure everything it
    /// added. The probe context gains an `#include` of the name rather than
    /// the text itself, so the probe program sees the real installed header.
    pub fn parse_header(&mut self, name: &str, contents: &str) -> Result<()> {
        self.frontend.parse(contents)?;
        self.headers.push(name.to_owned());
        self.configure_types()
    }

    /// Declare a tag as an alias for a fixed descriptor, exempting it from
    /// layout probing.
    pub fn add_opaque_alias(&mut self, tag: &str, kind: NativeType) {
        self.opaque_aliases.insert(tag.to_owned(), kind);
    }

    /// Lower every declaration seen since the last pass, then resolve all
    /// queued aggregate layouts with one probe batch.
    pub fn configure_types(&mut self) -> Result<()> {
        let decls = self.frontend.decls()[self.handled..].to_vec();
        self.handled = self.frontend.decls().len();
        debug!("configuring {} declarations", decls.len());
        for decl in &decls {
            if decl.included {
                continue;
            }
            match &decl.kind {
                DeclKind::Typedef { name, ty, quals } => {
                    self.add_typedef(name.as_str(), ty, *quals)?;
                }
                DeclKind::Macro { name, value } => {
                    self.add_macro(name.as_str(), value.clone())?;
                }
                DeclKind::Struct { node } => {
                    let lowered = match self.struct_cache.get(node) {
                        Some(entry) => *entry,
                        None => self.new_struct(*node)?,
                    };
                    if let Lowered::Delayed(cell) = lowered {
                        // A cell lowered while the struct was only forward-
                        // declared has no fields yet; the body that just
                        // arrived fills it in.
                        self.refresh_struct_fields(*node, cell)?;
                        self.realize_struct(cell)?;
                    }
                }
                DeclKind::Function(sig) => {
                    self.functions
                        .insert(sig.name.as_str().to_owned(), sig.clone());
                }
            }
        }

        // Aggregates reached only through other types (nested definitions,
        // pointer targets that later gained bodies) still need layouts if
        // they are nameable. Allocation order is first-encounter order, so
        // sorting keeps the request queue deterministic.
        let mut delayed: Vec<StructId> = self
            .struct_cache
            .values()
            .filter_map(|entry| match entry {
                Lowered::Delayed(cell) => Some(*cell),
                Lowered::Ty(_) => None,
            })
            .collect();
        delayed.sort_unstable_by_key(|cell| cell.index());
        for cell in delayed {
            let data = cell.cell();
            if !data.requested
                && data.layout.is_none()
                && !data.fields.is_empty()
                && data.probe_name().is_ok()
            {
                self.realize_struct(cell)?;
            }
        }

        self.resolve_pending()
    }

    fn resolve_pending(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let unit = self.build_unit();
        let (cells, requests): (Vec<StructId>, Vec<LayoutRequest>) =
            self.pending.drain(..).unzip();
        info!("resolving {} struct layouts", requests.len());
        let layouts = self.oracle.resolve(&unit, &requests)?;
        if layouts.len() != cells.len() {
            return Err(ProbeError::MalformedOutput(format!(
                "expected {} layouts, got {}",
                cells.len(),
                layouts.len()
            ))
            .into());
        }
        for (cell, layout) in cells.into_iter().zip(layouts) {
            cell.backfill(layout)?;
        }
        Ok(())
    }

    fn add_typedef(&mut self, name: &str, ty: &CType, quals: Qualifiers) -> Result<()> {
        if self.definitions.contains_key(name) {
            return Err(Error::TypedefRedefined(name.to_owned()));
        }
        let lowered = self.lower_type(ty, quals)?;
        let ty_id = match lowered {
            Lowered::Delayed(cell) => {
                cell.name_from_typedef(name);
                self.realize_struct(cell)?;
                cell.handle()
            }
            Lowered::Ty(t) => t,
        };
        debug!("typedef {} = {:?}", name, ty_id);
        self.definitions.insert(name.to_owned(), ty_id);
        Ok(())
    }

    fn add_macro(&mut self, name: &str, value: MacroValue) -> Result<()> {
        if self.macros.contains_key(name) {
            return Err(Error::MacroRedefined(name.to_owned()));
        }
        debug!("macro {} = {}", name, value);
        self.macros.insert(name.to_owned(), value);
        Ok(())
    }

    /// Allocate and cache the struct cell for a frontend node.
    ///
    /// The cell enters the cache before any field is lowered; a field that
    /// refers back to the same aggregate, directly or through another one,
    /// hits the cache instead of recursing forever.
    pub(crate) fn new_struct(
        &mut self,
        node: StructNodeId,
    ) -> std::result::Result<Lowered, LowerError> {
        let data = self
            .frontend
            .struct_node(node)
            .cloned()
            .expect("struct nodes are registered before they are referenced");
        if let Some(tag) = data.tag {
            if let Some(kind) = self.opaque_aliases.get(tag.as_str()) {
                let entry = Lowered::Ty(TypeId::intern(&kind.clone()));
                self.struct_cache.insert(node, entry);
                return Ok(entry);
            }
        }
        let cell = StructId::alloc(data.struct_name(), data.is_union);
        let entry = Lowered::Delayed(cell);
        self.struct_cache.insert(node, entry);
        if let Some(fields) = &data.fields {
            let mut lowered = ThinVec::with_capacity(fields.len());
            for field in fields {
                lowered.push((field.name, self.lower_field(&field.ty)?));
            }
            cell.set_fields(lowered);
        }
        Ok(entry)
    }

    /// Attach fields to a cell that was lowered while its aggregate was
    /// only forward-declared, once the frontend node has gained a body.
    fn refresh_struct_fields(&mut self, node: StructNodeId, cell: StructId) -> Result<()> {
        if !cell.cell().fields.is_empty() {
            return Ok(());
        }
        let data = self
            .frontend
            .struct_node(node)
            .cloned()
            .expect("struct nodes are registered before they are referenced");
        if let Some(fields) = &data.fields {
            let mut lowered = ThinVec::with_capacity(fields.len());
            for field in fields {
                lowered.push((field.name, self.lower_field(&field.ty)?));
            }
            cell.set_fields(lowered);
        }
        Ok(())
    }

    /// Queue a delayed aggregate for the next probe batch. Aggregates with
    /// no field list are opaque and never probed; aggregates already queued
    /// or resolved are left alone.
    fn realize_struct(&mut self, cell: StructId) -> Result<()> {
        let data = cell.cell();
        if data.requested || data.layout.is_some() || data.fields.is_empty() {
            return Ok(());
        }
        let type_name = data.probe_name().map_err(Error::Lower)?;
        let fields = data
            .fields
            .iter()
            .map(|(name, ty)| (name.as_str().to_owned(), *ty))
            .collect();
        debug!("queueing layout request for {}", type_name);
        self.pending.push((
            cell,
            LayoutRequest {
                type_name,
                is_union: data.is_union,
                fields,
            },
        ));
        cell.mark_requested();
        Ok(())
    }

    /// Look up the descriptor for a type expression such as `const char *`.
    /// Results are memoized on the exact expression text.
    pub fn gettype(&mut self, cdecl: &str) -> Result<TypeId> {
        if let Some(&ty) = self.cdecl_cache.get(cdecl) {
            self.stats.cache_hits += 1;
            return Ok(ty);
        }
        self.stats.type_parses += 1;
        let (ty, quals) = self.frontend.parse_type(cdecl)?;
        let ty_id = self.lower_type(&ty, quals)?.as_type();
        self.cdecl_cache.insert(cdecl.to_owned(), ty_id);
        Ok(ty_id)
    }

    /// Reinterpret a scalar value as the named type, C-cast style.
    pub fn cast(&mut self, cdecl: &str, value: CValue) -> Result<CValue> {
        let ty = self.gettype(cdecl)?;
        Ok(ty.kind().cast_value(value))
    }

    /// Parse a standalone function declaration. Lowering of the signature is
    /// deferred until the caller asks for it.
    pub fn parse_func(&mut self, text: &str) -> Result<FuncDecl> {
        let sig = self.frontend.parse_func(text)?;
        Ok(FuncDecl { sig })
    }

    /// A function declared in previously parsed text, by name.
    pub fn declared_func(&self, name: &str) -> Option<FuncDecl> {
        self.functions.get(name).map(|sig| FuncDecl { sig: sig.clone() })
    }

    /// The lowered descriptor bound to a typedef name, if configured.
    pub fn definition(&self, name: &str) -> Option<TypeId> {
        self.definitions.get(name).copied()
    }

    /// The captured value of an object-like macro, if any.
    pub fn macro_value(&self, name: &str) -> Option<&MacroValue> {
        self.macros.get(name)
    }

    pub fn stats(&self) -> SpaceStats {
        self.stats
    }

    /// The C context the probe compiles against: every header and source
    /// chunk this space has seen, deduplicated, plus platform defines.
    fn build_unit(&self) -> ProbeUnit {
        let mut headers = Vec::new();
        for header in &self.headers {
            if !headers.contains(header) {
                headers.push(header.clone());
            }
        }
        let mut sources = Vec::new();
        for chunk in &self.sources {
            if !sources.contains(chunk) {
                sources.push(chunk.clone());
            }
        }
        let mut defines = Vec::new();
        if cfg!(windows) {
            // MSVC headers have no ssize_t.
            defines.push(("ssize_t".to_owned(), "long".to_owned()));
        }
        ProbeUnit {
            headers,
            sources,
            defines,
        }
    }
}

impl Default for TypeSpace {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse a chunk of declarations into a fresh space.
pub fn parse_source(text: &str) -> Result<TypeSpace> {
    let mut space = TypeSpace::new();
    space.parse_source(text)?;
    Ok(space)
}

/// A parsed function declaration whose signature lowers on demand.
#[derive(Debug, Clone)]
pub struct FuncDecl {
    sig: FuncSig,
}

impl FuncDecl {
    pub fn name(&self) -> &str {
        self.sig.name.as_str()
    }

    pub fn variadic(&self) -> bool {
        self.sig.variadic
    }

    /// Lower the argument types. Variadic declarations have no complete
    /// lowered argument list and are rejected.
    pub fn lower_args(&self, space: &mut TypeSpace) -> Result<Vec<TypeId>> {
        if self.sig.variadic {
            return Err(LowerError::VariadicFunction(self.name().to_owned()).into());
        }
        self.sig
            .args
            .iter()
            .map(|arg| space.lower_field(arg).map_err(Error::Lower))
            .collect()
    }

    pub fn lower_result(&self, space: &mut TypeSpace) -> Result<TypeId> {
        space.lower_field(&self.sig.result).map_err(Error::Lower)
    }
}
