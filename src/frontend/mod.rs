//! The declaration frontend: turns C declaration text into abstract type
//! nodes and a flat, insertion-ordered table of named declarations.
//!
//! The supported subset covers what binding headers actually use: typedefs,
//! struct/union definitions, enum constant lists, object-like `#define`s
//! with literal values, function declarations, pointer/array/function-
//! pointer declarators and `const`/`volatile`/`restrict` qualifiers.

use hashbrown::HashMap;
use log::debug;
use thin_vec::ThinVec;

use crate::model::{CType, MacroValue, Qualifiers, StructField, StructNode, StructNodeId};
use crate::StringId;

pub mod error;
pub mod lexer;

pub use error::ParseError;
use lexer::{parse_int_literal, tokenize, KeywordKind, Token, TokenKind};

/// Primitive spellings that real headers provide through typedefs; the
/// frontend resolves them directly so the registry can supply their widths.
const BUILTIN_TYPE_NAMES: &[&str] = &[
    "size_t",
    "ssize_t",
    "ptrdiff_t",
    "intptr_t",
    "uintptr_t",
    "wchar_t",
    "FILE",
    "int8_t",
    "uint8_t",
    "int16_t",
    "uint16_t",
    "int32_t",
    "uint32_t",
    "int64_t",
    "uint64_t",
];

/// A named declaration, in the order it was seen.
#[derive(Debug, Clone, PartialEq)]
pub struct Decl {
    pub kind: DeclKind,
    /// Declarations merged in from another parsed unit are marked so the
    /// configuration pass skips them.
    pub included: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeclKind {
    Typedef {
        name: StringId,
        ty: CType,
        quals: Qualifiers,
    },
    Macro {
        name: StringId,
        value: MacroValue,
    },
    Struct {
        node: StructNodeId,
    },
    Function(FuncSig),
}

/// An un-lowered function signature.
#[derive(Debug, Clone, PartialEq)]
pub struct FuncSig {
    pub name: StringId,
    pub args: ThinVec<CType>,
    pub result: CType,
    pub variadic: bool,
}

/// A parser over the C declaration subset.
///
/// Typedef bindings and struct nodes persist across `parse` calls so later
/// text can reference earlier declarations; the token buffer is per-call
/// scratch.
#[derive(Default)]
pub struct Parser {
    tokens: Vec<Token>,
    position: usize,
    typedefs: HashMap<StringId, (CType, Qualifiers)>,
    struct_nodes: HashMap<StructNodeId, StructNode>,
    struct_tags: HashMap<(StringId, bool), StructNodeId>,
    decls: Vec<Decl>,
}

impl Parser {
    pub fn new() -> Self {
        Parser::default()
    }

    /// All declarations seen so far, insertion ordered.
    pub fn decls(&self) -> &[Decl] {
        &self.decls
    }

    pub fn struct_node(&self, id: StructNodeId) -> Option<&StructNode> {
        self.struct_nodes.get(&id)
    }

    /// Merge another parser's declarations into this one. The imported
    /// declarations are marked as included so they are not re-processed.
    pub fn include(&mut self, other: &Parser) {
        debug!("including {} declarations", other.decls.len());
        for (name, binding) in &other.typedefs {
            self.typedefs
                .entry(*name)
                .or_insert_with(|| binding.clone());
        }
        for (id, node) in &other.struct_nodes {
            self.struct_nodes.entry(*id).or_insert_with(|| node.clone());
        }
        for (key, id) in &other.struct_tags {
            self.struct_tags.entry(*key).or_insert(*id);
        }
        for decl in &other.decls {
            self.decls.push(Decl {
                kind: decl.kind.clone(),
                included: true,
            });
        }
    }

    /// Parse a unit of declaration text, growing the declaration table.
    pub fn parse(&mut self, text: &str) -> Result<(), ParseError> {
        let stripped = self.strip_directives(text)?;
        self.tokens = tokenize(&stripped)?;
        self.position = 0;
        while self.current_kind()? != TokenKind::Eof {
            self.parse_top_level()?;
        }
        Ok(())
    }

    /// Parse a standalone type expression such as `const char *`.
    pub fn parse_type(&mut self, text: &str) -> Result<(CType, Qualifiers), ParseError> {
        self.tokens = tokenize(text)?;
        self.position = 0;
        let (base, quals) = self.parse_base_type()?;
        let ty = self.parse_value_declarator(base, quals, false)?;
        self.eat_token(&TokenKind::Semicolon)?;
        let token = self.current_token()?;
        if token.kind != TokenKind::Eof {
            return Err(ParseError::UnexpectedToken(token));
        }
        Ok((ty, quals))
    }

    /// Parse a single function declaration such as
    /// `int frob(const char *name, int flags)`.
    pub fn parse_func(&mut self, text: &str) -> Result<FuncSig, ParseError> {
        let mut text = text.trim().to_owned();
        if !text.ends_with(';') {
            text.push(';');
        }
        self.tokens = tokenize(&text)?;
        self.position = 0;
        self.skip_storage_keywords()?;
        let (base, quals) = self.parse_base_type()?;
        let (result, _) = self.parse_pointers(base, quals)?;
        let name = self.expect_name()?;
        self.expect_punct(TokenKind::LeftParen)?;
        let (args, variadic) = self.parse_params()?;
        self.eat_token(&TokenKind::Semicolon)?;
        Ok(FuncSig {
            name,
            args,
            result,
            variadic,
        })
    }

    // -----------------------------
    // Directives
    // -----------------------------

    /// Capture `#define NAME literal` lines and blank out every directive so
    /// the token stream only sees plain declarations. Line numbers are kept.
    fn strip_directives(&mut self, text: &str) -> Result<String, ParseError> {
        let mut stripped = String::with_capacity(text.len());
        for line in text.lines() {
            let trimmed = line.trim_start();
            if let Some(directive) = trimmed.strip_prefix('#') {
                self.capture_directive(directive.trim_start(), trimmed)?;
                stripped.push('\n');
            } else {
                stripped.push_str(line);
                stripped.push('\n');
            }
        }
        Ok(stripped)
    }

    fn capture_directive(&mut self, directive: &str, full_line: &str) -> Result<(), ParseError> {
        let Some(rest) = directive.strip_prefix("define") else {
            // #include, #pragma, guards and conditionals are not ours to
            // interpret; the caller feeds us already-selected text.
            return Ok(());
        };
        let rest = rest.trim();
        let (name, value) = match rest.split_once(char::is_whitespace) {
            Some((name, value)) => (name, value.trim()),
            // A bare `#define NAME` (e.g. an include guard) binds nothing.
            None => return Ok(()),
        };
        if name.contains('(') {
            return Err(ParseError::BadDirective(full_line.to_owned()));
        }
        let value = if value.starts_with('"') && value.ends_with('"') && value.len() >= 2 {
            MacroValue::Str(value[1..value.len() - 1].to_owned())
        } else if let Some(v) = parse_int_literal(value) {
            MacroValue::Int(v)
        } else {
            return Err(ParseError::BadDirective(full_line.to_owned()));
        };
        self.decls.push(Decl {
            kind: DeclKind::Macro {
                name: StringId::new(name),
                value,
            },
            included: false,
        });
        Ok(())
    }

    // -----------------------------
    // Token plumbing
    // -----------------------------

    fn current_token(&self) -> Result<Token, ParseError> {
        self.tokens
            .get(self.position)
            .cloned()
            .ok_or(ParseError::UnexpectedEof)
    }

    fn current_kind(&self) -> Result<TokenKind, ParseError> {
        self.current_token().map(|t| t.kind)
    }

    fn peek_kind(&self, ahead: usize) -> Option<&TokenKind> {
        self.tokens.get(self.position + ahead).map(|t| &t.kind)
    }

    fn eat(&mut self) {
        self.position += 1;
    }

    /// Consume the current token if it matches.
    fn eat_token(&mut self, kind: &TokenKind) -> Result<bool, ParseError> {
        if self.current_kind()? == *kind {
            self.eat();
            return Ok(true);
        }
        Ok(false)
    }

    fn expect_punct(&mut self, kind: TokenKind) -> Result<(), ParseError> {
        let token = self.current_token()?;
        if token.kind == kind {
            self.eat();
            return Ok(());
        }
        Err(ParseError::UnexpectedToken(token))
    }

    fn maybe_name(&mut self) -> Result<Option<StringId>, ParseError> {
        let token = self.current_token()?;
        if let TokenKind::Identifier(id) = token.kind {
            self.eat();
            Ok(Some(id))
        } else {
            Ok(None)
        }
    }

    fn expect_name(&mut self) -> Result<StringId, ParseError> {
        let token = self.current_token()?;
        if let TokenKind::Identifier(id) = token.kind {
            self.eat();
            Ok(id)
        } else {
            Err(ParseError::UnexpectedToken(token))
        }
    }

    fn skip_storage_keywords(&mut self) -> Result<(), ParseError> {
        loop {
            match self.current_kind()? {
                TokenKind::Keyword(KeywordKind::Extern)
                | TokenKind::Keyword(KeywordKind::Static)
                | TokenKind::Keyword(KeywordKind::Inline) => self.eat(),
                _ => return Ok(()),
            }
        }
    }

    fn eat_qualifiers(&mut self, quals: &mut Qualifiers) -> Result<(), ParseError> {
        loop {
            match self.current_kind()? {
                TokenKind::Keyword(KeywordKind::Const) => *quals |= Qualifiers::CONST,
                TokenKind::Keyword(KeywordKind::Volatile) => *quals |= Qualifiers::VOLATILE,
                TokenKind::Keyword(KeywordKind::Restrict) => *quals |= Qualifiers::RESTRICT,
                _ => return Ok(()),
            }
            self.eat();
        }
    }

    // -----------------------------
    // Declarations
    // -----------------------------

    fn parse_top_level(&mut self) -> Result<(), ParseError> {
        if self.eat_token(&TokenKind::Semicolon)? {
            return Ok(());
        }
        self.skip_storage_keywords()?;
        if self.eat_token(&TokenKind::Keyword(KeywordKind::Typedef))? {
            return self.parse_typedef_tail();
        }
        self.parse_plain_decl()
    }

    fn parse_typedef_tail(&mut self) -> Result<(), ParseError> {
        let (base, quals) = self.parse_base_type()?;
        loop {
            let (ty, name) = self.parse_named_declarator(base.clone(), quals)?;
            if self.typedefs.contains_key(&name) {
                return Err(ParseError::TypedefRedefinition(name.as_str().to_owned()));
            }
            debug!("typedef {} recorded", name);
            self.typedefs.insert(name, (ty.clone(), quals));
            self.decls.push(Decl {
                kind: DeclKind::Typedef { name, ty, quals },
                included: false,
            });
            if !self.eat_token(&TokenKind::Comma)? {
                break;
            }
        }
        self.expect_punct(TokenKind::Semicolon)
    }

    /// A non-typedef top-level declaration: a bare struct/union/enum
    /// definition, a function declaration, or an object declaration (which
    /// is consumed but not recorded).
    fn parse_plain_decl(&mut self) -> Result<(), ParseError> {
        let (base, quals) = self.parse_base_type()?;
        if self.eat_token(&TokenKind::Semicolon)? {
            return Ok(());
        }
        loop {
            let (ty, _) = self.parse_pointers(base.clone(), quals)?;
            let name = self.expect_name()?;
            if self.eat_token(&TokenKind::LeftParen)? {
                let (args, variadic) = self.parse_params()?;
                self.decls.push(Decl {
                    kind: DeclKind::Function(FuncSig {
                        name,
                        args,
                        result: ty,
                        variadic,
                    }),
                    included: false,
                });
                return self.expect_punct(TokenKind::Semicolon);
            }
            while self.eat_token(&TokenKind::LeftBracket)? {
                if let TokenKind::Number(_) = self.current_kind()? {
                    self.eat();
                }
                self.expect_punct(TokenKind::RightBracket)?;
            }
            if !self.eat_token(&TokenKind::Comma)? {
                break;
            }
        }
        self.expect_punct(TokenKind::Semicolon)
    }

    // -----------------------------
    // Type expressions
    // -----------------------------

    fn parse_base_type(&mut self) -> Result<(CType, Qualifiers), ParseError> {
        let mut quals = Qualifiers::empty();
        self.eat_qualifiers(&mut quals)?;
        let token = self.current_token()?;
        let ty = match token.kind {
            TokenKind::Keyword(KeywordKind::Struct) => {
                self.eat();
                self.parse_struct_specifier(false)?
            }
            TokenKind::Keyword(KeywordKind::Union) => {
                self.eat();
                self.parse_struct_specifier(true)?
            }
            TokenKind::Keyword(KeywordKind::Enum) => {
                self.eat();
                self.parse_enum_specifier()?
            }
            TokenKind::Keyword(KeywordKind::Void) => {
                self.eat();
                CType::Void
            }
            TokenKind::Keyword(KeywordKind::Bool) => {
                self.eat();
                CType::Primitive(StringId::new("_Bool"))
            }
            TokenKind::Keyword(
                KeywordKind::Signed
                | KeywordKind::Unsigned
                | KeywordKind::Char
                | KeywordKind::Short
                | KeywordKind::Int
                | KeywordKind::Long
                | KeywordKind::Float
                | KeywordKind::Double,
            ) => self.parse_arith_type(&mut quals)?,
            TokenKind::Identifier(name) => {
                self.eat();
                if let Some((real, tquals)) = self.typedefs.get(&name) {
                    CType::Defined {
                        name,
                        real: Box::new(real.clone()),
                        quals: *tquals,
                    }
                } else if BUILTIN_TYPE_NAMES.contains(&name.as_str()) {
                    CType::Primitive(name)
                } else {
                    return Err(ParseError::UnknownTypeName(name.as_str().to_owned()));
                }
            }
            _ => return Err(ParseError::UnexpectedToken(token)),
        };
        self.eat_qualifiers(&mut quals)?;
        Ok((ty, quals))
    }

    /// Fold a run of arithmetic type keywords into the registry's canonical
    /// spelling ("unsigned long long", "long double", ...).
    fn parse_arith_type(&mut self, quals: &mut Qualifiers) -> Result<CType, ParseError> {
        let mut longs = 0u8;
        let mut unsigned = false;
        let mut signed = false;
        let mut is_char = false;
        let mut is_short = false;
        let mut is_float = false;
        let mut is_double = false;
        loop {
            match self.current_kind()? {
                TokenKind::Keyword(KeywordKind::Signed) => signed = true,
                TokenKind::Keyword(KeywordKind::Unsigned) => unsigned = true,
                TokenKind::Keyword(KeywordKind::Char) => is_char = true,
                TokenKind::Keyword(KeywordKind::Short) => is_short = true,
                TokenKind::Keyword(KeywordKind::Int) => {}
                TokenKind::Keyword(KeywordKind::Long) => longs += 1,
                TokenKind::Keyword(KeywordKind::Float) => is_float = true,
                TokenKind::Keyword(KeywordKind::Double) => is_double = true,
                TokenKind::Keyword(KeywordKind::Const) => *quals |= Qualifiers::CONST,
                TokenKind::Keyword(KeywordKind::Volatile) => *quals |= Qualifiers::VOLATILE,
                TokenKind::Keyword(KeywordKind::Restrict) => *quals |= Qualifiers::RESTRICT,
                _ => break,
            }
            self.eat();
        }
        let spelling = if is_double {
            if longs > 0 {
                "long double".to_owned()
            } else {
                "double".to_owned()
            }
        } else if is_float {
            "float".to_owned()
        } else if is_char {
            if unsigned {
                "unsigned char".to_owned()
            } else if signed {
                "signed char".to_owned()
            } else {
                "char".to_owned()
            }
        } else {
            let base = if is_short {
                "short"
            } else {
                match longs {
                    0 => "int",
                    1 => "long",
                    _ => "long long",
                }
            };
            if unsigned {
                format!("unsigned {}", base)
            } else {
                base.to_owned()
            }
        };
        Ok(CType::Primitive(StringId::new(spelling)))
    }

    /// `struct`/`union` specifier; the keyword is already consumed.
    ///
    /// The tag map guarantees every mention of `struct foo` resolves to the
    /// same node, so a forward reference and the later definition share
    /// identity.
    fn parse_struct_specifier(&mut self, is_union: bool) -> Result<CType, ParseError> {
        let tag = self.maybe_name()?;
        let has_body = self.current_kind()? == TokenKind::LeftBrace;
        let node_id = match tag {
            Some(tag) => {
                if let Some(&id) = self.struct_tags.get(&(tag, is_union)) {
                    id
                } else {
                    let id = StructNodeId::fresh();
                    self.struct_nodes.insert(
                        id,
                        StructNode {
                            id,
                            tag: Some(tag),
                            is_union,
                            fields: None,
                        },
                    );
                    self.struct_tags.insert((tag, is_union), id);
                    id
                }
            }
            None => {
                if !has_body {
                    return Err(ParseError::UnexpectedToken(self.current_token()?));
                }
                let id = StructNodeId::fresh();
                self.struct_nodes.insert(
                    id,
                    StructNode {
                        id,
                        tag: None,
                        is_union,
                        fields: None,
                    },
                );
                id
            }
        };
        if has_body {
            let fields = self.parse_struct_fields()?;
            let node = self.struct_nodes.get_mut(&node_id).expect("node just seen");
            if node.fields.is_some() {
                return Err(ParseError::StructRedefinition(node.struct_name()));
            }
            node.fields = Some(fields);
            if tag.is_some() {
                self.decls.push(Decl {
                    kind: DeclKind::Struct { node: node_id },
                    included: false,
                });
            }
        }
        Ok(CType::StructRef(node_id))
    }

    fn parse_struct_fields(&mut self) -> Result<ThinVec<StructField>, ParseError> {
        self.expect_punct(TokenKind::LeftBrace)?;
        let mut fields = ThinVec::new();
        while !self.eat_token(&TokenKind::RightBrace)? {
            let (base, quals) = self.parse_base_type()?;
            loop {
                let (ty, name) = self.parse_named_declarator(base.clone(), quals)?;
                // Bitfields are outside the supported subset.
                if self.current_kind()? == TokenKind::Colon {
                    return Err(ParseError::UnexpectedToken(self.current_token()?));
                }
                fields.push(StructField { name, ty, quals });
                if !self.eat_token(&TokenKind::Comma)? {
                    break;
                }
            }
            self.expect_punct(TokenKind::Semicolon)?;
        }
        Ok(fields)
    }

    /// `enum` specifier; the keyword is already consumed. Enumerators are
    /// recorded as integer macro bindings and the type itself is `int`.
    fn parse_enum_specifier(&mut self) -> Result<CType, ParseError> {
        let _tag = self.maybe_name()?;
        if self.eat_token(&TokenKind::LeftBrace)? {
            let mut next_value = 0i64;
            loop {
                if self.eat_token(&TokenKind::RightBrace)? {
                    break;
                }
                let name = self.expect_name()?;
                if self.eat_token(&TokenKind::Equal)? {
                    let token = self.current_token()?;
                    let TokenKind::Number(text) = token.kind else {
                        return Err(ParseError::UnexpectedToken(token));
                    };
                    self.eat();
                    next_value = parse_int_literal(&text)
                        .ok_or(ParseError::BadArrayLength(token.line))?;
                }
                self.decls.push(Decl {
                    kind: DeclKind::Macro {
                        name,
                        value: MacroValue::Int(next_value),
                    },
                    included: false,
                });
                next_value += 1;
                if !self.eat_token(&TokenKind::Comma)? {
                    self.expect_punct(TokenKind::RightBrace)?;
                    break;
                }
            }
        }
        Ok(CType::Primitive(StringId::new("int")))
    }

    // -----------------------------
    // Declarators
    // -----------------------------

    /// Apply `*` declarator prefixes. The qualifiers collected so far apply
    /// to the pointee of the first pointer; qualifiers between stars apply
    /// to the next level out. The qualifiers left pending after the last
    /// star are returned so array decay can apply them to its element.
    fn parse_pointers(
        &mut self,
        base: CType,
        base_quals: Qualifiers,
    ) -> Result<(CType, Qualifiers), ParseError> {
        let mut ty = base;
        let mut pending = base_quals;
        while self.eat_token(&TokenKind::Star)? {
            ty = CType::Pointer {
                pointee: Box::new(ty),
                quals: pending,
            };
            pending = Qualifiers::empty();
            self.eat_qualifiers(&mut pending)?;
        }
        Ok((ty, pending))
    }

    /// A declarator that must bind a name: typedef bodies and struct fields.
    fn parse_named_declarator(
        &mut self,
        base: CType,
        quals: Qualifiers,
    ) -> Result<(CType, StringId), ParseError> {
        let (ty, _) = self.parse_pointers(base, quals)?;
        if self.current_kind()? == TokenKind::LeftParen {
            // Parenthesized declarator: ( * name ) ( params ) for a
            // function pointer, or ( * name ) [ N ] for a pointer to array.
            self.eat();
            self.expect_punct(TokenKind::Star)?;
            let name = self.expect_name()?;
            self.expect_punct(TokenKind::RightParen)?;
            if self.eat_token(&TokenKind::LeftParen)? {
                let (args, variadic) = self.parse_params()?;
                return Ok((
                    CType::FunctionPtr {
                        args,
                        result: Box::new(ty),
                        variadic,
                    },
                    name,
                ));
            }
            let inner = self.parse_array_suffixes(ty)?;
            return Ok((
                CType::Pointer {
                    pointee: Box::new(inner),
                    quals: Qualifiers::empty(),
                },
                name,
            ));
        }
        let name = self.expect_name()?;
        let ty = self.parse_array_suffixes(ty)?;
        Ok((ty, name))
    }

    /// Fold `[N]` suffixes into fixed arrays, outermost dimension first.
    fn parse_array_suffixes(&mut self, base: CType) -> Result<CType, ParseError> {
        let mut dims = Vec::new();
        while self.eat_token(&TokenKind::LeftBracket)? {
            let token = self.current_token()?;
            let TokenKind::Number(text) = token.kind else {
                return Err(ParseError::BadArrayLength(token.line));
            };
            self.eat();
            let len = parse_int_literal(&text)
                .filter(|v| *v >= 0)
                .ok_or(ParseError::BadArrayLength(token.line))?;
            self.expect_punct(TokenKind::RightBracket)?;
            dims.push(len as usize);
        }
        let mut ty = base;
        for len in dims.into_iter().rev() {
            ty = CType::Array {
                elem: Box::new(ty),
                len,
            };
        }
        Ok(ty)
    }

    /// A declarator whose name is optional: parameters and standalone type
    /// expressions. With `decay`, trailing array brackets produce a pointer
    /// (C parameter decay); without, a fixed array.
    fn parse_value_declarator(
        &mut self,
        base: CType,
        quals: Qualifiers,
        decay: bool,
    ) -> Result<CType, ParseError> {
        let (mut ty, elem_quals) = self.parse_pointers(base, quals)?;
        if self.current_kind()? == TokenKind::LeftParen {
            self.eat();
            self.expect_punct(TokenKind::Star)?;
            let _ = self.maybe_name()?;
            self.expect_punct(TokenKind::RightParen)?;
            if self.eat_token(&TokenKind::LeftParen)? {
                let (args, variadic) = self.parse_params()?;
                return Ok(CType::FunctionPtr {
                    args,
                    result: Box::new(ty),
                    variadic,
                });
            }
            let inner = self.parse_array_suffixes(ty)?;
            return Ok(CType::Pointer {
                pointee: Box::new(inner),
                quals: Qualifiers::empty(),
            });
        }
        let _ = self.maybe_name()?;
        while self.eat_token(&TokenKind::LeftBracket)? {
            let mut len = 0usize;
            if let TokenKind::Number(text) = self.current_kind()? {
                let line = self.current_token()?.line;
                self.eat();
                len = parse_int_literal(&text)
                    .filter(|v| *v >= 0)
                    .ok_or(ParseError::BadArrayLength(line))? as usize;
            }
            self.expect_punct(TokenKind::RightBracket)?;
            ty = if decay {
                // The decayed pointer's element keeps the declaration's
                // qualifiers: `const char buf[]` is a read-only pointer.
                CType::Pointer {
                    pointee: Box::new(ty),
                    quals: elem_quals,
                }
            } else {
                CType::Array {
                    elem: Box::new(ty),
                    len,
                }
            };
        }
        Ok(ty)
    }

    /// Parameter list; the opening parenthesis is consumed by the caller.
    fn parse_params(&mut self) -> Result<(ThinVec<CType>, bool), ParseError> {
        let mut args = ThinVec::new();
        let mut variadic = false;
        if self.eat_token(&TokenKind::RightParen)? {
            return Ok((args, variadic));
        }
        // `(void)` means "no parameters".
        if self.current_kind()? == TokenKind::Keyword(KeywordKind::Void)
            && self.peek_kind(1) == Some(&TokenKind::RightParen)
        {
            self.eat();
            self.eat();
            return Ok((args, variadic));
        }
        loop {
            if self.eat_token(&TokenKind::Ellipsis)? {
                variadic = true;
                self.expect_punct(TokenKind::RightParen)?;
                break;
            }
            let (base, quals) = self.parse_base_type()?;
            let ty = self.parse_value_declarator(base, quals, true)?;
            args.push(ty);
            if self.eat_token(&TokenKind::Comma)? {
                continue;
            }
            self.expect_punct(TokenKind::RightParen)?;
            break;
        }
        Ok((args, variadic))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_one_type(text: &str) -> (CType, Qualifiers) {
        Parser::new().parse_type(text).unwrap()
    }

    #[test]
    fn qualified_pointer_shapes() {
        let (ty, _) = parse_one_type("const char *");
        let CType::Pointer { pointee, quals } = ty else {
            panic!("expected a pointer, got {:?}", ty);
        };
        assert!(quals.contains(Qualifiers::CONST));
        assert_eq!(*pointee, CType::Primitive(StringId::new("char")));

        let (ty, _) = parse_one_type("char **");
        let CType::Pointer { pointee, quals } = ty else {
            panic!("expected a pointer, got {:?}", ty);
        };
        assert!(quals.is_empty());
        assert!(matches!(*pointee, CType::Pointer { .. }));
    }

    #[test]
    fn multi_keyword_primitives_canonicalize() {
        let (ty, _) = parse_one_type("unsigned long long int");
        assert_eq!(ty, CType::Primitive(StringId::new("unsigned long long")));

        let (ty, _) = parse_one_type("long double");
        assert_eq!(ty, CType::Primitive(StringId::new("long double")));

        let (ty, quals) = parse_one_type("unsigned const");
        assert_eq!(ty, CType::Primitive(StringId::new("unsigned int")));
        assert!(quals.contains(Qualifiers::CONST));
    }

    #[test]
    fn typedef_names_resolve_through_the_table() {
        let mut parser = Parser::new();
        parser.parse("typedef unsigned long word; typedef word pair[2];").unwrap();
        let (ty, _) = parser.parse_type("word").unwrap();
        let CType::Defined { name, real, .. } = ty else {
            panic!("expected a typedef use, got {:?}", ty);
        };
        assert_eq!(name.as_str(), "word");
        assert_eq!(*real, CType::Primitive(StringId::new("unsigned long")));

        match parser.parse_type("pair").unwrap().0 {
            CType::Defined { real, .. } => {
                assert!(matches!(*real, CType::Array { len: 2, .. }))
            }
            other => panic!("expected a typedef use, got {:?}", other),
        }
    }

    #[test]
    fn struct_tag_mentions_share_a_node() {
        let mut parser = Parser::new();
        parser
            .parse("struct widget; struct widget { int id; struct widget *peer; };")
            .unwrap();
        let (first, _) = parser.parse_type("struct widget").unwrap();
        let CType::StructRef(node) = first else {
            panic!("expected a struct reference, got {:?}", first);
        };
        let record = parser.struct_node(node).unwrap();
        let fields = record.fields.as_ref().unwrap();
        assert_eq!(fields.len(), 2);
        assert!(matches!(
            &fields[1].ty,
            CType::Pointer { pointee, .. } if **pointee == CType::StructRef(node)
        ));
    }

    #[test]
    fn struct_body_redefinition_is_rejected() {
        let mut parser = Parser::new();
        let err = parser
            .parse("struct w { int a; }; struct w { int b; };")
            .unwrap_err();
        assert!(matches!(err, ParseError::StructRedefinition(_)));
    }

    #[test]
    fn function_pointer_declarators() {
        let (ty, _) = parse_one_type("void (*)(int, const char *)");
        let CType::FunctionPtr { args, result, variadic } = ty else {
            panic!("expected a function pointer, got {:?}", ty);
        };
        assert_eq!(args.len(), 2);
        assert_eq!(*result, CType::Void);
        assert!(!variadic);

        let (ty, _) = parse_one_type("int (*)(void)");
        assert!(matches!(ty, CType::FunctionPtr { ref args, .. } if args.is_empty()));

        let (ty, _) = parse_one_type("int (*)(int, ...)");
        assert!(matches!(ty, CType::FunctionPtr { variadic: true, .. }));
    }

    #[test]
    fn array_parameters_decay_to_pointers() {
        let mut parser = Parser::new();
        let sig = parser.parse_func("int sum(int values[], int count)").unwrap();
        assert_eq!(sig.name.as_str(), "sum");
        assert!(matches!(sig.args[0], CType::Pointer { .. }));
        assert_eq!(sig.args[1], CType::Primitive(StringId::new("int")));
    }

    #[test]
    fn multidimensional_arrays_nest_outermost_first() {
        let mut parser = Parser::new();
        parser.parse("typedef double mat[2][3];").unwrap();
        let (ty, _) = parser.parse_type("mat").unwrap();
        let CType::Defined { real, .. } = ty else {
            panic!("expected a typedef use, got {:?}", ty);
        };
        let CType::Array { elem, len } = *real else {
            panic!("expected an array, got {:?}", real);
        };
        assert_eq!(len, 2);
        assert!(matches!(*elem, CType::Array { len: 3, .. }));
    }

    #[test]
    fn directives_are_captured_or_ignored() {
        let mut parser = Parser::new();
        parser
            .parse(
                "#ifndef GUARD_H\n#define GUARD_H\n#include <stdio.h>\n\
                 #define LIMIT 64\nint get_limit(void);\n#endif\n",
            )
            .unwrap();
        let macros: Vec<_> = parser
            .decls()
            .iter()
            .filter_map(|d| match &d.kind {
                DeclKind::Macro { name, value } => Some((name.as_str(), value.clone())),
                _ => None,
            })
            .collect();
        assert_eq!(macros, vec![("LIMIT", MacroValue::Int(64))]);

        let err = Parser::new().parse("#define MAX(a, b) ((a) > (b))").unwrap_err();
        assert!(matches!(err, ParseError::BadDirective(_)));
    }

    #[test]
    fn bitfields_are_rejected() {
        let err = Parser::new()
            .parse("struct flags { unsigned a : 1; };")
            .unwrap_err();
        assert!(matches!(err, ParseError::UnexpectedToken(_)));
    }
}
