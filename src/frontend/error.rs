use thiserror::Error;

use crate::frontend::lexer::Token;

/// An error raised by the declaration frontend.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    #[error("unexpected token: {0:?}")]
    UnexpectedToken(Token),
    #[error("unexpected end of input")]
    UnexpectedEof,
    #[error("unexpected character `{0}` on line {1}")]
    UnexpectedChar(char, u32),
    #[error("unknown type name `{0}`")]
    UnknownTypeName(String),
    #[error("redefinition of typedef `{0}`")]
    TypedefRedefinition(String),
    #[error("redefinition of struct `{0}`")]
    StructRedefinition(String),
    #[error("bad array length on line {0}")]
    BadArrayLength(u32),
    #[error("unsupported directive: {0}")]
    BadDirective(String),
}
