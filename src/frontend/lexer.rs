//! Tokenizer for the C declaration subset.

use std::fmt;
use std::iter::Peekable;
use std::str::Chars;
use std::str::FromStr;

use crate::frontend::error::ParseError;
use crate::StringId;

/// Keywords the declaration subset recognizes.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum KeywordKind {
    Bool,
    Char,
    Const,
    Double,
    Enum,
    Extern,
    Float,
    Inline,
    Int,
    Long,
    Restrict,
    Short,
    Signed,
    Static,
    Struct,
    Typedef,
    Union,
    Unsigned,
    Void,
    Volatile,
}

impl FromStr for KeywordKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "_Bool" => Ok(KeywordKind::Bool),
            "char" => Ok(KeywordKind::Char),
            "const" => Ok(KeywordKind::Const),
            "double" => Ok(KeywordKind::Double),
            "enum" => Ok(KeywordKind::Enum),
            "extern" => Ok(KeywordKind::Extern),
            "float" => Ok(KeywordKind::Float),
            "inline" => Ok(KeywordKind::Inline),
            "int" => Ok(KeywordKind::Int),
            "long" => Ok(KeywordKind::Long),
            "restrict" => Ok(KeywordKind::Restrict),
            "short" => Ok(KeywordKind::Short),
            "signed" => Ok(KeywordKind::Signed),
            "static" => Ok(KeywordKind::Static),
            "struct" => Ok(KeywordKind::Struct),
            "typedef" => Ok(KeywordKind::Typedef),
            "union" => Ok(KeywordKind::Union),
            "unsigned" => Ok(KeywordKind::Unsigned),
            "void" => Ok(KeywordKind::Void),
            "volatile" => Ok(KeywordKind::Volatile),
            _ => Err(()),
        }
    }
}

/// The kind of a token.
#[derive(Debug, PartialEq, Clone)]
pub enum TokenKind {
    Identifier(StringId),
    Keyword(KeywordKind),
    Number(String),
    Str(String),
    Star,
    Comma,
    Semicolon,
    Colon,
    Equal,
    Ellipsis,
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    LeftBracket,
    RightBracket,
    Eof,
}

/// A token with the line it came from.
#[derive(Debug, PartialEq, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub line: u32,
}

impl Token {
    pub fn new(kind: TokenKind, line: u32) -> Self {
        Token { kind, line }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} (line {})", self.kind, self.line)
    }
}

pub struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
    line: u32,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Lexer {
            chars: input.chars().peekable(),
            line: 1,
        }
    }

    /// Produce the next token, skipping whitespace and comments.
    pub fn next_token(&mut self) -> Result<Token, ParseError> {
        loop {
            let Some(&c) = self.chars.peek() else {
                return Ok(Token::new(TokenKind::Eof, self.line));
            };
            match c {
                '\n' => {
                    self.line += 1;
                    self.chars.next();
                }
                c if c.is_whitespace() => {
                    self.chars.next();
                }
                '/' => {
                    self.chars.next();
                    match self.chars.peek() {
                        Some('/') => {
                            while let Some(&c) = self.chars.peek() {
                                if c == '\n' {
                                    break;
                                }
                                self.chars.next();
                            }
                        }
                        Some('*') => {
                            self.chars.next();
                            self.skip_block_comment();
                        }
                        _ => return Err(ParseError::UnexpectedChar('/', self.line)),
                    }
                }
                _ => break,
            }
        }

        let line = self.line;
        let c = *self.chars.peek().ok_or(ParseError::UnexpectedEof)?;

        if c.is_ascii_alphabetic() || c == '_' {
            let word = self.take_while(|c| c.is_ascii_alphanumeric() || c == '_');
            let kind = match KeywordKind::from_str(&word) {
                Ok(kw) => TokenKind::Keyword(kw),
                Err(()) => TokenKind::Identifier(StringId::new(&word)),
            };
            return Ok(Token::new(kind, line));
        }

        if c.is_ascii_digit() {
            let num = self.take_while(|c| c.is_ascii_alphanumeric() || c == '.');
            return Ok(Token::new(TokenKind::Number(num), line));
        }

        if c == '"' {
            self.chars.next();
            let mut s = String::new();
            loop {
                match self.chars.next() {
                    Some('"') => break,
                    Some('\\') => {
                        if let Some(e) = self.chars.next() {
                            s.push('\\');
                            s.push(e);
                        }
                    }
                    Some(c) => s.push(c),
                    None => return Err(ParseError::UnexpectedEof),
                }
            }
            return Ok(Token::new(TokenKind::Str(s), line));
        }

        self.chars.next();
        let kind = match c {
            '*' => TokenKind::Star,
            ',' => TokenKind::Comma,
            ';' => TokenKind::Semicolon,
            ':' => TokenKind::Colon,
            '=' => TokenKind::Equal,
            '(' => TokenKind::LeftParen,
            ')' => TokenKind::RightParen,
            '{' => TokenKind::LeftBrace,
            '}' => TokenKind::RightBrace,
            '[' => TokenKind::LeftBracket,
            ']' => TokenKind::RightBracket,
            '.' => {
                // Only the ellipsis is meaningful here.
                if self.chars.next_if_eq(&'.').is_some() && self.chars.next_if_eq(&'.').is_some() {
                    TokenKind::Ellipsis
                } else {
                    return Err(ParseError::UnexpectedChar('.', line));
                }
            }
            other => return Err(ParseError::UnexpectedChar(other, line)),
        };
        Ok(Token::new(kind, line))
    }

    fn skip_block_comment(&mut self) {
        while let Some(c) = self.chars.next() {
            if c == '\n' {
                self.line += 1;
            } else if c == '*' && self.chars.peek() == Some(&'/') {
                self.chars.next();
                return;
            }
        }
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> String {
        let mut s = String::new();
        while let Some(&c) = self.chars.peek() {
            if !pred(c) {
                break;
            }
            s.push(c);
            self.chars.next();
        }
        s
    }
}

/// Tokenize a whole input, ending with an `Eof` token.
pub fn tokenize(input: &str) -> Result<Vec<Token>, ParseError> {
    let mut lexer = Lexer::new(input);
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token()?;
        let done = token.kind == TokenKind::Eof;
        tokens.push(token);
        if done {
            return Ok(tokens);
        }
    }
}

/// Parse a C integer literal, stripping `u`/`l` suffixes and accepting the
/// hexadecimal and octal prefixes.
pub fn parse_int_literal(text: &str) -> Option<i64> {
    let text = text.trim_end_matches(['u', 'U', 'l', 'L']);
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16).ok()
    } else if text.len() > 1 && text.starts_with('0') {
        i64::from_str_radix(&text[1..], 8).ok()
    } else {
        text.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_declaration() {
        let tokens = tokenize("typedef unsigned long size_t;").unwrap();
        let kinds: Vec<_> = tokens.into_iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Keyword(KeywordKind::Typedef),
                TokenKind::Keyword(KeywordKind::Unsigned),
                TokenKind::Keyword(KeywordKind::Long),
                TokenKind::Identifier(StringId::new("size_t")),
                TokenKind::Semicolon,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn skips_comments_and_counts_lines() {
        let tokens = tokenize("/* a\n b */ int // trailing\n x;").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Keyword(KeywordKind::Int));
        assert_eq!(tokens[0].line, 2);
        assert_eq!(tokens[1].line, 3);
    }

    #[test]
    fn integer_literals() {
        assert_eq!(parse_int_literal("42"), Some(42));
        assert_eq!(parse_int_literal("0x10UL"), Some(16));
        assert_eq!(parse_int_literal("010"), Some(8));
        assert_eq!(parse_int_literal("abc"), None);
    }
}
