//! Token types produced by the [`Lexer`](crate::lexer::Lexer).

use std::fmt;

use serde::Serialize;

/// The closed set of token kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TokenKind {
    /// `42`, `-3`
    Integer,
    /// `3.14`, `-0.5`
    Float,
    /// A number with a unit suffix: `100ms`, `5s`, `2h`.
    ///
    /// The suffix is kept verbatim; unit validation happens at translation.
    Duration,
    /// Names of functions, variables and UDFs. May contain `_` and `$`.
    Identifier,
    /// Operators and punctuation: `>=`, `&&`, `(`, `.`, `->`, ...
    Operator,
    /// Quoted string, stored without quotes and with escapes resolved.
    Str,
    /// End of input.
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TokenKind::Integer => "integer",
            TokenKind::Float => "float",
            TokenKind::Duration => "duration",
            TokenKind::Identifier => "identifier",
            TokenKind::Operator => "operator",
            TokenKind::Str => "string",
            TokenKind::Eof => "end of input",
        };
        write!(f, "{s}")
    }
}

/// A single lexical token.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    /// Character offset of the first character in the source.
    pub position: usize,
    /// 1-based line.
    pub line: usize,
    /// 0-based column within the line.
    pub column: usize,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>, position: usize) -> Self {
        Token {
            kind,
            text: text.into(),
            position,
            line: 1,
            column: position,
        }
    }

    pub(crate) fn at(mut self, line: usize, column: usize) -> Self {
        self.line = line;
        self.column = column;
        self
    }

    /// True for literal tokens: numbers, durations and strings.
    pub fn is_value(&self) -> bool {
        matches!(
            self.kind,
            TokenKind::Integer | TokenKind::Float | TokenKind::Duration | TokenKind::Str
        )
    }

    pub fn is_number(&self) -> bool {
        matches!(self.kind, TokenKind::Integer | TokenKind::Float)
    }

    /// True if this token is the given operator/punctuation symbol.
    pub fn is_op(&self, op: &str) -> bool {
        self.kind == TokenKind::Operator && self.text == op
    }

    pub fn is_eof(&self) -> bool {
        self.kind == TokenKind::Eof
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TokenKind::Eof => write!(f, "end of input"),
            TokenKind::Str => write!(f, "\"{}\"", self.text),
            _ => write!(f, "'{}'", self.text),
        }
    }
}
